use async_trait::async_trait;
use bytes::Bytes;
use common::errors::BridgeError;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use idewire::apis::openai::ChatCompletionsStreamResponse;
use idewire::SseEvent;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::reassembler::{ResponseSink, SinkClosed};

pub type ResponseBody = BoxBody<Bytes, hyper::Error>;

pub const STREAM_BUFFER_SIZE: usize = 16;

pub fn full<T: Into<Bytes>>(chunk: T) -> ResponseBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

pub fn json_response<T: Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<Response<ResponseBody>, BridgeError> {
    let body = serde_json::to_string(value).map_err(|err| {
        BridgeError::InternalServerError(format!("failed to serialize response: {}", err))
    })?;
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(full(body))?)
}

/// Wraps a channel of pre-framed SSE bytes as a `text/event-stream` response.
pub fn create_streaming_response(
    rx: mpsc::Receiver<Bytes>,
) -> Result<Response<ResponseBody>, BridgeError> {
    let stream = ReceiverStream::new(rx).map(|chunk| Ok::<_, hyper::Error>(Frame::data(chunk)));
    let stream_body = BoxBody::new(StreamBody::new(stream));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/event-stream")
        .header(CACHE_CONTROL, "no-cache")
        .header(CONNECTION, "keep-alive")
        .body(stream_body)?)
}

fn data_frame<T: Serialize>(value: &T) -> Option<SseEvent> {
    match serde_json::to_string(value) {
        Ok(json) => Some(SseEvent::data(json)),
        Err(err) => {
            warn!(error = %err, "failed to serialize stream chunk");
            None
        }
    }
}

/// Renders reassembled fragments as chat completion chunks on a response
/// channel. Dropping the receiver closes the sink.
pub struct StreamingSink {
    tx: mpsc::Sender<Bytes>,
    id: String,
    created: i64,
    model: String,
}

impl StreamingSink {
    pub fn new(tx: mpsc::Sender<Bytes>, id: String, created: i64, model: String) -> Self {
        Self {
            tx,
            id,
            created,
            model,
        }
    }

    async fn send(&self, event: Option<SseEvent>) -> Result<(), SinkClosed> {
        let Some(event) = event else {
            return Ok(());
        };
        self.tx
            .send(Bytes::from(event.to_string()))
            .await
            .map_err(|_| SinkClosed)
    }

    /// The closing chunk followed by the `[DONE]` sentinel.
    pub async fn finish(&self, finish_reason: &str) -> Result<(), SinkClosed> {
        let last =
            ChatCompletionsStreamResponse::finish(&self.id, self.created, &self.model, finish_reason);
        self.send(data_frame(&last)).await?;
        self.send(Some(SseEvent::done())).await
    }

    /// Reports an error raised after the response headers went out.
    pub async fn fail(&self, err: &BridgeError) -> Result<(), SinkClosed> {
        let payload = json!({ "error": err.to_string() });
        self.send(Some(SseEvent::new("error", payload.to_string())))
            .await
    }
}

#[async_trait]
impl ResponseSink for StreamingSink {
    async fn content(&mut self, text: &str) -> Result<(), SinkClosed> {
        let chunk = ChatCompletionsStreamResponse::content(&self.id, self.created, &self.model, text);
        self.send(data_frame(&chunk)).await
    }

    async fn queue_notice(&mut self, text: &str) -> Result<(), SinkClosed> {
        let chunk = ChatCompletionsStreamResponse::notice(&self.id, self.created, &self.model, text);
        self.send(data_frame(&chunk)).await
    }

    async fn closed(&self) {
        self.tx.closed().await
    }

    fn is_streaming(&self) -> bool {
        true
    }
}

/// Collects the answer for a single completion object.
#[derive(Debug, Default)]
pub struct BufferedSink {
    text: String,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

#[async_trait]
impl ResponseSink for BufferedSink {
    async fn content(&mut self, text: &str) -> Result<(), SinkClosed> {
        self.text.push_str(text);
        Ok(())
    }

    async fn queue_notice(&mut self, text: &str) -> Result<(), SinkClosed> {
        debug!(notice = %text.trim_end(), "dropping queue notice for buffered response");
        Ok(())
    }

    // the server drops the whole handler future when a buffered caller disconnects
    async fn closed(&self) {
        std::future::pending::<()>().await
    }

    fn is_streaming(&self) -> bool {
        false
    }
}
