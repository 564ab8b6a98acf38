use common::errors::BridgeError;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use idewire::apis::openai::{ChatCompletionsRequest, ChatCompletionsResponse};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Instrument, Span};
use uuid::Uuid;

use crate::app::AppState;
use crate::handlers::response_handler::{
    create_streaming_response, json_response, BufferedSink, ResponseBody, StreamingSink,
    STREAM_BUFFER_SIZE,
};
use crate::reassembler::DriveOutcome;

pub async fn chat_completions<B>(
    request: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<ResponseBody>, BridgeError>
where
    B: Body,
    B::Error: Display,
{
    if state.credentials.is_expired().await {
        return Err(BridgeError::CredentialExpired);
    }

    let body = request
        .into_body()
        .collect()
        .await
        .map_err(|err| BridgeError::InvalidRequest(format!("failed to read body: {}", err)))?
        .to_bytes();
    let chat_request: ChatCompletionsRequest = serde_json::from_slice(&body)
        .map_err(|err| BridgeError::InvalidRequest(err.to_string()))?;

    info!(
        model = %chat_request.model,
        stream = chat_request.stream,
        messages = chat_request.messages.len(),
        "chat completion request"
    );

    let prepared = state.pipeline.start(chat_request).await?;
    let id = format!("chatcmpl-{}", Uuid::new_v4());
    let created = state.clock.now_secs();
    let model = prepared.model().to_string();

    if prepared.is_streaming() {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER_SIZE);
        let mut sink = StreamingSink::new(tx, id, created, model);
        let task_state = state.clone();

        tokio::spawn(
            async move {
                match task_state.pipeline.drive(prepared, &mut sink).await {
                    Ok(DriveOutcome::Completed { finish_reason }) => {
                        debug!(finish_reason = %finish_reason, "stream complete");
                        if sink.finish(&finish_reason).await.is_err() {
                            debug!("client left before the final chunk");
                        }
                    }
                    Ok(DriveOutcome::Cancelled) => debug!("client disconnected mid-stream"),
                    Err(err) => {
                        warn!(error = %err, "chat stream failed");
                        if sink.fail(&err).await.is_err() {
                            debug!("client left before the error frame");
                        }
                    }
                }
            }
            .instrument(Span::current()),
        );

        return create_streaming_response(rx);
    }

    let mut sink = BufferedSink::new();
    let finish_reason = match state.pipeline.drive(prepared, &mut sink).await? {
        DriveOutcome::Completed { finish_reason } => finish_reason,
        DriveOutcome::Cancelled => {
            return Err(BridgeError::InternalServerError(
                "response cancelled".to_string(),
            ))
        }
    };

    let content = sink.into_text();
    if content.is_empty() {
        return Err(BridgeError::EmptyResponse);
    }

    let response = ChatCompletionsResponse::new(id, created, model, content, finish_reason);
    json_response(StatusCode::OK, &response)
}
