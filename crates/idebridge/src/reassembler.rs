//! Rebuilds one coherent answer from the upstream event stream.
//!
//! A [`ChatPipeline`] owns the whole exchange for one inbound request:
//! translating it, opening the upstream stream, retrying while the upstream
//! keeps it queued, framing reasoning with think delimiters, and re-running
//! itself when an eligible answer was cut off by length. Everything it
//! produces goes into a [`ResponseSink`] so the streaming and buffered
//! emitters see the same fragments.

use async_trait::async_trait;
use common::configuration::{Continuation, Queue};
use common::errors::BridgeError;
use futures::StreamExt;
use hyper::StatusCode;
use idewire::apis::ide::{IdeChatRequest, OutputDelta};
use idewire::apis::openai::{ChatCompletionsRequest, Message, Role};
use idewire::models::CONTINUATION_MODEL;
use idewire::IdeStreamEvent;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::retry::{wait_unless_cancelled, RetryPolicy};
use crate::translator::RequestTranslator;
use crate::upstream::{ChatUpstream, FrameStream};

pub const THINK_OPEN: &str = "<think>\n\n";
pub const THINK_CLOSE: &str = "</think>\n\n";

pub const DEFAULT_FINISH_REASON: &str = "stop";
const LENGTH_FINISH_REASON: &str = "length";

/// Where an answer is in its reasoning/answer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnswerState {
    #[default]
    None,
    Thinking,
    Answering,
}

impl AnswerState {
    /// Renders one `output` event, adding the opening delimiter on the first
    /// reasoning fragment and the closing one on the first answer fragment
    /// that follows reasoning.
    pub fn apply(&mut self, delta: &OutputDelta) -> Option<String> {
        let mut rendered = String::new();

        if let Some(reasoning) = delta.reasoning() {
            if *self == AnswerState::None {
                rendered.push_str(THINK_OPEN);
                *self = AnswerState::Thinking;
            }
            rendered.push_str(reasoning);
        }

        if let Some(answer) = delta.answer() {
            if *self == AnswerState::Thinking {
                rendered.push_str(THINK_CLOSE);
            }
            *self = AnswerState::Answering;
            rendered.push_str(answer);
        }

        if rendered.is_empty() {
            None
        } else {
            Some(rendered)
        }
    }
}

#[derive(Debug, Error)]
#[error("response receiver is gone")]
pub struct SinkClosed;

/// Destination of a reassembled answer.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn content(&mut self, text: &str) -> Result<(), SinkClosed>;

    /// Queue position updates; never part of the answer text.
    async fn queue_notice(&mut self, text: &str) -> Result<(), SinkClosed>;

    /// Resolves once the caller has gone away.
    async fn closed(&self);

    fn is_streaming(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuePolicy {
    pub retry: RetryPolicy,
    pub notice_interval: Duration,
}

impl From<&Queue> for QueuePolicy {
    fn from(queue: &Queue) -> Self {
        Self {
            retry: RetryPolicy::fixed(
                queue.max_retries,
                Duration::from_millis(queue.retry_delay_ms),
            ),
            notice_interval: Duration::from_millis(queue.notice_interval_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContinuationPolicy {
    pub enabled: bool,
    pub retry: RetryPolicy,
    pub prompt: String,
}

impl From<&Continuation> for ContinuationPolicy {
    fn from(continuation: &Continuation) -> Self {
        Self {
            enabled: continuation.enabled,
            retry: RetryPolicy::immediate(continuation.max_attempts),
            prompt: continuation.prompt.clone(),
        }
    }
}

/// A translated request whose upstream stream is already open.
pub struct PreparedChat {
    request: ChatCompletionsRequest,
    upstream_request: IdeChatRequest,
    frames: FrameStream,
}

impl PreparedChat {
    pub fn model(&self) -> &str {
        &self.request.model
    }

    pub fn is_streaming(&self) -> bool {
        self.request.stream
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveOutcome {
    Completed { finish_reason: String },
    Cancelled,
}

enum PassOutcome {
    Finished {
        text: String,
        finish_reason: Option<String>,
    },
    Cancelled,
}

fn queue_notice(interval: Duration, position: i64) -> String {
    format!(
        "排队中，每{}s刷新一次状态，当前位置：{}\n",
        interval.as_secs(),
        position
    )
}

pub struct ChatPipeline {
    translator: RequestTranslator,
    upstream: Arc<dyn ChatUpstream>,
    queue: QueuePolicy,
    continuation: ContinuationPolicy,
}

impl ChatPipeline {
    pub fn new(
        translator: RequestTranslator,
        upstream: Arc<dyn ChatUpstream>,
        queue: QueuePolicy,
        continuation: ContinuationPolicy,
    ) -> Self {
        Self {
            translator,
            upstream,
            queue,
            continuation,
        }
    }

    /// Translates the request and opens the first upstream stream, so that
    /// rejections still become plain HTTP errors.
    pub async fn start(&self, request: ChatCompletionsRequest) -> Result<PreparedChat, BridgeError> {
        let upstream_request = self.translator.translate(&request).await?;
        let frames = self.upstream.open_chat(&upstream_request).await?;
        Ok(PreparedChat {
            request,
            upstream_request,
            frames,
        })
    }

    fn continues(&self, finish_reason: &str, upstream_model: &str) -> bool {
        self.continuation.enabled
            && finish_reason == LENGTH_FINISH_REASON
            && upstream_model == CONTINUATION_MODEL
    }

    /// Reads the prepared stream to the end, continuing truncated answers
    /// into the same sink.
    pub async fn drive<S>(&self, prepared: PreparedChat, sink: &mut S) -> Result<DriveOutcome, BridgeError>
    where
        S: ResponseSink + ?Sized,
    {
        let PreparedChat {
            mut request,
            mut upstream_request,
            mut frames,
        } = prepared;
        let mut continuations = self.continuation.retry.attempts();

        loop {
            let (text, finish_reason) = match self.read_pass(&upstream_request, frames, &mut *sink).await? {
                PassOutcome::Finished {
                    text,
                    finish_reason,
                } => (
                    text,
                    finish_reason.unwrap_or_else(|| DEFAULT_FINISH_REASON.to_string()),
                ),
                PassOutcome::Cancelled => {
                    debug!("caller went away, dropping upstream stream");
                    return Ok(DriveOutcome::Cancelled);
                }
            };

            if !self.continues(&finish_reason, &upstream_request.model_name) {
                return Ok(DriveOutcome::Completed { finish_reason });
            }
            if continuations.next_delay().is_none() {
                warn!(
                    attempts = continuations.used(),
                    "answer still truncated after the last continuation"
                );
                return Ok(DriveOutcome::Completed { finish_reason });
            }

            info!(
                attempt = continuations.used(),
                model = %upstream_request.model_name,
                "answer truncated by length, continuing"
            );
            request.messages.push(Message::new(Role::Assistant, text));
            request
                .messages
                .push(Message::new(Role::User, self.continuation.prompt.as_str()));
            upstream_request = self.translator.translate(&request).await?;
            frames = tokio::select! {
                opened = self.upstream.open_chat(&upstream_request) => opened?,
                _ = sink.closed() => return Ok(DriveOutcome::Cancelled),
            };
        }
    }

    async fn read_pass<S>(
        &self,
        upstream_request: &IdeChatRequest,
        mut frames: FrameStream,
        sink: &mut S,
    ) -> Result<PassOutcome, BridgeError>
    where
        S: ResponseSink + ?Sized,
    {
        let mut state = AnswerState::default();
        let mut text = String::new();
        let mut finish_reason: Option<String> = None;
        let mut queue_retries = self.queue.retry.attempts();
        let mut last_notice: Option<Instant> = None;

        loop {
            let next = tokio::select! {
                next = frames.next() => next,
                _ = sink.closed() => return Ok(PassOutcome::Cancelled),
            };
            let frame = match next {
                Some(frame) => frame?,
                None => {
                    debug!(finish_reason = ?finish_reason, "upstream stream ended without done");
                    break;
                }
            };
            let Some(data) = frame.data.as_deref() else {
                continue;
            };

            let event = match IdeStreamEvent::parse(frame.event_name(), data) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    debug!(event = %frame.event_name(), "ignoring upstream event");
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "skipping upstream frame");
                    continue;
                }
            };

            match event {
                IdeStreamEvent::Output(delta) => {
                    if let Some(reason) = delta.finish_reason() {
                        finish_reason = Some(reason.to_string());
                    }
                    if let Some(rendered) = state.apply(&delta) {
                        text.push_str(&rendered);
                        if sink.content(&rendered).await.is_err() {
                            return Ok(PassOutcome::Cancelled);
                        }
                    }
                }
                IdeStreamEvent::Done(done) => {
                    if !done.finish_reason.is_empty() {
                        finish_reason = Some(done.finish_reason);
                    }
                    break;
                }
                IdeStreamEvent::Queued(wait) => {
                    if let Some(delay) = queue_retries.next_delay() {
                        info!(
                            position = wait.position,
                            queue_id = %wait.queue_id,
                            retry = queue_retries.used(),
                            "request queued upstream, reconnecting"
                        );
                        drop(frames);
                        if !wait_unless_cancelled(delay, sink.closed()).await {
                            return Ok(PassOutcome::Cancelled);
                        }
                        frames = tokio::select! {
                            opened = self.upstream.open_chat(upstream_request) => opened?,
                            _ = sink.closed() => return Ok(PassOutcome::Cancelled),
                        };
                        continue;
                    }

                    let due = last_notice
                        .map_or(true, |at| at.elapsed() >= self.queue.notice_interval);
                    if due {
                        last_notice = Some(Instant::now());
                        let notice = queue_notice(self.queue.notice_interval, wait.position);
                        if sink.queue_notice(&notice).await.is_err() {
                            return Ok(PassOutcome::Cancelled);
                        }
                    }
                }
                IdeStreamEvent::Error(error) => {
                    warn!(message = %error.message, code = ?error.code, "upstream error event");
                    if !sink.is_streaming() {
                        return Err(BridgeError::UpstreamError {
                            status: StatusCode::INTERNAL_SERVER_ERROR,
                            message: error.message,
                        });
                    }
                }
            }
        }

        Ok(PassOutcome::Finished {
            text,
            finish_reason,
        })
    }
}
