//! Wire types for the IDE chat backend: the translated chat request, the
//! token exchange, the model catalog and the events of the chat stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::ApiDefinition;
use crate::{IDE_CHAT_PATH, IDE_EXCHANGE_TOKEN_PATH, IDE_MODEL_LIST_PATH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdeApi {
    Chat,
    ModelList,
    ExchangeToken,
}

impl ApiDefinition for IdeApi {
    fn endpoint(&self) -> &'static str {
        match self {
            IdeApi::Chat => IDE_CHAT_PATH,
            IdeApi::ModelList => IDE_MODEL_LIST_PATH,
            IdeApi::ExchangeToken => IDE_EXCHANGE_TOKEN_PATH,
        }
    }

    fn from_endpoint(endpoint: &str) -> Option<Self> {
        match endpoint {
            IDE_CHAT_PATH => Some(IdeApi::Chat),
            IDE_MODEL_LIST_PATH => Some(IdeApi::ModelList),
            IDE_EXCHANGE_TOKEN_PATH => Some(IdeApi::ExchangeToken),
            _ => None,
        }
    }
}

// ============================================================================
// CHAT REQUEST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextResolver {
    pub resolver_id: String,
    /// JSON document encoded as a string
    pub variables: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatHistoryEntry {
    pub role: String,
    pub content: String,
    pub status: String,
    pub locale: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastLlmResponseInfo {
    pub turn: usize,
    pub is_error: bool,
    pub response: String,
}

/// The `variables` payload. It travels as a JSON string inside
/// [`IdeChatRequest::variables`], not as a nested object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatVariables {
    pub language: String,
    pub locale: String,
    pub input: String,
    pub version_code: u32,
    pub is_inline_chat: bool,
    pub is_command: bool,
    pub raw_input: String,
    pub problem: String,
    pub current_filename: String,
    pub is_select_code_before_chat: bool,
    pub last_select_time: i64,
    pub last_turn_session: String,
    pub hash_workspace: bool,
    pub hash_file: u32,
    pub hash_code: u32,
    pub use_filepath: bool,
    pub current_time: String,
    pub badge_clickable: bool,
    pub workspace_path: String,
    pub brand: String,
    pub system_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeChatRequest {
    pub user_input: String,
    pub intent_name: String,
    pub variables: String,
    pub context_resolvers: Vec<ContextResolver>,
    pub generate_suggested_questions: bool,
    pub chat_history: Vec<ChatHistoryEntry>,
    pub session_id: String,
    pub conversation_id: String,
    pub current_turn: usize,
    pub valid_turns: Vec<usize>,
    pub multi_media: Vec<Value>,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_llm_response_info: Option<LastLlmResponseInfo>,
    pub is_preset: bool,
    pub provider: String,
}

// ============================================================================
// MODEL CATALOG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeModelConfig {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub multimodal: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IdeModelList {
    #[serde(default)]
    pub model_configs: Vec<IdeModelConfig>,
}

// ============================================================================
// TOKEN EXCHANGE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenExchangeRequest {
    #[serde(rename = "ClientID")]
    pub client_id: String,
    #[serde(rename = "RefreshToken")]
    pub refresh_token: String,
    #[serde(rename = "ClientSecret")]
    pub client_secret: String,
    #[serde(rename = "UserID")]
    pub user_id: String,
}

impl TokenExchangeRequest {
    pub fn new(client_id: &str, refresh_token: &str, user_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            refresh_token: refresh_token.to_string(),
            client_secret: "-".to_string(),
            user_id: user_id.to_string(),
        }
    }
}

/// Token pair issued by one exchange. Expiries are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    #[serde(rename = "Token")]
    pub token: String,
    #[serde(rename = "TokenExpireAt")]
    pub token_expire_at: i64,
    #[serde(rename = "RefreshToken")]
    pub refresh_token: String,
    #[serde(rename = "RefreshExpireAt")]
    pub refresh_expire_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenExchangeResponse {
    #[serde(rename = "Result")]
    pub result: TokenGrant,
}

// ============================================================================
// CHAT STREAM EVENTS
// ============================================================================

pub const QUEUE_EVENT: &str = "request_wait_in_queue";
pub const OUTPUT_EVENT: &str = "output";
pub const DONE_EVENT: &str = "done";
pub const ERROR_EVENT: &str = "error";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueueWait {
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub queue_id: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputDelta {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub reasoning_content: String,
    #[serde(default)]
    pub finish_reason: String,
}

impl OutputDelta {
    pub fn reasoning(&self) -> Option<&str> {
        non_empty(&self.reasoning_content)
    }

    pub fn answer(&self) -> Option<&str> {
        non_empty(&self.response)
    }

    pub fn finish_reason(&self) -> Option<&str> {
        non_empty(&self.finish_reason)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DoneData {
    #[serde(default)]
    pub finish_reason: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorData {
    #[serde(default, alias = "error")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed `{event}` frame: {source}")]
    Malformed {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One recognized event of the upstream chat stream.
#[derive(Debug, Clone, PartialEq)]
pub enum IdeStreamEvent {
    Queued(QueueWait),
    Output(OutputDelta),
    Done(DoneData),
    Error(ErrorData),
}

impl IdeStreamEvent {
    /// Decodes one `event:`/`data:` pair.
    ///
    /// Returns `Ok(None)` for event kinds the bridge does not handle and an
    /// error when a recognized event carries an unparseable payload.
    pub fn parse(event: &str, data: &str) -> Result<Option<Self>, FrameError> {
        fn decode<T: for<'de> Deserialize<'de>>(event: &str, data: &str) -> Result<T, FrameError> {
            serde_json::from_str(data).map_err(|source| FrameError::Malformed {
                event: event.to_string(),
                source,
            })
        }

        let parsed = match event {
            QUEUE_EVENT => IdeStreamEvent::Queued(decode(event, data)?),
            OUTPUT_EVENT => IdeStreamEvent::Output(decode(event, data)?),
            DONE_EVENT => IdeStreamEvent::Done(decode(event, data)?),
            ERROR_EVENT => IdeStreamEvent::Error(decode(event, data)?),
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }
}
