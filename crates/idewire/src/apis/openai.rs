use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::ApiDefinition;
use crate::{CHAT_COMPLETIONS_PATH, MODELS_PATH};

/// Inbound OpenAI-compatible surfaces served by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIApi {
    ChatCompletions,
    Models,
}

impl ApiDefinition for OpenAIApi {
    fn endpoint(&self) -> &'static str {
        match self {
            OpenAIApi::ChatCompletions => CHAT_COMPLETIONS_PATH,
            OpenAIApi::Models => MODELS_PATH,
        }
    }

    fn from_endpoint(endpoint: &str) -> Option<Self> {
        match endpoint {
            CHAT_COMPLETIONS_PATH => Some(OpenAIApi::ChatCompletions),
            MODELS_PATH => Some(OpenAIApi::Models),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool,
    /// Any other role (`function`, vendor extensions) is forwarded verbatim
    #[serde(untagged)]
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::Developer => "developer",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::Other(role) => role,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of a multimodal content array. Only the text is ever
/// forwarded upstream; the remaining fields are retained so a request can be
/// re-serialized unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub part_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Message content as clients send it: a plain string, an array of typed
/// parts, or anything else a lenient client might produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
    Other(Value),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl MessageContent {
    /// Flattens the content to the plain text the upstream accepts.
    ///
    /// Arrays contribute only the text of their first element; an array
    /// whose first element carries no text yields an empty string. Any
    /// other JSON value is stringified.
    pub fn normalize(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .first()
                .and_then(|part| part.text.clone())
                .unwrap_or_default(),
            MessageContent::Other(value) => match value {
                Value::Null => String::new(),
                Value::String(text) => text.clone(),
                Value::Array(items) => items
                    .first()
                    .and_then(|item| item.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                other => other.to_string(),
            },
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatCompletionsRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionsResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl ChatCompletionsResponse {
    pub fn new(id: String, created: i64, model: String, content: String, finish_reason: String) -> Self {
        Self {
            id,
            object: "chat.completion".to_string(),
            created,
            model,
            choices: vec![Choice {
                index: 0,
                message: ResponseMessage {
                    role: Role::Assistant,
                    content,
                },
                finish_reason,
            }],
            usage: Usage::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionsStreamResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
}

impl ChatCompletionsStreamResponse {
    fn chunk(id: &str, created: i64, model: &str, delta: Delta, finish_reason: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            object: "chat.completion.chunk".to_string(),
            created,
            model: model.to_string(),
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }

    /// A chunk carrying one content fragment.
    pub fn content(id: &str, created: i64, model: &str, content: &str) -> Self {
        let delta = Delta {
            role: Some(Role::Assistant),
            content: Some(content.to_string()),
        };
        Self::chunk(id, created, model, delta, None)
    }

    /// A content fragment with no role, for status text that is not part
    /// of the answer.
    pub fn notice(id: &str, created: i64, model: &str, text: &str) -> Self {
        let delta = Delta {
            role: None,
            content: Some(text.to_string()),
        };
        Self::chunk(id, created, model, delta, None)
    }

    /// The closing chunk: an empty delta plus the finish reason.
    pub fn finish(id: &str, created: i64, model: &str, finish_reason: &str) -> Self {
        Self::chunk(id, created, model, Delta::default(), Some(finish_reason.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelObject {
    #[serde(rename = "list")]
    List,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDetail {
    pub id: String,
    pub object: String,
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Models {
    pub object: ModelObject,
    pub data: Vec<ModelDetail>,
}

impl Models {
    pub fn from_ids<I, S>(ids: I, created: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Models {
            object: ModelObject::List,
            data: ids
                .into_iter()
                .map(|id| ModelDetail {
                    id: id.into(),
                    object: "model".to_string(),
                    created,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_request_with_string_content() {
        let request: ChatCompletionsRequest = serde_json::from_value(json!({
            "model": "claude-3-7",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();

        assert_eq!(request.model, "claude-3-7");
        assert!(!request.stream);
        assert_eq!(request.temperature, None);
        assert_eq!(request.messages[0].role, Role::User);
        assert_eq!(request.messages[0].content.normalize(), "hi");
    }

    #[test]
    fn test_unknown_roles_pass_through() {
        let message: Message = serde_json::from_value(json!({
            "role": "function",
            "content": "42"
        }))
        .unwrap();

        assert_eq!(message.role, Role::Other("function".to_string()));
        assert_eq!(message.role.to_string(), "function");
        assert_eq!(serde_json::to_value(&message.role).unwrap(), json!("function"));
        assert_eq!(serde_json::to_value(Role::Tool).unwrap(), json!("tool"));
    }

    #[test]
    fn test_multimodal_content_keeps_first_text() {
        let message: Message = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "describe this"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
            ]
        }))
        .unwrap();

        assert!(matches!(message.content, MessageContent::Parts(_)));
        assert_eq!(message.content.normalize(), "describe this");
    }

    #[test]
    fn test_multimodal_content_without_leading_text_is_empty() {
        let message: Message = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {"type": "image_url", "image_url": {"url": "https://example.com/a.png"}},
                {"type": "text", "text": "ignored"}
            ]
        }))
        .unwrap();

        assert_eq!(message.content.normalize(), "");
    }

    #[test]
    fn test_other_content_is_stringified() {
        let message: Message =
            serde_json::from_value(json!({"role": "user", "content": {"k": 1}})).unwrap();
        assert_eq!(message.content.normalize(), r#"{"k":1}"#);

        let message: Message =
            serde_json::from_value(json!({"role": "assistant", "content": 42})).unwrap();
        assert_eq!(message.content.normalize(), "42");

        let message: Message =
            serde_json::from_value(json!({"role": "assistant", "content": null})).unwrap();
        assert_eq!(message.content.normalize(), "");

        let message: Message = serde_json::from_value(json!({"role": "assistant"})).unwrap();
        assert_eq!(message.content.normalize(), "");
    }

    #[test]
    fn test_completion_shape() {
        let response = ChatCompletionsResponse::new(
            "chatcmpl-1".to_string(),
            1700000000,
            "claude-3-7".to_string(),
            "hello".to_string(),
            "stop".to_string(),
        );

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "created": 1700000000,
                "model": "claude-3-7",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "hello"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0}
            })
        );
    }

    #[test]
    fn test_stream_chunks() {
        let chunk = ChatCompletionsStreamResponse::content("chatcmpl-1", 1, "gpt-4o", "He");
        assert_eq!(
            serde_json::to_value(&chunk).unwrap()["choices"][0],
            json!({"index": 0, "delta": {"role": "assistant", "content": "He"}, "finish_reason": null})
        );

        let notice = ChatCompletionsStreamResponse::notice("chatcmpl-1", 1, "gpt-4o", "wait");
        assert_eq!(
            serde_json::to_value(&notice).unwrap()["choices"][0]["delta"],
            json!({"content": "wait"})
        );

        let last = ChatCompletionsStreamResponse::finish("chatcmpl-1", 1, "gpt-4o", "length");
        assert_eq!(
            serde_json::to_value(&last).unwrap()["choices"][0],
            json!({"index": 0, "delta": {}, "finish_reason": "length"})
        );
    }

    #[test]
    fn test_models_listing() {
        let models = Models::from_ids(["claude-3-7-sonnet", "gpt-4o"], 5);
        assert_eq!(
            serde_json::to_value(&models).unwrap(),
            json!({
                "object": "list",
                "data": [
                    {"id": "claude-3-7-sonnet", "object": "model", "created": 5},
                    {"id": "gpt-4o", "object": "model", "created": 5}
                ]
            })
        );
    }
}
