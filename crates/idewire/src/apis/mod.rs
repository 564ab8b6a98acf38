pub mod ide;
pub mod openai;
pub mod sse;

pub use ide::{IdeApi, IdeChatRequest, IdeStreamEvent};
pub use openai::{
    ChatCompletionsRequest, ChatCompletionsResponse, ChatCompletionsStreamResponse, Message,
    MessageContent, OpenAIApi, Role,
};

pub trait ApiDefinition {
    /// Returns the endpoint path for this API
    fn endpoint(&self) -> &'static str;

    /// Creates an API instance from an endpoint path
    fn from_endpoint(endpoint: &str) -> Option<Self>
    where
        Self: Sized;
}
