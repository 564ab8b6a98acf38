//! idewire: wire types for the OpenAI-compatible inbound API and the IDE
//! upstream chat protocol, plus the model alias table shared by both sides.

pub mod apis;
pub mod models;

pub use apis::ide::{FrameError, IdeStreamEvent};
pub use apis::sse::SseEvent;
pub use apis::{ApiDefinition, IdeApi, OpenAIApi};

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const MODELS_PATH: &str = "/v1/models";

pub const IDE_CHAT_PATH: &str = "/api/ide/v1/chat";
pub const IDE_MODEL_LIST_PATH: &str = "/api/ide/v1/model_list";
pub const IDE_EXCHANGE_TOKEN_PATH: &str = "/cloudide/api/v3/trae/oauth/ExchangeToken";
