//! Inbound chat request to upstream IDE chat request.

use common::errors::BridgeError;
use idewire::apis::ide::{
    ChatHistoryEntry, ChatVariables, ContextResolver, IdeChatRequest, LastLlmResponseInfo,
};
use idewire::apis::openai::{ChatCompletionsRequest, Role};
use idewire::models;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use time::macros::{format_description, offset};
use time::{OffsetDateTime, UtcOffset, Weekday};
use tokio::sync::Mutex;
use tracing::debug;

use crate::session::SessionCache;
use crate::utils::clock::Clock;

const INTENT_NAME: &str = "general_qa_intent";
const HISTORY_STATUS: &str = "success";
/// The IDE reports wall-clock time in China Standard Time
const CLIENT_UTC_OFFSET: UtcOffset = offset!(+8);

const WORKSPACE_ROOTS: &[&str] = &["/User", "/home", "/workspace", "/data"];
const WORKSPACE_DIRS: &[&str] = &["projects", "workspace", "dev", "code", "work"];
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn context_resolvers() -> Vec<ContextResolver> {
    vec![
        ContextResolver {
            resolver_id: "project-labels".to_string(),
            variables: r#"{"labels":"- go\n- go.mod"}"#.to_string(),
        },
        ContextResolver {
            resolver_id: "terminal_context".to_string(),
            variables: r#"{"terminal_context":[]}"#.to_string(),
        },
    ]
}

fn weekday_zh(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Monday => "星期一",
        Weekday::Tuesday => "星期二",
        Weekday::Wednesday => "星期三",
        Weekday::Thursday => "星期四",
        Weekday::Friday => "星期五",
        Weekday::Saturday => "星期六",
        Weekday::Sunday => "星期日",
    }
}

/// `20250325 14:03:09，星期二` in UTC+8
fn format_current_time(now_ms: i64) -> String {
    let now = OffsetDateTime::from_unix_timestamp_nanos(now_ms as i128 * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .to_offset(CLIENT_UTC_OFFSET);
    let stamp = now
        .format(&format_description!(
            "[year][month][day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default();
    format!("{}，{}", stamp, weekday_zh(now.weekday()))
}

fn random_string(rng: &mut StdRng, charset: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| charset[rng.random_range(0..charset.len())] as char)
        .collect()
}

fn workspace_path(rng: &mut StdRng) -> String {
    let root = WORKSPACE_ROOTS[rng.random_range(0..WORKSPACE_ROOTS.len())];
    let user_len = rng.random_range(4..8);
    let mut user = random_string(rng, LOWERCASE, 1);
    user.push_str(&random_string(rng, ALPHANUMERIC, user_len - 1));
    let dir = WORKSPACE_DIRS[rng.random_range(0..WORKSPACE_DIRS.len())];
    let project_len = rng.random_range(6..11);
    let project = random_string(rng, ALPHANUMERIC, project_len);
    format!("{root}/{user}/Documents/{dir}/project-{project}")
}

pub struct RequestTranslator {
    sessions: Arc<SessionCache>,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    locale: String,
    version_code: u32,
}

impl RequestTranslator {
    pub fn new(
        sessions: Arc<SessionCache>,
        clock: Arc<dyn Clock>,
        locale: &str,
        version_code: u32,
    ) -> Self {
        Self::with_rng(sessions, clock, locale, version_code, StdRng::from_os_rng())
    }

    pub fn with_rng(
        sessions: Arc<SessionCache>,
        clock: Arc<dyn Clock>,
        locale: &str,
        version_code: u32,
        rng: StdRng,
    ) -> Self {
        Self {
            sessions,
            clock,
            rng: Mutex::new(rng),
            locale: locale.to_string(),
            version_code,
        }
    }

    pub async fn translate(
        &self,
        request: &ChatCompletionsRequest,
    ) -> Result<IdeChatRequest, BridgeError> {
        let Some((last, earlier)) = request.messages.split_last() else {
            return Err(BridgeError::InvalidRequest(
                "messages must not be empty".to_string(),
            ));
        };

        if !models::is_supported(&request.model) {
            return Err(BridgeError::UnsupportedModel(request.model.clone()));
        }
        let model_name = models::upstream_model_name(&request.model).to_string();

        let session_id = self.sessions.session_id(&request.messages[0]).await;
        let user_input = last.content.normalize();

        let chat_history: Vec<ChatHistoryEntry> = earlier
            .iter()
            .map(|message| ChatHistoryEntry {
                role: message.role.to_string(),
                content: message.content.normalize(),
                status: HISTORY_STATUS.to_string(),
                locale: if message.role == Role::Assistant {
                    self.locale.clone()
                } else {
                    String::new()
                },
                session_id: session_id.clone(),
            })
            .collect();

        let last_llm_response_info = chat_history
            .last()
            .filter(|entry| entry.role == Role::Assistant.as_str())
            .map(|entry| LastLlmResponseInfo {
                turn: chat_history.len() - 1,
                is_error: false,
                response: entry.content.clone(),
            });

        let workspace_path = workspace_path(&mut *self.rng.lock().await);
        let variables = ChatVariables {
            language: String::new(),
            locale: self.locale.clone(),
            input: user_input.clone(),
            version_code: self.version_code,
            is_inline_chat: false,
            is_command: false,
            raw_input: user_input.clone(),
            problem: String::new(),
            current_filename: String::new(),
            is_select_code_before_chat: false,
            last_select_time: 0,
            last_turn_session: if last_llm_response_info.is_some() {
                session_id.clone()
            } else {
                String::new()
            },
            hash_workspace: false,
            hash_file: 0,
            hash_code: 0,
            use_filepath: true,
            current_time: format_current_time(self.clock.now_millis()),
            badge_clickable: true,
            workspace_path,
            brand: "Trae".to_string(),
            system_type: "Windows".to_string(),
        };
        let variables = serde_json::to_string(&variables).map_err(|err| {
            BridgeError::InternalServerError(format!("failed to encode variables: {}", err))
        })?;

        debug!(
            model = %request.model,
            upstream_model = %model_name,
            session_id = %session_id,
            history = chat_history.len(),
            "translated chat request"
        );

        Ok(IdeChatRequest {
            user_input,
            intent_name: INTENT_NAME.to_string(),
            variables,
            context_resolvers: context_resolvers(),
            generate_suggested_questions: false,
            valid_turns: (0..chat_history.len()).collect(),
            current_turn: request.messages.len() - 1,
            chat_history,
            conversation_id: session_id.clone(),
            session_id,
            multi_media: Vec::new(),
            model_name,
            last_llm_response_info,
            is_preset: true,
            provider: String::new(),
        })
    }
}
