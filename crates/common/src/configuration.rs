use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::consts::{
    DEFAULT_BASE_URL, DEFAULT_BIND_ADDRESS, DEFAULT_CONTINUE_PROMPT, DEFAULT_EXCHANGE_TIMEOUT_SECS,
    DEFAULT_LOCALE,
};
use crate::errors::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Upstream {
    pub base_url: String,
    pub app_id: String,
    pub client_id: String,
    pub user_id: String,
    pub refresh_token: Option<String>,
    /// Fixed upstream token; when set no token exchange ever happens
    pub static_token: Option<String>,
    pub ide_version: String,
    pub ide_version_code: String,
    pub ide_version_type: String,
    pub refresh_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Bound on one token refresh; requests wait on it while it runs
    pub exchange_timeout_secs: u64,
}

impl Default for Upstream {
    fn default() -> Self {
        Upstream {
            base_url: DEFAULT_BASE_URL.to_string(),
            app_id: String::new(),
            client_id: String::new(),
            user_id: String::new(),
            refresh_token: None,
            static_token: None,
            ide_version: "1.2.10".to_string(),
            ide_version_code: "20250325".to_string(),
            ide_version_type: "stable".to_string(),
            refresh_interval_secs: 300,
            request_timeout_secs: 600,
            exchange_timeout_secs: DEFAULT_EXCHANGE_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Device {
    pub rotate: bool,
    pub base_use_limit: u32,
    /// Exclusive upper bound of the random jitter added to `base_use_limit`
    pub use_limit_jitter: u32,
}

impl Default for Device {
    fn default() -> Self {
        Device {
            rotate: false,
            base_use_limit: 3,
            use_limit_jitter: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Continuation {
    pub enabled: bool,
    pub max_attempts: u32,
    pub prompt: String,
}

impl Default for Continuation {
    fn default() -> Self {
        Continuation {
            enabled: false,
            max_attempts: 5,
            prompt: DEFAULT_CONTINUE_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Queue {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub notice_interval_ms: u64,
}

impl Default for Queue {
    fn default() -> Self {
        Queue {
            max_retries: 3,
            retry_delay_ms: 3000,
            notice_interval_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreType {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct TokenStoreConfig {
    #[serde(rename = "type")]
    pub store_type: TokenStoreType,
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Configuration {
    pub bind_address: String,
    /// Bearer token inbound clients must present; unset disables the check
    pub auth_token: Option<String>,
    pub log_level: Option<String>,
    pub locale: String,
    pub upstream: Upstream,
    pub device: Device,
    pub continuation: Continuation,
    pub queue: Queue,
    pub token_store: TokenStoreConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            auth_token: None,
            log_level: None,
            locale: DEFAULT_LOCALE.to_string(),
            upstream: Upstream::default(),
            device: Device::default(),
            continuation: Continuation::default(),
            queue: Queue::default(),
            token_store: TokenStoreConfig::default(),
        }
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

impl Configuration {
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Configuration::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Reads the YAML file at `path`. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_yaml(&contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(Configuration::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Overlays environment variables on top of the file values. `env` is
    /// the lookup function, so callers can pass `std::env::var` or a fixture.
    pub fn apply_env<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| env(name).filter(|value| !value.trim().is_empty());

        if let Some(value) = var("BIND_ADDRESS") {
            self.bind_address = value;
        }
        if let Some(value) = var("BASE_URL") {
            self.upstream.base_url = value;
        }
        if let Some(value) = var("APP_ID") {
            self.upstream.app_id = value;
        }
        if let Some(value) = var("CLIENT_ID") {
            self.upstream.client_id = value;
        }
        if let Some(value) = var("USER_ID") {
            self.upstream.user_id = value;
        }
        if let Some(value) = var("REFRESH_TOKEN") {
            self.upstream.refresh_token = Some(value);
        }
        if let Some(value) = var("STATIC_TOKEN") {
            self.upstream.static_token = Some(value);
        }
        if let Some(value) = var("IDE_VERSION") {
            self.upstream.ide_version = value;
        }
        if let Some(value) = var("AUTH_TOKEN") {
            self.auth_token = Some(value);
        }
        if let Some(value) = var("AUTO_CONTINUE") {
            self.continuation.enabled = parse_flag("AUTO_CONTINUE", &value)?;
        }
        if let Some(value) = var("DEVICE_ROTATE") {
            self.device.rotate = parse_flag("DEVICE_ROTATE", &value)?;
        }
        if let Some(value) = var("REDIS_CONN_STRING") {
            self.token_store.store_type = TokenStoreType::Redis;
            self.token_store.connection_string = Some(value);
        }
        if let Some(value) = var("LOG_LEVEL") {
            self.log_level = Some(value);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_refresh = self
            .upstream
            .refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty());
        let has_static = self
            .upstream
            .static_token
            .as_deref()
            .is_some_and(|token| !token.is_empty());
        if !has_refresh && !has_static {
            return Err(ConfigError::Invalid(
                "either upstream.refresh_token or upstream.static_token must be set".to_string(),
            ));
        }
        if self.token_store.store_type == TokenStoreType::Redis
            && self.token_store.connection_string.is_none()
        {
            return Err(ConfigError::Invalid(
                "token_store.connection_string is required for the redis store".to_string(),
            ));
        }
        if self.upstream.base_url.is_empty() {
            return Err(ConfigError::Invalid("upstream.base_url is empty".to_string()));
        }
        if self.upstream.exchange_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "upstream.exchange_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.continuation.enabled && self.continuation.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "continuation.max_attempts must be at least 1 when continuation is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn uses_static_token(&self) -> bool {
        self.upstream
            .static_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}
