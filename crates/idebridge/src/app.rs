use common::configuration::Configuration;
use common::errors::ConfigError;
use std::sync::Arc;

use crate::credentials::CredentialManager;
use crate::reassembler::{ChatPipeline, ContinuationPolicy, QueuePolicy};
use crate::session::SessionCache;
use crate::translator::RequestTranslator;
use crate::upstream::ChatUpstream;
use crate::utils::clock::Clock;

/// Everything a request handler needs, shared across connections.
pub struct AppState {
    pub auth_token: Option<String>,
    pub credentials: Arc<CredentialManager>,
    pub upstream: Arc<dyn ChatUpstream>,
    pub pipeline: ChatPipeline,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        config: &Configuration,
        credentials: Arc<CredentialManager>,
        upstream: Arc<dyn ChatUpstream>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let version_code: u32 = config.upstream.ide_version_code.parse().map_err(|_| {
            ConfigError::InvalidValue {
                name: "upstream.ide_version_code".to_string(),
                value: config.upstream.ide_version_code.clone(),
            }
        })?;

        let translator = RequestTranslator::new(
            Arc::new(SessionCache::new()),
            clock.clone(),
            &config.locale,
            version_code,
        );
        let pipeline = ChatPipeline::new(
            translator,
            upstream.clone(),
            QueuePolicy::from(&config.queue),
            ContinuationPolicy::from(&config.continuation),
        );

        Ok(Self {
            auth_token: config.auth_token.clone().filter(|token| !token.is_empty()),
            credentials,
            upstream,
            pipeline,
            clock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::testing::ScriptedUpstream;
    use crate::utils::clock::testing::ManualClock;

    fn build(config: &Configuration) -> Result<AppState, ConfigError> {
        let clock = Arc::new(ManualClock::at(0));
        AppState::new(
            config,
            Arc::new(CredentialManager::with_static_token("tok", clock.clone())),
            Arc::new(ScriptedUpstream::default()),
            clock,
        )
    }

    #[test]
    fn test_version_code_must_be_numeric() {
        let mut config = Configuration::default();
        assert!(build(&config).is_ok());

        config.upstream.ide_version_code = "2025-03".to_string();
        assert!(matches!(
            build(&config),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_blank_auth_token_disables_auth() {
        let mut config = Configuration::default();
        config.auth_token = Some(String::new());
        assert_eq!(build(&config).unwrap().auth_token, None);
    }
}
