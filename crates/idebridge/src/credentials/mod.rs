//! Access/refresh token lifecycle against the upstream token endpoint.

use common::consts::{DEFAULT_EXCHANGE_TIMEOUT_SECS, TOKEN_REFRESH_MARGIN_MS};
use common::errors::BridgeError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::token_store::{StoredTokens, TokenStore};
use crate::utils::clock::Clock;
use crate::utils::tracing::redact;

pub mod exchange;

pub use exchange::{HttpTokenExchanger, TokenExchanger};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialState {
    pub access_token: String,
    /// Epoch milliseconds
    pub access_expire_at: i64,
    pub refresh_token: String,
    /// Epoch milliseconds, 0 when unknown
    pub refresh_expire_at: i64,
}

impl CredentialState {
    pub fn with_refresh_token(refresh_token: &str) -> Self {
        Self {
            refresh_token: refresh_token.to_string(),
            ..Self::default()
        }
    }

    fn needs_refresh(&self, now_ms: i64) -> bool {
        self.access_token.is_empty() || now_ms >= self.access_expire_at - TOKEN_REFRESH_MARGIN_MS
    }

    fn refresh_expired(&self, now_ms: i64) -> bool {
        self.refresh_expire_at > 0 && now_ms >= self.refresh_expire_at
    }

    fn access_still_valid(&self, now_ms: i64) -> bool {
        !self.access_token.is_empty() && now_ms < self.access_expire_at
    }

    fn to_stored(&self) -> StoredTokens {
        StoredTokens {
            access_token: self.access_token.clone(),
            access_expire_at: self.access_expire_at,
            refresh_token: self.refresh_token.clone(),
            refresh_expire_at: self.refresh_expire_at,
        }
    }
}

impl From<StoredTokens> for CredentialState {
    fn from(stored: StoredTokens) -> Self {
        Self {
            access_token: stored.access_token,
            access_expire_at: stored.access_expire_at,
            refresh_token: stored.refresh_token,
            refresh_expire_at: stored.refresh_expire_at,
        }
    }
}

enum Source {
    Static(String),
    Exchange {
        exchanger: Arc<dyn TokenExchanger>,
        store: Arc<dyn TokenStore>,
    },
}

pub struct CredentialManager {
    state: RwLock<CredentialState>,
    source: Source,
    clock: Arc<dyn Clock>,
    /// Bounds the whole two-step exchange, which runs under the write lock
    exchange_timeout: Duration,
}

impl CredentialManager {
    pub fn new(
        refresh_token: &str,
        exchanger: Arc<dyn TokenExchanger>,
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: RwLock::new(CredentialState::with_refresh_token(refresh_token)),
            source: Source::Exchange { exchanger, store },
            clock,
            exchange_timeout: Duration::from_secs(DEFAULT_EXCHANGE_TIMEOUT_SECS),
        }
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    /// A manager that always hands out `token` and never talks to the
    /// token endpoint.
    pub fn with_static_token(token: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(CredentialState {
                access_token: token.to_string(),
                ..CredentialState::default()
            }),
            source: Source::Static(token.to_string()),
            clock,
            exchange_timeout: Duration::from_secs(DEFAULT_EXCHANGE_TIMEOUT_SECS),
        }
    }

    /// Adopts tokens persisted by an earlier process, when the store has
    /// any. A store failure keeps the configured refresh token.
    pub async fn restore(&self) {
        let Source::Exchange { store, .. } = &self.source else {
            return;
        };
        let now = self.clock.now_millis();
        match store.load(now).await {
            Ok(Some(stored)) if !stored.refresh_token.is_empty() => {
                info!(
                    refresh_token = %redact(&stored.refresh_token),
                    refresh_expire_at = stored.refresh_expire_at,
                    "restored persisted tokens"
                );
                *self.state.write().await = stored.into();
            }
            Ok(_) => info!("no persisted tokens, using configured refresh token"),
            Err(err) => warn!(error = %err, "failed to load persisted tokens"),
        }
    }

    /// True once the refresh token's validity window has elapsed. This is
    /// terminal: only an operator supplying a new refresh token recovers.
    pub async fn is_expired(&self) -> bool {
        if matches!(self.source, Source::Static(_)) {
            return false;
        }
        self.state
            .read()
            .await
            .refresh_expired(self.clock.now_millis())
    }

    pub async fn snapshot(&self) -> CredentialState {
        self.state.read().await.clone()
    }

    /// Returns an access token that is good for at least the refresh
    /// margin, exchanging the refresh token first when needed.
    pub async fn ensure_fresh(&self) -> Result<String, BridgeError> {
        let (exchanger, store) = match &self.source {
            Source::Static(token) => return Ok(token.clone()),
            Source::Exchange { exchanger, store } => (exchanger, store),
        };

        {
            let state = self.state.read().await;
            let now = self.clock.now_millis();
            if state.refresh_expired(now) {
                return Err(BridgeError::CredentialExpired);
            }
            if !state.needs_refresh(now) {
                return Ok(state.access_token.clone());
            }
        }

        let mut state = self.state.write().await;
        // another task may have refreshed while we waited for the lock
        let now = self.clock.now_millis();
        if state.refresh_expired(now) {
            return Err(BridgeError::CredentialExpired);
        }
        if !state.needs_refresh(now) {
            return Ok(state.access_token.clone());
        }

        let exchanged = tokio::time::timeout(
            self.exchange_timeout,
            Self::exchange_pair(exchanger.as_ref(), &state.refresh_token),
        )
        .await
        .unwrap_or_else(|_| {
            Err(BridgeError::UpstreamUnavailable(format!(
                "token exchange timed out after {}s",
                self.exchange_timeout.as_secs()
            )))
        });
        match exchanged {
            Ok(refreshed) => {
                info!(
                    access_expire_at = refreshed.access_expire_at,
                    refresh_expire_at = refreshed.refresh_expire_at,
                    refresh_token = %redact(&refreshed.refresh_token),
                    "credentials refreshed"
                );
                *state = refreshed;
                let stored = state.to_stored();
                let token = state.access_token.clone();
                drop(state);

                if let Err(err) = store.save(&stored, now).await {
                    warn!(error = %err, "failed to persist refreshed tokens");
                }
                Ok(token)
            }
            Err(err) if state.access_still_valid(now) => {
                warn!(
                    error = %err,
                    access_expire_at = state.access_expire_at,
                    "refresh failed, continuing with the current access token"
                );
                Ok(state.access_token.clone())
            }
            Err(err) => {
                error!(error = %err, "refresh failed");
                Err(err)
            }
        }
    }

    /// Two chained exchanges: the held refresh token buys a new refresh
    /// token, which in turn buys the access token and the expiries.
    async fn exchange_pair(
        exchanger: &dyn TokenExchanger,
        refresh_token: &str,
    ) -> Result<CredentialState, BridgeError> {
        let rotated = exchanger.exchange(refresh_token).await?;
        let granted = exchanger.exchange(&rotated.refresh_token).await?;
        Ok(CredentialState {
            access_token: granted.token,
            access_expire_at: granted.token_expire_at,
            refresh_token: rotated.refresh_token,
            refresh_expire_at: granted.refresh_expire_at,
        })
    }

    /// Refreshes on a fixed period regardless of request traffic. The
    /// first tick fires one period after start.
    pub fn spawn_refresh_loop(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if self.is_expired().await {
                    error!("refresh token expired, waiting for an operator to rotate it");
                    continue;
                }
                if let Err(err) = self.ensure_fresh().await {
                    warn!(error = %err, "scheduled credential refresh failed");
                }
            }
        })
    }
}

#[cfg(test)]
pub mod testing {
    use super::TokenExchanger;
    use async_trait::async_trait;
    use common::errors::BridgeError;
    use idewire::apis::ide::TokenGrant;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted grants and records which refresh tokens were sent.
    #[derive(Default)]
    pub struct ScriptedExchanger {
        replies: Mutex<VecDeque<Result<TokenGrant, BridgeError>>>,
        pub seen: Mutex<Vec<String>>,
    }

    impl ScriptedExchanger {
        pub fn new(replies: Vec<Result<TokenGrant, BridgeError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::default(),
            }
        }

        pub fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    /// Never answers.
    pub struct StalledExchanger;

    #[async_trait]
    impl TokenExchanger for StalledExchanger {
        async fn exchange(&self, _refresh_token: &str) -> Result<TokenGrant, BridgeError> {
            std::future::pending().await
        }
    }

    pub fn grant(token: &str, token_expire_at: i64, refresh: &str, refresh_expire_at: i64) -> TokenGrant {
        TokenGrant {
            token: token.to_string(),
            token_expire_at,
            refresh_token: refresh.to_string(),
            refresh_expire_at,
        }
    }

    #[async_trait]
    impl TokenExchanger for ScriptedExchanger {
        async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, BridgeError> {
            self.seen.lock().unwrap().push(refresh_token.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BridgeError::UpstreamUnavailable("no reply scripted".into())))
        }
    }
}
