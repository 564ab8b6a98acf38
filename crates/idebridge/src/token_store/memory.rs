use super::{StoredTokens, TokenStore, TokenStoreError};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

/// Keeps tokens for the lifetime of the process only.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Option<StoredTokens>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self, _now_ms: i64) -> Result<Option<StoredTokens>, TokenStoreError> {
        Ok(self.tokens.read().await.clone())
    }

    async fn save(&self, tokens: &StoredTokens, _now_ms: i64) -> Result<(), TokenStoreError> {
        debug!(
            access_expire_at = tokens.access_expire_at,
            refresh_expire_at = tokens.refresh_expire_at,
            "storing tokens in memory"
        );
        *self.tokens.write().await = Some(tokens.clone());
        Ok(())
    }
}
