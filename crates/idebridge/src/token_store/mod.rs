//! Persistence for the rotating token pair, so a restarted bridge resumes
//! from the most recently issued refresh token instead of a stale one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod redis_store;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    /// Epoch milliseconds, 0 when unknown
    pub access_expire_at: i64,
    pub refresh_token: String,
    /// Epoch milliseconds, 0 when unknown
    pub refresh_expire_at: i64,
}

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("token store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Returns the persisted tokens, if any survive. `now_ms` lets backends
    /// that keep only a TTL reconstruct absolute expiries.
    async fn load(&self, now_ms: i64) -> Result<Option<StoredTokens>, TokenStoreError>;

    async fn save(&self, tokens: &StoredTokens, now_ms: i64) -> Result<(), TokenStoreError>;
}
