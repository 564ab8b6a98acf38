use super::{StoredTokens, TokenStore, TokenStoreError};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, info};

fn access_key(app_id: &str) -> String {
    format!("TOKEN:{}", app_id)
}

fn refresh_key(app_id: &str) -> String {
    format!("REFRESH_TOKEN:{}", app_id)
}

/// Seconds a value may live given its absolute expiry, or `None` when it
/// is unknown or already past.
fn ttl_secs(expire_at_ms: i64, now_ms: i64) -> Option<u64> {
    if expire_at_ms <= now_ms {
        return None;
    }
    Some(((expire_at_ms - now_ms) / 1000).max(1) as u64)
}

/// Converts a `PTTL` reply back into an absolute expiry. Negative replies
/// mean "no TTL" or "missing key".
fn expire_at(pttl_ms: i64, now_ms: i64) -> i64 {
    if pttl_ms > 0 {
        now_ms + pttl_ms
    } else {
        0
    }
}

impl From<redis::RedisError> for TokenStoreError {
    fn from(err: redis::RedisError) -> Self {
        TokenStoreError::Backend(err.to_string())
    }
}

/// Stores each token under its own key with a TTL matching its validity.
pub struct RedisTokenStore {
    connection: MultiplexedConnection,
    app_id: String,
}

impl RedisTokenStore {
    pub async fn connect(connection_string: &str, app_id: &str) -> Result<Self, TokenStoreError> {
        let client = redis::Client::open(connection_string)?;
        let connection = client.get_multiplexed_async_connection().await?;
        info!(app_id = %app_id, "connected to redis token store");
        Ok(Self {
            connection,
            app_id: app_id.to_string(),
        })
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn load(&self, now_ms: i64) -> Result<Option<StoredTokens>, TokenStoreError> {
        let mut con = self.connection.clone();
        let refresh_key = refresh_key(&self.app_id);
        let access_key = access_key(&self.app_id);

        let refresh_token: Option<String> = con.get(&refresh_key).await?;
        let Some(refresh_token) = refresh_token else {
            return Ok(None);
        };
        let refresh_pttl: i64 = con.pttl(&refresh_key).await?;

        let access_token: Option<String> = con.get(&access_key).await?;
        let access_pttl: i64 = match access_token {
            Some(_) => con.pttl(&access_key).await?,
            None => -2,
        };

        Ok(Some(StoredTokens {
            access_token: access_token.unwrap_or_default(),
            access_expire_at: expire_at(access_pttl, now_ms),
            refresh_token,
            refresh_expire_at: expire_at(refresh_pttl, now_ms),
        }))
    }

    async fn save(&self, tokens: &StoredTokens, now_ms: i64) -> Result<(), TokenStoreError> {
        let mut con = self.connection.clone();

        if let Some(ttl) = ttl_secs(tokens.access_expire_at, now_ms) {
            let _: () = con
                .set_ex(access_key(&self.app_id), &tokens.access_token, ttl)
                .await?;
        }
        match ttl_secs(tokens.refresh_expire_at, now_ms) {
            Some(ttl) => {
                let _: () = con
                    .set_ex(refresh_key(&self.app_id), &tokens.refresh_token, ttl)
                    .await?;
            }
            None => {
                let _: () = con
                    .set(refresh_key(&self.app_id), &tokens.refresh_token)
                    .await?;
            }
        }
        debug!(app_id = %self.app_id, "stored tokens in redis");
        Ok(())
    }
}
