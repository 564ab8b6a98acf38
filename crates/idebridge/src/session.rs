use idewire::apis::openai::Message;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Cache key for a conversation: a hash of its opening turn.
pub fn session_key(first: &Message) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}: {}\n", first.role, first.content.normalize()).as_bytes());
    hex::encode(hasher.finalize())
}

/// Maps opening turns to upstream session ids for the life of the process.
#[derive(Debug, Default)]
pub struct SessionCache {
    sessions: RwLock<HashMap<String, String>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_id(&self, first: &Message) -> String {
        let key = session_key(first);
        if let Some(id) = self.sessions.read().await.get(&key) {
            return id.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(key)
            .or_insert_with_key(|key| {
                let id = Uuid::new_v4().to_string();
                debug!(session_key = %key, session_id = %id, "new conversation session");
                id
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idewire::apis::openai::Role;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_same_opening_turn_same_session() {
        let cache = SessionCache::new();
        let a = cache.session_id(&Message::new(Role::User, "hello")).await;
        let b = cache.session_id(&Message::new(Role::User, "hello")).await;
        assert_eq!(a, b);
        assert_eq!(cache.sessions.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_role_and_content_both_matter() {
        let cache = SessionCache::new();
        let user = cache.session_id(&Message::new(Role::User, "hello")).await;
        let system = cache.session_id(&Message::new(Role::System, "hello")).await;
        let other = cache.session_id(&Message::new(Role::User, "hello!")).await;
        assert_ne!(user, system);
        assert_ne!(user, other);
        assert_eq!(cache.sessions.read().await.len(), 3);
    }

    #[test]
    fn test_key_uses_normalized_content() {
        let text = Message::new(Role::User, "describe");
        let parts: Message = serde_json::from_value(serde_json::json!({
            "role": "user",
            "content": [{"type": "text", "text": "describe"}]
        }))
        .unwrap();
        assert_eq!(session_key(&text), session_key(&parts));
        assert_eq!(session_key(&text).len(), 64);
    }

    #[tokio::test]
    async fn test_racing_lookups_converge() {
        let cache = Arc::new(SessionCache::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache.session_id(&Message::new(Role::User, "same opener")).await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }
}
