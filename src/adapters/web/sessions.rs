//! Browser sessions keyed by cookie

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use tokio::sync::Mutex;
use uuid::Uuid;
use crate::chat::ChatSession;

pub const COOKIE_NAME: &str = "gmail_chat_session";

struct Entry {
    session: Arc<Mutex<ChatSession>>,
    last_seen: Instant,
}

/// Live sessions; idle ones are torn down
pub struct SessionStore {
    default_model: String,
    idle: Duration,
    sessions: Mutex<HashMap<Uuid, Entry>>,
}

impl SessionStore {
    pub fn new(default_model: impl Into<String>, idle: Duration) -> Self {
        Self {
            default_model: default_model.into(),
            idle,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Look up the session for `id`, starting a new one if it is unknown
    ///
    /// Returns the id actually in use and whether it is new.
    pub async fn get_or_create(&self, id: Option<Uuid>) -> (Uuid, Arc<Mutex<ChatSession>>, bool) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;

        if let Some(id) = id {
            if let Some(entry) = sessions.get_mut(&id) {
                if now.duration_since(entry.last_seen) < self.idle {
                    entry.last_seen = now;
                    return (id, entry.session.clone(), false);
                }
            }
            sessions.remove(&id);
        }

        let id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(ChatSession::new(self.default_model.clone())));
        sessions.insert(id, Entry { session: session.clone(), last_seen: now });
        tracing::debug!("Started session {}, {} live", id, sessions.len());
        (id, session, true)
    }

    /// Drop sessions idle longer than the configured period
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) < self.idle);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!("Evicted {} idle session(s)", evicted);
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// Session id from the request cookie, if present and well formed
pub fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix(COOKIE_NAME)?.strip_prefix('='))
        .find_map(|value| Uuid::parse_str(value.trim()).ok())
}

/// `Set-Cookie` value for a session id
pub fn session_cookie(id: Uuid) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", COOKIE_NAME, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_same_id_same_session() {
        let store = SessionStore::new("gpt-4o", Duration::from_secs(60));
        let (id, first, created) = store.get_or_create(None).await;
        assert!(created);

        let (again, second, created) = store.get_or_create(Some(id)).await;
        assert!(!created);
        assert_eq!(again, id);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.lock().await.model(), "gpt-4o");
    }

    #[tokio::test]
    async fn test_unknown_id_gets_fresh_session() {
        let store = SessionStore::new("gpt-4o", Duration::from_secs(60));
        let stale = Uuid::new_v4();
        let (id, _, created) = store.get_or_create(Some(stale)).await;
        assert!(created);
        assert_ne!(id, stale);
    }

    #[tokio::test]
    async fn test_idle_sessions_evicted() {
        let store = SessionStore::new("gpt-4o", Duration::ZERO);
        store.get_or_create(None).await;
        store.get_or_create(None).await;
        assert_eq!(store.evict_idle().await, 2);
        assert_eq!(store.len().await, 0);
    }

    #[test]
    fn test_cookie_parsing() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {}={}", COOKIE_NAME, id)).unwrap(),
        );
        assert_eq!(session_id(&headers), Some(id));

        let mut bad = HeaderMap::new();
        bad.insert(COOKIE, HeaderValue::from_static("gmail_chat_session=nope"));
        assert_eq!(session_id(&bad), None);
        assert_eq!(session_id(&HeaderMap::new()), None);
    }

    #[test]
    fn test_cookie_is_http_only() {
        let cookie = session_cookie(Uuid::nil());
        assert!(cookie.starts_with("gmail_chat_session=00000000-"));
        assert!(cookie.contains("HttpOnly"));
    }
}
