//! Short-term session memory — per-session key/value with TTL, managed
//! under an LRU bound across sessions.
//!
//! A [`SessionStore`] holds opaque JSON values with optional expiry. The
//! [`ShortTermMemory`] manager owns one store per session id plus an
//! access-time index; the index serializes independently of the session
//! maps so eviction never observes a half-written session.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use switchyard_core::session::SessionMemory;

/// How often the background tick re-runs the overflow check.
const TICK_INTERVAL: Duration = Duration::from_secs(5 * 60);

struct StoredValue {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// One session's key/value store.
pub struct SessionStore {
    entries: RwLock<HashMap<String, StoredValue>>,
}

impl SessionStore {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionMemory for SessionStore {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        // Lazy purge: an expired entry reads as absent and is dropped.
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(stored) if !stored.expired() => return Some(stored.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().await.remove(key);
        None
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) {
        let stored = StoredValue {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.entries.write().await.insert(key.to_string(), stored);
    }

    async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// The cross-session manager: session-id → store, bounded by LRU eviction.
pub struct ShortTermMemory {
    max_sessions: usize,
    sessions: Arc<RwLock<HashMap<String, Arc<SessionStore>>>>,
    /// Access-time index. Serialized independently of `sessions`.
    access: Arc<Mutex<HashMap<String, Instant>>>,
    tick: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ShortTermMemory {
    /// Create a manager holding at most `max_sessions` sessions.
    pub fn new(max_sessions: usize) -> Self {
        Self {
            max_sessions: max_sessions.max(1),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            access: Arc::new(Mutex::new(HashMap::new())),
            tick: std::sync::Mutex::new(None),
        }
    }

    /// Start the background tick that re-runs the overflow check.
    pub fn start(&self) {
        let sessions = self.sessions.clone();
        let access = self.access.clone();
        let max_sessions = self.max_sessions;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.tick().await; // the first tick fires immediately
            loop {
                interval.tick().await;
                Self::evict_overflow(&sessions, &access, max_sessions).await;
            }
        });

        *self.tick.lock().unwrap() = Some(handle);
    }

    /// Get the store for a session, creating it on first access.
    ///
    /// Touches the access time. When creation would exceed `max_sessions`,
    /// the oldest 10% of sessions (rounded up, minimum 1) are evicted first.
    pub async fn session(&self, session_id: &str) -> Arc<SessionStore> {
        self.access
            .lock()
            .await
            .insert(session_id.to_string(), Instant::now());

        {
            let sessions = self.sessions.read().await;
            if let Some(store) = sessions.get(session_id) {
                return store.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        // Re-check under the write lock; a racing caller may have created it.
        if let Some(store) = sessions.get(session_id) {
            return store.clone();
        }

        if sessions.len() >= self.max_sessions {
            let mut access = self.access.lock().await;
            Self::evict_locked(&mut sessions, &mut access, self.max_sessions);
        }

        let store = Arc::new(SessionStore::new());
        sessions.insert(session_id.to_string(), store.clone());
        debug!(session_id, total = sessions.len(), "Created short-term session");
        store
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Destroy a single session explicitly.
    pub async fn destroy_session(&self, session_id: &str) -> bool {
        self.access.lock().await.remove(session_id);
        self.sessions.write().await.remove(session_id).is_some()
    }

    /// Abort the tick and drop everything. Called on process shutdown.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.tick.lock().unwrap().take() {
            handle.abort();
        }
        self.access.lock().await.clear();
        let mut sessions = self.sessions.write().await;
        let dropped = sessions.len();
        sessions.clear();
        info!(dropped, "Short-term memory shut down");
    }

    async fn evict_overflow(
        sessions: &RwLock<HashMap<String, Arc<SessionStore>>>,
        access: &Mutex<HashMap<String, Instant>>,
        max_sessions: usize,
    ) {
        let mut sessions = sessions.write().await;
        if sessions.len() < max_sessions {
            return;
        }
        let mut access = access.lock().await;
        Self::evict_locked(&mut sessions, &mut access, max_sessions);
    }

    fn evict_locked(
        sessions: &mut HashMap<String, Arc<SessionStore>>,
        access: &mut HashMap<String, Instant>,
        max_sessions: usize,
    ) {
        // Bottom 10% by access time, rounded up, at least one.
        let count = (max_sessions.div_ceil(10)).max(1);

        let mut by_age: Vec<(String, Instant)> = sessions
            .keys()
            .map(|id| {
                let at = access.get(id).copied().unwrap_or_else(Instant::now);
                (id.clone(), at)
            })
            .collect();
        by_age.sort_by_key(|(_, at)| *at);

        for (id, _) in by_age.into_iter().take(count) {
            sessions.remove(&id);
            access.remove(&id);
        }
        debug!(evicted = count, remaining = sessions.len(), "LRU eviction");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get() {
        let store = SessionStore::new();
        store
            .set("color", serde_json::json!("blue"), None)
            .await;
        assert_eq!(store.get("color").await, Some(serde_json::json!("blue")));
        assert_eq!(store.get("missing").await, None);
    }

    #[tokio::test]
    async fn set_overwrites() {
        let store = SessionStore::new();
        store.set("k", serde_json::json!(1), None).await;
        store.set("k", serde_json::json!(2), None).await;
        assert_eq!(store.get("k").await, Some(serde_json::json!(2)));
    }

    #[tokio::test]
    async fn ttl_expiry_reads_as_absent() {
        let store = SessionStore::new();
        store
            .set("k", serde_json::json!("v"), Some(Duration::from_millis(20)))
            .await;
        assert!(store.get("k").await.is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let store = SessionStore::new();
        store.set("a", serde_json::json!(1), None).await;
        store.set("b", serde_json::json!(2), None).await;
        store.clear().await;
        assert_eq!(store.get("a").await, None);
        assert_eq!(store.get("b").await, None);
    }

    #[tokio::test]
    async fn sessions_created_on_first_access() {
        let mgr = ShortTermMemory::new(10);
        assert_eq!(mgr.session_count().await, 0);
        mgr.session("s1").await;
        mgr.session("s1").await;
        mgr.session("s2").await;
        assert_eq!(mgr.session_count().await, 2);
    }

    #[tokio::test]
    async fn same_session_returns_same_store() {
        let mgr = ShortTermMemory::new(10);
        let store = mgr.session("s1").await;
        store.set("k", serde_json::json!("v"), None).await;

        let again = mgr.session("s1").await;
        assert_eq!(again.get("k").await, Some(serde_json::json!("v")));
    }

    #[tokio::test]
    async fn lru_bound_never_exceeded() {
        let mgr = ShortTermMemory::new(10);
        for i in 0..50 {
            mgr.session(&format!("s{i}")).await;
            assert!(mgr.session_count().await <= 10);
        }
    }

    #[tokio::test]
    async fn oldest_sessions_evicted_first() {
        let mgr = ShortTermMemory::new(5);
        for i in 0..5 {
            mgr.session(&format!("s{i}")).await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // Touch s0 so s1 becomes the oldest.
        mgr.session("s0").await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        // Creating a sixth session evicts ceil(5/10).max(1) = 1 session: s1.
        mgr.session("s5").await;
        let sessions = mgr.sessions.read().await;
        assert!(sessions.contains_key("s0"));
        assert!(!sessions.contains_key("s1"));
        assert!(sessions.contains_key("s5"));
    }

    #[tokio::test]
    async fn destroy_session_removes_store() {
        let mgr = ShortTermMemory::new(10);
        mgr.session("s1").await;
        assert!(mgr.destroy_session("s1").await);
        assert!(!mgr.destroy_session("s1").await);
        assert_eq!(mgr.session_count().await, 0);
    }

    #[tokio::test]
    async fn shutdown_clears_everything() {
        let mgr = ShortTermMemory::new(10);
        mgr.start();
        mgr.session("s1").await;
        mgr.session("s2").await;
        mgr.shutdown().await;
        assert_eq!(mgr.session_count().await, 0);
    }
}
