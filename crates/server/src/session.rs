//! Session management
//!
//! Sessions live in process memory keyed by an opaque id carried in a
//! signed cookie. Each session's state sits behind an async mutex so two
//! requests from the same browser run one after the other, while different
//! sessions proceed in parallel.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, MutexGuard};

use bankbot_config::SessionConfig;
use bankbot_core::SessionState;

/// One browser session
pub struct Session {
    pub id: String,
    state: Mutex<SessionState>,
    pub created_at: Instant,
    last_activity: RwLock<Instant>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            id: id.into(),
            state: Mutex::new(SessionState::default()),
            created_at: now,
            last_activity: RwLock::new(now),
        }
    }

    /// Lock the session state for the rest of the request
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.touch();
        self.state.lock().await
    }

    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    pub fn is_expired(&self, max_age: Duration) -> bool {
        self.idle_for() > max_age
    }
}

/// Outcome of resolving a cookie's session id
pub enum Lookup {
    Active(Arc<Session>),
    /// The id was issued by us but the session is gone
    Expired,
}

/// Session manager
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_age: Duration,
    cleanup_interval: Duration,
}

impl SessionManager {
    pub fn new(max_age: Duration, cleanup_interval: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_age,
            cleanup_interval,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            Duration::from_secs(config.max_age_seconds),
            Duration::from_secs(config.cleanup_interval_seconds.max(1)),
        )
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Start a background task that periodically evicts idle sessions.
    ///
    /// Returns a shutdown sender that stops the task.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.cleanup_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = manager.cleanup_expired();
                        if removed > 0 {
                            tracing::info!(
                                removed,
                                remaining = manager.count(),
                                "Evicted idle sessions"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Create a session with a fresh random id
    pub fn create(&self) -> Arc<Session> {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(&id));
        self.sessions.write().insert(id.clone(), session.clone());
        tracing::debug!(session_id = %id, "Created session");
        session
    }

    /// Resolve an id; idle sessions are dropped on access
    pub fn lookup(&self, id: &str) -> Lookup {
        let session = self.sessions.read().get(id).cloned();
        match session {
            Some(session) if !session.is_expired(self.max_age) => Lookup::Active(session),
            Some(_) => {
                self.remove(id);
                Lookup::Expired
            }
            None => Lookup::Expired,
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        match self.lookup(id) {
            Lookup::Active(session) => Some(session),
            Lookup::Expired => None,
        }
    }

    pub fn remove(&self, id: &str) {
        if self.sessions.write().remove(id).is_some() {
            tracing::debug!(session_id = %id, "Removed session");
        }
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Drop every session idle longer than the max age
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(self.max_age));
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get() {
        let manager = SessionManager::new(Duration::from_secs(60), Duration::from_secs(60));
        let session = manager.create();
        assert_eq!(manager.count(), 1);
        assert!(manager.get(&session.id).is_some());
        assert!(manager.get("unknown").is_none());

        manager.remove(&session.id);
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn test_idle_sessions_expire() {
        let manager = SessionManager::new(Duration::ZERO, Duration::from_secs(60));
        let session = manager.create();
        std::thread::sleep(Duration::from_millis(5));

        assert!(matches!(manager.lookup(&session.id), Lookup::Expired));
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn test_cleanup_expired() {
        let manager = SessionManager::new(Duration::ZERO, Duration::from_secs(60));
        manager.create();
        manager.create();
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(manager.cleanup_expired(), 2);
        assert_eq!(manager.count(), 0);
    }

    #[tokio::test]
    async fn test_state_is_shared_across_lookups() {
        let manager = SessionManager::new(Duration::from_secs(60), Duration::from_secs(60));
        let session = manager.create();
        session.lock().await.sf_chat_id = Some("a0C000000000001".to_string());

        let again = manager.get(&session.id).unwrap();
        assert_eq!(
            again.lock().await.sf_chat_id.as_deref(),
            Some("a0C000000000001")
        );
    }
}
