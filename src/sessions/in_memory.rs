//! In-memory session store implementation.

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::traits::{Session, SessionStore, SharedWindow};
use super::window::HistoryWindow;

/// An in-memory session store backed by a mutex-protected hash map.
///
/// History is volatile: nothing survives a process restart. Stale sessions
/// are replaced lazily on next access rather than reaped by a background
/// task, which matches the expiry contract (a stale session is only
/// observable through the fresh window that replaces it).
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    retention: Duration,
    preamble: String,
}

impl InMemorySessionStore {
    /// `retention` is the sliding idle duration after which a session is
    /// discarded; `preamble` seeds every fresh window.
    pub fn new(retention: std::time::Duration, preamble: impl Into<String>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            retention: Duration::from_std(retention).unwrap_or(Duration::MAX),
            preamble: preamble.into(),
        }
    }

    fn fresh_session(&self) -> Session {
        let now = Utc::now();
        Session {
            window: Arc::new(tokio::sync::Mutex::new(HistoryWindow::new(
                self.preamble.clone(),
            ))),
            created_at: now,
            last_activity: now,
        }
    }

    /// Backdate a session's idle timer. Test hook for expiry behavior.
    #[cfg(test)]
    fn backdate(&self, identity: &str, by: Duration) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(identity) {
            session.last_activity -= by;
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn window(&self, identity: &str) -> SharedWindow {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();

        match sessions.get_mut(identity) {
            Some(session) if now - session.last_activity <= self.retention => {
                session.last_activity = now;
                Arc::clone(&session.window)
            }
            _ => {
                let session = self.fresh_session();
                let window = Arc::clone(&session.window);
                sessions.insert(identity.to_string(), session);
                window
            }
        }
    }

    fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}
