//! Session storage traits and types for per-identity conversation state.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::window::HistoryWindow;

/// Handle to one identity's live conversation window.
///
/// The window sits behind an async mutex so the relay can hold it across the
/// remote-call suspension point. Holding the lock for the whole turn
/// serializes turns per identity: a second message from the same user queues
/// behind the in-flight one instead of racing it.
pub type SharedWindow = Arc<Mutex<HistoryWindow>>;

/// A tracked conversation session.
#[derive(Debug, Clone)]
pub struct Session {
    pub window: SharedWindow,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Storage for per-identity sessions with sliding idle expiry.
///
/// The store is the sole owner and mutator of the identity→session mapping.
/// No component holds a session reference beyond the current turn.
pub trait SessionStore: Send + Sync {
    /// Get the live window for an identity.
    ///
    /// Returns the existing window when the session is unexpired, otherwise
    /// atomically discards the stale session and creates a fresh one holding
    /// only the preamble. Every call refreshes the idle timer (sliding
    /// expiration, not fixed TTL).
    fn window(&self, identity: &str) -> SharedWindow;

    /// Number of sessions currently tracked, including not-yet-reaped stale ones.
    fn session_count(&self) -> usize;

    /// The name of this session store implementation.
    fn name(&self) -> &str;
}
