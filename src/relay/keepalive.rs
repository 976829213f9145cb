//! Keepalive signaler: periodic typing indicator while a remote call runs.
//!
//! Telegram shows a chat action for a few seconds only, so the signal must be
//! re-fired on an interval for as long as the remote call is outstanding. The
//! guard is scoped: the orchestrator starts it on entering the awaiting
//! region and every exit path releases it, either through an explicit
//! [`Keepalive::stop`] or through `Drop` when the region unwinds.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::channels::{ChatId, ChatTransport, TypingAction};

/// Handle to a running keepalive schedule. Dropping it cancels the schedule.
pub struct Keepalive {
    handle: JoinHandle<()>,
}

impl Keepalive {
    /// Begin firing `action` immediately and then every `interval`.
    ///
    /// Firing is best-effort UX, not correctness: a failed send is logged at
    /// `warn` and the schedule keeps going.
    pub fn start(
        transport: Arc<dyn ChatTransport>,
        chat: ChatId,
        action: TypingAction,
        interval: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                // First tick completes immediately.
                ticker.tick().await;
                if let Err(error) = transport.send_typing(chat, action).await {
                    warn!(chat, %error, "keepalive signal failed, continuing schedule");
                }
            }
        });
        Self { handle }
    }

    /// Cancel future firings. Idempotent; dropping the guard has the same effect.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
