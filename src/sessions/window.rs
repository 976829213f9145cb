//! Bounded per-session conversation log.
//!
//! A [`HistoryWindow`] is an append-only, ordered message log that always
//! starts with exactly one `system` preamble establishing the assistant
//! persona. The whole window is replayed verbatim as context on every
//! completion call, so ordering is semantically significant. Overflow is
//! corrected by evicting the oldest user/assistant pair after the preamble.

use serde::{Deserialize, Serialize};

/// Conversation role as understood by the chat completions API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single conversation message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered message log for one session, headed by the persona preamble.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    messages: Vec<Message>,
}

impl HistoryWindow {
    /// Create a fresh window containing only the system preamble.
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(preamble)],
        }
    }

    /// Append an inbound user turn.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    /// Append a generated assistant turn.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Drop the most recent message if it is a user turn with no reply.
    ///
    /// Used by the optional failed-turn rollback: after a completion failure
    /// the just-appended user message can be removed so a retry does not
    /// permanently occupy a context slot.
    pub fn pop_dangling_user(&mut self) -> bool {
        if self.messages.last().map(|m| m.role) == Some(Role::User) {
            self.messages.pop();
            true
        } else {
            false
        }
    }

    /// Evict oldest non-preamble pairs until the window fits within `max`.
    ///
    /// Removes one user/assistant pair at a time from just after the
    /// preamble, repeating until the length is back within the bound or only
    /// the preamble plus at most one entry remains. The preamble is never
    /// removed, and nothing happens at exactly `max` (strict greater-than
    /// check). Relative order of surviving messages is untouched.
    ///
    /// Returns the number of messages removed.
    pub fn trim_overflow(&mut self, max: usize) -> usize {
        let mut removed = 0;
        // Floor: preamble plus at most one entry means nothing pairs up.
        while self.messages.len() > max && self.messages.len() >= 3 {
            self.messages.drain(1..3);
            removed += 2;
        }
        removed
    }

    /// Snapshot the current ordered contents for a remote completion call.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_with_turns(turns: &[(&str, &str)]) -> HistoryWindow {
        let mut w = HistoryWindow::new("persona");
        for (user, assistant) in turns {
            w.push_user(*user);
            w.push_assistant(*assistant);
        }
        w
    }

    #[test]
    fn new_window_holds_only_preamble() {
        let w = HistoryWindow::new("persona");
        assert_eq!(w.len(), 1);
        assert_eq!(w.messages()[0], Message::system("persona"));
    }

    #[test]
    fn append_preserves_order() {
        let w = window_with_turns(&[("hi", "hello")]);
        let roles: Vec<Role> = w.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[test]
    fn trim_removes_exactly_the_oldest_pair() {
        // [preamble, user:a, assistant:b, user:c, assistant:d] with max 4
        let mut w = window_with_turns(&[("a", "b"), ("c", "d")]);
        assert_eq!(w.len(), 5);

        let removed = w.trim_overflow(4);
        assert_eq!(removed, 2);
        assert_eq!(w.len(), 3);
        assert_eq!(w.messages()[0].role, Role::System);
        assert_eq!(w.messages()[1].content, "c");
        assert_eq!(w.messages()[2].content, "d");
    }

    #[test]
    fn trim_noop_at_exactly_max() {
        let mut w = window_with_turns(&[("a", "b"), ("c", "d")]);
        assert_eq!(w.trim_overflow(5), 0);
        assert_eq!(w.len(), 5);
    }

    #[test]
    fn trim_converges_in_a_single_pass() {
        let mut w = window_with_turns(&[("a", "b"), ("c", "d"), ("e", "f")]);
        assert_eq!(w.len(), 7);

        // Over the bound by two pairs: both are evicted, oldest first.
        assert_eq!(w.trim_overflow(3), 4);
        assert_eq!(w.len(), 3);
        assert_eq!(w.messages()[1].content, "e");
        assert_eq!(w.trim_overflow(3), 0);
    }

    #[test]
    fn trim_never_removes_preamble() {
        let mut w = HistoryWindow::new("persona");
        w.push_user("only");
        // max of 1 is below the floor; the lone trailing entry has no pair.
        assert_eq!(w.trim_overflow(1), 0);
        assert_eq!(w.messages()[0].role, Role::System);
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn pop_dangling_user_removes_only_trailing_user_turn() {
        let mut w = window_with_turns(&[("a", "b")]);
        assert!(!w.pop_dangling_user());
        w.push_user("c");
        assert!(w.pop_dangling_user());
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn message_roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }
}
