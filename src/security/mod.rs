//! Security subsystem: the identity allow-list gate.
//!
//! The relay answers only to identities listed in the config. The gate is a
//! pure lookup against an immutable set built once at startup; an unknown or
//! missing identity is always denied (fail closed). Denials are an expected
//! path, so the caller decides whether and how to notify the requester.

use std::collections::HashSet;

/// Immutable set of identities allowed to use the relay.
///
/// Built once from config at startup and shared read-only for the lifetime
/// of the process, so no synchronization is needed.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    identities: HashSet<String>,
}

impl AllowList {
    /// Build from an iterator of identity strings. Entries are trimmed and
    /// empties dropped, so a trailing comma in `ALLOWED_USERS` is harmless.
    pub fn new<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            identities: identities
                .into_iter()
                .map(|s| s.as_ref().trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Parse a comma-separated allow-list string (the `ALLOWED_USERS` format).
    pub fn from_comma_separated(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    /// Check whether an identity may use the service.
    ///
    /// `None` and empty identities are denied: a Telegram account without a
    /// username can never match a list entry, and guessing would open the
    /// gate to everyone.
    pub fn is_allowed(&self, identity: Option<&str>) -> bool {
        match identity {
            Some(id) if !id.trim().is_empty() => self.identities.contains(id.trim()),
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }
}

/// Redact sensitive values for safe logging. Shows first 4 chars + "***" suffix.
pub fn redact(value: &str) -> String {
    if value.len() <= 4 {
        "***".to_string()
    } else {
        format!("{}***", &value[..4])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listed_identity_is_allowed() {
        let list = AllowList::from_comma_separated("alice,bob");
        assert!(list.is_allowed(Some("alice")));
        assert!(list.is_allowed(Some("bob")));
    }

    #[test]
    fn unlisted_identity_is_denied() {
        let list = AllowList::from_comma_separated("alice,bob");
        assert!(!list.is_allowed(Some("mallory")));
    }

    #[test]
    fn missing_or_empty_identity_fails_closed() {
        let list = AllowList::from_comma_separated("alice");
        assert!(!list.is_allowed(None));
        assert!(!list.is_allowed(Some("")));
        assert!(!list.is_allowed(Some("   ")));
    }

    #[test]
    fn empty_list_denies_everyone() {
        let list = AllowList::from_comma_separated("");
        assert!(list.is_empty());
        assert!(!list.is_allowed(Some("alice")));
    }

    #[test]
    fn entries_are_trimmed() {
        let list = AllowList::from_comma_separated(" alice , bob ,");
        assert_eq!(list.len(), 2);
        assert!(list.is_allowed(Some("alice")));
        assert!(list.is_allowed(Some(" bob ")));
    }

    #[test]
    fn redact_hides_most_of_value() {
        assert_eq!(redact("abcdefgh"), "abcd***");
        assert_eq!(redact("ab"), "***");
        assert_eq!(redact(""), "***");
    }
}
