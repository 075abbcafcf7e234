/// Key-construction helpers for a dotted namespace.
///
/// Keys look like `<namespace>.<kind>:<id>` (e.g. `Hybrasyl.Messaging.Board:3`).
/// An empty namespace drops the leading segment (`Messaging.Board:3`).
/// User records are never namespaced and always live at `User:<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    namespace: String,
}

pub const DEFAULT_NAMESPACE: &str = "Hybrasyl";

const USER_KIND: &str = "User";

impl KeySpace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Key space without a namespace prefix.
    pub fn bare() -> Self {
        Self::new("")
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Qualified kind name, e.g. `Hybrasyl.Board`.
    pub fn kind(&self, kind: &str) -> String {
        if self.namespace.is_empty() {
            kind.to_string()
        } else {
            format!("{}.{}", self.namespace, kind)
        }
    }

    /// Enumeration prefix for every key of a kind, e.g. `Hybrasyl.Board:`.
    pub fn prefix(&self, kind: &str) -> String {
        format!("{}:", self.kind(kind))
    }

    pub fn key(&self, kind: &str, id: &str) -> String {
        format!("{}:{}", self.kind(kind), id)
    }

    pub fn user_prefix(&self) -> String {
        format!("{USER_KIND}:")
    }

    pub fn user(&self, name: &str) -> String {
        format!("{USER_KIND}:{name}")
    }

    /// Well-known key holding the migration ledger.
    pub fn ledger(&self) -> String {
        self.kind("RedisMigrations")
    }

    /// Redis list carrying control-channel requests.
    pub fn control_queue(&self) -> String {
        self.kind("Control")
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

/// Split a key at its first `:` into kind and id.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(':')
}

/// Everything after the first `:` of a key.
pub fn key_id(key: &str) -> Option<&str> {
    split_key(key).map(|(_, id)| id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_namespaced_keys() {
        let keys = KeySpace::default();
        assert_eq!(keys.key("Board", "7"), "Hybrasyl.Board:7");
        assert_eq!(keys.prefix("Messaging.Mailbox"), "Hybrasyl.Messaging.Mailbox:");
        assert_eq!(keys.ledger(), "Hybrasyl.RedisMigrations");
        assert_eq!(keys.control_queue(), "Hybrasyl.Control");
    }

    #[test]
    fn bare_space_drops_namespace() {
        let keys = KeySpace::bare();
        assert_eq!(keys.key("AuthInfo", "abc"), "AuthInfo:abc");
        assert_eq!(keys.prefix("Board"), "Board:");
    }

    #[test]
    fn user_keys_ignore_namespace() {
        assert_eq!(KeySpace::default().user("alice"), "User:alice");
        assert_eq!(KeySpace::bare().user_prefix(), "User:");
    }

    #[test]
    fn key_id_keeps_everything_after_first_colon() {
        assert_eq!(key_id("Hybrasyl.Board:main:archive"), Some("main:archive"));
        assert_eq!(key_id("User:"), Some(""));
        assert_eq!(key_id("nocolon"), None);
    }
}
