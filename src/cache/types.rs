//! Shared cache types.

use thiserror::Error;

/// Internal fault raised inside a cache tier.
///
/// Never crosses the engine boundary: every fault is logged and degraded
/// to a miss so callers can always proceed as if nothing were cached.
#[derive(Debug, Error)]
pub enum CacheFault {
    /// L2 store operation failed (connection, command, or timeout).
    #[error("L2 store fault on key '{key}': {reason}")]
    Store { key: String, reason: String },

    /// Value could not be serialized for the L2 tier.
    #[error("serialization fault on key '{key}': {reason}")]
    Serialize { key: String, reason: String },

    /// L2 bytes could not be deserialized into the requested type.
    #[error("deserialization fault on key '{key}': {reason}")]
    Deserialize { key: String, reason: String },
}

/// Matches a key against a glob with at most one `*` wildcard.
///
/// `*` alone matches everything; `prefix*`, `*suffix`, and
/// `prefix*suffix` match the obvious substrings; a pattern with no `*`
/// requires exact equality.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    match pattern.find('*') {
        None => pattern == key,
        Some(pos) => {
            let (prefix, suffix) = (&pattern[..pos], &pattern[pos + 1..]);
            key.len() >= prefix.len() + suffix.len()
                && key.starts_with(prefix)
                && key.ends_with(suffix)
        }
    }
}
