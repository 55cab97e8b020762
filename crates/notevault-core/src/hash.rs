//! Vault identifier normalization.
//!
//! Vault hashes are client-supplied and opaque to the server. Before one is
//! used as a storage or registry key it is normalized by stripping every
//! non-hexadecimal character. This is not validation: the result is not
//! guaranteed to be a well-formed content hash, only safe to use as a key.
//! Two malformed inputs can collide after stripping; that leniency matches
//! the original protocol and is kept deliberately.

/// Strip every character that is not a hex digit from a client-supplied
/// vault identifier. Case is preserved.
pub fn sanitize_hash(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_hexdigit()).collect()
}
