//! notevault-core: storage and presence for end-to-end-encrypted notes.
//!
//! The server side of notevault never sees plaintext. It stores one opaque
//! `{salt, iv, ciphertext}` blob per vault hash and relays change/presence
//! notifications to whoever is watching that hash. This crate holds the
//! transport-agnostic pieces: the persisted vault store, the in-memory
//! presence hub, and the coordinator that glues them together.

pub mod hash;
pub mod hub;
pub mod protocol;
pub mod store;
pub mod sync;

// Re-export key types for convenience
pub use hash::sanitize_hash;
pub use hub::{ConnectionId, PresenceHub};
pub use protocol::{ClientMessage, ServerMessage};
pub use store::{StoreError, VaultRecord, VaultStore};
pub use sync::SyncCoordinator;
