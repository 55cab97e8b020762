//! Sync coordinator: glue between the vault store and the presence hub.
//!
//! Owns no state of its own. The request layer translates HTTP and
//! WebSocket traffic into calls here; this module decides what gets
//! persisted and who gets notified. Store I/O runs on the blocking pool and
//! never overlaps with the hub's registry lock.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task;
use tracing::debug;

use crate::hash::sanitize_hash;
use crate::hub::{ConnectionId, PresenceHub};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::store::{StoreError, VaultRecord, VaultStore};

/// Payload of a vault write, as supplied by the client.
#[derive(Debug, Clone)]
pub struct WritePayload {
    pub salt: String,
    pub iv: String,
    pub ciphertext: String,
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// Caller-input error: one of salt/iv/ciphertext absent or empty.
    /// Rejected before the store is touched; never triggers a broadcast.
    #[error("missing required fields")]
    MissingFields,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("storage task failed: {0}")]
    Task(#[from] task::JoinError),
}

/// Stateless orchestration over the store and the hub.
pub struct SyncCoordinator {
    store: Arc<VaultStore>,
    hub: Arc<PresenceHub>,
}

impl SyncCoordinator {
    pub fn new(store: Arc<VaultStore>, hub: Arc<PresenceHub>) -> Self {
        Self { store, hub }
    }

    pub fn hub(&self) -> &PresenceHub {
        &self.hub
    }

    /// Read the record for a client-supplied hash.
    pub async fn read_note(&self, raw_hash: &str) -> Result<Option<VaultRecord>, SyncError> {
        let hash = sanitize_hash(raw_hash);
        let store = Arc::clone(&self.store);
        let record = task::spawn_blocking(move || store.get(&hash)).await??;
        Ok(record)
    }

    /// Write a vault record and, on success, notify every subscriber of
    /// that vault with an "updated" event. The writer's own connection is
    /// not excluded: the write path and the connection path are
    /// independent, so a subscribed writer hears its own update.
    ///
    /// A failed write never produces a broadcast.
    pub async fn write_note(&self, raw_hash: &str, payload: WritePayload) -> Result<(), SyncError> {
        if payload.salt.is_empty() || payload.iv.is_empty() || payload.ciphertext.is_empty() {
            return Err(SyncError::MissingFields);
        }

        let hash = sanitize_hash(raw_hash);
        let store = Arc::clone(&self.store);
        {
            let hash = hash.clone();
            task::spawn_blocking(move || {
                store.put(&hash, &payload.salt, &payload.iv, &payload.ciphertext)
            })
            .await??;
        }

        self.hub.broadcast(&hash, &ServerMessage::Updated, None);
        Ok(())
    }

    /// Handle one inbound text frame from a live connection. Malformed or
    /// unknown messages are dropped without a reply.
    pub fn handle_message(
        &self,
        conn: ConnectionId,
        tx: &UnboundedSender<ServerMessage>,
        text: &str,
    ) {
        match ClientMessage::from_text(text) {
            Some(ClientMessage::Join { hash }) => self.handle_join(conn, tx, &hash),
            None => {
                debug!(conn, "ignoring malformed message");
            }
        }
    }

    /// Join flow: subscribe, acknowledge the joiner, notify the rest. If
    /// the join implicitly left another vault, its survivors get a "users"
    /// event too, just as they would on a disconnect.
    pub fn handle_join(
        &self,
        conn: ConnectionId,
        tx: &UnboundedSender<ServerMessage>,
        raw_hash: &str,
    ) {
        let hash = sanitize_hash(raw_hash);
        let (count, departed) = self.hub.join(conn, tx.clone(), &hash);

        // The joiner gets "joined" only; everyone else gets "users".
        let _ = tx.send(ServerMessage::Joined { users: count });
        self.hub
            .broadcast(&hash, &ServerMessage::Users { count }, Some(conn));

        if let Some((old_hash, remaining)) = departed {
            self.hub
                .broadcast(&old_hash, &ServerMessage::Users { count: remaining }, None);
        }
    }

    /// Disconnect flow: leave exactly once, then tell the survivors the new
    /// count. Safe to call for a connection that never joined anything.
    pub fn handle_disconnect(&self, conn: ConnectionId) {
        if let Some((hash, count)) = self.hub.leave(conn) {
            self.hub
                .broadcast(&hash, &ServerMessage::Users { count }, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn coordinator() -> SyncCoordinator {
        let store = Arc::new(VaultStore::open_in_memory().unwrap());
        SyncCoordinator::new(store, Arc::new(PresenceHub::new()))
    }

    fn payload() -> WritePayload {
        WritePayload {
            salt: "s".into(),
            iv: "i".into(),
            ciphertext: "c".into(),
        }
    }

    fn join(
        coordinator: &SyncCoordinator,
        conn: ConnectionId,
        hash: &str,
    ) -> UnboundedReceiver<ServerMessage> {
        let (tx, rx) = unbounded_channel();
        coordinator.handle_join(conn, &tx, hash);
        rx
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let coordinator = coordinator();
        coordinator.write_note("abc123", payload()).await.unwrap();

        let record = coordinator.read_note("abc123").await.unwrap().unwrap();
        assert_eq!(record.salt, "s");
        assert_eq!(record.iv, "i");
        assert_eq!(record.ciphertext, "c");
    }

    #[tokio::test]
    async fn test_read_sanitizes_hash() {
        let coordinator = coordinator();
        coordinator.write_note("abc123", payload()).await.unwrap();

        // Non-hex characters are stripped, so this resolves to the same key.
        let record = coordinator.read_note("abc-123!").await.unwrap();
        assert!(record.is_some());
    }

    #[tokio::test]
    async fn test_missing_field_rejected_before_storage_and_no_broadcast() {
        let coordinator = coordinator();
        let mut rx = join(&coordinator, 1, "abc123");
        let _ = rx.recv().await; // drain "joined"

        let bad = WritePayload {
            salt: String::new(),
            ..payload()
        };
        let err = coordinator.write_note("abc123", bad).await.unwrap_err();
        assert!(matches!(err, SyncError::MissingFields));

        assert!(coordinator.read_note("abc123").await.unwrap().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_update_fans_out_to_all_subscribers() {
        let coordinator = coordinator();
        let mut rx_a = join(&coordinator, 1, "abc123");
        let mut rx_b = join(&coordinator, 2, "abc123");
        let mut rx_other = join(&coordinator, 3, "ffff");

        // Drain join-time traffic.
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}
        while rx_other.try_recv().is_ok() {}

        coordinator.write_note("abc123", payload()).await.unwrap();

        assert_eq!(rx_a.try_recv().unwrap(), ServerMessage::Updated);
        assert_eq!(rx_b.try_recv().unwrap(), ServerMessage::Updated);
        // Exactly one event each, and nothing for the other vault.
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_join_flow_acks_joiner_and_notifies_others() {
        let coordinator = coordinator();
        let mut rx_a = join(&coordinator, 1, "abc123");
        assert_eq!(rx_a.try_recv().unwrap(), ServerMessage::Joined { users: 1 });

        let mut rx_b = join(&coordinator, 2, "abc123");
        assert_eq!(rx_b.try_recv().unwrap(), ServerMessage::Joined { users: 2 });
        // B gets no "users" echo from its own join; A does.
        assert!(rx_b.try_recv().is_err());
        assert_eq!(rx_a.try_recv().unwrap(), ServerMessage::Users { count: 2 });
    }

    #[tokio::test]
    async fn test_disconnect_notifies_survivors_once() {
        let coordinator = coordinator();
        let mut rx_a = join(&coordinator, 1, "abc123");
        let _rx_b = join(&coordinator, 2, "abc123");
        while rx_a.try_recv().is_ok() {}

        coordinator.handle_disconnect(2);
        assert_eq!(rx_a.try_recv().unwrap(), ServerMessage::Users { count: 1 });

        // Duplicate disconnects are expected races, not errors.
        coordinator.handle_disconnect(2);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_switching_vaults_notifies_old_vault_survivors() {
        let coordinator = coordinator();
        let mut rx_a = join(&coordinator, 1, "aaa");
        let mut rx_b = join(&coordinator, 2, "aaa");
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        // B moves to another vault; A must see the count drop.
        let (tx, _rx) = unbounded_channel();
        coordinator.handle_join(2, &tx, "bbb");
        assert_eq!(rx_a.try_recv().unwrap(), ServerMessage::Users { count: 1 });
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejoining_same_vault_sends_no_users_event() {
        let coordinator = coordinator();
        let mut rx_a = join(&coordinator, 1, "aaa");
        let mut rx_b = join(&coordinator, 2, "aaa");
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        let (tx, _rx) = unbounded_channel();
        coordinator.handle_join(2, &tx, "aaa");

        // A hears only the regular join-time "users", not a phantom drop.
        assert_eq!(rx_a.try_recv().unwrap(), ServerMessage::Users { count: 2 });
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_message_is_ignored() {
        let coordinator = coordinator();
        let (tx, mut rx) = unbounded_channel();

        coordinator.handle_message(1, &tx, "not json");
        coordinator.handle_message(1, &tx, r#"{"type":"nope"}"#);
        coordinator.handle_message(1, &tx, r#"{"type":"join"}"#);

        assert!(rx.try_recv().is_err());
        assert_eq!(coordinator.hub().subscriber_count("abc123"), 0);
    }

    #[tokio::test]
    async fn test_scenario_two_clients_and_a_write() {
        let coordinator = coordinator();

        let mut rx_a = join(&coordinator, 1, "abc123");
        assert_eq!(rx_a.try_recv().unwrap(), ServerMessage::Joined { users: 1 });

        let mut rx_b = join(&coordinator, 2, "abc123");
        assert_eq!(rx_b.try_recv().unwrap(), ServerMessage::Joined { users: 2 });
        assert_eq!(rx_a.try_recv().unwrap(), ServerMessage::Users { count: 2 });

        coordinator.write_note("abc123", payload()).await.unwrap();
        assert_eq!(rx_a.try_recv().unwrap(), ServerMessage::Updated);
        assert_eq!(rx_b.try_recv().unwrap(), ServerMessage::Updated);

        coordinator.handle_disconnect(2);
        assert_eq!(rx_a.try_recv().unwrap(), ServerMessage::Users { count: 1 });
    }
}
