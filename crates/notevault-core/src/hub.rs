//! In-memory presence registry.
//!
//! Tracks, per vault hash, the set of live connections currently watching
//! it, and fans events out to them. The hub is the sole owner of the
//! registry: all mutation and iteration happens under one internal mutex,
//! so join/leave/broadcast are linearizable with respect to each other.
//!
//! Delivery is enqueue-and-forget: each connection hands the hub the
//! sending half of its outbound channel, and broadcast only pushes into
//! those unbounded channels. Nothing under the lock ever awaits, so a slow
//! or dead consumer cannot stall the hub or other subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::protocol::ServerMessage;

/// Process-local identifier for one live connection.
pub type ConnectionId = u64;

#[derive(Default)]
struct Registry {
    /// vault hash -> subscribed connections with their outbound senders.
    /// An entry exists only while its set is non-empty.
    vaults: HashMap<String, HashMap<ConnectionId, UnboundedSender<ServerMessage>>>,
    /// connection -> the single vault it is subscribed to, if any.
    subscriptions: HashMap<ConnectionId, String>,
}

impl Registry {
    /// Remove `conn` from whatever vault it is in. Returns the vault hash
    /// and the remaining subscriber count.
    fn remove(&mut self, conn: ConnectionId) -> Option<(String, usize)> {
        let hash = self.subscriptions.remove(&conn)?;
        let remaining = match self.vaults.get_mut(&hash) {
            Some(subscribers) => {
                subscribers.remove(&conn);
                subscribers.len()
            }
            None => 0,
        };
        if remaining == 0 {
            self.vaults.remove(&hash);
        }
        Some((hash, remaining))
    }
}

/// Presence hub shared by all connection handlers.
pub struct PresenceHub {
    registry: Mutex<Registry>,
    next_conn_id: AtomicU64,
}

impl Default for PresenceHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceHub {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Allocate an identifier for a newly accepted connection.
    pub fn allocate_id(&self) -> ConnectionId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Subscribe `conn` to `hash`, implicitly leaving any previous vault
    /// first. No observer ever sees the connection counted in two vaults.
    ///
    /// Returns the new subscriber count for `hash` (including `conn`) and,
    /// when the implicit leave departed a *different* vault, that vault's
    /// hash with its remaining subscriber count, so the caller can notify
    /// its survivors. A rejoin of the same vault reports no departure: its
    /// membership did not change.
    pub fn join(
        &self,
        conn: ConnectionId,
        tx: UnboundedSender<ServerMessage>,
        hash: &str,
    ) -> (usize, Option<(String, usize)>) {
        let mut registry = self.registry.lock().expect("presence registry poisoned");
        let departed = registry
            .remove(conn)
            .filter(|(previous, _)| previous != hash);
        registry
            .subscriptions
            .insert(conn, hash.to_string());
        let subscribers = registry.vaults.entry(hash.to_string()).or_default();
        subscribers.insert(conn, tx);
        (subscribers.len(), departed)
    }

    /// Unsubscribe `conn` from its current vault, if any. Idempotent.
    /// Returns the vault it left and the remaining subscriber count, so the
    /// caller can notify the survivors.
    pub fn leave(&self, conn: ConnectionId) -> Option<(String, usize)> {
        let mut registry = self.registry.lock().expect("presence registry poisoned");
        registry.remove(conn)
    }

    /// Deliver `message` to every subscriber of `hash` except `exclude`.
    ///
    /// Best-effort: a connection whose receiving task is gone is skipped
    /// silently. No-op when `hash` has no subscribers.
    pub fn broadcast(&self, hash: &str, message: &ServerMessage, exclude: Option<ConnectionId>) {
        let registry = self.registry.lock().expect("presence registry poisoned");
        let Some(subscribers) = registry.vaults.get(hash) else {
            return;
        };
        for (&conn, tx) in subscribers {
            if Some(conn) == exclude {
                continue;
            }
            if tx.send(message.clone()).is_err() {
                debug!(conn, hash, "skipping broadcast to closed connection");
            }
        }
    }

    /// Current subscriber count for `hash`.
    pub fn subscriber_count(&self, hash: &str) -> usize {
        let registry = self.registry.lock().expect("presence registry poisoned");
        registry.vaults.get(hash).map_or(0, |subscribers| subscribers.len())
    }
}
