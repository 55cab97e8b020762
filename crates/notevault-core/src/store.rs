//! Persisted vault record store.
//!
//! One SQLite row per vault hash, holding the opaque encrypted blob exactly
//! as the client supplied it. The server never parses salt/iv/ciphertext;
//! a write fully replaces all three fields (last write wins, no history).

use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the vault store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A stored vault record. Every field besides `updated_at` is opaque to the
/// server and round-trips byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    pub salt: String,
    pub iv: String,
    pub ciphertext: String,
    /// Server-assigned write time, epoch seconds. Not part of the wire
    /// shape clients read back.
    #[serde(skip_serializing, default)]
    pub updated_at: i64,
}

/// SQLite-backed store, safe to share across handlers behind an `Arc`.
///
/// The connection mutex serializes all statements; callers in async context
/// are expected to reach the store through `spawn_blocking` so a slow disk
/// never stalls the runtime. The mutex here is independent of the presence
/// registry's lock and the two are never held together.
pub struct VaultStore {
    conn: Mutex<Connection>,
}

impl VaultStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory store. Used by tests; nothing persists.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS vaults (
                hash        TEXT    NOT NULL PRIMARY KEY,
                salt        TEXT    NOT NULL,
                iv          TEXT    NOT NULL,
                ciphertext  TEXT    NOT NULL,
                updated_at  INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fetch the record for `hash`, or `None` if it was never written.
    ///
    /// `hash` must already be sanitized (see [`crate::hash::sanitize_hash`]).
    pub fn get(&self, hash: &str) -> StoreResult<Option<VaultRecord>> {
        let conn = self.conn.lock().expect("vault store mutex poisoned");
        let record = conn
            .query_row(
                "SELECT salt, iv, ciphertext, updated_at FROM vaults WHERE hash = ?1",
                params![hash],
                |row| {
                    Ok(VaultRecord {
                        salt: row.get(0)?,
                        iv: row.get(1)?,
                        ciphertext: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Create or fully overwrite the record for `hash`.
    ///
    /// Runs in a single transaction, so a concurrent `get` sees either the
    /// old record or the new one, never a mix. On return the record is
    /// committed and visible to every subsequent `get`.
    pub fn put(&self, hash: &str, salt: &str, iv: &str, ciphertext: &str) -> StoreResult<()> {
        let mut conn = self.conn.lock().expect("vault store mutex poisoned");
        let tx = conn.transaction()?;

        // Epoch-second resolution cannot distinguish two writes in the same
        // second, so keep updated_at strictly increasing per record.
        let previous: Option<i64> = tx
            .query_row(
                "SELECT updated_at FROM vaults WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        let updated_at = match previous {
            Some(prev) => now_epoch_secs().max(prev + 1),
            None => now_epoch_secs(),
        };

        tx.execute(
            "INSERT INTO vaults (hash, salt, iv, ciphertext, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(hash) DO UPDATE SET
                 salt = excluded.salt,
                 iv = excluded.iv,
                 ciphertext = excluded.ciphertext,
                 updated_at = excluded.updated_at",
            params![hash, salt, iv, ciphertext, updated_at],
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_get_missing_returns_none() {
        let store = VaultStore::open_in_memory().unwrap();
        assert!(store.get("abc123").unwrap().is_none());
    }

    #[test]
    fn test_put_get_roundtrip() {
        let store = VaultStore::open_in_memory().unwrap();
        store.put("abc123", "s", "i", "c").unwrap();

        let record = store.get("abc123").unwrap().unwrap();
        assert_eq!(record.salt, "s");
        assert_eq!(record.iv, "i");
        assert_eq!(record.ciphertext, "c");
        assert!(record.updated_at > 0);
    }

    #[test]
    fn test_put_overwrites_all_fields() {
        let store = VaultStore::open_in_memory().unwrap();
        store.put("abc123", "s1", "i1", "c1").unwrap();
        store.put("abc123", "s2", "i2", "c2").unwrap();

        let record = store.get("abc123").unwrap().unwrap();
        assert_eq!(
            (record.salt.as_str(), record.iv.as_str(), record.ciphertext.as_str()),
            ("s2", "i2", "c2")
        );
    }

    #[test]
    fn test_updated_at_strictly_increases() {
        let store = VaultStore::open_in_memory().unwrap();
        store.put("abc123", "s", "i", "c").unwrap();
        let first = store.get("abc123").unwrap().unwrap().updated_at;

        store.put("abc123", "s", "i", "c").unwrap();
        let second = store.get("abc123").unwrap().unwrap().updated_at;

        assert!(second > first);
    }

    #[test]
    fn test_hashes_are_independent() {
        let store = VaultStore::open_in_memory().unwrap();
        store.put("aaa", "s1", "i1", "c1").unwrap();
        store.put("bbb", "s2", "i2", "c2").unwrap();

        assert_eq!(store.get("aaa").unwrap().unwrap().salt, "s1");
        assert_eq!(store.get("bbb").unwrap().unwrap().salt, "s2");
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vaults.db");

        {
            let store = VaultStore::open(&path).unwrap();
            store.put("abc123", "s", "i", "c").unwrap();
        }

        let store = VaultStore::open(&path).unwrap();
        let record = store.get("abc123").unwrap().unwrap();
        assert_eq!(record.ciphertext, "c");
    }
}
