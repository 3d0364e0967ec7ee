//! Thread snapshot persistence
//!
//! The store's threads and active pointer are persisted together as one
//! snapshot record in an embedded `sled` database. Writes are coalesced:
//! mutations only set the store's dirty flag, and a periodic flush task
//! writes the latest in-memory snapshot when the flag is set. In-memory
//! state stays authoritative; persistence is eventually consistent.

use crate::error::{DocentError, Result};
use crate::store::thread::Thread;
use crate::store::ThreadStore;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const SNAPSHOT_KEY: &[u8] = b"snapshot";

/// Everything the store persists, written as one record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub threads: Vec<Thread>,
    pub active: Option<Uuid>,
}

/// Snapshot storage backed by sled
pub struct SnapshotStore {
    db: sled::Db,
}

impl SnapshotStore {
    /// Open or create the snapshot database
    ///
    /// # Errors
    ///
    /// Returns `DocentError::Storage` if the database cannot be opened
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| DocentError::Storage(format!("Failed to open database: {}", e)))?;
        Ok(Self { db })
    }

    /// Write the snapshot, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns `DocentError::Storage` if serialization or the write fails
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let value = serde_json::to_vec(snapshot)
            .map_err(|e| DocentError::Storage(format!("Serialization failed: {}", e)))?;
        self.db
            .insert(SNAPSHOT_KEY, value)
            .map_err(|e| DocentError::Storage(format!("Insert failed: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| DocentError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    /// Read the snapshot, if one has ever been written
    ///
    /// # Errors
    ///
    /// Returns `DocentError::Storage` if the read or deserialization fails
    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        match self
            .db
            .get(SNAPSHOT_KEY)
            .map_err(|e| DocentError::Storage(format!("Get failed: {}", e)))?
        {
            Some(bytes) => {
                let snapshot = serde_json::from_slice(&bytes)
                    .map_err(|e| DocentError::Storage(format!("Deserialization failed: {}", e)))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }
}

/// Periodic write-coalescing flusher
///
/// Polls the store's dirty flag on a fixed interval and writes the
/// current snapshot when set. A burst of mutations inside one interval
/// therefore costs a single write. A failed write logs and re-arms the
/// flag so the next tick retries.
pub struct FlushTask;

impl FlushTask {
    /// Spawn the flusher on the current runtime
    pub fn spawn(
        store: Arc<Mutex<ThreadStore>>,
        snapshots: Arc<SnapshotStore>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let dirty = match store.lock() {
            Ok(guard) => guard.dirty_flag(),
            Err(poisoned) => poisoned.into_inner().dirty_flag(),
        };
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !dirty.swap(false, Ordering::AcqRel) {
                    continue;
                }
                let snapshot = match store.lock() {
                    Ok(guard) => guard.snapshot(),
                    Err(poisoned) => poisoned.into_inner().snapshot(),
                };
                if let Err(e) = snapshots.save(&snapshot) {
                    tracing::warn!("Snapshot write failed, will retry: {}", e);
                    dirty.store(true, Ordering::Release);
                }
            }
        })
    }
}

/// Write the current state immediately, bypassing the debounce
///
/// Used on shutdown so the last burst of mutations is not lost.
pub fn flush_now(store: &Mutex<ThreadStore>, snapshots: &SnapshotStore) -> Result<()> {
    let snapshot = match store.lock() {
        Ok(guard) => guard.snapshot(),
        Err(poisoned) => poisoned.into_inner().snapshot(),
    };
    snapshots.save(&snapshot)
}
