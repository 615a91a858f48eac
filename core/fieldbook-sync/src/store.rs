//! Persisted-store abstraction.
//!
//! The engine treats durable storage as an opaque collaborator: it flushes
//! a full ledger snapshot after every state-affecting write that must
//! survive a reload (identity swaps, ledger writes, deletions) and reloads
//! the last snapshot at startup.

use crate::error::SyncResult;
use crate::ledger::LedgerSnapshot;
use async_trait::async_trait;
use std::sync::Mutex;

/// Durable storage for the ledgers.
#[async_trait]
pub trait PersistedStore: Send + Sync {
    /// Flushes the snapshot to durable storage.
    async fn persist(&self, snapshot: &LedgerSnapshot) -> SyncResult<()>;

    /// Loads the last flushed snapshot, if any.
    async fn load(&self) -> SyncResult<Option<LedgerSnapshot>>;
}

/// In-memory store for tests and single-session use.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    snapshot: Option<LedgerSnapshot>,
    persist_count: usize,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `persist` ran.
    #[must_use]
    pub fn persist_count(&self) -> usize {
        self.inner.lock().unwrap().persist_count
    }

    /// The last flushed snapshot.
    #[must_use]
    pub fn last_snapshot(&self) -> Option<LedgerSnapshot> {
        self.inner.lock().unwrap().snapshot.clone()
    }
}

#[async_trait]
impl PersistedStore for MemoryStore {
    async fn persist(&self, snapshot: &LedgerSnapshot) -> SyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.snapshot = Some(snapshot.clone());
        inner.persist_count += 1;
        Ok(())
    }

    async fn load(&self) -> SyncResult<Option<LedgerSnapshot>> {
        Ok(self.inner.lock().unwrap().snapshot.clone())
    }
}
