//! The passed-down collaborator bundle.
//!
//! Constructed once at process start, torn down at process exit; every
//! component receives it explicitly. Nothing in the engine reaches for
//! ambient global state.

use crate::connectivity::ConnectivitySignal;
use crate::error::SyncResult;
use crate::ledger::Ledgers;
use crate::store::PersistedStore;
use crate::transport::SyncTransport;
use fieldbook_broadcast::{Broadcaster, BusTransport};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Shared collaborators for one tab.
#[derive(Clone)]
pub struct SyncContext {
    pub transport: Arc<dyn SyncTransport>,
    pub store: Arc<dyn PersistedStore>,
    pub ledgers: Arc<RwLock<Ledgers>>,
    pub broadcaster: Broadcaster,
    pub connectivity: ConnectivitySignal,
}

impl SyncContext {
    /// Builds a context for a fresh tab with empty ledgers.
    #[must_use]
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        store: Arc<dyn PersistedStore>,
        bus: Arc<dyn BusTransport>,
    ) -> Self {
        Self {
            transport,
            store,
            ledgers: Arc::new(RwLock::new(Ledgers::new())),
            broadcaster: Broadcaster::new(bus),
            connectivity: ConnectivitySignal::new(),
        }
    }

    /// Reloads the ledgers from the persisted store. Call once at startup.
    pub async fn restore(&self) -> SyncResult<()> {
        if let Some(snapshot) = self.store.load().await? {
            *self.ledgers.write().await = Ledgers::from_snapshot(snapshot);
        }
        Ok(())
    }

    /// Flushes the current ledgers to the persisted store.
    pub async fn persist(&self) -> SyncResult<()> {
        let snapshot = self.ledgers.read().await.snapshot();
        self.store.persist(&snapshot).await
    }

    /// Flushes, logging instead of failing. For effect paths where a
    /// persistence failure must not take down the view.
    pub async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            warn!("ledger persist failed: {e}");
        }
    }
}
