//! Sync coordination: when to run a pass, and retrying under uncertain
//! connectivity.

use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::ledger::SyncPassInput;
use crate::reconciler::{self, SyncPassResults};
use fieldbook_broadcast::{BroadcastMessage, Delivery};
use fieldbook_types::OnSyncedData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the sync coordinator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Backoff schedule for transport-level failures. Exhausting it is
    /// terminal for the pass.
    pub backoff: Vec<Duration>,
    /// Tab name for log correlation.
    pub tab_name: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backoff: vec![
                Duration::from_secs(2),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(5),
            ],
            tab_name: "fieldbook tab".to_string(),
        }
    }
}

/// Decides when to run a sync pass.
///
/// Invoked on every connectivity-changed signal. Runs at most one pass at
/// a time; a signal arriving while a pass is in flight is a no-op.
pub struct SyncCoordinator {
    ctx: SyncContext,
    config: SyncConfig,
    enabled: AtomicBool,
    in_flight: AtomicBool,
}

impl SyncCoordinator {
    /// Creates a coordinator with the default configuration.
    #[must_use]
    pub fn new(ctx: SyncContext) -> Self {
        Self::with_config(ctx, SyncConfig::default())
    }

    /// Creates a coordinator with a custom configuration.
    #[must_use]
    pub fn with_config(ctx: SyncContext, config: SyncConfig) -> Self {
        Self {
            ctx,
            config,
            enabled: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether syncing is currently enabled (last signal said connected).
    #[must_use]
    pub fn is_sync_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Entry point for connectivity-changed signals.
    ///
    /// Returns the pass's payload when a pass ran and produced one.
    pub async fn connection_changed(&self, connected: bool) -> SyncResult<Option<OnSyncedData>> {
        self.ctx.connectivity.emit(connected);
        if let Err(e) = self.ctx.broadcaster.publish(
            BroadcastMessage::ConnectionChanged { connected },
            Delivery::PlusSelf,
        ) {
            warn!("failed to broadcast connectivity change: {e}");
        }

        if !connected {
            self.enabled.store(false, Ordering::SeqCst);
            debug!(tab = %self.config.tab_name, "sync disabled");
            return Ok(None);
        }

        self.enabled.store(true, Ordering::SeqCst);
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!(tab = %self.config.tab_name, "sync pass already in flight, skipping");
            return Ok(None);
        }

        let result = self.sync_pass_with_retry().await;
        self.in_flight.store(false, Ordering::SeqCst);

        let data = result?;
        if data.is_empty() {
            return Ok(None);
        }

        self.ctx.persist().await?;
        if let Err(e) = self
            .ctx
            .broadcaster
            .publish(BroadcastMessage::SyncCompleted(data.clone()), Delivery::PlusSelf)
        {
            warn!("failed to broadcast sync completion: {e}");
        }
        Ok(Some(data))
    }

    async fn sync_pass_with_retry(&self) -> SyncResult<OnSyncedData> {
        let mut attempt = 0;
        loop {
            match self.sync_pass().await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_transport() => {
                    let Some(delay) = self.config.backoff.get(attempt) else {
                        warn!("backoff schedule exhausted: {e}");
                        return Err(SyncError::DataFetchingFailed);
                    };
                    debug!(attempt, ?delay, "transport failure, retrying: {e}");
                    tokio::time::sleep(*delay).await;
                    if self.ctx.connectivity.current() == Some(false) {
                        debug!("connectivity lost during backoff, abandoning retries");
                        return Err(e);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One synchronization pass: collect, submit in batches keyed by
    /// experience, reconcile under a single ledger write lock.
    async fn sync_pass(&self) -> SyncResult<OnSyncedData> {
        let input: SyncPassInput = self.ctx.ledgers.read().await.unsynced.collect();
        if input.is_empty() {
            debug!("nothing to sync");
            return Ok(OnSyncedData::default());
        }

        info!(
            experiences = input.experiences.len(),
            entry_batches = input.entries.len(),
            updates = input.updates.len(),
            "starting sync pass"
        );

        let created = if input.experiences.is_empty() {
            Vec::new()
        } else {
            self.ctx
                .transport
                .sync_create_experiences(input.experiences)
                .await?
        };

        let mut entries = Vec::with_capacity(input.entries.len());
        for (experience_id, batch) in input.entries {
            let submissions = self
                .ctx
                .transport
                .sync_create_entries(&experience_id, batch)
                .await?;
            entries.push((experience_id, submissions));
        }

        let updated = if input.updates.is_empty() {
            Vec::new()
        } else {
            self.ctx
                .transport
                .sync_update_experiences(input.updates)
                .await?
        };

        let results = SyncPassResults {
            created,
            entries,
            updated,
        };
        let mut ledgers = self.ctx.ledgers.write().await;
        Ok(reconciler::reconcile(&mut ledgers, results))
    }
}
