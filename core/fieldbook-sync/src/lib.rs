//! Offline/online synchronization for fieldbook.
//!
//! The engine keeps a cache of everything created or edited while
//! disconnected, submits it once connectivity returns, and reconciles the
//! per-entity results back into client-visible state:
//!
//! - **Ledgers**: the unsynced cache, the sync error ledger, and the
//!   delete-workflow ledger, behind one lock.
//! - **Coordinator**: runs exactly one sync pass per connectivity-became-
//!   true transition, retrying transport failures over a bounded backoff
//!   schedule.
//! - **Reconciler**: swaps offline identities for server ones atomically
//!   and folds typed validation errors into the error ledger.
//!
//! Collaborators (server transport, persisted store) are traits; mocks
//! live beside them for tests.

pub mod connectivity;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod reconciler;
pub mod store;
pub mod transport;

pub use connectivity::ConnectivitySignal;
pub use context::SyncContext;
pub use coordinator::{SyncConfig, SyncCoordinator};
pub use error::{SyncError, SyncResult};
pub use ledger::{
    DeleteLedger, DeleteWorkflow, LedgerSnapshot, Ledgers, SyncErrorLedger, SyncPassInput,
    UnsyncedLedger,
};
pub use reconciler::{SyncPassResults, error_for, reconcile};
pub use store::{MemoryStore, PersistedStore};
pub use transport::{
    DeleteOutcome, EntryOutcome, EntrySubmission, EntryUpdateOutcome, ExperienceOutcome,
    ExperienceSubmission, ExperienceUpdate, SyncTransport, UpdateSubmission,
};
