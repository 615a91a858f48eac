//! The payload produced by one completed sync pass.

use crate::errors::ExperienceSyncErrors;
use crate::ids::{EntryId, ExperienceId};
use crate::record::Entry;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Everything one sync pass changed, broadcast to every open view.
///
/// Produced once per pass, consumed by each view once, never persisted.
/// Applying the same payload to a view twice must be a no-op the second
/// time; consumers rely on the id maps being keyed by offline ids that no
/// longer resolve after the first application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnSyncedData {
    /// Offline experience id → server-assigned id.
    pub offline_experience_map: HashMap<ExperienceId, ExperienceId>,
    /// Per online experience: offline entry id → the now-synced entry.
    pub synced_entries: HashMap<ExperienceId, HashMap<EntryId, Entry>>,
    /// Sync error ledger delta written by this pass.
    pub sync_errors: HashMap<ExperienceId, ExperienceSyncErrors>,
    /// Online experiences updated with no errors.
    pub updated_clean: HashSet<ExperienceId>,
}

impl OnSyncedData {
    /// Whether the pass changed nothing a view could care about.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offline_experience_map.is_empty()
            && self.synced_entries.is_empty()
            && self.sync_errors.is_empty()
            && self.updated_clean.is_empty()
    }
}
