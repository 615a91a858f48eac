//! Online status of an experience or entry.

use crate::ids::is_offline_id;
use serde::{Deserialize, Serialize};

/// Sync status of an entity relative to the server.
///
/// Transitions are monotonic: once a sync attempt has produced a
/// server-known identity, an entity never returns to `Offline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnlineStatus {
    /// Fully synced.
    Online,
    /// Created locally, never yet sent.
    Offline,
    /// Synced, but carrying at least one outstanding field or entry error.
    PartOffline,
}

impl OnlineStatus {
    /// Initial status derived from identity shape.
    #[must_use]
    pub fn for_id(id: &str) -> Self {
        if is_offline_id(id) {
            Self::Offline
        } else {
            Self::Online
        }
    }

    /// Advances to a new status, refusing any regression to `Offline`.
    #[must_use]
    pub fn advance(self, to: Self) -> Self {
        if to == Self::Offline && self != Self::Offline {
            self
        } else {
            to
        }
    }

    /// Whether the server knows this entity's identity.
    #[must_use]
    pub fn is_synced(self) -> bool {
        !matches!(self, Self::Offline)
    }
}
