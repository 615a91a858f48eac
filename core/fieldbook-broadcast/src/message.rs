//! Broadcast message kinds and delivery envelopes.

use fieldbook_types::{ExperienceId, OnSyncedData};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one running view host ("tab").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(Uuid);

impl TabId {
    /// Creates a new tab ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a tab ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message published between tabs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BroadcastMessage {
    /// Connectivity changed.
    ConnectionChanged { connected: bool },

    /// An experience was deleted.
    EntityDeleted { id: ExperienceId, title: String },

    /// A sync pass completed.
    SyncCompleted(OnSyncedData),
}

/// Which subscribers a publish reaches, relative to the origin tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Delivery {
    /// Every tab except the origin.
    OthersOnly,
    /// Every tab including the origin.
    PlusSelf,
    /// Only the origin tab's own subscribers.
    SelfOnly,
}

/// A published message with its origin and delivery scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: TabId,
    pub delivery: Delivery,
    pub message: BroadcastMessage,
}

impl Envelope {
    /// Whether this envelope should be delivered to the given tab.
    #[must_use]
    pub fn delivers_to(&self, tab: TabId) -> bool {
        match self.delivery {
            Delivery::OthersOnly => self.origin != tab,
            Delivery::PlusSelf => true,
            Delivery::SelfOnly => self.origin == tab,
        }
    }
}
