//! Identifier types used throughout the fieldbook core.
//!
//! Every entity is identified by a server-assigned string. Entities created
//! while disconnected get a locally minted identifier instead, marked with a
//! reserved prefix so the two id spaces never collide. The prefix survives
//! until a successful create response is reconciled, at which point the
//! reconciler swaps the offline id for the server one everywhere it is held.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reserved prefix for identifiers minted while disconnected.
///
/// Server-assigned identifiers are assumed never to start with this prefix;
/// the two id spaces are disjoint by construction.
pub const OFFLINE_ID_PREFIX: &str = "offline--";

/// Builds an offline identifier from a seed.
///
/// Stable for a given seed; an entity's offline id is never regenerated for
/// its lifetime.
#[must_use]
pub fn make_offline_id(seed: impl fmt::Display) -> String {
    format!("{OFFLINE_ID_PREFIX}{seed}")
}

/// Whether an identifier was minted offline. Pure and total.
#[must_use]
pub fn is_offline_id(id: &str) -> bool {
    id.starts_with(OFFLINE_ID_PREFIX)
}

/// Unique identifier for an experience.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperienceId(String);

impl ExperienceId {
    /// Creates an offline experience id from a seed.
    #[must_use]
    pub fn offline(seed: impl fmt::Display) -> Self {
        Self(make_offline_id(seed))
    }

    /// Creates an offline experience id from a fresh random seed.
    #[must_use]
    pub fn fresh_offline() -> Self {
        Self::offline(Uuid::new_v4())
    }

    /// Whether this id was minted offline.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        is_offline_id(&self.0)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ExperienceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ExperienceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ExperienceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Creates an offline entry id from a seed.
    #[must_use]
    pub fn offline(seed: impl fmt::Display) -> Self {
        Self(make_offline_id(seed))
    }

    /// Creates an offline entry id from a fresh random seed.
    #[must_use]
    pub fn fresh_offline() -> Self {
        Self::offline(Uuid::new_v4())
    }

    /// Whether this id was minted offline.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        is_offline_id(&self.0)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a definition (a named, typed field).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DefinitionId(String);

impl DefinitionId {
    /// Creates an offline definition id from a seed.
    #[must_use]
    pub fn offline(seed: impl fmt::Display) -> Self {
        Self(make_offline_id(seed))
    }

    /// Creates an offline definition id from a fresh random seed.
    #[must_use]
    pub fn fresh_offline() -> Self {
        Self::offline(Uuid::new_v4())
    }

    /// Whether this id was minted offline.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        is_offline_id(&self.0)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DefinitionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DefinitionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a data object (one field value within an entry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataObjectId(String);

impl DataObjectId {
    /// Creates an offline data object id from a seed.
    #[must_use]
    pub fn offline(seed: impl fmt::Display) -> Self {
        Self(make_offline_id(seed))
    }

    /// Creates an offline data object id from a fresh random seed.
    #[must_use]
    pub fn fresh_offline() -> Self {
        Self::offline(Uuid::new_v4())
    }

    /// Whether this id was minted offline.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        is_offline_id(&self.0)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DataObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DataObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for DataObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
