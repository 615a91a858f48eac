//! Shared ledgers: outstanding work and errors, consulted by every view.
//!
//! Three ledgers live behind one lock (see [`Ledgers`]): the unsynced
//! cache of locally created/edited entities, the sync error ledger, and
//! the delete-workflow ledger. Every write is a full replace-or-delete of
//! the keyed entry; nothing is field-mutated in place.

use crate::transport::ExperienceUpdate;
use fieldbook_types::{Entry, EntryId, Experience, ExperienceId, ExperienceSyncErrors};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The sync error ledger: per experience, everything still failing.
///
/// This is the single source of truth for "what still needs fixing"; view
/// state derives its error display from it, never the reverse. Only the
/// sync coordinator and reconciler write it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncErrorLedger {
    entries: HashMap<ExperienceId, ExperienceSyncErrors>,
}

impl SyncErrorLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entry for an experience. An empty aggregate deletes
    /// the entry instead, which is what clears the experience's error flag.
    pub fn write(&mut self, id: ExperienceId, errors: ExperienceSyncErrors) {
        if errors.is_empty() {
            self.entries.remove(&id);
        } else {
            self.entries.insert(id, errors);
        }
    }

    /// Deletes the entry for an experience.
    pub fn remove(&mut self, id: &ExperienceId) {
        self.entries.remove(id);
    }

    /// Looks up the current errors for an experience.
    #[must_use]
    pub fn get(&self, id: &ExperienceId) -> Option<&ExperienceSyncErrors> {
        self.entries.get(id)
    }

    /// Whether an experience currently has outstanding errors.
    #[must_use]
    pub fn contains(&self, id: &ExperienceId) -> bool {
        self.entries.contains_key(id)
    }

    /// Re-keys an entry after an identity swap.
    pub fn rekey(&mut self, old: &ExperienceId, new: ExperienceId) {
        if let Some(errors) = self.entries.remove(old) {
            self.entries.insert(new, errors);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over every ledgered experience.
    pub fn iter(&self) -> impl Iterator<Item = (&ExperienceId, &ExperienceSyncErrors)> {
        self.entries.iter()
    }
}

/// One delete-experience workflow record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum DeleteWorkflow {
    /// Awaiting confirmation.
    Requested { id: ExperienceId },
    /// Confirmation declined. Terminal, consumed once.
    Cancelled { id: ExperienceId, title: String },
    /// Delete completed. Terminal, consumed once.
    Deleted { id: ExperienceId, title: String },
}

/// The delete ledger: at most one in-flight or just-resolved delete
/// workflow. Terminal records are consumed by the next view that reads
/// them, then the ledger clears.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteLedger {
    slot: Option<DeleteWorkflow>,
}

impl DeleteLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a requested delete, replacing any prior record.
    pub fn request(&mut self, id: ExperienceId) {
        self.slot = Some(DeleteWorkflow::Requested { id });
    }

    /// Resolves the workflow as cancelled.
    pub fn cancel(&mut self, id: ExperienceId, title: impl Into<String>) {
        self.slot = Some(DeleteWorkflow::Cancelled {
            id,
            title: title.into(),
        });
    }

    /// Resolves the workflow as deleted.
    pub fn deleted(&mut self, id: ExperienceId, title: impl Into<String>) {
        self.slot = Some(DeleteWorkflow::Deleted {
            id,
            title: title.into(),
        });
    }

    /// The current record, without consuming it.
    #[must_use]
    pub fn current(&self) -> Option<&DeleteWorkflow> {
        self.slot.as_ref()
    }

    /// Consumes a terminal (cancelled/deleted) record. A `Requested`
    /// record stays readable for the view still driving the workflow.
    pub fn take_resolved(&mut self) -> Option<DeleteWorkflow> {
        match self.slot {
            Some(DeleteWorkflow::Cancelled { .. }) | Some(DeleteWorkflow::Deleted { .. }) => {
                self.slot.take()
            }
            _ => None,
        }
    }

    /// Drops whatever record is present.
    pub fn clear(&mut self) {
        self.slot = None;
    }
}

/// Everything a sync pass submits, collected from the unsynced ledger.
#[derive(Debug, Clone, Default)]
pub struct SyncPassInput {
    /// Offline-created experiences (their offline entries included).
    pub experiences: Vec<Experience>,
    /// Offline entries under online experiences.
    pub entries: Vec<(ExperienceId, Vec<Entry>)>,
    /// Pending updates to online experiences.
    pub updates: Vec<ExperienceUpdate>,
}

impl SyncPassInput {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiences.is_empty() && self.entries.is_empty() && self.updates.is_empty()
    }
}

/// The sync-to-server cache: everything created or edited locally that the
/// server has not yet accepted.
///
/// Entities whose last submission drew a validation error are *held*: they
/// stay cached but are skipped by [`collect`](Self::collect) until the user
/// re-stages them with corrected data. Transport failures hold nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnsyncedLedger {
    offline_experiences: HashMap<ExperienceId, Experience>,
    offline_entries: HashMap<ExperienceId, Vec<Entry>>,
    pending_updates: HashMap<ExperienceId, ExperienceUpdate>,
    held_experiences: HashSet<ExperienceId>,
    held_entries: HashSet<EntryId>,
}

impl UnsyncedLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches an offline-created experience.
    pub fn insert_offline_experience(&mut self, experience: Experience) {
        self.offline_experiences
            .insert(experience.id.clone(), experience);
    }

    /// Caches an offline-created entry. If its experience is itself
    /// offline the entry joins that experience's entry list; otherwise it
    /// queues under the online experience.
    pub fn add_offline_entry(&mut self, entry: Entry) {
        if let Some(experience) = self.offline_experiences.get_mut(&entry.experience_id) {
            experience.entries.items.push(entry);
        } else {
            self.offline_entries
                .entry(entry.experience_id.clone())
                .or_default()
                .push(entry);
        }
    }

    /// Queues an entry under an experience id directly, regardless of the
    /// experience's own status. Used when re-homing entries that failed
    /// while their experience succeeded.
    pub fn add_offline_entry_under(&mut self, experience_id: ExperienceId, entry: Entry) {
        self.offline_entries
            .entry(experience_id)
            .or_default()
            .push(entry);
    }

    /// Replaces a cached offline experience with corrected data and lifts
    /// any hold on it.
    pub fn restage_experience(&mut self, experience: Experience) {
        self.held_experiences.remove(&experience.id);
        self.insert_offline_experience(experience);
    }

    /// Replaces a cached offline entry with corrected data and lifts any
    /// hold on it.
    pub fn restage_entry(&mut self, entry: Entry) {
        self.held_entries.remove(&entry.id);
        if let Some(experience) = self.offline_experiences.get_mut(&entry.experience_id) {
            if let Some(slot) = experience
                .entries
                .items
                .iter_mut()
                .find(|e| e.id == entry.id)
            {
                *slot = entry;
                return;
            }
            experience.entries.items.push(entry);
        } else if let Some(entries) = self.offline_entries.get_mut(&entry.experience_id) {
            if let Some(slot) = entries.iter_mut().find(|e| e.id == entry.id) {
                *slot = entry;
            } else {
                entries.push(entry);
            }
        } else {
            self.add_offline_entry(entry);
        }
    }

    /// Stages pending updates for an online experience, replacing any
    /// previously staged record for it.
    pub fn stage_update(&mut self, update: ExperienceUpdate) {
        self.pending_updates
            .insert(update.experience_id.clone(), update);
    }

    /// The staged update for an experience, if any.
    #[must_use]
    pub fn update_for(&self, id: &ExperienceId) -> Option<&ExperienceUpdate> {
        self.pending_updates.get(id)
    }

    /// A cached offline experience, if any.
    #[must_use]
    pub fn offline_experience(&self, id: &ExperienceId) -> Option<&Experience> {
        self.offline_experiences.get(id)
    }

    /// Offline experiences in insertion-independent (title) order, for
    /// list views that show unsynced items alongside fetched ones.
    #[must_use]
    pub fn offline_experiences(&self) -> Vec<Experience> {
        let mut all: Vec<Experience> = self.offline_experiences.values().cloned().collect();
        all.sort_by(|a, b| a.title.cmp(&b.title));
        all
    }

    /// Removes a cached offline experience.
    pub fn remove_offline_experience(&mut self, id: &ExperienceId) -> Option<Experience> {
        self.held_experiences.remove(id);
        self.offline_experiences.remove(id)
    }

    /// Removes one queued offline entry.
    pub fn remove_offline_entry(
        &mut self,
        experience_id: &ExperienceId,
        entry_id: &EntryId,
    ) -> Option<Entry> {
        self.held_entries.remove(entry_id);
        let entries = self.offline_entries.get_mut(experience_id)?;
        let pos = entries.iter().position(|e| &e.id == entry_id)?;
        let entry = entries.remove(pos);
        if entries.is_empty() {
            self.offline_entries.remove(experience_id);
        }
        Some(entry)
    }

    /// Removes the staged update for an experience.
    pub fn remove_pending_update(&mut self, id: &ExperienceId) -> Option<ExperienceUpdate> {
        self.pending_updates.remove(id)
    }

    /// Holds an experience back from collection until re-staged.
    pub fn hold_experience(&mut self, id: ExperienceId) {
        self.held_experiences.insert(id);
    }

    /// Holds an entry back from collection until re-staged.
    pub fn hold_entry(&mut self, id: EntryId) {
        self.held_entries.insert(id);
    }

    /// Collects everything submittable for one sync pass. Held entities
    /// (outstanding validation errors, not yet re-staged) are skipped.
    #[must_use]
    pub fn collect(&self) -> SyncPassInput {
        let mut experiences: Vec<Experience> = self
            .offline_experiences
            .values()
            .filter(|e| !self.held_experiences.contains(&e.id))
            .cloned()
            .collect();
        experiences.sort_by(|a, b| a.id.cmp(&b.id));

        let mut entries: Vec<(ExperienceId, Vec<Entry>)> = self
            .offline_entries
            .iter()
            .filter_map(|(id, queued)| {
                let submittable: Vec<Entry> = queued
                    .iter()
                    .filter(|e| !self.held_entries.contains(&e.id))
                    .cloned()
                    .collect();
                (!submittable.is_empty()).then(|| (id.clone(), submittable))
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut updates: Vec<ExperienceUpdate> =
            self.pending_updates.values().cloned().collect();
        updates.sort_by(|a, b| a.experience_id.cmp(&b.experience_id));

        SyncPassInput {
            experiences,
            entries,
            updates,
        }
    }

    /// Whether nothing at all is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offline_experiences.is_empty()
            && self.offline_entries.is_empty()
            && self.pending_updates.is_empty()
    }
}

/// The three shared ledgers behind one lock, so a reconcile pass is a
/// single atomic critical section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledgers {
    pub unsynced: UnsyncedLedger,
    pub errors: SyncErrorLedger,
    pub delete: DeleteLedger,
}

impl Ledgers {
    /// Creates empty ledgers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A durable snapshot of all three ledgers.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            unsynced: self.unsynced.clone(),
            errors: self.errors.clone(),
            delete: self.delete.clone(),
        }
    }

    /// Restores from a snapshot loaded off the persisted store.
    #[must_use]
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            unsynced: snapshot.unsynced,
            errors: snapshot.errors,
            delete: snapshot.delete,
        }
    }
}

/// What the persisted store flushes and reloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub unsynced: UnsyncedLedger,
    pub errors: SyncErrorLedger,
    pub delete: DeleteLedger,
}
