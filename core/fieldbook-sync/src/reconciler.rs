//! Conflict/error reconciliation.
//!
//! Takes one sync pass's per-entity results and merges them into the
//! ledgers: swaps offline identities for server ones, records typed
//! validation errors as whole-value ledger writes, and clears entries whose
//! resubmission succeeded. The caller holds the ledger write lock for the
//! whole pass, so every swap is atomic from any reader's point of view.
//!
//! A response for an id the ledgers no longer know is logged and dropped;
//! the entity may have been legitimately removed meanwhile.

use crate::ledger::Ledgers;
use crate::transport::{
    EntryOutcome, EntrySubmission, EntryUpdateOutcome, ExperienceOutcome, ExperienceSubmission,
    UpdateSubmission,
};
use fieldbook_types::{
    CreateEntryError, CreateExperienceError, DefinitionError, DefinitionId, Entry, EntryId,
    ExperienceId, ExperienceSyncErrors, OnSyncedData, OwnFieldsError, UpdateEntryError,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Everything one sync pass got back from the transport.
#[derive(Debug, Clone, Default)]
pub struct SyncPassResults {
    /// One result per submitted offline experience.
    pub created: Vec<ExperienceSubmission>,
    /// Per online experience, one result per submitted offline entry.
    pub entries: Vec<(ExperienceId, Vec<EntrySubmission>)>,
    /// One result per submitted pending update.
    pub updated: Vec<UpdateSubmission>,
}

/// What this pass submitted and what failed, per experience. Folding the
/// delta over the previous ledger value supersedes exactly the submitted
/// lines and leaves errors of entities held back from this pass intact.
#[derive(Debug, Default)]
struct PassDelta {
    create_submitted: bool,
    create_failure: Option<CreateExperienceError>,
    submitted_entries: HashSet<EntryId>,
    create_entry_failures: HashMap<EntryId, CreateEntryError>,
    own_fields_submitted: bool,
    own_fields_failure: Option<OwnFieldsError>,
    submitted_definitions: HashSet<DefinitionId>,
    definition_failures: HashMap<DefinitionId, DefinitionError>,
    submitted_updated_entries: HashSet<EntryId>,
    update_entry_failures: HashMap<EntryId, UpdateEntryError>,
}

/// Looks up the current errors for an experience.
#[must_use]
pub fn error_for(ledgers: &Ledgers, id: &ExperienceId) -> Option<ExperienceSyncErrors> {
    ledgers.errors.get(id).cloned()
}

/// Merges a sync pass's results into the ledgers and produces the
/// [`OnSyncedData`] payload for the views.
pub fn reconcile(ledgers: &mut Ledgers, results: SyncPassResults) -> OnSyncedData {
    let mut data = OnSyncedData::default();
    let mut deltas: HashMap<ExperienceId, PassDelta> = HashMap::new();
    // Experiences that existed server-side before this pass; candidates
    // for the updated-clean set.
    let mut preexisting: HashSet<ExperienceId> = HashSet::new();

    reconcile_creates(ledgers, results.created, &mut data, &mut deltas);
    reconcile_entry_creates(
        ledgers,
        results.entries,
        &mut data,
        &mut deltas,
        &mut preexisting,
    );
    reconcile_updates(ledgers, results.updated, &mut deltas, &mut preexisting);

    for (experience_id, delta) in deltas {
        let mut aggregate = ledgers.errors.get(&experience_id).cloned().unwrap_or_default();
        apply_delta(&mut aggregate, delta);

        if aggregate.is_empty() {
            ledgers.errors.remove(&experience_id);
            if preexisting.contains(&experience_id) {
                data.updated_clean.insert(experience_id);
            }
        } else {
            ledgers.errors.write(experience_id.clone(), aggregate.clone());
            data.sync_errors.insert(experience_id, aggregate);
        }
    }

    info!(
        created = data.offline_experience_map.len(),
        errored = data.sync_errors.len(),
        clean = data.updated_clean.len(),
        "reconciled sync pass"
    );
    data
}

fn apply_delta(aggregate: &mut ExperienceSyncErrors, delta: PassDelta) {
    if delta.create_submitted {
        aggregate.create_experience = delta.create_failure;
    }
    for entry_id in &delta.submitted_entries {
        aggregate.create_entries.remove(entry_id);
    }
    aggregate.create_entries.extend(delta.create_entry_failures);
    if delta.own_fields_submitted {
        aggregate.own_fields = delta.own_fields_failure;
    }
    for definition_id in &delta.submitted_definitions {
        aggregate.definitions.remove(definition_id);
    }
    aggregate.definitions.extend(delta.definition_failures);
    for entry_id in &delta.submitted_updated_entries {
        aggregate.update_entries.remove(entry_id);
    }
    aggregate.update_entries.extend(delta.update_entry_failures);
}

fn reconcile_creates(
    ledgers: &mut Ledgers,
    created: Vec<ExperienceSubmission>,
    data: &mut OnSyncedData,
    deltas: &mut HashMap<ExperienceId, PassDelta>,
) {
    for submission in created {
        match submission.outcome {
            ExperienceOutcome::Created {
                experience: server_experience,
                entries,
            } => {
                // The swap: drop the offline copy, re-key any ledgered
                // errors, and record the mapping for every view.
                let Some(mut offline) = ledgers
                    .unsynced
                    .remove_offline_experience(&submission.client_id)
                else {
                    warn!(id = %submission.client_id, "create result for unknown experience, dropping");
                    continue;
                };
                let server_id = server_experience.id.clone();
                debug!(offline = %submission.client_id, server = %server_id, "experience created");
                ledgers.errors.rekey(&submission.client_id, server_id.clone());
                data.offline_experience_map
                    .insert(submission.client_id.clone(), server_id.clone());

                let delta = deltas.entry(server_id.clone()).or_default();
                delta.create_submitted = true;

                let mut synced: HashMap<EntryId, Entry> = HashMap::new();
                for entry_submission in entries {
                    delta
                        .submitted_entries
                        .insert(entry_submission.client_id.clone());
                    match entry_submission.outcome {
                        EntryOutcome::Created(entry) => {
                            synced.insert(entry_submission.client_id, entry);
                        }
                        EntryOutcome::Failed(error) => {
                            rehome_failed_entry(
                                ledgers,
                                &mut offline,
                                &server_id,
                                &entry_submission.client_id,
                            );
                            delta
                                .create_entry_failures
                                .insert(entry_submission.client_id, error);
                        }
                    }
                }
                if !synced.is_empty() {
                    data.synced_entries
                        .entry(server_id)
                        .or_default()
                        .extend(synced);
                }
            }
            ExperienceOutcome::Failed(error) => {
                if ledgers
                    .unsynced
                    .offline_experience(&submission.client_id)
                    .is_none()
                {
                    warn!(id = %submission.client_id, "create result for unknown experience, dropping");
                    continue;
                }
                debug!(id = %submission.client_id, "experience create rejected");
                ledgers.unsynced.hold_experience(submission.client_id.clone());
                let delta = deltas.entry(submission.client_id).or_default();
                delta.create_submitted = true;
                delta.create_failure = Some(error);
            }
        }
    }
}

/// Moves an entry that failed while its experience succeeded out of the
/// (now removed) offline experience and back into the cache, queued under
/// the new server id and held until re-staged.
fn rehome_failed_entry(
    ledgers: &mut Ledgers,
    offline: &mut fieldbook_types::Experience,
    server_id: &ExperienceId,
    entry_id: &EntryId,
) {
    let Some(pos) = offline.entries.items.iter().position(|e| &e.id == entry_id) else {
        warn!(id = %entry_id, "entry result for unknown entry, dropping");
        return;
    };
    let mut entry = offline.entries.items.remove(pos);
    entry.experience_id = server_id.clone();
    ledgers.unsynced.hold_entry(entry.id.clone());
    ledgers
        .unsynced
        .add_offline_entry_under(server_id.clone(), entry);
}

fn reconcile_entry_creates(
    ledgers: &mut Ledgers,
    entries: Vec<(ExperienceId, Vec<EntrySubmission>)>,
    data: &mut OnSyncedData,
    deltas: &mut HashMap<ExperienceId, PassDelta>,
    preexisting: &mut HashSet<ExperienceId>,
) {
    for (experience_id, submissions) in entries {
        preexisting.insert(experience_id.clone());
        let delta = deltas.entry(experience_id.clone()).or_default();
        let mut synced: HashMap<EntryId, Entry> = HashMap::new();

        for submission in submissions {
            delta.submitted_entries.insert(submission.client_id.clone());
            match submission.outcome {
                EntryOutcome::Created(entry) => {
                    if ledgers
                        .unsynced
                        .remove_offline_entry(&experience_id, &submission.client_id)
                        .is_some()
                    {
                        synced.insert(submission.client_id, entry);
                    } else {
                        warn!(id = %submission.client_id, "entry result for unknown entry, dropping");
                    }
                }
                EntryOutcome::Failed(error) => {
                    ledgers.unsynced.hold_entry(submission.client_id.clone());
                    delta
                        .create_entry_failures
                        .insert(submission.client_id, error);
                }
            }
        }

        if !synced.is_empty() {
            data.synced_entries
                .entry(experience_id)
                .or_default()
                .extend(synced);
        }
    }
}

fn reconcile_updates(
    ledgers: &mut Ledgers,
    updated: Vec<UpdateSubmission>,
    deltas: &mut HashMap<ExperienceId, PassDelta>,
    preexisting: &mut HashSet<ExperienceId>,
) {
    for submission in updated {
        if ledgers
            .unsynced
            .remove_pending_update(&submission.experience_id)
            .is_none()
        {
            warn!(id = %submission.experience_id, "update result for unknown experience, dropping");
            continue;
        }
        preexisting.insert(submission.experience_id.clone());
        let delta = deltas.entry(submission.experience_id).or_default();

        if let Some(own_fields) = submission.own_fields {
            delta.own_fields_submitted = true;
            delta.own_fields_failure = own_fields.err();
        }
        for (definition_id, outcome) in submission.definitions {
            delta.submitted_definitions.insert(definition_id.clone());
            if let Err(error) = outcome {
                delta.definition_failures.insert(definition_id, error);
            }
        }
        for (entry_id, outcome) in submission.updated_entries {
            delta.submitted_updated_entries.insert(entry_id.clone());
            if let EntryUpdateOutcome::Failed(error) = outcome {
                delta.update_entry_failures.insert(entry_id, error);
            }
        }
    }
}
