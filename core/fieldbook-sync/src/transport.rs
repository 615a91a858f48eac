//! Transport layer abstraction.
//!
//! Defines the trait the sync engine uses to talk to the server, plus the
//! per-entity result unions it returns. Every submission result is either a
//! success value (server-assigned identity plus canonical fields) or a typed
//! error mirroring the mutation that produced it; a transport-level failure
//! fails the whole call instead.

use crate::error::SyncResult;
use async_trait::async_trait;
use fieldbook_types::{
    CreateEntryError, CreateExperienceError, Definition, DefinitionId, Entry, EntryId,
    Experience, ExperienceId, OwnFieldsError, Page, Pagination, UpdateEntryError,
};
use serde::{Deserialize, Serialize};

/// Result of submitting one offline-created experience.
#[derive(Debug, Clone)]
pub struct ExperienceSubmission {
    /// The offline id the client submitted under.
    pub client_id: ExperienceId,
    pub outcome: ExperienceOutcome,
}

/// Success-or-error union for an experience create.
#[derive(Debug, Clone)]
pub enum ExperienceOutcome {
    /// Created server-side; `entries` carries one result per submitted entry.
    Created {
        experience: Experience,
        entries: Vec<EntrySubmission>,
    },
    /// Rejected with a typed validation error.
    Failed(CreateExperienceError),
}

/// Result of submitting one offline-created entry.
#[derive(Debug, Clone)]
pub struct EntrySubmission {
    /// The offline id the client submitted under.
    pub client_id: EntryId,
    pub outcome: EntryOutcome,
}

/// Success-or-error union for an entry create.
#[derive(Debug, Clone)]
pub enum EntryOutcome {
    Created(Entry),
    Failed(CreateEntryError),
}

/// Success-or-error union for an entry update.
#[derive(Debug, Clone)]
pub enum EntryUpdateOutcome {
    Updated(Entry),
    Failed(UpdateEntryError),
}

/// Pending updates to one online experience, staged while offline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceUpdate {
    pub experience_id: ExperienceId,
    /// Own scalar fields to update.
    pub title: Option<String>,
    pub description: Option<String>,
    /// Definitions to update.
    pub definitions: Vec<Definition>,
    /// Edited entries to update.
    pub updated_entries: Vec<Entry>,
}

impl ExperienceUpdate {
    /// An empty update for the given experience.
    #[must_use]
    pub fn new(experience_id: ExperienceId) -> Self {
        Self {
            experience_id,
            ..Default::default()
        }
    }

    /// Whether there is nothing to submit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.definitions.is_empty()
            && self.updated_entries.is_empty()
    }
}

/// Result of submitting one experience's pending updates.
#[derive(Debug, Clone)]
pub struct UpdateSubmission {
    pub experience_id: ExperienceId,
    /// Own-fields outcome, present when own fields were submitted.
    pub own_fields: Option<Result<(), OwnFieldsError>>,
    /// One outcome per submitted definition.
    pub definitions: Vec<(DefinitionId, Result<Definition, fieldbook_types::DefinitionError>)>,
    /// One outcome per submitted entry edit.
    pub updated_entries: Vec<(EntryId, EntryUpdateOutcome)>,
}

/// Result of deleting one experience.
#[derive(Debug, Clone)]
pub enum DeleteOutcome {
    Deleted { id: ExperienceId },
    Failed { id: ExperienceId, error: String },
}

/// The server-facing transport.
///
/// Implementations wrap the actual wire protocol; the engine only depends
/// on this trait. All batch calls return one result per input, in input
/// order.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Creates offline experiences (their offline entries included).
    async fn sync_create_experiences(
        &self,
        experiences: Vec<Experience>,
    ) -> SyncResult<Vec<ExperienceSubmission>>;

    /// Creates offline entries under an online experience.
    async fn sync_create_entries(
        &self,
        experience_id: &ExperienceId,
        entries: Vec<Entry>,
    ) -> SyncResult<Vec<EntrySubmission>>;

    /// Applies pending updates to online experiences.
    async fn sync_update_experiences(
        &self,
        updates: Vec<ExperienceUpdate>,
    ) -> SyncResult<Vec<UpdateSubmission>>;

    /// Fetches one experience with a page of entries.
    async fn fetch_detail(
        &self,
        id: &ExperienceId,
        pagination: Pagination,
    ) -> SyncResult<Experience>;

    /// Fetches a page of experiences.
    async fn fetch_list(&self, pagination: Pagination) -> SyncResult<Page<Experience>>;

    /// Deletes experiences, one outcome per id.
    async fn delete_experiences(
        &self,
        ids: Vec<ExperienceId>,
    ) -> SyncResult<Vec<DeleteOutcome>>;
}

/// A mock transport for testing.
pub mod mock {
    use super::*;
    use fieldbook_types::{DataObject, DataObjectId};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Counters for how often each transport call ran.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct CallCounts {
        pub create_experiences: usize,
        pub create_entries: usize,
        pub update_experiences: usize,
        pub fetch_detail: usize,
        pub fetch_list: usize,
        pub delete_experiences: usize,
    }

    #[derive(Default)]
    struct Inner {
        next_id: u64,
        create_experiences: VecDeque<SyncResult<Vec<ExperienceSubmission>>>,
        create_entries: VecDeque<SyncResult<Vec<EntrySubmission>>>,
        update_experiences: VecDeque<SyncResult<Vec<UpdateSubmission>>>,
        fetch_detail: VecDeque<SyncResult<Experience>>,
        fetch_list: VecDeque<SyncResult<Page<Experience>>>,
        delete_experiences: VecDeque<SyncResult<Vec<DeleteOutcome>>>,
        calls: CallCounts,
    }

    /// Scripted transport: queued responses are consumed first; with no
    /// script, submissions auto-succeed with freshly minted server ids.
    #[derive(Default)]
    pub struct MockTransport {
        inner: Mutex<Inner>,
    }

    impl MockTransport {
        /// Creates an auto-succeeding mock transport.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues a response for the next `sync_create_experiences` call.
        pub fn script_create_experiences(
            &self,
            result: SyncResult<Vec<ExperienceSubmission>>,
        ) {
            self.inner.lock().unwrap().create_experiences.push_back(result);
        }

        /// Queues a response for the next `sync_create_entries` call.
        pub fn script_create_entries(&self, result: SyncResult<Vec<EntrySubmission>>) {
            self.inner.lock().unwrap().create_entries.push_back(result);
        }

        /// Queues a response for the next `sync_update_experiences` call.
        pub fn script_update_experiences(&self, result: SyncResult<Vec<UpdateSubmission>>) {
            self.inner.lock().unwrap().update_experiences.push_back(result);
        }

        /// Queues a response for the next `fetch_detail` call.
        pub fn script_fetch_detail(&self, result: SyncResult<Experience>) {
            self.inner.lock().unwrap().fetch_detail.push_back(result);
        }

        /// Queues a response for the next `fetch_list` call.
        pub fn script_fetch_list(&self, result: SyncResult<Page<Experience>>) {
            self.inner.lock().unwrap().fetch_list.push_back(result);
        }

        /// Queues a response for the next `delete_experiences` call.
        pub fn script_delete_experiences(&self, result: SyncResult<Vec<DeleteOutcome>>) {
            self.inner.lock().unwrap().delete_experiences.push_back(result);
        }

        /// Call counters so far.
        #[must_use]
        pub fn calls(&self) -> CallCounts {
            self.inner.lock().unwrap().calls
        }

        fn mint(inner: &mut Inner, kind: &str) -> String {
            inner.next_id += 1;
            format!("srv-{kind}-{}", inner.next_id)
        }

        fn server_entry(inner: &mut Inner, experience_id: &ExperienceId, entry: &Entry) -> Entry {
            let data_objects = entry
                .data_objects
                .iter()
                .map(|d| DataObject {
                    id: DataObjectId::from(Self::mint(inner, "dob")),
                    definition_id: d.definition_id.clone(),
                    data: d.data.clone(),
                })
                .collect();
            Entry {
                id: EntryId::from(Self::mint(inner, "ent")),
                experience_id: experience_id.clone(),
                data_objects,
                inserted_at: entry.inserted_at,
            }
        }

        fn server_experience(inner: &mut Inner, offline: &Experience) -> ExperienceSubmission {
            let server_id = ExperienceId::from(Self::mint(inner, "exp"));
            let definitions: Vec<Definition> = offline
                .definitions
                .iter()
                .map(|d| Definition {
                    id: DefinitionId::from(Self::mint(inner, "def")),
                    name: d.name.clone(),
                    data_type: d.data_type,
                })
                .collect();
            let entries: Vec<EntrySubmission> = offline
                .entries
                .items
                .iter()
                .map(|entry| EntrySubmission {
                    client_id: entry.id.clone(),
                    outcome: EntryOutcome::Created(Self::server_entry(
                        inner, &server_id, entry,
                    )),
                })
                .collect();
            let mut experience = Experience::new(server_id, offline.title.clone(), definitions);
            experience.description = offline.description.clone();
            ExperienceSubmission {
                client_id: offline.id.clone(),
                outcome: ExperienceOutcome::Created {
                    experience,
                    entries,
                },
            }
        }
    }

    #[async_trait]
    impl SyncTransport for MockTransport {
        async fn sync_create_experiences(
            &self,
            experiences: Vec<Experience>,
        ) -> SyncResult<Vec<ExperienceSubmission>> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.create_experiences += 1;
            if let Some(scripted) = inner.create_experiences.pop_front() {
                return scripted;
            }
            Ok(experiences
                .iter()
                .map(|e| Self::server_experience(&mut inner, e))
                .collect())
        }

        async fn sync_create_entries(
            &self,
            experience_id: &ExperienceId,
            entries: Vec<Entry>,
        ) -> SyncResult<Vec<EntrySubmission>> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.create_entries += 1;
            if let Some(scripted) = inner.create_entries.pop_front() {
                return scripted;
            }
            Ok(entries
                .iter()
                .map(|entry| EntrySubmission {
                    client_id: entry.id.clone(),
                    outcome: EntryOutcome::Created(Self::server_entry(
                        &mut inner,
                        experience_id,
                        entry,
                    )),
                })
                .collect())
        }

        async fn sync_update_experiences(
            &self,
            updates: Vec<ExperienceUpdate>,
        ) -> SyncResult<Vec<UpdateSubmission>> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.update_experiences += 1;
            if let Some(scripted) = inner.update_experiences.pop_front() {
                return scripted;
            }
            Ok(updates
                .into_iter()
                .map(|update| UpdateSubmission {
                    experience_id: update.experience_id.clone(),
                    own_fields: (update.title.is_some() || update.description.is_some())
                        .then_some(Ok(())),
                    definitions: update
                        .definitions
                        .into_iter()
                        .map(|d| (d.id.clone(), Ok(d)))
                        .collect(),
                    updated_entries: update
                        .updated_entries
                        .into_iter()
                        .map(|entry| {
                            (entry.id.clone(), EntryUpdateOutcome::Updated(entry))
                        })
                        .collect(),
                })
                .collect())
        }

        async fn fetch_detail(
            &self,
            id: &ExperienceId,
            _pagination: Pagination,
        ) -> SyncResult<Experience> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.fetch_detail += 1;
            if let Some(scripted) = inner.fetch_detail.pop_front() {
                return scripted;
            }
            Ok(Experience::new(id.clone(), "mock experience", Vec::new()))
        }

        async fn fetch_list(&self, _pagination: Pagination) -> SyncResult<Page<Experience>> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.fetch_list += 1;
            if let Some(scripted) = inner.fetch_list.pop_front() {
                return scripted;
            }
            Ok(Page::default())
        }

        async fn delete_experiences(
            &self,
            ids: Vec<ExperienceId>,
        ) -> SyncResult<Vec<DeleteOutcome>> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.delete_experiences += 1;
            if let Some(scripted) = inner.delete_experiences.pop_front() {
                return scripted;
            }
            Ok(ids.into_iter().map(|id| DeleteOutcome::Deleted { id }).collect())
        }
    }
}
