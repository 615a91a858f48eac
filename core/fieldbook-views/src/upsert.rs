//! The entry-upsert view: create a new entry or edit an existing one.
//!
//! A form over the experience's definitions. Inputs validate locally
//! against each definition's declared type before anything is submitted;
//! the submit path is chosen by connectivity (offline entries go to the
//! unsynced cache, online ones straight to the transport). Server
//! validation errors fold back onto the offending fields, and editing an
//! errored field clears its message optimistically.

use crate::machine::{Dispatcher, Effects, Machine, Timeouts};
use async_trait::async_trait;
use fieldbook_broadcast::BroadcastMessage;
use fieldbook_sync::{
    EntryOutcome, EntryUpdateOutcome, ExperienceUpdate, SyncContext,
};
use fieldbook_types::{
    CreateEntryError, DataObject, DataType, DataValue, Definition, DefinitionId, Entry,
    Experience, ExperienceId, OnSyncedData, UpdateEntryError,
};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

/// One form field, bound to a definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldState {
    pub definition: Definition,
    pub input: String,
    pub error: Option<String>,
}

/// Whether the form creates a new entry or edits an existing one.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertMode {
    Create,
    Update { original: Entry },
}

/// Loaded-form substates.
#[derive(Debug, Clone, PartialEq)]
pub struct FormData {
    pub experience: Experience,
    pub mode: UpsertMode,
    pub fields: Vec<FieldState>,
    /// Whole-entry failure message.
    pub banner: Option<String>,
    pub submitting: bool,
    /// Set when the submission finished; the host closes the form. The
    /// flag says whether the entry went to the server or only the cache.
    pub completed: Option<Completed>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completed {
    pub entry: Entry,
    pub offline: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpsertValue {
    Loading {
        id: ExperienceId,
        entry: Option<Entry>,
    },
    Errors {
        error: String,
    },
    Data(Box<FormData>),
}

/// Full view state: the tagged value plus this transition's effects.
#[derive(Debug)]
pub struct UpsertState {
    pub value: UpsertValue,
    pub effects: Effects<UpsertEffect>,
}

impl UpsertState {
    /// State for a form mounted on the given experience; `entry` switches
    /// the form into edit mode.
    #[must_use]
    pub fn initial(id: ExperienceId, entry: Option<Entry>) -> Self {
        Self {
            value: UpsertValue::Loading { id, entry },
            effects: Effects::none(),
        }
    }

    fn next(&self, value: UpsertValue) -> Self {
        Self {
            value,
            effects: Effects::none(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum UpsertAction {
    Mounted,
    Loaded { experience: Experience },
    LoadFailed { message: String },
    FieldChanged { index: usize, input: String },
    Submit,
    SubmitSucceeded { entry: Entry },
    SavedOffline { entry: Entry },
    SubmitFailedCreate(CreateEntryError),
    SubmitFailedUpdate(UpdateEntryError),
    SubmitFailedTransport { message: String },
    /// A sync pass completed while the form was open; identity swaps must
    /// reach edit-in-progress state too.
    SyncReceived(OnSyncedData),
}

/// How a validated submission should travel.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitMode {
    Create,
    Update { original: Entry },
}

#[derive(Debug, Clone)]
pub enum UpsertEffect {
    LoadExperience {
        id: ExperienceId,
    },
    Submit {
        experience_id: ExperienceId,
        values: Vec<(DefinitionId, DataValue)>,
        mode: SubmitMode,
    },
}

/// The entry-upsert machine.
pub struct UpsertMachine;

/// Renders a value back into its form-input representation.
#[must_use]
pub fn input_string(value: &DataValue) -> String {
    match value {
        DataValue::Integer(n) => n.to_string(),
        DataValue::Decimal(n) => n.to_string(),
        DataValue::SingleLineText(s) | DataValue::MultiLineText(s) => s.clone(),
        DataValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        DataValue::Datetime(dt) => dt.to_rfc3339(),
    }
}

/// Validates one raw input against a declared type.
fn parse_input(data_type: DataType, input: &str) -> Result<DataValue, String> {
    let trimmed = input.trim();
    match data_type {
        DataType::Integer => trimmed
            .parse::<i64>()
            .map(DataValue::Integer)
            .map_err(|_| format!("`{trimmed}` is not an integer")),
        DataType::Decimal => trimmed
            .parse::<f64>()
            .map(DataValue::Decimal)
            .map_err(|_| format!("`{trimmed}` is not a decimal")),
        DataType::SingleLineText => Ok(DataValue::SingleLineText(input.to_string())),
        DataType::MultiLineText => Ok(DataValue::MultiLineText(input.to_string())),
        DataType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(DataValue::Date)
            .map_err(|_| format!("`{trimmed}` is not a date (YYYY-MM-DD)")),
        DataType::Datetime => DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| DataValue::Datetime(dt.with_timezone(&Utc)))
            .map_err(|_| format!("`{trimmed}` is not a datetime")),
    }
}

fn form_from_experience(experience: Experience, entry: Option<Entry>) -> FormData {
    let fields = experience
        .definitions
        .iter()
        .map(|definition| {
            let input = entry
                .as_ref()
                .and_then(|e| e.data_for(&definition.id))
                .map(input_string)
                .unwrap_or_default();
            FieldState {
                definition: definition.clone(),
                input,
                error: None,
            }
        })
        .collect();
    let mode = match entry {
        Some(original) => UpsertMode::Update { original },
        None => UpsertMode::Create,
    };
    FormData {
        experience,
        mode,
        fields,
        banner: None,
        submitting: false,
        completed: None,
    }
}

fn fold_create_failure(data: &mut FormData, error: &CreateEntryError) {
    if let Some(message) = &error.error {
        data.banner = Some(message.clone());
    }
    for data_error in &error.data_objects {
        let Some(field) = data.fields.get_mut(data_error.index) else {
            debug!(index = data_error.index, "error for unknown field, dropping");
            continue;
        };
        field.error = data_error
            .data
            .clone()
            .or_else(|| data_error.definition.clone())
            .or_else(|| data_error.definition_id.clone())
            .or_else(|| data_error.error.clone());
    }
}

fn fold_update_failure(data: &mut FormData, error: &UpdateEntryError) {
    match error {
        UpdateEntryError::Entry(message) => {
            data.banner = Some(message.clone());
        }
        UpdateEntryError::DataObjects(map) => {
            let UpsertMode::Update { original } = &data.mode else {
                data.banner = Some("entry update rejected".to_string());
                return;
            };
            for (data_object_id, field_error) in map {
                let Some(definition_id) = original
                    .data_objects
                    .iter()
                    .find(|d| &d.id == data_object_id)
                    .map(|d| d.definition_id.clone())
                else {
                    continue;
                };
                if let Some(field) = data
                    .fields
                    .iter_mut()
                    .find(|f| f.definition.id == definition_id)
                {
                    field.error = field_error
                        .data
                        .clone()
                        .or_else(|| field_error.definition.clone());
                }
            }
        }
    }
}

#[async_trait]
impl Machine for UpsertMachine {
    type State = UpsertState;
    type Action = UpsertAction;
    type Effect = UpsertEffect;
    type TimerKey = ();

    fn reduce(state: &UpsertState, action: UpsertAction) -> UpsertState {
        match action {
            UpsertAction::Mounted => match &state.value {
                UpsertValue::Loading { id, .. } => {
                    let mut next = state.next(state.value.clone());
                    next.effects
                        .push(UpsertEffect::LoadExperience { id: id.clone() });
                    next
                }
                _ => state.next(state.value.clone()),
            },

            UpsertAction::Loaded { experience } => match &state.value {
                UpsertValue::Loading { entry, .. } => state.next(UpsertValue::Data(Box::new(
                    form_from_experience(experience, entry.clone()),
                ))),
                _ => {
                    debug!("experience arrived outside loading, dropping");
                    state.next(state.value.clone())
                }
            },

            UpsertAction::LoadFailed { message } => match &state.value {
                UpsertValue::Loading { .. } => state.next(UpsertValue::Errors { error: message }),
                _ => state.next(state.value.clone()),
            },

            UpsertAction::FieldChanged { index, input } => match &state.value {
                UpsertValue::Data(data) => {
                    let mut data = data.clone();
                    if let Some(field) = data.fields.get_mut(index) {
                        field.input = input;
                        // Editing clears the field's displayed error without
                        // waiting for the next round trip.
                        field.error = None;
                        data.banner = None;
                    }
                    state.next(UpsertValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },

            UpsertAction::Submit => match &state.value {
                UpsertValue::Data(data) if !data.submitting => {
                    let mut data = data.clone();
                    let mut values = Vec::with_capacity(data.fields.len());
                    let mut invalid = false;
                    for field in &mut data.fields {
                        match parse_input(field.definition.data_type, &field.input) {
                            Ok(value) => values.push((field.definition.id.clone(), value)),
                            Err(message) => {
                                field.error = Some(message);
                                invalid = true;
                            }
                        }
                    }
                    if invalid {
                        return state.next(UpsertValue::Data(data));
                    }
                    data.submitting = true;
                    let experience_id = data.experience.id.clone();
                    let mode = match &data.mode {
                        UpsertMode::Create => SubmitMode::Create,
                        UpsertMode::Update { original } => SubmitMode::Update {
                            original: original.clone(),
                        },
                    };
                    let mut next = state.next(UpsertValue::Data(data));
                    next.effects.push(UpsertEffect::Submit {
                        experience_id,
                        values,
                        mode,
                    });
                    next
                }
                _ => state.next(state.value.clone()),
            },

            UpsertAction::SubmitSucceeded { entry } => match &state.value {
                UpsertValue::Data(data) if data.submitting => {
                    let mut data = data.clone();
                    data.submitting = false;
                    data.completed = Some(Completed {
                        entry,
                        offline: false,
                    });
                    state.next(UpsertValue::Data(data))
                }
                _ => {
                    debug!("submit result arrived outside submitting, dropping");
                    state.next(state.value.clone())
                }
            },

            UpsertAction::SavedOffline { entry } => match &state.value {
                UpsertValue::Data(data) if data.submitting => {
                    let mut data = data.clone();
                    data.submitting = false;
                    data.completed = Some(Completed {
                        entry,
                        offline: true,
                    });
                    state.next(UpsertValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },

            UpsertAction::SubmitFailedCreate(error) => match &state.value {
                UpsertValue::Data(data) if data.submitting => {
                    let mut data = data.clone();
                    data.submitting = false;
                    fold_create_failure(&mut data, &error);
                    state.next(UpsertValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },

            UpsertAction::SubmitFailedUpdate(error) => match &state.value {
                UpsertValue::Data(data) if data.submitting => {
                    let mut data = data.clone();
                    data.submitting = false;
                    fold_update_failure(&mut data, &error);
                    state.next(UpsertValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },

            UpsertAction::SubmitFailedTransport { message } => match &state.value {
                UpsertValue::Data(data) if data.submitting => {
                    let mut data = data.clone();
                    data.submitting = false;
                    data.banner = Some(message);
                    state.next(UpsertValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },

            UpsertAction::SyncReceived(synced) => match &state.value {
                UpsertValue::Loading { id, entry } => {
                    let (id, entry) = swap_edit_identity(id.clone(), entry.clone(), &synced);
                    state.next(UpsertValue::Loading { id, entry })
                }
                UpsertValue::Data(data) => {
                    let mut data = data.clone();
                    let entry = match &data.mode {
                        UpsertMode::Update { original } => Some(original.clone()),
                        UpsertMode::Create => None,
                    };
                    let (id, entry) =
                        swap_edit_identity(data.experience.id.clone(), entry, &synced);
                    data.experience.id = id;
                    if let Some(original) = entry {
                        data.mode = UpsertMode::Update { original };
                    }
                    state.next(UpsertValue::Data(data))
                }
                _ => state.next(state.value.clone()),
            },
        }
    }

    fn take_effects(state: &mut UpsertState) -> Vec<UpsertEffect> {
        state.effects.take()
    }

    async fn run_effect(
        effect: UpsertEffect,
        ctx: &SyncContext,
        _timeouts: &mut Timeouts<()>,
        dispatch: Dispatcher<UpsertAction>,
    ) {
        match effect {
            UpsertEffect::LoadExperience { id } => {
                if id.is_offline() {
                    let ledgers = ctx.ledgers.read().await;
                    match ledgers.unsynced.offline_experience(&id) {
                        Some(experience) => dispatch.dispatch(UpsertAction::Loaded {
                            experience: experience.clone(),
                        }),
                        None => dispatch.dispatch(UpsertAction::LoadFailed {
                            message: format!("experience {id} not found"),
                        }),
                    }
                    return;
                }
                match ctx
                    .transport
                    .fetch_detail(&id, fieldbook_types::Pagination::first(1))
                    .await
                {
                    Ok(experience) => dispatch.dispatch(UpsertAction::Loaded { experience }),
                    Err(e) => dispatch.dispatch(UpsertAction::LoadFailed {
                        message: e.to_string(),
                    }),
                }
            }

            UpsertEffect::Submit {
                experience_id,
                values,
                mode,
            } => {
                let online = ctx.connectivity.current() == Some(true)
                    && !experience_id.is_offline();
                match mode {
                    SubmitMode::Create => {
                        let data_objects = values
                            .into_iter()
                            .map(|(definition_id, value)| {
                                DataObject::offline(definition_id, value)
                            })
                            .collect();
                        let entry = Entry::offline(experience_id.clone(), data_objects);
                        if online {
                            submit_create_online(ctx, &experience_id, entry, &dispatch).await;
                        } else {
                            ctx.ledgers.write().await.unsynced.add_offline_entry(entry.clone());
                            ctx.persist_logged().await;
                            dispatch.dispatch(UpsertAction::SavedOffline { entry });
                        }
                    }
                    SubmitMode::Update { original } => {
                        let mut entry = original;
                        for data_object in &mut entry.data_objects {
                            if let Some((_, value)) = values
                                .iter()
                                .find(|(id, _)| id == &data_object.definition_id)
                            {
                                data_object.data = value.clone();
                            }
                        }
                        if online {
                            submit_update_online(ctx, &experience_id, entry, &dispatch).await;
                        } else {
                            save_update_offline(ctx, &experience_id, entry, &dispatch).await;
                        }
                    }
                }
            }
        }
    }

    fn from_broadcast(message: BroadcastMessage) -> Option<UpsertAction> {
        match message {
            BroadcastMessage::SyncCompleted(data) => Some(UpsertAction::SyncReceived(data)),
            // Connectivity is consulted at submit time; deletions close the
            // parent view, which unmounts the form with it.
            _ => None,
        }
    }
}

/// Applies a sync pass's identity swaps to an edit-in-progress target.
fn swap_edit_identity(
    id: ExperienceId,
    entry: Option<Entry>,
    synced: &OnSyncedData,
) -> (ExperienceId, Option<Entry>) {
    let id = synced
        .offline_experience_map
        .get(&id)
        .cloned()
        .unwrap_or(id);
    let entry = entry.map(|mut entry| {
        entry.experience_id = id.clone();
        if let Some(server_entry) = synced
            .synced_entries
            .get(&id)
            .and_then(|map| map.get(&entry.id))
        {
            server_entry.clone()
        } else {
            entry
        }
    });
    (id, entry)
}

async fn submit_create_online(
    ctx: &SyncContext,
    experience_id: &ExperienceId,
    entry: Entry,
    dispatch: &Dispatcher<UpsertAction>,
) {
    match ctx
        .transport
        .sync_create_entries(experience_id, vec![entry])
        .await
    {
        Ok(submissions) => match submissions.into_iter().next().map(|s| s.outcome) {
            Some(EntryOutcome::Created(entry)) => {
                dispatch.dispatch(UpsertAction::SubmitSucceeded { entry });
            }
            Some(EntryOutcome::Failed(error)) => {
                dispatch.dispatch(UpsertAction::SubmitFailedCreate(error));
            }
            None => dispatch.dispatch(UpsertAction::SubmitFailedTransport {
                message: "no result for submitted entry".to_string(),
            }),
        },
        Err(e) => {
            warn!("entry create failed in transit: {e}");
            dispatch.dispatch(UpsertAction::SubmitFailedTransport {
                message: e.to_string(),
            });
        }
    }
}

async fn submit_update_online(
    ctx: &SyncContext,
    experience_id: &ExperienceId,
    entry: Entry,
    dispatch: &Dispatcher<UpsertAction>,
) {
    let mut update = ExperienceUpdate::new(experience_id.clone());
    update.updated_entries.push(entry);
    match ctx.transport.sync_update_experiences(vec![update]).await {
        Ok(submissions) => {
            let outcome = submissions
                .into_iter()
                .next()
                .and_then(|s| s.updated_entries.into_iter().next());
            match outcome {
                Some((_, EntryUpdateOutcome::Updated(entry))) => {
                    dispatch.dispatch(UpsertAction::SubmitSucceeded { entry });
                }
                Some((_, EntryUpdateOutcome::Failed(error))) => {
                    dispatch.dispatch(UpsertAction::SubmitFailedUpdate(error));
                }
                None => dispatch.dispatch(UpsertAction::SubmitFailedTransport {
                    message: "no result for submitted entry".to_string(),
                }),
            }
        }
        Err(e) => {
            warn!("entry update failed in transit: {e}");
            dispatch.dispatch(UpsertAction::SubmitFailedTransport {
                message: e.to_string(),
            });
        }
    }
}

async fn save_update_offline(
    ctx: &SyncContext,
    experience_id: &ExperienceId,
    entry: Entry,
    dispatch: &Dispatcher<UpsertAction>,
) {
    {
        let mut ledgers = ctx.ledgers.write().await;
        if entry.id.is_offline() {
            // Editing a not-yet-synced entry replaces the cached copy.
            ledgers.unsynced.restage_entry(entry.clone());
        } else {
            let mut update = ledgers
                .unsynced
                .update_for(experience_id)
                .cloned()
                .unwrap_or_else(|| ExperienceUpdate::new(experience_id.clone()));
            update.updated_entries.retain(|e| e.id != entry.id);
            update.updated_entries.push(entry.clone());
            ledgers.unsynced.stage_update(update);
        }
    }
    ctx.persist_logged().await;
    dispatch.dispatch(UpsertAction::SavedOffline { entry });
}
