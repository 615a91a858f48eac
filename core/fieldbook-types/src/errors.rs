//! Typed server validation errors and display folding.
//!
//! Each mutation kind reports failures in its own shape. The shapes are
//! stored verbatim in the sync error ledger; the fold helpers below turn
//! them into ordered display lists ("entry #N: field X: message"). Display
//! lists are rebuilt from scratch on every fold, never merged incrementally,
//! so a stale line cannot survive a resubmission.

use crate::ids::{DataObjectId, DefinitionId, EntryId};
use crate::record::{Definition, Entry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Error on an experience's own scalar fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnFieldsError {
    pub title: Option<String>,
}

/// Error on a single definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionError {
    pub id: DefinitionId,
    pub name: Option<String>,
    pub data_type: Option<String>,
    /// Non-specific message, not attributable to one field.
    pub error: Option<String>,
}

impl DefinitionError {
    /// A definition error carrying only a non-specific message.
    #[must_use]
    pub fn general(id: DefinitionId, message: impl Into<String>) -> Self {
        Self {
            id,
            name: None,
            data_type: None,
            error: Some(message.into()),
        }
    }
}

/// Error on one data object within a failed entry create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataObjectError {
    /// Position of the data object within the entry, 0-based wire value.
    pub index: usize,
    pub definition: Option<String>,
    pub definition_id: Option<String>,
    pub data: Option<String>,
    /// Non-specific message, not attributable to one field.
    pub error: Option<String>,
}

/// A failed entry create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEntryError {
    /// Whole-entry message.
    pub error: Option<String>,
    pub data_objects: Vec<DataObjectError>,
}

impl CreateEntryError {
    /// An entry create error carrying only a whole-entry message.
    #[must_use]
    pub fn general(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            data_objects: Vec::new(),
        }
    }
}

/// Per-data-object messages for a failed entry update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataObjectFieldError {
    pub data: Option<String>,
    pub definition: Option<String>,
}

/// A failed entry update.
///
/// The server reports either a single whole-entry message or a map keyed by
/// data object id. Both shapes are real; they are kept distinct rather than
/// normalized into one representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "error", rename_all = "camelCase")]
pub enum UpdateEntryError {
    /// Whole-entry failure.
    Entry(String),
    /// Per-data-object failures.
    DataObjects(BTreeMap<DataObjectId, DataObjectFieldError>),
}

/// A failed experience create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateExperienceError {
    pub title: Option<String>,
    /// Non-specific message.
    pub error: Option<String>,
    pub definitions: Vec<DefinitionError>,
}

/// Everything still failing for one experience.
///
/// This is the value the sync error ledger stores per experience id. Writes
/// replace the whole value; `is_empty` drives the cascading clear of the
/// experience's aggregate error flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceSyncErrors {
    pub create_experience: Option<CreateExperienceError>,
    pub own_fields: Option<OwnFieldsError>,
    pub definitions: HashMap<DefinitionId, DefinitionError>,
    pub create_entries: HashMap<EntryId, CreateEntryError>,
    pub update_entries: HashMap<EntryId, UpdateEntryError>,
}

impl ExperienceSyncErrors {
    /// Whether no error remains anywhere under this experience.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create_experience.is_none()
            && self.own_fields.is_none()
            && self.definitions.is_empty()
            && self.create_entries.is_empty()
            && self.update_entries.is_empty()
    }
}

/// Ordered (field label, message) pairs. The label is empty for a message
/// not attributable to one field.
pub type FieldErrors = Vec<(String, String)>;

/// One entry's folded errors, positioned for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryErrorSummary {
    /// 1-based position of the entry in its containing list.
    pub index: usize,
    pub id: EntryId,
    pub errors: FieldErrors,
}

/// One definition's folded errors, positioned for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionErrorSummary {
    /// 1-based position of the definition in its containing list.
    pub index: usize,
    pub id: DefinitionId,
    pub errors: FieldErrors,
}

/// The full folded error view for one experience.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayedErrors {
    /// Experience-level messages (own fields, create-experience failure).
    pub experience: FieldErrors,
    pub definitions: Vec<DefinitionErrorSummary>,
    pub entries: Vec<EntryErrorSummary>,
}

impl DisplayedErrors {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experience.is_empty() && self.definitions.is_empty() && self.entries.is_empty()
    }
}

fn definition_label(definitions: &[Definition], index: usize) -> String {
    definitions
        .get(index)
        .map(|d| d.name.clone())
        .unwrap_or_default()
}

/// Folds an own-fields error into display pairs.
#[must_use]
pub fn fold_own_fields_error(error: &OwnFieldsError) -> FieldErrors {
    let mut out = Vec::new();
    if let Some(msg) = &error.title {
        out.push(("title".to_string(), msg.clone()));
    }
    out
}

/// Folds a definition error into display pairs.
#[must_use]
pub fn fold_definition_error(error: &DefinitionError) -> FieldErrors {
    let mut out = Vec::new();
    if let Some(msg) = &error.name {
        out.push(("name".to_string(), msg.clone()));
    }
    if let Some(msg) = &error.data_type {
        out.push(("type".to_string(), msg.clone()));
    }
    if let Some(msg) = &error.error {
        out.push((String::new(), msg.clone()));
    }
    out
}

/// Folds an entry create error into display pairs, resolving data-object
/// positions to definition names where possible.
#[must_use]
pub fn fold_create_entry_error(
    error: &CreateEntryError,
    definitions: &[Definition],
) -> FieldErrors {
    let mut out = Vec::new();
    if let Some(msg) = &error.error {
        out.push((String::new(), msg.clone()));
    }
    for data_error in &error.data_objects {
        let label = definition_label(definitions, data_error.index);
        if let Some(msg) = &data_error.error {
            out.push((String::new(), msg.clone()));
        }
        if let Some(msg) = &data_error.data {
            out.push((label.clone(), msg.clone()));
        }
        if let Some(msg) = &data_error.definition {
            out.push((label.clone(), msg.clone()));
        }
        if let Some(msg) = &data_error.definition_id {
            out.push((label.clone(), msg.clone()));
        }
    }
    out
}

/// Folds an entry update error into display pairs. Map entries resolve
/// through the entry's data objects to definition names.
#[must_use]
pub fn fold_update_entry_error(
    error: &UpdateEntryError,
    entry: &Entry,
    definitions: &[Definition],
) -> FieldErrors {
    match error {
        UpdateEntryError::Entry(msg) => vec![(String::new(), msg.clone())],
        UpdateEntryError::DataObjects(map) => {
            let mut out = Vec::new();
            for (data_object_id, field_error) in map {
                let label = entry
                    .data_objects
                    .iter()
                    .find(|d| &d.id == data_object_id)
                    .and_then(|d| definitions.iter().find(|def| def.id == d.definition_id))
                    .map(|def| def.name.clone())
                    .unwrap_or_default();
                if let Some(msg) = &field_error.data {
                    out.push((label.clone(), msg.clone()));
                }
                if let Some(msg) = &field_error.definition {
                    out.push((label.clone(), msg.clone()));
                }
            }
            out
        }
    }
}

/// Folds the full per-experience aggregate into display order.
///
/// `entries` and `definitions` give the containing-list order; indices in
/// the result are 1-based positions in those lists. Errors keyed by an id
/// absent from the lists are skipped (the entity may have been removed).
#[must_use]
pub fn fold_experience_errors(
    entries: &[Entry],
    definitions: &[Definition],
    errors: &ExperienceSyncErrors,
) -> DisplayedErrors {
    let mut displayed = DisplayedErrors::default();

    if let Some(own) = &errors.own_fields {
        displayed.experience.extend(fold_own_fields_error(own));
    }
    if let Some(create) = &errors.create_experience {
        if let Some(msg) = &create.title {
            displayed.experience.push(("title".to_string(), msg.clone()));
        }
        if let Some(msg) = &create.error {
            displayed.experience.push((String::new(), msg.clone()));
        }
        for def_error in &create.definitions {
            if let Some(pos) = definitions.iter().position(|d| d.id == def_error.id) {
                displayed.definitions.push(DefinitionErrorSummary {
                    index: pos + 1,
                    id: def_error.id.clone(),
                    errors: fold_definition_error(def_error),
                });
            }
        }
    }

    for (index, definition) in definitions.iter().enumerate() {
        if let Some(def_error) = errors.definitions.get(&definition.id) {
            displayed.definitions.push(DefinitionErrorSummary {
                index: index + 1,
                id: definition.id.clone(),
                errors: fold_definition_error(def_error),
            });
        }
    }

    for (index, entry) in entries.iter().enumerate() {
        let mut folded = FieldErrors::new();
        if let Some(create_error) = errors.create_entries.get(&entry.id) {
            folded.extend(fold_create_entry_error(create_error, definitions));
        }
        if let Some(update_error) = errors.update_entries.get(&entry.id) {
            folded.extend(fold_update_entry_error(update_error, entry, definitions));
        }
        if !folded.is_empty() {
            displayed.entries.push(EntryErrorSummary {
                index: index + 1,
                id: entry.id.clone(),
                errors: folded,
            });
        }
    }

    displayed
}
