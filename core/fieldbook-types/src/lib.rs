//! Core type definitions for fieldbook.
//!
//! An offline-first client for structured records: experiences contain
//! typed definitions and entries; entries carry one data object per
//! definition. Entities created while disconnected get offline identifiers
//! (see [`ids`]) until a sync pass swaps them for server-assigned ones.

pub mod errors;
pub mod ids;
pub mod on_synced;
pub mod record;
pub mod status;

pub use errors::{
    CreateEntryError, CreateExperienceError, DataObjectError, DataObjectFieldError,
    DefinitionError, DefinitionErrorSummary, DisplayedErrors, EntryErrorSummary,
    ExperienceSyncErrors, FieldErrors, OwnFieldsError, UpdateEntryError, fold_create_entry_error,
    fold_definition_error, fold_experience_errors, fold_own_fields_error, fold_update_entry_error,
};
pub use ids::{
    DataObjectId, DefinitionId, EntryId, ExperienceId, OFFLINE_ID_PREFIX, is_offline_id,
    make_offline_id,
};
pub use on_synced::OnSyncedData;
pub use record::{
    DataObject, DataType, DataValue, Definition, Entry, Experience, Page, PageInfo, Pagination,
    ValueParseError,
};
pub use status::OnlineStatus;
