//! The experience record model.
//!
//! An experience is a titled container with an ordered set of definitions
//! (named, typed fields) and a paginated collection of entries. Each entry
//! holds one data object per definition, carrying a JSON-encoded scalar
//! value typed per the definition's declared type.

use crate::ids::{DataObjectId, DefinitionId, EntryId, ExperienceId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Declared value type of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Integer,
    Decimal,
    SingleLineText,
    MultiLineText,
    Date,
    Datetime,
}

impl DataType {
    /// Human-readable type name, used in validation messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::SingleLineText => "single line text",
            Self::MultiLineText => "multi line text",
            Self::Date => "date",
            Self::Datetime => "datetime",
        }
    }
}

/// Error parsing a JSON-encoded scalar into a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueParseError {
    /// The input was not a valid JSON scalar.
    #[error("invalid JSON scalar `{input}`: {reason}")]
    InvalidScalar { input: String, reason: String },

    /// The scalar did not match the declared type.
    #[error("expected {expected} value, got `{input}`")]
    TypeMismatch {
        expected: &'static str,
        input: String,
    },
}

/// A single field value, typed per its definition.
///
/// Values cross the wire as JSON-encoded scalars; the tagged form here is
/// what the rest of the client works with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataValue {
    Integer(i64),
    Decimal(f64),
    SingleLineText(String),
    MultiLineText(String),
    Date(NaiveDate),
    Datetime(DateTime<Utc>),
}

impl DataValue {
    /// The declared type this value satisfies.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Integer(_) => DataType::Integer,
            Self::Decimal(_) => DataType::Decimal,
            Self::SingleLineText(_) => DataType::SingleLineText,
            Self::MultiLineText(_) => DataType::MultiLineText,
            Self::Date(_) => DataType::Date,
            Self::Datetime(_) => DataType::Datetime,
        }
    }

    /// Whether this value matches the given declared type.
    #[must_use]
    pub fn matches(&self, ty: DataType) -> bool {
        self.data_type() == ty
    }

    /// Parses a JSON-encoded scalar against a declared type.
    pub fn parse(ty: DataType, json: &str) -> Result<Self, ValueParseError> {
        let scalar: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ValueParseError::InvalidScalar {
                input: json.to_string(),
                reason: e.to_string(),
            })?;

        let mismatch = || ValueParseError::TypeMismatch {
            expected: ty.name(),
            input: json.to_string(),
        };

        match ty {
            DataType::Integer => scalar.as_i64().map(Self::Integer).ok_or_else(mismatch),
            DataType::Decimal => scalar.as_f64().map(Self::Decimal).ok_or_else(mismatch),
            DataType::SingleLineText => scalar
                .as_str()
                .map(|s| Self::SingleLineText(s.to_string()))
                .ok_or_else(mismatch),
            DataType::MultiLineText => scalar
                .as_str()
                .map(|s| Self::MultiLineText(s.to_string()))
                .ok_or_else(mismatch),
            DataType::Date => scalar
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .map(Self::Date)
                .ok_or_else(mismatch),
            DataType::Datetime => scalar
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| Self::Datetime(dt.with_timezone(&Utc)))
                .ok_or_else(mismatch),
        }
    }

    /// Serializes back to the wire form (a JSON-encoded scalar).
    #[must_use]
    pub fn to_json_string(&self) -> String {
        let scalar = match self {
            Self::Integer(n) => serde_json::Value::from(*n),
            Self::Decimal(n) => serde_json::Value::from(*n),
            Self::SingleLineText(s) | Self::MultiLineText(s) => {
                serde_json::Value::String(s.clone())
            }
            Self::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            Self::Datetime(dt) => serde_json::Value::String(dt.to_rfc3339()),
        };
        scalar.to_string()
    }
}

/// A named, typed field of an experience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub id: DefinitionId,
    pub name: String,
    pub data_type: DataType,
}

impl Definition {
    /// Creates a definition.
    #[must_use]
    pub fn new(id: DefinitionId, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id,
            name: name.into(),
            data_type,
        }
    }

    /// Creates an offline definition with a fresh id.
    #[must_use]
    pub fn offline(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(DefinitionId::fresh_offline(), name, data_type)
    }
}

/// One field value within an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObject {
    pub id: DataObjectId,
    pub definition_id: DefinitionId,
    pub data: DataValue,
}

impl DataObject {
    /// Creates a data object.
    #[must_use]
    pub fn new(id: DataObjectId, definition_id: DefinitionId, data: DataValue) -> Self {
        Self {
            id,
            definition_id,
            data,
        }
    }

    /// Creates an offline data object with a fresh id.
    #[must_use]
    pub fn offline(definition_id: DefinitionId, data: DataValue) -> Self {
        Self::new(DataObjectId::fresh_offline(), definition_id, data)
    }
}

/// One filled-in instance of an experience's definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub experience_id: ExperienceId,
    /// One data object per definition, in definition order.
    pub data_objects: Vec<DataObject>,
    pub inserted_at: DateTime<Utc>,
}

impl Entry {
    /// Creates an entry.
    #[must_use]
    pub fn new(
        id: EntryId,
        experience_id: ExperienceId,
        data_objects: Vec<DataObject>,
        inserted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            experience_id,
            data_objects,
            inserted_at,
        }
    }

    /// Creates an offline entry with a fresh id, stamped now.
    #[must_use]
    pub fn offline(experience_id: ExperienceId, data_objects: Vec<DataObject>) -> Self {
        Self::new(
            EntryId::fresh_offline(),
            experience_id,
            data_objects,
            Utc::now(),
        )
    }

    /// Looks up the value for a definition.
    #[must_use]
    pub fn data_for(&self, definition_id: &DefinitionId) -> Option<&DataValue> {
        self.data_objects
            .iter()
            .find(|d| &d.definition_id == definition_id)
            .map(|d| &d.data)
    }
}

/// Cursor-style pagination metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// One page of a paginated collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_info: PageInfo,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            page_info: PageInfo::default(),
        }
    }
}

impl<T> Page<T> {
    /// Wraps a complete collection as a single page.
    #[must_use]
    pub fn from_items(items: Vec<T>) -> Self {
        Self {
            items,
            page_info: PageInfo::default(),
        }
    }

    /// Appends a fetched page, carrying its pagination metadata forward.
    pub fn append(&mut self, mut page: Page<T>) {
        self.items.append(&mut page.items);
        self.page_info = page.page_info;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Pagination arguments for list/detail fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub first: Option<usize>,
    pub after: Option<String>,
}

impl Pagination {
    /// First page of the given size.
    #[must_use]
    pub fn first(n: usize) -> Self {
        Self {
            first: Some(n),
            after: None,
        }
    }

    /// Page of the given size after a cursor.
    #[must_use]
    pub fn after(n: usize, cursor: impl Into<String>) -> Self {
        Self {
            first: Some(n),
            after: Some(cursor.into()),
        }
    }
}

/// Top-level user-defined record type instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub id: ExperienceId,
    pub title: String,
    pub description: Option<String>,
    /// Ordered set of named, typed fields.
    pub definitions: Vec<Definition>,
    /// Paginated collection of entries.
    pub entries: Page<Entry>,
}

impl Experience {
    /// Creates an experience.
    #[must_use]
    pub fn new(id: ExperienceId, title: impl Into<String>, definitions: Vec<Definition>) -> Self {
        Self {
            id,
            title: title.into(),
            description: None,
            definitions,
            entries: Page::default(),
        }
    }

    /// Creates an offline experience with a fresh id.
    #[must_use]
    pub fn offline(title: impl Into<String>, definitions: Vec<Definition>) -> Self {
        Self::new(ExperienceId::fresh_offline(), title, definitions)
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Looks up a definition by id.
    #[must_use]
    pub fn definition(&self, id: &DefinitionId) -> Option<&Definition> {
        self.definitions.iter().find(|d| &d.id == id)
    }

    /// Position of an entry in the entry list, 0-based.
    #[must_use]
    pub fn entry_position(&self, id: &EntryId) -> Option<usize> {
        self.entries.items.iter().position(|e| &e.id == id)
    }
}
