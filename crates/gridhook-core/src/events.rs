// Normalized change events
//
// ChangeEvent is the flat output unit of normalization. Events are produced
// fresh per invocation and never persisted. Ordering within a batch follows
// payload cursor order, then table iteration order, then category order
// (record changes, field-schema changes, metadata changes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::payload::{FieldSchema, UserInfo};

/// Who made the change, when the payload carries user source metadata.
/// Never defaulted: system- or automation-originated changes have no author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedBy {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

impl From<&UserInfo> for ChangedBy {
    fn from(user: &UserInfo) -> Self {
        Self {
            user_id: user.id.clone(),
            user_email: user.email.clone(),
            user_name: user.name.clone(),
        }
    }
}

/// How a field definition changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaChange {
    Created,
    Updated,
    Destroyed,
}

/// Which aspect of a field definition changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaAspect {
    Name,
    Type,
}

/// Which table-metadata key changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataKey {
    Name,
    Description,
}

/// Common stamp carried by every event: the originating table, payload
/// position and time, and the acting user if known
#[derive(Debug, Clone)]
pub struct EventStamp {
    pub table_id: String,
    pub cursor: i64,
    pub timestamp: DateTime<Utc>,
    pub changed_by: Option<ChangedBy>,
}

/// One normalized change event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ChangeEvent {
    /// One field of one record changed value
    RecordChange {
        table_id: String,
        record_id: String,
        field_id: String,
        current: Value,
        /// Prior value, when present in the payload and requested
        #[serde(skip_serializing_if = "Option::is_none")]
        previous: Option<Value>,
        /// Requested include-fields' current values, attached even when those
        /// fields did not themselves change
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        context: BTreeMap<String, Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        changed_by: Option<ChangedBy>,
        cursor: i64,
        timestamp: DateTime<Utc>,
    },

    /// A field definition was created, updated or destroyed
    FieldSchemaChange {
        table_id: String,
        field_id: String,
        change: SchemaChange,
        #[serde(skip_serializing_if = "Option::is_none")]
        current: Option<FieldSchema>,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous: Option<FieldSchema>,
        /// Which aspects differ between the snapshots (updates only)
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        changed_aspects: Vec<SchemaAspect>,
        #[serde(skip_serializing_if = "Option::is_none")]
        changed_by: Option<ChangedBy>,
        cursor: i64,
        timestamp: DateTime<Utc>,
    },

    /// The table's name or description changed
    TableMetadataChange {
        table_id: String,
        key: MetadataKey,
        #[serde(skip_serializing_if = "Option::is_none")]
        current: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        changed_by: Option<ChangedBy>,
        cursor: i64,
        timestamp: DateTime<Utc>,
    },
}

impl ChangeEvent {
    /// Create a record change event
    pub fn record_change(
        stamp: &EventStamp,
        record_id: impl Into<String>,
        field_id: impl Into<String>,
        current: Value,
        previous: Option<Value>,
        context: BTreeMap<String, Value>,
    ) -> Self {
        ChangeEvent::RecordChange {
            table_id: stamp.table_id.clone(),
            record_id: record_id.into(),
            field_id: field_id.into(),
            current,
            previous,
            context,
            changed_by: stamp.changed_by.clone(),
            cursor: stamp.cursor,
            timestamp: stamp.timestamp,
        }
    }

    /// Create a field-schema change event
    pub fn field_schema_change(
        stamp: &EventStamp,
        field_id: impl Into<String>,
        change: SchemaChange,
        current: Option<FieldSchema>,
        previous: Option<FieldSchema>,
        changed_aspects: Vec<SchemaAspect>,
    ) -> Self {
        ChangeEvent::FieldSchemaChange {
            table_id: stamp.table_id.clone(),
            field_id: field_id.into(),
            change,
            current,
            previous,
            changed_aspects,
            changed_by: stamp.changed_by.clone(),
            cursor: stamp.cursor,
            timestamp: stamp.timestamp,
        }
    }

    /// Create a table-metadata change event
    pub fn table_metadata_change(
        stamp: &EventStamp,
        key: MetadataKey,
        current: Option<String>,
        previous: Option<String>,
    ) -> Self {
        ChangeEvent::TableMetadataChange {
            table_id: stamp.table_id.clone(),
            key,
            current,
            previous,
            changed_by: stamp.changed_by.clone(),
            cursor: stamp.cursor,
            timestamp: stamp.timestamp,
        }
    }

    /// The table this event belongs to
    pub fn table_id(&self) -> &str {
        match self {
            ChangeEvent::RecordChange { table_id, .. } => table_id,
            ChangeEvent::FieldSchemaChange { table_id, .. } => table_id,
            ChangeEvent::TableMetadataChange { table_id, .. } => table_id,
        }
    }

    /// The originating payload's cursor
    pub fn cursor(&self) -> i64 {
        match self {
            ChangeEvent::RecordChange { cursor, .. } => *cursor,
            ChangeEvent::FieldSchemaChange { cursor, .. } => *cursor,
            ChangeEvent::TableMetadataChange { cursor, .. } => *cursor,
        }
    }

    /// Who made the change, if known
    pub fn changed_by(&self) -> Option<&ChangedBy> {
        match self {
            ChangeEvent::RecordChange { changed_by, .. } => changed_by.as_ref(),
            ChangeEvent::FieldSchemaChange { changed_by, .. } => changed_by.as_ref(),
            ChangeEvent::TableMetadataChange { changed_by, .. } => changed_by.as_ref(),
        }
    }
}
