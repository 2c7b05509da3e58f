// Payload log wire model
//
// One RawPayload is one entry of the service's cursor-indexed payload log.
// The nested per-table, per-record/per-field structures are decoded into
// typed structs here, at the boundary; downstream code never walks raw JSON.
// Unknown extra fields are tolerated for forward compatibility, but every
// field the core reads is typed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One entry of the payload log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPayload {
    /// Position in the payload log. Unique and strictly increasing at the
    /// source; optional here as a defense against a service that omits it.
    /// Entries without a cursor are discarded by the fetcher.
    #[serde(default)]
    pub cursor: Option<i64>,

    pub timestamp: DateTime<Utc>,

    /// Who/what caused the change; absent for some system-originated edits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_metadata: Option<ActionMetadata>,

    /// Changes grouped by table. Any combination of record, field-schema and
    /// metadata changes, across any subset of tables.
    #[serde(default)]
    pub changed_tables_by_id: BTreeMap<String, TableChange>,
}

/// Changes to a single table within one payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableChange {
    /// Cell-level edits keyed by record id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub changed_records_by_id: BTreeMap<String, RecordDelta>,

    /// Newly created field definitions
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub created_fields_by_id: BTreeMap<String, FieldSchema>,

    /// Field-schema edits keyed by field id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub changed_fields_by_id: BTreeMap<String, FieldDelta>,

    /// Ids of destroyed fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub destroyed_field_ids: Vec<String>,

    /// Table name/description edits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_metadata: Option<MetadataDelta>,
}

impl TableChange {
    /// Whether this entry carries nothing the normalizer could report
    pub fn is_empty(&self) -> bool {
        self.changed_records_by_id.is_empty()
            && self.created_fields_by_id.is_empty()
            && self.changed_fields_by_id.is_empty()
            && self.destroyed_field_ids.is_empty()
            && self.changed_metadata.is_none()
    }
}

/// Current and optionally previous cell values of one changed record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<CellValues>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<CellValues>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellValues {
    #[serde(default)]
    pub cell_values_by_field_id: BTreeMap<String, Value>,
}

/// Before/after snapshots of one field definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<FieldSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<FieldSchema>,
}

/// A field definition snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
}

/// Before/after snapshots of table metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<TableMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<TableMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Origin information attached to a payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_metadata: Option<SourceMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// The acting user, when the change was user-originated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RawPayload {
    /// The acting user recorded on this payload, if any
    pub fn user(&self) -> Option<&UserInfo> {
        self.action_metadata
            .as_ref()
            .and_then(|m| m.source_metadata.as_ref())
            .and_then(|m| m.user.as_ref())
    }
}

/// Response shape of the payload-log read endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadListResponse {
    #[serde(default)]
    pub payloads: Vec<RawPayload>,

    /// Continuation cursor for the next page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<i64>,

    /// Whether the log holds more entries beyond this page
    #[serde(default)]
    pub might_have_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_record_change_payload() {
        let wire = json!({
            "cursor": 7,
            "timestamp": "2024-03-01T12:00:00.000Z",
            "actionMetadata": {
                "source": "client",
                "sourceMetadata": {
                    "user": {"id": "usr1", "email": "ada@example.com", "name": "Ada"}
                }
            },
            "changedTablesById": {
                "tbl1": {
                    "changedRecordsById": {
                        "rec1": {
                            "current": {"cellValuesByFieldId": {"fld1": "A"}},
                            "previous": {"cellValuesByFieldId": {"fld1": "B"}}
                        }
                    }
                }
            }
        });

        let payload: RawPayload = serde_json::from_value(wire).unwrap();
        assert_eq!(payload.cursor, Some(7));
        assert_eq!(payload.user().unwrap().id, "usr1");

        let table = &payload.changed_tables_by_id["tbl1"];
        let record = &table.changed_records_by_id["rec1"];
        assert_eq!(
            record.current.as_ref().unwrap().cell_values_by_field_id["fld1"],
            json!("A")
        );
        assert_eq!(
            record.previous.as_ref().unwrap().cell_values_by_field_id["fld1"],
            json!("B")
        );
    }

    #[test]
    fn decodes_schema_and_metadata_changes() {
        let wire = json!({
            "cursor": 3,
            "timestamp": "2024-03-01T12:00:00.000Z",
            "changedTablesById": {
                "tbl1": {
                    "changedFieldsById": {
                        "fld1": {
                            "current": {"name": "Status", "type": "singleSelect"},
                            "previous": {"name": "State", "type": "singleLineText"}
                        }
                    },
                    "destroyedFieldIds": ["fld2"],
                    "changedMetadata": {
                        "current": {"name": "Orders"},
                        "previous": {"name": "Order list"}
                    }
                }
            }
        });

        let payload: RawPayload = serde_json::from_value(wire).unwrap();
        let table = &payload.changed_tables_by_id["tbl1"];

        let delta = &table.changed_fields_by_id["fld1"];
        assert_eq!(delta.current.as_ref().unwrap().name.as_deref(), Some("Status"));
        assert_eq!(
            delta.previous.as_ref().unwrap().field_type.as_deref(),
            Some("singleLineText")
        );
        assert_eq!(table.destroyed_field_ids, vec!["fld2"]);
        assert!(table.changed_metadata.is_some());
    }

    #[test]
    fn tolerates_missing_cursor_and_empty_tables() {
        let wire = json!({
            "timestamp": "2024-03-01T12:00:00.000Z"
        });

        let payload: RawPayload = serde_json::from_value(wire).unwrap();
        assert_eq!(payload.cursor, None);
        assert!(payload.changed_tables_by_id.is_empty());
        assert!(payload.user().is_none());
    }

    #[test]
    fn decodes_payload_list_response() {
        let wire = json!({
            "payloads": [
                {"cursor": 1, "timestamp": "2024-03-01T12:00:00.000Z"},
                {"cursor": 2, "timestamp": "2024-03-01T12:00:01.000Z"}
            ],
            "cursor": 3,
            "mightHaveMore": true
        });

        let resp: PayloadListResponse = serde_json::from_value(wire).unwrap();
        assert_eq!(resp.payloads.len(), 2);
        assert_eq!(resp.cursor, Some(3));
        assert!(resp.might_have_more);
    }
}
