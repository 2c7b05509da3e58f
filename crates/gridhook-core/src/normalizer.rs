// Change normalization
//
// Flattens one payload's nested per-table structures into the flat
// ChangeEvent sequence. Processing is restricted to the subscription's
// configured table: payloads for other tables should not occur given the
// server-side filter, but can under misconfiguration, and are skipped.
//
// Category order per table: record changes, then field-schema changes
// (created, updated, destroyed), then metadata changes.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::events::{ChangeEvent, EventStamp, MetadataKey, SchemaAspect, SchemaChange};
use crate::payload::{FieldSchema, MetadataDelta, RawPayload, TableChange};
use crate::subscription::Subscription;

/// What the normalizer needs to know about the subscription
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Only this table's changes are reported
    pub table_id: String,

    /// Fields attached to every record event as context, changed or not.
    /// The payload merges these fields' values into a record's current cell
    /// values, so they are excluded from the changed set.
    pub fields_to_include: Vec<String>,

    /// Whether prior cell values were requested and should be reported
    pub include_previous_values: bool,
}

impl NormalizeOptions {
    pub fn from_subscription(subscription: &Subscription) -> Self {
        Self {
            table_id: subscription.table_id.clone(),
            fields_to_include: subscription
                .config
                .include_field_ids
                .clone()
                .unwrap_or_default(),
            include_previous_values: subscription.config.include_previous_values,
        }
    }
}

/// Flatten one payload into zero or more change events
pub fn normalize(payload: &RawPayload, options: &NormalizeOptions) -> Vec<ChangeEvent> {
    // Entries without a cursor never reach this point via the fetcher; if one
    // does, there is no position to stamp events with, so nothing is emitted.
    let Some(cursor) = payload.cursor else {
        return Vec::new();
    };

    let changed_by = payload.user().map(Into::into);
    let mut events = Vec::new();

    for (table_id, change) in &payload.changed_tables_by_id {
        if *table_id != options.table_id {
            tracing::debug!(
                table_id = %table_id,
                configured = %options.table_id,
                "Skipping changes for unwatched table"
            );
            continue;
        }

        let stamp = EventStamp {
            table_id: table_id.clone(),
            cursor,
            timestamp: payload.timestamp,
            changed_by: changed_by.clone(),
        };

        normalize_records(change, options, &stamp, &mut events);
        normalize_field_schemas(change, &stamp, &mut events);
        normalize_metadata(change.changed_metadata.as_ref(), &stamp, &mut events);
    }

    events
}

fn normalize_records(
    change: &TableChange,
    options: &NormalizeOptions,
    stamp: &EventStamp,
    events: &mut Vec<ChangeEvent>,
) {
    let include: HashSet<&str> = options
        .fields_to_include
        .iter()
        .map(String::as_str)
        .collect();

    for (record_id, delta) in &change.changed_records_by_id {
        let Some(current) = &delta.current else {
            continue;
        };
        let cells = &current.cell_values_by_field_id;

        // Include-fields ride along on every event for this record, whether
        // or not they themselves changed
        let context: BTreeMap<String, Value> = options
            .fields_to_include
            .iter()
            .filter_map(|f| cells.get(f).map(|v| (f.clone(), v.clone())))
            .collect();

        for (field_id, value) in cells {
            if include.contains(field_id.as_str()) {
                continue;
            }

            let previous = if options.include_previous_values {
                delta
                    .previous
                    .as_ref()
                    .and_then(|p| p.cell_values_by_field_id.get(field_id))
                    .cloned()
            } else {
                None
            };

            events.push(ChangeEvent::record_change(
                stamp,
                record_id,
                field_id,
                value.clone(),
                previous,
                context.clone(),
            ));
        }
        // A record present with no actually-changed fields emits nothing;
        // that is not an error.
    }
}

fn normalize_field_schemas(
    change: &TableChange,
    stamp: &EventStamp,
    events: &mut Vec<ChangeEvent>,
) {
    for (field_id, schema) in &change.created_fields_by_id {
        events.push(ChangeEvent::field_schema_change(
            stamp,
            field_id,
            SchemaChange::Created,
            Some(schema.clone()),
            None,
            Vec::new(),
        ));
    }

    for (field_id, delta) in &change.changed_fields_by_id {
        let aspects = changed_aspects(delta.current.as_ref(), delta.previous.as_ref());
        events.push(ChangeEvent::field_schema_change(
            stamp,
            field_id,
            SchemaChange::Updated,
            delta.current.clone(),
            delta.previous.clone(),
            aspects,
        ));
    }

    for field_id in &change.destroyed_field_ids {
        events.push(ChangeEvent::field_schema_change(
            stamp,
            field_id,
            SchemaChange::Destroyed,
            None,
            None,
            Vec::new(),
        ));
    }
}

/// Which aspects differ between two field-definition snapshots
fn changed_aspects(
    current: Option<&FieldSchema>,
    previous: Option<&FieldSchema>,
) -> Vec<SchemaAspect> {
    let mut aspects = Vec::new();
    let cur_name = current.and_then(|s| s.name.as_deref());
    let prev_name = previous.and_then(|s| s.name.as_deref());
    if cur_name != prev_name {
        aspects.push(SchemaAspect::Name);
    }

    let cur_type = current.and_then(|s| s.field_type.as_deref());
    let prev_type = previous.and_then(|s| s.field_type.as_deref());
    if cur_type != prev_type {
        aspects.push(SchemaAspect::Type);
    }
    aspects
}

fn normalize_metadata(
    delta: Option<&MetadataDelta>,
    stamp: &EventStamp,
    events: &mut Vec<ChangeEvent>,
) {
    let Some(delta) = delta else {
        return;
    };

    let cur_name = delta.current.as_ref().and_then(|m| m.name.clone());
    let prev_name = delta.previous.as_ref().and_then(|m| m.name.clone());
    if (cur_name.is_some() || prev_name.is_some()) && cur_name != prev_name {
        events.push(ChangeEvent::table_metadata_change(
            stamp,
            MetadataKey::Name,
            cur_name,
            prev_name,
        ));
    }

    let cur_desc = delta.current.as_ref().and_then(|m| m.description.clone());
    let prev_desc = delta.previous.as_ref().and_then(|m| m.description.clone());
    if (cur_desc.is_some() || prev_desc.is_some()) && cur_desc != prev_desc {
        events.push(ChangeEvent::table_metadata_change(
            stamp,
            MetadataKey::Description,
            cur_desc,
            prev_desc,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> NormalizeOptions {
        NormalizeOptions {
            table_id: "tbl1".to_string(),
            fields_to_include: Vec::new(),
            include_previous_values: false,
        }
    }

    fn payload(cursor: i64, body: serde_json::Value) -> RawPayload {
        serde_json::from_value(json!({
            "cursor": cursor,
            "timestamp": "2024-03-01T12:00:00.000Z",
            "changedTablesById": body,
        }))
        .unwrap()
    }

    #[test]
    fn flattens_record_change_with_previous_value() {
        let payload = payload(
            9,
            json!({
                "tbl1": {
                    "changedRecordsById": {
                        "rec1": {
                            "current": {"cellValuesByFieldId": {"f1": "A"}},
                            "previous": {"cellValuesByFieldId": {"f1": "B"}}
                        }
                    }
                }
            }),
        );

        let mut opts = options();
        opts.include_previous_values = true;
        let events = normalize(&payload, &opts);

        assert_eq!(events.len(), 1);
        match &events[0] {
            ChangeEvent::RecordChange {
                record_id,
                field_id,
                current,
                previous,
                cursor,
                ..
            } => {
                assert_eq!(record_id, "rec1");
                assert_eq!(field_id, "f1");
                assert_eq!(current, &json!("A"));
                assert_eq!(previous, &Some(json!("B")));
                assert_eq!(*cursor, 9);
            }
            other => panic!("expected record change, got {:?}", other),
        }
    }

    #[test]
    fn previous_value_suppressed_when_not_requested() {
        let payload = payload(
            9,
            json!({
                "tbl1": {
                    "changedRecordsById": {
                        "rec1": {
                            "current": {"cellValuesByFieldId": {"f1": "A"}},
                            "previous": {"cellValuesByFieldId": {"f1": "B"}}
                        }
                    }
                }
            }),
        );

        let events = normalize(&payload, &options());
        match &events[0] {
            ChangeEvent::RecordChange { previous, .. } => assert!(previous.is_none()),
            other => panic!("expected record change, got {:?}", other),
        }
    }

    #[test]
    fn include_fields_ride_along_as_context() {
        // f2 is include-listed and did not change; it must appear as context
        // on f1's event and must not produce an event of its own
        let payload = payload(
            4,
            json!({
                "tbl1": {
                    "changedRecordsById": {
                        "rec1": {
                            "current": {"cellValuesByFieldId": {"f1": 10, "f2": "ctx"}}
                        }
                    }
                }
            }),
        );

        let mut opts = options();
        opts.fields_to_include = vec!["f2".to_string()];
        let events = normalize(&payload, &opts);

        assert_eq!(events.len(), 1);
        match &events[0] {
            ChangeEvent::RecordChange {
                field_id, context, ..
            } => {
                assert_eq!(field_id, "f1");
                assert_eq!(context.get("f2"), Some(&json!("ctx")));
            }
            other => panic!("expected record change, got {:?}", other),
        }
    }

    #[test]
    fn record_with_only_context_fields_emits_nothing() {
        let payload = payload(
            4,
            json!({
                "tbl1": {
                    "changedRecordsById": {
                        "rec1": {
                            "current": {"cellValuesByFieldId": {"f2": "ctx"}}
                        }
                    }
                }
            }),
        );

        let mut opts = options();
        opts.fields_to_include = vec!["f2".to_string()];
        assert!(normalize(&payload, &opts).is_empty());
    }

    #[test]
    fn unwatched_tables_are_skipped() {
        let payload = payload(
            4,
            json!({
                "tbl_other": {
                    "changedRecordsById": {
                        "rec1": {"current": {"cellValuesByFieldId": {"f1": 1}}}
                    }
                }
            }),
        );

        assert!(normalize(&payload, &options()).is_empty());
    }

    #[test]
    fn missing_user_metadata_leaves_changed_by_unset() {
        let payload = payload(
            4,
            json!({
                "tbl1": {
                    "changedRecordsById": {
                        "rec1": {"current": {"cellValuesByFieldId": {"f1": 1}}}
                    }
                }
            }),
        );

        let events = normalize(&payload, &options());
        assert_eq!(events.len(), 1);
        assert!(events[0].changed_by().is_none());
    }

    #[test]
    fn user_metadata_is_stamped_on_every_event() {
        let payload: RawPayload = serde_json::from_value(json!({
            "cursor": 4,
            "timestamp": "2024-03-01T12:00:00.000Z",
            "actionMetadata": {
                "source": "client",
                "sourceMetadata": {"user": {"id": "usr1", "name": "Ada"}}
            },
            "changedTablesById": {
                "tbl1": {
                    "changedRecordsById": {
                        "rec1": {"current": {"cellValuesByFieldId": {"f1": 1}}}
                    },
                    "destroyedFieldIds": ["f9"]
                }
            }
        }))
        .unwrap();

        let events = normalize(&payload, &options());
        assert_eq!(events.len(), 2);
        for event in &events {
            let by = event.changed_by().expect("changed_by set");
            assert_eq!(by.user_id, "usr1");
            assert_eq!(by.user_name.as_deref(), Some("Ada"));
        }
    }

    #[test]
    fn schema_update_reports_changed_aspects() {
        let payload = payload(
            6,
            json!({
                "tbl1": {
                    "changedFieldsById": {
                        "f1": {
                            "current": {"name": "Status", "type": "singleSelect"},
                            "previous": {"name": "Status", "type": "singleLineText"}
                        }
                    }
                }
            }),
        );

        let events = normalize(&payload, &options());
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChangeEvent::FieldSchemaChange {
                change,
                changed_aspects,
                ..
            } => {
                assert_eq!(*change, SchemaChange::Updated);
                assert_eq!(changed_aspects, &vec![SchemaAspect::Type]);
            }
            other => panic!("expected schema change, got {:?}", other),
        }
    }

    #[test]
    fn created_and_destroyed_fields_become_schema_events() {
        let payload = payload(
            6,
            json!({
                "tbl1": {
                    "createdFieldsById": {
                        "f_new": {"name": "Notes", "type": "multilineText"}
                    },
                    "destroyedFieldIds": ["f_old"]
                }
            }),
        );

        let events = normalize(&payload, &options());
        assert_eq!(events.len(), 2);
        match &events[0] {
            ChangeEvent::FieldSchemaChange { change, current, .. } => {
                assert_eq!(*change, SchemaChange::Created);
                assert_eq!(
                    current.as_ref().unwrap().name.as_deref(),
                    Some("Notes")
                );
            }
            other => panic!("expected schema change, got {:?}", other),
        }
        match &events[1] {
            ChangeEvent::FieldSchemaChange { change, field_id, .. } => {
                assert_eq!(*change, SchemaChange::Destroyed);
                assert_eq!(field_id, "f_old");
            }
            other => panic!("expected schema change, got {:?}", other),
        }
    }

    #[test]
    fn metadata_changes_emit_one_event_per_key() {
        let payload = payload(
            6,
            json!({
                "tbl1": {
                    "changedMetadata": {
                        "current": {"name": "Orders", "description": "All orders"},
                        "previous": {"name": "Order list", "description": "All orders"}
                    }
                }
            }),
        );

        let events = normalize(&payload, &options());
        // Description is unchanged, so only the name event is emitted
        assert_eq!(events.len(), 1);
        match &events[0] {
            ChangeEvent::TableMetadataChange {
                key,
                current,
                previous,
                ..
            } => {
                assert_eq!(*key, MetadataKey::Name);
                assert_eq!(current.as_deref(), Some("Orders"));
                assert_eq!(previous.as_deref(), Some("Order list"));
            }
            other => panic!("expected metadata change, got {:?}", other),
        }
    }

    #[test]
    fn categories_are_ordered_records_then_schema_then_metadata() {
        let payload = payload(
            6,
            json!({
                "tbl1": {
                    "changedMetadata": {
                        "current": {"name": "Orders"},
                        "previous": {"name": "Old"}
                    },
                    "changedFieldsById": {
                        "f1": {"current": {"name": "A"}, "previous": {"name": "B"}}
                    },
                    "changedRecordsById": {
                        "rec1": {"current": {"cellValuesByFieldId": {"f1": 1}}}
                    }
                }
            }),
        );

        let events = normalize(&payload, &options());
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ChangeEvent::RecordChange { .. }));
        assert!(matches!(events[1], ChangeEvent::FieldSchemaChange { .. }));
        assert!(matches!(events[2], ChangeEvent::TableMetadataChange { .. }));
    }
}
