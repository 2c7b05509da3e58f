// Trigger configuration and webhook specification building
//
// TriggerConfig captures what a trigger instance watches. At activation it is
// turned into the service's filter/include specification, which is the exact
// wire shape submitted with the creation request. The configuration is
// accepted as-is: filter semantics are validated by the service, not locally.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which change categories the feed watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WatchDataType {
    /// Record/cell data edits
    TableData,
    /// Field-schema edits
    TableFields,
    /// Table name/description edits
    TableMetadata,
}

/// Which kinds of change to deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeType {
    Add,
    Remove,
    Update,
}

/// Which originating channels to deliver changes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeSource {
    Client,
    PublicApi,
    FormSubmission,
    Automation,
    System,
    Sync,
    AnonymousUser,
    Unknown,
}

/// Configuration for one trigger instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Table whose changes are delivered
    pub table_id: String,

    /// Change categories to watch
    #[serde(default = "default_data_types")]
    pub data_types: Vec<WatchDataType>,

    /// Change kinds to deliver; empty means the service default (all)
    #[serde(default)]
    pub change_types: Vec<ChangeType>,

    /// Restrict cell-data watching to these fields
    #[serde(default)]
    pub watch_field_ids: Option<Vec<String>>,

    /// Restrict schema watching to these fields
    #[serde(default)]
    pub watch_schema_field_ids: Option<Vec<String>>,

    /// Fields whose current values are included on every record event,
    /// changed or not
    #[serde(default)]
    pub include_field_ids: Option<Vec<String>>,

    /// Originating channels to include; empty means the service default (all)
    #[serde(default)]
    pub from_sources: Vec<ChangeSource>,

    /// Raw per-source filter options as a JSON object string.
    /// Unparseable JSON is skipped at specification-build time.
    #[serde(default)]
    pub source_options_json: Option<String>,

    /// Ask the service to include prior cell values in payloads
    #[serde(default)]
    pub include_previous_values: bool,
}

fn default_data_types() -> Vec<WatchDataType> {
    vec![WatchDataType::TableData]
}

impl TriggerConfig {
    /// Create a configuration watching record data on one table
    pub fn new(table_id: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            data_types: default_data_types(),
            change_types: Vec::new(),
            watch_field_ids: None,
            watch_schema_field_ids: None,
            include_field_ids: None,
            from_sources: Vec::new(),
            source_options_json: None,
            include_previous_values: false,
        }
    }

    /// Set the watched change categories
    pub fn with_data_types(mut self, data_types: Vec<WatchDataType>) -> Self {
        self.data_types = data_types;
        self
    }

    /// Set the delivered change kinds
    pub fn with_change_types(mut self, change_types: Vec<ChangeType>) -> Self {
        self.change_types = change_types;
        self
    }

    /// Restrict cell-data watching to the given fields
    pub fn with_watch_fields(mut self, field_ids: Vec<String>) -> Self {
        self.watch_field_ids = Some(field_ids);
        self
    }

    /// Include these fields' current values on every record event
    pub fn with_include_fields(mut self, field_ids: Vec<String>) -> Self {
        self.include_field_ids = Some(field_ids);
        self
    }

    /// Restrict originating channels
    pub fn with_sources(mut self, sources: Vec<ChangeSource>) -> Self {
        self.from_sources = sources;
        self
    }

    /// Set raw per-source filter options (JSON object string)
    pub fn with_source_options_json(mut self, json: impl Into<String>) -> Self {
        self.source_options_json = Some(json.into());
        self
    }

    /// Request prior cell values in payloads
    pub fn with_previous_values(mut self) -> Self {
        self.include_previous_values = true;
        self
    }

    /// Build the filter/include specification submitted at creation.
    ///
    /// Source options that fail to parse as a JSON object are dropped with a
    /// warning; creation proceeds without them.
    pub fn build_specification(&self) -> WebhookSpecification {
        let source_options = self.parse_source_options();

        let filters = SpecificationFilters {
            data_types: self.data_types.clone(),
            record_change_scope: self.table_id.clone(),
            change_types: self.change_types.clone(),
            watch_data_in_field_ids: self.watch_field_ids.clone(),
            from_sources: self.from_sources.clone(),
            source_options,
            watch_schemas_of_field_ids: self.watch_schema_field_ids.clone(),
        };

        let includes =
            if self.include_previous_values || self.include_field_ids.is_some() {
                Some(SpecificationIncludes {
                    include_previous_cell_values: self.include_previous_values,
                    include_cell_values_in_field_ids: self.include_field_ids.clone(),
                })
            } else {
                None
            };

        WebhookSpecification {
            options: SpecificationOptions { filters, includes },
        }
    }

    fn parse_source_options(&self) -> Option<Value> {
        let raw = self.source_options_json.as_deref()?;
        match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => Some(value),
            Ok(other) => {
                tracing::warn!(
                    "Ignoring source options: expected a JSON object, got {}",
                    other
                );
                None
            }
            Err(e) => {
                tracing::warn!("Ignoring unparseable source options JSON: {}", e);
                None
            }
        }
    }
}

// ============================================================================
// Wire shape of the creation-time specification
// ============================================================================

/// The `specification` object of the creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSpecification {
    pub options: SpecificationOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecificationOptions {
    pub filters: SpecificationFilters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub includes: Option<SpecificationIncludes>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificationFilters {
    pub data_types: Vec<WatchDataType>,
    pub record_change_scope: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub change_types: Vec<ChangeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_data_in_field_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub from_sources: Vec<ChangeSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_options: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_schemas_of_field_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificationIncludes {
    pub include_previous_cell_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_cell_values_in_field_ids: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_specification_omits_unset_filters() {
        let spec = TriggerConfig::new("tblABC").build_specification();
        let wire = serde_json::to_value(&spec).unwrap();

        assert_eq!(
            wire,
            json!({
                "options": {
                    "filters": {
                        "dataTypes": ["tableData"],
                        "recordChangeScope": "tblABC",
                    }
                }
            })
        );
    }

    #[test]
    fn full_specification_round_trips_all_filters() {
        let spec = TriggerConfig::new("tblABC")
            .with_data_types(vec![WatchDataType::TableData, WatchDataType::TableFields])
            .with_change_types(vec![ChangeType::Update])
            .with_watch_fields(vec!["fld1".into()])
            .with_include_fields(vec!["fld2".into()])
            .with_sources(vec![ChangeSource::Client, ChangeSource::FormSubmission])
            .with_source_options_json(r#"{"formSubmission": {"viewId": "viw1"}}"#)
            .with_previous_values()
            .build_specification();

        let wire = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            wire["options"]["filters"]["dataTypes"],
            json!(["tableData", "tableFields"])
        );
        assert_eq!(wire["options"]["filters"]["changeTypes"], json!(["update"]));
        assert_eq!(
            wire["options"]["filters"]["fromSources"],
            json!(["client", "formSubmission"])
        );
        assert_eq!(
            wire["options"]["filters"]["sourceOptions"]["formSubmission"]["viewId"],
            json!("viw1")
        );
        assert_eq!(
            wire["options"]["includes"],
            json!({
                "includePreviousCellValues": true,
                "includeCellValuesInFieldIds": ["fld2"],
            })
        );
    }

    #[test]
    fn unparseable_source_options_are_dropped() {
        let spec = TriggerConfig::new("tblABC")
            .with_source_options_json("{not json")
            .build_specification();

        assert!(spec.options.filters.source_options.is_none());
    }

    #[test]
    fn non_object_source_options_are_dropped() {
        let spec = TriggerConfig::new("tblABC")
            .with_source_options_json("[1, 2, 3]")
            .build_specification();

        assert!(spec.options.filters.source_options.is_none());
    }

    #[test]
    fn include_fields_alone_produce_includes_block() {
        let spec = TriggerConfig::new("tblABC")
            .with_include_fields(vec!["fld9".into()])
            .build_specification();

        let includes = spec.options.includes.expect("includes block");
        assert!(!includes.include_previous_cell_values);
        assert_eq!(
            includes.include_cell_values_in_field_ids,
            Some(vec!["fld9".to_string()])
        );
    }
}
