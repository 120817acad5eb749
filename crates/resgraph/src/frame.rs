//! Tabular result frame with per-field link configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named table of typed, row-aligned fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub name: String,
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<FrameMeta>,
}

/// Frame-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMeta {
    pub executed_query_string: String,
}

/// A single column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub values: Vec<FrameValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<FieldConfig>,
}

/// Display configuration attached to a field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub links: Vec<DataLink>,
}

/// A link shown next to each value of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataLink {
    pub title: String,
    pub target_blank: bool,
    pub url: String,
}

/// Column type of a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    String,
    Int64,
    Float64,
    Bool,
    Time,
    Json,
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Time(DateTime<Utc>),
    String(String),
    Json(serde_json::Value),
}

impl std::fmt::Display for FrameValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameValue::Null => write!(f, "null"),
            FrameValue::Bool(v) => write!(f, "{v}"),
            FrameValue::Int(v) => write!(f, "{v}"),
            FrameValue::Float(v) => write!(f, "{v}"),
            FrameValue::Time(v) => write!(f, "{}", v.to_rfc3339()),
            FrameValue::String(v) => write!(f, "{v}"),
            FrameValue::Json(v) => write!(f, "{v}"),
        }
    }
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            values: Vec::new(),
            config: None,
        }
    }

    /// Links configured on this field, if any.
    pub fn links(&self) -> &[DataLink] {
        self.config.as_ref().map(|c| c.links.as_slice()).unwrap_or(&[])
    }
}

impl Frame {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            meta: None,
        }
    }

    /// Number of rows (the length of the first field).
    pub fn row_count(&self) -> usize {
        self.fields.first().map(|f| f.values.len()).unwrap_or(0)
    }

    /// Values of row `idx` across all fields.
    pub fn row(&self, idx: usize) -> Vec<&FrameValue> {
        self.fields.iter().filter_map(|f| f.values.get(idx)).collect()
    }
}
