//! Response normalization: provider payloads into frames and error strings.

use crate::frame::{DataLink, Field, FieldConfig, FieldType, Frame, FrameValue};
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Title of the portal link attached to every field.
pub const PORTAL_LINK_TITLE: &str = "View in Azure Portal";

const ARG_QUERY_BLADE: &str = "/#blade/HubsExtension/ArgQueryBlade/query/";

/// Bytes escaped in a path segment: everything but unreserved characters
/// and the sub-delimiters `$ & + : = @`.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');

/// Successful Resource Graph response.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGraphResponse {
    #[serde(default)]
    pub total_records: Option<i64>,
    #[serde(default)]
    pub count: Option<i64>,
    pub data: ResponseTable,
    #[serde(default)]
    pub result_truncated: Option<String>,
}

/// Table-shaped result payload.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResponseTable {
    #[serde(default)]
    pub columns: Vec<ResponseColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

/// Error body: `{"error": {"code", "message", "details": [...]}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Flatten an error envelope into one message.
///
/// The top-level entry comes first, then each detail in provider order,
/// joined by `"; "`. Entries render as `code: message`. An envelope with
/// nothing in it flattens to the empty string.
pub fn flatten_error(envelope: &ErrorEnvelope) -> String {
    let Some(body) = &envelope.error else {
        return String::new();
    };

    std::iter::once((&body.code, &body.message))
        .chain(body.details.iter().map(|d| (&d.code, &d.message)))
        .filter_map(|(code, message)| render_entry(code, message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn render_entry(code: &str, message: &str) -> Option<String> {
    match (code.is_empty(), message.is_empty()) {
        (true, true) => None,
        (true, false) => Some(message.to_string()),
        (false, true) => Some(code.to_string()),
        (false, false) => Some(format!("{code}: {message}")),
    }
}

/// Attach a portal link to every field of `frame`.
///
/// Existing links are replaced, so each field ends up with exactly one.
pub fn add_config_links(mut frame: Frame, url: &str) -> Frame {
    let link = DataLink {
        title: PORTAL_LINK_TITLE.to_string(),
        target_blank: true,
        url: url.to_string(),
    };
    for field in &mut frame.fields {
        field.config.get_or_insert_with(FieldConfig::default).links = vec![link.clone()];
    }
    frame
}

/// Portal deep link that reopens `query` in the Resource Graph explorer.
pub fn portal_query_link(portal_url: &str, query: &str) -> String {
    format!("{portal_url}{ARG_QUERY_BLADE}{}", path_escape(query))
}

/// Percent-encode a single path segment (spaces become `%20`).
fn path_escape(s: &str) -> String {
    utf8_percent_encode(s, PATH_SEGMENT).to_string()
}

/// Convert the provider's table payload into a typed frame.
pub fn frame_from_table(name: &str, table: &ResponseTable) -> Result<Frame, String> {
    let mut fields: Vec<Field> = table
        .columns
        .iter()
        .map(|c| Field::new(c.name.clone(), field_type_for(&c.column_type)))
        .collect();

    for (row_idx, row) in table.rows.iter().enumerate() {
        if row.len() != fields.len() {
            return Err(format!(
                "row {row_idx} has {} values but the table has {} columns",
                row.len(),
                fields.len()
            ));
        }
        for (field, raw) in fields.iter_mut().zip(row) {
            let value = convert_value(field.field_type, raw).ok_or_else(|| {
                format!(
                    "row {row_idx}: value {raw} is not a valid {:?} for column '{}'",
                    field.field_type, field.name
                )
            })?;
            field.values.push(value);
        }
    }

    Ok(Frame::new(name, fields))
}

fn field_type_for(column_type: &str) -> FieldType {
    match column_type.to_ascii_lowercase().as_str() {
        "string" | "guid" | "timespan" => FieldType::String,
        "int" | "integer" | "long" => FieldType::Int64,
        "real" | "double" | "decimal" | "number" => FieldType::Float64,
        "bool" | "boolean" => FieldType::Bool,
        "datetime" => FieldType::Time,
        _ => FieldType::Json,
    }
}

fn convert_value(field_type: FieldType, raw: &Value) -> Option<FrameValue> {
    if raw.is_null() {
        return Some(FrameValue::Null);
    }
    match field_type {
        FieldType::String => raw.as_str().map(|s| FrameValue::String(s.to_string())),
        FieldType::Int64 => raw.as_i64().map(FrameValue::Int),
        FieldType::Float64 => raw.as_f64().map(FrameValue::Float),
        FieldType::Bool => raw.as_bool().map(FrameValue::Bool),
        FieldType::Time => raw
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| FrameValue::Time(t.with_timezone(&Utc))),
        FieldType::Json => Some(FrameValue::Json(raw.clone())),
    }
}
