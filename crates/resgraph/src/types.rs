//! Core data types flowing through the query pipeline.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Result format used when a query does not name one.
pub const DEFAULT_RESULT_FORMAT: &str = "table";

/// Inclusive time range, normalized to UTC on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// Build a range from timestamps in any timezone.
    pub fn new<TzA: TimeZone, TzB: TimeZone>(from: DateTime<TzA>, to: DateTime<TzB>) -> Self {
        Self {
            from: from.with_timezone(&Utc),
            to: to.with_timezone(&Utc),
        }
    }

    /// Range ending now and spanning `span` into the past.
    pub fn last(span: chrono::Duration) -> Self {
        let to = Utc::now();
        Self { from: to - span, to }
    }

    /// Start as a KQL timestamp literal body, e.g. `2018-03-15T13:00:00Z`.
    pub fn from_literal(&self) -> String {
        self.from.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// End as a KQL timestamp literal body.
    pub fn to_literal(&self) -> String {
        self.to.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// One incoming query: a reference id, its opaque JSON model and a time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub ref_id: String,
    /// Raw query model; decoded by the builder, otherwise kept verbatim.
    pub json: String,
    pub time_range: TimeRange,
}

impl QuerySpec {
    pub fn new(ref_id: impl Into<String>, json: impl Into<String>, time_range: TimeRange) -> Self {
        Self {
            ref_id: ref_id.into(),
            json: json.into(),
            time_range,
        }
    }
}

/// A fully built query, ready to be sent.
///
/// Produced once per [`QuerySpec`] by [`crate::query::build_queries`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryDescriptor {
    pub ref_id: String,
    /// Result format named by the query model, kept for auditing. The request
    /// always asks for `table`, the only payload shape the normalizer decodes.
    pub result_format: String,
    /// Target URL; empty until the caller resolves it via [`QueryDescriptor::with_url`].
    pub url: String,
    /// The original query model, unchanged.
    pub json: String,
    pub interpolated_query: String,
    pub subscriptions: Vec<String>,
    pub time_range: TimeRange,
}

impl QueryDescriptor {
    /// Copy of this descriptor targeting `url`.
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..self.clone()
        }
    }
}
