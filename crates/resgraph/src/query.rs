//! Query builder — turns incoming query specs into interpolated descriptors.

use crate::config::DatasourceInfo;
use crate::error::{Error, Result};
use crate::macros;
use crate::types::{QueryDescriptor, QuerySpec, DEFAULT_RESULT_FORMAT};
use serde::Deserialize;

/// Typed view of the query model carried in [`QuerySpec::json`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryModel {
    #[serde(default)]
    subscriptions: Vec<String>,
    azure_resource_graph: Option<ResourceGraphModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceGraphModel {
    query: Option<String>,
    #[serde(default)]
    result_format: Option<String>,
}

/// Build one descriptor per spec, in input order.
///
/// All or nothing: the first malformed spec fails the whole batch.
pub fn build_queries(specs: &[QuerySpec], ds_info: &DatasourceInfo) -> Result<Vec<QueryDescriptor>> {
    specs.iter().map(|spec| build_query(spec, ds_info)).collect()
}

fn build_query(spec: &QuerySpec, ds_info: &DatasourceInfo) -> Result<QueryDescriptor> {
    let build_error = |reason: String| Error::Build {
        ref_id: spec.ref_id.clone(),
        reason,
    };

    let model: QueryModel = serde_json::from_str(&spec.json)
        .map_err(|e| build_error(format!("malformed query model: {e}")))?;
    let target = model
        .azure_resource_graph
        .ok_or_else(|| build_error("missing azureResourceGraph section".to_string()))?;
    let query = target
        .query
        .ok_or_else(|| build_error("missing azureResourceGraph.query".to_string()))?;

    tracing::debug!(ref_id = %spec.ref_id, target = %query, "building resource graph query");

    let interpolated_query = macros::interpolate(&query, &spec.time_range)
        .map_err(|e| build_error(e.to_string()))?;

    let result_format = target
        .result_format
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| DEFAULT_RESULT_FORMAT.to_string());

    let subscriptions = if model.subscriptions.is_empty() {
        ds_info.default_subscriptions.clone()
    } else {
        model.subscriptions
    };

    Ok(QueryDescriptor {
        ref_id: spec.ref_id.clone(),
        result_format,
        url: String::new(),
        json: spec.json.clone(),
        interpolated_query,
        subscriptions,
        time_range: spec.time_range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeRange;
    use chrono::TimeZone;

    fn range() -> TimeRange {
        let from = chrono::Utc.with_ymd_and_hms(2018, 3, 15, 13, 0, 0).unwrap();
        TimeRange::new(from, from + chrono::Duration::minutes(34))
    }

    const MACRO_QUERY: &str = r#"{
        "queryType": "Azure Resource Graph",
        "azureResourceGraph": {
            "query":        "resources | where $__contains(name,'res1','res2')",
            "resultFormat": "table"
        }
    }"#;

    #[test]
    fn test_query_with_macros_is_interpolated() {
        let specs = vec![QuerySpec::new("A", MACRO_QUERY, range())];
        let queries = build_queries(&specs, &DatasourceInfo::default()).unwrap();

        assert_eq!(
            queries,
            vec![QueryDescriptor {
                ref_id: "A".into(),
                result_format: "table".into(),
                url: String::new(),
                json: MACRO_QUERY.into(),
                interpolated_query: "resources | where ['name'] in ('res1','res2')".into(),
                subscriptions: vec![],
                time_range: range(),
            }]
        );
    }

    #[test]
    fn test_result_format_defaults_to_table() {
        let json = r#"{"azureResourceGraph": {"query": "resources"}}"#;
        let queries =
            build_queries(&[QuerySpec::new("B", json, range())], &DatasourceInfo::default()).unwrap();
        assert_eq!(queries[0].result_format, "table");
    }

    #[test]
    fn test_result_format_carried_verbatim() {
        let json = r#"{"azureResourceGraph": {"query": "resources", "resultFormat": "time_series"}}"#;
        let queries =
            build_queries(&[QuerySpec::new("B", json, range())], &DatasourceInfo::default()).unwrap();
        assert_eq!(queries[0].result_format, "time_series");
    }

    #[test]
    fn test_order_is_preserved() {
        let specs: Vec<QuerySpec> = ["C", "A", "B", "D"]
            .iter()
            .map(|id| {
                QuerySpec::new(
                    *id,
                    format!(r#"{{"azureResourceGraph": {{"query": "resources | take {}"}}}}"#, id.len()),
                    range(),
                )
            })
            .collect();
        let queries = build_queries(&specs, &DatasourceInfo::default()).unwrap();

        assert_eq!(queries.len(), specs.len());
        for (spec, query) in specs.iter().zip(&queries) {
            assert_eq!(spec.ref_id, query.ref_id);
        }
    }

    #[test]
    fn test_subscriptions_fall_back_to_datasource() {
        let mut ds = DatasourceInfo::default();
        ds.default_subscriptions = vec!["default-sub".into()];

        let bare = r#"{"azureResourceGraph": {"query": "resources"}}"#;
        let explicit = r#"{"subscriptions": ["s1", "s2"], "azureResourceGraph": {"query": "resources"}}"#;
        let queries = build_queries(
            &[QuerySpec::new("A", bare, range()), QuerySpec::new("B", explicit, range())],
            &ds,
        )
        .unwrap();

        assert_eq!(queries[0].subscriptions, vec!["default-sub".to_string()]);
        assert_eq!(queries[1].subscriptions, vec!["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn test_one_malformed_spec_fails_the_batch() {
        let good = QuerySpec::new("A", r#"{"azureResourceGraph": {"query": "resources"}}"#, range());
        let bad = QuerySpec::new("B", r#"{"azureResourceGraph": {"resultFormat": "table"}}"#, range());

        match build_queries(&[good, bad], &DatasourceInfo::default()) {
            Err(Error::Build { ref_id, reason }) => {
                assert_eq!(ref_id, "B");
                assert!(reason.contains("azureResourceGraph.query"), "{reason}");
            }
            other => panic!("expected build error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_json_is_a_build_error() {
        let spec = QuerySpec::new("Z", "{\"azureResourceGraph\": ", range());
        assert!(matches!(
            build_queries(&[spec], &DatasourceInfo::default()),
            Err(Error::Build { ref_id, .. }) if ref_id == "Z"
        ));
    }

    #[test]
    fn test_wrong_query_type_is_a_build_error() {
        let spec = QuerySpec::new("A", r#"{"azureResourceGraph": {"query": 42}}"#, range());
        assert!(build_queries(&[spec], &DatasourceInfo::default()).is_err());
    }

    #[test]
    fn test_bad_macro_is_a_build_error() {
        let spec = QuerySpec::new(
            "M",
            r#"{"azureResourceGraph": {"query": "resources | where $__contains(name)"}}"#,
            range(),
        );
        match build_queries(&[spec], &DatasourceInfo::default()) {
            Err(Error::Build { ref_id, reason }) => {
                assert_eq!(ref_id, "M");
                assert!(reason.contains("$__contains"), "{reason}");
            }
            other => panic!("expected build error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_batch() {
        assert!(build_queries(&[], &DatasourceInfo::default()).unwrap().is_empty());
    }
}
