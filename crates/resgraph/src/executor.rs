//! Query executor — sends built queries and classifies what comes back.
//!
//! Every query ends in exactly one [`ExecutionOutcome`]: a frame with portal
//! links, or an error with a readable message. Transport failures, bad status
//! codes and undecodable bodies are all contained to the query they hit.

use crate::config::{DatasourceInfo, ExecutorSettings};
use crate::error::{ExecutionError, Result};
use crate::frame::{Frame, FrameMeta};
use crate::normalize::{self, ErrorEnvelope, ResourceGraphResponse};
use crate::query;
use crate::request::{construct_request, QueryContext};
use crate::transport::Transport;
use crate::types::{QueryDescriptor, QuerySpec};
use futures::stream::{self, StreamExt};
use reqwest::StatusCode;
use serde::Serialize;
use std::future::Future;

/// Resource Graph resources endpoint, relative to the API base URL.
pub const PROVIDER_PATH: &str = "/providers/Microsoft.ResourceGraph/resources";
pub const API_VERSION: &str = "2021-06-01-preview";

/// Payload shape requested from the provider, whatever the query model names.
const REQUEST_RESULT_FORMAT: &str = "table";

/// Result of running one query.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Frame(Frame),
    Error(ExecutionError),
}

impl ExecutionOutcome {
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            ExecutionOutcome::Frame(frame) => Some(frame),
            ExecutionOutcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match self {
            ExecutionOutcome::Frame(_) => None,
            ExecutionOutcome::Error(err) => Some(err),
        }
    }

    /// User-facing error message; empty on success.
    pub fn error_message(&self) -> String {
        self.error().map(|e| e.to_string()).unwrap_or_default()
    }
}

/// Outcome of one query in a batch, keyed by its reference id.
#[derive(Debug, Clone, PartialEq)]
pub struct DataResponse {
    pub ref_id: String,
    pub outcome: ExecutionOutcome,
}

#[derive(Serialize)]
struct RequestBody<'a> {
    subscriptions: &'a [String],
    query: &'a str,
    options: RequestOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestOptions {
    result_format: &'static str,
}

/// Build, execute and normalize a batch of queries.
///
/// Building is all or nothing and its errors abort the batch. After that,
/// each query runs independently (at most `settings.max_concurrency` at a
/// time) and the responses come back in input order.
pub async fn query_data(
    ctx: &QueryContext,
    specs: &[QuerySpec],
    ds_info: &DatasourceInfo,
    transport: &dyn Transport,
    settings: &ExecutorSettings,
) -> Result<Vec<DataResponse>> {
    let queries = query::build_queries(specs, ds_info)?;
    let ctx = &ctx.with_timeout(settings.timeout);
    let base_url = ds_info.resource_graph_url.as_str();

    let responses: Vec<DataResponse> = stream::iter(queries)
        .map(|descriptor| async move {
            let descriptor = descriptor.with_url(base_url);
            let outcome = execute_query(ctx, &descriptor, ds_info, transport, &descriptor.url).await;
            DataResponse {
                ref_id: descriptor.ref_id,
                outcome,
            }
        })
        .buffered(settings.max_concurrency.max(1))
        .collect()
        .await;

    Ok(responses)
}

/// Execute one query against `base_url` through `transport`.
pub async fn execute_query(
    ctx: &QueryContext,
    query: &QueryDescriptor,
    ds_info: &DatasourceInfo,
    transport: &dyn Transport,
    base_url: &str,
) -> ExecutionOutcome {
    match run_query(ctx, query, ds_info, transport, base_url).await {
        Ok(frame) => ExecutionOutcome::Frame(frame),
        Err(err) => {
            tracing::warn!(
                ref_id = %query.ref_id,
                status = ?err.status(),
                "resource graph query failed: {err}"
            );
            ExecutionOutcome::Error(err)
        }
    }
}

async fn run_query(
    ctx: &QueryContext,
    query: &QueryDescriptor,
    ds_info: &DatasourceInfo,
    transport: &dyn Transport,
    base_url: &str,
) -> std::result::Result<Frame, ExecutionError> {
    if ctx.is_cancelled() {
        return Err(ExecutionError::Cancelled);
    }

    let body = serde_json::to_vec(&RequestBody {
        subscriptions: &query.subscriptions,
        query: &query.interpolated_query,
        options: RequestOptions {
            result_format: REQUEST_RESULT_FORMAT,
        },
    })
    .map_err(|e| ExecutionError::Construction(e.to_string()))?;

    let mut request = construct_request(ctx, body, base_url)
        .map_err(|e| ExecutionError::Construction(e.to_string()))?;
    let url = request.url_mut();
    let path = format!("{}{PROVIDER_PATH}", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("api-version", API_VERSION);

    tracing::debug!(ref_id = %query.ref_id, method = "POST", url = %request.url(), "sending resource graph request");

    let (status, body) = within_context(ctx, async {
        let response = transport
            .round_trip(request)
            .await
            .map_err(|e| ExecutionError::Transport(format!("{e:#}")))?;
        let status = response.status();
        // Consuming the response releases the connection whatever happens next.
        let body = response
            .bytes()
            .await
            .map_err(|e| ExecutionError::Transport(format!("failed to read response body: {e}")))?;
        Ok((status, body))
    })
    .await?;

    if !status.is_success() {
        return Err(provider_error(status, &body));
    }

    let decoded: ResourceGraphResponse = serde_json::from_slice(&body)
        .map_err(|e| ExecutionError::Decode(e.to_string()))?;
    let mut frame =
        normalize::frame_from_table(&query.ref_id, &decoded.data).map_err(ExecutionError::Decode)?;
    frame.meta = Some(FrameMeta {
        executed_query_string: query.interpolated_query.clone(),
    });

    let link = normalize::portal_query_link(ds_info.portal_url(), &query.interpolated_query);
    Ok(normalize::add_config_links(frame, &link))
}

/// Race `fut` against cancellation and the deadline of `ctx`.
async fn within_context<T>(
    ctx: &QueryContext,
    fut: impl Future<Output = std::result::Result<T, ExecutionError>>,
) -> std::result::Result<T, ExecutionError> {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(ExecutionError::Cancelled),
        _ = ctx.expired() => Err(ExecutionError::DeadlineExceeded),
        res = fut => res,
    }
}

/// Error for a non-2xx response; never carries an empty message.
fn provider_error(status: StatusCode, body: &[u8]) -> ExecutionError {
    let flattened = serde_json::from_slice::<ErrorEnvelope>(body)
        .map(|envelope| normalize::flatten_error(&envelope))
        .unwrap_or_default();

    let message = if flattened.is_empty() {
        let raw = String::from_utf8_lossy(body);
        let raw = raw.trim();
        if raw.is_empty() {
            format!("{status}. Azure Resource Graph error: empty response body")
        } else {
            format!("{status}. Azure Resource Graph error: {raw}")
        }
    } else {
        flattened
    };

    ExecutionError::Provider {
        status: status.as_u16(),
        message,
    }
}
