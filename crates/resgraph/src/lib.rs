// Copyright 2026 Resgraph Contributors
// SPDX-License-Identifier: Apache-2.0

//! Resgraph — Azure Resource Graph query layer.
//!
//! Turns KQL queries enriched with `$__` macros into Resource Graph requests
//! against the right sovereign cloud, runs them through an injected
//! transport and normalizes the answer into a linked [`Frame`] or a readable
//! error.
//!
//! ```text
//! QuerySpec ─▶ query::build_queries (macros::interpolate) ─▶ QueryDescriptor
//!           ─▶ request::construct_request ─▶ Transport ─▶ normalize ─▶ ExecutionOutcome
//! ```

pub mod cloud;
pub mod config;
pub mod error;
pub mod executor;
pub mod frame;
pub mod macros;
pub mod normalize;
pub mod query;
pub mod request;
pub mod transport;
pub mod types;

pub use cloud::{portal_url, CloudEnvironment};
pub use config::{DatasourceInfo, ExecutorSettings};
pub use error::{Error, ExecutionError, MacroError, Result};
pub use executor::{execute_query, query_data, DataResponse, ExecutionOutcome};
pub use frame::{DataLink, Field, FieldConfig, FieldType, Frame, FrameMeta, FrameValue};
pub use query::build_queries;
pub use request::{construct_request, CancelHandle, QueryContext, USER_AGENT};
pub use transport::{ReqwestTransport, Transport};
pub use types::{QueryDescriptor, QuerySpec, TimeRange};
