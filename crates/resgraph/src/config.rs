//! Datasource configuration and executor settings.
//!
//! The datasource is configured from a `jsonData` settings object,
//! optionally loaded from a file, with environment overrides:
//!
//! - `RESGRAPH_CLOUD`: cloud identifier (`public`, `china`, ...)
//! - `RESGRAPH_URL`: Resource Graph base URL, overriding the cloud default
//! - `RESGRAPH_SUBSCRIPTIONS`: comma separated default subscriptions
//!
//! Executor tuning comes from `RESGRAPH_TIMEOUT_SECS` and
//! `RESGRAPH_MAX_CONCURRENCY`.

use crate::cloud::CloudEnvironment;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Configuration of one Resource Graph datasource.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasourceInfo {
    pub cloud: CloudEnvironment,
    /// Base URL requests are sent to.
    pub resource_graph_url: String,
    /// Used when a query names no subscriptions.
    pub default_subscriptions: Vec<String>,
    /// Raw settings, passed through untouched.
    pub settings: serde_json::Value,
}

impl Default for DatasourceInfo {
    fn default() -> Self {
        Self::for_cloud(CloudEnvironment::Public)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsView {
    #[serde(default)]
    cloud_name: Option<String>,
    #[serde(default)]
    resource_graph_url: Option<String>,
    #[serde(default)]
    subscription_id: Option<String>,
}

impl DatasourceInfo {
    /// Datasource pointing at the default endpoint of `cloud`.
    pub fn for_cloud(cloud: CloudEnvironment) -> Self {
        Self {
            cloud,
            resource_graph_url: cloud.api_url().to_string(),
            default_subscriptions: Vec::new(),
            settings: serde_json::Value::Null,
        }
    }

    /// Parse a `jsonData` settings object.
    pub fn from_settings_json(json: &str) -> Result<Self> {
        let settings: serde_json::Value = serde_json::from_str(json)?;
        let view: SettingsView = serde_json::from_value(settings.clone())
            .map_err(|e| Error::Config(format!("invalid datasource settings: {e}")))?;

        let cloud = match view.cloud_name.as_deref() {
            Some(id) => id.parse()?,
            None => CloudEnvironment::Public,
        };
        let mut info = Self::for_cloud(cloud);
        if let Some(url) = view.resource_graph_url.filter(|u| !u.is_empty()) {
            info.resource_graph_url = url;
        }
        if let Some(sub) = view.subscription_id.filter(|s| !s.is_empty()) {
            info.default_subscriptions.push(sub);
        }
        info.settings = settings;
        Ok(info)
    }

    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_settings_json(&raw)
    }

    /// Apply `RESGRAPH_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(cloud) = read_env_string("RESGRAPH_CLOUD") {
            let cloud: CloudEnvironment = cloud.parse()?;
            // A new cloud implies its own endpoint unless RESGRAPH_URL says otherwise.
            if cloud != self.cloud {
                self.cloud = cloud;
                self.resource_graph_url = cloud.api_url().to_string();
            }
        }
        if let Some(url) = read_env_string("RESGRAPH_URL") {
            self.resource_graph_url = url;
        }
        if let Some(subs) = read_env_string("RESGRAPH_SUBSCRIPTIONS") {
            self.default_subscriptions = split_list(&subs);
        }
        Ok(self)
    }

    /// Datasource configured purely from the environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Portal base URL for this datasource's cloud.
    pub fn portal_url(&self) -> &'static str {
        self.cloud.portal_url()
    }
}

/// Executor tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Per-batch deadline applied when the caller sets none.
    pub timeout: Duration,
    /// Queries in flight at once.
    pub max_concurrency: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl ExecutorSettings {
    pub fn from_env() -> Self {
        Self {
            timeout: Duration::from_secs(
                read_env_u64("RESGRAPH_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS).max(1),
            ),
            max_concurrency: read_env_usize("RESGRAPH_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY)
                .max(1),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, default: u64) -> u64 {
    read_env_string(name)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn read_env_usize(name: &str, default: usize) -> usize {
    read_env_string(name)
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}
