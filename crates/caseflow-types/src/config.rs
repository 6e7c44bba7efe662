//! Engine configuration types for Caseflow.
//!
//! `EngineConfig` mirrors `caseflow.toml`. Every field has a default so an
//! empty or missing file yields a usable configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Finished executions older than this are evicted by the reaper.
    #[serde(default = "default_execution_ttl_secs")]
    pub execution_ttl_secs: u64,

    /// Reaper tick interval.
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,

    /// Extra directory of YAML workflow definitions loaded on top of the
    /// built-in catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_dir: Option<PathBuf>,

    #[serde(default)]
    pub tool_executor: ToolExecutorConfig,
}

fn default_execution_ttl_secs() -> u64 {
    86_400
}

fn default_reap_interval_secs() -> u64 {
    300
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution_ttl_secs: default_execution_ttl_secs(),
            reap_interval_secs: default_reap_interval_secs(),
            workflow_dir: None,
            tool_executor: ToolExecutorConfig::default(),
        }
    }
}

/// How step tools are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolExecutorMode {
    /// Synthesize results locally without calling anything.
    #[default]
    DryRun,
    /// POST to `{base_url}/tools/{tool}`.
    Http,
}

/// Tool executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutorConfig {
    #[serde(default)]
    pub mode: ToolExecutorMode,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-call timeout for the HTTP executor.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ToolExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ToolExecutorMode::default(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
