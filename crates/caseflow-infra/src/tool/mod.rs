//! Tool executor implementations.
//!
//! - `HttpToolExecutor`: POSTs resolved parameters to a tool gateway
//! - `DryRunToolExecutor`: synthesizes plausible results locally
//!
//! `from_config` picks one at runtime and erases it behind `BoxToolExecutor`.

pub mod dry_run;
pub mod http;

use caseflow_core::tool::BoxToolExecutor;
use caseflow_types::config::{ToolExecutorConfig, ToolExecutorMode};
use caseflow_types::error::ToolError;

pub use dry_run::DryRunToolExecutor;
pub use http::HttpToolExecutor;

/// Build the executor selected by configuration.
pub fn from_config(config: &ToolExecutorConfig) -> Result<BoxToolExecutor, ToolError> {
    match config.mode {
        ToolExecutorMode::DryRun => {
            tracing::info!("using dry-run tool executor");
            Ok(BoxToolExecutor::new(DryRunToolExecutor::new()))
        }
        ToolExecutorMode::Http => {
            tracing::info!(base_url = %config.base_url, "using HTTP tool executor");
            Ok(BoxToolExecutor::new(HttpToolExecutor::new(
                &config.base_url,
                config.timeout_secs,
            )?))
        }
    }
}
