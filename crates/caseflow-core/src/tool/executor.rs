//! ToolExecutor trait definition.

use serde_json::Value;

use caseflow_types::error::ToolError;
use caseflow_types::workflow::ToolOutcome;

/// Performs the side effect behind a workflow step (creating a signal,
/// registering a person, ...) and reports back.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
/// Implementations live in caseflow-infra (`HttpToolExecutor`,
/// `DryRunToolExecutor`).
///
/// The engine treats `Err(_)` and `Ok(ToolOutcome { success: false, .. })`
/// the same way.
pub trait ToolExecutor: Send + Sync {
    fn execute(
        &self,
        tool: &str,
        params: &Value,
    ) -> impl std::future::Future<Output = Result<ToolOutcome, ToolError>> + Send;
}
