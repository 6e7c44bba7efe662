//! BoxToolExecutor -- object-safe dynamic dispatch wrapper for ToolExecutor.
//!
//! 1. `ToolExecutorDyn` is the object-safe twin with a boxed future
//! 2. Blanket impl of `ToolExecutorDyn` for every `T: ToolExecutor`
//! 3. `BoxToolExecutor` wraps `Box<dyn ToolExecutorDyn>` and is itself a
//!    `ToolExecutor`, so the engine can be instantiated with it

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use caseflow_types::error::ToolError;
use caseflow_types::workflow::ToolOutcome;

use super::executor::ToolExecutor;

/// Object-safe version of [`ToolExecutor`] with a boxed future.
pub trait ToolExecutorDyn: Send + Sync {
    fn execute_boxed<'a>(
        &'a self,
        tool: &'a str,
        params: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutcome, ToolError>> + Send + 'a>>;
}

impl<T: ToolExecutor> ToolExecutorDyn for T {
    fn execute_boxed<'a>(
        &'a self,
        tool: &'a str,
        params: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutcome, ToolError>> + Send + 'a>> {
        Box::pin(self.execute(tool, params))
    }
}

/// Type-erased tool executor, chosen at runtime from configuration
/// (dry-run vs HTTP).
pub struct BoxToolExecutor {
    inner: Box<dyn ToolExecutorDyn + Send + Sync>,
}

impl BoxToolExecutor {
    pub fn new<T: ToolExecutor + 'static>(executor: T) -> Self {
        Self {
            inner: Box::new(executor),
        }
    }
}

impl ToolExecutor for BoxToolExecutor {
    async fn execute(&self, tool: &str, params: &Value) -> Result<ToolOutcome, ToolError> {
        self.inner.execute_boxed(tool, params).await
    }
}

impl std::fmt::Debug for BoxToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxToolExecutor").finish_non_exhaustive()
    }
}
