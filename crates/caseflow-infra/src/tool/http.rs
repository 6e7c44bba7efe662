//! HTTP tool executor.
//!
//! Each step tool is exposed by a gateway as `POST {base_url}/tools/{tool}`.
//! The request body is the resolved parameter object; a 2xx response body
//! must be a `ToolOutcome` (`{success, result, error?}`).

use std::time::Duration;

use serde_json::Value;

use caseflow_core::tool::ToolExecutor;
use caseflow_types::error::ToolError;
use caseflow_types::workflow::ToolOutcome;

pub struct HttpToolExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpToolExecutor {
    /// Create an executor for the gateway at `base_url`.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ToolError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, tool: &str) -> String {
        format!("{}/tools/{}", self.base_url, tool)
    }
}

impl ToolExecutor for HttpToolExecutor {
    async fn execute(&self, tool: &str, params: &Value) -> Result<ToolOutcome, ToolError> {
        let url = self.url(tool);

        let response = self
            .client
            .post(&url)
            .json(params)
            .send()
            .await
            .map_err(|e| ToolError::Transport(format!("POST {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(tool, status = status.as_u16(), "tool gateway returned an error");
            return Err(ToolError::Status {
                tool: tool.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let outcome: ToolOutcome = response
            .json()
            .await
            .map_err(|e| ToolError::InvalidResponse(format!("{tool}: {e}")))?;

        tracing::debug!(tool, success = outcome.success, "tool call returned");
        Ok(outcome)
    }
}
