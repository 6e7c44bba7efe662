//! Dry-run tool executor for local runs and demos.
//!
//! Never calls anything. Known case-management tools get results shaped
//! like the real ones, with identifiers drawn from a counter.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};

use caseflow_core::tool::ToolExecutor;
use caseflow_types::error::ToolError;
use caseflow_types::workflow::ToolOutcome;

#[derive(Debug, Default)]
pub struct DryRunToolExecutor {
    counter: AtomicU64,
}

impl DryRunToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn synthesize(&self, tool: &str, params: &Value) -> Value {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let param = |key: &str| params.get(key).cloned().unwrap_or(Value::Null);

        match tool {
            "signal_create" => json!({
                "signalId": format!("sig-{n}"),
                "signalNumber": format!("SIG-{n:05}"),
            }),
            "case_create" => json!({
                "caseId": format!("case-{n}"),
                "caseNumber": format!("CASE-{n:05}"),
                "title": param("title"),
            }),
            "case_assign" => json!({
                "caseId": param("caseId"),
                "assignee": param("assignee"),
            }),
            "case_link_person" => json!({
                "linked": true,
                "caseId": param("caseId"),
                "personId": param("personId"),
            }),
            "person_search" => json!({"matchCount": 0, "matches": []}),
            "person_create" => {
                let name = [param("firstName"), param("lastName")]
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect::<Vec<_>>()
                    .join(" ");
                json!({"personId": format!("person-{n}"), "name": name})
            }
            "organization_create" => json!({
                "organizationId": format!("org-{n}"),
                "name": param("name"),
            }),
            "organization_add_address" => json!({"addressId": format!("addr-{n}")}),
            "folder_create" => json!({
                "folderId": format!("folder-{n}"),
                "name": param("name"),
            }),
            "folder_set_permissions" => json!({
                "folderId": param("folderId"),
                "accessLevel": param("accessLevel"),
            }),
            other => json!({"id": format!("{other}-{n}"), "params": params}),
        }
    }
}

impl ToolExecutor for DryRunToolExecutor {
    async fn execute(&self, tool: &str, params: &Value) -> Result<ToolOutcome, ToolError> {
        let result = self.synthesize(tool, params);
        tracing::info!(tool, "dry-run tool call");
        Ok(ToolOutcome::ok(result))
    }
}
