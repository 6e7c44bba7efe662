//! Built-in case-management workflows, compiled into the binary.

use caseflow_types::workflow::WorkflowDefinition;

use super::definition::{WorkflowError, parse_workflow_yaml};

/// `(file name, YAML source)` for each built-in workflow.
pub const BUILTIN_WORKFLOWS: &[(&str, &str)] = &[
    (
        "signal_create.yaml",
        include_str!("../../workflows/signal_create.yaml"),
    ),
    (
        "case_from_signal.yaml",
        include_str!("../../workflows/case_from_signal.yaml"),
    ),
    (
        "person_register.yaml",
        include_str!("../../workflows/person_register.yaml"),
    ),
    (
        "organization_register.yaml",
        include_str!("../../workflows/organization_register.yaml"),
    ),
    (
        "folder_create.yaml",
        include_str!("../../workflows/folder_create.yaml"),
    ),
];

/// Parse every built-in workflow.
pub fn builtin_definitions() -> Result<Vec<WorkflowDefinition>, WorkflowError> {
    BUILTIN_WORKFLOWS
        .iter()
        .map(|(file, yaml)| {
            parse_workflow_yaml(yaml).map_err(|e| match e {
                WorkflowError::ParseError(msg) => WorkflowError::ParseError(format!("{file}: {msg}")),
                WorkflowError::ValidationError(msg) => {
                    WorkflowError::ValidationError(format!("{file}: {msg}"))
                }
                other => other,
            })
        })
        .collect()
}
