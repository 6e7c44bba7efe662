//! Workflow definition parsing, validation, and filesystem discovery.
//!
//! Converts YAML into the `WorkflowDefinition` IR, checks the structural
//! constraints the engine relies on (unique step IDs, references that only
//! look backwards), and scans directories for extra definitions.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use caseflow_types::workflow::{CheckpointType, Namespace, ReferencePath, WorkflowDefinition};
use thiserror::Error;

/// Step IDs that would collide with reference namespaces or the
/// workflow-level checkpoint markers.
const RESERVED_STEP_IDS: &[&str] = &["inputs", "context", "workflow_start", "workflow_complete"];

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while loading workflow definitions.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML parse failure (including unknown condition operators).
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Two definitions share an ID.
    #[error("duplicate workflow ID: '{0}'")]
    DuplicateWorkflow(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `WorkflowDefinition`.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Serialize a `WorkflowDefinition` back to YAML.
pub fn serialize_workflow_yaml(def: &WorkflowDefinition) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(def).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowDefinition`.
///
/// Checks:
/// - ID is non-empty and limited to alphanumerics, `_` and `-`
/// - At least one step exists
/// - Step IDs are unique and not reserved
/// - Input field names are unique across required and optional inputs
/// - Step references in input templates and conditions point to an
///   earlier step
/// - Input checkpoints declare at least one field
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if def.id.is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow ID must not be empty".to_string(),
        ));
    }
    if !def
        .id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(WorkflowError::ValidationError(format!(
            "workflow ID '{}' contains invalid characters",
            def.id
        )));
    }

    if def.steps.is_empty() {
        return Err(WorkflowError::ValidationError(format!(
            "workflow '{}' must have at least one step",
            def.id
        )));
    }

    let mut fields = HashSet::new();
    for input in def.required_inputs.iter().chain(&def.optional_inputs) {
        if !fields.insert(input.field.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "duplicate input field: '{}'",
                input.field
            )));
        }
    }

    // Walk steps in order so `seen` holds exactly the earlier steps.
    let mut seen: HashSet<&str> = HashSet::new();
    for step in &def.steps {
        if RESERVED_STEP_IDS.contains(&step.id.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "step ID '{}' is reserved",
                step.id
            )));
        }

        for reference in step.input.references() {
            check_backward_reference(&step.id, reference, &seen)?;
        }

        if let Some(condition) = &step.condition {
            let path = ReferencePath::from_dotted(&condition.field);
            check_backward_reference(&step.id, &path, &seen)?;
        }

        if let Some(checkpoint) = &step.checkpoint {
            if checkpoint.checkpoint_type == CheckpointType::Input
                && checkpoint.fields.is_empty()
            {
                return Err(WorkflowError::ValidationError(format!(
                    "input checkpoint on step '{}' declares no fields",
                    step.id
                )));
            }
        }

        if !seen.insert(step.id.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "duplicate step ID: '{}'",
                step.id
            )));
        }
    }

    Ok(())
}

fn check_backward_reference(
    step_id: &str,
    path: &ReferencePath,
    earlier: &HashSet<&str>,
) -> Result<(), WorkflowError> {
    if let Namespace::Step(target) = &path.namespace {
        if !earlier.contains(target.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "step '{step_id}' references '{}' which is not an earlier step",
                path.dotted()
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a workflow definition from a YAML file.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_yaml(&content)
}

/// Discover all workflow YAML files under `base_dir`, sorted by path.
///
/// Files that fail to parse or validate are skipped with a warning.
pub fn discover_workflows(
    base_dir: &Path,
) -> Result<Vec<(PathBuf, WorkflowDefinition)>, WorkflowError> {
    let mut results = Vec::new();
    if !base_dir.exists() {
        return Ok(results);
    }
    discover_recursive(base_dir, &mut results)?;
    results.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(results)
}

fn discover_recursive(
    dir: &Path,
    results: &mut Vec<(PathBuf, WorkflowDefinition)>,
) -> Result<(), WorkflowError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            discover_recursive(&path, results)?;
            continue;
        }
        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if !is_yaml {
            continue;
        }
        match load_workflow_file(&path) {
            Ok(def) => results.push((path, def)),
            Err(e) => {
                tracing::warn!(?path, error = %e, "skipping unparseable workflow file");
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_STEP: &str = r#"
id: case_from_signal
name: Case from signal
required_inputs:
  - field: description
    type: string
steps:
  - id: create_signal
    name: Create signal
    tool: signal_create
    input:
      description: $inputs.description
  - id: create_case
    name: Create case
    tool: case_create
    input:
      signalId: $create_signal.signalId
      requester: $context.userId
"#;

    #[test]
    fn test_parse_valid_workflow() {
        let def = parse_workflow_yaml(TWO_STEP).expect("should parse");
        assert_eq!(def.id, "case_from_signal");
        assert_eq!(def.steps.len(), 2);
        assert_eq!(def.required_inputs[0].field, "description");
        assert!(!def.requires_approval_to_start);
    }

    #[test]
    fn test_validation_rejects_duplicate_step_ids() {
        let yaml = r#"
id: dup
name: Dup
steps:
  - { id: a, name: A, tool: t }
  - { id: a, name: A again, tool: t }
"#;
        let err = parse_workflow_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate step ID"), "{err}");
    }

    #[test]
    fn test_validation_rejects_forward_reference() {
        let yaml = r#"
id: fwd
name: Forward
steps:
  - id: a
    name: A
    tool: t
    input:
      x: $b.id
  - { id: b, name: B, tool: t }
"#;
        let err = parse_workflow_yaml(yaml).unwrap_err();
        assert!(matches!(err, WorkflowError::ValidationError(_)));
        assert!(err.to_string().contains("b.id"), "{err}");
    }

    #[test]
    fn test_validation_rejects_condition_on_unknown_step() {
        let yaml = r#"
id: cond
name: Cond
steps:
  - id: a
    name: A
    tool: t
    condition:
      field: ghost.id
      operator: exists
"#;
        assert!(parse_workflow_yaml(yaml).is_err());
    }

    #[test]
    fn test_validation_rejects_reserved_step_id() {
        let yaml = r#"
id: reserved
name: Reserved
steps:
  - { id: inputs, name: Inputs, tool: t }
"#;
        let err = parse_workflow_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_validation_rejects_empty_steps_and_bad_id() {
        assert!(parse_workflow_yaml("id: empty\nname: Empty\nsteps: []\n").is_err());
        assert!(parse_workflow_yaml("id: 'bad id'\nname: X\nsteps:\n  - {id: a, name: A, tool: t}\n").is_err());
    }

    #[test]
    fn test_validation_rejects_input_checkpoint_without_fields() {
        let yaml = r#"
id: ask
name: Ask
steps:
  - id: a
    name: A
    tool: t
    checkpoint:
      type: input
      message: Tell me more
"#;
        assert!(parse_workflow_yaml(yaml).is_err());
    }

    #[test]
    fn test_unknown_operator_is_parse_error() {
        let yaml = r#"
id: op
name: Op
steps:
  - id: a
    name: A
    tool: t
    condition:
      field: inputs.x
      operator: matches
"#;
        let err = parse_workflow_yaml(yaml).unwrap_err();
        assert!(matches!(err, WorkflowError::ParseError(_)), "{err}");
    }

    #[test]
    fn test_serialize_reparses() {
        let def = parse_workflow_yaml(TWO_STEP).unwrap();
        let yaml = serialize_workflow_yaml(&def).unwrap();
        assert!(yaml.contains("$create_signal.signalId"));
        let again = parse_workflow_yaml(&yaml).unwrap();
        assert_eq!(again.steps[1].input, def.steps[1].input);
    }

    #[test]
    fn test_discover_workflows() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.yaml"), TWO_STEP).unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(
            dir.path().join("sub/two.yml"),
            TWO_STEP.replace("id: case_from_signal", "id: case_copy"),
        )
        .unwrap();
        std::fs::write(dir.path().join("not-a-workflow.yaml"), "key: value").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let found = discover_workflows(dir.path()).expect("should discover");
        let ids: Vec<&str> = found.iter().map(|(_, d)| d.id.as_str()).collect();
        assert_eq!(ids, vec!["case_from_signal", "case_copy"]);
    }

    #[test]
    fn test_discover_nonexistent_dir() {
        let found = discover_workflows(Path::new("/nonexistent/caseflow/path")).unwrap();
        assert!(found.is_empty());
    }
}
