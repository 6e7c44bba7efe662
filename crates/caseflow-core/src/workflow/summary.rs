//! Human-readable summaries attached to every `WorkflowResponse`.

use serde_json::Value;

use caseflow_types::workflow::{
    ExecutionStatus, StepStatus, WorkflowDefinition, WorkflowExecutionState, WorkflowStep,
};

/// Summary for an execution record in its current state.
///
/// `hitl_message` is the already-rendered checkpoint message, if any.
pub fn summarize(
    def: &WorkflowDefinition,
    state: &WorkflowExecutionState,
    hitl_message: Option<&str>,
) -> String {
    match state.status {
        ExecutionStatus::Completed => completed_summary(def, state),
        ExecutionStatus::Failed => state
            .error
            .clone()
            .unwrap_or_else(|| format!("Workflow \"{}\" failed.", def.name)),
        ExecutionStatus::PendingInput | ExecutionStatus::PendingApproval => hitl_message
            .map(str::to_string)
            .unwrap_or_else(|| format!("Workflow \"{}\" is waiting for a response.", def.name)),
        ExecutionStatus::Running | ExecutionStatus::Paused => {
            format!("Workflow \"{}\" is {}.", def.name, state.status)
        }
    }
}

/// Summary for a start request rejected for missing inputs.
pub fn missing_inputs_summary(def: &WorkflowDefinition, missing: &[String]) -> String {
    format!(
        "Workflow \"{}\" needs more information. Missing required inputs: {}.",
        def.name,
        missing.join(", ")
    )
}

fn completed_summary(def: &WorkflowDefinition, state: &WorkflowExecutionState) -> String {
    let mut summary = format!("Workflow \"{}\" completed successfully.", def.name);
    for (step, result) in def.steps.iter().zip(&state.step_results) {
        match result.status {
            StepStatus::Completed => {
                summary.push(' ');
                summary.push_str(&step_sentence(step, state.outputs.get(&step.id)));
            }
            StepStatus::Failed => {
                summary.push_str(&format!(
                    " Optional step \"{}\" failed: {}.",
                    step.name,
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }
            _ => {}
        }
    }
    summary
}

fn step_sentence(step: &WorkflowStep, output: Option<&Value>) -> String {
    let (label, id) = output.map(|o| notable_fields(step, o)).unwrap_or_default();
    match (label, id) {
        (Some(label), Some(id)) if label != id => format!("{}: {label} ({id}).", step.name),
        (Some(label), _) => format!("{}: {label}.", step.name),
        (None, Some(id)) => format!("{}: {id}.", step.name),
        (None, None) => format!("{}: done.", step.name),
    }
}

/// Pick a display label (`*Number`, then `name`, then `title`) and an
/// identifier (`*Id`) from a tool result. Declared `outputs` are searched
/// first.
fn notable_fields(step: &WorkflowStep, output: &Value) -> (Option<String>, Option<String>) {
    let Value::Object(fields) = output else {
        return (None, None);
    };

    let mut keys: Vec<&str> = step.outputs.iter().map(String::as_str).collect();
    keys.extend(fields.keys().map(String::as_str));

    let display = |key: &str| match fields.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let first = |pred: &dyn Fn(&str) -> bool| {
        keys.iter()
            .copied()
            .filter(|k| pred(k))
            .find_map(|k| display(k))
    };

    let label = first(&|k| k.ends_with("Number"))
        .or_else(|| first(&|k| k == "name"))
        .or_else(|| first(&|k| k == "title"));
    let id = first(&|k| k.ends_with("Id"));
    (label, id)
}
