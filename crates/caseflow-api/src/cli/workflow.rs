//! Workflow catalog browsing and interactive execution.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use caseflow_core::workflow::definition::serialize_workflow_yaml;
use caseflow_types::workflow::{
    CheckpointType, ExecutionStatus, InputType, JsonMap, UserDecision, WorkflowDefinition,
    WorkflowResponse,
};

use crate::state::AppState;

/// Workflow catalog subcommands.
#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// List every registered workflow.
    #[command(alias = "ls")]
    List,

    /// Find workflows whose trigger keywords match the text.
    Find {
        /// Free text, e.g. "open a new case".
        text: String,
    },

    /// Show a workflow's inputs and steps.
    Show {
        /// Workflow ID.
        workflow_id: String,

        /// Print the definition as YAML.
        #[arg(long)]
        yaml: bool,
    },
}

/// Handle a `caseflow workflows` subcommand.
pub fn handle_workflow_command(cmd: WorkflowCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        WorkflowCommand::List => print_catalog(&state.engine.list_workflows(), json),
        WorkflowCommand::Find { text } => {
            let found = state.engine.find_by_keyword(&text);
            if found.is_empty() && !json {
                println!("  No workflow matches \"{}\".", style(&text).yellow());
                return Ok(());
            }
            print_catalog(&found, json)
        }
        WorkflowCommand::Show { workflow_id, yaml } => {
            let Some(def) = state.engine.registry().get(&workflow_id) else {
                bail!("workflow not found: {workflow_id}");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(def)?);
            } else if yaml {
                print!("{}", serialize_workflow_yaml(def)?);
            } else {
                print_definition(def);
            }
            Ok(())
        }
    }
}

fn print_catalog(defs: &[&WorkflowDefinition], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(defs)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "Name", "Category", "Steps", "Required inputs"]);

    for def in defs {
        let required: Vec<&str> = def.required_inputs.iter().map(|i| i.field.as_str()).collect();
        table.add_row(vec![
            Cell::new(&def.id).fg(Color::Cyan),
            Cell::new(&def.name),
            Cell::new(def.metadata.category.as_deref().unwrap_or("-")),
            Cell::new(def.steps.len()),
            Cell::new(required.join(", ")),
        ]);
    }

    println!("{table}");
    Ok(())
}

fn print_definition(def: &WorkflowDefinition) {
    println!();
    println!("  {} {}", style(&def.name).bold(), style(format!("({})", def.id)).dim());
    if !def.description.is_empty() {
        println!("  {}", def.description);
    }
    if def.requires_approval_to_start {
        println!("  {}", style("Requires approval to start").yellow());
    }
    if def.requires_approval_to_complete {
        println!("  {}", style("Requires approval to complete").yellow());
    }
    println!();

    let mut inputs = Table::new();
    inputs
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_header(vec!["Input", "Type", "Required", "Description"]);
    for (spec, required) in def
        .required_inputs
        .iter()
        .map(|s| (s, true))
        .chain(def.optional_inputs.iter().map(|s| (s, false)))
    {
        inputs.add_row(vec![
            Cell::new(&spec.field),
            Cell::new(format!("{:?}", spec.input_type).to_lowercase()),
            Cell::new(if required { "yes" } else { "no" }),
            Cell::new(&spec.description),
        ]);
    }
    println!("{inputs}");

    let mut steps = Table::new();
    steps
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_header(vec!["#", "Step", "Tool", "Checkpoint", "Flags"]);
    for (index, step) in def.steps.iter().enumerate() {
        let mut flags = Vec::new();
        if step.optional {
            flags.push("optional");
        }
        if step.retry_on_failure {
            flags.push("retry");
        }
        if step.condition.is_some() {
            flags.push("conditional");
        }
        steps.add_row(vec![
            Cell::new(index + 1),
            Cell::new(format!("{} ({})", step.name, step.id)),
            Cell::new(&step.tool),
            Cell::new(
                step.checkpoint
                    .as_ref()
                    .map(|c| c.checkpoint_type.to_string())
                    .unwrap_or_default(),
            ),
            Cell::new(flags.join(", ")),
        ]);
    }
    println!("{steps}");
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Start `workflow_id` and answer its checkpoints until it stops waiting.
///
/// Prompts only when attached to a terminal and not in JSON mode; otherwise
/// the first pending response is printed as is.
pub async fn run_workflow(
    state: &AppState,
    workflow_id: &str,
    inputs: Option<&str>,
    context: Option<&str>,
    yes: bool,
    json: bool,
) -> Result<()> {
    let mut inputs = parse_object(inputs, "--inputs")?;
    let context = parse_object(context, "--context")?;
    let interactive = !json && console::user_attended();

    let mut response = with_spinner(
        json,
        "Starting workflow...",
        state.engine.start(workflow_id, inputs.clone(), context.clone()),
    )
    .await;

    loop {
        let decision = match response.status {
            ExecutionStatus::PendingInput if response.execution_id.is_none() => {
                if !interactive || response.missing_inputs.is_empty() {
                    break;
                }
                print_response(&response, false)?;
                let def = state.engine.registry().get(workflow_id);
                for field in &response.missing_inputs {
                    let input_type = def
                        .and_then(|d| d.required_inputs.iter().find(|i| &i.field == field))
                        .map(|i| i.input_type)
                        .unwrap_or(InputType::String);
                    inputs.insert(field.clone(), prompt_value(field, input_type)?);
                }
                response = with_spinner(
                    json,
                    "Starting workflow...",
                    state.engine.start(workflow_id, inputs.clone(), context.clone()),
                )
                .await;
                continue;
            }
            ExecutionStatus::PendingInput | ExecutionStatus::PendingApproval => {
                match decide(&response, yes, interactive)? {
                    Some(decision) => decision,
                    None => break,
                }
            }
            _ => break,
        };

        let Some(execution_id) = response.execution_id.clone() else {
            break;
        };
        response = with_spinner(
            json,
            "Resuming workflow...",
            state.engine.respond(&execution_id, decision, context.clone()),
        )
        .await;
    }

    print_response(&response, json)
}

/// Collect the decision for a parked execution, or `None` when nobody can
/// answer it from here.
fn decide(response: &WorkflowResponse, yes: bool, interactive: bool) -> Result<Option<UserDecision>> {
    let Some(hitl) = &response.hitl_request else {
        return Ok(None);
    };

    if hitl.checkpoint_type == CheckpointType::Input {
        if !interactive {
            return Ok(None);
        }
        println!();
        println!("  {} {}", style("?").cyan().bold(), hitl.message);
        let mut values = JsonMap::new();
        for field in &hitl.fields {
            values.insert(field.clone(), prompt_value(field, InputType::String)?);
        }
        return Ok(Some(UserDecision::with_inputs(values)));
    }

    if yes {
        tracing::info!(step_id = %hitl.step_id, "auto-approving checkpoint");
        return Ok(Some(UserDecision::approve()));
    }
    if !interactive {
        return Ok(None);
    }

    println!();
    let approved = Confirm::new()
        .with_prompt(format!("{} {}", style(hitl.checkpoint_type).yellow(), hitl.message))
        .default(true)
        .interact()?;
    Ok(Some(if approved {
        UserDecision::approve()
    } else {
        UserDecision::reject()
    }))
}

fn prompt_value(field: &str, input_type: InputType) -> Result<Value> {
    let raw: String = Input::new().with_prompt(format!("  {field}")).interact_text()?;
    Ok(coerce_input(raw, input_type))
}

/// Strings and dates stay verbatim; other declared types are parsed as JSON
/// when they can be.
fn coerce_input(raw: String, input_type: InputType) -> Value {
    match input_type {
        InputType::String | InputType::Date => Value::String(raw),
        _ => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
    }
}

fn parse_object(raw: Option<&str>, flag: &str) -> Result<JsonMap> {
    let Some(raw) = raw else {
        return Ok(JsonMap::new());
    };
    match serde_json::from_str::<Value>(raw).with_context(|| format!("{flag} is not valid JSON"))? {
        Value::Object(map) => Ok(map),
        other => bail!("{flag} must be a JSON object, got {other}"),
    }
}

async fn with_spinner<F: std::future::Future>(json: bool, message: &'static str, fut: F) -> F::Output {
    if json {
        return fut.await;
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(spinner_style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    let output = fut.await;
    spinner.finish_and_clear();
    output
}

fn print_response(response: &WorkflowResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    let status = match response.status {
        ExecutionStatus::Completed => style(response.status.as_str()).green().bold(),
        ExecutionStatus::Failed => style(response.status.as_str()).red().bold(),
        _ => style(response.status.as_str()).yellow().bold(),
    };

    println!();
    println!("  {} {}", status, response.summary);
    if let Some(id) = &response.execution_id {
        println!("  {} {}", style("Execution:").dim(), id);
    }
    if !response.completed_steps.is_empty() {
        println!(
            "  {} {}",
            style("Completed steps:").dim(),
            response.completed_steps.join(", ")
        );
    }
    if !response.missing_inputs.is_empty() {
        println!(
            "  {} {}",
            style("Missing inputs:").dim(),
            response.missing_inputs.join(", ")
        );
    }
    if response.status == ExecutionStatus::Completed && !response.outputs.is_empty() {
        println!("  {}", style("Outputs:").dim());
        println!("{}", serde_json::to_string_pretty(&response.outputs)?);
    }
    Ok(())
}
