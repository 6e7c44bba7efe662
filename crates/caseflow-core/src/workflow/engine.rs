//! Workflow engine: resumable, step-by-step execution with HITL checkpoints.
//!
//! The `WorkflowEngine` drives an execution record through its states:
//!
//! ```text
//! pending_input -> pending_approval -> running -> completed | failed
//! ```
//!
//! # Execution flow
//!
//! 1. `start` validates inputs, allocates an execution ID and stores the
//!    record (optionally parked on a `workflow_start` approval).
//! 2. The step loop walks steps from `current_step_index`: condition check,
//!    checkpoint check, then one tool call (with at most one retry).
//! 3. A required checkpoint parks the record and returns; the index is not
//!    advanced, so `respond` re-enters the same step with that checkpoint
//!    cleared.
//! 4. After the last step, an optional `workflow_complete` approval, then
//!    `completed`.
//!
//! Every public operation returns a `WorkflowResponse`; nothing is raised
//! across the caller boundary. Calls touching the same execution ID are
//! serialized through a per-execution mutex.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;

use caseflow_types::error::StoreError;
use caseflow_types::workflow::{
    CheckpointType, ExecutionStatus, HitlCheckpoint, HitlRequest, JsonMap, MessageTemplate,
    PendingHitl, StepResult, StepStatus, UserDecision, WorkflowDefinition,
    WorkflowExecutionState, WorkflowResponse, WorkflowStep,
};

use crate::tool::ToolExecutor;

use super::condition;
use super::reference::{Scope, resolve_all};
use super::registry::WorkflowRegistry;
use super::retry::RetryPolicy;
use super::store::{ExecutionStore, new_execution_id};
use super::summary;
use super::template::render_message;

/// Pending-HITL step ID for the approval gate before the first step.
pub const WORKFLOW_START: &str = "workflow_start";

/// Pending-HITL step ID for the approval gate after the last step.
pub const WORKFLOW_COMPLETE: &str = "workflow_complete";

/// Error recorded when a human rejects a checkpoint or cancels.
pub const CANCELLED_BY_USER: &str = "cancelled by user";

/// Which checkpoint the current pass through the loop has already satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cleared {
    Nothing,
    Step(usize),
    Completion,
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Orchestrates workflow executions over an injected store and tool executor.
pub struct WorkflowEngine<S: ExecutionStore, T: ToolExecutor> {
    registry: Arc<WorkflowRegistry>,
    store: Arc<S>,
    tools: Arc<T>,
    /// Per-execution locks keyed by execution ID.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: ExecutionStore, T: ToolExecutor> WorkflowEngine<S, T> {
    pub fn new(registry: Arc<WorkflowRegistry>, store: Arc<S>, tools: Arc<T>) -> Self {
        Self {
            registry,
            store,
            tools,
            locks: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    /// Shared handle to the store (used by the reaper).
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    // -----------------------------------------------------------------------
    // Catalog
    // -----------------------------------------------------------------------

    pub fn list_workflows(&self) -> Vec<&WorkflowDefinition> {
        self.registry.list()
    }

    pub fn find_by_keyword(&self, text: &str) -> Vec<&WorkflowDefinition> {
        self.registry.find_by_keyword(text)
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub async fn get_execution(
        &self,
        execution_id: &str,
    ) -> Result<Option<WorkflowExecutionState>, StoreError> {
        self.store.get(execution_id).await
    }

    pub async fn list_executions(&self) -> Result<Vec<WorkflowExecutionState>, StoreError> {
        self.store.list().await
    }

    // -----------------------------------------------------------------------
    // start
    // -----------------------------------------------------------------------

    /// Start a new execution of `workflow_id`.
    ///
    /// Missing required inputs yield `pending_input` without creating a
    /// record; the caller starts again with complete inputs.
    pub async fn start(
        &self,
        workflow_id: &str,
        inputs: JsonMap,
        context: JsonMap,
    ) -> WorkflowResponse {
        let Some(def) = self.registry.get(workflow_id) else {
            tracing::warn!(workflow_id, "start requested for unknown workflow");
            return rejected(
                workflow_id,
                ExecutionStatus::Failed,
                format!("workflow not found: {workflow_id}"),
            );
        };

        let mut collected = JsonMap::new();
        for spec in &def.optional_inputs {
            if let Some(default) = &spec.default {
                collected.insert(spec.field.clone(), default.clone());
            }
        }
        collected.extend(inputs);

        let missing: Vec<String> = def
            .required_inputs
            .iter()
            .filter(|spec| is_missing(collected.get(&spec.field)))
            .map(|spec| spec.field.clone())
            .collect();
        if !missing.is_empty() {
            tracing::info!(workflow_id, ?missing, "workflow start is missing required inputs");
            let mut response = rejected(
                workflow_id,
                ExecutionStatus::PendingInput,
                summary::missing_inputs_summary(def, &missing),
            );
            response.error = None;
            response.missing_inputs = missing;
            return response;
        }

        let execution_id = new_execution_id();
        let lock = self.lock_for(&execution_id);
        let _guard = lock.lock().await;

        let mut state = new_state(def, execution_id, collected);
        tracing::info!(
            execution_id = %state.execution_id,
            workflow_id,
            steps = def.steps.len(),
            "starting workflow execution"
        );

        if def.requires_approval_to_start {
            state.status = ExecutionStatus::PendingApproval;
            state.pending_hitl = Some(PendingHitl {
                step_id: WORKFLOW_START.to_string(),
                checkpoint: approval_checkpoint(format!(
                    "Start workflow \"{}\" ({} step{})?",
                    def.name,
                    def.steps.len(),
                    if def.steps.len() == 1 { "" } else { "s" }
                )),
                requested_at: Utc::now(),
            });
        }

        if let Err(e) = self.store.insert(state.clone()).await {
            self.locks.remove(&state.execution_id);
            // Nothing was stored, so there is no execution to point at.
            let mut response = self.store_failure(def, &mut state, &context, e);
            response.execution_id = None;
            return response;
        }
        if state.status == ExecutionStatus::PendingApproval {
            return build_response(def, &state, &context);
        }

        self.run_loop(def, &mut state, &context, Cleared::Nothing)
            .await
    }

    // -----------------------------------------------------------------------
    // respond
    // -----------------------------------------------------------------------

    /// Deliver a human decision to a parked execution and resume it.
    pub async fn respond(
        &self,
        execution_id: &str,
        decision: UserDecision,
        context: JsonMap,
    ) -> WorkflowResponse {
        let lock = self.lock_for(execution_id);
        let _guard = lock.lock().await;

        let mut state = match self.store.get(execution_id).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                tracing::warn!(execution_id, "respond for unknown execution");
                self.locks.remove(execution_id);
                return rejected(
                    "",
                    ExecutionStatus::Failed,
                    format!("execution not found: {execution_id}"),
                );
            }
            Err(e) => {
                return rejected("", ExecutionStatus::Failed, format!("store error: {e}"));
            }
        };
        let Some(def) = self.registry.get(&state.workflow_id) else {
            return rejected(
                &state.workflow_id,
                ExecutionStatus::Failed,
                format!("workflow not found: {}", state.workflow_id),
            );
        };

        // Only a parked execution can be resumed; anything else is reported as-is.
        if !state.status.is_awaiting_human() {
            if state.status.is_terminal() {
                self.locks.remove(execution_id);
            }
            tracing::debug!(
                execution_id,
                status = %state.status,
                "respond on execution that is not waiting; returning current state"
            );
            return build_response(def, &state, &context);
        }

        let pending_step = state
            .pending_hitl
            .take()
            .map(|p| p.step_id)
            .unwrap_or_default();

        if decision.approved == Some(false) {
            tracing::info!(execution_id, step_id = %pending_step, "checkpoint rejected");
            if let Some(result) = state.step_results.get_mut(state.current_step_index) {
                if result.status == StepStatus::Waiting {
                    result.status = StepStatus::Pending;
                }
            }
            return self.finish_failed(def, &mut state, &context, CANCELLED_BY_USER.to_string()).await;
        }

        if let Some(inputs) = decision.inputs {
            state.inputs.extend(inputs);
        }
        let cleared = match pending_step.as_str() {
            WORKFLOW_START => Cleared::Nothing,
            WORKFLOW_COMPLETE => Cleared::Completion,
            _ => Cleared::Step(state.current_step_index),
        };
        tracing::info!(execution_id, step_id = %pending_step, "checkpoint satisfied, resuming");

        state.status = ExecutionStatus::Running;
        state.touch();
        if let Err(e) = self.store.save(&state).await {
            return self.store_failure(def, &mut state, &context, e);
        }

        self.run_loop(def, &mut state, &context, cleared).await
    }

    // -----------------------------------------------------------------------
    // cancel
    // -----------------------------------------------------------------------

    /// Mark an execution as failed by user cancellation.
    ///
    /// Returns `false` if the execution does not exist or already finished.
    /// The record is kept.
    pub async fn cancel(&self, execution_id: &str) -> bool {
        let lock = self.lock_for(execution_id);
        let _guard = lock.lock().await;

        let mut state = match self.store.get(execution_id).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                self.locks.remove(execution_id);
                return false;
            }
            Err(e) => {
                tracing::warn!(execution_id, error = %e, "cancel could not load execution");
                return false;
            }
        };
        if state.status.is_terminal() {
            self.locks.remove(execution_id);
            return false;
        }

        mark_failed(&mut state, CANCELLED_BY_USER.to_string());
        if let Err(e) = self.store.save(&state).await {
            tracing::warn!(execution_id, error = %e, "cancel could not save execution");
            return false;
        }
        self.locks.remove(execution_id);
        tracing::info!(execution_id, "execution cancelled");
        true
    }

    // -----------------------------------------------------------------------
    // Step loop
    // -----------------------------------------------------------------------

    async fn run_loop(
        &self,
        def: &WorkflowDefinition,
        state: &mut WorkflowExecutionState,
        context: &JsonMap,
        cleared: Cleared,
    ) -> WorkflowResponse {
        while let Some(step) = def.steps.get(state.current_step_index) {
            let index = state.current_step_index;
            state.current_step_id = Some(step.id.clone());

            if let Some(cond) = &step.condition {
                if !condition::evaluate(cond, &state.inputs, &state.outputs) {
                    tracing::debug!(
                        execution_id = %state.execution_id,
                        step_id = %step.id,
                        "condition false, skipping step"
                    );
                    if let Some(result) = state.step_results.get_mut(index) {
                        result.status = StepStatus::Skipped;
                        result.completed_at = Some(Utc::now());
                    }
                    state.current_step_index += 1;
                    continue;
                }
            }

            if let Some(checkpoint) = &step.checkpoint {
                if checkpoint.required && cleared != Cleared::Step(index) {
                    return self
                        .park(def, state, context, step.id.clone(), checkpoint.clone())
                        .await;
                }
            }

            match self.run_step(step, index, state, context).await {
                Ok(result) => {
                    if let Some(r) = state.step_results.get_mut(index) {
                        r.status = StepStatus::Completed;
                        r.result = Some(result.clone());
                        r.completed_at = Some(Utc::now());
                    }
                    state.outputs.insert(step.id.clone(), result);
                    tracing::info!(
                        execution_id = %state.execution_id,
                        step_id = %step.id,
                        "step completed"
                    );
                }
                Err(error) if step.optional => {
                    tracing::warn!(
                        execution_id = %state.execution_id,
                        step_id = %step.id,
                        %error,
                        "optional step failed, continuing"
                    );
                    if let Some(r) = state.step_results.get_mut(index) {
                        r.status = StepStatus::Failed;
                        r.error = Some(error);
                        r.completed_at = Some(Utc::now());
                    }
                }
                Err(error) => {
                    tracing::error!(
                        execution_id = %state.execution_id,
                        step_id = %step.id,
                        %error,
                        "required step failed"
                    );
                    if let Some(r) = state.step_results.get_mut(index) {
                        r.status = StepStatus::Failed;
                        r.error = Some(error.clone());
                        r.completed_at = Some(Utc::now());
                    }
                    let message = format!("Step \"{}\" failed: {}", step.name, error);
                    return self.finish_failed(def, state, context, message).await;
                }
            }

            state.current_step_index += 1;
            state.touch();
            if let Err(e) = self.store.save(state).await {
                return self.store_failure(def, state, context, e);
            }
        }

        state.current_step_id = None;

        if def.requires_approval_to_complete && cleared != Cleared::Completion {
            let checkpoint = approval_checkpoint(format!(
                "All steps of \"{}\" are done. Complete the workflow?",
                def.name
            ));
            return self
                .park(def, state, context, WORKFLOW_COMPLETE.to_string(), checkpoint)
                .await;
        }

        state.status = ExecutionStatus::Completed;
        state.completed_at = Some(Utc::now());
        state.touch();
        if let Err(e) = self.store.save(state).await {
            return self.store_failure(def, state, context, e);
        }
        self.locks.remove(&state.execution_id);
        tracing::info!(
            execution_id = %state.execution_id,
            workflow_id = %state.workflow_id,
            "workflow execution completed"
        );
        build_response(def, state, context)
    }

    /// Resolve the step's parameters and call its tool, retrying once if
    /// the step allows it. Attempts are counted on the step result.
    async fn run_step(
        &self,
        step: &WorkflowStep,
        index: usize,
        state: &mut WorkflowExecutionState,
        context: &JsonMap,
    ) -> Result<Value, String> {
        let params = resolve_all(
            &step.input,
            &Scope::new(&state.inputs, &state.outputs, context),
        );

        let mut attempts = match state.step_results.get_mut(index) {
            Some(r) => {
                r.status = StepStatus::Running;
                r.started_at = Some(Utc::now());
                r.attempts
            }
            None => 0,
        };

        loop {
            attempts += 1;
            if let Some(r) = state.step_results.get_mut(index) {
                r.attempts = attempts;
            }
            tracing::debug!(
                execution_id = %state.execution_id,
                step_id = %step.id,
                tool = %step.tool,
                attempt = attempts,
                "invoking tool"
            );

            let error = match self.tools.execute(&step.tool, &params).await {
                Ok(outcome) if outcome.success => return Ok(outcome.result),
                Ok(outcome) => outcome
                    .error
                    .unwrap_or_else(|| format!("tool '{}' reported failure", step.tool)),
                Err(e) => e.to_string(),
            };

            if !RetryPolicy::should_retry(step, attempts) {
                return Err(error);
            }
            tracing::warn!(
                execution_id = %state.execution_id,
                step_id = %step.id,
                attempt = attempts,
                %error,
                "tool call failed, retrying"
            );
        }
    }

    /// Park the execution on a checkpoint and return the HITL request.
    async fn park(
        &self,
        def: &WorkflowDefinition,
        state: &mut WorkflowExecutionState,
        context: &JsonMap,
        step_id: String,
        checkpoint: HitlCheckpoint,
    ) -> WorkflowResponse {
        state.status = match checkpoint.checkpoint_type {
            CheckpointType::Input => ExecutionStatus::PendingInput,
            _ => ExecutionStatus::PendingApproval,
        };
        if let Some(result) = state.step_results.get_mut(state.current_step_index) {
            result.status = StepStatus::Waiting;
        }
        tracing::info!(
            execution_id = %state.execution_id,
            step_id = %step_id,
            checkpoint = %checkpoint.checkpoint_type,
            "waiting at checkpoint"
        );
        state.pending_hitl = Some(PendingHitl {
            step_id,
            checkpoint,
            requested_at: Utc::now(),
        });
        state.touch();
        if let Err(e) = self.store.save(state).await {
            return self.store_failure(def, state, context, e);
        }
        build_response(def, state, context)
    }

    async fn finish_failed(
        &self,
        def: &WorkflowDefinition,
        state: &mut WorkflowExecutionState,
        context: &JsonMap,
        error: String,
    ) -> WorkflowResponse {
        mark_failed(state, error);
        if let Err(e) = self.store.save(state).await {
            return self.store_failure(def, state, context, e);
        }
        self.locks.remove(&state.execution_id);
        build_response(def, state, context)
    }

    /// Report a store failure. The in-memory copy is marked failed but not
    /// written back.
    fn store_failure(
        &self,
        def: &WorkflowDefinition,
        state: &mut WorkflowExecutionState,
        context: &JsonMap,
        error: StoreError,
    ) -> WorkflowResponse {
        tracing::error!(execution_id = %state.execution_id, error = %error, "execution store failure");
        mark_failed(state, format!("store error: {error}"));
        build_response(def, state, context)
    }

    fn lock_for(&self, execution_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(execution_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_state(
    def: &WorkflowDefinition,
    execution_id: String,
    inputs: JsonMap,
) -> WorkflowExecutionState {
    let now = Utc::now();
    WorkflowExecutionState {
        workflow_id: def.id.clone(),
        execution_id,
        status: ExecutionStatus::Running,
        current_step_index: 0,
        current_step_id: def.steps.first().map(|s| s.id.clone()),
        inputs,
        outputs: JsonMap::new(),
        step_results: def.steps.iter().map(|s| StepResult::pending(&s.id)).collect(),
        pending_hitl: None,
        created_at: now,
        updated_at: now,
        completed_at: None,
        error: None,
    }
}

fn approval_checkpoint(message: String) -> HitlCheckpoint {
    HitlCheckpoint {
        checkpoint_type: CheckpointType::Approval,
        message: MessageTemplate::parse(message),
        required: true,
        fields: Vec::new(),
    }
}

fn mark_failed(state: &mut WorkflowExecutionState, error: String) {
    let now = Utc::now();
    state.status = ExecutionStatus::Failed;
    state.error = Some(error);
    state.pending_hitl = None;
    state.completed_at = Some(now);
    state.updated_at = now;
}

/// Absent, null, empty string and empty array all count as missing.
fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Response for a call that created or touched no execution record.
fn rejected(workflow_id: &str, status: ExecutionStatus, message: String) -> WorkflowResponse {
    WorkflowResponse {
        execution_id: None,
        workflow_id: workflow_id.to_string(),
        status,
        completed_steps: Vec::new(),
        current_step: None,
        hitl_request: None,
        outputs: JsonMap::new(),
        missing_inputs: Vec::new(),
        error: Some(message.clone()),
        summary: message,
    }
}

fn build_response(
    def: &WorkflowDefinition,
    state: &WorkflowExecutionState,
    context: &JsonMap,
) -> WorkflowResponse {
    let scope = Scope::new(&state.inputs, &state.outputs, context);
    let hitl_request = state.pending_hitl.as_ref().map(|pending| HitlRequest {
        checkpoint_type: pending.checkpoint.checkpoint_type,
        message: render_message(&pending.checkpoint.message, &scope),
        fields: pending.checkpoint.fields.clone(),
        step_id: pending.step_id.clone(),
    });
    let summary = summary::summarize(
        def,
        state,
        hitl_request.as_ref().map(|h| h.message.as_str()),
    );
    let current_step = state
        .current_step_id
        .as_deref()
        .and_then(|id| def.step(id))
        .map(|step| step.name.clone());

    WorkflowResponse {
        execution_id: Some(state.execution_id.clone()),
        workflow_id: state.workflow_id.clone(),
        status: state.status,
        completed_steps: state.completed_step_ids(),
        current_step,
        hitl_request,
        outputs: state.outputs.clone(),
        missing_inputs: Vec::new(),
        error: state.error.clone(),
        summary,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use super::*;
    use crate::workflow::definition::parse_workflow_yaml;
    use crate::workflow::store::InMemoryExecutionStore;
    use caseflow_types::error::ToolError;
    use caseflow_types::workflow::ToolOutcome;
    use serde_json::json;

    /// Tool executor stub: fixed results per tool, scripted failures, and a
    /// log of every call.
    #[derive(Default)]
    struct StubTools {
        results: HashMap<String, Value>,
        failures: StdMutex<HashMap<String, u32>>,
        calls: StdMutex<Vec<(String, Value)>>,
        delay: Option<Duration>,
    }

    impl StubTools {
        fn with_result(mut self, tool: &str, result: Value) -> Self {
            self.results.insert(tool.to_string(), result);
            self
        }

        /// Fail the next `times` calls to `tool`.
        fn failing(self, tool: &str, times: u32) -> Self {
            self.failures
                .lock()
                .unwrap()
                .insert(tool.to_string(), times);
            self
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_to(&self, tool: &str) -> usize {
            self.calls().iter().filter(|(t, _)| t == tool).count()
        }
    }

    impl ToolExecutor for StubTools {
        async fn execute(&self, tool: &str, params: &Value) -> Result<ToolOutcome, ToolError> {
            self.calls
                .lock()
                .unwrap()
                .push((tool.to_string(), params.clone()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let should_fail = {
                let mut failures = self.failures.lock().unwrap();
                match failures.get_mut(tool) {
                    Some(n) if *n > 0 => {
                        *n -= 1;
                        true
                    }
                    _ => false,
                }
            };
            if should_fail {
                return Ok(ToolOutcome::failed(format!("{tool} unavailable")));
            }
            Ok(ToolOutcome::ok(
                self.results.get(tool).cloned().unwrap_or_else(|| json!({})),
            ))
        }
    }

    fn map(value: Value) -> JsonMap {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn engine_with(
        yaml: &[&str],
        tools: StubTools,
    ) -> (
        WorkflowEngine<InMemoryExecutionStore, StubTools>,
        Arc<StubTools>,
    ) {
        let defs = yaml.iter().map(|y| parse_workflow_yaml(y).unwrap());
        let registry = Arc::new(WorkflowRegistry::from_definitions(defs).unwrap());
        let tools = Arc::new(tools);
        let engine = WorkflowEngine::new(
            registry,
            Arc::new(InMemoryExecutionStore::new()),
            Arc::clone(&tools),
        );
        (engine, tools)
    }

    fn builtin_engine(
        tools: StubTools,
    ) -> (
        WorkflowEngine<InMemoryExecutionStore, StubTools>,
        Arc<StubTools>,
    ) {
        let registry = Arc::new(WorkflowRegistry::builtin().unwrap());
        let tools = Arc::new(tools);
        let engine = WorkflowEngine::new(
            registry,
            Arc::new(InMemoryExecutionStore::new()),
            Arc::clone(&tools),
        );
        (engine, tools)
    }

    fn signal_inputs() -> JsonMap {
        map(json!({
            "description": "Suspicious activity at Main Street",
            "types": ["fraud"],
            "placeOfObservation": "Main Street",
        }))
    }

    const GATED: &str = r#"
id: gated
name: Gated
requires_approval_to_start: true
steps:
  - { id: first, name: First, tool: tool_a }
  - { id: second, name: Second, tool: tool_b }
"#;

    const WITH_OPTIONAL: &str = r#"
id: with_optional
name: With optional
steps:
  - { id: first, name: First, tool: tool_a }
  - { id: flaky, name: Flaky, tool: tool_flaky, optional: true }
  - { id: last, name: Last, tool: tool_b }
"#;

    const RETRYING: &str = r#"
id: retrying
name: Retrying
steps:
  - { id: only, name: Only, tool: tool_flaky, retry_on_failure: true }
"#;

    const STRICT: &str = r#"
id: strict
name: Strict
steps:
  - { id: first, name: First, tool: tool_a }
  - { id: broken, name: Broken step, tool: tool_flaky }
  - { id: never, name: Never, tool: tool_b }
"#;

    const APPROVED_STEP: &str = r#"
id: approved_step
name: Approved step
steps:
  - id: only
    name: Only
    tool: tool_slow
    checkpoint:
      type: approval
      message: Go?
"#;

    // -----------------------------------------------------------------------
    // start: validation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_start_unknown_workflow_fails_without_record() {
        let (engine, tools) = builtin_engine(StubTools::default());
        let resp = engine.start("nope", JsonMap::new(), JsonMap::new()).await;
        assert_eq!(resp.status, ExecutionStatus::Failed);
        assert_eq!(resp.error.as_deref(), Some("workflow not found: nope"));
        assert!(resp.execution_id.is_none());
        assert!(engine.list_executions().await.unwrap().is_empty());
        assert!(tools.calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_with_empty_inputs_lists_missing_in_order() {
        let (engine, tools) = builtin_engine(StubTools::default());
        let resp = engine
            .start("signal_create", JsonMap::new(), JsonMap::new())
            .await;
        assert_eq!(resp.status, ExecutionStatus::PendingInput);
        assert_eq!(
            resp.missing_inputs,
            vec!["description", "types", "placeOfObservation"]
        );
        assert!(resp.execution_id.is_none());
        assert!(resp.error.is_none());
        assert!(engine.list_executions().await.unwrap().is_empty());
        assert!(tools.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_values_count_as_missing() {
        let (engine, _) = builtin_engine(StubTools::default());
        let inputs = map(json!({
            "description": "",
            "types": [],
            "placeOfObservation": null,
        }));
        let resp = engine.start("signal_create", inputs, JsonMap::new()).await;
        assert_eq!(resp.missing_inputs.len(), 3);
    }

    #[tokio::test]
    async fn test_optional_defaults_are_merged() {
        let (engine, tools) = builtin_engine(
            StubTools::default()
                .with_result("signal_create", json!({"signalId": "sig-9", "signalNumber": "GCMP-9"})),
        );
        let mut inputs = signal_inputs();
        inputs.insert("caseTitle".into(), json!("Fraud at Main Street"));
        let resp = engine.start("case_from_signal", inputs, JsonMap::new()).await;
        let id = resp.execution_id.unwrap();

        let resp = engine.respond(&id, UserDecision::approve(), JsonMap::new()).await;
        assert_eq!(resp.status, ExecutionStatus::PendingApproval);
        let state = engine.get_execution(&id).await.unwrap().unwrap();
        assert_eq!(state.inputs["priority"], json!("normal"));
        assert_eq!(tools.calls_to("signal_create"), 1);
    }

    // -----------------------------------------------------------------------
    // End-to-end: signal_create
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_signal_create_end_to_end() {
        let (engine, tools) = builtin_engine(
            StubTools::default()
                .with_result("signal_create", json!({"signalId": "sig-1", "signalNumber": "GCMP-1"})),
        );

        let resp = engine
            .start("signal_create", signal_inputs(), JsonMap::new())
            .await;
        assert_eq!(resp.status, ExecutionStatus::PendingApproval);
        let hitl = resp.hitl_request.expect("checkpoint request");
        assert_eq!(hitl.step_id, "create_signal");
        assert_eq!(hitl.checkpoint_type, CheckpointType::Approval);
        assert_eq!(
            hitl.message,
            "Create a signal for \"Suspicious activity at Main Street\" observed at Main Street?"
        );
        assert_eq!(resp.current_step.as_deref(), Some("Create signal"));
        assert!(tools.calls().is_empty());

        let id = resp.execution_id.unwrap();
        let resp = engine.respond(&id, UserDecision::approve(), JsonMap::new()).await;

        let calls = tools.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "signal_create");
        assert_eq!(
            calls[0].1,
            json!({
                "description": "Suspicious activity at Main Street",
                "types": ["fraud"],
                "placeOfObservation": "Main Street",
            })
        );

        assert_eq!(resp.status, ExecutionStatus::Completed);
        assert_eq!(resp.completed_steps, vec!["create_signal"]);
        assert_eq!(resp.outputs["create_signal"]["signalId"], json!("sig-1"));
        assert!(resp.summary.contains("GCMP-1"), "{}", resp.summary);
        assert!(resp.hitl_request.is_none());

        let state = engine.get_execution(&id).await.unwrap().unwrap();
        assert!(state.completed_at.is_some());
        assert_eq!(state.step_results[0].attempts, 1);
        assert_eq!(
            state.step_results[0].result,
            Some(json!({"signalId": "sig-1", "signalNumber": "GCMP-1"}))
        );
    }

    // -----------------------------------------------------------------------
    // Approval gates
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_approval_to_start_runs_nothing_until_approved() {
        let (engine, tools) = engine_with(&[GATED], StubTools::default());
        let resp = engine.start("gated", JsonMap::new(), JsonMap::new()).await;
        assert_eq!(resp.status, ExecutionStatus::PendingApproval);
        let hitl = resp.hitl_request.unwrap();
        assert_eq!(hitl.step_id, WORKFLOW_START);
        assert_eq!(hitl.message, "Start workflow \"Gated\" (2 steps)?");
        assert!(tools.calls().is_empty());

        let resp = engine
            .respond(&resp.execution_id.unwrap(), UserDecision::approve(), JsonMap::new())
            .await;
        assert_eq!(resp.status, ExecutionStatus::Completed);
        assert_eq!(resp.completed_steps, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_rejecting_start_fails_with_no_steps() {
        let (engine, tools) = engine_with(&[GATED], StubTools::default());
        let resp = engine.start("gated", JsonMap::new(), JsonMap::new()).await;
        let id = resp.execution_id.unwrap();

        let resp = engine.respond(&id, UserDecision::reject(), JsonMap::new()).await;
        assert_eq!(resp.status, ExecutionStatus::Failed);
        assert_eq!(resp.error.as_deref(), Some(CANCELLED_BY_USER));
        assert!(resp.completed_steps.is_empty());
        assert!(tools.calls().is_empty());

        // Terminal: a later approval changes nothing.
        let again = engine.respond(&id, UserDecision::approve(), JsonMap::new()).await;
        assert_eq!(again.status, ExecutionStatus::Failed);
        assert!(tools.calls().is_empty());
    }

    #[tokio::test]
    async fn test_approval_to_complete() {
        let (engine, tools) = builtin_engine(
            StubTools::default().with_result(
                "organization_create",
                json!({"organizationId": "org-1", "name": "Acme"}),
            ),
        );
        let inputs = map(json!({"name": "Acme", "registrationNumber": "12345678"}));
        let resp = engine
            .start("organization_register", inputs, JsonMap::new())
            .await;
        let id = resp.execution_id.unwrap();

        let resp = engine.respond(&id, UserDecision::approve(), JsonMap::new()).await;
        assert_eq!(resp.status, ExecutionStatus::PendingApproval);
        assert_eq!(resp.hitl_request.as_ref().unwrap().step_id, WORKFLOW_COMPLETE);
        assert!(resp.current_step.is_none());
        // add_address skipped: no address supplied.
        assert_eq!(tools.calls_to("organization_add_address"), 0);

        let resp = engine.respond(&id, UserDecision::approve(), JsonMap::new()).await;
        assert_eq!(resp.status, ExecutionStatus::Completed);
        assert_eq!(tools.calls_to("organization_create"), 1);

        let state = engine.get_execution(&id).await.unwrap().unwrap();
        assert_eq!(state.step_results[1].status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_input_checkpoint_collects_fields() {
        let (engine, tools) = builtin_engine(
            StubTools::default()
                .with_result("folder_create", json!({"folderId": "fld-1", "name": "Evidence"})),
        );
        let inputs = map(json!({"name": "Evidence", "caseId": "case-1"}));
        let context = map(json!({"userId": "u-42"}));
        let resp = engine.start("folder_create", inputs, context.clone()).await;
        let id = resp.execution_id.unwrap();

        let resp = engine.respond(&id, UserDecision::approve(), context.clone()).await;
        assert_eq!(resp.status, ExecutionStatus::PendingInput);
        let hitl = resp.hitl_request.unwrap();
        assert_eq!(hitl.fields, vec!["accessLevel"]);
        assert_eq!(
            hitl.message,
            "Who may access folder Evidence? Choose an access level."
        );

        let resp = engine
            .respond(
                &id,
                UserDecision::with_inputs(map(json!({"accessLevel": "team"}))),
                context,
            )
            .await;
        assert_eq!(resp.status, ExecutionStatus::Completed);

        let calls = tools.calls();
        assert_eq!(calls[0].1["owner"], json!("u-42"));
        assert_eq!(
            calls[1].1,
            json!({"folderId": "fld-1", "accessLevel": "team"})
        );
    }

    // -----------------------------------------------------------------------
    // Cross-step references
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_three_step_workflow_passes_real_ids() {
        let (engine, tools) = builtin_engine(
            StubTools::default()
                .with_result("signal_create", json!({"signalId": "sig-77", "signalNumber": "GCMP-77"}))
                .with_result("case_create", json!({"caseId": "case-5", "caseNumber": "ZAAK-5"})),
        );
        let mut inputs = signal_inputs();
        inputs.insert("caseTitle".into(), json!("Fraud"));
        inputs.insert("assignee".into(), json!("u-9"));

        let resp = engine.start("case_from_signal", inputs, JsonMap::new()).await;
        let id = resp.execution_id.unwrap();
        let resp = engine.respond(&id, UserDecision::approve(), JsonMap::new()).await;
        assert_eq!(resp.status, ExecutionStatus::PendingApproval);
        assert_eq!(
            resp.hitl_request.unwrap().message,
            "Open case \"Fraud\" for signal GCMP-77?"
        );

        let resp = engine.respond(&id, UserDecision::approve(), JsonMap::new()).await;
        assert_eq!(resp.status, ExecutionStatus::Completed);
        assert_eq!(
            resp.completed_steps,
            vec!["create_signal", "create_case", "assign_case"]
        );

        let calls = tools.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].0, "case_create");
        assert_eq!(calls[1].1["signalIds"], json!(["sig-77"]));
        assert_eq!(calls[2].1["caseId"], json!("case-5"));
        assert!(!calls[1].1.to_string().contains('$'));
        // No userId in context: the field is left out rather than sent as null.
        assert!(calls[1].1.get("createdBy").is_none());
    }

    // -----------------------------------------------------------------------
    // Failures
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_optional_step_failure_is_absorbed() {
        let (engine, _) = engine_with(
            &[WITH_OPTIONAL],
            StubTools::default().failing("tool_flaky", 5),
        );
        let resp = engine
            .start("with_optional", JsonMap::new(), JsonMap::new())
            .await;
        assert_eq!(resp.status, ExecutionStatus::Completed);
        assert_eq!(resp.completed_steps, vec!["first", "last"]);
        assert!(!resp.outputs.contains_key("flaky"));

        let state = engine
            .get_execution(&resp.execution_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.step_results[1].status, StepStatus::Failed);
        assert_eq!(
            state.step_results[1].error.as_deref(),
            Some("tool_flaky unavailable")
        );
    }

    #[tokio::test]
    async fn test_required_step_failure_fails_execution() {
        let (engine, tools) =
            engine_with(&[STRICT], StubTools::default().failing("tool_flaky", 1));
        let resp = engine.start("strict", JsonMap::new(), JsonMap::new()).await;
        assert_eq!(resp.status, ExecutionStatus::Failed);
        assert_eq!(
            resp.error.as_deref(),
            Some("Step \"Broken step\" failed: tool_flaky unavailable")
        );
        assert_eq!(resp.completed_steps, vec!["first"]);
        assert!(resp.outputs.contains_key("first"));
        assert_eq!(resp.current_step.as_deref(), Some("Broken step"));
        assert_eq!(tools.calls_to("tool_b"), 0);
    }

    #[tokio::test]
    async fn test_retry_happens_exactly_once() {
        let (engine, tools) =
            engine_with(&[RETRYING], StubTools::default().failing("tool_flaky", 1));
        let resp = engine.start("retrying", JsonMap::new(), JsonMap::new()).await;
        assert_eq!(resp.status, ExecutionStatus::Completed);
        assert_eq!(tools.calls_to("tool_flaky"), 2);

        let (engine, tools) =
            engine_with(&[RETRYING], StubTools::default().failing("tool_flaky", 2));
        let resp = engine.start("retrying", JsonMap::new(), JsonMap::new()).await;
        assert_eq!(resp.status, ExecutionStatus::Failed);
        assert_eq!(tools.calls_to("tool_flaky"), 2);
        let state = engine
            .get_execution(&resp.execution_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.step_results[0].attempts, 2);
    }

    // -----------------------------------------------------------------------
    // respond / cancel edge cases
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_respond_unknown_execution() {
        let (engine, _) = builtin_engine(StubTools::default());
        let resp = engine
            .respond("exec_0_00000000", UserDecision::approve(), JsonMap::new())
            .await;
        assert_eq!(resp.status, ExecutionStatus::Failed);
        assert_eq!(
            resp.error.as_deref(),
            Some("execution not found: exec_0_00000000")
        );
    }

    #[tokio::test]
    async fn test_cancel_flips_status_and_keeps_record() {
        let (engine, tools) = builtin_engine(StubTools::default());
        let resp = engine
            .start("signal_create", signal_inputs(), JsonMap::new())
            .await;
        let id = resp.execution_id.unwrap();

        assert!(engine.cancel(&id).await);
        let state = engine.get_execution(&id).await.unwrap().unwrap();
        assert_eq!(state.status, ExecutionStatus::Failed);
        assert_eq!(state.error.as_deref(), Some(CANCELLED_BY_USER));
        assert!(state.pending_hitl.is_none());

        assert!(!engine.cancel(&id).await, "already finished");
        assert!(!engine.cancel("exec_missing").await);

        let resp = engine.respond(&id, UserDecision::approve(), JsonMap::new()).await;
        assert_eq!(resp.status, ExecutionStatus::Failed);
        assert!(tools.calls().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_responds_execute_step_once() {
        let tools = StubTools {
            delay: Some(Duration::from_millis(50)),
            ..StubTools::default()
        };
        let (engine, tools) = engine_with(&[APPROVED_STEP], tools);
        let engine = Arc::new(engine);

        let resp = engine
            .start("approved_step", JsonMap::new(), JsonMap::new())
            .await;
        let id = resp.execution_id.unwrap();

        let a = {
            let engine = Arc::clone(&engine);
            let id = id.clone();
            tokio::spawn(async move {
                engine.respond(&id, UserDecision::approve(), JsonMap::new()).await
            })
        };
        let b = {
            let engine = Arc::clone(&engine);
            let id = id.clone();
            tokio::spawn(async move {
                engine.respond(&id, UserDecision::approve(), JsonMap::new()).await
            })
        };
        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());

        assert_eq!(tools.calls_to("tool_slow"), 1);
        assert_eq!(ra.status, ExecutionStatus::Completed);
        assert_eq!(rb.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_finished_executions_leave_no_locks_behind() {
        let (engine, _) = engine_with(&[GATED], StubTools::default());
        let mut ids = Vec::new();
        for _ in 0..10 {
            let resp = engine.start("gated", JsonMap::new(), JsonMap::new()).await;
            let id = resp.execution_id.unwrap();
            engine.respond(&id, UserDecision::approve(), JsonMap::new()).await;
            ids.push(id);
        }
        assert!(engine.locks.is_empty());

        for id in &ids {
            let resp = engine.respond(id, UserDecision::approve(), JsonMap::new()).await;
            assert_eq!(resp.status, ExecutionStatus::Completed);
            assert!(!engine.cancel(id).await);
        }
        assert!(engine.locks.is_empty());

        let reaped = engine
            .store()
            .reap(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(reaped, 10);
        assert!(engine.locks.is_empty());
    }

    #[tokio::test]
    async fn test_failed_insert_returns_no_execution_id() {
        struct RejectingStore;

        impl ExecutionStore for RejectingStore {
            async fn insert(&self, state: WorkflowExecutionState) -> Result<(), StoreError> {
                Err(StoreError::Backend(format!("disk full for {}", state.execution_id)))
            }
            async fn get(&self, _: &str) -> Result<Option<WorkflowExecutionState>, StoreError> {
                Ok(None)
            }
            async fn save(&self, _: &WorkflowExecutionState) -> Result<(), StoreError> {
                Ok(())
            }
            async fn list(&self) -> Result<Vec<WorkflowExecutionState>, StoreError> {
                Ok(Vec::new())
            }
            async fn remove(&self, _: &str) -> Result<bool, StoreError> {
                Ok(false)
            }
            async fn reap(&self, _: chrono::DateTime<Utc>) -> Result<usize, StoreError> {
                Ok(0)
            }
        }

        let registry = Arc::new(WorkflowRegistry::builtin().unwrap());
        let tools = Arc::new(StubTools::default());
        let engine = WorkflowEngine::new(registry, Arc::new(RejectingStore), Arc::clone(&tools));

        let resp = engine
            .start("signal_create", signal_inputs(), JsonMap::new())
            .await;
        assert_eq!(resp.status, ExecutionStatus::Failed);
        assert!(resp.execution_id.is_none());
        assert!(resp.error.unwrap().starts_with("store error:"));
        assert!(engine.locks.is_empty());
        assert!(tools.calls().is_empty());
    }

    #[tokio::test]
    async fn test_catalog_delegation() {
        let (engine, _) = builtin_engine(StubTools::default());
        assert_eq!(engine.list_workflows().len(), 5);
        let hits = engine.find_by_keyword("Please create folder for this case");
        assert_eq!(hits[0].id, "folder_create");
    }
}
