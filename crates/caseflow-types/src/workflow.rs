//! Workflow domain types for Caseflow.
//!
//! Defines the static workflow IR (`WorkflowDefinition` and its steps,
//! checkpoints, conditions and input templates), the mutable execution record
//! owned by the engine (`WorkflowExecutionState`), and the caller-facing
//! `WorkflowResponse` wire contract.
//!
//! Input templates and HITL message templates are parsed once when a
//! definition is deserialized, so the engine walks typed values instead of
//! sniffing strings at run time.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON object used for inputs, outputs and context records.
pub type JsonMap = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Workflow Definition (static IR)
// ---------------------------------------------------------------------------

/// An immutable workflow definition as loaded from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow identifier (e.g. "signal_create"). Unique within a registry.
    pub id: String,
    /// Human-readable workflow name.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Ordered list of steps. Step IDs are unique within a definition.
    pub steps: Vec<WorkflowStep>,
    /// Inputs that must be present and non-empty before an execution starts.
    #[serde(default)]
    pub required_inputs: Vec<InputSpec>,
    /// Inputs that may be omitted; `default` is applied when absent.
    #[serde(default)]
    pub optional_inputs: Vec<InputSpec>,
    /// Pause for approval before running any step.
    #[serde(default)]
    pub requires_approval_to_start: bool,
    /// Pause for approval after the last step, before completing.
    #[serde(default)]
    pub requires_approval_to_complete: bool,
    #[serde(default)]
    pub metadata: WorkflowMetadata,
}

impl WorkflowDefinition {
    /// Look up a step by ID.
    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}

/// Declared workflow input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    pub field: String,
    #[serde(rename = "type")]
    pub input_type: InputType,
    #[serde(default)]
    pub description: String,
    /// Free-form validation hint shown to whoever collects the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<String>,
    /// Default value for optional inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Declared type of a workflow input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Date,
}

/// Catalog metadata used for listing and keyword lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub trigger_keywords: Vec<String>,
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// A single step of a workflow: one tool invocation, optionally gated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step ID, also the namespace under which its output is stored.
    pub id: String,
    pub name: String,
    /// Tool name passed to the tool executor.
    pub tool: String,
    /// Parameter template; `$`-references are resolved before the call.
    #[serde(default)]
    pub input: TemplateValue,
    /// Output field names worth surfacing to the caller.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<HitlCheckpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<StepCondition>,
    /// Failure of an optional step does not fail the execution.
    #[serde(default)]
    pub optional: bool,
    /// Retry exactly once after a failed attempt.
    #[serde(default)]
    pub retry_on_failure: bool,
}

// ---------------------------------------------------------------------------
// HITL Checkpoint
// ---------------------------------------------------------------------------

/// A human-in-the-loop pause point attached to a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlCheckpoint {
    #[serde(rename = "type")]
    pub checkpoint_type: CheckpointType,
    /// Message shown to the human; `${...}` placeholders are interpolated.
    pub message: MessageTemplate,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Fields the human must supply (input checkpoints only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Kind of human interaction a checkpoint asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointType {
    Approval,
    Input,
    Verification,
    Review,
}

impl fmt::Display for CheckpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckpointType::Approval => "approval",
            CheckpointType::Input => "input",
            CheckpointType::Verification => "verification",
            CheckpointType::Review => "review",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Step Condition
// ---------------------------------------------------------------------------

/// Guard deciding whether a step runs.
///
/// `field` is a dotted path whose first segment is `inputs` or a step ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCondition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Comparison operator for a step condition.
///
/// Closed set: a definition naming any other operator fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Exists,
    NotExists,
    Equals,
    NotEquals,
    Contains,
    Gt,
    Lt,
}

// ---------------------------------------------------------------------------
// References and templates
// ---------------------------------------------------------------------------

/// First segment of a reference path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Collected workflow inputs.
    Inputs,
    /// Ambient caller context (user, case, locale...).
    Context,
    /// Output of the step with this ID.
    Step(String),
}

impl Namespace {
    fn from_segment(segment: &str) -> Self {
        match segment {
            "inputs" => Namespace::Inputs,
            "context" => Namespace::Context,
            other => Namespace::Step(other.to_string()),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Inputs => f.write_str("inputs"),
            Namespace::Context => f.write_str("context"),
            Namespace::Step(id) => f.write_str(id),
        }
    }
}

/// A parsed `$namespace.field.field` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferencePath {
    pub namespace: Namespace,
    pub fields: Vec<String>,
}

impl ReferencePath {
    /// Parse a `$`-prefixed reference. Returns `None` for plain strings.
    pub fn parse(s: &str) -> Option<Self> {
        s.strip_prefix('$').map(Self::from_dotted)
    }

    /// Parse a dotted path without the `$` sigil (`create_signal.signalId`).
    pub fn from_dotted(path: &str) -> Self {
        let mut segments = path.split('.');
        let namespace = Namespace::from_segment(segments.next().unwrap_or_default());
        Self {
            namespace,
            fields: segments.map(str::to_string).collect(),
        }
    }

    /// The dotted form without the `$` sigil.
    pub fn dotted(&self) -> String {
        let mut out = self.namespace.to_string();
        for field in &self.fields {
            out.push('.');
            out.push_str(field);
        }
        out
    }
}

impl fmt::Display for ReferencePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.dotted())
    }
}

/// A step input template, classified once at definition-load time.
///
/// Serialized as plain JSON: references become their `$`-string form again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum TemplateValue {
    /// Passed through unchanged.
    Literal(Value),
    /// Replaced with the referenced value.
    Reference(ReferencePath),
    Array(Vec<TemplateValue>),
    Object(Vec<(String, TemplateValue)>),
}

impl Default for TemplateValue {
    fn default() -> Self {
        TemplateValue::Object(Vec::new())
    }
}

impl TemplateValue {
    /// All references contained in this template, depth-first.
    pub fn references(&self) -> Vec<&ReferencePath> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a ReferencePath>) {
        match self {
            TemplateValue::Literal(_) => {}
            TemplateValue::Reference(path) => out.push(path),
            TemplateValue::Array(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            TemplateValue::Object(fields) => {
                for (_, value) in fields {
                    value.collect_references(out);
                }
            }
        }
    }
}

impl From<Value> for TemplateValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => match ReferencePath::parse(&s) {
                Some(path) => TemplateValue::Reference(path),
                None => TemplateValue::Literal(Value::String(s)),
            },
            Value::Array(items) => {
                TemplateValue::Array(items.into_iter().map(TemplateValue::from).collect())
            }
            Value::Object(map) => TemplateValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, TemplateValue::from(v)))
                    .collect(),
            ),
            other => TemplateValue::Literal(other),
        }
    }
}

impl From<TemplateValue> for Value {
    fn from(template: TemplateValue) -> Self {
        match template {
            TemplateValue::Literal(v) => v,
            TemplateValue::Reference(path) => Value::String(path.to_string()),
            TemplateValue::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            TemplateValue::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// One piece of a parsed HITL message template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSegment {
    Text(String),
    /// A `${...}` placeholder; `raw` is emitted verbatim if unresolved.
    Placeholder { path: ReferencePath, raw: String },
}

/// A HITL message with `${namespace.field}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct MessageTemplate {
    raw: String,
    segments: Vec<MessageSegment>,
}

impl MessageTemplate {
    /// Split `raw` into text and placeholder segments.
    ///
    /// An unterminated `${` and an empty `${}` are kept as text.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let mut segments = Vec::new();
        let mut rest = raw.as_str();

        while let Some(start) = rest.find("${") {
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                break;
            };
            push_text(&mut segments, &rest[..start]);

            let literal = &rest[start..start + 2 + end + 1];
            let expr = after[..end].trim();
            if expr.is_empty() {
                push_text(&mut segments, literal);
            } else {
                segments.push(MessageSegment::Placeholder {
                    path: ReferencePath::from_dotted(expr),
                    raw: literal.to_string(),
                });
            }
            rest = &after[end + 1..];
        }
        push_text(&mut segments, rest);

        Self { raw, segments }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[MessageSegment] {
        &self.segments
    }
}

fn push_text(segments: &mut Vec<MessageSegment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(MessageSegment::Text(prev)) = segments.last_mut() {
        prev.push_str(text);
    } else {
        segments.push(MessageSegment::Text(text.to_string()));
    }
}

impl From<String> for MessageTemplate {
    fn from(raw: String) -> Self {
        MessageTemplate::parse(raw)
    }
}

impl From<&str> for MessageTemplate {
    fn from(raw: &str) -> Self {
        MessageTemplate::parse(raw)
    }
}

impl From<MessageTemplate> for String {
    fn from(template: MessageTemplate) -> Self {
        template.raw
    }
}

// ---------------------------------------------------------------------------
// Execution Status
// ---------------------------------------------------------------------------

/// Status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    PendingInput,
    PendingApproval,
    Running,
    /// Reserved; the default engine path never enters it.
    Paused,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Completed and failed executions never run another step.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    /// Waiting on a human response.
    pub fn is_awaiting_human(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::PendingInput | ExecutionStatus::PendingApproval
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::PendingInput => "pending_input",
            ExecutionStatus::PendingApproval => "pending_approval",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single step within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    /// Parked at a HITL checkpoint.
    Waiting,
}

// ---------------------------------------------------------------------------
// Execution State (runtime record)
// ---------------------------------------------------------------------------

/// Per-step execution record. One per defined step, in step order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tool invocations made for this step (retries included).
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepResult {
    pub fn pending(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Pending,
            result: None,
            error: None,
            attempts: 0,
            started_at: None,
            completed_at: None,
        }
    }
}

/// A checkpoint the execution is currently parked on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingHitl {
    /// Step ID, or `workflow_start` / `workflow_complete` for workflow-level gates.
    pub step_id: String,
    pub checkpoint: HitlCheckpoint,
    pub requested_at: DateTime<Utc>,
}

/// Mutable execution record, owned by the engine through its store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionState {
    pub workflow_id: String,
    pub execution_id: String,
    pub status: ExecutionStatus,
    pub current_step_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_id: Option<String>,
    /// Inputs merged over the execution's lifetime.
    pub inputs: JsonMap,
    /// Raw tool results keyed by step ID.
    pub outputs: JsonMap,
    pub step_results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_hitl: Option<PendingHitl>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowExecutionState {
    /// IDs of steps that completed, in step order.
    pub fn completed_step_ids(&self) -> Vec<String> {
        self.step_results
            .iter()
            .filter(|r| r.status == StepStatus::Completed)
            .map(|r| r.step_id.clone())
            .collect()
    }

    /// Bump `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Caller-facing contract
// ---------------------------------------------------------------------------

/// A human decision delivered to a parked execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserDecision {
    /// `Some(false)` rejects and terminates the execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    /// Values merged into the execution's inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<JsonMap>,
}

impl UserDecision {
    pub fn approve() -> Self {
        Self {
            approved: Some(true),
            inputs: None,
        }
    }

    pub fn reject() -> Self {
        Self {
            approved: Some(false),
            inputs: None,
        }
    }

    pub fn with_inputs(inputs: JsonMap) -> Self {
        Self {
            approved: None,
            inputs: Some(inputs),
        }
    }
}

/// The HITL request surfaced to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlRequest {
    #[serde(rename = "type")]
    pub checkpoint_type: CheckpointType,
    /// Message with placeholders already interpolated.
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    pub step_id: String,
}

/// Uniform result of every engine call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResponse {
    /// Absent when no execution record was created (unknown workflow,
    /// missing required inputs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub completed_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hitl_request: Option<HitlRequest>,
    pub outputs: JsonMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub summary: String,
}

/// Outcome reported by a tool executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: Value::Null,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
