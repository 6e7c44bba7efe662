//! Workflow engine core.
//!
//! - `definition` -- YAML parsing, validation, directory discovery
//! - `catalog` -- built-in case-management workflows
//! - `registry` -- read-only lookup by ID and trigger keyword
//! - `reference` -- `$ns.field` resolution over inputs, outputs, context
//! - `template` -- `${...}` HITL message rendering
//! - `condition` -- step guards
//! - `retry` -- per-step attempt budget
//! - `store` -- execution store port + in-memory implementation
//! - `engine` -- start / respond / cancel and the step loop
//! - `summary` -- human-readable response summaries
//! - `reaper` -- TTL eviction of finished executions

pub mod catalog;
pub mod condition;
pub mod definition;
pub mod engine;
pub mod reaper;
pub mod reference;
pub mod registry;
pub mod retry;
pub mod store;
pub mod summary;
pub mod template;

pub use engine::WorkflowEngine;
pub use registry::WorkflowRegistry;
pub use store::{ExecutionStore, InMemoryExecutionStore};
