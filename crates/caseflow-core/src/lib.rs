//! Workflow engine and port definitions for Caseflow.
//!
//! This crate defines the ports (`ExecutionStore`, `ToolExecutor`) that the
//! infrastructure layer implements, plus the engine that drives executions
//! through them. It depends only on `caseflow-types` -- never on
//! `caseflow-infra` or any network crate.

pub mod tool;
pub mod workflow;
