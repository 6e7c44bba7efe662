//! Shared domain types for Caseflow.
//!
//! Workflow definitions, execution records, the caller-facing response
//! contract, engine configuration and the error types shared across crates.
//!
//! No I/O -- only serde, serde_json, chrono, thiserror.

pub mod config;
pub mod error;
pub mod workflow;
