//! Infrastructure layer for Caseflow.
//!
//! Implements the ports defined in `caseflow-core`: tool executors (HTTP and
//! dry-run) plus the TOML configuration loader.

pub mod config;
pub mod tool;
