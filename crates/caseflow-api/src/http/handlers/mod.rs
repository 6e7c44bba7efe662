//! REST API handlers, one module per resource.

pub mod execution;
pub mod health;
pub mod workflow;
