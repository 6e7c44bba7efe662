//! Tool execution port.
//!
//! - `ToolExecutor`: RPITIT trait implemented by concrete executors
//! - `BoxToolExecutor`: object-safe wrapper for runtime executor selection

pub mod box_executor;
pub mod executor;

pub use box_executor::BoxToolExecutor;
pub use executor::ToolExecutor;
