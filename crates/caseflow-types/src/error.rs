use thiserror::Error;

/// Errors from execution store operations (trait defined in caseflow-core).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("execution not found: {0}")]
    NotFound(String),

    #[error("execution already exists: {0}")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors reported by a tool executor.
///
/// The engine treats every variant the same as a `success: false` outcome.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool '{tool}' returned HTTP {status}: {body}")]
    Status {
        tool: String,
        status: u16,
        body: String,
    },

    #[error("tool transport error: {0}")]
    Transport(String),

    #[error("invalid tool response: {0}")]
    InvalidResponse(String),
}
