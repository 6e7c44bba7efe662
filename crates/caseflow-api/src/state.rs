//! Application state wiring the engine to its concrete adapters.
//!
//! The engine is generic over store and tool executor; AppState pins it to
//! the in-memory store and the executor selected by configuration. Shared by
//! CLI commands and REST handlers.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use caseflow_core::tool::BoxToolExecutor;
use caseflow_core::workflow::{InMemoryExecutionStore, WorkflowEngine, WorkflowRegistry};
use caseflow_infra::config::load_engine_config;
use caseflow_types::config::EngineConfig;

/// Engine pinned to the infra implementations.
pub type ConcreteEngine = WorkflowEngine<InMemoryExecutionStore, BoxToolExecutor>;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConcreteEngine>,
    pub config: Arc<EngineConfig>,
}

impl AppState {
    /// Load configuration from `config_path` and wire the engine.
    pub async fn init(config_path: &Path) -> anyhow::Result<Self> {
        let config = load_engine_config(config_path).await;
        Self::from_config(config)
    }

    /// Wire the engine from an already-loaded configuration.
    pub fn from_config(config: EngineConfig) -> anyhow::Result<Self> {
        let mut registry = WorkflowRegistry::builtin().context("loading built-in workflows")?;
        if let Some(dir) = &config.workflow_dir {
            registry = registry
                .with_directory(dir)
                .with_context(|| format!("loading workflows from {}", dir.display()))?;
        }
        tracing::debug!(workflows = registry.len(), "workflow registry ready");

        let tools = caseflow_infra::tool::from_config(&config.tool_executor)
            .context("building tool executor")?;

        let engine = WorkflowEngine::new(
            Arc::new(registry),
            Arc::new(InMemoryExecutionStore::new()),
            Arc::new(tools),
        );

        Ok(Self {
            engine: Arc::new(engine),
            config: Arc::new(config),
        })
    }
}
