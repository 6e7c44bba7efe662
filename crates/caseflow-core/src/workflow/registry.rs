//! Read-only lookup of workflow definitions.
//!
//! Built once at startup from the built-in catalog and, optionally, a
//! directory of extra YAML definitions. Never mutated afterwards, so it is
//! shared as `Arc<WorkflowRegistry>` without locking.

use std::collections::HashMap;
use std::path::Path;

use caseflow_types::workflow::WorkflowDefinition;

use super::catalog;
use super::definition::{WorkflowError, discover_workflows, validate_definition};

#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    definitions: Vec<WorkflowDefinition>,
    index: HashMap<String, usize>,
}

impl WorkflowRegistry {
    /// Build a registry, validating each definition and rejecting duplicate IDs.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = WorkflowDefinition>,
    ) -> Result<Self, WorkflowError> {
        let mut registry = Self::default();
        for def in definitions {
            registry.add(def)?;
        }
        Ok(registry)
    }

    /// Registry holding the built-in case-management workflows.
    pub fn builtin() -> Result<Self, WorkflowError> {
        Self::from_definitions(catalog::builtin_definitions()?)
    }

    /// Add every definition found under `dir`.
    pub fn with_directory(mut self, dir: &Path) -> Result<Self, WorkflowError> {
        for (path, def) in discover_workflows(dir)? {
            tracing::debug!(?path, workflow_id = %def.id, "loaded workflow definition");
            self.add(def)?;
        }
        Ok(self)
    }

    fn add(&mut self, def: WorkflowDefinition) -> Result<(), WorkflowError> {
        validate_definition(&def)?;
        if self.index.contains_key(&def.id) {
            return Err(WorkflowError::DuplicateWorkflow(def.id));
        }
        self.index.insert(def.id.clone(), self.definitions.len());
        self.definitions.push(def);
        Ok(())
    }

    pub fn get(&self, workflow_id: &str) -> Option<&WorkflowDefinition> {
        self.index.get(workflow_id).map(|&i| &self.definitions[i])
    }

    /// All definitions in insertion order.
    pub fn list(&self) -> Vec<&WorkflowDefinition> {
        self.definitions.iter().collect()
    }

    /// Definitions with a trigger keyword contained in `text` (case-insensitive).
    pub fn find_by_keyword(&self, text: &str) -> Vec<&WorkflowDefinition> {
        let haystack = text.to_lowercase();
        self.definitions
            .iter()
            .filter(|def| {
                def.metadata
                    .trigger_keywords
                    .iter()
                    .any(|kw| !kw.is_empty() && haystack.contains(&kw.to_lowercase()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
