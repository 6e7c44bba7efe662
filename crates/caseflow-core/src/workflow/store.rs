//! Execution state storage.
//!
//! `ExecutionStore` is the port the engine persists execution records
//! through. `InMemoryExecutionStore` keeps them in a `DashMap` for the
//! lifetime of the process. Records are cloned on read so no `DashMap`
//! guard is ever held across an `.await`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use caseflow_types::error::StoreError;
use caseflow_types::workflow::WorkflowExecutionState;

/// Generate an execution ID: `exec_<unix millis>_<8 hex chars>`.
pub fn new_execution_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("exec_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}

/// Storage interface for execution records.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ExecutionStore: Send + Sync {
    /// Store a new record. Fails with `Conflict` if the ID is taken.
    fn insert(
        &self,
        state: WorkflowExecutionState,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Get a copy of a record.
    fn get(
        &self,
        execution_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowExecutionState>, StoreError>> + Send;

    /// Overwrite an existing record. Fails with `NotFound` if absent.
    fn save(
        &self,
        state: &WorkflowExecutionState,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// All records, oldest first.
    fn list(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowExecutionState>, StoreError>> + Send;

    /// Delete a record. Returns `true` if it existed.
    fn remove(
        &self,
        execution_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, StoreError>> + Send;

    /// Delete completed and failed records last updated before `older_than`.
    /// Returns the number removed.
    fn reap(
        &self,
        older_than: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<usize, StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// InMemoryExecutionStore
// ---------------------------------------------------------------------------

/// Process-lifetime execution store backed by `DashMap`.
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    records: DashMap<String, WorkflowExecutionState>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ExecutionStore for InMemoryExecutionStore {
    async fn insert(&self, state: WorkflowExecutionState) -> Result<(), StoreError> {
        match self.records.entry(state.execution_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(state.execution_id)),
            Entry::Vacant(slot) => {
                slot.insert(state);
                Ok(())
            }
        }
    }

    async fn get(&self, execution_id: &str) -> Result<Option<WorkflowExecutionState>, StoreError> {
        Ok(self.records.get(execution_id).map(|r| r.value().clone()))
    }

    async fn save(&self, state: &WorkflowExecutionState) -> Result<(), StoreError> {
        match self.records.get_mut(&state.execution_id) {
            Some(mut slot) => {
                *slot = state.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(state.execution_id.clone())),
        }
    }

    async fn list(&self) -> Result<Vec<WorkflowExecutionState>, StoreError> {
        let mut all: Vec<WorkflowExecutionState> =
            self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.execution_id.cmp(&b.execution_id))
        });
        Ok(all)
    }

    async fn remove(&self, execution_id: &str) -> Result<bool, StoreError> {
        Ok(self.records.remove(execution_id).is_some())
    }

    async fn reap(&self, older_than: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut removed = 0;
        self.records.retain(|_, state| {
            let expired = state.status.is_terminal() && state.updated_at < older_than;
            if expired {
                removed += 1;
            }
            !expired
        });
        Ok(removed)
    }
}
