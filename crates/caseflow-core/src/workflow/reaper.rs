//! Background eviction of finished executions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::store::ExecutionStore;

/// Spawn a task that removes completed and failed executions whose last
/// update is older than `ttl`, checking every `interval`.
///
/// Executions waiting on a human are never reaped. The task exits when
/// `cancel` is triggered.
pub fn spawn_reaper<S: ExecutionStore + 'static>(
    store: Arc<S>,
    ttl: Duration,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ttl = match chrono::Duration::from_std(ttl) {
            Ok(ttl) => ttl,
            Err(e) => {
                tracing::error!(error = %e, "reaper TTL out of range; reaper not started");
                return;
            }
        };
        // `interval` panics on a zero period.
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("execution reaper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let Some(cutoff) = Utc::now().checked_sub_signed(ttl) else {
                        tracing::debug!("reaper TTL reaches past the earliest timestamp; nothing to reap");
                        continue;
                    };
                    match store.reap(cutoff).await {
                        Ok(0) => {}
                        Ok(removed) => tracing::info!(removed, "reaped finished executions"),
                        Err(e) => tracing::warn!(error = %e, "execution reap failed"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::store::InMemoryExecutionStore;
    use caseflow_types::workflow::{ExecutionStatus, JsonMap, WorkflowExecutionState};

    fn record(id: &str, status: ExecutionStatus, age: chrono::Duration) -> WorkflowExecutionState {
        let at = Utc::now() - age;
        WorkflowExecutionState {
            workflow_id: "folder_create".to_string(),
            execution_id: id.to_string(),
            status,
            current_step_index: 0,
            current_step_id: None,
            inputs: JsonMap::new(),
            outputs: JsonMap::new(),
            step_results: vec![],
            pending_hitl: None,
            created_at: at,
            updated_at: at,
            completed_at: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_reaper_evicts_expired_finished_executions() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let old = chrono::Duration::minutes(10);
        store
            .insert(record("exec_done", ExecutionStatus::Completed, old))
            .await
            .unwrap();
        store
            .insert(record("exec_waiting", ExecutionStatus::PendingInput, old))
            .await
            .unwrap();
        store
            .insert(record("exec_fresh", ExecutionStatus::Failed, chrono::Duration::zero()))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let handle = spawn_reaper(
            Arc::clone(&store),
            Duration::from_secs(60),
            Duration::from_millis(10),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(store.get("exec_done").await.unwrap().is_none());
        assert!(store.get("exec_waiting").await.unwrap().is_some());
        assert!(store.get("exec_fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ttl_beyond_calendar_range_reaps_nothing() {
        let store = Arc::new(InMemoryExecutionStore::new());
        store
            .insert(record("exec_old", ExecutionStatus::Completed, chrono::Duration::days(30)))
            .await
            .unwrap();

        // ~317,000 years: a valid chrono::Duration, but now minus it is
        // before the earliest representable DateTime.
        let cancel = CancellationToken::new();
        let handle = spawn_reaper(
            Arc::clone(&store),
            Duration::from_secs(10_000_000_000_000),
            Duration::from_millis(10),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.expect("reaper task must not panic");

        assert!(store.get("exec_old").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reaper_stops_on_cancel() {
        let store = Arc::new(InMemoryExecutionStore::new());
        let cancel = CancellationToken::new();
        let handle = spawn_reaper(
            store,
            Duration::from_secs(1),
            Duration::from_secs(3600),
            cancel.clone(),
        );
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reaper should exit promptly")
            .unwrap();
    }
}
