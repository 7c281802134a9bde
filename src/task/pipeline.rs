//! Task Pipeline Executor
//!
//! Runs one phase's task list front to back, starting at the record's task
//! index. Each task is built fresh from the catalog, runs to completion, and
//! the index moves past it before the next one starts. The first failure or
//! cancellation stops the loop; moving to the error phase is left to the
//! caller.
//!
//! Every index move and every failure is persisted before the executor
//! returns, so a crash never replays a task that already completed.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{TaskCatalog, TaskContext, TaskOutcome};
use crate::config::PathsConfig;
use crate::controller::cancel::{CancelListener, CancelReason};
use crate::rule::TransferRule;
use crate::runner::{StepStatus, TransferError, TransferRecord};
use crate::store::TransferStore;

/// Collaborators a phase runs against
#[derive(Clone, Copy)]
pub struct PhaseEnv<'a> {
    pub rule: &'a TransferRule,
    pub paths: &'a PathsConfig,
    pub node_id: &'a str,
}

/// Why a phase stopped before its list ran out
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Task {index} ({kind}) failed with {code}: {reason}")]
    TaskFailed {
        index: u32,
        kind: String,
        code: StepStatus,
        reason: String,
    },

    #[error("Cancelled ({reason}) at task {index}")]
    Cancelled { index: u32, reason: CancelReason },

    #[error("Persistence failed: {0}")]
    Store(#[from] TransferError),
}

impl PipelineError {
    /// Status code recorded for this failure
    pub fn step_status(&self) -> StepStatus {
        match self {
            PipelineError::TaskFailed { code, .. } => *code,
            PipelineError::Cancelled { reason, .. } => reason.step_status(),
            PipelineError::Store(_) => StepStatus::Internal,
        }
    }
}

pub struct TaskPipelineExecutor {
    catalog: Arc<TaskCatalog>,
    store: Arc<dyn TransferStore>,
}

impl TaskPipelineExecutor {
    pub fn new(catalog: Arc<TaskCatalog>, store: Arc<dyn TransferStore>) -> Self {
        Self { catalog, store }
    }

    pub fn catalog(&self) -> &TaskCatalog {
        &self.catalog
    }

    /// Run the task list of the record's current phase.
    ///
    /// `Ok(())` means the list is exhausted and the caller may move to the
    /// next phase. An empty list returns immediately without consulting the
    /// catalog.
    pub async fn run_phase(
        &self,
        record: &mut TransferRecord,
        env: &PhaseEnv<'_>,
        cancel: &mut CancelListener,
    ) -> Result<(), PipelineError> {
        let phase = record.phase();
        let tasks = env.rule.select_tasks(record.is_sender(), phase);

        while let Some(configured) = tasks.get(record.task_index() as usize) {
            let index = record.task_index();
            if let Some(reason) = cancel.reason() {
                return self.cancelled(record, index, reason).await;
            }

            let argument =
                TaskContext::new(record, env.rule, env.paths, env.node_id).substitute(&configured.argument);
            let mut task = match self.catalog.create(&configured.task_type, &argument, configured.delay) {
                Ok(task) => task,
                Err(e) => {
                    return self
                        .failed(record, index, &configured.task_type, e.step_status(), e.to_string())
                        .await;
                }
            };
            let kind = task.kind();
            debug!(
                transfer = %record.key(),
                phase = %phase,
                index,
                kind,
                "Running task"
            );

            let result = {
                let mut ctx = TaskContext::new(record, env.rule, env.paths, env.node_id);
                let limit = task.timeout();
                let run = async {
                    match limit {
                        Some(limit) => tokio::time::timeout(limit, task.run(&mut ctx))
                            .await
                            .unwrap_or_else(|_| {
                                TaskOutcome::failed(
                                    StepStatus::ExternalOp,
                                    format!("timed out after {} ms", limit.as_millis()),
                                )
                            }),
                        None => task.run(&mut ctx).await,
                    }
                };
                tokio::select! {
                    biased;
                    reason = cancel.cancelled() => Err(reason),
                    outcome = run => Ok(outcome),
                }
            };

            match result {
                Err(reason) => return self.cancelled(record, index, reason).await,
                Ok(TaskOutcome::Failed { code, reason }) => {
                    return self.failed(record, index, kind, code, reason).await;
                }
                Ok(TaskOutcome::Warning(message)) => {
                    warn!(transfer = %record.key(), index, kind, %message, "Task finished with warning");
                    record.set_info_status(StepStatus::Warning);
                }
                Ok(TaskOutcome::Success) => {}
            }

            record.advance_task();
            self.store.update(record).await?;
        }

        record.finish_task_list();
        self.store.update(record).await?;
        if !tasks.is_empty() {
            info!(transfer = %record.key(), phase = %phase, count = tasks.len(), "Phase tasks done");
        }
        Ok(())
    }

    async fn failed(
        &self,
        record: &mut TransferRecord,
        index: u32,
        kind: &str,
        code: StepStatus,
        reason: String,
    ) -> Result<(), PipelineError> {
        error!(
            transfer = %record.key(),
            phase = %record.phase(),
            index,
            kind,
            code = %code,
            %reason,
            "Task failed"
        );
        record.record_task_failure(code);
        self.store.update(record).await?;
        Err(PipelineError::TaskFailed {
            index,
            kind: kind.to_string(),
            code,
            reason,
        })
    }

    async fn cancelled(
        &self,
        record: &mut TransferRecord,
        index: u32,
        reason: CancelReason,
    ) -> Result<(), PipelineError> {
        warn!(
            transfer = %record.key(),
            phase = %record.phase(),
            index,
            reason = %reason,
            "Task pipeline cancelled"
        );
        record.record_task_failure(reason.step_status());
        self.store.update(record).await?;
        Err(PipelineError::Cancelled { index, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::cancel::CancelSignal;
    use crate::rule::RuleTask;
    use crate::runner::{LifecycleStatus, NewTransfer, TaskStep, TransferMode};
    use crate::store::NoDbTransferStore;
    use crate::task::mock::{TaskProbe, mock_catalog};
    use std::time::Duration;

    fn record() -> TransferRecord {
        TransferRecord::new(
            "local",
            NewTransfer {
                rule_id: "pipe".into(),
                is_sender: true,
                requester: "local".into(),
                requested: "remote".into(),
                transfer_id: Some(9),
                file_name: "f.txt".into(),
                file_metadata: String::new(),
                block_size: 1024,
                mode: TransferMode::Send,
            },
        )
    }

    fn rule_with(pre: &[&str], post: &[&str]) -> TransferRule {
        let mut rule = TransferRule::new("pipe", TransferMode::Send);
        rule.sender.pre = pre.iter().map(|a| RuleTask::new("MOCK", *a, 0)).collect();
        rule.sender.post = post.iter().map(|a| RuleTask::new("mock", *a, 0)).collect();
        rule
    }

    fn executor(catalog: TaskCatalog) -> (TaskPipelineExecutor, Arc<NoDbTransferStore>) {
        let store = Arc::new(NoDbTransferStore::in_memory());
        let exec = TaskPipelineExecutor::new(Arc::new(catalog), store.clone());
        (exec, store)
    }

    fn to_post_phase(rec: &mut TransferRecord) {
        rec.enter_pre_task().unwrap();
        rec.finish_task_list();
        rec.enter_transfer_task(0).unwrap();
        rec.complete_transfer_task(Ok(())).unwrap();
        rec.enter_post_task().unwrap();
    }

    #[tokio::test]
    async fn test_empty_list_is_exhausted_without_catalog() {
        let (exec, store) = executor(TaskCatalog::new());
        let rule = rule_with(&[], &[]);
        let paths = PathsConfig::default();
        let env = PhaseEnv { rule: &rule, paths: &paths, node_id: "local" };
        let mut rec = record();
        rec.enter_pre_task().unwrap();

        exec.run_phase(&mut rec, &env, &mut CancelListener::never())
            .await
            .unwrap();

        assert_eq!(rec.task_index(), 0);
        assert_eq!(rec.step_status(), StepStatus::PreProcessingOk);
        assert!(!rec.is_dirty());
        assert!(store.select(rec.key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_runs_all_tasks_in_order() {
        let probe = TaskProbe::new();
        let (exec, _store) = executor(mock_catalog(probe.clone()));
        let rule = rule_with(&["ok a", "warn b", "ok c"], &[]);
        let paths = PathsConfig::default();
        let env = PhaseEnv { rule: &rule, paths: &paths, node_id: "local" };
        let mut rec = record();
        rec.enter_pre_task().unwrap();

        exec.run_phase(&mut rec, &env, &mut CancelListener::never())
            .await
            .unwrap();

        assert_eq!(probe.ran(), vec!["ok a", "warn b", "ok c"]);
        assert_eq!(rec.task_index(), 0);
        assert_eq!(rec.info_status(), StepStatus::PreProcessingOk);
    }

    #[tokio::test]
    async fn test_failure_stops_at_failed_task() {
        let probe = TaskProbe::new();
        let (exec, store) = executor(mock_catalog(probe.clone()));
        let rule = rule_with(&["ok a", "ok b", "fail c", "ok d"], &[]);
        let paths = PathsConfig::default();
        let env = PhaseEnv { rule: &rule, paths: &paths, node_id: "local" };
        let mut rec = record();
        rec.enter_pre_task().unwrap();

        let err = exec
            .run_phase(&mut rec, &env, &mut CancelListener::never())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::TaskFailed { index: 2, .. }));
        assert_eq!(err.step_status(), StepStatus::ExternalOp);
        assert_eq!(probe.ran(), vec!["ok a", "ok b", "fail c"]);
        assert_eq!(rec.task_index(), 2);
        assert_eq!(rec.lifecycle_status(), LifecycleStatus::InError);

        let stored = store.select(rec.key()).await.unwrap().unwrap();
        assert_eq!(stored.task_index(), 2);
        assert_eq!(stored.info_status(), StepStatus::ExternalOp);
        // Persisted state is consistent before the error phase runs
        assert_eq!(stored.step_status(), StepStatus::ExternalOp);
        assert_eq!(stored.lifecycle_status(), LifecycleStatus::InError);
    }

    #[tokio::test]
    async fn test_resumes_from_task_index() {
        let probe = TaskProbe::new();
        let (exec, _store) = executor(mock_catalog(probe.clone()));
        let rule = rule_with(&["ok a", "ok b", "ok c"], &[]);
        let paths = PathsConfig::default();
        let env = PhaseEnv { rule: &rule, paths: &paths, node_id: "local" };
        let mut rec = record();
        rec.enter_pre_task().unwrap();
        rec.advance_task();
        rec.advance_task();

        exec.run_phase(&mut rec, &env, &mut CancelListener::never())
            .await
            .unwrap();
        assert_eq!(probe.ran(), vec!["ok c"]);
    }

    #[tokio::test]
    async fn test_unknown_task_type_fails_unimplemented() {
        let (exec, _store) = executor(TaskCatalog::new());
        let rule = rule_with(&["ok"], &[]);
        let paths = PathsConfig::default();
        let env = PhaseEnv { rule: &rule, paths: &paths, node_id: "local" };
        let mut rec = record();
        rec.enter_pre_task().unwrap();

        let err = exec
            .run_phase(&mut rec, &env, &mut CancelListener::never())
            .await
            .unwrap_err();
        assert_eq!(err.step_status(), StepStatus::Unimplemented);
        assert_eq!(rec.task_index(), 0);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_task() {
        let probe = TaskProbe::new();
        let (exec, store) = executor(mock_catalog(probe.clone()));
        let rule = rule_with(&[], &["ok first", "hang second"]);
        let paths = PathsConfig::default();
        let env = PhaseEnv { rule: &rule, paths: &paths, node_id: "local" };
        let mut rec = record();
        to_post_phase(&mut rec);

        let (signal, mut listener) = CancelSignal::pair();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            signal.cancel(CancelReason::Stopped);
        });

        let err = exec.run_phase(&mut rec, &env, &mut listener).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Cancelled { index: 1, reason: CancelReason::Stopped }
        ));
        assert_eq!(probe.run_count(), 2);
        assert_eq!(rec.phase(), TaskStep::PostTask);
        assert_eq!(rec.task_index(), 1);
        assert_eq!(rec.lifecycle_status(), LifecycleStatus::Interrupted);
        assert_eq!(
            store.select(rec.key()).await.unwrap().unwrap().task_index(),
            1
        );
    }

    #[tokio::test]
    async fn test_cancel_before_start_runs_nothing() {
        let probe = TaskProbe::new();
        let (exec, _store) = executor(mock_catalog(probe.clone()));
        let rule = rule_with(&["ok a"], &[]);
        let paths = PathsConfig::default();
        let env = PhaseEnv { rule: &rule, paths: &paths, node_id: "local" };
        let mut rec = record();
        rec.enter_pre_task().unwrap();

        let (signal, mut listener) = CancelSignal::pair();
        signal.cancel(CancelReason::Shutdown);

        let err = exec.run_phase(&mut rec, &env, &mut listener).await.unwrap_err();
        assert_eq!(err.step_status(), StepStatus::Shutdown);
        assert_eq!(probe.run_count(), 0);
    }
}
