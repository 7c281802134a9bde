//! Phase Tasks
//!
//! Side-effect units executed by the pipeline at each phase boundary. Task
//! kinds are looked up by name in a [`TaskCatalog`], so the pipeline has no
//! compile-time knowledge of them.

pub mod catalog;
pub mod context;
pub mod exec;
pub mod fs;
pub mod log;
pub mod pipeline;

pub use catalog::{TaskCatalog, TaskFactory};
pub use context::TaskContext;
pub use pipeline::{PhaseEnv, PipelineError, TaskPipelineExecutor};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::runner::StepStatus;

/// Result of one task run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// Completed, but something is worth reporting. The pipeline continues.
    Warning(String),
    Failed { code: StepStatus, reason: String },
}

impl TaskOutcome {
    pub fn failed(code: StepStatus, reason: impl Into<String>) -> Self {
        TaskOutcome::Failed {
            code,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, TaskOutcome::Failed { .. })
    }
}

/// Task construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Unknown task type: {0}")]
    UnknownTask(String),

    #[error("Invalid argument for task {task}: {reason}")]
    InvalidArgument { task: String, reason: String },
}

impl TaskError {
    pub fn step_status(&self) -> StepStatus {
        match self {
            TaskError::UnknownTask(_) => StepStatus::Unimplemented,
            TaskError::InvalidArgument { .. } => StepStatus::ExternalOp,
        }
    }
}

/// A single-use task bound to its argument and delay budget.
#[async_trait]
pub trait Task: Send {
    /// Type name for logging
    fn kind(&self) -> &'static str;

    /// Upper bound for `run`. Exceeding it fails the task.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn run(&mut self, ctx: &mut TaskContext<'_>) -> TaskOutcome;
}

/// Sleep for the delay budget
pub struct DelayTask {
    delay: Duration,
}

impl DelayTask {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
        }
    }
}

#[async_trait]
impl Task for DelayTask {
    fn kind(&self) -> &'static str {
        "DELAY"
    }

    async fn run(&mut self, _ctx: &mut TaskContext<'_>) -> TaskOutcome {
        tokio::time::sleep(self.delay).await;
        TaskOutcome::Success
    }
}
