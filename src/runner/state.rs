//! Transfer Phase Definitions
//!
//! Phase IDs are stored as SMALLINT in PostgreSQL and as numbers in the
//! no-DB runner file, so the discriminants are part of the storage format.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse phase of a transfer.
///
/// Forward order is `NoTask < PreTask < TransferTask < PostTask < AllDone`.
/// `ErrorTask` sits outside that order and is reachable from any
/// non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
#[repr(i16)]
pub enum TaskStep {
    /// Record created, nothing executed yet
    #[default]
    NoTask = 0,

    /// Pre-processing task list running
    PreTask = 1,

    /// Data blocks moving between peers
    TransferTask = 2,

    /// Post-processing task list running
    PostTask = 3,

    /// Terminal: everything completed
    AllDone = 4,

    /// Error task list running (or completed after a failure)
    ErrorTask = 5,
}

impl TaskStep {
    /// Numeric id used for storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from the storage id
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TaskStep::NoTask),
            1 => Some(TaskStep::PreTask),
            2 => Some(TaskStep::TransferTask),
            3 => Some(TaskStep::PostTask),
            4 => Some(TaskStep::AllDone),
            5 => Some(TaskStep::ErrorTask),
            _ => None,
        }
    }

    /// Position in the forward order, `None` for `ErrorTask`.
    #[inline]
    pub fn forward_rank(&self) -> Option<u8> {
        match self {
            TaskStep::ErrorTask => None,
            other => Some(*other as u8),
        }
    }

    /// Phases that own a task list in a rule
    #[inline]
    pub fn has_task_list(&self) -> bool {
        matches!(
            self,
            TaskStep::PreTask | TaskStep::PostTask | TaskStep::ErrorTask
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStep::NoTask => "NOTASK",
            TaskStep::PreTask => "PRETASK",
            TaskStep::TransferTask => "TRANSFERTASK",
            TaskStep::PostTask => "POSTTASK",
            TaskStep::AllDone => "ALLDONETASK",
            TaskStep::ErrorTask => "ERRORTASK",
        }
    }
}

impl fmt::Display for TaskStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for TaskStep {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TaskStep::from_id(value).ok_or_else(|| format!("invalid phase id: {}", value))
    }
}

impl From<TaskStep> for i16 {
    fn from(step: TaskStep) -> Self {
        step.id()
    }
}
