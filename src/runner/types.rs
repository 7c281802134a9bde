//! Transfer Record Types
//!
//! `TransferRecord` is the persisted progress of one transfer. All phase
//! changes go through the methods below so that `phase`,
//! `last_successful_phase`, `task_index` and the status codes move together.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::TransferError;
use super::state::TaskStep;
use super::status::{LifecycleStatus, StepStatus};

/// Identity of a transfer record.
///
/// `owner` is always the local node: a node only manages the records it owns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferKey {
    pub owner: String,
    pub requester: String,
    pub requested: String,
    pub transfer_id: i64,
}

impl TransferKey {
    /// Placeholder id for records that have not been through an allocator yet
    pub const UNASSIGNED: i64 = i64::MIN;

    pub fn new(
        owner: impl Into<String>,
        requester: impl Into<String>,
        requested: impl Into<String>,
        transfer_id: i64,
    ) -> Self {
        Self {
            owner: owner.into(),
            requester: requester.into(),
            requested: requested.into(),
            transfer_id,
        }
    }

    #[inline]
    pub fn is_assigned(&self) -> bool {
        self.transfer_id != Self::UNASSIGNED
    }

    /// `id_requester_requested`, the form exposed to tasks and operators
    pub fn full_transfer_id(&self) -> String {
        format!("{}_{}_{}", self.transfer_id, self.requester, self.requested)
    }
}

impl fmt::Display for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.full_transfer_id(), self.owner)
    }
}

/// Transfer mode, per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i16)]
pub enum TransferMode {
    #[default]
    Unknown = 0,
    Send = 1,
    Recv = 2,
    SendMd5 = 3,
    RecvMd5 = 4,
    SendThrough = 5,
    RecvThrough = 6,
    SendMd5Through = 7,
    RecvMd5Through = 8,
}

impl TransferMode {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransferMode::Unknown),
            1 => Some(TransferMode::Send),
            2 => Some(TransferMode::Recv),
            3 => Some(TransferMode::SendMd5),
            4 => Some(TransferMode::RecvMd5),
            5 => Some(TransferMode::SendThrough),
            6 => Some(TransferMode::RecvThrough),
            7 => Some(TransferMode::SendMd5Through),
            8 => Some(TransferMode::RecvMd5Through),
            _ => None,
        }
    }

    pub fn is_send(&self) -> bool {
        matches!(
            self,
            TransferMode::Send
                | TransferMode::SendMd5
                | TransferMode::SendThrough
                | TransferMode::SendMd5Through
        )
    }

    pub fn is_recv(&self) -> bool {
        matches!(
            self,
            TransferMode::Recv
                | TransferMode::RecvMd5
                | TransferMode::RecvThrough
                | TransferMode::RecvMd5Through
        )
    }

    pub fn is_md5(&self) -> bool {
        matches!(
            self,
            TransferMode::SendMd5
                | TransferMode::RecvMd5
                | TransferMode::SendMd5Through
                | TransferMode::RecvMd5Through
        )
    }

    /// Through-mode transfers stream to/from a process and never touch a file
    pub fn is_through(&self) -> bool {
        matches!(
            self,
            TransferMode::SendThrough
                | TransferMode::RecvThrough
                | TransferMode::SendMd5Through
                | TransferMode::RecvMd5Through
        )
    }
}

/// Parameters of a newly accepted transfer
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub rule_id: String,
    pub is_sender: bool,
    pub requester: String,
    pub requested: String,
    /// Id proposed by the requesting peer, if any
    pub transfer_id: Option<i64>,
    pub file_name: String,
    pub file_metadata: String,
    pub block_size: u32,
    pub mode: TransferMode,
}

/// Progress of a single transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    key: TransferKey,
    rule_id: String,
    phase: TaskStep,
    last_successful_phase: TaskStep,
    task_index: u32,
    block_rank: u64,
    step_status: StepStatus,
    info_status: StepStatus,
    /// Not part of the runner file; re-derived on reload.
    #[serde(skip)]
    lifecycle_status: LifecycleStatus,
    is_sender: bool,
    file_name: String,
    original_file_name: String,
    #[serde(default)]
    file_metadata: String,
    block_size: u32,
    mode: TransferMode,
    started_at: DateTime<Utc>,
    last_updated_at: DateTime<Utc>,
    file_was_relocated: bool,
    #[serde(skip)]
    dirty: bool,
    #[serde(skip)]
    halted: bool,
}

impl TransferRecord {
    /// Create a fresh record owned by `owner`.
    pub fn new(owner: &str, req: NewTransfer) -> Self {
        let now = Utc::now();
        Self {
            key: TransferKey::new(
                owner,
                req.requester,
                req.requested,
                req.transfer_id.unwrap_or(TransferKey::UNASSIGNED),
            ),
            rule_id: req.rule_id,
            phase: TaskStep::NoTask,
            last_successful_phase: TaskStep::NoTask,
            task_index: 0,
            block_rank: 0,
            step_status: StepStatus::Unknown,
            info_status: StepStatus::Unknown,
            lifecycle_status: LifecycleStatus::Unknown,
            is_sender: req.is_sender,
            original_file_name: req.file_name.clone(),
            file_name: req.file_name,
            file_metadata: req.file_metadata,
            block_size: req.block_size,
            mode: req.mode,
            started_at: now,
            last_updated_at: now,
            file_was_relocated: false,
            dirty: true,
            halted: false,
        }
    }

    // === Accessors ===

    pub fn key(&self) -> &TransferKey {
        &self.key
    }

    pub fn transfer_id(&self) -> i64 {
        self.key.transfer_id
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn phase(&self) -> TaskStep {
        self.phase
    }

    pub fn last_successful_phase(&self) -> TaskStep {
        self.last_successful_phase
    }

    pub fn task_index(&self) -> u32 {
        self.task_index
    }

    pub fn block_rank(&self) -> u64 {
        self.block_rank
    }

    pub fn step_status(&self) -> StepStatus {
        self.step_status
    }

    pub fn info_status(&self) -> StepStatus {
        self.info_status
    }

    pub fn lifecycle_status(&self) -> LifecycleStatus {
        self.lifecycle_status
    }

    pub fn is_sender(&self) -> bool {
        self.is_sender
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn original_file_name(&self) -> &str {
        &self.original_file_name
    }

    pub fn file_metadata(&self) -> &str {
        &self.file_metadata
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_updated_at(&self) -> DateTime<Utc> {
        self.last_updated_at
    }

    pub fn file_was_relocated(&self) -> bool {
        self.file_was_relocated
    }

    /// Whether the record has changes not yet written to a store
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// False once the data phase has reported a failure
    pub fn continue_transfer(&self) -> bool {
        !self.halted
    }

    // === Phase predicates ===

    pub fn is_all_done(&self) -> bool {
        self.phase == TaskStep::AllDone
    }

    pub fn is_in_error(&self) -> bool {
        self.phase == TaskStep::ErrorTask && self.step_status != StepStatus::Running
    }

    pub fn is_finished(&self) -> bool {
        self.is_all_done() || self.is_in_error()
    }

    pub fn is_in_transfer(&self) -> bool {
        self.phase == TaskStep::TransferTask
    }

    // === Phase transitions ===

    /// Enter (or resume) the pre-processing phase.
    pub fn enter_pre_task(&mut self) -> Result<(), TransferError> {
        self.ensure_forward(TaskStep::PreTask)?;
        self.task_index = self.task_index.saturating_sub(1);
        self.apply_pre_task();
        Ok(())
    }

    /// Enter the data phase. `resume_rank` may only lower the current rank.
    pub fn enter_transfer_task(&mut self, resume_rank: u64) -> Result<(), TransferError> {
        self.ensure_forward(TaskStep::TransferTask)?;
        self.apply_transfer_task(resume_rank);
        Ok(())
    }

    /// Report the end of the data phase and return the last confirmed rank.
    ///
    /// On failure the data phase is halted and the lifecycle moves to
    /// `InError` unless the record was already `Interrupted`.
    pub fn complete_transfer_task(
        &mut self,
        outcome: Result<(), StepStatus>,
    ) -> Result<u64, TransferError> {
        self.ensure_mutable()?;
        if self.phase != TaskStep::TransferTask {
            return Err(TransferError::WrongPhase {
                expected: TaskStep::TransferTask,
                actual: self.phase,
            });
        }
        match outcome {
            Ok(()) => {
                self.step_status = StepStatus::TransferOk;
                self.info_status = StepStatus::TransferOk;
            }
            Err(code) => {
                self.halted = true;
                if self.info_status.is_progress() {
                    self.info_status = code;
                }
                if self.lifecycle_status != LifecycleStatus::Interrupted {
                    self.lifecycle_status = LifecycleStatus::InError;
                }
            }
        }
        self.touch();
        Ok(self.block_rank)
    }

    /// Count one more confirmed block and return the new rank
    pub fn increment_rank(&mut self) -> Result<u64, TransferError> {
        self.ensure_mutable()?;
        if self.phase != TaskStep::TransferTask {
            return Err(TransferError::WrongPhase {
                expected: TaskStep::TransferTask,
                actual: self.phase,
            });
        }
        self.block_rank += 1;
        self.touch();
        Ok(self.block_rank)
    }

    /// Lower the rank to what the peer reports at startup. Never raises it.
    pub fn set_rank_at_startup(&mut self, rank: u64) {
        if self.block_rank > rank {
            self.block_rank = rank;
            self.touch();
        }
    }

    /// Enter (or resume) the post-processing phase.
    pub fn enter_post_task(&mut self) -> Result<(), TransferError> {
        self.ensure_forward(TaskStep::PostTask)?;
        self.task_index = self.task_index.saturating_sub(1);
        self.apply_post_task();
        Ok(())
    }

    /// Enter the error phase. A no-op when already there, so a failing
    /// error task cannot re-trigger the error list.
    pub fn enter_error_task(&mut self) -> Result<(), TransferError> {
        self.ensure_mutable()?;
        if self.phase == TaskStep::ErrorTask {
            return Ok(());
        }
        self.phase = TaskStep::ErrorTask;
        self.task_index = 0;
        self.step_status = StepStatus::Running;
        self.touch();
        Ok(())
    }

    /// Close the error phase with the failure that caused it.
    pub fn finish_in_error(&mut self, code: StepStatus) -> Result<(), TransferError> {
        self.ensure_mutable()?;
        self.phase = TaskStep::ErrorTask;
        self.step_status = code;
        self.info_status = code;
        self.lifecycle_status = LifecycleStatus::InError;
        self.halted = true;
        self.touch();
        Ok(())
    }

    /// Stop the transfer on an operator or peer request.
    ///
    /// The task position is kept so the record shows where it stopped; no
    /// error tasks run for an interruption.
    pub fn interrupt(&mut self, code: StepStatus) -> Result<(), TransferError> {
        self.ensure_mutable()?;
        self.phase = TaskStep::ErrorTask;
        self.step_status = code;
        self.info_status = code;
        self.lifecycle_status = LifecycleStatus::Interrupted;
        self.halted = true;
        self.touch();
        Ok(())
    }

    /// Terminal success. No mutation is accepted afterwards.
    pub fn mark_all_done(&mut self) -> Result<(), TransferError> {
        self.ensure_mutable()?;
        self.phase = TaskStep::AllDone;
        self.last_successful_phase = TaskStep::AllDone;
        self.task_index = 0;
        self.step_status = StepStatus::CompleteOk;
        self.info_status = StepStatus::CompleteOk;
        self.lifecycle_status = LifecycleStatus::Done;
        self.touch();
        Ok(())
    }

    /// Re-enter the last successful phase after a stop or a crash.
    ///
    /// The task position is kept, so the task that failed or was cancelled
    /// runs again and the ones before it do not.
    ///
    /// A receiver resuming its data phase rolls the rank back by
    /// `resend_window` blocks, since blocks written before the crash may not
    /// have been acknowledged by the sender.
    pub fn reset_for_restart(
        &mut self,
        resubmit: bool,
        resend_window: u64,
    ) -> Result<(), TransferError> {
        if self.lifecycle_status == LifecycleStatus::Done || self.is_all_done() {
            return Err(TransferError::AlreadyFinished(self.key.to_string()));
        }
        // After a business failure the position belongs to the error list
        if self.phase == TaskStep::ErrorTask
            && self.lifecycle_status != LifecycleStatus::Interrupted
        {
            self.task_index = 0;
        }
        match self.last_successful_phase {
            TaskStep::NoTask | TaskStep::PreTask => self.apply_pre_task(),
            TaskStep::TransferTask => {
                let rank = if self.is_sender {
                    self.block_rank
                } else {
                    self.block_rank.saturating_sub(resend_window)
                };
                self.apply_transfer_task(rank);
            }
            TaskStep::PostTask => self.apply_post_task(),
            // AllDone is rejected above, ErrorTask is never a successful phase
            TaskStep::AllDone | TaskStep::ErrorTask => {
                return Err(TransferError::InvalidPhaseTransition {
                    from: self.phase,
                    to: self.last_successful_phase,
                });
            }
        }
        self.halted = false;
        self.lifecycle_status = if resubmit {
            LifecycleStatus::ToSubmit
        } else {
            LifecycleStatus::Running
        };
        self.touch();
        Ok(())
    }

    // === Task pipeline hooks ===

    /// Advance past a completed task
    pub fn advance_task(&mut self) {
        self.task_index += 1;
        self.touch();
    }

    /// The phase task list ran out. Pre/post phases record their success code.
    pub fn finish_task_list(&mut self) {
        self.task_index = 0;
        if self.step_status == StepStatus::Running {
            match self.phase {
                TaskStep::PreTask => {
                    self.step_status = StepStatus::PreProcessingOk;
                    self.info_status = StepStatus::PreProcessingOk;
                }
                TaskStep::PostTask => {
                    self.step_status = StepStatus::PostProcessingOk;
                    self.info_status = StepStatus::PostProcessingOk;
                }
                _ => {}
            }
        }
        self.touch();
    }

    /// Record a failed task. The task position stays on the failed task.
    ///
    /// The step status carries the failure right away, so a record persisted
    /// before the error phase starts never shows `Running` next to `InError`.
    pub fn record_task_failure(&mut self, code: StepStatus) {
        self.step_status = code;
        self.info_status = code;
        if code.is_interruption() {
            self.lifecycle_status = LifecycleStatus::Interrupted;
        } else if self.lifecycle_status != LifecycleStatus::Interrupted {
            self.lifecycle_status = LifecycleStatus::InError;
        }
        self.touch();
    }

    /// Informational status, e.g. a task ending with a warning
    pub fn set_info_status(&mut self, code: StepStatus) {
        if self.info_status != code {
            self.info_status = code;
            self.touch();
        }
    }

    pub fn set_file_name(&mut self, file_name: impl Into<String>) {
        let file_name = file_name.into();
        if self.file_name != file_name {
            self.file_name = file_name;
            self.touch();
        }
    }

    /// The current file was moved to its final location
    pub fn set_file_moved(&mut self, file_name: impl Into<String>, moved: bool) {
        if self.file_was_relocated != moved {
            self.file_was_relocated = moved;
            self.touch();
        }
        self.set_file_name(file_name);
    }

    pub fn set_original_file_name(&mut self, original: impl Into<String>) {
        let original = original.into();
        if self.original_file_name != original {
            self.original_file_name = original;
            self.touch();
        }
    }

    // === Store hooks ===

    pub(crate) fn assign_id(&mut self, transfer_id: i64) {
        self.key.transfer_id = transfer_id;
        self.dirty = true;
    }

    pub(crate) fn set_lifecycle(&mut self, status: LifecycleStatus) {
        if self.lifecycle_status != status {
            self.lifecycle_status = status;
            self.dirty = true;
        }
    }

    pub(crate) fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// Rebuild the lifecycle of a record read back without one
    pub(crate) fn rederive_lifecycle(&mut self) {
        self.lifecycle_status = LifecycleStatus::derive(self.phase, self.step_status);
        self.halted = self.is_finished();
    }

    /// Rehydrate a record from stored columns.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        key: TransferKey,
        rule_id: String,
        phase: TaskStep,
        last_successful_phase: TaskStep,
        task_index: u32,
        block_rank: u64,
        step_status: StepStatus,
        info_status: StepStatus,
        lifecycle_status: LifecycleStatus,
        is_sender: bool,
        file_name: String,
        original_file_name: String,
        file_metadata: String,
        block_size: u32,
        mode: TransferMode,
        started_at: DateTime<Utc>,
        last_updated_at: DateTime<Utc>,
        file_was_relocated: bool,
    ) -> Self {
        let mut record = Self {
            key,
            rule_id,
            phase,
            last_successful_phase,
            task_index,
            block_rank,
            step_status,
            info_status,
            lifecycle_status,
            is_sender,
            file_name,
            original_file_name,
            file_metadata,
            block_size,
            mode,
            started_at,
            last_updated_at,
            file_was_relocated,
            dirty: false,
            halted: false,
        };
        record.halted = record.is_finished();
        record
    }

    // === Internals ===

    fn apply_pre_task(&mut self) {
        self.phase = TaskStep::PreTask;
        self.raise_last_successful(TaskStep::PreTask);
        self.step_status = StepStatus::Running;
        self.info_status = StepStatus::InitOk;
        self.lifecycle_status = LifecycleStatus::Running;
        self.touch();
    }

    fn apply_transfer_task(&mut self, resume_rank: u64) {
        self.phase = TaskStep::TransferTask;
        self.raise_last_successful(TaskStep::TransferTask);
        self.block_rank = self.block_rank.min(resume_rank);
        self.step_status = StepStatus::Running;
        self.info_status = StepStatus::PreProcessingOk;
        self.touch();
    }

    fn apply_post_task(&mut self) {
        self.phase = TaskStep::PostTask;
        self.raise_last_successful(TaskStep::PostTask);
        self.step_status = StepStatus::Running;
        self.info_status = StepStatus::TransferOk;
        self.touch();
    }

    fn raise_last_successful(&mut self, phase: TaskStep) {
        if self.last_successful_phase.forward_rank() < phase.forward_rank() {
            self.last_successful_phase = phase;
        }
    }

    fn ensure_mutable(&self) -> Result<(), TransferError> {
        if self.is_all_done() || self.lifecycle_status == LifecycleStatus::Done {
            return Err(TransferError::AlreadyFinished(self.key.to_string()));
        }
        Ok(())
    }

    /// Forward transitions may stay in the current phase or move ahead, never back.
    fn ensure_forward(&self, target: TaskStep) -> Result<(), TransferError> {
        self.ensure_mutable()?;
        let allowed = match self.phase.forward_rank() {
            Some(current) => target
                .forward_rank()
                .is_some_and(|target_rank| current <= target_rank),
            None => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(TransferError::InvalidPhaseTransition {
                from: self.phase,
                to: target,
            })
        }
    }

    fn touch(&mut self) {
        self.last_updated_at = Utc::now();
        self.dirty = true;
    }

    /// Read model for monitoring consumers
    pub fn summary(&self) -> TransferSummary {
        TransferSummary {
            owner: self.key.owner.clone(),
            requester: self.key.requester.clone(),
            requested: self.key.requested.clone(),
            transfer_id: self.key.transfer_id,
            rule_id: self.rule_id.clone(),
            phase: self.phase,
            last_successful_phase: self.last_successful_phase,
            task_index: self.task_index,
            block_rank: self.block_rank,
            step_status: self.step_status.code(),
            info_status: self.info_status.code(),
            lifecycle_status: self.lifecycle_status,
            started_at: self.started_at,
            stopped_at: self.last_updated_at,
            is_sender: self.is_sender,
            file_name: self.file_name.clone(),
            original_file_name: self.original_file_name.clone(),
        }
    }
}

/// Per-transfer summary exposed to monitoring UIs and CLIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferSummary {
    pub owner: String,
    pub requester: String,
    pub requested: String,
    pub transfer_id: i64,
    pub rule_id: String,
    pub phase: TaskStep,
    pub last_successful_phase: TaskStep,
    pub task_index: u32,
    pub block_rank: u64,
    pub step_status: char,
    pub info_status: char,
    pub lifecycle_status: LifecycleStatus,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub is_sender: bool,
    pub file_name: String,
    pub original_file_name: String,
}
