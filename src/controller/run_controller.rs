//! Run Controller
//!
//! Drives transfer records through their phases: accepts new transfers,
//! resumes stored ones, moves data blocks during the data phase and routes
//! failures and cancellations to the right terminal state.
//!
//! Each record is driven by one task at a time. `resume_transfer` and `run`
//! claim the record's key in the active set, which is also where
//! cancellation requests are delivered. A key claimed by a resume stays
//! claimed until the next `run` of it finishes or `release` drops it.
//! Every phase change is persisted before the next phase starts.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use super::cancel::{CancelListener, CancelReason, CancelSignal};
use super::channel::BlockChannel;
use crate::config::EngineConfig;
use crate::rule::RuleRegistry;
use crate::runner::{
    LifecycleStatus, NewTransfer, StepStatus, TaskStep, TransferError, TransferKey, TransferMode,
    TransferRecord, TransferSummary,
};
use crate::store::TransferStore;
use crate::task::fs::move_file;
use crate::task::{PhaseEnv, PipelineError, TaskCatalog, TaskPipelineExecutor};

/// A transfer request as handed over by the session layer
#[derive(Debug, Clone, Default)]
pub struct TransferRequest {
    pub requester: String,
    pub requested: String,
    /// Id chosen by the requester, if any
    pub transfer_id: Option<i64>,
    pub file_name: String,
    pub file_metadata: String,
    /// Falls back to the configured block size
    pub block_size: Option<u32>,
    /// Falls back to the rule's mode
    pub mode: Option<TransferMode>,
}

/// How a `run` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed(StepStatus),
    Interrupted(CancelReason),
}

enum DataError {
    Failed(StepStatus, String),
    Cancelled(CancelReason),
    Store(TransferError),
}

fn io_failure(e: io::Error) -> DataError {
    let code = if e.kind() == io::ErrorKind::NotFound {
        StepStatus::FileNotFound
    } else {
        StepStatus::TransferError
    };
    DataError::Failed(code, e.to_string())
}

/// Claim on a transfer key
struct ActiveSlot {
    signal: CancelSignal,
    /// A `run` owns the record, not just a resume
    driving: bool,
}

impl ActiveSlot {
    fn new(driving: bool) -> Self {
        let (signal, _listener) = CancelSignal::pair();
        Self { signal, driving }
    }
}

pub struct RunController {
    config: Arc<EngineConfig>,
    store: Arc<dyn TransferStore>,
    rules: Arc<RuleRegistry>,
    executor: TaskPipelineExecutor,
    active: DashMap<TransferKey, ActiveSlot>,
}

impl RunController {
    pub fn new(
        config: Arc<EngineConfig>,
        store: Arc<dyn TransferStore>,
        rules: Arc<RuleRegistry>,
        catalog: Arc<TaskCatalog>,
    ) -> Self {
        Self {
            executor: TaskPipelineExecutor::new(catalog, Arc::clone(&store)),
            config,
            store,
            rules,
            active: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TransferStore> {
        &self.store
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    /// Claimed by a resume or being driven
    pub fn is_active(&self, key: &TransferKey) -> bool {
        self.active.contains_key(key)
    }

    /// Drop a resume claim that will not be followed by `run`.
    ///
    /// Returns false if there was no claim or the key is being driven.
    pub fn release(&self, key: &TransferKey) -> bool {
        self.active
            .remove_if(key, |_, slot| !slot.driving)
            .is_some()
    }

    /// Validate a request against its rule and store a new record for it.
    ///
    /// A sender works on the file under the rule's send directory, a receiver
    /// on the work file that is finalized after the data phase.
    pub async fn accept_new_transfer(
        &self,
        rule_id: &str,
        is_sender: bool,
        request: TransferRequest,
    ) -> Result<TransferRecord, TransferError> {
        let rule = self.rules.get(rule_id)?;
        let peer = if request.requester == self.config.node_id {
            &request.requested
        } else {
            &request.requester
        };
        if !rule.check_peer_allowed(peer) {
            warn!(rule = %rule.id, peer = %peer, "Transfer refused by rule");
            return Err(TransferError::PeerNotAllowed {
                rule: rule.id.clone(),
                peer: peer.clone(),
            });
        }
        if request.file_name.trim().is_empty() {
            return Err(TransferError::InvalidRequest("empty file name".into()));
        }

        let paths = &self.config.paths;
        let working_file = if is_sender {
            rule.resolve_send_path(paths, &request.file_name)
        } else {
            rule.resolve_work_path(paths, &request.file_name)
        };
        let block_size = request
            .block_size
            .filter(|size| *size > 0)
            .unwrap_or(self.config.transfer.block_size);

        let mut record = TransferRecord::new(
            &self.config.node_id,
            NewTransfer {
                rule_id: rule.id.clone(),
                is_sender,
                requester: request.requester,
                requested: request.requested,
                transfer_id: request.transfer_id,
                file_name: working_file.to_string_lossy().into_owned(),
                file_metadata: request.file_metadata,
                block_size,
                mode: request.mode.unwrap_or(rule.mode),
            },
        );
        record.set_original_file_name(request.file_name);
        self.store.create(&mut record).await?;

        info!(
            transfer = %record.key(),
            rule = %rule.id,
            is_sender,
            file = %record.file_name(),
            "Transfer accepted"
        );
        Ok(record)
    }

    /// Load a stored record and put it back on its last successful phase.
    ///
    /// The key is claimed before anything is read, so concurrent resumes of
    /// one transfer see `AlreadyActive` and the rank rolls back only once.
    /// On success the claim passes to the next `run`.
    pub async fn resume_transfer(&self, key: &TransferKey) -> Result<TransferRecord, TransferError> {
        match self.active.entry(key.clone()) {
            Entry::Occupied(_) => return Err(TransferError::AlreadyActive(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(ActiveSlot::new(false));
            }
        }
        let resumed = self.restart_stored(key).await;
        if resumed.is_err() {
            self.release(key);
        }
        resumed
    }

    async fn restart_stored(&self, key: &TransferKey) -> Result<TransferRecord, TransferError> {
        let mut record = self
            .store
            .select(key)
            .await?
            .ok_or_else(|| TransferError::TransferNotFound(key.to_string()))?;

        if let Err(e) = record.reset_for_restart(false, self.config.transfer.resend_window) {
            if record.is_all_done() && record.lifecycle_status() != LifecycleStatus::Done {
                record.set_lifecycle(LifecycleStatus::Done);
                self.store.update(&mut record).await?;
            }
            return Err(e);
        }
        self.store.update(&mut record).await?;

        info!(
            transfer = %key,
            phase = %record.phase(),
            task_index = record.task_index(),
            rank = record.block_rank(),
            "Transfer resumed"
        );
        Ok(record)
    }

    /// Write one received block at the current rank and count it.
    ///
    /// The rank is persisted every `rank_save_interval` blocks.
    pub async fn deliver_block(
        &self,
        record: &mut TransferRecord,
        block: &[u8],
    ) -> Result<u64, TransferError> {
        if !record.is_in_transfer() {
            return Err(TransferError::WrongPhase {
                expected: TaskStep::TransferTask,
                actual: record.phase(),
            });
        }
        write_block(record, block).await?;
        let rank = record.increment_rank()?;
        self.save_rank(record, rank).await?;
        Ok(rank)
    }

    /// Stop a transfer. An active one is signalled and stops at its next
    /// safe point; an idle stored one is marked interrupted directly.
    ///
    /// Returns false if there was nothing to stop.
    pub async fn request_cancel(
        &self,
        key: &TransferKey,
        reason: CancelReason,
    ) -> Result<bool, TransferError> {
        if let Some(slot) = self.active.get(key) {
            // A claimed but idle record stops at the first boundary of its run
            let sent = slot.signal.cancel(reason);
            info!(
                transfer = %key,
                reason = %reason,
                sent,
                driving = slot.driving,
                "Cancel requested"
            );
            return Ok(sent);
        }

        let Some(mut record) = self.store.select(key).await? else {
            return Ok(false);
        };
        if record.is_finished() {
            return Ok(false);
        }
        self.interrupt(&mut record, reason).await?;
        Ok(true)
    }

    /// Signal every active transfer to stop for shutdown
    pub fn shutdown(&self) -> usize {
        let mut signalled = 0;
        for entry in self.active.iter() {
            if entry.value().signal.cancel(CancelReason::Shutdown) {
                signalled += 1;
            }
        }
        if signalled > 0 {
            info!(count = signalled, "Shutdown signalled to active transfers");
        }
        signalled
    }

    /// Drive a record from its current phase until it completes, fails or is
    /// cancelled. The final state is persisted before this returns.
    pub async fn run(
        &self,
        record: &mut TransferRecord,
        channel: &mut dyn BlockChannel,
    ) -> Result<RunOutcome, TransferError> {
        let key = record.key().clone();
        let mut listener = match self.active.entry(key.clone()) {
            Entry::Occupied(mut claimed) if !claimed.get().driving => {
                claimed.get_mut().driving = true;
                claimed.get().signal.subscribe()
            }
            Entry::Occupied(_) => return Err(TransferError::AlreadyActive(key.to_string())),
            Entry::Vacant(slot) => {
                let slot = slot.insert(ActiveSlot::new(true));
                slot.signal.subscribe()
            }
        };

        let result = self.drive(record, channel, &mut listener).await;
        self.active.remove(&key);

        match &result {
            Ok(outcome) => debug!(transfer = %key, ?outcome, "Run finished"),
            Err(e) => error!(transfer = %key, error = %e, code = e.code(), "Run aborted"),
        }
        result
    }

    /// Put a resumed record back in the queue when it cannot start, e.g.
    /// no connection to its peer. No error tasks run; the cause is kept as
    /// the info status and the resume claim is released.
    pub async fn requeue(
        &self,
        record: &mut TransferRecord,
        cause: StepStatus,
    ) -> Result<(), TransferError> {
        let saved = if record.is_finished() {
            Ok(())
        } else {
            record.set_info_status(cause);
            record.set_lifecycle(LifecycleStatus::ToSubmit);
            self.store.update(record).await
        };
        self.release(record.key());
        saved?;
        info!(transfer = %record.key(), cause = %cause, "Transfer requeued");
        Ok(())
    }

    /// Startup sweeps: resubmit what was running, settle what completed.
    pub async fn startup_sweep(&self) -> Result<(u64, u64), TransferError> {
        let node = &self.config.node_id;
        let resubmitted = self.store.reset_to_submit(node).await?;
        let settled = self.store.change_finished_to_done(node).await?;
        info!(resubmitted, settled, "Startup sweep done");
        Ok((resubmitted, settled))
    }

    /// Read model over every stored record
    pub async fn summaries(&self) -> Result<Vec<TransferSummary>, TransferError> {
        let mut summaries = Vec::new();
        for status in [
            LifecycleStatus::Unknown,
            LifecycleStatus::NotUpdated,
            LifecycleStatus::Interrupted,
            LifecycleStatus::ToSubmit,
            LifecycleStatus::InError,
            LifecycleStatus::Running,
            LifecycleStatus::Done,
        ] {
            for record in self.store.all_matching_lifecycle(status).await? {
                summaries.push(record.summary());
            }
        }
        Ok(summaries)
    }

    fn env<'a>(&'a self, rule: &'a crate::rule::TransferRule) -> PhaseEnv<'a> {
        PhaseEnv {
            rule,
            paths: &self.config.paths,
            node_id: &self.config.node_id,
        }
    }

    async fn drive(
        &self,
        record: &mut TransferRecord,
        channel: &mut dyn BlockChannel,
        cancel: &mut CancelListener,
    ) -> Result<RunOutcome, TransferError> {
        let rule = match self.rules.get(record.rule_id()) {
            Ok(rule) => rule,
            Err(e) => return self.fail_without_rule(record, e).await,
        };
        let env = self.env(&rule);

        loop {
            match record.phase() {
                TaskStep::NoTask => {
                    record.enter_pre_task()?;
                    self.store.update(record).await?;
                    info!(transfer = %record.key(), "Pre-processing started");
                }
                TaskStep::PreTask => {
                    if let Err(e) = self.executor.run_phase(record, &env, cancel).await {
                        return self.after_pipeline_failure(record, &env, e, cancel).await;
                    }
                    if record.is_sender()
                        && !record.mode().is_through()
                        && !file_exists(record.file_name()).await
                    {
                        return self
                            .fail(record, &env, StepStatus::FileNotFound, cancel)
                            .await;
                    }
                    record.enter_transfer_task(record.block_rank())?;
                    self.store.update(record).await?;
                    info!(transfer = %record.key(), rank = record.block_rank(), "Data phase started");
                }
                TaskStep::TransferTask => {
                    let moved = if record.is_sender() {
                        self.send_data(record, channel, cancel).await
                    } else {
                        self.receive_data(record, channel, cancel).await
                    };
                    match moved {
                        Ok(()) => {}
                        Err(DataError::Store(e)) => return Err(e),
                        Err(DataError::Cancelled(reason)) => {
                            self.interrupt(record, reason).await?;
                            return Ok(RunOutcome::Interrupted(reason));
                        }
                        Err(DataError::Failed(code, reason)) => {
                            let rank = record.complete_transfer_task(Err(code))?;
                            warn!(
                                transfer = %record.key(),
                                rank,
                                code = %code,
                                %reason,
                                "Data phase failed"
                            );
                            return self.fail(record, &env, code, cancel).await;
                        }
                    }

                    let rank = record.complete_transfer_task(Ok(()))?;
                    if let Err(code) = self.finalize_received(record, &rule).await {
                        return self.fail(record, &env, code, cancel).await;
                    }
                    record.enter_post_task()?;
                    self.store.update(record).await?;
                    info!(transfer = %record.key(), rank, "Post-processing started");
                }
                TaskStep::PostTask => {
                    if record.task_index() == 0
                        && !record.mode().is_through()
                        && !file_exists(record.file_name()).await
                    {
                        return self
                            .fail(record, &env, StepStatus::FileNotFound, cancel)
                            .await;
                    }
                    if let Err(e) = self.executor.run_phase(record, &env, cancel).await {
                        return self.after_pipeline_failure(record, &env, e, cancel).await;
                    }
                    record.mark_all_done()?;
                    self.store.update(record).await?;
                    info!(
                        transfer = %record.key(),
                        file = %record.file_name(),
                        rank = record.block_rank(),
                        "Transfer done"
                    );
                    return Ok(RunOutcome::Completed);
                }
                TaskStep::AllDone => return Ok(RunOutcome::Completed),
                TaskStep::ErrorTask => {
                    if record.is_finished() {
                        let code = record.step_status();
                        return Ok(match CancelReason::from_step_status(code) {
                            Some(reason) => RunOutcome::Interrupted(reason),
                            None => RunOutcome::Failed(code),
                        });
                    }
                    // Error tasks were cut short, finish them
                    let code = if record.info_status().is_progress() {
                        StepStatus::Internal
                    } else {
                        record.info_status()
                    };
                    return self.fail(record, &env, code, cancel).await;
                }
            }
        }
    }

    async fn after_pipeline_failure(
        &self,
        record: &mut TransferRecord,
        env: &PhaseEnv<'_>,
        failure: PipelineError,
        cancel: &mut CancelListener,
    ) -> Result<RunOutcome, TransferError> {
        match failure {
            PipelineError::Store(e) => Err(e),
            PipelineError::Cancelled { reason, .. } => {
                self.interrupt(record, reason).await?;
                Ok(RunOutcome::Interrupted(reason))
            }
            PipelineError::TaskFailed { code, .. } => self.fail(record, env, code, cancel).await,
        }
    }

    /// Business failure: run the error tasks, then close the record in error
    async fn fail(
        &self,
        record: &mut TransferRecord,
        env: &PhaseEnv<'_>,
        code: StepStatus,
        cancel: &mut CancelListener,
    ) -> Result<RunOutcome, TransferError> {
        record.enter_error_task()?;
        self.store.update(record).await?;

        match self.executor.run_phase(record, env, cancel).await {
            Ok(()) => {}
            Err(PipelineError::Store(e)) => return Err(e),
            Err(e) => warn!(transfer = %record.key(), error = %e, "Error tasks did not complete"),
        }

        record.finish_in_error(code)?;
        self.store.update(record).await?;
        error!(
            transfer = %record.key(),
            code = %code,
            last_successful_phase = %record.last_successful_phase(),
            "Transfer in error"
        );
        Ok(RunOutcome::Failed(code))
    }

    async fn fail_without_rule(
        &self,
        record: &mut TransferRecord,
        cause: TransferError,
    ) -> Result<RunOutcome, TransferError> {
        error!(transfer = %record.key(), rule = %record.rule_id(), "Rule missing for transfer");
        record.enter_error_task()?;
        record.finish_in_error(StepStatus::Internal)?;
        self.store.update(record).await?;
        Err(cause)
    }

    /// Operator or peer stop. A cancelled receiver drops its partial data.
    async fn interrupt(
        &self,
        record: &mut TransferRecord,
        reason: CancelReason,
    ) -> Result<(), TransferError> {
        if reason == CancelReason::Cancelled && !record.is_sender() && !record.file_was_relocated()
        {
            match tokio::fs::remove_file(record.file_name()).await {
                Ok(()) => debug!(file = %record.file_name(), "Partial file removed"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(file = %record.file_name(), error = %e, "Could not remove partial file"),
            }
            record.set_rank_at_startup(0);
        }
        record.interrupt(reason.step_status())?;
        self.store.update(record).await?;
        warn!(
            transfer = %record.key(),
            reason = %reason,
            phase = %record.last_successful_phase(),
            task_index = record.task_index(),
            rank = record.block_rank(),
            "Transfer interrupted"
        );
        Ok(())
    }

    async fn save_rank(&self, record: &mut TransferRecord, rank: u64) -> Result<(), TransferError> {
        if rank % self.config.transfer.rank_save_interval.max(1) == 0 {
            self.store.update(record).await?;
            debug!(transfer = %record.key(), rank, "Rank saved");
        }
        Ok(())
    }

    async fn send_data(
        &self,
        record: &mut TransferRecord,
        channel: &mut dyn BlockChannel,
        cancel: &mut CancelListener,
    ) -> Result<(), DataError> {
        let block_size = record.block_size().max(1) as usize;
        let mut file = File::open(record.file_name()).await.map_err(io_failure)?;
        file.seek(SeekFrom::Start(record.block_rank() * block_size as u64))
            .await
            .map_err(io_failure)?;
        let mut buf = vec![0u8; block_size];

        loop {
            if let Some(reason) = cancel.reason() {
                return Err(DataError::Cancelled(reason));
            }
            let len = read_block(&mut file, &mut buf).await.map_err(io_failure)?;
            if len == 0 {
                return Ok(());
            }
            let rank = record.block_rank();
            let sent = tokio::select! {
                biased;
                reason = cancel.cancelled() => return Err(DataError::Cancelled(reason)),
                sent = channel.send(rank, &buf[..len]) => sent,
            };
            sent.map_err(|code| DataError::Failed(code, format!("block {} not sent", rank)))?;

            let rank = record.increment_rank().map_err(DataError::Store)?;
            self.save_rank(record, rank).await.map_err(DataError::Store)?;
        }
    }

    async fn receive_data(
        &self,
        record: &mut TransferRecord,
        channel: &mut dyn BlockChannel,
        cancel: &mut CancelListener,
    ) -> Result<(), DataError> {
        // Create the work file up front so an empty file still finalizes
        let work = PathBuf::from(record.file_name());
        if let Some(parent) = work.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_failure)?;
        }
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&work)
            .await
            .map_err(io_failure)?;

        loop {
            let received = tokio::select! {
                biased;
                reason = cancel.cancelled() => return Err(DataError::Cancelled(reason)),
                received = channel.receive() => received,
            };
            let block = match received {
                Ok(Some(block)) => block,
                Ok(None) => return Ok(()),
                Err(code) => {
                    return Err(DataError::Failed(
                        code,
                        format!("receive failed at block {}", record.block_rank()),
                    ));
                }
            };
            write_block(record, &block).await.map_err(io_failure)?;
            let rank = record.increment_rank().map_err(DataError::Store)?;
            self.save_rank(record, rank).await.map_err(DataError::Store)?;
        }
    }

    /// Move a fully received work file to its final receive path
    async fn finalize_received(
        &self,
        record: &mut TransferRecord,
        rule: &crate::rule::TransferRule,
    ) -> Result<(), StepStatus> {
        if record.is_sender() || record.mode().is_through() || record.file_was_relocated() {
            return Ok(());
        }
        let work = PathBuf::from(record.file_name());
        let target = rule.resolve_recv_path(&self.config.paths, record.original_file_name());
        match move_file(&work, &target).await {
            Ok(()) => {
                debug!(from = %work.display(), to = %target.display(), "Received file finalized");
                record.set_file_moved(target.to_string_lossy().into_owned(), true);
                Ok(())
            }
            Err(e) => {
                error!(
                    transfer = %record.key(),
                    from = %work.display(),
                    to = %target.display(),
                    error = %e,
                    "Cannot finalize received file"
                );
                Err(StepStatus::FinalOp)
            }
        }
    }
}

async fn file_exists(path: &str) -> bool {
    tokio::fs::try_exists(Path::new(path)).await.unwrap_or(false)
}

async fn write_block(record: &TransferRecord, block: &[u8]) -> io::Result<()> {
    let offset = record.block_rank() * record.block_size() as u64;
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(record.file_name())
        .await?;
    file.seek(SeekFrom::Start(offset)).await?;
    file.write_all(block).await?;
    file.flush().await
}

/// Fill `buf` from `file`, short only at end of file
async fn read_block(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
