//! Recovery Worker
//!
//! Background worker that picks up transfers queued for resubmission and
//! drives them again from their last successful phase.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::cancel::CancelListener;
use super::channel::ChannelProvider;
use super::run_controller::{RunController, RunOutcome};
use crate::config::WorkerSettings;
use crate::runner::{LifecycleStatus, TransferError};

/// Configuration for the recovery worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to scan for queued transfers
    pub scan_interval: Duration,
    /// Maximum transfers to resume per scan
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            batch_size: 100,
        }
    }
}

impl From<&WorkerSettings> for WorkerConfig {
    fn from(settings: &WorkerSettings) -> Self {
        Self {
            scan_interval: Duration::from_secs(settings.scan_interval_secs.max(1)),
            batch_size: settings.batch_size.max(1),
        }
    }
}

/// Scan result counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub found: usize,
    pub completed: usize,
    pub failed: usize,
    pub interrupted: usize,
    /// Could not open a channel; back in the queue for the next scan
    pub requeued: usize,
    pub skipped: usize,
}

pub struct RecoveryWorker {
    controller: Arc<RunController>,
    channels: Arc<dyn ChannelProvider>,
    config: WorkerConfig,
}

impl RecoveryWorker {
    pub fn new(
        controller: Arc<RunController>,
        channels: Arc<dyn ChannelProvider>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            controller,
            channels,
            config,
        }
    }

    /// Scan until `stop` fires
    pub async fn run(&self, mut stop: CancelListener) {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Starting recovery worker"
        );

        loop {
            if let Err(e) = self.scan_and_recover().await {
                error!(error = %e, "Recovery scan failed");
            }

            tokio::select! {
                reason = stop.cancelled() => {
                    info!(reason = %reason, "Recovery worker stopped");
                    return;
                }
                _ = tokio::time::sleep(self.config.scan_interval) => {}
            }
        }
    }

    /// Resume one batch of queued transfers and wait for them to settle
    pub async fn scan_and_recover(&self) -> Result<ScanReport, TransferError> {
        let node = self.controller.node_id().to_string();
        let queued: Vec<_> = self
            .controller
            .store()
            .all_matching_lifecycle(LifecycleStatus::ToSubmit)
            .await?
            .into_iter()
            .filter(|record| record.key().owner == node)
            .take(self.config.batch_size)
            .collect();

        let mut report = ScanReport {
            found: queued.len(),
            ..ScanReport::default()
        };
        if queued.is_empty() {
            debug!("No queued transfers found");
            return Ok(report);
        }
        info!(count = queued.len(), "Found queued transfers to resume");

        let mut running = Vec::new();
        for queued_record in queued {
            let key = queued_record.key().clone();
            let mut record = match self.controller.resume_transfer(&key).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(transfer = %key, error = %e, "Transfer not resumable");
                    report.skipped += 1;
                    continue;
                }
            };

            let controller = Arc::clone(&self.controller);
            let channels = Arc::clone(&self.channels);
            running.push(tokio::spawn(async move {
                match channels.open(&record).await {
                    Ok(mut channel) => controller
                        .run(&mut record, channel.as_mut())
                        .await
                        .map(Some),
                    Err(code) => {
                        warn!(transfer = %key, code = %code, "No connection for transfer");
                        controller.requeue(&mut record, code).await.map(|_| None)
                    }
                }
            }));
        }

        for joined in futures::future::join_all(running).await {
            match joined {
                Ok(Ok(Some(RunOutcome::Completed))) => report.completed += 1,
                Ok(Ok(Some(RunOutcome::Failed(_)))) => report.failed += 1,
                Ok(Ok(Some(RunOutcome::Interrupted(_)))) => report.interrupted += 1,
                Ok(Ok(None)) => report.requeued += 1,
                Ok(Err(e)) => {
                    error!(error = %e, "Failed to recover transfer");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "Recovery task panicked");
                    report.failed += 1;
                }
            }
        }

        info!(
            completed = report.completed,
            failed = report.failed,
            interrupted = report.interrupted,
            requeued = report.requeued,
            skipped = report.skipped,
            "Recovery scan done"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, PathsConfig};
    use crate::controller::channel::{BlockChannel, MpscChannel, NoTransport};
    use crate::rule::{RuleRegistry, TransferRule};
    use crate::runner::{StepStatus, TaskStep, TransferMode, TransferRecord};
    use crate::store::{NoDbTransferStore, TransferStore};
    use crate::task::mock::{TaskProbe, mock_catalog};
    use crate::controller::run_controller::TransferRequest;
    use async_trait::async_trait;

    /// Peer that has nothing more to send
    struct Drained;

    #[async_trait]
    impl ChannelProvider for Drained {
        async fn open(
            &self,
            _record: &TransferRecord,
        ) -> Result<Box<dyn BlockChannel>, StepStatus> {
            let (channel, _peer) = MpscChannel::pair(1);
            Ok(Box::new(channel))
        }
    }

    fn controller(name: &str) -> (Arc<RunController>, Arc<NoDbTransferStore>, std::path::PathBuf) {
        let dir = std::path::PathBuf::from(format!("target/test_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let mut config = EngineConfig::for_node("local");
        config.paths = PathsConfig::under(&dir);
        let store = Arc::new(NoDbTransferStore::in_memory());
        let controller = Arc::new(RunController::new(
            Arc::new(config),
            store.clone(),
            Arc::new(RuleRegistry::from_rules([TransferRule::new(
                "in",
                TransferMode::Recv,
            )])),
            Arc::new(mock_catalog(TaskProbe::new())),
        ));
        (controller, store, dir)
    }

    async fn queued(controller: &RunController, store: &NoDbTransferStore, name: &str) -> TransferRecord {
        let mut record = controller
            .accept_new_transfer(
                "in",
                false,
                TransferRequest {
                    requester: "partner".into(),
                    requested: "local".into(),
                    file_name: name.into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        record.enter_pre_task().unwrap();
        store.update(&mut record).await.unwrap();
        store.reset_to_submit("local").await.unwrap();
        record
    }

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.scan_interval, Duration::from_secs(30));
        assert_eq!(config.batch_size, 100);
    }

    #[tokio::test]
    async fn test_scan_resumes_queued_transfers() {
        let (controller, store, dir) = controller("worker_resume");
        let record = queued(&controller, &store, "a.txt").await;

        let worker = RecoveryWorker::new(controller, Arc::new(Drained), WorkerConfig::default());
        let report = worker.scan_and_recover().await.unwrap();
        assert_eq!(report.found, 1);
        assert_eq!(report.completed, 1);

        let stored = store.select(record.key()).await.unwrap().unwrap();
        assert_eq!(stored.phase(), TaskStep::AllDone);
        assert_eq!(stored.lifecycle_status(), LifecycleStatus::Done);

        let again = worker.scan_and_recover().await.unwrap();
        assert_eq!(again.found, 0);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_scan_without_transport_requeues_transfer() {
        let (controller, store, dir) = controller("worker_notransport");
        let record = queued(&controller, &store, "b.txt").await;

        let worker = RecoveryWorker::new(
            controller.clone(),
            Arc::new(NoTransport),
            WorkerConfig::default(),
        );
        let report = worker.scan_and_recover().await.unwrap();
        assert_eq!(report.found, 1);
        assert_eq!(report.requeued, 1);
        assert_eq!(report.failed, 0);

        let stored = store.select(record.key()).await.unwrap().unwrap();
        assert_eq!(stored.info_status(), StepStatus::ConnectionImpossible);
        assert_eq!(stored.lifecycle_status(), LifecycleStatus::ToSubmit);
        assert_ne!(stored.phase(), TaskStep::ErrorTask);
        assert!(!stored.is_finished());
        assert!(!controller.is_active(record.key()));

        // Still picked up once a connection may exist
        let again = worker.scan_and_recover().await.unwrap();
        assert_eq!(again.found, 1);
        assert_eq!(again.requeued, 1);

        let worker = RecoveryWorker::new(controller, Arc::new(Drained), WorkerConfig::default());
        let report = worker.scan_and_recover().await.unwrap();
        assert_eq!(report.completed, 1);
        let stored = store.select(record.key()).await.unwrap().unwrap();
        assert_eq!(stored.lifecycle_status(), LifecycleStatus::Done);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_run_stops_on_signal() {
        let (controller, _store, _dir) = controller("worker_stop");
        let worker = RecoveryWorker::new(
            controller,
            Arc::new(NoTransport),
            WorkerConfig {
                scan_interval: Duration::from_secs(3600),
                batch_size: 1,
            },
        );
        let (signal, listener) = crate::controller::cancel::CancelSignal::pair();
        signal.cancel(crate::controller::cancel::CancelReason::Shutdown);
        tokio::time::timeout(Duration::from_secs(1), worker.run(listener))
            .await
            .unwrap();
    }
}
