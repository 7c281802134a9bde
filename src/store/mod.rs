//! Transfer Stores
//!
//! One [`TransferStore`] interface with two backends chosen at startup:
//!
//! - [`PgTransferStore`]: PostgreSQL table plus a shared id sequence
//! - [`NoDbTransferStore`]: in-process map, optionally backed by one durable
//!   file per transfer
//!
//! The state machine never knows which backend it runs on.

pub mod identity;
pub mod nodb;
pub mod postgres;
pub mod retry;

pub use identity::{ClockIdAllocator, IdentityAllocator};
pub use nodb::NoDbTransferStore;
pub use postgres::{PgTransferStore, SequenceIdAllocator};
pub use retry::{InsertAttempt, RunnerInsert, insert_with_single_retry};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::StoreConfig;
use crate::db::Database;
use crate::runner::{LifecycleStatus, TransferError, TransferKey, TransferRecord};

/// Persistence operations for transfer records.
///
/// `create` and `update` clear the record's dirty flag on success. Errors are
/// always surfaced: an unsaved transition must not be assumed to have
/// happened.
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Insert a new record, allocating its id if it has none
    async fn create(&self, record: &mut TransferRecord) -> Result<(), TransferError>;

    async fn update(&self, record: &mut TransferRecord) -> Result<(), TransferError>;

    async fn select(&self, key: &TransferKey) -> Result<Option<TransferRecord>, TransferError>;

    async fn exists(&self, key: &TransferKey) -> Result<bool, TransferError>;

    /// Returns whether something was deleted
    async fn delete(&self, key: &TransferKey) -> Result<bool, TransferError>;

    async fn all_matching_lifecycle(
        &self,
        status: LifecycleStatus,
    ) -> Result<Vec<TransferRecord>, TransferError>;

    /// Flip `owner`'s running or interrupted records to `ToSubmit`
    async fn reset_to_submit(&self, owner: &str) -> Result<u64, TransferError>;

    /// Mark `owner`'s completed records `Done`
    async fn change_finished_to_done(&self, owner: &str) -> Result<u64, TransferError>;

    /// Delete finished records last updated before `before`, except those
    /// queued for resubmission
    async fn purge(&self, before: DateTime<Utc>) -> Result<u64, TransferError>;
}

/// Open the backend selected by configuration
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn TransferStore>, TransferError> {
    match &config.postgres_url {
        Some(url) => {
            let db = Database::connect(url, config.max_connections).await?;
            let store = PgTransferStore::new(db.pool().clone());
            store.ensure_schema().await?;
            info!(backend = store.name(), "Transfer store opened");
            Ok(Arc::new(store))
        }
        None => {
            let store = if config.save_runner_without_db {
                let store = NoDbTransferStore::durable(&config.runner_dir).await?;
                store.load_all_from_disk().await?;
                store
            } else {
                NoDbTransferStore::in_memory()
            };
            info!(
                backend = store.name(),
                durable = config.save_runner_without_db,
                "Transfer store opened"
            );
            Ok(Arc::new(store))
        }
    }
}
