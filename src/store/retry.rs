//! Insert with a single bounded retry on id conflict.
//!
//! When the insert hits a uniqueness conflict, the id is moved past the
//! highest one stored for the same owner/requester/requested triple, the
//! shared sequence is advanced past it, and the insert is tried exactly once
//! more. A second conflict is fatal for that creation attempt.

use async_trait::async_trait;
use tracing::warn;

use crate::runner::{TransferError, TransferRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertAttempt {
    Inserted,
    Conflict,
}

/// Backend operations the retry helper needs
#[async_trait]
pub trait RunnerInsert: Send + Sync {
    async fn next_id(&self) -> Result<i64, TransferError>;

    async fn try_insert(&self, record: &TransferRecord) -> Result<InsertAttempt, TransferError>;

    /// Highest id stored for the record's owner/requester/requested triple
    async fn max_id_for(&self, record: &TransferRecord) -> Result<Option<i64>, TransferError>;

    /// Make the shared sequence return at least `next` from now on
    async fn advance_sequence(&self, next: i64) -> Result<(), TransferError>;
}

pub async fn insert_with_single_retry<T>(
    table: &T,
    record: &mut TransferRecord,
) -> Result<(), TransferError>
where
    T: RunnerInsert + ?Sized,
{
    if !record.key().is_assigned() {
        let id = table.next_id().await?;
        record.assign_id(id);
    }

    if table.try_insert(record).await? == InsertAttempt::Inserted {
        record.mark_saved();
        return Ok(());
    }

    let max = table
        .max_id_for(record)
        .await?
        .ok_or_else(|| TransferError::IdentityConflict(record.key().to_string()))?;
    let retry_id = max + 1;
    warn!(
        conflicting_id = record.transfer_id(),
        retry_id,
        "Transfer id conflict, retrying insert once"
    );
    record.assign_id(retry_id);
    table.advance_sequence(retry_id + 1).await?;

    match table.try_insert(record).await? {
        InsertAttempt::Inserted => {
            record.mark_saved();
            Ok(())
        }
        InsertAttempt::Conflict => Err(TransferError::IdentityConflict(record.key().to_string())),
    }
}
