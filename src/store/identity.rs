//! Transfer id allocation.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use crate::runner::TransferError;

/// Issues transfer ids. Never returns the same value twice for one node.
#[async_trait]
pub trait IdentityAllocator: Send + Sync {
    async fn next_id(&self) -> Result<i64, TransferError>;
}

/// Wall-clock milliseconds with a watermark, for running without a database.
///
/// Two calls in the same millisecond still get increasing values.
#[derive(Debug, Default)]
pub struct ClockIdAllocator {
    last: AtomicI64,
}

impl ClockIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails once the watermark reaches `i64::MAX`
    pub fn next(&self) -> Result<i64, TransferError> {
        let now = Utc::now().timestamp_millis();
        let mut issued = now;
        self.last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                issued = last.checked_add(1)?.max(now);
                Some(issued)
            })
            .map(|_| issued)
            .map_err(|last| {
                TransferError::IdentityConflict(format!("transfer id space exhausted after {last}"))
            })
    }

    /// Keep future ids above one already in use, e.g. after a reload
    pub fn observe(&self, id: i64) {
        self.last.fetch_max(id, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityAllocator for ClockIdAllocator {
    async fn next_id(&self) -> Result<i64, TransferError> {
        self.next()
    }
}
