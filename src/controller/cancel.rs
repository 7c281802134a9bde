//! Cancellation signal for a driven transfer.
//!
//! Built on a `watch` channel so a request made while a task is in flight is
//! observed both by the pipeline's `select!` and by later boundary checks.
//! The first reason wins.

use std::fmt;

use tokio::sync::watch;

use crate::runner::StepStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// Operator stop, resumable later
    Stopped,
    /// Operator or peer abort, partial data is discarded
    Cancelled,
    /// Node shutting down
    Shutdown,
}

impl CancelReason {
    pub fn step_status(&self) -> StepStatus {
        match self {
            CancelReason::Stopped => StepStatus::StoppedTransfer,
            CancelReason::Cancelled => StepStatus::CanceledTransfer,
            CancelReason::Shutdown => StepStatus::Shutdown,
        }
    }

    pub fn from_step_status(code: StepStatus) -> Option<Self> {
        match code {
            StepStatus::StoppedTransfer => Some(CancelReason::Stopped),
            StepStatus::CanceledTransfer => Some(CancelReason::Cancelled),
            StepStatus::Shutdown => Some(CancelReason::Shutdown),
            _ => None,
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CancelReason::Stopped => "STOPPED",
            CancelReason::Cancelled => "CANCELLED",
            CancelReason::Shutdown => "SHUTDOWN",
        };
        write!(f, "{}", s)
    }
}

/// Sending half, held by whoever may stop the transfer
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: watch::Sender<Option<CancelReason>>,
}

/// Receiving half, held by the driver
#[derive(Debug, Clone)]
pub struct CancelListener {
    rx: watch::Receiver<Option<CancelReason>>,
}

impl CancelSignal {
    pub fn pair() -> (CancelSignal, CancelListener) {
        let (tx, rx) = watch::channel(None);
        (CancelSignal { tx }, CancelListener { rx })
    }

    /// Request cancellation. Returns false if a reason was already set.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        })
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> CancelListener {
        CancelListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelListener {
    /// Listener that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(None);
        Self { rx }
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.rx.borrow()
    }

    /// Resolve once a reason is set. Pending forever if the signal is dropped
    /// without one.
    pub async fn cancelled(&mut self) -> CancelReason {
        loop {
            if let Some(reason) = *self.rx.borrow_and_update() {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
