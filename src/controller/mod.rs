//! Transfer Control
//!
//! The layer between the session/transport layer and the core: it decides
//! which phase runs next, owns cancellation of in-flight transfers and
//! resubmits transfers left over from a previous run.

pub mod cancel;
pub mod channel;
pub mod run_controller;
pub mod worker;

pub use cancel::{CancelListener, CancelReason, CancelSignal};
pub use channel::{BlockChannel, ChannelProvider, MpscChannel, MpscPeer, NoTransport};
pub use run_controller::{RunController, RunOutcome, TransferRequest};
pub use worker::{RecoveryWorker, ScanReport, WorkerConfig};
