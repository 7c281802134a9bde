//! Transfer Runner State
//!
//! The persisted progress of one transfer and the phase state machine that
//! drives it.
//!
//! # State Machine
//!
//! ```text
//! NOTASK → PRETASK → TRANSFERTASK → POSTTASK → ALLDONETASK
//!             ↓            ↓            ↓
//!             └────────→ ERRORTASK ←────┘
//! ```
//!
//! # Invariants
//!
//! 1. **Forward only**: `phase` never moves back except through
//!    `reset_for_restart`, which returns to `last_successful_phase`
//! 2. **Terminal Done**: once `AllDone`, every mutation is rejected
//! 3. **Rank only lowers on resume**: `block_rank` grows one block at a time
//!    and is only lowered by an explicit resume or restart

pub mod error;
pub mod state;
pub mod status;
pub mod types;

pub use error::TransferError;
pub use state::TaskStep;
pub use status::{LifecycleStatus, StepStatus};
pub use types::{NewTransfer, TransferKey, TransferMode, TransferRecord, TransferSummary};
