//! mft_engine - Managed File-Transfer Engine
//!
//! Drives point-to-point file transfers through their phases, runs the
//! rule-configured task pipeline at each phase boundary and persists
//! progress so an interrupted transfer resumes where it stopped.
//!
//! # Modules
//!
//! - [`runner`] - Transfer record and its phase state machine
//! - [`rule`] - Transfer rules: peers, paths and per-phase task lists
//! - [`task`] - Task kinds, the task catalog and the pipeline executor
//! - [`store`] - Transfer stores (PostgreSQL or map + runner files) and id allocation
//! - [`controller`] - Run controller, cancellation and the recovery worker
//! - [`config`] - YAML engine configuration
//! - [`logging`] - tracing setup
//! - [`db`] - PostgreSQL pool

pub mod config;
pub mod db;
pub mod logging;

pub mod controller;
pub mod rule;
pub mod runner;
pub mod store;
pub mod task;

pub use config::EngineConfig;
pub use controller::{RunController, RunOutcome, TransferRequest};
pub use rule::{RuleRegistry, TransferRule};
pub use runner::{TransferError, TransferKey, TransferRecord};
pub use store::TransferStore;
pub use task::{TaskCatalog, TaskPipelineExecutor};
