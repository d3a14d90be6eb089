//! Propagation engine for txflow
//!
//! This crate implements the transaction-propagation state machine:
//! - [`Strategy`]: the seam to a real resource driver
//! - [`registry`]: execution-context-local synchronization state
//! - [`Status`]: the handle `WorkflowEngine::get_transaction` returns
//! - [`WorkflowEngine`]: the propagation decision machine, commit/rollback
//!   sequencing, and suspend/resume discipline
//! - [`EngineConfig`]: policy knobs governing the above
//! - [`SyncCallback`]: the hook implementors attach to a transaction's
//!   lifecycle
//!
//! `txflow-core` defines what a transaction *is* (propagation, isolation,
//! errors); this crate defines how one actually gets begun, suspended,
//! nested, and completed.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod callback;
pub mod config;
pub mod registry;
pub mod status;
pub mod strategy;
pub mod testkit;
pub mod workflow;

pub use callback::{CompletionStatus, SyncCallback};
pub use config::{EngineConfig, SyncMode};
pub use status::{SavepointHandle, Status, SuspendedBundle};
pub use strategy::Strategy;
pub use workflow::WorkflowEngine;
