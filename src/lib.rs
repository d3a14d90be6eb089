//! # txflow
//!
//! A generic transaction-propagation and synchronization engine — the
//! `REQUIRED`/`REQUIRES_NEW`/`NESTED`/… propagation table, suspend/resume,
//! and commit/rollback sequencing, decoupled from any particular resource
//! driver.
//!
//! txflow does not talk to a database, queue, or coordinator itself. It
//! defines a [`Strategy`] trait for that, and drives it according to the
//! propagation and isolation semantics requested on a [`Definition`].
//!
//! # Quick start
//!
//! ```ignore
//! use txflow::{Definition, EngineConfig, Propagation, WorkflowEngine};
//!
//! // `MyStrategy` binds to a real resource driver and implements `Strategy`.
//! let engine = WorkflowEngine::new(MyStrategy::new(), EngineConfig::default());
//!
//! let status = engine
//!     .get_transaction(&Definition::new().with_propagation(Propagation::Required))
//!     .unwrap();
//! engine.commit(status).unwrap();
//! ```
//!
//! # Layout
//!
//! - `txflow-core`: [`Definition`], [`Propagation`], [`Isolation`], [`Error`] —
//!   the data that means something outside any one `Strategy`.
//! - `txflow-engine`: [`Strategy`], the execution-context-local registry,
//!   [`Status`], and [`WorkflowEngine`] itself.
//! - `txflow-api`: [`TransactionTemplate`], a callback-style convenience
//!   layer built on top of `WorkflowEngine`.
//!
//! A real `Strategy` implementation (the seam to an actual database,
//! message queue, or distributed coordinator) is the responsibility of the
//! host application — txflow provides none of its own.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use txflow_api::*;
pub use txflow_core::{Definition, Error, Isolation, Propagation, Result, TIMEOUT_DEFAULT};
pub use txflow_engine::{
    CompletionStatus, EngineConfig, SavepointHandle, Status, Strategy, SuspendedBundle,
    SyncCallback, SyncMode, WorkflowEngine,
};

// `txflow_engine::testkit` is a reference `Strategy` used by this workspace's
// own test suites only — it is deliberately not re-exported here. A real
// application brings its own `Strategy` bound to its own resource driver.
