//! Callback-style facade over the txflow propagation engine
//!
//! `txflow-engine` exposes `get_transaction`/`commit`/`rollback` as three
//! separate calls a caller must pair up correctly, including on every error
//! and panic exit. This crate adds one convenience on top:
//!
//! - [`TransactionTemplate`]: run a closure inside a transaction, committing
//!   on success and rolling back on error or panic.
//!
//! Nothing here is required to use txflow — `txflow-engine::WorkflowEngine`
//! remains the full, lower-level API this crate is built from.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod template;

pub use template::{TemplateError, TransactionStatusHandle, TransactionTemplate};
