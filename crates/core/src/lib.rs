//! Core types shared by the txflow transaction engine
//!
//! This crate defines the data that is meaningful outside of any single
//! strategy implementation:
//!
//! - [`Definition`]: the immutable declaration of propagation, isolation,
//!   timeout, read-only, and name a caller asks for.
//! - [`Propagation`] / [`Isolation`]: the enums `Definition` is built from.
//! - [`Error`] / [`Result`]: the error hierarchy the engine raises.
//!
//! Nothing in this crate knows how to talk to a real resource — that is the
//! job of a `Strategy` implementation, defined in `txflow-engine`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod definition;
pub mod error;
pub mod isolation;
pub mod propagation;

pub use definition::{Definition, TIMEOUT_DEFAULT};
pub use error::{Error, Result, StubStrategyError};
pub use isolation::Isolation;
pub use propagation::Propagation;
