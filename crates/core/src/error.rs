//! Error types for the txflow transaction engine
//!
//! This module defines the error tags the propagation engine can raise. We use
//! `thiserror` for `Display`/`Error` impls, matching the rest of the workspace.
//!
//! ## Error Categories
//!
//! - **Definition misuse**: `InvalidTimeout`
//! - **Propagation misuse**: `IllegalTransactionState`, `NestedNotSupported`
//! - **Strategy limitation**: `SuspensionNotSupported`
//! - **Commit-time surprises**: `UnexpectedRollback`, `HeuristicCompletion`
//! - **Resource driver failures**: `TransactionSystem`

use std::fmt;
use thiserror::Error;

/// Result type alias for txflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the propagation engine.
#[derive(Debug, Error)]
pub enum Error {
    /// `Definition::timeout` was less than `-1`.
    #[error("invalid timeout: {timeout} (must be >= -1)")]
    InvalidTimeout {
        /// The offending timeout value, in seconds.
        timeout: i64,
    },

    /// The caller asked the engine to do something the current context
    /// doesn't permit: MANDATORY with no existing transaction, NEVER with
    /// one, a second commit/rollback on an already-completed `Status`, or
    /// an isolation/read-only mismatch under `validate_existing_transaction`.
    #[error("illegal transaction state: {0}")]
    IllegalTransactionState(String),

    /// NESTED was requested but the strategy supports neither savepoints
    /// nor native nested transactions, or nesting is disabled by policy.
    #[error("nested transactions are not supported")]
    NestedNotSupported,

    /// The strategy was asked to suspend a transaction it cannot suspend.
    #[error("transaction suspension is not supported by this strategy")]
    SuspensionNotSupported,

    /// A commit silently converted to a rollback because the transaction
    /// (or an ancestor) had been marked rollback-only.
    #[error("transaction silently rolled back because it was marked rollback-only")]
    UnexpectedRollback,

    /// Reserved for strategies backed by a distributed coordinator that
    /// decided the outcome heuristically (partial commit/rollback).
    #[error("transaction completion was decided heuristically: {0}")]
    HeuristicCompletion(String),

    /// Generic bucket for strategy-reported failures: a failed begin,
    /// commit, rollback, suspend, or resume against the underlying resource.
    #[error("transaction system error: {source}")]
    TransactionSystem {
        /// The strategy's own error, boxed so the engine stays generic over it.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    /// Wrap an arbitrary strategy error as a [`Error::TransactionSystem`].
    ///
    /// Kept as a free function rather than a blanket `From` impl: a blanket
    /// `impl<E: std::error::Error> From<E> for Error` would collide with the
    /// standard library's reflexive `From<T> for T`, since `Error` itself
    /// implements `std::error::Error`.
    pub fn from_strategy<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::TransactionSystem {
            source: Box::new(source),
        }
    }

    /// True for errors that mean "the transaction did not commit as asked,
    /// but no resource-level failure occurred" — callers commonly treat
    /// this differently from a hard `TransactionSystem` failure.
    pub fn is_unexpected_rollback(&self) -> bool {
        matches!(self, Error::UnexpectedRollback)
    }

    /// True for API-misuse errors raised before any strategy call was made.
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Error::IllegalTransactionState(_))
    }
}

/// Lightweight stand-in strategy error for tests and documentation examples
/// that don't need a real resource driver.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StubStrategyError(pub String);

impl StubStrategyError {
    /// Build a stub error from anything displayable.
    pub fn new(msg: impl fmt::Display) -> Self {
        StubStrategyError(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_timeout_display() {
        let err = Error::InvalidTimeout { timeout: -2 };
        assert!(err.to_string().contains("-2"));
    }

    #[test]
    fn from_strategy_wraps_source() {
        let err = Error::from_strategy(StubStrategyError::new("disk full"));
        assert!(matches!(err, Error::TransactionSystem { .. }));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn is_unexpected_rollback_only_matches_that_variant() {
        assert!(Error::UnexpectedRollback.is_unexpected_rollback());
        assert!(!Error::NestedNotSupported.is_unexpected_rollback());
    }
}
