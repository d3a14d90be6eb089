//! An in-process reference [`Strategy`] used by this crate's own test suite.
//!
//! `LocalResourceStrategy` has no real resource behind it — "begin" just
//! binds a [`Connection`] into the calling thread's [`crate::registry`]
//! resource slot, and commit/rollback unbind it. It exists purely so the
//! propagation machinery in [`crate::workflow`] can be exercised without a
//! real database or queue driver. Not wired into the public API: a crate
//! consumer is expected to bring their own `Strategy`.

use crate::registry;
use crate::strategy::Strategy;
use std::cell::Cell;
use thiserror::Error;
use txflow_core::Definition;

const CONNECTION_KEY: &str = "txflow.testkit.connection";

/// The thread-local "native resource" `LocalResourceStrategy` binds and
/// unbinds.
#[derive(Debug, Clone)]
struct Connection {
    rollback_only: bool,
    next_savepoint_id: u64,
}

/// The token `LocalResourceStrategy` hands back from `acquire`.
#[derive(Debug)]
pub struct LocalTransaction {
    existing: bool,
}

/// Captured by `suspend`, handed back unchanged to `resume`.
#[derive(Debug)]
pub struct SuspendedResources {
    connection: Connection,
}

/// Opaque savepoint handle for `LocalResourceStrategy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSavepoint(u64);

/// Errors `LocalResourceStrategy` can raise.
#[derive(Debug, Error)]
pub enum LocalError {
    /// A commit, rollback, savepoint, or rollback-only call found no
    /// connection bound in the execution context.
    #[error("no connection bound in the current execution context")]
    NoConnection,
    /// `suspend` was called with nothing bound to suspend.
    #[error("nothing to suspend: no connection is currently bound")]
    NothingToSuspend,
    /// Injected by [`LocalResourceStrategy::fail_next_begin`], to exercise
    /// the engine's failed-begin recovery path.
    #[error("begin failed (injected for testing)")]
    BeginFailed,
}

/// A `Strategy` whose "native resource" is an in-process [`Connection`]
/// bound into the thread-local registry — good enough to exercise every
/// propagation path without a real resource driver.
#[derive(Debug, Default)]
pub struct LocalResourceStrategy {
    fail_next_begin: Cell<bool>,
}

impl LocalResourceStrategy {
    /// Build a fresh strategy with no pending failure injection.
    pub fn new() -> Self {
        LocalResourceStrategy {
            fail_next_begin: Cell::new(false),
        }
    }

    /// Make the next call to `begin` fail with [`LocalError::BeginFailed`],
    /// then clear the flag. Used to exercise invariant R1 (resuming a
    /// suspended outer transaction after a failed begin).
    pub fn fail_next_begin(&self) {
        self.fail_next_begin.set(true);
    }
}

impl Strategy for LocalResourceStrategy {
    type Transaction = LocalTransaction;
    type Resources = SuspendedResources;
    type Savepoint = LocalSavepoint;
    type Error = LocalError;

    fn acquire(&self) -> Result<Self::Transaction, Self::Error> {
        Ok(LocalTransaction {
            existing: registry::has_resource(CONNECTION_KEY),
        })
    }

    fn is_existing(&self, tx: &Self::Transaction) -> bool {
        tx.existing
    }

    fn begin(&self, tx: &mut Self::Transaction, _definition: &Definition) -> Result<(), Self::Error> {
        if self.fail_next_begin.replace(false) {
            return Err(LocalError::BeginFailed);
        }
        registry::bind_resource(
            CONNECTION_KEY,
            Connection {
                rollback_only: false,
                next_savepoint_id: 0,
            },
        );
        tx.existing = true;
        Ok(())
    }

    fn suspend(&self, tx: &mut Self::Transaction) -> Result<Self::Resources, Self::Error> {
        let connection = registry::unbind_resource::<Connection>(CONNECTION_KEY)
            .ok_or(LocalError::NothingToSuspend)?;
        tx.existing = false;
        Ok(SuspendedResources { connection })
    }

    fn resume(&self, tx: &mut Self::Transaction, resources: Self::Resources) -> Result<(), Self::Error> {
        registry::bind_resource(CONNECTION_KEY, resources.connection);
        tx.existing = true;
        Ok(())
    }

    fn commit(&self, tx: &mut Self::Transaction) -> Result<(), Self::Error> {
        registry::unbind_resource::<Connection>(CONNECTION_KEY).ok_or(LocalError::NoConnection)?;
        tx.existing = false;
        Ok(())
    }

    fn rollback(&self, tx: &mut Self::Transaction) -> Result<(), Self::Error> {
        registry::unbind_resource::<Connection>(CONNECTION_KEY).ok_or(LocalError::NoConnection)?;
        tx.existing = false;
        Ok(())
    }

    fn set_rollback_only(&self, tx: &mut Self::Transaction) -> Result<(), Self::Error> {
        debug_assert!(tx.existing);
        registry::with_resource_mut::<Connection, _>(CONNECTION_KEY, |conn| match conn {
            Some(conn) => {
                conn.rollback_only = true;
                Ok(())
            }
            None => Err(LocalError::NoConnection),
        })
    }

    fn is_rollback_only(&self, _tx: &Self::Transaction) -> bool {
        registry::with_resource::<Connection, _>(CONNECTION_KEY, |conn| {
            conn.map(|c| c.rollback_only).unwrap_or(false)
        })
    }

    fn cleanup(&self, tx: &mut Self::Transaction) {
        registry::unbind_resource::<Connection>(CONNECTION_KEY);
        tx.existing = false;
    }

    fn create_savepoint(&self, _tx: &mut Self::Transaction) -> Result<Self::Savepoint, Self::Error> {
        registry::with_resource_mut::<Connection, _>(CONNECTION_KEY, |conn| match conn {
            Some(conn) => {
                let id = conn.next_savepoint_id;
                conn.next_savepoint_id += 1;
                Ok(LocalSavepoint(id))
            }
            None => Err(LocalError::NoConnection),
        })
    }

    fn rollback_to_savepoint(
        &self,
        _tx: &mut Self::Transaction,
        _savepoint: &Self::Savepoint,
    ) -> Result<(), Self::Error> {
        if registry::has_resource(CONNECTION_KEY) {
            Ok(())
        } else {
            Err(LocalError::NoConnection)
        }
    }

    fn release_savepoint(
        &self,
        _tx: &mut Self::Transaction,
        _savepoint: Self::Savepoint,
    ) -> Result<(), Self::Error> {
        if registry::has_resource(CONNECTION_KEY) {
            Ok(())
        } else {
            Err(LocalError::NoConnection)
        }
    }
}
