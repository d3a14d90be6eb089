//! The mutable handle returned by `get_transaction` and consumed by
//! `commit`/`rollback`.

use crate::callback::SyncCallback;
use crate::strategy::Strategy;
use txflow_core::Isolation;

/// Captured state of a transaction while it is suspended: the resources
/// the strategy handed back, the callback list that was active, and the
/// registry metadata to restore on resume.
///
/// Created by the engine when suspending; consumed exactly once by a
/// matching resume. Ownership transfer (it is only ever produced by
/// [`crate::workflow::WorkflowEngine`] and only ever consumed by
/// `WorkflowEngine::resume`) is what prevents a bundle from being resumed
/// twice — there is no "resume" method that takes `&SuspendedBundle`.
pub struct SuspendedBundle<S: Strategy> {
    pub(crate) resources: Option<S::Resources>,
    pub(crate) callbacks: Vec<Box<dyn SyncCallback>>,
    pub(crate) previous_name: Option<String>,
    pub(crate) previous_isolation: Option<Isolation>,
    pub(crate) previous_read_only: bool,
    pub(crate) previous_actual_active: bool,
    pub(crate) was_active: bool,
}

/// Opaque handle for the savepoint manager side of a `Status`, distinct
/// from the strategy's own `Savepoint` type so a `Status` can report
/// `has_savepoint()` without the caller needing to know the strategy's
/// associated type.
pub(crate) enum SavepointSlot<S: Strategy> {
    None,
    Some(S::Savepoint),
}

impl<S: Strategy> SavepointSlot<S> {
    fn is_some(&self) -> bool {
        matches!(self, SavepointSlot::Some(_))
    }
}

/// Opaque handle to a manually created, mid-transaction savepoint — one
/// taken out via `WorkflowEngine::create_savepoint`, as opposed to the
/// automatic savepoint NESTED propagation attaches to a `Status` (see
/// [`Status::has_savepoint`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavepointHandle(pub(crate) usize);

/// The handle returned by [`crate::workflow::WorkflowEngine::get_transaction`].
///
/// Carries everything the engine needs to commit or roll back later:
/// the strategy's transaction token (absent for a transaction-less,
/// "empty" status), whether this call created a brand-new transaction,
/// whether it owns the synchronization scope, any suspended outer
/// transaction to restore, an optional savepoint, and the rollback-only /
/// completed flags.
pub struct Status<S: Strategy> {
    pub(crate) transaction: Option<S::Transaction>,
    pub(crate) new_transaction: bool,
    pub(crate) new_synchronization: bool,
    pub(crate) read_only: bool,
    pub(crate) suspended: Option<SuspendedBundle<S>>,
    pub(crate) savepoint: SavepointSlot<S>,
    pub(crate) manual_savepoints: Vec<Option<S::Savepoint>>,
    pub(crate) local_rollback_only: bool,
    pub(crate) completed: bool,
    pub(crate) before_completion_invoked: bool,
    pub(crate) debug_name: Option<String>,
    /// Set when this status owns a synchronization scope it stood up for
    /// participation in an existing transaction genuinely owned by
    /// something outside this engine (as opposed to a same-engine
    /// ancestor's `Status`) — `dispatch_after_completion` routes these
    /// through `Strategy::register_after_completion_with_existing_transaction`
    /// instead of reporting an outcome it cannot actually observe.
    pub(crate) delegate_after_completion: bool,
}

impl<S: Strategy> Status<S> {
    pub(crate) fn new(transaction: Option<S::Transaction>, new_transaction: bool) -> Self {
        Status {
            transaction,
            new_transaction,
            new_synchronization: false,
            read_only: false,
            suspended: None,
            savepoint: SavepointSlot::None,
            manual_savepoints: Vec::new(),
            local_rollback_only: false,
            completed: false,
            before_completion_invoked: false,
            debug_name: None,
            delegate_after_completion: false,
        }
    }

    /// Whether this call to `get_transaction` created a brand-new
    /// transaction (as opposed to joining one that already existed).
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    /// Whether a savepoint is attached (NESTED propagation via
    /// `use_savepoint_for_nested`).
    pub fn has_savepoint(&self) -> bool {
        self.savepoint.is_some()
    }

    /// Whether this status owns a live strategy transaction token, as
    /// opposed to being an "empty" status (`SUPPORTS`/`NOT_SUPPORTED`/
    /// `NEVER` with no existing transaction).
    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Mark this transaction rollback-only. Monotonic: there is no way to
    /// clear the flag once set.
    pub fn set_rollback_only(&mut self) {
        self.local_rollback_only = true;
    }

    /// Whether this status (locally) has been marked rollback-only. Does
    /// not reflect a strategy-level global rollback-only marker, which the
    /// engine consults separately via `Strategy::is_rollback_only`.
    pub fn is_rollback_only(&self) -> bool {
        self.local_rollback_only
    }

    /// Whether commit or rollback has already run for this status.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// The diagnostic name this transaction was started with, if any.
    pub fn name(&self) -> Option<&str> {
        self.debug_name.as_deref()
    }

    /// Whether this transaction is read-only.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the strategy currently reports the underlying native
    /// transaction as globally marked rollback-only. `false` for an
    /// "empty" status with no transaction token.
    pub(crate) fn global_rollback_only(&self, strategy: &S) -> bool {
        self.transaction
            .as_ref()
            .map(|tx| strategy.is_rollback_only(tx))
            .unwrap_or(false)
    }
}
