//! The `Strategy` contract: the only seam between the propagation engine and
//! a concrete resource driver.
//!
//! The engine never speaks to a database, queue, or connection pool
//! directly — it speaks to whatever implements this trait. Everything the
//! engine treats as opaque (the transaction token, suspended resources, a
//! savepoint) is an associated type here, so `WorkflowEngine<S>` is
//! monomorphized per strategy rather than going through a trait object.

use crate::callback::SyncCallback;
use txflow_core::Definition;

/// Pluggable begin/commit/rollback/suspend/resume primitives over a real
/// transactional resource.
///
/// Implementations are expected to bind their own native resource (a
/// connection, a session, a coordinator handle) into the current execution
/// context — conventionally via [`crate::registry`]'s resource slots, though
/// that is a convenience, not a requirement of the trait.
pub trait Strategy {
    /// The opaque token representing a binding to the native resource. May
    /// be "new" (created this call) or "existing" (already bound).
    type Transaction;

    /// Opaque state captured by [`Strategy::suspend`] and handed back to
    /// [`Strategy::resume`] unchanged.
    type Resources;

    /// Opaque handle for an intra-transaction savepoint.
    type Savepoint;

    /// The strategy's own error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Return a token reflecting any currently bound resource in the
    /// execution context, or a fresh (unbound) token.
    fn acquire(&self) -> Result<Self::Transaction, Self::Error>;

    /// True iff `tx` is currently bound to a live native transaction.
    fn is_existing(&self, tx: &Self::Transaction) -> bool;

    /// Start a native transaction: apply isolation and read-only, arm the
    /// timeout, and bind the resource to the execution context.
    ///
    /// On failure, the strategy must leave no binding behind.
    fn begin(&self, tx: &mut Self::Transaction, definition: &Definition) -> Result<(), Self::Error>;

    /// Unbind the current resource and return an opaque handle sufficient
    /// to restore it later. May fail if the strategy cannot suspend.
    fn suspend(&self, tx: &mut Self::Transaction) -> Result<Self::Resources, Self::Error>;

    /// Re-bind a previously suspended resource.
    fn resume(&self, tx: &mut Self::Transaction, resources: Self::Resources) -> Result<(), Self::Error>;

    /// Commit the native transaction. After this returns, the binding must
    /// be released.
    fn commit(&self, tx: &mut Self::Transaction) -> Result<(), Self::Error>;

    /// Roll back the native transaction. After this returns, the binding
    /// must be released.
    fn rollback(&self, tx: &mut Self::Transaction) -> Result<(), Self::Error>;

    /// Mark the native transaction so any later commit converts to a
    /// rollback.
    fn set_rollback_only(&self, tx: &mut Self::Transaction) -> Result<(), Self::Error>;

    /// Whether the native transaction is currently marked rollback-only.
    fn is_rollback_only(&self, tx: &Self::Transaction) -> bool;

    /// Always called after completion (commit or rollback, success or
    /// failure); releases holder state regardless of outcome.
    fn cleanup(&self, tx: &mut Self::Transaction);

    /// Create a savepoint on the current native transaction.
    fn create_savepoint(&self, tx: &mut Self::Transaction) -> Result<Self::Savepoint, Self::Error>;

    /// Roll back to a previously created savepoint without aborting the
    /// whole transaction.
    fn rollback_to_savepoint(
        &self,
        tx: &mut Self::Transaction,
        savepoint: &Self::Savepoint,
    ) -> Result<(), Self::Error>;

    /// Release a savepoint, typically as part of a successful commit.
    fn release_savepoint(
        &self,
        tx: &mut Self::Transaction,
        savepoint: Self::Savepoint,
    ) -> Result<(), Self::Error>;

    /// Governs NESTED semantics: when true, NESTED creates a savepoint on
    /// the existing transaction; when false, the strategy is expected to
    /// detect and nest a native transaction inside `begin`.
    ///
    /// Default: `true`, since most resources (any SQL database) support
    /// savepoints and few support genuine nested native transactions.
    fn use_savepoint_for_nested(&self) -> bool {
        true
    }

    /// Lets strategies backed by a coordinator that tolerates rollback-only
    /// markers (e.g. a distributed transaction manager) still receive
    /// commit calls even when the transaction is marked rollback-only.
    ///
    /// Default: `false` — a rollback-only marker always wins.
    fn should_commit_on_global_rollback_only(&self) -> bool {
        false
    }

    /// Whether this strategy wants to be told about `afterCompletion` for
    /// transactions it doesn't own the commit/rollback of (the engine is
    /// only participating in an outer-managed transaction).
    ///
    /// Default: `false`. The engine then invokes the callbacks immediately
    /// with [`crate::callback::CompletionStatus::Unknown`], since it
    /// genuinely cannot know the eventual outcome.
    fn supports_after_completion_delegation(&self) -> bool {
        false
    }

    /// Take ownership of `callbacks` and fire `after_completion` on them
    /// once the outer-managed transaction this strategy doesn't control
    /// actually completes. Only called when
    /// [`Strategy::supports_after_completion_delegation`] returns `true`.
    fn register_after_completion_with_existing_transaction(
        &self,
        tx: &mut Self::Transaction,
        callbacks: Vec<Box<dyn SyncCallback>>,
    ) {
        let _ = (tx, callbacks);
    }
}
