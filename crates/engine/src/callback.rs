//! User-registered observers of a transaction's lifecycle.

/// The outcome reported to [`SyncCallback::after_completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// The transaction committed.
    Committed,
    /// The transaction rolled back.
    RolledBack,
    /// The engine could not determine the eventual outcome (commonly
    /// because it was only participating in an outer-managed transaction).
    Unknown,
}

/// A synchronization callback: an observer of before/after commit and
/// after-completion events, plus suspend/resume notifications.
///
/// All hooks default to no-ops so implementations only override what they
/// need. Hooks are invoked synchronously, in registration order, from the
/// execution context that owns the transaction — they must not outlive the
/// completion of the scope that registered them.
pub trait SyncCallback {
    /// Called when the transaction is about to be suspended.
    fn suspend(&mut self) {}

    /// Called when a previously suspended transaction is being resumed.
    fn resume(&mut self) {}

    /// Called before commit, with the transaction's read-only flag.
    fn before_commit(&mut self, _read_only: bool) {}

    /// Called before either commit or rollback, regardless of outcome.
    fn before_completion(&mut self) {}

    /// Called after a successful commit, before `after_completion`.
    fn after_commit(&mut self) {}

    /// Called after the transaction has fully completed, whatever the
    /// outcome.
    fn after_completion(&mut self, _status: CompletionStatus) {}

    /// Best-effort flush hook; strategies with nothing to flush leave this
    /// as a no-op.
    fn flush(&mut self) {}
}
