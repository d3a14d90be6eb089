//! The propagation decision machine itself.
//!
//! [`WorkflowEngine`] is the only place in the crate that combines the
//! other four pieces (`Strategy`, `registry`, `Status`, `EngineConfig`)
//! into behavior: `get_transaction` picks a cell of the propagation table
//! in §4.3 of the specification this engine implements, `commit`/`rollback`
//! drive the matching completion sequence in §4.4/§4.5, and the private
//! suspend/resume helpers enforce the discipline in §4.6.

use crate::callback::CompletionStatus;
use crate::config::{EngineConfig, SyncMode};
use crate::registry;
use crate::status::{SavepointHandle, SavepointSlot, Status, SuspendedBundle};
use crate::strategy::Strategy;
use std::borrow::Cow;
use txflow_core::{Definition, Error, Propagation, Result, TIMEOUT_DEFAULT};

/// The propagation workflow engine.
///
/// Generic over a single [`Strategy`] implementation — monomorphized, not a
/// trait object, so the strategy's `Transaction`/`Resources`/`Savepoint`
/// associated types never need downcasting. `EngineConfig` is set once at
/// construction and read-only for the engine's lifetime.
pub struct WorkflowEngine<S: Strategy> {
    strategy: S,
    config: EngineConfig,
}

impl<S: Strategy> WorkflowEngine<S> {
    /// Build an engine over `strategy`, governed by `config`.
    pub fn new(strategy: S, config: EngineConfig) -> Self {
        WorkflowEngine { strategy, config }
    }

    /// Borrow the underlying strategy, e.g. for diagnostics.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Borrow the engine's policy configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- get_transaction -------------------------------------------------

    /// Decide, per `definition`'s propagation mode and whatever transaction
    /// (if any) is already bound to the calling execution context, whether
    /// to begin, join, suspend-and-replace, or nest — and return the
    /// resulting handle.
    pub fn get_transaction(&self, definition: &Definition) -> Result<Status<S>> {
        definition.validate()?;

        let tx = self.strategy.acquire().map_err(Error::from_strategy)?;
        let existing = self.strategy.is_existing(&tx);

        tracing::debug!(
            propagation = ?definition.propagation(),
            existing,
            name = ?definition.name(),
            "deciding transaction propagation"
        );

        if existing {
            self.handle_existing_transaction(tx, definition)
        } else {
            self.handle_no_existing_transaction(tx, definition)
        }
    }

    /// Resolve `definition`'s timeout against `config.default_timeout`:
    /// a `Definition` left at the `-1` sentinel borrows the engine's
    /// configured default instead; anything else passes through unchanged.
    /// Returns a `Cow` so the common case (a caller who already set an
    /// explicit timeout) costs no clone.
    fn effective_definition<'d>(&self, definition: &'d Definition) -> Cow<'d, Definition> {
        if definition.timeout() == TIMEOUT_DEFAULT && self.config.default_timeout != TIMEOUT_DEFAULT {
            Cow::Owned(definition.clone().with_timeout(self.config.default_timeout))
        } else {
            Cow::Borrowed(definition)
        }
    }

    fn handle_no_existing_transaction(&self, mut tx: S::Transaction, definition: &Definition) -> Result<Status<S>> {
        use Propagation::*;
        match definition.propagation() {
            Mandatory => Err(Error::IllegalTransactionState(
                "MANDATORY propagation requires an existing transaction, but none is active"
                    .to_string(),
            )),

            Required | RequiresNew | Nested => {
                // No actual transaction is active, so suspending only ever
                // touches synchronizations (if some transaction-less scope
                // had activated them), never the strategy.
                let suspended = self.suspend_current(None)?;
                let effective = self.effective_definition(definition);

                match self.strategy.begin(&mut tx, &effective).map_err(Error::from_strategy) {
                    Ok(()) => {
                        self.install_registry_for_new(definition);
                        let mut status = Status::new(Some(tx), true);
                        status.read_only = definition.read_only();
                        status.debug_name = definition.name().map(String::from);
                        status.new_synchronization = true;
                        status.suspended = suspended;
                        Ok(status)
                    }
                    Err(begin_err) => {
                        let err = self.recover_from_failed_begin(&mut tx, suspended, begin_err);
                        self.strategy.cleanup(&mut tx);
                        Err(err)
                    }
                }
            }

            Supports | NotSupported | Never => {
                if !definition.isolation().is_default() {
                    tracing::warn!(
                        isolation = ?definition.isolation(),
                        "non-default isolation requested for a transaction-less scope; \
                         the strategy was never asked to apply it"
                    );
                }

                let mut status = Status::new(None, true);
                status.read_only = definition.read_only();
                status.debug_name = definition.name().map(String::from);

                if self.config.sync_mode == SyncMode::Always {
                    self.activate_empty_synchronization(&mut status);
                }

                Ok(status)
            }
        }
    }

    fn handle_existing_transaction(&self, mut tx: S::Transaction, definition: &Definition) -> Result<Status<S>> {
        use Propagation::*;
        match definition.propagation() {
            Never => Err(Error::IllegalTransactionState(
                "NEVER propagation forbids participating in an existing transaction".to_string(),
            )),

            NotSupported => {
                let suspended = self.suspend_current(Some(&mut tx))?;
                self.strategy.cleanup(&mut tx);

                let mut status = Status::new(None, true);
                status.read_only = definition.read_only();
                status.debug_name = definition.name().map(String::from);
                status.suspended = suspended;

                if self.config.sync_mode == SyncMode::Always {
                    self.activate_empty_synchronization(&mut status);
                }

                Ok(status)
            }

            RequiresNew => {
                let suspended = self.suspend_current(Some(&mut tx))?;

                let mut new_tx = match self.strategy.acquire().map_err(Error::from_strategy) {
                    Ok(tx) => tx,
                    Err(acquire_err) => {
                        let err = self.recover_from_failed_begin(&mut tx, suspended, acquire_err);
                        return Err(err);
                    }
                };

                let effective = self.effective_definition(definition);
                match self.strategy.begin(&mut new_tx, &effective).map_err(Error::from_strategy) {
                    Ok(()) => {
                        self.install_registry_for_new(definition);
                        let mut status = Status::new(Some(new_tx), true);
                        status.read_only = definition.read_only();
                        status.debug_name = definition.name().map(String::from);
                        status.new_synchronization = true;
                        status.suspended = suspended;
                        Ok(status)
                    }
                    Err(begin_err) => {
                        let err = self.recover_from_failed_begin(&mut new_tx, suspended, begin_err);
                        self.strategy.cleanup(&mut new_tx);
                        Err(err)
                    }
                }
            }

            Nested => {
                if !self.config.nested_allowed {
                    return Err(Error::NestedNotSupported);
                }

                if self.strategy.use_savepoint_for_nested() {
                    let savepoint = self
                        .strategy
                        .create_savepoint(&mut tx)
                        .map_err(Error::from_strategy)?;
                    let mut status = Status::new(Some(tx), false);
                    status.savepoint = SavepointSlot::Some(savepoint);
                    status.read_only = definition.read_only();
                    status.debug_name = definition.name().map(String::from);
                    if !registry::is_active() {
                        self.activate_synchronization_for_unowned_existing(&mut status, definition);
                    }
                    Ok(status)
                } else {
                    let effective = self.effective_definition(definition);
                    self.strategy
                        .begin(&mut tx, &effective)
                        .map_err(Error::from_strategy)?;
                    let mut status = Status::new(Some(tx), false);
                    status.read_only = definition.read_only();
                    status.debug_name = definition.name().map(String::from);
                    if !registry::is_active() {
                        self.activate_synchronization_for_unowned_existing(&mut status, definition);
                    }
                    Ok(status)
                }
            }

            Required | Supports | Mandatory => {
                self.validate_existing(definition)?;
                let mut status = Status::new(Some(tx), false);
                status.read_only = definition.read_only();
                status.debug_name = definition.name().map(String::from);
                if !registry::is_active() {
                    self.activate_synchronization_for_unowned_existing(&mut status, definition);
                }
                Ok(status)
            }
        }
    }

    fn validate_existing(&self, definition: &Definition) -> Result<()> {
        if !self.config.validate_existing_transaction {
            return Ok(());
        }

        if !definition.isolation().is_default() {
            if let Some(current) = registry::current_transaction_isolation() {
                if current != definition.isolation() {
                    return Err(Error::IllegalTransactionState(format!(
                        "participating transaction requested isolation {:?} but the existing \
                         transaction runs at {:?}",
                        definition.isolation(),
                        current
                    )));
                }
            }
        }

        if !definition.read_only() && registry::is_current_transaction_read_only() {
            return Err(Error::IllegalTransactionState(
                "participating transaction requested read-write access but the existing \
                 transaction is read-only"
                    .to_string(),
            ));
        }

        Ok(())
    }

    fn install_registry_for_new(&self, definition: &Definition) {
        registry::activate();
        registry::set_current_transaction_name(definition.name().map(String::from));
        registry::set_current_transaction_isolation(Some(definition.isolation()));
        registry::set_current_transaction_read_only(definition.read_only());
        registry::set_actual_transaction_active(true);
    }

    fn activate_empty_synchronization(&self, status: &mut Status<S>) {
        registry::activate();
        registry::set_current_transaction_name(status.debug_name.clone());
        registry::set_current_transaction_read_only(status.read_only);
        registry::set_actual_transaction_active(false);
        status.new_synchronization = true;
    }

    /// Stand up a synchronization scope for a status that is participating
    /// in an existing transaction (`new_transaction = false`) but finds no
    /// synchronization already active — meaning the existing transaction is
    /// genuinely owned by something outside this engine, not a same-engine
    /// ancestor `Status` (those always leave their own synchronization
    /// active for descendants to join). Without this, `registry::register`
    /// would silently drop every callback registered during participation.
    fn activate_synchronization_for_unowned_existing(&self, status: &mut Status<S>, definition: &Definition) {
        registry::activate();
        registry::set_current_transaction_name(status.debug_name.clone());
        registry::set_current_transaction_isolation(Some(definition.isolation()));
        registry::set_current_transaction_read_only(status.read_only);
        registry::set_actual_transaction_active(true);
        status.new_synchronization = true;
        status.delegate_after_completion = true;
    }

    /// Invariant R1: if `begin` (or, for `REQUIRES_NEW`, re-`acquire`) fails
    /// after a suspend, resume the suspended bundle before the failure
    /// propagates. If resume itself fails, the original error is logged and
    /// the resume error takes its place — silently dropping either is not
    /// an option. Returns the error the caller should actually propagate:
    /// `begin_err` if resume succeeded (or there was nothing to resume),
    /// otherwise `resume_err`.
    fn recover_from_failed_begin(
        &self,
        tx: &mut S::Transaction,
        suspended: Option<SuspendedBundle<S>>,
        begin_err: Error,
    ) -> Error {
        if let Some(bundle) = suspended {
            if let Err(resume_err) = self.resume_previous(tx, bundle) {
                tracing::error!(
                    begin_error = %begin_err,
                    resume_error = %resume_err,
                    "begin failed after suspending the outer transaction, and resuming it also failed"
                );
                return resume_err;
            }
        }
        begin_err
    }

    // ---- suspend / resume --------------------------------------------------

    /// Suspend whatever is active in the current execution context: the
    /// synchronization scope (callbacks + metadata) if one is active, and
    /// the strategy-level resource if `tx` is given. Returns `None` if
    /// neither was active — nothing to restore later.
    fn suspend_current(&self, tx: Option<&mut S::Transaction>) -> Result<Option<SuspendedBundle<S>>> {
        let resources = match tx {
            Some(t) => Some(self.strategy.suspend(t).map_err(Error::from_strategy)?),
            None => None,
        };

        let was_active = registry::is_active();
        if !was_active && resources.is_none() {
            return Ok(None);
        }

        let previous_name = registry::current_transaction_name();
        let previous_isolation = registry::current_transaction_isolation();
        let previous_read_only = registry::is_current_transaction_read_only();
        let previous_actual_active = registry::is_actual_transaction_active();

        let mut callbacks = if was_active {
            registry::take_callbacks()
        } else {
            Vec::new()
        };
        for cb in callbacks.iter_mut() {
            cb.suspend();
        }
        if was_active {
            registry::clear();
        }

        Ok(Some(SuspendedBundle {
            resources,
            callbacks,
            previous_name,
            previous_isolation,
            previous_read_only,
            previous_actual_active,
            was_active,
        }))
    }

    /// Resume a previously suspended bundle into `tx`: re-bind the
    /// strategy's resources (if any were captured), then reactivate the
    /// synchronization scope and fire `resume` on each callback in its
    /// original registration order.
    fn resume_previous(&self, tx: &mut S::Transaction, bundle: SuspendedBundle<S>) -> Result<()> {
        if let Some(resources) = bundle.resources {
            self.strategy
                .resume(tx, resources)
                .map_err(Error::from_strategy)?;
        }

        if bundle.was_active {
            registry::activate();
            registry::set_current_transaction_name(bundle.previous_name);
            registry::set_current_transaction_isolation(bundle.previous_isolation);
            registry::set_current_transaction_read_only(bundle.previous_read_only);
            registry::set_actual_transaction_active(bundle.previous_actual_active);

            let mut callbacks = bundle.callbacks;
            for cb in callbacks.iter_mut() {
                cb.resume();
            }
            registry::restore_callbacks(callbacks);
        }

        Ok(())
    }

    /// Resume whatever bundle `status` is carrying, if any. Statuses with
    /// no strategy transaction of their own (the `NOT_SUPPORTED`-while-
    /// existing and transaction-less empty statuses) still need *some*
    /// token to hand `Strategy::resume`; a fresh `acquire()` supplies a
    /// scratch one, since resume's contract is to rebind the resource into
    /// the execution context, not to mutate the token it's handed.
    fn resume_suspended(&self, status: &mut Status<S>) -> Result<()> {
        let Some(bundle) = status.suspended.take() else {
            return Ok(());
        };

        match status.transaction.as_mut() {
            Some(tx) => self.resume_previous(tx, bundle),
            None => {
                let mut scratch = self.strategy.acquire().map_err(Error::from_strategy)?;
                self.resume_previous(&mut scratch, bundle)
            }
        }
    }

    // ---- commit ------------------------------------------------------------

    /// Commit `status`. Converts to a rollback when the status (or the
    /// underlying native transaction) is marked rollback-only, unless the
    /// strategy opts in to committing anyway via
    /// [`Strategy::should_commit_on_global_rollback_only`].
    pub fn commit(&self, status: Status<S>) -> Result<()> {
        self.require_not_completed(&status)?;

        let mut status = status;
        if status.local_rollback_only {
            tracing::debug!(name = ?status.name(), "commit requested on a locally rollback-only status; rolling back instead");
            return self.process_rollback(status, false);
        }

        if !self.strategy.should_commit_on_global_rollback_only()
            && status.global_rollback_only(&self.strategy)
        {
            tracing::debug!(
                name = ?status.name(),
                "global rollback-only marker present; rolling back instead of committing"
            );
            return self.process_rollback(status, true);
        }

        let mut guard = CompletionGuard::new(self, &mut status);
        let outcome = self.process_commit(guard.status_mut());
        guard.disarm();
        outcome
    }

    fn process_commit(&self, status: &mut Status<S>) -> Result<()> {
        self.fire_before_commit(status);
        self.fire_before_completion(status);

        let step_result = if status.has_savepoint() {
            let unexpected = status.global_rollback_only(&self.strategy);
            self.release_nested_savepoint(status).map(|_| unexpected)
        } else if status.new_transaction {
            let unexpected = status.global_rollback_only(&self.strategy);
            self.strategy_commit(status).map(|_| unexpected)
        } else if self.config.fail_early_on_global_rollback_only {
            Ok(status.global_rollback_only(&self.strategy))
        } else {
            Ok(false)
        };

        match step_result {
            Ok(false) => {
                self.fire_after_commit(status);
                self.dispatch_after_completion(status, CompletionStatus::Committed);
                self.cleanup_after_completion(status);
                Ok(())
            }
            Ok(true) => {
                // Silent rollback: the commit step(s) above succeeded, but
                // a global rollback-only marker means the outcome must be
                // reported as an unexpected rollback.
                self.dispatch_after_completion(status, CompletionStatus::RolledBack);
                self.cleanup_after_completion(status);
                Err(Error::UnexpectedRollback)
            }
            Err(commit_err) => {
                let commit_err = self.recover_from_failed_commit(status, commit_err);
                self.cleanup_after_completion(status);
                Err(commit_err)
            }
        }
    }

    /// A commit step failed: either convert it into a silent rollback (when
    /// the failure came from `Strategy::commit` itself and
    /// `rollback_on_commit_failure` is enabled) or surface it with
    /// `afterCompletion(UNKNOWN)`.
    fn recover_from_failed_commit(&self, status: &mut Status<S>, err: Error) -> Error {
        if !status.before_completion_invoked {
            self.fire_before_completion(status);
        }

        let came_from_strategy_commit =
            status.new_transaction && !status.has_savepoint() && matches!(err, Error::TransactionSystem { .. });

        if came_from_strategy_commit && self.config.rollback_on_commit_failure {
            tracing::warn!(error = %err, "commit failed; attempting rollback recovery");
            if let Err(rollback_err) = self.strategy_rollback(status) {
                tracing::error!(
                    commit_error = %err,
                    rollback_error = %rollback_err,
                    "rollback recovery after a failed commit also failed"
                );
            }
            self.dispatch_after_completion(status, CompletionStatus::RolledBack);
        } else {
            self.dispatch_after_completion(status, CompletionStatus::Unknown);
        }

        err
    }

    // ---- rollback ------------------------------------------------------------

    /// Roll back `status`.
    pub fn rollback(&self, status: Status<S>) -> Result<()> {
        self.require_not_completed(&status)?;
        self.process_rollback(status, false)
    }

    fn process_rollback(&self, status: Status<S>, unexpected: bool) -> Result<()> {
        let mut status = status;
        let mut guard = CompletionGuard::new(self, &mut status);
        let outcome = self.run_rollback(guard.status_mut(), unexpected);
        guard.disarm();
        outcome
    }

    fn run_rollback(&self, status: &mut Status<S>, mut unexpected: bool) -> Result<()> {
        self.fire_before_completion(status);

        let step_result: Result<()> = if status.has_savepoint() {
            self.rollback_to_nested_savepoint(status)
        } else if status.new_transaction {
            self.strategy_rollback(status)
        } else {
            let result = self.mark_participating_rollback(status);
            if result.is_ok() && !self.config.fail_early_on_global_rollback_only {
                unexpected = false;
            }
            result
        };

        if let Err(e) = step_result {
            self.dispatch_after_completion(status, CompletionStatus::Unknown);
            self.cleanup_after_completion(status);
            return Err(e);
        }

        self.dispatch_after_completion(status, CompletionStatus::RolledBack);
        self.cleanup_after_completion(status);

        if unexpected {
            return Err(Error::UnexpectedRollback);
        }
        Ok(())
    }

    fn require_not_completed(&self, status: &Status<S>) -> Result<()> {
        if status.completed {
            return Err(Error::IllegalTransactionState(
                "commit/rollback called on an already-completed transaction".to_string(),
            ));
        }
        Ok(())
    }

    // ---- strategy call wrappers ---------------------------------------------

    fn strategy_commit(&self, status: &mut Status<S>) -> Result<()> {
        let tx = status
            .transaction
            .as_mut()
            .expect("a new-transaction status always carries a transaction token");
        self.strategy.commit(tx).map_err(Error::from_strategy)
    }

    fn strategy_rollback(&self, status: &mut Status<S>) -> Result<()> {
        let tx = status
            .transaction
            .as_mut()
            .expect("a new-transaction status always carries a transaction token");
        self.strategy.rollback(tx).map_err(Error::from_strategy)
    }

    /// A participating (non-new) rollback doesn't roll back anything
    /// itself — it either marks the outer transaction rollback-only and
    /// lets the outer scope decide, or (if neither the status nor policy
    /// asks for that) does nothing at all.
    fn mark_participating_rollback(&self, status: &mut Status<S>) -> Result<()> {
        if !(status.local_rollback_only || self.config.global_rollback_on_participation_failure) {
            return Ok(());
        }
        let tx = status.transaction.as_mut().ok_or_else(|| {
            Error::IllegalTransactionState(
                "cannot mark a transaction-less participating status rollback-only".to_string(),
            )
        })?;
        self.strategy.set_rollback_only(tx).map_err(Error::from_strategy)
    }

    fn release_nested_savepoint(&self, status: &mut Status<S>) -> Result<()> {
        if let SavepointSlot::Some(sp) = std::mem::replace(&mut status.savepoint, SavepointSlot::None) {
            let tx = status
                .transaction
                .as_mut()
                .expect("a status carrying a savepoint always carries a transaction token");
            self.strategy.release_savepoint(tx, sp).map_err(Error::from_strategy)?;
        }
        Ok(())
    }

    fn rollback_to_nested_savepoint(&self, status: &mut Status<S>) -> Result<()> {
        if let SavepointSlot::Some(sp) = &status.savepoint {
            let tx = status
                .transaction
                .as_mut()
                .expect("a status carrying a savepoint always carries a transaction token");
            self.strategy.rollback_to_savepoint(tx, sp).map_err(Error::from_strategy)?;
        }
        Ok(())
    }

    // ---- callback fan-out ---------------------------------------------------

    fn fire_before_commit(&self, status: &Status<S>) {
        if !status.new_synchronization {
            return;
        }
        let read_only = status.read_only;
        registry::for_each_callback_mut(|cb| cb.before_commit(read_only));
    }

    fn fire_before_completion(&self, status: &mut Status<S>) {
        if status.before_completion_invoked || !status.new_synchronization {
            return;
        }
        registry::for_each_callback_mut(|cb| cb.before_completion());
        status.before_completion_invoked = true;
    }

    fn fire_after_commit(&self, status: &Status<S>) {
        if !status.new_synchronization {
            return;
        }
        registry::for_each_callback_mut(|cb| cb.after_commit());
    }

    /// A status that doesn't own its synchronization scope (`new_synchronization
    /// = false`) is participating under a same-engine ancestor's `Status`;
    /// its callbacks stay registered under that ancestor and fire when the
    /// ancestor completes, so this is correctly a no-op here.
    ///
    /// A status that does own its scope but isn't a new transaction
    /// (`delegate_after_completion`, set by
    /// `activate_synchronization_for_unowned_existing`) is participating in
    /// a transaction genuinely owned by something outside this engine —
    /// the engine cannot itself observe when that transaction really
    /// completes, so per §4.7 it hands the callbacks to
    /// `Strategy::register_after_completion_with_existing_transaction` when
    /// the strategy opts in, or otherwise fires them immediately with
    /// `Unknown` rather than reporting a commit/rollback outcome it never
    /// actually witnessed.
    fn dispatch_after_completion(&self, status: &mut Status<S>, outcome: CompletionStatus) {
        if !status.new_synchronization {
            return;
        }
        let callbacks = registry::take_callbacks();

        if status.delegate_after_completion {
            if self.strategy.supports_after_completion_delegation() {
                if let Some(tx) = status.transaction.as_mut() {
                    self.strategy.register_after_completion_with_existing_transaction(tx, callbacks);
                    return;
                }
            }
            let mut callbacks = callbacks;
            for cb in callbacks.iter_mut() {
                cb.after_completion(CompletionStatus::Unknown);
            }
            return;
        }

        let mut callbacks = callbacks;
        for cb in callbacks.iter_mut() {
            cb.after_completion(outcome);
        }
    }

    fn cleanup_after_completion(&self, status: &mut Status<S>) {
        status.completed = true;

        if status.new_synchronization {
            registry::clear();
        }

        if status.new_transaction {
            if let Some(tx) = status.transaction.as_mut() {
                self.strategy.cleanup(tx);
            }
        }

        if let Err(e) = self.resume_suspended(status) {
            tracing::error!(error = %e, "failed to resume a suspended transaction during cleanup");
        }
    }

    // ---- manual savepoints & flush -------------------------------------------

    /// Create a manual, mid-transaction savepoint. Distinct from the
    /// automatic one NESTED propagation attaches — see
    /// [`Status::has_savepoint`].
    pub fn create_savepoint(&self, status: &mut Status<S>) -> Result<SavepointHandle> {
        let tx = status.transaction.as_mut().ok_or_else(|| {
            Error::IllegalTransactionState(
                "cannot create a savepoint on a transaction-less status".to_string(),
            )
        })?;
        let savepoint = self.strategy.create_savepoint(tx).map_err(Error::from_strategy)?;
        status.manual_savepoints.push(Some(savepoint));
        Ok(SavepointHandle(status.manual_savepoints.len() - 1))
    }

    /// Roll back to a savepoint previously returned by
    /// [`WorkflowEngine::create_savepoint`], without aborting the whole
    /// transaction.
    pub fn rollback_to_savepoint(&self, status: &mut Status<S>, handle: SavepointHandle) -> Result<()> {
        let tx = status.transaction.as_mut().ok_or_else(|| {
            Error::IllegalTransactionState(
                "cannot roll back to a savepoint on a transaction-less status".to_string(),
            )
        })?;
        let savepoint = status
            .manual_savepoints
            .get(handle.0)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| {
                Error::IllegalTransactionState("unknown or already-released savepoint".to_string())
            })?;
        self.strategy
            .rollback_to_savepoint(tx, savepoint)
            .map_err(Error::from_strategy)
    }

    /// Release a savepoint previously returned by
    /// [`WorkflowEngine::create_savepoint`].
    pub fn release_savepoint(&self, status: &mut Status<S>, handle: SavepointHandle) -> Result<()> {
        let tx = status.transaction.as_mut().ok_or_else(|| {
            Error::IllegalTransactionState(
                "cannot release a savepoint on a transaction-less status".to_string(),
            )
        })?;
        let savepoint = status
            .manual_savepoints
            .get_mut(handle.0)
            .and_then(|slot| slot.take())
            .ok_or_else(|| {
                Error::IllegalTransactionState("unknown or already-released savepoint".to_string())
            })?;
        self.strategy
            .release_savepoint(tx, savepoint)
            .map_err(Error::from_strategy)
    }

    /// Best-effort fan-out over the registered callbacks' `flush` hooks.
    /// A no-op if no synchronization scope is active.
    pub fn flush(&self, _status: &Status<S>) {
        registry::for_each_callback_mut(|cb| cb.flush());
    }
}

/// Guarantees `cleanup_after_completion` runs even if a user callback
/// invoked from `process_commit`/`run_rollback` panics. Armed on entry,
/// disarmed just before a normal (non-panicking) return — at that point
/// the relevant path has already run `cleanup_after_completion` itself and
/// marked `status.completed`, so the guard's `Drop` becomes a no-op.
struct CompletionGuard<'a, 'b, S: Strategy> {
    engine: &'a WorkflowEngine<S>,
    status: &'b mut Status<S>,
    armed: bool,
}

impl<'a, 'b, S: Strategy> CompletionGuard<'a, 'b, S> {
    fn new(engine: &'a WorkflowEngine<S>, status: &'b mut Status<S>) -> Self {
        CompletionGuard {
            engine,
            status,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    fn status_mut(&mut self) -> &mut Status<S> {
        self.status
    }
}

impl<'a, 'b, S: Strategy> Drop for CompletionGuard<'a, 'b, S> {
    fn drop(&mut self) {
        if self.armed && !self.status.completed {
            self.engine.cleanup_after_completion(self.status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{LocalResourceStrategy, LocalTransaction};
    use txflow_core::{Isolation, Propagation as P};

    fn engine() -> WorkflowEngine<LocalResourceStrategy> {
        WorkflowEngine::new(LocalResourceStrategy::new(), EngineConfig::default())
    }

    fn reset_registry() {
        registry::clear();
    }

    #[test]
    fn required_with_no_outer_begins_and_commits() {
        reset_registry();
        let engine = engine();
        let def = Definition::new().with_propagation(P::Required).with_name("A");
        let status = engine.get_transaction(&def).unwrap();
        assert!(status.is_new_transaction());
        engine.commit(status).unwrap();
        assert!(!registry::is_active());
    }

    #[test]
    fn required_inside_required_participates() {
        reset_registry();
        let engine = engine();
        let outer = engine
            .get_transaction(&Definition::new().with_propagation(P::Required).with_name("outer"))
            .unwrap();
        assert!(outer.is_new_transaction());

        let inner = engine
            .get_transaction(&Definition::new().with_propagation(P::Required).with_name("inner"))
            .unwrap();
        assert!(!inner.is_new_transaction());

        engine.commit(inner).unwrap();
        engine.commit(outer).unwrap();
        assert!(!registry::is_active());
    }

    #[test]
    fn requires_new_inside_required_suspends_and_resumes() {
        reset_registry();
        let engine = engine();
        let outer = engine
            .get_transaction(&Definition::new().with_propagation(P::Required).with_name("outer"))
            .unwrap();
        assert_eq!(registry::current_transaction_name().as_deref(), Some("outer"));

        let inner = engine
            .get_transaction(
                &Definition::new()
                    .with_propagation(P::RequiresNew)
                    .with_name("inner"),
            )
            .unwrap();
        assert!(inner.is_new_transaction());
        assert_eq!(registry::current_transaction_name().as_deref(), Some("inner"));

        engine.commit(inner).unwrap();
        assert_eq!(registry::current_transaction_name().as_deref(), Some("outer"));

        engine.commit(outer).unwrap();
        assert!(!registry::is_active());
    }

    #[test]
    fn mandatory_with_no_outer_fails() {
        reset_registry();
        let engine = engine();
        let def = Definition::new().with_propagation(P::Mandatory);
        let err = engine.get_transaction(&def).unwrap_err();
        assert!(err.is_illegal_state());
        assert!(!registry::is_active());
    }

    #[test]
    fn never_with_outer_fails() {
        reset_registry();
        let engine = engine();
        let outer = engine
            .get_transaction(&Definition::new().with_propagation(P::Required))
            .unwrap();
        let err = engine
            .get_transaction(&Definition::new().with_propagation(P::Never))
            .unwrap_err();
        assert!(err.is_illegal_state());
        engine.commit(outer).unwrap();
    }

    #[test]
    fn nested_with_savepoint_rolls_back_independently() {
        reset_registry();
        let engine = WorkflowEngine::new(
            LocalResourceStrategy::new(),
            EngineConfig::new().with_nested_allowed(true),
        );
        let outer = engine
            .get_transaction(&Definition::new().with_propagation(P::Required))
            .unwrap();

        let inner = engine
            .get_transaction(&Definition::new().with_propagation(P::Nested))
            .unwrap();
        assert!(!inner.is_new_transaction());
        assert!(inner.has_savepoint());

        engine.rollback(inner).unwrap();
        engine.commit(outer).unwrap();
    }

    #[test]
    fn commit_of_rollback_only_participant_surfaces_unexpected_rollback() {
        reset_registry();
        let engine = engine();
        let outer = engine
            .get_transaction(&Definition::new().with_propagation(P::Required))
            .unwrap();
        let mut inner = engine
            .get_transaction(&Definition::new().with_propagation(P::Required))
            .unwrap();
        inner.set_rollback_only();
        engine.commit(inner).unwrap();

        let err = engine.commit(outer).unwrap_err();
        assert!(matches!(err, Error::UnexpectedRollback));
    }

    #[test]
    fn supports_with_no_outer_runs_without_transaction() {
        reset_registry();
        let engine = engine();
        let status = engine
            .get_transaction(&Definition::new().with_propagation(P::Supports))
            .unwrap();
        assert!(!status.has_transaction());
        engine.commit(status).unwrap();
    }

    #[test]
    fn not_supported_with_outer_suspends_and_restores() {
        reset_registry();
        let engine = engine();
        let outer = engine
            .get_transaction(&Definition::new().with_propagation(P::Required).with_name("outer"))
            .unwrap();

        let inner = engine
            .get_transaction(&Definition::new().with_propagation(P::NotSupported))
            .unwrap();
        assert!(!inner.has_transaction());
        assert!(!registry::is_active() || registry::current_transaction_name().as_deref() != Some("outer"));

        engine.commit(inner).unwrap();
        assert_eq!(registry::current_transaction_name().as_deref(), Some("outer"));
        engine.commit(outer).unwrap();
    }

    #[test]
    fn second_commit_on_completed_status_fails() {
        reset_registry();
        let engine = engine();
        let status = engine
            .get_transaction(&Definition::new().with_propagation(P::Required))
            .unwrap();
        // We can't call commit twice on the same Status (it's consumed by
        // value), but we can exercise the completed-guard directly.
        let mut completed = status;
        completed.completed = true;
        let err = engine.commit(completed).unwrap_err();
        assert!(err.is_illegal_state());
    }

    #[test]
    fn validate_existing_transaction_rejects_isolation_mismatch() {
        reset_registry();
        let engine = WorkflowEngine::new(
            LocalResourceStrategy::new(),
            EngineConfig::new().with_validate_existing_transaction(true),
        );
        let outer = engine
            .get_transaction(
                &Definition::new()
                    .with_propagation(P::Required)
                    .with_isolation(Isolation::ReadCommitted),
            )
            .unwrap();

        let err = engine
            .get_transaction(
                &Definition::new()
                    .with_propagation(P::Required)
                    .with_isolation(Isolation::Serializable),
            )
            .unwrap_err();
        assert!(err.is_illegal_state());

        engine.commit(outer).unwrap();
    }

    #[test]
    fn begin_failure_resumes_suspended_outer() {
        reset_registry();
        let strategy = LocalResourceStrategy::new();
        let engine = WorkflowEngine::new(strategy, EngineConfig::default());

        let outer = engine
            .get_transaction(&Definition::new().with_propagation(P::Required).with_name("outer"))
            .unwrap();

        engine.strategy().fail_next_begin();
        let err = engine
            .get_transaction(&Definition::new().with_propagation(P::RequiresNew))
            .unwrap_err();
        assert!(matches!(err, Error::TransactionSystem { .. }));

        assert_eq!(registry::current_transaction_name().as_deref(), Some("outer"));
        engine.commit(outer).unwrap();
    }

    #[test]
    fn nested_without_nested_allowed_fails() {
        reset_registry();
        let engine = engine();
        let outer = engine
            .get_transaction(&Definition::new().with_propagation(P::Required))
            .unwrap();
        let err = engine
            .get_transaction(&Definition::new().with_propagation(P::Nested))
            .unwrap_err();
        assert!(matches!(err, Error::NestedNotSupported));
        engine.commit(outer).unwrap();
    }

    struct RecordingCallback(std::sync::Arc<std::sync::Mutex<Option<CompletionStatus>>>);
    impl crate::callback::SyncCallback for RecordingCallback {
        fn after_completion(&mut self, status: CompletionStatus) {
            *self.0.lock().unwrap() = Some(status);
        }
    }

    #[test]
    fn participating_in_an_unowned_existing_transaction_fires_unknown_not_silently_dropped() {
        reset_registry();
        let strategy = LocalResourceStrategy::new();

        // Bind a native connection directly through the strategy, bypassing
        // the engine entirely — this stands in for a transaction some other
        // component (not this engine) began and owns.
        let mut external_tx = strategy.acquire().unwrap();
        strategy.begin(&mut external_tx, &Definition::new()).unwrap();
        assert!(!registry::is_active());

        let engine = WorkflowEngine::new(strategy, EngineConfig::default());
        let status = engine
            .get_transaction(&Definition::new().with_propagation(P::Required))
            .unwrap();
        assert!(!status.is_new_transaction());
        assert!(status.has_transaction());

        let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        registry::register(Box::new(RecordingCallback(seen.clone())));

        // The engine never calls strategy.commit here (it doesn't own this
        // transaction) but the callback must still fire, with an outcome
        // the engine can honestly report: Unknown.
        engine.commit(status).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(CompletionStatus::Unknown));

        strategy_commit_external(&engine, external_tx);
    }

    fn strategy_commit_external(engine: &WorkflowEngine<LocalResourceStrategy>, mut tx: LocalTransaction) {
        engine.strategy().commit(&mut tx).unwrap();
    }
}
