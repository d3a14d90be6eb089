//! [`TransactionTemplate`]: the callback-style facade over a
//! [`WorkflowEngine`], for callers who want "run this closure inside a
//! transaction" instead of manually pairing `get_transaction` with
//! `commit`/`rollback`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use txflow_core::Definition;
use txflow_engine::{Status, Strategy, WorkflowEngine};

/// The handle a [`TransactionTemplate::execute`] callback is given. A thin
/// wrapper around `&mut Status<S>` exposing only what a callback should be
/// allowed to touch — it cannot commit, rollback, or otherwise complete the
/// transaction itself.
pub struct TransactionStatusHandle<'a, S: Strategy> {
    status: &'a mut Status<S>,
}

impl<'a, S: Strategy> TransactionStatusHandle<'a, S> {
    /// Mark the transaction rollback-only. Monotonic — see
    /// [`Status::set_rollback_only`].
    pub fn set_rollback_only(&mut self) {
        self.status.set_rollback_only();
    }

    /// Whether this call created a brand-new transaction rather than
    /// joining one already in progress.
    pub fn is_new_transaction(&self) -> bool {
        self.status.is_new_transaction()
    }

    /// Whether the transaction is (locally) marked rollback-only.
    pub fn is_rollback_only(&self) -> bool {
        self.status.is_rollback_only()
    }
}

/// Everything that can go wrong running a callback through
/// [`TransactionTemplate::execute`]: either the engine itself failed
/// (begin, commit, or rollback), or the callback returned its own
/// application-level error.
#[derive(Debug, Error)]
pub enum TemplateError<E> {
    /// `get_transaction`, `commit`, or `rollback` failed.
    #[error(transparent)]
    Engine(#[from] txflow_core::Error),
    /// The callback passed to `execute` returned `Err`.
    #[error("transactional callback failed")]
    Application(E),
}

/// Runs a closure inside a transaction obtained from `engine` under a fixed
/// [`Definition`], committing on `Ok`, rolling back on `Err` or panic.
///
/// Cheap to clone (the engine is held behind an `Arc`); a typical caller
/// builds one template per logical operation and reuses it across calls.
pub struct TransactionTemplate<S: Strategy> {
    definition: Definition,
    engine: Arc<WorkflowEngine<S>>,
}

impl<S: Strategy> TransactionTemplate<S> {
    /// Build a template that opens transactions per `definition` against
    /// `engine`.
    pub fn new(engine: Arc<WorkflowEngine<S>>, definition: Definition) -> Self {
        TransactionTemplate { definition, engine }
    }

    /// The definition this template opens transactions with.
    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    /// Obtain a transaction, run `f` against it, and complete it.
    ///
    /// On `Ok(value)`, commits and returns `value`. On `Err(e)`, rolls back
    /// and returns `TemplateError::Application(e)`. If `f` panics, the
    /// transaction is still rolled back — from a `catch_unwind` boundary,
    /// not a scope guard, since `Status` does not implement `Drop` — before
    /// the panic resumes, so `cleanupAfterCompletion` runs on every exit
    /// path exactly as it does for commit/rollback/begin-failure.
    pub fn execute<R, E>(
        &self,
        f: impl FnOnce(&mut TransactionStatusHandle<'_, S>) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, TemplateError<E>> {
        let mut status = self.engine.get_transaction(&self.definition)?;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut handle = TransactionStatusHandle { status: &mut status };
            f(&mut handle)
        }));

        match outcome {
            Ok(Ok(value)) => {
                self.engine.commit(status)?;
                Ok(value)
            }
            Ok(Err(app_err)) => {
                if let Err(rollback_err) = self.engine.rollback(status) {
                    tracing::error!(
                        error = %rollback_err,
                        "rollback after an application error also failed"
                    );
                }
                Err(TemplateError::Application(app_err))
            }
            Err(panic_payload) => {
                if let Err(rollback_err) = self.engine.rollback(status) {
                    tracing::error!(
                        error = %rollback_err,
                        "rollback after a panicking callback also failed"
                    );
                }
                panic::resume_unwind(panic_payload);
            }
        }
    }
}

impl<S: Strategy> Clone for TransactionTemplate<S> {
    fn clone(&self) -> Self {
        TransactionTemplate {
            definition: self.definition.clone(),
            engine: Arc::clone(&self.engine),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txflow_engine::testkit::LocalResourceStrategy;
    use txflow_engine::EngineConfig;

    fn template() -> TransactionTemplate<LocalResourceStrategy> {
        let engine = WorkflowEngine::new(LocalResourceStrategy::new(), EngineConfig::default());
        TransactionTemplate::new(Arc::new(engine), Definition::new())
    }

    #[test]
    fn ok_result_commits_and_returns_value() {
        let template = template();
        let value = template.execute::<_, ()>(|_handle| Ok(7)).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn err_result_rolls_back_and_wraps_application_error() {
        let template = template();
        let err = template
            .execute::<(), _>(|_handle| Err("boom"))
            .unwrap_err();
        assert!(matches!(err, TemplateError::Application("boom")));
    }

    #[test]
    fn set_rollback_only_from_inside_the_callback_forces_rollback() {
        let template = template();
        let outcome = template.execute::<_, ()>(|handle| {
            handle.set_rollback_only();
            Ok(())
        });
        assert!(outcome.is_ok());
    }

    #[test]
    #[should_panic(expected = "callback panicked")]
    fn panicking_callback_still_rolls_back_before_the_unwind_resumes() {
        let template = template();
        let _ = template.execute::<(), ()>(|_handle| panic!("callback panicked"));
    }
}
