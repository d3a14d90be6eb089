//! Property tests for the quantified invariants a propagation engine must
//! hold regardless of which `Definition` a caller builds: balanced
//! suspend/resume, exactly-once completion, callback ordering, and
//! rollback-only monotonicity.

use proptest::prelude::*;
use txflow_core::{Definition, Error, Isolation, Propagation};
use txflow_engine::testkit::LocalResourceStrategy;
use txflow_engine::{EngineConfig, SyncCallback, WorkflowEngine};

fn arb_propagation() -> impl Strategy<Value = Propagation> {
    prop_oneof![
        Just(Propagation::Required),
        Just(Propagation::Supports),
        Just(Propagation::Mandatory),
        Just(Propagation::RequiresNew),
        Just(Propagation::NotSupported),
        Just(Propagation::Never),
        Just(Propagation::Nested),
    ]
}

fn arb_isolation() -> impl Strategy<Value = Isolation> {
    prop_oneof![
        Just(Isolation::Default),
        Just(Isolation::ReadUncommitted),
        Just(Isolation::ReadCommitted),
        Just(Isolation::RepeatableRead),
        Just(Isolation::Serializable),
    ]
}

fn arb_definition() -> impl Strategy<Value = Definition> {
    (
        arb_propagation(),
        arb_isolation(),
        -1i64..600i64,
        any::<bool>(),
        "[a-z]{0,8}",
    )
        .prop_map(|(propagation, isolation, timeout, read_only, name)| {
            Definition::new()
                .with_propagation(propagation)
                .with_isolation(isolation)
                .with_timeout(timeout)
                .with_read_only(read_only)
                .with_name(name)
        })
}

fn engine() -> WorkflowEngine<LocalResourceStrategy> {
    WorkflowEngine::new(
        LocalResourceStrategy::new(),
        EngineConfig::new().with_nested_allowed(true),
    )
}

proptest! {
    /// Opening and completing a single top-level transaction always leaves
    /// the registry exactly as inactive as it started, whatever the
    /// requested propagation/isolation/timeout/read-only/name combination
    /// turns out to be (propagation modes that fail outright, like
    /// MANDATORY or NEVER with no outer, never touch the registry at all).
    #[test]
    fn top_level_transaction_always_balances_the_registry(def in arb_definition()) {
        txflow_engine::registry::clear();
        let engine = engine();

        match engine.get_transaction(&def) {
            Ok(status) => {
                let _ = engine.commit(status);
            }
            Err(_) => {}
        }

        prop_assert!(!txflow_engine::registry::is_active());
    }

    /// REQUIRES_NEW nested inside REQUIRED always suspends the outer
    /// transaction and restores it exactly, regardless of the inner
    /// definition's isolation/timeout/read-only/name.
    #[test]
    fn requires_new_always_restores_the_suspended_outer(inner_def in arb_definition()) {
        txflow_engine::registry::clear();
        let engine = engine();

        let outer = engine
            .get_transaction(&Definition::new().with_propagation(Propagation::Required).with_name("outer"))
            .unwrap();
        let before_name = txflow_engine::registry::current_transaction_name();

        let inner_def = inner_def.with_propagation(Propagation::RequiresNew);
        match engine.get_transaction(&inner_def) {
            Ok(inner) => {
                let _ = engine.commit(inner);
            }
            Err(_) => {}
        }

        prop_assert_eq!(txflow_engine::registry::current_transaction_name(), before_name);
        engine.commit(outer).unwrap();
    }

    /// Once a participating transaction is marked rollback-only, no amount
    /// of committing an ancestor can turn the eventual outcome into a
    /// success: the ancestor's commit either observes the global
    /// rollback-only marker and converts to rollback (surfacing
    /// `UnexpectedRollback`), or the inner rollback itself already
    /// reported it.
    #[test]
    fn rollback_only_is_never_undone_by_an_ancestor_commit(def in arb_definition()) {
        txflow_engine::registry::clear();
        let engine = engine();

        let outer = engine
            .get_transaction(&Definition::new().with_propagation(Propagation::Required))
            .unwrap();

        let mut inner = match engine.get_transaction(&def.clone().with_propagation(Propagation::Required)) {
            Ok(inner) => inner,
            Err(_) => {
                // Outer must still be completable even if the inner
                // definition itself was rejected (e.g. isolation
                // mismatch under validation policies this test doesn't
                // enable — not expected here, but fail closed).
                engine.commit(outer).unwrap();
                return Ok(());
            }
        };
        inner.set_rollback_only();
        let _ = engine.commit(inner);

        let outcome = engine.commit(outer);
        prop_assert!(matches!(outcome, Err(Error::UnexpectedRollback)));
    }
}

#[derive(Default)]
struct OrderRecorder {
    log: std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>,
}

struct Tagged(&'static str, std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>);

impl SyncCallback for Tagged {
    fn before_commit(&mut self, _read_only: bool) {
        self.1.lock().unwrap().push(self.0);
    }
}

#[test]
fn callbacks_fire_in_registration_order() {
    txflow_engine::registry::clear();
    let engine = engine();
    let recorder = OrderRecorder::default();

    let status = engine
        .get_transaction(&Definition::new().with_propagation(Propagation::Required))
        .unwrap();

    txflow_engine::registry::register(Box::new(Tagged("first", recorder.log.clone())));
    txflow_engine::registry::register(Box::new(Tagged("second", recorder.log.clone())));
    txflow_engine::registry::register(Box::new(Tagged("third", recorder.log.clone())));

    engine.commit(status).unwrap();

    assert_eq!(*recorder.log.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn nested_transaction_commits_through_the_outer_after_participation() {
    // `Status::completed`/the "exactly-once" guard are exercised from
    // inside the crate (see `workflow.rs`'s own `#[cfg(test)]` module,
    // which can reach the `pub(crate)` flag directly); this integration
    // test instead exercises the public-API consequence of that guard —
    // a transaction that already participated and committed leaves no
    // trace for an unrelated later transaction to observe.
    txflow_engine::registry::clear();
    let engine = engine();

    let outer = engine
        .get_transaction(&Definition::new().with_propagation(Propagation::Required))
        .unwrap();
    let inner = engine
        .get_transaction(&Definition::new().with_propagation(Propagation::Required))
        .unwrap();
    engine.commit(inner).unwrap();
    engine.commit(outer).unwrap();

    assert!(!txflow_engine::registry::is_active());
}
