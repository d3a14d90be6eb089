//! Execution-context-local registry of synchronization state.
//!
//! This mirrors the reference framework's thread-bound
//! `TransactionSynchronizationManager`: a single piece of state scoped to
//! the calling thread, holding the active-transaction metadata, the
//! ordered callback list, and a small `Any`-keyed resource map that
//! `Strategy` implementations may use for their own bookkeeping instead of
//! rolling their own thread-local storage.
//!
//! The mechanism (thread-local) is an implementation choice, not a
//! contractual requirement: any context-local storage primitive that keeps
//! state isolated per logical execution context (thread, fiber, task)
//! satisfies the contract.

use crate::callback::SyncCallback;
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use txflow_core::Isolation;

thread_local! {
    static STATE: RefCell<RegistryState> = RefCell::new(RegistryState::default());
}

#[derive(Default)]
struct RegistryState {
    active: bool,
    name: Option<String>,
    isolation: Option<Isolation>,
    read_only: bool,
    actual_active: bool,
    callbacks: Vec<Box<dyn SyncCallback>>,
    resources: HashMap<&'static str, Box<dyn Any>>,
}

/// Activate the synchronization scope for the current execution context.
///
/// Per the invariant in the data model: `active` implies `callbacks` is
/// mutable and ordered by registration.
pub fn activate() {
    STATE.with(|s| s.borrow_mut().active = true);
}

/// Deactivate and clear all synchronization state for the current context:
/// `active` becomes `false`, name/isolation/read-only/actual-active reset,
/// and the callback list is emptied.
pub fn clear() {
    STATE.with(|s| {
        let mut state = s.borrow_mut();
        *state = RegistryState::default();
    });
}

/// Whether the synchronization scope is currently active.
pub fn is_active() -> bool {
    STATE.with(|s| s.borrow().active)
}

/// Register a callback. No-op (the registry silently drops it) if the
/// scope is not active, matching the invariant that an inactive registry
/// has no mutable callback list.
pub fn register(callback: Box<dyn SyncCallback>) {
    STATE.with(|s| {
        let mut state = s.borrow_mut();
        if state.active {
            state.callbacks.push(callback);
        }
    });
}

/// Number of callbacks currently registered.
pub fn callback_count() -> usize {
    STATE.with(|s| s.borrow().callbacks.len())
}

/// Remove and return all registered callbacks, in registration order,
/// without touching the rest of the registry's state.
///
/// Used by the engine when suspending: ownership of the list moves into
/// the `SuspendedBundle`, statically preventing the same callbacks from
/// being fired twice.
pub(crate) fn take_callbacks() -> Vec<Box<dyn SyncCallback>> {
    STATE.with(|s| std::mem::take(&mut s.borrow_mut().callbacks))
}

/// Re-install a previously taken callback list, in its original order.
pub(crate) fn restore_callbacks(callbacks: Vec<Box<dyn SyncCallback>>) {
    STATE.with(|s| s.borrow_mut().callbacks = callbacks);
}

/// The name of the currently active transaction, if any.
pub fn current_transaction_name() -> Option<String> {
    STATE.with(|s| s.borrow().name.clone())
}

/// Set (or clear, with `None`) the current transaction's diagnostic name.
pub fn set_current_transaction_name(name: Option<String>) {
    STATE.with(|s| s.borrow_mut().name = name);
}

/// The isolation level recorded for the current transaction, if any.
pub fn current_transaction_isolation() -> Option<Isolation> {
    STATE.with(|s| s.borrow().isolation)
}

/// Set (or clear, with `None`) the current transaction's isolation level.
pub fn set_current_transaction_isolation(isolation: Option<Isolation>) {
    STATE.with(|s| s.borrow_mut().isolation = isolation);
}

/// Whether the current transaction is read-only.
pub fn is_current_transaction_read_only() -> bool {
    STATE.with(|s| s.borrow().read_only)
}

/// Set the current transaction's read-only flag.
pub fn set_current_transaction_read_only(read_only: bool) {
    STATE.with(|s| s.borrow_mut().read_only = read_only);
}

/// Whether an *actual* native transaction (as opposed to an empty,
/// transaction-less scope) is active for the current context.
pub fn is_actual_transaction_active() -> bool {
    STATE.with(|s| s.borrow().actual_active)
}

/// Set whether an actual native transaction is active.
pub fn set_actual_transaction_active(active: bool) {
    STATE.with(|s| s.borrow_mut().actual_active = active);
}

/// Bind a resource under `key`, returning any value that was previously
/// bound there (downcast to `T`; a mismatched type silently discards the
/// old value, mirroring "last bind wins" semantics).
pub fn bind_resource<T: Any>(key: &'static str, value: T) -> Option<T> {
    STATE.with(|s| {
        s.borrow_mut()
            .resources
            .insert(key, Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|boxed| *boxed)
    })
}

/// Remove and return the resource bound under `key`, if any and if it is
/// of type `T`.
pub fn unbind_resource<T: Any>(key: &'static str) -> Option<T> {
    STATE.with(|s| {
        s.borrow_mut()
            .resources
            .remove(key)
            .and_then(|old| old.downcast::<T>().ok())
            .map(|boxed| *boxed)
    })
}

/// Whether a resource is currently bound under `key`.
pub fn has_resource(key: &'static str) -> bool {
    STATE.with(|s| s.borrow().resources.contains_key(key))
}

/// Borrow the resource bound under `key`, if any and if it is of type `T`.
pub fn with_resource<T: Any, R>(key: &'static str, f: impl FnOnce(Option<&T>) -> R) -> R {
    STATE.with(|s| f(s.borrow().resources.get(key).and_then(|v| v.downcast_ref::<T>())))
}

/// Mutably borrow the resource bound under `key`, if any and if it is of
/// type `T`.
pub fn with_resource_mut<T: Any, R>(key: &'static str, f: impl FnOnce(Option<&mut T>) -> R) -> R {
    STATE.with(|s| f(s.borrow_mut().resources.get_mut(key).and_then(|v| v.downcast_mut::<T>())))
}

/// Invoke `f` on every registered callback, in registration order, without
/// taking ownership of the list. Used by the workflow engine to fire
/// `beforeCommit`/`beforeCompletion`/`afterCommit` on the registry the
/// invoking [`Status`](crate::status::Status) owns.
pub(crate) fn for_each_callback_mut(mut f: impl FnMut(&mut dyn SyncCallback)) {
    STATE.with(|s| {
        let mut state = s.borrow_mut();
        for cb in state.callbacks.iter_mut() {
            f(cb.as_mut());
        }
    });
}
