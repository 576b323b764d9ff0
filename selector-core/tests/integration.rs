//! Integration Tests for the Selector Engine
//!
//! These tests drive engines the way a host would: compute, commit, attach,
//! then react to store changes and re-invoke.

mod support;

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use selector_core::{
    ConsumerId, Equality, Phase, RenderQueue, SelectError, SelectInputs, Selector, SelectorFault,
    SelectorOptions, Store, StoreScope, SyncEngine,
};
use support::{counting_notify, AppState, MemoryStore};

/// A `counter` selector that counts its own invocations.
fn counter_selector(runs: &Arc<AtomicI32>) -> Selector<AppState, i32> {
    let runs = runs.clone();
    Selector::new(move |s: &AppState| {
        runs.fetch_add(1, Ordering::SeqCst);
        s.counter
    })
}

/// A selector that fails whenever the counter is 13.
fn unlucky_selector() -> Selector<AppState, i32> {
    Selector::fallible(|s: &AppState| {
        if s.counter == 13 {
            Err(SelectorFault::new("counter is 13"))
        } else {
            Ok(s.counter * 10)
        }
    })
}

/// Same selector and same state: the second compute does not run the selector.
#[test]
fn memoized_compute_skips_selector() {
    let store = MemoryStore::new(AppState::with_counter(4));
    let runs = Arc::new(AtomicI32::new(0));
    let (_, notify) = counting_notify();
    let engine = SyncEngine::new(notify);
    let inputs = SelectInputs::new(store.handle(), counter_selector(&runs));

    assert_eq!(engine.render(&inputs).unwrap(), 4);
    assert_eq!(engine.render(&inputs).unwrap(), 4);
    assert_eq!(engine.render(&inputs).unwrap(), 4);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

/// A new selector instance defeats the fast path even if it behaves the same.
#[test]
fn new_selector_instance_recomputes() {
    let store = MemoryStore::new(AppState::with_counter(4));
    let runs = Arc::new(AtomicI32::new(0));
    let (_, notify) = counting_notify();
    let engine = SyncEngine::new(notify);

    engine
        .render(&SelectInputs::new(store.handle(), counter_selector(&runs)))
        .unwrap();
    engine
        .render(&SelectInputs::new(store.handle(), counter_selector(&runs)))
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// A policy-equal result neither notifies nor changes the returned instance.
#[test]
fn equality_collapse_keeps_identity() {
    let store = MemoryStore::new(AppState::with_counter(1));
    let (notified, notify) = counting_notify();
    let engine = SyncEngine::new(notify);

    let parity = Selector::new(|s: &AppState| Arc::new(vec![s.counter % 2]));
    let by_content = Equality::new(|a: &Arc<Vec<i32>>, b: &Arc<Vec<i32>>| a == b);
    let inputs = SelectInputs::new(store.handle(), parity).with_equality(by_content);

    let first = engine.render(&inputs).unwrap();
    engine.attach(&inputs);

    // Same parity, new allocation
    store.replace(AppState::with_counter(3));
    assert_eq!(notified.load(Ordering::SeqCst), 0);

    let second = engine.render(&inputs).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    store.replace(AppState::with_counter(4));
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    let third = engine.render(&inputs).unwrap();
    assert_eq!(*third, vec![0]);
}

/// A store change between compute and subscribe is caught by the attach pass.
#[test]
fn change_before_attach_is_not_missed() {
    let store = MemoryStore::new(AppState::with_counter(0));
    let (notified, notify) = counting_notify();
    let engine = SyncEngine::new(notify);
    let inputs = SelectInputs::new(store.handle(), Selector::new(|s: &AppState| s.counter));

    assert_eq!(engine.render(&inputs).unwrap(), 0);

    // Mutate while the engine is subscribing, before its listener is registered
    store.on_next_subscribe(|store| store.replace(AppState::with_counter(5)));
    engine.attach(&inputs);

    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert_eq!(engine.debug_value(), Some(5));
    assert_eq!(engine.render(&inputs).unwrap(), 5);
}

/// A fault deferred from the async pass is correlated with the next sync fault.
#[test]
fn deferred_fault_is_correlated() {
    let store = MemoryStore::new(AppState::with_counter(0));
    let (notified, notify) = counting_notify();
    let engine = SyncEngine::new(notify);
    let inputs = SelectInputs::new(store.handle(), unlucky_selector());

    engine.render(&inputs).unwrap();
    engine.attach(&inputs);

    store.replace(AppState::with_counter(13));
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert!(engine.has_deferred_fault());

    let err = engine.render(&inputs).unwrap_err();
    let fault = err.fault().expect("selector fault");
    assert!(fault.message().starts_with("counter is 13"));
    assert!(fault
        .message()
        .contains("The error may be correlated with this previous error:\ncounter is 13"));
    assert_eq!(fault.previous().map(|p| p.message()), Some("counter is 13"));

    // The subscription is still alive
    assert_eq!(engine.phase(), Phase::Attached);
    assert_eq!(store.listener_count(), 1);
}

/// If the state recovers before the next compute, no fault is raised.
#[test]
fn deferred_fault_recovers() {
    let store = MemoryStore::new(AppState::with_counter(0));
    let (notified, notify) = counting_notify();
    let engine = SyncEngine::new(notify);
    let inputs = SelectInputs::new(store.handle(), unlucky_selector());

    engine.render(&inputs).unwrap();
    engine.attach(&inputs);

    store.replace(AppState::with_counter(13));
    store.replace(AppState::with_counter(2));
    assert_eq!(notified.load(Ordering::SeqCst), 2);

    assert_eq!(engine.render(&inputs).unwrap(), 20);
    assert!(!engine.has_deferred_fault());
}

/// After detach nothing reaches the selector; subscriptions balance per cycle.
#[test]
fn teardown_is_complete_and_balanced() {
    let store = MemoryStore::new(AppState::with_counter(0));
    let runs = Arc::new(AtomicI32::new(0));
    let (notified, notify) = counting_notify();
    let engine = SyncEngine::new(notify);
    let inputs = SelectInputs::new(store.handle(), counter_selector(&runs));

    engine.render(&inputs).unwrap();
    engine.attach(&inputs);
    let runs_when_attached = runs.load(Ordering::SeqCst);

    engine.detach();
    store.replace(AppState::with_counter(1));
    store.replace(AppState::with_counter(2));

    assert_eq!(runs.load(Ordering::SeqCst), runs_when_attached);
    assert_eq!(notified.load(Ordering::SeqCst), 0);
    assert_eq!(store.subscribe_count(), 1);
    assert_eq!(store.unsubscribe_count(), 1);

    engine.attach(&inputs);
    engine.detach();
    assert_eq!(store.subscribe_count(), 2);
    assert_eq!(store.unsubscribe_count(), 2);
    assert_eq!(store.listener_count(), 0);
}

/// A notification already in flight when the engine detaches is a no-op.
#[test]
fn notification_racing_detach_is_ignored() {
    let store = MemoryStore::new(AppState::with_counter(0));
    let runs = Arc::new(AtomicI32::new(0));
    let (notified, notify) = counting_notify();
    let engine: Arc<SyncEngine<AppState, i32>> = Arc::new(SyncEngine::new(notify));
    let inputs = SelectInputs::new(store.handle(), counter_selector(&runs));

    // Registered first, so it runs before the engine's listener in the same batch
    let detacher = engine.clone();
    let _release = store.subscribe(Arc::new(move || detacher.detach()));

    engine.render(&inputs).unwrap();
    engine.attach(&inputs);
    let runs_when_attached = runs.load(Ordering::SeqCst);

    store.replace(AppState::with_counter(9));

    assert_eq!(engine.phase(), Phase::Detached);
    assert_eq!(runs.load(Ordering::SeqCst), runs_when_attached);
    assert_eq!(notified.load(Ordering::SeqCst), 0);
}

/// Detaching while the store is still registering the engine releases that
/// registration as soon as it exists.
#[test]
fn detach_during_subscribe_is_balanced() {
    let store = MemoryStore::new(AppState::with_counter(0));
    let runs = Arc::new(AtomicI32::new(0));
    let (notified, notify) = counting_notify();
    let engine: Arc<SyncEngine<AppState, i32>> = Arc::new(SyncEngine::new(notify));
    let inputs = SelectInputs::new(store.handle(), counter_selector(&runs));

    engine.render(&inputs).unwrap();

    let detacher = engine.clone();
    store.on_next_subscribe(move |_| detacher.detach());
    engine.attach(&inputs);

    assert_eq!(engine.phase(), Phase::Detached);
    assert_eq!(store.subscribe_count(), 1);
    assert_eq!(store.unsubscribe_count(), 1);
    assert_eq!(store.listener_count(), 0);

    store.replace(AppState::with_counter(4));
    assert_eq!(notified.load(Ordering::SeqCst), 0);
    assert_eq!(engine.debug_value(), Some(0));
}

/// `{counter: 0}` → new `{counter: 0}` → `{counter: 1}`.
#[test]
fn counter_scenario() {
    let store = MemoryStore::new(AppState::with_counter(0));
    let runs = Arc::new(AtomicI32::new(0));
    let (notified, notify) = counting_notify();
    let engine = SyncEngine::new(notify);
    let inputs = SelectInputs::new(store.handle(), counter_selector(&runs));

    assert_eq!(engine.render(&inputs).unwrap(), 0);
    engine.attach(&inputs);
    let runs_before = runs.load(Ordering::SeqCst);

    // New object, same counter: the selector runs, the policy suppresses the notify
    store.replace(AppState::with_counter(0));
    assert_eq!(runs.load(Ordering::SeqCst), runs_before + 1);
    assert_eq!(notified.load(Ordering::SeqCst), 0);

    store.replace(AppState::with_counter(1));
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert_eq!(engine.render(&inputs).unwrap(), 1);
}

/// Several changes before the host gets around to re-invoking collapse into
/// one re-run that sees the latest state.
#[test]
fn host_coalesces_signals() {
    let store = MemoryStore::new(AppState::with_counter(0));
    let queue = RenderQueue::new();
    let id = ConsumerId::new();
    let engine = SyncEngine::new(queue.notifier(id));
    let inputs = SelectInputs::new(store.handle(), Selector::new(|s: &AppState| s.counter));

    engine.render(&inputs).unwrap();
    engine.attach(&inputs);

    store.replace(AppState::with_counter(1));
    store.replace(AppState::with_counter(2));
    assert_eq!(queue.signals_received(), 2);
    assert_eq!(queue.len(), 1);

    let mut seen = Vec::new();
    let reruns = queue.flush(|consumer| {
        assert_eq!(consumer, id);
        seen.push(engine.render(&inputs).unwrap());
        engine.attach(&inputs);
    });

    assert_eq!(reruns, 1);
    assert_eq!(seen, vec![2]);
}

/// Consumers find their store through scopes, and a boundary relays changes
/// from its parent scope.
#[test]
fn scoped_consumers_chain_through_boundary() {
    let store = MemoryStore::new(AppState::with_counter(0));
    let order = Arc::new(Mutex::new(Vec::new()));

    let recorder = |name: &'static str| {
        let order = order.clone();
        move || order.lock().push(name)
    };

    let _root = StoreScope::provide(store.handle());
    let outer = SyncEngine::new(recorder("outer"));
    let outer_inputs = StoreScope::current::<AppState>()
        .unwrap()
        .inputs(Selector::new(|s: &AppState| s.counter));
    outer.render(&outer_inputs).unwrap();
    outer.attach(&outer_inputs);

    let boundary = StoreScope::nest::<AppState>().unwrap();
    let inner = SyncEngine::new(recorder("inner"));
    let inner_inputs = StoreScope::current::<AppState>()
        .unwrap()
        .inputs(Selector::new(|s: &AppState| s.counter * 2));
    assert!(Arc::ptr_eq(
        inner_inputs.upstream.as_ref().unwrap(),
        boundary.subscription()
    ));
    inner.render(&inner_inputs).unwrap();
    inner.attach(&inner_inputs);

    // Only the root scope talks to the store
    assert_eq!(store.subscribe_count(), 1);

    store.replace(AppState::with_counter(1));
    assert_eq!(*order.lock(), vec!["outer", "inner"]);
    assert_eq!(inner.render(&inner_inputs).unwrap(), 2);

    inner.detach();
    drop(boundary);
    store.replace(AppState::with_counter(2));
    assert_eq!(*order.lock(), vec!["outer", "inner", "outer"]);
}

/// Without a provided store, scope lookup reports it.
#[test]
fn missing_scope_is_an_error() {
    let err = StoreScope::current::<AppState>().err().unwrap();
    assert!(matches!(err, SelectError::NoStore));
}

/// Options load from JSON and drive the development checks.
#[test]
fn options_from_json_enable_checks() {
    let options = SelectorOptions::from_json(r#"{ "stability_check": "always" }"#).unwrap();
    let store = MemoryStore::new(AppState::with_counter(0));
    let (_, notify) = counting_notify();
    let engine = SyncEngine::with_options(notify, options);

    // A fresh Vec each call is still equal under the default policy
    let items = Selector::new(|s: &AppState| s.items.clone());
    let inputs = SelectInputs::new(store.handle(), items);
    engine.render(&inputs).unwrap();
    assert_eq!(engine.snapshot().stability_warnings, 0);

    // ...but not when compared by pointer
    let wrapped = Selector::new(|s: &AppState| Arc::new(s.items.clone()));
    let inputs = SelectInputs::new(store.handle(), wrapped).with_equality(Equality::by_ptr());
    let wrapped_engine = SyncEngine::with_options(|| {}, options);
    wrapped_engine.render(&inputs).unwrap();
    assert_eq!(wrapped_engine.snapshot().stability_warnings, 1);
}

/// The diagnostics snapshot tracks the lifecycle.
#[test]
fn snapshot_follows_lifecycle() {
    let store = MemoryStore::new(AppState::with_counter(0));
    let notified = Arc::new(AtomicUsize::new(0));
    let notified_clone = notified.clone();
    let engine = SyncEngine::new(move || {
        notified_clone.fetch_add(1, Ordering::SeqCst);
    });
    let inputs = SelectInputs::new(store.handle(), unlucky_selector());

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.phase, Phase::Unattached);
    assert!(!snapshot.has_value);

    engine.render(&inputs).unwrap();
    engine.attach(&inputs);
    store.replace(AppState::with_counter(13));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.phase, Phase::Attached);
    assert!(snapshot.has_value);
    assert!(snapshot.has_error);
    assert_eq!(snapshot.deferred_faults, 1);
    assert_eq!(snapshot.notifications, notified.load(Ordering::SeqCst) as u64);

    drop(engine);
    assert_eq!(store.unsubscribe_count(), 1);
}
