//! Integration Tests for the Store Engine
//!
//! These tests mount producers and consumers on a real host and drive them
//! through render passes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use tether_core::host::{Cleanup, Element, Host, InstanceId, RenderCx, StateSetter};
use tether_core::store::{GlobalStore, ScopedStore, StoreRegistry, StoreRoot, SubscriberId};
use tether_core::{Error, StoreOptions};

#[derive(Clone)]
struct Counter {
    count: i32,
    set: StateSetter<i32>,
}

impl Counter {
    fn increment(&self) {
        self.set.update(|count| count + 1);
    }
}

fn counter(cx: &mut RenderCx<'_>) -> Counter {
    let (count, set) = cx.use_state(|| 0);
    Counter { count, set }
}

type Log<V> = Arc<Mutex<Vec<(InstanceId, Option<Arc<V>>)>>>;

/// A consumer element that records every value it renders with.
fn recorder<V, F>(read: F) -> (Element, Log<V>)
where
    V: Send + Sync + 'static,
    F: Fn(&mut RenderCx<'_>) -> Option<Arc<V>> + Send + Sync + 'static,
{
    let log: Log<V> = Arc::new(Mutex::new(Vec::new()));
    let element = {
        let log = log.clone();
        Element::from_fn(move |cx| {
            let value = read(cx);
            log.lock().push((cx.instance(), value));
            Vec::new()
        })
    };
    (element, log)
}

fn last<V>(log: &Log<V>) -> Arc<V> {
    log.lock()
        .last()
        .and_then(|(_, value)| value.clone())
        .expect("consumer rendered with a value")
}

/// A parent with a boolean toggle, rendering `child` while it is on.
fn toggle(child: Element) -> (Element, Arc<Mutex<Option<StateSetter<bool>>>>) {
    let setter = Arc::new(Mutex::new(None));
    let element = {
        let setter = setter.clone();
        Element::from_fn(move |cx| {
            let (on, set) = cx.use_state(|| true);
            *setter.lock() = Some(set);
            if on {
                vec![child.clone()]
            } else {
                Vec::new()
            }
        })
    };
    (element, setter)
}

/// Test that a consumer sees the counter's first value and the incremented
/// one after the next commit.
#[test]
fn scoped_counter_increments_after_commit() {
    let host = Host::default();
    let store = ScopedStore::new(counter);
    let (consumer, log) = recorder({
        let store = store.clone();
        move |cx| store.use_store(cx)
    });

    // Mount the provider with one consumer
    host.mount(store.provider((), vec![consumer])).unwrap();
    assert_eq!(last(&log).count, 0);

    // Nothing changes until the next pass commits
    last(&log).increment();
    assert_eq!(last(&log).count, 0);
    host.flush().unwrap();
    assert_eq!(last(&log).count, 1);

    // The consumer never rendered without a value.
    assert!(log.lock().iter().all(|(_, value)| value.is_some()));
}

/// Test that two providers of the same store keep independent state.
#[test]
fn providers_of_one_store_are_independent() {
    let host = Host::default();
    let store = ScopedStore::new(counter);
    let read = |store: &ScopedStore<Counter>| {
        let store = store.clone();
        recorder(move |cx| store.use_store(cx))
    };
    let (first, first_log) = read(&store);
    let (second, second_log) = read(&store);

    // Two sibling providers, one consumer each
    let left = store.provider((), vec![first]);
    let right = store.provider((), vec![second]);
    host.mount(Element::from_fn(move |_| vec![left.clone(), right.clone()]))
        .unwrap();

    // Only the first provider's counter moves
    last(&first_log).increment();
    last(&first_log).increment();
    host.flush().unwrap();

    assert_eq!(last(&first_log).count, 2);
    assert_eq!(last(&second_log).count, 0);
    assert_eq!(second_log.lock().len(), 1);
}

/// Test that a global store reading another converges one pass after the
/// store it reads.
#[test]
fn dependent_global_store_converges_in_one_extra_pass() {
    let registry = Arc::new(StoreRegistry::new());
    let a = GlobalStore::named(&registry, "a", counter);
    let b = {
        let a = a.clone();
        GlobalStore::named(&registry, "b", move |cx| {
            a.use_store(cx).map_or(-1, |a| a.count)
        })
    };

    let host = Host::default();
    host.mount(StoreRoot::element(registry, Vec::new())).unwrap();
    assert_eq!(b.get().as_deref(), Some(&0));

    // A commits in the first pass, B follows in the second
    a.get().unwrap().increment();
    let passes = host.flush().unwrap();

    assert_eq!(a.get().unwrap().count, 1);
    assert_eq!(b.get().as_deref(), Some(&1));
    assert_eq!(passes, 2);
}

/// Test that containers notify once per commit after the first, and never
/// for the initial value or for root re-renders.
#[test]
fn notify_count_matches_later_commits() {
    let registry = Arc::new(StoreRegistry::new());
    let store = GlobalStore::named(&registry, "count", counter);
    let host = Host::default();
    host.mount(StoreRoot::element(registry.clone(), Vec::new()))
        .unwrap();
    // The initial value went out without a notification
    assert_eq!(store.container().notify_count(), 0);

    for _ in 0..3 {
        store.get().unwrap().increment();
        host.flush().unwrap();
    }
    assert_eq!(store.container().notify_count(), 3);

    // Re-renders the root; the memoized executor bails out.
    GlobalStore::named(&registry, "other", |_| ());
    host.flush().unwrap();
    assert_eq!(store.container().notify_count(), 3);
}

struct Point {
    x: i32,
    y: i32,
    set: StateSetter<(i32, i32)>,
}

/// Test that a projection hides changes outside the projected fields.
#[test]
fn projection_filters_unrelated_changes() {
    let registry = Arc::new(StoreRegistry::new());
    let point = GlobalStore::named(&registry, "point", |cx| {
        let ((x, y), set) = cx.use_state(|| (1, 2));
        Point { x, y, set }
    });
    let (consumer, log) = recorder({
        let point = point.clone();
        move |cx| point.use_store_with(cx, |p: &Point| vec![p.x])
    });

    let host = Host::default();
    host.mount(StoreRoot::element(registry, vec![consumer]))
        .unwrap();
    assert_eq!(log.lock().len(), 1);

    // Change only the unprojected field
    point.get().unwrap().set.set((1, 3));
    host.flush().unwrap();
    assert_eq!(point.get().unwrap().y, 3);
    assert_eq!(log.lock().len(), 1);
    assert_eq!((last(&log).x, last(&log).y), (1, 2));

    // Change the projected field
    point.get().unwrap().set.set((2, 3));
    host.flush().unwrap();
    assert_eq!(log.lock().len(), 2);
    assert_eq!((last(&log).x, last(&log).y), (2, 3));
}

/// Test that a subscriber removing itself and another during notify does
/// not skip the remaining ones.
#[test]
fn unsubscribing_during_commit_notify_is_safe() {
    let registry = Arc::new(StoreRegistry::new());
    let store = GlobalStore::named(&registry, "count", counter);
    let host = Host::default();
    host.mount(StoreRoot::element(registry, Vec::new())).unwrap();

    // Subscriber "b" removes itself and "c" when it runs
    let calls = Arc::new(Mutex::new(Vec::new()));
    let ids = Arc::new(Mutex::new(Vec::<SubscriberId>::new()));
    for name in ["a", "b", "c", "d"] {
        let container = Arc::downgrade(store.container());
        let calls = calls.clone();
        let ids_for_callback = ids.clone();
        let id = store.container().subscribe(move || {
            calls.lock().push(name);
            if name == "b" {
                let ids = ids_for_callback.lock().clone();
                if let Some(container) = container.upgrade() {
                    container.unsubscribe(ids[1]);
                    container.unsubscribe(ids[2]);
                }
            }
        });
        ids.lock().push(id);
    }

    store.get().unwrap().increment();
    host.flush().unwrap();
    assert_eq!(*calls.lock(), vec!["a", "b", "d"]);
    assert_eq!(store.container().subscriber_count(), 2);
}

/// Test that a store registered after the root mounted is picked up on the
/// next pass without remounting other consumers.
#[test]
fn late_global_store_mounts_without_remounting_consumers() {
    let registry = Arc::new(StoreRegistry::new());
    let early = GlobalStore::named(&registry, "early", counter);
    let mounts = Arc::new(AtomicUsize::new(0));

    let (early_consumer, early_log) = recorder({
        let early = early.clone();
        let mounts = mounts.clone();
        move |cx| {
            let mounts = mounts.clone();
            cx.use_effect_with((), move || {
                mounts.fetch_add(1, Ordering::SeqCst);
                None
            });
            early.use_store(cx)
        }
    });

    let late_slot = Arc::new(Mutex::new(None::<GlobalStore<&'static str>>));
    let late_log: Log<&'static str> = Arc::new(Mutex::new(Vec::new()));
    let late_host = {
        let late_slot = late_slot.clone();
        let late_log = late_log.clone();
        Element::from_fn(move |_| {
            let Some(late) = late_slot.lock().clone() else {
                return Vec::new();
            };
            let late_log = late_log.clone();
            vec![Element::from_fn(move |cx| {
                let value = late.use_store(cx);
                late_log.lock().push((cx.instance(), value));
                Vec::new()
            })]
        })
    };

    let host = Host::default();
    host.mount(StoreRoot::element(
        registry.clone(),
        vec![early_consumer, late_host],
    ))
    .unwrap();
    let early_instance = early_log.lock()[0].0;

    // Register a new store after the root has rendered
    let late = GlobalStore::named(&registry, "late", |_| "ready");
    *late_slot.lock() = Some(late.clone());
    assert_eq!(host.flush().unwrap(), 1);

    assert_eq!(*last(&late_log), "ready");
    assert_eq!(late_log.lock().len(), 1);
    assert_eq!(mounts.load(Ordering::SeqCst), 1);
    assert!(early_log.lock().iter().all(|(id, _)| *id == early_instance));
    assert_eq!(early.container().notify_count(), 0);
}

/// Test that memoized providers skip the producer on parent re-renders
/// unless the arguments change.
#[test]
fn memo_option_controls_parent_triggered_runs() {
    fn run(memo: bool) -> (usize, usize) {
        let runs = Arc::new(AtomicUsize::new(0));
        let store = {
            let runs = runs.clone();
            ScopedStore::with_args_and_options(
                move |_, step: &i32| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    *step * 2
                },
                StoreOptions::default().memo(memo),
            )
        };
        let (consumer, log) = recorder({
            let store = store.clone();
            move |cx| store.use_store(cx)
        });

        let setter = Arc::new(Mutex::new(None::<StateSetter<(u32, i32)>>));
        let parent = {
            let setter = setter.clone();
            Element::from_fn(move |cx| {
                let ((_, step), set) = cx.use_state(|| (0u32, 1));
                *setter.lock() = Some(set);
                vec![store.provider(step, vec![consumer.clone()])]
            })
        };
        let host = Host::default();
        host.mount(parent).unwrap();
        let set = setter.lock().clone().unwrap();

        // Re-render the parent with the same args
        set.update(|(tick, step)| (tick + 1, *step));
        host.flush().unwrap();
        let after_same_args = runs.load(Ordering::SeqCst);

        // Re-render the parent with new args
        set.update(|(tick, _)| (tick + 1, 5));
        host.flush().unwrap();
        assert_eq!(*last(&log), 10);
        (after_same_args, runs.load(Ordering::SeqCst))
    }

    assert_eq!(run(true), (1, 2));
    assert_eq!(run(false), (2, 3));
}

/// Test that unmounting a consumer removes its subscription.
#[test]
fn unmounted_consumer_unsubscribes() {
    let registry = Arc::new(StoreRegistry::new());
    let store = GlobalStore::named(&registry, "count", counter);
    let (consumer, log) = recorder({
        let store = store.clone();
        move |cx| store.use_store(cx)
    });
    let (parent, setter) = toggle(consumer);

    let host = Host::default();
    host.mount(StoreRoot::element(registry, vec![parent])).unwrap();
    assert_eq!(store.container().subscriber_count(), 1);

    // Toggle the consumer out of the tree
    setter.lock().clone().unwrap().set(false);
    host.flush().unwrap();
    assert_eq!(store.container().subscriber_count(), 0);

    // Later commits no longer reach it
    store.get().unwrap().increment();
    host.flush().unwrap();
    assert_eq!(log.lock().len(), 1);
}

/// Test that unmounting the host tears down every subscription.
#[test]
fn host_unmount_releases_subscriptions() {
    let host = Host::default();
    let store = ScopedStore::new(counter);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let consumer = {
        let store = store.clone();
        let seen = seen.clone();
        Element::from_fn(move |cx| {
            store.use_store(cx);
            let seen = seen.clone();
            cx.use_effect_with((), move || {
                Some(Box::new(move || seen.lock().push("released")) as Cleanup)
            });
            Vec::new()
        })
    };
    host.mount(store.provider((), vec![consumer])).unwrap();

    // Tear down the whole tree
    host.unmount();

    assert_eq!(*seen.lock(), vec!["released"]);
    assert_eq!(host.instance_count(), 0);
}

/// Test that reading a scoped store outside its provider degrades instead
/// of failing the render.
#[test]
fn missing_provider_reads_are_non_fatal() {
    let store = ScopedStore::with_options(counter, StoreOptions::default().named("counter"));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let (consumer, log) = recorder({
        let store = store.clone();
        let errors = errors.clone();
        move |cx| {
            if let Err(err) = store.try_use_store(cx) {
                errors.lock().push(err.to_string());
            }
            store.use_store(cx)
        }
    });

    // A second consumer reads through a real provider
    let (inside, inside_log) = recorder({
        let store = store.clone();
        move |cx| store.use_store(cx)
    });
    let provider = store.provider((), vec![inside]);

    let host = Host::default();
    host.mount(Element::from_fn(move |_| {
        vec![provider.clone(), consumer.clone()]
    }))
    .unwrap();

    assert!(log.lock()[0].1.is_none());
    assert_eq!(last(&inside_log).count, 0);
    assert_eq!(errors.lock().len(), 1);
    assert!(errors.lock()[0].contains("`counter`"));
}

/// Test that a global store read without a root stays absent.
#[test]
fn global_store_without_root_is_absent() {
    let registry = StoreRegistry::new();
    let store = GlobalStore::named(&registry, "orphan", counter);
    let (consumer, log) = recorder({
        let store = store.clone();
        move |cx| store.use_store(cx)
    });

    // Mount the consumer with no root anywhere
    let host = Host::default();
    host.mount(consumer).unwrap();

    assert!(log.lock()[0].1.is_none());
    assert!(store.get().is_none());
    assert!(matches!(store.try_get(), Err(Error::NotMounted { .. })));
}

/// Test that a consumer mounted before the root sees the first value once
/// the root mounts.
#[test]
fn consumer_mounted_before_root_sees_first_value() {
    let registry = Arc::new(StoreRegistry::new());
    let store = GlobalStore::named(&registry, "seven", |_| 7);
    let (consumer, log) = recorder({
        let store = store.clone();
        move |cx| store.use_store(cx)
    });

    // The root joins the tree as the consumer's sibling once toggled on
    let setter = Arc::new(Mutex::new(None::<StateSetter<bool>>));
    let parent = {
        let setter = setter.clone();
        Element::from_fn(move |cx| {
            let (with_root, set) = cx.use_state(|| false);
            *setter.lock() = Some(set);
            let mut children = vec![consumer.clone()];
            if with_root {
                children.push(StoreRoot::element(Arc::clone(&registry), Vec::new()));
            }
            children
        })
    };

    let host = Host::default();
    host.mount(parent).unwrap();
    assert!(log.lock()[0].1.is_none());
    let consumer_instance = log.lock()[0].0;

    // Mount the root and let the consumer catch up
    setter.lock().clone().unwrap().set(true);
    host.flush().unwrap();

    assert_eq!(*last(&log), 7);
    assert!(log.lock().iter().all(|(id, _)| *id == consumer_instance));
    assert_eq!(store.container().notify_count(), 0);
}

/// Test that a consumer registering a global store during its own render
/// sees the value once the root mounts the new executor.
#[test]
fn store_registered_during_render_reaches_its_consumer() {
    let registry = Arc::new(StoreRegistry::new());
    let (consumer, log) = recorder({
        let registry = registry.clone();
        move |cx| {
            // Register once, on first render
            let store = cx.use_ref(|| GlobalStore::named(&registry, "lazy", |_| 7));
            let store = store.lock().clone();
            store.use_store(cx)
        }
    });

    let host = Host::default();
    host.mount(StoreRoot::element(registry.clone(), vec![consumer]))
        .unwrap();

    // The first render ran before the store existed
    assert!(log.lock()[0].1.is_none());
    assert_eq!(registry.len(), 1);
    assert_eq!(*last(&log), 7);
}
