//! Conformance suite for the settlement core and dispatcher: exactly-once
//! resolution under races, sentinel no-ops, progress semantics, async-always
//! delivery, and ordering.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use vow::{ContextHandle, ContractViolation, Promise, ReactionSet, Resolution, SerialContext};

const WAIT: Duration = Duration::from_secs(5);

fn serial(name: &str) -> ContextHandle {
    Arc::new(SerialContext::named(name))
}

#[test]
fn exactly_one_resolver_wins_a_race() {
    for round in 0..50 {
        let promise: Promise<u32, String> = Promise::new();
        let wins = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));
        let mut handles = Vec::new();

        for i in 0..8u32 {
            let p = promise.clone();
            let w = Arc::clone(&wins);
            let b = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                b.wait();
                let outcome = if i % 2 == 0 {
                    p.resolve_value(i)
                } else {
                    p.resolve_error(Some(format!("err-{i}")))
                };
                match outcome {
                    Ok(()) => {
                        w.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(violation) => {
                        assert_eq!(violation, ContractViolation::AlreadyResolved);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().expect("resolver thread panicked");
        }

        assert_eq!(
            wins.load(Ordering::Relaxed),
            1,
            "round {round}: exactly one resolver must win"
        );
        assert!(promise.is_resolved());
    }
}

#[test]
fn losing_resolvers_leave_the_outcome_untouched() {
    let ctx = serial("conf-untouched");
    let promise: Promise<u32, String> = Promise::new();
    promise.resolve_value(7).expect("first resolution");

    assert!(promise.resolve_value(8).is_err());
    assert!(promise.resolve_error(Some("late".into())).is_err());

    let (tx, rx) = mpsc::channel();
    let _child = promise
        .then_on(ctx, move |v| {
            tx.send(v).expect("send observed value");
            Resolution::Value(v)
        })
        .expect("registers");

    assert_eq!(rx.recv_timeout(WAIT), Ok(7));
}

#[test]
fn resolving_with_no_error_is_a_noop_and_delivers_nothing() {
    let ctx = serial("conf-noop");
    let promise: Promise<u32, String> = Promise::new();

    let (tx, rx) = mpsc::channel::<Result<u32, String>>();
    let _child = promise
        .on_completion_on(ctx, move |outcome| {
            tx.send(outcome.clone()).expect("send outcome");
            match outcome {
                Ok(v) => Resolution::Value(v),
                Err(e) => Resolution::Error(e),
            }
        })
        .expect("registers");

    promise.resolve_error(None).expect("sentinel no-op");
    assert!(!promise.is_resolved());
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    promise.resolve_value(3).expect("still resolvable");
    assert_eq!(rx.recv_timeout(WAIT), Ok(Ok(3)));
}

#[test]
fn progress_clamps_and_rejects_after_resolution() {
    let promise: Promise<u32, String> = Promise::new();

    assert_eq!(promise.update_progress(-0.5), Ok(0.0));
    assert_eq!(promise.update_progress(2.0), Ok(1.0));

    promise.resolve_value(1).expect("resolves");
    assert_eq!(
        promise.update_progress(0.4),
        Err(ContractViolation::ProgressAfterResolution)
    );
}

#[test]
fn progress_reads_one_after_value_resolution() {
    let promise: Promise<u32, String> = Promise::new();
    promise.update_progress(0.2).expect("stores");
    promise.resolve_value(1).expect("resolves");
    assert_eq!(promise.progress(), 1.0);
}

#[test]
fn late_registration_never_runs_on_the_registering_stack() {
    let ctx = serial("conf-late");
    let promise: Promise<u32, String> = Promise::with_value(11);

    let registering_thread = thread::current().id();
    let (tx, rx) = mpsc::channel();
    let _child = promise
        .then_on(ctx, move |v| {
            tx.send((thread::current().id(), v)).expect("send");
            Resolution::Value(v)
        })
        .expect("registers on settled promise");

    let (reaction_thread, value) = rx.recv_timeout(WAIT).expect("reaction delivered");
    assert_eq!(value, 11);
    assert_ne!(
        reaction_thread, registering_thread,
        "reaction must not run synchronously during registration"
    );
}

#[test]
fn reaction_registered_during_resolution_race_is_never_dropped() {
    for _ in 0..50 {
        let ctx = serial("conf-race");
        let promise: Promise<u32, String> = Promise::new();
        let barrier = Arc::new(Barrier::new(2));

        let resolver = {
            let p = promise.clone();
            let b = Arc::clone(&barrier);
            thread::spawn(move || {
                b.wait();
                p.resolve_value(1).expect("single resolver");
            })
        };

        let (tx, rx) = mpsc::channel();
        barrier.wait();
        let _child = promise
            .then_on(ctx, move |v| {
                tx.send(v).expect("send");
                Resolution::Value(v)
            })
            .expect("registers");

        resolver.join().expect("resolver panicked");
        assert_eq!(rx.recv_timeout(WAIT), Ok(1), "reaction was dropped");
    }
}

#[test]
fn progress_notifications_preserve_registration_and_update_order() {
    let ctx = serial("conf-order");
    let promise: Promise<u32, String> = Promise::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s1 = Arc::clone(&seen);
    let p = promise.on_progress_on(Arc::clone(&ctx), move |pr| {
        s1.lock().unwrap().push((1u8, pr));
    });
    let s2 = Arc::clone(&seen);
    let _p = p.on_progress_on(Arc::clone(&ctx), move |pr| {
        s2.lock().unwrap().push((2u8, pr));
    });

    promise.update_progress(0.3).expect("stores");
    promise.update_progress(0.7).expect("stores");

    // Flush the context: a sentinel job queued after the notifications
    let (tx, rx) = mpsc::channel();
    ctx.submit(Box::new(move || tx.send(()).expect("flush")));
    rx.recv_timeout(WAIT).expect("context drained");

    let recorded = seen.lock().unwrap().clone();
    assert_eq!(
        recorded,
        vec![(1, 0.3), (2, 0.3), (1, 0.7), (2, 0.7)],
        "per-context delivery must follow registration and generation order"
    );
}

#[test]
fn concurrent_progress_updates_reach_contexts_in_one_order() {
    let ctx_a = serial("conf-multi-a");
    let ctx_b = serial("conf-multi-b");
    let promise: Promise<u32, String> = Promise::new();

    let seen_a = Arc::new(Mutex::new(Vec::new()));
    let seen_b = Arc::new(Mutex::new(Vec::new()));

    let sa = Arc::clone(&seen_a);
    let p = promise.on_progress_on(Arc::clone(&ctx_a), move |pr| {
        sa.lock().unwrap().push(pr);
    });
    let sb = Arc::clone(&seen_b);
    let _p = p.on_progress_on(Arc::clone(&ctx_b), move |pr| {
        sb.lock().unwrap().push(pr);
    });

    let barrier = Arc::new(Barrier::new(4));
    let mut writers = Vec::new();
    for i in 0..4 {
        let p = promise.clone();
        let b = Arc::clone(&barrier);
        writers.push(thread::spawn(move || {
            b.wait();
            for step in 0..10 {
                let _ = p.update_progress(f64::from(i * 10 + step) / 100.0);
            }
        }));
    }
    for w in writers {
        w.join().expect("writer panicked");
    }

    for ctx in [&ctx_a, &ctx_b] {
        let (tx, rx) = mpsc::channel();
        ctx.submit(Box::new(move || tx.send(()).expect("flush")));
        rx.recv_timeout(WAIT).expect("context drained");
    }

    let a = seen_a.lock().unwrap().clone();
    let b = seen_b.lock().unwrap().clone();
    assert_eq!(a.len(), 40);
    assert_eq!(a, b, "both contexts must observe the same global order");
}

#[test]
fn second_success_registration_is_rejected_and_first_survives() {
    let ctx = serial("conf-double");
    let promise: Promise<u32, String> = Promise::new();

    let (tx, rx) = mpsc::channel();
    let _child = promise
        .then_on(Arc::clone(&ctx), move |v| {
            tx.send(v).expect("send");
            Resolution::Value(v)
        })
        .expect("first registration");

    let second = promise.then_on(ctx, Resolution::Value);
    assert_eq!(
        second.unwrap_err(),
        ContractViolation::SuccessAlreadyRegistered
    );

    promise.resolve_value(21).expect("resolves");
    assert_eq!(
        rx.recv_timeout(WAIT),
        Ok(21),
        "first registration must be unaffected by the rejected one"
    );
}

#[test]
fn registration_without_reactions_supports_fanout() {
    let promise: Promise<u32, String> = Promise::new();

    let same_a = promise.register(ReactionSet::new()).expect("empty set");
    let same_b = promise.register(ReactionSet::new()).expect("empty set");

    // All handles observe the same settlement
    promise.resolve_value(2).expect("resolves");
    assert!(same_a.is_resolved());
    assert!(same_b.is_resolved());
}

#[test]
fn split_success_and_failure_registrations_each_get_a_child() {
    let ctx = serial("conf-split");
    let promise: Promise<u32, String> = Promise::new();

    let (tx_ok, rx_ok) = mpsc::channel();
    let ok_child = promise
        .then_on(Arc::clone(&ctx), move |v| {
            tx_ok.send(v).expect("send");
            Resolution::Value(v)
        })
        .expect("success registration");

    let err_child = promise
        .on_error_on(ctx, Resolution::Error)
        .expect("failure registration in a separate call");

    promise.resolve_value(33).expect("resolves");

    assert_eq!(rx_ok.recv_timeout(WAIT), Ok(33));

    // The failure-only link sees the value tunnel through
    let deadline = std::time::Instant::now() + WAIT;
    while !err_child.is_resolved() {
        assert!(std::time::Instant::now() < deadline, "tunnel timed out");
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(err_child.progress(), 1.0, "tunneled settlement is a value");
    drop(ok_child);
}
