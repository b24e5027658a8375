//! Tests for the async completion lifecycle: the resume/cancel/timeout
//! race, exactly-once delivery, deadline extension, and re-arming.

mod common;

use common::init_tracing;
use routewise::completion::{
    AsyncHandle, AsyncState, CompletionCoordinator, CompletionOutcome, TaskError, TimeoutHandler,
};
use routewise::ids::RequestId;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn concurrent_resumes_deliver_exactly_once() {
    init_tracing();
    let coordinator = CompletionCoordinator::new(None);
    let (handle, rx) = coordinator.begin(RequestId::new());
    assert!(handle.suspend(None, None));

    let successes = Arc::new(AtomicUsize::new(0));
    let mut threads = Vec::new();
    for i in 0..8 {
        let handle = handle.clone();
        let successes = Arc::clone(&successes);
        threads.push(thread::spawn(move || {
            if handle.resume(json!({ "winner": i })) {
                successes.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert!(matches!(
        rx.recv().unwrap(),
        CompletionOutcome::Response(_)
    ));
    // The channel is one-shot: the sender is consumed by delivery.
    assert!(rx.recv().is_err());
    assert_eq!(coordinator.stats().resumed(), 1);
    assert_eq!(coordinator.in_flight(), 0);
}

#[test]
fn unhandled_deadline_times_the_request_out() {
    init_tracing();
    let coordinator = CompletionCoordinator::new(None);
    let (handle, rx) = coordinator.begin(RequestId::new());
    assert!(handle.suspend(Some(Duration::from_millis(50)), None));

    assert_eq!(rx.recv().unwrap(), CompletionOutcome::TimedOut);
    assert_eq!(handle.state(), AsyncState::TimedOut);
    // Late resumes lose quietly.
    assert!(!handle.resume(json!("too late")));
    assert_eq!(coordinator.stats().timed_out(), 1);
}

#[test]
fn default_timeout_applies_when_suspend_gives_none() {
    init_tracing();
    let coordinator = CompletionCoordinator::new(Some(Duration::from_millis(50)));
    let (handle, rx) = coordinator.begin(RequestId::new());
    assert!(handle.suspend(None, None));
    assert_eq!(rx.recv().unwrap(), CompletionOutcome::TimedOut);
    assert_eq!(handle.state(), AsyncState::TimedOut);
}

#[test]
fn cancellation_beats_a_distant_deadline() {
    init_tracing();
    let coordinator = CompletionCoordinator::new(None);
    let (handle, rx) = coordinator.begin(RequestId::new());
    assert!(handle.suspend(Some(Duration::from_secs(60)), None));
    assert!(handle.cancel());
    assert_eq!(rx.recv().unwrap(), CompletionOutcome::Cancelled);
    assert!(!handle.resume(json!(1)));
    assert_eq!(coordinator.stats().cancelled(), 1);
}

struct ResumingHandler;

impl TimeoutHandler for ResumingHandler {
    fn on_timeout(&self, handle: &AsyncHandle) {
        handle.resume_error(TaskError::new(504, "backend deadline exceeded"));
    }
}

#[test]
fn timeout_handler_can_resume_the_request() {
    init_tracing();
    let coordinator = CompletionCoordinator::new(None);
    let (handle, rx) = coordinator.begin(RequestId::new());
    assert!(handle.suspend(Some(Duration::from_millis(50)), Some(Arc::new(ResumingHandler))));

    match rx.recv().unwrap() {
        CompletionOutcome::Error(e) => {
            assert_eq!(e.status, 504);
            assert_eq!(e.message, "backend deadline exceeded");
        }
        other => panic!("expected handler error, got {other:?}"),
    }
    assert_eq!(handle.state(), AsyncState::Resumed);
    assert_eq!(coordinator.stats().timed_out(), 0);
}

struct ExtendingHandler {
    invocations: Arc<AtomicUsize>,
}

impl TimeoutHandler for ExtendingHandler {
    fn on_timeout(&self, handle: &AsyncHandle) {
        if self.invocations.fetch_add(1, Ordering::SeqCst) == 0 {
            assert!(handle.set_timeout(Duration::from_millis(60)));
        }
        // Second fire: do nothing and let the timeout stand.
    }
}

#[test]
fn timeout_handler_can_extend_the_deadline_once() {
    init_tracing();
    let invocations = Arc::new(AtomicUsize::new(0));
    let coordinator = CompletionCoordinator::new(None);
    let (handle, rx) = coordinator.begin(RequestId::new());
    assert!(handle.suspend(
        Some(Duration::from_millis(40)),
        Some(Arc::new(ExtendingHandler {
            invocations: Arc::clone(&invocations),
        })),
    ));

    // The extension keeps the task suspended past the first deadline.
    thread::sleep(Duration::from_millis(60));
    assert_eq!(handle.state(), AsyncState::Suspended);

    assert_eq!(rx.recv().unwrap(), CompletionOutcome::TimedOut);
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
}

#[test]
fn rearming_replaces_the_previous_deadline() {
    init_tracing();
    let coordinator = CompletionCoordinator::new(None);
    let (handle, rx) = coordinator.begin(RequestId::new());
    assert!(handle.suspend(Some(Duration::from_secs(60)), None));
    // Shorten the window; the stale 60s entry must not matter.
    assert!(handle.set_timeout(Duration::from_millis(50)));
    assert_eq!(rx.recv().unwrap(), CompletionOutcome::TimedOut);
}

#[test]
fn resume_from_another_thread_cancels_the_deadline() {
    init_tracing();
    let coordinator = CompletionCoordinator::new(None);
    let (handle, rx) = coordinator.begin(RequestId::new());
    assert!(handle.suspend(Some(Duration::from_millis(80)), None));

    let worker_handle = handle.clone();
    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        worker_handle.resume(json!({ "from": "worker" }))
    });

    assert_eq!(
        rx.recv().unwrap(),
        CompletionOutcome::Response(json!({ "from": "worker" }))
    );
    assert!(worker.join().unwrap());
    // Past the original deadline: no second delivery, no late transition.
    thread::sleep(Duration::from_millis(100));
    assert_eq!(handle.state(), AsyncState::Resumed);
    assert_eq!(coordinator.stats().timed_out(), 0);
}
