use super::timer::TimeoutScheduler;
use crate::ids::RequestId;
use dashmap::DashMap;
use may::sync::mpsc;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Retry hint, in seconds, attached to the synthesized unavailable outcome
/// of an unhandled timeout.
pub const TIMEOUT_RETRY_AFTER_SECS: u64 = 1;

/// Lifecycle state of an in-flight request's task.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncState {
    /// The handler is running synchronously; no deferral requested yet.
    Active = 0,
    /// The handler deferred its result; resume, cancel, and the deadline
    /// now race for the terminal transition.
    Suspended = 1,
    /// A resume call won; terminal.
    Resumed = 2,
    /// A cancellation won; terminal.
    Cancelled = 3,
    /// The deadline elapsed unhandled; terminal.
    TimedOut = 4,
}

impl AsyncState {
    fn from_u8(raw: u8) -> AsyncState {
        match raw {
            0 => AsyncState::Active,
            1 => AsyncState::Suspended,
            2 => AsyncState::Resumed,
            3 => AsyncState::Cancelled,
            _ => AsyncState::TimedOut,
        }
    }

    /// Terminal states reject any further resume/cancel attempt.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AsyncState::Resumed | AsyncState::Cancelled | AsyncState::TimedOut
        )
    }
}

/// An error result supplied by a handler via `resume_error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
    pub status: u16,
    pub message: String,
}

impl TaskError {
    #[must_use]
    pub fn new(status: u16, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }

    /// 500-equivalent internal failure.
    #[must_use]
    pub fn internal(message: &str) -> Self {
        Self::new(500, message)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

/// Terminal result delivered exactly once to the request boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// A handler supplied a response value.
    Response(Value),
    /// A handler supplied an error result.
    Error(TaskError),
    /// The deadline elapsed with no handler-issued resume; 503-equivalent
    /// with a retry hint.
    TimedOut,
    /// An external cancellation won the race.
    Cancelled,
}

impl CompletionOutcome {
    /// The response status a transport adapter would map this outcome to.
    #[must_use]
    pub fn status_hint(&self) -> u16 {
        match self {
            CompletionOutcome::Response(_) => 200,
            CompletionOutcome::Error(e) => e.status,
            CompletionOutcome::TimedOut => 503,
            CompletionOutcome::Cancelled => 499,
        }
    }

    /// Retry hint for the unavailable outcome; `None` otherwise.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            CompletionOutcome::TimedOut => Some(TIMEOUT_RETRY_AFTER_SECS),
            _ => None,
        }
    }
}

/// Invoked on the scheduler thread when a suspended task's deadline fires.
///
/// The handler must either resume the task through the handle or request
/// more time with `set_timeout`; doing neither lets the task complete as
/// timed out after the callback returns.
pub trait TimeoutHandler: Send + Sync {
    fn on_timeout(&self, handle: &AsyncHandle);
}

/// Per-request mutable state. `state` is the arbiter: exactly one of
/// resume, cancel, or deadline-fire wins the compare-exchange out of
/// `Suspended`, regardless of interleaving.
struct AsyncTask {
    id: RequestId,
    state: AtomicU8,
    /// Bumped on every re-arm and on completion; a deadline fire whose
    /// generation no longer matches is stale and ignored.
    generation: AtomicU64,
    timeout_handler: Mutex<Option<Arc<dyn TimeoutHandler>>>,
    /// Taken exactly once by whichever transition reaches a terminal state.
    outcome_tx: Mutex<Option<mpsc::Sender<CompletionOutcome>>>,
}

impl AsyncTask {
    fn state(&self) -> AsyncState {
        AsyncState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: AsyncState, to: AsyncState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Cloneable per-request handle exposed to handler logic and the transport
/// adapter.
///
/// Every operation returns a boolean success indicator and never blocks:
/// `false` from resume/cancel means another actor already completed the
/// task ("already completed" is a normal answer, not an error).
#[derive(Clone)]
pub struct AsyncHandle {
    task: Arc<AsyncTask>,
    coordinator: Arc<CompletionCoordinator>,
}

impl AsyncHandle {
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.task.id
    }

    #[must_use]
    pub fn state(&self) -> AsyncState {
        self.task.state()
    }

    /// Defer the result. Optionally arms a deadline (falling back to the
    /// coordinator's default) and attaches a timeout handler.
    ///
    /// Returns `false` if the task is not `Active` (already suspended or
    /// completed).
    pub fn suspend(
        &self,
        timeout: Option<Duration>,
        handler: Option<Arc<dyn TimeoutHandler>>,
    ) -> bool {
        if !self.task.transition(AsyncState::Active, AsyncState::Suspended) {
            debug!(request_id = %self.task.id, state = ?self.state(), "Suspend rejected");
            return false;
        }
        if let Some(h) = handler {
            self.store_timeout_handler(h);
        }
        info!(request_id = %self.task.id, timeout = ?timeout, "Request suspended");
        if let Some(delay) = timeout.or(self.coordinator.default_timeout) {
            self.arm_deadline(delay);
        }
        true
    }

    /// Arm (or re-arm) the deadline of a suspended task. Re-arming replaces
    /// the previous deadline; a stale fire becomes a no-op. Valid from a
    /// timeout handler to request more time.
    pub fn set_timeout(&self, delay: Duration) -> bool {
        if self.state() != AsyncState::Suspended {
            return false;
        }
        self.arm_deadline(delay);
        true
    }

    /// Attach or replace the timeout handler. Rejected once terminal.
    pub fn set_timeout_handler(&self, handler: Arc<dyn TimeoutHandler>) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        self.store_timeout_handler(handler);
        true
    }

    /// Complete with a response value. Allowed from `Active` (synchronous
    /// completion without deferral) and from `Suspended`.
    pub fn resume(&self, value: Value) -> bool {
        self.finish(CompletionOutcome::Response(value))
    }

    /// Complete with an error result.
    pub fn resume_error(&self, error: TaskError) -> bool {
        self.finish(CompletionOutcome::Error(error))
    }

    /// Honor an external cancellation if no resume or deadline has won yet.
    pub fn cancel(&self) -> bool {
        if !self
            .task
            .transition(AsyncState::Suspended, AsyncState::Cancelled)
        {
            debug!(request_id = %self.task.id, state = ?self.state(), "Cancel rejected - already completed");
            return false;
        }
        self.coordinator.stats.cancelled.fetch_add(1, Ordering::Relaxed);
        self.coordinator
            .deliver(&self.task, CompletionOutcome::Cancelled);
        true
    }

    fn finish(&self, outcome: CompletionOutcome) -> bool {
        let won = self.task.transition(AsyncState::Active, AsyncState::Resumed)
            || self
                .task
                .transition(AsyncState::Suspended, AsyncState::Resumed);
        if !won {
            debug!(request_id = %self.task.id, state = ?self.state(), "Resume rejected - already completed");
            return false;
        }
        self.coordinator.stats.resumed.fetch_add(1, Ordering::Relaxed);
        self.coordinator.deliver(&self.task, outcome);
        true
    }

    fn arm_deadline(&self, delay: Duration) {
        let generation = self.task.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.coordinator.scheduler.cancel(self.task.id);
        self.coordinator
            .scheduler
            .schedule(self.task.id, generation, delay);
    }

    fn store_timeout_handler(&self, handler: Arc<dyn TimeoutHandler>) {
        let mut slot = self
            .task
            .timeout_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(handler);
    }
}

impl fmt::Debug for AsyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncHandle")
            .field("request_id", &self.task.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Counters over terminal transitions, for monitoring.
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    started: AtomicU64,
    resumed: AtomicU64,
    cancelled: AtomicU64,
    timed_out: AtomicU64,
}

impl CoordinatorStats {
    #[must_use]
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn resumed(&self) -> u64 {
        self.resumed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }
}

/// Tracks every in-flight request from entry to terminal delivery.
///
/// Owns the deadline scheduler and the registry of live tasks. Terminal
/// delivery happens exactly once per request, performed by whichever actor
/// wins the state transition; the boundary that called
/// [`CompletionCoordinator::begin`] observes it on the returned receiver.
pub struct CompletionCoordinator {
    scheduler: TimeoutScheduler,
    tasks: DashMap<RequestId, Arc<AsyncTask>>,
    stats: CoordinatorStats,
    default_timeout: Option<Duration>,
}

impl CompletionCoordinator {
    /// Create the coordinator and start its scheduler thread.
    #[must_use]
    pub fn new(default_timeout: Option<Duration>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let on_fire = {
                let weak = Weak::clone(weak);
                move |id: RequestId, generation: u64| {
                    if let Some(coordinator) = weak.upgrade() {
                        coordinator.on_deadline(id, generation);
                    }
                }
            };
            Self {
                scheduler: TimeoutScheduler::start(on_fire),
                tasks: DashMap::new(),
                stats: CoordinatorStats::default(),
                default_timeout,
            }
        })
    }

    /// Admit a request: create its task in `Active` state and hand back the
    /// async handle plus the receiver the terminal outcome arrives on.
    pub fn begin(
        self: &Arc<Self>,
        id: RequestId,
    ) -> (AsyncHandle, mpsc::Receiver<CompletionOutcome>) {
        let (tx, rx) = mpsc::channel();
        let task = Arc::new(AsyncTask {
            id,
            state: AtomicU8::new(AsyncState::Active as u8),
            generation: AtomicU64::new(0),
            timeout_handler: Mutex::new(None),
            outcome_tx: Mutex::new(Some(tx)),
        });
        self.tasks.insert(id, Arc::clone(&task));
        self.stats.started.fetch_add(1, Ordering::Relaxed);
        debug!(request_id = %id, in_flight = self.tasks.len(), "Request admitted");
        (
            AsyncHandle {
                task,
                coordinator: Arc::clone(self),
            },
            rx,
        )
    }

    /// Number of requests currently tracked.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    /// Deadline fire, on the scheduler thread.
    fn on_deadline(self: &Arc<Self>, id: RequestId, generation: u64) {
        let Some(task) = self.tasks.get(&id).map(|entry| Arc::clone(entry.value())) else {
            return;
        };
        if task.generation.load(Ordering::Acquire) != generation {
            // Re-armed or completed after this entry was queued.
            return;
        }
        if task.state() != AsyncState::Suspended {
            return;
        }

        let handler = task
            .timeout_handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(handler) = handler {
            let handle = AsyncHandle {
                task: Arc::clone(&task),
                coordinator: Arc::clone(self),
            };
            debug!(request_id = %id, "Invoking timeout handler");
            handler.on_timeout(&handle);
            if task.generation.load(Ordering::Acquire) != generation {
                // Handler requested more time; the no-op extension keeps
                // the task suspended.
                info!(request_id = %id, "Timeout handler extended the deadline");
                return;
            }
        }

        if task.transition(AsyncState::Suspended, AsyncState::TimedOut) {
            warn!(request_id = %id, "Request timed out");
            self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
            self.deliver(&task, CompletionOutcome::TimedOut);
        }
    }

    /// One-shot handoff of the terminal outcome; the caller must have won
    /// the state transition first.
    fn deliver(&self, task: &Arc<AsyncTask>, outcome: CompletionOutcome) {
        // Invalidate any pending deadline before dropping the registry entry.
        task.generation.fetch_add(1, Ordering::AcqRel);
        self.scheduler.cancel(task.id);
        self.tasks.remove(&task.id);

        let tx = task
            .outcome_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match tx {
            Some(tx) => {
                info!(
                    request_id = %task.id,
                    status_hint = outcome.status_hint(),
                    state = ?task.state(),
                    "Terminal outcome delivered"
                );
                if tx.send(outcome).is_err() {
                    warn!(request_id = %task.id, "Request boundary dropped before delivery");
                }
            }
            None => {
                // The CAS gate makes this unreachable; log rather than panic.
                error!(request_id = %task.id, "Terminal outcome already delivered");
            }
        }
    }
}

impl fmt::Debug for CompletionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionCoordinator")
            .field("in_flight", &self.tasks.len())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn synchronous_resume_from_active() {
        let coordinator = CompletionCoordinator::new(None);
        let (handle, rx) = coordinator.begin(RequestId::new());
        assert_eq!(handle.state(), AsyncState::Active);
        assert!(handle.resume(json!({"ok": true})));
        assert_eq!(handle.state(), AsyncState::Resumed);
        let outcome = rx.recv().unwrap();
        assert_eq!(outcome, CompletionOutcome::Response(json!({"ok": true})));
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[test]
    fn suspend_then_resume() {
        let coordinator = CompletionCoordinator::new(None);
        let (handle, rx) = coordinator.begin(RequestId::new());
        assert!(handle.suspend(None, None));
        assert_eq!(handle.state(), AsyncState::Suspended);
        assert!(!handle.suspend(None, None));
        assert!(handle.resume(json!(1)));
        assert!(!handle.resume(json!(2)));
        assert_eq!(rx.recv().unwrap(), CompletionOutcome::Response(json!(1)));
    }

    #[test]
    fn cancel_requires_suspension() {
        let coordinator = CompletionCoordinator::new(None);
        let (handle, _rx) = coordinator.begin(RequestId::new());
        assert!(!handle.cancel());
        assert!(handle.suspend(None, None));
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(handle.state(), AsyncState::Cancelled);
    }

    #[test]
    fn set_timeout_requires_suspension() {
        let coordinator = CompletionCoordinator::new(None);
        let (handle, _rx) = coordinator.begin(RequestId::new());
        assert!(!handle.set_timeout(Duration::from_millis(10)));
        assert!(handle.suspend(None, None));
        assert!(handle.set_timeout(Duration::from_secs(60)));
    }

    #[test]
    fn outcome_status_hints() {
        assert_eq!(CompletionOutcome::Response(json!(null)).status_hint(), 200);
        assert_eq!(
            CompletionOutcome::Error(TaskError::new(404, "missing")).status_hint(),
            404
        );
        assert_eq!(CompletionOutcome::TimedOut.status_hint(), 503);
        assert_eq!(
            CompletionOutcome::TimedOut.retry_after_secs(),
            Some(TIMEOUT_RETRY_AFTER_SECS)
        );
        assert_eq!(CompletionOutcome::Cancelled.status_hint(), 499);
    }
}
