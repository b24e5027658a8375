use crate::ids::RequestId;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// One armed deadline. The generation ties the entry to a specific
/// `set_timeout` call so a re-armed or completed task turns stale entries
/// into no-ops.
struct TimerEntry {
    deadline: Instant,
    id: RequestId,
    generation: u64,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.generation.cmp(&other.generation))
    }
}

struct SchedulerState {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    shutdown: bool,
}

struct SchedulerShared {
    state: Mutex<SchedulerState>,
    signal: Condvar,
}

/// Clock-driven deadline scheduler.
///
/// One background thread waits on a deadline-ordered heap with a condvar,
/// firing the callback when the earliest deadline elapses. Scheduling and
/// canceling are O(log n) / O(n) heap operations under a short critical
/// section; the callback runs on the scheduler thread, off any request
/// path, and is expected to race with application threads (the completion
/// state machine arbitrates with CAS, not this scheduler).
pub struct TimeoutScheduler {
    shared: Arc<SchedulerShared>,
    thread: Option<JoinHandle<()>>,
}

impl TimeoutScheduler {
    /// Start the scheduler thread. `callback` receives the request id and
    /// the generation the deadline was armed with.
    pub fn start<F>(callback: F) -> Self
    where
        F: Fn(RequestId, u64) + Send + 'static,
    {
        let shared = Arc::new(SchedulerShared {
            state: Mutex::new(SchedulerState {
                heap: BinaryHeap::new(),
                shutdown: false,
            }),
            signal: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("routewise-deadline-scheduler".to_string())
            .spawn(move || run_scheduler(&thread_shared, callback));

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!(error = %e, "Failed to spawn deadline scheduler thread");
                None
            }
        };

        Self { shared, thread }
    }

    /// Arm a deadline `delay` from now.
    pub fn schedule(&self, id: RequestId, generation: u64, delay: Duration) {
        let deadline = Instant::now() + delay;
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.heap.push(Reverse(TimerEntry {
            deadline,
            id,
            generation,
        }));
        drop(state);
        self.signal();
        debug!(request_id = %id, generation, delay_ms = delay.as_millis() as u64, "Deadline armed");
    }

    /// Remove every pending entry for a request so no callback outlives it.
    pub fn cancel(&self, id: RequestId) {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.heap.retain(|Reverse(entry)| entry.id != id);
        drop(state);
        self.signal();
    }

    fn signal(&self) {
        self.shared.signal.notify_all();
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.shutdown = true;
        }
        self.signal();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn run_scheduler<F>(shared: &SchedulerShared, callback: F)
where
    F: Fn(RequestId, u64),
{
    let mut state = shared
        .state
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    loop {
        if state.shutdown {
            break;
        }

        let next_deadline = state.heap.peek().map(|Reverse(entry)| entry.deadline);
        match next_deadline {
            None => {
                state = shared
                    .signal
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    if let Some(Reverse(entry)) = state.heap.pop() {
                        drop(state);
                        debug!(request_id = %entry.id, generation = entry.generation, "Deadline fired");
                        callback(entry.id, entry.generation);
                        state = shared
                            .state
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                } else {
                    let (guard, _) = shared
                        .signal
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                }
            }
        }
    }
}
