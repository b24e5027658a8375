//! # Completion Module
//!
//! The suspend/resume/timeout/cancel state machine for requests whose
//! handlers defer their result.
//!
//! ## Overview
//!
//! Every request admitted by the engine gets an [`AsyncHandle`] and a
//! one-shot receiver for its [`CompletionOutcome`]. A handler may complete
//! synchronously (`resume` while still `Active`) or suspend and complete
//! later from any thread. Three actors race for the terminal transition of
//! a suspended task:
//!
//! - the application thread calling `resume` / `resume_error`,
//! - the deadline scheduler firing a timeout,
//! - an external caller invoking `cancel`.
//!
//! Exactly one wins, enforced by a compare-exchange on the task's atomic
//! state rather than coarse locking; the losers get a `false` return.
//! Whoever wins also performs the exactly-once handoff of the terminal
//! outcome to the request boundary.
//!
//! ## Deadlines
//!
//! Deadlines are armed on a clock-driven [`TimeoutScheduler`] and are
//! cancelable: completing a task bumps its generation counter and removes
//! pending entries, so a timer callback never outlives its request. A
//! registered [`TimeoutHandler`] runs on the scheduler thread and may
//! resume the task or request more time with `set_timeout`; doing neither
//! lets the task finish as [`CompletionOutcome::TimedOut`].

mod core;
mod timer;

pub use core::{
    AsyncHandle, AsyncState, CompletionCoordinator, CompletionOutcome, CoordinatorStats,
    TaskError, TimeoutHandler, TIMEOUT_RETRY_AFTER_SECS,
};
pub use timer::TimeoutScheduler;
