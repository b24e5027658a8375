//! # Dispatcher Module
//!
//! The engine facade: resolve a request to a routing decision, hand it to
//! the selected handler coroutine, and track it to its terminal outcome.
//!
//! ## Overview
//!
//! [`RoutingEngine`] composes the immutable pieces built at startup (the
//! endpoint model, its match tree, the handler registry) with the one
//! stateful piece (the completion coordinator). Dispatch never blocks on a
//! handler: every admitted request gets a receiver that yields its
//! [`CompletionOutcome`](crate::completion::CompletionOutcome) exactly once,
//! whether the handler resumes synchronously, suspends and resumes from
//! another thread, times out, or is cancelled.
//!
//! Handlers run on `may` coroutines with panic recovery. A panic, a missing
//! handler, a closed handler channel, and a handler that returns without
//! responding all complete the request as an error outcome; nothing is
//! silently dropped.

mod core;

pub use core::{
    DispatchOutcome, HandlerRequest, HandlerSender, RequestDescriptor, RoutingDecision,
    RoutingEngine,
};
