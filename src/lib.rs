//! # Routewise
//!
//! **Routewise** is a coroutine-powered request routing and content
//! negotiation engine for Rust, built around an immutable endpoint model
//! and an asynchronous completion lifecycle.
//!
//! ## Overview
//!
//! Routewise resolves incoming requests against a declared set of endpoints
//! in three independent stages, then tracks each admitted request to exactly
//! one terminal outcome:
//!
//! 1. **Path matching** - a segment tree over the model's path templates,
//!    with literal segments taking precedence over template variables and
//!    backtracking between them, plus sub-resource locator delegation for
//!    nested endpoint models.
//! 2. **Content negotiation** - a consumable filter over request content
//!    types followed by producible ranking weighted by client Accept
//!    quality, server-declared quality, and media type specificity.
//! 3. **Asynchronous completion** - every dispatched request carries a
//!    handle that a handler resumes now or later, from any thread, with
//!    cancelable deadlines and exactly-once outcome delivery.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - **[`model`]** - Immutable endpoint declarations, media types, and the
//!   model builder
//! - **[`router`]** - Path matching over a segment tree with template
//!   variable binding and locator delegation
//! - **[`negotiation`]** - Media type ranking and endpoint selection
//! - **[`dispatcher`]** - The engine facade: routing decisions and
//!   coroutine-based handler dispatch
//! - **[`completion`]** - The suspend/resume/timeout/cancel state machine
//!   and its deadline scheduler
//! - **[`runtime_config`]** - Environment-driven runtime tuning
//! - **[`ids`]** - ULID-based request identifiers for correlation
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Adapter as Transport Adapter
//!     participant Engine as RoutingEngine
//!     participant Matcher as PathMatcher
//!     participant Selector as negotiation::select
//!     participant Handler as Handler<br/>(Coroutine)
//!     participant Coord as CompletionCoordinator
//!
//!     Adapter->>Engine: dispatch(descriptor, body)
//!     Engine->>Matcher: resolve(method, path)
//!
//!     alt No Path Match
//!         Matcher-->>Adapter: Rejected (404)
//!     end
//!     alt Wrong Method
//!         Matcher-->>Adapter: Rejected (405 + allowed)
//!     end
//!
//!     Matcher-->>Engine: candidates + path params
//!     Engine->>Selector: select(candidates, content type, accept)
//!
//!     alt Nothing Consumable
//!         Selector-->>Adapter: Rejected (415)
//!     end
//!     alt Nothing Producible
//!         Selector-->>Adapter: Rejected (406)
//!     end
//!
//!     Selector-->>Engine: winning endpoint
//!     Engine->>Coord: begin(request id)
//!     Coord-->>Engine: handle + outcome receiver
//!     Engine->>Handler: Send via channel<br/>(HandlerRequest)
//!     Engine-->>Adapter: InFlight (receiver)
//!
//!     Note over Handler: Handler runs in<br/>may coroutine
//!     alt Synchronous
//!         Handler->>Coord: handle.resume(value)
//!     else Deferred
//!         Handler->>Coord: handle.suspend(timeout)
//!         Note over Coord: resume, cancel, and<br/>deadline race; CAS picks one
//!     end
//!
//!     Coord-->>Adapter: CompletionOutcome<br/>(exactly once)
//! ```
//!
//! ### Key Architectural Patterns
//!
//! 1. **Immutable Model**: Endpoints are declared once through a builder and
//!    never mutated; matching and negotiation run over shared read-only data
//! 2. **Coroutine-Based Concurrency**: Each handler runs in a lightweight
//!    `may` coroutine with panic recovery
//! 3. **Channel Communication**: Requests reach handlers via MPSC channels;
//!    terminal outcomes come back the same way
//! 4. **Lock-Free Arbitration**: Resume, cancel, and timeout race for a
//!    single compare-exchange on the task state
//! 5. **Explicit Rejections**: 404, 405, 415, and 406 are distinct routing
//!    decisions, not errors
//!
//! ## Quick Start
//!
//! ```no_run
//! use http::Method;
//! use routewise::dispatcher::{RequestDescriptor, RoutingEngine};
//! use routewise::model::{EndpointDef, EndpointModel};
//! use routewise::runtime_config::RuntimeConfig;
//! use serde_json::json;
//!
//! let model = EndpointModel::builder()
//!     .endpoint(EndpointDef::new(Method::GET, "/widgets/{id}", "get_widget"))
//!     .build()
//!     .expect("valid model");
//!
//! let mut engine = RoutingEngine::new(model, RuntimeConfig::from_env());
//! unsafe {
//!     engine.register_handler("get_widget", |req| {
//!         let id = req.get_path_param("id").unwrap_or("unknown").to_string();
//!         req.handle.resume(json!({ "id": id }));
//!     });
//! }
//!
//! let outcome = engine.dispatch(&RequestDescriptor::new(Method::GET, "/widgets/42"), None);
//! ```
//!
//! ## Runtime Considerations
//!
//! Routewise uses the `may` coroutine runtime, not tokio or async-std. This
//! means:
//!
//! - All handlers run in coroutines (lightweight threads)
//! - Stack size is configurable via the `ROUTEWISE_STACK_SIZE` environment
//!   variable
//! - The default suspend deadline is configurable via
//!   `ROUTEWISE_SUSPEND_TIMEOUT_MS`
//! - The runtime is incompatible with tokio-based libraries without bridging
//! - Blocking operations inside handlers should use `may`'s blocking
//!   facilities

pub mod completion;
pub mod dispatcher;
pub mod ids;
pub mod model;
pub mod negotiation;
pub mod router;
pub mod runtime_config;

pub use completion::{AsyncHandle, AsyncState, CompletionOutcome, TaskError, TimeoutHandler};
pub use dispatcher::{DispatchOutcome, RequestDescriptor, RoutingDecision, RoutingEngine};
pub use ids::RequestId;
pub use model::{EndpointDef, EndpointModel, MediaType, WeightedMediaType};
pub use runtime_config::RuntimeConfig;
