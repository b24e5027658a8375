use crate::completion::{
    AsyncHandle, AsyncState, CompletionCoordinator, CompletionOutcome, CoordinatorStats, TaskError,
};
use crate::ids::RequestId;
use crate::model::{EndpointModel, MediaType, WeightedMediaType};
use crate::negotiation::{select, Selection, SelectionOutcome};
use crate::router::{MatchOutcome, ParamVec, PathMatcher};
use crate::runtime_config::RuntimeConfig;
use http::Method;
use may::coroutine;
use may::sync::mpsc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// The negotiation-relevant slice of an incoming request.
///
/// Transport adapters build one of these from whatever wire representation
/// they speak; the engine never sees raw headers.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    /// Parsed Content-Type header, if the request carried one.
    pub content_type: Option<MediaType>,
    /// Parsed Accept header entries with their quality weights. Empty means
    /// the client accepts anything.
    pub accept: Vec<WeightedMediaType>,
}

impl RequestDescriptor {
    #[must_use]
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            content_type: None,
            accept: Vec::new(),
        }
    }

    #[must_use]
    pub fn content_type(mut self, content_type: MediaType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    #[must_use]
    pub fn accept(mut self, accept: Vec<WeightedMediaType>) -> Self {
        self.accept = accept;
        self
    }
}

/// Result of resolving a request against the model, before any handler runs.
#[derive(Debug, Clone)]
pub enum RoutingDecision {
    /// Path matched and negotiation picked a winner.
    Selected {
        selection: Selection,
        path_params: ParamVec,
    },
    /// No node matched the path (404-equivalent).
    NotFound,
    /// The node matched but not for this method (405-equivalent); `allowed`
    /// lists the methods the node does serve.
    MethodNotAllowed { allowed: Vec<Method> },
    /// No candidate consumes the request content type (415-equivalent).
    UnsupportedMediaType,
    /// No candidate produces an acceptable type (406-equivalent).
    Unacceptable,
}

impl RoutingDecision {
    /// The response status a transport adapter would map a rejection to.
    #[must_use]
    pub fn status_hint(&self) -> u16 {
        match self {
            RoutingDecision::Selected { .. } => 200,
            RoutingDecision::NotFound => 404,
            RoutingDecision::MethodNotAllowed { .. } => 405,
            RoutingDecision::UnsupportedMediaType => 415,
            RoutingDecision::Unacceptable => 406,
        }
    }
}

/// Request data handed to a handler coroutine.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    pub request_id: RequestId,
    pub method: Method,
    pub path: String,
    pub handler_name: String,
    /// Path parameters bound during matching (stack-allocated for small counts).
    pub path_params: ParamVec,
    /// The `consumes` entry the request content type matched, if declared.
    pub request_type: Option<MediaType>,
    /// The `produces` entry negotiation picked, if declared.
    pub response_type: Option<MediaType>,
    /// Request body parsed as JSON, if present.
    pub body: Option<Value>,
    /// Completion handle. The handler must resume it, suspend it, or return
    /// and let the engine report the omission.
    pub handle: AsyncHandle,
}

impl HandlerRequest {
    /// Get a path parameter by name.
    ///
    /// Last write wins: with duplicate names across nesting levels
    /// (`/org/{id}/user/{id}`), the innermost binding is returned.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Channel sender that feeds requests to a handler coroutine.
pub type HandlerSender = mpsc::Sender<HandlerRequest>;

/// Result of dispatching one request.
pub enum DispatchOutcome {
    /// The request was handed to a handler; the terminal result arrives on
    /// `outcome` exactly once.
    InFlight {
        request_id: RequestId,
        handle: AsyncHandle,
        outcome: mpsc::Receiver<CompletionOutcome>,
    },
    /// Routing or negotiation rejected the request before any handler ran.
    Rejected(RoutingDecision),
}

impl std::fmt::Debug for DispatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchOutcome::InFlight { request_id, .. } => f
                .debug_struct("InFlight")
                .field("request_id", request_id)
                .finish_non_exhaustive(),
            DispatchOutcome::Rejected(decision) => {
                f.debug_tuple("Rejected").field(decision).finish()
            }
        }
    }
}

/// Facade tying the matcher, negotiation, handler registry, and completion
/// lifecycle together.
///
/// The model and its derived match tree are immutable after construction;
/// handler registration happens at startup, then dispatch is read-only over
/// shared state.
pub struct RoutingEngine {
    model: Arc<EndpointModel>,
    matcher: PathMatcher,
    handlers: HashMap<String, HandlerSender>,
    coordinator: Arc<CompletionCoordinator>,
    config: RuntimeConfig,
}

impl RoutingEngine {
    #[must_use]
    pub fn new(model: Arc<EndpointModel>, config: RuntimeConfig) -> Self {
        let matcher = PathMatcher::new(Arc::clone(&model));
        let coordinator = CompletionCoordinator::new(config.default_suspend_timeout);
        info!(
            endpoints = model.len(),
            stack_size = config.stack_size,
            default_suspend_timeout = ?config.default_suspend_timeout,
            "Routing engine initialized"
        );
        Self {
            model,
            matcher,
            handlers: HashMap::new(),
            coordinator,
            config,
        }
    }

    #[must_use]
    pub fn model(&self) -> &Arc<EndpointModel> {
        &self.model
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<CompletionCoordinator> {
        &self.coordinator
    }

    /// Counters over completed request lifecycles.
    #[must_use]
    pub fn stats(&self) -> &CoordinatorStats {
        self.coordinator.stats()
    }

    /// Requests currently between dispatch and terminal outcome.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.coordinator.in_flight()
    }

    /// Resolve a request to a routing decision without running any handler.
    ///
    /// Matching narrows by path first, then method, then negotiation; each
    /// stage's failure maps to its own rejection so the transport adapter
    /// can report 404, 405, 415, and 406 distinctly.
    #[must_use]
    pub fn route(&self, request: &RequestDescriptor) -> RoutingDecision {
        let start = Instant::now();
        let decision = match self.matcher.resolve(&request.method, &request.path) {
            MatchOutcome::NotFound => RoutingDecision::NotFound,
            MatchOutcome::MethodNotAllowed { allowed } => {
                RoutingDecision::MethodNotAllowed { allowed }
            }
            MatchOutcome::Matched(path_match) => {
                match select(
                    &path_match.candidates,
                    request.content_type.as_ref(),
                    &request.accept,
                ) {
                    SelectionOutcome::Selected(selection) => RoutingDecision::Selected {
                        selection,
                        path_params: path_match.path_params,
                    },
                    SelectionOutcome::UnsupportedMediaType => RoutingDecision::UnsupportedMediaType,
                    SelectionOutcome::Unacceptable => RoutingDecision::Unacceptable,
                }
            }
        };
        debug!(
            method = %request.method,
            path = %request.path,
            status_hint = decision.status_hint(),
            duration_us = start.elapsed().as_micros() as u64,
            "Routing decision"
        );
        decision
    }

    /// Route a request and hand it to the selected handler.
    ///
    /// Always returns immediately. For an in-flight request the terminal
    /// outcome arrives on the returned receiver exactly once, whether the
    /// handler resumes synchronously, suspends and resumes later, times out,
    /// or is cancelled. A missing or unreachable handler still produces an
    /// in-flight request whose outcome is an internal error, so every
    /// admitted request reaches a terminal state.
    #[must_use]
    pub fn dispatch(&self, request: &RequestDescriptor, body: Option<Value>) -> DispatchOutcome {
        let decision = self.route(request);
        let (selection, path_params) = match decision {
            RoutingDecision::Selected {
                selection,
                path_params,
            } => (selection, path_params),
            rejected => {
                info!(
                    method = %request.method,
                    path = %request.path,
                    status_hint = rejected.status_hint(),
                    "Request rejected before dispatch"
                );
                return DispatchOutcome::Rejected(rejected);
            }
        };

        let request_id = RequestId::new();
        let (handle, outcome) = self.coordinator.begin(request_id);
        let handler_name = selection.endpoint.handler_name.to_string();

        info!(
            request_id = %request_id,
            handler_name = %handler_name,
            method = %request.method,
            path = %request.path,
            "Request dispatched to handler"
        );

        let handler_request = HandlerRequest {
            request_id,
            method: request.method.clone(),
            path: request.path.clone(),
            handler_name: handler_name.clone(),
            path_params,
            request_type: selection.request_type,
            response_type: selection.response_type,
            body,
            handle: handle.clone(),
        };

        match self.handlers.get(&handler_name) {
            Some(tx) => {
                if let Err(e) = tx.send(handler_request) {
                    error!(
                        request_id = %request_id,
                        handler_name = %handler_name,
                        error = %e,
                        "Handler channel closed - handler may have crashed"
                    );
                    handle.resume_error(TaskError::new(
                        503,
                        &format!("Handler '{handler_name}' is not responding"),
                    ));
                }
            }
            None => {
                let available: Vec<&String> = self.handlers.keys().collect();
                error!(
                    request_id = %request_id,
                    handler_name = %handler_name,
                    available_handlers = ?available,
                    "Handler not registered - CRITICAL"
                );
                handle.resume_error(TaskError::internal(&format!(
                    "Handler '{handler_name}' is not registered"
                )));
            }
        }

        DispatchOutcome::InFlight {
            request_id,
            handle,
            outcome,
        }
    }

    /// Register a handler sender directly. Replacing an existing handler
    /// drops the old sender, which closes its channel and lets the old
    /// coroutine exit.
    pub fn add_handler(&mut self, name: &str, sender: HandlerSender) {
        if self.handlers.remove(name).is_some() {
            info!(handler_name = %name, "Replaced existing handler - old coroutine will exit");
        }
        info!(
            handler_name = %name,
            total_handlers = self.handlers.len() + 1,
            "Handler registered"
        );
        self.handlers.insert(name.to_string(), sender);
    }

    /// Registers a handler function that processes requests with the given
    /// name on a dedicated coroutine.
    ///
    /// The handler is wrapped with panic recovery; a panic completes the
    /// request as a 500-equivalent error instead of taking the engine down.
    /// A handler that returns without resuming or suspending its handle is
    /// also completed as an error, so no request is left dangling.
    ///
    /// # Safety
    ///
    /// This function is marked unsafe because it calls
    /// `may::coroutine::Builder::spawn()`, which is unsafe in the `may`
    /// runtime. The caller must ensure the runtime is initialized before
    /// calling this.
    pub unsafe fn register_handler<F>(&mut self, name: &str, handler_fn: F)
    where
        F: Fn(HandlerRequest) + Send + 'static + Clone,
    {
        let (tx, rx) = mpsc::channel::<HandlerRequest>();
        let name = name.to_string();
        let handler_name_for_logging = name.clone();
        let stack_size = self.config.stack_size;

        // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the
        // may runtime. The handler is Send + 'static and all failure paths
        // complete the request through its handle rather than unwinding
        // across the coroutine boundary.
        let spawn_result = unsafe {
            coroutine::Builder::new()
                .stack_size(stack_size)
                .spawn(move || {
                    debug!(
                        handler_name = %handler_name_for_logging,
                        stack_size = stack_size,
                        "Handler coroutine start"
                    );

                    for req in rx.iter() {
                        let handle = req.handle.clone();
                        let handler_name = req.handler_name.clone();
                        let request_id = req.request_id;

                        info!(
                            request_id = %request_id,
                            handler_name = %handler_name,
                            path_params = ?req.path_params,
                            "Handler execution start"
                        );

                        let execution_start = Instant::now();

                        if let Err(panic) =
                            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                                handler_fn(req);
                            }))
                        {
                            let panic_message = format!("{panic:?}");
                            error!(
                                request_id = %request_id,
                                handler_name = %handler_name,
                                panic_message = %panic_message,
                                "Handler panicked - CRITICAL"
                            );
                            handle.resume_error(TaskError::internal(&format!(
                                "Handler panicked: {panic_message}"
                            )));
                        } else {
                            if handle.state() == AsyncState::Active {
                                // Neither resumed nor suspended; complete the
                                // request rather than leaving it dangling.
                                error!(
                                    request_id = %request_id,
                                    handler_name = %handler_name,
                                    "Handler returned without responding or suspending"
                                );
                                handle.resume_error(TaskError::internal(
                                    "Handler returned without responding or suspending",
                                ));
                            }
                            info!(
                                request_id = %request_id,
                                handler_name = %handler_name,
                                execution_time_ms = execution_start.elapsed().as_millis() as u64,
                                state = ?handle.state(),
                                "Handler execution complete"
                            );
                        }
                    }
                })
        };

        if let Err(e) = spawn_result {
            error!(
                handler_name = %name,
                error = %e,
                stack_size = stack_size,
                "Failed to spawn handler coroutine - CRITICAL"
            );
            return;
        }

        self.add_handler(&name, tx);
    }
}

impl std::fmt::Debug for RoutingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingEngine")
            .field("endpoints", &self.model.len())
            .field("handlers", &self.handlers.len())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
