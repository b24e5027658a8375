use crate::model::{Endpoint, EndpointModel};
use dashmap::DashMap;
use http::Method;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum number of path parameters before heap allocation.
/// Most REST APIs have ≤4 path params (e.g. /users/{id}/posts/{post_id}).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage for the hot path.
///
/// Param names use `Arc<str>` instead of `String` because names come from
/// the static endpoint tree (known at startup) and `Arc::clone()` is an O(1)
/// atomic increment. Values remain `String`, being per-request data from the
/// URL.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Result of successfully matching a request path to a tree node.
///
/// `candidates` holds every endpoint bound to the matched node for the
/// request's method, in declaration order; content negotiation picks the
/// winner among them.
#[derive(Debug, Clone)]
pub struct PathMatch {
    /// Candidate endpoints for the request method, declaration order.
    pub candidates: Vec<Arc<Endpoint>>,
    /// Path parameters bound during the walk (outer locator bindings first;
    /// on duplicate names the innermost binding wins via last-write-wins).
    pub path_params: ParamVec,
}

impl PathMatch {
    /// Get a path parameter by name, last write wins on duplicates.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Outcome of resolving a request path against the endpoint tree.
#[derive(Debug)]
pub enum MatchOutcome {
    /// The path matched a node with endpoints for the request method.
    Matched(PathMatch),
    /// The path matched a node, but no endpoint is bound for the request
    /// method. `allowed` is ready for an `Allow` response header.
    MethodNotAllowed {
        /// Methods the matched node does serve, sorted for determinism.
        allowed: Vec<Method>,
    },
    /// No node matches the path at all.
    NotFound,
}

/// A node in the path template tree, keyed by a literal segment or a
/// template variable.
struct PathNode {
    /// Literal segment text; empty for the root and for variable nodes.
    segment: String,
    /// Variable name when this node matches a template segment.
    param_name: Option<Arc<str>>,
    /// Endpoints bound at this node: (method, arena index), declaration order.
    endpoints: Vec<(Method, usize)>,
    /// Sub-resource locator bound at this node, if any (arena index).
    locator: Option<usize>,
    /// Literal children, tried before variable children.
    children: Vec<PathNode>,
    /// Template-variable children, tried only when no literal child matches.
    param_children: Vec<PathNode>,
}

impl PathNode {
    fn new(segment: &str) -> Self {
        Self {
            segment: segment.to_string(),
            param_name: None,
            endpoints: Vec::new(),
            locator: None,
            children: Vec::new(),
            param_children: Vec::new(),
        }
    }

    fn new_param(param_name: &str) -> Self {
        Self {
            segment: String::new(),
            param_name: Some(Arc::from(param_name)),
            endpoints: Vec::new(),
            locator: None,
            children: Vec::new(),
            param_children: Vec::new(),
        }
    }

    fn insert(&mut self, segments: &[&str], binding: NodeBinding) {
        let Some((segment, remaining)) = segments.split_first() else {
            match binding {
                NodeBinding::Endpoint(method, index) => self.endpoints.push((method, index)),
                NodeBinding::Locator(index) => self.locator = Some(index),
            }
            return;
        };

        if let Some(param_name) = template_variable(segment) {
            for child in &mut self.param_children {
                if child.param_name.as_deref() == Some(param_name) {
                    child.insert(remaining, binding);
                    return;
                }
            }
            let mut child = PathNode::new_param(param_name);
            child.insert(remaining, binding);
            self.param_children.push(child);
            return;
        }

        for child in &mut self.children {
            if child.segment == *segment {
                child.insert(remaining, binding);
                return;
            }
        }
        let mut child = PathNode::new(segment);
        child.insert(remaining, binding);
        self.children.push(child);
    }

    fn allowed_methods(&self) -> Vec<Method> {
        let mut allowed: Vec<Method> = Vec::new();
        for (method, _) in &self.endpoints {
            if !allowed.contains(method) {
                allowed.push(method.clone());
            }
        }
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        allowed
    }
}

enum NodeBinding {
    Endpoint(Method, usize),
    Locator(usize),
}

fn template_variable(segment: &str) -> Option<&str> {
    if segment.starts_with('{') && segment.ends_with('}') {
        Some(&segment[1..segment.len() - 1])
    } else {
        None
    }
}

fn split_segments(path: &str) -> Vec<&str> {
    path.trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

/// Intermediate result of a tree walk: either a terminal node in this tree
/// or a fully resolved outcome delegated from a sub-resource locator.
enum ResolveHit<'a> {
    Node(&'a PathNode),
    Delegated(MatchOutcome),
}

/// Matches request paths against the endpoint model's template tree.
///
/// The walk is segment by segment: literal children are tried first (exact,
/// case-sensitive string match), template-variable children only when no
/// literal child matches, binding the segment value into the parameter list.
/// Resolution is purely functional over the immutable model; matchers may be
/// shared across threads freely.
pub struct PathMatcher {
    model: Arc<EndpointModel>,
    root: PathNode,
    /// Sub-resource matchers built lazily the first time a locator fires,
    /// keyed by the locator's arena index.
    sub_matchers: DashMap<usize, Arc<PathMatcher>>,
}

impl PathMatcher {
    /// Build the template tree for a model. Done once at startup.
    #[must_use]
    pub fn new(model: Arc<EndpointModel>) -> Self {
        let mut root = PathNode::new("");
        for (index, (template, endpoint)) in model.iter().enumerate() {
            let segments = split_segments(template);
            let binding = if endpoint.is_locator() {
                NodeBinding::Locator(index)
            } else {
                NodeBinding::Endpoint(endpoint.method.clone(), index)
            };
            root.insert(&segments, binding);
        }
        info!(
            endpoint_count = model.len(),
            "Path matcher tree built"
        );
        Self {
            model,
            root,
            sub_matchers: DashMap::new(),
        }
    }

    /// Resolve a request path for an HTTP method.
    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str) -> MatchOutcome {
        debug!(method = %method, path = %path, "Path match attempt");
        let match_start = std::time::Instant::now();

        let segments = split_segments(path);
        let mut params = ParamVec::new();
        let outcome = match self.search(&self.root, &segments, method, &mut params) {
            Some(ResolveHit::Node(node)) => {
                let candidates: Vec<Arc<Endpoint>> = node
                    .endpoints
                    .iter()
                    .filter(|(m, _)| m == method)
                    .filter_map(|(_, idx)| self.model.endpoints().get(*idx))
                    .map(Arc::clone)
                    .collect();
                if candidates.is_empty() {
                    MatchOutcome::MethodNotAllowed {
                        allowed: node.allowed_methods(),
                    }
                } else {
                    MatchOutcome::Matched(PathMatch {
                        candidates,
                        path_params: params,
                    })
                }
            }
            Some(ResolveHit::Delegated(outcome)) => outcome,
            None => MatchOutcome::NotFound,
        };

        let duration = match_start.elapsed();
        match &outcome {
            MatchOutcome::Matched(m) => {
                if duration > std::time::Duration::from_millis(1) {
                    warn!(
                        method = %method,
                        path = %path,
                        candidates = m.candidates.len(),
                        duration_us = duration.as_micros() as u64,
                        "Slow path matching detected"
                    );
                } else {
                    info!(
                        method = %method,
                        path = %path,
                        candidates = m.candidates.len(),
                        path_params = ?m.path_params,
                        duration_us = duration.as_micros() as u64,
                        "Path matched"
                    );
                }
            }
            MatchOutcome::MethodNotAllowed { allowed } => {
                warn!(
                    method = %method,
                    path = %path,
                    allowed = ?allowed,
                    "Path matched but method not allowed"
                );
            }
            MatchOutcome::NotFound => {
                warn!(method = %method, path = %path, "No path matched");
            }
        }
        outcome
    }

    fn search<'a>(
        &'a self,
        node: &'a PathNode,
        segments: &[&str],
        method: &Method,
        params: &mut ParamVec,
    ) -> Option<ResolveHit<'a>> {
        let Some((segment, remaining)) = segments.split_first() else {
            if !node.endpoints.is_empty() {
                return Some(ResolveHit::Node(node));
            }
            // A locator at the end of the path resolves the sub-model's root.
            if let Some(locator_idx) = node.locator {
                return self.delegate(locator_idx, &[], method, params);
            }
            return None;
        };

        // Literal children outrank template-variable children at every depth.
        for child in &node.children {
            if child.segment == *segment {
                if let Some(hit) = self.search(child, remaining, method, params) {
                    return Some(hit);
                }
            }
        }

        for child in &node.param_children {
            if let Some(param_name) = &child.param_name {
                let mark = params.len();
                params.push((Arc::clone(param_name), (*segment).to_string()));
                if let Some(hit) = self.search(child, remaining, method, params) {
                    return Some(hit);
                }
                // Backtrack: drop the binding if the subtree fails.
                params.truncate(mark);
            }
        }

        // A matched prefix owned by a locator acts as a matcher root for the
        // remaining suffix.
        if let Some(locator_idx) = node.locator {
            return self.delegate(locator_idx, segments, method, params);
        }

        None
    }

    fn delegate(
        &self,
        locator_idx: usize,
        suffix: &[&str],
        method: &Method,
        params: &ParamVec,
    ) -> Option<ResolveHit<'static>> {
        let endpoint = self.model.endpoints().get(locator_idx)?;
        let sub_matcher = self.sub_matcher(locator_idx, endpoint)?;

        let mut sub_path = String::with_capacity(suffix.iter().map(|s| s.len() + 1).sum::<usize>().max(1));
        if suffix.is_empty() {
            sub_path.push('/');
        } else {
            for segment in suffix {
                sub_path.push('/');
                sub_path.push_str(segment);
            }
        }

        debug!(
            locator = %endpoint.handler_name,
            suffix = %sub_path,
            "Delegating to sub-resource locator"
        );

        match sub_matcher.resolve(method, &sub_path) {
            MatchOutcome::NotFound => None,
            MatchOutcome::Matched(mut sub_match) => {
                // Outer bindings first; inner bindings win on duplicates.
                let mut merged = params.clone();
                merged.append(&mut sub_match.path_params);
                Some(ResolveHit::Delegated(MatchOutcome::Matched(PathMatch {
                    candidates: sub_match.candidates,
                    path_params: merged,
                })))
            }
            outcome @ MatchOutcome::MethodNotAllowed { .. } => {
                Some(ResolveHit::Delegated(outcome))
            }
        }
    }

    fn sub_matcher(&self, locator_idx: usize, endpoint: &Arc<Endpoint>) -> Option<Arc<PathMatcher>> {
        if let Some(existing) = self.sub_matchers.get(&locator_idx) {
            return Some(Arc::clone(existing.value()));
        }
        let crate::model::EndpointKind::Locator(locator) = &endpoint.kind else {
            return None;
        };
        let sub_model = locator.locate();
        let matcher = Arc::new(PathMatcher::new(sub_model));
        self.sub_matchers
            .insert(locator_idx, Arc::clone(&matcher));
        Some(matcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EndpointDef, EndpointModel};

    fn model(defs: Vec<EndpointDef>) -> Arc<EndpointModel> {
        let mut builder = EndpointModel::builder();
        for def in defs {
            builder = builder.endpoint(def);
        }
        builder.build().unwrap()
    }

    #[test]
    fn literal_segment_outranks_template_variable() {
        let matcher = PathMatcher::new(model(vec![
            EndpointDef::new(Method::GET, "/items/{id}", "get_item"),
            EndpointDef::new(Method::GET, "/items/search", "search_items"),
        ]));

        match matcher.resolve(&Method::GET, "/items/search") {
            MatchOutcome::Matched(m) => {
                assert_eq!(&*m.candidates[0].handler_name, "search_items");
                assert!(m.get_path_param("id").is_none());
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn template_variable_binds_segment_value() {
        let matcher = PathMatcher::new(model(vec![EndpointDef::new(
            Method::GET,
            "/items/{id}",
            "get_item",
        )]));

        match matcher.resolve(&Method::GET, "/items/42") {
            MatchOutcome::Matched(m) => assert_eq!(m.get_path_param("id"), Some("42")),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn literal_matching_is_case_sensitive() {
        let matcher = PathMatcher::new(model(vec![EndpointDef::new(
            Method::GET,
            "/Items",
            "list",
        )]));
        assert!(matches!(
            matcher.resolve(&Method::GET, "/items"),
            MatchOutcome::NotFound
        ));
    }

    #[test]
    fn method_not_allowed_reports_allowed_set() {
        let matcher = PathMatcher::new(model(vec![
            EndpointDef::new(Method::GET, "/items", "list"),
            EndpointDef::new(Method::POST, "/items", "create"),
        ]));
        match matcher.resolve(&Method::DELETE, "/items") {
            MatchOutcome::MethodNotAllowed { allowed } => {
                assert_eq!(allowed, vec![Method::GET, Method::POST]);
            }
            other => panic!("expected 405, got {other:?}"),
        }
    }

    #[test]
    fn backtracks_out_of_literal_dead_end() {
        // /items/special has no children; /items/{id}/tags does. A request
        // for /items/special/tags must backtrack into the variable branch.
        let matcher = PathMatcher::new(model(vec![
            EndpointDef::new(Method::GET, "/items/special", "special"),
            EndpointDef::new(Method::GET, "/items/{id}/tags", "tags"),
        ]));
        match matcher.resolve(&Method::GET, "/items/special/tags") {
            MatchOutcome::Matched(m) => {
                assert_eq!(&*m.candidates[0].handler_name, "tags");
                assert_eq!(m.get_path_param("id"), Some("special"));
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn root_path_matches_root_endpoint() {
        let matcher = PathMatcher::new(model(vec![EndpointDef::new(Method::GET, "/", "root")]));
        assert!(matches!(
            matcher.resolve(&Method::GET, "/"),
            MatchOutcome::Matched(_)
        ));
    }
}
