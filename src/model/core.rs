use super::media::{MediaType, WeightedMediaType};
use anyhow::{bail, Result};
use http::Method;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// What kind of dispatch target an endpoint binds.
#[derive(Clone)]
pub enum EndpointKind {
    /// A terminal resource method: matching it ends path resolution.
    ResourceMethod,
    /// A sub-resource locator: matching it yields a further endpoint model
    /// that the remaining path suffix is resolved against.
    Locator(Arc<dyn SubResourceLocator>),
}

impl EndpointKind {
    /// True for [`EndpointKind::Locator`].
    #[must_use]
    pub fn is_locator(&self) -> bool {
        matches!(self, EndpointKind::Locator(_))
    }
}

impl fmt::Debug for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::ResourceMethod => write!(f, "ResourceMethod"),
            EndpointKind::Locator(_) => write!(f, "Locator"),
        }
    }
}

/// Resolves a matched locator endpoint to the endpoint model that owns the
/// remaining path suffix.
///
/// Called during path matching, potentially concurrently for unrelated
/// requests; implementations must be cheap and side-effect free.
pub trait SubResourceLocator: Send + Sync {
    fn locate(&self) -> Arc<EndpointModel>;
}

/// A single registered endpoint: one (HTTP method, path template) binding to
/// an opaque handler, with its declared media type capabilities.
///
/// Endpoints are created once during model construction, shared read-only
/// across requests via `Arc`, and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// HTTP method this endpoint is bound to.
    pub method: Method,
    /// Media types the handler reads as a request body; empty means the
    /// endpoint accepts anything.
    pub consumes: Vec<MediaType>,
    /// Media types the handler is willing to emit, with server-side quality
    /// weights; empty means the endpoint can produce anything.
    pub produces: Vec<WeightedMediaType>,
    /// True if the handler's signature consumes a request body.
    pub requires_entity: bool,
    /// Opaque reference to the external dispatch target. The engine only
    /// ever uses this as a lookup key; handler internals stay outside.
    pub handler_name: Arc<str>,
    /// Terminal resource method or sub-resource locator.
    pub kind: EndpointKind,
}

impl Endpoint {
    /// Locator endpoints delegate the remaining suffix instead of handling
    /// the request themselves.
    #[must_use]
    pub fn is_locator(&self) -> bool {
        self.kind.is_locator()
    }
}

/// Declarative description of one endpoint, fed to the model builder.
///
/// ```rust
/// use http::Method;
/// use routewise::model::{EndpointDef, MediaType, WeightedMediaType};
///
/// let def = EndpointDef::new(Method::POST, "/items", "create_item")
///     .consumes(vec![MediaType::json()])
///     .produces(vec![WeightedMediaType::max(MediaType::json())])
///     .requires_entity(true);
/// ```
#[derive(Debug, Clone)]
pub struct EndpointDef {
    pub method: Method,
    pub path_template: String,
    pub handler_name: String,
    pub consumes: Vec<MediaType>,
    pub produces: Vec<WeightedMediaType>,
    pub requires_entity: bool,
}

impl EndpointDef {
    #[must_use]
    pub fn new(method: Method, path_template: &str, handler_name: &str) -> Self {
        Self {
            method,
            path_template: path_template.to_string(),
            handler_name: handler_name.to_string(),
            consumes: Vec::new(),
            produces: Vec::new(),
            requires_entity: false,
        }
    }

    #[must_use]
    pub fn consumes(mut self, consumes: Vec<MediaType>) -> Self {
        self.consumes = consumes;
        self
    }

    #[must_use]
    pub fn produces(mut self, produces: Vec<WeightedMediaType>) -> Self {
        self.produces = produces;
        self
    }

    #[must_use]
    pub fn requires_entity(mut self, requires_entity: bool) -> Self {
        self.requires_entity = requires_entity;
        self
    }
}

/// Immutable catalog of registered endpoints.
///
/// Built once at startup from a declarative source and shared read-only
/// across all requests. Endpoints live in an arena `Vec` whose index is the
/// declaration order; the path matcher references them by index, so no part
/// of the model is allocated per request.
pub struct EndpointModel {
    endpoints: Vec<Arc<Endpoint>>,
    templates: Vec<String>,
}

impl EndpointModel {
    /// Start building a model.
    #[must_use]
    pub fn builder() -> EndpointModelBuilder {
        EndpointModelBuilder::new()
    }

    /// All endpoints in declaration order. The slice index is the endpoint's
    /// stable handle within this model.
    #[must_use]
    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// The path template the endpoint at `index` was registered under.
    #[must_use]
    pub fn template(&self, index: usize) -> Option<&str> {
        self.templates.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Iterate `(template, endpoint)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Endpoint>)> {
        self.templates
            .iter()
            .map(String::as_str)
            .zip(self.endpoints.iter())
    }

    /// Log the registered endpoints, useful at startup to verify the model.
    pub fn dump(&self) {
        info!(endpoint_count = self.endpoints.len(), "Endpoint model loaded");
        for (template, ep) in self.iter() {
            info!(
                method = %ep.method,
                template = %template,
                handler_name = %ep.handler_name,
                kind = ?ep.kind,
                "Registered endpoint"
            );
        }
    }
}

impl fmt::Debug for EndpointModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointModel")
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}

/// Builder for [`EndpointModel`].
///
/// Declaration order is preserved; it is the deterministic last-resort
/// tie-break during negotiation. `build()` validates the whole model up
/// front so malformed registrations fail at startup, never during routing.
#[derive(Default)]
pub struct EndpointModelBuilder {
    endpoints: Vec<Arc<Endpoint>>,
    templates: Vec<String>,
}

impl EndpointModelBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource-method endpoint.
    #[must_use]
    pub fn endpoint(mut self, def: EndpointDef) -> Self {
        self.templates.push(def.path_template);
        self.endpoints.push(Arc::new(Endpoint {
            method: def.method,
            consumes: def.consumes,
            produces: def.produces,
            requires_entity: def.requires_entity,
            handler_name: Arc::from(def.handler_name.as_str()),
            kind: EndpointKind::ResourceMethod,
        }));
        self
    }

    /// Register a sub-resource locator at `path_template`. The locator's
    /// model owns everything under the matched prefix.
    #[must_use]
    pub fn locator(
        mut self,
        path_template: &str,
        handler_name: &str,
        locator: Arc<dyn SubResourceLocator>,
    ) -> Self {
        self.templates.push(path_template.to_string());
        self.endpoints.push(Arc::new(Endpoint {
            method: Method::GET,
            consumes: Vec::new(),
            produces: Vec::new(),
            requires_entity: false,
            handler_name: Arc::from(handler_name),
            kind: EndpointKind::Locator(locator),
        }));
        self
    }

    /// Validate and freeze the model.
    ///
    /// Rejects malformed templates, exact duplicate registrations, and
    /// duplicate locators; these are configuration errors and must never
    /// reach request routing. Several endpoints may share a (method,
    /// template) pair as long as their media declarations differ; selecting
    /// among them is what content negotiation is for.
    pub fn build(self) -> Result<Arc<EndpointModel>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut locator_templates: HashSet<&str> = HashSet::new();

        for (template, ep) in self.templates.iter().zip(self.endpoints.iter()) {
            validate_template(template)?;
            if ep.is_locator() {
                if !locator_templates.insert(template.as_str()) {
                    bail!("duplicate sub-resource locator at '{template}'");
                }
            } else {
                let consumes: Vec<String> = ep.consumes.iter().map(ToString::to_string).collect();
                let produces: Vec<String> = ep.produces.iter().map(ToString::to_string).collect();
                let signature = format!(
                    "{} {template} consumes=[{}] produces=[{}]",
                    ep.method,
                    consumes.join(","),
                    produces.join(",")
                );
                if !seen.insert(signature) {
                    bail!(
                        "duplicate endpoint registration: {} {template}",
                        ep.method
                    );
                }
            }
        }

        Ok(Arc::new(EndpointModel {
            endpoints: self.endpoints,
            templates: self.templates,
        }))
    }
}

fn validate_template(template: &str) -> Result<()> {
    if !template.starts_with('/') {
        bail!("path template '{template}' must start with '/'");
    }
    for segment in template.split('/').skip(1) {
        if segment.is_empty() && template != "/" {
            bail!("path template '{template}' contains an empty segment");
        }
        let open = segment.starts_with('{');
        let close = segment.ends_with('}');
        if open != close {
            bail!("path template '{template}' has an unbalanced template variable");
        }
        if open && segment.len() <= 2 {
            bail!("path template '{template}' has an unnamed template variable");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_in_declaration_order() {
        let model = EndpointModel::builder()
            .endpoint(EndpointDef::new(Method::GET, "/items", "list_items"))
            .endpoint(EndpointDef::new(Method::POST, "/items", "create_item"))
            .build()
            .unwrap();
        assert_eq!(model.len(), 2);
        assert_eq!(&*model.endpoints()[0].handler_name, "list_items");
        assert_eq!(&*model.endpoints()[1].handler_name, "create_item");
        assert_eq!(model.template(1), Some("/items"));
    }

    #[test]
    fn rejects_duplicate_binding() {
        let err = EndpointModel::builder()
            .endpoint(EndpointDef::new(Method::GET, "/items", "a"))
            .endpoint(EndpointDef::new(Method::GET, "/items", "b"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate endpoint"));
    }

    #[test]
    fn same_binding_with_different_produces_is_fine() {
        assert!(EndpointModel::builder()
            .endpoint(
                EndpointDef::new(Method::GET, "/items", "as_json")
                    .produces(vec![WeightedMediaType::max(MediaType::json())])
            )
            .endpoint(
                EndpointDef::new(Method::GET, "/items", "as_xml")
                    .produces(vec![WeightedMediaType::max(MediaType::new(
                        "application",
                        "xml"
                    ))])
            )
            .build()
            .is_ok());
    }

    #[test]
    fn same_template_different_methods_is_fine() {
        assert!(EndpointModel::builder()
            .endpoint(EndpointDef::new(Method::GET, "/items", "a"))
            .endpoint(EndpointDef::new(Method::POST, "/items", "b"))
            .build()
            .is_ok());
    }

    #[test]
    fn rejects_malformed_templates() {
        for bad in ["items", "/items//x", "/items/{", "/items/{}"] {
            assert!(
                EndpointModel::builder()
                    .endpoint(EndpointDef::new(Method::GET, bad, "h"))
                    .build()
                    .is_err(),
                "template '{bad}' should be rejected"
            );
        }
    }

    #[test]
    fn root_template_is_valid() {
        assert!(EndpointModel::builder()
            .endpoint(EndpointDef::new(Method::GET, "/", "root"))
            .build()
            .is_ok());
    }
}
