#![allow(dead_code)]

use http::Method;
use routewise::model::{
    EndpointDef, EndpointModel, MediaType, SubResourceLocator, WeightedMediaType,
};
use std::sync::{Arc, Once};

static TRACING_INIT: Once = Once::new();

/// Install a fmt subscriber once per test binary. Honors `RUST_LOG`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Locator fixture delegating to a fixed attachments model.
pub struct AttachmentsLocator {
    model: Arc<EndpointModel>,
}

impl AttachmentsLocator {
    pub fn new() -> Self {
        let model = EndpointModel::builder()
            .endpoint(
                EndpointDef::new(Method::GET, "/", "list_attachments")
                    .produces(vec![WeightedMediaType::max(MediaType::json())]),
            )
            .endpoint(
                EndpointDef::new(Method::GET, "/{name}", "get_attachment")
                    .produces(vec![WeightedMediaType::max(MediaType::json())]),
            )
            .build()
            .expect("attachments model");
        Self { model }
    }
}

impl SubResourceLocator for AttachmentsLocator {
    fn locate(&self) -> Arc<EndpointModel> {
        Arc::clone(&self.model)
    }
}

/// A document-store endpoint model exercising literal/template precedence,
/// entity-consuming endpoints, weighted produces, and a sub-resource
/// locator.
pub fn document_model() -> Arc<EndpointModel> {
    EndpointModel::builder()
        .endpoint(
            EndpointDef::new(Method::GET, "/documents", "list_documents")
                .produces(vec![
                    WeightedMediaType::max(MediaType::json()),
                    WeightedMediaType::new(MediaType::new("application", "xml"), 0.5),
                ]),
        )
        .endpoint(
            EndpointDef::new(Method::POST, "/documents", "create_document")
                .consumes(vec![MediaType::json()])
                .produces(vec![WeightedMediaType::max(MediaType::json())])
                .requires_entity(true),
        )
        .endpoint(
            EndpointDef::new(Method::GET, "/documents/recent", "recent_documents")
                .produces(vec![WeightedMediaType::max(MediaType::json())]),
        )
        .endpoint(
            EndpointDef::new(Method::GET, "/documents/{id}", "get_document")
                .produces(vec![WeightedMediaType::max(MediaType::json())]),
        )
        .endpoint(
            EndpointDef::new(Method::DELETE, "/documents/{id}", "delete_document"),
        )
        .locator(
            "/documents/{id}/attachments",
            "attachments_locator",
            Arc::new(AttachmentsLocator::new()),
        )
        .build()
        .expect("document model")
}
