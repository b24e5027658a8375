//! # Endpoint Model Module
//!
//! The immutable, pre-built catalog of registered endpoints that routing and
//! negotiation run against.
//!
//! ## Overview
//!
//! An [`EndpointModel`] is built once at startup from a declarative source
//! (a builder API here; a config file or code generation upstream) and then
//! shared read-only across every request:
//!
//! - Endpoints live in an arena `Vec<Arc<Endpoint>>`; the index is the
//!   declaration order and the stable handle the path matcher stores in its
//!   tree nodes.
//! - [`MediaType`] / [`WeightedMediaType`] carry the consumes/produces
//!   declarations and the client accept list, pre-parsed into structured
//!   values.
//! - Sub-resource locators ([`SubResourceLocator`]) let a matched prefix
//!   delegate the remaining path suffix to another model at runtime.
//!
//! Model construction is the only place configuration errors can surface;
//! `build()` validates templates and duplicate bindings so request routing
//! never has to.
//!
//! ## Example
//!
//! ```rust
//! use http::Method;
//! use routewise::model::{EndpointDef, EndpointModel, MediaType, WeightedMediaType};
//!
//! let model = EndpointModel::builder()
//!     .endpoint(
//!         EndpointDef::new(Method::GET, "/items/{id}", "get_item")
//!             .produces(vec![WeightedMediaType::max(MediaType::json())]),
//!     )
//!     .build()
//!     .unwrap();
//! assert_eq!(model.len(), 1);
//! ```

mod core;
mod media;

pub use core::{
    Endpoint, EndpointDef, EndpointKind, EndpointModel, EndpointModelBuilder, SubResourceLocator,
};
pub use media::{MediaType, WeightedMediaType, WILDCARD};
