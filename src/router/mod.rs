//! # Router Module
//!
//! Path matching and endpoint resolution over the static template tree.
//!
//! ## Overview
//!
//! The matcher walks a tree of path segments built once from the
//! [`EndpointModel`](crate::model::EndpointModel):
//!
//! - Literal segments match exactly (case-sensitive) and always outrank
//!   template variables at the same depth.
//! - Template variables (`{id}`) bind the request segment into a
//!   stack-allocated [`ParamVec`], with backtracking when a literal branch
//!   dead-ends.
//! - A node owned by a sub-resource locator can act as a matcher root for
//!   the remaining suffix, delegating to a lazily built sub-matcher.
//!
//! Resolution distinguishes a path that matched nothing
//! ([`MatchOutcome::NotFound`]) from a path that matched a node with no
//! endpoint for the request method
//! ([`MatchOutcome::MethodNotAllowed`]), which carries the allowed-method
//! set for the response's `Allow` header.
//!
//! ## Example
//!
//! ```rust,ignore
//! use http::Method;
//! use routewise::router::{MatchOutcome, PathMatcher};
//!
//! let matcher = PathMatcher::new(model);
//! if let MatchOutcome::Matched(m) = matcher.resolve(&Method::GET, "/items/42") {
//!     println!("candidates: {}", m.candidates.len());
//!     println!("id = {:?}", m.get_path_param("id"));
//! }
//! ```

mod core;

pub use core::{MatchOutcome, ParamVec, PathMatch, PathMatcher, MAX_INLINE_PARAMS};
