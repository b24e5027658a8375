//! # Negotiation Module
//!
//! Content negotiation: ranking media type pairs and selecting the single
//! winning endpoint among a matched node's candidates.
//!
//! ## Overview
//!
//! Selection runs in two phases over purely immutable data:
//!
//! 1. **Consumable filter** — drop candidates whose `consumes` declarations
//!    are incompatible with the request content type. A missing content type
//!    on an entity-requiring resource method is treated as
//!    `application/octet-stream` before the test.
//! 2. **Producible ranking** — every surviving (candidate, produces entry,
//!    accept entry) pair is ranked by [`rank`]: combined quality score, then
//!    specificity, then declaration order. The head of that ordering wins.
//!
//! The phases are independent axes on purpose: what the server is willing to
//! read and what it is willing to write must both pass before ranking means
//! anything.
//!
//! Failures are explicit outcomes, not errors:
//! [`SelectionOutcome::UnsupportedMediaType`] (415-equivalent) from phase 1,
//! [`SelectionOutcome::Unacceptable`] (406-equivalent) from phase 2.

mod ranker;
mod selector;

pub use ranker::{
    rank, MediaRank, PARAMETER_BONUS, SPECIFICITY_EXACT, SPECIFICITY_SUBTYPE_WILDCARD,
    SPECIFICITY_WILDCARD,
};
pub use selector::{select, Selection, SelectionOutcome};
