use super::ranker::{rank, SPECIFICITY_WILDCARD};
use crate::model::{Endpoint, MediaType, WeightedMediaType};
use std::sync::Arc;
use tracing::{debug, info};

/// The winning endpoint together with the negotiated media types.
#[derive(Debug, Clone)]
pub struct Selection {
    pub endpoint: Arc<Endpoint>,
    /// Position of the winner in the candidate sequence; the deterministic
    /// last-resort tie-break is this declaration order.
    pub declaration_index: usize,
    /// The endpoint's `consumes` entry the request content type matched, if
    /// the endpoint declared any.
    pub request_type: Option<MediaType>,
    /// The endpoint's `produces` entry that won the ranking, if the endpoint
    /// declared any.
    pub response_type: Option<MediaType>,
    pub combined_score: f32,
    pub specificity: f32,
}

/// Outcome of selecting one endpoint among a matched node's candidates.
#[derive(Debug, Clone)]
pub enum SelectionOutcome {
    Selected(Selection),
    /// No candidate accepts the request's content type (415-equivalent).
    UnsupportedMediaType,
    /// No candidate can produce a type satisfying the accept list
    /// (406-equivalent).
    Unacceptable,
}

struct RankedCandidate {
    index: usize,
    combined_score: f32,
    specificity: f32,
    request_type: Option<MediaType>,
    response_type: Option<MediaType>,
}

/// Select the single winning endpoint for a request.
///
/// Two phases, deliberately separate: input-type matching (what the server
/// will read) filters first, then output-type matching (what the server will
/// write, weighted by what the client wants) ranks the survivors. Both axes
/// must pass independently; a high-ranked output match must never mask an
/// incompatible input type.
///
/// Ordering of the ranked tuples is combined score descending, then
/// specificity descending, then declaration order.
#[must_use]
pub fn select(
    candidates: &[Arc<Endpoint>],
    content_type: Option<&MediaType>,
    accept: &[WeightedMediaType],
) -> SelectionOutcome {
    debug!(
        candidates = candidates.len(),
        content_type = ?content_type.map(ToString::to_string),
        accept_entries = accept.len(),
        "Endpoint selection attempt"
    );

    // Phase 1: consumable filter.
    let mut consumable: Vec<(usize, Option<MediaType>)> = Vec::new();
    for (index, endpoint) in candidates.iter().enumerate() {
        match consumes_match(endpoint, content_type) {
            ConsumesMatch::Accepts(request_type) => consumable.push((index, request_type)),
            ConsumesMatch::Rejects => {}
        }
    }
    if consumable.is_empty() {
        info!(
            candidates = candidates.len(),
            content_type = ?content_type.map(ToString::to_string),
            "No candidate consumes the request content type"
        );
        return SelectionOutcome::UnsupportedMediaType;
    }

    // An empty accept list means the client takes anything.
    let implied_any = [WeightedMediaType::any()];
    let accept: &[WeightedMediaType] = if accept.is_empty() { &implied_any } else { accept };

    // Phase 2: producible ranking across all consumable candidates.
    let mut ranked: Vec<RankedCandidate> = Vec::new();
    for (index, request_type) in consumable {
        let endpoint = &candidates[index];
        if endpoint.produces.is_empty() {
            // No declared produces: implicitly compatible with every accept
            // entry at quality 1.0 and minimum specificity.
            for accepted in accept {
                ranked.push(RankedCandidate {
                    index,
                    combined_score: accepted.quality,
                    specificity: SPECIFICITY_WILDCARD,
                    request_type: request_type.clone(),
                    response_type: None,
                });
            }
            continue;
        }
        for produced in &endpoint.produces {
            for accepted in accept {
                let r = rank(accepted, produced);
                if r.compatible {
                    ranked.push(RankedCandidate {
                        index,
                        combined_score: r.combined_score,
                        specificity: r.specificity,
                        request_type: request_type.clone(),
                        response_type: Some(produced.media_type.clone()),
                    });
                }
            }
        }
    }

    if ranked.is_empty() {
        info!("No candidate produces an acceptable media type");
        return SelectionOutcome::Unacceptable;
    }

    ranked.sort_by(|a, b| {
        b.combined_score
            .total_cmp(&a.combined_score)
            .then(b.specificity.total_cmp(&a.specificity))
            .then(a.index.cmp(&b.index))
    });

    // Vec is non-empty per the check above.
    let Some(winner) = ranked.into_iter().next() else {
        return SelectionOutcome::Unacceptable;
    };
    let selection = Selection {
        endpoint: Arc::clone(&candidates[winner.index]),
        declaration_index: winner.index,
        request_type: winner.request_type,
        response_type: winner.response_type,
        combined_score: winner.combined_score,
        specificity: winner.specificity,
    };

    info!(
        handler_name = %selection.endpoint.handler_name,
        combined_score = selection.combined_score,
        specificity = selection.specificity,
        response_type = ?selection.response_type.as_ref().map(ToString::to_string),
        "Endpoint selected"
    );
    SelectionOutcome::Selected(selection)
}

enum ConsumesMatch {
    Accepts(Option<MediaType>),
    Rejects,
}

/// Phase-1 test for one endpoint.
///
/// A request without a content type is consumable by anything, except that
/// an entity-requiring resource method gets a synthetic
/// `application/octet-stream` substituted first; clients do omit the header
/// on requests that nonetheless carry a body. Locators never read a body,
/// so the substitution does not apply to them.
fn consumes_match(endpoint: &Endpoint, content_type: Option<&MediaType>) -> ConsumesMatch {
    let synthetic;
    let effective = match content_type {
        Some(ct) => Some(ct),
        None if endpoint.requires_entity && !endpoint.is_locator() => {
            synthetic = MediaType::octet_stream();
            Some(&synthetic)
        }
        None => None,
    };

    let Some(effective) = effective else {
        return ConsumesMatch::Accepts(None);
    };
    if endpoint.consumes.is_empty() {
        return ConsumesMatch::Accepts(None);
    }
    for declared in &endpoint.consumes {
        if effective.is_compatible_with(declared) {
            return ConsumesMatch::Accepts(Some(declared.clone()));
        }
    }
    ConsumesMatch::Rejects
}
