//! Media type values used by endpoint declarations and request descriptors.
//!
//! Values arrive pre-parsed from the transport adapter; this module only
//! defines the structured representation and the wildcard compatibility rule
//! used throughout negotiation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wildcard component, matching any type or subtype.
pub const WILDCARD: &str = "*";

/// A structured media type: `type/subtype` plus optional parameters.
///
/// Either component may be the wildcard `*`. A wildcard type implies a
/// wildcard subtype; [`MediaType::new`] normalizes `*/json` to `*/*`.
///
/// Parameter order is irrelevant for equality and compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaType {
    /// Primary type (e.g. `application`), or `*`.
    pub main_type: String,
    /// Subtype (e.g. `json`), or `*`.
    pub subtype: String,
    /// Optional parameters (e.g. `version=2`, `profile=full`).
    pub parameters: Vec<(String, String)>,
}

impl MediaType {
    /// Create a media type without parameters.
    ///
    /// Components are lowercased; a wildcard main type forces a wildcard
    /// subtype so the `*` ⇒ `*/*` invariant holds by construction.
    #[must_use]
    pub fn new(main_type: &str, subtype: &str) -> Self {
        let main_type = main_type.trim().to_ascii_lowercase();
        let subtype = if main_type == WILDCARD {
            WILDCARD.to_string()
        } else {
            subtype.trim().to_ascii_lowercase()
        };
        Self {
            main_type,
            subtype,
            parameters: Vec::new(),
        }
    }

    /// Attach a parameter, returning the modified type (builder style).
    #[must_use]
    pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
        self.parameters
            .push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    /// The full wildcard `*/*`.
    #[must_use]
    pub fn wildcard() -> Self {
        Self::new(WILDCARD, WILDCARD)
    }

    /// `application/octet-stream`, substituted for a missing content type on
    /// entity-bearing requests.
    #[must_use]
    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// `application/json`.
    #[must_use]
    pub fn json() -> Self {
        Self::new("application", "json")
    }

    /// True if the main type is the wildcard.
    #[inline]
    #[must_use]
    pub fn is_wildcard_type(&self) -> bool {
        self.main_type == WILDCARD
    }

    /// True if the subtype is the wildcard.
    #[inline]
    #[must_use]
    pub fn is_wildcard_subtype(&self) -> bool {
        self.subtype == WILDCARD
    }

    /// Look up a parameter value by (case-insensitive) name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Wildcard compatibility: each component must be equal or wildcard on at
    /// least one side. Parameters do not participate; they only refine
    /// ranking once two types are compatible.
    #[must_use]
    pub fn is_compatible_with(&self, other: &MediaType) -> bool {
        let type_ok = self.is_wildcard_type()
            || other.is_wildcard_type()
            || self.main_type == other.main_type;
        let subtype_ok = self.is_wildcard_subtype()
            || other.is_wildcard_subtype()
            || self.subtype == other.subtype;
        type_ok && subtype_ok
    }

    /// True when `self`'s parameters are an equal-or-superset of `other`'s.
    /// Vacuously true when `other` declares no parameters.
    #[must_use]
    pub fn parameters_superset_of(&self, other: &MediaType) -> bool {
        other
            .parameters
            .iter()
            .all(|(k, v)| self.parameter(k) == Some(v.as_str()))
    }
}

impl PartialEq for MediaType {
    fn eq(&self, other: &Self) -> bool {
        self.main_type == other.main_type
            && self.subtype == other.subtype
            && self.parameters.len() == other.parameters.len()
            && self.parameters_superset_of(other)
    }
}

impl Eq for MediaType {}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.subtype)?;
        for (k, v) in &self.parameters {
            write!(f, ";{k}={v}")?;
        }
        Ok(())
    }
}

/// A media type with a quality weight in `[0.0, 1.0]`.
///
/// Client accept entries and server produces entries both carry weights;
/// an unspecified weight defaults to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedMediaType {
    pub media_type: MediaType,
    pub quality: f32,
}

impl WeightedMediaType {
    /// Wrap a media type with an explicit quality, clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn new(media_type: MediaType, quality: f32) -> Self {
        Self {
            media_type,
            quality: quality.clamp(0.0, 1.0),
        }
    }

    /// Wrap a media type at the default quality of 1.0.
    #[must_use]
    pub fn max(media_type: MediaType) -> Self {
        Self::new(media_type, 1.0)
    }

    /// `*/*` at quality 1.0, the implied accept list when a request carries
    /// no accept entries.
    #[must_use]
    pub fn any() -> Self {
        Self::max(MediaType::wildcard())
    }
}

impl From<MediaType> for WeightedMediaType {
    fn from(media_type: MediaType) -> Self {
        Self::max(media_type)
    }
}

impl fmt::Display for WeightedMediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};q={}", self.media_type, self.quality)
    }
}
