use crate::model::WeightedMediaType;

/// Specificity of an exact `type/subtype` pair.
pub const SPECIFICITY_EXACT: f32 = 3.0;
/// Specificity of an exact type with a wildcard subtype.
pub const SPECIFICITY_SUBTYPE_WILDCARD: f32 = 2.0;
/// Specificity of a full wildcard match.
pub const SPECIFICITY_WILDCARD: f32 = 0.0;
/// Fractional increment when the produced side's parameters are an
/// equal-or-superset of the accept side's and both declare parameters.
pub const PARAMETER_BONUS: f32 = 0.5;

/// Result of ranking one (accept, produce) media type pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaRank {
    /// Whether the pair is compatible at all; the other fields are
    /// meaningless when false.
    pub compatible: bool,
    /// `accept.quality * produce.quality`.
    pub combined_score: f32,
    /// 3-tier specificity plus the fractional parameter bonus. Higher wins
    /// at equal combined score.
    pub specificity: f32,
}

impl MediaRank {
    const INCOMPATIBLE: MediaRank = MediaRank {
        compatible: false,
        combined_score: 0.0,
        specificity: 0.0,
    };
}

/// Rank a client-acceptable type against a server-producible type.
///
/// Compatibility follows the wildcard rule on each component. Specificity is
/// a 3-tier value: exact type+subtype (3) outranks exact-type with wildcard
/// subtype (2), which outranks a wildcard type (0), so at equal quality the
/// more specific declaration wins. When both sides carry parameters, an
/// equal-or-superset match on the produced side adds a fractional
/// tie-break; otherwise ranking degrades to type/subtype only.
#[must_use]
pub fn rank(accept: &WeightedMediaType, produce: &WeightedMediaType) -> MediaRank {
    let a = &accept.media_type;
    let p = &produce.media_type;
    if !a.is_compatible_with(p) {
        return MediaRank::INCOMPATIBLE;
    }

    let type_exact = !a.is_wildcard_type() && !p.is_wildcard_type();
    let subtype_exact = !a.is_wildcard_subtype() && !p.is_wildcard_subtype();
    let mut specificity = match (type_exact, subtype_exact) {
        (true, true) => SPECIFICITY_EXACT,
        (true, false) => SPECIFICITY_SUBTYPE_WILDCARD,
        _ => SPECIFICITY_WILDCARD,
    };

    if !a.parameters.is_empty() && !p.parameters.is_empty() && p.parameters_superset_of(a) {
        specificity += PARAMETER_BONUS;
    }

    MediaRank {
        compatible: true,
        combined_score: accept.quality * produce.quality,
        specificity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaType;

    fn w(mt: MediaType, q: f32) -> WeightedMediaType {
        WeightedMediaType::new(mt, q)
    }

    #[test]
    fn incompatible_pair_ranks_incompatible() {
        let r = rank(
            &w(MediaType::json(), 1.0),
            &w(MediaType::new("text", "html"), 1.0),
        );
        assert!(!r.compatible);
    }

    #[test]
    fn combined_score_multiplies_qualities() {
        let r = rank(&w(MediaType::json(), 0.8), &w(MediaType::json(), 0.5));
        assert!(r.compatible);
        assert!((r.combined_score - 0.4).abs() < 1e-6);
    }

    #[test]
    fn specificity_tiers() {
        let json = MediaType::json();
        let app_any = MediaType::new("application", "*");
        let any = MediaType::wildcard();

        assert_eq!(rank(&w(json.clone(), 1.0), &w(json.clone(), 1.0)).specificity, SPECIFICITY_EXACT);
        assert_eq!(
            rank(&w(json.clone(), 1.0), &w(app_any.clone(), 1.0)).specificity,
            SPECIFICITY_SUBTYPE_WILDCARD
        );
        assert_eq!(rank(&w(any, 1.0), &w(json, 1.0)).specificity, SPECIFICITY_WILDCARD);
    }

    #[test]
    fn parameter_superset_adds_fractional_bonus() {
        let accept = w(MediaType::json().with_parameter("version", "2"), 1.0);
        let produce_superset = w(
            MediaType::json()
                .with_parameter("version", "2")
                .with_parameter("profile", "full"),
            1.0,
        );
        let produce_plain = w(MediaType::json(), 1.0);
        let produce_mismatch = w(MediaType::json().with_parameter("version", "3"), 1.0);

        assert_eq!(
            rank(&accept, &produce_superset).specificity,
            SPECIFICITY_EXACT + PARAMETER_BONUS
        );
        // No parameters on the produced side: plain type/subtype ranking.
        assert_eq!(rank(&accept, &produce_plain).specificity, SPECIFICITY_EXACT);
        assert_eq!(rank(&accept, &produce_mismatch).specificity, SPECIFICITY_EXACT);
    }
}
