//! Confidence-score components.
//!
//! All component scores live in [0, 1] and stay source-agnostic: the
//! only per-source knowledge is the type-hint translation table in
//! `gazex_common::hints`. The composite is a weighted sum clamped to
//! [0, 1].

use std::collections::BTreeSet;

use gazex_common::{hints, MatchCandidate, MatchSignal, PlaceRecord};

use crate::weights::ScoringWeights;

const EXACT_NAME: f64 = 1.0;
const PARTIAL_NAME: f64 = 0.6;
const NO_HINT: f64 = 0.5;

/// Name component: 1.0 case-insensitive exact, 0.6 when the query is a
/// prefix or substring of the name, ascii name, or any alternate name,
/// else 0.
pub fn name_score(record: &PlaceRecord, query: &str) -> f64 {
    if record.matches_name(query) {
        return EXACT_NAME;
    }
    let q = query.to_lowercase();
    let partial = record.name.to_lowercase().contains(&q)
        || record.ascii_name.to_lowercase().contains(&q)
        || record
            .alternate_names
            .iter()
            .any(|n| n.to_lowercase().contains(&q));
    if partial {
        PARTIAL_NAME
    } else {
        0.0
    }
}

/// Type component: 1.0 when the hint translates onto the record's type
/// code, 0.5 with no hint, 0 on mismatch. An unknown hint or a record
/// without a type code scores as a mismatch.
pub fn type_score(record: &PlaceRecord, type_hint: Option<&str>) -> f64 {
    let Some(hint) = type_hint else {
        return NO_HINT;
    };
    let Some(type_code) = record.type_code.as_deref() else {
        return 0.0;
    };
    match hints::hint_matches(hint, record.source, type_code) {
        Some(true) => 1.0,
        Some(false) | None => 0.0,
    }
}

/// Population component: ln-scaled against the largest population among
/// same-name candidates in the same source. Absent population is 0.
pub fn population_score(record: &PlaceRecord, max_population: Option<i64>) -> f64 {
    let (Some(p), Some(max_p)) = (record.population, max_population) else {
        return 0.0;
    };
    if p <= 0 || max_p <= 0 {
        return 0.0;
    }
    let score = ((1.0 + p as f64).ln()) / ((1.0 + max_p as f64).ln());
    score.clamp(0.0, 1.0)
}

/// Composite confidence score with its `matched_on` breakdown. The
/// caller applies the minimum-score threshold.
pub fn score_candidate(
    record: PlaceRecord,
    query: &str,
    type_hint: Option<&str>,
    max_population: Option<i64>,
    weights: &ScoringWeights,
) -> MatchCandidate {
    let name = name_score(&record, query);
    let type_ = type_score(&record, type_hint);
    let population = population_score(&record, max_population);

    let mut matched_on = BTreeSet::new();
    if name > 0.0 {
        matched_on.insert(MatchSignal::Name);
    }
    // the type signal only counts as matched when a hint agreed, not
    // when the neutral no-hint credit applied
    if type_hint.is_some() && type_ >= 1.0 {
        matched_on.insert(MatchSignal::Type);
    }
    if population > 0.0 {
        matched_on.insert(MatchSignal::Population);
    }

    let score = (weights.name * name + weights.type_code * type_ + weights.population * population)
        .clamp(0.0, 1.0);

    MatchCandidate {
        record,
        score,
        matched_on,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazex_common::GazetteerSource;

    fn geonames_city(pop: Option<i64>) -> PlaceRecord {
        let mut r = PlaceRecord::new(GazetteerSource::Geonames, "5037649", "Minneapolis");
        r.type_code = Some("P.PPLA2".to_string());
        r.population = pop;
        r
    }

    fn fast_heading() -> PlaceRecord {
        let mut r = PlaceRecord::new(GazetteerSource::Fast, "1204263", "Minnesota--Minneapolis");
        r.type_code = Some("place".to_string());
        r
    }

    #[test]
    fn test_name_component_tiers() {
        let r = geonames_city(None);
        assert_eq!(name_score(&r, "minneapolis"), 1.0);
        assert_eq!(name_score(&fast_heading(), "Minneapolis"), 0.6);
        assert_eq!(name_score(&r, "Duluth"), 0.0);
    }

    #[test]
    fn test_alternate_names_count_as_exact() {
        let mut r = geonames_city(None);
        r.alternate_names.push("City of Lakes".to_string());
        assert_eq!(name_score(&r, "city of lakes"), 1.0);
    }

    #[test]
    fn test_type_component() {
        let r = geonames_city(None);
        assert_eq!(type_score(&r, Some("city")), 1.0);
        assert_eq!(type_score(&r, None), 0.5);
        assert_eq!(type_score(&r, Some("river")), 0.0);
        // unknown hints are a mismatch, not neutral
        assert_eq!(type_score(&r, Some("starport")), 0.0);
    }

    #[test]
    fn test_population_monotonic() {
        let small = geonames_city(Some(50_000));
        let large = geonames_city(Some(400_000));
        let max = Some(400_000);
        assert!(population_score(&small, max) < population_score(&large, max));
        assert_eq!(population_score(&large, max), 1.0);
        assert_eq!(population_score(&geonames_city(None), max), 0.0);
    }

    #[test]
    fn test_minneapolis_scenario() {
        let weights = ScoringWeights::default();

        let city = score_candidate(
            geonames_city(Some(400_000)),
            "Minneapolis",
            Some("city"),
            Some(400_000),
            &weights,
        );
        let heading = score_candidate(
            fast_heading(),
            "Minneapolis",
            Some("city"),
            None,
            &weights,
        );

        assert!(city.score > 0.9, "got {}", city.score);
        assert!(city.matched_on.contains(&MatchSignal::Name));
        assert!(city.matched_on.contains(&MatchSignal::Type));
        assert!(city.matched_on.contains(&MatchSignal::Population));

        assert!(heading.score < city.score);
        assert_eq!(
            heading.matched_on.into_iter().collect::<Vec<_>>(),
            vec![MatchSignal::Name]
        );
    }

    #[test]
    fn test_composite_stays_in_unit_interval() {
        let weights = ScoringWeights {
            name: 0.9,
            type_code: 0.9,
            population: 0.9,
        };
        let c = score_candidate(
            geonames_city(Some(1)),
            "Minneapolis",
            Some("city"),
            Some(1),
            &weights,
        );
        assert!(c.score <= 1.0);
    }
}
