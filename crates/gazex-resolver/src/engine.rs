//! The resolver engine: read-side fan-out and ranking.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use gazex_common::{GazetteerSource, GazexConfig, MatchCandidate, PlaceRecord, Result, SearchConfig};
use gazex_db::{Page, PlaceReader, SearchFilters, SourcePage};

use crate::scorer::{name_score, score_candidate};
use crate::weights::ScoringWeights;

/// Merged page across all sources. `totals` follows source priority
/// order; sources listed in `failed_sources` timed out or errored and
/// contribute nothing.
#[derive(Debug, Clone, Serialize)]
pub struct MergedPage {
    pub records: Vec<PlaceRecord>,
    pub totals: Vec<(GazetteerSource, u64)>,
    pub failed_sources: Vec<GazetteerSource>,
}

impl MergedPage {
    pub fn is_partial(&self) -> bool {
        !self.failed_sources.is_empty()
    }
}

pub struct ResolverEngine<R> {
    reader: Arc<R>,
    search: SearchConfig,
    weights: ScoringWeights,
    min_score: f64,
}

impl<R: PlaceReader> ResolverEngine<R> {
    pub fn new(reader: Arc<R>, config: &GazexConfig) -> Self {
        // tolerate configs that skipped validation
        let mut weights = ScoringWeights::from(&config.scoring);
        if !weights.validate() {
            weights.normalise();
        }
        Self {
            reader,
            search: config.search.clone(),
            weights,
            min_score: config.scoring.min_score,
        }
    }

    /// Filtered page against a single source.
    #[instrument(skip(self, filters), fields(source = %source))]
    pub async fn search_source(
        &self,
        source: GazetteerSource,
        filters: &SearchFilters,
        page: &Page,
    ) -> Result<SourcePage> {
        self.reader.search(source, filters, page).await
    }

    /// The same query against all four sources concurrently. A source
    /// that errors or misses its timeout is omitted and flagged; the
    /// others still return.
    #[instrument(skip(self, filters))]
    pub async fn search_all(&self, filters: &SearchFilters, page: &Page) -> MergedPage {
        let timeout = Duration::from_millis(self.search.per_source_timeout_ms);
        let runs = GazetteerSource::all().map(|source| async move {
            let outcome = tokio::time::timeout(timeout, self.reader.search(source, filters, page)).await;
            (source, outcome)
        });

        let mut records = Vec::new();
        let mut totals = Vec::new();
        let mut failed_sources = Vec::new();
        for (source, outcome) in join_all(runs).await {
            match outcome {
                Ok(Ok(source_page)) => {
                    totals.push((source, source_page.total));
                    records.extend(source_page.records);
                }
                Ok(Err(e)) => {
                    warn!(source = %source, error = %e, "source failed during merged search");
                    failed_sources.push(source);
                }
                Err(_) => {
                    warn!(source = %source, timeout_ms = self.search.per_source_timeout_ms, "source timed out during merged search");
                    failed_sources.push(source);
                }
            }
        }

        // Re-tier across sources: each per-source page arrived in its
        // own relevance order, the merge must interleave them.
        let name_filter = filters.name.as_deref().map(str::to_lowercase);
        records.sort_by(|a, b| {
            relevance_tier(a, name_filter.as_deref())
                .cmp(&relevance_tier(b, name_filter.as_deref()))
                .then_with(|| b.population.unwrap_or(-1).cmp(&a.population.unwrap_or(-1)))
                .then_with(|| a.source.priority().cmp(&b.source.priority()))
                .then_with(|| a.name.cmp(&b.name))
        });
        records.truncate(page.size as usize);

        MergedPage {
            records,
            totals,
            failed_sources,
        }
    }

    /// Confidence-scored resolution of a bare name plus optional hint.
    /// Empty results are an empty vec; only store failure is an error.
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        name: &str,
        type_hint: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<MatchCandidate>> {
        let limit = self.search.candidate_limit;
        let runs = GazetteerSource::all()
            .map(|source| async move { self.reader.candidates(source, name, limit).await });

        let mut scored: Vec<MatchCandidate> = Vec::new();
        for outcome in join_all(runs).await {
            let candidates: Vec<PlaceRecord> = outcome?;

            // population is scaled against the best same-name peer of
            // the same source, not globally
            let max_population = candidates
                .iter()
                .filter(|r| name_score(r, name) > 0.0)
                .filter_map(|r| r.population)
                .max();

            for record in candidates {
                if name_score(&record, name) <= 0.0 {
                    continue;
                }
                let candidate =
                    score_candidate(record, name, type_hint, max_population, &self.weights);
                if candidate.score >= self.min_score {
                    scored.push(candidate);
                } else {
                    debug!(
                        external_id = %candidate.record.external_id,
                        score = candidate.score,
                        "candidate below threshold"
                    );
                }
            }
        }

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| {
                    b.record
                        .population
                        .unwrap_or(-1)
                        .cmp(&a.record.population.unwrap_or(-1))
                })
                .then_with(|| a.record.source.priority().cmp(&b.record.source.priority()))
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Relevance tier for merged ordering: exact name, then prefix, then
/// substring/alternate hit. Without a name filter everything ties.
fn relevance_tier(record: &PlaceRecord, name_filter: Option<&str>) -> u8 {
    let Some(q) = name_filter else {
        return 0;
    };
    if record.matches_name(q) {
        0
    } else if record.name.to_lowercase().starts_with(q)
        || record.ascii_name.to_lowercase().starts_with(q)
    {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use gazex_common::MatchSignal;

    /// In-memory reader over a fixed record set. `slow_source` sleeps
    /// past any reasonable test timeout to simulate a wedged backend.
    struct MockReader {
        records: Vec<PlaceRecord>,
        slow_source: Option<GazetteerSource>,
    }

    impl MockReader {
        fn of(records: Vec<PlaceRecord>) -> Self {
            Self {
                records,
                slow_source: None,
            }
        }

        fn source_matches(&self, source: GazetteerSource, name: Option<&str>) -> Vec<PlaceRecord> {
            self.records
                .iter()
                .filter(|r| r.source == source)
                .filter(|r| match name {
                    Some(q) => {
                        r.name.to_lowercase().contains(&q.to_lowercase())
                            || r.alternate_names
                                .iter()
                                .any(|n| n.to_lowercase().contains(&q.to_lowercase()))
                    }
                    None => true,
                })
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl PlaceReader for MockReader {
        async fn search(
            &self,
            source: GazetteerSource,
            filters: &SearchFilters,
            page: &Page,
        ) -> Result<SourcePage> {
            if self.slow_source == Some(source) {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            let mut records = self.source_matches(source, filters.name.as_deref());
            let total = records.len() as u64;
            records.truncate(page.size as usize);
            Ok(SourcePage { records, total })
        }

        async fn candidates(
            &self,
            source: GazetteerSource,
            name: &str,
            _limit: u32,
        ) -> Result<Vec<PlaceRecord>> {
            Ok(self.source_matches(source, Some(name)))
        }

        async fn count(&self, source: GazetteerSource) -> Result<u64> {
            Ok(self.source_matches(source, None).len() as u64)
        }
    }

    fn geonames_city(id: &str, name: &str, pop: i64) -> PlaceRecord {
        let mut r = PlaceRecord::new(GazetteerSource::Geonames, id, name);
        r.type_code = Some("P.PPLA2".to_string());
        r.population = Some(pop);
        r
    }

    fn fast_heading(id: &str, label: &str) -> PlaceRecord {
        let mut r = PlaceRecord::new(GazetteerSource::Fast, id, label);
        r.type_code = Some("place".to_string());
        r
    }

    fn engine(reader: MockReader) -> ResolverEngine<MockReader> {
        let mut config = GazexConfig::default();
        config.search.per_source_timeout_ms = 50;
        ResolverEngine::new(Arc::new(reader), &config)
    }

    #[tokio::test]
    async fn test_merged_search_interleaves_by_relevance() {
        let reader = MockReader::of(vec![
            fast_heading("1", "Minnesota--Minneapolis"),
            geonames_city("2", "Minneapolis", 429_954),
            geonames_city("3", "Minneapolis Heights", 2_000),
        ]);
        let merged = engine(reader)
            .search_all(
                &SearchFilters {
                    name: Some("Minneapolis".to_string()),
                    ..SearchFilters::default()
                },
                &Page::default(),
            )
            .await;

        assert!(!merged.is_partial());
        let names: Vec<_> = merged.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Minneapolis", "Minneapolis Heights", "Minnesota--Minneapolis"]
        );
        assert!(merged
            .totals
            .contains(&(GazetteerSource::Geonames, 2)));
    }

    #[tokio::test]
    async fn test_merged_search_flags_slow_source() {
        let mut reader = MockReader::of(vec![
            geonames_city("2", "Minneapolis", 429_954),
            fast_heading("1", "Minnesota--Minneapolis"),
        ]);
        reader.slow_source = Some(GazetteerSource::Fast);

        let merged = engine(reader)
            .search_all(
                &SearchFilters {
                    name: Some("Minneapolis".to_string()),
                    ..SearchFilters::default()
                },
                &Page::default(),
            )
            .await;

        assert!(merged.is_partial());
        assert_eq!(merged.failed_sources, vec![GazetteerSource::Fast]);
        assert_eq!(merged.records.len(), 1);
        assert_eq!(merged.records[0].source, GazetteerSource::Geonames);
    }

    #[tokio::test]
    async fn test_resolve_minneapolis_scenario() {
        let reader = MockReader::of(vec![
            geonames_city("5037649", "Minneapolis", 400_000),
            fast_heading("1204263", "Minnesota--Minneapolis"),
        ]);
        let candidates = engine(reader)
            .resolve("Minneapolis", Some("city"), 10)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].record.external_id, "5037649");
        assert!(candidates[0].score > 0.9);
        assert!(candidates[0].matched_on.contains(&MatchSignal::Type));
        assert_eq!(candidates[1].record.external_id, "1204263");
        assert_eq!(
            candidates[1].matched_on.iter().collect::<Vec<_>>(),
            vec![&MatchSignal::Name]
        );
    }

    #[tokio::test]
    async fn test_resolve_discards_below_threshold() {
        // substring-only name, absent population, mismatched hint:
        // 0.6 * 0.6 = 0.36 still passes, but a name miss never appears
        let reader = MockReader::of(vec![geonames_city("9", "Minneapolis Junction", 0)]);
        let candidates = engine(reader)
            .resolve("Minneapolis", Some("river"), 10)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].score < 0.4);

        let reader = MockReader::of(vec![geonames_city("9", "Duluth", 90_000)]);
        let candidates = engine(reader)
            .resolve("Minneapolis", None, 10)
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_ties_break_by_population_then_priority() {
        // g1 and w1 score identically (exact name, no hint, no
        // population); the fixed source priority decides between them.
        let g1 = PlaceRecord::new(GazetteerSource::Geonames, "g1", "Springfield");
        let w1 = PlaceRecord::new(GazetteerSource::Wof, "w1", "Springfield");
        let candidates_set = vec![w1, geonames_city("g2", "Springfield", 150_000), g1];
        let candidates = engine(MockReader::of(candidates_set))
            .resolve("Springfield", None, 10)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 3);
        // the populated record outscores the tied pair
        assert_eq!(candidates[0].record.external_id, "g2");
        assert_eq!(candidates[1].record.external_id, "g1");
        assert_eq!(candidates[2].record.external_id, "w1");
    }

    #[tokio::test]
    async fn test_unnormalised_config_weights_are_rescaled() {
        // all-equal weights rescale to thirds: exact name with no hint
        // and no population scores 1/3 + 1/3 * 0.5 = 0.5
        let mut config = GazexConfig::default();
        config.scoring.name_weight = 2.0;
        config.scoring.type_weight = 2.0;
        config.scoring.population_weight = 2.0;

        let reader = MockReader::of(vec![PlaceRecord::new(
            GazetteerSource::Geonames,
            "g1",
            "Springfield",
        )]);
        let candidates = ResolverEngine::new(Arc::new(reader), &config)
            .resolve("Springfield", None, 10)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert!((candidates[0].score - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_resolve_top_k_truncates() {
        let records = (0..5)
            .map(|i| geonames_city(&i.to_string(), "Springfield", 1_000 * (i + 1)))
            .collect();
        let candidates = engine(MockReader::of(records))
            .resolve("Springfield", None, 2)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 2);
    }
}
