//! Storage traits and query types.
//!
//! Traits sit between the core and Postgres so the loader and resolver
//! can be exercised against in-memory mocks in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gazex_common::{GazetteerSource, PlaceRecord, RejectedRow, Result};

/// Outcome of one chunk insert. `rejected` is populated only when the
/// chunk degraded to per-row mode after a constraint violation.
#[derive(Debug, Default)]
pub struct ChunkOutcome {
    pub inserted: usize,
    pub rejected: Vec<RejectedRow>,
}

/// Structured filters for single-source search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Substring match against name, ascii name, and alternate names.
    pub name: Option<String>,
    pub type_code: Option<String>,
    pub country_code: Option<String>,
    pub admin1: Option<String>,
    pub population_min: Option<i64>,
    pub population_max: Option<i64>,
}

/// 1-based pagination.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { number: 1, size: 20 }
    }
}

impl Page {
    pub fn offset(&self) -> i64 {
        i64::from(self.number.saturating_sub(1)) * i64::from(self.size)
    }
}

/// One source's page of search hits plus its total match count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePage {
    pub records: Vec<PlaceRecord>,
    pub total: u64,
}

/// Write side used by the bulk loader.
#[async_trait]
pub trait PlaceWriter: Send + Sync {
    /// Empty the destination table for a source. Called exactly once at
    /// the start of a full run, never mid-run.
    async fn truncate(&self, source: GazetteerSource) -> Result<()>;

    /// Insert one chunk. Constraint violations inside the chunk degrade
    /// to per-row inserts and come back as rejections; structural
    /// failures (schema mismatch, connection loss) are errors.
    async fn insert_chunk(
        &self,
        source: GazetteerSource,
        records: &[PlaceRecord],
    ) -> Result<ChunkOutcome>;
}

/// Read side used by the resolver engine.
#[async_trait]
pub trait PlaceReader: Send + Sync {
    /// Filtered page ordered by relevance tier (exact > prefix >
    /// substring), then population descending.
    async fn search(
        &self,
        source: GazetteerSource,
        filters: &SearchFilters,
        page: &Page,
    ) -> Result<SourcePage>;

    /// Name/alternate-name pre-filter feeding the confidence scorer.
    async fn candidates(
        &self,
        source: GazetteerSource,
        name: &str,
        limit: u32,
    ) -> Result<Vec<PlaceRecord>>;

    async fn count(&self, source: GazetteerSource) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offset() {
        assert_eq!(Page::default().offset(), 0);
        assert_eq!(Page { number: 3, size: 25 }.offset(), 50);
        assert_eq!(Page { number: 0, size: 25 }.offset(), 0);
    }
}
