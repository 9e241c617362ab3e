//! Canonical place model shared by every gazetteer source.
//!
//! Each adapter normalises its native format into [`PlaceRecord`]; the
//! `(source, external_id)` pair is the sole identity key. Records are
//! never merged across sources at load time — cross-source identity is
//! established at query time by the resolver or via `concordances`
//! supplied by the source itself.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four fixed gazetteer sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GazetteerSource {
    /// GeoNames world place-name dump (tab-delimited text).
    Geonames,
    /// Who's On First administrative places (related CSV exports).
    Wof,
    /// BTAA regional spatial boundaries (CSV with geometry passthrough).
    Btaa,
    /// OCLC FAST geographic subject headings (MARCXML).
    Fast,
}

impl GazetteerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GazetteerSource::Geonames => "geonames",
            GazetteerSource::Wof      => "wof",
            GazetteerSource::Btaa     => "btaa",
            GazetteerSource::Fast     => "fast",
        }
    }

    /// Destination table for this source's canonical records.
    pub fn table_name(&self) -> &'static str {
        match self {
            GazetteerSource::Geonames => "gazetteer_geonames",
            GazetteerSource::Wof      => "gazetteer_wof",
            GazetteerSource::Btaa     => "gazetteer_btaa",
            GazetteerSource::Fast     => "gazetteer_fast",
        }
    }

    /// Rows per insert chunk, tuned to stay under the Postgres
    /// bind-parameter ceiling (32767) at 18 binds per canonical row.
    /// Wide sources get smaller chunks.
    pub fn default_chunk_size(&self) -> usize {
        match self {
            GazetteerSource::Geonames => 1500,
            GazetteerSource::Wof      => 500,
            GazetteerSource::Btaa     => 1800,
            GazetteerSource::Fast     => 1000,
        }
    }

    /// All sources in the default priority order used for tie-breaking
    /// in merged results.
    pub fn all() -> [GazetteerSource; 4] {
        [
            GazetteerSource::Geonames,
            GazetteerSource::Wof,
            GazetteerSource::Btaa,
            GazetteerSource::Fast,
        ]
    }

    /// Position in the default priority order (lower wins ties).
    pub fn priority(&self) -> usize {
        Self::all().iter().position(|s| s == self).unwrap_or(usize::MAX)
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "geonames" => Some(GazetteerSource::Geonames),
            "wof"      => Some(GazetteerSource::Wof),
            "btaa"     => Some(GazetteerSource::Btaa),
            "fast"     => Some(GazetteerSource::Fast),
            _ => None,
        }
    }
}

impl std::fmt::Display for GazetteerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical place record every adapter produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub source: GazetteerSource,
    /// Unique within `source`.
    pub external_id: String,
    pub name: String,
    /// May equal `name` when the source has no separate ASCII form.
    pub ascii_name: String,
    pub alternate_names: Vec<String>,
    /// Source-native type vocabulary: feature class+code for GeoNames,
    /// placetype for WOF, geometry class for BTAA, heading label class
    /// for FAST.
    pub type_code: Option<String>,
    pub country_code: Option<String>,
    pub admin1: Option<String>,
    pub admin2: Option<String>,
    pub admin3: Option<String>,
    pub admin4: Option<String>,
    pub population: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Opaque serialized geometry (GeoJSON or WKT); never parsed here.
    pub geometry: Option<String>,
    pub parent_id: Option<String>,
    pub ancestor_ids: Vec<String>,
    /// Source-declared equivalences: other-source-name -> other-source-id.
    pub concordances: BTreeMap<String, String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl PlaceRecord {
    /// A minimal record with required fields set; everything else empty.
    pub fn new(source: GazetteerSource, external_id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source,
            external_id: external_id.into(),
            ascii_name: name.clone(),
            name,
            alternate_names: Vec::new(),
            type_code: None,
            country_code: None,
            admin1: None,
            admin2: None,
            admin3: None,
            admin4: None,
            population: None,
            latitude: None,
            longitude: None,
            geometry: None,
            parent_id: None,
            ancestor_ids: Vec::new(),
            concordances: BTreeMap::new(),
            last_modified: None,
        }
    }

    /// Case-insensitive test against name, ascii name, and alternates.
    pub fn matches_name(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.name.to_lowercase() == q
            || self.ascii_name.to_lowercase() == q
            || self.alternate_names.iter().any(|n| n.to_lowercase() == q)
    }
}

/// Which scoring components contributed to a candidate's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSignal {
    Name,
    Type,
    Population,
}

/// A query-time resolution candidate. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub record: PlaceRecord,
    /// Confidence in [0.0, 1.0].
    pub score: f64,
    pub matched_on: BTreeSet<MatchSignal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_roundtrip() {
        for s in GazetteerSource::all() {
            assert_eq!(GazetteerSource::from_str_opt(s.as_str()), Some(s));
        }
        assert_eq!(GazetteerSource::from_str_opt("osm"), None);
    }

    #[test]
    fn test_priority_order() {
        assert!(GazetteerSource::Geonames.priority() < GazetteerSource::Fast.priority());
    }

    #[test]
    fn test_new_record_mirrors_name() {
        let r = PlaceRecord::new(GazetteerSource::Geonames, "5037649", "Minneapolis");
        assert_eq!(r.ascii_name, "Minneapolis");
        assert!(r.matches_name("minneapolis"));
        assert!(!r.matches_name("saint paul"));
    }

    #[test]
    fn test_matches_alternate_names() {
        let mut r = PlaceRecord::new(GazetteerSource::Geonames, "1", "München");
        r.alternate_names.push("Munich".into());
        assert!(r.matches_name("MUNICH"));
    }
}
