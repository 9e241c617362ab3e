//! Runtime configuration, loadable from TOML with serde defaults.
//!
//! Everything has a sensible default so the library is usable with
//! `GazexConfig::default()`; the CLI loads an optional `gazex.toml`
//! and takes `DATABASE_URL` from the environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GazexError, Result};
use crate::records::GazetteerSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazexConfig {
    /// Postgres connection string; falls back to `DATABASE_URL`.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Root directory holding pre-staged source payloads, one
    /// subdirectory per source (`<data_dir>/<source>/…`).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl Default for GazexConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            data_dir: default_data_dir(),
            ingest: IngestConfig::default(),
            search: SearchConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/gazetteers")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Per-source chunk-size overrides; unset sources use
    /// [`GazetteerSource::default_chunk_size`].
    #[serde(default)]
    pub chunk_size_geonames: Option<usize>,
    #[serde(default)]
    pub chunk_size_wof: Option<usize>,
    #[serde(default)]
    pub chunk_size_btaa: Option<usize>,
    #[serde(default)]
    pub chunk_size_fast: Option<usize>,
    /// Log throughput every N chunks.
    #[serde(default = "default_progress_every")]
    pub progress_every_chunks: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size_geonames: None,
            chunk_size_wof: None,
            chunk_size_btaa: None,
            chunk_size_fast: None,
            progress_every_chunks: default_progress_every(),
        }
    }
}

fn default_progress_every() -> usize {
    10
}

impl IngestConfig {
    pub fn chunk_size(&self, source: GazetteerSource) -> usize {
        let override_ = match source {
            GazetteerSource::Geonames => self.chunk_size_geonames,
            GazetteerSource::Wof      => self.chunk_size_wof,
            GazetteerSource::Btaa     => self.chunk_size_btaa,
            GazetteerSource::Fast     => self.chunk_size_fast,
        };
        override_.unwrap_or_else(|| source.default_chunk_size()).max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Per-source timeout for merged search; a source that misses it is
    /// omitted from the merged page with a partial-failure flag.
    #[serde(default = "default_timeout_ms")]
    pub per_source_timeout_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Candidate pre-filter limit per source during resolution.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            per_source_timeout_ms: default_timeout_ms(),
            page_size: default_page_size(),
            candidate_limit: default_candidate_limit(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_page_size() -> u32 {
    20
}

fn default_candidate_limit() -> u32 {
    200
}

/// Relative weights of the scoring components. Name dominates; the
/// concrete split is a documented choice, not a derived constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_name_weight")]
    pub name_weight: f64,
    #[serde(default = "default_type_weight")]
    pub type_weight: f64,
    #[serde(default = "default_population_weight")]
    pub population_weight: f64,
    /// Candidates scoring below this are discarded.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            name_weight: default_name_weight(),
            type_weight: default_type_weight(),
            population_weight: default_population_weight(),
            min_score: default_min_score(),
        }
    }
}

fn default_name_weight() -> f64 {
    0.60
}

fn default_type_weight() -> f64 {
    0.25
}

fn default_population_weight() -> f64 {
    0.15
}

fn default_min_score() -> f64 {
    0.35
}

impl GazexConfig {
    /// Load from a TOML file; missing keys take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let cfg: GazexConfig = toml::from_str(&raw)
            .map_err(|e| GazexError::Config(format!("invalid config file: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Resolved connection string: config value, else `DATABASE_URL`.
    pub fn database_url(&self) -> Result<String> {
        if let Some(url) = &self.database_url {
            return Ok(url.clone());
        }
        std::env::var("DATABASE_URL")
            .map_err(|_| GazexError::Config("DATABASE_URL is not set".into()))
    }

    /// Directory holding one source's staged payload files.
    pub fn source_dir(&self, source: GazetteerSource) -> PathBuf {
        self.data_dir.join(source.as_str())
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.scoring;
        let sum = s.name_weight + s.type_weight + s.population_weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(GazexError::Config(format!(
                "scoring weights must sum to 1.0 (got {sum})"
            )));
        }
        if !(0.0..=1.0).contains(&s.min_score) {
            return Err(GazexError::Config("min_score must lie in [0, 1]".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_validates() {
        GazexConfig::default().validate().unwrap();
    }

    #[test]
    fn test_load_partial_toml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            "data_dir = \"/srv/gazetteers\"\n[scoring]\nname_weight = 0.7\ntype_weight = 0.2\npopulation_weight = 0.1"
        )
        .unwrap();
        let cfg = GazexConfig::load(f.path()).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/srv/gazetteers"));
        assert_eq!(cfg.scoring.name_weight, 0.7);
        // untouched sections keep defaults
        assert_eq!(cfg.search.page_size, 20);
    }

    #[test]
    fn test_bad_weights_rejected() {
        let cfg = GazexConfig {
            scoring: ScoringConfig { name_weight: 0.9, ..ScoringConfig::default() },
            ..GazexConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_chunk_size_override() {
        let mut ingest = IngestConfig::default();
        assert_eq!(ingest.chunk_size(GazetteerSource::Geonames), 1500);
        ingest.chunk_size_geonames = Some(200);
        assert_eq!(ingest.chunk_size(GazetteerSource::Geonames), 200);
    }
}
