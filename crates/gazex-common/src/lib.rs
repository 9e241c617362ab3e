//! gazex-common — Shared types, errors, and configuration used across all Gazex crates.

pub mod config;
pub mod error;
pub mod hints;
pub mod job;
pub mod records;

// Re-export commonly used types
pub use config::{GazexConfig, IngestConfig, ScoringConfig, SearchConfig};
pub use error::{GazexError, RejectReason, RejectedRow, Result};
pub use job::{ImportJob, JobStatus};
pub use records::{GazetteerSource, MatchCandidate, MatchSignal, PlaceRecord};
