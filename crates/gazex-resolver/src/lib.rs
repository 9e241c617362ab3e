//! gazex-resolver — Query-time search and confidence-scored place
//! resolution over the loaded canonical stores.
//!
//! Three operations, all read-only: single-source filtered search,
//! cross-source merged search (concurrent fan-out with per-source
//! timeouts), and resolution of a bare name plus optional type hint
//! into ranked [`MatchCandidate`]s.

pub mod engine;
pub mod scorer;
pub mod weights;

pub use engine::{MergedPage, ResolverEngine};
pub use weights::ScoringWeights;

pub use gazex_common::MatchCandidate;
