//! gazex-ingestion — Source adapters, chunked bulk loader, and the
//! import orchestrator.
//!
//! Flow for one source: acquire payload (pre-staged or fetched) →
//! adapter streams canonical records → loader batches them into
//! chunked transactional inserts → `ImportJob` summarises the run.
//! Different sources never share mutable state and may run
//! concurrently.

pub mod adapters;
pub mod fetch;
pub mod loader;
pub mod pipeline;

pub use adapters::AdapterItem;
pub use fetch::{HttpProvider, PayloadProvider, PreStagedProvider};
pub use loader::{CancelFlag, ChunkedLoader};
pub use pipeline::{ImportProgress, ImportRunner};
