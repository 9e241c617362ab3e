//! gazex-db — PostgreSQL storage layer.
//!
//! One canonical table per gazetteer source, all with identical
//! columns. The loader talks to [`PlaceWriter`], the resolver to
//! [`PlaceReader`]; [`PgStore`] implements both. The store never
//! interprets geometry — it is stored and returned as opaque text.

pub mod pg;
pub mod repository;
pub mod schema;

pub use pg::PgStore;
pub use repository::{ChunkOutcome, Page, PlaceReader, PlaceWriter, SearchFilters, SourcePage};
