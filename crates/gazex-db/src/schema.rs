//! Table bootstrap for the canonical place tables.
//!
//! All four source tables share the canonical column set; only the
//! table name differs. `external_id` is the per-source identity key.

use sqlx::PgPool;

use gazex_common::{GazetteerSource, Result};

/// Canonical columns in insert order. Kept in one place so the bulk
/// insert and the row mapper cannot drift apart.
pub const CANONICAL_COLUMNS: &str = "external_id, name, ascii_name, alternate_names, type_code, \
     country_code, admin1, admin2, admin3, admin4, population, latitude, longitude, \
     geometry, parent_id, ancestor_ids, concordances, last_modified";

/// Bind parameters per inserted row; chunk sizes are derived from this
/// against the Postgres limit of 32767.
pub const BINDS_PER_ROW: usize = 18;

/// Create all source tables and their search indexes if absent.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    for source in GazetteerSource::all() {
        let table = source.table_name();
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                external_id     TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                ascii_name      TEXT NOT NULL,
                alternate_names JSONB NOT NULL DEFAULT '[]'::jsonb,
                type_code       TEXT,
                country_code    TEXT,
                admin1          TEXT,
                admin2          TEXT,
                admin3          TEXT,
                admin4          TEXT,
                population      BIGINT,
                latitude        DOUBLE PRECISION,
                longitude       DOUBLE PRECISION,
                geometry        TEXT,
                parent_id       TEXT,
                ancestor_ids    JSONB NOT NULL DEFAULT '[]'::jsonb,
                concordances    JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                last_modified   TIMESTAMPTZ,
                loaded_at       TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#
        );
        sqlx::query(&ddl).execute(pool).await?;

        let idx = format!(
            "CREATE INDEX IF NOT EXISTS {table}_name_idx ON {table} (lower(name) text_pattern_ops)"
        );
        sqlx::query(&idx).execute(pool).await?;

        let pop_idx = format!(
            "CREATE INDEX IF NOT EXISTS {table}_population_idx ON {table} (population DESC NULLS LAST)"
        );
        sqlx::query(&pop_idx).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_count_matches_binds() {
        assert_eq!(CANONICAL_COLUMNS.split(',').count(), BINDS_PER_ROW);
    }

    #[test]
    fn test_widest_chunk_stays_under_param_ceiling() {
        for source in GazetteerSource::all() {
            assert!(source.default_chunk_size() * BINDS_PER_ROW < 32767);
        }
    }
}
