//! Postgres implementations of the storage traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, QueryBuilder, Row};
use tracing::{debug, warn};

use gazex_common::{
    GazetteerSource, PlaceRecord, RejectReason, RejectedRow, Result,
};

use crate::repository::{ChunkOutcome, Page, PlaceReader, PlaceWriter, SearchFilters, SourcePage};
use crate::schema::{self, CANONICAL_COLUMNS};

/// Postgres-backed place store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, then create any missing tables.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        schema::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Single-row insert used by the per-row fallback path.
    async fn insert_row(&self, source: GazetteerSource, r: &PlaceRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({CANONICAL_COLUMNS}) VALUES \
             ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)",
            source.table_name()
        );
        sqlx::query(&sql)
            .bind(&r.external_id)
            .bind(&r.name)
            .bind(&r.ascii_name)
            .bind(json_array(&r.alternate_names))
            .bind(&r.type_code)
            .bind(&r.country_code)
            .bind(&r.admin1)
            .bind(&r.admin2)
            .bind(&r.admin3)
            .bind(&r.admin4)
            .bind(r.population)
            .bind(r.latitude)
            .bind(r.longitude)
            .bind(&r.geometry)
            .bind(&r.parent_id)
            .bind(json_array(&r.ancestor_ids))
            .bind(json_map(&r.concordances))
            .bind(r.last_modified)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PlaceWriter for PgStore {
    async fn truncate(&self, source: GazetteerSource) -> Result<()> {
        let sql = format!("TRUNCATE TABLE {}", source.table_name());
        sqlx::query(&sql).execute(&self.pool).await?;
        debug!(source = %source, "destination table truncated");
        Ok(())
    }

    async fn insert_chunk(
        &self,
        source: GazetteerSource,
        records: &[PlaceRecord],
    ) -> Result<ChunkOutcome> {
        if records.is_empty() {
            return Ok(ChunkOutcome::default());
        }

        let mut qb: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} ({CANONICAL_COLUMNS}) ", source.table_name()));
        qb.push_values(records, |mut b, r| {
            b.push_bind(&r.external_id)
                .push_bind(&r.name)
                .push_bind(&r.ascii_name)
                .push_bind(json_array(&r.alternate_names))
                .push_bind(&r.type_code)
                .push_bind(&r.country_code)
                .push_bind(&r.admin1)
                .push_bind(&r.admin2)
                .push_bind(&r.admin3)
                .push_bind(&r.admin4)
                .push_bind(r.population)
                .push_bind(r.latitude)
                .push_bind(r.longitude)
                .push_bind(&r.geometry)
                .push_bind(&r.parent_id)
                .push_bind(json_array(&r.ancestor_ids))
                .push_bind(json_map(&r.concordances))
                .push_bind(r.last_modified);
        });

        match qb.build().execute(&self.pool).await {
            Ok(_) => Ok(ChunkOutcome { inserted: records.len(), rejected: Vec::new() }),
            Err(e) if is_constraint_violation(&e) => {
                // One bad row poisons the whole multi-row statement;
                // retry the chunk row by row so the valid rows land.
                warn!(
                    source = %source,
                    chunk_len = records.len(),
                    error = %e,
                    "chunk insert hit a constraint, falling back to per-row inserts"
                );
                let mut outcome = ChunkOutcome::default();
                for r in records {
                    match self.insert_row(source, r).await {
                        Ok(()) => outcome.inserted += 1,
                        Err(gazex_common::GazexError::Database(db_err))
                            if is_constraint_violation(&db_err) =>
                        {
                            outcome.rejected.push(RejectedRow::new(
                                Some(r.external_id.clone()),
                                RejectReason::ConstraintViolation,
                                db_err.to_string(),
                            ));
                        }
                        Err(other) => return Err(other),
                    }
                }
                Ok(outcome)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl PlaceReader for PgStore {
    async fn search(
        &self,
        source: GazetteerSource,
        filters: &SearchFilters,
        page: &Page,
    ) -> Result<SourcePage> {
        let table = source.table_name();

        let mut count_qb: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {table} WHERE 1=1"));
        push_filters(&mut count_qb, filters);
        let total: i64 = count_qb.build().fetch_one(&self.pool).await?.try_get(0)?;

        let mut qb: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {CANONICAL_COLUMNS} FROM {table} WHERE 1=1"));
        push_filters(&mut qb, filters);

        // Relevance tier first (exact > prefix > substring/alternate),
        // population breaks ties inside a tier.
        if let Some(name) = filters.name.as_deref().filter(|n| !n.is_empty()) {
            qb.push(" ORDER BY CASE WHEN lower(name) = ")
                .push_bind(name.to_lowercase())
                .push(" THEN 0 WHEN name ILIKE ")
                .push_bind(format!("{}%", escape_like(name)))
                .push(" THEN 1 ELSE 2 END, population DESC NULLS LAST, name");
        } else {
            qb.push(" ORDER BY population DESC NULLS LAST, name");
        }
        qb.push(" LIMIT ")
            .push_bind(i64::from(page.size))
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows: Vec<PlaceRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(SourcePage {
            records: rows.into_iter().map(|r| r.into_record(source)).collect(),
            total: total.max(0) as u64,
        })
    }

    async fn candidates(
        &self,
        source: GazetteerSource,
        name: &str,
        limit: u32,
    ) -> Result<Vec<PlaceRecord>> {
        let pattern = format!("%{}%", escape_like(name));
        let sql = format!(
            "SELECT {CANONICAL_COLUMNS} FROM {} \
             WHERE name ILIKE $1 OR ascii_name ILIKE $1 OR alternate_names::text ILIKE $1 \
             ORDER BY population DESC NULLS LAST, name LIMIT $2",
            source.table_name()
        );
        let rows: Vec<PlaceRow> = sqlx::query_as(&sql)
            .bind(&pattern)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.into_record(source)).collect())
    }

    async fn count(&self, source: GazetteerSource) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", source.table_name());
        let n: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }
}

fn push_filters(qb: &mut QueryBuilder<sqlx::Postgres>, filters: &SearchFilters) {
    if let Some(name) = filters.name.as_deref().filter(|n| !n.is_empty()) {
        let pattern = format!("%{}%", escape_like(name));
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR ascii_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR alternate_names::text ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(tc) = &filters.type_code {
        qb.push(" AND type_code = ").push_bind(tc.clone());
    }
    if let Some(cc) = &filters.country_code {
        qb.push(" AND country_code = ").push_bind(cc.to_uppercase());
    }
    if let Some(a1) = &filters.admin1 {
        qb.push(" AND admin1 = ").push_bind(a1.clone());
    }
    if let Some(min) = filters.population_min {
        qb.push(" AND population >= ").push_bind(min);
    }
    if let Some(max) = filters.population_max {
        qb.push(" AND population <= ").push_bind(max);
    }
}

/// Escape LIKE metacharacters so user input stays a literal match.
fn escape_like(input: &str) -> String {
    input.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn is_constraint_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .map(|c| c.starts_with("23"))
            .unwrap_or(false),
        _ => false,
    }
}

fn json_array(items: &[String]) -> Value {
    Value::from(items.to_vec())
}

fn json_map(map: &std::collections::BTreeMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

/// Row shape shared by every source table.
#[derive(Debug, sqlx::FromRow)]
struct PlaceRow {
    external_id: String,
    name: String,
    ascii_name: String,
    alternate_names: Value,
    type_code: Option<String>,
    country_code: Option<String>,
    admin1: Option<String>,
    admin2: Option<String>,
    admin3: Option<String>,
    admin4: Option<String>,
    population: Option<i64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    geometry: Option<String>,
    parent_id: Option<String>,
    ancestor_ids: Value,
    concordances: Value,
    last_modified: Option<DateTime<Utc>>,
}

impl PlaceRow {
    fn into_record(self, source: GazetteerSource) -> PlaceRecord {
        PlaceRecord {
            source,
            external_id: self.external_id,
            name: self.name,
            ascii_name: self.ascii_name,
            alternate_names: string_vec(&self.alternate_names),
            type_code: self.type_code,
            country_code: self.country_code,
            admin1: self.admin1,
            admin2: self.admin2,
            admin3: self.admin3,
            admin4: self.admin4,
            population: self.population,
            latitude: self.latitude,
            longitude: self.longitude,
            geometry: self.geometry,
            parent_id: self.parent_id,
            ancestor_ids: string_vec(&self.ancestor_ids),
            concordances: string_map(&self.concordances),
            last_modified: self.last_modified,
        }
    }
}

fn string_vec(v: &Value) -> Vec<String> {
    v.as_array()
        .map(|a| a.iter().filter_map(|s| s.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

fn string_map(v: &Value) -> std::collections::BTreeMap<String, String> {
    v.as_object()
        .map(|o| {
            o.iter()
                .filter_map(|(k, val)| val.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
