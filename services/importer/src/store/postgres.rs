//! Postgres-backed entity store.
//!
//! Table and column names in generated SQL come from `Record` constants,
//! never from input files; values are always bound.

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::{EntityStore, MatchSpec, Record, ID_COLUMN};
use crate::error::{StoreError, StoreResult};
use crate::model::{ImportRun, Labelled, Observation, RunOutcome};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Rows per INSERT statement; keeps bind parameters under the
/// Postgres limit of 65535 (11 binds per observation).
const INSERT_CHUNK_ROWS: usize = 4_000;

const OBSERVATION_COLUMNS: &str = "id, subject_id, location_id, level_id, school_id, \
    school_type, geographic_level, time_identifier, year, filter_item_ids, measures";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(db_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;
        Ok(Self { pool })
    }

    /// Create tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

fn select_query<R: Record>(spec: &MatchSpec) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!(
        "SELECT id, {} FROM {} WHERE TRUE",
        R::COLUMNS.join(", "),
        R::TABLE
    ));
    for clause in spec.clauses() {
        let column = if clause.column == ID_COLUMN {
            "id::text"
        } else {
            clause.column
        };
        match &clause.expected {
            Some(value) => {
                query.push(format!(" AND {column} = "));
                query.push_bind(value.clone());
            }
            None => {
                query.push(format!(" AND {column} IS NULL"));
            }
        }
    }
    query.push(" LIMIT 1");
    query
}

fn insert_query<R: Record>(record: &R) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!(
        "INSERT INTO {} (id, {}) ",
        R::TABLE,
        R::COLUMNS.join(", ")
    ));
    query.push_values(std::iter::once(record), |mut row, record| {
        row.push_bind(record.id());
        for value in record.values() {
            row.push_bind(value);
        }
    });
    query
}

fn decode<R: Record>(row: PgRow) -> StoreResult<R> {
    let id: Uuid = row.try_get("id")?;
    let values = R::COLUMNS
        .iter()
        .map(|column| row.try_get::<Option<String>, _>(*column))
        .collect::<Result<Vec<_>, _>>()?;
    R::from_values(id, values)
}

#[async_trait]
impl EntityStore for PgStore {
    async fn find<R: Record>(&self, spec: &MatchSpec) -> StoreResult<Option<R>> {
        let row = select_query::<R>(spec)
            .build()
            .fetch_optional(&self.pool)
            .await?;
        row.map(decode::<R>).transpose()
    }

    async fn add<R: Record>(&self, record: &R) -> StoreResult<()> {
        insert_query(record).build().execute(&self.pool).await?;
        Ok(())
    }

    async fn add_observations(&self, batch: &[Observation]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in batch.chunks(INSERT_CHUNK_ROWS) {
            let measures = chunk
                .iter()
                .map(|o| serde_json::to_value(&o.measures))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Rejected(format!("measures: {e}")))?;

            let mut query: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO observations ({OBSERVATION_COLUMNS}) "));
            query.push_values(chunk.iter().zip(measures), |mut row, (o, measures)| {
                row.push_bind(o.id)
                    .push_bind(o.subject_id)
                    .push_bind(o.location_id())
                    .push_bind(o.level_id())
                    .push_bind(o.school_id)
                    .push_bind(o.school_type.map(|t| t.label().to_string()))
                    .push_bind(o.geographic_level.label().to_string())
                    .push_bind(o.time_identifier.label().to_string())
                    .push_bind(o.year)
                    .push_bind(o.filter_item_ids.clone())
                    .push_bind(measures);
            });
            query.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_observations(&self, subject_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM observations WHERE subject_id = $1")
            .bind(subject_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn start_run(&self, subject_id: Uuid) -> StoreResult<ImportRun> {
        let run = ImportRun::start(subject_id);
        sqlx::query(
            r#"
            INSERT INTO import_runs (id, subject_id, started_at, status, observations)
            VALUES ($1, $2, $3, $4, 0)
            "#,
        )
        .bind(run.id)
        .bind(run.subject_id)
        .bind(run.started_at)
        .bind(run.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(run)
    }

    async fn finish_run(&self, run_id: Uuid, outcome: &RunOutcome) -> StoreResult<()> {
        let (observations, error) = match outcome {
            RunOutcome::Complete { observations } => (*observations, None),
            RunOutcome::Failed {
                observations,
                error,
            } => (*observations, Some(error.as_str())),
        };
        sqlx::query(
            r#"
            UPDATE import_runs
            SET finished_at = now(), status = $2, observations = $3, error = $4
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(outcome.status().as_str())
        .bind(observations as i64)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FilterGroup, School};

    #[test]
    fn test_select_query_binds_values_and_nulls() {
        let spec = MatchSpec::new()
            .eq("laestab", "3732060")
            .absent("urn");
        let query = select_query::<School>(&spec);
        assert_eq!(
            query.sql(),
            "SELECT id, laestab, academy_open_date, academy_type, estab, urn, name \
             FROM schools WHERE TRUE AND laestab = $1 AND urn IS NULL LIMIT 1"
        );
    }

    #[test]
    fn test_select_query_by_id() {
        let query = select_query::<FilterGroup>(&MatchSpec::id(Uuid::nil()));
        assert!(query.sql().contains("AND id::text = $1"));
    }

    #[test]
    fn test_insert_query_has_one_bind_per_column() {
        let group = FilterGroup {
            id: Uuid::new_v4(),
            filter_id: Uuid::new_v4(),
            label: "Default".into(),
        };
        let query = insert_query(&group);
        assert_eq!(
            query.sql(),
            "INSERT INTO filter_groups (id, filter_id, label) VALUES ($1, $2, $3)"
        );
    }

    #[test]
    fn test_schema_declares_every_table() {
        for table in [
            "subjects",
            "filters",
            "filter_groups",
            "filter_items",
            "indicator_groups",
            "indicators",
            "schools",
            "locations",
            "level_composites",
            "observations",
            "import_runs",
        ] {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {table} ")),
                "missing {table}"
            );
        }
    }
}
