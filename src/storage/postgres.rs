use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::engine::{RecordStore, StorageResult};
use crate::models::Record;

const RECORDS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id VARCHAR(50) PRIMARY KEY,
    tenant_id VARCHAR(50),
    partition_id VARCHAR(50),
    access_id VARCHAR(50),
    name VARCHAR(255) NOT NULL DEFAULT '',
    created_at TIMESTAMPTZ NOT NULL,
    modified_at TIMESTAMPTZ NOT NULL
)
"#;

const RECORDS_NAME_INDEX_SQL: &str = "CREATE INDEX IF NOT EXISTS records_name_idx ON records (name)";

const SELECT_COLUMNS: &str =
    "id, tenant_id, partition_id, access_id, name, created_at, modified_at";

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: String,
    tenant_id: Option<String>,
    partition_id: Option<String>,
    access_id: Option<String>,
    name: String,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        Record {
            id: row.id,
            tenant_id: row.tenant_id,
            partition_id: row.partition_id,
            access_id: row.access_id,
            name: row.name,
            created_at: row.created_at,
            modified_at: row.modified_at,
        }
    }
}

/// PostgreSQL backend over a shared `sqlx` pool.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn ensure_schema(&self) -> StorageResult<()> {
        sqlx::query(RECORDS_SCHEMA_SQL).execute(&self.pool).await?;
        sqlx::query(RECORDS_NAME_INDEX_SQL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert(&self, record: &Record) -> StorageResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO records (id, tenant_id, partition_id, access_id, name, created_at, modified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                tenant_id = EXCLUDED.tenant_id,
                partition_id = EXCLUDED.partition_id,
                access_id = EXCLUDED.access_id,
                name = EXCLUDED.name,
                modified_at = EXCLUDED.modified_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.tenant_id)
        .bind(&record.partition_id)
        .bind(&record.access_id)
        .bind(&record.name)
        .bind(record.created_at)
        .bind(record.modified_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Record>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Record::from))
    }

    async fn find_by_name(&self, name: &str) -> StorageResult<Option<Record>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM records WHERE name = $1 ORDER BY id LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Record::from))
    }

    async fn row_count(&self) -> StorageResult<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*)::BIGINT FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
