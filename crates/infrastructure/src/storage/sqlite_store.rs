use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crawler_core::{CanonicalRecord, CrawlerError, CrawlerResult, PersistenceGateway, RecordType};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

/// 基于 SQLite 的记录存储
///
/// 所有类型的记录共用 `records` 表，主键为 `(platform, record_type, id)`。
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 连接数据库（不存在时创建）并执行迁移
    pub async fn connect(database_url: &str) -> CrawlerResult<Self> {
        debug!("Connecting SQLite record store at: {}", database_url);

        let in_memory = database_url.contains(":memory:");
        let mut connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        // 内存库每个连接各自独立，只能使用单连接
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .min_connections(1)
            .connect_with(connect_options)
            .await?;

        Self::run_migrations(&pool).await?;

        info!("SQLite 记录存储已连接");
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> CrawlerResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                platform TEXT NOT NULL,
                record_type TEXT NOT NULL,
                id TEXT NOT NULL,
                attributes TEXT NOT NULL DEFAULT '{}',
                metadata TEXT NOT NULL DEFAULT '{}',
                stored_at DATETIME NOT NULL,
                PRIMARY KEY (platform, record_type, id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_type ON records(record_type)")
            .execute(pool)
            .await?;

        Ok(())
    }

    async fn upsert(&self, record: &CanonicalRecord) -> CrawlerResult<()> {
        let attributes = serde_json::to_string(&record.attributes)?;
        let metadata = serde_json::to_string(&record.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO records (platform, record_type, id, attributes, metadata, stored_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT(platform, record_type, id) DO UPDATE SET
                attributes = excluded.attributes,
                metadata = excluded.metadata,
                stored_at = excluded.stored_at
            "#,
        )
        .bind(&record.platform)
        .bind(record.record_type.as_str())
        .bind(&record.id)
        .bind(attributes)
        .bind(metadata)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| CrawlerError::persistence(format!("写入记录 {} 失败: {e}", record.id)))?;

        Ok(())
    }

    pub async fn get(
        &self,
        record_type: RecordType,
        platform: &str,
        id: &str,
    ) -> CrawlerResult<Option<(CanonicalRecord, DateTime<Utc>)>> {
        let row = sqlx::query(
            "SELECT attributes, metadata, stored_at FROM records WHERE platform = $1 AND record_type = $2 AND id = $3",
        )
        .bind(platform)
        .bind(record_type.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let attributes: String = row.try_get("attributes")?;
        let metadata: String = row.try_get("metadata")?;
        let stored_at: DateTime<Utc> = row.try_get("stored_at")?;

        let record = CanonicalRecord {
            id: id.to_string(),
            platform: platform.to_string(),
            record_type,
            attributes: serde_json::from_str(&attributes)?,
            metadata: serde_json::from_str(&metadata)?,
        };
        Ok(Some((record, stored_at)))
    }

    pub async fn count(&self, record_type: RecordType) -> CrawlerResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE record_type = $1")
            .bind(record_type.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl PersistenceGateway for SqliteStore {
    async fn store_content(&self, record: &CanonicalRecord) -> CrawlerResult<()> {
        self.upsert(record).await
    }

    async fn store_comment(&self, record: &CanonicalRecord) -> CrawlerResult<()> {
        self.upsert(record).await
    }

    async fn store_creator(&self, record: &CanonicalRecord) -> CrawlerResult<()> {
        self.upsert(record).await
    }

    async fn close(&self) -> CrawlerResult<()> {
        self.pool.close().await;
        info!("SQLite 记录存储已关闭");
        Ok(())
    }
}
