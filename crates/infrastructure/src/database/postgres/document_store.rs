use serde::{de::DeserializeOwned, Serialize};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Row};
use std::time::Duration;
use tracing::{debug, info, instrument};

use recon_core::{config::DatabaseConfig, SchedulerError, SchedulerResult};

/// 集合名称，每个集合对应一张 `(id TEXT PRIMARY KEY, doc JSONB)` 表
pub mod collections {
    pub const TASK: &str = "task";
    pub const TASK_SCHEDULE: &str = "task_schedule";
    pub const TASK_SCHEDULE_RUN: &str = "task_schedule_run";
    pub const SCHEDULER: &str = "scheduler";
    pub const DEDUP_RECORD: &str = "dedup_record";
    pub const POLICY: &str = "policy";
    pub const ASSET_SCOPE: &str = "asset_scope";
    pub const ASSET_DOMAIN: &str = "asset_domain";
    pub const ASSET_IP: &str = "asset_ip";
    pub const ASSET_SITE: &str = "asset_site";
    pub const ASSET_WIH: &str = "asset_wih";

    pub const ALL: [&str; 11] = [
        TASK,
        TASK_SCHEDULE,
        TASK_SCHEDULE_RUN,
        SCHEDULER,
        DEDUP_RECORD,
        POLICY,
        ASSET_SCOPE,
        ASSET_DOMAIN,
        ASSET_IP,
        ASSET_SITE,
        ASSET_WIH,
    ];
}

/// PostgreSQL 文档存储
///
/// 文档整体序列化为 JSONB，按 id 单文档读写；查询条件直接作用在 JSONB 字段上。
#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 按配置建立连接池
    pub async fn connect(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;
        info!("数据库连接池创建成功");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 创建全部集合表和常用查询字段的索引
    pub async fn migrate(&self) -> SchedulerResult<()> {
        for collection in collections::ALL {
            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {collection} (id TEXT PRIMARY KEY, doc JSONB NOT NULL)"
            );
            sqlx::query(&sql).execute(&self.pool).await?;
        }

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_task_schedule_status ON task_schedule ((doc->>'status'))",
            "CREATE INDEX IF NOT EXISTS idx_task_schedule_run_push ON task_schedule_run ((doc->>'push_status'))",
            "CREATE INDEX IF NOT EXISTS idx_scheduler_status ON scheduler ((doc->>'status'))",
            "CREATE INDEX IF NOT EXISTS idx_scheduler_scope ON scheduler ((doc->>'scope_id'))",
            "CREATE INDEX IF NOT EXISTS idx_asset_domain_scope ON asset_domain ((doc->>'scope_id'))",
            "CREATE INDEX IF NOT EXISTS idx_asset_ip_scope ON asset_ip ((doc->>'scope_id'))",
            "CREATE INDEX IF NOT EXISTS idx_asset_site_scope ON asset_site ((doc->>'scope_id'))",
            "CREATE INDEX IF NOT EXISTS idx_asset_wih_scope ON asset_wih ((doc->>'scope_id'))",
        ];
        for sql in indexes {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        info!("数据库表结构初始化完成");
        Ok(())
    }

    #[instrument(skip(self, doc))]
    pub async fn insert<T: Serialize + Sync>(
        &self,
        collection: &str,
        id: &str,
        doc: &T,
    ) -> SchedulerResult<()> {
        let sql = format!("INSERT INTO {collection} (id, doc) VALUES ($1, $2)");
        sqlx::query(&sql)
            .bind(id)
            .bind(Json(doc))
            .execute(&self.pool)
            .await?;
        debug!("文档 {} 已写入 {}", id, collection);
        Ok(())
    }

    /// 不存在时写入，返回是否写入
    pub async fn insert_if_absent<T: Serialize + Sync>(
        &self,
        collection: &str,
        id: &str,
        doc: &T,
    ) -> SchedulerResult<bool> {
        let sql = format!(
            "INSERT INTO {collection} (id, doc) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING"
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(Json(doc))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> SchedulerResult<Option<T>> {
        let sql = format!("SELECT doc FROM {collection} WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| decode_doc(&row)).transpose()
    }

    /// 按 id 整体替换，返回是否命中
    #[instrument(skip(self, doc))]
    pub async fn replace<T: Serialize + Sync>(
        &self,
        collection: &str,
        id: &str,
        doc: &T,
    ) -> SchedulerResult<bool> {
        let sql = format!("UPDATE {collection} SET doc = $2 WHERE id = $1");
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(Json(doc))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, collection: &str, id: &str) -> SchedulerResult<bool> {
        let sql = format!("DELETE FROM {collection} WHERE id = $1");
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// 按单个 JSONB 文本字段等值查询
    pub async fn find_by_field<T: DeserializeOwned>(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> SchedulerResult<Vec<T>> {
        let sql = format!(
            "SELECT doc FROM {collection} WHERE doc->>$1 = $2 ORDER BY doc->>'created_at'"
        );
        let rows = sqlx::query(&sql)
            .bind(field)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode_doc).collect()
    }

    pub async fn find_by_ids<T: DeserializeOwned>(
        &self,
        collection: &str,
        ids: &[String],
    ) -> SchedulerResult<Vec<T>> {
        let sql = format!("SELECT doc FROM {collection} WHERE id = ANY($1)");
        let rows = sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode_doc).collect()
    }

    /// 查询字符串列，返回去重后的集合
    pub async fn fetch_strings(
        &self,
        sql: &str,
        scope_id: &str,
    ) -> SchedulerResult<std::collections::HashSet<String>> {
        let rows = sqlx::query(sql)
            .bind(scope_id)
            .fetch_all(&self.pool)
            .await?;

        let mut values = std::collections::HashSet::with_capacity(rows.len());
        for row in rows {
            if let Some(value) = row.try_get::<Option<String>, _>("value")? {
                values.insert(value);
            }
        }
        Ok(values)
    }

    pub async fn execute_with_id(&self, sql: &str, id: &str, value: &str) -> SchedulerResult<u64> {
        let result = sqlx::query(sql)
            .bind(id)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn decode_doc<T: DeserializeOwned>(row: &sqlx::postgres::PgRow) -> SchedulerResult<T> {
    let doc: serde_json::Value = row.try_get("doc")?;
    serde_json::from_value(doc)
        .map_err(|e| SchedulerError::Serialization(format!("反序列化文档失败: {e}")))
}
