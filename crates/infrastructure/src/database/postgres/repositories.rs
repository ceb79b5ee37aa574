use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use recon_core::{
    models::{
        AssetScope, DedupRecord, MonitorJob, MonitorScopeType, Policy, ScheduleRun, ScheduledJob,
        Task, TaskStatus,
    },
    traits::{
        AssetBaselineReader, AssetBaselineWriter, DedupRepository, DomainRecord, IpRecord,
        MonitorJobRepository, PolicyRepository, ScheduleRunRepository, ScheduledJobRepository,
        ScopeRepository, TaskRepository, WihRecord,
    },
    SchedulerError, SchedulerResult,
};
use serde_json::json;

use super::document_store::{collections, PostgresDocumentStore};

/// 监控写入的资产来源标记
const MONITOR_SOURCE: &str = "monitor";

#[async_trait]
impl TaskRepository for PostgresDocumentStore {
    async fn insert(&self, task: &Task) -> SchedulerResult<()> {
        PostgresDocumentStore::insert(self, collections::TASK, &task.id, task).await
    }

    async fn get(&self, id: &str) -> SchedulerResult<Option<Task>> {
        PostgresDocumentStore::get(self, collections::TASK, id).await
    }

    async fn replace(&self, task: &Task) -> SchedulerResult<()> {
        if !PostgresDocumentStore::replace(self, collections::TASK, &task.id, task).await? {
            return Err(SchedulerError::TaskNotFound { id: task.id.clone() });
        }
        Ok(())
    }

    async fn set_queue_handle(&self, id: &str, handle: &str) -> SchedulerResult<()> {
        let affected = self
            .execute_with_id(
                "UPDATE task SET doc = jsonb_set(doc, '{queue_handle}', to_jsonb($2::text)) WHERE id = $1",
                id,
                handle,
            )
            .await?;
        if affected == 0 {
            return Err(SchedulerError::TaskNotFound { id: id.to_string() });
        }
        Ok(())
    }

    async fn delete_if_status(&self, id: &str, status: &TaskStatus) -> SchedulerResult<bool> {
        let affected = self
            .execute_with_id(
                "DELETE FROM task WHERE id = $1 AND doc->>'status' = $2",
                id,
                status.as_str(),
            )
            .await?;
        Ok(affected > 0)
    }

    async fn delete(&self, id: &str) -> SchedulerResult<bool> {
        PostgresDocumentStore::delete(self, collections::TASK, id).await
    }

    async fn find_by_ids(&self, ids: &[String]) -> SchedulerResult<Vec<Task>> {
        PostgresDocumentStore::find_by_ids(self, collections::TASK, ids).await
    }
}

#[async_trait]
impl ScheduledJobRepository for PostgresDocumentStore {
    async fn insert(&self, job: &ScheduledJob) -> SchedulerResult<()> {
        PostgresDocumentStore::insert(self, collections::TASK_SCHEDULE, &job.id, job).await
    }

    async fn get(&self, id: &str) -> SchedulerResult<Option<ScheduledJob>> {
        PostgresDocumentStore::get(self, collections::TASK_SCHEDULE, id).await
    }

    async fn replace(&self, job: &ScheduledJob) -> SchedulerResult<()> {
        if !PostgresDocumentStore::replace(self, collections::TASK_SCHEDULE, &job.id, job).await? {
            return Err(SchedulerError::ScheduledJobNotFound { id: job.id.clone() });
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> SchedulerResult<bool> {
        PostgresDocumentStore::delete(self, collections::TASK_SCHEDULE, id).await
    }

    async fn find_scheduled(&self) -> SchedulerResult<Vec<ScheduledJob>> {
        self.find_by_field(collections::TASK_SCHEDULE, "status", "scheduled")
            .await
    }
}

#[async_trait]
impl ScheduleRunRepository for PostgresDocumentStore {
    async fn insert(&self, run: &ScheduleRun) -> SchedulerResult<()> {
        PostgresDocumentStore::insert(self, collections::TASK_SCHEDULE_RUN, &run.id, run).await
    }

    async fn get(&self, id: &str) -> SchedulerResult<Option<ScheduleRun>> {
        PostgresDocumentStore::get(self, collections::TASK_SCHEDULE_RUN, id).await
    }

    async fn replace(&self, run: &ScheduleRun) -> SchedulerResult<()> {
        if !PostgresDocumentStore::replace(self, collections::TASK_SCHEDULE_RUN, &run.id, run)
            .await?
        {
            return Err(SchedulerError::ScheduleRunNotFound { id: run.id.clone() });
        }
        Ok(())
    }

    async fn find_unsettled(&self) -> SchedulerResult<Vec<ScheduleRun>> {
        self.find_by_field(collections::TASK_SCHEDULE_RUN, "push_status", "pending")
            .await
    }

    async fn find_by_schedule(&self, schedule_id: &str) -> SchedulerResult<Vec<ScheduleRun>> {
        self.find_by_field(collections::TASK_SCHEDULE_RUN, "schedule_id", schedule_id)
            .await
    }
}

#[async_trait]
impl MonitorJobRepository for PostgresDocumentStore {
    async fn insert(&self, job: &MonitorJob) -> SchedulerResult<()> {
        PostgresDocumentStore::insert(self, collections::SCHEDULER, &job.id, job).await
    }

    async fn get(&self, id: &str) -> SchedulerResult<Option<MonitorJob>> {
        PostgresDocumentStore::get(self, collections::SCHEDULER, id).await
    }

    async fn replace(&self, job: &MonitorJob) -> SchedulerResult<()> {
        if !PostgresDocumentStore::replace(self, collections::SCHEDULER, &job.id, job).await? {
            return Err(SchedulerError::MonitorJobNotFound { id: job.id.clone() });
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> SchedulerResult<bool> {
        PostgresDocumentStore::delete(self, collections::SCHEDULER, id).await
    }

    async fn find_running(&self) -> SchedulerResult<Vec<MonitorJob>> {
        self.find_by_field(collections::SCHEDULER, "status", "running")
            .await
    }

    async fn find_by_scope(
        &self,
        scope_id: &str,
        scope_type: Option<MonitorScopeType>,
    ) -> SchedulerResult<Vec<MonitorJob>> {
        let jobs: Vec<MonitorJob> = self
            .find_by_field(collections::SCHEDULER, "scope_id", scope_id)
            .await?;
        Ok(jobs
            .into_iter()
            .filter(|job| scope_type.map_or(true, |t| job.scope_type == t))
            .collect())
    }
}

#[async_trait]
impl DedupRepository for PostgresDocumentStore {
    async fn insert_if_absent(&self, record: &DedupRecord) -> SchedulerResult<bool> {
        PostgresDocumentStore::insert_if_absent(self, collections::DEDUP_RECORD, &record.key(), record)
            .await
    }

    async fn contains(&self, scope: &str, hash: &str) -> SchedulerResult<bool> {
        let key = format!("{scope}:{hash}");
        let record: Option<DedupRecord> =
            PostgresDocumentStore::get(self, collections::DEDUP_RECORD, &key).await?;
        Ok(record.is_some())
    }
}

#[async_trait]
impl PolicyRepository for PostgresDocumentStore {
    async fn get(&self, id: &str) -> SchedulerResult<Option<Policy>> {
        PostgresDocumentStore::get(self, collections::POLICY, id).await
    }
}

#[async_trait]
impl ScopeRepository for PostgresDocumentStore {
    async fn get(&self, id: &str) -> SchedulerResult<Option<AssetScope>> {
        PostgresDocumentStore::get(self, collections::ASSET_SCOPE, id).await
    }
}

#[async_trait]
impl AssetBaselineReader for PostgresDocumentStore {
    async fn domains(&self, scope_id: &str) -> SchedulerResult<HashSet<String>> {
        self.fetch_strings(
            "SELECT doc->>'domain' AS value FROM asset_domain WHERE doc->>'scope_id' = $1",
            scope_id,
        )
        .await
    }

    async fn ips(&self, scope_id: &str) -> SchedulerResult<HashSet<String>> {
        self.fetch_strings(
            "SELECT doc->>'ip' AS value FROM asset_ip WHERE doc->>'scope_id' = $1",
            scope_id,
        )
        .await
    }

    async fn ip_ports(&self, scope_id: &str) -> SchedulerResult<HashSet<String>> {
        self.fetch_strings(
            "SELECT (doc->>'ip') || ':' || p.port AS value \
             FROM asset_ip, jsonb_array_elements_text(COALESCE(doc->'ports', '[]'::jsonb)) AS p(port) \
             WHERE doc->>'scope_id' = $1",
            scope_id,
        )
        .await
    }

    async fn sites(&self, scope_id: &str) -> SchedulerResult<HashSet<String>> {
        self.fetch_strings(
            "SELECT doc->>'site' AS value FROM asset_site WHERE doc->>'scope_id' = $1",
            scope_id,
        )
        .await
    }

    async fn wih_hashes(&self, scope_id: &str) -> SchedulerResult<HashSet<String>> {
        self.fetch_strings(
            "SELECT doc->>'fnv_hash' AS value FROM asset_wih WHERE doc->>'scope_id' = $1",
            scope_id,
        )
        .await
    }
}

/// 监控写入的资产文档以 `monitor:<scope>:<key>` 为 id，重复写入被忽略
#[async_trait]
impl AssetBaselineWriter for PostgresDocumentStore {
    async fn add_domains(&self, scope_id: &str, domains: &[DomainRecord]) -> SchedulerResult<()> {
        for record in domains {
            let doc = json!({
                "scope_id": scope_id,
                "domain": record.domain,
                "ips": record.ips,
                "source": MONITOR_SOURCE,
                "created_at": Utc::now(),
            });
            let id = format!("{MONITOR_SOURCE}:{scope_id}:{}", record.domain);
            self.insert_if_absent(collections::ASSET_DOMAIN, &id, &doc).await?;
        }
        Ok(())
    }

    async fn add_ips(&self, scope_id: &str, ips: &[IpRecord]) -> SchedulerResult<()> {
        for record in ips {
            let doc = json!({
                "scope_id": scope_id,
                "ip": record.ip,
                "ports": record.ports,
                "source": MONITOR_SOURCE,
                "created_at": Utc::now(),
            });
            let id = format!("{MONITOR_SOURCE}:{scope_id}:{}", record.ip);
            if self.insert_if_absent(collections::ASSET_IP, &id, &doc).await? {
                continue;
            }

            // IP 已有文档，新端口各写一条，读取基线时按 IP 合并
            for port in &record.ports {
                let doc = json!({
                    "scope_id": scope_id,
                    "ip": record.ip,
                    "ports": [port],
                    "source": MONITOR_SOURCE,
                    "created_at": Utc::now(),
                });
                let id = format!("{MONITOR_SOURCE}:{scope_id}:{}:{port}", record.ip);
                self.insert_if_absent(collections::ASSET_IP, &id, &doc).await?;
            }
        }
        Ok(())
    }

    async fn add_sites(&self, scope_id: &str, sites: &[String]) -> SchedulerResult<()> {
        for site in sites {
            let doc = json!({
                "scope_id": scope_id,
                "site": site,
                "source": MONITOR_SOURCE,
                "created_at": Utc::now(),
            });
            let id = format!("{MONITOR_SOURCE}:{scope_id}:{site}");
            self.insert_if_absent(collections::ASSET_SITE, &id, &doc).await?;
        }
        Ok(())
    }

    async fn add_wih(&self, scope_id: &str, records: &[WihRecord]) -> SchedulerResult<()> {
        for record in records {
            let hash = record.fnv_hash();
            let doc = json!({
                "scope_id": scope_id,
                "record_type": record.record_type,
                "content": record.content,
                "site": record.site,
                "fnv_hash": hash,
                "source": MONITOR_SOURCE,
                "created_at": Utc::now(),
            });
            let id = format!("{MONITOR_SOURCE}:{scope_id}:{hash}");
            self.insert_if_absent(collections::ASSET_WIH, &id, &doc).await?;
        }
        Ok(())
    }
}
