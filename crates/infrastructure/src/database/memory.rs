//! 内存存储
//!
//! 以 `RwLock<HashMap>` 实现全部仓储接口和资产基线读取，用于嵌入式模式和测试。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use recon_core::{
    models::{
        AssetScope, DedupRecord, MonitorJob, MonitorScopeType, MonitorStatus, Policy, PushStatus,
        ScheduleRun, ScheduleStatus, ScheduledJob, Task, TaskStatus,
    },
    traits::{
        AssetBaselineReader, AssetBaselineWriter, DedupRepository, DomainRecord, IpRecord,
        MonitorJobRepository, PolicyRepository, ScheduleRunRepository, ScheduledJobRepository,
        ScopeRepository, TaskRepository, WihRecord,
    },
    SchedulerError, SchedulerResult,
};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Baseline {
    domains: HashSet<String>,
    ips: HashSet<String>,
    ip_ports: HashSet<String>,
    sites: HashSet<String>,
    wih_hashes: HashSet<String>,
}

/// 内存文档存储
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tasks: RwLock<HashMap<String, Task>>,
    scheduled_jobs: RwLock<HashMap<String, ScheduledJob>>,
    schedule_runs: RwLock<HashMap<String, ScheduleRun>>,
    monitor_jobs: RwLock<HashMap<String, MonitorJob>>,
    dedup: RwLock<HashSet<String>>,
    policies: RwLock<HashMap<String, Policy>>,
    scopes: RwLock<HashMap<String, AssetScope>>,
    baselines: RwLock<HashMap<String, Baseline>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_policy(&self, policy: Policy) {
        self.policies.write().await.insert(policy.id.clone(), policy);
    }

    pub async fn put_scope(&self, scope: AssetScope) {
        self.scopes.write().await.insert(scope.id.clone(), scope);
    }

    /// 写入已确认的域名资产
    pub async fn add_domain_asset(&self, scope_id: &str, domain: &str) {
        let mut baselines = self.baselines.write().await;
        let baseline = baselines.entry(scope_id.to_string()).or_default();
        baseline.domains.insert(domain.to_string());
    }

    /// 写入已确认的 IP 资产及其开放端口
    pub async fn add_ip_asset(&self, scope_id: &str, ip: &str, ports: &[u16]) {
        let mut baselines = self.baselines.write().await;
        let baseline = baselines.entry(scope_id.to_string()).or_default();
        baseline.ips.insert(ip.to_string());
        for port in ports {
            baseline.ip_ports.insert(format!("{ip}:{port}"));
        }
    }

    pub async fn add_site_asset(&self, scope_id: &str, site: &str) {
        let mut baselines = self.baselines.write().await;
        let baseline = baselines.entry(scope_id.to_string()).or_default();
        baseline.sites.insert(site.to_string());
    }

    pub async fn add_wih_asset(&self, scope_id: &str, hash: &str) {
        let mut baselines = self.baselines.write().await;
        let baseline = baselines.entry(scope_id.to_string()).or_default();
        baseline.wih_hashes.insert(hash.to_string());
    }

    async fn baseline_set<F>(&self, scope_id: &str, pick: F) -> HashSet<String>
    where
        F: Fn(&Baseline) -> &HashSet<String>,
    {
        self.baselines
            .read()
            .await
            .get(scope_id)
            .map(|baseline| pick(baseline).clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryStore {
    async fn insert(&self, task: &Task) -> SchedulerResult<()> {
        self.tasks.write().await.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> SchedulerResult<Option<Task>> {
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn replace(&self, task: &Task) -> SchedulerResult<()> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(SchedulerError::TaskNotFound { id: task.id.clone() }),
        }
    }

    async fn set_queue_handle(&self, id: &str, handle: &str) -> SchedulerResult<()> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| SchedulerError::TaskNotFound { id: id.to_string() })?;
        task.queue_handle = Some(handle.to_string());
        Ok(())
    }

    async fn delete_if_status(&self, id: &str, status: &TaskStatus) -> SchedulerResult<bool> {
        let mut tasks = self.tasks.write().await;
        if tasks.get(id).is_some_and(|task| &task.status == status) {
            tasks.remove(id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn delete(&self, id: &str) -> SchedulerResult<bool> {
        Ok(self.tasks.write().await.remove(id).is_some())
    }

    async fn find_by_ids(&self, ids: &[String]) -> SchedulerResult<Vec<Task>> {
        let tasks = self.tasks.read().await;
        Ok(ids.iter().filter_map(|id| tasks.get(id).cloned()).collect())
    }
}

#[async_trait]
impl ScheduledJobRepository for InMemoryStore {
    async fn insert(&self, job: &ScheduledJob) -> SchedulerResult<()> {
        self.scheduled_jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> SchedulerResult<Option<ScheduledJob>> {
        Ok(self.scheduled_jobs.read().await.get(id).cloned())
    }

    async fn replace(&self, job: &ScheduledJob) -> SchedulerResult<()> {
        let mut jobs = self.scheduled_jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(SchedulerError::ScheduledJobNotFound { id: job.id.clone() }),
        }
    }

    async fn delete(&self, id: &str) -> SchedulerResult<bool> {
        Ok(self.scheduled_jobs.write().await.remove(id).is_some())
    }

    async fn find_scheduled(&self) -> SchedulerResult<Vec<ScheduledJob>> {
        let mut jobs: Vec<ScheduledJob> = self
            .scheduled_jobs
            .read()
            .await
            .values()
            .filter(|job| job.status == ScheduleStatus::Scheduled)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }
}

#[async_trait]
impl ScheduleRunRepository for InMemoryStore {
    async fn insert(&self, run: &ScheduleRun) -> SchedulerResult<()> {
        self.schedule_runs.write().await.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> SchedulerResult<Option<ScheduleRun>> {
        Ok(self.schedule_runs.read().await.get(id).cloned())
    }

    async fn replace(&self, run: &ScheduleRun) -> SchedulerResult<()> {
        let mut runs = self.schedule_runs.write().await;
        match runs.get_mut(&run.id) {
            Some(existing) => {
                *existing = run.clone();
                Ok(())
            }
            None => Err(SchedulerError::ScheduleRunNotFound { id: run.id.clone() }),
        }
    }

    async fn find_unsettled(&self) -> SchedulerResult<Vec<ScheduleRun>> {
        let mut runs: Vec<ScheduleRun> = self
            .schedule_runs
            .read()
            .await
            .values()
            .filter(|run| run.push_status == PushStatus::Pending)
            .cloned()
            .collect();
        runs.sort_by_key(|run| run.created_at);
        Ok(runs)
    }

    async fn find_by_schedule(&self, schedule_id: &str) -> SchedulerResult<Vec<ScheduleRun>> {
        let mut runs: Vec<ScheduleRun> = self
            .schedule_runs
            .read()
            .await
            .values()
            .filter(|run| run.schedule_id == schedule_id)
            .cloned()
            .collect();
        runs.sort_by_key(|run| run.run_number);
        Ok(runs)
    }
}

#[async_trait]
impl MonitorJobRepository for InMemoryStore {
    async fn insert(&self, job: &MonitorJob) -> SchedulerResult<()> {
        self.monitor_jobs.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> SchedulerResult<Option<MonitorJob>> {
        Ok(self.monitor_jobs.read().await.get(id).cloned())
    }

    async fn replace(&self, job: &MonitorJob) -> SchedulerResult<()> {
        let mut jobs = self.monitor_jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(SchedulerError::MonitorJobNotFound { id: job.id.clone() }),
        }
    }

    async fn delete(&self, id: &str) -> SchedulerResult<bool> {
        Ok(self.monitor_jobs.write().await.remove(id).is_some())
    }

    async fn find_running(&self) -> SchedulerResult<Vec<MonitorJob>> {
        let mut jobs: Vec<MonitorJob> = self
            .monitor_jobs
            .read()
            .await
            .values()
            .filter(|job| job.status == MonitorStatus::Running)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn find_by_scope(
        &self,
        scope_id: &str,
        scope_type: Option<MonitorScopeType>,
    ) -> SchedulerResult<Vec<MonitorJob>> {
        Ok(self
            .monitor_jobs
            .read()
            .await
            .values()
            .filter(|job| job.scope_id == scope_id)
            .filter(|job| scope_type.map_or(true, |t| job.scope_type == t))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DedupRepository for InMemoryStore {
    async fn insert_if_absent(&self, record: &DedupRecord) -> SchedulerResult<bool> {
        Ok(self.dedup.write().await.insert(record.key()))
    }

    async fn contains(&self, scope: &str, hash: &str) -> SchedulerResult<bool> {
        Ok(self.dedup.read().await.contains(&format!("{scope}:{hash}")))
    }
}

#[async_trait]
impl PolicyRepository for InMemoryStore {
    async fn get(&self, id: &str) -> SchedulerResult<Option<Policy>> {
        Ok(self.policies.read().await.get(id).cloned())
    }
}

#[async_trait]
impl ScopeRepository for InMemoryStore {
    async fn get(&self, id: &str) -> SchedulerResult<Option<AssetScope>> {
        Ok(self.scopes.read().await.get(id).cloned())
    }
}

#[async_trait]
impl AssetBaselineReader for InMemoryStore {
    async fn domains(&self, scope_id: &str) -> SchedulerResult<HashSet<String>> {
        Ok(self.baseline_set(scope_id, |b| &b.domains).await)
    }

    async fn ips(&self, scope_id: &str) -> SchedulerResult<HashSet<String>> {
        Ok(self.baseline_set(scope_id, |b| &b.ips).await)
    }

    async fn ip_ports(&self, scope_id: &str) -> SchedulerResult<HashSet<String>> {
        Ok(self.baseline_set(scope_id, |b| &b.ip_ports).await)
    }

    async fn sites(&self, scope_id: &str) -> SchedulerResult<HashSet<String>> {
        Ok(self.baseline_set(scope_id, |b| &b.sites).await)
    }

    async fn wih_hashes(&self, scope_id: &str) -> SchedulerResult<HashSet<String>> {
        Ok(self.baseline_set(scope_id, |b| &b.wih_hashes).await)
    }
}

#[async_trait]
impl AssetBaselineWriter for InMemoryStore {
    async fn add_domains(&self, scope_id: &str, domains: &[DomainRecord]) -> SchedulerResult<()> {
        for record in domains {
            self.add_domain_asset(scope_id, &record.domain).await;
        }
        Ok(())
    }

    async fn add_ips(&self, scope_id: &str, ips: &[IpRecord]) -> SchedulerResult<()> {
        for record in ips {
            self.add_ip_asset(scope_id, &record.ip, &record.ports).await;
        }
        Ok(())
    }

    async fn add_sites(&self, scope_id: &str, sites: &[String]) -> SchedulerResult<()> {
        for site in sites {
            self.add_site_asset(scope_id, site).await;
        }
        Ok(())
    }

    async fn add_wih(&self, scope_id: &str, records: &[WihRecord]) -> SchedulerResult<()> {
        for record in records {
            self.add_wih_asset(scope_id, &record.fnv_hash()).await;
        }
        Ok(())
    }
}
