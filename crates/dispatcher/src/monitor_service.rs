//! 资产监控任务管理与触发

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use recon_core::{
    config::SchedulerConfig,
    models::{
        AssetScope, AssetScopeType, MonitorJob, MonitorScopeType, MonitorStatus, ScanOptions,
        Task, TaskTag,
    },
    target::{is_valid_domain, target_to_list},
    traits::{MonitorJobRepository, PolicyRepository, ScopeRepository},
    SchedulerError, SchedulerResult,
};
use recon_infrastructure::{MetricsCollector, StructuredLogger};

use crate::submission::{build_task, disable_domain_options, TaskSubmitter};

const MAX_JOB_NAME_CHARS: usize = 50;

/// 域名监控默认扫描配置
pub fn domain_monitor_options() -> ScanOptions {
    to_options(json!({
        "domain_brute": true,
        "domain_brute_type": "big",
        "alt_dns": false,
        "arl_search": true,
        "port_scan_type": "test",
        "port_scan": true,
        "dns_query_plugin": true,
        "site_identify": false
    }))
}

/// IP 监控默认扫描配置
pub fn ip_monitor_options() -> ScanOptions {
    to_options(json!({
        "port_scan_type": "test",
        "port_scan": true,
        "site_identify": false
    }))
}

fn to_options(value: Value) -> ScanOptions {
    match value {
        Value::Object(map) => map,
        _ => ScanOptions::new(),
    }
}

pub struct MonitorService {
    job_repo: Arc<dyn MonitorJobRepository>,
    scope_repo: Arc<dyn ScopeRepository>,
    policy_repo: Arc<dyn PolicyRepository>,
    submitter: Arc<TaskSubmitter>,
    config: SchedulerConfig,
    metrics: Arc<MetricsCollector>,
}

impl MonitorService {
    pub fn new(
        job_repo: Arc<dyn MonitorJobRepository>,
        scope_repo: Arc<dyn ScopeRepository>,
        policy_repo: Arc<dyn PolicyRepository>,
        submitter: Arc<TaskSubmitter>,
        config: SchedulerConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            job_repo,
            scope_repo,
            policy_repo,
            submitter,
            config,
            metrics,
        }
    }

    /// 为资产组内的目标添加监控
    ///
    /// 所有校验在写入任何记录之前完成。域名资产组每个域名一个监控任务，
    /// IP 资产组所有 IP 合并为一个监控任务。
    pub async fn add_monitor_job(
        &self,
        scope_id: &str,
        target: &str,
        interval: i64,
        name: Option<&str>,
        policy_id: Option<&str>,
    ) -> SchedulerResult<Vec<MonitorJob>> {
        self.check_interval(interval)?;
        let scope = self.load_scope(scope_id).await?;

        let options = match policy_id.filter(|id| !id.is_empty()) {
            Some(id) => {
                let policy = self
                    .policy_repo
                    .get(id)
                    .await?
                    .ok_or_else(|| SchedulerError::PolicyNotFound { id: id.to_string() })?;
                Some(policy.options_for(TaskTag::Task))
            }
            None => None,
        };

        let targets = target_to_list(target);
        if targets.is_empty() {
            return Err(SchedulerError::InvalidTarget(target.to_string()));
        }

        let scope_type = match scope.scope_type {
            AssetScopeType::Domain => MonitorScopeType::Domain,
            AssetScopeType::Ip => MonitorScopeType::Ip,
        };
        let monitored = self.monitored_targets(scope_id, scope_type).await?;

        for item in &targets {
            if scope.scope_type == AssetScopeType::Domain && !is_valid_domain(item) {
                return Err(SchedulerError::InvalidTarget(item.clone()));
            }
            if !scope.contains(item) {
                return Err(SchedulerError::NotInScope {
                    target: item.clone(),
                    scope_id: scope_id.to_string(),
                });
            }
            if monitored.contains(item) {
                return Err(SchedulerError::DuplicateTarget {
                    target: item.clone(),
                });
            }
        }

        let job_targets = match scope_type {
            MonitorScopeType::Ip => vec![targets.join(" ")],
            _ => targets,
        };

        let first_run = self.first_run_time();
        let mut jobs = Vec::with_capacity(job_targets.len());
        for job_target in job_targets {
            let mut job = MonitorJob::new(scope_id, &job_target, scope_type, interval, first_run);
            job.name = job_name(name, &scope, &job_target);
            job.policy_id = policy_id.map(str::to_string);
            job.monitor_options = match &options {
                Some(options) => options.clone(),
                None => default_options(scope_type),
            };
            if scope_type == MonitorScopeType::Ip {
                disable_domain_options(&mut job.monitor_options);
            }

            self.job_repo.insert(&job).await?;
            info!(
                "添加 {} 监控任务 {}，目标 {}，周期 {} 秒",
                scope_type.as_str(),
                job.id,
                job.target,
                interval
            );
            jobs.push(job);
        }

        Ok(jobs)
    }

    /// 资产站点更新监控，每个资产组最多一个
    pub async fn add_site_monitor_job(
        &self,
        scope_id: &str,
        interval: i64,
        name: Option<&str>,
    ) -> SchedulerResult<MonitorJob> {
        self.add_singleton_job(scope_id, interval, name, MonitorScopeType::SiteUpdateMonitor)
            .await
    }

    /// WIH 更新监控，每个资产组最多一个
    pub async fn add_wih_monitor_job(
        &self,
        scope_id: &str,
        interval: i64,
        name: Option<&str>,
    ) -> SchedulerResult<MonitorJob> {
        self.add_singleton_job(scope_id, interval, name, MonitorScopeType::WihUpdateMonitor)
            .await
    }

    async fn add_singleton_job(
        &self,
        scope_id: &str,
        interval: i64,
        name: Option<&str>,
        scope_type: MonitorScopeType,
    ) -> SchedulerResult<MonitorJob> {
        self.check_interval(interval)?;
        let scope = self.load_scope(scope_id).await?;

        if !self
            .job_repo
            .find_by_scope(scope_id, Some(scope_type))
            .await?
            .is_empty()
        {
            return Err(SchedulerError::DuplicateMonitor {
                scope_id: scope_id.to_string(),
                scope_type: scope_type.as_str().to_string(),
            });
        }

        let (target, default_name) = match scope_type {
            MonitorScopeType::SiteUpdateMonitor => {
                ("资产站点更新", format!("站点监控-{}", scope.name))
            }
            _ => ("WIH 更新", format!("WIH 监控-{}", scope.name)),
        };

        let mut job = MonitorJob::new(scope_id, target, scope_type, interval, self.first_run_time());
        job.name = truncate(name.filter(|n| !n.is_empty()).unwrap_or(&default_name));
        self.job_repo.insert(&job).await?;

        info!("添加 {} 监控任务 {}，资产组 {}", scope_type.as_str(), job.id, scope_id);
        Ok(job)
    }

    /// 停止监控：下次运行时间置空，调度循环不再触发
    pub async fn stop_job(&self, job_id: &str) -> SchedulerResult<MonitorJob> {
        let mut job = self.load(job_id).await?;
        if job.status == MonitorStatus::Stop {
            return Err(SchedulerError::InvalidStateTransition(format!(
                "监控任务 {job_id} 已经停止"
            )));
        }
        job.status = MonitorStatus::Stop;
        job.next_run_time = None;
        self.job_repo.replace(&job).await?;
        info!("停止监控任务 {}", job_id);
        Ok(job)
    }

    /// 恢复监控：下次运行时间为 now + 首次延迟 + 周期
    pub async fn recover_job(&self, job_id: &str) -> SchedulerResult<MonitorJob> {
        let mut job = self.load(job_id).await?;
        if job.status == MonitorStatus::Running {
            return Err(SchedulerError::InvalidStateTransition(format!(
                "监控任务 {job_id} 正在运行"
            )));
        }
        job.status = MonitorStatus::Running;
        job.next_run_time = Some(self.first_run_time() + Duration::seconds(job.interval));
        self.job_repo.replace(&job).await?;
        info!("恢复监控任务 {}，下次运行 {:?}", job_id, job.next_run_time);
        Ok(job)
    }

    pub async fn delete_job(&self, job_id: &str) -> SchedulerResult<()> {
        if !self.job_repo.delete(job_id).await? {
            return Err(SchedulerError::MonitorJobNotFound {
                id: job_id.to_string(),
            });
        }
        info!("删除监控任务 {}", job_id);
        Ok(())
    }

    /// 记录一次实际运行：last = now，next = now + interval，运行次数加一
    pub async fn update_job_run(&self, job_id: &str, now: DateTime<Utc>) -> SchedulerResult<()> {
        let Some(mut job) = self.job_repo.get(job_id).await? else {
            debug!("监控任务 {} 已不存在，跳过运行记录", job_id);
            return Ok(());
        };
        job.record_run(now);
        self.job_repo.replace(&job).await
    }

    /// 调度循环第二阶段：触发所有到期的监控任务
    pub async fn fire_due_jobs(&self, now: DateTime<Utc>) -> SchedulerResult<usize> {
        let jobs = self.job_repo.find_running().await?;
        let mut fired = 0;

        for job in jobs.into_iter().filter(|job| job.is_due(now)) {
            match self.fire(job, now).await {
                Ok(_) => fired += 1,
                Err(e) => {
                    self.metrics.record_job_failure();
                    StructuredLogger::log_system_error("monitor_service", "fire_job", &e);
                }
            }
        }

        Ok(fired)
    }

    /// 触发一次监控：先推进下次运行时间，再下发唯一的监控任务
    pub async fn fire(&self, mut job: MonitorJob, now: DateTime<Utc>) -> SchedulerResult<Task> {
        job.next_run_time = Some(now + Duration::seconds(job.interval));
        self.job_repo.replace(&job).await?;

        let task = self.submitter.submit(build_monitor_task(&job)).await?;

        self.metrics.record_monitor_job_fired();
        StructuredLogger::log_monitor_job_fired(&job.id, &job.scope_id, job.scope_type.as_str(), &task.id);
        Ok(task)
    }

    fn check_interval(&self, interval: i64) -> SchedulerResult<()> {
        let minimum = self.config.monitor_min_interval_seconds;
        if interval < minimum {
            return Err(SchedulerError::IntervalTooShort { interval, minimum });
        }
        Ok(())
    }

    fn first_run_time(&self) -> DateTime<Utc> {
        Utc::now() + Duration::seconds(self.config.monitor_first_run_delay_seconds)
    }

    async fn monitored_targets(
        &self,
        scope_id: &str,
        scope_type: MonitorScopeType,
    ) -> SchedulerResult<HashSet<String>> {
        let jobs = self.job_repo.find_by_scope(scope_id, Some(scope_type)).await?;
        Ok(jobs
            .iter()
            .flat_map(|job| job.target.split_whitespace().map(str::to_string))
            .collect())
    }

    async fn load_scope(&self, scope_id: &str) -> SchedulerResult<AssetScope> {
        self.scope_repo
            .get(scope_id)
            .await?
            .ok_or_else(|| SchedulerError::ScopeNotFound {
                id: scope_id.to_string(),
            })
    }

    async fn load(&self, job_id: &str) -> SchedulerResult<MonitorJob> {
        self.job_repo
            .get(job_id)
            .await?
            .ok_or_else(|| SchedulerError::MonitorJobNotFound {
                id: job_id.to_string(),
            })
    }
}

/// 由监控任务构建下发的扫描任务，配置中携带 `scope_id` 与 `scheduler_id`
pub fn build_monitor_task(job: &MonitorJob) -> Task {
    let mut options = default_options(job.scope_type);
    options.extend(job.monitor_options.clone());
    options.insert("scope_id".to_string(), Value::String(job.scope_id.clone()));
    options.insert("scheduler_id".to_string(), Value::String(job.id.clone()));

    let mut task = build_task(
        &job.name,
        &job.target,
        job.scope_type.task_kind(),
        TaskTag::Monitor,
        options,
    );
    if job.scope_type == MonitorScopeType::Ip {
        task.targets = job.target.split_whitespace().map(str::to_string).collect();
    }
    task
}

fn default_options(scope_type: MonitorScopeType) -> ScanOptions {
    match scope_type {
        MonitorScopeType::Domain => domain_monitor_options(),
        MonitorScopeType::Ip => ip_monitor_options(),
        MonitorScopeType::SiteUpdateMonitor | MonitorScopeType::WihUpdateMonitor => {
            ScanOptions::new()
        }
    }
}

fn job_name(name: Option<&str>, scope: &AssetScope, target: &str) -> String {
    match name.filter(|n| !n.is_empty()) {
        Some(name) => truncate(name),
        None => truncate(&format!("监控-{}-{}", scope.name, target)),
    }
}

fn truncate(name: &str) -> String {
    if name.chars().count() <= MAX_JOB_NAME_CHARS {
        return name.to_string();
    }
    warn!("监控任务名称过长，截断: {}", name);
    name.chars().take(MAX_JOB_NAME_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::models::TaskKind;

    #[test]
    fn test_monitor_task_carries_job_references() {
        let mut job = MonitorJob::new("scope1", "1.1.1.1 2.2.2.2", MonitorScopeType::Ip, 21600, Utc::now());
        job.name = "监控-测试-ip".to_string();
        job.monitor_options = ip_monitor_options();

        let task = build_monitor_task(&job);
        assert_eq!(task.kind, TaskKind::Ip);
        assert_eq!(task.tag, TaskTag::Monitor);
        assert_eq!(task.scope_id(), Some("scope1"));
        assert_eq!(task.monitor_job_id(), Some(job.id.as_str()));
        assert_eq!(task.options["domain_brute"], Value::Bool(false));
        assert_eq!(task.targets, vec!["1.1.1.1", "2.2.2.2"]);
    }

    #[test]
    fn test_domain_monitor_task_uses_defaults() {
        let job = MonitorJob::new("scope1", "a.example.com", MonitorScopeType::Domain, 21600, Utc::now());
        let task = build_monitor_task(&job);
        assert_eq!(task.kind, TaskKind::Domain);
        assert_eq!(task.options["domain_brute_type"], Value::String("big".into()));
        assert_eq!(task.options["arl_search"], Value::Bool(true));
    }

    #[test]
    fn test_job_name_is_truncated() {
        let long = "x".repeat(80);
        assert_eq!(truncate(&long).chars().count(), MAX_JOB_NAME_CHARS);
        assert_eq!(truncate("short"), "short");
    }
}
