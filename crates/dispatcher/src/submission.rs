//! 任务下发协议
//!
//! 先持久化（waiting）再投递，投递成功后回写队列句柄。投递失败时在记录仍为
//! waiting 时删除它并把错误交给调用方；消息一旦入队就不再回滚，句柄回写失败只记录日志。

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use recon_core::{
    config::MessageQueueConfig,
    models::{ScanOptions, Task, TaskKind, TaskPayload, TaskStatus, TaskTag},
    target::{split_ip_domain_targets, target_to_list},
    traits::{TaskQueueGateway, TaskRepository},
    Blacklist, SchedulerError, SchedulerResult,
};
use recon_infrastructure::{MetricsCollector, StructuredLogger};

/// IP 任务中无意义的域名类选项
const DOMAIN_ONLY_OPTIONS: [&str; 4] = ["domain_brute", "alt_dns", "dns_query_plugin", "arl_search"];

pub struct TaskSubmitter {
    task_repo: Arc<dyn TaskRepository>,
    queue: Arc<dyn TaskQueueGateway>,
    routes: MessageQueueConfig,
    blacklist: Arc<Blacklist>,
    metrics: Arc<MetricsCollector>,
}

impl TaskSubmitter {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        queue: Arc<dyn TaskQueueGateway>,
        routes: MessageQueueConfig,
        blacklist: Arc<Blacklist>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            task_repo,
            queue,
            routes,
            blacklist,
            metrics,
        }
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    /// 持久化并投递一个任务，返回带有队列句柄的任务
    pub async fn submit(&self, mut task: Task) -> SchedulerResult<Task> {
        task.status = TaskStatus::Waiting;
        task.queue_handle = None;
        self.task_repo.insert(&task).await?;

        match self.dispatch(&task).await {
            Ok(handle) => {
                StructuredLogger::log_task_submitted(&task.id, &task.name, task.kind.as_str(), &handle);
                self.metrics.record_task_submitted(task.kind.as_str());
                task.queue_handle = Some(handle);
                Ok(task)
            }
            Err(e) => {
                let rolled_back = match self
                    .task_repo
                    .delete_if_status(&task.id, &TaskStatus::Waiting)
                    .await
                {
                    Ok(deleted) => deleted,
                    Err(delete_err) => {
                        warn!("回滚任务 {} 失败: {}", task.id, delete_err);
                        false
                    }
                };
                StructuredLogger::log_dispatch_rolled_back(&task.id, rolled_back, &e);
                self.metrics.record_dispatch_failure(rolled_back);

                Err(match e {
                    SchedulerError::UnknownKind(_) => e,
                    other => SchedulerError::DispatchFailed(other.to_string()),
                })
            }
        }
    }

    async fn dispatch(&self, task: &Task) -> SchedulerResult<String> {
        let routing_key = self
            .routes
            .routing_key(task.kind)
            .ok_or_else(|| SchedulerError::UnknownKind(task.kind.to_string()))?;

        let payload = TaskPayload::from(task);
        let handle = self.queue.enqueue(routing_key, &payload).await?;
        debug!("任务 {} 已投递到 {}", task.id, routing_key);

        // 消息已在队列中，删除记录会让 Worker 取到不存在的任务
        if let Err(e) = self.task_repo.set_queue_handle(&task.id, &handle).await {
            warn!("任务 {} 已投递，回写队列句柄 {} 失败: {}", task.id, handle, e);
        }
        Ok(handle)
    }

    /// 资产扫描：所有 IP 合并为一个任务，每个域名一个任务
    ///
    /// 单个任务下发失败不影响其余任务，全部失败时返回第一个错误。
    pub async fn submit_scan_targets(
        &self,
        name: &str,
        target: &str,
        options: &ScanOptions,
        tag: TaskTag,
    ) -> SchedulerResult<Vec<Task>> {
        let split = split_ip_domain_targets(target, &self.blacklist)?;
        let mut tasks = Vec::new();

        if !split.ips.is_empty() {
            tasks.push(build_task(name, &split.ips.join(" "), TaskKind::Ip, tag, options.clone()));
        }
        for domain in &split.domains {
            tasks.push(build_task(name, domain, TaskKind::Domain, tag, options.clone()));
        }

        self.submit_all(tasks).await
    }

    /// 风险巡航：目标列表与 PoC 配置一起下发为单个任务
    pub async fn submit_risk_cruising(
        &self,
        name: &str,
        target: &str,
        options: &ScanOptions,
    ) -> SchedulerResult<Task> {
        let targets = target_to_list(target);
        if targets.is_empty() {
            return Err(SchedulerError::InvalidTarget(target.to_string()));
        }

        let poc_count = options
            .get("poc_config")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        let label = format!("目标：{}， PoC：{}", targets.len(), poc_count);

        let mut task = build_task(
            name,
            &label,
            TaskKind::RiskCruising,
            TaskTag::RiskCruising,
            options.clone(),
        );
        task.targets = targets;
        self.submit(task).await
    }

    /// 站点添加任务，与风险巡航同属一个任务标签
    pub async fn submit_site_add(
        &self,
        name: &str,
        sites: Vec<String>,
        options: &ScanOptions,
    ) -> SchedulerResult<Task> {
        if sites.is_empty() {
            return Err(SchedulerError::InvalidTarget("站点列表为空".to_string()));
        }
        let mut task = build_task(
            name,
            &format!("站点：{}", sites.len()),
            TaskKind::AssetSiteAdd,
            TaskTag::RiskCruising,
            options.clone(),
        );
        task.targets = sites;
        self.submit(task).await
    }

    /// 搜索引擎语句任务
    pub async fn submit_fofa_query(
        &self,
        name: &str,
        query: &str,
        options: &ScanOptions,
    ) -> SchedulerResult<Task> {
        if query.trim().is_empty() {
            return Err(SchedulerError::InvalidTarget(query.to_string()));
        }
        let task = build_task(name, query.trim(), TaskKind::Fofa, TaskTag::Task, options.clone());
        self.submit(task).await
    }

    async fn submit_all(&self, tasks: Vec<Task>) -> SchedulerResult<Vec<Task>> {
        let mut submitted = Vec::with_capacity(tasks.len());
        let mut first_error = None;

        for task in tasks {
            let target = task.target.clone();
            match self.submit(task).await {
                Ok(task) => submitted.push(task),
                Err(e) => {
                    warn!("目标 {} 下发失败: {}", target, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if submitted.is_empty() => Err(e),
            _ => Ok(submitted),
        }
    }
}

/// 构建待下发的任务；IP 任务关闭域名类选项
pub fn build_task(
    name: &str,
    target: &str,
    kind: TaskKind,
    tag: TaskTag,
    mut options: ScanOptions,
) -> Task {
    if kind == TaskKind::Ip {
        disable_domain_options(&mut options);
    }
    Task::new(name, target, kind, tag, options)
}

pub fn disable_domain_options(options: &mut ScanOptions) {
    for key in DOMAIN_ONLY_OPTIONS {
        options.insert(key.to_string(), Value::Bool(false));
    }
}
