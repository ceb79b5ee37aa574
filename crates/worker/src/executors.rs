use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use recon_core::{
    models::{MonitorJob, MonitorStatus, Task, TaskKind, TaskPayload, TaskStatus},
    traits::{
        AssetBaselineWriter, IpRecord, MonitorJobRepository, ScanOutcome, ScanPipeline,
        TaskHandler, TaskRepository,
    },
    SchedulerError, SchedulerResult,
};
use recon_infrastructure::{MetricsCollector, StructuredLogger};
use tracing::{debug, error, info, warn};

use crate::{
    dedup::DedupStore,
    diff::{wih_record_hash, MonitorDiffEngine},
    notifier::MonitorNotifier,
    registry::TaskHandlerRegistry,
};

/// 执行器共享的依赖
pub struct ExecutorContext {
    pub tasks: Arc<dyn TaskRepository>,
    pub monitor_jobs: Arc<dyn MonitorJobRepository>,
    pub pipeline: Arc<dyn ScanPipeline>,
    pub diff: Arc<MonitorDiffEngine>,
    pub dedup: Arc<DedupStore>,
    /// 监控确认的新资产写回资产组
    pub baseline_writer: Arc<dyn AssetBaselineWriter>,
    pub notifier: Arc<MonitorNotifier>,
    pub metrics: Arc<MetricsCollector>,
}

/// 一次扫描写回任务的结果
#[derive(Debug, Default)]
struct ScanReport {
    statistic: BTreeMap<String, i64>,
    new_assets: BTreeMap<String, Vec<String>>,
}

impl TaskHandlerRegistry {
    /// 为全部任务类型注册扫描处理器
    pub fn with_scan_handlers(context: Arc<ExecutorContext>) -> Self {
        let mut registry = Self::new();
        for kind in TaskKind::ALL {
            registry.register(Arc::new(ScanTaskHandler::new(kind, context.clone())));
        }
        registry
    }
}

/// 扫描任务处理器
///
/// 负载中带 `scheduler_id` 的任务按资产监控流程执行：
/// 先确认监控任务仍在运行并记录本次运行，扫描后只保留相对基线新出现的资产，
/// 写回资产组并记录在任务上，有新资产时推送通知。
/// 其余任务直接运行扫描流水线并回写结果计数。
///
/// 任务一旦被领取，任何失败都会把任务置为 error，不会停留在 waiting 或 running。
pub struct ScanTaskHandler {
    kind: TaskKind,
    context: Arc<ExecutorContext>,
}

impl ScanTaskHandler {
    pub fn new(kind: TaskKind, context: Arc<ExecutorContext>) -> Self {
        Self { kind, context }
    }

    /// 确认监控任务可以运行并记录本次运行；已删除或已停止返回 None
    async fn claim_monitor_run(&self, job_id: &str) -> SchedulerResult<Option<MonitorJob>> {
        let Some(mut job) = self.context.monitor_jobs.get(job_id).await? else {
            info!("监控任务 {} 已删除，跳过", job_id);
            return Ok(None);
        };

        if job.status == MonitorStatus::Stop {
            info!("监控任务 {} 已停止，跳过", job_id);
            return Ok(None);
        }

        job.record_run(Utc::now());
        self.context.monitor_jobs.replace(&job).await?;
        Ok(Some(job))
    }

    async fn run_scan(
        &self,
        payload: &TaskPayload,
        monitor: Option<&MonitorJob>,
    ) -> SchedulerResult<ScanReport> {
        let outcome = self.context.pipeline.run(payload).await?;
        match monitor {
            Some(job) => self.monitor_report(payload, job, &outcome).await,
            None => Ok(ScanReport {
                statistic: scan_statistic(&outcome),
                ..Default::default()
            }),
        }
    }

    /// 计算监控结果：与基线比较后再按资产组去重，首次出现的资产写回资产组
    async fn monitor_report(
        &self,
        payload: &TaskPayload,
        job: &MonitorJob,
        outcome: &ScanOutcome,
    ) -> SchedulerResult<ScanReport> {
        let scope_id = job.scope_id.as_str();
        let diff = &self.context.diff;
        let dedup = &self.context.dedup;
        let writer = &self.context.baseline_writer;
        let mut report = ScanReport::default();

        let (candidates, confirmed) = match self.kind {
            TaskKind::Domain => {
                let domains = diff.diff_domains(scope_id, &outcome.domains).await?;
                let names = domains.new_domains.iter().map(|r| r.domain.clone()).collect();
                let fresh = dedup.filter_new(scope_id, names).await?;
                let records: Vec<_> = domains
                    .new_domains
                    .into_iter()
                    .filter(|r| fresh.contains(&r.domain))
                    .collect();
                writer.add_domains(scope_id, &records).await?;

                report.statistic.insert("new_domain_cnt".to_string(), fresh.len() as i64);
                report
                    .statistic
                    .insert("wildcard_domain_cnt".to_string(), domains.suppressed.len() as i64);
                let confirmed = fresh.len();
                report.new_assets.insert("domain".to_string(), fresh);
                (domains.candidates, confirmed)
            }
            TaskKind::Ip => {
                let ips = diff.diff_ips(scope_id, &outcome.ips).await?;
                let candidates = ips.new_ips.len() + ips.new_ip_ports.len();
                let new_ips = dedup.filter_new(scope_id, ips.new_ips).await?;
                let new_ports = dedup.filter_new(scope_id, ips.new_ip_ports).await?;
                let records = fresh_ip_records(&outcome.ips, &new_ips, &new_ports);
                writer.add_ips(scope_id, &records).await?;

                report.statistic.insert("new_ip_cnt".to_string(), new_ips.len() as i64);
                report.statistic.insert("new_ip_port_cnt".to_string(), new_ports.len() as i64);
                let confirmed = new_ips.len() + new_ports.len();
                report.new_assets.insert("ip".to_string(), new_ips);
                report.new_assets.insert("ip_port".to_string(), new_ports);
                (candidates, confirmed)
            }
            TaskKind::AssetSiteUpdate => {
                let sites = diff.diff_sites(scope_id, &outcome.sites).await?;
                let candidates = sites.len();
                let fresh = dedup.filter_new(scope_id, sites).await?;
                writer.add_sites(scope_id, &fresh).await?;

                report.statistic.insert("new_site_cnt".to_string(), fresh.len() as i64);
                let confirmed = fresh.len();
                report.new_assets.insert("site".to_string(), fresh);
                (candidates, confirmed)
            }
            TaskKind::AssetWihUpdate => {
                let records = diff.diff_wih(scope_id, &outcome.wih).await?;
                let hashes: Vec<String> = records.iter().map(wih_record_hash).collect();
                let candidates = hashes.len();
                let fresh = dedup.filter_new(scope_id, hashes).await?;
                let records: Vec<_> = records
                    .into_iter()
                    .filter(|r| fresh.contains(&wih_record_hash(r)))
                    .collect();
                writer.add_wih(scope_id, &records).await?;

                report.statistic.insert("new_wih_cnt".to_string(), fresh.len() as i64);
                report.new_assets.insert(
                    "wih".to_string(),
                    records.iter().map(|r| format!("{}: {}", r.record_type, r.content)).collect(),
                );
                (candidates, fresh.len())
            }
            _ => {
                debug!("任务类型 {} 没有监控差异计算，按普通扫描统计", self.kind);
                report.statistic = scan_statistic(outcome);
                return Ok(report);
            }
        };

        StructuredLogger::log_monitor_diff(&payload.task_id, scope_id, candidates, confirmed);
        self.context.metrics.record_monitor_new_assets(confirmed);
        report.new_assets.retain(|_, items| !items.is_empty());
        Ok(report)
    }

    /// 领取后的失败统一收尾：尽力置为 error 并返回原始错误
    async fn fail(&self, task: &mut Task, err: SchedulerError) -> SchedulerResult<()> {
        error!("任务 {} 执行失败: {}", task.id, err);
        if let Err(e) = self.transition(task, TaskStatus::Error).await {
            warn!("任务 {} 置为 error 失败: {}", task.id, e);
        }
        Err(err)
    }

    /// 写入新状态并返回是否写入
    ///
    /// 写入前重新读取任务：已被删除或已被外部置为终态（如手动停止）时不覆盖，
    /// 提交方并发写入的队列句柄保留。
    async fn transition(&self, task: &mut Task, status: TaskStatus) -> SchedulerResult<bool> {
        let Some(current) = self.context.tasks.get(&task.id).await? else {
            info!("任务 {} 已被删除，不再写入 {}", task.id, status);
            return Ok(false);
        };
        if current.is_terminal() {
            info!("任务 {} 已处于 {} 状态，不再覆盖为 {}", task.id, current.status, status);
            return Ok(false);
        }

        task.queue_handle = current.queue_handle.or(task.queue_handle.take());
        if status.is_terminal() {
            task.end_time = Some(Utc::now());
        } else {
            task.start_time = Some(Utc::now());
        }
        task.status = status;
        self.context.tasks.replace(task).await?;
        Ok(true)
    }
}

#[async_trait]
impl TaskHandler for ScanTaskHandler {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    async fn execute(&self, payload: &TaskPayload) -> SchedulerResult<()> {
        let Some(mut task) = self.context.tasks.get(&payload.task_id).await? else {
            warn!("任务 {} 不存在，丢弃消息", payload.task_id);
            return Ok(());
        };

        // 队列可能重复投递，同一任务只执行一次
        if task.status != TaskStatus::Waiting {
            info!("任务 {} 当前状态为 {}，忽略重复投递", task.id, task.status);
            return Ok(());
        }

        let monitor_job_id = payload
            .options
            .get("scheduler_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let monitor = match monitor_job_id {
            Some(job_id) => match self.claim_monitor_run(&job_id).await {
                Ok(Some(job)) => Some(job),
                Ok(None) => {
                    self.transition(&mut task, TaskStatus::Stop).await?;
                    return Ok(());
                }
                Err(e) => return self.fail(&mut task, e).await,
            },
            None => None,
        };

        match self.transition(&mut task, TaskStatus::Running).await {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => return self.fail(&mut task, e).await,
        }

        let started = Instant::now();
        let result = self.run_scan(payload, monitor.as_ref()).await;
        let elapsed = started.elapsed().as_secs_f64();

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                self.context
                    .metrics
                    .record_task_executed(self.kind.as_str(), "error", elapsed);
                return self.fail(&mut task, e).await;
            }
        };

        task.statistic.extend(report.statistic);
        task.new_assets = report.new_assets;
        if let Err(e) = self.transition(&mut task, TaskStatus::Done).await {
            self.context
                .metrics
                .record_task_executed(self.kind.as_str(), "error", elapsed);
            return self.fail(&mut task, e).await;
        }
        self.context
            .metrics
            .record_task_executed(self.kind.as_str(), "done", elapsed);
        info!("任务 {} 执行完成，耗时 {:.2}s", task.id, elapsed);

        if let Some(job) = &monitor {
            self.context.notifier.notify(job, &task.id, &task.new_assets).await;
        }
        Ok(())
    }
}

/// 按去重后保留的 IP 和 `ip:port` 还原写回记录，每条只带新端口
fn fresh_ip_records(discovered: &[IpRecord], new_ips: &[String], new_ports: &[String]) -> Vec<IpRecord> {
    let mut records: Vec<IpRecord> = Vec::new();
    for record in discovered {
        let ip = record.ip.trim();
        let ports: Vec<u16> = record
            .ports
            .iter()
            .copied()
            .filter(|port| new_ports.contains(&format!("{ip}:{port}")))
            .collect();
        let is_new_ip = new_ips.iter().any(|known| known == ip);
        if !is_new_ip && ports.is_empty() {
            continue;
        }

        match records.iter_mut().find(|r| r.ip == ip) {
            Some(existing) => {
                for port in ports {
                    if !existing.ports.contains(&port) {
                        existing.ports.push(port);
                    }
                }
            }
            None => records.push(IpRecord {
                ip: ip.to_string(),
                ports,
            }),
        }
    }
    records
}

/// 普通扫描的结果计数
fn scan_statistic(outcome: &ScanOutcome) -> BTreeMap<String, i64> {
    BTreeMap::from([
        ("domain_cnt".to_string(), outcome.domains.len() as i64),
        ("ip_cnt".to_string(), outcome.ips.len() as i64),
        ("site_cnt".to_string(), outcome.sites.len() as i64),
        ("wih_cnt".to_string(), outcome.wih.len() as i64),
    ])
}
