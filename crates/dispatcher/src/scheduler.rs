use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use recon_infrastructure::{MetricsCollector, StructuredLogger};

use crate::aggregator::ScheduleRunAggregator;
use crate::monitor_service::MonitorService;
use crate::schedule_service::ScheduleService;

/// 单轮调度的结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub scheduled_fired: usize,
    pub monitors_fired: usize,
    pub runs_settled: usize,
    pub failed_phases: usize,
}

/// 调度循环
///
/// 单实例、不重叠地按固定周期运行三个阶段：计划任务、监控任务、运行记录对账。
/// 各阶段相互独立，一个阶段失败不影响后续阶段。
pub struct SchedulerLoop {
    schedules: Arc<ScheduleService>,
    monitors: Arc<MonitorService>,
    aggregator: Arc<ScheduleRunAggregator>,
    tick_interval: Duration,
    metrics: Arc<MetricsCollector>,
}

impl SchedulerLoop {
    pub fn new(
        schedules: Arc<ScheduleService>,
        monitors: Arc<MonitorService>,
        aggregator: Arc<ScheduleRunAggregator>,
        tick_interval: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            schedules,
            monitors,
            aggregator,
            tick_interval,
            metrics,
        }
    }

    #[tracing::instrument(name = "scheduler_tick", skip_all)]
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let start = Instant::now();
        let mut report = TickReport::default();

        match self.schedules.fire_due_jobs(now).await {
            Ok(fired) => report.scheduled_fired = fired,
            Err(e) => {
                report.failed_phases += 1;
                StructuredLogger::log_system_error("scheduler", "scheduled_jobs", &e);
            }
        }

        match self.monitors.fire_due_jobs(now).await {
            Ok(fired) => report.monitors_fired = fired,
            Err(e) => {
                report.failed_phases += 1;
                StructuredLogger::log_system_error("scheduler", "monitor_jobs", &e);
            }
        }

        match self.aggregator.reconcile_all().await {
            Ok(settled) => report.runs_settled = settled,
            Err(e) => {
                report.failed_phases += 1;
                StructuredLogger::log_system_error("scheduler", "schedule_runs", &e);
            }
        }

        self.metrics.record_tick_duration(start.elapsed().as_secs_f64());
        debug!(
            "本轮调度完成: 计划任务 {}，监控任务 {}，运行记录 {}",
            report.scheduled_fired, report.monitors_fired, report.runs_settled
        );
        report
    }

    /// 运行调度循环直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("调度循环启动，周期 {} 秒", self.tick_interval.as_secs());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
                _ = shutdown_rx.recv() => {
                    info!("调度循环收到关闭信号，退出");
                    break;
                }
            }
        }
    }
}
