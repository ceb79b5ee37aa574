//! 调度引擎指标采集
//!
//! 使用 `metrics` 门面记录指标，具体导出器（如 Prometheus）由进程入口安装。

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::debug;

/// 调度引擎指标采集器
pub struct MetricsCollector {
    tick_duration: Histogram,
    scheduled_jobs_fired: Counter,
    monitor_jobs_fired: Counter,
    job_failures: Counter,
    tasks_submitted: Counter,
    dispatch_failures: Counter,
    dispatch_rollbacks: Counter,
    tasks_cancelled: Counter,
    schedule_runs_closed: Counter,
    unsettled_runs: Gauge,
    monitor_new_assets: Counter,
    task_duration: Histogram,
    dedup_suppressed: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tick_duration: histogram!("recon_scheduler_tick_duration_seconds"),
            scheduled_jobs_fired: counter!("recon_scheduled_jobs_fired_total"),
            monitor_jobs_fired: counter!("recon_monitor_jobs_fired_total"),
            job_failures: counter!("recon_job_failures_total"),
            tasks_submitted: counter!("recon_tasks_submitted_total"),
            dispatch_failures: counter!("recon_dispatch_failures_total"),
            dispatch_rollbacks: counter!("recon_dispatch_rollbacks_total"),
            tasks_cancelled: counter!("recon_tasks_cancelled_total"),
            schedule_runs_closed: counter!("recon_schedule_runs_closed_total"),
            unsettled_runs: gauge!("recon_unsettled_schedule_runs"),
            monitor_new_assets: counter!("recon_monitor_new_assets_total"),
            task_duration: histogram!("recon_task_execution_duration_seconds"),
            dedup_suppressed: counter!("recon_dedup_suppressed_total"),
        }
    }

    pub fn record_tick_duration(&self, duration_seconds: f64) {
        self.tick_duration.record(duration_seconds);
        debug!(duration_seconds = duration_seconds, "调度周期耗时");
    }

    pub fn record_scheduled_job_fired(&self) {
        self.scheduled_jobs_fired.increment(1);
    }

    pub fn record_monitor_job_fired(&self) {
        self.monitor_jobs_fired.increment(1);
    }

    pub fn record_job_failure(&self) {
        self.job_failures.increment(1);
    }

    pub fn record_task_submitted(&self, kind: &str) {
        self.tasks_submitted.increment(1);
        counter!("recon_tasks_submitted_by_kind_total", "kind" => kind.to_string()).increment(1);
    }

    pub fn record_dispatch_failure(&self, rolled_back: bool) {
        self.dispatch_failures.increment(1);
        if rolled_back {
            self.dispatch_rollbacks.increment(1);
        }
    }

    pub fn record_task_cancelled(&self) {
        self.tasks_cancelled.increment(1);
    }

    pub fn record_schedule_run_closed(&self, status: &str) {
        self.schedule_runs_closed.increment(1);
        counter!("recon_schedule_runs_closed_by_status_total", "status" => status.to_string())
            .increment(1);
    }

    pub fn record_notification(&self, channel: &str, result: &str) {
        counter!(
            "recon_notifications_total",
            "channel" => channel.to_string(),
            "result" => result.to_string()
        )
        .increment(1);
    }

    pub fn set_unsettled_runs(&self, count: usize) {
        self.unsettled_runs.set(count as f64);
    }

    pub fn record_monitor_new_assets(&self, count: usize) {
        self.monitor_new_assets.increment(count as u64);
    }

    /// Worker 侧单个任务执行结束
    pub fn record_task_executed(&self, kind: &str, status: &str, duration_seconds: f64) {
        self.task_duration.record(duration_seconds);
        counter!(
            "recon_tasks_executed_total",
            "kind" => kind.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
    }

    pub fn record_dedup_suppressed(&self, count: usize) {
        self.dedup_suppressed.increment(count as u64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
