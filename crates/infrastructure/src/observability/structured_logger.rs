//! 结构化日志事件
//!
//! 关键调度事件统一从这里输出，字段名固定，便于按 `event` 检索。

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_scheduled_job_fired(
        job_id: &str,
        job_name: &str,
        run_number: u32,
        next_run_date: Option<DateTime<Utc>>,
    ) {
        info!(
            event = "scheduled_job_fired",
            job.id = job_id,
            job.name = job_name,
            job.run_number = run_number,
            job.next_run_date = ?next_run_date,
            "计划任务触发"
        );
    }

    pub fn log_monitor_job_fired(job_id: &str, scope_id: &str, scope_type: &str, task_id: &str) {
        info!(
            event = "monitor_job_fired",
            job.id = job_id,
            scope.id = scope_id,
            scope.kind = scope_type,
            task.id = task_id,
            "监控任务触发"
        );
    }

    pub fn log_task_submitted(task_id: &str, task_name: &str, kind: &str, handle: &str) {
        info!(
            event = "task_submitted",
            task.id = task_id,
            task.name = task_name,
            task.kind = kind,
            queue.handle = handle,
            "任务已下发"
        );
    }

    pub fn log_dispatch_rolled_back(task_id: &str, rolled_back: bool, error: &dyn std::fmt::Display) {
        warn!(
            event = "dispatch_rolled_back",
            task.id = task_id,
            rolled_back = rolled_back,
            error = %error,
            "任务下发失败"
        );
    }

    pub fn log_task_cancelled(task_id: &str, handle: &str) {
        info!(
            event = "task_cancelled",
            task.id = task_id,
            queue.handle = handle,
            "任务已取消"
        );
    }

    pub fn log_schedule_run_closed(run_id: &str, schedule_id: &str, status: &str, total: usize) {
        info!(
            event = "schedule_run_closed",
            run.id = run_id,
            schedule.id = schedule_id,
            run.status = status,
            run.total_tasks = total,
            "计划任务运行结束"
        );
    }

    pub fn log_notification_pushed(run_id: &str, channel: &str, push_status: &str) {
        info!(
            event = "notification_pushed",
            run.id = run_id,
            channel = channel,
            push_status = push_status,
            "通知推送状态已确定"
        );
    }

    pub fn log_monitor_diff(task_id: &str, scope_id: &str, candidates: usize, confirmed: usize) {
        info!(
            event = "monitor_diff",
            task.id = task_id,
            scope.id = scope_id,
            diff.candidates = candidates,
            diff.confirmed = confirmed,
            "监控差异计算完成"
        );
    }

    pub fn log_task_execution_started(task_id: &str, kind: &str, handle: &str) {
        info!(
            event = "task_execution_started",
            task.id = task_id,
            task.kind = kind,
            queue.handle = handle,
            "开始执行任务"
        );
    }

    pub fn log_task_execution_finished(task_id: &str, kind: &str, status: &str, duration_ms: u64) {
        info!(
            event = "task_execution_finished",
            task.id = task_id,
            task.kind = kind,
            task.status = status,
            duration_ms = duration_ms,
            "任务执行结束"
        );
    }

    /// 在迭代边界捕获的错误
    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::fmt::Display) {
        error!(
            event = "system_error",
            component = component,
            operation = operation,
            error = %error,
            "系统错误"
        );
    }
}
