use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use recon_core::{
    models::{CancelSignal, SyncStatus, Task, TaskKind, TaskStatus, TaskTag},
    traits::{TaskQueueGateway, TaskRepository},
    SchedulerError, SchedulerResult,
};
use recon_infrastructure::{MetricsCollector, StructuredLogger};

use crate::submission::TaskSubmitter;

const RESTART_PREFIX: &str = "重新运行-";

/// 一组任务的状态分布
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskStatusSummary {
    pub waiting: usize,
    pub running: usize,
    pub done: usize,
    pub stopped: usize,
    pub failed: usize,
}

impl TaskStatusSummary {
    pub fn total(&self) -> usize {
        self.waiting + self.running + self.done + self.stopped + self.failed
    }

    pub fn active(&self) -> usize {
        self.waiting + self.running
    }

    pub fn finished(&self) -> usize {
        self.done + self.stopped + self.failed
    }
}

/// 任务控制：停止、删除、重新运行、同步状态
pub struct TaskController {
    task_repo: Arc<dyn TaskRepository>,
    queue: Arc<dyn TaskQueueGateway>,
    submitter: Arc<TaskSubmitter>,
    metrics: Arc<MetricsCollector>,
}

impl TaskController {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        queue: Arc<dyn TaskQueueGateway>,
        submitter: Arc<TaskSubmitter>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            task_repo,
            queue,
            submitter,
            metrics,
        }
    }

    /// 停止任务
    ///
    /// 有队列句柄时先发送终止信号，再把任务标记为 stop。两步之间 Worker 可能已经写入
    /// 终态，以最后写入为准。没有句柄的任务（句柄回写失败或尚未回写）直接标记为 stop，
    /// Worker 领取时会看到终态并跳过。
    pub async fn stop_task(&self, task_id: &str) -> SchedulerResult<Task> {
        let mut task = self.load(task_id).await?;

        if task.is_terminal() {
            return Err(SchedulerError::InvalidStateTransition(format!(
                "任务 {} 已处于 {} 状态，不能停止",
                task.id,
                task.status.as_str()
            )));
        }

        let handle = task.queue_handle.clone().filter(|h| !h.is_empty());
        match &handle {
            Some(handle) => self.queue.cancel(handle, CancelSignal::Term).await?,
            None => warn!("任务 {} 没有队列句柄，跳过终止信号直接标记停止", task.id),
        }

        task.status = TaskStatus::Stop;
        task.end_time = Some(Utc::now());
        self.task_repo.replace(&task).await?;

        self.metrics.record_task_cancelled();
        StructuredLogger::log_task_cancelled(&task.id, handle.as_deref().unwrap_or("-"));
        Ok(task)
    }

    /// 批量删除任务，只允许删除已结束的任务，返回实际删除的 id
    pub async fn delete_tasks(&self, task_ids: &[String]) -> SchedulerResult<Vec<String>> {
        let tasks = self.task_repo.find_by_ids(task_ids).await?;

        if let Some(active) = tasks.iter().find(|task| !task.is_terminal()) {
            return Err(SchedulerError::InvalidStateTransition(format!(
                "任务 {} 处于 {} 状态，不能删除",
                active.id,
                active.status.as_str()
            )));
        }

        let mut deleted = Vec::with_capacity(tasks.len());
        for task in tasks {
            if self.task_repo.delete(&task.id).await? {
                deleted.push(task.id);
            }
        }

        info!("删除 {} 个任务", deleted.len());
        Ok(deleted)
    }

    /// 重新运行已结束的任务，生成一个新任务并重新下发
    pub async fn restart_task(&self, task_id: &str) -> SchedulerResult<Task> {
        let old = self.load(task_id).await?;

        if !old.is_terminal() {
            return Err(SchedulerError::InvalidStateTransition(format!(
                "任务 {} 处于 {} 状态，不能重新运行",
                old.id,
                old.status.as_str()
            )));
        }
        if !can_restart(&old) {
            return Err(SchedulerError::InvalidStateTransition(format!(
                "任务 {} 不支持重新运行",
                old.id
            )));
        }

        let mut task = Task::new(old.name.clone(), old.target.clone(), old.kind, old.tag, old.options.clone());
        task.targets = old.targets.clone();
        if !task.name.starts_with(RESTART_PREFIX) {
            task.name = format!("{RESTART_PREFIX}{}", task.name);
        }

        let task = self.submitter.submit(task).await?;
        info!("任务 {} 重新运行为 {}", old.id, task.id);
        Ok(task)
    }

    /// 更新资产同步状态
    pub async fn mark_sync_status(&self, task_id: &str, status: SyncStatus) -> SchedulerResult<()> {
        let mut task = self.load(task_id).await?;
        if status != SyncStatus::Default && !task.is_terminal() {
            warn!("任务 {} 尚未结束，仍然更新同步状态", task.id);
        }
        task.sync_status = status;
        self.task_repo.replace(&task).await?;
        debug!("任务 {} 同步状态更新为 {:?}", task.id, status);
        Ok(())
    }

    pub async fn status_summary(&self, task_ids: &[String]) -> SchedulerResult<TaskStatusSummary> {
        let tasks = self.task_repo.find_by_ids(task_ids).await?;
        let mut summary = TaskStatusSummary::default();
        for task in &tasks {
            match task.status {
                TaskStatus::Waiting => summary.waiting += 1,
                TaskStatus::Running | TaskStatus::Progress(_) => summary.running += 1,
                TaskStatus::Done => summary.done += 1,
                TaskStatus::Stop => summary.stopped += 1,
                TaskStatus::Error => summary.failed += 1,
            }
        }
        Ok(summary)
    }

    async fn load(&self, task_id: &str) -> SchedulerResult<Task> {
        self.task_repo
            .get(task_id)
            .await?
            .ok_or_else(|| SchedulerError::TaskNotFound {
                id: task_id.to_string(),
            })
    }
}

/// 域名监控任务、资产组内的 IP 任务、基于结果集的风险巡航任务不能重新运行
pub fn can_restart(task: &Task) -> bool {
    match (task.kind, task.tag) {
        (TaskKind::Domain, TaskTag::Monitor) => false,
        (TaskKind::Ip, _) if task.scope_id().is_some() => false,
        (TaskKind::RiskCruising, TaskTag::RiskCruising) => {
            task.option_str("result_set_id").map_or(true, str::is_empty)
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::models::ScanOptions;
    use serde_json::Value;

    fn task(kind: TaskKind, tag: TaskTag) -> Task {
        Task::new("t", "x", kind, tag, ScanOptions::new())
    }

    #[test]
    fn test_restart_rules() {
        assert!(!can_restart(&task(TaskKind::Domain, TaskTag::Monitor)));
        assert!(can_restart(&task(TaskKind::Domain, TaskTag::Task)));

        let mut scoped_ip = task(TaskKind::Ip, TaskTag::Task);
        scoped_ip.options.insert("scope_id".into(), Value::String("s1".into()));
        assert!(!can_restart(&scoped_ip));
        assert!(can_restart(&task(TaskKind::Ip, TaskTag::Task)));

        let mut cruise = task(TaskKind::RiskCruising, TaskTag::RiskCruising);
        assert!(can_restart(&cruise));
        cruise.options.insert("result_set_id".into(), Value::String("r1".into()));
        assert!(!can_restart(&cruise));
    }

    #[test]
    fn test_status_summary_totals() {
        let summary = TaskStatusSummary {
            waiting: 1,
            running: 2,
            done: 3,
            stopped: 1,
            failed: 1,
        };
        assert_eq!(summary.total(), 8);
        assert_eq!(summary.active(), 3);
        assert_eq!(summary.finished(), 5);
    }
}
