//! 计划任务运行记录对账
//!
//! 每轮调度检查所有通知状态仍为 pending 的运行记录：子任务未全部结束时只刷新计数；
//! 全部结束后先持久化最终状态，再交给通知闸门做唯一一次推送决定。

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use recon_core::{
    models::{PushStatus, RunStatus, RunSummary, ScheduleRun, Task, TaskStatus},
    traits::{ScheduleRunRepository, TaskRepository},
    SchedulerError, SchedulerResult,
};
use recon_infrastructure::{MetricsCollector, StructuredLogger};

use crate::notification_gate::NotificationGate;

pub struct ScheduleRunAggregator {
    run_repo: Arc<dyn ScheduleRunRepository>,
    task_repo: Arc<dyn TaskRepository>,
    gate: Arc<NotificationGate>,
    metrics: Arc<MetricsCollector>,
}

impl ScheduleRunAggregator {
    pub fn new(
        run_repo: Arc<dyn ScheduleRunRepository>,
        task_repo: Arc<dyn TaskRepository>,
        gate: Arc<NotificationGate>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            run_repo,
            task_repo,
            gate,
            metrics,
        }
    }

    /// 调度循环第三阶段，返回本轮确定推送状态的记录数
    pub async fn reconcile_all(&self) -> SchedulerResult<usize> {
        let runs = self.run_repo.find_unsettled().await?;
        self.metrics.set_unsettled_runs(runs.len());

        let mut settled = 0;
        for run in runs {
            match self.reconcile_run(run).await {
                Ok(run) if run.is_settled() => settled += 1,
                Ok(_) => {}
                Err(e) => StructuredLogger::log_system_error("aggregator", "reconcile_run", &e),
            }
        }
        Ok(settled)
    }

    pub async fn reconcile(&self, run_id: &str) -> SchedulerResult<ScheduleRun> {
        let run = self
            .run_repo
            .get(run_id)
            .await?
            .ok_or_else(|| SchedulerError::ScheduleRunNotFound {
                id: run_id.to_string(),
            })?;
        self.reconcile_run(run).await
    }

    async fn reconcile_run(&self, mut run: ScheduleRun) -> SchedulerResult<ScheduleRun> {
        if run.is_settled() {
            return Ok(run);
        }

        if run.status == RunStatus::Running {
            let tasks = self.task_repo.find_by_ids(&run.task_ids).await?;
            let summary = summarize(&run.task_ids, &tasks);
            let pending = summary.waiting + summary.running;
            run.summary = summary;

            if pending > 0 {
                debug!("运行记录 {} 仍有 {} 个子任务未结束", run.id, pending);
                self.run_repo.replace(&run).await?;
                return Ok(run);
            }

            run.status = if run.summary.has_failure() {
                RunStatus::Error
            } else {
                RunStatus::Finished
            };
            run.finished_at = Some(Utc::now());
            self.run_repo.replace(&run).await?;

            self.metrics.record_schedule_run_closed(run.status.as_str());
            StructuredLogger::log_schedule_run_closed(
                &run.id,
                &run.schedule_id,
                run.status.as_str(),
                run.summary.total,
            );
        }

        let outcome = self.gate.push(&run).await;
        run.push_status = outcome.status;
        run.push_error = outcome.error;
        self.run_repo.replace(&run).await?;

        StructuredLogger::log_notification_pushed(&run.id, &run.notify_channel, push_label(&run));
        Ok(run)
    }
}

fn push_label(run: &ScheduleRun) -> &'static str {
    match run.push_status {
        PushStatus::Pending => "pending",
        PushStatus::Success => "success",
        PushStatus::Error => "error",
        PushStatus::Skip => "skip",
    }
}

/// 汇总子任务状态；运行记录中引用但已不存在的任务计为缺失
pub fn summarize(task_ids: &[String], tasks: &[Task]) -> RunSummary {
    let mut summary = RunSummary {
        total: task_ids.len(),
        ..RunSummary::default()
    };

    for id in task_ids {
        let Some(task) = tasks.iter().find(|task| &task.id == id) else {
            summary.missing += 1;
            continue;
        };

        match &task.status {
            TaskStatus::Waiting => summary.waiting += 1,
            TaskStatus::Running | TaskStatus::Progress(_) => summary.running += 1,
            TaskStatus::Done => summary.done += 1,
            TaskStatus::Stop | TaskStatus::Error => summary.failed += 1,
        }

        for (name, count) in &task.statistic {
            *summary.assets.entry(name.clone()).or_insert(0) += count;
        }
    }

    summary
}
