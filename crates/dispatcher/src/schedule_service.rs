//! 计划任务（周期 / 定时）的创建、状态变更与触发

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use recon_core::{
    config::SchedulerConfig,
    models::{
        NotifySettings, ScheduleRun, ScheduleStatus, ScheduleType, ScheduledJob, TaskTag,
    },
    target::{split_ip_domain_targets, target_to_list},
    traits::{PolicyRepository, ScheduleRunRepository, ScheduledJobRepository},
    SchedulerError, SchedulerResult,
};
use recon_infrastructure::{MetricsCollector, StructuredLogger};
use serde_json::Value;

use crate::cron_utils::CronScheduler;
use crate::submission::TaskSubmitter;

pub struct ScheduleService {
    job_repo: Arc<dyn ScheduledJobRepository>,
    run_repo: Arc<dyn ScheduleRunRepository>,
    policy_repo: Arc<dyn PolicyRepository>,
    submitter: Arc<TaskSubmitter>,
    config: SchedulerConfig,
    metrics: Arc<MetricsCollector>,
}

impl ScheduleService {
    pub fn new(
        job_repo: Arc<dyn ScheduledJobRepository>,
        run_repo: Arc<dyn ScheduleRunRepository>,
        policy_repo: Arc<dyn PolicyRepository>,
        submitter: Arc<TaskSubmitter>,
        config: SchedulerConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            job_repo,
            run_repo,
            policy_repo,
            submitter,
            config,
            metrics,
        }
    }

    /// 新建周期任务
    pub async fn add_recurrent_job(
        &self,
        name: &str,
        cron: &str,
        target: &str,
        task_tag: TaskTag,
        policy_id: &str,
        notify: NotifySettings,
    ) -> SchedulerResult<ScheduledJob> {
        let scheduler = CronScheduler::new(cron)?;
        self.validate_definition(target, task_tag, policy_id).await?;

        let mut job = ScheduledJob::recurrent(name, cron, target, task_tag, policy_id);
        job.notify = notify;
        job.next_run_date = scheduler.next_execution_time(Utc::now());
        self.job_repo.insert(&job).await?;

        info!(
            "新建周期任务 {} ({})，{}",
            job.name,
            job.id,
            scheduler.get_frequency_description()
        );
        Ok(job)
    }

    /// 新建定时任务，开始时间必须晚于当前时间
    pub async fn add_future_job(
        &self,
        name: &str,
        start_date: DateTime<Utc>,
        target: &str,
        task_tag: TaskTag,
        policy_id: &str,
        notify: NotifySettings,
    ) -> SchedulerResult<ScheduledJob> {
        if start_date <= Utc::now() {
            return Err(SchedulerError::InvalidStartDate {
                start_date: start_date.to_rfc3339(),
            });
        }
        self.validate_definition(target, task_tag, policy_id).await?;

        let mut job = ScheduledJob::future(name, start_date, target, task_tag, policy_id);
        job.notify = notify;
        self.job_repo.insert(&job).await?;

        info!("新建定时任务 {} ({})，运行时间 {}", job.name, job.id, start_date);
        Ok(job)
    }

    async fn validate_definition(
        &self,
        target: &str,
        task_tag: TaskTag,
        policy_id: &str,
    ) -> SchedulerResult<()> {
        match task_tag {
            TaskTag::Task => {
                split_ip_domain_targets(target, self.submitter.blacklist())?;
            }
            TaskTag::RiskCruising => {
                if target_to_list(target).is_empty() {
                    return Err(SchedulerError::InvalidTarget(target.to_string()));
                }
            }
            TaskTag::Monitor => {
                return Err(SchedulerError::InvalidTarget(format!(
                    "计划任务不支持 {} 标签",
                    task_tag.as_str()
                )));
            }
        }

        if self.policy_repo.get(policy_id).await?.is_none() {
            return Err(SchedulerError::PolicyNotFound {
                id: policy_id.to_string(),
            });
        }
        Ok(())
    }

    /// 修改计划任务状态
    ///
    /// error 状态不可修改；相同状态拒绝；终态清空下次运行时间，恢复为 scheduled
    /// 时按 cron 或保存的开始时间重新计算。
    pub async fn change_status(
        &self,
        job_id: &str,
        status: ScheduleStatus,
    ) -> SchedulerResult<ScheduledJob> {
        let mut job = self.load(job_id).await?;

        if job.status == ScheduleStatus::Error {
            return Err(SchedulerError::InvalidStateTransition(format!(
                "计划任务 {} 处于 error 状态，不能修改",
                job.id
            )));
        }
        if job.status == status {
            return Err(SchedulerError::InvalidStateTransition(format!(
                "计划任务 {} 已经是 {} 状态",
                job.id,
                status.as_str()
            )));
        }

        job.next_run_date = if status.is_terminal() {
            None
        } else {
            match job.schedule_type {
                ScheduleType::Recurrent => {
                    let cron = job.cron.as_deref().unwrap_or_default();
                    CronScheduler::new(cron)?.next_execution_time(Utc::now())
                }
                ScheduleType::Future => job.start_date,
            }
        };
        job.status = status;
        self.job_repo.replace(&job).await?;

        info!("计划任务 {} 状态变更为 {}", job.id, status.as_str());
        Ok(job)
    }

    pub async fn delete_job(&self, job_id: &str) -> SchedulerResult<()> {
        if !self.job_repo.delete(job_id).await? {
            return Err(SchedulerError::ScheduledJobNotFound {
                id: job_id.to_string(),
            });
        }
        info!("删除计划任务 {}", job_id);
        Ok(())
    }

    /// 调度循环第一阶段：检查所有 scheduled 计划任务
    ///
    /// 单个任务的错误在这里捕获并记录，不影响其他任务。返回本轮触发的数量。
    pub async fn fire_due_jobs(&self, now: DateTime<Utc>) -> SchedulerResult<usize> {
        let jobs = self.job_repo.find_scheduled().await?;
        let mut fired = 0;

        for job in jobs {
            let job_id = job.id.clone();
            match self.fire_if_due(job, now).await {
                Ok(true) => fired += 1,
                Ok(false) => {}
                Err(e) => {
                    self.metrics.record_job_failure();
                    StructuredLogger::log_system_error("schedule_service", "fire_job", &e);
                    if e.is_definition_error() {
                        self.mark_error(&job_id).await;
                    }
                }
            }
        }

        Ok(fired)
    }

    async fn fire_if_due(&self, job: ScheduledJob, now: DateTime<Utc>) -> SchedulerResult<bool> {
        match job.schedule_type {
            ScheduleType::Recurrent => {
                let cron = job.cron.as_deref().unwrap_or_default();
                let scheduler = CronScheduler::new(cron)?;
                let lookahead = Duration::seconds(self.config.recurrent_lookahead_seconds);
                let cooldown = Duration::seconds(self.config.recurrent_cooldown_seconds);
                if !scheduler.should_fire(job.last_run_date, now, lookahead, cooldown) {
                    return Ok(false);
                }
                self.run_recurrent_scan(job, &scheduler, now).await?;
                Ok(true)
            }
            ScheduleType::Future => match job.next_run_date {
                Some(fire_at) if fire_at <= now => {
                    self.run_future_scan(job, now).await?;
                    Ok(true)
                }
                _ => Ok(false),
            },
        }
    }

    /// 触发周期任务：先持久化运行信息再下发
    pub async fn run_recurrent_scan(
        &self,
        mut job: ScheduledJob,
        scheduler: &CronScheduler,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Option<ScheduleRun>> {
        let offset = Duration::seconds(self.config.next_run_offset_seconds);
        job.run_number += 1;
        job.last_run_date = Some(now);
        job.next_run_date = scheduler.next_execution_time(now + offset);
        self.job_repo.replace(&job).await?;

        self.metrics.record_scheduled_job_fired();
        StructuredLogger::log_scheduled_job_fired(&job.id, &job.name, job.run_number, job.next_run_date);
        self.submit_task_schedule(&job).await
    }

    /// 触发定时任务：只运行一次，触发即 done
    pub async fn run_future_scan(
        &self,
        mut job: ScheduledJob,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Option<ScheduleRun>> {
        job.run_number += 1;
        job.last_run_date = Some(now);
        job.next_run_date = None;
        job.status = ScheduleStatus::Done;
        self.job_repo.replace(&job).await?;

        self.metrics.record_scheduled_job_fired();
        StructuredLogger::log_scheduled_job_fired(&job.id, &job.name, job.run_number, None);
        self.submit_task_schedule(&job).await
    }

    /// 按绑定的策略下发子任务，至少产生一个任务时创建运行记录
    pub async fn submit_task_schedule(
        &self,
        job: &ScheduledJob,
    ) -> SchedulerResult<Option<ScheduleRun>> {
        let Some(policy) = self.policy_repo.get(&job.policy_id).await? else {
            warn!("计划任务 {} 的策略 {} 不存在", job.id, job.policy_id);
            return Err(SchedulerError::PolicyNotFound {
                id: job.policy_id.clone(),
            });
        };

        let mut options = policy.options_for(job.task_tag);
        options.insert("from_task_schedule".to_string(), Value::String(job.id.clone()));
        let name = job.task_name();

        let tasks = match job.task_tag {
            TaskTag::Task => {
                self.submitter
                    .submit_scan_targets(&name, &job.target, &options, TaskTag::Task)
                    .await?
            }
            TaskTag::RiskCruising => vec![
                self.submitter
                    .submit_risk_cruising(&name, &job.target, &options)
                    .await?,
            ],
            TaskTag::Monitor => {
                warn!("计划任务 {} 的标签 {} 不可调度，跳过", job.id, job.task_tag.as_str());
                return Ok(None);
            }
        };

        if tasks.is_empty() {
            debug!("计划任务 {} 本次未产生子任务", job.id);
            return Ok(None);
        }

        let task_ids = tasks.into_iter().map(|t| t.id).collect();
        let run = ScheduleRun::new(&job.id, &job.name, job.run_number, task_ids, &job.notify);
        self.run_repo.insert(&run).await?;
        debug!("计划任务 {} 第 {} 次运行记录 {}", job.id, job.run_number, run.id);
        Ok(Some(run))
    }

    async fn mark_error(&self, job_id: &str) {
        let result = async {
            let mut job = self.load(job_id).await?;
            job.status = ScheduleStatus::Error;
            job.next_run_date = None;
            self.job_repo.replace(&job).await
        }
        .await;

        match result {
            Ok(()) => warn!("计划任务 {} 定义错误，已标记为 error", job_id),
            Err(e) => StructuredLogger::log_system_error("schedule_service", "mark_error", &e),
        }
    }

    async fn load(&self, job_id: &str) -> SchedulerResult<ScheduledJob> {
        self.job_repo
            .get(job_id)
            .await?
            .ok_or_else(|| SchedulerError::ScheduledJobNotFound {
                id: job_id.to_string(),
            })
    }
}
