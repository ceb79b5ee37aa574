//! Test data builders
//!
//! 带合理默认值的构建器，测试中只需覆盖关心的字段。

use chrono::{DateTime, Utc};
use serde_json::Value;

use recon_core::models::{
    AssetScope, AssetScopeType, MonitorJob, MonitorScopeType, MonitorStatus, NotifyOn,
    NotifySettings, Policy, RunStatus, ScanOptions, ScheduleRun, ScheduleStatus, ScheduledJob,
    Task, TaskKind, TaskStatus, TaskTag,
};

/// Builder for creating test Task entities
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task::new(
                "test_task",
                "example.com",
                TaskKind::Domain,
                TaskTag::Task,
                ScanOptions::new(),
            ),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.task.target = target.to_string();
        self
    }

    pub fn with_targets(mut self, targets: &[&str]) -> Self {
        self.task.targets = targets.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.task.kind = kind;
        self
    }

    pub fn with_tag(mut self, tag: TaskTag) -> Self {
        self.task.tag = tag;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_option(mut self, key: &str, value: Value) -> Self {
        self.task.options.insert(key.to_string(), value);
        self
    }

    pub fn with_queue_handle(mut self, handle: &str) -> Self {
        self.task.queue_handle = Some(handle.to_string());
        self
    }

    pub fn with_statistic(mut self, key: &str, count: i64) -> Self {
        self.task.statistic.insert(key.to_string(), count);
        self
    }

    pub fn done(self) -> Self {
        self.with_status(TaskStatus::Done)
    }

    pub fn running(self) -> Self {
        self.with_status(TaskStatus::Running)
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test ScheduledJob entities
pub struct ScheduledJobBuilder {
    job: ScheduledJob,
}

impl ScheduledJobBuilder {
    pub fn recurrent(cron: &str) -> Self {
        Self {
            job: ScheduledJob::recurrent("test_schedule", cron, "example.com", TaskTag::Task, "policy-1"),
        }
    }

    pub fn future(start_date: DateTime<Utc>) -> Self {
        Self {
            job: ScheduledJob::future("test_schedule", start_date, "example.com", TaskTag::Task, "policy-1"),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.job.id = id.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.job.name = name.to_string();
        self
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.job.target = target.to_string();
        self
    }

    pub fn with_tag(mut self, tag: TaskTag) -> Self {
        self.job.task_tag = tag;
        self
    }

    pub fn with_policy(mut self, policy_id: &str) -> Self {
        self.job.policy_id = policy_id.to_string();
        self
    }

    pub fn with_status(mut self, status: ScheduleStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn with_run_number(mut self, run_number: u32) -> Self {
        self.job.run_number = run_number;
        self
    }

    pub fn with_last_run(mut self, last_run: DateTime<Utc>) -> Self {
        self.job.last_run_date = Some(last_run);
        self
    }

    pub fn with_next_run(mut self, next_run: Option<DateTime<Utc>>) -> Self {
        self.job.next_run_date = next_run;
        self
    }

    pub fn with_notify(mut self, channel: &str, notify_on: NotifyOn) -> Self {
        self.job.notify = NotifySettings {
            enable: true,
            channel: channel.to_string(),
            notify_on,
        };
        self
    }

    pub fn build(self) -> ScheduledJob {
        self.job
    }
}

/// Builder for creating test MonitorJob entities
pub struct MonitorJobBuilder {
    job: MonitorJob,
}

impl MonitorJobBuilder {
    pub fn new(scope_id: &str, target: &str, scope_type: MonitorScopeType) -> Self {
        let mut job = MonitorJob::new(scope_id, target, scope_type, 21600, Utc::now());
        job.name = format!("监控-{target}");
        Self { job }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.job.id = id.to_string();
        self
    }

    pub fn with_interval(mut self, interval: i64) -> Self {
        self.job.interval = interval;
        self
    }

    pub fn with_next_run(mut self, next_run: Option<DateTime<Utc>>) -> Self {
        self.job.next_run_time = next_run;
        self
    }

    pub fn stopped(mut self) -> Self {
        self.job.status = MonitorStatus::Stop;
        self.job.next_run_time = None;
        self
    }

    pub fn with_option(mut self, key: &str, value: Value) -> Self {
        self.job.monitor_options.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> MonitorJob {
        self.job
    }
}

/// Builder for creating test ScheduleRun entities
pub struct ScheduleRunBuilder {
    run: ScheduleRun,
}

impl ScheduleRunBuilder {
    pub fn new(schedule_id: &str, task_ids: &[&str]) -> Self {
        let ids = task_ids.iter().map(|id| id.to_string()).collect();
        Self {
            run: ScheduleRun::new(schedule_id, "test_schedule", 1, ids, &NotifySettings::default()),
        }
    }

    pub fn with_notify(mut self, channel: &str, notify_on: NotifyOn) -> Self {
        self.run.notify_enable = true;
        self.run.notify_channel = channel.to_string();
        self.run.notify_on = notify_on;
        self
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.run.status = status;
        self
    }

    pub fn build(self) -> ScheduleRun {
        self.run
    }
}

/// 同时带有扫描配置和两个 PoC 的巡航配置
pub fn test_policy(id: &str) -> Policy {
    let mut scan_options = ScanOptions::new();
    scan_options.insert("port_scan".to_string(), Value::Bool(true));
    scan_options.insert("domain_brute".to_string(), Value::Bool(true));

    let mut cruise_options = ScanOptions::new();
    cruise_options.insert(
        "poc_config".to_string(),
        Value::Array(vec![Value::String("poc-a".into()), Value::String("poc-b".into())]),
    );

    Policy {
        id: id.to_string(),
        name: format!("policy-{id}"),
        scan_options,
        cruise_options,
    }
}

pub fn domain_scope(id: &str, roots: &[&str]) -> AssetScope {
    AssetScope {
        id: id.to_string(),
        name: format!("scope-{id}"),
        scope_type: AssetScopeType::Domain,
        scope_array: roots.iter().map(|r| r.to_string()).collect(),
    }
}

pub fn ip_scope(id: &str, networks: &[&str]) -> AssetScope {
    AssetScope {
        id: id.to_string(),
        name: format!("scope-{id}"),
        scope_type: AssetScopeType::Ip,
        scope_array: networks.iter().map(|n| n.to_string()).collect(),
    }
}
