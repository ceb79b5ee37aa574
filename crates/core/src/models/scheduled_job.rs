use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{new_document_id, NotifySettings, TaskTag};

/// 计划任务
///
/// - `Recurrent` 按 `cron` 周期触发
/// - `Future` 在 `start_date` 到达后触发一次
///
/// `next_run_date` 为 `None` 表示不会再触发（对应终态）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledJob {
    pub id: String,
    pub name: String,
    pub schedule_type: ScheduleType,
    pub cron: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub target: String,
    pub task_tag: TaskTag,
    pub policy_id: String,
    pub status: ScheduleStatus,
    pub run_number: u32,
    pub last_run_date: Option<DateTime<Utc>>,
    pub next_run_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notify: NotifySettings,
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    pub fn recurrent(
        name: impl Into<String>,
        cron: impl Into<String>,
        target: impl Into<String>,
        task_tag: TaskTag,
        policy_id: impl Into<String>,
    ) -> Self {
        Self {
            id: new_document_id(),
            name: name.into(),
            schedule_type: ScheduleType::Recurrent,
            cron: Some(cron.into()),
            start_date: None,
            target: target.into(),
            task_tag,
            policy_id: policy_id.into(),
            status: ScheduleStatus::Scheduled,
            run_number: 0,
            last_run_date: None,
            next_run_date: None,
            notify: NotifySettings::default(),
            created_at: Utc::now(),
        }
    }

    pub fn future(
        name: impl Into<String>,
        start_date: DateTime<Utc>,
        target: impl Into<String>,
        task_tag: TaskTag,
        policy_id: impl Into<String>,
    ) -> Self {
        Self {
            id: new_document_id(),
            name: name.into(),
            schedule_type: ScheduleType::Future,
            cron: None,
            start_date: Some(start_date),
            target: target.into(),
            task_tag,
            policy_id: policy_id.into(),
            status: ScheduleStatus::Scheduled,
            run_number: 0,
            last_run_date: None,
            next_run_date: Some(start_date),
            notify: NotifySettings::default(),
            created_at: Utc::now(),
        }
    }

    /// 子任务名称：定时任务使用 `定时任务-`，周期任务附带运行序号
    pub fn task_name(&self) -> String {
        let short: String = self.name.chars().take(15).collect();
        match self.schedule_type {
            ScheduleType::Future => format!("定时任务-{short}"),
            ScheduleType::Recurrent => format!("周期任务-{short}-{}", self.run_number),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Recurrent,
    Future,
}

/// 计划任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Scheduled,
    Done,
    Error,
    Stop,
}

impl ScheduleStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScheduleStatus::Scheduled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Scheduled => "scheduled",
            ScheduleStatus::Done => "done",
            ScheduleStatus::Error => "error",
            ScheduleStatus::Stop => "stop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_name_truncates_to_fifteen_chars() {
        let mut job = ScheduledJob::recurrent(
            "一二三四五六七八九十甲乙丙丁戊己庚",
            "0 0 * * *",
            "example.com",
            TaskTag::Task,
            "p1",
        );
        job.run_number = 3;
        assert_eq!(job.task_name(), "周期任务-一二三四五六七八九十甲乙丙丁戊-3");

        let future = ScheduledJob::future("nightly", Utc::now(), "1.1.1.1", TaskTag::Task, "p1");
        assert_eq!(future.task_name(), "定时任务-nightly");
    }
}
