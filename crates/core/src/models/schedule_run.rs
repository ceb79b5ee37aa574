use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{new_document_id, TaskId};

/// 计划任务运行记录
///
/// 聚合一次计划任务触发产生的全部子任务。`push_status` 只会离开 `Pending` 一次，
/// 之后的对账过程直接跳过该记录。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleRun {
    pub id: String,
    pub schedule_id: String,
    pub schedule_name: String,
    pub run_number: u32,
    pub task_ids: Vec<TaskId>,
    pub status: RunStatus,
    #[serde(default)]
    pub summary: RunSummary,
    pub notify_enable: bool,
    pub notify_channel: String,
    pub notify_on: NotifyOn,
    pub push_status: PushStatus,
    pub push_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ScheduleRun {
    pub fn new(
        schedule_id: impl Into<String>,
        schedule_name: impl Into<String>,
        run_number: u32,
        task_ids: Vec<TaskId>,
        notify: &NotifySettings,
    ) -> Self {
        let summary = RunSummary {
            total: task_ids.len(),
            ..RunSummary::default()
        };
        Self {
            id: new_document_id(),
            schedule_id: schedule_id.into(),
            schedule_name: schedule_name.into(),
            run_number,
            task_ids,
            status: RunStatus::Running,
            summary,
            notify_enable: notify.enable,
            notify_channel: notify.channel.clone(),
            notify_on: notify.notify_on,
            push_status: PushStatus::Pending,
            push_error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// 是否已经完成对账（通知状态已确定）
    pub fn is_settled(&self) -> bool {
        self.push_status != PushStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Finished,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Finished => "finished",
            RunStatus::Error => "error",
        }
    }
}

/// 通知触发条件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotifyOn {
    #[default]
    Finished,
    Failed,
    Always,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PushStatus {
    Pending,
    Success,
    Error,
    Skip,
}

/// 子任务汇总计数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub total: usize,
    pub waiting: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
    pub missing: usize,
    /// 各子任务结果统计之和
    #[serde(default)]
    pub assets: BTreeMap<String, i64>,
}

impl RunSummary {
    pub fn has_failure(&self) -> bool {
        self.failed > 0 || self.missing > 0
    }
}

/// 计划任务上的通知设置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifySettings {
    pub enable: bool,
    pub channel: String,
    pub notify_on: NotifyOn,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            enable: false,
            channel: "dingding".to_string(),
            notify_on: NotifyOn::Finished,
        }
    }
}

/// 通知内容格式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationFormat {
    Markdown,
    Html,
}
