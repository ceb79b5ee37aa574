use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{new_document_id, ScanOptions};

/// 任务 id
pub type TaskId = String;

/// 扫描任务
///
/// 表示一次下发到 Worker 池的扫描执行，存储层是任务状态的唯一来源。
///
/// # 字段说明
///
/// - `target`: 展示用的目标字符串（IP 以空格分隔，风险巡航为摘要标签）
/// - `targets`: 结构化目标集合，风险巡航和站点添加任务使用
/// - `options`: 扫描配置，对调度引擎不透明
/// - `queue_handle`: 任务队列返回的句柄，用于取消
/// - `statistic`: Worker 回写的结果统计（如 `site_cnt`、`domain_cnt`）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub targets: Vec<String>,
    pub kind: TaskKind,
    pub tag: TaskTag,
    pub status: TaskStatus,
    #[serde(default)]
    pub options: ScanOptions,
    pub queue_handle: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub statistic: BTreeMap<String, i64>,
    /// 监控任务确认的新资产，按资产类别分组
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub new_assets: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub sync_status: SyncStatus,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// 创建一个处于 waiting 状态的新任务
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        kind: TaskKind,
        tag: TaskTag,
        options: ScanOptions,
    ) -> Self {
        Self {
            id: new_document_id(),
            name: name.into(),
            target: target.into(),
            targets: Vec::new(),
            kind,
            tag,
            status: TaskStatus::Waiting,
            options,
            queue_handle: None,
            start_time: None,
            end_time: None,
            statistic: BTreeMap::new(),
            new_assets: BTreeMap::new(),
            sync_status: SyncStatus::Default,
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 读取字符串类型的配置项
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    /// 由监控任务派生时关联的资产组 id
    pub fn scope_id(&self) -> Option<&str> {
        self.option_str("scope_id")
    }

    /// 由监控任务派生时关联的监控任务 id
    pub fn monitor_job_id(&self) -> Option<&str> {
        self.option_str("scheduler_id")
    }

    /// 由计划任务派生时关联的计划任务 id
    pub fn schedule_id(&self) -> Option<&str> {
        self.option_str("from_task_schedule")
    }
}

/// 任务类型
///
/// 闭合枚举，每种类型在 Worker 侧对应唯一的处理器。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Domain,
    Ip,
    RiskCruising,
    Fofa,
    AssetSiteAdd,
    AssetSiteUpdate,
    AssetWihUpdate,
}

impl TaskKind {
    pub const ALL: [TaskKind; 7] = [
        TaskKind::Domain,
        TaskKind::Ip,
        TaskKind::RiskCruising,
        TaskKind::Fofa,
        TaskKind::AssetSiteAdd,
        TaskKind::AssetSiteUpdate,
        TaskKind::AssetWihUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Domain => "domain",
            TaskKind::Ip => "ip",
            TaskKind::RiskCruising => "risk_cruising",
            TaskKind::Fofa => "fofa",
            TaskKind::AssetSiteAdd => "asset_site_add",
            TaskKind::AssetSiteUpdate => "asset_site_update",
            TaskKind::AssetWihUpdate => "asset_wih_update",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务标签
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskTag {
    Task,
    Monitor,
    RiskCruising,
}

impl TaskTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskTag::Task => "task",
            TaskTag::Monitor => "monitor",
            TaskTag::RiskCruising => "risk_cruising",
        }
    }
}

/// 任务状态
///
/// 除固定状态外，Worker 执行过程中会写入自由文本的进度标签（如 `port_scan`），
/// 统一视为运行中。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Waiting,
    Running,
    Progress(String),
    Done,
    Stop,
    Error,
}

impl TaskStatus {
    /// 是否为终态（done / stop / error）
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Stop | TaskStatus::Error)
    }

    /// 是否为失败终态
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskStatus::Stop | TaskStatus::Error)
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Waiting => "waiting",
            TaskStatus::Running => "running",
            TaskStatus::Progress(label) => label.as_str(),
            TaskStatus::Done => "done",
            TaskStatus::Stop => "stop",
            TaskStatus::Error => "error",
        }
    }
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "waiting" => TaskStatus::Waiting,
            "running" => TaskStatus::Running,
            "done" => TaskStatus::Done,
            "stop" => TaskStatus::Stop,
            "error" => TaskStatus::Error,
            _ => TaskStatus::Progress(value),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(value: TaskStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 资产同步状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Default,
    Waiting,
    Running,
    Synchronized,
    Error,
}
