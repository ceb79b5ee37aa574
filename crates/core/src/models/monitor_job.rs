use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{new_document_id, ScanOptions, TaskKind};

/// 资产监控任务
///
/// `next_run_time` 为 `None` 表示已停止，永不触发。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorJob {
    pub id: String,
    pub name: String,
    pub scope_id: String,
    pub target: String,
    pub scope_type: MonitorScopeType,
    /// 监控周期（秒）
    pub interval: i64,
    pub next_run_time: Option<DateTime<Utc>>,
    pub last_run_time: Option<DateTime<Utc>>,
    pub run_number: u32,
    pub status: MonitorStatus,
    #[serde(default)]
    pub monitor_options: ScanOptions,
    pub policy_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MonitorJob {
    pub fn new(
        scope_id: impl Into<String>,
        target: impl Into<String>,
        scope_type: MonitorScopeType,
        interval: i64,
        first_run: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_document_id(),
            name: String::new(),
            scope_id: scope_id.into(),
            target: target.into(),
            scope_type,
            interval,
            next_run_time: Some(first_run),
            last_run_time: None,
            run_number: 0,
            status: MonitorStatus::Running,
            monitor_options: ScanOptions::new(),
            policy_id: None,
            created_at: Utc::now(),
        }
    }

    /// 是否到达触发时间
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == MonitorStatus::Running
            && self.next_run_time.is_some_and(|next| next <= now)
    }

    /// 记录一次运行：上次运行时间为 now，下次为 now + interval
    pub fn record_run(&mut self, now: DateTime<Utc>) {
        self.last_run_time = Some(now);
        self.next_run_time = Some(now + Duration::seconds(self.interval));
        self.run_number += 1;
    }
}

/// 监控范围类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MonitorScopeType {
    Domain,
    Ip,
    SiteUpdateMonitor,
    WihUpdateMonitor,
}

impl MonitorScopeType {
    /// 触发时下发的任务类型
    pub fn task_kind(&self) -> TaskKind {
        match self {
            MonitorScopeType::Domain => TaskKind::Domain,
            MonitorScopeType::Ip => TaskKind::Ip,
            MonitorScopeType::SiteUpdateMonitor => TaskKind::AssetSiteUpdate,
            MonitorScopeType::WihUpdateMonitor => TaskKind::AssetWihUpdate,
        }
    }

    /// 每个资产组只允许存在一个的监控类型
    pub fn is_singleton(&self) -> bool {
        matches!(
            self,
            MonitorScopeType::SiteUpdateMonitor | MonitorScopeType::WihUpdateMonitor
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorScopeType::Domain => "domain",
            MonitorScopeType::Ip => "ip",
            MonitorScopeType::SiteUpdateMonitor => "site_update_monitor",
            MonitorScopeType::WihUpdateMonitor => "wih_update_monitor",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Running,
    Stop,
}
