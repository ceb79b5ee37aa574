use serde::{Deserialize, Serialize};

use super::{ScanOptions, TaskTag};

/// 扫描策略
///
/// `scan_options` 用于普通资产扫描，`cruise_options` 用于风险巡航。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Policy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub scan_options: ScanOptions,
    #[serde(default)]
    pub cruise_options: ScanOptions,
}

impl Policy {
    /// 按任务标签取出对应的扫描配置
    pub fn options_for(&self, tag: TaskTag) -> ScanOptions {
        match tag {
            TaskTag::RiskCruising => self.cruise_options.clone(),
            TaskTag::Task | TaskTag::Monitor => self.scan_options.clone(),
        }
    }
}
