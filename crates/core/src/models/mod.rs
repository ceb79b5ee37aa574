//! # 数据模型
//!
//! 扫描任务调度与增量资产监控引擎的核心数据结构。
//!
//! ## 核心模型
//!
//! ### Task - 扫描任务
//! 一次具体的扫描执行，状态由存储层唯一维护，Worker 执行过程中回写进度。
//!
//! ### ScheduledJob - 计划任务
//! 周期（cron）或定时（指定时间）触发的扫描任务定义，绑定一个策略。
//!
//! ### MonitorJob - 资产监控任务
//! 按固定周期对资产组内目标重新扫描，并与已确认资产做差集。
//!
//! ### ScheduleRun - 计划任务运行记录
//! 一次计划任务触发所产生的全部子任务的汇总，以及通知推送状态。
//!
//! ## 状态流转
//!
//! ```text
//! Task:          waiting → running(进度标签) → done | stop | error
//! ScheduledJob:  scheduled ⇄ stop,  scheduled → done | error
//! MonitorJob:    running ⇄ stop
//! ScheduleRun:   running → finished | error,  push: pending → success | error | skip
//! ```
//!
//! 所有文档以不透明的字符串 id 为主键，文档之间通过 id 字符串互相引用。

pub mod dedup;
pub mod message;
pub mod monitor_job;
pub mod policy;
pub mod schedule_run;
pub mod scheduled_job;
pub mod scope;
pub mod task;

pub use dedup::*;
pub use message::*;
pub use monitor_job::*;
pub use policy::*;
pub use schedule_run::*;
pub use scheduled_job::*;
pub use scope::*;
pub use task::*;

/// 扫描配置，透传给扫描流水线的键值对
pub type ScanOptions = serde_json::Map<String, serde_json::Value>;

/// 生成新的文档 id
pub fn new_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
