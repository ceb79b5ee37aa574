//! 调度端：任务下发、计划任务与资产监控触发、运行记录对账与通知

pub mod aggregator;
pub mod controller;
pub mod cron_utils;
pub mod monitor_service;
pub mod notification_gate;
pub mod schedule_service;
pub mod scheduler;
pub mod submission;

pub use aggregator::ScheduleRunAggregator;
pub use controller::{TaskController, TaskStatusSummary};
pub use cron_utils::CronScheduler;
pub use monitor_service::MonitorService;
pub use notification_gate::{should_notify, NotificationGate, PushOutcome};
pub use schedule_service::ScheduleService;
pub use scheduler::{SchedulerLoop, TickReport};
pub use submission::TaskSubmitter;
