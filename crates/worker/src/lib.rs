//! # Recon Worker
//!
//! Worker 侧的任务执行：
//!
//! - [`TaskHandlerRegistry`]: 任务类型到处理器的闭合分派表
//! - [`ScanTaskHandler`]: 普通扫描与资产监控任务的执行流程
//! - [`MonitorDiffEngine`]: 扫描结果与已确认资产的差异计算，含泛解析过滤
//! - [`DedupStore`]: 按作用域去重的首次出现记录
//! - [`MonitorNotifier`]: 监控发现新资产后的报告推送
//! - [`ResolvingScanPipeline`]: 只做 DNS 解析的默认扫描流水线
//! - [`TaskConsumer`]: 从任务队列取消息、执行并响应取消请求

pub mod consumer;
pub mod dedup;
pub mod diff;
pub mod executors;
pub mod notifier;
pub mod pipeline;
pub mod registry;

pub use consumer::TaskConsumer;
pub use dedup::{content_hash, DedupStore};
pub use diff::{fnv1a_hash, wih_record_hash, DomainDiff, IpDiff, MonitorDiffEngine};
pub use executors::{ExecutorContext, ScanTaskHandler};
pub use notifier::MonitorNotifier;
pub use pipeline::ResolvingScanPipeline;
pub use registry::TaskHandlerRegistry;
