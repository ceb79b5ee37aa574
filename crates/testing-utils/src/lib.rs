//! # Recon Testing Utils
//!
//! 工作区共享的测试工具：
//!
//! - **Builders**: 任务、计划任务、监控任务、运行记录等测试数据构建器
//! - **Mocks**: 记录调用的任务队列、总是失败的任务队列、静态 DNS、记录型通知渠道、
//!   固定结果的扫描流水线
//! - **Containers**: 基于 testcontainers 的 PostgreSQL 文档存储和 RabbitMQ
//! - **Helpers**: 异步条件等待等通用工具
//!
//! ```toml
//! [dev-dependencies]
//! recon-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod containers;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use containers::*;
pub use helpers::*;
pub use mocks::*;
