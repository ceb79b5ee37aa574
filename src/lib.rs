//! 资产侦察扫描任务调度与增量资产监控引擎的进程装配

pub mod app;
pub mod shutdown;

pub use app::{AppMode, Application, Stores};
pub use shutdown::ShutdownManager;
