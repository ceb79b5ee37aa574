pub mod blacklist;
pub mod config;
pub mod errors;
pub mod fingerprint;
pub mod models;
pub mod target;
pub mod traits;

pub use blacklist::Blacklist;
pub use errors::*;

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
