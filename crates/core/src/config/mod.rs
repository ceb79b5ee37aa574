//! 配置管理
//!
//! 配置以 TOML 文件为主，环境变量覆盖，反序列化后逐段校验。
//! 每个配置段都带默认值，配置文件只需写出需要修改的字段。

pub mod models;

pub use models::*;
