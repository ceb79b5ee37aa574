pub mod app_config;
pub mod database;
pub mod message_queue;
pub mod notification;
pub mod scheduler;
pub mod worker;

pub use app_config::AppConfig;
pub use database::{DatabaseConfig, StorageBackend};
pub use message_queue::{MessageQueueConfig, MessageQueueType};
pub use notification::{
    BlacklistConfig, DingTalkConfig, NotificationConfig, ObservabilityConfig, WebhookConfig,
};
pub use scheduler::SchedulerConfig;
pub use worker::WorkerConfig;
