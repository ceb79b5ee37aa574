pub mod database;
pub mod dns;
pub mod in_memory_queue;
pub mod message_queue;
pub mod notification;
pub mod observability;

pub use database::*;
pub use dns::HickoryDnsResolver;
pub use in_memory_queue::InMemoryTaskQueue;
pub use message_queue::RabbitMqTaskQueue;
pub use notification::{build_channels, DingTalkChannel, WebhookChannel};
pub use observability::*;
