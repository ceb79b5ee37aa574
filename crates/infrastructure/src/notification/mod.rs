pub mod dingtalk;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use recon_core::{config::NotificationConfig, traits::NotificationChannel, SchedulerResult};

pub use dingtalk::DingTalkChannel;
pub use webhook::WebhookChannel;

/// 按配置构建已启用的通知渠道
pub fn build_channels(
    config: &NotificationConfig,
) -> SchedulerResult<Vec<Arc<dyn NotificationChannel>>> {
    let timeout = Duration::from_secs(config.request_timeout_seconds);
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

    if let Some(dingtalk) = &config.dingtalk {
        channels.push(Arc::new(DingTalkChannel::new(dingtalk.clone(), timeout)?));
    }

    if let Some(webhook) = &config.webhook {
        channels.push(Arc::new(WebhookChannel::new(webhook.clone(), timeout)?));
    }

    Ok(channels)
}
