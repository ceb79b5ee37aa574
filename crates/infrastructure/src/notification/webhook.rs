use std::time::Duration;

use async_trait::async_trait;
use recon_core::{
    config::WebhookConfig,
    models::NotificationFormat,
    traits::{NotificationChannel, NotificationMessage},
    SchedulerError, SchedulerResult,
};
use serde_json::json;
use tracing::debug;

/// Webhook 渠道，POST HTML 内容到指定地址
pub struct WebhookChannel {
    config: WebhookConfig,
    http_client: reqwest::Client,
}

impl WebhookChannel {
    pub const NAME: &'static str = "webhook";

    pub fn new(config: WebhookConfig, timeout: Duration) -> SchedulerResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Notification(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn format(&self) -> NotificationFormat {
        NotificationFormat::Html
    }

    async fn send(
        &self,
        format: NotificationFormat,
        message: &NotificationMessage,
    ) -> SchedulerResult<()> {
        if format != NotificationFormat::Html {
            return Err(SchedulerError::Notification(format!(
                "Webhook渠道不支持 {format:?} 格式"
            )));
        }

        let body = json!({
            "title": message.title,
            "content_type": "text/html",
            "content": message.content,
        });

        let mut request = self.http_client.post(&self.config.url).json(&body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SchedulerError::Notification(format!("Webhook请求失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SchedulerError::Notification(format!(
                "Webhook返回 HTTP {status}: {body}"
            )));
        }

        debug!("Webhook推送成功: {}", message.title);
        Ok(())
    }
}
