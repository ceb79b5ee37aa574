use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use recon_core::{
    config::DingTalkConfig,
    models::NotificationFormat,
    traits::{NotificationChannel, NotificationMessage},
    SchedulerError, SchedulerResult,
};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// 钉钉机器人渠道，推送 Markdown 消息
pub struct DingTalkChannel {
    config: DingTalkConfig,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct DingTalkResponse {
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

impl DingTalkChannel {
    pub const NAME: &'static str = "dingding";

    pub fn new(config: DingTalkConfig, timeout: Duration) -> SchedulerResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Notification(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// 加签后的请求地址
    fn signed_url(&self, timestamp_ms: i64) -> SchedulerResult<String> {
        let sign = sign(&self.config.secret, timestamp_ms)?;
        Ok(format!(
            "{}?access_token={}&timestamp={}&sign={}",
            self.config.base_url,
            urlencoding::encode(&self.config.access_token),
            timestamp_ms,
            urlencoding::encode(&sign)
        ))
    }
}

/// `HmacSHA256(secret, "{timestamp}\n{secret}")` 的 Base64 编码
pub(crate) fn sign(secret: &str, timestamp_ms: i64) -> SchedulerResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SchedulerError::Notification(format!("初始化签名失败: {e}")))?;
    mac.update(format!("{timestamp_ms}\n{secret}").as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl NotificationChannel for DingTalkChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn format(&self) -> NotificationFormat {
        NotificationFormat::Markdown
    }

    async fn send(
        &self,
        format: NotificationFormat,
        message: &NotificationMessage,
    ) -> SchedulerResult<()> {
        if format != NotificationFormat::Markdown {
            return Err(SchedulerError::Notification(format!(
                "钉钉渠道不支持 {format:?} 格式"
            )));
        }

        let url = self.signed_url(chrono::Utc::now().timestamp_millis())?;
        let body = json!({
            "msgtype": "markdown",
            "markdown": {
                "title": message.title,
                "text": message.content,
            }
        });

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SchedulerError::Notification(format!("钉钉请求失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SchedulerError::Notification(format!("钉钉返回 HTTP {status}")));
        }

        let result: DingTalkResponse = response
            .json()
            .await
            .map_err(|e| SchedulerError::Notification(format!("解析钉钉响应失败: {e}")))?;

        if result.errcode != 0 {
            warn!("钉钉推送失败: {} {}", result.errcode, result.errmsg);
            return Err(SchedulerError::Notification(format!(
                "钉钉返回错误 {}: {}",
                result.errcode, result.errmsg
            )));
        }

        debug!("钉钉推送成功: {}", message.title);
        Ok(())
    }
}
