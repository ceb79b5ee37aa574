use serde::{Deserialize, Serialize};

/// 钉钉机器人配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DingTalkConfig {
    pub access_token: String,
    pub secret: String,
    #[serde(default = "default_dingtalk_url")]
    pub base_url: String,
}

fn default_dingtalk_url() -> String {
    "https://oapi.dingtalk.com/robot/send".to_string()
}

/// 通用 Webhook 配置，推送 HTML 内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub dingtalk: Option<DingTalkConfig>,
    pub webhook: Option<WebhookConfig>,
    pub request_timeout_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            dingtalk: None,
            webhook: None,
            request_timeout_seconds: 10,
        }
    }
}

impl NotificationConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(dingtalk) = &self.dingtalk {
            if dingtalk.access_token.is_empty() || dingtalk.secret.is_empty() {
                return Err(anyhow::anyhow!("钉钉 access_token 和 secret 不能为空"));
            }
        }

        if let Some(webhook) = &self.webhook {
            if url::Url::parse(&webhook.url).is_err() {
                return Err(anyhow::anyhow!("Webhook地址无效: {}", webhook.url));
            }
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("通知请求超时时间必须大于0"));
        }

        Ok(())
    }
}

/// 黑名单配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlacklistConfig {
    pub black_ips: Vec<String>,
    pub black_domains: Vec<String>,
    pub forbidden_domains: Vec<String>,
    pub black_ip_file: Option<String>,
    pub black_domain_file: Option<String>,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            black_ips: vec!["127.0.0.0/8".to_string(), "0.0.0.0/8".to_string()],
            black_domains: Vec::new(),
            forbidden_domains: Vec::new(),
            black_ip_file: None,
            black_domain_file: None,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_bind_address: "0.0.0.0:9000".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!("无效的日志级别: {}", self.log_level));
        }

        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(anyhow::anyhow!("无效的日志格式: {}", self.log_format));
        }

        if self.metrics_enabled
            && self
                .metrics_bind_address
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(anyhow::anyhow!(
                "无效的指标监听地址: {}",
                self.metrics_bind_address
            ));
        }

        Ok(())
    }
}
