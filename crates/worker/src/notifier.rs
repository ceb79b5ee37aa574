//! 资产监控新资产通知

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;

use tracing::{info, warn};

use recon_core::{
    models::{MonitorJob, NotificationFormat},
    traits::{NotificationChannel, NotificationMessage},
};
use recon_infrastructure::MetricsCollector;

/// 资产类别的展示名称
fn asset_label(category: &str) -> &str {
    match category {
        "domain" => "域名",
        "ip" => "IP",
        "ip_port" => "IP端口",
        "site" => "站点",
        "wih" => "WIH记录",
        other => other,
    }
}

/// 监控任务发现新资产后推送到全部已配置渠道
///
/// 没有确认的新资产时不推送。单个渠道失败只记录日志，不影响任务结果。
pub struct MonitorNotifier {
    channels: Vec<Arc<dyn NotificationChannel>>,
    metrics: Arc<MetricsCollector>,
}

impl MonitorNotifier {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>, metrics: Arc<MetricsCollector>) -> Self {
        Self { channels, metrics }
    }

    /// 返回实际尝试推送的渠道数
    pub async fn notify(
        &self,
        job: &MonitorJob,
        task_id: &str,
        new_assets: &BTreeMap<String, Vec<String>>,
    ) -> usize {
        if new_assets.values().all(Vec::is_empty) {
            return 0;
        }
        if self.channels.is_empty() {
            info!("监控任务 {} 发现新资产，但未配置通知渠道", job.id);
            return 0;
        }

        for channel in &self.channels {
            let format = channel.format();
            let message = NotificationMessage {
                title: report_title(job),
                content: match format {
                    NotificationFormat::Markdown => build_markdown_report(job, task_id, new_assets),
                    NotificationFormat::Html => build_html_report(job, task_id, new_assets),
                },
            };

            let result = match channel.send(format, &message).await {
                Ok(()) => "success",
                Err(e) => {
                    warn!("监控任务 {} 通过 {} 推送失败: {}", job.id, channel.name(), e);
                    "error"
                }
            };
            self.metrics.record_notification(channel.name(), result);
        }
        self.channels.len()
    }
}

pub fn report_title(job: &MonitorJob) -> String {
    let name = if job.name.is_empty() { &job.target } else { &job.name };
    format!("[资产监控-{name}] 灯塔消息推送")
}

pub fn build_markdown_report(
    job: &MonitorJob,
    task_id: &str,
    new_assets: &BTreeMap<String, Vec<String>>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "### {}", report_title(job));
    let _ = writeln!(out);
    let _ = writeln!(out, "- 监控目标：`{}`", job.target);
    let _ = writeln!(out, "- 任务ID：`{task_id}`");
    let _ = writeln!(out, "- 第 {} 次运行", job.run_number);
    for (category, items) in new_assets.iter().filter(|(_, items)| !items.is_empty()) {
        let _ = writeln!(out);
        let _ = writeln!(out, "#### 新增{}（{}）", asset_label(category), items.len());
        let _ = writeln!(out);
        for item in items {
            let _ = writeln!(out, "- `{item}`");
        }
    }
    out
}

pub fn build_html_report(
    job: &MonitorJob,
    task_id: &str,
    new_assets: &BTreeMap<String, Vec<String>>,
) -> String {
    let mut out = String::new();
    let _ = write!(out, "<h3>{}</h3>", escape_html(&report_title(job)));
    let _ = write!(
        out,
        "<p>监控目标：{}，任务ID：{}</p>",
        escape_html(&job.target),
        escape_html(task_id)
    );
    out.push_str("<table border=\"1\" cellspacing=\"0\" cellpadding=\"4\">");
    out.push_str("<tr><th>类别</th><th>资产</th></tr>");
    for (category, items) in new_assets {
        for item in items {
            let _ = write!(
                out,
                "<tr><td>{}</td><td>{}</td></tr>",
                asset_label(category),
                escape_html(item)
            );
        }
    }
    out.push_str("</table>");
    out
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use recon_core::models::MonitorScopeType;

    fn job() -> MonitorJob {
        MonitorJob::new("s1", "x.com", MonitorScopeType::Domain, 3600, Utc::now())
    }

    fn assets() -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([
            ("domain".to_string(), vec!["new.x.com".to_string()]),
            ("site".to_string(), vec![]),
        ])
    }

    #[test]
    fn test_markdown_lists_non_empty_categories() {
        let report = build_markdown_report(&job(), "t-1", &assets());
        assert!(report.starts_with("### [资产监控-x.com] 灯塔消息推送"));
        assert!(report.contains("#### 新增域名（1）"));
        assert!(report.contains("- `new.x.com`"));
        assert!(!report.contains("站点"));
    }

    #[test]
    fn test_html_escapes_assets() {
        let assets = BTreeMap::from([("site".to_string(), vec!["https://x.com/?a=<b>".to_string()])]);
        let report = build_html_report(&job(), "t-1", &assets);
        assert!(report.contains("<td>站点</td><td>https://x.com/?a=&lt;b&gt;</td>"));
    }
}
