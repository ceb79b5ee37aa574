//! 通知闸门：决定计划任务运行记录是否推送、推送到哪个渠道

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

use tracing::warn;

use recon_core::{
    models::{NotificationFormat, NotifyOn, PushStatus, RunStatus, ScheduleRun},
    traits::{NotificationChannel, NotificationMessage},
    SchedulerError,
};
use recon_infrastructure::MetricsCollector;

/// 按运行记录的通知条件判断是否需要推送
pub fn should_notify(run: &ScheduleRun) -> bool {
    match run.notify_on {
        NotifyOn::Always => true,
        NotifyOn::Failed => run.status == RunStatus::Error,
        NotifyOn::Finished => run.status == RunStatus::Finished,
    }
}

/// 推送结果，写回运行记录的 `push_status` / `push_error`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    pub status: PushStatus,
    pub error: Option<String>,
}

impl PushOutcome {
    fn skip() -> Self {
        Self {
            status: PushStatus::Skip,
            error: None,
        }
    }
}

pub struct NotificationGate {
    channels: HashMap<String, Arc<dyn NotificationChannel>>,
    metrics: Arc<MetricsCollector>,
}

impl NotificationGate {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>, metrics: Arc<MetricsCollector>) -> Self {
        let channels = channels
            .into_iter()
            .map(|channel| (channel.name().to_string(), channel))
            .collect();
        Self { channels, metrics }
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// 对已结束的运行记录做一次推送决定，任何失败都只体现在结果里，不向上传播
    pub async fn push(&self, run: &ScheduleRun) -> PushOutcome {
        if !run.notify_enable || !should_notify(run) {
            return PushOutcome::skip();
        }

        let outcome = match self.send(run).await {
            Ok(()) => PushOutcome {
                status: PushStatus::Success,
                error: None,
            },
            Err(e) => {
                warn!("计划任务运行记录 {} 推送失败: {}", run.id, e);
                PushOutcome {
                    status: PushStatus::Error,
                    error: Some(e.to_string()),
                }
            }
        };

        let result = if outcome.status == PushStatus::Success { "success" } else { "error" };
        self.metrics.record_notification(&run.notify_channel, result);
        outcome
    }

    async fn send(&self, run: &ScheduleRun) -> Result<(), SchedulerError> {
        let channel = self.channels.get(&run.notify_channel).ok_or_else(|| {
            SchedulerError::Notification(format!("不支持的通知渠道: {}", run.notify_channel))
        })?;

        let format = channel.format();
        let message = NotificationMessage {
            title: report_title(run),
            content: match format {
                NotificationFormat::Markdown => build_markdown_report(run),
                NotificationFormat::Html => build_html_report(run),
            },
        };
        channel.send(format, &message).await
    }
}

pub fn report_title(run: &ScheduleRun) -> String {
    format!("[计划任务-{}] 灯塔消息推送", run.schedule_name)
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "运行中",
        RunStatus::Finished => "已完成",
        RunStatus::Error => "存在失败任务",
    }
}

pub fn build_markdown_report(run: &ScheduleRun) -> String {
    let summary = &run.summary;
    let mut out = String::new();
    let _ = writeln!(out, "### {}", report_title(run));
    let _ = writeln!(out);
    let _ = writeln!(out, "- 计划任务：{}（第 {} 次运行）", run.schedule_name, run.run_number);
    let _ = writeln!(out, "- 状态：{}", status_label(run.status));
    let _ = writeln!(
        out,
        "- 子任务：共 {}，完成 {}，失败 {}，缺失 {}",
        summary.total, summary.done, summary.failed, summary.missing
    );
    if !summary.assets.is_empty() {
        let _ = writeln!(out, "- 资产统计：");
        for (name, count) in &summary.assets {
            let _ = writeln!(out, "  - {name}：{count}");
        }
    }
    if let Some(finished) = run.finished_at {
        let _ = writeln!(out, "- 结束时间：{}", finished.format("%Y-%m-%d %H:%M:%S"));
    }
    out
}

pub fn build_html_report(run: &ScheduleRun) -> String {
    let summary = &run.summary;
    let mut out = String::new();
    let _ = write!(out, "<h3>{}</h3>", escape_html(&report_title(run)));
    out.push_str("<table border=\"1\" cellspacing=\"0\" cellpadding=\"4\">");
    let rows = [
        ("计划任务".to_string(), escape_html(&run.schedule_name)),
        ("运行次数".to_string(), run.run_number.to_string()),
        ("状态".to_string(), status_label(run.status).to_string()),
        ("子任务总数".to_string(), summary.total.to_string()),
        ("完成".to_string(), summary.done.to_string()),
        ("失败".to_string(), summary.failed.to_string()),
        ("缺失".to_string(), summary.missing.to_string()),
    ];
    for (key, value) in rows {
        let _ = write!(out, "<tr><td>{key}</td><td>{value}</td></tr>");
    }
    for (name, count) in &summary.assets {
        let _ = write!(out, "<tr><td>{}</td><td>{count}</td></tr>", escape_html(name));
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
