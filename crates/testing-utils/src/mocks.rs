//! Test doubles for the engine's external collaborators
//!
//! 这些实现只在内存中记录调用，供单元测试和集成测试断言。

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use recon_core::{
    models::{CancelSignal, NotificationFormat, QueueHandle, TaskPayload},
    traits::{
        DnsResolver, NotificationChannel, NotificationMessage, ScanOutcome, ScanPipeline,
        TaskQueueGateway,
    },
    SchedulerError, SchedulerResult,
};

/// 记录每次投递与取消的任务队列
#[derive(Debug, Default)]
pub struct RecordingTaskQueue {
    enqueued: Mutex<Vec<(String, TaskPayload)>>,
    cancelled: Mutex<Vec<(String, CancelSignal)>>,
    counter: AtomicUsize,
}

impl RecordingTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已投递的 (routing_key, payload)
    pub fn enqueued(&self) -> Vec<(String, TaskPayload)> {
        self.enqueued.lock().unwrap().clone()
    }

    pub fn enqueued_count(&self) -> usize {
        self.enqueued.lock().unwrap().len()
    }

    pub fn cancelled(&self) -> Vec<(String, CancelSignal)> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskQueueGateway for RecordingTaskQueue {
    async fn enqueue(&self, routing_key: &str, payload: &TaskPayload) -> SchedulerResult<QueueHandle> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.enqueued
            .lock()
            .unwrap()
            .push((routing_key.to_string(), payload.clone()));
        Ok(format!("handle-{n}"))
    }

    async fn cancel(&self, handle: &str, signal: CancelSignal) -> SchedulerResult<()> {
        self.cancelled.lock().unwrap().push((handle.to_string(), signal));
        Ok(())
    }
}

/// 所有操作都返回消息队列错误
#[derive(Debug, Default)]
pub struct FailingTaskQueue {
    attempts: AtomicUsize,
}

impl FailingTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskQueueGateway for FailingTaskQueue {
    async fn enqueue(&self, routing_key: &str, _payload: &TaskPayload) -> SchedulerResult<QueueHandle> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SchedulerError::MessageQueue(format!("队列 {routing_key} 不可用")))
    }

    async fn cancel(&self, handle: &str, _signal: CancelSignal) -> SchedulerResult<()> {
        Err(SchedulerError::MessageQueue(format!("无法取消 {handle}")))
    }
}

/// 固定记录的 DNS 解析
///
/// 精确记录优先，其次是泛解析父域；`fail_unknown` 打开时未知域名返回错误。
#[derive(Debug, Default)]
pub struct StaticDnsResolver {
    records: HashMap<String, Vec<IpAddr>>,
    wildcards: HashMap<String, Vec<IpAddr>>,
    fail_unknown: bool,
    queries: Mutex<Vec<String>>,
}

impl StaticDnsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, domain: &str, ips: &[&str]) -> Self {
        self.records.insert(domain.to_string(), parse_ips(ips));
        self
    }

    /// `*.parent` 的泛解析
    pub fn with_wildcard(mut self, parent: &str, ips: &[&str]) -> Self {
        self.wildcards.insert(parent.to_string(), parse_ips(ips));
        self
    }

    pub fn failing_unknown(mut self) -> Self {
        self.fail_unknown = true;
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

fn parse_ips(ips: &[&str]) -> Vec<IpAddr> {
    ips.iter().filter_map(|ip| ip.parse().ok()).collect()
}

#[async_trait]
impl DnsResolver for StaticDnsResolver {
    async fn resolve(&self, domain: &str) -> SchedulerResult<Vec<IpAddr>> {
        self.queries.lock().unwrap().push(domain.to_string());

        if let Some(ips) = self.records.get(domain) {
            return Ok(ips.clone());
        }
        if let Some(ips) = self
            .wildcards
            .iter()
            .find(|(parent, _)| domain.ends_with(&format!(".{parent}")))
            .map(|(_, ips)| ips.clone())
        {
            return Ok(ips);
        }
        if self.fail_unknown {
            return Err(SchedulerError::Dns(format!("解析 {domain} 超时")));
        }
        Ok(Vec::new())
    }
}

/// 记录发送内容的通知渠道
#[derive(Debug)]
pub struct RecordingChannel {
    name: String,
    format: NotificationFormat,
    sent: Mutex<Vec<(NotificationFormat, NotificationMessage)>>,
}

impl RecordingChannel {
    pub fn new(name: &str, format: NotificationFormat) -> Self {
        Self {
            name: name.to_string(),
            format,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn markdown(name: &str) -> Self {
        Self::new(name, NotificationFormat::Markdown)
    }

    pub fn html(name: &str) -> Self {
        Self::new(name, NotificationFormat::Html)
    }

    pub fn sent(&self) -> Vec<(NotificationFormat, NotificationMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> NotificationFormat {
        self.format
    }

    async fn send(&self, format: NotificationFormat, message: &NotificationMessage) -> SchedulerResult<()> {
        self.sent.lock().unwrap().push((format, message.clone()));
        Ok(())
    }
}

/// 发送总是失败的通知渠道
#[derive(Debug)]
pub struct FailingChannel {
    name: String,
    attempts: AtomicUsize,
}

impl FailingChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationChannel for FailingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> NotificationFormat {
        NotificationFormat::Markdown
    }

    async fn send(&self, _format: NotificationFormat, _message: &NotificationMessage) -> SchedulerResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SchedulerError::Notification("errcode 310000: sign not match".to_string()))
    }
}

/// 返回固定结果的扫描流水线
#[derive(Debug, Default)]
pub struct StaticScanPipeline {
    outcome: ScanOutcome,
    error: Option<String>,
    calls: Mutex<Vec<TaskPayload>>,
}

impl StaticScanPipeline {
    pub fn new(outcome: ScanOutcome) -> Self {
        Self {
            outcome,
            error: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: ScanOutcome::default(),
            error: Some(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<TaskPayload> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScanPipeline for StaticScanPipeline {
    async fn run(&self, payload: &TaskPayload) -> SchedulerResult<ScanOutcome> {
        self.calls.lock().unwrap().push(payload.clone());
        match &self.error {
            Some(message) => Err(SchedulerError::Internal(message.clone())),
            None => Ok(self.outcome.clone()),
        }
    }
}
