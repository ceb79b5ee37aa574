//! 引擎之外的协作方接口：资产基线读写、DNS、通知渠道、扫描流水线

use std::collections::HashSet;
use std::net::IpAddr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    fingerprint::fnv1a_hash,
    models::{NotificationFormat, TaskKind, TaskPayload},
    SchedulerResult,
};

/// 已确认资产的只读视图
#[async_trait]
pub trait AssetBaselineReader: Send + Sync {
    /// 资产组内已确认的域名
    async fn domains(&self, scope_id: &str) -> SchedulerResult<HashSet<String>>;

    /// 资产组内已确认的 IP
    async fn ips(&self, scope_id: &str) -> SchedulerResult<HashSet<String>>;

    /// 资产组内已确认的 `ip:port`
    async fn ip_ports(&self, scope_id: &str) -> SchedulerResult<HashSet<String>>;

    /// 资产组内已确认的站点 URL
    async fn sites(&self, scope_id: &str) -> SchedulerResult<HashSet<String>>;

    /// 资产组内已确认的 WIH 记录哈希
    async fn wih_hashes(&self, scope_id: &str) -> SchedulerResult<HashSet<String>>;
}

/// 监控确认的新资产写回资产组
///
/// 写入幂等：已存在的资产再次写入不产生重复记录。
#[async_trait]
pub trait AssetBaselineWriter: Send + Sync {
    async fn add_domains(&self, scope_id: &str, domains: &[DomainRecord]) -> SchedulerResult<()>;

    /// 每条记录只携带本次新发现的端口，已有 IP 的端口与已有端口合并
    async fn add_ips(&self, scope_id: &str, ips: &[IpRecord]) -> SchedulerResult<()>;

    async fn add_sites(&self, scope_id: &str, sites: &[String]) -> SchedulerResult<()>;

    async fn add_wih(&self, scope_id: &str, records: &[WihRecord]) -> SchedulerResult<()>;
}

/// DNS 解析
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// 解析 A/AAAA 记录，无记录时返回空列表
    async fn resolve(&self, domain: &str) -> SchedulerResult<Vec<IpAddr>>;
}

/// 通知内容
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationMessage {
    pub title: String,
    pub content: String,
}

/// 通知渠道
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// 渠道名称，与计划任务上的 `notify_channel` 对应
    fn name(&self) -> &str;

    /// 渠道原生支持的内容格式
    fn format(&self) -> NotificationFormat;

    async fn send(
        &self,
        format: NotificationFormat,
        message: &NotificationMessage,
    ) -> SchedulerResult<()>;
}

/// 一次扫描的结果，Worker 侧的扫描流水线产出
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScanOutcome {
    #[serde(default)]
    pub domains: Vec<DomainRecord>,
    #[serde(default)]
    pub ips: Vec<IpRecord>,
    #[serde(default)]
    pub sites: Vec<String>,
    #[serde(default)]
    pub wih: Vec<WihRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainRecord {
    pub domain: String,
    #[serde(default)]
    pub ips: Vec<IpAddr>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpRecord {
    pub ip: String,
    #[serde(default)]
    pub ports: Vec<u16>,
}

/// JS 等页面内容中提取出的记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WihRecord {
    pub record_type: String,
    pub content: String,
    pub site: String,
}

impl WihRecord {
    /// 内容哈希，只取类型和内容，来源站点不参与
    pub fn fnv_hash(&self) -> String {
        let mut data = Vec::with_capacity(self.record_type.len() + self.content.len());
        data.extend_from_slice(self.record_type.as_bytes());
        data.extend_from_slice(self.content.as_bytes());
        fnv1a_hash(&data).to_string()
    }
}

/// 扫描流水线（端口扫描、爆破、指纹识别等具体扫描逻辑）
#[async_trait]
pub trait ScanPipeline: Send + Sync {
    async fn run(&self, payload: &TaskPayload) -> SchedulerResult<ScanOutcome>;
}

/// Worker 侧任务处理器，每种任务类型一个
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn kind(&self) -> TaskKind;

    async fn execute(&self, payload: &TaskPayload) -> SchedulerResult<()>;
}
