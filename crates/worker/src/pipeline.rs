use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use recon_core::{
    models::{TaskKind, TaskPayload},
    target::target_to_list,
    traits::{DnsResolver, DomainRecord, IpRecord, ScanOutcome, ScanPipeline},
    SchedulerResult,
};
use tracing::{debug, warn};

/// 只做 DNS 解析的扫描流水线
///
/// 进程内 Worker 的默认实现：域名任务解析目标域名，IP 任务原样回报单个 IP，
/// 站点类任务回报站点列表。端口扫描、爆破和指纹识别由外部扫描器完成。
pub struct ResolvingScanPipeline {
    resolver: Arc<dyn DnsResolver>,
}

impl ResolvingScanPipeline {
    pub fn new(resolver: Arc<dyn DnsResolver>) -> Self {
        Self { resolver }
    }

    async fn resolve_domains(&self, targets: &[String]) -> Vec<DomainRecord> {
        let mut records = Vec::new();
        for domain in targets {
            match self.resolver.resolve(domain).await {
                Ok(ips) if !ips.is_empty() => records.push(DomainRecord {
                    domain: domain.clone(),
                    ips,
                }),
                Ok(_) => debug!("域名 {} 没有解析结果", domain),
                Err(e) => warn!("解析域名 {} 失败: {}", domain, e),
            }
        }
        records
    }
}

#[async_trait]
impl ScanPipeline for ResolvingScanPipeline {
    async fn run(&self, payload: &TaskPayload) -> SchedulerResult<ScanOutcome> {
        let targets = target_to_list(&payload.target);
        let mut outcome = ScanOutcome::default();

        match payload.kind {
            TaskKind::Domain => {
                outcome.domains = self.resolve_domains(&targets).await;
            }
            TaskKind::Ip => {
                outcome.ips = targets
                    .into_iter()
                    .filter(|t| t.parse::<IpAddr>().is_ok())
                    .map(|ip| IpRecord { ip, ports: Vec::new() })
                    .collect();
            }
            TaskKind::AssetSiteAdd | TaskKind::AssetSiteUpdate | TaskKind::RiskCruising => {
                outcome.sites = payload.targets.clone();
            }
            TaskKind::Fofa | TaskKind::AssetWihUpdate => {}
        }

        Ok(outcome)
    }
}
