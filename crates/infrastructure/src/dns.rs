use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::{Resolver, TokioResolver};
use recon_core::{traits::DnsResolver, SchedulerError, SchedulerResult};
use tracing::debug;

/// 基于 hickory 的 DNS 解析器，使用系统解析配置
pub struct HickoryDnsResolver {
    resolver: TokioResolver,
}

impl HickoryDnsResolver {
    pub fn from_system_conf() -> SchedulerResult<Self> {
        let resolver = Resolver::builder_tokio()
            .map_err(|e| SchedulerError::Dns(format!("读取系统DNS配置失败: {e}")))?
            .build();
        Ok(Self { resolver })
    }
}

#[async_trait]
impl DnsResolver for HickoryDnsResolver {
    async fn resolve(&self, domain: &str) -> SchedulerResult<Vec<IpAddr>> {
        match self.resolver.lookup_ip(domain).await {
            Ok(lookup) => Ok(lookup.iter().collect()),
            Err(e) if e.is_no_records_found() => {
                debug!("域名 {} 没有解析记录", domain);
                Ok(Vec::new())
            }
            Err(e) => Err(SchedulerError::Dns(format!("解析 {domain} 失败: {e}"))),
        }
    }
}
