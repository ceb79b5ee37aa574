//! 监控差异计算
//!
//! 把一次扫描的结果与资产组内已确认的资产比较，只留下新出现的部分。
//! 域名差异额外做泛解析过滤：对候选域名的每个父域解析一个随机子域，
//! 解析到的 IP 视为泛解析 IP，落在其中的候选域名被丢弃。

use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use rand::{distr::Alphanumeric, Rng};
use recon_core::{
    target::parent_domain,
    traits::{AssetBaselineReader, DnsResolver, DomainRecord, IpRecord, WihRecord},
    SchedulerResult,
};
use tracing::{debug, warn};

pub use recon_core::fingerprint::fnv1a_hash;

/// WIH 记录的内容哈希，只取类型和内容，来源站点不参与
pub fn wih_record_hash(record: &WihRecord) -> String {
    record.fnv_hash()
}

/// 域名差异结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainDiff {
    /// 基线中不存在且未命中泛解析的域名
    pub new_domains: Vec<DomainRecord>,
    /// 泛解析过滤前的候选数量
    pub candidates: usize,
    /// 被判定为泛解析而丢弃的域名
    pub suppressed: Vec<String>,
    pub wildcard_ips: HashSet<IpAddr>,
}

/// IP 差异结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpDiff {
    pub new_ips: Vec<String>,
    /// 新出现的 `ip:port`
    pub new_ip_ports: Vec<String>,
}

impl IpDiff {
    pub fn is_empty(&self) -> bool {
        self.new_ips.is_empty() && self.new_ip_ports.is_empty()
    }
}

pub struct MonitorDiffEngine {
    baseline: Arc<dyn AssetBaselineReader>,
    resolver: Arc<dyn DnsResolver>,
}

impl MonitorDiffEngine {
    pub fn new(baseline: Arc<dyn AssetBaselineReader>, resolver: Arc<dyn DnsResolver>) -> Self {
        Self { baseline, resolver }
    }

    /// 计算新域名，并过滤泛解析产生的假阳性
    pub async fn diff_domains(
        &self,
        scope_id: &str,
        discovered: &[DomainRecord],
    ) -> SchedulerResult<DomainDiff> {
        let known = self.baseline.domains(scope_id).await?;

        let mut seen = HashSet::new();
        let candidates: Vec<DomainRecord> = discovered
            .iter()
            .filter_map(|record| {
                let domain = record.domain.trim().trim_end_matches('.').to_lowercase();
                if domain.is_empty() || known.contains(&domain) || !seen.insert(domain.clone()) {
                    return None;
                }
                Some(DomainRecord {
                    domain,
                    ips: record.ips.clone(),
                })
            })
            .collect();

        if candidates.is_empty() {
            return Ok(DomainDiff::default());
        }

        let parents: BTreeSet<String> = candidates
            .iter()
            .filter_map(|record| parent_domain(&record.domain))
            .collect();
        let wildcard_ips = self.probe_wildcard(&parents).await;

        let mut diff = DomainDiff {
            candidates: candidates.len(),
            wildcard_ips,
            ..Default::default()
        };

        for mut record in candidates {
            if record.ips.is_empty() {
                record.ips = match self.resolver.resolve(&record.domain).await {
                    Ok(ips) => ips,
                    Err(e) => {
                        debug!("解析候选域名 {} 失败: {}", record.domain, e);
                        Vec::new()
                    }
                };
            }

            if record.ips.iter().any(|ip| diff.wildcard_ips.contains(ip)) {
                diff.suppressed.push(record.domain);
            } else {
                diff.new_domains.push(record);
            }
        }

        if !diff.suppressed.is_empty() {
            debug!(
                "资产组 {} 丢弃 {} 个泛解析域名",
                scope_id,
                diff.suppressed.len()
            );
        }
        Ok(diff)
    }

    /// 对每个父域解析同一个随机子域，返回所有解析到的 IP
    ///
    /// 单个父域探测失败只记录日志，视为没有泛解析。
    async fn probe_wildcard(&self, parents: &BTreeSet<String>) -> HashSet<IpAddr> {
        let label = random_label();
        let mut ips = HashSet::new();

        for parent in parents {
            let probe = format!("{label}.{parent}");
            match self.resolver.resolve(&probe).await {
                Ok(resolved) => {
                    if !resolved.is_empty() {
                        debug!("{} 存在泛解析: {:?}", parent, resolved);
                    }
                    ips.extend(resolved);
                }
                Err(e) => warn!("泛解析探测 {} 失败: {}", probe, e),
            }
        }
        ips
    }

    /// 计算新 IP 和新 `ip:port`
    pub async fn diff_ips(&self, scope_id: &str, discovered: &[IpRecord]) -> SchedulerResult<IpDiff> {
        let known_ips = self.baseline.ips(scope_id).await?;
        let known_ports = self.baseline.ip_ports(scope_id).await?;

        let mut diff = IpDiff::default();
        let mut seen_ips = HashSet::new();
        let mut seen_ports = HashSet::new();

        for record in discovered {
            let ip = record.ip.trim().to_string();
            if !known_ips.contains(&ip) && seen_ips.insert(ip.clone()) {
                diff.new_ips.push(ip.clone());
            }

            for port in &record.ports {
                let pair = format!("{ip}:{port}");
                if !known_ports.contains(&pair) && seen_ports.insert(pair.clone()) {
                    diff.new_ip_ports.push(pair);
                }
            }
        }
        Ok(diff)
    }

    /// 计算新站点
    pub async fn diff_sites(&self, scope_id: &str, discovered: &[String]) -> SchedulerResult<Vec<String>> {
        let known = self.baseline.sites(scope_id).await?;
        let mut seen = HashSet::new();
        Ok(discovered
            .iter()
            .map(|site| site.trim().trim_end_matches('/').to_string())
            .filter(|site| !site.is_empty() && !known.contains(site) && seen.insert(site.clone()))
            .collect())
    }

    /// 计算新 WIH 记录，按内容哈希比较
    pub async fn diff_wih(&self, scope_id: &str, discovered: &[WihRecord]) -> SchedulerResult<Vec<WihRecord>> {
        let known = self.baseline.wih_hashes(scope_id).await?;
        let mut seen = HashSet::new();
        Ok(discovered
            .iter()
            .filter(|record| {
                let hash = wih_record_hash(record);
                !known.contains(&hash) && seen.insert(hash)
            })
            .cloned()
            .collect())
    }
}

/// 6 位小写随机标签
fn random_label() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}
