use std::fs;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use tracing::{debug, warn};

use crate::{config::BlacklistConfig, SchedulerError, SchedulerResult};

/// 扫描目标黑名单
///
/// 启动时从配置（以及可选的文件）加载一次，之后以只读方式注入到需要的组件中。
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    black_ips: Vec<IpNetwork>,
    black_domains: Vec<String>,
    forbidden_domains: Vec<String>,
}

impl Blacklist {
    pub fn new(
        black_ips: Vec<IpNetwork>,
        black_domains: Vec<String>,
        forbidden_domains: Vec<String>,
    ) -> Self {
        Self {
            black_ips,
            black_domains: black_domains.into_iter().map(normalize_domain).collect(),
            forbidden_domains: forbidden_domains.into_iter().map(normalize_domain).collect(),
        }
    }

    /// 按配置加载黑名单，文件中每行一个条目，`#` 开头为注释
    pub fn load(config: &BlacklistConfig) -> SchedulerResult<Self> {
        let mut ip_entries = config.black_ips.clone();
        if let Some(path) = &config.black_ip_file {
            ip_entries.extend(read_entries(path)?);
        }

        let mut black_ips = Vec::with_capacity(ip_entries.len());
        for entry in ip_entries {
            match entry.parse::<IpNetwork>() {
                Ok(network) => black_ips.push(network),
                Err(e) => warn!("忽略无效的黑名单IP {}: {}", entry, e),
            }
        }

        let mut black_domains = config.black_domains.clone();
        if let Some(path) = &config.black_domain_file {
            black_domains.extend(read_entries(path)?);
        }

        let blacklist = Self::new(black_ips, black_domains, config.forbidden_domains.clone());
        debug!(
            "黑名单加载完成: IP {} 条, 域名 {} 条, 禁止域名 {} 条",
            blacklist.black_ips.len(),
            blacklist.black_domains.len(),
            blacklist.forbidden_domains.len()
        );
        Ok(blacklist)
    }

    pub fn is_black_ip(&self, ip: IpAddr) -> bool {
        self.black_ips.iter().any(|network| network.contains(ip))
    }

    /// 网段与任一黑名单网段有交集
    pub fn overlaps_black_network(&self, network: IpNetwork) -> bool {
        self.black_ips
            .iter()
            .any(|black| black.contains(network.network()) || network.contains(black.network()))
    }

    pub fn is_black_domain(&self, domain: &str) -> bool {
        suffix_match(&self.black_domains, domain)
    }

    pub fn is_forbidden_domain(&self, domain: &str) -> bool {
        suffix_match(&self.forbidden_domains, domain)
    }
}

fn read_entries(path: &str) -> SchedulerResult<Vec<String>> {
    let content = fs::read_to_string(path)
        .map_err(|e| SchedulerError::Configuration(format!("读取黑名单文件 {path} 失败: {e}")))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn normalize_domain(domain: String) -> String {
    domain.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn suffix_match(entries: &[String], domain: &str) -> bool {
    let domain = domain.trim_start_matches("*.").to_ascii_lowercase();
    entries
        .iter()
        .any(|entry| domain == *entry || domain.ends_with(&format!(".{entry}")))
}
