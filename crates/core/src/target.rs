//! 扫描目标解析
//!
//! 目标字符串以逗号或空白分隔，每一项可以是 IP、CIDR、IP 区间、域名或 `*.` 开头的泛域名。

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use ipnetwork::IpNetwork;

use crate::{blacklist::Blacklist, SchedulerError, SchedulerResult};

/// 拆分后的目标
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitTargets {
    pub ips: Vec<String>,
    pub domains: Vec<String>,
}

impl SplitTargets {
    pub fn is_empty(&self) -> bool {
        self.ips.is_empty() && self.domains.is_empty()
    }
}

/// 转小写，按逗号或空白拆分，去掉空项并保序去重
pub fn target_to_list(target: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    target
        .to_lowercase()
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter(|item| seen.insert(item.to_string()))
        .map(str::to_string)
        .collect()
}

/// 把目标拆为 IP 类与域名类，并做黑名单校验
pub fn split_ip_domain_targets(
    target: &str,
    blacklist: &Blacklist,
) -> SchedulerResult<SplitTargets> {
    let mut split = SplitTargets::default();

    for item in target_to_list(target) {
        if let Some(ip_target) = parse_ip_target(&item) {
            if ip_target.is_blacklisted(blacklist) {
                return Err(SchedulerError::Blacklisted(item));
            }
            split.ips.push(item);
            continue;
        }

        let bare = item.strip_prefix("*.").unwrap_or(&item);
        if !is_valid_domain(bare) {
            return Err(SchedulerError::InvalidTarget(item));
        }
        if blacklist.is_forbidden_domain(bare) || blacklist.is_black_domain(bare) {
            return Err(SchedulerError::Blacklisted(item));
        }
        split.domains.push(item);
    }

    if split.is_empty() {
        return Err(SchedulerError::InvalidTarget(target.to_string()));
    }

    Ok(split)
}

/// 校验域名格式
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let label_ok = |label: &&str| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    };
    if !labels.iter().all(label_ok) {
        return false;
    }

    labels.last().is_some_and(|tld| {
        tld.len() >= 2 && (tld.chars().all(|c| c.is_ascii_lowercase()) || tld.starts_with("xn--"))
    })
}

/// 去掉第一级标签得到父域名，至少保留两级，`a.example.com` → `example.com`
pub fn parent_domain(domain: &str) -> Option<String> {
    let domain = domain.trim_start_matches("*.");
    let (_, rest) = domain.split_once('.')?;
    if rest.contains('.') {
        Some(rest.to_string())
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy)]
enum IpTarget {
    Network(IpNetwork),
    Range(Ipv4Addr, Ipv4Addr),
}

impl IpTarget {
    fn is_blacklisted(&self, blacklist: &Blacklist) -> bool {
        match self {
            IpTarget::Network(network) => blacklist.overlaps_black_network(*network),
            IpTarget::Range(start, end) => {
                blacklist.is_black_ip(IpAddr::V4(*start))
                    || blacklist.is_black_ip(IpAddr::V4(*end))
                    || (u32::from(*start)..=u32::from(*end)).step_by(256).any(|ip| {
                        blacklist.is_black_ip(IpAddr::V4(Ipv4Addr::from(ip)))
                    })
            }
        }
    }
}

fn parse_ip_target(item: &str) -> Option<IpTarget> {
    if let Some((start, end)) = item.split_once('-') {
        let start: Ipv4Addr = start.parse().ok()?;
        let end: Ipv4Addr = match end.parse::<Ipv4Addr>() {
            Ok(end) => end,
            Err(_) => {
                // 简写形式：1.1.1.1-20
                let last: u8 = end.parse().ok()?;
                let [a, b, c, _] = start.octets();
                Ipv4Addr::new(a, b, c, last)
            }
        };
        return (start <= end).then_some(IpTarget::Range(start, end));
    }

    if item.contains('/') {
        return item.parse::<IpNetwork>().ok().map(IpTarget::Network);
    }

    item.parse::<IpAddr>()
        .ok()
        .and_then(|ip| IpNetwork::new(ip, if ip.is_ipv4() { 32 } else { 128 }).ok())
        .map(IpTarget::Network)
}
