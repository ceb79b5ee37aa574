use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

/// 资产组
///
/// `scope_array` 中存放根域名（域名类型）或 IP / CIDR（IP 类型）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetScope {
    pub id: String,
    pub name: String,
    pub scope_type: AssetScopeType,
    pub scope_array: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssetScopeType {
    Domain,
    Ip,
}

impl AssetScope {
    /// 判断目标是否落在资产组范围内
    ///
    /// 域名：等于某个根域名或为其子域名；IP：落在某个网段内。
    pub fn contains(&self, target: &str) -> bool {
        match self.scope_type {
            AssetScopeType::Domain => {
                let target = target.trim_start_matches("*.").to_ascii_lowercase();
                self.scope_array.iter().any(|root| {
                    let root = root.to_ascii_lowercase();
                    target == root || target.ends_with(&format!(".{root}"))
                })
            }
            AssetScopeType::Ip => {
                if let Ok(network) = target.parse::<IpNetwork>() {
                    return self
                        .networks()
                        .any(|scope| scope.contains(network.network()) && scope.prefix() <= network.prefix());
                }
                match target.parse::<IpAddr>() {
                    Ok(ip) => self.networks().any(|scope| scope.contains(ip)),
                    Err(_) => false,
                }
            }
        }
    }

    fn networks(&self) -> impl Iterator<Item = IpNetwork> + '_ {
        self.scope_array.iter().filter_map(|item| item.parse::<IpNetwork>().ok())
    }
}
