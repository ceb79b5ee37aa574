use std::sync::Arc;

use recon_core::{models::DedupRecord, traits::DedupRepository, SchedulerResult};
use recon_infrastructure::MetricsCollector;
use sha2::{Digest, Sha256};
use tracing::debug;

/// 内容的 SHA-256 十六进制摘要
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// 去重存储
///
/// 同一作用域内相同内容只在第一次出现时放行，之后的重复内容被静默丢弃。
/// 判定与写入由仓储的 `insert_if_absent` 原子完成。
pub struct DedupStore {
    repository: Arc<dyn DedupRepository>,
    metrics: Arc<MetricsCollector>,
}

impl DedupStore {
    pub fn new(repository: Arc<dyn DedupRepository>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            repository,
            metrics,
        }
    }

    /// 内容在作用域内首次出现时返回 true 并记录
    pub async fn first_seen(&self, scope: &str, content: &str) -> SchedulerResult<bool> {
        let record = DedupRecord::new(scope, content_hash(content));
        let inserted = self.repository.insert_if_absent(&record).await?;
        if !inserted {
            debug!("作用域 {} 中的内容已出现过: {}", scope, record.hash);
        }
        Ok(inserted)
    }

    pub async fn seen(&self, scope: &str, content: &str) -> SchedulerResult<bool> {
        self.repository.contains(scope, &content_hash(content)).await
    }

    /// 过滤出作用域内首次出现的内容，保持原有顺序
    pub async fn filter_new(&self, scope: &str, items: Vec<String>) -> SchedulerResult<Vec<String>> {
        let total = items.len();
        let mut fresh = Vec::with_capacity(total);
        for item in items {
            if self.first_seen(scope, &item).await? {
                fresh.push(item);
            }
        }

        let suppressed = total - fresh.len();
        if suppressed > 0 {
            self.metrics.record_dedup_suppressed(suppressed);
        }
        Ok(fresh)
    }
}
