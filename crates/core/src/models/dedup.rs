use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 去重记录：首次出现时写入，之后不再更新
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DedupRecord {
    pub hash: String,
    pub scope: String,
    pub created_at: DateTime<Utc>,
}

impl DedupRecord {
    pub fn new(scope: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            scope: scope.into(),
            created_at: Utc::now(),
        }
    }

    /// 文档主键：同一作用域内哈希唯一
    pub fn key(&self) -> String {
        format!("{}:{}", self.scope, self.hash)
    }
}
