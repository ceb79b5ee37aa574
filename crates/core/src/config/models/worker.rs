use serde::{Deserialize, Serialize};

/// 进程内 Worker 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 是否在调度进程内同时运行 Worker
    pub enabled: bool,
    /// 同时执行的任务上限
    pub max_concurrent_tasks: usize,
    /// RabbitMQ 消费者标签前缀，实际标签追加主机名
    pub consumer_tag_prefix: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent_tasks: 4,
            consumer_tag_prefix: "recon-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(anyhow::anyhow!("Worker并发数必须大于0"));
        }

        if self.consumer_tag_prefix.trim().is_empty() {
            return Err(anyhow::anyhow!("消费者标签前缀不能为空"));
        }

        Ok(())
    }
}
