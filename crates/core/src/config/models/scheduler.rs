use serde::{Deserialize, Serialize};

/// 调度循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// 调度周期（秒），不超过 60
    pub tick_interval_seconds: u64,
    /// 周期任务的前瞻窗口：下一次 cron 时间距今小于该值即触发
    pub recurrent_lookahead_seconds: i64,
    /// 周期任务两次触发之间的最小间隔
    pub recurrent_cooldown_seconds: i64,
    /// 计算下一次运行时间时向后偏移的秒数，跳过即将触发的这一次
    pub next_run_offset_seconds: i64,
    /// 资产监控最小周期
    pub monitor_min_interval_seconds: i64,
    /// 新建或恢复监控任务后首次运行的延迟
    pub monitor_first_run_delay_seconds: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_seconds: 58,
            recurrent_lookahead_seconds: 60,
            recurrent_cooldown_seconds: 180,
            next_run_offset_seconds: 61,
            monitor_min_interval_seconds: 21600,
            monitor_first_run_delay_seconds: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval_seconds == 0 || self.tick_interval_seconds > 60 {
            return Err(anyhow::anyhow!("调度周期必须在1到60秒之间"));
        }

        if self.recurrent_lookahead_seconds <= 0 {
            return Err(anyhow::anyhow!("周期任务前瞻窗口必须大于0"));
        }

        if self.recurrent_cooldown_seconds < self.recurrent_lookahead_seconds {
            return Err(anyhow::anyhow!("周期任务冷却时间不能小于前瞻窗口"));
        }

        if self.next_run_offset_seconds < self.recurrent_lookahead_seconds {
            return Err(anyhow::anyhow!("下次运行时间偏移不能小于前瞻窗口"));
        }

        if self.monitor_min_interval_seconds <= 0 {
            return Err(anyhow::anyhow!("监控最小周期必须大于0"));
        }

        Ok(())
    }
}
