use thiserror::Error;

/// 调度引擎错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("无效的目标: {0}")]
    InvalidTarget(String),

    #[error("目标 {target} 不在资产组 {scope_id} 范围内")]
    NotInScope { target: String, scope_id: String },

    #[error("目标在黑名单中: {0}")]
    Blacklisted(String),

    #[error("策略未找到: {id}")]
    PolicyNotFound { id: String },

    #[error("资产组未找到: {id}")]
    ScopeNotFound { id: String },

    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },

    #[error("计划任务未找到: {id}")]
    ScheduledJobNotFound { id: String },

    #[error("监控任务未找到: {id}")]
    MonitorJobNotFound { id: String },

    #[error("计划任务运行记录未找到: {id}")]
    ScheduleRunNotFound { id: String },

    #[error("资产组 {scope_id} 已存在 {scope_type} 监控任务")]
    DuplicateMonitor { scope_id: String, scope_type: String },

    #[error("目标 {target} 已存在监控任务")]
    DuplicateTarget { target: String },

    #[error("监控周期 {interval} 秒小于最小值 {minimum} 秒")]
    IntervalTooShort { interval: i64, minimum: i64 },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("定时任务开始时间 {start_date} 早于当前时间")]
    InvalidStartDate { start_date: String },

    #[error("无效的状态转换: {0}")]
    InvalidStateTransition(String),

    #[error("未知的任务类型: {0}")]
    UnknownKind(String),

    #[error("任务下发失败: {0}")]
    DispatchFailed(String),

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("DNS解析错误: {0}")]
    Dns(String),

    #[error("通知发送失败: {0}")]
    Notification(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SchedulerError {
    fn from(e: serde_json::Error) -> Self {
        SchedulerError::Serialization(e.to_string())
    }
}

impl SchedulerError {
    /// 是否属于任务定义本身的错误（修正配置前重复执行没有意义）
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::PolicyNotFound { .. }
                | SchedulerError::InvalidCron { .. }
                | SchedulerError::InvalidStartDate { .. }
                | SchedulerError::InvalidTarget(_)
                | SchedulerError::NotInScope { .. }
                | SchedulerError::Blacklisted(_)
                | SchedulerError::ScopeNotFound { .. }
        )
    }
}
