//! 数据仓储层接口定义
//!
//! 每个集合一个仓储接口，全部以单文档按 id 替换/更新的方式修改状态：
//! - `TaskRepository` - 扫描任务（`task`）
//! - `ScheduledJobRepository` - 计划任务（`task_schedule`）
//! - `ScheduleRunRepository` - 计划任务运行记录（`task_schedule_run`）
//! - `MonitorJobRepository` - 资产监控任务（`scheduler`）
//! - `DedupRepository` - 去重记录
//! - `PolicyRepository` / `ScopeRepository` - 只读的策略与资产组
//!
//! 引擎的不变量依靠调用顺序（先写后发、先持久化再通知）保证，不依赖多文档事务。

use async_trait::async_trait;

use crate::{
    models::{
        AssetScope, DedupRecord, MonitorJob, MonitorScopeType, Policy, ScheduleRun, ScheduledJob,
        Task, TaskStatus,
    },
    SchedulerResult,
};

/// 扫描任务仓储
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn insert(&self, task: &Task) -> SchedulerResult<()>;

    async fn get(&self, id: &str) -> SchedulerResult<Option<Task>>;

    /// 按 id 整体替换
    async fn replace(&self, task: &Task) -> SchedulerResult<()>;

    /// 写入队列句柄
    async fn set_queue_handle(&self, id: &str, handle: &str) -> SchedulerResult<()>;

    /// 仅当任务仍处于指定状态时删除，返回是否删除
    async fn delete_if_status(&self, id: &str, status: &TaskStatus) -> SchedulerResult<bool>;

    async fn delete(&self, id: &str) -> SchedulerResult<bool>;

    /// 批量读取，不存在的 id 不出现在结果中
    async fn find_by_ids(&self, ids: &[String]) -> SchedulerResult<Vec<Task>>;
}

/// 计划任务仓储
#[async_trait]
pub trait ScheduledJobRepository: Send + Sync {
    async fn insert(&self, job: &ScheduledJob) -> SchedulerResult<()>;

    async fn get(&self, id: &str) -> SchedulerResult<Option<ScheduledJob>>;

    async fn replace(&self, job: &ScheduledJob) -> SchedulerResult<()>;

    async fn delete(&self, id: &str) -> SchedulerResult<bool>;

    /// 所有处于 scheduled 状态的计划任务
    async fn find_scheduled(&self) -> SchedulerResult<Vec<ScheduledJob>>;
}

/// 计划任务运行记录仓储
#[async_trait]
pub trait ScheduleRunRepository: Send + Sync {
    async fn insert(&self, run: &ScheduleRun) -> SchedulerResult<()>;

    async fn get(&self, id: &str) -> SchedulerResult<Option<ScheduleRun>>;

    async fn replace(&self, run: &ScheduleRun) -> SchedulerResult<()>;

    /// 通知状态仍为 pending 的运行记录
    async fn find_unsettled(&self) -> SchedulerResult<Vec<ScheduleRun>>;

    async fn find_by_schedule(&self, schedule_id: &str) -> SchedulerResult<Vec<ScheduleRun>>;
}

/// 资产监控任务仓储
#[async_trait]
pub trait MonitorJobRepository: Send + Sync {
    async fn insert(&self, job: &MonitorJob) -> SchedulerResult<()>;

    async fn get(&self, id: &str) -> SchedulerResult<Option<MonitorJob>>;

    async fn replace(&self, job: &MonitorJob) -> SchedulerResult<()>;

    async fn delete(&self, id: &str) -> SchedulerResult<bool>;

    /// 所有处于 running 状态的监控任务
    async fn find_running(&self) -> SchedulerResult<Vec<MonitorJob>>;

    async fn find_by_scope(
        &self,
        scope_id: &str,
        scope_type: Option<MonitorScopeType>,
    ) -> SchedulerResult<Vec<MonitorJob>>;
}

/// 去重记录仓储
#[async_trait]
pub trait DedupRepository: Send + Sync {
    /// 记录不存在时写入并返回 true，已存在返回 false
    async fn insert_if_absent(&self, record: &DedupRecord) -> SchedulerResult<bool>;

    async fn contains(&self, scope: &str, hash: &str) -> SchedulerResult<bool>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn get(&self, id: &str) -> SchedulerResult<Option<Policy>>;
}

#[async_trait]
pub trait ScopeRepository: Send + Sync {
    async fn get(&self, id: &str) -> SchedulerResult<Option<AssetScope>>;
}
