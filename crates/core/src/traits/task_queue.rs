use async_trait::async_trait;

use crate::{
    models::{CancelSignal, QueueHandle, TaskPayload},
    SchedulerResult,
};

/// 任务队列网关
///
/// 把任务投递到 Worker 池，并可凭句柄取消。允许至少一次投递。
#[async_trait]
pub trait TaskQueueGateway: Send + Sync {
    /// 投递任务到指定路由，返回队列句柄
    async fn enqueue(&self, routing_key: &str, payload: &TaskPayload)
        -> SchedulerResult<QueueHandle>;

    /// 向正在执行的任务发送终止信号
    async fn cancel(&self, handle: &str, signal: CancelSignal) -> SchedulerResult<()>;
}
