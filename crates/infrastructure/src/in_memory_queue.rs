use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use recon_core::{
    models::{CancelMessage, CancelSignal, QueueHandle, TaskEnvelope, TaskPayload},
    traits::TaskQueueGateway,
    SchedulerError, SchedulerResult,
};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info};

/// 内存任务队列
///
/// 使用 Tokio channel 把任务直接交给同进程内的 Worker，适用于嵌入式部署和测试。
/// 取消请求记录在内存中，同时推送到控制通道。
#[derive(Debug)]
pub struct InMemoryTaskQueue {
    sender: mpsc::UnboundedSender<TaskEnvelope>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<TaskEnvelope>>>,
    control_sender: mpsc::UnboundedSender<CancelMessage>,
    control_receiver: Mutex<Option<mpsc::UnboundedReceiver<CancelMessage>>>,
    cancelled: Arc<RwLock<HashSet<QueueHandle>>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (control_sender, control_receiver) = mpsc::unbounded_channel();
        info!("创建内存任务队列");
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            control_sender,
            control_receiver: Mutex::new(Some(control_receiver)),
            cancelled: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// 取出任务接收端，只能取一次
    pub async fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<TaskEnvelope>> {
        self.receiver.lock().await.take()
    }

    /// 取出控制消息接收端，只能取一次
    pub async fn take_control_receiver(&self) -> Option<mpsc::UnboundedReceiver<CancelMessage>> {
        self.control_receiver.lock().await.take()
    }

    pub async fn is_cancelled(&self, handle: &str) -> bool {
        self.cancelled.read().await.contains(handle)
    }
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueueGateway for InMemoryTaskQueue {
    async fn enqueue(
        &self,
        routing_key: &str,
        payload: &TaskPayload,
    ) -> SchedulerResult<QueueHandle> {
        let envelope = TaskEnvelope::new(routing_key, payload.clone());
        let handle = envelope.handle.clone();
        self.sender
            .send(envelope)
            .map_err(|e| SchedulerError::MessageQueue(format!("内存队列已关闭: {e}")))?;

        debug!("任务 {} 已投递到内存队列 {}", payload.task_id, routing_key);
        Ok(handle)
    }

    async fn cancel(&self, handle: &str, signal: CancelSignal) -> SchedulerResult<()> {
        self.cancelled.write().await.insert(handle.to_string());
        // 没有消费者时控制消息直接丢弃，取消记录仍然保留
        let _ = self.control_sender.send(CancelMessage::new(handle, signal));
        debug!("已发送取消信号 {:?} 到任务 {}", signal, handle);
        Ok(())
    }
}
