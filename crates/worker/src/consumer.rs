use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::{stream, StreamExt};
use lapin::options::{BasicAckOptions, BasicRejectOptions};
use recon_core::{
    models::{CancelMessage, QueueHandle, TaskEnvelope, TaskId, TaskStatus},
    traits::TaskRepository,
    SchedulerError, SchedulerResult,
};
use recon_infrastructure::{MetricsCollector, RabbitMqTaskQueue, StructuredLogger};
use tokio::sync::{broadcast, mpsc, RwLock, Semaphore};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::registry::TaskHandlerRegistry;

/// 正在执行的任务
struct RunningTask {
    task_id: TaskId,
    abort: AbortHandle,
}

/// 任务消费者
///
/// 从任务队列取出消息交给注册表执行，同时监听控制交换机上的取消请求。
/// 正在执行的任务按队列句柄登记，取消时直接中止对应的执行。
/// 停机中止的任务没有人再回写状态，由消费者置为 error。
pub struct TaskConsumer {
    registry: Arc<TaskHandlerRegistry>,
    tasks: Arc<dyn TaskRepository>,
    running: Arc<RwLock<HashMap<QueueHandle, RunningTask>>>,
    permits: Arc<Semaphore>,
    metrics: Arc<MetricsCollector>,
    consumer_tag: String,
}

impl TaskConsumer {
    pub fn new(
        registry: Arc<TaskHandlerRegistry>,
        tasks: Arc<dyn TaskRepository>,
        max_concurrent_tasks: usize,
        consumer_tag_prefix: &str,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());

        Self {
            registry,
            tasks,
            running: Arc::new(RwLock::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(max_concurrent_tasks.max(1))),
            metrics,
            consumer_tag: format!("{consumer_tag_prefix}-{host}"),
        }
    }

    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    pub async fn running_count(&self) -> usize {
        self.running.read().await.len()
    }

    pub async fn is_running(&self, handle: &str) -> bool {
        self.running.read().await.contains_key(handle)
    }

    /// 启动一条任务消息的执行
    ///
    /// 并发数达到上限时等待空闲名额，返回的句柄在执行结束（或被中止）时完成。
    pub async fn spawn(&self, envelope: TaskEnvelope) -> SchedulerResult<JoinHandle<SchedulerResult<()>>> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SchedulerError::Internal(format!("获取执行名额失败: {e}")))?;

        let registry = Arc::clone(&self.registry);
        let running = Arc::clone(&self.running);
        let metrics = Arc::clone(&self.metrics);
        let handle = envelope.handle.clone();
        let task_id = envelope.payload.task_id.clone();

        // 持有写锁直到登记完成，保证执行结束时的移除发生在登记之后
        let mut guard = self.running.write().await;
        let join = tokio::spawn(async move {
            let _permit = permit;
            let payload = envelope.payload;
            let kind = payload.kind.as_str();
            StructuredLogger::log_task_execution_started(&payload.task_id, kind, &envelope.handle);

            let started = Instant::now();
            let result = registry.dispatch(&payload).await;
            let status = if result.is_ok() { "finished" } else { "failed" };
            StructuredLogger::log_task_execution_finished(
                &payload.task_id,
                kind,
                status,
                started.elapsed().as_millis() as u64,
            );

            if let Err(SchedulerError::UnknownKind(kind)) = &result {
                metrics.record_task_executed(kind, "unknown_kind", 0.0);
            }

            running.write().await.remove(&envelope.handle);
            result
        });
        guard.insert(
            handle,
            RunningTask {
                task_id,
                abort: join.abort_handle(),
            },
        );
        drop(guard);

        Ok(join)
    }

    /// 处理取消请求，返回是否中止了正在执行的任务
    pub async fn cancel(&self, message: &CancelMessage) -> bool {
        match self.running.write().await.remove(&message.handle) {
            Some(entry) => {
                entry.abort.abort();
                info!("已按 {:?} 中止任务执行: {}", message.signal, message.handle);
                true
            }
            None => {
                debug!("取消请求对应的任务不在本 Worker 上执行: {}", message.handle);
                false
            }
        }
    }

    /// 中止全部正在执行的任务，并把尚未结束的任务置为 error
    pub async fn abort_all(&self) -> usize {
        let aborted: Vec<RunningTask> = {
            let mut running = self.running.write().await;
            running.drain().map(|(_, entry)| entry).collect()
        };

        for entry in &aborted {
            entry.abort.abort();
        }
        for entry in &aborted {
            if let Err(e) = self.mark_aborted(&entry.task_id).await {
                warn!("任务 {} 中止后置为 error 失败: {}", entry.task_id, e);
            }
        }
        aborted.len()
    }

    async fn mark_aborted(&self, task_id: &str) -> SchedulerResult<()> {
        let Some(mut task) = self.tasks.get(task_id).await? else {
            return Ok(());
        };
        if task.is_terminal() {
            return Ok(());
        }

        task.status = TaskStatus::Error;
        task.end_time = Some(Utc::now());
        self.tasks.replace(&task).await?;
        info!("任务 {} 随 Worker 停机中止，已置为 error", task_id);
        Ok(())
    }

    /// 消费进程内队列，直到收到停机信号或队列关闭
    pub async fn run_local(
        &self,
        mut tasks: mpsc::UnboundedReceiver<TaskEnvelope>,
        mut control: mpsc::UnboundedReceiver<CancelMessage>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Worker {} 开始消费内存队列", self.consumer_tag);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Worker 收到停机信号");
                    break;
                }
                Some(message) = control.recv() => {
                    self.cancel(&message).await;
                }
                envelope = tasks.recv() => {
                    let Some(envelope) = envelope else {
                        warn!("内存任务队列已关闭");
                        break;
                    };
                    if let Err(e) = self.spawn(envelope).await {
                        error!("启动任务执行失败: {}", e);
                    }
                }
            }
        }

        self.stop().await;
    }

    /// 消费 RabbitMQ 上全部路由队列，并通过独占队列订阅控制交换机
    ///
    /// 任务消息在执行结束后确认，无法解析的消息直接拒绝且不重新入队。
    pub async fn run_rabbitmq(
        &self,
        queue: Arc<RabbitMqTaskQueue>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> SchedulerResult<()> {
        let config = queue.config();

        let mut consumers = Vec::new();
        for routing_key in config.routes.values() {
            let tag = format!("{}-{}", self.consumer_tag, routing_key);
            consumers.push(queue.create_consumer(routing_key, &tag).await?.boxed());
        }
        let mut tasks = stream::select_all(consumers);

        let control_tag = format!("{}-control", self.consumer_tag);
        let mut control = queue.create_control_consumer(&control_tag).await?.boxed();

        info!("Worker {} 开始消费 RabbitMQ 队列", self.consumer_tag);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Worker 收到停机信号");
                    break;
                }
                delivery = control.next() => {
                    let Some(delivery) = delivery else {
                        warn!("控制队列消费者已关闭");
                        break;
                    };
                    let delivery = delivery
                        .map_err(|e| SchedulerError::MessageQueue(format!("接收控制消息失败: {e}")))?;

                    match serde_json::from_slice::<CancelMessage>(&delivery.data) {
                        Ok(message) => {
                            self.cancel(&message).await;
                        }
                        Err(e) => warn!("无法解析控制消息: {}", e),
                    }
                    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                        warn!("确认控制消息失败: {}", e);
                    }
                }
                delivery = tasks.next() => {
                    let Some(delivery) = delivery else {
                        warn!("任务队列消费者已关闭");
                        break;
                    };
                    let delivery = delivery
                        .map_err(|e| SchedulerError::MessageQueue(format!("接收任务消息失败: {e}")))?;

                    let envelope = match RabbitMqTaskQueue::decode_envelope(&delivery.data) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            error!("丢弃无法解析的任务消息: {}", e);
                            if let Err(e) = delivery.reject(BasicRejectOptions { requeue: false }).await {
                                warn!("拒绝任务消息失败: {}", e);
                            }
                            continue;
                        }
                    };

                    let join = self.spawn(envelope).await?;
                    tokio::spawn(async move {
                        match join.await {
                            Ok(Err(e)) => debug!("任务执行返回错误: {}", e),
                            Err(e) if e.is_cancelled() => debug!("任务执行已被中止"),
                            Err(e) => error!("任务执行异常退出: {}", e),
                            Ok(Ok(())) => {}
                        }
                        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                            warn!("确认任务消息失败: {}", e);
                        }
                    });
                }
            }
        }

        self.stop().await;
        Ok(())
    }

    async fn stop(&self) {
        let aborted = self.abort_all().await;
        if aborted > 0 {
            warn!("停机时中止了 {} 个正在执行的任务", aborted);
        }
        info!("Worker {} 已停止", self.consumer_tag);
    }
}
