use async_trait::async_trait;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
    Consumer, ExchangeKind, Queue,
};
use recon_core::{
    config::MessageQueueConfig,
    models::{CancelMessage, CancelSignal, QueueHandle, TaskEnvelope, TaskPayload},
    traits::TaskQueueGateway,
    SchedulerError, SchedulerResult,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// RabbitMQ 任务队列网关
///
/// 每个路由键对应一个持久化队列，消息体为 JSON 编码的 [`TaskEnvelope`]，
/// 消息 id 即队列句柄。取消请求发布到 fanout 控制交换机，
/// 每个 Worker 绑定自己的独占队列，都能收到并按句柄终止本地执行。
pub struct RabbitMqTaskQueue {
    connection: Connection,
    channel: Arc<Mutex<Channel>>,
    config: MessageQueueConfig,
}

impl RabbitMqTaskQueue {
    /// 连接 RabbitMQ，声明全部路由队列和控制交换机
    pub async fn new(config: MessageQueueConfig) -> SchedulerResult<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("连接RabbitMQ失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("创建通道失败: {e}")))?;

        info!("成功连接到RabbitMQ");

        let queue = Self {
            connection,
            channel: Arc::new(Mutex::new(channel)),
            config,
        };

        queue.initialize_queues().await?;

        Ok(queue)
    }

    async fn initialize_queues(&self) -> SchedulerResult<()> {
        let channel = self.channel.lock().await;

        for routing_key in self.config.routes.values() {
            self.declare_queue(&channel, routing_key).await?;
        }

        let exchange = &self.config.control_exchange;
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("声明交换机 {exchange} 失败: {e}")))?;

        info!("所有任务队列初始化完成");
        Ok(())
    }

    async fn declare_queue(&self, channel: &Channel, queue_name: &str) -> SchedulerResult<Queue> {
        let queue = channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                SchedulerError::MessageQueue(format!("声明队列 {queue_name} 失败: {e}"))
            })?;

        debug!("队列 {} 声明成功", queue_name);
        Ok(queue)
    }

    /// 发布消息，`exchange` 为空时按路由键直达同名队列
    async fn publish<T: Serialize + Sync>(
        &self,
        exchange: &str,
        routing_key: &str,
        message_id: &str,
        message: &T,
    ) -> SchedulerResult<()> {
        let payload = serde_json::to_vec(message)
            .map_err(|e| SchedulerError::Serialization(format!("序列化消息失败: {e}")))?;

        let channel = self.channel.lock().await;
        let confirm = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_message_id(message_id.into())
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| {
                SchedulerError::MessageQueue(format!(
                    "发布消息到 {exchange}/{routing_key} 失败: {e}"
                ))
            })?;

        confirm
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("消息发布确认失败: {e}")))?;

        debug!("消息 {} 已发布到 {}/{}", message_id, exchange, routing_key);
        Ok(())
    }

    /// 创建消费者，Worker 侧使用
    pub async fn create_consumer(&self, queue: &str, consumer_tag: &str) -> SchedulerResult<Consumer> {
        let channel = self.channel.lock().await;
        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("创建消费者失败: {e}")))?;

        debug!("为队列 {} 创建消费者: {}", queue, consumer_tag);
        Ok(consumer)
    }

    /// 订阅控制交换机
    ///
    /// 每个 Worker 声明一个由服务端命名的独占队列绑定到交换机，连接断开后队列自动删除。
    pub async fn create_control_consumer(&self, consumer_tag: &str) -> SchedulerResult<Consumer> {
        let exchange = &self.config.control_exchange;
        let channel = self.channel.lock().await;
        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("声明控制队列失败: {e}")))?;

        channel
            .queue_bind(
                queue.name().as_str(),
                exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                SchedulerError::MessageQueue(format!("绑定控制队列到 {exchange} 失败: {e}"))
            })?;

        let consumer = channel
            .basic_consume(
                queue.name().as_str(),
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("创建控制消费者失败: {e}")))?;

        debug!("控制队列 {} 已绑定到 {}", queue.name(), exchange);
        Ok(consumer)
    }

    /// 反序列化队列中的任务信封
    pub fn decode_envelope(data: &[u8]) -> SchedulerResult<TaskEnvelope> {
        serde_json::from_slice(data)
            .map_err(|e| SchedulerError::Serialization(format!("反序列化任务消息失败: {e}")))
    }

    pub fn config(&self) -> &MessageQueueConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn close(&self) -> SchedulerResult<()> {
        self.connection
            .close(200, "正常关闭")
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("关闭连接失败: {e}")))?;

        info!("RabbitMQ连接已关闭");
        Ok(())
    }
}

#[async_trait]
impl TaskQueueGateway for RabbitMqTaskQueue {
    async fn enqueue(
        &self,
        routing_key: &str,
        payload: &TaskPayload,
    ) -> SchedulerResult<QueueHandle> {
        let envelope = TaskEnvelope::new(routing_key, payload.clone());
        self.publish("", routing_key, &envelope.handle, &envelope).await?;
        Ok(envelope.handle)
    }

    async fn cancel(&self, handle: &str, signal: CancelSignal) -> SchedulerResult<()> {
        let message = CancelMessage::new(handle, signal);
        self.publish(&self.config.control_exchange, "", handle, &message)
            .await
    }
}
