use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// 停机信号管理
///
/// 调度循环和 Worker 各自订阅一份广播接收端，触发一次后全部订阅者退出。
/// 停机之后的订阅会立即收到信号。
#[derive(Clone)]
pub struct ShutdownManager {
    sender: Arc<RwLock<Option<broadcast::Sender<()>>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            sender: Arc::new(RwLock::new(Some(sender))),
        }
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        match self.sender.read().await.as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(1);
                let _ = sender.send(());
                receiver
            }
        }
    }

    /// 触发停机，重复调用无效果
    pub async fn shutdown(&self) {
        let Some(sender) = self.sender.write().await.take() else {
            debug!("停机信号已经发送过");
            return;
        };

        debug!("发送停机信号给 {} 个订阅者", sender.receiver_count());
        // 没有订阅者时发送失败，可以忽略
        let _ = sender.send(());
        info!("停机信号已发送");
    }

    pub async fn is_shutdown(&self) -> bool {
        self.sender.read().await.is_none()
    }

    /// 在限定时间内等待组件退出，返回是否按时完成
    pub async fn wait_with_timeout<F>(&self, component: F, limit: Duration) -> bool
    where
        F: Future,
    {
        match timeout(limit, component).await {
            Ok(_) => true,
            Err(_) => {
                warn!("等待组件退出超时（{}秒）", limit.as_secs());
                false
            }
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
