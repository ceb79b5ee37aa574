use std::collections::HashMap;
use std::sync::Arc;

use recon_core::{
    models::{TaskKind, TaskPayload},
    traits::TaskHandler,
    SchedulerError, SchedulerResult,
};
use tracing::{debug, info};

/// 任务处理器注册表
///
/// 每种任务类型只绑定一个处理器，后注册的覆盖先注册的。
/// 未注册类型的任务直接返回 [`SchedulerError::UnknownKind`]。
#[derive(Default)]
pub struct TaskHandlerRegistry {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl TaskHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        let kind = handler.kind();
        if self.handlers.insert(kind, handler).is_some() {
            info!("任务处理器 {} 已被替换", kind);
        } else {
            debug!("注册任务处理器: {}", kind);
        }
    }

    pub fn get(&self, kind: TaskKind) -> SchedulerResult<Arc<dyn TaskHandler>> {
        self.handlers
            .get(&kind)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownKind(kind.to_string()))
    }

    pub fn contains(&self, kind: TaskKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// 已注册的任务类型，按固定顺序返回
    pub fn kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<TaskKind> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// 按负载的任务类型分派到对应处理器
    pub async fn dispatch(&self, payload: &TaskPayload) -> SchedulerResult<()> {
        let handler = self.get(payload.kind)?;
        handler.execute(payload).await
    }
}
