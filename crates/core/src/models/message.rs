use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ScanOptions, Task, TaskId, TaskKind};

/// 任务队列返回的不透明句柄
pub type QueueHandle = String;

/// 下发给 Worker 的任务消息
///
/// 任务身份以存储层 id 为准，队列至少一次投递时 Worker 依据 `task_id` 去重。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskPayload {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub options: ScanOptions,
}

impl From<&Task> for TaskPayload {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            kind: task.kind,
            name: task.name.clone(),
            target: task.target.clone(),
            targets: task.targets.clone(),
            options: task.options.clone(),
        }
    }
}

/// 取消任务时发送的信号
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CancelSignal {
    #[serde(rename = "SIGTERM")]
    Term,
    #[serde(rename = "SIGKILL")]
    Kill,
}

/// 控制交换机上广播的取消消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelMessage {
    pub handle: QueueHandle,
    pub signal: CancelSignal,
    pub timestamp: DateTime<Utc>,
}

impl CancelMessage {
    pub fn new(handle: impl Into<QueueHandle>, signal: CancelSignal) -> Self {
        Self {
            handle: handle.into(),
            signal,
            timestamp: Utc::now(),
        }
    }
}

/// 队列中的任务信封
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskEnvelope {
    pub handle: QueueHandle,
    pub routing_key: String,
    pub payload: TaskPayload,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskEnvelope {
    pub fn new(routing_key: impl Into<String>, payload: TaskPayload) -> Self {
        Self {
            handle: uuid::Uuid::new_v4().to_string(),
            routing_key: routing_key.into(),
            payload,
            enqueued_at: Utc::now(),
        }
    }
}
