use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;

use recon_core::{
    config::MessageQueueConfig,
    models::{CancelSignal, QueueHandle, TaskKind, TaskPayload, TaskStatus},
    traits::{TaskQueueGateway, TaskRepository},
    Blacklist, SchedulerError, SchedulerResult,
};
use recon_dispatcher::{TaskController, TaskSubmitter};
use recon_infrastructure::{InMemoryStore, MetricsCollector};
use recon_testing_utils::TaskBuilder;

mock! {
    pub Gateway {}

    #[async_trait]
    impl TaskQueueGateway for Gateway {
        async fn enqueue(&self, routing_key: &str, payload: &TaskPayload) -> SchedulerResult<QueueHandle>;
        async fn cancel(&self, handle: &str, signal: CancelSignal) -> SchedulerResult<()>;
    }
}

fn controller(store: Arc<InMemoryStore>, gateway: MockGateway) -> TaskController {
    let queue: Arc<dyn TaskQueueGateway> = Arc::new(gateway);
    let metrics = Arc::new(MetricsCollector::new());
    let submitter = Arc::new(TaskSubmitter::new(
        store.clone(),
        queue.clone(),
        MessageQueueConfig::default(),
        Arc::new(Blacklist::default()),
        metrics.clone(),
    ));
    TaskController::new(store, queue, submitter, metrics)
}

#[tokio::test]
async fn test_failed_cancel_keeps_task_running() {
    let store = Arc::new(InMemoryStore::new());
    let mut gateway = MockGateway::new();
    gateway
        .expect_cancel()
        .withf(|handle, signal| handle == "h-7" && *signal == CancelSignal::Term)
        .times(1)
        .returning(|_, _| Err(SchedulerError::MessageQueue("channel closed".into())));
    gateway.expect_enqueue().never();

    let task = TaskBuilder::new().running().with_queue_handle("h-7").build();
    TaskRepository::insert(store.as_ref(), &task).await.unwrap();

    let controller = controller(store.clone(), gateway);
    let err = controller.stop_task(&task.id).await.unwrap_err();
    assert!(matches!(err, SchedulerError::MessageQueue(_)));

    let stored = TaskRepository::get(store.as_ref(), &task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Running);
    assert!(stored.end_time.is_none());
}

#[tokio::test]
async fn test_restart_enqueues_once_on_kind_route() {
    let store = Arc::new(InMemoryStore::new());
    let mut gateway = MockGateway::new();
    gateway
        .expect_enqueue()
        .withf(|routing_key, payload| {
            routing_key == "arltask.ip_task" && payload.name.starts_with("重新运行-")
        })
        .times(1)
        .returning(|_, _| Ok("h-restart".to_string()));
    gateway.expect_cancel().never();

    let task = TaskBuilder::new().with_kind(TaskKind::Ip).done().build();
    TaskRepository::insert(store.as_ref(), &task).await.unwrap();

    let controller = controller(store.clone(), gateway);
    let restarted = controller.restart_task(&task.id).await.unwrap();

    assert_ne!(restarted.id, task.id);
    assert_eq!(restarted.queue_handle.as_deref(), Some("h-restart"));
    assert_eq!(restarted.status, TaskStatus::Waiting);
}
