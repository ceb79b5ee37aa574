use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use recon_core::{
    models::{CancelSignal, TaskPayload, TaskStatus},
    traits::{ScanOutcome, ScanPipeline, TaskQueueGateway, TaskRepository},
    SchedulerResult,
};
use recon_infrastructure::{InMemoryStore, InMemoryTaskQueue, MetricsCollector};
use recon_testing_utils::{StaticDnsResolver, StaticScanPipeline, TaskBuilder, TestEnv};
use recon_worker::{
    DedupStore, ExecutorContext, MonitorDiffEngine, MonitorNotifier, TaskConsumer,
    TaskHandlerRegistry,
};

/// 永远不会结束的扫描
struct HangingPipeline;

#[async_trait]
impl ScanPipeline for HangingPipeline {
    async fn run(&self, _payload: &TaskPayload) -> SchedulerResult<ScanOutcome> {
        futures::future::pending().await
    }
}

fn consumer(store: Arc<InMemoryStore>, pipeline: Arc<dyn ScanPipeline>) -> Arc<TaskConsumer> {
    let metrics = Arc::new(MetricsCollector::new());
    let context = Arc::new(ExecutorContext {
        tasks: store.clone(),
        monitor_jobs: store.clone(),
        pipeline,
        diff: Arc::new(MonitorDiffEngine::new(
            store.clone(),
            Arc::new(StaticDnsResolver::new()),
        )),
        dedup: Arc::new(DedupStore::new(store.clone(), metrics.clone())),
        baseline_writer: store.clone(),
        notifier: Arc::new(MonitorNotifier::new(Vec::new(), metrics.clone())),
        metrics: metrics.clone(),
    });
    let registry = Arc::new(TaskHandlerRegistry::with_scan_handlers(context));
    Arc::new(TaskConsumer::new(registry, store, 2, "test-worker", metrics))
}

async fn status_of(store: &InMemoryStore, id: &str) -> TaskStatus {
    TaskRepository::get(store, id).await.unwrap().unwrap().status
}

#[tokio::test]
async fn test_local_queue_executes_tasks() {
    let store = Arc::new(InMemoryStore::new());
    let queue = Arc::new(InMemoryTaskQueue::new());
    let consumer = consumer(store.clone(), Arc::new(StaticScanPipeline::default()));
    assert!(consumer.consumer_tag().starts_with("test-worker-"));

    let tasks = queue.take_receiver().await.unwrap();
    let control = queue.take_control_receiver().await.unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = consumer.clone();
    let handle = tokio::spawn(async move { worker.run_local(tasks, control, shutdown_rx).await });

    let task = TaskBuilder::new().build();
    TaskRepository::insert(store.as_ref(), &task).await.unwrap();
    queue
        .enqueue("arltask.domain_task", &TaskPayload::from(&task))
        .await
        .unwrap();

    let done = TestEnv::wait_for(
        || {
            let store = store.clone();
            let id = task.id.clone();
            async move { status_of(&store, &id).await == TaskStatus::Done }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(done);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_cancel_aborts_running_task() {
    let store = Arc::new(InMemoryStore::new());
    let queue = Arc::new(InMemoryTaskQueue::new());
    let consumer = consumer(store.clone(), Arc::new(HangingPipeline));

    let tasks = queue.take_receiver().await.unwrap();
    let control = queue.take_control_receiver().await.unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = consumer.clone();
    let join = tokio::spawn(async move { worker.run_local(tasks, control, shutdown_rx).await });

    let task = TaskBuilder::new().build();
    TaskRepository::insert(store.as_ref(), &task).await.unwrap();
    let handle = queue
        .enqueue("arltask.domain_task", &TaskPayload::from(&task))
        .await
        .unwrap();

    let started = TestEnv::wait_for(
        || {
            let store = store.clone();
            let id = task.id.clone();
            async move { status_of(&store, &id).await == TaskStatus::Running }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(started);
    assert!(consumer.is_running(&handle).await);

    queue.cancel(&handle, CancelSignal::Term).await.unwrap();
    let cancelled = TestEnv::wait_for(
        || {
            let consumer = consumer.clone();
            let handle = handle.clone();
            async move { !consumer.is_running(&handle).await }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(cancelled);
    assert_eq!(consumer.running_count().await, 0);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), join)
        .await
        .expect("worker did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_aborts_in_flight_tasks() {
    let store = Arc::new(InMemoryStore::new());
    let consumer = consumer(store.clone(), Arc::new(HangingPipeline));

    let task = TaskBuilder::new().build();
    TaskRepository::insert(store.as_ref(), &task).await.unwrap();
    let envelope = recon_core::models::TaskEnvelope::new("arltask.domain_task", TaskPayload::from(&task));

    let join = consumer.spawn(envelope).await.unwrap();
    assert_eq!(consumer.running_count().await, 1);

    let started = TestEnv::wait_for(
        || {
            let store = store.clone();
            let id = task.id.clone();
            async move { status_of(&store, &id).await == TaskStatus::Running }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(started);

    assert_eq!(consumer.abort_all().await, 1);
    let result = tokio::time::timeout(Duration::from_secs(5), join).await.unwrap();
    assert!(result.unwrap_err().is_cancelled());

    let stored = TaskRepository::get(store.as_ref(), &task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Error);
    assert!(stored.end_time.is_some());
}

#[tokio::test]
async fn test_stopping_worker_leaves_no_running_task() {
    let store = Arc::new(InMemoryStore::new());
    let queue = Arc::new(InMemoryTaskQueue::new());
    let consumer = consumer(store.clone(), Arc::new(HangingPipeline));

    let tasks = queue.take_receiver().await.unwrap();
    let control = queue.take_control_receiver().await.unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = consumer.clone();
    let join = tokio::spawn(async move { worker.run_local(tasks, control, shutdown_rx).await });

    let task = TaskBuilder::new().build();
    TaskRepository::insert(store.as_ref(), &task).await.unwrap();
    queue
        .enqueue("arltask.domain_task", &TaskPayload::from(&task))
        .await
        .unwrap();

    let started = TestEnv::wait_for(
        || {
            let store = store.clone();
            let id = task.id.clone();
            async move { status_of(&store, &id).await == TaskStatus::Running }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(started);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), join)
        .await
        .expect("worker did not stop")
        .unwrap();

    assert_eq!(consumer.running_count().await, 0);
    assert_eq!(status_of(&store, &task.id).await, TaskStatus::Error);
}
