use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use recon_core::{
    config::{AppConfig, MessageQueueType, StorageBackend},
    models::{ScanOptions, TaskStatus, TaskTag},
    traits::{DomainRecord, ScanOutcome, TaskRepository},
};
use recon_scheduler::{AppMode, Application, ShutdownManager};
use recon_testing_utils::{StaticDnsResolver, StaticScanPipeline, TestEnv};

fn memory_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.backend = StorageBackend::Memory;
    config.message_queue.r#type = MessageQueueType::InMemory;
    config.scheduler.tick_interval_seconds = 1;
    config
}

async fn build(mode: AppMode, pipeline: StaticScanPipeline) -> Arc<Application> {
    let app = Application::with_collaborators(
        memory_config(),
        mode,
        Arc::new(StaticDnsResolver::new()),
        Arc::new(pipeline),
    )
    .await
    .unwrap();
    Arc::new(app)
}

async fn status_of(app: &Application, id: &str) -> Option<TaskStatus> {
    app.stores().tasks.get(id).await.unwrap().map(|task| task.status)
}

#[tokio::test]
async fn test_embedded_worker_runs_submitted_tasks() {
    let outcome = ScanOutcome {
        domains: vec![DomainRecord {
            domain: "www.example.com".into(),
            ips: vec!["93.184.216.34".parse().unwrap()],
        }],
        ..Default::default()
    };
    let app = build(AppMode::All, StaticScanPipeline::new(outcome)).await;

    let shutdown = ShutdownManager::new();
    let runner = {
        let app = app.clone();
        let shutdown_rx = shutdown.subscribe().await;
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    let tasks = app
        .submitter()
        .submit_scan_targets("官网", "example.com 10.0.0.1", &ScanOptions::new(), TaskTag::Task)
        .await
        .unwrap();
    assert_eq!(tasks.len(), 2);

    for task in &tasks {
        let done = TestEnv::wait_for(
            || {
                let app = app.clone();
                let id = task.id.clone();
                async move { status_of(&app, &id).await == Some(TaskStatus::Done) }
            },
            Duration::from_secs(5),
        )
        .await;
        assert!(done, "task {} did not finish", task.id);
    }

    let stored = app.stores().tasks.get(&tasks[1].id).await.unwrap().unwrap();
    assert_eq!(stored.statistic["domain_cnt"], 1);

    shutdown.shutdown().await;
    assert!(shutdown.wait_with_timeout(runner, Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_dispatcher_mode_leaves_tasks_waiting() {
    let app = build(AppMode::Dispatcher, StaticScanPipeline::default()).await;

    let shutdown = ShutdownManager::new();
    let runner = {
        let app = app.clone();
        let shutdown_rx = shutdown.subscribe().await;
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    let tasks = app
        .submitter()
        .submit_scan_targets("官网", "example.com", &ScanOptions::new(), TaskTag::Task)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(status_of(&app, &tasks[0].id).await, Some(TaskStatus::Waiting));

    shutdown.shutdown().await;
    assert!(shutdown.wait_with_timeout(runner, Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_worker_cannot_run_twice() {
    let app = build(AppMode::Worker, StaticScanPipeline::default()).await;
    let (shutdown_tx, _) = broadcast::channel(1);

    let first = {
        let app = app.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(app.run(shutdown_tx.subscribe()).await.is_err());

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), first)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_stop_waiting_task_through_controller() {
    let app = build(AppMode::Dispatcher, StaticScanPipeline::default()).await;

    let tasks = app
        .submitter()
        .submit_scan_targets("官网", "example.com", &ScanOptions::new(), TaskTag::Task)
        .await
        .unwrap();
    let stopped = app.controller().stop_task(&tasks[0].id).await.unwrap();

    assert_eq!(stopped.status, TaskStatus::Stop);
    assert_eq!(status_of(&app, &tasks[0].id).await, Some(TaskStatus::Stop));
}
