use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::sync::broadcast;

use recon_core::{
    config::{MessageQueueConfig, SchedulerConfig},
    models::{MonitorScopeType, NotificationFormat, NotifyOn, PushStatus},
    traits::{
        MonitorJobRepository, NotificationChannel, ScheduleRunRepository, ScheduledJobRepository,
        TaskRepository,
    },
    Blacklist,
};
use recon_dispatcher::{
    MonitorService, NotificationGate, ScheduleRunAggregator, ScheduleService, SchedulerLoop,
    TaskSubmitter, TickReport,
};
use recon_infrastructure::{InMemoryStore, MetricsCollector};
use recon_testing_utils::{
    domain_scope, test_policy, utc, MonitorJobBuilder, RecordingChannel, RecordingTaskQueue,
    ScheduleRunBuilder, ScheduledJobBuilder, TaskBuilder, TestEnv,
};

struct Fixture {
    store: Arc<InMemoryStore>,
    queue: Arc<RecordingTaskQueue>,
    channel: Arc<RecordingChannel>,
    scheduler: Arc<SchedulerLoop>,
}

async fn fixture(tick_interval: StdDuration) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    store.put_policy(test_policy("policy-1")).await;
    store.put_scope(domain_scope("s1", &["example.com"])).await;

    let queue = Arc::new(RecordingTaskQueue::new());
    let channel = Arc::new(RecordingChannel::new("dingding", NotificationFormat::Markdown));
    let metrics = Arc::new(MetricsCollector::new());
    let config = SchedulerConfig::default();

    let submitter = Arc::new(TaskSubmitter::new(
        store.clone(),
        queue.clone(),
        MessageQueueConfig::default(),
        Arc::new(Blacklist::default()),
        metrics.clone(),
    ));
    let schedules = Arc::new(ScheduleService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        submitter.clone(),
        config.clone(),
        metrics.clone(),
    ));
    let monitors = Arc::new(MonitorService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        submitter,
        config,
        metrics.clone(),
    ));
    let gate = Arc::new(NotificationGate::new(
        vec![channel.clone() as Arc<dyn NotificationChannel>],
        metrics.clone(),
    ));
    let aggregator = Arc::new(ScheduleRunAggregator::new(store.clone(), store.clone(), gate, metrics.clone()));

    let scheduler = Arc::new(SchedulerLoop::new(schedules, monitors, aggregator, tick_interval, metrics));
    Fixture {
        store,
        queue,
        channel,
        scheduler,
    }
}

#[tokio::test]
async fn test_tick_runs_all_phases() {
    let fx = fixture(StdDuration::from_secs(58)).await;
    let now = utc(2024, 3, 1, 0, 4, 40);

    let job = ScheduledJobBuilder::recurrent("*/5 * * * *").build();
    ScheduledJobRepository::insert(fx.store.as_ref(), &job).await.unwrap();

    let monitor = MonitorJobBuilder::new("s1", "a.example.com", MonitorScopeType::Domain)
        .with_next_run(Some(now - Duration::minutes(1)))
        .build();
    MonitorJobRepository::insert(fx.store.as_ref(), &monitor).await.unwrap();

    let task = TaskBuilder::new().with_id("finished-task").done().build();
    TaskRepository::insert(fx.store.as_ref(), &task).await.unwrap();
    let run = ScheduleRunBuilder::new("earlier", &["finished-task"])
        .with_notify("dingding", NotifyOn::Finished)
        .build();
    ScheduleRunRepository::insert(fx.store.as_ref(), &run).await.unwrap();

    let report = fx.scheduler.tick(now).await;
    assert_eq!(
        report,
        TickReport {
            scheduled_fired: 1,
            monitors_fired: 1,
            runs_settled: 1,
            failed_phases: 0,
        }
    );
    assert_eq!(fx.queue.enqueued_count(), 2);
    assert_eq!(fx.channel.sent_count(), 1);

    // 新触发的运行记录在同一轮中被对账，但子任务尚未结束
    let new_runs = fx.store.find_by_schedule(&job.id).await.unwrap();
    assert_eq!(new_runs.len(), 1);
    assert_eq!(new_runs[0].push_status, PushStatus::Pending);

    let second = fx.scheduler.tick(now).await;
    assert_eq!(second.scheduled_fired, 0);
    assert_eq!(second.monitors_fired, 0);
    assert_eq!(second.runs_settled, 0);
    assert_eq!(fx.queue.enqueued_count(), 2);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let fx = fixture(StdDuration::from_millis(20)).await;
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let scheduler = fx.scheduler.clone();
    let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    let job = ScheduledJobBuilder::future(chrono::Utc::now()).build();
    ScheduledJobRepository::insert(fx.store.as_ref(), &job).await.unwrap();

    let queue = fx.queue.clone();
    let fired = TestEnv::wait_for(
        || {
            let queue = queue.clone();
            async move { queue.enqueued_count() == 1 }
        },
        StdDuration::from_secs(5),
    )
    .await;
    assert!(fired);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("scheduler loop did not stop")
        .unwrap();
}
