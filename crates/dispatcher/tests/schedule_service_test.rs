use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;

use recon_core::{
    config::{MessageQueueConfig, SchedulerConfig},
    models::{NotifyOn, NotifySettings, ScheduleStatus, TaskKind, TaskTag},
    traits::{ScheduleRunRepository, ScheduledJobRepository, TaskRepository},
    Blacklist, SchedulerError,
};
use recon_dispatcher::{ScheduleService, TaskSubmitter};
use recon_infrastructure::{InMemoryStore, MetricsCollector};
use recon_testing_utils::{test_policy, utc, RecordingTaskQueue, ScheduledJobBuilder};

struct Fixture {
    store: Arc<InMemoryStore>,
    queue: Arc<RecordingTaskQueue>,
    service: ScheduleService,
}

async fn fixture() -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    store.put_policy(test_policy("policy-1")).await;
    let queue = Arc::new(RecordingTaskQueue::new());
    let metrics = Arc::new(MetricsCollector::new());

    let submitter = Arc::new(TaskSubmitter::new(
        store.clone(),
        queue.clone(),
        MessageQueueConfig::default(),
        Arc::new(Blacklist::default()),
        metrics.clone(),
    ));
    let service = ScheduleService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        submitter,
        SchedulerConfig::default(),
        metrics,
    );

    Fixture { store, queue, service }
}

async fn load_job(store: &InMemoryStore, id: &str) -> recon_core::models::ScheduledJob {
    ScheduledJobRepository::get(store, id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_recurrent_job_respects_cooldown() {
    let fx = fixture().await;
    let now = utc(2024, 3, 1, 0, 4, 40);

    let job = ScheduledJobBuilder::recurrent("*/5 * * * *")
        .with_last_run(now - Duration::seconds(30))
        .build();
    ScheduledJobRepository::insert(fx.store.as_ref(), &job).await.unwrap();

    assert_eq!(fx.service.fire_due_jobs(now).await.unwrap(), 0);
    assert_eq!(fx.queue.enqueued_count(), 0);

    let mut job = load_job(&fx.store, &job.id).await;
    job.last_run_date = Some(now - Duration::seconds(181));
    ScheduledJobRepository::replace(fx.store.as_ref(), &job).await.unwrap();

    assert_eq!(fx.service.fire_due_jobs(now).await.unwrap(), 1);
    assert_eq!(fx.queue.enqueued_count(), 1);

    let fired = load_job(&fx.store, &job.id).await;
    assert_eq!(fired.run_number, 1);
    assert_eq!(fired.last_run_date, Some(now));
    assert_eq!(fired.next_run_date, Some(utc(2024, 3, 1, 0, 10, 0)));
    assert_eq!(fired.status, ScheduleStatus::Scheduled);
}

#[tokio::test]
async fn test_recurrent_job_outside_lookahead_waits() {
    let fx = fixture().await;
    let now = utc(2024, 3, 1, 0, 1, 0);

    let job = ScheduledJobBuilder::recurrent("*/5 * * * *").build();
    ScheduledJobRepository::insert(fx.store.as_ref(), &job).await.unwrap();

    assert_eq!(fx.service.fire_due_jobs(now).await.unwrap(), 0);
    assert_eq!(fx.queue.enqueued_count(), 0);
}

#[tokio::test]
async fn test_fired_job_creates_schedule_run() {
    let fx = fixture().await;
    let now = utc(2024, 3, 1, 0, 4, 40);

    let job = ScheduledJobBuilder::recurrent("*/5 * * * *")
        .with_name("nightly")
        .with_target("1.1.1.1 a.example.com")
        .with_notify("dingding", NotifyOn::Always)
        .build();
    ScheduledJobRepository::insert(fx.store.as_ref(), &job).await.unwrap();

    fx.service.fire_due_jobs(now).await.unwrap();

    let runs = fx.store.find_by_schedule(&job.id).await.unwrap();
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.run_number, 1);
    assert_eq!(run.task_ids.len(), 2);
    assert_eq!(run.summary.total, 2);
    assert!(run.notify_enable);
    assert_eq!(run.notify_on, NotifyOn::Always);

    let tasks = fx.store.find_by_ids(&run.task_ids).await.unwrap();
    assert_eq!(tasks.len(), 2);
    for task in &tasks {
        assert_eq!(task.name, "周期任务-nightly-1");
        assert_eq!(task.schedule_id(), Some(job.id.as_str()));
        assert_eq!(task.options["port_scan"], Value::Bool(true));
    }
    let ip_task = tasks.iter().find(|t| t.kind == TaskKind::Ip).unwrap();
    assert_eq!(ip_task.options["domain_brute"], Value::Bool(false));
}

#[tokio::test]
async fn test_future_job_fires_once_and_is_done() {
    let fx = fixture().await;
    let start = utc(2024, 3, 1, 8, 0, 0);

    let job = ScheduledJobBuilder::future(start)
        .with_name("一次性")
        .with_tag(TaskTag::RiskCruising)
        .with_target("http://a.example.com")
        .build();
    ScheduledJobRepository::insert(fx.store.as_ref(), &job).await.unwrap();

    assert_eq!(fx.service.fire_due_jobs(start - Duration::seconds(1)).await.unwrap(), 0);
    assert_eq!(fx.service.fire_due_jobs(start).await.unwrap(), 1);

    let fired = load_job(&fx.store, &job.id).await;
    assert_eq!(fired.status, ScheduleStatus::Done);
    assert_eq!(fired.next_run_date, None);
    assert_eq!(fired.run_number, 1);

    let enqueued = fx.queue.enqueued();
    assert_eq!(enqueued.len(), 1);
    assert_eq!(enqueued[0].0, "arltask.risk_cruising_task");
    assert_eq!(enqueued[0].1.name, "定时任务-一次性");
    assert_eq!(enqueued[0].1.target, "目标：1， PoC：2");

    // done 状态不再出现在扫描集合中
    assert_eq!(fx.service.fire_due_jobs(start + Duration::hours(1)).await.unwrap(), 0);
    assert_eq!(fx.queue.enqueued_count(), 1);
}

#[tokio::test]
async fn test_missing_policy_marks_job_error() {
    let fx = fixture().await;
    let start = utc(2024, 3, 1, 8, 0, 0);

    let job = ScheduledJobBuilder::future(start).with_policy("deleted").build();
    ScheduledJobRepository::insert(fx.store.as_ref(), &job).await.unwrap();

    assert_eq!(fx.service.fire_due_jobs(start).await.unwrap(), 0);

    let failed = load_job(&fx.store, &job.id).await;
    assert_eq!(failed.status, ScheduleStatus::Error);
    assert_eq!(failed.next_run_date, None);
    assert_eq!(fx.queue.enqueued_count(), 0);
}

#[tokio::test]
async fn test_invalid_cron_marks_job_error_without_affecting_others() {
    let fx = fixture().await;
    let now = utc(2024, 3, 1, 0, 4, 40);

    let broken = ScheduledJobBuilder::recurrent("not a cron").build();
    let healthy = ScheduledJobBuilder::recurrent("*/5 * * * *").build();
    ScheduledJobRepository::insert(fx.store.as_ref(), &broken).await.unwrap();
    ScheduledJobRepository::insert(fx.store.as_ref(), &healthy).await.unwrap();

    assert_eq!(fx.service.fire_due_jobs(now).await.unwrap(), 1);
    assert_eq!(load_job(&fx.store, &broken.id).await.status, ScheduleStatus::Error);
    assert_eq!(load_job(&fx.store, &healthy.id).await.run_number, 1);
}

#[tokio::test]
async fn test_add_jobs_validate_definition() {
    let fx = fixture().await;

    let err = fx
        .service
        .add_recurrent_job("a", "61 * * * *", "example.com", TaskTag::Task, "policy-1", NotifySettings::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidCron { .. }));

    let err = fx
        .service
        .add_recurrent_job("a", "0 2 * * *", "example.com", TaskTag::Task, "nope", NotifySettings::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::PolicyNotFound { .. }));

    let err = fx
        .service
        .add_recurrent_job("a", "0 2 * * *", "example.com", TaskTag::Monitor, "policy-1", NotifySettings::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTarget(_)));

    let err = fx
        .service
        .add_future_job(
            "a",
            Utc::now() - Duration::minutes(1),
            "example.com",
            TaskTag::Task,
            "policy-1",
            NotifySettings::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidStartDate { .. }));

    let job = fx
        .service
        .add_recurrent_job("a", "0 2 * * *", "example.com", TaskTag::Task, "policy-1", NotifySettings::default())
        .await
        .unwrap();
    assert_eq!(job.status, ScheduleStatus::Scheduled);
    assert!(job.next_run_date.is_some());
    assert_eq!(fx.store.find_scheduled().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_change_status_transitions() {
    let fx = fixture().await;

    let job = fx
        .service
        .add_recurrent_job("a", "0 2 * * *", "example.com", TaskTag::Task, "policy-1", NotifySettings::default())
        .await
        .unwrap();

    let stopped = fx.service.change_status(&job.id, ScheduleStatus::Stop).await.unwrap();
    assert_eq!(stopped.next_run_date, None);

    let err = fx.service.change_status(&job.id, ScheduleStatus::Stop).await.unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidStateTransition(_)));

    let resumed = fx.service.change_status(&job.id, ScheduleStatus::Scheduled).await.unwrap();
    assert!(resumed.next_run_date.is_some_and(|next| next > Utc::now()));

    let broken = ScheduledJobBuilder::recurrent("0 2 * * *")
        .with_status(ScheduleStatus::Error)
        .build();
    ScheduledJobRepository::insert(fx.store.as_ref(), &broken).await.unwrap();
    let err = fx.service.change_status(&broken.id, ScheduleStatus::Scheduled).await.unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidStateTransition(_)));

    let err = fx.service.change_status("missing", ScheduleStatus::Stop).await.unwrap_err();
    assert!(matches!(err, SchedulerError::ScheduledJobNotFound { .. }));
}

#[tokio::test]
async fn test_delete_job() {
    let fx = fixture().await;
    let job = ScheduledJobBuilder::recurrent("0 2 * * *").build();
    ScheduledJobRepository::insert(fx.store.as_ref(), &job).await.unwrap();

    fx.service.delete_job(&job.id).await.unwrap();
    assert!(matches!(
        fx.service.delete_job(&job.id).await,
        Err(SchedulerError::ScheduledJobNotFound { .. })
    ));
}
