use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use recon_core::{
    models::{
        MonitorJob, MonitorScopeType, NotificationFormat, Task, TaskKind, TaskPayload, TaskStatus,
        TaskTag,
    },
    traits::{
        AssetBaselineReader, DomainRecord, IpRecord, MonitorJobRepository, NotificationChannel,
        ScanOutcome, TaskRepository, WihRecord,
    },
    SchedulerError, SchedulerResult,
};
use recon_infrastructure::{InMemoryStore, MetricsCollector};
use recon_testing_utils::{
    FailingChannel, MonitorJobBuilder, RecordingChannel, StaticDnsResolver, StaticScanPipeline,
    TaskBuilder,
};
use recon_worker::{
    DedupStore, ExecutorContext, MonitorDiffEngine, MonitorNotifier, TaskHandlerRegistry,
};

struct Fixture {
    store: Arc<InMemoryStore>,
    pipeline: Arc<StaticScanPipeline>,
    registry: TaskHandlerRegistry,
}

fn fixture(pipeline: StaticScanPipeline, resolver: StaticDnsResolver) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    build_fixture(store.clone(), store, pipeline, resolver, Vec::new())
}

fn fixture_with_channels(
    pipeline: StaticScanPipeline,
    channels: Vec<Arc<dyn NotificationChannel>>,
) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    build_fixture(store.clone(), store, pipeline, StaticDnsResolver::new(), channels)
}

fn build_fixture(
    store: Arc<InMemoryStore>,
    monitor_jobs: Arc<dyn MonitorJobRepository>,
    pipeline: StaticScanPipeline,
    resolver: StaticDnsResolver,
    channels: Vec<Arc<dyn NotificationChannel>>,
) -> Fixture {
    let pipeline = Arc::new(pipeline);
    let metrics = Arc::new(MetricsCollector::new());

    let context = Arc::new(ExecutorContext {
        tasks: store.clone(),
        monitor_jobs,
        pipeline: pipeline.clone(),
        diff: Arc::new(MonitorDiffEngine::new(store.clone(), Arc::new(resolver))),
        dedup: Arc::new(DedupStore::new(store.clone(), metrics.clone())),
        baseline_writer: store.clone(),
        notifier: Arc::new(MonitorNotifier::new(channels, metrics.clone())),
        metrics,
    });

    Fixture {
        store,
        pipeline,
        registry: TaskHandlerRegistry::with_scan_handlers(context),
    }
}

/// 数据库不可用时的监控任务仓储
struct UnavailableMonitorJobs;

#[async_trait]
impl MonitorJobRepository for UnavailableMonitorJobs {
    async fn insert(&self, _job: &MonitorJob) -> SchedulerResult<()> {
        Err(unavailable())
    }

    async fn get(&self, _id: &str) -> SchedulerResult<Option<MonitorJob>> {
        Err(unavailable())
    }

    async fn replace(&self, _job: &MonitorJob) -> SchedulerResult<()> {
        Err(unavailable())
    }

    async fn delete(&self, _id: &str) -> SchedulerResult<bool> {
        Err(unavailable())
    }

    async fn find_running(&self) -> SchedulerResult<Vec<MonitorJob>> {
        Err(unavailable())
    }

    async fn find_by_scope(
        &self,
        _scope_id: &str,
        _scope_type: Option<MonitorScopeType>,
    ) -> SchedulerResult<Vec<MonitorJob>> {
        Err(unavailable())
    }
}

fn unavailable() -> SchedulerError {
    SchedulerError::DatabaseOperation("connection refused".to_string())
}

fn domain(name: &str, ip: &str) -> DomainRecord {
    DomainRecord {
        domain: name.to_string(),
        ips: vec![ip.parse::<IpAddr>().unwrap()],
    }
}

async fn insert(store: &InMemoryStore, task: &Task) -> TaskPayload {
    TaskRepository::insert(store, task).await.unwrap();
    TaskPayload::from(task)
}

async fn load(store: &InMemoryStore, id: &str) -> Task {
    TaskRepository::get(store, id).await.unwrap().unwrap()
}

fn monitor_task(scope_id: &str, job_id: &str, kind: TaskKind) -> Task {
    TaskBuilder::new()
        .with_kind(kind)
        .with_tag(TaskTag::Monitor)
        .with_option("scope_id", Value::String(scope_id.into()))
        .with_option("scheduler_id", Value::String(job_id.into()))
        .build()
}

#[tokio::test]
async fn test_every_kind_has_a_handler() {
    let fx = fixture(StaticScanPipeline::default(), StaticDnsResolver::new());
    assert_eq!(fx.registry.kinds(), TaskKind::ALL.to_vec());
}

#[tokio::test]
async fn test_scan_task_records_statistic_and_done() {
    let outcome = ScanOutcome {
        domains: vec![domain("a.example.com", "1.1.1.1")],
        sites: vec!["https://a.example.com".into(), "https://b.example.com".into()],
        ..Default::default()
    };
    let fx = fixture(StaticScanPipeline::new(outcome), StaticDnsResolver::new());

    let task = TaskBuilder::new().with_queue_handle("h-1").build();
    let payload = insert(&fx.store, &task).await;

    fx.registry.dispatch(&payload).await.unwrap();

    let stored = load(&fx.store, &task.id).await;
    assert_eq!(stored.status, TaskStatus::Done);
    assert!(stored.start_time.is_some());
    assert!(stored.end_time.is_some());
    assert_eq!(stored.statistic["site_cnt"], 2);
    assert_eq!(stored.statistic["domain_cnt"], 1);
    assert_eq!(stored.queue_handle.as_deref(), Some("h-1"));
}

#[tokio::test]
async fn test_pipeline_failure_marks_error() {
    let fx = fixture(StaticScanPipeline::failing("nmap exited"), StaticDnsResolver::new());

    let task = TaskBuilder::new().with_kind(TaskKind::Ip).build();
    let payload = insert(&fx.store, &task).await;

    let err = fx.registry.dispatch(&payload).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Internal(_)));

    let stored = load(&fx.store, &task.id).await;
    assert_eq!(stored.status, TaskStatus::Error);
    assert!(stored.end_time.is_some());
}

#[tokio::test]
async fn test_redelivered_or_missing_task_is_ignored() {
    let fx = fixture(StaticScanPipeline::default(), StaticDnsResolver::new());

    let done = TaskBuilder::new().done().build();
    let payload = insert(&fx.store, &done).await;
    fx.registry.dispatch(&payload).await.unwrap();

    let missing = TaskPayload::from(&TaskBuilder::new().build());
    fx.registry.dispatch(&missing).await.unwrap();

    assert!(fx.pipeline.calls().is_empty());
    assert_eq!(load(&fx.store, &done.id).await.status, TaskStatus::Done);
}

#[tokio::test]
async fn test_monitor_task_counts_only_new_assets_once() {
    let outcome = ScanOutcome {
        domains: vec![domain("new.x.com", "5.6.7.8"), domain("known.x.com", "5.6.7.9")],
        ..Default::default()
    };
    let fx = fixture(StaticScanPipeline::new(outcome), StaticDnsResolver::new());
    fx.store.add_domain_asset("s1", "known.x.com").await;

    let job = MonitorJobBuilder::new("s1", "x.com", MonitorScopeType::Domain).build();
    MonitorJobRepository::insert(fx.store.as_ref(), &job).await.unwrap();

    let first = monitor_task("s1", &job.id, TaskKind::Domain);
    let payload = insert(&fx.store, &first).await;
    fx.registry.dispatch(&payload).await.unwrap();

    let stored = load(&fx.store, &first.id).await;
    assert_eq!(stored.status, TaskStatus::Done);
    assert_eq!(stored.statistic["new_domain_cnt"], 1);
    assert_eq!(stored.statistic["wildcard_domain_cnt"], 0);

    assert_eq!(stored.new_assets["domain"], vec!["new.x.com".to_string()]);

    let baseline = fx.store.domains("s1").await.unwrap();
    assert!(baseline.contains("new.x.com"));
    assert!(baseline.contains("known.x.com"));

    let recorded = MonitorJobRepository::get(fx.store.as_ref(), &job.id).await.unwrap().unwrap();
    assert_eq!(recorded.run_number, 1);
    assert!(recorded.last_run_time.is_some());

    // 新资产已写回资产组，下一轮不再计入
    let second = monitor_task("s1", &job.id, TaskKind::Domain);
    let payload = insert(&fx.store, &second).await;
    fx.registry.dispatch(&payload).await.unwrap();

    let stored = load(&fx.store, &second.id).await;
    assert_eq!(stored.statistic["new_domain_cnt"], 0);
    assert!(stored.new_assets.is_empty());
    assert_eq!(fx.pipeline.calls().len(), 2);
}

#[tokio::test]
async fn test_ip_monitor_counts_new_ports() {
    let outcome = ScanOutcome {
        ips: vec![IpRecord {
            ip: "10.0.0.1".into(),
            ports: vec![80, 8080],
        }],
        ..Default::default()
    };
    let fx = fixture(StaticScanPipeline::new(outcome), StaticDnsResolver::new());
    fx.store.add_ip_asset("s2", "10.0.0.1", &[80]).await;

    let job = MonitorJobBuilder::new("s2", "10.0.0.1", MonitorScopeType::Ip).build();
    MonitorJobRepository::insert(fx.store.as_ref(), &job).await.unwrap();

    let task = monitor_task("s2", &job.id, TaskKind::Ip);
    let payload = insert(&fx.store, &task).await;
    fx.registry.dispatch(&payload).await.unwrap();

    let stored = load(&fx.store, &task.id).await;
    assert_eq!(stored.statistic["new_ip_cnt"], 0);
    assert_eq!(stored.statistic["new_ip_port_cnt"], 1);
    assert_eq!(stored.new_assets["ip_port"], vec!["10.0.0.1:8080".to_string()]);
    assert!(!stored.new_assets.contains_key("ip"));

    let ports = fx.store.ip_ports("s2").await.unwrap();
    assert!(ports.contains("10.0.0.1:80"));
    assert!(ports.contains("10.0.0.1:8080"));
}

#[tokio::test]
async fn test_stopped_or_deleted_monitor_is_skipped() {
    let fx = fixture(StaticScanPipeline::default(), StaticDnsResolver::new());

    let stopped = MonitorJobBuilder::new("s1", "x.com", MonitorScopeType::Domain)
        .stopped()
        .build();
    MonitorJobRepository::insert(fx.store.as_ref(), &stopped).await.unwrap();

    let task = monitor_task("s1", &stopped.id, TaskKind::Domain);
    let payload = insert(&fx.store, &task).await;
    fx.registry.dispatch(&payload).await.unwrap();

    assert_eq!(load(&fx.store, &task.id).await.status, TaskStatus::Stop);
    let unchanged = MonitorJobRepository::get(fx.store.as_ref(), &stopped.id).await.unwrap().unwrap();
    assert_eq!(unchanged.run_number, 0);

    let orphan = monitor_task("s1", "deleted-job", TaskKind::AssetSiteUpdate);
    let payload = insert(&fx.store, &orphan).await;
    fx.registry.dispatch(&payload).await.unwrap();

    assert_eq!(load(&fx.store, &orphan.id).await.status, TaskStatus::Stop);
    assert!(fx.pipeline.calls().is_empty());
}

#[tokio::test]
async fn test_externally_stopped_task_is_not_overwritten() {
    let fx = fixture(StaticScanPipeline::default(), StaticDnsResolver::new());

    let task = TaskBuilder::new().build();
    let payload = insert(&fx.store, &task).await;

    let mut stopped = load(&fx.store, &task.id).await;
    stopped.status = TaskStatus::Stop;
    TaskRepository::replace(fx.store.as_ref(), &stopped).await.unwrap();

    fx.registry.dispatch(&payload).await.unwrap();
    assert_eq!(load(&fx.store, &task.id).await.status, TaskStatus::Stop);
    assert!(fx.pipeline.calls().is_empty());
}

#[tokio::test]
async fn test_site_and_wih_monitors_write_back_new_assets() {
    let record = WihRecord {
        record_type: "api_key".into(),
        content: "AKIA0000".into(),
        site: "https://a.x.com".into(),
    };
    let outcome = ScanOutcome {
        sites: vec!["https://a.x.com/".into(), "https://b.x.com".into()],
        wih: vec![record.clone()],
        ..Default::default()
    };
    let fx = fixture(StaticScanPipeline::new(outcome), StaticDnsResolver::new());
    fx.store.add_site_asset("s1", "https://b.x.com").await;

    let job = MonitorJobBuilder::new("s1", "x.com", MonitorScopeType::Domain).build();
    MonitorJobRepository::insert(fx.store.as_ref(), &job).await.unwrap();

    let site_task = monitor_task("s1", &job.id, TaskKind::AssetSiteUpdate);
    let payload = insert(&fx.store, &site_task).await;
    fx.registry.dispatch(&payload).await.unwrap();

    let stored = load(&fx.store, &site_task.id).await;
    assert_eq!(stored.new_assets["site"], vec!["https://a.x.com".to_string()]);
    assert!(fx.store.sites("s1").await.unwrap().contains("https://a.x.com"));

    let wih_task = monitor_task("s1", &job.id, TaskKind::AssetWihUpdate);
    let payload = insert(&fx.store, &wih_task).await;
    fx.registry.dispatch(&payload).await.unwrap();

    let stored = load(&fx.store, &wih_task.id).await;
    assert_eq!(stored.statistic["new_wih_cnt"], 1);
    assert_eq!(stored.new_assets["wih"].len(), 1);
    assert!(fx.store.wih_hashes("s1").await.unwrap().contains(&record.fnv_hash()));
}

#[tokio::test]
async fn test_monitor_with_new_assets_sends_report() {
    let outcome = ScanOutcome {
        domains: vec![domain("new.x.com", "5.6.7.8")],
        ..Default::default()
    };
    let markdown = Arc::new(RecordingChannel::markdown("dingding"));
    let html = Arc::new(RecordingChannel::html("email"));
    let fx = fixture_with_channels(
        StaticScanPipeline::new(outcome),
        vec![markdown.clone() as Arc<dyn NotificationChannel>, html.clone()],
    );

    let job = MonitorJobBuilder::new("s1", "x.com", MonitorScopeType::Domain).build();
    MonitorJobRepository::insert(fx.store.as_ref(), &job).await.unwrap();

    let task = monitor_task("s1", &job.id, TaskKind::Domain);
    let payload = insert(&fx.store, &task).await;
    fx.registry.dispatch(&payload).await.unwrap();

    let sent = markdown.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, NotificationFormat::Markdown);
    assert!(sent[0].1.title.contains("资产监控"));
    assert!(sent[0].1.content.contains("new.x.com"));

    let sent = html.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, NotificationFormat::Html);
    assert!(sent[0].1.content.contains("<td>new.x.com</td>"));
}

#[tokio::test]
async fn test_monitor_without_new_assets_sends_nothing() {
    let outcome = ScanOutcome {
        domains: vec![domain("known.x.com", "5.6.7.9")],
        ..Default::default()
    };
    let channel = Arc::new(RecordingChannel::markdown("dingding"));
    let fx = fixture_with_channels(
        StaticScanPipeline::new(outcome),
        vec![channel.clone() as Arc<dyn NotificationChannel>],
    );
    fx.store.add_domain_asset("s1", "known.x.com").await;

    let job = MonitorJobBuilder::new("s1", "x.com", MonitorScopeType::Domain).build();
    MonitorJobRepository::insert(fx.store.as_ref(), &job).await.unwrap();

    let task = monitor_task("s1", &job.id, TaskKind::Domain);
    let payload = insert(&fx.store, &task).await;
    fx.registry.dispatch(&payload).await.unwrap();

    assert_eq!(load(&fx.store, &task.id).await.status, TaskStatus::Done);
    assert_eq!(channel.sent_count(), 0);

    // 普通扫描任务不推送监控报告
    let scan = TaskBuilder::new().build();
    let payload = insert(&fx.store, &scan).await;
    fx.registry.dispatch(&payload).await.unwrap();
    assert_eq!(channel.sent_count(), 0);
}

#[tokio::test]
async fn test_failed_report_does_not_fail_monitor_task() {
    let outcome = ScanOutcome {
        domains: vec![domain("new.x.com", "5.6.7.8")],
        ..Default::default()
    };
    let channel = Arc::new(FailingChannel::new("dingding"));
    let fx = fixture_with_channels(
        StaticScanPipeline::new(outcome),
        vec![channel.clone() as Arc<dyn NotificationChannel>],
    );

    let job = MonitorJobBuilder::new("s1", "x.com", MonitorScopeType::Domain).build();
    MonitorJobRepository::insert(fx.store.as_ref(), &job).await.unwrap();

    let task = monitor_task("s1", &job.id, TaskKind::Domain);
    let payload = insert(&fx.store, &task).await;
    fx.registry.dispatch(&payload).await.unwrap();

    assert_eq!(channel.attempts(), 1);
    assert_eq!(load(&fx.store, &task.id).await.status, TaskStatus::Done);
}

#[tokio::test]
async fn test_monitor_lookup_failure_marks_error() {
    let store = Arc::new(InMemoryStore::new());
    let fx = build_fixture(
        store,
        Arc::new(UnavailableMonitorJobs),
        StaticScanPipeline::default(),
        StaticDnsResolver::new(),
        Vec::new(),
    );

    let task = monitor_task("s1", "job-1", TaskKind::Domain);
    let payload = insert(&fx.store, &task).await;

    let err = fx.registry.dispatch(&payload).await.unwrap_err();
    assert!(matches!(err, SchedulerError::DatabaseOperation(_)));

    let stored = load(&fx.store, &task.id).await;
    assert_eq!(stored.status, TaskStatus::Error);
    assert!(stored.end_time.is_some());
    assert!(fx.pipeline.calls().is_empty());
}
