//! 需要本地 Docker，默认忽略：`cargo test -p recon-testing-utils -- --ignored`

use recon_core::{
    models::{DedupRecord, MonitorScopeType, TaskStatus},
    traits::{
        AssetBaselineReader, AssetBaselineWriter, DedupRepository, DomainRecord, IpRecord,
        MonitorJobRepository, TaskRepository, WihRecord,
    },
};
use recon_testing_utils::{DocumentStoreTestContainer, MonitorJobBuilder, TaskBuilder};
use serde_json::json;

#[tokio::test]
#[ignore]
async fn test_task_documents_round_trip() {
    let container = DocumentStoreTestContainer::new().await.unwrap();
    let store = &container.store;

    let task = TaskBuilder::new().build();
    TaskRepository::insert(store, &task).await.unwrap();
    store.set_queue_handle(&task.id, "handle-9").await.unwrap();

    let stored = TaskRepository::get(store, &task.id).await.unwrap().unwrap();
    assert_eq!(stored.queue_handle.as_deref(), Some("handle-9"));
    assert_eq!(stored.status, TaskStatus::Waiting);

    assert!(!store.delete_if_status(&task.id, &TaskStatus::Done).await.unwrap());
    assert!(store.delete_if_status(&task.id, &TaskStatus::Waiting).await.unwrap());
    assert!(TaskRepository::get(store, &task.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_monitor_jobs_and_dedup() {
    let container = DocumentStoreTestContainer::new().await.unwrap();
    let store = &container.store;

    let running = MonitorJobBuilder::new("s1", "x.com", MonitorScopeType::Domain).build();
    let stopped = MonitorJobBuilder::new("s1", "y.com", MonitorScopeType::Domain)
        .stopped()
        .build();
    MonitorJobRepository::insert(store, &running).await.unwrap();
    MonitorJobRepository::insert(store, &stopped).await.unwrap();

    let found = store.find_running().await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, running.id);

    let record = DedupRecord::new("s1", "abc");
    assert!(DedupRepository::insert_if_absent(store, &record).await.unwrap());
    assert!(!DedupRepository::insert_if_absent(store, &record).await.unwrap());
    assert!(store.contains("s1", "abc").await.unwrap());
    assert!(!store.contains("s2", "abc").await.unwrap());

    container.clean_tables().await.unwrap();
    assert!(store.find_running().await.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn test_baseline_reads_asset_tables() {
    let container = DocumentStoreTestContainer::new().await.unwrap();
    let store = &container.store;

    store
        .insert("asset_ip", "ip-1", &json!({"scope_id": "s1", "ip": "10.0.0.1", "ports": [80, 443]}))
        .await
        .unwrap();
    store
        .insert("asset_domain", "d-1", &json!({"scope_id": "s1", "domain": "a.x.com"}))
        .await
        .unwrap();

    assert!(store.ips("s1").await.unwrap().contains("10.0.0.1"));
    let ports = store.ip_ports("s1").await.unwrap();
    assert!(ports.contains("10.0.0.1:80"));
    assert!(ports.contains("10.0.0.1:443"));
    assert!(store.domains("s1").await.unwrap().contains("a.x.com"));
    assert!(store.domains("s2").await.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn test_monitor_assets_written_back_once() {
    let container = DocumentStoreTestContainer::new().await.unwrap();
    let store = &container.store;

    let domains = vec![DomainRecord {
        domain: "new.x.com".to_string(),
        ips: vec!["5.6.7.8".parse().unwrap()],
    }];
    store.add_domains("s1", &domains).await.unwrap();
    store.add_domains("s1", &domains).await.unwrap();
    assert!(store.domains("s1").await.unwrap().contains("new.x.com"));
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM asset_domain")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);

    let first = vec![IpRecord { ip: "10.0.0.1".to_string(), ports: vec![80] }];
    let later = vec![IpRecord { ip: "10.0.0.1".to_string(), ports: vec![8080] }];
    store.add_ips("s1", &first).await.unwrap();
    store.add_ips("s1", &later).await.unwrap();
    let ports = store.ip_ports("s1").await.unwrap();
    assert!(ports.contains("10.0.0.1:80"));
    assert!(ports.contains("10.0.0.1:8080"));

    store.add_sites("s1", &["https://a.x.com".to_string()]).await.unwrap();
    assert!(store.sites("s1").await.unwrap().contains("https://a.x.com"));

    let record = WihRecord {
        record_type: "api_key".to_string(),
        content: "AKIA0000".to_string(),
        site: "https://a.x.com".to_string(),
    };
    store.add_wih("s1", std::slice::from_ref(&record)).await.unwrap();
    assert!(store.wih_hashes("s1").await.unwrap().contains(&record.fnv_hash()));
    assert!(store.wih_hashes("s2").await.unwrap().is_empty());
}
