mod common;

use common::ShopBuilder;
use segment_core::{
    config::AnalyticsConfig,
    error::{AnalyticsError, AnalyticsResult},
    relations::Relations,
    service::AnalyticsService,
    source::{InMemorySource, RecordSource},
    store::{KeyValueStore, MemoryKv, SqliteKv},
    types::ArtifactKind,
    worker::{InlineExecutor, TaskExecutor, TaskStatus, ThreadExecutor},
};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Helpers ──────────────────────────────────────────────────────────────────

const HEALTHY: u8 = 0;
const FAILING: u8 = 1;
const PANICKING: u8 = 2;

/// An in-memory source whose next loads can be made to fail or panic.
struct SwitchableSource {
    inner: InMemorySource,
    mode: AtomicU8,
}

impl SwitchableSource {
    fn set(&self, mode: u8) {
        self.mode.store(mode, Ordering::SeqCst);
    }
}

impl RecordSource for SwitchableSource {
    fn load(&self) -> AnalyticsResult<Relations> {
        match self.mode.load(Ordering::SeqCst) {
            FAILING => Err(AnalyticsError::DataQuality("source offline".into())),
            PANICKING => panic!("source exploded"),
            _ => self.inner.load(),
        }
    }
}

fn make_source() -> Arc<SwitchableSource> {
    let mut shop = ShopBuilder::new();
    shop.order("alice", "SP", "2018-01-15 10:00:00", 200.0);
    shop.order("bob", "RJ", "2018-01-20 10:00:00", 15.0);
    shop.order("alice", "SP", "2018-03-02 10:00:00", 80.0);
    shop.order("carol", "MG", "2018-03-09 10:00:00", 30.0);
    Arc::new(SwitchableSource {
        inner: InMemorySource::new(shop.relations()),
        mode: AtomicU8::new(HEALTHY),
    })
}

fn make_service(
    source: Arc<SwitchableSource>,
    executor: Arc<dyn TaskExecutor>,
) -> (AnalyticsService, Arc<MemoryKv>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let kv = Arc::new(MemoryKv::new());
    let service =
        AnalyticsService::build(source, kv.clone(), AnalyticsConfig::default(), executor).unwrap();
    (service, kv)
}

fn inline() -> Arc<dyn TaskExecutor> {
    Arc::new(InlineExecutor::new())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn startup_computes_every_artifact() {
    let (service, _) = make_service(make_source(), inline());
    assert!(service.segments().unwrap_err().is_not_computed());

    let handles = service.startup();

    let kinds: Vec<ArtifactKind> = handles.iter().map(|h| h.kind).collect();
    assert_eq!(kinds, ArtifactKind::ALL.to_vec());
    for handle in &handles {
        assert_eq!(service.poll(&handle.task_id), Some(TaskStatus::Succeeded));
    }
    assert_eq!(service.segments().unwrap().payload.len(), 3);
    assert!(!service.cohort().unwrap().payload.state_list.is_empty());
    assert!(!service.timeline().unwrap().payload.by_churn.is_empty());
}

#[test]
fn startup_is_idempotent() {
    let (service, _) = make_service(make_source(), inline());

    let first = service.startup();
    let second = service.startup();

    assert_eq!(first, second);
    let next = service.trigger_recompute(ArtifactKind::Cohort);
    assert_eq!(next.run_seq, 4);
}

#[test]
fn timeline_without_segments_fails_as_stale_dependency() {
    let (service, _) = make_service(make_source(), inline());

    let handle = service.trigger_recompute(ArtifactKind::Timeline);

    let status = service.poll(&handle.task_id).unwrap();
    let detail = status.detail().expect("failed status carries detail");
    assert!(detail.contains("requires 'segments'"), "detail: {detail}");
    assert!(service.timeline().unwrap_err().is_not_computed());
}

#[test]
fn failed_run_keeps_previous_artifact() {
    let source = make_source();
    let (service, _) = make_service(source.clone(), inline());
    service.startup();
    let before = service.segments().unwrap();

    source.set(FAILING);
    let handle = service.trigger_recompute(ArtifactKind::Segments);

    let status = service.poll(&handle.task_id).unwrap();
    assert!(status.detail().unwrap().contains("source offline"));
    let after = service.segments().unwrap();
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(after.payload, before.payload);
}

#[test]
fn panicking_run_is_reported_as_failed() {
    let source = make_source();
    let (service, _) = make_service(source.clone(), inline());

    source.set(PANICKING);
    let handle = service.trigger_recompute(ArtifactKind::Cohort);

    match service.poll(&handle.task_id) {
        Some(TaskStatus::Failed { detail }) => assert!(detail.contains("source exploded"), "detail: {detail}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(service.cohort().unwrap_err().is_not_computed());
}

#[test]
fn unknown_task_polls_as_none() {
    let (service, _) = make_service(make_source(), inline());
    assert_eq!(service.poll("no-such-task"), None);
}

#[test]
fn segments_timestamp_appears_after_first_run() {
    let (service, _) = make_service(make_source(), inline());
    assert_eq!(service.segments_updated_at().unwrap(), None);

    service.trigger_recompute(ArtifactKind::Segments);

    let ts = service.segments_updated_at().unwrap().unwrap();
    assert_eq!(ts, service.segments().unwrap().updated_at);
}

/// Background threads: the startup timeline run waits for segmentation.
#[test]
fn thread_executor_runs_startup_in_background() {
    let (service, _) = make_service(make_source(), Arc::new(ThreadExecutor::new()));

    let handles = service.startup();

    for handle in &handles {
        let status = service.wait(&handle.task_id, Some(Duration::from_secs(30)));
        assert_eq!(status, Some(TaskStatus::Succeeded), "{:?} run", handle.kind);
    }
    assert_eq!(service.timeline().unwrap().payload.by_churn.len(), 2 * 3);
}

#[test]
fn overlapping_runs_leave_the_newest_sequence_stored() {
    let (service, kv) = make_service(make_source(), Arc::new(ThreadExecutor::new()));

    let a = service.trigger_recompute(ArtifactKind::Segments);
    let b = service.trigger_recompute(ArtifactKind::Segments);
    for handle in [&a, &b] {
        service.wait(&handle.task_id, Some(Duration::from_secs(30)));
    }

    let stored = kv.get("meta:segments_run_seq").unwrap().unwrap();
    assert_eq!(stored, b.run_seq.to_string());
    assert!(b.run_seq > a.run_seq);
}

/// A second process on the same cache file continues the run sequence, so
/// its results replace the first process's instead of being dropped.
#[test]
fn restart_on_persistent_cache_replaces_previous_artifacts() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let open = || -> Arc<dyn KeyValueStore> {
        let kv = SqliteKv::open(path.to_str().unwrap()).unwrap();
        kv.migrate().unwrap();
        Arc::new(kv)
    };

    let first_last_seq = {
        let service =
            AnalyticsService::build(make_source(), open(), AnalyticsConfig::default(), inline())
                .unwrap();
        service.startup();
        for _ in 0..3 {
            service.trigger_recompute(ArtifactKind::Segments);
        }
        service.trigger_recompute(ArtifactKind::Segments).run_seq
    };

    let mut shop = ShopBuilder::new();
    shop.order("alice", "SP", "2018-01-15 10:00:00", 200.0);
    shop.order("bob", "RJ", "2018-01-20 10:00:00", 15.0);
    shop.order("carol", "MG", "2018-03-09 10:00:00", 30.0);
    shop.order("dave", "BA", "2018-04-11 10:00:00", 55.0);
    let source = Arc::new(InMemorySource::new(shop.relations()));
    let service =
        AnalyticsService::build(source, open(), AnalyticsConfig::default(), inline()).unwrap();

    let handles = service.startup();

    assert!(handles[0].run_seq > first_last_seq, "sequence restarted at {}", handles[0].run_seq);
    for handle in &handles {
        assert_eq!(service.poll(&handle.task_id), Some(TaskStatus::Succeeded), "{:?} run", handle.kind);
    }
    let segments = service.segments().unwrap().payload;
    assert_eq!(segments.len(), 4);
    assert!(segments.iter().any(|r| r.customer_unique_id == "dave"));
    assert!(service.cohort().unwrap().payload.state_list.contains(&"BA".to_string()));
}
