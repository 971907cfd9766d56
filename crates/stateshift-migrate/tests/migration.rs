mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{payload, Faulty};
use futures::TryStreamExt;
use stateshift_migrate::{
    BulkMigrator, CancellationToken, MigrateError, MigrationProxy, MigrationStatistics,
    MigratorConfig, RecordState,
};
use stateshift_store::{all_entries, Backend, MemoryBackend};

fn stats(migrated: u64, skipped: u64, failed: u64) -> MigrationStatistics {
    MigrationStatistics {
        migrated,
        skipped,
        failed,
    }
}

async fn seed(backend: &dyn Backend, record_type: &str, keys: impl IntoIterator<Item = u32>) {
    for key in keys {
        backend
            .write(record_type, &key.to_string(), &payload(33, 806), None)
            .await
            .unwrap();
    }
}

fn build(
    source: Arc<dyn Backend>,
    destination: Arc<dyn Backend>,
    config: MigratorConfig,
) -> BulkMigrator {
    BulkMigrator::new(source, destination, config).unwrap()
}

#[tokio::test]
async fn second_pass_skips_everything() {
    let source = Arc::new(MemoryBackend::new());
    let destination = Arc::new(MemoryBackend::new());
    seed(source.as_ref(), "orders", 0..10).await;
    let migrator = build(source, destination.clone(), MigratorConfig::default());
    let cancel = CancellationToken::new();

    assert_eq!(migrator.migrate_all(&cancel).await.unwrap(), stats(10, 0, 0));
    assert_eq!(migrator.migrate_all(&cancel).await.unwrap(), stats(0, 10, 0));
    assert_eq!(destination.len(), 10);
}

#[tokio::test]
async fn preexisting_destination_record_wins() {
    let source = Arc::new(MemoryBackend::new());
    let destination = Arc::new(MemoryBackend::new());
    seed(source.as_ref(), "grain", [1, 2, 3]).await;
    destination
        .write("grain", "2", &payload(20, 30), None)
        .await
        .unwrap();

    let migrator = build(
        source.clone(),
        destination.clone(),
        MigratorConfig::default(),
    );
    let result = migrator.migrate_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(result, stats(2, 1, 0));

    let proxy = MigrationProxy::new(source, destination);
    let mut state = RecordState::default();
    proxy.read("grain", "2", &mut state).await.unwrap();
    assert_eq!(state.record, payload(20, 30));
}

#[tokio::test]
async fn full_pass_then_proxy_write_then_rerun() {
    let source = Arc::new(MemoryBackend::new());
    let destination = Arc::new(MemoryBackend::new());
    seed(source.as_ref(), "grain", [1, 2, 3]).await;
    let migrator = build(
        source.clone(),
        destination.clone(),
        MigratorConfig::default(),
    );
    let cancel = CancellationToken::new();
    assert_eq!(migrator.migrate_all(&cancel).await.unwrap(), stats(3, 0, 0));

    let proxy = MigrationProxy::new(source, destination);
    let mut state = RecordState::default();
    proxy.read("grain", "2", &mut state).await.unwrap();
    state.record = payload(20, 30);
    proxy.write("grain", "2", &mut state).await.unwrap();

    assert_eq!(migrator.migrate_all(&cancel).await.unwrap(), stats(0, 3, 0));
    proxy.read("grain", "2", &mut state).await.unwrap();
    assert_eq!(state.record, payload(20, 30));
}

#[tokio::test]
async fn one_bad_record_does_not_stop_the_pass() {
    let source = Arc::new(MemoryBackend::new());
    let destination = Faulty::new();
    seed(source.as_ref(), "orders", 0..5).await;
    destination.reject_key("3");

    let migrator = build(source, destination.clone(), MigratorConfig::default());
    let cancel = CancellationToken::new();
    assert_eq!(migrator.migrate_all(&cancel).await.unwrap(), stats(4, 0, 1));
    assert_eq!(destination.inner.len(), 4);

    // Once the destination accepts it, a rerun only copies the missing key.
    destination.accept_all();
    assert_eq!(migrator.migrate_all(&cancel).await.unwrap(), stats(1, 4, 0));
}

#[tokio::test]
async fn every_record_type_is_migrated() {
    let source = Arc::new(MemoryBackend::new());
    let destination = Arc::new(MemoryBackend::new());
    seed(source.as_ref(), "a", 0..3).await;
    seed(source.as_ref(), "b", 0..4).await;

    let migrator = build(source, destination.clone(), MigratorConfig::default());
    let result = migrator.migrate_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(result, stats(7, 0, 0));

    let copied: Vec<_> = all_entries(destination, None, 2).try_collect().await.unwrap();
    assert_eq!(copied.len(), 7);
}

#[tokio::test]
async fn small_pages_cover_every_entry() {
    let source = Arc::new(MemoryBackend::new());
    let destination = Arc::new(MemoryBackend::new());
    seed(source.as_ref(), "orders", 0..23).await;
    let config = MigratorConfig {
        page_size: 4,
        ..MigratorConfig::default()
    };

    let migrator = build(source, destination.clone(), config);
    let result = migrator.migrate_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(result, stats(23, 0, 0));
    assert_eq!(destination.len(), 23);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_copies() {
    let source = Arc::new(MemoryBackend::new());
    let destination = Faulty::new();
    seed(source.as_ref(), "orders", 0..200).await;
    for key in ["7", "70", "170"] {
        destination.reject_key(key);
    }
    destination
        .inner
        .write("orders", "42", b"already here", None)
        .await
        .unwrap();
    let config = MigratorConfig {
        concurrency: 8,
        page_size: 16,
        ..MigratorConfig::default()
    };

    let migrator = build(source, destination.clone(), config);
    let result = migrator.migrate_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(result, stats(196, 1, 3));
    assert_eq!(result.total(), 200);
    assert_eq!(
        destination.inner.read("orders", "42").await.unwrap().unwrap().record,
        b"already here"
    );
}

#[tokio::test]
async fn cancellation_returns_partial_statistics() {
    let source = Arc::new(MemoryBackend::new());
    let destination = Faulty::new();
    seed(source.as_ref(), "orders", 0..10).await;
    let cancel = CancellationToken::new();
    destination.cancel_after(3, cancel.clone());

    let migrator = build(source.clone(), destination.clone(), MigratorConfig::default());
    let partial = migrator.migrate_all(&cancel).await.unwrap();
    assert_eq!(partial, stats(3, 0, 0));
    assert_eq!(destination.inner.len(), 3);

    // A fresh pass picks up where the cancelled one stopped.
    let rerun = migrator.migrate_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(rerun, stats(7, 3, 0));
}

#[tokio::test]
async fn enumeration_failure_aborts_with_partial_statistics() {
    let source = Faulty::new();
    source.inner.write("orders", "1", b"x", None).await.unwrap();
    source.fail_scans(true);
    let destination = Arc::new(MemoryBackend::new());

    let migrator = build(source, destination.clone(), MigratorConfig::default());
    let err = migrator
        .migrate_all(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Enumeration { .. }));
    assert_eq!(err.statistics(), MigrationStatistics::default());
    assert!(destination.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_counts_every_copy_in_flight() {
    let source = Arc::new(MemoryBackend::new());
    let destination = Faulty::new();
    seed(source.as_ref(), "orders", 0..40).await;
    destination.slow_writes(Duration::from_millis(20));
    let cancel = CancellationToken::new();
    destination.cancel_after(5, cancel.clone());
    let config = MigratorConfig {
        concurrency: 4,
        page_size: 8,
        ..MigratorConfig::default()
    };

    let migrator = build(source, destination.clone(), config);
    let partial = migrator.migrate_all(&cancel).await.unwrap();

    let attempted = destination.writes.load(Ordering::SeqCst) as u64;
    assert!(partial.total() >= 5 && partial.total() < 40, "{partial}");
    assert_eq!(partial.total(), attempted);
    assert_eq!(partial.migrated, destination.inner.len() as u64);
}

#[tokio::test]
async fn enumeration_failure_still_counts_copies_in_flight() {
    let source = Faulty::new();
    seed(&source.inner, "orders", 0..8).await;
    source.fail_scans_after(1);
    let destination = Faulty::new();
    destination.slow_writes(Duration::from_millis(50));
    let config = MigratorConfig {
        concurrency: 6,
        page_size: 4,
        ..MigratorConfig::default()
    };

    let migrator = build(source, destination.clone(), config);
    let err = migrator
        .migrate_all(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Enumeration { .. }));
    assert_eq!(err.statistics(), stats(4, 0, 0));
    assert_eq!(destination.inner.len(), 4);
}
