mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use common::{init_logging, open, wait_for, Call, FakeBackend};
use pretty_assertions::assert_eq;
use sifter_core::{FilterField, JobStatus, ResultRow, RowKey, RunMode, StatusReply};
use sifter_engine::{FileStore, Origin};
use tempfile::TempDir;

fn row(ticker: &str, date: &str) -> ResultRow {
    ResultRow {
        ticker: ticker.to_string(),
        date: date.to_string(),
        values: BTreeMap::new(),
    }
}

#[tokio::test(start_paused = true)]
async fn field_edits_reach_sibling_contexts() {
    init_logging();
    let backend = FakeBackend::new();
    let origin = Origin::in_memory();
    let a = open(&origin, &backend);
    let b = open(&origin, &backend);

    a.set_field(FilterField::FromDate("2026-02-01".to_string()));
    a.set_field(FilterField::RunMode(RunMode::Job));

    let seen = wait_for(&b, |s| s.filters.run_mode == RunMode::Job).await;
    assert_eq!(seen.filters.from_date, "2026-02-01");
    assert_eq!(a.snapshot().filters, seen.filters);
}

#[tokio::test(start_paused = true)]
async fn concurrent_edits_of_different_fields_both_survive() {
    init_logging();
    let backend = FakeBackend::new();
    let origin = Origin::in_memory();
    let a = open(&origin, &backend);
    let b = open(&origin, &backend);

    a.set_field(FilterField::Tickers("AAPL".to_string()));
    b.set_field(FilterField::Metric("volume".to_string()));

    for ctx in [&a, &b] {
        let state = wait_for(ctx, |s| s.filters.tickers == "AAPL" && s.filters.metric == "volume")
            .await;
        assert_eq!(state.filters.tickers, "AAPL");
    }

    let c = open(&origin, &backend);
    let restored = c.snapshot().filters;
    assert_eq!(restored.tickers, "AAPL");
    assert_eq!(restored.metric, "volume");
}

#[tokio::test(start_paused = true)]
async fn query_results_and_selection_are_shared() {
    init_logging();
    let backend = FakeBackend::new().with_rows(vec![row("AAPL", "2026-01-02")]);
    let origin = Origin::in_memory();
    let a = open(&origin, &backend);
    let b = open(&origin, &backend);

    a.run_query();
    let state = wait_for(&b, |s| !s.query.rows.is_empty()).await;
    assert!(!state.query.loading);

    b.select(RowKey::new("AAPL", "2026-01-02"));
    let state = wait_for(&a, |s| s.selection.is_some()).await;
    assert_eq!(state.selection, Some(RowKey::new("AAPL", "2026-01-02")));
    assert_eq!(backend.count(&Call::Query), 1);
}

#[tokio::test(start_paused = true)]
async fn errors_stay_in_the_context_that_hit_them() {
    init_logging();
    let backend = FakeBackend::new().failing_query();
    let origin = Origin::in_memory();
    let a = open(&origin, &backend);
    let b = open(&origin, &backend);

    a.run_query();
    let failed = wait_for(&a, |s| s.query.error.is_some()).await;
    assert!(!failed.query.loading);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let sibling = b.snapshot();
    assert!(!sibling.query.loading);
    assert_eq!(sibling.query.error, None);
}

#[tokio::test(start_paused = true)]
async fn sibling_observes_job_without_polling_it() {
    init_logging();
    let backend = FakeBackend::new().with_job_ids(&["J1"]);
    let origin = Origin::in_memory();
    let a = open(&origin, &backend);
    let b = open(&origin, &backend);

    a.start_job();
    let seen = wait_for(&b, |s| s.job.is_running()).await;
    assert_eq!(seen.job.request_id.as_deref(), Some("J1"));

    a.close().await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    // A context open while the job started never polls it.
    assert_eq!(backend.count(&Call::Status("J1".to_string())), 0);
}

#[tokio::test(start_paused = true)]
async fn closed_context_leaves_no_loading_flag_behind() {
    init_logging();
    let backend = FakeBackend::new().with_query_delay(Duration::from_secs(10));
    let origin = Origin::in_memory();
    let a = open(&origin, &backend);
    let b = open(&origin, &backend);

    a.run_query();
    wait_for(&a, |s| s.query.loading).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!b.snapshot().query.loading);

    a.close().await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!b.snapshot().query.loading);
    assert!(!open(&origin, &backend).snapshot().query.loading);
}

#[tokio::test(start_paused = true)]
async fn reopened_context_watches_a_job_its_sibling_polls() {
    init_logging();
    let running = |progress| StatusReply::new(JobStatus::Running, Some(progress), None);
    let polling = FakeBackend::new().with_job_ids(&["J1"]).script_status(
        "J1",
        vec![
            running(0.1),
            running(0.2),
            running(0.3),
            running(0.4),
            running(0.5),
            running(0.6),
            StatusReply::new(JobStatus::Done, None, None),
        ],
    );
    let watching = FakeBackend::new();
    let origin = Origin::in_memory();
    let a = open(&origin, &polling);

    a.start_job();
    wait_for(&a, |s| s.job.is_running()).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let c = open(&origin, &watching);
    assert!(c.snapshot().job.loading);

    let seen = wait_for(&c, |s| s.job.progress >= 0.5).await;
    assert_eq!(seen.job.status, Some(JobStatus::Running));
    assert_eq!(watching.count(&Call::Status("J1".to_string())), 0);

    let done = wait_for(&c, |s| s.job.result.is_some()).await;
    assert_eq!(done.job.status, Some(JobStatus::Done));
    assert!(!done.job.loading);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(watching.calls(), Vec::<Call>::new());
    assert_eq!(polling.count(&Call::Result("J1".to_string())), 1);
    assert_eq!(a.snapshot().job.status, c.snapshot().job.status);
    assert_eq!(a.snapshot().job.progress, c.snapshot().job.progress);
}

#[tokio::test(start_paused = true)]
async fn reopened_context_takes_over_when_the_poller_is_gone() {
    init_logging();
    let polling = FakeBackend::new().with_job_ids(&["J1"]);
    let watching = FakeBackend::new().script_status(
        "J1",
        vec![StatusReply::new(JobStatus::Done, None, None)],
    );
    let origin = Origin::in_memory();
    let a = open(&origin, &polling);

    a.start_job();
    wait_for(&a, |s| s.job.is_running()).await;
    let c = open(&origin, &watching);
    a.close().await;

    let done = wait_for(&c, |s| s.job.result.is_some()).await;
    assert_eq!(done.job.status, Some(JobStatus::Done));
    assert_eq!(
        watching.calls(),
        vec![Call::Status("J1".to_string()), Call::Result("J1".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn sibling_job_replaces_local_poller() {
    init_logging();
    let backend = FakeBackend::new().with_job_ids(&["J1", "J2"]);
    let origin = Origin::in_memory();
    let a = open(&origin, &backend);
    let b = open(&origin, &backend);

    a.start_job();
    wait_for(&b, |s| s.job.request_id.as_deref() == Some("J1")).await;
    b.start_job();
    wait_for(&a, |s| s.job.request_id.as_deref() == Some("J2")).await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.count(&Call::Status("J1".to_string())), 0);
    assert_eq!(backend.count(&Call::Cancel("J1".to_string())), 1);
    assert_eq!(a.snapshot().job.status, Some(JobStatus::Running));
}

#[tokio::test]
async fn reload_restores_persisted_fields_only() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let backend = FakeBackend::new().with_rows(vec![row("MSFT", "2026-01-05")]);

    let origin = Origin::new(Arc::new(FileStore::new(temp.path())));
    let first = open(&origin, &backend);
    first.set_field(FilterField::Tickers("MSFT".to_string()));
    first.set_field(FilterField::MinPrice(Some(10.0)));
    first.run_query();
    let before = wait_for(&first, |s| !s.query.rows.is_empty()).await;
    first.select(RowKey::new("MSFT", "2026-01-05"));
    wait_for(&first, |s| s.selection.is_some()).await;
    first.close().await;

    // A fresh origin over the same directory, as after a restart.
    let origin = Origin::new(Arc::new(FileStore::new(temp.path())));
    let reopened = open(&origin, &backend).snapshot();

    assert_eq!(reopened.filters, before.filters);
    assert_eq!(reopened.selection, Some(RowKey::new("MSFT", "2026-01-05")));
    assert!(reopened.query.rows.is_empty());
    assert!(!reopened.query.loading);
    assert_eq!(reopened.query.error, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_backed_contexts_sync_on_a_multi_thread_runtime() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let backend = FakeBackend::new();
    let origin = Origin::new(Arc::new(FileStore::new(temp.path())));
    let a = open(&origin, &backend);
    let b = open(&origin, &backend);

    a.set_field(FilterField::Tickers("NVDA".to_string()));
    let seen = wait_for(&b, |s| s.filters.tickers == "NVDA").await;
    assert_eq!(seen.filters.tickers, "NVDA");
    a.close().await;
    b.close().await;

    let origin = Origin::new(Arc::new(FileStore::new(temp.path())));
    assert_eq!(open(&origin, &backend).snapshot().filters.tickers, "NVDA");
}
