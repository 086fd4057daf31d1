mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{registry, rss, ScriptedFetcher, SOURCE_A_RSS, SOURCE_B_ATOM};
use secnews::aggregator::Aggregator;
use secnews::refresh::RefreshState;
use secnews::{ArticleStore, PipelineError, Severity};

fn aggregator(
    ids: &[&str],
    fetcher: ScriptedFetcher,
    fetch_timeout: Duration,
    deadline: Duration,
) -> (Aggregator, Arc<ArticleStore>, Arc<RefreshState>, Arc<ScriptedFetcher>) {
    let store = Arc::new(ArticleStore::new());
    let state = Arc::new(RefreshState::new());
    let fetcher = Arc::new(fetcher);
    let agg = Aggregator::new(
        Arc::new(registry(ids)),
        fetcher.clone(),
        store.clone(),
        state.clone(),
    )
    .with_timeouts(fetch_timeout, deadline);
    (agg, store, state, fetcher)
}

#[tokio::test]
async fn partial_success_with_one_source_timing_out() {
    let fetcher = ScriptedFetcher::new()
        .doc("a", SOURCE_A_RSS)
        .doc("b", SOURCE_B_ATOM)
        .delay("b", Duration::from_secs(5));
    let (agg, store, state, _) = aggregator(
        &["a", "b"],
        fetcher,
        Duration::from_millis(50),
        Duration::from_secs(2),
    );

    let started = std::time::Instant::now();
    let result = agg.run_once().await;
    assert!(started.elapsed() < Duration::from_secs(2), "slow source stalled the run");

    assert_eq!(store.len(), 3);
    assert_eq!(result.articles_added, 3);
    assert_eq!(result.source_errors.len(), 1);
    match &result.source_errors[0] {
        PipelineError::FetchFailed { source_id, cause } => {
            assert_eq!(source_id, "b");
            assert_eq!(cause, "timed out");
        }
        other => panic!("unexpected error {other:?}"),
    }

    let snap = state.snapshot();
    assert!(snap.last_error.is_none());
    assert_eq!(snap.last_refresh_at, Some(result.fetched_at));

    let undated = store
        .snapshot()
        .into_iter()
        .find(|a| a.title == "Vendor ships quarterly firmware update")
        .unwrap();
    assert_eq!(undated.published_at, result.fetched_at);
    assert_eq!(undated.fetched_at, result.fetched_at);
    assert!(store.snapshot().iter().all(|a| a.severity == Severity::Unclassified));
}

#[tokio::test]
async fn global_deadline_caps_per_source_timeout() {
    let fetcher = ScriptedFetcher::new()
        .doc("a", SOURCE_A_RSS)
        .doc("b", SOURCE_B_ATOM)
        .delay("b", Duration::from_secs(5));
    let (agg, store, _, _) = aggregator(
        &["a", "b"],
        fetcher,
        Duration::from_secs(30),
        Duration::from_millis(100),
    );
    let started = std::time::Instant::now();
    let result = agg.run_once().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.source_errors.len(), 1);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn rerun_with_same_feeds_is_idempotent() {
    let fetcher = ScriptedFetcher::new()
        .doc("a", SOURCE_A_RSS)
        .doc("b", SOURCE_B_ATOM);
    let (agg, store, _, fetcher) = aggregator(
        &["a", "b"],
        fetcher,
        Duration::from_secs(2),
        Duration::from_secs(5),
    );

    let first = agg.run_once().await;
    assert_eq!(first.articles_added, 5);
    let fp = store.snapshot()[0].fingerprint.clone();
    assert!(store.set_classification(&fp, Severity::High, "active exploitation"));
    let before: Vec<_> = store
        .snapshot()
        .iter()
        .map(|a| (a.fingerprint.clone(), a.severity))
        .collect();

    let second = agg.run_once().await;
    assert_eq!(second.articles_added, 0);
    assert_eq!(second.articles_updated, 0);
    assert_eq!(second.items_seen, 5);
    let after: Vec<_> = store
        .snapshot()
        .iter()
        .map(|a| (a.fingerprint.clone(), a.severity))
        .collect();
    assert_eq!(before, after);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn classified_severity_survives_changed_summary() {
    let fetcher = ScriptedFetcher::new().doc("a", &rss(&[("Ransomware wave", "first")]));
    let (agg, store, _, fetcher) = aggregator(
        &["a"],
        fetcher,
        Duration::from_secs(2),
        Duration::from_secs(5),
    );
    agg.run_once().await;
    let fp = store.snapshot()[0].fingerprint.clone();
    store.set_classification(&fp, Severity::High, "ransomware");

    fetcher.set_doc("a", &rss(&[("Ransomware wave!", "second")]));
    let r = agg.run_once().await;
    assert_eq!(r.articles_updated, 1);
    let a = store.get(&fp).unwrap();
    assert_eq!(a.summary, "second");
    assert_eq!(a.severity, Severity::High);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn all_sources_failing_sets_last_error() {
    let (agg, store, state, _) = aggregator(
        &["a", "b"],
        ScriptedFetcher::new(),
        Duration::from_secs(1),
        Duration::from_secs(2),
    );
    let r = agg.run_once().await;
    assert_eq!(r.source_errors.len(), 2);
    assert!(store.is_empty());
    let snap = state.snapshot();
    assert_eq!(
        snap.last_error,
        Some(PipelineError::AggregationFailed { failed: 2 })
    );
    assert!(snap.last_refresh_at.is_none());
    assert!(snap.last_attempt_at.is_some());
}

#[tokio::test]
async fn empty_feed_is_success() {
    let fetcher = ScriptedFetcher::new().doc("a", &rss(&[]));
    let (agg, store, state, _) = aggregator(
        &["a"],
        fetcher,
        Duration::from_secs(1),
        Duration::from_secs(2),
    );
    let r = agg.run_once().await;
    assert!(r.source_errors.is_empty());
    assert!(store.is_empty());
    assert!(state.snapshot().last_error.is_none());
    assert!(state.snapshot().last_refresh_at.is_some());
}
