//! # Aggregator
//! One aggregation run: fan out to every registered source, merge into the store,
//! record the outcome in `RefreshState`.
//!
//! - Each fetch is bounded by `min(fetch_timeout, deadline)` measured from run start,
//!   so one slow source can neither stall its siblings nor the run.
//! - Failed sources contribute zero items and land in `source_errors`.
//! - The run is a failure only when every source failed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::time::{timeout_at, Instant};

use crate::error::PipelineError;
use crate::ingest::{ensure_metrics_described, FeedFetcher};
use crate::refresh::RefreshState;
use crate::sources::SourceRegistry;
use crate::store::ArticleStore;

/// Outcome of one `run_once`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshResult {
    pub articles_added: usize,
    pub articles_updated: usize,
    /// Items returned by all sources, duplicates included.
    pub items_seen: usize,
    pub source_errors: Vec<PipelineError>,
    pub fetched_at: DateTime<Utc>,
}

impl RefreshResult {
    pub fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self {
            articles_added: 0,
            articles_updated: 0,
            items_seen: 0,
            source_errors: Vec::new(),
            fetched_at,
        }
    }
}

pub struct Aggregator {
    registry: Arc<SourceRegistry>,
    fetcher: Arc<dyn FeedFetcher>,
    store: Arc<ArticleStore>,
    state: Arc<RefreshState>,
    fetch_timeout: Duration,
    deadline: Duration,
}

impl Aggregator {
    pub fn new(
        registry: Arc<SourceRegistry>,
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<ArticleStore>,
        state: Arc<RefreshState>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            store,
            state,
            fetch_timeout: Duration::from_secs(10),
            deadline: Duration::from_secs(30),
        }
    }

    /// Per-source timeout and global run deadline.
    pub fn with_timeouts(mut self, fetch_timeout: Duration, deadline: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self.deadline = deadline;
        self
    }

    pub async fn run_once(&self) -> RefreshResult {
        ensure_metrics_described();
        let started = Instant::now();
        let run_deadline = started + self.deadline;
        let per_source = (started + self.fetch_timeout).min(run_deadline);
        let fetched_at = Utc::now();

        let fetches = self.registry.iter().map(|src| {
            let fetcher = Arc::clone(&self.fetcher);
            async move {
                let out = match timeout_at(per_source, fetcher.fetch(src)).await {
                    Ok(r) => r,
                    Err(_) => {
                        tracing::warn!(target: "ingest", source = %src.id, "feed fetch timed out");
                        Err(PipelineError::fetch(&src.id, "timed out"))
                    }
                };
                (src, out)
            }
        });
        let outcomes = join_all(fetches).await;

        let mut result = RefreshResult::empty(fetched_at);
        for (src, out) in outcomes {
            match out {
                Ok(items) => {
                    result.items_seen += items.len();
                    let stats = self.store.merge(&src.id, items, fetched_at);
                    result.articles_added += stats.added;
                    result.articles_updated += stats.updated;
                }
                Err(e) => {
                    counter!("feed_fetch_errors_total").increment(1);
                    result.source_errors.push(e);
                }
            }
        }

        counter!("aggregate_runs_total").increment(1);
        counter!("aggregate_articles_added_total").increment(result.articles_added as u64);
        gauge!("store_articles").set(self.store.len() as f64);
        gauge!("refresh_last_run_ts").set(Utc::now().timestamp() as f64);

        self.state.record_run(&result, self.registry.len());

        tracing::info!(
            target: "refresh",
            added = result.articles_added,
            updated = result.articles_updated,
            failed_sources = result.source_errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregation run finished"
        );
        result
    }
}
