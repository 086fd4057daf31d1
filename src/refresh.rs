//! # Refresh Scheduler
//! Drives the aggregator at startup, on a fixed interval and on demand.
//!
//! At most one run executes at a time. A request that arrives while a run is in
//! flight joins it (shared future) instead of starting a second one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::aggregator::{Aggregator, RefreshResult};
use crate::classify::Classifier;
use crate::error::PipelineError;

/// Freshness bookkeeping, readable without touching the scheduler.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshSnapshot {
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub in_progress: bool,
    pub last_error: Option<PipelineError>,
    pub last_result: Option<RefreshResult>,
}

#[derive(Debug, Default)]
pub struct RefreshState {
    inner: RwLock<RefreshSnapshot>,
}

impl RefreshState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RefreshSnapshot {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn set_in_progress(&self, on: bool) {
        self.inner
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .in_progress = on;
    }

    /// Apply a finished run. `last_refresh_at` only moves when at least one source succeeded.
    pub fn record_run(&self, result: &RefreshResult, sources_total: usize) {
        let mut s = self.inner.write().unwrap_or_else(|p| p.into_inner());
        s.last_attempt_at = Some(result.fetched_at);
        let failed = result.source_errors.len();
        if sources_total > 0 && failed >= sources_total {
            s.last_error = Some(PipelineError::AggregationFailed { failed });
        } else {
            s.last_refresh_at = Some(result.fetched_at);
            s.last_error = None;
        }
        s.last_result = Some(result.clone());
    }
}

/// Answer to an on-demand refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshAck {
    pub accepted: bool,
    pub already_in_progress: bool,
}

type SharedRun = Shared<BoxFuture<'static, RefreshResult>>;

struct InFlight {
    id: u64,
    run: SharedRun,
}

pub struct RefreshScheduler {
    aggregator: Arc<Aggregator>,
    classifier: Option<Arc<Classifier>>,
    state: Arc<RefreshState>,
    interval: Duration,
    slot: Mutex<Option<InFlight>>,
    next_id: AtomicU64,
}

/// Clears the in-flight slot when the run task ends, including by panic.
struct SlotGuard {
    scheduler: Arc<RefreshScheduler>,
    id: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.scheduler.finish(self.id);
    }
}

impl RefreshScheduler {
    pub fn new(
        aggregator: Arc<Aggregator>,
        classifier: Option<Arc<Classifier>>,
        state: Arc<RefreshState>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            aggregator,
            classifier,
            state,
            interval,
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    /// Start a run, or join the one in flight. Returns the run and whether it was started here.
    fn trigger(self: &Arc<Self>) -> (SharedRun, bool) {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(f) = slot.as_ref() {
            return (f.run.clone(), false);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.state.set_in_progress(true);

        let (tx, rx) = oneshot::channel::<RefreshResult>();
        let run = async move {
            match rx.await {
                Ok(r) => r,
                Err(_) => {
                    tracing::error!(target: "refresh", "aggregation task aborted");
                    RefreshResult::empty(Utc::now())
                }
            }
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            id,
            run: run.clone(),
        });
        // The guard may be dropped synchronously by `spawn` during shutdown.
        drop(slot);

        let guard = SlotGuard {
            scheduler: Arc::clone(self),
            id,
        };
        tokio::spawn(async move {
            let this = Arc::clone(&guard.scheduler);
            let result = this.aggregator.run_once().await;
            if result.articles_added > 0 {
                if let Some(c) = &this.classifier {
                    c.enqueue_unclassified();
                }
            }
            drop(guard);
            let _ = tx.send(result);
        });
        (run, true)
    }

    fn finish(&self, id: u64) {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        if slot.as_ref().is_some_and(|f| f.id == id) {
            *slot = None;
            self.state.set_in_progress(false);
        }
    }

    /// Non-blocking trigger. A request during a run is coalesced into that run.
    pub fn refresh_now(self: &Arc<Self>) -> RefreshAck {
        let (_, started) = self.trigger();
        if !started {
            tracing::debug!(target: "refresh", "refresh request coalesced into in-flight run");
        }
        RefreshAck {
            accepted: true,
            already_in_progress: !started,
        }
    }

    /// Trigger (or join) a run and wait for its result.
    pub async fn refresh_and_wait(self: &Arc<Self>) -> RefreshResult {
        let (run, _) = self.trigger();
        run.await
    }

    /// Periodic loop: first run immediately, then every `interval`. Never exits on failure.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let result = self.refresh_and_wait().await;
                for e in &result.source_errors {
                    tracing::debug!(target: "refresh", error = %e, "source failed this run");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::StaticFeedFetcher;
    use crate::sources::{Source, SourceRegistry};
    use crate::store::ArticleStore;

    fn scheduler() -> (Arc<RefreshScheduler>, Arc<RefreshState>) {
        let registry =
            SourceRegistry::new(vec![Source::new("a", "A", "http://a.test/feed")]).unwrap();
        let state = Arc::new(RefreshState::new());
        let aggregator = Aggregator::new(
            Arc::new(registry),
            Arc::new(StaticFeedFetcher::new(15)),
            Arc::new(ArticleStore::new()),
            state.clone(),
        );
        let sched = RefreshScheduler::new(
            Arc::new(aggregator),
            None,
            state.clone(),
            Duration::from_secs(60),
        );
        (sched, state)
    }

    #[test]
    fn trigger_on_closed_runtime_releases_slot() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let handle = rt.handle().clone();
        drop(rt);
        let _enter = handle.enter();

        // The run task is dropped inside `spawn`; its guard must still clear the slot.
        let (sched, state) = scheduler();
        let ack = sched.refresh_now();
        assert!(!ack.already_in_progress);
        assert!(!state.snapshot().in_progress);
        assert!(!sched.refresh_now().already_in_progress);
    }

    #[test]
    fn total_failure_keeps_last_refresh_at() {
        let state = RefreshState::new();
        let t1 = Utc::now();
        let mut ok = RefreshResult::empty(t1);
        ok.source_errors.push(PipelineError::fetch("a", "boom"));
        state.record_run(&ok, 2);
        assert_eq!(state.snapshot().last_refresh_at, Some(t1));
        assert!(state.snapshot().last_error.is_none());

        let t2 = t1 + chrono::Duration::seconds(5);
        let mut bad = RefreshResult::empty(t2);
        bad.source_errors.push(PipelineError::fetch("a", "boom"));
        bad.source_errors.push(PipelineError::fetch("b", "boom"));
        state.record_run(&bad, 2);
        let snap = state.snapshot();
        assert_eq!(snap.last_refresh_at, Some(t1));
        assert_eq!(snap.last_attempt_at, Some(t2));
        assert_eq!(
            snap.last_error,
            Some(PipelineError::AggregationFailed { failed: 2 })
        );
    }
}
