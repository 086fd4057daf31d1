// src/classify/mod.rs
//! # Classification Cache & Worker
//!
//! Assigns a severity to every unclassified article in the background.
//!
//! - `Classifier::enqueue_unclassified` scans the store. Cache hits are written
//!   directly; misses are scheduled once per fingerprint.
//! - `ClassifierWorker::run` drains the schedule one oracle call at a time, with a
//!   minimum spacing between calls and a per-call timeout.
//! - A failed call leaves the article unclassified and unschedules it, so the next
//!   enqueue pass (after a run that adds articles, or the sweep timer) retries it.

pub mod budget;
pub mod cache;
pub mod oracle;
pub mod worker;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::store::ArticleStore;

pub use budget::DailyBudget;
pub use cache::{CachedLabel, ClassificationCache};
pub use oracle::{
    build_oracle, Classification, DisabledOracle, DynOracle, GeminiOracle, MockOracle,
    OpenAiOracle, SeverityOracle,
};
pub use worker::ClassifierWorker;

pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("classify_oracle_calls_total", "Oracle calls issued.");
        describe_counter!(
            "classify_cache_hits_total",
            "Labels applied from the classification cache."
        );
        describe_counter!(
            "classify_failures_total",
            "Oracle calls that failed, timed out or were refused by the budget."
        );
    });
}

/// `classified` iff no article remains unclassified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassificationStatus {
    pub classified: bool,
    pub classified_count: usize,
    pub total_count: usize,
}

/// Outcome of one enqueue pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnqueueReport {
    pub scheduled: usize,
    pub cache_hits: usize,
}

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub spacing: Duration,
    pub call_timeout: Duration,
    pub daily_limit: Option<u32>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            spacing: Duration::from_millis(300),
            call_timeout: Duration::from_secs(20),
            daily_limit: None,
        }
    }
}

pub struct Classifier {
    store: Arc<ArticleStore>,
    cache: Arc<ClassificationCache>,
    scheduled: Mutex<HashSet<String>>,
    tx: mpsc::UnboundedSender<String>,
    oracle_enabled: bool,
    oracle_name: &'static str,
}

impl Classifier {
    /// Build the classifier and its worker. The worker must be spawned (`worker.spawn()`)
    /// for scheduled articles to be processed.
    pub fn new(
        store: Arc<ArticleStore>,
        cache: Arc<ClassificationCache>,
        oracle: DynOracle,
        settings: WorkerSettings,
    ) -> (Arc<Self>, ClassifierWorker) {
        ensure_metrics_described();
        let (tx, rx) = mpsc::unbounded_channel();
        let classifier = Arc::new(Self {
            store,
            cache,
            scheduled: Mutex::new(HashSet::new()),
            tx,
            oracle_enabled: oracle.enabled(),
            oracle_name: oracle.name(),
        });
        let worker = ClassifierWorker::new(Arc::clone(&classifier), rx, oracle, settings);
        (classifier, worker)
    }

    pub fn store(&self) -> &Arc<ArticleStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<ClassificationCache> {
        &self.cache
    }

    pub fn oracle_name(&self) -> &'static str {
        self.oracle_name
    }

    pub fn enqueue_unclassified(&self) -> EnqueueReport {
        let mut report = EnqueueReport::default();
        for article in self.store.unclassified() {
            let fp = article.fingerprint.as_str();
            if let Some(hit) = self.cache.get(fp) {
                if self.store.set_classification(fp, hit.severity, &hit.reason) {
                    counter!("classify_cache_hits_total").increment(1);
                    report.cache_hits += 1;
                }
                continue;
            }
            if !self.oracle_enabled {
                continue;
            }
            {
                let mut set = self.scheduled.lock().unwrap_or_else(|p| p.into_inner());
                if !set.insert(fp.to_string()) {
                    continue;
                }
            }
            if self.tx.send(fp.to_string()).is_err() {
                tracing::warn!(target: "classify", "classification worker is gone; nothing scheduled");
                self.unschedule(fp);
                break;
            }
            report.scheduled += 1;
        }
        if report.scheduled > 0 || report.cache_hits > 0 {
            tracing::debug!(
                target: "classify",
                scheduled = report.scheduled,
                cache_hits = report.cache_hits,
                "enqueue pass"
            );
        }
        report
    }

    pub(crate) fn unschedule(&self, fp: &str) {
        self.scheduled
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(fp);
    }

    /// Fingerprints waiting for, or undergoing, an oracle call.
    pub fn pending(&self) -> usize {
        self.scheduled
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    pub fn status(&self) -> ClassificationStatus {
        let (classified_count, total_count) = self.store.classification_counts();
        ClassificationStatus {
            classified: classified_count == total_count,
            classified_count,
            total_count,
        }
    }

    /// Independent timer catching articles left unclassified by earlier failures.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately; the refresh run covers startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                this.enqueue_unclassified();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::RawItem;
    use crate::store::Severity;
    use chrono::Utc;

    fn seeded_store(titles: &[&str]) -> Arc<ArticleStore> {
        let store = Arc::new(ArticleStore::new());
        let items = titles
            .iter()
            .map(|t| RawItem {
                title: t.to_string(),
                summary: "s".into(),
                link: "#".into(),
                author: "Unknown".into(),
                published_at: None,
            })
            .collect();
        store.merge("a", items, Utc::now());
        store
    }

    #[test]
    fn enqueue_dedups_scheduled_fingerprints() {
        let store = seeded_store(&["one", "two"]);
        let (c, _worker) = Classifier::new(
            store,
            Arc::new(ClassificationCache::new()),
            Arc::new(MockOracle),
            WorkerSettings::default(),
        );
        assert_eq!(c.enqueue_unclassified().scheduled, 2);
        assert_eq!(c.enqueue_unclassified(), EnqueueReport::default());
        assert_eq!(c.pending(), 2);
    }

    #[test]
    fn cache_hits_bypass_the_queue() {
        let store = seeded_store(&["one"]);
        let fp = store.snapshot()[0].fingerprint.clone();
        let cache = Arc::new(ClassificationCache::new());
        cache.insert(
            &fp,
            CachedLabel {
                severity: Severity::Low,
                reason: "cached".into(),
            },
        );
        let (c, _worker) =
            Classifier::new(store, cache, Arc::new(MockOracle), WorkerSettings::default());
        let r = c.enqueue_unclassified();
        assert_eq!(r, EnqueueReport { scheduled: 0, cache_hits: 1 });
        assert!(c.status().classified);
    }

    #[test]
    fn disabled_oracle_schedules_nothing() {
        let store = seeded_store(&["one"]);
        let (c, _worker) = Classifier::new(
            store,
            Arc::new(ClassificationCache::new()),
            Arc::new(DisabledOracle),
            WorkerSettings::default(),
        );
        assert_eq!(c.enqueue_unclassified().scheduled, 0);
        assert_eq!(
            c.status(),
            ClassificationStatus {
                classified: false,
                classified_count: 0,
                total_count: 1
            }
        );
    }
}
