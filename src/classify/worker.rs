// src/classify/worker.rs
use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};

use super::{Classifier, DailyBudget, DynOracle, WorkerSettings};
use crate::classify::cache::CachedLabel;
use crate::error::PipelineError;

/// Single consumer of the classification schedule.
pub struct ClassifierWorker {
    classifier: Arc<Classifier>,
    rx: mpsc::UnboundedReceiver<String>,
    oracle: DynOracle,
    budget: Option<DailyBudget>,
    settings: WorkerSettings,
    /// Earliest instant the next oracle call may start.
    next_call: Instant,
}

impl ClassifierWorker {
    pub(super) fn new(
        classifier: Arc<Classifier>,
        rx: mpsc::UnboundedReceiver<String>,
        oracle: DynOracle,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            classifier,
            rx,
            oracle,
            budget: settings.daily_limit.map(DailyBudget::new),
            settings,
            next_call: Instant::now(),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Drains the schedule for the lifetime of the process.
    pub async fn run(mut self) {
        tracing::info!(
            target: "classify",
            oracle = self.oracle.name(),
            spacing_ms = self.settings.spacing.as_millis() as u64,
            "classification worker started"
        );
        while let Some(fp) = self.rx.recv().await {
            if let Err(e) = self.process(&fp).await {
                counter!("classify_failures_total").increment(1);
                tracing::warn!(target: "classify", error = %e, "classification failed; will retry on next pass");
            }
            self.classifier.unschedule(&fp);
        }
        tracing::info!(target: "classify", "classification worker stopped");
    }

    async fn process(&mut self, fp: &str) -> Result<(), PipelineError> {
        let store = Arc::clone(self.classifier.store());
        let cache = Arc::clone(self.classifier.cache());

        let Some(article) = store.get(fp) else {
            return Ok(());
        };
        if article.is_classified() {
            return Ok(());
        }
        if let Some(hit) = cache.get(fp) {
            if store.set_classification(fp, hit.severity, &hit.reason) {
                counter!("classify_cache_hits_total").increment(1);
            }
            return Ok(());
        }

        let failed = |cause: String| PipelineError::ClassificationFailed {
            fingerprint: fp.to_string(),
            cause,
        };

        if let Some(b) = &self.budget {
            if !b.try_acquire() {
                return Err(failed(format!(
                    "daily oracle budget of {} calls exhausted",
                    b.limit()
                )));
            }
        }

        sleep_until(self.next_call).await;
        counter!("classify_oracle_calls_total").increment(1);
        let outcome = timeout(
            self.settings.call_timeout,
            self.oracle.classify(&article.title, &article.summary),
        )
        .await;
        self.next_call = Instant::now() + self.settings.spacing;

        let label = match outcome {
            Ok(Ok(label)) => label,
            Ok(Err(e)) => return Err(failed(format!("{e:#}"))),
            Err(_) => return Err(failed("oracle call timed out".to_string())),
        };

        cache.insert(
            fp,
            CachedLabel {
                severity: label.severity,
                reason: label.reason.clone(),
            },
        );
        store.set_classification(fp, label.severity, &label.reason);
        let title_prefix: String = article.title.chars().take(50).collect();
        tracing::info!(
            target: "classify",
            severity = %label.severity,
            title = %title_prefix,
            "article classified"
        );
        Ok(())
    }
}
