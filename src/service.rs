//! # Service facade
//! The operations exposed to the presentation layer, wired over the pipeline parts.
//! Every read answers from in-memory state; nothing here waits on a fetch or an oracle call.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::aggregator::Aggregator;
use crate::classify::{
    ClassificationCache, ClassificationStatus, Classifier, ClassifierWorker, DynOracle,
    WorkerSettings,
};
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::ingest::FeedFetcher;
use crate::query::{query, ArticlePage, QueryParams};
use crate::refresh::{RefreshAck, RefreshScheduler, RefreshState};
use crate::sources::{Source, SourceRegistry};
use crate::store::ArticleStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub in_progress: bool,
    pub article_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceList {
    pub sources: Vec<Source>,
    pub total: usize,
}

#[derive(Clone)]
pub struct NewsService {
    registry: Arc<SourceRegistry>,
    store: Arc<ArticleStore>,
    state: Arc<RefreshState>,
    scheduler: Arc<RefreshScheduler>,
    classifier: Arc<Classifier>,
}

impl NewsService {
    /// Wire store, aggregator, scheduler and classifier. The returned worker is not running
    /// yet; hand it to `start_background` (or spawn it yourself).
    pub fn wire(
        registry: SourceRegistry,
        fetcher: Arc<dyn FeedFetcher>,
        oracle: DynOracle,
        cache: Arc<ClassificationCache>,
        cfg: &AppConfig,
    ) -> (Self, ClassifierWorker) {
        let registry = Arc::new(registry);
        let store = Arc::new(ArticleStore::new());
        let state = Arc::new(RefreshState::new());

        let settings = WorkerSettings {
            spacing: cfg.classifier.spacing(),
            call_timeout: cfg.classifier.call_timeout(),
            daily_limit: cfg.classifier.daily_limit,
        };
        let (classifier, worker) = Classifier::new(Arc::clone(&store), cache, oracle, settings);

        let aggregator = Aggregator::new(
            Arc::clone(&registry),
            fetcher,
            Arc::clone(&store),
            Arc::clone(&state),
        )
        .with_timeouts(cfg.refresh.fetch_timeout(), cfg.refresh.deadline());

        let scheduler = RefreshScheduler::new(
            Arc::new(aggregator),
            Some(Arc::clone(&classifier)),
            Arc::clone(&state),
            cfg.refresh.interval(),
        );

        let svc = Self {
            registry,
            store,
            state,
            scheduler,
            classifier,
        };
        (svc, worker)
    }

    /// Spawn the classification worker, the refresh loop (first run immediately) and the sweeper.
    pub fn start_background(
        &self,
        worker: ClassifierWorker,
        sweep_every: Duration,
    ) -> Vec<JoinHandle<()>> {
        vec![
            worker.spawn(),
            Arc::clone(&self.scheduler).spawn(),
            self.classifier.spawn_sweeper(sweep_every),
        ]
    }

    pub fn list_articles(&self, params: &QueryParams) -> Result<ArticlePage, PipelineError> {
        let q = params.parse(&self.registry)?;
        let snapshot = self.store.snapshot();
        Ok(query(&snapshot, &q))
    }

    pub fn refresh_now(&self) -> RefreshAck {
        self.scheduler.refresh_now()
    }

    pub fn classification_status(&self) -> ClassificationStatus {
        self.classifier.status()
    }

    pub fn health(&self) -> Health {
        let s = self.state.snapshot();
        Health {
            last_refresh_at: s.last_refresh_at,
            last_attempt_at: s.last_attempt_at,
            last_error: s.last_error.map(|e| e.to_string()),
            in_progress: s.in_progress,
            article_count: self.store.len(),
        }
    }

    pub fn sources(&self) -> SourceList {
        let sources: Vec<Source> = self.registry.iter().cloned().collect();
        SourceList {
            total: sources.len(),
            sources,
        }
    }

    pub fn scheduler(&self) -> &Arc<RefreshScheduler> {
        &self.scheduler
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    pub fn store(&self) -> &Arc<ArticleStore> {
        &self.store
    }
}
