// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod aggregator;
pub mod api;
pub mod classify;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod query;
pub mod refresh;
pub mod service;
pub mod sources;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::aggregator::{Aggregator, RefreshResult};
pub use crate::api::router;
pub use crate::config::AppConfig;
pub use crate::error::PipelineError;
pub use crate::service::NewsService;
pub use crate::store::{Article, ArticleStore, Severity};

use std::sync::Arc;

use crate::classify::{build_oracle, ClassificationCache, ClassifierWorker};
use crate::ingest::HttpFeedFetcher;

/// Wire the service from configuration: live HTTP fetcher, configured oracle, fresh cache.
pub fn service_from_config(cfg: &AppConfig) -> anyhow::Result<(NewsService, ClassifierWorker)> {
    let registry = cfg.registry()?;
    let fetcher = HttpFeedFetcher::new(cfg.refresh.fetch_timeout(), cfg.refresh.limit_per_source)?;
    let oracle = build_oracle(&cfg.classifier)?;
    tracing::info!(
        sources = registry.len(),
        oracle = oracle.name(),
        "pipeline configured"
    );
    Ok(NewsService::wire(
        registry,
        Arc::new(fetcher),
        oracle,
        Arc::new(ClassificationCache::new()),
        cfg,
    ))
}
