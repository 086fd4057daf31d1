//! One-shot fetch: aggregate every configured feed once and print the newest headlines.
//! Labels are only shown when `--classify` is given and an oracle is configured.

use std::sync::Arc;

use anyhow::Context;
use secnews::aggregator::Aggregator;
use secnews::classify::{build_oracle, ClassificationCache, Classifier, WorkerSettings};
use secnews::ingest::HttpFeedFetcher;
use secnews::refresh::RefreshState;
use secnews::{AppConfig, ArticleStore};

const SHOWN: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let classify = std::env::args().any(|a| a == "--classify");
    let cfg = AppConfig::load_default().context("loading news config")?;
    let registry = Arc::new(cfg.registry()?);
    let fetcher = HttpFeedFetcher::new(cfg.refresh.fetch_timeout(), cfg.refresh.limit_per_source)?;
    let store = Arc::new(ArticleStore::new());

    let aggregator = Aggregator::new(
        Arc::clone(&registry),
        Arc::new(fetcher),
        Arc::clone(&store),
        Arc::new(RefreshState::new()),
    )
    .with_timeouts(cfg.refresh.fetch_timeout(), cfg.refresh.deadline());

    let result = aggregator.run_once().await;
    println!(
        "fetched {} articles from {} sources ({} failed)",
        result.articles_added,
        registry.len(),
        result.source_errors.len()
    );
    for e in &result.source_errors {
        println!("  ! {e}");
    }

    if classify {
        let oracle = build_oracle(&cfg.classifier)?;
        let settings = WorkerSettings {
            spacing: cfg.classifier.spacing(),
            call_timeout: cfg.classifier.call_timeout(),
            daily_limit: cfg.classifier.daily_limit,
        };
        let (classifier, worker) = Classifier::new(
            Arc::clone(&store),
            Arc::new(ClassificationCache::new()),
            oracle,
            settings,
        );
        let _worker = worker.spawn();
        let report = classifier.enqueue_unclassified();
        println!("classifying {} articles via {}", report.scheduled, classifier.oracle_name());
        while classifier.pending() > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
    }

    for a in store.snapshot().iter().take(SHOWN) {
        println!(
            "[{}] {} | {} | {}",
            a.severity,
            a.published_at.format("%Y-%m-%d %H:%M"),
            a.source,
            a.title
        );
        if let Some(r) = &a.severity_reason {
            println!("    {r}");
        }
    }
    Ok(())
}
