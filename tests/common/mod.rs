#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secnews::classify::oracle::{MockOracle, OracleFuture, SeverityOracle};
use secnews::classify::{ClassificationCache, ClassifierWorker, DynOracle};
use secnews::config::AppConfig;
use secnews::ingest::{FeedFetcher, RawItem, StaticFeedFetcher};
use secnews::sources::{Source, SourceRegistry};
use secnews::{NewsService, PipelineError};

pub const SOURCE_A_RSS: &str = include_str!("../fixtures/source_a_rss.xml");
pub const SOURCE_B_ATOM: &str = include_str!("../fixtures/source_b_atom.xml");

pub fn registry(ids: &[&str]) -> SourceRegistry {
    SourceRegistry::new(
        ids.iter()
            .map(|id| Source::new(*id, id.to_uppercase(), format!("https://{id}.example/feed")))
            .collect(),
    )
    .unwrap()
}

/// Minimal RSS document: `(title, description)` pairs, one hour apart, newest first.
pub fn rss(items: &[(&str, &str)]) -> String {
    let mut body = String::new();
    for (i, (title, desc)) in items.iter().enumerate() {
        body.push_str(&format!(
            "<item><title>{title}</title><link>https://x.example/{i}</link>\
             <description>{desc}</description>\
             <pubDate>Tue, 07 Oct 2025 {:02}:00:00 +0000</pubDate></item>",
            20 - i
        ));
    }
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>t</title>{body}</channel></rss>"#)
}

/// Static fetcher with per-source latency and a swappable document set.
pub struct ScriptedFetcher {
    docs: Mutex<HashMap<String, String>>,
    delays: HashMap<String, Duration>,
    pub calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            delays: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn doc(self, source: &str, xml: &str) -> Self {
        self.set_doc(source, xml);
        self
    }

    pub fn delay(mut self, source: &str, d: Duration) -> Self {
        self.delays.insert(source.to_string(), d);
        self
    }

    pub fn set_doc(&self, source: &str, xml: &str) {
        self.docs
            .lock()
            .unwrap()
            .insert(source.to_string(), xml.to_string());
    }

    pub fn remove_doc(&self, source: &str) {
        self.docs.lock().unwrap().remove(source);
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delays.get(&source.id) {
            tokio::time::sleep(*d).await;
        }
        let xml = self.docs.lock().unwrap().get(&source.id).cloned();
        match xml {
            Some(xml) => {
                StaticFeedFetcher::new(15)
                    .with_doc(&source.id, &xml)
                    .fetch(source)
                    .await
            }
            None => Err(PipelineError::fetch(&source.id, "connection refused")),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Mock labels, with call counting, optional latency and a number of initial failures.
pub struct CountingOracle {
    pub calls: AtomicUsize,
    delay: Duration,
    fail_first: AtomicUsize,
}

impl CountingOracle {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail_first: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    pub fn failing_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SeverityOracle for CountingOracle {
    fn classify<'a>(&'a self, title: &'a str, summary: &'a str) -> OracleFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                anyhow::bail!("quota exceeded");
            }
            Ok(MockOracle::label(title, summary))
        })
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Config with fast timings for tests.
pub fn fast_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.refresh.fetch_timeout_secs = 2;
    cfg.refresh.deadline_secs = 5;
    cfg.classifier.spacing_ms = 1;
    cfg.classifier.timeout_secs = 2;
    cfg
}

pub fn wire(
    ids: &[&str],
    fetcher: Arc<dyn FeedFetcher>,
    oracle: DynOracle,
    cache: Arc<ClassificationCache>,
) -> (NewsService, ClassifierWorker) {
    NewsService::wire(registry(ids), fetcher, oracle, cache, &fast_config())
}

/// Poll `cond` until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
