// src/ingest/http.rs
use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};

use crate::error::PipelineError;
use crate::ingest::feed::parse_feed;
use crate::ingest::types::{FeedFetcher, RawItem};
use crate::sources::Source;

/// Browser-like UA; several security blogs reject unknown agents.
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) secnews-aggregator/0.1";

/// Fetches feeds over HTTP with a bounded timeout.
pub struct HttpFeedFetcher {
    client: reqwest::Client,
    limit_per_source: usize,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration, limit_per_source: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            limit_per_source,
        })
    }

    async fn fetch_body(&self, source: &Source) -> Result<String, PipelineError> {
        let resp = self
            .client
            .get(&source.url)
            .send()
            .await
            .map_err(|e| PipelineError::fetch(&source.id, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::fetch(
                &source.id,
                format!("http status {status}"),
            ));
        }
        resp.text()
            .await
            .map_err(|e| PipelineError::fetch(&source.id, e))
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, PipelineError> {
        let t0 = Instant::now();
        counter!("feed_fetch_total").increment(1);

        let out = match self.fetch_body(source).await {
            Ok(body) => parse_feed(&body, self.limit_per_source)
                .map_err(|e| PipelineError::fetch(&source.id, format!("{e:#}"))),
            Err(e) => Err(e),
        };

        histogram!("feed_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        match &out {
            Ok(items) => {
                counter!("feed_items_total").increment(items.len() as u64);
                tracing::debug!(target: "ingest", source = %source.id, items = items.len(), "feed fetched");
            }
            Err(e) => {
                tracing::warn!(target: "ingest", source = %source.id, error = %e, "feed fetch failed");
            }
        }
        out
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Serves feed documents from memory, keyed by source id. Used for fixtures and offline runs.
/// Sources without a document fail like an unreachable endpoint.
pub struct StaticFeedFetcher {
    docs: HashMap<String, String>,
    limit_per_source: usize,
}

impl StaticFeedFetcher {
    pub fn new(limit_per_source: usize) -> Self {
        Self {
            docs: HashMap::new(),
            limit_per_source,
        }
    }

    pub fn with_doc(mut self, source_id: &str, xml: &str) -> Self {
        self.docs.insert(source_id.to_string(), xml.to_string());
        self
    }
}

#[async_trait]
impl FeedFetcher for StaticFeedFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, PipelineError> {
        let xml = self
            .docs
            .get(&source.id)
            .ok_or_else(|| PipelineError::fetch(&source.id, "no fixture for source"))?;
        parse_feed(xml, self.limit_per_source)
            .map_err(|e| PipelineError::fetch(&source.id, format!("{e:#}")))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
