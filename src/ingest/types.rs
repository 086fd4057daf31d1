// src/ingest/types.rs
use chrono::{DateTime, Utc};

use crate::error::PipelineError;
use crate::sources::Source;

/// One feed entry after parsing + normalization, before it becomes an `Article`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub summary: String,
    pub link: String,
    pub author: String,
    /// `None` when the feed omitted the date or it could not be parsed.
    pub published_at: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Retrieve and parse one source. Errors are always `FetchFailed`.
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, PipelineError>;
    fn name(&self) -> &'static str;
}
