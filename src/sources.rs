//! # Source Registry
//!
//! Static mapping from a source identifier (e.g. `"krebs"`) to the feed endpoint
//! it is fetched from, plus a human-readable display name.
//!
//! - Built-in `default_seed()` with the security feeds the service ships with.
//! - Can be replaced from configuration (`[[sources]]` in the config file).
//! - Entries are trimmed; blank ids/urls are dropped; duplicate ids keep the first entry.
//! - An empty registry is a startup misconfiguration.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// One registered feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    /// Display name; defaults to the id when omitted in config.
    #[serde(default)]
    pub name: String,
    pub url: String,
}

impl Source {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    /// Build a registry from raw entries. Fails when nothing usable remains.
    pub fn new(entries: Vec<Source>) -> Result<Self, PipelineError> {
        let mut sources: Vec<Source> = Vec::with_capacity(entries.len());
        for s in entries {
            let id = s.id.trim().to_string();
            let url = s.url.trim().to_string();
            if id.is_empty() || url.is_empty() {
                continue;
            }
            if sources.iter().any(|x| x.id.eq_ignore_ascii_case(&id)) {
                continue;
            }
            let name = match s.name.trim() {
                "" => id.clone(),
                n => n.to_string(),
            };
            sources.push(Source { id, name, url });
        }
        if sources.is_empty() {
            return Err(PipelineError::Misconfigured(
                "source registry is empty".to_string(),
            ));
        }
        Ok(Self { sources })
    }

    /// Built-in security news feeds.
    pub fn default_seed() -> Self {
        let sources = [
            (
                "thehackernews",
                "The Hacker News",
                "https://feeds.feedburner.com/TheHackersNews",
            ),
            (
                "krebs",
                "Krebs on Security",
                "https://krebsonsecurity.com/feed/",
            ),
            (
                "bleepingcomputer",
                "Bleeping Computer",
                "https://www.bleepingcomputer.com/feed/",
            ),
            (
                "darkreading",
                "Dark Reading",
                "https://www.darkreading.com/rss.xml",
            ),
            ("threatpost", "Threatpost", "https://threatpost.com/feed/"),
            (
                "securityweek",
                "Security Week",
                "https://www.securityweek.com/feed/",
            ),
            (
                "cybersecurityinsiders",
                "Cybersecurity Insiders",
                "https://www.cybersecurity-insiders.com/feed/",
            ),
        ]
        .into_iter()
        .map(|(id, name, url)| Source::new(id, name, url))
        .collect();
        Self { sources }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.id == id)
    }
}
