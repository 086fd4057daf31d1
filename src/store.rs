//! # Canonical Store
//! In-memory corpus of all known articles, keyed by fingerprint.
//!
//! Two writers with disjoint write sets:
//! - the aggregator merges fetched fields (`merge`),
//! - the classification worker attaches labels (`set_classification`).
//!
//! Every write swaps the whole `Arc<Article>`, so a reader holding a snapshot
//! never sees a half-updated record. Articles are never evicted.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::{fingerprint, RawItem};

/// Severity label. `Unclassified` until the worker labels the article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Unclassified,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn is_classified(self) -> bool {
        self != Severity::Unclassified
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Unclassified => "UNCLASSIFIED",
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNCLASSIFIED" => Ok(Severity::Unclassified),
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            other => Err(format!("unknown severity `{other}`")),
        }
    }
}

/// One aggregated news item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub fingerprint: String,
    pub source: String,
    pub title: String,
    pub summary: String,
    pub link: String,
    pub author: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub severity: Severity,
    /// Present iff `severity` is not `Unclassified`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity_reason: Option<String>,
}

impl Article {
    pub fn from_raw(source_id: &str, item: RawItem, fetched_at: DateTime<Utc>) -> Self {
        Self {
            fingerprint: fingerprint(source_id, &item.title),
            source: source_id.to_string(),
            title: item.title,
            summary: item.summary,
            link: item.link,
            author: item.author,
            published_at: item.published_at.unwrap_or(fetched_at),
            fetched_at,
            severity: Severity::Unclassified,
            severity_reason: None,
        }
    }

    pub fn is_classified(&self) -> bool {
        self.severity.is_classified()
    }
}

/// Counts produced by one `merge`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub updated: usize,
}

#[derive(Debug, Default)]
struct Inner {
    by_fp: HashMap<String, Arc<Article>>,
    /// Fingerprints in presentation order: newest first, fingerprint tie-break.
    order: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ArticleStore {
    inner: RwLock<Inner>,
}

impl ArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Merge one source's items. New fingerprints are inserted unclassified; known ones
    /// get their fetched fields (summary, link, author) refreshed. Labels are untouched.
    pub fn merge(
        &self,
        source_id: &str,
        items: Vec<RawItem>,
        fetched_at: DateTime<Utc>,
    ) -> MergeStats {
        let mut stats = MergeStats::default();
        let mut inner = self.write();
        let mut inserted = false;

        for item in items {
            let fresh = Article::from_raw(source_id, item, fetched_at);
            match inner.by_fp.get(&fresh.fingerprint) {
                None => {
                    inner.order.push(fresh.fingerprint.clone());
                    inner.by_fp.insert(fresh.fingerprint.clone(), Arc::new(fresh));
                    stats.added += 1;
                    inserted = true;
                }
                Some(existing) => {
                    if existing.summary == fresh.summary
                        && existing.link == fresh.link
                        && existing.author == fresh.author
                    {
                        continue;
                    }
                    let mut next = Article::clone(existing);
                    next.summary = fresh.summary;
                    next.link = fresh.link;
                    next.author = fresh.author;
                    inner.by_fp.insert(next.fingerprint.clone(), Arc::new(next));
                    stats.updated += 1;
                }
            }
        }

        if inserted {
            Self::resort(&mut inner);
        }
        stats
    }

    fn resort(inner: &mut Inner) {
        let Inner { by_fp, order } = inner;
        order.sort_by(|a, b| {
            let pa = by_fp.get(a).map(|x| x.published_at);
            let pb = by_fp.get(b).map(|x| x.published_at);
            pb.cmp(&pa).then_with(|| a.cmp(b))
        });
    }

    /// Attach a label. Returns `false` when the article is unknown or already labelled
    /// (write-once classification).
    pub fn set_classification(&self, fp: &str, severity: Severity, reason: &str) -> bool {
        if !severity.is_classified() {
            return false;
        }
        let mut inner = self.write();
        let Some(existing) = inner.by_fp.get(fp) else {
            return false;
        };
        if existing.is_classified() {
            return false;
        }
        let mut next = Article::clone(existing);
        next.severity = severity;
        next.severity_reason = Some(reason.to_string());
        inner.by_fp.insert(fp.to_string(), Arc::new(next));
        true
    }

    pub fn get(&self, fp: &str) -> Option<Arc<Article>> {
        self.read().by_fp.get(fp).cloned()
    }

    /// Point-in-time view in presentation order. The lock is held only while cloning handles.
    pub fn snapshot(&self) -> Vec<Arc<Article>> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|fp| inner.by_fp.get(fp).cloned())
            .collect()
    }

    pub fn unclassified(&self) -> Vec<Arc<Article>> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|fp| inner.by_fp.get(fp))
            .filter(|a| !a.is_classified())
            .cloned()
            .collect()
    }

    /// `(classified, total)`
    pub fn classification_counts(&self) -> (usize, usize) {
        let inner = self.read();
        let classified = inner.by_fp.values().filter(|a| a.is_classified()).count();
        (classified, inner.by_fp.len())
    }

    pub fn len(&self) -> usize {
        self.read().by_fp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
