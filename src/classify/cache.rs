// src/classify/cache.rs
//! Classification cache: fingerprint -> (severity, reason), process lifetime.
//!
//! Entries are never invalidated. A changed title yields a new fingerprint and
//! therefore a fresh miss.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::store::Severity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedLabel {
    pub severity: Severity,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ClassificationCache {
    entries: RwLock<HashMap<String, CachedLabel>>,
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &str) -> Option<CachedLabel> {
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(fingerprint)
            .cloned()
    }

    pub fn insert(&self, fingerprint: &str, label: CachedLabel) {
        self.entries
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(fingerprint.to_string(), label);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Operator reset. Labels already written to the store are kept.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
        tracing::info!(target: "classify", "classification cache cleared");
    }
}
