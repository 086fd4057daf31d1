// src/error.rs
//! Domain error taxonomy shared by the fetch, aggregation, classification and query paths.
//!
//! None of these are fatal to the process except `Misconfigured`, which is only produced
//! while wiring the service at startup.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PipelineError {
    /// One source could not be fetched or parsed. Contributes zero items to the run.
    #[error("fetch failed for source `{source_id}`: {cause}")]
    FetchFailed {
        #[serde(rename = "source")]
        source_id: String,
        cause: String,
    },

    /// Every registered source failed within a single aggregation run.
    #[error("aggregation failed: all {failed} sources failed")]
    AggregationFailed { failed: usize },

    /// The oracle could not label one article. The article stays unclassified.
    #[error("classification failed for {fingerprint}: {cause}")]
    ClassificationFailed { fingerprint: String, cause: String },

    /// Consumer supplied a bad filter/sort/page value.
    #[error("invalid query parameter `{param}`: {reason}")]
    QueryInvalidParameter { param: &'static str, reason: String },

    #[error("misconfigured: {0}")]
    Misconfigured(String),
}

impl PipelineError {
    pub fn fetch(source: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::FetchFailed {
            source_id: source.into(),
            cause: cause.to_string(),
        }
    }

    pub fn invalid(param: &'static str, reason: impl Into<String>) -> Self {
        Self::QueryInvalidParameter {
            param,
            reason: reason.into(),
        }
    }

    /// Source id for `FetchFailed`, `None` otherwise.
    pub fn source_id(&self) -> Option<&str> {
        match self {
            Self::FetchFailed { source_id, .. } => Some(source_id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
