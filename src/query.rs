//! # Query Facade
//! Filtered, sorted, paginated views over a store snapshot. Pure reads.
//!
//! Filters combine with AND:
//! - source id (must be registered),
//! - severity level,
//! - case-insensitive substring over title + summary.
//!
//! `"all"` (or an empty value) for source/severity means no filter.
//! Page sizes are 6, 12, 24, 48 or 0 (all); pages are 1-based and an out-of-range
//! page yields an empty slice with the correct totals.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::sources::SourceRegistry;
use crate::store::{Article, Severity};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

impl FromStr for SortOrder {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" | "desc" => Ok(SortOrder::Newest),
            "oldest" | "asc" => Ok(SortOrder::Oldest),
            other => Err(PipelineError::invalid(
                "sort",
                format!("`{other}` is not one of newest, oldest"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PageSize {
    Six,
    #[default]
    Twelve,
    TwentyFour,
    FortyEight,
    All,
}

impl PageSize {
    /// `None` for `All`.
    pub fn limit(self) -> Option<usize> {
        match self {
            PageSize::Six => Some(6),
            PageSize::Twelve => Some(12),
            PageSize::TwentyFour => Some(24),
            PageSize::FortyEight => Some(48),
            PageSize::All => None,
        }
    }

    /// Wire value; 0 means all.
    pub fn as_number(self) -> usize {
        self.limit().unwrap_or(0)
    }
}

impl TryFrom<usize> for PageSize {
    type Error = PipelineError;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        match n {
            6 => Ok(PageSize::Six),
            12 => Ok(PageSize::Twelve),
            24 => Ok(PageSize::TwentyFour),
            48 => Ok(PageSize::FortyEight),
            0 => Ok(PageSize::All),
            other => Err(PipelineError::invalid(
                "per_page",
                format!("{other} is not one of 6, 12, 24, 48, 0 (all)"),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleFilter {
    pub source: Option<String>,
    pub severity: Option<Severity>,
    /// Stored lowercased.
    pub search: Option<String>,
}

impl ArticleFilter {
    pub fn matches(&self, a: &Article) -> bool {
        if let Some(src) = &self.source {
            if &a.source != src {
                return false;
            }
        }
        if let Some(sev) = self.severity {
            if a.severity != sev {
                return false;
            }
        }
        if let Some(needle) = &self.search {
            if !a.title.to_lowercase().contains(needle)
                && !a.summary.to_lowercase().contains(needle)
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleQuery {
    pub filter: ArticleFilter,
    pub sort: SortOrder,
    pub page_size: PageSize,
    /// 1-based.
    pub page: usize,
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            filter: ArticleFilter::default(),
            sort: SortOrder::Newest,
            page_size: PageSize::Twelve,
            page: 1,
        }
    }
}

/// Raw consumer input, as it arrives in a query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    pub source: Option<String>,
    pub severity: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub per_page: Option<String>,
    pub page: Option<String>,
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl QueryParams {
    /// Validate against the registry. Any bad value is a `QueryInvalidParameter`.
    pub fn parse(&self, registry: &SourceRegistry) -> Result<ArticleQuery, PipelineError> {
        let mut q = ArticleQuery::default();

        if let Some(s) = present(&self.source).filter(|s| !s.eq_ignore_ascii_case("all")) {
            let src = registry
                .iter()
                .find(|x| x.id.eq_ignore_ascii_case(s))
                .ok_or_else(|| {
                    PipelineError::invalid("source", format!("`{s}` is not a registered source"))
                })?;
            q.filter.source = Some(src.id.clone());
        }

        if let Some(s) = present(&self.severity).filter(|s| !s.eq_ignore_ascii_case("all")) {
            let sev = s
                .parse::<Severity>()
                .map_err(|e| PipelineError::invalid("severity", e))?;
            q.filter.severity = Some(sev);
        }

        q.filter.search = present(&self.search).map(str::to_lowercase);

        if let Some(s) = present(&self.sort) {
            q.sort = s.parse()?;
        }

        if let Some(s) = present(&self.per_page) {
            let n: usize = s
                .parse()
                .map_err(|_| PipelineError::invalid("per_page", format!("`{s}` is not a number")))?;
            q.page_size = PageSize::try_from(n)?;
        }

        if let Some(s) = present(&self.page) {
            let n: usize = s
                .parse()
                .map_err(|_| PipelineError::invalid("page", format!("`{s}` is not a number")))?;
            if n == 0 {
                return Err(PipelineError::invalid("page", "pages start at 1"));
            }
            q.page = n;
        }

        Ok(q)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticlePage {
    pub articles: Vec<Article>,
    pub total_matching: usize,
    pub page: usize,
    /// 0 when all matches are on one page.
    pub page_size: usize,
    pub total_pages: usize,
}

/// Apply `q` to a point-in-time snapshot.
pub fn query(snapshot: &[Arc<Article>], q: &ArticleQuery) -> ArticlePage {
    let mut matching: Vec<&Arc<Article>> =
        snapshot.iter().filter(|a| q.filter.matches(a)).collect();

    matching.sort_by(|a, b| {
        let by_date = match q.sort {
            SortOrder::Newest => b.published_at.cmp(&a.published_at),
            SortOrder::Oldest => a.published_at.cmp(&b.published_at),
        };
        match by_date {
            Ordering::Equal => a.fingerprint.cmp(&b.fingerprint),
            o => o,
        }
    });

    let total = matching.len();
    let (articles, total_pages) = match q.page_size.limit() {
        Some(size) => {
            let start = (q.page - 1).saturating_mul(size);
            let slice = matching
                .iter()
                .skip(start)
                .take(size)
                .map(|a| Article::clone(a))
                .collect();
            (slice, total.div_ceil(size))
        }
        None => {
            let slice = if q.page == 1 {
                matching.iter().map(|a| Article::clone(a)).collect()
            } else {
                Vec::new()
            };
            (slice, usize::from(total > 0))
        }
    };

    ArticlePage {
        articles,
        total_matching: total,
        page: q.page,
        page_size: q.page_size.as_number(),
        total_pages,
    }
}
