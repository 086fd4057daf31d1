// src/ingest/mod.rs
pub mod feed;
pub mod http;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};

pub use feed::parse_feed;
pub use http::{HttpFeedFetcher, StaticFeedFetcher};
pub use types::{FeedFetcher, RawItem};

/// Max characters kept from a feed summary before the ellipsis.
pub const SUMMARY_MAX_CHARS: usize = 300;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_fetch_total", "Feed fetch attempts.");
        describe_counter!(
            "feed_fetch_errors_total",
            "Feed fetch/parse errors, including timeouts."
        );
        describe_counter!("feed_items_total", "Items parsed from feeds.");
        describe_histogram!("feed_fetch_ms", "Feed fetch + parse time in milliseconds.");
        describe_counter!("aggregate_runs_total", "Aggregation runs completed.");
        describe_counter!(
            "aggregate_articles_added_total",
            "Articles inserted into the store."
        );
        describe_gauge!("store_articles", "Articles currently in the store.");
        describe_gauge!(
            "refresh_last_run_ts",
            "Unix ts when the last aggregation run finished."
        );
    });
}

/// Strip markup and tidy whitespace, keeping punctuation intact.
pub fn strip_markup(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)<[^<>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Normalize text: strip markup, collapse whitespace, drop trailing sentence punctuation.
pub fn normalize_text(s: &str) -> String {
    let mut out = strip_markup(s);

    // Tag removal can leave a space before the punctuation ("Hospital !").
    while let Some(last) = out.trim_end().chars().last() {
        out.truncate(out.trim_end().len());
        if matches!(last, '!' | '?' | '.' | ',') {
            out.pop();
        } else {
            break;
        }
    }

    // Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Summary shown to readers: markup stripped, cut at `max_chars` with a trailing "...".
pub fn clean_summary(s: &str, max_chars: usize) -> String {
    let text = strip_markup(s);
    if text.chars().count() > max_chars {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    } else {
        text
    }
}

/// Stable article identity: hex of the first 16 bytes of
/// `sha256(source_id 0x1f lowercase(normalize_text(title)))`.
pub fn fingerprint(source_id: &str, title: &str) -> String {
    let key = normalize_text(title).to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update([0x1f]);
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
