// src/ingest/feed.rs
//! Feed document parsing through `feed-rs` (RSS 0.9x/2.0, Atom, JSON Feed).
//!
//! Output is already normalized into `RawItem`s: defaults for missing fields, summary
//! markup stripped and truncated, dates parsed (RFC 2822, then RFC 3339) or `None`.
//! Documents whose root is not a feed are errors, never empty feeds.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use feed_rs::model::{Entry, Link, Person};
use feed_rs::parser;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::types::RawItem;
use crate::ingest::{clean_summary, strip_markup, SUMMARY_MAX_CHARS};

const NO_TITLE: &str = "No Title";
const NO_LINK: &str = "#";
const NO_SUMMARY: &str = "No summary available";
const NO_AUTHOR: &str = "Unknown";

/// Parse a feed timestamp. RFC 2822 (RSS) first, then RFC 3339 (Atom).
pub fn parse_feed_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if ts.is_empty() {
        return None;
    }
    let parsed = OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok();
    if let Some(dt) = parsed {
        let nanos = dt.unix_timestamp_nanos();
        let secs = nanos.div_euclid(1_000_000_000) as i64;
        let sub = nanos.rem_euclid(1_000_000_000) as u32;
        return DateTime::from_timestamp(secs, sub);
    }
    // Lenient fallback for obsolete zone names ("GMT", "EST") that feeds still emit.
    DateTime::parse_from_rfc2822(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a feed document into at most `limit` items.
pub fn parse_feed(xml: &str, limit: usize) -> Result<Vec<RawItem>> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let feed = parser::Builder::new()
        .timestamp_parser(parse_feed_date)
        .build()
        .parse(xml_clean.as_bytes())
        .map_err(|e| anyhow!("failed to parse feed: {e}"))?;
    Ok(feed
        .entries
        .into_iter()
        .take(limit)
        .map(raw_item)
        .collect())
}

fn raw_item(e: Entry) -> RawItem {
    let summary = e
        .summary
        .as_ref()
        .map(|t| t.content.as_str())
        .or_else(|| e.content.as_ref().and_then(|c| c.body.as_deref()));
    RawItem {
        title: text_or(e.title.as_ref().map(|t| t.content.as_str()), NO_TITLE),
        summary: summary_or_default(summary),
        link: text_or(primary_link(&e.links), NO_LINK),
        author: text_or(e.authors.first().map(author_text), NO_AUTHOR),
        published_at: e.published.or(e.updated),
    }
}

/// `rel="alternate"` (or no rel) wins over replies/edit/enclosure links.
fn primary_link(links: &[Link]) -> Option<&str> {
    links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |r| r == "alternate"))
        .or_else(|| links.first())
        .map(|l| l.href.as_str())
}

// RSS `<author>` is an email address; feed-rs keeps it in `email` under a role name.
fn author_text(p: &Person) -> &str {
    match p.email.as_deref() {
        Some(email) if p.name.is_empty() || p.name == "author" => email,
        _ => &p.name,
    }
}

fn text_or(v: Option<&str>, default: &str) -> String {
    match v.map(strip_markup) {
        Some(s) if !s.is_empty() => s,
        _ => default.to_string(),
    }
}

fn summary_or_default(v: Option<&str>) -> String {
    let s = clean_summary(v.unwrap_or_default(), SUMMARY_MAX_CHARS);
    if s.is_empty() {
        NO_SUMMARY.to_string()
    } else {
        s
    }
}

/// HTML entities are not defined in XML; replace the common ones before parsing.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
