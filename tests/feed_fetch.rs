use std::time::Duration;

use secnews::ingest::{fingerprint, parse_feed, FeedFetcher, HttpFeedFetcher, StaticFeedFetcher};
use secnews::sources::Source;
use secnews::PipelineError;

const SOURCE_A_RSS: &str = include_str!("fixtures/source_a_rss.xml");
const SOURCE_B_ATOM: &str = include_str!("fixtures/source_b_atom.xml");

#[test]
fn rss_fixture_normalizes_fields() {
    let items = parse_feed(SOURCE_A_RSS, 15).unwrap();
    assert_eq!(items.len(), 3);

    let first = &items[0];
    assert_eq!(first.title, "Ransomware gang hits regional hospital chain");
    assert_eq!(
        first.summary,
        "The ransomware attack disrupted patient care across 12 sites."
    );
    assert_eq!(first.author, "news@a.example (Alice)");
    assert_eq!(
        first.published_at.unwrap().to_rfc3339(),
        "2025-10-07T09:00:00+00:00"
    );

    assert_eq!(items[1].author, "Unknown");
    assert!(items[1].published_at.is_some());
    assert!(items[2].published_at.is_none());
}

#[test]
fn atom_fixture_uses_summary_or_content() {
    let items = parse_feed(SOURCE_B_ATOM, 15).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].summary, "Attackers chain two bugs.");
    assert_eq!(items[0].author, "Bob");
    assert_eq!(items[1].summary, "Microsoft released updates.");
    assert_eq!(items[1].link, "https://b.example/patch-tuesday");
    assert_eq!(
        items[1].published_at.unwrap().to_rfc3339(),
        "2025-10-07T08:00:00+00:00"
    );
}

#[test]
fn fingerprints_are_stable_across_reparse() {
    let a: Vec<_> = parse_feed(SOURCE_A_RSS, 15)
        .unwrap()
        .iter()
        .map(|i| fingerprint("a", &i.title))
        .collect();
    let b: Vec<_> = parse_feed(SOURCE_A_RSS, 15)
        .unwrap()
        .iter()
        .map(|i| fingerprint("a", &i.title))
        .collect();
    assert_eq!(a, b);
    let mut dedup = a.clone();
    dedup.sort();
    dedup.dedup();
    assert_eq!(dedup.len(), a.len());
}

#[tokio::test]
async fn static_fetcher_without_document_fails() {
    let f = StaticFeedFetcher::new(15).with_doc("a", SOURCE_A_RSS);
    let ok = f
        .fetch(&Source::new("a", "A", "https://a.example/feed"))
        .await
        .unwrap();
    assert_eq!(ok.len(), 3);
    let err = f
        .fetch(&Source::new("b", "B", "https://b.example/feed"))
        .await
        .unwrap_err();
    assert_eq!(err.source_id(), Some("b"));
}

#[tokio::test]
async fn http_fetcher_reads_feed_and_reports_failures() {
    let mut server = mockito::Server::new_async().await;
    let _ok = server
        .mock("GET", "/feed")
        .with_status(200)
        .with_header("content-type", "application/rss+xml")
        .with_body(SOURCE_A_RSS)
        .create_async()
        .await;
    let _down = server
        .mock("GET", "/down")
        .with_status(503)
        .create_async()
        .await;
    let _html = server
        .mock("GET", "/html")
        .with_status(200)
        .with_body("<html><body>blocked</body></html>")
        .create_async()
        .await;
    let _interstitial = server
        .mock("GET", "/interstitial")
        .with_status(200)
        .with_body("<html><title>Blocked</title><body>captcha</body></html>")
        .create_async()
        .await;

    let fetcher = HttpFeedFetcher::new(Duration::from_secs(5), 2).unwrap();

    let items = fetcher
        .fetch(&Source::new("a", "A", format!("{}/feed", server.url())))
        .await
        .unwrap();
    assert_eq!(items.len(), 2, "limit_per_source applies");

    for path in ["/down", "/html", "/interstitial"] {
        let err = fetcher
            .fetch(&Source::new("x", "X", format!("{}{path}", server.url())))
            .await
            .unwrap_err();
        assert!(
            matches!(err, PipelineError::FetchFailed { ref source_id, .. } if source_id == "x"),
            "{path}: {err:?}"
        );
    }
}
