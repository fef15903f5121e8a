// tests/hn_adapter.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use nanami_sentinel::alarm::AlarmWindow;
use nanami_sentinel::sources::hackernews::{HackerNewsAdapter, RelevanceLists};
use nanami_sentinel::sources::{PayloadKind, SourceAdapter, SourceOptions};
use nanami_sentinel::summarize::FixedSummarizer;

const FRONT_PAGE: &str = include_str!("fixtures/hn_front_page.json");

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn options() -> SourceOptions {
    SourceOptions {
        poll_interval: Duration::from_secs(300),
        endpoint: "https://hn.algolia.com/api/v1/search?tags=front_page".to_string(),
        channel_id: "222".to_string(),
        timezone: "UTC".to_string(),
    }
}

fn adapter(summary: Option<&str>) -> HackerNewsAdapter {
    HackerNewsAdapter::from_fixture(
        options(),
        FRONT_PAGE,
        Arc::new(FixedSummarizer(summary.map(str::to_string))),
    )
}

#[tokio::test]
async fn window_and_relevance_filter_the_front_page() {
    let a = adapter(None);
    let w = AlarmWindow {
        start: ts("2024-01-01T00:00:00Z"),
        end: ts("2024-01-02T00:00:00Z"),
    };

    let payloads = a.fetch_new_items(w).await.unwrap();
    let ids: Vec<_> = payloads.iter().map(|p| p.id.as_str()).collect();
    // 39000001 matches the github.com domain, 39000002 the "exploit" keyword.
    // 39000003 (travel story) is irrelevant; 39000004 predates the window.
    assert_eq!(ids, ["39000001", "39000002"]);
    assert!(payloads.iter().all(|p| w.contains(p.published_at)));
}

#[tokio::test]
async fn partitioning_windows_never_double_count() {
    let a = adapter(None);
    let first = AlarmWindow {
        start: ts("2024-01-01T00:00:00Z"),
        end: ts("2024-01-01T12:30:00Z"),
    };
    let second = AlarmWindow {
        start: ts("2024-01-01T12:30:00Z"),
        end: ts("2024-01-02T00:00:00Z"),
    };

    let ids1: Vec<String> = a
        .fetch_new_items(first)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    let ids2: Vec<String> = a
        .fetch_new_items(second)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();

    assert_eq!(ids1, ["39000001"]); // 12:00, before the split
    assert_eq!(ids2, ["39000002"]); // 13:00, after the split
    assert!(ids1.iter().all(|id| !ids2.contains(id)));
}

#[tokio::test]
async fn summarizer_failure_falls_back_to_the_title() {
    let a = adapter(None);
    let w = AlarmWindow {
        start: ts("2024-01-01T00:00:00Z"),
        end: ts("2024-01-02T00:00:00Z"),
    };
    let payloads = a.fetch_new_items(w).await.unwrap();
    assert_eq!(payloads[0].summary, "Show HN: A tiny Wasm runtime");
    assert!(!payloads[1].summary.is_empty());
}

#[tokio::test]
async fn summary_sentences_break_onto_their_own_lines() {
    let a = adapter(Some("첫 문장입니다. 둘째 문장입니다. 끝."));
    let w = AlarmWindow {
        start: ts("2024-01-01T00:00:00Z"),
        end: ts("2024-01-02T00:00:00Z"),
    };
    let payloads = a.fetch_new_items(w).await.unwrap();
    assert_eq!(payloads[0].summary, "첫 문장입니다.\n둘째 문장입니다.\n끝.");
}

#[tokio::test]
async fn format_produces_branded_embed_with_stats() {
    let a = adapter(None);
    let w = AlarmWindow {
        start: ts("2024-01-01T00:00:00Z"),
        end: ts("2024-01-02T00:00:00Z"),
    };
    let payloads = a.fetch_new_items(w).await.unwrap();
    let p = &payloads[1];
    let PayloadKind::HackerNews(detail) = &p.kind else {
        panic!("expected hackernews payload");
    };
    assert_eq!(detail.points, 512);
    assert_eq!(detail.comment_count, 214);

    let msg = a.format(p).expect("formats to a message");
    // Plain link in content so Discord unfurls the article.
    assert_eq!(msg.content.as_deref(), Some(p.link.as_str()));
    let embed = &msg.embeds[0];
    assert_eq!(embed.color, Some(0xFF6600));
    assert!(embed
        .fields
        .iter()
        .any(|f| f.name == "Points" && f.value == "512" && f.inline));
    assert_eq!(
        embed.footer.as_ref().unwrap().text,
        "작성자: kernelwatcher"
    );
    assert_eq!(msg.link_button.as_ref().unwrap().label, "원문 보기");
}

#[tokio::test]
async fn custom_relevance_lists_replace_the_defaults() {
    let narrow = RelevanceLists {
        domains: vec!["travel.example.com"],
        keywords: vec![],
    };
    let a = HackerNewsAdapter::from_fixture(
        options(),
        FRONT_PAGE,
        Arc::new(FixedSummarizer(None)),
    )
    .with_relevance(narrow);
    let w = AlarmWindow {
        start: ts("2024-01-01T00:00:00Z"),
        end: ts("2024-01-02T00:00:00Z"),
    };

    let payloads = a.fetch_new_items(w).await.unwrap();
    let ids: Vec<_> = payloads.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["39000003"]);
}
