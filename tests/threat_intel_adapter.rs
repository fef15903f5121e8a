// tests/threat_intel_adapter.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use nanami_sentinel::alarm::AlarmWindow;
use nanami_sentinel::sources::threat_intel::ThreatIntelAdapter;
use nanami_sentinel::sources::{PayloadKind, SourceAdapter, SourceOptions};
use nanami_sentinel::summarize::FixedSummarizer;

const FEED: &str = include_str!("fixtures/threat_intel_rss.xml");

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn options() -> SourceOptions {
    SourceOptions {
        poll_interval: Duration::from_secs(1800),
        endpoint: "https://intel.example.com/rss.xml".to_string(),
        channel_id: "333".to_string(),
        timezone: "UTC".to_string(),
    }
}

fn adapter(summary: Option<&str>) -> ThreatIntelAdapter {
    ThreatIntelAdapter::from_fixture(
        options(),
        FEED,
        Arc::new(FixedSummarizer(summary.map(str::to_string))),
    )
}

fn window() -> AlarmWindow {
    AlarmWindow {
        start: ts("2024-01-01T00:00:00Z"),
        end: ts("2024-01-02T00:00:00Z"),
    }
}

#[tokio::test]
async fn newest_three_in_window_items_survive_the_cap() {
    let a = adapter(None);
    let payloads = a.fetch_new_items(window()).await.unwrap();

    // Five items in the feed: one published after the window closes, four
    // inside it. The cap keeps the newest three; the 06:00 item is dropped.
    let ids: Vec<_> = payloads.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["intel-0004", "intel-0003", "intel-0002"]);
    // Newest first.
    assert!(payloads[0].published_at > payloads[1].published_at);
    assert!(payloads[1].published_at > payloads[2].published_at);
}

#[tokio::test]
async fn summarizer_failure_falls_back_to_feed_title() {
    let a = adapter(None);
    let payloads = a.fetch_new_items(window()).await.unwrap();

    let p = &payloads[0];
    assert_eq!(p.summary, "APT-41 targets telecom providers");
    let PayloadKind::ThreatIntel(detail) = &p.kind else {
        panic!("expected threat-intel payload");
    };
    assert_eq!(detail.title, "APT-41 targets telecom providers");
    // Feed HTML is stripped before it reaches the detail text.
    assert!(!detail.description.contains('<'));
    assert!(detail.description.contains("APT-41"));
}

#[tokio::test]
async fn localized_json_response_overrides_feed_text() {
    let a = adapter(Some(
        r#"{"title": "APT-41, 통신사 공격", "desc": "통신사 대상 침투 분석.", "summary": "APT-41이 통신 인프라를 노린다."}"#,
    ));
    let payloads = a.fetch_new_items(window()).await.unwrap();

    let p = &payloads[0];
    assert_eq!(p.summary, "APT-41이 통신 인프라를 노린다.");
    let PayloadKind::ThreatIntel(detail) = &p.kind else {
        panic!("expected threat-intel payload");
    };
    assert_eq!(detail.title, "APT-41, 통신사 공격");
    assert_eq!(detail.description, "통신사 대상 침투 분석.");
}

#[tokio::test]
async fn malformed_summarizer_output_degrades_like_a_failure() {
    let a = adapter(Some("이건 JSON이 아닙니다"));
    let payloads = a.fetch_new_items(window()).await.unwrap();
    // Non-JSON output falls back exactly like a None.
    assert_eq!(payloads[0].summary, "APT-41 targets telecom providers");
}

#[tokio::test]
async fn format_renders_summary_and_kst_fields() {
    let a = adapter(None);
    let payloads = a.fetch_new_items(window()).await.unwrap();

    let msg = a.format(&payloads[0]).expect("formats to a message");
    let embed = &msg.embeds[0];
    assert_eq!(
        embed.title.as_deref(),
        Some("APT-41 targets telecom providers")
    );
    assert!(embed.fields.iter().any(|f| f.name == "요약"));
    let core = embed
        .fields
        .iter()
        .find(|f| f.name == "핵심 정보")
        .expect("core-info field present");
    // 12:00 UTC renders as 21:00 KST.
    assert!(core.value.contains("2024-01-01 21:00:00 KST"));
    assert_eq!(
        embed.footer.as_ref().unwrap().text,
        "Threat Intelligence 알림봇"
    );
    assert_eq!(msg.link_button.as_ref().unwrap().label, "원문 보기");
}

#[tokio::test]
async fn window_excluding_all_items_yields_nothing() {
    let a = adapter(None);
    let w = AlarmWindow {
        start: ts("2024-03-01T00:00:00Z"),
        end: ts("2024-03-02T00:00:00Z"),
    };
    assert!(a.fetch_new_items(w).await.unwrap().is_empty());
}
