// src/sources/threat_intel.rs
//! Threat-intel RSS adapter (Mandiant research feed). The feed has no
//! server-side date filter at all: we sort newest-first, walk until the
//! window's lower edge, and cap the batch at three items per tick so a
//! backlog never floods the channel.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use super::{EventPayload, FetchMode, PayloadKind, SourceAdapter, SourceOptions};
use crate::alarm::window::AlarmWindow;
use crate::notify::{DiscordOutbound, Embed, LinkButton};
use crate::summarize::{extract_json_object, SharedSummarizer};
use crate::timefmt::{format_kst, format_utc};

const MAX_ITEMS_PER_TICK: usize = 3;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ThreatIntelDetail {
    pub title: String,
    pub description: String,
}

/// Korean title/desc/summary generated per item; falls back to the raw
/// feed title when the summarizer fails or returns malformed JSON.
#[derive(Debug, Deserialize)]
struct LocalizedItem {
    title: Option<String>,
    desc: Option<String>,
    summary: Option<String>,
}

struct NormalizedItem {
    id: String,
    title: String,
    link: String,
    published_at: DateTime<Utc>,
    description: String,
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<i64> {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Strip tags and collapse whitespace so feed HTML can go into a prompt.
pub fn strip_html(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    let out = re_tags.replace_all(&decoded, " ").to_string();

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

pub struct ThreatIntelAdapter {
    options: SourceOptions,
    mode: FetchMode,
    summarizer: SharedSummarizer,
}

impl ThreatIntelAdapter {
    pub fn new(options: SourceOptions, summarizer: SharedSummarizer) -> Self {
        Self {
            options,
            mode: FetchMode::http(),
            summarizer,
        }
    }

    pub fn from_fixture(
        options: SourceOptions,
        body: &str,
        summarizer: SharedSummarizer,
    ) -> Self {
        Self {
            options,
            mode: FetchMode::Fixture(body.to_string()),
            summarizer,
        }
    }

    fn normalize(items: Vec<Item>) -> Vec<NormalizedItem> {
        let mut out = Vec::with_capacity(items.len());
        for it in items {
            let link = it
                .link
                .or_else(|| it.guid.clone())
                .unwrap_or_default();
            let Some(pub_date) = it.pub_date else { continue };
            if link.is_empty() {
                continue;
            }
            let Some(unix) = parse_rfc2822_to_unix(&pub_date) else {
                continue;
            };
            let Some(published_at) = Utc.timestamp_opt(unix, 0).single() else {
                continue;
            };
            out.push(NormalizedItem {
                id: it.guid.unwrap_or_else(|| link.clone()),
                title: it.title.unwrap_or_default(),
                link,
                published_at,
                description: it.description.unwrap_or_default(),
            });
        }
        out
    }

    async fn build_payload(&self, item: &NormalizedItem) -> EventPayload {
        let clean_desc: String = strip_html(&item.description).chars().take(2000).collect();

        let prompt = format!(
            "다음 위협 인텔리전스 RSS 항목을 기반으로 한국어 JSON을 생성하세요.\n\n\
             ### 원본 정보\n제목: {}\n링크: {}\n발행일: {}\n본문: {}\n\n\
             ### 출력 형식(JSON만 출력, 코드블록/설명 금지)\n\
             {{\"title\": \"자연스러운 한국어 제목\", \"desc\": \"핵심 내용 1~2문장\", \"summary\": \"2~3줄, 주제와 왜 중요한지(영향/대상)가 드러나게\"}}",
            item.title, item.link, item.published_at, clean_desc
        );

        let localized = match self.summarizer.summarize(&prompt).await {
            Some(raw) => extract_json_object(&raw)
                .and_then(|obj| serde_json::from_str::<LocalizedItem>(obj).ok()),
            None => None,
        };

        let (title, desc, summary) = match localized {
            Some(loc) => (
                loc.title.filter(|s| !s.is_empty()).unwrap_or_else(|| item.title.clone()),
                loc.desc.unwrap_or_else(|| clean_desc.clone()),
                loc.summary
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| item.title.clone()),
            ),
            None => (
                if item.title.is_empty() {
                    "제목 없음".to_string()
                } else {
                    item.title.clone()
                },
                clean_desc.clone(),
                if item.title.is_empty() {
                    "요약 생성 실패".to_string()
                } else {
                    item.title.clone()
                },
            ),
        };

        EventPayload {
            id: item.id.clone(),
            summary,
            link: item.link.clone(),
            published_at: item.published_at,
            image_url: None,
            kind: PayloadKind::ThreatIntel(ThreatIntelDetail {
                title,
                description: desc,
            }),
        }
    }
}

#[async_trait]
impl SourceAdapter for ThreatIntelAdapter {
    fn name(&self) -> &'static str {
        "threat_intel"
    }

    fn options(&self) -> &SourceOptions {
        &self.options
    }

    async fn fetch_new_items(&self, window: AlarmWindow) -> Result<Vec<EventPayload>> {
        let t0 = std::time::Instant::now();
        let xml = self.mode.get_text(&self.options.endpoint, "threat_intel").await?;
        let xml_clean = scrub_html_entities_for_xml(&xml);
        let rss: Rss = from_str(&xml_clean).context("parsing threat-intel rss xml")?;
        counter!("alarm_fetched_items_total", "source" => "threat_intel")
            .increment(rss.channel.item.len() as u64);

        let mut normalized = Self::normalize(rss.channel.item);
        // Newest first, so the walk can stop at the window's lower edge.
        normalized.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        let mut in_window = Vec::new();
        for item in &normalized {
            if item.published_at >= window.end {
                continue;
            }
            if item.published_at < window.start {
                break;
            }
            in_window.push(item);
            if in_window.len() >= MAX_ITEMS_PER_TICK {
                break;
            }
        }

        let mut payloads = Vec::with_capacity(in_window.len());
        for item in in_window {
            payloads.push(self.build_payload(item).await);
        }

        histogram!("alarm_fetch_ms", "source" => "threat_intel")
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(payloads)
    }

    fn format(&self, payload: &EventPayload) -> Option<DiscordOutbound> {
        let PayloadKind::ThreatIntel(detail) = &payload.kind else {
            return None;
        };

        let description: String = detail.description.chars().take(1024).collect();
        let embed = Embed::new()
            .title(detail.title.clone())
            .url(payload.link.clone())
            .field(
                "요약",
                if payload.summary.is_empty() {
                    "요약 없음".to_string()
                } else {
                    payload.summary.clone()
                },
            )
            .field(
                "핵심 정보",
                format!(
                    "• 발행일({}): {}\n• 발행일(KST): {}",
                    self.options.timezone,
                    format_utc(payload.published_at),
                    format_kst(payload.published_at)
                ),
            )
            .field(
                "설명",
                if description.is_empty() {
                    "설명 없음".to_string()
                } else {
                    description
                },
            )
            .footer("Threat Intelligence 알림봇")
            .timestamp(Utc::now());

        Some(DiscordOutbound {
            content: None,
            embeds: vec![embed],
            link_button: Some(LinkButton {
                label: "원문 보기".to_string(),
                url: payload.link.clone(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc2822_dates_parse_to_utc() {
        let unix = parse_rfc2822_to_unix("Mon, 01 Jan 2024 12:00:00 +0900").unwrap();
        // 12:00 KST == 03:00 UTC
        assert_eq!(unix, 1_704_078_000);
        assert!(parse_rfc2822_to_unix("not a date").is_none());
    }

    #[test]
    fn strip_html_removes_tags_and_cdata_noise() {
        let html = "<p>APT group <b>exploits</b>&nbsp;zero-day</p>\n<script>x()</script>";
        let out = strip_html(html);
        assert!(out.contains("APT group exploits"));
        assert!(!out.contains('<'));
    }
}
