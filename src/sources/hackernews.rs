// src/sources/hackernews.rs
//! Hacker News front-page adapter. The Algolia endpoint has no date-range
//! parameter, so the window filter is entirely local, as is the
//! tech/AI/security relevance allowlist (no LLM in the keep/discard path).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;

use super::{EventPayload, FetchMode, PayloadKind, SourceAdapter, SourceOptions};
use crate::alarm::window::AlarmWindow;
use crate::notify::{DiscordOutbound, Embed, LinkButton};
use crate::summarize::SharedSummarizer;
use crate::timefmt::format_kst;

const HN_BRAND_COLOR: u32 = 0xFF6600;
const HN_ICON_URL: &str =
    "https://upload.wikimedia.org/wikipedia/commons/d/d1/Y_Combinator_logo.svg";

#[derive(Debug, Deserialize)]
struct AlgoliaResponse {
    #[serde(default)]
    hits: Vec<AlgoliaHit>,
}

#[derive(Debug, Deserialize)]
struct AlgoliaHit {
    #[serde(rename = "objectID")]
    object_id: String,
    title: Option<String>,
    story_title: Option<String>,
    url: Option<String>,
    story_url: Option<String>,
    author: Option<String>,
    points: Option<i64>,
    num_comments: Option<i64>,
    #[serde(rename = "_tags", default)]
    tags: Vec<String>,
    created_at_i: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct HackerNewsDetail {
    pub title: String,
    pub author: String,
    pub points: i64,
    pub comment_count: i64,
    pub tags: Vec<String>,
}

/// Domain/keyword allowlists for the relevance filter. Purely local and
/// synchronous; defaults match the curated tech/AI/security lists.
#[derive(Debug, Clone)]
pub struct RelevanceLists {
    pub domains: Vec<&'static str>,
    pub keywords: Vec<&'static str>,
}

impl Default for RelevanceLists {
    fn default() -> Self {
        Self {
            domains: vec![
                // tech
                "github.com",
                "gitlab.com",
                "medium.com",
                "dev.to",
                "cloudflare.com",
                "aws.amazon.com",
                "azure.microsoft.com",
                "googleblog.com",
                "engineering.linkedin.com",
                "engineering.fb.com",
                "arstechnica.com",
                "linux.org",
                "kernel.org",
                "rust-lang.org",
                "python.org",
                "golang.org",
                "webkit.org",
                "mozilla.org",
                "chromium.org",
                "stackoverflow.blog",
                // AI
                "openai.com",
                "huggingface.co",
                "anthropic.com",
                "deepmind.com",
                "pytorch.org",
                "tensorflow.org",
                "arxiv.org",
                "kaggle.com",
                // security
                "krebsonsecurity.com",
                "bleepingcomputer.com",
                "securityweek.com",
                "nvd.nist.gov",
                "cve.mitre.org",
                "hackaday.com",
                "malwarebytes.com",
                "research.checkpoint.com",
            ],
            keywords: vec![
                // tech
                "software",
                "hardware",
                "programming",
                "developer",
                "engineer",
                "linux",
                "kernel",
                "database",
                "compiler",
                "gpu",
                "cpu",
                "chip",
                "infra",
                "cloud",
                "server",
                "architecture",
                "performance",
                "open source",
                // AI
                "ai",
                "artificial intelligence",
                "machine learning",
                "deep learning",
                "gpt",
                "llm",
                "transformer",
                "neural",
                // security
                "security",
                "cybersecurity",
                "exploit",
                "vulnerability",
                "cve",
                "sql injection",
                "malware",
                "rce",
                "xss",
                "0-day",
            ],
        }
    }
}

fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.rsplit('@').next()?;
    let host = host.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

impl RelevanceLists {
    pub fn is_relevant(&self, title: &str, url: &str) -> bool {
        if let Some(host) = host_of(url) {
            if self.domains.iter().any(|d| host.contains(d)) {
                return true;
            }
        }
        let lower = title.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k))
    }
}

pub struct HackerNewsAdapter {
    options: SourceOptions,
    mode: FetchMode,
    summarizer: SharedSummarizer,
    relevance: RelevanceLists,
}

impl HackerNewsAdapter {
    pub fn new(options: SourceOptions, summarizer: SharedSummarizer) -> Self {
        Self {
            options,
            mode: FetchMode::http(),
            summarizer,
            relevance: RelevanceLists::default(),
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
            relevance: RelevanceLists::default(),
        }
    }

    pub fn with_relevance(mut self, relevance: RelevanceLists) -> Self {
        self.relevance = relevance;
        self
    }

    async fn build_payload(&self, hit: &AlgoliaHit, published_at: DateTime<Utc>) -> EventPayload {
        let id = hit.object_id.clone();
        let title = hit
            .title
            .clone()
            .or_else(|| hit.story_title.clone())
            .unwrap_or_else(|| "(제목 없음)".to_string());
        let link = hit
            .url
            .clone()
            .or_else(|| hit.story_url.clone())
            .unwrap_or_else(|| format!("https://news.ycombinator.com/item?id={id}"));

        let prompt = [
            "다음 글의 핵심 내용을 한국어로 자연스럽게 요약해줘. 3~5줄 사이로 요약해줘.".to_string(),
            "주관적 의견 없이 사실 위주로 간결하게 정리해줘.".to_string(),
            String::new(),
            format!("제목: {title}"),
            format!("링크: {link}"),
            format!("포인트: {}", hit.points.unwrap_or(0)),
            format!("댓글 수: {}", hit.num_comments.unwrap_or(0)),
        ]
        .join("\n");

        // Summarizer failure falls back to the raw title: never empty.
        let summary = match self.summarizer.summarize(&prompt).await {
            Some(s) if !s.trim().is_empty() => s.replace(". ", ".\n"),
            _ => title.clone(),
        };

        EventPayload {
            id,
            summary,
            link,
            published_at,
            image_url: None,
            kind: PayloadKind::HackerNews(HackerNewsDetail {
                title,
                author: hit.author.clone().unwrap_or_else(|| "unknown".to_string()),
                points: hit.points.unwrap_or(0),
                comment_count: hit.num_comments.unwrap_or(0),
                tags: hit.tags.clone(),
            }),
        }
    }
}

#[async_trait]
impl SourceAdapter for HackerNewsAdapter {
    fn name(&self) -> &'static str {
        "hackernews"
    }

    fn options(&self) -> &SourceOptions {
        &self.options
    }

    async fn fetch_new_items(&self, window: AlarmWindow) -> Result<Vec<EventPayload>> {
        let t0 = std::time::Instant::now();
        let body = self.mode.get_text(&self.options.endpoint, "hackernews").await?;
        let parsed: AlgoliaResponse =
            serde_json::from_str(&body).context("parsing algolia front-page json")?;
        counter!("alarm_fetched_items_total", "source" => "hackernews")
            .increment(parsed.hits.len() as u64);

        let mut payloads = Vec::new();
        for hit in &parsed.hits {
            let title = hit
                .title
                .as_deref()
                .or(hit.story_title.as_deref())
                .unwrap_or_default();
            let link = hit
                .url
                .as_deref()
                .or(hit.story_url.as_deref())
                .unwrap_or_default();

            if !self.relevance.is_relevant(title, link) {
                continue;
            }

            let Some(created) = hit.created_at_i else {
                continue;
            };
            let Some(published_at) = Utc.timestamp_opt(created, 0).single() else {
                continue;
            };
            // Front page carries older stories; only the window decides.
            if !window.contains(published_at) {
                continue;
            }

            payloads.push(self.build_payload(hit, published_at).await);
        }

        histogram!("alarm_fetch_ms", "source" => "hackernews")
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(payloads)
    }

    fn format(&self, payload: &EventPayload) -> Option<DiscordOutbound> {
        let PayloadKind::HackerNews(detail) = &payload.kind else {
            return None;
        };

        let raw_title = detail.title.trim();
        if raw_title.is_empty() {
            return None;
        }
        let title = if raw_title.chars().count() > 256 {
            let cut: String = raw_title.chars().take(253).collect();
            format!("{cut}...")
        } else {
            raw_title.to_string()
        };

        let embed = Embed::new()
            .author("Hacker News", Some(HN_ICON_URL.to_string()))
            .title(title)
            .url(payload.link.clone())
            .description(payload.summary.clone())
            .inline_field("Points", detail.points.to_string())
            .inline_field("Comments", detail.comment_count.to_string())
            .field("작성 시간 (KST)", format_kst(payload.published_at))
            .footer(format!("작성자: {}", detail.author))
            .timestamp(payload.published_at)
            .color(HN_BRAND_COLOR);

        Some(DiscordOutbound {
            content: Some(payload.link.clone()),
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
    fn relevance_matches_domain_or_keyword() {
        let rel = RelevanceLists::default();
        assert!(rel.is_relevant("Whatever", "https://github.com/foo/bar"));
        assert!(rel.is_relevant("A new SQL injection in the wild", "https://example.com/x"));
        assert!(!rel.is_relevant("Cooking pasta properly", "https://food.example.com/pasta"));
    }

    #[test]
    fn host_extraction_handles_ports_and_paths() {
        assert_eq!(host_of("https://kernel.org/releases"), Some("kernel.org"));
        assert_eq!(host_of("http://arxiv.org:443/abs/1"), Some("arxiv.org"));
        assert_eq!(host_of("not a url"), Some("not a url")); // still harmless
        assert_eq!(host_of(""), None);
    }
}
