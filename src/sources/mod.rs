// src/sources/mod.rs
pub mod cve;
pub mod cve_history;
pub mod hackernews;
pub mod threat_intel;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::alarm::window::AlarmWindow;
use crate::notify::DiscordOutbound;

/// Per-adapter static configuration. Immutable after construction and owned
/// exclusively by its adapter instance.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub poll_interval: Duration,
    pub endpoint: String,
    pub channel_id: String,
    /// Timezone label shown next to source-local timestamps in embeds.
    pub timezone: String,
}

/// Uniform payload every adapter produces. `id` is the canonical dedup and
/// display key; `published_at` is the timestamp the adapter windowed on and
/// must fall inside the window that produced the payload.
#[derive(Debug, Clone)]
pub struct EventPayload {
    pub id: String,
    pub summary: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
    pub image_url: Option<String>,
    pub kind: PayloadKind,
}

/// Source-specific detail carried alongside the common fields. One tagged
/// contract for every adapter, old single-item sources included.
#[derive(Debug, Clone)]
pub enum PayloadKind {
    Cve(cve::CveDetail),
    HackerNews(hackernews::HackerNewsDetail),
    ThreatIntel(threat_intel::ThreatIntelDetail),
}

/// The per-feed plug-in contract the alarm scheduler drives.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable source key, also used for the last-seen marker row.
    fn name(&self) -> &'static str;

    fn options(&self) -> &SourceOptions;

    /// Fetch raw items for the window, filter and normalize them, and
    /// enrich with summary text. A fetch/parse failure aborts the whole
    /// tick with zero items; a summarizer failure only downgrades one
    /// payload to its fallback text.
    async fn fetch_new_items(&self, window: AlarmWindow) -> Result<Vec<EventPayload>>;

    /// Convert a payload into a channel-ready message. `None` means "nothing
    /// to send" for this item and is not an error.
    fn format(&self, payload: &EventPayload) -> Option<DiscordOutbound>;
}

/// Fetch mode shared by the adapters: live HTTP or a canned body for tests.
pub(crate) enum FetchMode {
    Http(reqwest::Client),
    Fixture(String),
}

impl FetchMode {
    pub(crate) fn http() -> Self {
        FetchMode::Http(reqwest::Client::new())
    }

    pub(crate) async fn get_text(&self, url: &str, source: &'static str) -> Result<String> {
        match self {
            FetchMode::Fixture(body) => Ok(body.clone()),
            FetchMode::Http(client) => {
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| anyhow::anyhow!("{source} fetch failed: {e}"))?;
                let status = resp.status();
                if !status.is_success() {
                    anyhow::bail!("{source} endpoint returned {status}");
                }
                Ok(resp.text().await?)
            }
        }
    }
}
