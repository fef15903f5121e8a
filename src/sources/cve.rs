// src/sources/cve.rs
//! NVD CVE adapter. Two variants share the endpoint: NEW queries by
//! published date, MODIFIED by last-modified date plus a change-history
//! lookup whose details go through the significance filter. The NVD date
//! parameters are approximate, so every item is re-checked against the
//! window locally before it becomes a payload.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;
use std::sync::Arc;

use super::{EventPayload, PayloadKind, SourceAdapter, SourceOptions};
use crate::alarm::window::AlarmWindow;
use crate::cwe::WeaknessLookup;
use crate::notify::{severity_to_color, DiscordOutbound, Embed, LinkButton};
use crate::sources::cve_history::{
    filter_significant_details, CveHistoryResponse, SignificanceConfig, SignificantDetail,
};
use crate::summarize::{extract_json_object, SharedSummarizer};
use crate::timefmt::format_kst;

pub const NVD_CVE_ENDPOINT: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";
pub const NVD_HISTORY_ENDPOINT: &str = "https://services.nvd.nist.gov/rest/json/cvehistory/2.0";
const RESULTS_PER_PAGE: u32 = 200;

// ---------------------------------------------------------------
// NVD response model (subset we consume)
// ---------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NvdResponse {
    #[serde(default)]
    pub vulnerabilities: Vec<NvdItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NvdItem {
    pub cve: NvdCve,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NvdCve {
    pub id: String,
    #[serde(default)]
    pub source_identifier: String,
    pub published: Option<String>,
    pub last_modified: Option<String>,
    #[serde(default)]
    pub vuln_status: String,
    #[serde(default)]
    pub descriptions: Vec<LangValue>,
    pub metrics: Option<NvdMetrics>,
    #[serde(default)]
    pub weaknesses: Vec<Weakness>,
    #[serde(default)]
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LangValue {
    pub lang: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NvdMetrics {
    #[serde(default)]
    pub cvss_metric_v40: Vec<CvssMetric>,
    #[serde(default)]
    pub cvss_metric_v31: Vec<CvssMetric>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvssMetric {
    pub cvss_data: CvssData,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvssData {
    #[serde(default)]
    pub base_score: f64,
    #[serde(default)]
    pub base_severity: String,
    #[serde(default)]
    pub vector_string: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Weakness {
    #[serde(default)]
    pub description: Vec<LangValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reference {
    pub url: String,
    #[serde(default)]
    pub source: String,
}

impl NvdCve {
    fn primary_cvss(&self) -> Option<&CvssData> {
        let m = self.metrics.as_ref()?;
        m.cvss_metric_v40
            .first()
            .or_else(|| m.cvss_metric_v31.first())
            .map(|x| &x.cvss_data)
    }

    fn primary_weakness_id(&self) -> Option<String> {
        self.weaknesses
            .first()
            .and_then(|w| w.description.first())
            .map(|d| d.value.clone())
    }

    fn english_description(&self) -> String {
        self.descriptions
            .iter()
            .filter(|d| d.lang == "en")
            .map(|d| d.value.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ---------------------------------------------------------------
// Payload detail
// ---------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CveVariant {
    New,
    Modified,
}

#[derive(Debug, Clone)]
pub struct CveDetail {
    pub variant: CveVariant,
    pub cve_id: String,
    pub provider: String,
    pub base_score: f64,
    pub base_severity: String,
    pub weakness_id: Option<String>,
    pub vector_summary: String,
    pub reference_digest: String,
    /// Original publication date, shown on both variants.
    pub published: Option<DateTime<Utc>>,
    pub modified_date: Option<DateTime<Utc>>,
    pub modified_summary: Option<String>,
    pub significant: Vec<SignificantDetail>,
}

/// Korean summary JSON the summarizer is asked to produce.
#[derive(Debug, Deserialize)]
struct CveSummary {
    summary: Option<String>,
    #[serde(rename = "vectorSummary")]
    vector_summary: Option<String>,
    #[serde(rename = "referenceDigest")]
    reference_digest: Option<String>,
}

const FALLBACK_SUMMARY: &str = "요약 생성 실패";
const FALLBACK_VECTOR: &str = "벡터 요약 생성 실패";
const FALLBACK_DIGEST: &str = "참고 링크 생성 실패";
const FALLBACK_MODIFIED: &str = "변경 요약 생성 실패";

/// NVD timestamps come without an offset ("2024-01-01T12:00:00.963"); they
/// are UTC by definition. Accept RFC 3339 as well.
pub fn parse_nvd_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// "cna@vuldb.com" → "vuldb.com"; bare domains lose everything below the
/// registrable part.
fn normalize_provider(source_identifier: &str) -> String {
    let domain = source_identifier
        .rsplit('@')
        .next()
        .unwrap_or(source_identifier);
    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() > 2 {
        parts[parts.len() - 2..].join(".")
    } else {
        domain.to_string()
    }
}

// ---------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------

enum CveFetchMode {
    Http(reqwest::Client),
    Fixture {
        published: String,
        modified: String,
        history: String,
    },
}

pub struct CveAdapter {
    options: SourceOptions,
    mode: CveFetchMode,
    history_endpoint: String,
    summarizer: SharedSummarizer,
    weaknesses: Arc<dyn WeaknessLookup>,
    significance: SignificanceConfig,
    author_icon_url: Option<String>,
}

impl CveAdapter {
    pub fn new(
        options: SourceOptions,
        summarizer: SharedSummarizer,
        weaknesses: Arc<dyn WeaknessLookup>,
        significance: SignificanceConfig,
    ) -> Self {
        Self {
            options,
            mode: CveFetchMode::Http(reqwest::Client::new()),
            history_endpoint: NVD_HISTORY_ENDPOINT.to_string(),
            summarizer,
            weaknesses,
            significance,
            author_icon_url: None,
        }
    }

    /// Canned bodies for the three endpoints this adapter touches.
    pub fn from_fixture(
        options: SourceOptions,
        published_json: &str,
        modified_json: &str,
        history_json: &str,
        summarizer: SharedSummarizer,
        weaknesses: Arc<dyn WeaknessLookup>,
    ) -> Self {
        Self {
            options,
            mode: CveFetchMode::Fixture {
                published: published_json.to_string(),
                modified: modified_json.to_string(),
                history: history_json.to_string(),
            },
            history_endpoint: NVD_HISTORY_ENDPOINT.to_string(),
            summarizer,
            weaknesses,
            significance: SignificanceConfig::default(),
            author_icon_url: None,
        }
    }

    pub fn with_author_icon(mut self, url: Option<String>) -> Self {
        self.author_icon_url = url;
        self
    }

    fn published_url(&self, window: &AlarmWindow) -> String {
        format!(
            "{}?pubStartDate={}&pubEndDate={}&startIndex=0&resultsPerPage={}",
            self.options.endpoint,
            window.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            window.end.to_rfc3339_opts(SecondsFormat::Millis, true),
            RESULTS_PER_PAGE
        )
    }

    fn modified_url(&self, window: &AlarmWindow) -> String {
        format!(
            "{}?lastModStartDate={}&lastModEndDate={}&startIndex=0&resultsPerPage={}",
            self.options.endpoint,
            window.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            window.end.to_rfc3339_opts(SecondsFormat::Millis, true),
            RESULTS_PER_PAGE
        )
    }

    async fn http_get(client: &reqwest::Client, url: &str) -> Result<String> {
        let resp = client
            .get(url)
            .send()
            .await
            .with_context(|| format!("nvd fetch failed: {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("nvd endpoint returned {status}");
        }
        Ok(resp.text().await?)
    }

    async fn fetch_feed(&self, url: &str, which: Feed) -> Result<NvdResponse> {
        let body = match &self.mode {
            CveFetchMode::Fixture {
                published,
                modified,
                ..
            } => match which {
                Feed::Published => published.clone(),
                Feed::Modified => modified.clone(),
            },
            CveFetchMode::Http(client) => Self::http_get(client, url).await?,
        };
        serde_json::from_str(&body).context("parsing nvd cves json")
    }

    async fn fetch_history(&self, cve_id: &str) -> Result<CveHistoryResponse> {
        let body = match &self.mode {
            CveFetchMode::Fixture { history, .. } => history.clone(),
            CveFetchMode::Http(client) => {
                let url = format!("{}?cveId={}", self.history_endpoint, cve_id);
                Self::http_get(client, &url).await?
            }
        };
        serde_json::from_str(&body).context("parsing nvd cvehistory json")
    }

    async fn summarize_cve(&self, cve: &NvdCve) -> (String, String, String) {
        let cvss = cve.primary_cvss();
        let prompt = format!(
            "다음 CVE 정보로 한국어 요약 JSON을 생성해.\n\n\
             [CVE 핵심 정보]\n- cveId: {}\n- published: {}\n- status: {}\n- description_en: {}\n\n\
             [CVSS]\n- baseScore: {}\n- baseSeverity: {}\n- vector: {}\n\n\
             [참고 링크]\n{}\n\n\
             출력(JSON만):\n\
             {{\"summary\": \"2~3줄. 무엇/대상/영향/대응 힌트\", \
             \"vectorSummary\": \"1줄. 공격경로+권한/사용자개입+영향 순서\", \
             \"referenceDigest\": \"1~2줄. 패치/권고가 확인된 경우에만 구체적으로, 없으면 보수적으로\"}}\n\
             규칙: 추측 금지. NOT_DEFINED 언급 금지.",
            cve.id,
            cve.published.as_deref().unwrap_or(""),
            cve.vuln_status,
            cve.english_description(),
            cvss.map(|c| c.base_score).unwrap_or(0.0),
            cvss.map(|c| c.base_severity.as_str()).unwrap_or(""),
            cvss.map(|c| c.vector_string.as_str()).unwrap_or(""),
            cve.references
                .iter()
                .map(|r| r.url.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        );

        let parsed = match self.summarizer.summarize(&prompt).await {
            Some(raw) => extract_json_object(&raw)
                .and_then(|obj| serde_json::from_str::<CveSummary>(obj).ok()),
            None => None,
        };

        match parsed {
            Some(s) => (
                s.summary
                    .filter(|x| !x.trim().is_empty())
                    .unwrap_or_else(|| FALLBACK_SUMMARY.to_string()),
                s.vector_summary
                    .filter(|x| !x.trim().is_empty())
                    .unwrap_or_else(|| FALLBACK_VECTOR.to_string()),
                s.reference_digest
                    .filter(|x| !x.trim().is_empty())
                    .unwrap_or_else(|| FALLBACK_DIGEST.to_string()),
            ),
            None => (
                FALLBACK_SUMMARY.to_string(),
                FALLBACK_VECTOR.to_string(),
                FALLBACK_DIGEST.to_string(),
            ),
        }
    }

    async fn summarize_changes(
        &self,
        cve_id: &str,
        event_name: &str,
        created: &str,
        significant: &[SignificantDetail],
    ) -> String {
        let details_json =
            serde_json::to_string_pretty(significant).unwrap_or_else(|_| "[]".to_string());
        let prompt = format!(
            "다음은 CVE 변경 이력에서 이번 이벤트로 실제로 변경된 내용만이다.\n\
             - 전체 CVE 설명을 다시 쓰지 마라.\n- 과거 상태를 추정하지 마라.\n\
             - 이번 변경으로 무엇이 어떻게 달라졌는지만 한국어로 2~3줄 요약하라.\n\
             - 가능하면 보안 영향(위험도 상승/하락, 대응 필요 여부)을 한 줄로 덧붙여라.\n\n\
             [변경 이벤트]\ncveid: {cve_id}\neventName: {event_name}\ncreated: {created}\n변경 내용: {details_json}",
        );

        self.summarizer
            .summarize(&prompt)
            .await
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_MODIFIED.to_string())
    }

    async fn build_payload(
        &self,
        item: &NvdItem,
        variant: CveVariant,
        window: &AlarmWindow,
    ) -> Option<EventPayload> {
        let cve = &item.cve;
        let published = cve.published.as_deref().and_then(parse_nvd_datetime);
        let last_modified = cve.last_modified.as_deref().and_then(parse_nvd_datetime);

        // Window on the timestamp the variant queried by.
        let anchor = match variant {
            CveVariant::New => published?,
            CveVariant::Modified => last_modified?,
        };
        if !window.contains(anchor) {
            counter!("alarm_window_filtered_total", "source" => "cve").increment(1);
            return None;
        }

        let (summary, vector_summary, reference_digest) = self.summarize_cve(cve).await;

        let mut detail = CveDetail {
            variant,
            cve_id: cve.id.clone(),
            provider: normalize_provider(&cve.source_identifier),
            base_score: cve.primary_cvss().map(|c| c.base_score).unwrap_or(0.0),
            base_severity: cve
                .primary_cvss()
                .map(|c| c.base_severity.clone())
                .unwrap_or_else(|| "LOW".to_string()),
            weakness_id: cve.primary_weakness_id(),
            vector_summary,
            reference_digest,
            published,
            modified_date: None,
            modified_summary: None,
            significant: Vec::new(),
        };

        let id = match variant {
            CveVariant::New => cve.id.clone(),
            // Distinct key per modification event so a NEW alarm for the
            // same CVE never shadows the MODIFIED one.
            CveVariant::Modified => format!("{}@{}", cve.id, anchor.to_rfc3339()),
        };

        if variant == CveVariant::Modified {
            // A history hiccup downgrades this one payload, not the tick.
            match self.fetch_history(&cve.id).await {
                Ok(history) => {
                    if let Some(wrapper) = history.cve_changes.first() {
                        let change = &wrapper.change;
                        let significant =
                            filter_significant_details(&change.details, &self.significance);
                        detail.modified_date = parse_nvd_datetime(&change.created);
                        detail.modified_summary = Some(
                            self.summarize_changes(
                                &cve.id,
                                &change.event_name,
                                &change.created,
                                &significant,
                            )
                            .await,
                        );
                        detail.significant = significant;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = ?e, cve = %cve.id, "cve history fetch failed");
                    counter!("alarm_history_errors_total", "source" => "cve").increment(1);
                    detail.modified_summary = Some(FALLBACK_MODIFIED.to_string());
                }
            }
            if detail.modified_date.is_none() {
                detail.modified_date = last_modified;
            }
        }

        Some(EventPayload {
            id,
            summary,
            link: format!("https://nvd.nist.gov/vuln/detail/{}", cve.id),
            published_at: anchor,
            image_url: self.author_icon_url.clone(),
            kind: PayloadKind::Cve(detail),
        })
    }
}

enum Feed {
    Published,
    Modified,
}

#[async_trait]
impl SourceAdapter for CveAdapter {
    fn name(&self) -> &'static str {
        "cve"
    }

    fn options(&self) -> &SourceOptions {
        &self.options
    }

    async fn fetch_new_items(&self, window: AlarmWindow) -> Result<Vec<EventPayload>> {
        if window.is_empty() {
            return Ok(Vec::new());
        }
        let t0 = std::time::Instant::now();

        let published = self
            .fetch_feed(&self.published_url(&window), Feed::Published)
            .await?;
        let modified = self
            .fetch_feed(&self.modified_url(&window), Feed::Modified)
            .await?;
        counter!("alarm_fetched_items_total", "source" => "cve")
            .increment((published.vulnerabilities.len() + modified.vulnerabilities.len()) as u64);

        let mut payloads = Vec::new();
        for item in &published.vulnerabilities {
            if let Some(p) = self.build_payload(item, CveVariant::New, &window).await {
                payloads.push(p);
            }
        }
        for item in &modified.vulnerabilities {
            if let Some(p) = self.build_payload(item, CveVariant::Modified, &window).await {
                payloads.push(p);
            }
        }

        histogram!("alarm_fetch_ms", "source" => "cve")
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(payloads)
    }

    fn format(&self, payload: &EventPayload) -> Option<DiscordOutbound> {
        let PayloadKind::Cve(detail) = &payload.kind else {
            return None;
        };

        let author_name = match detail.variant {
            CveVariant::New => "신규 NVD CVE",
            CveVariant::Modified => "변경 NVD CVE",
        };

        let weakness_value = match &detail.weakness_id {
            Some(id) => match self.weaknesses.get_localized_weakness(id) {
                Some(w) => format!(
                    " - {id}\n - 명칭: {} ({})\n - 설명: {}",
                    w.name_ko, w.name_en, w.description_ko
                ),
                None => format!(" - {id}"),
            },
            None => " - 미분류".to_string(),
        };

        let mut embed = Embed::new()
            .author(author_name, self.author_icon_url.clone())
            .title(detail.cve_id.clone())
            .url(payload.link.clone())
            .color(severity_to_color(&detail.base_severity))
            .timestamp(Utc::now())
            .field("제공자", detail.provider.clone())
            .field("취약점", weakness_value)
            .inline_field(
                "CVSS",
                format!(
                    " - 점수: {}\n - 요약: {}",
                    detail.base_score, detail.vector_summary
                ),
            )
            .field("내용", payload.summary.clone());

        if detail.variant == CveVariant::Modified {
            embed = embed.field(
                "수정 내용",
                detail
                    .modified_summary
                    .clone()
                    .unwrap_or_else(|| FALLBACK_MODIFIED.to_string()),
            );
            if let Some(modified) = detail.modified_date {
                embed = embed.field(
                    "수정일",
                    format!("{}/ {}", self.options.timezone, format_kst(modified)),
                );
            }
        }

        if let Some(published) = detail.published {
            embed = embed.field(
                "발행일",
                format!("{}/ {}", self.options.timezone, format_kst(published)),
            );
        }
        embed = embed
            .field("참고 정보", detail.reference_digest.clone())
            .field("URL", payload.link.clone())
            .footer("NVD CVE");

        Some(DiscordOutbound {
            content: None,
            embeds: vec![embed],
            link_button: Some(LinkButton {
                label: "상세 보기".to_string(),
                url: payload.link.clone(),
            }),
        })
    }
}
