// src/summarize.rs
//! Summarization collaborator: provider abstraction over the external
//! text-generation service. Adapters only see `Option<String>` — any
//! failure (transport, quota, empty choice) is `None`, and the adapter
//! substitutes its own deterministic fallback text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Returns the generated text, or `None` on any failure. Never errors.
    async fn summarize(&self, prompt: &str) -> Option<String>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type SharedSummarizer = Arc<dyn Summarizer>;

/// System prompt shared by all alarm summaries. The per-payload user prompt
/// carries the concrete output contract (plain text or JSON).
const SUMMARY_SYSTEM_PROMPT: &str = "\
You are an expert summarization engine for cybersecurity and technical news.\n\
Rules:\n\
- Do not invent facts; never hallucinate vulnerabilities or impacts.\n\
- Prefer Korean output unless the caller asks otherwise.\n\
- If the text is security-related, state the affected component, what the\n\
  flaw allows, required conditions, and estimated severity.\n\
- Be concise and factual; avoid ambiguous phrasing.";

/// OpenAI chat-completions provider. Requires `OPENAI_API_KEY`.
pub struct OpenAiSummarizer {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiSummarizer {
    /// `model_override`: pass Some("gpt-4.1-mini") to override the default.
    pub fn new(api_key: String, model_override: Option<&str>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("nanami-sentinel/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key,
            model: model_override.unwrap_or("gpt-4.1-mini").to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, prompt: &str) -> Option<String> {
        if self.api_key.is_empty() {
            return None;
        }
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SUMMARY_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = ?e, "summarizer request failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "summarizer returned non-2xx");
            return None;
        }

        let parsed: ChatResponse = match resp.json().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = ?e, "summarizer response body unreadable");
                return None;
            }
        };
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// No-op summarizer used when no API key is configured.
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    async fn summarize(&self, _prompt: &str) -> Option<String> {
        None
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic summarizer for tests: always returns the configured value.
pub struct FixedSummarizer(pub Option<String>);

#[async_trait]
impl Summarizer for FixedSummarizer {
    async fn summarize(&self, _prompt: &str) -> Option<String> {
        self.0.clone()
    }

    fn provider_name(&self) -> &'static str {
        "fixed"
    }
}

/// Factory used at startup: real provider when a key is present, disabled
/// otherwise (alarms still flow, with fallback summaries).
pub fn build_summarizer(api_key: &str, model_override: Option<&str>) -> SharedSummarizer {
    if api_key.trim().is_empty() {
        tracing::warn!("no OPENAI_API_KEY configured; summaries fall back to placeholders");
        Arc::new(DisabledSummarizer)
    } else {
        Arc::new(OpenAiSummarizer::new(api_key.to_string(), model_override))
    }
}

/// Models routinely wrap JSON in code fences or prose despite instructions.
/// Extract the outermost `{ ... }` object so `serde_json` has a chance.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}
