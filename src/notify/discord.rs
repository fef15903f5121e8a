// src/notify/discord.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{DiscordOutbound, Embed, LinkButton};
use crate::error::DeliveryError;

/// Message-channel transport consumed by the dispatcher. Exactly one
/// external transmission per successful call; a failure is terminal for
/// that item in that tick (no retry/backoff here).
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn send(&self, channel_id: &str, message: &DiscordOutbound) -> Result<(), DeliveryError>;
}

/// Posts alarm messages through the Discord REST API with a bot token.
#[derive(Clone)]
pub struct DiscordNotifier {
    token: String,
    client: Client,
    timeout: Duration,
    api_base: String,
}

impl DiscordNotifier {
    pub fn new(token: String) -> Self {
        Self {
            token,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            api_base: "https://discord.com/api/v10".to_string(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Point the notifier at a different base URL (local stub in tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}

// REST body for POST /channels/{id}/messages. The link button becomes a
// single action row with one link-style (5) button component.
#[derive(Serialize)]
struct MessageBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    embeds: &'a [Embed],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    components: Vec<ActionRow<'a>>,
}

#[derive(Serialize)]
struct ActionRow<'a> {
    #[serde(rename = "type")]
    kind: u8, // 1 = action row
    components: Vec<ButtonComponent<'a>>,
}

#[derive(Serialize)]
struct ButtonComponent<'a> {
    #[serde(rename = "type")]
    kind: u8, // 2 = button
    style: u8, // 5 = link
    label: &'a str,
    url: &'a str,
}

fn action_rows(button: Option<&LinkButton>) -> Vec<ActionRow<'_>> {
    match button {
        Some(b) => vec![ActionRow {
            kind: 1,
            components: vec![ButtonComponent {
                kind: 2,
                style: 5,
                label: &b.label,
                url: &b.url,
            }],
        }],
        None => Vec::new(),
    }
}

#[async_trait]
impl ChannelTransport for DiscordNotifier {
    async fn send(&self, channel_id: &str, message: &DiscordOutbound) -> Result<(), DeliveryError> {
        if channel_id.trim().is_empty() {
            return Err(DeliveryError::UnknownChannel(channel_id.to_string()));
        }

        let body = MessageBody {
            content: message.content.as_deref(),
            embeds: &message.embeds,
            components: action_rows(message.link_button.as_ref()),
        };

        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        // 404/403 mean the configured channel id is wrong or inaccessible.
        if status.as_u16() == 404 || status.as_u16() == 403 {
            return Err(DeliveryError::UnknownChannel(channel_id.to_string()));
        }
        let text = resp.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body: text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_channel_id_is_unknown_channel() {
        let notifier = DiscordNotifier::new("token".into());
        let err = notifier
            .send("", &DiscordOutbound::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::UnknownChannel(_)));
    }

    #[test]
    fn link_button_serializes_as_link_style_row() {
        let button = LinkButton {
            label: "상세 보기".into(),
            url: "https://nvd.nist.gov/vuln/detail/CVE-2024-0001".into(),
        };
        let rows = action_rows(Some(&button));
        let json = serde_json::to_value(&rows).unwrap();
        assert_eq!(json[0]["type"], 1);
        assert_eq!(json[0]["components"][0]["style"], 5);
        assert_eq!(json[0]["components"][0]["label"], "상세 보기");
    }
}
