// src/config.rs
// All runtime knobs in one place, built once at process start and handed to
// the scheduler/adapters by reference — no ambient singletons.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::sources::cve::NVD_CVE_ENDPOINT;
use crate::sources::cve_history::SignificanceConfig;
use crate::sources::SourceOptions;

pub const HN_FRONT_PAGE_ENDPOINT: &str = "https://hn.algolia.com/api/v1/search?tags=front_page";
pub const THREAT_INTEL_FEED_ENDPOINT: &str =
    "https://feeds.feedburner.com/threatintelligence/pvexyqv7v0v";

const ENV_SIGNIFICANCE_PATH: &str = "SIGNIFICANCE_CONFIG_PATH";
const DEFAULT_SIGNIFICANCE_PATH: &str = "config/significance.toml";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub discord_token: String,
    pub openai_api_key: String,
    /// Channel for CVE alarms (`DISCORD_CVE_ALARM_ID`).
    pub cve_channel_id: String,
    /// Channel for HN / threat-intel alarms (`DISCORD_CHANNEL_ID`).
    pub news_channel_id: String,
    pub db_path: PathBuf,
    pub cwe_catalog_path: PathBuf,
    pub thumbnail_dir: PathBuf,
    pub author_icon_url: Option<String>,
    pub port: u16,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let discord_token =
            std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN is required")?;
        let port = env_or("PORT", "3000")
            .parse::<u16>()
            .context("PORT must be a number")?;

        Ok(Self {
            discord_token,
            openai_api_key: env_or("OPENAI_API_KEY", ""),
            cve_channel_id: env_or("DISCORD_CVE_ALARM_ID", ""),
            news_channel_id: env_or("DISCORD_CHANNEL_ID", ""),
            db_path: PathBuf::from(env_or("SENTINEL_DB_PATH", "data/sentinel.db")),
            cwe_catalog_path: PathBuf::from(env_or("CWE_CATALOG_PATH", "config/cwe_ko.json")),
            thumbnail_dir: PathBuf::from(env_or("THUMBNAIL_DIR", "assets/thumbnails")),
            author_icon_url: std::env::var("AUTHOR_ICON_URL").ok().filter(|s| !s.is_empty()),
            port,
        })
    }

    pub fn cve_options(&self) -> SourceOptions {
        SourceOptions {
            poll_interval: Duration::from_secs(60 * 10),
            endpoint: NVD_CVE_ENDPOINT.to_string(),
            channel_id: self.cve_channel_id.clone(),
            timezone: "UTC".to_string(),
        }
    }

    pub fn hackernews_options(&self) -> SourceOptions {
        SourceOptions {
            poll_interval: Duration::from_secs(60 * 5),
            endpoint: HN_FRONT_PAGE_ENDPOINT.to_string(),
            channel_id: self.news_channel_id.clone(),
            timezone: "UTC".to_string(),
        }
    }

    pub fn threat_intel_options(&self) -> SourceOptions {
        SourceOptions {
            poll_interval: Duration::from_secs(60 * 30),
            endpoint: THREAT_INTEL_FEED_ENDPOINT.to_string(),
            channel_id: self.news_channel_id.clone(),
            timezone: "UTC".to_string(),
        }
    }
}

/// Load the significance policy:
/// 1) $SIGNIFICANCE_CONFIG_PATH
/// 2) config/significance.toml
/// 3) built-in defaults
pub fn load_significance_default() -> SignificanceConfig {
    let path = std::env::var(ENV_SIGNIFICANCE_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SIGNIFICANCE_PATH));
    if !path.exists() {
        return SignificanceConfig::default();
    }
    match load_significance_from(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = ?e, path = %path.display(), "significance config unreadable, using defaults");
            SignificanceConfig::default()
        }
    }
}

pub fn load_significance_from(path: &Path) -> Result<SignificanceConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading significance config from {}", path.display()))?;
    let cfg: SignificanceConfig =
        toml::from_str(&content).context("parsing significance toml")?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn significance_toml_overrides_hint_list() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, r#"exploit_url_hints = ["sploitus", "exploit-db"]"#).unwrap();

        let cfg = load_significance_from(f.path()).unwrap();
        assert_eq!(cfg.exploit_url_hints, vec!["sploitus", "exploit-db"]);
    }

    #[serial_test::serial]
    #[test]
    fn significance_defaults_when_nothing_configured() {
        std::env::remove_var(ENV_SIGNIFICANCE_PATH);
        let cfg = load_significance_default();
        assert!(cfg.exploit_url_hints.iter().any(|h| h == "metasploit"));
    }
}
