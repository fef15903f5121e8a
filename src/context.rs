// src/context.rs
// Explicit collaborator bundle constructed once at startup and passed into
// the scheduler, adapters, and dispatcher. Replaces module-level globals.
use std::sync::Arc;

use anyhow::Result;

use crate::config::AppConfig;
use crate::cwe::{CweCatalog, WeaknessLookup};
use crate::notify::discord::{ChannelTransport, DiscordNotifier};
use crate::state::{LastSeenStore, SqliteMarkerStore};
use crate::summarize::{build_summarizer, SharedSummarizer};

#[derive(Clone)]
pub struct AppContext {
    pub summarizer: SharedSummarizer,
    pub transport: Arc<dyn ChannelTransport>,
    pub store: Arc<dyn LastSeenStore>,
    pub weaknesses: Arc<dyn WeaknessLookup>,
}

impl AppContext {
    pub fn initialize(cfg: &AppConfig) -> Result<Self> {
        let store = SqliteMarkerStore::open(&cfg.db_path)?;
        Ok(Self {
            summarizer: build_summarizer(&cfg.openai_api_key, None),
            transport: Arc::new(DiscordNotifier::new(cfg.discord_token.clone())),
            store: Arc::new(store),
            weaknesses: Arc::new(CweCatalog::load_or_empty(&cfg.cwe_catalog_path)),
        })
    }
}
