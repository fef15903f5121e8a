//! Security-feed alarm bot — Binary Entrypoint
//! Wires config, collaborators, per-source alarm loops, and the small Axum
//! surface (health check, /metrics, static thumbnails).

use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nanami_sentinel::alarm::AlarmScheduler;
use nanami_sentinel::api;
use nanami_sentinel::config::{load_significance_default, AppConfig};
use nanami_sentinel::context::AppContext;
use nanami_sentinel::metrics::Metrics;
use nanami_sentinel::sources::cve::CveAdapter;
use nanami_sentinel::sources::hackernews::HackerNewsAdapter;
use nanami_sentinel::sources::threat_intel::ThreatIntelAdapter;
use nanami_sentinel::sources::SourceAdapter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env()?;
    let metrics = Metrics::init();
    let ctx = AppContext::initialize(&cfg)?;

    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(
            CveAdapter::new(
                cfg.cve_options(),
                ctx.summarizer.clone(),
                ctx.weaknesses.clone(),
                load_significance_default(),
            )
            .with_author_icon(cfg.author_icon_url.clone()),
        ),
        Arc::new(HackerNewsAdapter::new(
            cfg.hackernews_options(),
            ctx.summarizer.clone(),
        )),
        Arc::new(ThreatIntelAdapter::new(
            cfg.threat_intel_options(),
            ctx.summarizer.clone(),
        )),
    ];

    tracing::info!(adapters = adapters.len(), "registering alarm loops");
    let scheduler = AlarmScheduler::new(ctx.transport.clone(), ctx.store.clone());
    let _handles = scheduler.run(adapters);

    let router = api::create_router(&cfg.thumbnail_dir, &metrics);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.port)).await?;
    tracing::info!(port = cfg.port, "health server listening");
    axum::serve(listener, router).await?;

    Ok(())
}
