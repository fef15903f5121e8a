// src/alarm/scheduler.rs
//! The repeating-timer core. One spawned task per adapter: the first tick
//! fires immediately on registration, later ticks every `poll_interval`.
//! The loop owns that adapter's window cursor and last-seen id, so two
//! ticks of the same source can never run concurrently; a timer fire that
//! lands mid-tick is delayed until the running tick completes.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::alarm::dispatcher::{DispatchOutcome, Dispatcher};
use crate::alarm::window::next_window;
use crate::notify::discord::ChannelTransport;
use crate::sources::SourceAdapter;
use crate::state::LastSeenStore;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("alarm_ticks_total", "Completed alarm ticks per source.");
        describe_counter!("alarm_fetch_errors_total", "Tick-level fetch/parse failures.");
        describe_counter!(
            "alarm_fetched_items_total",
            "Raw items returned by source endpoints."
        );
        describe_counter!("alarm_dispatched_total", "Messages delivered to channels.");
        describe_counter!(
            "alarm_delivery_errors_total",
            "Per-item delivery failures (item lost, tick continued)."
        );
        describe_counter!(
            "alarm_format_skipped_total",
            "Payloads whose formatter produced no message."
        );
        describe_counter!(
            "alarm_dedup_skipped_total",
            "Payloads skipped because they matched the last-seen marker."
        );
        describe_counter!(
            "alarm_state_write_errors_total",
            "Marker store writes that failed (in-memory cursor still advanced)."
        );
        describe_gauge!("alarm_last_tick_ts", "Unix ts of the last completed tick.");
    });
}

/// Mutable per-source loop state. Owned by exactly one task.
#[derive(Debug, Default)]
pub struct SourceLoopState {
    pub previous_end: Option<DateTime<Utc>>,
    pub last_id: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub fetched: usize,
    pub dispatched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Run a single fetch → format → dispatch cycle for one adapter.
///
/// Failure semantics, in order of blast radius:
/// * fetch/parse error — tick ends with zero items; the timer continues.
/// * formatter returning `None` — that item is skipped, logged.
/// * `DeliveryError` — that item is lost, the rest still attempt delivery.
/// * marker write error — logged; the in-memory cursor advances anyway so
///   the item is not re-sent during this process lifetime.
pub async fn run_tick(
    adapter: &dyn SourceAdapter,
    state: &mut SourceLoopState,
    dispatcher: &Dispatcher,
    store: &dyn LastSeenStore,
    now: DateTime<Utc>,
) -> TickReport {
    ensure_metrics_described();

    let interval = ChronoDuration::from_std(adapter.options().poll_interval)
        .unwrap_or_else(|_| ChronoDuration::seconds(60));
    let window = next_window(state.previous_end, interval, now);
    state.previous_end = Some(window.end);

    let mut report = TickReport::default();

    let payloads = match adapter.fetch_new_items(window).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(
                source = adapter.name(),
                error = ?e,
                window_start = %window.start,
                window_end = %window.end,
                "tick fetch failed"
            );
            counter!("alarm_fetch_errors_total", "source" => adapter.name()).increment(1);
            return report;
        }
    };
    report.fetched = payloads.len();

    if payloads.is_empty() {
        tracing::debug!(
            source = adapter.name(),
            window_start = %window.start,
            window_end = %window.end,
            "no new items in window"
        );
        return report;
    }

    for payload in &payloads {
        if state.last_id.as_deref() == Some(payload.id.as_str()) {
            counter!("alarm_dedup_skipped_total", "source" => adapter.name()).increment(1);
            report.skipped += 1;
            continue;
        }

        match dispatcher.dispatch(adapter, payload).await {
            Ok(DispatchOutcome::Sent) => {
                report.dispatched += 1;
                state.last_id = Some(payload.id.clone());
                if let Err(e) = store.set_last_id(adapter.name(), &payload.id) {
                    tracing::warn!(
                        source = adapter.name(),
                        error = ?e,
                        "marker write failed; cursor advanced in memory only"
                    );
                    counter!("alarm_state_write_errors_total", "source" => adapter.name())
                        .increment(1);
                }
            }
            Ok(DispatchOutcome::Skipped) => {
                report.skipped += 1;
            }
            Err(e) => {
                tracing::warn!(
                    source = adapter.name(),
                    id = %payload.id,
                    error = %e,
                    "delivery failed for item"
                );
                counter!("alarm_delivery_errors_total", "source" => adapter.name()).increment(1);
                report.failed += 1;
                // Advance in memory regardless, so a flapping channel does
                // not re-alarm the same item every tick.
                state.last_id = Some(payload.id.clone());
            }
        }
    }

    report
}

/// Owns the per-source loops. Fire-and-forget: the returned handles live as
/// long as the process does.
pub struct AlarmScheduler {
    dispatcher: Dispatcher,
    store: Arc<dyn LastSeenStore>,
}

impl AlarmScheduler {
    pub fn new(transport: Arc<dyn ChannelTransport>, store: Arc<dyn LastSeenStore>) -> Self {
        Self {
            dispatcher: Dispatcher::new(transport),
            store,
        }
    }

    pub fn run(&self, adapters: Vec<Arc<dyn SourceAdapter>>) -> Vec<JoinHandle<()>> {
        adapters
            .into_iter()
            .map(|adapter| {
                let dispatcher = self.dispatcher.clone();
                let store = Arc::clone(&self.store);
                tokio::spawn(source_loop(adapter, dispatcher, store))
            })
            .collect()
    }
}

async fn source_loop(
    adapter: Arc<dyn SourceAdapter>,
    dispatcher: Dispatcher,
    store: Arc<dyn LastSeenStore>,
) {
    let last_id = match store.get_last_id(adapter.name()) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(source = adapter.name(), error = ?e, "marker read failed, starting cold");
            None
        }
    };
    let mut state = SourceLoopState {
        previous_end: None,
        last_id,
    };

    let mut ticker = tokio::time::interval(adapter.options().poll_interval);
    // A fire that lands while a tick is in flight queues strictly after it.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        source = adapter.name(),
        interval_secs = adapter.options().poll_interval.as_secs(),
        seeded = state.last_id.is_some(),
        "alarm loop started"
    );

    loop {
        ticker.tick().await; // first tick fires immediately
        let now = Utc::now();
        let report = run_tick(
            adapter.as_ref(),
            &mut state,
            &dispatcher,
            store.as_ref(),
            now,
        )
        .await;

        counter!("alarm_ticks_total", "source" => adapter.name()).increment(1);
        gauge!("alarm_last_tick_ts", "source" => adapter.name()).set(now.timestamp() as f64);
        tracing::info!(
            source = adapter.name(),
            fetched = report.fetched,
            dispatched = report.dispatched,
            skipped = report.skipped,
            failed = report.failed,
            "alarm tick complete"
        );
    }
}
