// src/alarm/window.rs
use chrono::{DateTime, Duration, Utc};

/// Half-open UTC interval `[start, end)` that one alarm tick is responsible
/// for covering. Consecutive windows of the same source chain end-to-start,
/// so a feed item can only ever fall into one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AlarmWindow {
    /// Strict membership check adapters use to re-filter upstream results
    /// (upstream date-range parameters are only approximate).
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Compute the window for the next tick.
///
/// * First tick after process start (`previous_end == None`):
///   `[now - interval, now)`.
/// * Normal tick: `[previous_end, now)` — no gap, no overlap.
/// * Clock skew (`now < previous_end`): an empty window anchored at
///   `previous_end`. The tick simply yields zero payloads; this is never
///   an error.
pub fn next_window(
    previous_end: Option<DateTime<Utc>>,
    interval: Duration,
    now: DateTime<Utc>,
) -> AlarmWindow {
    match previous_end {
        None => AlarmWindow {
            start: now - interval,
            end: now,
        },
        Some(prev) if now < prev => AlarmWindow {
            start: prev,
            end: prev,
        },
        Some(prev) => AlarmWindow {
            start: prev,
            end: now,
        },
    }
}
