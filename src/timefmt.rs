// src/timefmt.rs
// Alarm embeds render timestamps twice: once in the source timezone (UTC)
// and once in KST for the Korean-speaking audience.
use chrono::{DateTime, FixedOffset, Utc};
use once_cell::sync::Lazy;

static KST: Lazy<FixedOffset> =
    Lazy::new(|| FixedOffset::east_opt(9 * 3600).expect("KST offset is valid"));

pub fn to_kst(ts: DateTime<Utc>) -> DateTime<FixedOffset> {
    ts.with_timezone(&KST)
}

pub fn format_kst(ts: DateTime<Utc>) -> String {
    to_kst(ts).format("%Y-%m-%d %H:%M:%S KST").to_string()
}

pub fn format_utc(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
