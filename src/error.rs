// src/error.rs
use thiserror::Error;

/// Terminal failure for a single payload's dispatch. The scheduler catches
/// this per item; remaining payloads in the same tick still attempt delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("unknown or unconfigured channel: {0:?}")]
    UnknownChannel(String),
    #[error("transport rejected the message: http {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failure reading or writing the last-seen marker store. Write failures
/// degrade to in-memory-only marker advancement, never crash a tick.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("marker store: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
