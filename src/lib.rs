// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod alarm;
pub mod api;
pub mod config;
pub mod context;
pub mod cwe;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod sources;
pub mod state;
pub mod summarize;
pub mod timefmt;

// ---- Re-exports for stable public API ----
pub use crate::alarm::{run_tick, AlarmScheduler, AlarmWindow, SourceLoopState, TickReport};
pub use crate::context::AppContext;
pub use crate::error::{DeliveryError, StateError};
pub use crate::sources::{EventPayload, PayloadKind, SourceAdapter, SourceOptions};
