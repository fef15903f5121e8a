// src/alarm/mod.rs
pub mod dispatcher;
pub mod scheduler;
pub mod window;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use scheduler::{run_tick, AlarmScheduler, SourceLoopState, TickReport};
pub use window::{next_window, AlarmWindow};
