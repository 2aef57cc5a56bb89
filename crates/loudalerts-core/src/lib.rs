//! Core types: event snapshots, snooze delay policy, tracing

pub mod delay;
pub mod event;
pub mod tracing;

pub use delay::{
    NOW_RELATIVE_MINUTES, ParseSnoozeDelayError, START_RELATIVE_MINUTES, SnoozeDelay,
    minutes_until_start, snooze_options,
};
pub use event::EventSnapshot;
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
