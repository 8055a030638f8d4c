//! Observability utilities.
//!
//! Runs and steps are wrapped in `tracing` spans built from
//! [`RunSpanAttributes`] and [`StepSpanAttributes`]. [`init_tracing`]
//! installs a subscriber configured by [`LogConfig`](crate::config::LogConfig).

mod spans;
mod subscriber;

pub use spans::{RunSpanAttributes, SpanTimer, StepSpanAttributes};
pub use subscriber::init_tracing;
