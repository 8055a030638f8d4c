//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is handed to every job of a run. The runner
//! checks it between waves and components may await
//! [`CancellationToken::cancelled`] to abort in-flight work.

mod token;

pub use token::{CancelCallback, CancellationToken};
