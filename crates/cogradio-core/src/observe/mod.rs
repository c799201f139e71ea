//! # Observability
//!
//! Structured logging for the decision core. Components emit `tracing`
//! events at every state transition (node, channel, virtual time, outcome);
//! applications install a subscriber once with [`init_logging`].
//!
//! ```rust,ignore
//! use cogradio_core::observe::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development());
//! tracing::info!(node = 0, channel = 2, "handoff complete");
//! ```

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
