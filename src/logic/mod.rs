//! Logic Module - Training Orchestration & Telemetry
//!
//! ## Structure
//! - `config.rs` - OrchestratorConfig (binary, working dir, limits)
//! - `dataset/` - CSV loading into labeled observations
//! - `scaler.rs` - Normalization bounds written by training
//! - `runner/` - External binary process management, cancellation
//! - `protocol/` - NDJSON stream and prediction decoding
//! - `telemetry/` - Training series aggregation and export
//! - `evaluation/` - Post-training sample evaluation
//! - `events.rs` - Presentation events and sinks
//! - `session.rs` - Session context tying it all together

pub mod config;
pub mod dataset;
pub mod evaluation;
pub mod events;
pub mod protocol;
pub mod runner;
pub mod scaler;
pub mod session;
pub mod telemetry;

#[cfg(all(test, unix))]
pub(crate) mod test_support;

pub use config::OrchestratorConfig;
pub use session::{ErrorKind, Session, SessionError, TrainingOutcome};
