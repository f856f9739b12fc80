//! Telemetry Module
//!
//! Live training series: what the chart and the status line read while the
//! binary is still running.
//!
//! ## Structure
//! - `series.rs` - TelemetryAggregator (ordering rules, run lifecycle)
//! - `exporter.rs` - Export a snapshot to JSON or CSV
//!
//! The aggregator is written only by the session's training task and read
//! through `TelemetryHandle` from anywhere else.

pub mod exporter;
pub mod series;

use parking_lot::RwLock;
use std::sync::Arc;

pub use exporter::{export_series, ExportFormat};
pub use series::{
    RunState, RunSummary, TelemetryAggregator, TelemetryError, TelemetryPoint, TelemetrySnapshot,
};

/// Cloneable read side of the session's aggregator
#[derive(Debug, Clone, Default)]
pub struct TelemetryHandle {
    inner: Arc<RwLock<TelemetryAggregator>>,
}

impl TelemetryHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent copy of the current series
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.inner.read().snapshot()
    }

    pub fn state(&self) -> RunState {
        self.inner.read().state()
    }

    pub(crate) fn write(&self) -> parking_lot::RwLockWriteGuard<'_, TelemetryAggregator> {
        self.inner.write()
    }
}
