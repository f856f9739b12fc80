//! Event Emitter - Presentation Events
//!
//! The core never draws anything. Whatever presents training (a window, a
//! terminal, a test) implements `EventSink` and receives these events.

use serde::Serialize;
use uuid::Uuid;

use crate::logic::evaluation::{EvaluationReport, EvaluationState};
use crate::logic::telemetry::{RunSummary, TelemetrySnapshot};

/// Event names
pub mod names {
    pub const TELEMETRY_UPDATED: &str = "telemetry:updated";
    pub const TRAINING_FINISHED: &str = "training:finished";
    pub const EVALUATION_STATE: &str = "evaluation:state";
    pub const EVALUATION_COMPLETED: &str = "evaluation:completed";
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum UiEvent {
    /// Full series after every accepted progress or summary event
    TelemetryUpdated(TelemetrySnapshot),
    TrainingFinished {
        run_id: Option<Uuid>,
        success: bool,
        summary: Option<RunSummary>,
        error: Option<String>,
    },
    EvaluationState(EvaluationState),
    /// Only ever sent for a complete table
    EvaluationCompleted(EvaluationReport),
}

impl UiEvent {
    pub fn name(&self) -> &'static str {
        match self {
            UiEvent::TelemetryUpdated(_) => names::TELEMETRY_UPDATED,
            UiEvent::TrainingFinished { .. } => names::TRAINING_FINISHED,
            UiEvent::EvaluationState(_) => names::EVALUATION_STATE,
            UiEvent::EvaluationCompleted(_) => names::EVALUATION_COMPLETED,
        }
    }
}

/// Receiver of presentation events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &UiEvent);
}

/// Default sink: writes a one-line summary of each event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &UiEvent) {
        match event {
            UiEvent::TelemetryUpdated(snapshot) => log::debug!(
                "[{}] epoch={:?} loss={:?} points={}",
                event.name(),
                snapshot.latest_epoch,
                snapshot.latest_loss,
                snapshot.points.len()
            ),
            UiEvent::TrainingFinished { success, error, .. } => {
                if *success {
                    log::info!("[{}] ok", event.name());
                } else {
                    log::warn!("[{}] {}", event.name(), error.as_deref().unwrap_or("failed"));
                }
            }
            UiEvent::EvaluationState(state) => log::debug!("[{}] {:?}", event.name(), state),
            UiEvent::EvaluationCompleted(report) => log::info!(
                "[{}] {}/{} predictions matched",
                event.name(),
                report.matched,
                report.rows.len()
            ),
        }
    }
}
