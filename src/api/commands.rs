//! Commands - API for the presentation layer
//!
//! Each command maps one user action onto the session and flattens errors
//! into display strings.

use serde::Serialize;
use std::path::Path;

use super::table::ResultTable;
use crate::logic::dataset::DatasetSummary;
use crate::logic::protocol::PredictionResult;
use crate::logic::runner::{CancelToken, TrainParams};
use crate::logic::session::{Session, TrainingOutcome};
use crate::logic::telemetry::{export_series, ExportFormat, RunState, TelemetrySnapshot};

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Session overview for status bars
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub dataset: Option<DatasetSummary>,
    pub binary_path: String,
    pub binary_present: bool,
    pub training_state: RunState,
    pub trained: bool,
    pub latest_epoch: Option<u64>,
    pub latest_loss: Option<f64>,
}

/// Manual prediction answer
#[derive(Debug, Clone, Serialize)]
pub struct PredictionInfo {
    pub label: String,
    pub safe: bool,
    pub probability: Option<f64>,
}

impl From<PredictionResult> for PredictionInfo {
    fn from(result: PredictionResult) -> Self {
        Self {
            label: result.label.to_string(),
            safe: result.label.is_safe(),
            probability: result.probability,
        }
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

pub fn get_status(session: &Session) -> SessionStatus {
    let snapshot = session.telemetry().snapshot();
    let binary = session.config().resolved_binary();

    SessionStatus {
        dataset: session.dataset().map(|d| d.summary()),
        binary_path: binary.display().to_string(),
        binary_present: binary.is_file(),
        training_state: snapshot.state,
        trained: session.is_trained(),
        latest_epoch: snapshot.latest_epoch,
        latest_loss: snapshot.latest_loss,
    }
}

pub fn load_dataset(session: &mut Session, path: &str) -> Result<DatasetSummary, String> {
    if path.trim().is_empty() {
        return Err("Please choose a dataset file".to_string());
    }
    session.load_dataset(path).map_err(|e| e.to_string())
}

pub async fn train_model(
    session: &mut Session,
    epochs: u32,
    learning_rate: f64,
    cancel: &CancelToken,
) -> Result<TrainingOutcome, String> {
    session
        .train(TrainParams::new(epochs, learning_rate), cancel)
        .await
        .map_err(|e| e.to_string())
}

pub async fn evaluate_model(
    session: &mut Session,
    cancel: &CancelToken,
) -> Result<ResultTable, String> {
    let report = session.evaluate(cancel).await.map_err(|e| e.to_string())?;
    Ok(ResultTable::from_report(&report))
}

pub fn get_telemetry(session: &Session) -> TelemetrySnapshot {
    session.telemetry().snapshot()
}

/// Export the current series; format follows the file extension
pub fn export_telemetry(session: &Session, path: &str) -> Result<usize, String> {
    let path = Path::new(path);
    let snapshot = session.telemetry().snapshot();
    if snapshot.points.is_empty() {
        return Err("No telemetry to export yet".to_string());
    }
    export_series(&snapshot, path, ExportFormat::from_path(path))
        .map_err(|e| format!("Failed to export telemetry to {}: {}", path.display(), e))
}

/// Predict from raw form fields (14 values in feature order)
pub async fn predict_water(session: &Session, inputs: &[String]) -> Result<PredictionInfo, String> {
    session
        .predict_inputs(inputs)
        .await
        .map(PredictionInfo::from)
        .map_err(|e| e.to_string())
}
