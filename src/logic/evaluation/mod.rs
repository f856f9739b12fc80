//! Evaluation Module - Post-training Sample Check
//!
//! Compares predictions against ground truth on a random subset of the
//! loaded dataset.
//!
//! ## Structure
//! - `mod.rs` - EvaluationState, EvaluationRow, EvaluationReport, errors
//! - `engine.rs` - SampleEvaluator state machine and index sampling

pub mod engine;

use serde::Serialize;

use crate::logic::dataset::{Features, Label};
use crate::logic::protocol::{PredictionResult, ProtocolError};
use crate::logic::runner::RunnerError;
use crate::logic::scaler::ScalerError;

pub use engine::{sample_indices, SampleEvaluator};

// ============================================================================
// STATE
// ============================================================================

/// Idle -> AwaitingScaler -> Sampling -> PredictingRow(i) -> Done | Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationState {
    Idle,
    AwaitingScaler,
    Sampling,
    /// Position within the sample, not the dataset index
    PredictingRow(usize),
    Done,
    Failed,
}

impl EvaluationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EvaluationState::Done | EvaluationState::Failed)
    }
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRow {
    /// Index of the observation in the loaded dataset
    pub index: usize,
    pub features: Features,
    pub actual: Label,
    pub prediction: PredictionResult,
}

impl EvaluationRow {
    pub fn predicted(&self) -> Label {
        self.prediction.label
    }

    pub fn is_match(&self) -> bool {
        self.actual == self.prediction.label
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub rows: Vec<EvaluationRow>,
    pub matched: usize,
}

impl EvaluationReport {
    pub fn from_rows(rows: Vec<EvaluationRow>) -> Self {
        let matched = rows.iter().filter(|row| row.is_match()).count();
        Self { rows, matched }
    }

    /// Share of matching rows in percent; 0 for an empty table
    pub fn match_rate(&self) -> f64 {
        if self.rows.is_empty() {
            0.0
        } else {
            self.matched as f64 * 100.0 / self.rows.len() as f64
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Why a single row could not be predicted
#[derive(Debug, thiserror::Error)]
pub enum RowFailure {
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Scaler(#[from] ScalerError),
    #[error("no observations to sample from")]
    EmptyDataset,
    #[error("prediction failed for dataset row {index} {features:?}: {source}")]
    Row {
        index: usize,
        features: Features,
        #[source]
        source: RowFailure,
    },
}
