//! Protocol Types
//!
//! Typed form of the JSON objects the binary prints.

use serde::{Deserialize, Serialize};

use crate::logic::dataset::Label;

// ============================================================================
// TRAINING STREAM
// ============================================================================

/// Per-epoch progress line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub epoch: u64,
    /// Training accuracy as a fraction in [0, 1]
    pub accuracy: f64,
    pub loss: f64,
    /// Validation accuracy percentage, when the binary reports it per epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_accuracy: Option<f64>,
}

/// Terminal line of a training run (percentages)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEvent {
    pub val_accuracy: f64,
    pub test_accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrainingEvent {
    Progress(ProgressEvent),
    Summary(SummaryEvent),
}

/// Why a stream line carried no event
#[derive(Debug, Clone, PartialEq)]
pub enum IgnoreReason {
    Blank,
    /// Diagnostic text interleaved by the binary
    NotJson,
    NotObject,
    /// Object without any protocol keys
    UnknownShape,
    /// Object with both progress and summary keys
    Ambiguous,
    /// Right keys, unusable values
    Malformed(String),
}

/// Outcome of classifying one line
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Event(TrainingEvent),
    Ignored(IgnoreReason),
}

impl Classified {
    pub fn into_event(self) -> Option<TrainingEvent> {
        match self {
            Classified::Event(event) => Some(event),
            Classified::Ignored(_) => None,
        }
    }
}

// ============================================================================
// PREDICTION
// ============================================================================

/// Outcome of one predict invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub label: Label,
    /// Sigmoid output, when the binary reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
}
