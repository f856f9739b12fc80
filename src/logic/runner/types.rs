//! Runner Types

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{DEFAULT_EPOCHS, DEFAULT_LEARNING_RATE};

// ============================================================================
// PARAMETERS
// ============================================================================

/// Train-mode arguments besides the dataset path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainParams {
    pub epochs: u32,
    pub learning_rate: f64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }
}

impl TrainParams {
    pub fn new(epochs: u32, learning_rate: f64) -> Self {
        Self { epochs, learning_rate }
    }

    /// Checked before anything is spawned
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.epochs == 0 {
            return Err(RunnerError::InvalidParams(
                "epoch count must be greater than zero".to_string(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(RunnerError::InvalidParams(format!(
                "learning rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Which side of the binary's CLI a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Train,
    Predict,
}

impl RunMode {
    pub fn flag(&self) -> &'static str {
        match self {
            RunMode::Train => "--train",
            RunMode::Predict => "--predict",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Train => write!(f, "train"),
            RunMode::Predict => write!(f, "predict"),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("invalid training parameters: {0}")]
    InvalidParams(String),
    #[error("executable not found at {0:?}")]
    ExecutableMissing(PathBuf),
    #[error("failed to start {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{mode} run failed ({}): {stderr}", exit_label(.code))]
    ProcessFailed {
        mode: RunMode,
        code: Option<i32>,
        stderr: String,
    },
    #[error("another invocation of the binary is already running")]
    Busy,
    #[error("{mode} run timed out after {}s", .after.as_secs())]
    Timeout { mode: RunMode, after: Duration },
    #[error("i/o error while supervising the binary: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}
