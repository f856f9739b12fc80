//! Orchestrator Configuration
//!
//! Gathers the paths and limits used by the runner, the scaler loader and
//! the sample evaluation. `Default` reads the environment via `constants`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Path to the external training/prediction binary
    pub binary_path: PathBuf,
    /// Directory the binary runs in (it writes the scaler artifact here)
    pub working_dir: PathBuf,
    /// Scaler artifact path, relative to `working_dir` unless absolute
    pub scaler_file: PathBuf,
    /// Rows drawn by the sample evaluation
    pub sample_size: usize,
    /// Bounded queue between stdout reader and consumer
    pub line_queue_capacity: usize,
    /// Upper bound for one predict invocation
    pub predict_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from(constants::get_binary_path()),
            working_dir: PathBuf::from(constants::get_working_dir()),
            scaler_file: PathBuf::from(constants::get_scaler_file()),
            sample_size: constants::get_sample_size(),
            line_queue_capacity: constants::get_line_queue_capacity(),
            predict_timeout: constants::get_predict_timeout(),
        }
    }
}

impl OrchestratorConfig {
    pub fn new(binary_path: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            working_dir: working_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_scaler_file(mut self, scaler_file: impl Into<PathBuf>) -> Self {
        self.scaler_file = scaler_file.into();
        self
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_line_queue_capacity(mut self, capacity: usize) -> Self {
        self.line_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_predict_timeout(mut self, timeout: Duration) -> Self {
        self.predict_timeout = timeout;
        self
    }

    /// Binary path as handed to the OS.
    ///
    /// Relative paths are anchored to the current directory because the
    /// child is started in `working_dir`, and resolution of a relative
    /// program path after `chdir` is platform specific.
    pub fn resolved_binary(&self) -> PathBuf {
        absolutize(&self.binary_path)
    }

    pub fn resolved_working_dir(&self) -> PathBuf {
        absolutize(&self.working_dir)
    }

    /// Where the binary leaves the scaler artifact after training
    pub fn scaler_path(&self) -> PathBuf {
        if self.scaler_file.is_absolute() {
            self.scaler_file.clone()
        } else {
            self.resolved_working_dir().join(&self.scaler_file)
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(e) => {
            log::warn!("Cannot read current directory ({}), using {:?} as is", e, path);
            path.to_path_buf()
        }
    }
}
