//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Every value can be overridden through the environment.

use std::time::Duration;

/// Default location of the training/prediction binary
pub const DEFAULT_BINARY_PATH: &str = "./target/release/WaterQualityTesting";

/// File the binary writes the normalization bounds to (JSON, despite the extension)
pub const DEFAULT_SCALER_FILE: &str = "scaler.bin";

/// Working directory the binary is launched in
pub const DEFAULT_WORKING_DIR: &str = ".";

/// Maximum number of rows drawn for the post-training sample evaluation
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

/// Capacity of the queue between the stdout reader task and the consumer
pub const DEFAULT_LINE_QUEUE_CAPACITY: usize = 256;

/// Upper bound for a single predict invocation (seconds)
pub const DEFAULT_PREDICT_TIMEOUT_SECS: u64 = 30;

/// Amount of stderr text retained for error reports (bytes, tail kept)
pub const MAX_STDERR_BYTES: usize = 64 * 1024;

/// How long pipes may stay open after the training process exited (ms)
pub const PIPE_DRAIN_GRACE_MS: u64 = 500;

/// Default epoch count offered by the CLI
pub const DEFAULT_EPOCHS: u32 = 1000;

/// Default learning rate offered by the CLI
pub const DEFAULT_LEARNING_RATE: f64 = 0.001;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "Water Quality Testing";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get binary path from environment or use default
pub fn get_binary_path() -> String {
    std::env::var("WQ_BINARY_PATH")
        .unwrap_or_else(|_| DEFAULT_BINARY_PATH.to_string())
}

/// Get working directory from environment or use default
pub fn get_working_dir() -> String {
    std::env::var("WQ_WORKING_DIR")
        .unwrap_or_else(|_| DEFAULT_WORKING_DIR.to_string())
}

/// Get scaler artifact file name from environment or use default
pub fn get_scaler_file() -> String {
    std::env::var("WQ_SCALER_FILE")
        .unwrap_or_else(|_| DEFAULT_SCALER_FILE.to_string())
}

/// Get sample size from environment or use default
pub fn get_sample_size() -> usize {
    std::env::var("WQ_SAMPLE_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_SAMPLE_SIZE)
}

/// Get line queue capacity from environment or use default
pub fn get_line_queue_capacity() -> usize {
    std::env::var("WQ_LINE_QUEUE_CAPACITY")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or(DEFAULT_LINE_QUEUE_CAPACITY)
}

/// Get predict timeout from environment or use default
pub fn get_predict_timeout() -> Duration {
    let secs = std::env::var("WQ_PREDICT_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PREDICT_TIMEOUT_SECS);
    Duration::from_secs(secs)
}
