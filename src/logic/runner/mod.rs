//! Runner Module - External Binary Orchestration
//!
//! ## Structure
//! - `types.rs` - TrainParams, RunMode, RunnerError
//! - `process.rs` - ProcessRunner (spawn, in-flight guard), TrainRun
//! - `cancel.rs` - CancelToken for aborting a training run

pub mod cancel;
pub mod process;
pub mod types;


pub use cancel::CancelToken;
pub use process::{ProcessRunner, TrainRun};
pub use types::{RunMode, RunnerError, TrainParams};
