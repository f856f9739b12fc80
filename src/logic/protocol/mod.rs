//! Protocol Module - Binary Output Decoding
//!
//! ## Structure
//! - `types.rs` - TrainingEvent, PredictionResult and classification outcomes
//! - `parser.rs` - Lenient NDJSON line classification, strict predict parsing

pub mod parser;
pub mod types;

pub use parser::{classify_line, classify_object, parse_prediction, ProtocolError};
pub use types::{
    Classified, IgnoreReason, PredictionResult, ProgressEvent, SummaryEvent, TrainingEvent,
};
