//! NDJSON Parser
//!
//! Training output is parsed leniently: any line that is not a usable
//! protocol object is ignored. Predict output is parsed strictly, since
//! the caller has nothing else to show.

use serde_json::{Map, Value};

use super::types::{
    Classified, IgnoreReason, PredictionResult, ProgressEvent, SummaryEvent, TrainingEvent,
};
use crate::logic::dataset::Label;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("prediction produced no output")]
    EmptyOutput,
    #[error("failed to parse prediction output {output:?}: {reason}")]
    InvalidJson { output: String, reason: String },
    #[error("prediction output is not a JSON object: {0:?}")]
    NotObject(String),
    #[error("prediction output has no \"prediction\" field: {0:?}")]
    MissingPrediction(String),
    #[error("unsupported prediction value: {0}")]
    InvalidPrediction(String),
}

// ============================================================================
// TRAINING STREAM
// ============================================================================

/// Classify one raw stdout line
pub fn classify_line(line: &str) -> Classified {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Classified::Ignored(IgnoreReason::Blank);
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => classify_object(map),
        Ok(_) => Classified::Ignored(IgnoreReason::NotObject),
        Err(_) => Classified::Ignored(IgnoreReason::NotJson),
    }
}

/// Pure key-presence classification of a decoded object
pub fn classify_object(map: Map<String, Value>) -> Classified {
    let has_epoch = map.contains_key("epoch");
    let has_summary = map.contains_key("val_accuracy") && map.contains_key("test_accuracy");

    match (has_epoch, has_summary) {
        (true, true) => Classified::Ignored(IgnoreReason::Ambiguous),
        (true, false) => match decode_progress(map) {
            Ok(progress) => Classified::Event(TrainingEvent::Progress(progress)),
            Err(reason) => Classified::Ignored(IgnoreReason::Malformed(reason)),
        },
        (false, true) => match decode_summary(map) {
            Ok(summary) => Classified::Event(TrainingEvent::Summary(summary)),
            Err(reason) => Classified::Ignored(IgnoreReason::Malformed(reason)),
        },
        (false, false) => Classified::Ignored(IgnoreReason::UnknownShape),
    }
}

fn decode_progress(map: Map<String, Value>) -> Result<ProgressEvent, String> {
    let progress: ProgressEvent =
        serde_json::from_value(Value::Object(map)).map_err(|e| e.to_string())?;

    if !(0.0..=1.0).contains(&progress.accuracy) {
        return Err(format!("accuracy {} outside [0, 1]", progress.accuracy));
    }
    if !progress.loss.is_finite() || progress.loss < 0.0 {
        return Err(format!("loss {} is not a non-negative number", progress.loss));
    }
    Ok(progress)
}

fn decode_summary(map: Map<String, Value>) -> Result<SummaryEvent, String> {
    let summary: SummaryEvent =
        serde_json::from_value(Value::Object(map)).map_err(|e| e.to_string())?;

    if !summary.val_accuracy.is_finite() || !summary.test_accuracy.is_finite() {
        return Err("summary accuracies must be finite".to_string());
    }
    Ok(summary)
}

// ============================================================================
// PREDICTION
// ============================================================================

/// Parse the single object printed by a predict invocation
pub fn parse_prediction(output: &str) -> Result<PredictionResult, ProtocolError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::EmptyOutput);
    }

    let value: Value = serde_json::from_str(trimmed).map_err(|e| ProtocolError::InvalidJson {
        output: trimmed.to_string(),
        reason: e.to_string(),
    })?;

    let map = match value {
        Value::Object(map) => map,
        _ => return Err(ProtocolError::NotObject(trimmed.to_string())),
    };

    let label = match map.get("prediction") {
        Some(Value::Bool(safe)) => Label::from_bool(*safe),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) => Label::from_bool(v != 0.0),
            None => return Err(ProtocolError::InvalidPrediction(n.to_string())),
        },
        Some(other) => return Err(ProtocolError::InvalidPrediction(other.to_string())),
        None => return Err(ProtocolError::MissingPrediction(trimmed.to_string())),
    };

    let probability = map.get("probability").and_then(Value::as_f64);

    Ok(PredictionResult { label, probability })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_line() {
        let line = r#"{"epoch":3,"accuracy":0.75,"loss":0.41,"val_accuracy":72.5}"#;
        match classify_line(line) {
            Classified::Event(TrainingEvent::Progress(p)) => {
                assert_eq!(p.epoch, 3);
                assert_eq!(p.accuracy, 0.75);
                assert_eq!(p.val_accuracy, Some(72.5));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_summary_line() {
        let line = r#"{"val_accuracy": 88.1, "test_accuracy": 86.0}"#;
        assert_eq!(
            classify_line(line),
            Classified::Event(TrainingEvent::Summary(SummaryEvent {
                val_accuracy: 88.1,
                test_accuracy: 86.0,
            }))
        );
    }

    #[test]
    fn test_noise_is_ignored() {
        assert_eq!(classify_line("Loaded 7999 data points"), Classified::Ignored(IgnoreReason::NotJson));
        assert_eq!(classify_line("   "), Classified::Ignored(IgnoreReason::Blank));
        assert_eq!(classify_line("[1,2]"), Classified::Ignored(IgnoreReason::NotObject));
        assert_eq!(classify_line(r#"{"status":"ok"}"#), Classified::Ignored(IgnoreReason::UnknownShape));
        // Only one summary key: not a summary
        assert_eq!(classify_line(r#"{"val_accuracy":80.0}"#), Classified::Ignored(IgnoreReason::UnknownShape));
    }

    #[test]
    fn test_ambiguous_object_rejected() {
        let line = r#"{"epoch":1,"accuracy":0.5,"loss":0.6,"val_accuracy":50.0,"test_accuracy":49.0}"#;
        assert_eq!(classify_line(line), Classified::Ignored(IgnoreReason::Ambiguous));
    }

    #[test]
    fn test_malformed_progress_ignored() {
        for line in [
            r#"{"epoch":1}"#,
            r#"{"epoch":-1,"accuracy":0.5,"loss":0.1}"#,
            r#"{"epoch":1,"accuracy":1.5,"loss":0.1}"#,
            r#"{"epoch":1,"accuracy":0.5,"loss":-0.1}"#,
            r#"{"epoch":"one","accuracy":0.5,"loss":0.1}"#,
        ] {
            assert!(
                matches!(classify_line(line), Classified::Ignored(IgnoreReason::Malformed(_))),
                "{}",
                line
            );
        }
    }

    #[test]
    fn test_prediction_zero_is_unsafe() {
        let result = parse_prediction("{\"prediction\": 0}\n").unwrap();
        assert_eq!(result.label, Label::Unsafe);
        assert_eq!(result.label.to_string(), "Unsafe");
        assert_eq!(result.probability, None);
    }

    #[test]
    fn test_prediction_accepts_bool_and_probability() {
        let result = parse_prediction(r#"{"prediction": true}"#).unwrap();
        assert_eq!(result.label, Label::Safe);

        let result = parse_prediction(r#"{"prediction": 1, "probability": 0.93}"#).unwrap();
        assert_eq!(result.label, Label::Safe);
        assert_eq!(result.probability, Some(0.93));
    }

    #[test]
    fn test_prediction_parse_failures_are_fatal() {
        assert_eq!(parse_prediction(""), Err(ProtocolError::EmptyOutput));
        assert!(matches!(parse_prediction("Segfault"), Err(ProtocolError::InvalidJson { .. })));
        assert!(matches!(parse_prediction("[0]"), Err(ProtocolError::NotObject(_))));
        assert!(matches!(parse_prediction(r#"{"probability":0.2}"#), Err(ProtocolError::MissingPrediction(_))));
        assert!(matches!(parse_prediction(r#"{"prediction":"yes"}"#), Err(ProtocolError::InvalidPrediction(_))));
        // Two objects are not a single prediction
        assert!(matches!(
            parse_prediction("{\"prediction\":0}\n{\"prediction\":1}"),
            Err(ProtocolError::InvalidJson { .. })
        ));
    }
}
