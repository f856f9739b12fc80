//! Session Context
//!
//! Owns everything one user session works with: the loaded dataset, the
//! telemetry series, the process runner and the sampling RNG. All
//! operations go through here so that resets happen in exactly one place.

use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use uuid::Uuid;

use crate::logic::config::OrchestratorConfig;
use crate::logic::dataset::{
    load_csv, parse_feature_inputs, Dataset, DatasetError, DatasetSummary, FeatureInputError,
    Features,
};
use crate::logic::evaluation::{
    EvaluationError, EvaluationReport, EvaluationState, RowFailure, SampleEvaluator,
};
use crate::logic::events::{EventSink, LogSink, UiEvent};
use crate::logic::protocol::{
    classify_line, parse_prediction, Classified, IgnoreReason, PredictionResult, ProtocolError,
    TrainingEvent,
};
use crate::logic::runner::{CancelToken, ProcessRunner, RunnerError, TrainParams, TrainRun};
use crate::logic::scaler::{load_scaler, ScalerError};
use crate::logic::telemetry::{RunSummary, TelemetryHandle};

// ============================================================================
// ERRORS
// ============================================================================

/// Coarse failure category, stable for callers that branch on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Io,
    Parse,
    ExecutableMissing,
    ProcessFailure,
    ArtifactMissing,
    ArtifactParse,
    Busy,
    Cancelled,
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("load data first")]
    NoDataset,
    #[error("no successful training run yet, train the model first")]
    NotTrained,
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Input(#[from] FeatureInputError),
    #[error(transparent)]
    Scaler(#[from] ScalerError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error("operation cancelled")]
    Cancelled,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NoDataset | SessionError::NotTrained | SessionError::Input(_) => {
                ErrorKind::Validation
            }
            SessionError::Dataset(DatasetError::Read { .. }) => ErrorKind::Io,
            SessionError::Dataset(DatasetError::NoData { .. }) => ErrorKind::Parse,
            SessionError::Scaler(e) => scaler_kind(e),
            SessionError::Runner(e) => runner_kind(e),
            SessionError::Protocol(_) => ErrorKind::Parse,
            SessionError::Evaluation(e) => match e {
                EvaluationError::Scaler(e) => scaler_kind(e),
                EvaluationError::EmptyDataset => ErrorKind::Validation,
                EvaluationError::Row { source: RowFailure::Runner(e), .. } => runner_kind(e),
                EvaluationError::Row { source: RowFailure::Protocol(_), .. } => ErrorKind::Parse,
            },
            SessionError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

fn scaler_kind(e: &ScalerError) -> ErrorKind {
    match e {
        ScalerError::Missing(_) => ErrorKind::ArtifactMissing,
        ScalerError::Read { .. } => ErrorKind::Io,
        ScalerError::Parse { .. } => ErrorKind::ArtifactParse,
    }
}

fn runner_kind(e: &RunnerError) -> ErrorKind {
    match e {
        RunnerError::InvalidParams(_) => ErrorKind::Validation,
        RunnerError::ExecutableMissing(_) => ErrorKind::ExecutableMissing,
        RunnerError::Spawn { .. } | RunnerError::ProcessFailed { .. } => ErrorKind::ProcessFailure,
        RunnerError::Busy => ErrorKind::Busy,
        RunnerError::Timeout { .. } => ErrorKind::Timeout,
        RunnerError::Io(_) => ErrorKind::Io,
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// What a successful training run left behind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingOutcome {
    pub run_id: Uuid,
    pub epochs_recorded: usize,
    /// `None` when the binary exited cleanly without printing one
    pub summary: Option<RunSummary>,
    pub ignored_lines: usize,
    pub rejected_events: u64,
}

enum StreamStep {
    Line(Option<String>),
    Cancelled,
}

// ============================================================================
// SESSION
// ============================================================================

pub struct Session {
    runner: ProcessRunner,
    dataset: Option<Dataset>,
    telemetry: TelemetryHandle,
    rng: StdRng,
    sink: Arc<dyn EventSink>,
    trained: bool,
}

impl Session {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            runner: ProcessRunner::new(Arc::new(config)),
            dataset: None,
            telemetry: TelemetryHandle::new(),
            rng: StdRng::from_entropy(),
            sink: Arc::new(LogSink),
            trained: false,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the sampling source, e.g. with a seeded RNG
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        self.runner.config()
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    /// Read side of the telemetry series, safe to poll from other threads
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry.clone()
    }

    /// Whether the last training run in this session exited successfully
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    // ------------------------------------------------------------------------
    // Dataset
    // ------------------------------------------------------------------------

    /// Load a dataset, replacing the current one only on success
    pub fn load_dataset(&mut self, path: impl AsRef<Path>) -> Result<DatasetSummary, SessionError> {
        let dataset = load_csv(path)?;
        let summary = dataset.summary();

        self.dataset = Some(dataset);
        self.trained = false;
        self.telemetry.write().clear();
        self.sink.emit(&UiEvent::TelemetryUpdated(self.telemetry.snapshot()));

        Ok(summary)
    }

    // ------------------------------------------------------------------------
    // Training
    // ------------------------------------------------------------------------

    /// Train on the loaded dataset, feeding telemetry as lines arrive
    pub async fn train(
        &mut self,
        params: TrainParams,
        cancel: &CancelToken,
    ) -> Result<TrainingOutcome, SessionError> {
        let dataset = self.dataset.as_ref().ok_or(SessionError::NoDataset)?;
        let mut run = self.runner.spawn_train(dataset.source(), params)?;

        self.trained = false;
        let run_id = self.telemetry.write().begin_run();
        self.sink.emit(&UiEvent::TelemetryUpdated(self.telemetry.snapshot()));

        let mut ignored_lines = 0usize;
        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => StreamStep::Cancelled,
                line = run.next_line() => StreamStep::Line(line),
            };

            let line = match step {
                StreamStep::Line(Some(line)) => line,
                StreamStep::Line(None) => break,
                StreamStep::Cancelled => return Err(self.cancel_run(run, run_id).await),
            };

            match classify_line(&line) {
                Classified::Event(event) => self.record(&event),
                Classified::Ignored(IgnoreReason::Blank) => {}
                Classified::Ignored(reason) => {
                    ignored_lines += 1;
                    log::debug!("Ignored training output ({:?}): {}", reason, line);
                }
            }
        }

        // stdout is closed but the process may still be running
        // a wait error resurfaces from finish
        let cancelled = tokio::select! {
            biased;
            _ = cancel.cancelled() => true,
            _ = run.wait() => false,
        };
        if cancelled {
            return Err(self.cancel_run(run, run_id).await);
        }

        if let Err(e) = run.finish().await {
            self.fail_run(run_id, e.to_string());
            return Err(e.into());
        }

        let snapshot = {
            let mut telemetry = self.telemetry.write();
            if telemetry.summary().is_none() {
                log::warn!("Training exited successfully without reporting a summary");
                telemetry.mark_completed();
            }
            telemetry.snapshot()
        };
        self.trained = true;
        self.sink.emit(&UiEvent::TrainingFinished {
            run_id: Some(run_id),
            success: true,
            summary: snapshot.summary.clone(),
            error: None,
        });

        Ok(TrainingOutcome {
            run_id,
            epochs_recorded: snapshot.points.len(),
            summary: snapshot.summary,
            ignored_lines,
            rejected_events: snapshot.rejected_events,
        })
    }

    fn record(&self, event: &TrainingEvent) {
        let applied = {
            let mut telemetry = self.telemetry.write();
            telemetry.apply(event).map(|_| telemetry.snapshot())
        };
        match applied {
            Ok(snapshot) => self.sink.emit(&UiEvent::TelemetryUpdated(snapshot)),
            Err(e) => log::warn!("Rejected training event: {}", e),
        }
    }

    async fn cancel_run(&self, run: TrainRun, run_id: Uuid) -> SessionError {
        log::info!("Cancelling training run {}", run_id);
        if let Err(e) = run.kill().await {
            log::warn!("Failed to kill training process: {}", e);
        }
        self.fail_run(run_id, "training cancelled".to_string());
        SessionError::Cancelled
    }

    fn fail_run(&self, run_id: Uuid, error: String) {
        self.telemetry.write().mark_failed();
        self.sink.emit(&UiEvent::TelemetryUpdated(self.telemetry.snapshot()));
        self.sink.emit(&UiEvent::TrainingFinished {
            run_id: Some(run_id),
            success: false,
            summary: None,
            error: Some(error),
        });
    }

    // ------------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------------

    /// Sample evaluation against the loaded dataset.
    ///
    /// Cancelling drops the in-flight prediction, which kills its process.
    pub async fn evaluate(
        &mut self,
        cancel: &CancelToken,
    ) -> Result<EvaluationReport, SessionError> {
        let dataset = self.dataset.as_ref().ok_or(SessionError::NoDataset)?;
        if !self.trained {
            return Err(SessionError::NotTrained);
        }

        let mut evaluator = SampleEvaluator::new(&self.runner, self.sink.as_ref());
        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            report = evaluator.run(dataset, &mut self.rng) => Some(report),
        };

        match report {
            Some(report) => Ok(report?),
            None => {
                log::info!("Evaluation cancelled");
                self.sink.emit(&UiEvent::EvaluationState(EvaluationState::Failed));
                Err(SessionError::Cancelled)
            }
        }
    }

    pub async fn train_and_evaluate(
        &mut self,
        params: TrainParams,
        cancel: &CancelToken,
    ) -> Result<(TrainingOutcome, EvaluationReport), SessionError> {
        let outcome = self.train(params, cancel).await?;
        let report = self.evaluate(cancel).await?;
        Ok((outcome, report))
    }

    // ------------------------------------------------------------------------
    // Manual prediction
    // ------------------------------------------------------------------------

    /// Predict one feature vector; the scaler must exist first
    pub async fn predict(&self, features: &Features) -> Result<PredictionResult, SessionError> {
        self.runner.check_executable()?;
        let scaler = load_scaler(&self.config().scaler_path())?;

        for violation in scaler.out_of_bounds(features) {
            log::warn!(
                "{} = {} is outside the training range [{}, {}]",
                violation.feature,
                violation.value,
                violation.min,
                violation.max
            );
        }

        let output = self.runner.run_predict(features).await?;
        let result = parse_prediction(&output)?;
        log::info!("Prediction: {}", result.label);
        Ok(result)
    }

    /// Validate raw text fields, then predict
    pub async fn predict_inputs<S: AsRef<str>>(
        &self,
        inputs: &[S],
    ) -> Result<PredictionResult, SessionError> {
        let features = parse_feature_inputs(inputs)?;
        self.predict(&features).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::logic::dataset::Label;
    use crate::logic::telemetry::RunState;
    use crate::logic::test_support::{write_dataset, CollectingSink, FakeBinary, SCALER_JSON};
    use std::time::Duration;

    fn session(fake: &FakeBinary) -> (Session, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        let session = Session::new(fake.config())
            .with_sink(sink.clone())
            .with_rng(StdRng::seed_from_u64(11));
        (session, sink)
    }

    #[tokio::test]
    async fn test_train_requires_dataset() {
        let fake = FakeBinary::standard();
        let (mut session, _) = session(&fake);

        let err = session.train(TrainParams::default(), &CancelToken::new()).await.unwrap_err();

        assert!(matches!(err, SessionError::NoDataset));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_train_then_evaluate() {
        let fake = FakeBinary::standard();
        let (mut session, sink) = session(&fake);
        let csv = write_dataset(fake.dir(), 25);
        session.load_dataset(&csv).unwrap();

        let (outcome, report) = session
            .train_and_evaluate(TrainParams::new(2, 0.01), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.epochs_recorded, 2);
        assert_eq!(outcome.ignored_lines, 3);
        assert_eq!(outcome.summary.as_ref().map(|s| s.test_accuracy), Some(80.25));

        let snapshot = session.telemetry().snapshot();
        assert_eq!(snapshot.state, RunState::Completed);
        assert_eq!(snapshot.latest_epoch, Some(2));
        assert_eq!(snapshot.points[1].accuracy, 75.0);

        assert_eq!(report.rows.len(), 10);
        assert_eq!(report.matched, 10);

        // dataset path handed to the binary is absolute
        let train_call = &fake.calls()[0];
        let canonical = csv.canonicalize().unwrap();
        assert!(train_call.starts_with(&format!("--train {} 2 0.01", canonical.display())));

        let names = sink.names();
        assert!(names.iter().filter(|n| *n == "telemetry:updated").count() >= 4);
        assert!(names.contains(&"training:finished".to_string()));
        assert_eq!(names.last().map(String::as_str), Some("evaluation:completed"));
    }

    #[tokio::test]
    async fn test_failed_training_keeps_history() {
        let fake = FakeBinary::new(
            "echo '{\"epoch\": 1, \"accuracy\": 0.4, \"loss\": 0.9}'\necho \"out of memory\" >&2\nexit 1\n",
        );
        let (mut session, sink) = session(&fake);
        session.load_dataset(write_dataset(fake.dir(), 4)).unwrap();

        let err = session.train(TrainParams::default(), &CancelToken::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ProcessFailure);
        assert!(err.to_string().contains("out of memory"));

        let snapshot = session.telemetry().snapshot();
        assert_eq!(snapshot.state, RunState::Failed);
        assert_eq!(snapshot.points.len(), 1);
        assert!(snapshot.summary.is_none());
        assert!(session.dataset().is_some());

        assert!(matches!(
            session.evaluate(&CancelToken::new()).await,
            Err(SessionError::NotTrained)
        ));
        assert!(sink.events().iter().any(|e| matches!(
            e,
            UiEvent::TrainingFinished { success: false, .. }
        )));
    }

    #[tokio::test]
    async fn test_events_after_summary_rejected() {
        let fake = FakeBinary::new(
            r#"echo '{"epoch": 1, "accuracy": 0.5, "loss": 0.7}'
echo '{"val_accuracy": 70.0, "test_accuracy": 69.0}'
echo '{"epoch": 2, "accuracy": 0.6, "loss": 0.6}'
echo '{"val_accuracy": 99.0, "test_accuracy": 99.0}'
"#,
        );
        let (mut session, _) = session(&fake);
        session.load_dataset(write_dataset(fake.dir(), 4)).unwrap();

        let outcome = session.train(TrainParams::default(), &CancelToken::new()).await.unwrap();

        assert_eq!(outcome.epochs_recorded, 1);
        assert_eq!(outcome.rejected_events, 2);
        assert_eq!(outcome.summary.map(|s| s.val_accuracy), Some(70.0));
    }

    #[tokio::test]
    async fn test_invalid_params_leave_state_untouched() {
        let fake = FakeBinary::standard();
        let (mut session, _) = session(&fake);
        session.load_dataset(write_dataset(fake.dir(), 4)).unwrap();
        session.train(TrainParams::new(3, 0.1), &CancelToken::new()).await.unwrap();

        let err = session.train(TrainParams::new(0, 0.1), &CancelToken::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(session.is_trained());
        assert_eq!(session.telemetry().snapshot().state, RunState::Completed);
        assert_eq!(fake.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_kills_training() {
        let fake = FakeBinary::new(
            "echo '{\"epoch\": 1, \"accuracy\": 0.5, \"loss\": 0.7}'\nexec sleep 30\n",
        );
        let (mut session, _) = session(&fake);
        session.load_dataset(write_dataset(fake.dir(), 4)).unwrap();

        let token = CancelToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            session.train(TrainParams::default(), &token),
        )
        .await
        .unwrap();

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(session.telemetry().state(), RunState::Failed);
        assert!(!session.is_trained());
    }

    #[tokio::test]
    async fn test_cancel_after_stdout_closed() {
        let fake = FakeBinary::new(
            "echo '{\"epoch\": 1, \"accuracy\": 0.5, \"loss\": 0.7}'\nexec >&-\nsleep 20\n",
        );
        let (mut session, _) = session(&fake);
        session.load_dataset(write_dataset(fake.dir(), 4)).unwrap();

        let token = CancelToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            session.train(TrainParams::default(), &token),
        )
        .await
        .unwrap();

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Cancelled);
        let snapshot = session.telemetry().snapshot();
        assert_eq!(snapshot.state, RunState::Failed);
        assert_eq!(snapshot.points.len(), 1);
        assert!(!session.runner.is_busy());
    }

    #[tokio::test]
    async fn test_exit_without_summary_counts_as_trained() {
        let fake = FakeBinary::new(&format!(
            r#"case "$1" in
  --train)
    echo '{{"epoch": 1, "accuracy": 0.5, "loss": 0.7}}'
    printf '%s' '{scaler}' > scaler.bin
    ;;
  --predict)
    echo '{{"prediction": 0}}'
    ;;
esac
"#,
            scaler = SCALER_JSON
        ));
        let (mut session, sink) = session(&fake);
        session.load_dataset(write_dataset(fake.dir(), 4)).unwrap();

        let outcome = session.train(TrainParams::default(), &CancelToken::new()).await.unwrap();

        assert!(outcome.summary.is_none());
        assert_eq!(outcome.epochs_recorded, 1);
        assert!(session.is_trained());
        assert_eq!(session.telemetry().snapshot().state, RunState::Completed);
        assert!(sink.events().iter().any(|e| matches!(
            e,
            UiEvent::TrainingFinished { success: true, summary: None, .. }
        )));

        let report = session.evaluate(&CancelToken::new()).await.unwrap();
        assert_eq!(report.rows.len(), 4);
    }

    #[tokio::test]
    async fn test_cancel_stops_evaluation() {
        let fake = FakeBinary::new(&format!(
            r#"case "$1" in
  --train)
    printf '%s' '{scaler}' > scaler.bin
    ;;
  --predict)
    exec sleep 30
    ;;
esac
"#,
            scaler = SCALER_JSON
        ));
        let (mut session, sink) = session(&fake);
        session.load_dataset(write_dataset(fake.dir(), 4)).unwrap();
        session.train(TrainParams::default(), &CancelToken::new()).await.unwrap();

        let token = CancelToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), session.evaluate(&token))
            .await
            .unwrap();

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Cancelled);
        assert!(!session.runner.is_busy());
        assert_eq!(sink.states().last(), Some(&EvaluationState::Failed));
        assert!(session.is_trained());
    }

    #[tokio::test]
    async fn test_evaluate_without_scaler_never_predicts() {
        let fake = FakeBinary::new("echo \"$@\" >> calls.log\necho '{\"val_accuracy\": 50.0, \"test_accuracy\": 50.0}'\n");
        let (mut session, _) = session(&fake);
        session.load_dataset(write_dataset(fake.dir(), 4)).unwrap();
        session.train(TrainParams::default(), &CancelToken::new()).await.unwrap();

        let err = session.evaluate(&CancelToken::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ArtifactMissing);
        assert_eq!(fake.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_predict_zero_features_is_unsafe() {
        let fake = FakeBinary::standard();
        fake.write_scaler();
        let (session, _) = session(&fake);

        let result = session.predict(&[0.0; 14]).await.unwrap();

        assert_eq!(result.label, Label::Unsafe);
        assert_eq!(result.label.to_string(), "Unsafe");
        assert_eq!(result.probability, Some(0.12));
    }

    #[tokio::test]
    async fn test_predict_requires_scaler() {
        let fake = FakeBinary::standard();
        let (session, _) = session(&fake);

        let err = session.predict(&[0.0; 14]).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ArtifactMissing);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_predict_inputs_validated_first() {
        let fake = FakeBinary::standard();
        fake.write_scaler();
        let (session, _) = session(&fake);
        let mut inputs = vec!["1"; 14];
        inputs[2] = "";

        let err = session.predict_inputs(inputs.as_slice()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("Arsenic"));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_dataset() {
        let fake = FakeBinary::standard();
        let (mut session, _) = session(&fake);
        session.load_dataset(write_dataset(fake.dir(), 4)).unwrap();

        let err = session.load_dataset(fake.dir().join("missing.csv")).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(session.dataset().map(|d| d.len()), Some(4));
    }

    #[tokio::test]
    async fn test_missing_executable_kind() {
        let fake = FakeBinary::standard();
        let config = OrchestratorConfig::new(fake.dir().join("absent"), fake.dir());
        let mut session = Session::new(config);
        session.load_dataset(write_dataset(fake.dir(), 4)).unwrap();

        let err = session.train(TrainParams::default(), &CancelToken::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ExecutableMissing);
    }
}
