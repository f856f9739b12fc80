//! Telemetry Series Aggregator
//!
//! Append-only (epoch, accuracy %, loss) history of one training run.
//! Reset once per training invocation, closed by the run's Summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::protocol::{ProgressEvent, SummaryEvent, TrainingEvent};

// ============================================================================
// TYPES
// ============================================================================

/// Lifecycle of the current series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No run started yet in this session
    Idle,
    /// Accepting progress
    Running,
    /// Summary received, closed until the next reset
    Completed,
    /// Process failed or was cancelled; history kept for display
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

/// One plotted point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub epoch: u64,
    /// Training accuracy in percent
    pub accuracy: f64,
    pub loss: f64,
}

/// Final figures of a completed run (percentages)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub val_accuracy: f64,
    pub test_accuracy: f64,
    pub finished_at: DateTime<Utc>,
}

/// Read-only copy handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub run_id: Option<Uuid>,
    pub state: RunState,
    pub started_at: Option<DateTime<Utc>>,
    pub points: Vec<TelemetryPoint>,
    pub summary: Option<RunSummary>,
    pub latest_epoch: Option<u64>,
    pub latest_loss: Option<f64>,
    pub rejected_events: u64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TelemetryError {
    #[error("no training run is active")]
    NoActiveRun,
    #[error("progress for epoch {epoch} arrived after the run summary")]
    ProgressAfterSummary { epoch: u64 },
    #[error("run summary already recorded")]
    DuplicateSummary,
    #[error("epoch went backwards ({previous} -> {epoch})")]
    EpochRegression { previous: u64, epoch: u64 },
}

// ============================================================================
// AGGREGATOR
// ============================================================================

#[derive(Debug)]
pub struct TelemetryAggregator {
    run_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    state: RunState,
    points: Vec<TelemetryPoint>,
    summary: Option<RunSummary>,
    rejected: u64,
}

impl Default for TelemetryAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryAggregator {
    pub fn new() -> Self {
        Self {
            run_id: None,
            started_at: None,
            state: RunState::Idle,
            points: Vec::new(),
            summary: None,
            rejected: 0,
        }
    }

    /// Start a new series; the only place history is discarded
    pub fn begin_run(&mut self) -> Uuid {
        let run_id = Uuid::new_v4();
        self.run_id = Some(run_id);
        self.started_at = Some(Utc::now());
        self.state = RunState::Running;
        self.points.clear();
        self.summary = None;
        self.rejected = 0;
        run_id
    }

    /// Forget the previous run entirely (new dataset loaded)
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Apply one decoded event.
    ///
    /// Events that would break the series ordering are rejected and counted,
    /// never recorded.
    pub fn apply(&mut self, event: &TrainingEvent) -> Result<(), TelemetryError> {
        let result = match event {
            TrainingEvent::Progress(progress) => self.apply_progress(progress),
            TrainingEvent::Summary(summary) => self.apply_summary(summary),
        };
        if result.is_err() {
            self.rejected += 1;
        }
        result
    }

    fn apply_progress(&mut self, progress: &ProgressEvent) -> Result<(), TelemetryError> {
        match self.state {
            RunState::Running => {}
            RunState::Completed => {
                return Err(TelemetryError::ProgressAfterSummary { epoch: progress.epoch });
            }
            RunState::Idle | RunState::Failed => return Err(TelemetryError::NoActiveRun),
        }

        if let Some(last) = self.points.last() {
            if progress.epoch < last.epoch {
                return Err(TelemetryError::EpochRegression {
                    previous: last.epoch,
                    epoch: progress.epoch,
                });
            }
        }

        self.points.push(TelemetryPoint {
            epoch: progress.epoch,
            accuracy: progress.accuracy * 100.0,
            loss: progress.loss,
        });
        Ok(())
    }

    fn apply_summary(&mut self, summary: &SummaryEvent) -> Result<(), TelemetryError> {
        match self.state {
            RunState::Running => {
                self.summary = Some(RunSummary {
                    val_accuracy: summary.val_accuracy,
                    test_accuracy: summary.test_accuracy,
                    finished_at: Utc::now(),
                });
                self.state = RunState::Completed;
                Ok(())
            }
            RunState::Completed => Err(TelemetryError::DuplicateSummary),
            RunState::Idle | RunState::Failed => Err(TelemetryError::NoActiveRun),
        }
    }

    /// Close a run whose process exited cleanly without a summary
    pub fn mark_completed(&mut self) {
        if self.state == RunState::Running {
            self.state = RunState::Completed;
        }
    }

    /// Close the series after a failed or cancelled run.
    ///
    /// A summary received before the failure is dropped: the run did not
    /// complete, so its figures are not reported.
    pub fn mark_failed(&mut self) {
        if self.state != RunState::Idle {
            self.state = RunState::Failed;
            self.summary = None;
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    pub fn points(&self) -> &[TelemetryPoint] {
        &self.points
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    pub fn rejected_events(&self) -> u64 {
        self.rejected
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let last = self.points.last();
        TelemetrySnapshot {
            run_id: self.run_id,
            state: self.state,
            started_at: self.started_at,
            points: self.points.clone(),
            summary: self.summary.clone(),
            latest_epoch: last.map(|p| p.epoch),
            latest_loss: last.map(|p| p.loss),
            rejected_events: self.rejected,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(epoch: u64, accuracy: f64, loss: f64) -> TrainingEvent {
        TrainingEvent::Progress(ProgressEvent {
            epoch,
            accuracy,
            loss,
            val_accuracy: None,
        })
    }

    fn summary(val: f64, test: f64) -> TrainingEvent {
        TrainingEvent::Summary(SummaryEvent {
            val_accuracy: val,
            test_accuracy: test,
        })
    }

    #[test]
    fn test_progress_scaled_to_percent() {
        let mut agg = TelemetryAggregator::new();
        agg.begin_run();

        agg.apply(&progress(1, 0.5, 0.69)).unwrap();
        agg.apply(&progress(2, 0.625, 0.55)).unwrap();

        let snap = agg.snapshot();
        assert_eq!(snap.points.len(), 2);
        assert_eq!(snap.points[0].accuracy, 50.0);
        assert_eq!(snap.points[1].accuracy, 62.5);
        assert_eq!(snap.latest_epoch, Some(2));
        assert_eq!(snap.latest_loss, Some(0.55));
    }

    #[test]
    fn test_summary_closes_series() {
        let mut agg = TelemetryAggregator::new();
        agg.begin_run();
        agg.apply(&progress(1, 0.5, 0.7)).unwrap();
        agg.apply(&summary(81.0, 79.5)).unwrap();

        assert_eq!(agg.state(), RunState::Completed);
        assert_eq!(agg.summary().unwrap().test_accuracy, 79.5);

        assert_eq!(
            agg.apply(&progress(2, 0.6, 0.6)),
            Err(TelemetryError::ProgressAfterSummary { epoch: 2 })
        );
        assert_eq!(agg.apply(&summary(1.0, 1.0)), Err(TelemetryError::DuplicateSummary));
        assert_eq!(agg.points().len(), 1);
        assert_eq!(agg.summary().unwrap().val_accuracy, 81.0);
        assert_eq!(agg.rejected_events(), 2);
    }

    #[test]
    fn test_epoch_regression_rejected() {
        let mut agg = TelemetryAggregator::new();
        agg.begin_run();
        agg.apply(&progress(5, 0.5, 0.5)).unwrap();
        agg.apply(&progress(5, 0.5, 0.5)).unwrap();

        assert_eq!(
            agg.apply(&progress(4, 0.5, 0.5)),
            Err(TelemetryError::EpochRegression { previous: 5, epoch: 4 })
        );
        let epochs: Vec<u64> = agg.points().iter().map(|p| p.epoch).collect();
        assert_eq!(epochs, vec![5, 5]);
    }

    #[test]
    fn test_events_need_an_active_run() {
        let mut agg = TelemetryAggregator::new();
        assert_eq!(agg.apply(&progress(1, 0.5, 0.5)), Err(TelemetryError::NoActiveRun));
        assert_eq!(agg.state(), RunState::Idle);
    }

    #[test]
    fn test_begin_run_resets_history() {
        let mut agg = TelemetryAggregator::new();
        let first = agg.begin_run();
        agg.apply(&progress(1, 0.5, 0.5)).unwrap();
        agg.apply(&summary(50.0, 50.0)).unwrap();

        let second = agg.begin_run();

        assert_ne!(first, second);
        assert!(agg.points().is_empty());
        assert!(agg.summary().is_none());
        assert_eq!(agg.state(), RunState::Running);
    }

    #[test]
    fn test_completed_without_summary_closes_series() {
        let mut agg = TelemetryAggregator::new();
        agg.begin_run();
        agg.apply(&progress(1, 0.5, 0.5)).unwrap();

        agg.mark_completed();

        assert_eq!(agg.state(), RunState::Completed);
        assert!(agg.summary().is_none());
        assert_eq!(
            agg.apply(&progress(2, 0.6, 0.4)),
            Err(TelemetryError::ProgressAfterSummary { epoch: 2 })
        );
    }

    #[test]
    fn test_failed_run_keeps_history() {
        let mut agg = TelemetryAggregator::new();
        agg.begin_run();
        agg.apply(&progress(1, 0.5, 0.5)).unwrap();
        agg.apply(&progress(2, 0.6, 0.4)).unwrap();

        agg.mark_failed();

        assert_eq!(agg.state(), RunState::Failed);
        assert_eq!(agg.points().len(), 2);
        assert!(agg.summary().is_none());
        assert_eq!(agg.apply(&progress(3, 0.7, 0.3)), Err(TelemetryError::NoActiveRun));
    }
}
