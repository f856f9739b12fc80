//! Sample Evaluation Engine

use rand::Rng;

use super::{EvaluationError, EvaluationReport, EvaluationRow, EvaluationState, RowFailure};
use crate::logic::dataset::{Dataset, Features};
use crate::logic::events::{EventSink, UiEvent};
use crate::logic::protocol::{parse_prediction, PredictionResult};
use crate::logic::runner::ProcessRunner;
use crate::logic::scaler::load_scaler;

/// Up to `sample_size` distinct indices below `len`, uniformly at random
pub fn sample_indices<R: Rng + ?Sized>(rng: &mut R, len: usize, sample_size: usize) -> Vec<usize> {
    rand::seq::index::sample(rng, len, sample_size.min(len)).into_vec()
}

/// Drives one evaluation pass and reports every state transition
pub struct SampleEvaluator<'a> {
    runner: &'a ProcessRunner,
    sink: &'a dyn EventSink,
    state: EvaluationState,
}

impl<'a> SampleEvaluator<'a> {
    pub fn new(runner: &'a ProcessRunner, sink: &'a dyn EventSink) -> Self {
        Self {
            runner,
            sink,
            state: EvaluationState::Idle,
        }
    }

    pub fn state(&self) -> EvaluationState {
        self.state
    }

    fn transition(&mut self, state: EvaluationState) {
        self.state = state;
        self.sink.emit(&UiEvent::EvaluationState(state));
    }

    /// Evaluate a random sample of `dataset`.
    ///
    /// Any failing row aborts the pass; no partial table is produced.
    pub async fn run<R: Rng + ?Sized>(
        &mut self,
        dataset: &Dataset,
        rng: &mut R,
    ) -> Result<EvaluationReport, EvaluationError> {
        match self.evaluate(dataset, rng).await {
            Ok(report) => {
                log::info!(
                    "Evaluation done: {}/{} predictions matched",
                    report.matched,
                    report.rows.len()
                );
                self.transition(EvaluationState::Done);
                self.sink.emit(&UiEvent::EvaluationCompleted(report.clone()));
                Ok(report)
            }
            Err(e) => {
                log::warn!("Evaluation failed: {}", e);
                self.transition(EvaluationState::Failed);
                Err(e)
            }
        }
    }

    async fn evaluate<R: Rng + ?Sized>(
        &mut self,
        dataset: &Dataset,
        rng: &mut R,
    ) -> Result<EvaluationReport, EvaluationError> {
        self.transition(EvaluationState::AwaitingScaler);
        let scaler = load_scaler(&self.runner.config().scaler_path())?;

        self.transition(EvaluationState::Sampling);
        if dataset.is_empty() {
            return Err(EvaluationError::EmptyDataset);
        }
        let indices = sample_indices(rng, dataset.len(), self.runner.config().sample_size);
        log::debug!("Sampled dataset rows {:?}", indices);

        let mut rows = Vec::with_capacity(indices.len());
        for (position, &index) in indices.iter().enumerate() {
            self.transition(EvaluationState::PredictingRow(position));

            let observation = dataset.get(index).ok_or(EvaluationError::EmptyDataset)?;
            let features = *observation.features();

            let outside = scaler.out_of_bounds(&features);
            if !outside.is_empty() {
                log::debug!("Row {} has {} features outside training bounds", index, outside.len());
            }

            let prediction = self
                .predict(&features)
                .await
                .map_err(|source| EvaluationError::Row {
                    index,
                    features,
                    source,
                })?;

            rows.push(EvaluationRow {
                index,
                features,
                actual: observation.label(),
                prediction,
            });
        }

        Ok(EvaluationReport::from_rows(rows))
    }

    async fn predict(&self, features: &Features) -> Result<PredictionResult, RowFailure> {
        let output = self.runner.run_predict(features).await?;
        Ok(parse_prediction(&output)?)
    }
}
