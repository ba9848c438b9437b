//! Model evaluation harness
//!
//! Runs a roster of [`Estimator`]s through fit, predict and score on one
//! train/test split. A model that fails is recorded in its own row and the
//! rest of the roster still runs.

mod metrics;
mod report;

pub use metrics::{ClassMetrics, ClassificationMetrics, RegressionMetrics, TaskMetrics};
pub use report::{EvaluationReport, EvaluationResult, ModelOutcome};

use crate::error::{FitStage, ModelFitError};
use crate::preprocessing::TrainTestSplit;
use crate::training::{Estimator, Task};
use std::time::Instant;
use tracing::{info, warn};

/// Scores every model of a roster on one task
#[derive(Debug, Clone)]
pub struct EvaluationHarness {
    task: Task,
    target: String,
}

impl EvaluationHarness {
    pub fn new(task: Task, target: impl Into<String>) -> Self {
        Self {
            task,
            target: target.into(),
        }
    }

    pub fn task(&self) -> Task {
        self.task
    }

    /// Fit, predict and score each model in order
    pub fn evaluate(&self, models: &mut [Box<dyn Estimator>], split: &TrainTestSplit<f64>) -> EvaluationReport {
        let results = models
            .iter_mut()
            .map(|model| self.evaluate_one(model.as_mut(), split))
            .collect();

        EvaluationReport {
            task: self.task,
            target: self.target.clone(),
            n_train: split.x_train.nrows(),
            n_test: split.x_test.nrows(),
            results,
        }
    }

    fn evaluate_one(&self, model: &mut dyn Estimator, split: &TrainTestSplit<f64>) -> EvaluationResult {
        let name = model.name().to_string();
        let start = Instant::now();
        let outcome = self.run(model, split);
        let fit_time_secs = start.elapsed().as_secs_f64();

        let outcome = match outcome {
            Ok(metrics) => {
                info!(
                    model = %name,
                    task = %self.task,
                    score = metrics.primary_score(),
                    secs = fit_time_secs,
                    "Model evaluated"
                );
                ModelOutcome::Scored(metrics)
            }
            Err(err) => {
                warn!(model = %name, task = %self.task, stage = %err.stage, reason = %err.reason, "Model failed");
                ModelOutcome::Failed(err)
            }
        };

        EvaluationResult {
            model: name,
            fit_time_secs,
            outcome,
        }
    }

    fn run(&self, model: &mut dyn Estimator, split: &TrainTestSplit<f64>) -> Result<TaskMetrics, ModelFitError> {
        let name = model.name().to_string();
        let fail = |stage: FitStage, reason: String| ModelFitError::new(name.clone(), stage, reason);

        model
            .fit(&split.x_train, &split.y_train)
            .map_err(|e| fail(FitStage::Fit, e.to_string()))?;

        let y_pred = model
            .predict(&split.x_test)
            .map_err(|e| fail(FitStage::Predict, e.to_string()))?;

        if y_pred.len() != split.y_test.len() {
            return Err(fail(
                FitStage::Predict,
                format!("expected {} predictions, got {}", split.y_test.len(), y_pred.len()),
            ));
        }
        if let Some(bad) = y_pred.iter().find(|v| !v.is_finite()) {
            return Err(fail(FitStage::Predict, format!("non-finite prediction {}", bad)));
        }

        let metrics = match self.task {
            Task::Regression => RegressionMetrics::compute(&split.y_test, &y_pred).map(TaskMetrics::Regression),
            Task::Classification => {
                ClassificationMetrics::compute(&split.y_test, &y_pred).map(TaskMetrics::Classification)
            }
        };
        metrics.map_err(|e| fail(FitStage::Predict, e.to_string()))
    }
}
