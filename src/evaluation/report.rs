//! Per-task evaluation reports

use super::metrics::TaskMetrics;
use crate::error::ModelFitError;
use crate::training::Task;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelOutcome {
    Scored(TaskMetrics),
    Failed(ModelFitError),
}

/// One row of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub model: String,
    pub fit_time_secs: f64,
    pub outcome: ModelOutcome,
}

impl EvaluationResult {
    pub fn metrics(&self) -> Option<&TaskMetrics> {
        match &self.outcome {
            ModelOutcome::Scored(m) => Some(m),
            ModelOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ModelFitError> {
        match &self.outcome {
            ModelOutcome::Failed(e) => Some(e),
            ModelOutcome::Scored(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error().is_some()
    }
}

/// Results of one roster on one task, in roster order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub task: Task,
    pub target: String,
    pub n_train: usize,
    pub n_test: usize,
    pub results: Vec<EvaluationResult>,
}

impl EvaluationReport {
    /// Highest-scoring model (R² or macro F1); the earliest wins a tie
    pub fn best(&self) -> Option<&EvaluationResult> {
        let mut best: Option<(&EvaluationResult, f64)> = None;
        for r in &self.results {
            let Some(score) = r.metrics().map(TaskMetrics::primary_score) else {
                continue;
            };
            if score.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((r, score));
            }
        }
        best.map(|(r, _)| r)
    }

    pub fn get(&self, model: &str) -> Option<&EvaluationResult> {
        self.results.iter().find(|r| r.model == model)
    }

    pub fn failures(&self) -> impl Iterator<Item = &EvaluationResult> {
        self.results.iter().filter(|r| r.is_failed())
    }

    pub fn primary_metric_name(&self) -> &'static str {
        match self.task {
            Task::Regression => "R²",
            Task::Classification => "Macro F1",
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} on '{}' ({} train / {} test rows)",
            self.task, self.target, self.n_train, self.n_test
        )?;
        match self.task {
            Task::Regression => writeln!(
                f,
                "{:<24} {:>12} {:>10} {:>14} {:>10} {:>10}",
                "Model", "MAE", "MAPE", "MSE", "R²", "Fit (s)"
            )?,
            Task::Classification => writeln!(
                f,
                "{:<24} {:>10} {:>10} {:>10}",
                "Model", "Accuracy", "Macro F1", "Fit (s)"
            )?,
        }
        writeln!(f, "{}", "─".repeat(84))?;

        for r in &self.results {
            match &r.outcome {
                ModelOutcome::Scored(TaskMetrics::Regression(m)) => writeln!(
                    f,
                    "{:<24} {:>12.4} {:>10.4} {:>14.4} {:>10.4} {:>10.3}",
                    r.model, m.mae, m.mape, m.mse, m.r2, r.fit_time_secs
                )?,
                ModelOutcome::Scored(TaskMetrics::Classification(m)) => writeln!(
                    f,
                    "{:<24} {:>10.4} {:>10.4} {:>10.3}",
                    r.model, m.accuracy, m.macro_f1, r.fit_time_secs
                )?,
                ModelOutcome::Failed(e) => {
                    writeln!(f, "{:<24} failed during {}: {}", r.model, e.stage, e.reason)?
                }
            }
        }

        if let Some(best) = self.best() {
            if let Some(m) = best.metrics() {
                writeln!(
                    f,
                    "best: {} ({} {:.4})",
                    best.model,
                    self.primary_metric_name(),
                    m.primary_score()
                )?;
            }
        }
        Ok(())
    }
}
