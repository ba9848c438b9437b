//! Per-job power features
//!
//! Three steps, in this order:
//! 1. drop jobs that never reported a power sample
//! 2. average each job's samples
//! 3. divide the average by the number of allocated nodes

use crate::config::ZeroNodePolicy;
use crate::data::JobTable;
use crate::error::{JobPowerError, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Rows removed by the empty-series filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterReport {
    pub rows_before: usize,
    pub removed: usize,
    pub removed_job_ids: Vec<i64>,
}

/// Remove jobs whose power-sample sequence is empty
pub fn filter_empty_power_series(table: JobTable) -> Result<(JobTable, FilterReport)> {
    let keep: Vec<bool> = table.iter().map(|r| !r.power_samples.is_empty()).collect();
    let removed_job_ids: Vec<i64> = table
        .iter()
        .zip(keep.iter())
        .filter(|(_, &k)| !k)
        .map(|(r, _)| r.job_id)
        .collect();

    let report = FilterReport {
        rows_before: table.len(),
        removed: removed_job_ids.len(),
        removed_job_ids,
    };

    if report.removed > 0 {
        warn!(
            removed = report.removed,
            rows_before = report.rows_before,
            "Dropped jobs without power samples"
        );
    }

    Ok((table.retain_rows(&keep)?, report))
}

/// Arithmetic mean of one job's samples
pub fn average(job_id: i64, samples: &[f64]) -> Result<f64> {
    if samples.is_empty() {
        return Err(JobPowerError::InvalidSequence {
            job_id,
            reason: "power series is empty".into(),
        });
    }
    if let Some(bad) = samples.iter().find(|v| !v.is_finite()) {
        return Err(JobPowerError::InvalidSequence {
            job_id,
            reason: format!("non-finite sample {}", bad),
        });
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    if !mean.is_finite() {
        return Err(JobPowerError::InvalidSequence {
            job_id,
            reason: "sample sum overflows".into(),
        });
    }
    Ok(mean)
}

/// Add `average_power_consumption`; the empty-series filter must run first
pub fn compute_average_power(table: JobTable) -> Result<JobTable> {
    let averages = table
        .iter()
        .map(|r| average(r.job_id, &r.power_samples))
        .collect::<Result<Vec<f64>>>()?;
    table.with_average_power_consumption(averages)
}

/// Add `norm_average_power_consumption` = average / allocated nodes.
///
/// Zero-node jobs either abort with [`JobPowerError::DivisionByZero`] or are
/// dropped, depending on `policy`.
pub fn compute_normalized_power(table: JobTable, policy: ZeroNodePolicy) -> Result<JobTable> {
    let zero_node_ids: Vec<i64> = table
        .iter()
        .filter(|r| r.num_nodes_alloc == 0)
        .map(|r| r.job_id)
        .collect();

    let table = match (zero_node_ids.first(), policy) {
        (None, _) => table,
        (Some(&job_id), ZeroNodePolicy::Error) => {
            return Err(JobPowerError::DivisionByZero { job_id });
        }
        (Some(_), ZeroNodePolicy::Exclude) => {
            warn!(
                removed = zero_node_ids.len(),
                job_ids = ?zero_node_ids,
                "Dropped jobs with zero allocated nodes"
            );
            let keep: Vec<bool> = table.iter().map(|r| r.num_nodes_alloc > 0).collect();
            table.retain_rows(&keep)?
        }
    };

    let normalized: Vec<f64> = table
        .average_power_consumption()?
        .iter()
        .zip(table.iter())
        .map(|(avg, r)| avg / r.num_nodes_alloc as f64)
        .collect();

    let table = table.with_norm_average_power_consumption(normalized)?;
    if let Ok(summary) = PowerSummary::from_table(&table) {
        info!(
            jobs = summary.count,
            min = summary.min,
            max = summary.max,
            mean = summary.mean,
            "Normalized power per node"
        );
    }
    Ok(table)
}

/// Descriptive statistics of the per-node power column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

impl PowerSummary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = if values.len() > 1 {
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
        } else {
            0.0
        };
        Some(Self {
            count: values.len(),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean,
            std: var.sqrt(),
        })
    }

    pub fn from_table(table: &JobTable) -> Result<Self> {
        Self::from_values(table.norm_average_power_consumption()?)
            .ok_or_else(|| JobPowerError::InvalidInput("no jobs to summarize".into()))
    }
}
