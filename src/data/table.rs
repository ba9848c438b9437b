//! Typed job records and the table threaded through the pipeline

use crate::error::{JobPowerError, Result};
use serde::{Deserialize, Serialize};

/// One supercomputer job execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: i64,
    pub user_id: String,
    pub group_id: String,
    pub num_nodes_alloc: u32,
    pub num_cores_alloc: u32,
    pub num_gpus_alloc: u32,
    pub mem_alloc: f64,
    pub partition: String,
    pub qos: String,
    pub time_limit: f64,
    pub run_time: f64,
    pub job_state: String,
    pub shared: String,
    pub threads_per_core: u32,
    /// Node power samples at a fixed interval, in watts
    pub power_samples: Vec<f64>,
}

impl JobRecord {
    /// Minimal record; scheduling metadata takes neutral placeholder values
    pub fn new(job_id: i64, num_nodes_alloc: u32, power_samples: Vec<f64>) -> Self {
        Self {
            job_id,
            user_id: String::new(),
            group_id: String::new(),
            num_nodes_alloc,
            num_cores_alloc: 0,
            num_gpus_alloc: 0,
            mem_alloc: 0.0,
            partition: String::new(),
            qos: String::new(),
            time_limit: 0.0,
            run_time: 0.0,
            job_state: String::new(),
            shared: String::new(),
            threads_per_core: 1,
            power_samples,
        }
    }
}

/// Ordered job records plus the columns derived from them.
///
/// Stages take the table by value and hand back a new one; derived columns
/// always have exactly one entry per record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobTable {
    records: Vec<JobRecord>,
    average_power_consumption: Option<Vec<f64>>,
    norm_average_power_consumption: Option<Vec<f64>>,
    cluster: Option<Vec<i64>>,
}

impl JobTable {
    pub fn new(records: Vec<JobRecord>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[JobRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, JobRecord> {
        self.records.iter()
    }

    pub fn average_power_consumption(&self) -> Result<&[f64]> {
        self.average_power_consumption
            .as_deref()
            .ok_or_else(|| missing("average_power_consumption"))
    }

    pub fn norm_average_power_consumption(&self) -> Result<&[f64]> {
        self.norm_average_power_consumption
            .as_deref()
            .ok_or_else(|| missing("norm_average_power_consumption"))
    }

    pub fn cluster(&self) -> Result<&[i64]> {
        self.cluster.as_deref().ok_or_else(|| missing("cluster"))
    }

    pub fn with_average_power_consumption(mut self, values: Vec<f64>) -> Result<Self> {
        self.check_len(values.len(), "average_power_consumption")?;
        self.average_power_consumption = Some(values);
        Ok(self)
    }

    pub fn with_norm_average_power_consumption(mut self, values: Vec<f64>) -> Result<Self> {
        self.check_len(values.len(), "norm_average_power_consumption")?;
        self.norm_average_power_consumption = Some(values);
        Ok(self)
    }

    pub fn with_cluster(mut self, labels: Vec<i64>) -> Result<Self> {
        self.check_len(labels.len(), "cluster")?;
        self.cluster = Some(labels);
        Ok(self)
    }

    /// Keep rows where `keep` is true, derived columns included
    pub fn retain_rows(self, keep: &[bool]) -> Result<Self> {
        self.check_len(keep.len(), "row mask")?;
        Ok(Self {
            records: mask(self.records, keep),
            average_power_consumption: self.average_power_consumption.map(|c| mask(c, keep)),
            norm_average_power_consumption: self.norm_average_power_consumption.map(|c| mask(c, keep)),
            cluster: self.cluster.map(|c| mask(c, keep)),
        })
    }

    /// Keep the first `floor(ratio * n)` rows in their given order.
    ///
    /// At least one row survives when the table is not empty.
    pub fn subsample(self, ratio: f64) -> Result<Self> {
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(JobPowerError::InvalidParameter {
                name: "subsampling_ratio".into(),
                value: ratio.to_string(),
                reason: "must lie in (0, 1]".into(),
            });
        }
        let n = self.len();
        let keep_n = ((ratio * n as f64).floor() as usize).clamp(n.min(1), n);
        let keep: Vec<bool> = (0..n).map(|i| i < keep_n).collect();
        self.retain_rows(&keep)
    }

    fn check_len(&self, actual: usize, column: &str) -> Result<()> {
        if actual != self.records.len() {
            return Err(JobPowerError::shape_mismatch(self.records.len(), actual, column));
        }
        Ok(())
    }
}

impl FromIterator<JobRecord> for JobTable {
    fn from_iter<I: IntoIterator<Item = JobRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

fn missing(column: &str) -> JobPowerError {
    JobPowerError::Schema(format!("derived column '{}' has not been computed", column))
}

fn mask<T>(values: Vec<T>, keep: &[bool]) -> Vec<T> {
    values
        .into_iter()
        .zip(keep.iter())
        .filter_map(|(v, &k)| k.then_some(v))
        .collect()
}
