//! Model features drawn from job records
//!
//! [`JobFeature`] names every record attribute a model may use. Encoding
//! turns a [`JobTable`] into a dense [`FeatureFrame`]; correlation analysis
//! then picks the subset that is handed to the scaler.

mod correlation;
mod encoder;

pub use correlation::{correlation_matrix, pearson, select_features, CorrelationMatrix, FeatureSelection};
pub use encoder::{encode_categorical, CategoryEncoder};

use crate::data::JobRecord;
use crate::error::{JobPowerError, Result};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A job attribute usable as a model input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFeature {
    UserId,
    GroupId,
    NumNodesAlloc,
    NumCoresAlloc,
    NumGpusAlloc,
    MemAlloc,
    Partition,
    Qos,
    TimeLimit,
    RunTime,
    JobState,
    Shared,
    ThreadsPerCore,
}

/// Raw value of one feature for one job
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue<'a> {
    Numeric(f64),
    Category(&'a str),
}

impl JobFeature {
    /// Every feature, in record field order
    pub const ALL: [JobFeature; 13] = [
        JobFeature::UserId,
        JobFeature::GroupId,
        JobFeature::NumNodesAlloc,
        JobFeature::NumCoresAlloc,
        JobFeature::NumGpusAlloc,
        JobFeature::MemAlloc,
        JobFeature::Partition,
        JobFeature::Qos,
        JobFeature::TimeLimit,
        JobFeature::RunTime,
        JobFeature::JobState,
        JobFeature::Shared,
        JobFeature::ThreadsPerCore,
    ];

    /// Column name in the source file
    pub fn name(&self) -> &'static str {
        match self {
            JobFeature::UserId => "user_id",
            JobFeature::GroupId => "group_id",
            JobFeature::NumNodesAlloc => "num_nodes_alloc",
            JobFeature::NumCoresAlloc => "num_cores_alloc",
            JobFeature::NumGpusAlloc => "num_gpus_alloc",
            JobFeature::MemAlloc => "mem_alloc",
            JobFeature::Partition => "partition",
            JobFeature::Qos => "qos",
            JobFeature::TimeLimit => "time_limit",
            JobFeature::RunTime => "run_time",
            JobFeature::JobState => "job_state",
            JobFeature::Shared => "shared",
            JobFeature::ThreadsPerCore => "threads_per_core",
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(
            self,
            JobFeature::UserId
                | JobFeature::GroupId
                | JobFeature::Partition
                | JobFeature::Qos
                | JobFeature::JobState
                | JobFeature::Shared
        )
    }

    pub fn categorical() -> impl Iterator<Item = JobFeature> {
        Self::ALL.into_iter().filter(|f| f.is_categorical())
    }

    pub fn value<'a>(&self, record: &'a JobRecord) -> FeatureValue<'a> {
        match self {
            JobFeature::UserId => FeatureValue::Category(&record.user_id),
            JobFeature::GroupId => FeatureValue::Category(&record.group_id),
            JobFeature::NumNodesAlloc => FeatureValue::Numeric(record.num_nodes_alloc as f64),
            JobFeature::NumCoresAlloc => FeatureValue::Numeric(record.num_cores_alloc as f64),
            JobFeature::NumGpusAlloc => FeatureValue::Numeric(record.num_gpus_alloc as f64),
            JobFeature::MemAlloc => FeatureValue::Numeric(record.mem_alloc),
            JobFeature::Partition => FeatureValue::Category(&record.partition),
            JobFeature::Qos => FeatureValue::Category(&record.qos),
            JobFeature::TimeLimit => FeatureValue::Numeric(record.time_limit),
            JobFeature::RunTime => FeatureValue::Numeric(record.run_time),
            JobFeature::JobState => FeatureValue::Category(&record.job_state),
            JobFeature::Shared => FeatureValue::Category(&record.shared),
            JobFeature::ThreadsPerCore => FeatureValue::Numeric(record.threads_per_core as f64),
        }
    }
}

impl fmt::Display for JobFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JobFeature {
    type Err = JobPowerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.name() == s.trim())
            .ok_or_else(|| JobPowerError::Schema(format!("unknown feature '{}'", s)))
    }
}

/// Dense `f64` matrix with one named column per feature
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    names: Vec<String>,
    data: Array2<f64>,
}

impl FeatureFrame {
    pub fn new(names: Vec<String>, data: Array2<f64>) -> Result<Self> {
        if names.len() != data.ncols() {
            return Err(JobPowerError::shape_mismatch(names.len(), data.ncols(), "n_columns"));
        }
        Ok(Self { names, data })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn into_data(self) -> Array2<f64> {
        self.data
    }

    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.data.ncols()
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| JobPowerError::Schema(format!("column '{}' not in feature frame", name)))
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        Ok(self.data.column(self.position(name)?))
    }

    /// New frame holding `names` in the given order
    pub fn select(&self, names: &[String]) -> Result<FeatureFrame> {
        let idx = names
            .iter()
            .map(|n| self.position(n))
            .collect::<Result<Vec<_>>>()?;
        Ok(FeatureFrame {
            names: names.to_vec(),
            data: self.data.select(Axis(1), &idx),
        })
    }
}
