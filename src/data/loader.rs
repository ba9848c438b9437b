//! Reading job traces from columnar files

use super::table::{JobRecord, JobTable};
use crate::error::{JobPowerError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Source column holding the per-job power sample list
pub const POWER_COLUMN: &str = "node_power_consumption";

/// Columns every job file must provide (besides the optional `job_id`)
pub const REQUIRED_COLUMNS: &[&str] = &[
    "user_id",
    "group_id",
    "num_nodes_alloc",
    "num_cores_alloc",
    "num_gpus_alloc",
    "mem_alloc",
    "partition",
    "qos",
    "time_limit",
    "run_time",
    "job_state",
    "shared",
    "threads_per_core",
    POWER_COLUMN,
];

/// Input file formats understood by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Parquet,
    Csv { delimiter: u8 },
    NdJson,
}

impl FileFormat {
    /// Pick a format from the file extension; unknown extensions read as Parquet
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => FileFormat::Csv { delimiter: b',' },
            "tsv" => FileFormat::Csv { delimiter: b'\t' },
            "json" | "jsonl" | "ndjson" => FileFormat::NdJson,
            _ => FileFormat::Parquet,
        }
    }
}

/// File information
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub format: FileFormat,
    pub file_size: u64,
    pub n_rows: usize,
    pub columns: Vec<String>,
}

/// Loads job tables from Parquet, CSV or line-delimited JSON
#[derive(Debug, Clone, Default)]
pub struct JobLoader {
    infer_schema_length: Option<usize>,
}

impl JobLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: Some(1000),
        }
    }

    /// Rows scanned to infer CSV/JSON column types
    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = Some(rows);
        self
    }

    /// Read a file and convert it into a typed job table
    pub fn load(&self, path: impl AsRef<Path>) -> Result<JobTable> {
        let path = path.as_ref();
        let start = Instant::now();
        let df = self.read_frame(path)?;
        let table = table_from_dataframe(&df)?;
        info!(
            path = %path.display(),
            rows = table.len(),
            elapsed = ?start.elapsed(),
            "Loaded job table"
        );
        Ok(table)
    }

    /// Read only the named Parquet columns
    pub fn load_columns(&self, path: impl AsRef<Path>, columns: &[&str]) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = open(path)?;
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        ParquetReader::new(file)
            .with_columns(Some(columns))
            .finish()
            .map_err(|e| access_error(path, e))
    }

    /// Size, row count and column names of a job file
    pub fn file_info(&self, path: impl AsRef<Path>) -> Result<FileInfo> {
        self.read_with_info(path).map(|(info, _)| info)
    }

    /// Read the raw dataframe once and describe it alongside
    pub fn read_with_info(&self, path: impl AsRef<Path>) -> Result<(FileInfo, DataFrame)> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| access_error(path, e))?;
        let df = self.read_frame(path)?;
        let info = FileInfo {
            path: path.to_path_buf(),
            format: FileFormat::from_path(path),
            file_size: metadata.len(),
            n_rows: df.height(),
            columns: df.get_column_names().iter().map(|c| c.to_string()).collect(),
        };
        Ok((info, df))
    }

    /// Read the raw dataframe without schema conversion
    pub fn read_frame(&self, path: &Path) -> Result<DataFrame> {
        let format = FileFormat::from_path(path);
        debug!(path = %path.display(), ?format, "Reading job file");
        let df = match format {
            FileFormat::Parquet => ParquetReader::new(open(path)?).finish(),
            FileFormat::Csv { delimiter } => {
                let parse_opts = CsvParseOptions::default().with_separator(delimiter);
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_infer_schema_length(self.infer_schema_length)
                    .with_parse_options(parse_opts)
                    .into_reader_with_file_handle(open(path)?)
                    .finish()
            }
            FileFormat::NdJson => JsonReader::new(open(path)?)
                .with_json_format(JsonFormat::JsonLines)
                .infer_schema_len(self.infer_schema_length.and_then(std::num::NonZeroUsize::new))
                .finish(),
        };
        df.map_err(|e| access_error(path, e))
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| access_error(path, e))
}

fn access_error(path: &Path, err: impl std::fmt::Display) -> JobPowerError {
    JobPowerError::DataAccess(format!("{}: {}", path.display(), err))
}

/// Convert a dataframe with the job schema into typed records
pub fn table_from_dataframe(df: &DataFrame) -> Result<JobTable> {
    for name in REQUIRED_COLUMNS {
        column(df, name)?;
    }

    let n = df.height();
    let job_ids = match df.column("job_id") {
        Ok(_) => i64_column(df, "job_id")?,
        Err(_) => (0..n as i64).collect(),
    };
    let user_id = string_column(df, "user_id")?;
    let group_id = string_column(df, "group_id")?;
    let num_nodes_alloc = u32_column(df, "num_nodes_alloc")?;
    let num_cores_alloc = u32_column(df, "num_cores_alloc")?;
    let num_gpus_alloc = u32_column(df, "num_gpus_alloc")?;
    let mem_alloc = f64_column(df, "mem_alloc")?;
    let partition = string_column(df, "partition")?;
    let qos = string_column(df, "qos")?;
    let time_limit = f64_column(df, "time_limit")?;
    let run_time = f64_column(df, "run_time")?;
    let job_state = string_column(df, "job_state")?;
    let shared = string_column(df, "shared")?;
    let threads_per_core = u32_column(df, "threads_per_core")?;
    let power = power_column(df, POWER_COLUMN)?;

    let records = (0..n)
        .map(|i| JobRecord {
            job_id: job_ids[i],
            user_id: user_id[i].clone(),
            group_id: group_id[i].clone(),
            num_nodes_alloc: num_nodes_alloc[i],
            num_cores_alloc: num_cores_alloc[i],
            num_gpus_alloc: num_gpus_alloc[i],
            mem_alloc: mem_alloc[i],
            partition: partition[i].clone(),
            qos: qos[i].clone(),
            time_limit: time_limit[i],
            run_time: run_time[i],
            job_state: job_state[i].clone(),
            shared: shared[i].clone(),
            threads_per_core: threads_per_core[i],
            power_samples: power[i].clone(),
        })
        .collect();

    Ok(JobTable::new(records))
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|c| c.as_materialized_series())
        .map_err(|_| JobPowerError::Schema(format!("missing column '{}'", name)))
}

fn cast(series: &Series, name: &str, dtype: &DataType) -> Result<Series> {
    series.cast(dtype).map_err(|e| {
        JobPowerError::Schema(format!("column '{}' cannot be read as {}: {}", name, dtype, e))
    })
}

fn null_error(name: &str, row: usize) -> JobPowerError {
    JobPowerError::Schema(format!("column '{}' has a null at row {}", name, row))
}

fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = cast(column(df, name)?, name, &DataType::Float64)?;
    let ca = series.f64()?;
    ca.into_iter()
        .enumerate()
        .map(|(row, v)| v.ok_or_else(|| null_error(name, row)))
        .collect()
}

/// Whole-number column; fractional or out-of-range values are schema errors
fn i64_column(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    let source = column(df, name)?;
    if source.dtype().is_float() {
        let series = cast(source, name, &DataType::Float64)?;
        return series
            .f64()?
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                let v = v.ok_or_else(|| null_error(name, row))?;
                if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
                    Ok(v as i64)
                } else {
                    Err(JobPowerError::Schema(format!(
                        "column '{}' value {} at row {} is not a whole number",
                        name, v, row
                    )))
                }
            })
            .collect();
    }
    let series = source.strict_cast(&DataType::Int64).map_err(|e| {
        JobPowerError::Schema(format!("column '{}' cannot be read as {}: {}", name, DataType::Int64, e))
    })?;
    let ca = series.i64()?;
    ca.into_iter()
        .enumerate()
        .map(|(row, v)| v.ok_or_else(|| null_error(name, row)))
        .collect()
}

fn u32_column(df: &DataFrame, name: &str) -> Result<Vec<u32>> {
    i64_column(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            u32::try_from(v).map_err(|_| {
                JobPowerError::Schema(format!(
                    "column '{}' value {} at row {} is not a valid count",
                    name, v, row
                ))
            })
        })
        .collect()
}

/// Identifier and category columns; nulls read as the empty string
fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = cast(column(df, name)?, name, &DataType::String)?;
    let ca = series.str()?;
    Ok(ca
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

fn power_column(df: &DataFrame, name: &str) -> Result<Vec<Vec<f64>>> {
    let series = column(df, name)?;
    match series.dtype() {
        DataType::List(_) => {
            let ca = series.list()?;
            ca.into_iter()
                .map(|entry| match entry {
                    Some(samples) => {
                        let samples = cast(&samples, name, &DataType::Float64)?;
                        Ok(samples.f64()?.into_iter().flatten().collect())
                    }
                    None => Ok(Vec::new()),
                })
                .collect()
        }
        DataType::String => {
            let ca = series.str()?;
            ca.into_iter()
                .enumerate()
                .map(|(row, entry)| match entry {
                    Some(text) => parse_power_text(text).map_err(|reason| {
                        JobPowerError::Schema(format!(
                            "column '{}' row {}: {}",
                            name, row, reason
                        ))
                    }),
                    None => Ok(Vec::new()),
                })
                .collect()
        }
        other => Err(JobPowerError::Schema(format!(
            "column '{}' must be a list of numbers, found {}",
            name, other
        ))),
    }
}

/// Parse a textual sample list such as `[1.5, 2.0]` or `1.5;2.0`
pub fn parse_power_text(text: &str) -> std::result::Result<Vec<f64>, String> {
    let inner = text.trim().trim_start_matches('[').trim_end_matches(']');
    inner
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|tok| !tok.is_empty())
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| format!("'{}' is not a number", tok))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn job_frame() -> DataFrame {
        let power = Series::new(
            POWER_COLUMN.into(),
            &[
                Series::new("".into(), &[100.0, 110.0]),
                Series::new("".into(), Vec::<f64>::new()),
                Series::new("".into(), &[300.0]),
            ],
        );
        let mut df = df!(
            "job_id" => &[11i64, 12, 13],
            "user_id" => &[1i64, 2, 1],
            "group_id" => &["g1", "g2", "g1"],
            "num_nodes_alloc" => &[1i64, 2, 4],
            "num_cores_alloc" => &[16i64, 32, 64],
            "num_gpus_alloc" => &[0i64, 4, 8],
            "mem_alloc" => &[1000.0, 2000.0, 4000.0],
            "partition" => &["m100_usr_prod", "m100_usr_prod", "m100_all_serial"],
            "qos" => &["normal", "normal", "qos_lowprio"],
            "time_limit" => &[60.0, 120.0, 30.0],
            "run_time" => &[3600i64, 7200, 600],
            "job_state" => &["COMPLETED", "FAILED", "COMPLETED"],
            "shared" => &["0", "1", "0"],
            "threads_per_core" => &[1i64, 2, 1]
        )
        .unwrap();
        df.with_column(power).unwrap();
        df
    }

    #[test]
    fn test_table_from_dataframe() {
        let table = table_from_dataframe(&job_frame()).unwrap();
        assert_eq!(table.len(), 3);
        let first = &table.records()[0];
        assert_eq!(first.job_id, 11);
        assert_eq!(first.user_id, "1");
        assert_eq!(first.num_nodes_alloc, 1);
        assert_eq!(first.run_time, 3600.0);
        assert_eq!(first.power_samples, vec![100.0, 110.0]);
        assert!(table.records()[1].power_samples.is_empty());
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let df = job_frame().drop("qos").unwrap();
        let err = table_from_dataframe(&df).unwrap_err();
        assert!(matches!(err, JobPowerError::Schema(msg) if msg.contains("qos")));
    }

    #[test]
    fn test_job_id_falls_back_to_row_index() {
        let df = job_frame().drop("job_id").unwrap();
        let table = table_from_dataframe(&df).unwrap();
        let ids: Vec<i64> = table.iter().map(|r| r.job_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_negative_count_rejected() {
        let mut df = job_frame();
        df.with_column(Series::new("num_nodes_alloc".into(), &[1i64, -2, 4]))
            .unwrap();
        assert!(matches!(table_from_dataframe(&df), Err(JobPowerError::Schema(_))));
    }

    #[test]
    fn test_parse_power_text() {
        assert_eq!(parse_power_text("[1.5, 2.0, 3]").unwrap(), vec![1.5, 2.0, 3.0]);
        assert_eq!(parse_power_text("4;5").unwrap(), vec![4.0, 5.0]);
        assert!(parse_power_text("[]").unwrap().is_empty());
        assert!(parse_power_text("[1.0, abc]").is_err());
    }

    #[test]
    fn test_missing_file_is_data_access_error() {
        let err = JobLoader::new().load("/nonexistent/jobs.parquet").unwrap_err();
        assert!(matches!(err, JobPowerError::DataAccess(_)));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(FileFormat::from_path(Path::new("a.PARQUET")), FileFormat::Parquet);
        assert_eq!(FileFormat::from_path(Path::new("a.tsv")), FileFormat::Csv { delimiter: b'\t' });
        assert_eq!(FileFormat::from_path(Path::new("a.jsonl")), FileFormat::NdJson);
    }
}
