//! Integration tests for job file loading

use jobpower::data::{FileFormat, JobLoader, POWER_COLUMN};
use jobpower::prelude::*;
use polars::prelude::*;
use std::fs::File;
use std::io::Write;

fn job_frame() -> DataFrame {
    let power = Series::new(
        POWER_COLUMN.into(),
        &[
            Series::new("".into(), &[100.0, 110.0]),
            Series::new("".into(), &[400.0, 420.0, 380.0]),
            Series::new("".into(), Vec::<f64>::new()),
            Series::new("".into(), &[90.0]),
        ],
    );
    let mut df = df!(
        "job_id" => &[1i64, 2, 3, 4],
        "user_id" => &[10i64, 11, 10, 12],
        "group_id" => &["g1", "g2", "g1", "g3"],
        "num_nodes_alloc" => &[1i64, 2, 1, 1],
        "num_cores_alloc" => &[16i64, 32, 16, 8],
        "num_gpus_alloc" => &[0i64, 4, 0, 0],
        "mem_alloc" => &[1000.0, 2000.0, 1000.0, 500.0],
        "partition" => &["m100_usr_prod", "m100_usr_prod", "m100_all_serial", "m100_usr_prod"],
        "qos" => &["normal", "normal", "qos_lowprio", "normal"],
        "time_limit" => &[60.0, 120.0, 30.0, 10.0],
        "run_time" => &[3600i64, 7200, 600, 60],
        "job_state" => &["COMPLETED", "FAILED", "COMPLETED", "TIMEOUT"],
        "shared" => &["0", "1", "0", "0"],
        "threads_per_core" => &[1i64, 2, 1, 1]
    )
    .unwrap();
    df.with_column(power).unwrap();
    df
}

#[test]
fn test_load_parquet() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.parquet");
    let mut df = job_frame();
    ParquetWriter::new(File::create(&path).unwrap()).finish(&mut df).unwrap();

    let table = JobLoader::new().load(&path).unwrap();
    assert_eq!(table.len(), 4);

    let second = &table.records()[1];
    assert_eq!(second.job_id, 2);
    assert_eq!(second.user_id, "11");
    assert_eq!(second.num_nodes_alloc, 2);
    assert_eq!(second.power_samples, vec![400.0, 420.0, 380.0]);
    assert!(table.records()[2].power_samples.is_empty());

    let (table, report) = filter_empty_power_series(table).unwrap();
    assert_eq!(report.removed_job_ids, vec![3]);
    let table = compute_normalized_power(compute_average_power(table).unwrap(), ZeroNodePolicy::Error).unwrap();
    assert_eq!(table.norm_average_power_consumption().unwrap(), &[105.0, 200.0, 90.0]);
}

#[test]
fn test_load_csv_with_text_power_lists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.csv");
    let mut file = File::create(&path).unwrap();
    writeln!(
        file,
        "job_id,user_id,group_id,num_nodes_alloc,num_cores_alloc,num_gpus_alloc,mem_alloc,partition,qos,\
         time_limit,run_time,job_state,shared,threads_per_core,node_power_consumption"
    )
    .unwrap();
    writeln!(file, "7,3,g1,2,32,0,1024,prod,normal,60,300,COMPLETED,0,1,\"[200, 220]\"").unwrap();
    writeln!(file, "8,4,g2,1,16,0,512,prod,low,30,120,FAILED,1,2,\"[]\"").unwrap();
    drop(file);

    let loader = JobLoader::new();
    let table = loader.load(&path).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.records()[0].power_samples, vec![200.0, 220.0]);
    assert!(table.records()[1].power_samples.is_empty());
    assert_eq!(table.records()[1].qos, "low");

    let info = loader.file_info(&path).unwrap();
    assert_eq!(info.n_rows, 2);
    assert!(matches!(info.format, FileFormat::Csv { .. }));
    assert!(info.columns.iter().any(|c| c == POWER_COLUMN));
}

#[test]
fn test_missing_column_is_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.parquet");
    let mut df = job_frame().drop("qos").unwrap();
    ParquetWriter::new(File::create(&path).unwrap()).finish(&mut df).unwrap();

    let err = JobLoader::new().load(&path).unwrap_err();
    assert!(matches!(err, JobPowerError::Schema(ref msg) if msg.contains("qos")));
}

#[test]
fn test_missing_file_is_data_access_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = JobLoader::new().load(dir.path().join("absent.parquet")).unwrap_err();
    assert!(matches!(err, JobPowerError::DataAccess(_)));
}

#[test]
fn test_pipeline_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.parquet");

    let n = 30usize;
    let power: Vec<Series> = (0..n)
        .map(|i| {
            let base = if i % 2 == 0 { 120.0 } else { 480.0 };
            let level = base + (i % 3) as f64;
            Series::new("".into(), &[level, level + 4.0, level - 4.0])
        })
        .collect();
    let ids: Vec<i64> = (0..n as i64).collect();
    let ones: Vec<i64> = vec![1; n];
    let zeros: Vec<i64> = vec![0; n];
    let mem: Vec<f64> = (0..n).map(|i| 100.0 * (1 + i % 5) as f64).collect();
    let run_time: Vec<i64> = (0..n as i64).map(|i| if i % 2 == 0 { 100 + i } else { 900 + i }).collect();
    let qos: Vec<&str> = (0..n).map(|i| if i % 2 == 0 { "low" } else { "high" }).collect();
    let text: Vec<&str> = vec!["x"; n];

    let mut df = df!(
        "job_id" => &ids,
        "user_id" => &ids,
        "group_id" => &text,
        "num_nodes_alloc" => &ones,
        "num_cores_alloc" => &ones,
        "num_gpus_alloc" => &zeros,
        "mem_alloc" => &mem,
        "partition" => &text,
        "qos" => &qos,
        "time_limit" => &mem,
        "run_time" => &run_time,
        "job_state" => &text,
        "shared" => &text,
        "threads_per_core" => &ones
    )
    .unwrap();
    df.with_column(Series::new(POWER_COLUMN.into(), &power)).unwrap();
    ParquetWriter::new(File::create(&path).unwrap()).finish(&mut df).unwrap();

    let config = PipelineConfig::new().with_k_range(1, 5);
    let outcome = Pipeline::new(config).unwrap().run_file(&path).unwrap();
    assert_eq!(outcome.kmeans.chosen_k, 2);
    assert_eq!(outcome.test_indices.len(), 6);
    assert!(outcome.selected_features.contains(&"qos".to_string()));
}

#[test]
fn test_fractional_node_count_is_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.parquet");
    let mut df = job_frame();
    df.with_column(Series::new("num_nodes_alloc".into(), &[1.9, 2.0, 1.0, 1.0])).unwrap();
    ParquetWriter::new(File::create(&path).unwrap()).finish(&mut df).unwrap();

    let err = JobLoader::new().load(&path).unwrap_err();
    match err {
        JobPowerError::Schema(msg) => {
            assert!(msg.contains("num_nodes_alloc"));
            assert!(msg.contains("row 0"));
        }
        other => panic!("expected a schema error, got {:?}", other),
    }
}

#[test]
fn test_whole_float_node_count_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.parquet");
    let mut df = job_frame();
    df.with_column(Series::new("num_nodes_alloc".into(), &[1.0, 2.0, 1.0, 4.0])).unwrap();
    ParquetWriter::new(File::create(&path).unwrap()).finish(&mut df).unwrap();

    let table = JobLoader::new().load(&path).unwrap();
    let nodes: Vec<u32> = table.iter().map(|r| r.num_nodes_alloc).collect();
    assert_eq!(nodes, vec![1, 2, 1, 4]);
}

#[test]
fn test_load_ndjson_with_list_power() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.ndjson");
    let mut file = File::create(&path).unwrap();
    for (id, nodes, qos, power) in [(5, 1, "normal", "[100.0, 120.0]"), (6, 2, "high", "[300.0, 310.0, 320.0]")] {
        writeln!(
            file,
            r#"{{"job_id": {id}, "user_id": "u{id}", "group_id": "g1", "num_nodes_alloc": {nodes}, "num_cores_alloc": 16, "num_gpus_alloc": 0, "mem_alloc": 1024.0, "partition": "prod", "qos": "{qos}", "time_limit": 60.0, "run_time": 120.0, "job_state": "COMPLETED", "shared": "0", "threads_per_core": 1, "node_power_consumption": {power}}}"#
        )
        .unwrap();
    }
    drop(file);

    let loader = JobLoader::new();
    assert_eq!(FileFormat::from_path(&path), FileFormat::NdJson);
    let table = loader.load(&path).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.records()[0].user_id, "u5");
    assert_eq!(table.records()[1].qos, "high");
    assert_eq!(table.records()[1].power_samples, vec![300.0, 310.0, 320.0]);

    let table = compute_normalized_power(compute_average_power(table).unwrap(), ZeroNodePolicy::Error).unwrap();
    assert_eq!(table.norm_average_power_consumption().unwrap(), &[110.0, 155.0]);
}

#[test]
fn test_load_columns_projects_requested_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.parquet");
    let mut df = job_frame();
    ParquetWriter::new(File::create(&path).unwrap()).finish(&mut df).unwrap();

    let projected = JobLoader::new()
        .load_columns(&path, &["job_id", POWER_COLUMN])
        .unwrap();
    assert_eq!(projected.height(), 4);
    let names: Vec<String> = projected.get_column_names().iter().map(|c| c.to_string()).collect();
    assert_eq!(names, vec!["job_id".to_string(), POWER_COLUMN.to_string()]);
    assert!(projected.column("qos").is_err());
}

#[test]
fn test_read_with_info_describes_the_loaded_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.parquet");
    let mut df = job_frame();
    ParquetWriter::new(File::create(&path).unwrap()).finish(&mut df).unwrap();

    let (info, frame) = JobLoader::new().read_with_info(&path).unwrap();
    assert_eq!(info.format, FileFormat::Parquet);
    assert_eq!(info.n_rows, frame.height());
    assert_eq!(info.columns.len(), frame.width());
    assert!(info.file_size > 0);

    let table = jobpower::data::table_from_dataframe(&frame).unwrap();
    assert_eq!(table.len(), info.n_rows);
}
