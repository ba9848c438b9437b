//! Integration tests for the end-to-end power pipeline

use jobpower::prelude::*;
use ndarray::{Array1, Array2};

// ============================================================================
// Fixtures
// ============================================================================

const NODES: [u32; 10] = [1, 1, 2, 2, 1, 4, 1, 2, 1, 1];
const AVERAGES: [f64; 10] = [100.0, 102.0, 300.0, 310.0, 98.0, 1200.0, 101.0, 295.0, 99.0, 103.0];
const NORMALIZED: [f64; 10] = [100.0, 102.0, 150.0, 155.0, 98.0, 300.0, 101.0, 147.5, 99.0, 103.0];

fn reference_jobs() -> JobTable {
    NODES
        .iter()
        .zip(AVERAGES.iter())
        .enumerate()
        .map(|(i, (&nodes, &avg))| {
            let mut r = JobRecord::new(i as i64, nodes, vec![avg - 1.0, avg + 1.0]);
            r.run_time = avg * 10.0 + (i % 3) as f64;
            r.num_cores_alloc = 16 * nodes;
            r.qos = if avg / nodes as f64 > 140.0 { "high".into() } else { "normal".into() };
            r.partition = "m100_usr_prod".into();
            r
        })
        .collect()
}

fn k2_config() -> PipelineConfig {
    PipelineConfig::new().with_k_range(2, 2).with_random_seed(42)
}

struct Broken;

impl Estimator for Broken {
    fn name(&self) -> &str {
        "Broken"
    }

    fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        Err(JobPowerError::Training("solver diverged".into()))
    }

    fn predict(&self, _x: &Array2<f64>) -> Result<Array1<f64>> {
        Err(JobPowerError::ModelNotFitted)
    }
}

// ============================================================================
// Power derivation
// ============================================================================

#[test]
fn test_reference_normalized_power() {
    let table = compute_average_power(reference_jobs()).unwrap();
    assert_eq!(table.average_power_consumption().unwrap(), &AVERAGES);

    let table = compute_normalized_power(table, ZeroNodePolicy::Error).unwrap();
    assert_eq!(table.norm_average_power_consumption().unwrap(), &NORMALIZED);
}

#[test]
fn test_k2_isolates_the_outlier() {
    let pipeline = Pipeline::new(k2_config()).unwrap();
    let (kmeans, _) = pipeline.cluster(&NORMALIZED).unwrap();

    assert_eq!(kmeans.chosen_k, 2);
    let outlier = kmeans.labels[5];
    for (i, &label) in kmeans.labels.iter().enumerate() {
        if i != 5 {
            assert_ne!(label, outlier, "job {} shares the outlier's tier", i);
        }
    }
    assert_eq!(kmeans.sizes().get(&outlier), Some(&1));
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn test_end_to_end_reference_scenario() {
    let outcome = Pipeline::new(k2_config()).unwrap().run(reference_jobs()).unwrap();

    assert_eq!(outcome.filter.removed, 0);
    assert_eq!(outcome.power.count, 10);
    assert_eq!(outcome.power.max, 300.0);
    assert_eq!(outcome.table.norm_average_power_consumption().unwrap(), &NORMALIZED);

    let clusters = outcome.table.cluster().unwrap();
    assert_eq!(clusters, outcome.kmeans.labels.as_slice());

    assert!(outcome.selected_features.contains(&"run_time".to_string()));
    assert!(!outcome.selected_features.contains(&"partition".to_string()));

    assert_eq!(outcome.test_indices.len(), 2);
    assert_eq!(outcome.train_indices.len(), 8);
    assert_eq!(outcome.regression.results.len(), 6);
    assert_eq!(outcome.classification.results.len(), 5);
    assert_eq!(outcome.regression.n_test, 2);
}

#[test]
fn test_failing_model_keeps_other_rows() {
    let mut regressors = regression_roster(42);
    regressors.insert(0, Box::new(Broken));
    let names: Vec<String> = regressors.iter().map(|m| m.name().to_string()).collect();

    let outcome = Pipeline::new(k2_config())
        .unwrap()
        .run_with_rosters(reference_jobs(), regressors, classification_roster(42))
        .unwrap();

    let report = &outcome.regression;
    let rows: Vec<&str> = report.results.iter().map(|r| r.model.as_str()).collect();
    assert_eq!(rows, names.iter().map(String::as_str).collect::<Vec<_>>());

    let failed = report.get("Broken").unwrap().error().unwrap();
    assert_eq!(failed.stage, FitStage::Fit);
    assert!(failed.reason.contains("solver diverged"));
    assert_eq!(report.failures().count(), 1);
    assert!(report.best().is_some());
}

#[test]
fn test_same_seed_same_outcome() {
    let a = Pipeline::new(k2_config()).unwrap().run(reference_jobs()).unwrap();
    let b = Pipeline::new(k2_config()).unwrap().run(reference_jobs()).unwrap();
    assert_eq!(a.test_indices, b.test_indices);
    assert_eq!(a.kmeans.labels, b.kmeans.labels);
    assert_eq!(a.selected_features, b.selected_features);
}

#[test]
fn test_empty_series_dropped_before_derivation() {
    let mut records = reference_jobs().records().to_vec();
    records.push(JobRecord::new(99, 2, Vec::new()));
    let outcome = Pipeline::new(k2_config()).unwrap().run(JobTable::new(records)).unwrap();

    assert_eq!(outcome.filter.rows_before, 11);
    assert_eq!(outcome.filter.removed_job_ids, vec![99]);
    assert_eq!(outcome.table.len(), 10);
}

#[test]
fn test_zero_nodes_excluded_on_request() {
    let mut records = reference_jobs().records().to_vec();
    records.push(JobRecord::new(77, 0, vec![50.0]));

    let strict = Pipeline::new(k2_config()).unwrap().run(JobTable::new(records.clone()));
    assert!(matches!(strict, Err(JobPowerError::DivisionByZero { job_id: 77 })));

    let config = k2_config().with_zero_node_policy(ZeroNodePolicy::Exclude);
    let outcome = Pipeline::new(config).unwrap().run(JobTable::new(records)).unwrap();
    assert_eq!(outcome.table.len(), 10);
    assert!(outcome.table.iter().all(|r| r.job_id != 77));
}

#[test]
fn test_subsampling_keeps_leading_rows() {
    let config = k2_config().with_subsampling_ratio(0.5).with_test_fraction(0.4);
    let outcome = Pipeline::new(config).unwrap().run(reference_jobs()).unwrap();

    let ids: Vec<i64> = outcome.table.iter().map(|r| r.job_id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    assert_eq!(outcome.test_indices.len(), 2);
}

#[test]
fn test_outcome_serializes_to_json() {
    let outcome = Pipeline::new(k2_config()).unwrap().run(reference_jobs()).unwrap();
    let json = serde_json::to_value(&outcome).unwrap();
    assert!(json.get("regression").is_some());
    assert!(json.get("selected_features").is_some());
    assert!(json.get("table").is_none());
}

// ============================================================================
// DBSCAN tiers as the classification target
// ============================================================================

fn dense_tiers_with_outliers() -> JobTable {
    (0..36)
        .map(|i| {
            let power = match i % 3 {
                0 => 100.0 + (i % 4) as f64 * 0.5,
                1 => 400.0 + (i % 4) as f64 * 0.5,
                _ => 700.0 + i as f64 * 50.0,
            };
            let mut r = JobRecord::new(i as i64, 1, vec![power, power]);
            r.run_time = power * 2.0;
            r.qos = if i % 3 == 2 { "burst".into() } else { "normal".into() };
            r
        })
        .collect()
}

#[test]
fn test_dbscan_labels_drive_classification() {
    let config = PipelineConfig::new()
        .with_cluster_method(ClusterMethod::Dbscan)
        .with_dbscan(5.0, 3)
        .with_test_fraction(0.5);
    let outcome = Pipeline::new(config).unwrap().run(dense_tiers_with_outliers()).unwrap();

    assert_eq!(outcome.dbscan.chosen_k, 2);
    assert_eq!(outcome.dbscan.n_noise, 12);

    let clusters = outcome.table.cluster().unwrap();
    assert_eq!(clusters, outcome.dbscan.labels.as_slice());
    assert_eq!(clusters.iter().filter(|&&c| c == -1).count(), 12);
    assert_eq!(clusters[0], 0);
    assert_eq!(clusters[1], 1);

    let report = &outcome.classification;
    assert_eq!(report.results.len(), 5);
    let tree = report.get("Decision Tree").unwrap();
    assert!(!tree.is_failed());

    let noise_in_test = outcome
        .test_indices
        .iter()
        .filter(|&&i| clusters[i] == -1)
        .count();
    for result in report.results.iter().filter(|r| !r.is_failed()) {
        let Some(TaskMetrics::Classification(m)) = result.metrics() else {
            panic!("{} has no classification metrics", result.model);
        };
        let noise = m.per_class.iter().find(|c| c.label == -1);
        if noise_in_test > 0 {
            assert_eq!(noise.map(|c| c.support), Some(noise_in_test), "{}", result.model);
        }
    }
}
