//! Jobpower CLI Module
//!
//! Command-line interface for running the power pipeline and inspecting job files.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::clustering::ClusterAssignment;
use crate::config::{PipelineConfig, ZeroNodePolicy};
use crate::data::{table_from_dataframe, JobLoader};
use crate::evaluation::{EvaluationReport, ModelOutcome, TaskMetrics};
use crate::pipeline::{Pipeline, PipelineOutcome};
use crate::training::Task;
use crate::power::{compute_average_power, compute_normalized_power, filter_empty_power_series, PowerSummary};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "jobpower")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Power tiers and model benchmarks for HPC job traces")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline on a job file
    Run {
        /// Input data file (Parquet, CSV, or JSON)
        #[arg(short, long)]
        data: PathBuf,

        /// JSON pipeline configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Random seed for clustering, subsampling, splitting and models
        #[arg(long)]
        seed: Option<u64>,

        /// Fraction of rows held out for testing
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Fraction of rows kept before splitting
        #[arg(long)]
        subsample: Option<f64>,

        /// Smallest K tried by the elbow search
        #[arg(long)]
        k_min: Option<usize>,

        /// Largest K tried by the elbow search
        #[arg(long)]
        k_max: Option<usize>,

        /// Comma-separated feature names, replacing correlation selection
        #[arg(long, value_delimiter = ',')]
        features: Option<Vec<String>>,

        /// Write the full outcome as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show job file information
    Info {
        /// Input data file
        #[arg(short, long)]
        data: PathBuf,
    },
}

/// Command-line overrides applied on top of the config file
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub seed: Option<u64>,
    pub test_fraction: Option<f64>,
    pub subsample: Option<f64>,
    pub k_min: Option<usize>,
    pub k_max: Option<usize>,
    pub features: Option<Vec<String>>,
}

impl RunOverrides {
    pub fn apply(self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(seed) = self.seed {
            config.random_seed = seed;
        }
        if let Some(fraction) = self.test_fraction {
            config.test_fraction = fraction;
        }
        if let Some(ratio) = self.subsample {
            config.subsampling_ratio = ratio;
        }
        if let Some(k) = self.k_min {
            config.k_min = k;
        }
        if let Some(k) = self.k_max {
            config.k_max = k;
        }
        if let Some(features) = self.features {
            config.feature_set = Some(features);
        }
        config
    }
}

/// Build the effective configuration: defaults, then file, then flags
pub fn resolve_config(config_path: Option<&Path>, overrides: RunOverrides) -> anyhow::Result<PipelineConfig> {
    let base = match config_path {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    let config = overrides.apply(base);
    config.validate()?;
    Ok(config)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(
    data_path: &Path,
    config_path: Option<&Path>,
    overrides: RunOverrides,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let config = resolve_config(config_path, overrides)?;

    println!();
    line_box_top();
    line_box(&format!("{}", "jobpower".white().bold()));
    line_box(&kv("data  ", &data_path.display().to_string()));
    line_box(&kv("seed  ", &config.random_seed.to_string()));
    line_box(&kv("k     ", &format!("{}..={}", config.k_min, config.k_max)));
    line_box(&kv("split ", &format!("{:.0}% test", config.test_fraction * 100.0)));
    line_box_bottom();

    section("Pipeline");

    step_run("Loading jobs");
    let start = Instant::now();
    let table = JobLoader::new().load(data_path)?;
    step_done(&format!("{} jobs in {:.2?}", table.len(), start.elapsed()));

    step_run("Running stages");
    let start = Instant::now();
    let outcome = Pipeline::new(config)?.run(table)?;
    step_done(&format!("{:.2?}", start.elapsed()));

    print_power(&outcome);
    print_clusters(&outcome.kmeans);
    print_clusters(&outcome.dbscan);

    section("Features");
    println!("  {}", outcome.selected_features.join(", "));

    print_report("Regression", &outcome.regression);
    print_report("Classification", &outcome.classification);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&outcome)?;
        std::fs::write(path, json)?;
        println!();
        println!("  {} {}", ok("saved"), path.display());
    }

    println!();
    Ok(())
}

fn print_power(outcome: &PipelineOutcome) {
    section("Power");
    let filter = &outcome.filter;
    println!("  {:<12} {}", muted("Jobs"), filter.rows_before);
    if filter.removed > 0 {
        println!("  {:<12} {}", muted("Empty"), filter.removed.to_string().yellow());
    }
    let p = &outcome.power;
    println!("  {:<12} {:.2} W", muted("Min"), p.min);
    println!("  {:<12} {:.2} W", muted("Max"), p.max);
    println!("  {:<12} {:.2} W {}", muted("Mean"), p.mean, dim(&format!("± {:.2}", p.std)));
}

fn print_clusters(assignment: &ClusterAssignment) {
    section(&format!("Clusters ({})", assignment.method));
    println!("  {:<12} {}", muted("K"), assignment.chosen_k);
    if let Some(inertia) = assignment.inertia {
        println!("  {:<12} {:.4}", muted("Inertia"), inertia);
    }
    if assignment.n_noise > 0 {
        println!("  {:<12} {}", muted("Noise"), assignment.n_noise);
    }
    for (label, size) in assignment.sizes() {
        println!("  {:<12} {}", muted(&format!("#{}", label)), size);
    }
}

fn print_report(title: &str, report: &EvaluationReport) {
    section(&format!("{} · {}", title, report.target));
    let metric_name = report.primary_metric_name();
    let second = match report.task {
        Task::Regression => "MAE",
        Task::Classification => "Accuracy",
    };

    println!("  {:<24} {:>10} {:>10} {:>10}", muted("Model"), muted(metric_name), muted(second), muted("Time"));
    println!("  {}", dim(&"─".repeat(58)));

    for r in &report.results {
        match &r.outcome {
            ModelOutcome::Scored(TaskMetrics::Regression(m)) => {
                println!("  {:<24} {:>10.4} {:>10.4} {:>9.3}s", r.model, m.r2, m.mae, r.fit_time_secs);
            }
            ModelOutcome::Scored(TaskMetrics::Classification(m)) => {
                println!(
                    "  {:<24} {:>10.4} {:>10.4} {:>9.3}s",
                    r.model,
                    m.macro_f1,
                    m.accuracy,
                    r.fit_time_secs
                );
            }
            ModelOutcome::Failed(e) => {
                println!("  {:<24} {}", r.model, format!("err: {} ({})", e.reason, e.stage).red());
            }
        }
    }

    println!("  {}", dim(&"─".repeat(58)));

    if let Some(best) = report.best() {
        if let Some(m) = best.metrics() {
            println!(
                "  {} {} {} {:.4}",
                ok("best"),
                best.model.white().bold(),
                muted(&format!("{}:", metric_name)),
                m.primary_score()
            );
        }
    }
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let loader = JobLoader::new();
    let (info, df) = loader.read_with_info(data_path)?;

    println!("  {:<12} {}", muted("File"), info.path.display());
    println!("  {:<12} {:?}", muted("Format"), info.format);
    println!("  {:<12} {}", muted("Rows"), info.n_rows);
    println!("  {:<12} {}", muted("Columns"), info.columns.len());
    println!("  {:<12} {:.2} MB", muted("Size"), info.file_size as f64 / 1024.0 / 1024.0);
    println!();

    for col in &info.columns {
        println!("  {} {}", dim("·"), col);
    }

    let table = table_from_dataframe(&df)?;
    let (table, filter) = filter_empty_power_series(table)?;
    let table = compute_average_power(table)?;
    let table = compute_normalized_power(table, ZeroNodePolicy::Exclude)?;

    section("Power per node");
    println!("  {:<12} {}", muted("Empty"), filter.removed);
    match PowerSummary::from_table(&table) {
        Ok(p) => {
            println!("  {:<12} {}", muted("Jobs"), p.count);
            println!("  {:<12} {:.2} W", muted("Min"), p.min);
            println!("  {:<12} {:.2} W", muted("Max"), p.max);
            println!("  {:<12} {:.2} W", muted("Mean"), p.mean);
            println!("  {:<12} {:.2} W", muted("Std"), p.std);
        }
        Err(e) => println!("  {}", format!("no usable jobs: {}", e).yellow()),
    }

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_feature_list() {
        let cli = Cli::parse_from([
            "jobpower", "run", "--data", "jobs.parquet", "--features", "qos,run_time", "--k-max", "4",
        ]);
        match cli.command {
            Commands::Run { features, k_max, seed, .. } => {
                assert_eq!(features, Some(vec!["qos".to_string(), "run_time".to_string()]));
                assert_eq!(k_max, Some(4));
                assert_eq!(seed, None);
            }
            Commands::Info { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"random_seed": 7, "k_max": 5, "test_fraction": 0.3}"#).unwrap();

        let overrides = RunOverrides {
            seed: Some(11),
            ..Default::default()
        };
        let config = resolve_config(Some(&path), overrides).unwrap();
        assert_eq!(config.random_seed, 11);
        assert_eq!(config.k_max, 5);
        assert_eq!(config.test_fraction, 0.3);
        assert_eq!(config.k_min, 1);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let overrides = RunOverrides {
            test_fraction: Some(1.5),
            ..Default::default()
        };
        assert!(resolve_config(None, overrides).is_err());
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[1mbold\x1b[0m"), "bold");
    }
}
