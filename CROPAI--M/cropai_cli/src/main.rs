use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local, Utc};
use clap::{Args, Parser, Subcommand};
use cropai_yield::{
    AppConfig, ArtifactStore, DataPreparer, SoilClimate, TrainingReport, YieldError,
    YieldPipeline, YieldPredictor, YieldTelemetry,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use uuid::Uuid;

const DEFAULT_CONFIG: &str = "cropai.toml";
const DEFAULT_MANIFEST: &str = "logs/runs/index.jsonl";
const DEFAULT_LOG_DIR: &str = "logs";

/// Reference field used to smoke-test a freshly trained model.
const EXAMPLE_INPUTS: SoilClimate =
    SoilClimate::from_vector([40.0, 25.0, 120.0, 26.0, 65.0, 6.8, 580.0]);

#[derive(Parser, Debug)]
#[command(name = "cropai", version, about = "Crop yield training and prediction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trains a model on the configured dataset and persists it.
    Train(TrainArgs),
    /// Predicts yield for one field.
    Predict(PredictArgs),
    /// Writes the labelled dataset to CSV.
    Prepare {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        #[arg(long)]
        data: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Lists most recent training runs.
    Runs {
        /// Number of entries to display.
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    #[arg(long)]
    data: Option<PathBuf>,
    #[arg(long)]
    artifact: Option<PathBuf>,
    #[arg(long)]
    iterations: Option<usize>,
    #[arg(long, default_value = DEFAULT_MANIFEST)]
    manifest: PathBuf,
    #[arg(long, default_value = DEFAULT_LOG_DIR)]
    log_dir: PathBuf,
}

#[derive(Args, Debug)]
struct PredictArgs {
    #[arg(long = "n")]
    nitrogen: f64,
    #[arg(long = "p")]
    phosphorus: f64,
    #[arg(long = "k")]
    potassium: f64,
    #[arg(long)]
    temperature: f64,
    #[arg(long)]
    humidity: f64,
    #[arg(long)]
    ph: f64,
    #[arg(long)]
    rainfall: f64,
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    #[arg(long)]
    artifact: Option<PathBuf>,
    /// Print the result as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct TrainingRunEntry {
    job_id: String,
    submitted_at: DateTime<Utc>,
    data: PathBuf,
    artifact: PathBuf,
    log_path: PathBuf,
    status: String,
    #[serde(default)]
    run_id: Option<Uuid>,
    #[serde(default)]
    r2: Option<f64>,
    #[serde(default)]
    rmse: Option<f64>,
}

impl TrainingRunEntry {
    fn new(config: &AppConfig, log_path: PathBuf) -> Self {
        Self {
            job_id: format!("run-{}", Uuid::new_v4()),
            submitted_at: Utc::now(),
            data: config.data.path.clone(),
            artifact: config.model.artifact.clone(),
            log_path,
            status: "pending".into(),
            run_id: None,
            r2: None,
            rmse: None,
        }
    }

    fn record(&mut self, report: &TrainingReport) {
        self.status = "completed".into();
        self.run_id = Some(report.run_id);
        self.r2 = Some(report.r2);
        self.rmse = Some(report.rmse);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let kind = err
                .chain()
                .find_map(|cause| cause.downcast_ref::<YieldError>())
                .map_or("internal", YieldError::kind);
            eprintln!("error[{kind}]: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Train(args) => handle_train(args),
        Commands::Predict(args) => handle_predict(&args),
        Commands::Prepare { config, data, out } => {
            let mut config = load_config(&config)?;
            if let Some(data) = data {
                config.data.path = data;
            }
            let dataset = DataPreparer::new(config.label.clone())
                .load(&config.data.path)
                .with_context(|| format!("preparing {}", config.data.path.display()))?;
            dataset
                .write_csv(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("wrote {} labelled samples to {}", dataset.len(), out.display());
            Ok(())
        }
        Commands::Runs { limit, manifest } => {
            let entries = read_manifest(&manifest)?;
            for entry in entries.into_iter().rev().take(limit) {
                println!(
                    "{} | {} | {} | r2={} | {}",
                    entry.job_id,
                    entry.status,
                    entry.submitted_at,
                    entry.r2.map_or_else(|| "-".into(), |r2| format!("{r2:.3}")),
                    entry.artifact.display()
                );
            }
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load(path).with_context(|| format!("loading config {}", path.display()))
}

fn telemetry_for(config: &AppConfig) -> Result<YieldTelemetry> {
    let mut builder = YieldTelemetry::builder("cropai").console(config.logging.console);
    if let Some(path) = config.logging.path.as_ref() {
        builder = builder.log_path(path);
    }
    builder.build()
}

fn handle_train(args: TrainArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(data) = args.data {
        config.data.path = data;
    }
    if let Some(artifact) = args.artifact {
        config.model.artifact = artifact;
    }
    if let Some(iterations) = args.iterations {
        config.search.iterations = iterations;
    }
    config.validate().context("validating overrides")?;

    let log_path = compute_log_path(&args.log_dir)?;
    let mut entry = TrainingRunEntry::new(&config, log_path);
    entry.status = "running".into();
    append_manifest(&args.manifest, &entry)?;
    log_run_event(
        &entry.log_path,
        LogLevel::Info,
        "training started",
        json!({
            "job_id": entry.job_id,
            "data": entry.data,
            "iterations": config.search.iterations,
        }),
    )?;

    let pipeline = YieldPipeline::from_config(&config).with_telemetry(telemetry_for(&config)?);
    match pipeline.run() {
        Ok(outcome) => {
            let report = outcome.report;
            entry.record(&report);
            update_entry(&args.manifest, &entry)?;
            log_run_event(
                &entry.log_path,
                LogLevel::Info,
                "training completed",
                json!({
                    "job_id": entry.job_id,
                    "run_id": report.run_id,
                    "r2": report.r2,
                    "rmse": report.rmse,
                }),
            )?;
            println!("{}", report.summary());
            println!("{}", report.accuracy_line());
            println!("best params: {}", serde_json::to_string(&report.best_params)?);

            let predictor = YieldPredictor::from_model(outcome.model, pipeline.store().clone());
            let result = predictor
                .predict_inputs(&EXAMPLE_INPUTS)
                .context("example prediction")?;
            println!(
                "example prediction: {:.0} kg/ha ({})",
                result.predicted_yield, result.confidence
            );
            println!("most important factor: {}", result.most_important_factor);
            for (i, line) in result.recommendations.iter().enumerate() {
                println!("  {}. {line}", i + 1);
            }
            Ok(())
        }
        Err(err) => {
            entry.status = "failed".into();
            update_entry(&args.manifest, &entry)?;
            log_run_event(
                &entry.log_path,
                LogLevel::Error,
                "training failed",
                json!({ "job_id": entry.job_id, "kind": err.kind(), "error": err.to_string() }),
            )?;
            Err(err).with_context(|| format!("training on {}", config.data.path.display()))
        }
    }
}

fn handle_predict(args: &PredictArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(artifact) = args.artifact.clone() {
        config.model.artifact = artifact;
    }
    let predictor = YieldPredictor::with_artifact(ArtifactStore::new(config.model.artifact));
    let result = predictor.predict(
        args.nitrogen,
        args.phosphorus,
        args.potassium,
        args.temperature,
        args.humidity,
        args.ph,
        args.rainfall,
    )?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    println!("Predicted yield: {:.0} kg/ha", result.predicted_yield);
    println!("Confidence: {}", result.confidence);
    println!("Most important factor: {}", result.most_important_factor);
    println!("Recommendations:");
    for (i, line) in result.recommendations.iter().enumerate() {
        println!("  {}. {line}", i + 1);
    }
    Ok(())
}

fn append_manifest(path: &Path, entry: &TrainingRunEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening manifest {}", path.display()))?;
    serde_json::to_writer(&mut file, entry)?;
    file.write_all(b"\n")?;
    Ok(())
}

fn read_manifest(path: &Path) -> Result<Vec<TrainingRunEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: TrainingRunEntry = serde_json::from_str(&line)
            .with_context(|| format!("parsing manifest {}", path.display()))?;
        entries.push(entry);
    }
    Ok(entries)
}

fn update_entry(path: &Path, updated: &TrainingRunEntry) -> Result<()> {
    let mut entries = read_manifest(path)?;
    let Some(slot) = entries.iter_mut().find(|e| e.job_id == updated.job_id) else {
        return append_manifest(path, updated);
    };
    *slot = updated.clone();
    let mut file = File::create(path)?;
    for entry in entries {
        serde_json::to_writer(&mut file, &entry)?;
        file.write_all(b"\n")?;
    }
    Ok(())
}

fn compute_log_path(base: &Path) -> Result<PathBuf> {
    let now = Local::now();
    let dir = base
        .join(format!("{:04}", now.year()))
        .join(format!("{:02}", now.month()))
        .join(format!("{:02}", now.day()));
    fs::create_dir_all(&dir)?;
    Ok(dir.join(format!(
        "train-{}.log.jsonl",
        Utc::now().format("%Y%m%d-%H%M%S")
    )))
}

fn log_run_event(path: &Path, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
    let logger = JsonLogger::new(path)?;
    logger.log(&LogRecord::new("cropai", level, message).with_metadata(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn manifest_append_update_and_read() {
        let dir = tempdir().unwrap();
        let manifest = dir.path().join("runs/index.jsonl");
        let config = AppConfig::default();
        let mut first = TrainingRunEntry::new(&config, dir.path().join("a.log.jsonl"));
        let second = TrainingRunEntry::new(&config, dir.path().join("b.log.jsonl"));
        append_manifest(&manifest, &first).unwrap();
        append_manifest(&manifest, &second).unwrap();

        first.status = "failed".into();
        update_entry(&manifest, &first).unwrap();
        let entries = read_manifest(&manifest).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, "failed");
        assert_eq!(entries[1].status, "pending");
        assert_eq!(entries[1].job_id, second.job_id);
    }

    #[test]
    fn missing_manifest_reads_empty() {
        let dir = tempdir().unwrap();
        assert!(read_manifest(&dir.path().join("none.jsonl")).unwrap().is_empty());
    }

    #[test]
    fn run_events_are_json_lines() {
        let dir = tempdir().unwrap();
        let log = compute_log_path(dir.path()).unwrap();
        log_run_event(&log, LogLevel::Info, "training started", json!({ "job_id": "run-1" }))
            .unwrap();
        let line = fs::read_to_string(&log).unwrap();
        let record: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(record["module"], "cropai");
        assert_eq!(record["metadata"]["job_id"], "run-1");
    }

    #[test]
    fn predict_flags_parse() {
        let cli = Cli::try_parse_from([
            "cropai", "predict", "--n", "40", "--p", "25", "--k", "120", "--temperature", "26",
            "--humidity", "65", "--ph", "6.8", "--rainfall", "580", "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Predict(args) => {
                assert!((args.ph - 6.8).abs() < f64::EPSILON);
                assert!(args.json);
                assert!(args.artifact.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
