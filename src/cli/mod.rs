//! Census AutoML CLI module
//!
//! Command-line interface for the transformation, training and prediction
//! pipelines.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::artifacts::save_object;
use crate::config::{PathsConfig, PipelineConfig, SearchConfig};
use crate::context::RunContext;
use crate::error::Result;
use crate::inference::{CensusRecord, PredictionResponse, Predictor};
use crate::registry::{save_run_params, LocalRegistry, ModelRegistry, RegisteredModel, RunParams};
use crate::training::{ModelTrainer, TrainingOutcome};
use crate::transformation::DataTransformation;

/// Run name recorded for each training pipeline execution
pub const TRAINING_RUN_NAME: &str = "training_pipeline";
/// Registered name of the trained model
pub const MODEL_NAME: &str = "training_model";
/// Metric key logged for the held-out ROC-AUC
pub const METRIC_KEY: &str = "roc_auc_score";

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    println!("  {} {}...", accent("›"), msg);
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "census-automl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Census income classifier: feature pipeline, model search and prediction")]
#[command(long_about = None)]
pub struct Cli {
    /// JSON configuration file; defaults apply to anything it leaves out
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clean and encode the raw train/test tables into the feature store
    Transform,

    /// Search for the best booster, evaluate it and register it
    Train {
        /// Number of search trials (overrides the configuration)
        #[arg(short, long)]
        n_trials: Option<usize>,

        /// Also write the model artifact to the configured model path
        #[arg(long)]
        save_model: bool,

        /// Write the study summary (every trial) to this JSON file
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Predict one record and print the JSON response
    Predict {
        /// Record as inline JSON, or a path to a JSON file
        #[arg(short, long)]
        record: String,
    },

    /// Transform, then train
    Run {
        /// Number of search trials (overrides the configuration)
        #[arg(short, long)]
        n_trials: Option<usize>,

        /// Also write the model artifact to the configured model path
        #[arg(long)]
        save_model: bool,
    },
}

impl Cli {
    /// Configuration from `--config`, or defaults
    pub fn load_config(&self) -> Result<PipelineConfig> {
        match &self.config {
            Some(path) => PipelineConfig::from_file(path),
            None => Ok(PipelineConfig::default()),
        }
    }
}

// ─── Pipelines ─────────────────────────────────────────────────────────────────

/// What one training pipeline execution produced
#[derive(Debug)]
pub struct TrainingReport {
    pub outcome: TrainingOutcome,
    pub registered: RegisteredModel,
    pub run_params_path: PathBuf,
}

/// Train, then log params and metric, register the model and write run params
pub fn train_and_register(
    paths: &PathsConfig,
    search: &SearchConfig,
    registry: &mut dyn ModelRegistry,
    save_model: bool,
) -> Result<TrainingReport> {
    let outcome =
        ModelTrainer::new(paths.clone(), search.clone()).initiate_model_training(save_model)?;

    let run_id = registry.start_run(TRAINING_RUN_NAME)?;
    registry.log_params(&run_id, &outcome.best_params)?;
    registry.log_metric(&run_id, METRIC_KEY, outcome.metric)?;
    let registered = registry.register(&run_id, MODEL_NAME, &outcome.best_model)?;
    let run_params_path = save_run_params(&paths.run_config_dir, &RunParams::from(&registered))?;

    Ok(TrainingReport {
        outcome,
        registered,
        run_params_path,
    })
}

/// Parse a record given inline or as a file path
pub fn parse_record(arg: &str) -> Result<CensusRecord> {
    let path = Path::new(arg);
    let json = if !arg.trim_start().starts_with('{') && path.is_file() {
        std::fs::read_to_string(path)?
    } else {
        arg.to_string()
    };
    Ok(serde_json::from_str(&json)?)
}

/// Predict one record against the latest registered model.
///
/// Every failure, including a malformed record, becomes an error payload.
pub fn predict_record(paths: &PathsConfig, record_arg: &str) -> PredictionResponse {
    let result = parse_record(record_arg).and_then(|record| {
        let registry = LocalRegistry::open(&paths.registry_dir)?;
        Predictor::from_artifacts(&paths.preprocessor, &registry, &paths.run_config_dir)?
            .predict(&record)
    });
    PredictionResponse::from_result(result)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_transform(ctx: &RunContext) -> anyhow::Result<()> {
    section("Transform");
    let paths = &ctx.config().paths;

    step_run("Cleaning and encoding raw tables");
    let start = Instant::now();
    let artifacts = DataTransformation::new(paths.clone()).initiate()?;
    step_ok(&format!("done in {:.2?}", start.elapsed()));

    kv("Train features", &artifacts.train_path.display().to_string());
    kv("Test features", &artifacts.test_path.display().to_string());
    kv("Preprocessor", &artifacts.preprocessor_path.display().to_string());
    println!();
    Ok(())
}

pub fn cmd_train(
    ctx: &RunContext,
    n_trials: Option<usize>,
    save_model: bool,
    summary: Option<&Path>,
) -> anyhow::Result<()> {
    section("Train");
    let config = ctx.config();
    let mut search = config.search.clone();
    if let Some(n) = n_trials {
        search = search.with_n_trials(n);
    }
    search.validate()?;

    step_run(&format!(
        "Searching {} trials x {} folds",
        search.n_trials, search.n_folds
    ));
    let start = Instant::now();
    let mut registry = LocalRegistry::open(&config.paths.registry_dir)?;
    let report = train_and_register(&config.paths, &search, &mut registry, save_model)?;
    step_ok(&format!("done in {:.2?}", start.elapsed()));

    if let Some(path) = summary {
        save_object(path, &report.outcome.summary)?;
        step_ok(&format!("Study summary → {}", path.display()));
    }

    let outcome = &report.outcome;
    println!();
    kv("Booster", &outcome.best_model.booster_name().cyan().to_string());
    kv(
        "CV ROC-AUC",
        &format!("{:.4}", outcome.summary.best_value.unwrap_or(f64::NAN)),
    );
    kv("Test ROC-AUC", &format!("{:.4}", outcome.metric).bold().to_string());
    kv(
        "Trials",
        &format!(
            "{} complete, {} pruned, {} failed",
            outcome.summary.n_complete, outcome.summary.n_pruned, outcome.summary.n_failed
        ),
    );
    kv("Model URI", &report.registered.uri);
    kv("Run params", &report.run_params_path.display().to_string());
    if let Some(path) = &outcome.model_path {
        kv("Model file", &path.display().to_string());
    }
    println!();
    Ok(())
}

/// Prints the response as JSON on stdout
pub fn cmd_predict(ctx: &RunContext, record: &str) -> anyhow::Result<()> {
    let response = predict_record(&ctx.config().paths, record);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub fn cmd_run(ctx: &RunContext, n_trials: Option<usize>, save_model: bool) -> anyhow::Result<()> {
    cmd_transform(ctx)?;
    cmd_train(ctx, n_trials, save_model, None)
}

/// Dispatch a parsed command
pub fn execute(ctx: &RunContext, command: &Commands) -> anyhow::Result<()> {
    match command {
        Commands::Transform => cmd_transform(ctx),
        Commands::Train {
            n_trials,
            save_model,
            summary,
        } => cmd_train(ctx, *n_trials, *save_model, summary.as_deref()),
        Commands::Predict { record } => cmd_predict(ctx, record),
        Commands::Run {
            n_trials,
            save_model,
        } => cmd_run(ctx, *n_trials, *save_model),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train_flags() {
        let cli = Cli::try_parse_from([
            "census-automl",
            "--config",
            "pipeline.json",
            "train",
            "--n-trials",
            "7",
            "--save-model",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("pipeline.json")));
        match cli.command {
            Commands::Train {
                n_trials,
                save_model,
                summary,
            } => {
                assert_eq!(n_trials, Some(7));
                assert!(save_model);
                assert!(summary.is_none());
            }
            _ => panic!("expected train"),
        }
    }

    #[test]
    fn test_config_flag_is_global() {
        let cli = Cli::try_parse_from(["census-automl", "transform", "--config", "c.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.json")));
        assert!(matches!(cli.command, Commands::Transform));
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let cli = Cli::try_parse_from(["census-automl", "run"]).unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.search.n_trials, 100);
    }

    #[test]
    fn test_malformed_record_becomes_error_payload() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::rooted_at(dir.path());
        let response = predict_record(&paths, "{\"age\": \"old\"}");
        assert!(response.is_error());
    }

    #[test]
    fn test_missing_artifacts_become_error_payload() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::rooted_at(dir.path());
        let record = r#"{"age": 39, "workclass": "State-gov", "education": "Bachelors",
            "education-num": 13, "marital-status": "Never-married", "occupation": "Adm-clerical",
            "relationship": "Not-in-family", "race": "White", "sex": "Male",
            "capital-gain": 2174, "capital-loss": 0, "hours-per-week": 40,
            "native-country": "United-States"}"#;
        let response = predict_record(&paths, record);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], true);
        assert!(json["message"].as_str().unwrap().len() > 0);
    }
}
