//! Pipeline configuration

use crate::error::{CensusError, Result};
use crate::optimizer::{PrunerConfig, SamplerType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Filesystem locations for every artifact the pipeline reads or writes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Raw training table (parquet)
    pub train_data: PathBuf,
    /// Raw test table (parquet)
    pub test_data: PathBuf,
    /// Fitted preprocessing pipeline artifact
    pub preprocessor: PathBuf,
    /// Trained model artifact, written when the trainer is asked to save
    pub model: PathBuf,
    /// Transformed training table
    pub xform_train: PathBuf,
    /// Transformed test table
    pub xform_test: PathBuf,
    /// Directory holding dated run-parameter documents
    pub run_config_dir: PathBuf,
    /// Root of the local model registry
    pub registry_dir: PathBuf,
    /// Directory for log files
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            train_data: PathBuf::from("artifacts/train_data.parquet"),
            test_data: PathBuf::from("artifacts/test_data.parquet"),
            preprocessor: PathBuf::from("artifacts/preprocessor.json"),
            model: PathBuf::from("artifacts/model.json"),
            xform_train: PathBuf::from("feature_store/xform_train.parquet"),
            xform_test: PathBuf::from("feature_store/xform_test.parquet"),
            run_config_dir: PathBuf::from("run_config"),
            registry_dir: PathBuf::from("model_db"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl PathsConfig {
    /// Re-root every relative path under `root`
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let d = Self::default();
        Self {
            train_data: root.join(d.train_data),
            test_data: root.join(d.test_data),
            preprocessor: root.join(d.preprocessor),
            model: root.join(d.model),
            xform_train: root.join(d.xform_train),
            xform_test: root.join(d.xform_test),
            run_config_dir: root.join(d.run_config_dir),
            registry_dir: root.join(d.registry_dir),
            log_dir: root.join(d.log_dir),
        }
    }
}

/// Which trained model a trial exposes as its candidate artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactPolicy {
    /// The model trained on the final fold
    LastFold,
    /// A model retrained on every training row with the trial's parameters
    RefitFull,
}

/// Configuration for the hyperparameter search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of trials to run
    pub n_trials: usize,
    /// Number of stratified folds per trial
    pub n_folds: usize,
    /// Seed shared by fold shuffling, the sampler and the boosters
    pub seed: u64,
    /// Boosting rounds per fold
    pub num_boost_round: usize,
    /// Sampler used to propose parameters
    pub sampler: SamplerType,
    /// Random trials before the TPE sampler starts modelling
    pub n_startup_trials: usize,
    /// Pruning policy applied to intermediate validation AUC
    pub pruner: PrunerConfig,
    /// Wall-clock budget checked between trials
    pub timeout_secs: Option<f64>,
    /// Candidate model retained per trial
    pub artifact_policy: ArtifactPolicy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_trials: 100,
            n_folds: 5,
            seed: 42,
            num_boost_round: 50,
            sampler: SamplerType::Tpe,
            n_startup_trials: 10,
            pruner: PrunerConfig::default(),
            timeout_secs: None,
            artifact_policy: ArtifactPolicy::LastFold,
        }
    }
}

impl SearchConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set number of trials
    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    /// Builder method to set the number of folds
    pub fn with_n_folds(mut self, n: usize) -> Self {
        self.n_folds = n;
        self
    }

    /// Builder method to set the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builder method to set boosting rounds per fold
    pub fn with_num_boost_round(mut self, rounds: usize) -> Self {
        self.num_boost_round = rounds;
        self
    }

    /// Builder method to set the sampler
    pub fn with_sampler(mut self, sampler: SamplerType) -> Self {
        self.sampler = sampler;
        self
    }

    /// Builder method to set the pruner
    pub fn with_pruner(mut self, pruner: PrunerConfig) -> Self {
        self.pruner = pruner;
        self
    }

    /// Builder method to set the timeout
    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Builder method to set the artifact policy
    pub fn with_artifact_policy(mut self, policy: ArtifactPolicy) -> Self {
        self.artifact_policy = policy;
        self
    }

    /// Reject configurations the search cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.n_trials == 0 {
            return Err(invalid("n_trials", self.n_trials, "must be at least 1"));
        }
        if self.n_folds < 2 {
            return Err(invalid("n_folds", self.n_folds, "must be at least 2"));
        }
        if self.num_boost_round == 0 {
            return Err(invalid("num_boost_round", self.num_boost_round, "must be at least 1"));
        }
        if let Some(t) = self.timeout_secs {
            if !(t > 0.0) {
                return Err(invalid("timeout_secs", t, "must be positive"));
            }
        }
        Ok(())
    }
}

fn invalid(name: &str, value: impl ToString, reason: &str) -> CensusError {
    CensusError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub search: SearchConfig,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: Option<String>,
}

impl PipelineConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            CensusError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&json)?;
        config.search.validate()?;
        Ok(config)
    }

    /// Default filter directive for the log sink
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or("census_automl=info")
    }
}
