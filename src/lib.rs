//! Census AutoML - income classification on the adult census tables
//!
//! This crate provides the whole pipeline:
//! - Cleaning, scaling, one-hot and weight-of-evidence encoding
//! - A transformation orchestrator writing a feature store
//! - Gradient boosting with gbtree, gblinear and dart boosters
//! - Define-by-run hyperparameter search with TPE sampling and median pruning
//! - A local model registry with run tracking
//! - Single-record prediction and a CLI
//!
//! # Modules
//!
//! - [`preprocessing`] - Encoders and the column-group pipeline
//! - [`transformation`] - Raw tables to feature store
//! - [`training`] - Boosters, metrics, cross-validated search, trainer
//! - [`optimizer`] - Study, samplers, pruners
//! - [`registry`] - Experiment tracking and model registry
//! - [`inference`] - Prediction contract
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Configuration and process context
pub mod config;
pub mod context;
pub mod artifacts;

// Data and features
pub mod data;
pub mod preprocessing;
pub mod transformation;

// Modelling
pub mod training;
pub mod optimizer;

// Serving
pub mod registry;
pub mod inference;
pub mod cli;

pub use error::{CensusError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{CensusError, Result};

    // Configuration
    pub use crate::config::{ArtifactPolicy, PathsConfig, PipelineConfig, SearchConfig};

    // Preprocessing
    pub use crate::preprocessing::{DataPreprocessor, OneHotEncoder, StandardScaler, WoeEncoder};
    pub use crate::transformation::{DataTransformation, FeatureStore};

    // Training
    pub use crate::training::{Booster, BoosterParams, ModelSearch, ModelTrainer, StratifiedKFold};

    // Optimization
    pub use crate::optimizer::{MedianPruner, Study, TPESampler, Trial};

    // Registry and inference
    pub use crate::inference::{CensusRecord, Prediction, PredictionResponse, Predictor};
    pub use crate::registry::{LocalRegistry, ModelRegistry};
}
