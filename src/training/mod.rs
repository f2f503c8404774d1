//! Model training module
//!
//! Provides:
//! - ROC-AUC and accuracy metrics
//! - Stratified k-fold splitting
//! - Gradient boosting with gbtree, gblinear and dart boosters
//! - Cross-validated hyperparameter search
//! - The model trainer reading from the feature store

mod booster;
mod params;
mod search;
mod trainer;
pub mod cross_validation;
pub mod metrics;

pub use booster::{Booster, EvalSet};
pub use cross_validation::{CVSplit, StratifiedKFold};
pub use metrics::{accuracy_score, roc_auc_score};
pub use params::{
    BoosterParams, DartParams, GrowPolicy, LinearParams, NormalizeType, SampleType, TreeParams,
    BOOSTER_CHOICES,
};
pub use search::{CrossValidatedObjective, ModelSearch, SearchOutcome};
pub use trainer::{Datasets, ModelTrainer, TrainingOutcome};
