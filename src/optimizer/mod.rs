//! Hyperparameter optimization module
//!
//! A define-by-run hyperparameter study:
//! - Parameter distributions suggested from inside the objective
//! - Random search and Tree-structured Parzen Estimators (TPE)
//! - Median pruning on intermediate values
//! - A best-result register holding the winning trial's artifact

mod samplers;
mod search_space;
mod study;
pub mod pruners;

pub use pruners::{create_pruner, MedianPruner, NoPruner, Pruner, PrunerConfig};
pub use samplers::{create_sampler, RandomSampler, Sampler, SamplerType, TPESampler};
pub use search_space::{Parameter, ParameterType, ParameterValue};
pub use study::{
    BestResult, FrozenTrial, OptimizeDirection, StopSignal, Study, StudySummary, Trial, TrialState,
};
