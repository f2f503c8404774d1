//! Cross-validated booster search

use super::booster::{Booster, EvalSet};
use super::cross_validation::{CVSplit, StratifiedKFold};
use super::metrics::roc_auc_score;
use super::params::BoosterParams;
use crate::config::{ArtifactPolicy, SearchConfig};
use crate::error::{CensusError, Result};
use crate::optimizer::{ParameterValue, StopSignal, Study, StudySummary, Trial};
use ndarray::{Array1, Array2, Axis};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Mean held-out ROC-AUC of one parameter configuration over stratified folds.
///
/// Folds are computed once and shared by every trial. Parameters are sampled
/// once per trial. Intermediate AUC is reported at step
/// `fold * num_boost_round + round` so every fold and round has its own
/// pruning step.
pub struct CrossValidatedObjective<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    splits: Vec<CVSplit>,
    num_boost_round: usize,
    seed: u64,
    artifact_policy: ArtifactPolicy,
}

impl<'a> CrossValidatedObjective<'a> {
    pub fn new(x: &'a Array2<f64>, y: &'a Array1<f64>, config: &SearchConfig) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(CensusError::Data(format!(
                "{} rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }
        let splits = StratifiedKFold::new(config.n_folds)
            .with_random_state(config.seed)
            .split(y)?;
        Ok(Self {
            x,
            y,
            splits,
            num_boost_round: config.num_boost_round,
            seed: config.seed,
            artifact_policy: config.artifact_policy,
        })
    }

    pub fn splits(&self) -> &[CVSplit] {
        &self.splits
    }

    /// Score one trial and attach its candidate model
    pub fn evaluate(&self, trial: &mut Trial<'_, Booster>) -> Result<f64> {
        let params = BoosterParams::suggest(trial)?;
        let rounds = self.num_boost_round;

        let mut scores = Vec::with_capacity(self.splits.len());
        let mut last_model = None;

        for split in &self.splits {
            let x_trn = self.x.select(Axis(0), &split.train_indices);
            let y_trn = self.y.select(Axis(0), &split.train_indices);
            let x_val = self.x.select(Axis(0), &split.test_indices);
            let y_val = self.y.select(Axis(0), &split.test_indices);

            let offset = split.fold_idx * rounds;
            let model = Booster::train_with_eval(
                &params,
                &x_trn,
                &y_trn,
                EvalSet { x: &x_val, y: &y_val },
                rounds,
                self.seed,
                |round, auc| {
                    let step = offset + round;
                    trial.report(step, auc);
                    if trial.should_prune() {
                        return Err(CensusError::TrialPruned { step });
                    }
                    Ok(())
                },
            )?;

            let auc = roc_auc_score(&y_val, &model.predict_proba(&x_val)?)?;
            debug!(trial = trial.number(), fold = split.fold_idx, auc, "Fold scored");
            scores.push(auc);
            last_model = Some(model);
        }

        let mean_auc = scores.iter().sum::<f64>() / scores.len() as f64;

        let artifact = match self.artifact_policy {
            ArtifactPolicy::LastFold => last_model,
            ArtifactPolicy::RefitFull => {
                Some(Booster::train(&params, self.x, self.y, rounds, self.seed)?)
            }
        };
        if let Some(model) = artifact {
            trial.set_artifact(model);
        }

        Ok(mean_auc)
    }
}

/// Outcome of a search run
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best_model: Booster,
    pub best_params: BTreeMap<String, ParameterValue>,
    /// Mean cross-validated ROC-AUC of the best trial
    pub best_value: f64,
    pub best_trial: usize,
    pub summary: StudySummary,
}

/// Drives a study of cross-validated boosters
pub struct ModelSearch {
    config: SearchConfig,
    stop: StopSignal,
}

impl ModelSearch {
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stop: StopSignal::new(),
        })
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run the study and return the best model with its parameters
    pub fn run(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchOutcome> {
        let objective = CrossValidatedObjective::new(x, y, &self.config)?;
        info!(
            n_trials = self.config.n_trials,
            n_folds = self.config.n_folds,
            rows = x.nrows(),
            "Starting model search"
        );

        let mut study: Study<Booster> =
            Study::from_config(&self.config).with_stop_signal(self.stop.clone());
        study.optimize(self.config.n_trials, |trial| objective.evaluate(trial))?;

        let summary = study.summary();
        let best = study
            .take_best_result()
            .ok_or_else(|| CensusError::Search("no best trial recorded".to_string()))?;
        let best_model = best.artifact.ok_or_else(|| {
            CensusError::Search(format!("trial {} has no model attached", best.trial_number))
        })?;

        info!(
            best_trial = best.trial_number,
            best_value = best.value,
            booster = best_model.booster_name(),
            pruned = summary.n_pruned,
            failed = summary.n_failed,
            "Model search finished"
        );

        Ok(SearchOutcome {
            best_model,
            best_params: best.params,
            best_value: best.value,
            best_trial: best.trial_number,
            summary,
        })
    }
}
