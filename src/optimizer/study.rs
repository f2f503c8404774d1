//! Define-by-run study: trials, history and the best-result register

use super::pruners::{create_pruner, Pruner};
use super::samplers::{create_sampler, Sampler};
use super::search_space::{Parameter, ParameterType, ParameterValue};
use crate::artifacts::save_object;
use crate::config::SearchConfig;
use crate::error::{CensusError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Optimization direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizeDirection {
    Minimize,
    Maximize,
}

impl OptimizeDirection {
    /// True when `candidate` strictly improves on `incumbent`
    pub fn improves(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            OptimizeDirection::Maximize => candidate > incumbent,
            OptimizeDirection::Minimize => candidate < incumbent,
        }
    }
}

/// Terminal state of a finished trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    Complete,
    Pruned,
    Failed,
}

/// Immutable record of a finished trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenTrial {
    pub number: usize,
    pub state: TrialState,
    /// Objective value; for pruned trials the last reported intermediate value
    pub value: Option<f64>,
    pub params: BTreeMap<String, ParameterValue>,
    pub intermediate_values: BTreeMap<usize, f64>,
    pub duration_secs: f64,
    pub error: Option<String>,
}

/// Shared flag asking a running study to stop at the next trial boundary
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A running trial handed to the objective.
///
/// Parameters are suggested lazily; asking for the same name twice returns
/// the value chosen the first time.
pub struct Trial<'a, A> {
    number: usize,
    direction: OptimizeDirection,
    sampler: &'a mut dyn Sampler,
    pruner: &'a dyn Pruner,
    history: &'a [FrozenTrial],
    params: BTreeMap<String, ParameterValue>,
    distributions: BTreeMap<String, ParameterType>,
    intermediate_values: BTreeMap<usize, f64>,
    last_step: Option<usize>,
    artifact: Option<A>,
}

impl<'a, A> Trial<'a, A> {
    fn new(
        number: usize,
        direction: OptimizeDirection,
        sampler: &'a mut dyn Sampler,
        pruner: &'a dyn Pruner,
        history: &'a [FrozenTrial],
    ) -> Self {
        Self {
            number,
            direction,
            sampler,
            pruner,
            history,
            params: BTreeMap::new(),
            distributions: BTreeMap::new(),
            intermediate_values: BTreeMap::new(),
            last_step: None,
            artifact: None,
        }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn params(&self) -> &BTreeMap<String, ParameterValue> {
        &self.params
    }

    fn suggest(&mut self, param: Parameter) -> Result<ParameterValue> {
        param.param_type.validate(&param.name)?;

        if let Some(existing) = self.params.get(&param.name) {
            if self.distributions.get(&param.name) != Some(&param.param_type) {
                return Err(CensusError::InvalidParameter {
                    name: param.name.clone(),
                    value: existing.to_string(),
                    reason: "suggested again with a different distribution".to_string(),
                });
            }
            return Ok(existing.clone());
        }

        let value = self.sampler.sample(&param, self.history, self.direction);
        debug!(trial = self.number, param = %param.name, value = %value, "suggested");
        self.params.insert(param.name.clone(), value.clone());
        self.distributions.insert(param.name, param.param_type);
        Ok(value)
    }

    /// Suggest a float in `[low, high]`, optionally on a log scale
    pub fn suggest_float(&mut self, name: &str, low: f64, high: f64, log: bool) -> Result<f64> {
        let param = if log {
            Parameter::log_float(name, low, high)
        } else {
            Parameter::float(name, low, high)
        };
        let value = self.suggest(param)?;
        value.as_float().ok_or_else(|| mistyped(name, &value))
    }

    /// Suggest an integer in `[low, high]`
    pub fn suggest_int(&mut self, name: &str, low: i64, high: i64) -> Result<i64> {
        let value = self.suggest(Parameter::int(name, low, high))?;
        value.as_int().ok_or_else(|| mistyped(name, &value))
    }

    /// Suggest one of `choices`
    pub fn suggest_categorical(&mut self, name: &str, choices: &[&str]) -> Result<String> {
        let value = self.suggest(Parameter::categorical(name, choices))?;
        value
            .as_string()
            .map(str::to_string)
            .ok_or_else(|| mistyped(name, &value))
    }

    /// Record an intermediate objective value. Only the first report per step
    /// is kept.
    pub fn report(&mut self, step: usize, value: f64) {
        self.intermediate_values.entry(step).or_insert(value);
        self.last_step = Some(self.last_step.map_or(step, |s| s.max(step)));
    }

    /// Ask the pruner whether this trial should stop at its latest step
    pub fn should_prune(&self) -> bool {
        match self.last_step {
            Some(step) => self.pruner.should_prune(
                step,
                &self.intermediate_values,
                self.history,
                self.direction,
            ),
            None => false,
        }
    }

    /// Attach the artifact produced by this trial
    pub fn set_artifact(&mut self, artifact: A) {
        self.artifact = Some(artifact);
    }

    fn into_parts(self) -> (BTreeMap<String, ParameterValue>, BTreeMap<usize, f64>, Option<A>) {
        (self.params, self.intermediate_values, self.artifact)
    }
}

fn mistyped(name: &str, value: &ParameterValue) -> CensusError {
    CensusError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: "sampled value has the wrong type".to_string(),
    }
}

/// The best trial seen so far together with its artifact
#[derive(Debug, Clone)]
pub struct BestResult<A> {
    pub trial_number: usize,
    pub value: f64,
    pub params: BTreeMap<String, ParameterValue>,
    pub artifact: Option<A>,
}

/// Serializable view of a study
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySummary {
    pub direction: OptimizeDirection,
    pub best_trial: Option<usize>,
    pub best_value: Option<f64>,
    pub best_params: Option<BTreeMap<String, ParameterValue>>,
    pub n_complete: usize,
    pub n_pruned: usize,
    pub n_failed: usize,
    pub total_duration_secs: f64,
    pub trials: Vec<FrozenTrial>,
}

/// A sequence of trials against one objective
pub struct Study<A> {
    direction: OptimizeDirection,
    sampler: Box<dyn Sampler>,
    pruner: Box<dyn Pruner>,
    trials: Vec<FrozenTrial>,
    best_trial_idx: Option<usize>,
    best: Option<BestResult<A>>,
    stop: StopSignal,
    timeout: Option<Duration>,
    total_duration_secs: f64,
}

impl<A> Study<A> {
    /// Create a new study
    pub fn new(
        direction: OptimizeDirection,
        sampler: Box<dyn Sampler>,
        pruner: Box<dyn Pruner>,
    ) -> Self {
        Self {
            direction,
            sampler,
            pruner,
            trials: Vec::new(),
            best_trial_idx: None,
            best: None,
            stop: StopSignal::new(),
            timeout: None,
            total_duration_secs: 0.0,
        }
    }

    /// Build a maximizing study from the search configuration
    pub fn from_config(config: &SearchConfig) -> Self {
        let sampler = create_sampler(config.sampler, Some(config.seed), config.n_startup_trials);
        let pruner = create_pruner(&config.pruner);
        let mut study = Self::new(OptimizeDirection::Maximize, sampler, pruner);
        if let Some(secs) = config.timeout_secs {
            study = study.with_timeout(Duration::from_secs_f64(secs));
        }
        study
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Handle for stopping the study from elsewhere
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn direction(&self) -> OptimizeDirection {
        self.direction
    }

    pub fn trials(&self) -> &[FrozenTrial] {
        &self.trials
    }

    /// Get the best trial
    pub fn best_trial(&self) -> Option<&FrozenTrial> {
        self.best_trial_idx.map(|idx| &self.trials[idx])
    }

    /// Get the best value
    pub fn best_value(&self) -> Option<f64> {
        self.best_trial().and_then(|t| t.value)
    }

    /// Get the best parameters
    pub fn best_params(&self) -> Option<&BTreeMap<String, ParameterValue>> {
        self.best_trial().map(|t| &t.params)
    }

    /// The best-result register
    pub fn best_result(&self) -> Option<&BestResult<A>> {
        self.best.as_ref()
    }

    /// Move the best-result register out of the study
    pub fn take_best_result(&mut self) -> Option<BestResult<A>> {
        self.best.take()
    }

    /// Run up to `n_trials` trials sequentially.
    ///
    /// A trial whose objective fails is recorded as failed and the search
    /// continues; returning [`CensusError::TrialPruned`] marks it pruned.
    /// Fails only when no trial completed.
    pub fn optimize<F>(&mut self, n_trials: usize, mut objective: F) -> Result<&BestResult<A>>
    where
        F: FnMut(&mut Trial<'_, A>) -> Result<f64>,
    {
        let start = Instant::now();

        for _ in 0..n_trials {
            if self.stop.is_stopped() {
                info!(trials = self.trials.len(), "Stop requested, ending search");
                break;
            }
            if let Some(timeout) = self.timeout {
                if start.elapsed() >= timeout {
                    info!(trials = self.trials.len(), "Timeout reached, ending search");
                    break;
                }
            }

            let number = self.trials.len();
            let trial_start = Instant::now();
            let mut trial = Trial::new(
                number,
                self.direction,
                self.sampler.as_mut(),
                self.pruner.as_ref(),
                &self.trials,
            );
            let outcome = objective(&mut trial);
            let (params, intermediate_values, artifact) = trial.into_parts();

            let (state, value, error) = match outcome {
                Ok(v) if v.is_nan() => {
                    warn!(trial = number, "Objective returned NaN");
                    (TrialState::Failed, None, Some("objective returned NaN".to_string()))
                }
                Ok(v) => (TrialState::Complete, Some(v), None),
                Err(e) if e.is_pruned() => {
                    let last = intermediate_values.values().next_back().copied();
                    (TrialState::Pruned, last, None)
                }
                Err(e) => {
                    warn!(trial = number, error = %e, "Trial failed");
                    (TrialState::Failed, None, Some(e.to_string()))
                }
            };

            self.trials.push(FrozenTrial {
                number,
                state,
                value,
                params,
                intermediate_values,
                duration_secs: trial_start.elapsed().as_secs_f64(),
                error,
            });
            self.update_best(number);
            self.best_model_callback(number, artifact);

            info!(
                trial = number,
                state = ?state,
                value = value.unwrap_or(f64::NAN),
                best = self.best_value().unwrap_or(f64::NAN),
                "Trial finished"
            );
        }

        self.total_duration_secs += start.elapsed().as_secs_f64();

        self.best
            .as_ref()
            .ok_or_else(|| CensusError::Search(format!("no trial completed out of {}", self.trials.len())))
    }

    fn update_best(&mut self, idx: usize) {
        let trial = &self.trials[idx];
        if trial.state != TrialState::Complete {
            return;
        }
        let Some(value) = trial.value else { return };
        let is_better = match self.best_value() {
            None => true,
            Some(best) => self.direction.improves(value, best),
        };
        if is_better {
            self.best_trial_idx = Some(idx);
        }
    }

    /// Copy the finished trial's artifact into the register when it is the
    /// study's best trial
    fn best_model_callback(&mut self, number: usize, artifact: Option<A>) {
        let Some(best) = self.best_trial() else { return };
        if best.number != number {
            return;
        }
        let Some(value) = best.value else { return };
        debug!(trial = number, value, "New best trial");
        self.best = Some(BestResult {
            trial_number: number,
            value,
            params: best.params.clone(),
            artifact,
        });
    }

    pub fn summary(&self) -> StudySummary {
        let count = |state| self.trials.iter().filter(|t| t.state == state).count();
        StudySummary {
            direction: self.direction,
            best_trial: self.best_trial().map(|t| t.number),
            best_value: self.best_value(),
            best_params: self.best_params().cloned(),
            n_complete: count(TrialState::Complete),
            n_pruned: count(TrialState::Pruned),
            n_failed: count(TrialState::Failed),
            total_duration_secs: self.total_duration_secs,
            trials: self.trials.clone(),
        }
    }

    /// Save the study summary as JSON
    pub fn save_summary(&self, path: impl AsRef<Path>) -> Result<()> {
        save_object(path, &self.summary())
    }
}
