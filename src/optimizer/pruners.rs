//! Pruners for early stopping of trials

use super::study::{FrozenTrial, OptimizeDirection, TrialState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pruner trait for deciding when to stop unpromising trials early
pub trait Pruner: Send + Sync {
    /// Decide whether the running trial should stop at `step`.
    ///
    /// `intermediate` holds the running trial's reported values; `history`
    /// holds every finished trial.
    fn should_prune(
        &self,
        step: usize,
        intermediate: &BTreeMap<usize, f64>,
        history: &[FrozenTrial],
        direction: OptimizeDirection,
    ) -> bool;
}

/// Median pruner - prunes if the trial's best value so far is worse than the
/// median of completed trials at the same step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedianPruner {
    /// Completed trials required before pruning starts
    n_startup_trials: usize,
    /// Number of warmup steps to skip pruning
    n_warmup_steps: usize,
    /// Minimum number of trials at step before pruning
    n_min_trials: usize,
}

impl Default for MedianPruner {
    fn default() -> Self {
        Self::new()
    }
}

impl MedianPruner {
    /// Create a new median pruner
    pub fn new() -> Self {
        Self {
            n_startup_trials: 5,
            n_warmup_steps: 0,
            n_min_trials: 1,
        }
    }

    /// Set number of startup trials
    pub fn with_n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Set number of warmup steps
    pub fn with_n_warmup_steps(mut self, n: usize) -> Self {
        self.n_warmup_steps = n;
        self
    }

    /// Set the minimum number of completed trials reporting at a step
    pub fn with_n_min_trials(mut self, n: usize) -> Self {
        self.n_min_trials = n.max(1);
        self
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    }
}

impl Pruner for MedianPruner {
    fn should_prune(
        &self,
        step: usize,
        intermediate: &BTreeMap<usize, f64>,
        history: &[FrozenTrial],
        direction: OptimizeDirection,
    ) -> bool {
        let completed: Vec<&FrozenTrial> = history
            .iter()
            .filter(|t| t.state == TrialState::Complete)
            .collect();

        // Skip startup trials
        if completed.len() < self.n_startup_trials {
            return false;
        }

        // Skip warmup steps
        if step < self.n_warmup_steps {
            return false;
        }

        let reported = intermediate.range(..=step).map(|(_, v)| *v);
        let best = match direction {
            OptimizeDirection::Maximize => reported.fold(f64::NEG_INFINITY, f64::max),
            OptimizeDirection::Minimize => reported.fold(f64::INFINITY, f64::min),
        };
        if best.is_nan() || best.is_infinite() {
            return !intermediate.is_empty();
        }

        // Get all values at this step
        let values: Vec<f64> = completed
            .iter()
            .filter_map(|t| t.intermediate_values.get(&step).copied())
            .filter(|v| !v.is_nan())
            .collect();
        if values.len() < self.n_min_trials {
            return false;
        }

        let median = median(values);

        // Prune if worse than median
        match direction {
            OptimizeDirection::Maximize => best < median,
            OptimizeDirection::Minimize => best > median,
        }
    }
}

/// No pruning - always continue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoPruner;

impl Pruner for NoPruner {
    fn should_prune(
        &self,
        _step: usize,
        _intermediate: &BTreeMap<usize, f64>,
        _history: &[FrozenTrial],
        _direction: OptimizeDirection,
    ) -> bool {
        false
    }
}

/// Pruner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrunerConfig {
    Median {
        n_startup_trials: usize,
        n_warmup_steps: usize,
    },
    None,
}

impl Default for PrunerConfig {
    fn default() -> Self {
        PrunerConfig::Median {
            n_startup_trials: 5,
            n_warmup_steps: 10,
        }
    }
}

/// Create a pruner from configuration
pub fn create_pruner(config: &PrunerConfig) -> Box<dyn Pruner> {
    match config {
        PrunerConfig::Median {
            n_startup_trials,
            n_warmup_steps,
        } => Box::new(
            MedianPruner::new()
                .with_n_startup_trials(*n_startup_trials)
                .with_n_warmup_steps(*n_warmup_steps),
        ),
        PrunerConfig::None => Box::new(NoPruner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(number: usize, state: TrialState, curve: &[f64]) -> FrozenTrial {
        FrozenTrial {
            number,
            state,
            value: curve.last().copied(),
            params: BTreeMap::new(),
            intermediate_values: curve.iter().copied().enumerate().collect(),
            duration_secs: 0.0,
            error: None,
        }
    }

    fn history() -> Vec<FrozenTrial> {
        vec![
            finished(0, TrialState::Complete, &[0.70, 0.80, 0.85]),
            finished(1, TrialState::Complete, &[0.60, 0.70, 0.75]),
            finished(2, TrialState::Complete, &[0.65, 0.75, 0.80]),
        ]
    }

    #[test]
    fn test_median_pruner() {
        let pruner = MedianPruner::new().with_n_startup_trials(2);
        let history = history();

        // Median at step 1 is 0.75
        let bad: BTreeMap<usize, f64> = [(0, 0.50), (1, 0.55)].into_iter().collect();
        assert!(pruner.should_prune(1, &bad, &history, OptimizeDirection::Maximize));

        let good: BTreeMap<usize, f64> = [(0, 0.72), (1, 0.79)].into_iter().collect();
        assert!(!pruner.should_prune(1, &good, &history, OptimizeDirection::Maximize));
    }

    #[test]
    fn test_best_value_so_far_is_used() {
        let pruner = MedianPruner::new().with_n_startup_trials(0);
        // dips at step 1 but its best so far (0.9) beats the median
        let curve: BTreeMap<usize, f64> = [(0, 0.90), (1, 0.50)].into_iter().collect();
        assert!(!pruner.should_prune(1, &curve, &history(), OptimizeDirection::Maximize));
    }

    #[test]
    fn test_startup_and_warmup() {
        let curve: BTreeMap<usize, f64> = [(0, 0.1), (1, 0.1)].into_iter().collect();

        let startup = MedianPruner::new().with_n_startup_trials(5);
        assert!(!startup.should_prune(1, &curve, &history(), OptimizeDirection::Maximize));

        let warmup = MedianPruner::new().with_n_startup_trials(0).with_n_warmup_steps(2);
        assert!(!warmup.should_prune(1, &curve, &history(), OptimizeDirection::Maximize));
    }

    #[test]
    fn test_pruned_trials_do_not_count() {
        let history = vec![
            finished(0, TrialState::Pruned, &[0.99, 0.99]),
            finished(1, TrialState::Complete, &[0.40, 0.50]),
        ];
        let pruner = MedianPruner::new().with_n_startup_trials(1);
        let curve: BTreeMap<usize, f64> = [(0, 0.45), (1, 0.60)].into_iter().collect();
        assert!(!pruner.should_prune(1, &curve, &history, OptimizeDirection::Maximize));
    }

    #[test]
    fn test_minimize_direction() {
        let pruner = MedianPruner::new().with_n_startup_trials(0);
        let curve: BTreeMap<usize, f64> = [(1, 0.95)].into_iter().collect();
        assert!(pruner.should_prune(1, &curve, &history(), OptimizeDirection::Minimize));
    }

    #[test]
    fn test_no_pruner() {
        let curve: BTreeMap<usize, f64> = [(100, f64::NAN)].into_iter().collect();
        assert!(!NoPruner.should_prune(100, &curve, &history(), OptimizeDirection::Maximize));
    }
}
