//! Sampling strategies for hyperparameter optimization

use super::search_space::{Parameter, ParameterType, ParameterValue};
use super::study::{FrozenTrial, OptimizeDirection, TrialState};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Type of sampler to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplerType {
    /// Random sampling
    Random,
    /// Tree-structured Parzen Estimator
    Tpe,
}

/// Trait for hyperparameter samplers.
///
/// Parameters are proposed one at a time, as the objective asks for them.
pub trait Sampler: Send {
    fn sample(
        &mut self,
        param: &Parameter,
        history: &[FrozenTrial],
        direction: OptimizeDirection,
    ) -> ParameterValue;
}

/// Random sampler
#[derive(Debug)]
pub struct RandomSampler {
    rng: Xoshiro256PlusPlus,
}

impl RandomSampler {
    /// Create a new random sampler
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => Xoshiro256PlusPlus::seed_from_u64(s),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        Self { rng }
    }
}

impl Sampler for RandomSampler {
    fn sample(
        &mut self,
        param: &Parameter,
        _history: &[FrozenTrial],
        _direction: OptimizeDirection,
    ) -> ParameterValue {
        param.sample(&mut self.rng)
    }
}

/// Tree-structured Parzen Estimator sampler.
///
/// Completed trials that set the parameter are split into the best `gamma`
/// fraction and the rest. A Parzen estimator is fitted to each side and the
/// candidate drawn from the good side maximizing `l(x) / g(x)` is returned.
#[derive(Debug)]
pub struct TPESampler {
    rng: Xoshiro256PlusPlus,
    n_startup_trials: usize,
    gamma: f64,
    n_candidates: usize,
}

impl TPESampler {
    /// Create a new TPE sampler
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => Xoshiro256PlusPlus::seed_from_u64(s),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        Self {
            rng,
            n_startup_trials: 10,
            gamma: 0.25,
            n_candidates: 24,
        }
    }

    /// Set number of startup trials
    pub fn with_n_startup(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Set gamma (quantile for splitting good/bad)
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma.clamp(0.01, 0.99);
        self
    }

    /// Set the number of candidates scored per proposal
    pub fn with_n_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n.max(1);
        self
    }

    /// Split observations (internal value, objective) into (good, bad)
    fn split_observations(
        &self,
        param: &Parameter,
        history: &[FrozenTrial],
        direction: OptimizeDirection,
    ) -> (Vec<f64>, Vec<f64>) {
        let mut obs: Vec<(f64, f64)> = history
            .iter()
            .filter(|t| t.state == TrialState::Complete)
            .filter_map(|t| {
                let value = t.value?;
                let x = param.to_internal(t.params.get(&param.name)?)?;
                Some((x, value))
            })
            .collect();

        match direction {
            OptimizeDirection::Maximize => obs.sort_by(|a, b| b.1.total_cmp(&a.1)),
            OptimizeDirection::Minimize => obs.sort_by(|a, b| a.1.total_cmp(&b.1)),
        }

        let n_good = ((obs.len() as f64 * self.gamma).ceil() as usize).clamp(1, obs.len().max(1));
        let bad = obs.split_off(n_good.min(obs.len()));
        (
            obs.into_iter().map(|o| o.0).collect(),
            bad.into_iter().map(|o| o.0).collect(),
        )
    }

    fn sample_numeric(&mut self, param: &Parameter, good: &[f64], bad: &[f64]) -> ParameterValue {
        let (low, high) = param.internal_bounds();
        let l = ParzenEstimator::new(good, low, high);
        let g = ParzenEstimator::new(bad, low, high);

        let mut best_x = l.sample(&mut self.rng);
        let mut best_score = l.log_pdf(best_x) - g.log_pdf(best_x);
        for _ in 1..self.n_candidates {
            let x = l.sample(&mut self.rng);
            let score = l.log_pdf(x) - g.log_pdf(x);
            if score > best_score {
                best_score = score;
                best_x = x;
            }
        }
        param.from_internal(best_x)
    }

    fn sample_categorical(
        &mut self,
        param: &Parameter,
        n_choices: usize,
        good: &[f64],
        bad: &[f64],
    ) -> ParameterValue {
        let l = category_weights(n_choices, good);
        let g = category_weights(n_choices, bad);

        let mut best_idx = weighted_index(&l, &mut self.rng);
        let mut best_score = l[best_idx].ln() - g[best_idx].ln();
        for _ in 1..self.n_candidates {
            let idx = weighted_index(&l, &mut self.rng);
            let score = l[idx].ln() - g[idx].ln();
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }
        param.from_internal(best_idx as f64)
    }
}

impl Sampler for TPESampler {
    fn sample(
        &mut self,
        param: &Parameter,
        history: &[FrozenTrial],
        direction: OptimizeDirection,
    ) -> ParameterValue {
        let (good, bad) = self.split_observations(param, history, direction);

        // Use random sampling for startup trials
        if good.len() + bad.len() < self.n_startup_trials.max(1) {
            return param.sample(&mut self.rng);
        }

        match &param.param_type {
            ParameterType::Categorical { choices } => {
                let n = choices.len();
                self.sample_categorical(param, n, &good, &bad)
            }
            _ => self.sample_numeric(param, &good, &bad),
        }
    }
}

/// Gaussian mixture over the observations plus a broad prior component,
/// truncated to `[low, high]`
struct ParzenEstimator {
    mus: Vec<f64>,
    sigmas: Vec<f64>,
    low: f64,
    high: f64,
}

impl ParzenEstimator {
    fn new(observations: &[f64], low: f64, high: f64) -> Self {
        let range = (high - low).max(f64::EPSILON);
        let prior_mu = 0.5 * (low + high);

        let mut mus: Vec<f64> = observations.to_vec();
        mus.push(prior_mu);
        mus.sort_by(f64::total_cmp);

        let n = mus.len();
        let min_sigma = range / (100.0f64).min(1.0 + n as f64);
        let sigmas = (0..n)
            .map(|i| {
                let left = if i > 0 { mus[i] - mus[i - 1] } else { mus[i] - low };
                let right = if i + 1 < n { mus[i + 1] - mus[i] } else { high - mus[i] };
                left.max(right).clamp(min_sigma, range)
            })
            .collect();

        Self { mus, sigmas, low, high }
    }

    fn sample(&self, rng: &mut impl Rng) -> f64 {
        let k = rng.gen_range(0..self.mus.len());
        for _ in 0..32 {
            let x = self.mus[k] + self.sigmas[k] * standard_normal(rng);
            if x >= self.low && x <= self.high {
                return x;
            }
        }
        self.mus[k].clamp(self.low, self.high)
    }

    fn log_pdf(&self, x: f64) -> f64 {
        let n = self.mus.len() as f64;
        let density: f64 = self
            .mus
            .iter()
            .zip(&self.sigmas)
            .map(|(mu, sigma)| {
                let z = (x - mu) / sigma;
                (-0.5 * z * z).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
            })
            .sum::<f64>()
            / n;
        density.max(f64::MIN_POSITIVE).ln()
    }
}

/// Box-Muller draw from N(0, 1)
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Choice frequencies with one pseudo-count per choice, normalized
fn category_weights(n_choices: usize, observations: &[f64]) -> Vec<f64> {
    let mut weights = vec![1.0; n_choices];
    for &x in observations {
        let idx = (x.round().max(0.0) as usize).min(n_choices - 1);
        weights[idx] += 1.0;
    }
    let total: f64 = weights.iter().sum();
    weights.iter().map(|w| w / total).collect()
}

fn weighted_index(weights: &[f64], rng: &mut impl Rng) -> usize {
    let mut r = rng.gen::<f64>();
    for (i, w) in weights.iter().enumerate() {
        if r < *w {
            return i;
        }
        r -= w;
    }
    weights.len() - 1
}

/// Create a sampler from type
pub fn create_sampler(
    sampler_type: SamplerType,
    seed: Option<u64>,
    n_startup_trials: usize,
) -> Box<dyn Sampler> {
    match sampler_type {
        SamplerType::Random => Box::new(RandomSampler::new(seed)),
        SamplerType::Tpe => Box::new(TPESampler::new(seed).with_n_startup(n_startup_trials)),
    }
}
