//! Gradient boosting for binary classification with logistic loss
//!
//! Three boosting families share one model type:
//! - `gbtree`: regression trees fitted to a second-order approximation of the
//!   loss. Leaf weight w* = -T(G, α) / (H + λ) where T soft-thresholds by α,
//!   split gain = ½ [T(GL)²/(HL+λ) + T(GR)²/(HR+λ) - T(G)²/(H+λ)], kept when
//!   it exceeds γ.
//! - `dart`: trees with dropout. Each round a random subset of existing trees
//!   is left out when computing gradients, then the new and dropped trees are
//!   rescaled.
//! - `gblinear`: a linear model updated by coordinate descent with elastic net
//!   penalties.

use super::metrics::roc_auc_score;
use super::params::{BoosterParams, DartParams, GrowPolicy, LinearParams, NormalizeType, SampleType, TreeParams};
use crate::artifacts::{load_object, save_object};
use crate::error::{CensusError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::path::Path;
use tracing::debug;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Held-out rows scored after every boosting round
#[derive(Debug, Clone, Copy)]
pub struct EvalSet<'a> {
    pub x: &'a Array2<f64>,
    pub y: &'a Array1<f64>,
}

/// A node in the flat tree arena
#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Regression tree stored as an arena rooted at index 0
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<TreeNode>,
}

impl Tree {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { weight } => return *weight,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if sample[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    fn predict_rows(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict(row)).collect()
    }

    fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }
}

/// Soft-threshold for L1
fn threshold_l1(g: f64, alpha: f64) -> f64 {
    if g > alpha {
        g - alpha
    } else if g < -alpha {
        g + alpha
    } else {
        0.0
    }
}

/// Optimal leaf weight with L1 (alpha) and L2 (lambda) regularization
fn compute_leaf_weight(g_sum: f64, h_sum: f64, lambda: f64, alpha: f64) -> f64 {
    -threshold_l1(g_sum, alpha) / (h_sum + lambda)
}

fn node_score(g_sum: f64, h_sum: f64, lambda: f64, alpha: f64) -> f64 {
    let g = threshold_l1(g_sum, alpha);
    g * g / (h_sum + lambda)
}

#[derive(Debug, Clone, Copy)]
struct SplitInfo {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Find best split for a single feature using the exact greedy method
fn find_best_split_for_feature(
    x: &Array2<f64>,
    grad: &Array1<f64>,
    hess: &Array1<f64>,
    indices: &[usize],
    feature: usize,
    params: &TreeParams,
) -> Option<SplitInfo> {
    let mut sorted: Vec<usize> = indices.to_vec();
    sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

    let g_total: f64 = sorted.iter().map(|&i| grad[i]).sum();
    let h_total: f64 = sorted.iter().map(|&i| hess[i]).sum();
    let parent = node_score(g_total, h_total, params.lambda, params.alpha);

    let mut g_left = 0.0;
    let mut h_left = 0.0;
    let mut best: Option<SplitInfo> = None;

    for (pos, &idx) in sorted.iter().enumerate().take(sorted.len().saturating_sub(1)) {
        g_left += grad[idx];
        h_left += hess[idx];

        // No threshold separates identical values
        let next = sorted[pos + 1];
        if (x[[idx, feature]] - x[[next, feature]]).abs() < 1e-12 {
            continue;
        }

        let g_right = g_total - g_left;
        let h_right = h_total - h_left;
        if h_left < params.min_child_weight || h_right < params.min_child_weight {
            continue;
        }

        let gain = 0.5
            * (node_score(g_left, h_left, params.lambda, params.alpha)
                + node_score(g_right, h_right, params.lambda, params.alpha)
                - parent);

        if best.map_or(true, |b| gain > b.gain) {
            best = Some(SplitInfo {
                feature,
                threshold: 0.5 * (x[[idx, feature]] + x[[next, feature]]),
                gain,
            });
        }
    }

    best
}

/// Best split across all features, searched in parallel. Equal gains go to
/// the lower feature index.
fn find_best_split(
    x: &Array2<f64>,
    grad: &Array1<f64>,
    hess: &Array1<f64>,
    indices: &[usize],
    params: &TreeParams,
) -> Option<SplitInfo> {
    (0..x.ncols())
        .into_par_iter()
        .filter_map(|f| find_best_split_for_feature(x, grad, hess, indices, f, params))
        .max_by(|a, b| {
            a.gain
                .total_cmp(&b.gain)
                .then_with(|| b.feature.cmp(&a.feature))
        })
}

/// A leaf that may still be split
struct Candidate {
    node: usize,
    depth: usize,
    indices: Vec<usize>,
    split: SplitInfo,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Highest gain first, then the earliest node
    fn cmp(&self, other: &Self) -> Ordering {
        self.split
            .gain
            .total_cmp(&other.split.gain)
            .then_with(|| other.node.cmp(&self.node))
    }
}

enum Frontier {
    Depthwise(VecDeque<Candidate>),
    Lossguide(BinaryHeap<Candidate>),
}

impl Frontier {
    fn new(policy: GrowPolicy) -> Self {
        match policy {
            GrowPolicy::Depthwise => Frontier::Depthwise(VecDeque::new()),
            GrowPolicy::Lossguide => Frontier::Lossguide(BinaryHeap::new()),
        }
    }

    fn push(&mut self, c: Candidate) {
        match self {
            Frontier::Depthwise(q) => q.push_back(c),
            Frontier::Lossguide(h) => h.push(c),
        }
    }

    fn pop(&mut self) -> Option<Candidate> {
        match self {
            Frontier::Depthwise(q) => q.pop_front(),
            Frontier::Lossguide(h) => h.pop(),
        }
    }

    fn extend_from(&mut self, c: Option<Candidate>) {
        if let Some(c) = c {
            self.push(c);
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    grad: &'a Array1<f64>,
    hess: &'a Array1<f64>,
    params: &'a TreeParams,
    nodes: Vec<TreeNode>,
}

impl<'a> TreeBuilder<'a> {
    /// Add a leaf for `indices` and return it as a split candidate when it
    /// can still grow
    fn add_leaf(&mut self, indices: Vec<usize>, depth: usize) -> Option<Candidate> {
        let g_sum: f64 = indices.iter().map(|&i| self.grad[i]).sum();
        let h_sum: f64 = indices.iter().map(|&i| self.hess[i]).sum();
        let node = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            weight: compute_leaf_weight(g_sum, h_sum, self.params.lambda, self.params.alpha),
        });

        // Stopping conditions
        if depth >= self.params.max_depth || indices.len() < 2 || h_sum < self.params.min_child_weight {
            return None;
        }

        let split = find_best_split(self.x, self.grad, self.hess, &indices, self.params)?;
        if split.gain <= self.params.gamma || split.gain <= 0.0 {
            return None;
        }
        Some(Candidate {
            node,
            depth,
            indices,
            split,
        })
    }

    fn grow(mut self, indices: Vec<usize>) -> Tree {
        let mut frontier = Frontier::new(self.params.grow_policy);
        let mut n_leaves = 1;
        if let Some(root) = self.add_leaf(indices, 0) {
            frontier.push(root);
        }

        while let Some(c) = frontier.pop() {
            if self.params.max_leaves > 0 && n_leaves >= self.params.max_leaves {
                break;
            }
            let SplitInfo {
                feature, threshold, ..
            } = c.split;
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = c
                .indices
                .iter()
                .partition(|&&i| self.x[[i, feature]] <= threshold);
            if left_idx.is_empty() || right_idx.is_empty() {
                continue;
            }

            let left = self.nodes.len();
            let left_candidate = self.add_leaf(left_idx, c.depth + 1);
            let right = self.nodes.len();
            let right_candidate = self.add_leaf(right_idx, c.depth + 1);
            self.nodes[c.node] = TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            };
            n_leaves += 1;

            frontier.extend_from(left_candidate);
            frontier.extend_from(right_candidate);
        }

        Tree { nodes: self.nodes }
    }
}

fn build_tree(x: &Array2<f64>, grad: &Array1<f64>, hess: &Array1<f64>, params: &TreeParams) -> Tree {
    let builder = TreeBuilder {
        x,
        grad,
        hess,
        params,
        nodes: Vec::new(),
    };
    builder.grow((0..x.nrows()).collect())
}

/// Logistic loss: grad = p - y, hess = p * (1 - p)
fn logistic_gradients(margin: &Array1<f64>, y: &Array1<f64>) -> (Array1<f64>, Array1<f64>) {
    let probs = margin.mapv(sigmoid);
    let grad = &probs - y;
    let hess = probs.mapv(|p| (p * (1.0 - p)).max(1e-7));
    (grad, hess)
}

/// Pick the trees dart leaves out this round
fn select_dropped(dart: &DartParams, weights: &[f64], rng: &mut impl Rng) -> Vec<usize> {
    if weights.is_empty() || rng.gen::<f64>() < dart.skip_drop {
        return Vec::new();
    }
    match dart.sample_type {
        SampleType::Uniform => (0..weights.len())
            .filter(|_| rng.gen::<f64>() < dart.rate_drop)
            .collect(),
        SampleType::Weighted => {
            let total: f64 = weights.iter().sum();
            let n = weights.len() as f64;
            (0..weights.len())
                .filter(|&i| rng.gen::<f64>() < dart.rate_drop * n * weights[i] / total)
                .collect()
        }
    }
}

/// Rescale dropped trees and return the weight of the new tree
fn normalize_dropped(normalize: NormalizeType, eta: f64, weights: &mut [f64], dropped: &[usize]) -> f64 {
    if dropped.is_empty() {
        return 1.0;
    }
    let k = dropped.len() as f64;
    let (dropped_factor, new_weight) = match normalize {
        NormalizeType::Forest => {
            let factor = 1.0 / (1.0 + eta);
            (factor, factor)
        }
        NormalizeType::Tree => (k / (k + eta), 1.0 / (k + eta)),
    };
    for &i in dropped {
        weights[i] *= dropped_factor;
    }
    new_weight
}

fn accumulate(base: f64, eta: f64, weights: &[f64], outputs: &[Array1<f64>], n: usize) -> Array1<f64> {
    let mut margin = Array1::from_elem(n, base);
    for (w, out) in weights.iter().zip(outputs) {
        margin.scaled_add(eta * w, out);
    }
    margin
}

/// Elastic net coordinate step, mirroring the penalised Newton update
fn coordinate_delta(sum_grad: f64, sum_hess: f64, w: f64, alpha: f64, lambda: f64) -> f64 {
    if sum_hess < 1e-5 {
        return 0.0;
    }
    let g = sum_grad + lambda * w;
    let h = sum_hess + lambda;
    if w - g / h >= 0.0 {
        (-(g + alpha) / h).max(-w)
    } else {
        (-(g - alpha) / h).min(-w)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Model {
    Trees { trees: Vec<Tree>, weights: Vec<f64> },
    Linear { bias: f64, weights: Vec<f64> },
}

/// A trained binary classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booster {
    params: BoosterParams,
    base_score: f64,
    n_features: usize,
    model: Model,
}

impl Booster {
    /// Train without a validation set
    pub fn train(
        params: &BoosterParams,
        x: &Array2<f64>,
        y: &Array1<f64>,
        num_boost_round: usize,
        seed: u64,
    ) -> Result<Self> {
        Self::fit(params, x, y, None, num_boost_round, seed, &mut |_, _| Ok(()))
    }

    /// Train while scoring `eval` after every round.
    ///
    /// `on_round(round, auc)` sees the validation ROC-AUC; an error from it
    /// stops training and is returned unchanged.
    pub fn train_with_eval<F>(
        params: &BoosterParams,
        x: &Array2<f64>,
        y: &Array1<f64>,
        eval: EvalSet<'_>,
        num_boost_round: usize,
        seed: u64,
        mut on_round: F,
    ) -> Result<Self>
    where
        F: FnMut(usize, f64) -> Result<()>,
    {
        Self::fit(params, x, y, Some(eval), num_boost_round, seed, &mut on_round)
    }

    fn fit(
        params: &BoosterParams,
        x: &Array2<f64>,
        y: &Array1<f64>,
        eval: Option<EvalSet<'_>>,
        num_boost_round: usize,
        seed: u64,
        on_round: &mut dyn FnMut(usize, f64) -> Result<()>,
    ) -> Result<Self> {
        params.validate()?;
        check_training_data(x, y)?;
        if let Some(e) = &eval {
            if e.x.ncols() != x.ncols() || e.x.nrows() != e.y.len() {
                return Err(CensusError::Data(format!(
                    "eval set has shape {:?} with {} labels, expected {} columns",
                    e.x.dim(),
                    e.y.len(),
                    x.ncols()
                )));
            }
        }

        // Base score in log-odds space
        let p = y.mean().unwrap_or(0.5).clamp(1e-7, 1.0 - 1e-7);
        let base_score = (p / (1.0 - p)).ln();

        let model = match params {
            BoosterParams::GbTree(tree) => {
                fit_trees(tree, None, base_score, x, y, eval, num_boost_round, seed, on_round)?
            }
            BoosterParams::Dart { tree, dart } => fit_trees(
                tree,
                Some(dart),
                base_score,
                x,
                y,
                eval,
                num_boost_round,
                seed,
                on_round,
            )?,
            BoosterParams::GbLinear(linear) => {
                fit_linear(linear, base_score, x, y, eval, num_boost_round, on_round)?
            }
        };

        Ok(Self {
            params: params.clone(),
            base_score,
            n_features: x.ncols(),
            model,
        })
    }

    pub fn params(&self) -> &BoosterParams {
        &self.params
    }

    pub fn booster_name(&self) -> &'static str {
        self.params.booster_name()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Boosting rounds held by the model; zero for a linear model
    pub fn n_trees(&self) -> usize {
        match &self.model {
            Model::Trees { trees, .. } => trees.len(),
            Model::Linear { .. } => 0,
        }
    }

    /// Raw scores in log-odds space
    pub fn predict_margin(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(CensusError::Data(format!(
                "model expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        let margin: Array1<f64> = match &self.model {
            Model::Trees { trees, weights } => {
                let eta = tree_eta(&self.params);
                x.rows()
                    .into_iter()
                    .map(|row| {
                        self.base_score
                            + trees
                                .iter()
                                .zip(weights)
                                .map(|(t, w)| eta * w * t.predict(row))
                                .sum::<f64>()
                    })
                    .collect()
            }
            Model::Linear { bias, weights } => {
                x.dot(&Array1::from(weights.clone())) + *bias
            }
        };
        Ok(margin)
    }

    /// Positive-class probabilities
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_margin(x)?.mapv(sigmoid))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_object(path, self)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load_object(path)
    }
}

fn tree_eta(params: &BoosterParams) -> f64 {
    match params {
        BoosterParams::GbTree(t) | BoosterParams::Dart { tree: t, .. } => t.eta,
        BoosterParams::GbLinear(l) => l.eta,
    }
}

fn check_training_data(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(CensusError::Data("cannot train on an empty matrix".to_string()));
    }
    if x.nrows() != y.len() {
        return Err(CensusError::Data(format!(
            "{} rows but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    if y.iter().any(|&v| v != 0.0 && v != 1.0) {
        return Err(CensusError::Data("labels must be 0 or 1".to_string()));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(CensusError::Data("features must be finite".to_string()));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn fit_trees(
    tree_params: &TreeParams,
    dart: Option<&DartParams>,
    base_score: f64,
    x: &Array2<f64>,
    y: &Array1<f64>,
    eval: Option<EvalSet<'_>>,
    num_boost_round: usize,
    seed: u64,
    on_round: &mut dyn FnMut(usize, f64) -> Result<()>,
) -> Result<Model> {
    let n = x.nrows();
    let eta = tree_params.eta;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

    let mut trees: Vec<Tree> = Vec::with_capacity(num_boost_round);
    let mut weights: Vec<f64> = Vec::with_capacity(num_boost_round);
    let mut train_out: Vec<Array1<f64>> = Vec::with_capacity(num_boost_round);
    let mut eval_out: Vec<Array1<f64>> = Vec::new();
    let mut margin = Array1::from_elem(n, base_score);
    let mut eval_margin = eval.map(|e| Array1::from_elem(e.x.nrows(), base_score));

    for round in 0..num_boost_round {
        let dropped = match dart {
            Some(d) => select_dropped(d, &weights, &mut rng),
            None => Vec::new(),
        };

        let mut working = margin.clone();
        for &i in &dropped {
            working.scaled_add(-eta * weights[i], &train_out[i]);
        }

        let (grad, hess) = logistic_gradients(&working, y);
        let tree = build_tree(x, &grad, &hess, tree_params);
        train_out.push(tree.predict_rows(x));
        if let Some(e) = &eval {
            eval_out.push(tree.predict_rows(e.x));
        }

        let new_weight = match dart {
            Some(d) => normalize_dropped(d.normalize_type, eta, &mut weights, &dropped),
            None => 1.0,
        };
        weights.push(new_weight);
        debug!(round, leaves = tree.n_leaves(), dropped = dropped.len(), "Boosting round");
        trees.push(tree);

        if dropped.is_empty() {
            margin.scaled_add(eta * new_weight, &train_out[round]);
            if let Some(m) = eval_margin.as_mut() {
                m.scaled_add(eta * new_weight, &eval_out[round]);
            }
        } else {
            margin = accumulate(base_score, eta, &weights, &train_out, n);
            if let (Some(e), Some(m)) = (&eval, eval_margin.as_mut()) {
                *m = accumulate(base_score, eta, &weights, &eval_out, e.x.nrows());
            }
        }

        if let (Some(e), Some(m)) = (&eval, &eval_margin) {
            let auc = roc_auc_score(e.y, &m.mapv(sigmoid))?;
            on_round(round, auc)?;
        }
    }

    Ok(Model::Trees { trees, weights })
}

fn fit_linear(
    params: &LinearParams,
    base_score: f64,
    x: &Array2<f64>,
    y: &Array1<f64>,
    eval: Option<EvalSet<'_>>,
    num_boost_round: usize,
    on_round: &mut dyn FnMut(usize, f64) -> Result<()>,
) -> Result<Model> {
    let n = x.nrows();
    // Penalties scale with the number of rows
    let alpha = params.alpha * n as f64;
    let lambda = params.lambda * n as f64;

    let mut bias = base_score;
    let mut w = Array1::<f64>::zeros(x.ncols());

    for round in 0..num_boost_round {
        let margin = x.dot(&w) + bias;
        let (mut grad, hess) = logistic_gradients(&margin, y);

        let h_sum = hess.sum();
        if h_sum > 1e-5 {
            let db = params.eta * (-grad.sum() / h_sum);
            bias += db;
            grad.scaled_add(db, &hess);
        }

        for j in 0..x.ncols() {
            let col = x.column(j);
            let sum_grad: f64 = grad.iter().zip(col.iter()).map(|(g, v)| g * v).sum();
            let sum_hess: f64 = hess.iter().zip(col.iter()).map(|(h, v)| h * v * v).sum();
            let dw = params.eta * coordinate_delta(sum_grad, sum_hess, w[j], alpha, lambda);
            if dw == 0.0 {
                continue;
            }
            w[j] += dw;
            grad.scaled_add(dw, &(&hess * &col));
        }

        if let Some(e) = &eval {
            let proba = (e.x.dot(&w) + bias).mapv(sigmoid);
            let auc = roc_auc_score(e.y, &proba)?;
            on_round(round, auc)?;
        }
    }

    Ok(Model::Linear {
        bias,
        weights: w.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two informative features, one noise feature
    fn toy_data(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut x = Array2::zeros((n, 3));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let a: f64 = rng.gen_range(-1.0..1.0);
            let b: f64 = rng.gen_range(-1.0..1.0);
            x[[i, 0]] = a;
            x[[i, 1]] = b;
            x[[i, 2]] = rng.gen_range(-1.0..1.0);
            y[i] = if a + 0.5 * b + rng.gen_range(-0.3..0.3) > 0.0 { 1.0 } else { 0.0 };
        }
        (x, y)
    }

    fn all_families() -> Vec<BoosterParams> {
        let tree = TreeParams {
            max_depth: 3,
            ..TreeParams::default()
        };
        vec![
            BoosterParams::GbTree(tree.clone()),
            BoosterParams::GbLinear(LinearParams {
                lambda: 1e-4,
                alpha: 1e-4,
                ..LinearParams::default()
            }),
            BoosterParams::Dart {
                tree,
                dart: DartParams {
                    rate_drop: 0.2,
                    ..DartParams::default()
                },
            },
        ]
    }

    #[test]
    fn test_every_family_learns() {
        let (x, y) = toy_data(300, 1);
        let (xv, yv) = toy_data(200, 2);
        for params in all_families() {
            let model = Booster::train(&params, &x, &y, 20, 42).unwrap();
            let proba = model.predict_proba(&xv).unwrap();
            assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
            let auc = roc_auc_score(&yv, &proba).unwrap();
            assert!(auc > 0.85, "{} auc {}", params.booster_name(), auc);
        }
    }

    #[test]
    fn test_eval_callback_sees_every_round() {
        let (x, y) = toy_data(200, 3);
        let (xv, yv) = toy_data(100, 4);
        let mut rounds = Vec::new();
        Booster::train_with_eval(
            &BoosterParams::default(),
            &x,
            &y,
            EvalSet { x: &xv, y: &yv },
            8,
            42,
            |round, auc| {
                assert!((0.0..=1.0).contains(&auc));
                rounds.push(round);
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(rounds, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_callback_error_stops_training() {
        let (x, y) = toy_data(100, 5);
        let err = Booster::train_with_eval(
            &BoosterParams::default(),
            &x,
            &y,
            EvalSet { x: &x, y: &y },
            10,
            42,
            |round, _| {
                if round == 3 {
                    Err(CensusError::TrialPruned { step: round })
                } else {
                    Ok(())
                }
            },
        )
        .unwrap_err();
        assert!(err.is_pruned());
    }

    #[test]
    fn test_training_is_deterministic() {
        let (x, y) = toy_data(150, 6);
        let params = &all_families()[2];
        let a = Booster::train(params, &x, &y, 10, 7).unwrap();
        let b = Booster::train(params, &x, &y, 10, 7).unwrap();
        assert_eq!(a.predict_margin(&x).unwrap(), b.predict_margin(&x).unwrap());
    }

    #[test]
    fn test_depth_one_is_stump() {
        let (x, y) = toy_data(100, 8);
        let params = BoosterParams::GbTree(TreeParams {
            max_depth: 1,
            ..TreeParams::default()
        });
        let model = Booster::train(&params, &x, &y, 3, 0).unwrap();
        match &model.model {
            Model::Trees { trees, .. } => assert!(trees.iter().all(|t| t.n_leaves() <= 2)),
            Model::Linear { .. } => panic!("expected trees"),
        }
    }

    #[test]
    fn test_lossguide_respects_leaf_budget() {
        let (x, y) = toy_data(200, 9);
        let params = BoosterParams::GbTree(TreeParams {
            max_depth: 6,
            grow_policy: GrowPolicy::Lossguide,
            max_leaves: 4,
            ..TreeParams::default()
        });
        let model = Booster::train(&params, &x, &y, 3, 0).unwrap();
        match &model.model {
            Model::Trees { trees, .. } => assert!(trees.iter().all(|t| t.n_leaves() <= 4)),
            Model::Linear { .. } => panic!("expected trees"),
        }
    }

    #[test]
    fn test_dart_normalization() {
        let mut weights = vec![1.0, 1.0, 1.0];
        let new = normalize_dropped(NormalizeType::Tree, 0.5, &mut weights, &[0, 2]);
        assert!((weights[0] - 2.0 / 2.5).abs() < 1e-12);
        assert_eq!(weights[1], 1.0);
        assert!((new - 1.0 / 2.5).abs() < 1e-12);

        let mut weights = vec![1.0, 1.0];
        let new = normalize_dropped(NormalizeType::Forest, 0.5, &mut weights, &[1]);
        assert!((weights[1] - 1.0 / 1.5).abs() < 1e-12);
        assert!((new - 1.0 / 1.5).abs() < 1e-12);

        assert_eq!(normalize_dropped(NormalizeType::Tree, 0.5, &mut weights, &[]), 1.0);
    }

    #[test]
    fn test_feature_count_checked() {
        let (x, y) = toy_data(50, 10);
        let model = Booster::train(&BoosterParams::default(), &x, &y, 2, 0).unwrap();
        assert!(model.predict_proba(&Array2::zeros((2, 5))).is_err());
    }

    #[test]
    fn test_save_load() {
        let (x, y) = toy_data(80, 11);
        let model = Booster::train(&all_families()[1], &x, &y, 5, 0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        model.save(&path).unwrap();
        let loaded = Booster::load(&path).unwrap();
        assert_eq!(loaded.booster_name(), "gblinear");
        assert_eq!(loaded.predict_proba(&x).unwrap(), model.predict_proba(&x).unwrap());
    }
}
