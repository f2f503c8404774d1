//! Stratified k-fold splitting

use crate::error::{CensusError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single train/validation split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Stratified K-Fold: every fold keeps the class proportions of `y`
#[derive(Debug, Clone)]
pub struct StratifiedKFold {
    n_splits: usize,
    shuffle: bool,
    random_state: Option<u64>,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: true,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Generate the splits.
    ///
    /// Every class must have at least `n_splits` members so each validation
    /// fold sees both labels.
    pub fn split(&self, y: &Array1<f64>) -> Result<Vec<CVSplit>> {
        if self.n_splits < 2 {
            return Err(CensusError::InvalidParameter {
                name: "n_splits".to_string(),
                value: self.n_splits.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }

        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &val) in y.iter().enumerate() {
            class_indices.entry(val.round() as i64).or_default().push(idx);
        }

        if let Some((class, members)) = class_indices
            .iter()
            .find(|(_, members)| members.len() < self.n_splits)
        {
            return Err(CensusError::Data(format!(
                "class {} has {} members, fewer than n_splits = {}",
                class,
                members.len(),
                self.n_splits
            )));
        }

        if self.shuffle {
            let mut rng = match self.random_state {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_entropy(),
            };
            for indices in class_indices.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Round-robin across folds, continuing the offset between classes so
        // fold sizes differ by at most one
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); self.n_splits];
        let mut offset = 0;
        for indices in class_indices.values() {
            for &idx in indices {
                folds[offset % self.n_splits].push(idx);
                offset += 1;
            }
        }

        let splits = (0..self.n_splits)
            .map(|fold_idx| {
                let mut test_indices = folds[fold_idx].clone();
                test_indices.sort_unstable();
                let mut train_indices: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                train_indices.sort_unstable();
                CVSplit {
                    train_indices,
                    test_indices,
                    fold_idx,
                }
            })
            .collect();

        Ok(splits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Array1<f64> {
        Array1::from_iter((0..50).map(|i| if i % 5 == 0 { 1.0 } else { 0.0 }))
    }

    #[test]
    fn test_folds_partition_rows() {
        let splits = StratifiedKFold::new(5).with_random_state(42).split(&labels()).unwrap();
        assert_eq!(splits.len(), 5);

        let mut all: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());

        for split in &splits {
            assert_eq!(split.train_indices.len() + split.test_indices.len(), 50);
            assert!(split.test_indices.iter().all(|i| !split.train_indices.contains(i)));
        }
    }

    #[test]
    fn test_class_balance_preserved() {
        let y = labels();
        let splits = StratifiedKFold::new(5).with_random_state(1).split(&y).unwrap();
        for split in &splits {
            let positives = split.test_indices.iter().filter(|&&i| y[i] == 1.0).count();
            assert_eq!(positives, 2);
            assert_eq!(split.test_indices.len(), 10);
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = StratifiedKFold::new(5).with_random_state(42).split(&labels()).unwrap();
        let b = StratifiedKFold::new(5).with_random_state(42).split(&labels()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_few_minority_rows() {
        let y = Array1::from(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(StratifiedKFold::new(5).split(&y).is_err());
    }

    #[test]
    fn test_single_split_rejected() {
        assert!(matches!(
            StratifiedKFold::new(1).split(&labels()),
            Err(CensusError::InvalidParameter { .. })
        ));
    }
}
