//! Classification metrics

use crate::error::{CensusError, Result};
use ndarray::Array1;

/// Area under the ROC curve via the Mann-Whitney U statistic.
///
/// Tied scores receive their average rank. Fails when only one class is
/// present, since the curve is undefined.
pub fn roc_auc_score(y_true: &Array1<f64>, y_score: &Array1<f64>) -> Result<f64> {
    if y_true.len() != y_score.len() {
        return Err(CensusError::Metric(format!(
            "y_true has {} entries, y_score has {}",
            y_true.len(),
            y_score.len()
        )));
    }
    if y_score.iter().any(|s| s.is_nan()) {
        return Err(CensusError::Metric("scores contain NaN".to_string()));
    }

    let n_pos = y_true.iter().filter(|&&y| y == 1.0).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(CensusError::Metric(
            "only one class present in y_true, ROC AUC is undefined".to_string(),
        ));
    }

    let mut pairs: Vec<(f64, bool)> = y_score
        .iter()
        .zip(y_true.iter())
        .map(|(&s, &y)| (s, y == 1.0))
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let n = pairs.len();
    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j < n && pairs[j].0 == pairs[i].0 {
            j += 1;
        }
        // 1-based average rank of the tie block
        let avg_rank = (i + j + 1) as f64 / 2.0;
        rank_sum_pos += avg_rank * pairs[i..j].iter().filter(|p| p.1).count() as f64;
        i = j;
    }

    let n_pos = n_pos as f64;
    let u = rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0;
    Ok(u / (n_pos * n_neg as f64))
}

/// Fraction of thresholded predictions matching the labels
pub fn accuracy_score(y_true: &Array1<f64>, proba: &Array1<f64>, threshold: f64) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(proba.iter())
        .filter(|(&y, &p)| (p >= threshold) == (y == 1.0))
        .count();
    correct as f64 / y_true.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_ranking() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let s = array![0.1, 0.2, 0.8, 0.9];
        assert_eq!(roc_auc_score(&y, &s).unwrap(), 1.0);
    }

    #[test]
    fn test_reference_value() {
        // sklearn: roc_auc_score([0, 0, 1, 1], [0.1, 0.4, 0.35, 0.8]) == 0.75
        let y = array![0.0, 0.0, 1.0, 1.0];
        let s = array![0.1, 0.4, 0.35, 0.8];
        assert!((roc_auc_score(&y, &s).unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_ties_count_half() {
        let y = array![0.0, 1.0];
        let s = array![0.5, 0.5];
        assert_eq!(roc_auc_score(&y, &s).unwrap(), 0.5);
    }

    #[test]
    fn test_single_class_is_error() {
        let y = array![1.0, 1.0];
        let s = array![0.2, 0.3];
        assert!(matches!(roc_auc_score(&y, &s), Err(CensusError::Metric(_))));
    }

    #[test]
    fn test_accuracy() {
        let y = array![0.0, 1.0, 1.0, 0.0];
        let p = array![0.2, 0.7, 0.4, 0.1];
        assert_eq!(accuracy_score(&y, &p, 0.5), 0.75);
    }
}
