//! Weight of Evidence encoding
//!
//! Each category is replaced by the log ratio of its share of positive rows to
//! its share of negative rows, with additive smoothing:
//!
//! ```text
//! woe(c) = ln( ((pos_c + r) / (P + 2r)) / ((neg_c + r) / (N + 2r)) )
//! ```
//!
//! `P` and `N` are the positive and negative totals in the training target and
//! `r` is the regularization (1.0 by default). The table is learned once from
//! training labels and only read afterwards.
//!
//! Transform policy: categories never seen during fit, and nulls, encode to
//! `0.0` (no evidence either way). A target passed to `transform` is checked
//! for length and otherwise ignored, so train and test rows are always encoded
//! from the same table.

use super::FeatureTransform;
use crate::data::TARGET_COLUMN;
use crate::error::{CensusError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value for categories absent from the fitted table
pub const UNSEEN_WOE: f64 = 0.0;

/// Weight of Evidence encoder for nominal string columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WoeEncoder {
    regularization: f64,
    /// Fitted column order with the per-category statistic
    tables: Vec<(String, BTreeMap<String, f64>)>,
    is_fitted: bool,
}

impl Default for WoeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WoeEncoder {
    pub fn new() -> Self {
        Self {
            regularization: 1.0,
            tables: Vec::new(),
            is_fitted: false,
        }
    }

    /// Set the additive smoothing applied to every category count
    pub fn with_regularization(mut self, regularization: f64) -> Self {
        self.regularization = regularization;
        self
    }

    /// Fitted statistic table of a column
    pub fn table(&self, column: &str) -> Option<&BTreeMap<String, f64>> {
        self.tables
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, table)| table)
    }

    fn binary_labels(target: &Series) -> Result<Vec<bool>> {
        let cast = target
            .cast(&DataType::Float64)
            .map_err(|_| CensusError::encoding(TARGET_COLUMN, "target must be numeric"))?;
        cast.f64()?
            .into_iter()
            .map(|v| match v {
                Some(x) if x == 1.0 => Ok(true),
                Some(x) if x == 0.0 => Ok(false),
                Some(x) => Err(CensusError::encoding(
                    TARGET_COLUMN,
                    format!("target must be binary, found {}", x),
                )),
                None => Err(CensusError::encoding(TARGET_COLUMN, "null target value")),
            })
            .collect()
    }

    fn fit_column(&self, series: &Series, labels: &[bool]) -> Result<BTreeMap<String, f64>> {
        let ca = series
            .str()
            .map_err(|_| CensusError::encoding(series.name().as_str(), "expected string values"))?;

        let total_pos = labels.iter().filter(|&&l| l).count() as f64;
        let total_neg = labels.len() as f64 - total_pos;

        let mut counts: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
        for (value, &label) in ca.into_iter().zip(labels) {
            if let Some(category) = value {
                let entry = counts.entry(category).or_insert((0.0, 0.0));
                if label {
                    entry.0 += 1.0;
                } else {
                    entry.1 += 1.0;
                }
            }
        }

        let r = self.regularization;
        Ok(counts
            .into_iter()
            .map(|(category, (pos, neg))| {
                let pos_share = (pos + r) / (total_pos + 2.0 * r);
                let neg_share = (neg + r) / (total_neg + 2.0 * r);
                (category.to_string(), (pos_share / neg_share).ln())
            })
            .collect())
    }
}

impl FeatureTransform for WoeEncoder {
    fn fit(&mut self, features: &DataFrame, target: Option<&Series>) -> Result<&mut Self> {
        let target = target.ok_or_else(|| {
            CensusError::encoding(TARGET_COLUMN, "target is required to fit the WOE encoder")
        })?;
        if target.len() != features.height() {
            return Err(CensusError::encoding(
                TARGET_COLUMN,
                format!(
                    "target has {} rows, features have {}",
                    target.len(),
                    features.height()
                ),
            ));
        }

        let labels = Self::binary_labels(target)?;
        self.tables = features
            .get_columns()
            .iter()
            .map(|c| {
                let table = self.fit_column(c.as_materialized_series(), &labels)?;
                Ok((c.name().to_string(), table))
            })
            .collect::<Result<Vec<_>>>()?;
        self.is_fitted = true;

        tracing::debug!(columns = self.tables.len(), "Fitted WOE tables");
        Ok(self)
    }

    fn transform(&self, features: &DataFrame, target: Option<&Series>) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(CensusError::NotFitted("WoeEncoder".to_string()));
        }
        if let Some(target) = target {
            if target.len() != features.height() {
                return Err(CensusError::encoding(
                    TARGET_COLUMN,
                    "target length does not match features",
                ));
            }
        }

        let columns = self
            .tables
            .iter()
            .map(|(name, table)| {
                let ca = features
                    .column(name)
                    .map_err(|_| CensusError::encoding(name, "column is missing"))?
                    .str()
                    .map_err(|_| CensusError::encoding(name, "expected string values"))?;
                let encoded: Float64Chunked = ca
                    .into_iter()
                    .map(|v| {
                        Some(
                            v.and_then(|c| table.get(c).copied())
                                .unwrap_or(UNSEEN_WOE),
                        )
                    })
                    .collect();
                Ok(Column::from(
                    encoded.with_name(name.as_str().into()).into_series(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DataFrame::new(columns)?)
    }

    fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}
