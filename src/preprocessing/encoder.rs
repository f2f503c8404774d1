//! One-hot encoding with a vocabulary fixed at fit time

use super::FeatureTransform;
use crate::error::{CensusError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One-hot encoder.
///
/// Each input column expands to one `f64` indicator column per category,
/// named `<column>_<category>`, categories in sorted order. Values outside
/// the vocabulary (and nulls) produce an all-zero row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OneHotEncoder {
    /// Vocabularies that are not learned from data
    preset: BTreeMap<String, Vec<String>>,
    /// Fitted column order with its vocabulary
    categories: Vec<(String, Vec<String>)>,
    is_fitted: bool,
}

impl OneHotEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the vocabulary of `column` instead of learning it
    pub fn with_categories(mut self, column: impl Into<String>, categories: &[&str]) -> Self {
        let mut cats: Vec<String> = categories.iter().map(|c| c.to_string()).collect();
        cats.sort();
        cats.dedup();
        self.preset.insert(column.into(), cats);
        self
    }

    /// Fitted vocabulary of a column
    pub fn categories(&self, column: &str) -> Option<&[String]> {
        self.categories
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, cats)| cats.as_slice())
    }

    /// Output column names in order
    pub fn feature_names(&self) -> Vec<String> {
        self.categories
            .iter()
            .flat_map(|(col, cats)| cats.iter().map(move |c| format!("{}_{}", col, c)))
            .collect()
    }

    fn learn_vocabulary(series: &Series) -> Result<Vec<String>> {
        let ca = series
            .str()
            .map_err(|_| CensusError::encoding(series.name().as_str(), "expected string values"))?;
        let vocab: BTreeSet<&str> = ca.into_iter().flatten().collect();
        if vocab.is_empty() {
            return Err(CensusError::encoding(
                series.name().as_str(),
                "no categories observed during fit",
            ));
        }
        Ok(vocab.into_iter().map(String::from).collect())
    }
}

impl FeatureTransform for OneHotEncoder {
    fn fit(&mut self, features: &DataFrame, _target: Option<&Series>) -> Result<&mut Self> {
        let mut categories = Vec::with_capacity(features.width());
        for column in features.get_columns() {
            let name = column.name().to_string();
            let vocab = match self.preset.get(&name) {
                Some(cats) => {
                    column
                        .str()
                        .map_err(|_| CensusError::encoding(&name, "expected string values"))?;
                    cats.clone()
                }
                None => Self::learn_vocabulary(column.as_materialized_series())?,
            };
            categories.push((name, vocab));
        }

        self.categories = categories;
        self.is_fitted = true;
        Ok(self)
    }

    fn transform(&self, features: &DataFrame, _target: Option<&Series>) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(CensusError::NotFitted("OneHotEncoder".to_string()));
        }

        let mut columns = Vec::new();
        for (name, vocab) in &self.categories {
            let ca = features
                .column(name)
                .map_err(|_| CensusError::encoding(name, "column is missing"))?
                .str()
                .map_err(|_| CensusError::encoding(name, "expected string values"))?;

            let unseen = ca
                .into_iter()
                .flatten()
                .filter(|v| vocab.binary_search_by(|c| c.as_str().cmp(v)).is_err())
                .count();
            if unseen > 0 {
                tracing::debug!(column = %name, unseen, "Unseen categories encoded as all-zero rows");
            }

            for category in vocab {
                let indicator: Float64Chunked = ca
                    .into_iter()
                    .map(|v| Some(if v == Some(category.as_str()) { 1.0 } else { 0.0 }))
                    .collect();
                let col_name = format!("{}_{}", name, category);
                columns.push(Column::from(
                    indicator.with_name(col_name.into()).into_series(),
                ));
            }
        }

        Ok(DataFrame::new(columns)?)
    }

    fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}
