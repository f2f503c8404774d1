//! Zero-mean / unit-variance feature scaling

use super::FeatureTransform;
use crate::error::{CensusError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Parameters for one fitted column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ScalerParams {
    column: String,
    mean: f64,
    scale: f64,
}

/// Standard scaler: (x - mean) / std, with the population std of the training data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    params: Vec<ScalerParams>,
    is_fitted: bool,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fitted (mean, scale) for a column
    pub fn params_for(&self, column: &str) -> Option<(f64, f64)> {
        self.params
            .iter()
            .find(|p| p.column == column)
            .map(|p| (p.mean, p.scale))
    }

    fn compute_params(series: &Series) -> Result<ScalerParams> {
        let cast = series
            .cast(&DataType::Float64)
            .map_err(|_| CensusError::encoding(series.name().as_str(), "expected numeric values"))?;
        let ca = cast.f64()?;
        if ca.null_count() > 0 {
            return Err(CensusError::encoding(series.name().as_str(), "null values"));
        }

        let mean = ca.mean().unwrap_or(0.0);
        let std = ca.std(0).unwrap_or(1.0);
        Ok(ScalerParams {
            column: series.name().to_string(),
            mean,
            scale: if std == 0.0 || !std.is_finite() { 1.0 } else { std },
        })
    }

    fn scale_series(series: &Series, params: &ScalerParams) -> Result<Series> {
        let cast = series
            .cast(&DataType::Float64)
            .map_err(|_| CensusError::encoding(&params.column, "expected numeric values"))?;
        let scaled: Float64Chunked = cast
            .f64()?
            .into_iter()
            .map(|opt| opt.map(|v| (v - params.mean) / params.scale))
            .collect();
        Ok(scaled.with_name(series.name().clone()).into_series())
    }
}

impl FeatureTransform for StandardScaler {
    fn fit(&mut self, features: &DataFrame, _target: Option<&Series>) -> Result<&mut Self> {
        self.params = features
            .get_columns()
            .iter()
            .map(|c| Self::compute_params(c.as_materialized_series()))
            .collect::<Result<Vec<_>>>()?;
        self.is_fitted = true;
        Ok(self)
    }

    fn transform(&self, features: &DataFrame, _target: Option<&Series>) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(CensusError::NotFitted("StandardScaler".to_string()));
        }

        let columns = self
            .params
            .iter()
            .map(|p| {
                let column = features
                    .column(&p.column)
                    .map_err(|_| CensusError::encoding(&p.column, "column is missing"))?;
                Self::scale_series(column.as_materialized_series(), p).map(Column::from)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DataFrame::new(columns)?)
    }

    fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_scaler() {
        let df = df! { "age" => [1i64, 2, 3, 4, 5] }.unwrap();

        let mut scaler = StandardScaler::new();
        scaler.fit(&df, None).unwrap();
        let result = scaler.transform(&df, None).unwrap();

        let col = result.column("age").unwrap().f64().unwrap();
        assert!(col.mean().unwrap().abs() < 1e-10);
        assert!((col.std(0).unwrap() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_uses_training_statistics() {
        let train = df! { "age" => [10.0f64, 20.0, 30.0] }.unwrap();
        let test = df! { "age" => [20.0f64] }.unwrap();

        let mut scaler = StandardScaler::new();
        scaler.fit(&train, None).unwrap();
        let out = scaler.transform(&test, None).unwrap();
        assert_eq!(out.column("age").unwrap().f64().unwrap().get(0), Some(0.0));
        assert_eq!(scaler.params_for("age").map(|p| p.0), Some(20.0));
    }

    #[test]
    fn test_constant_column() {
        let df = df! { "a" => [3.0f64, 3.0] }.unwrap();
        let mut scaler = StandardScaler::new();
        scaler.fit(&df, None).unwrap();
        let out = scaler.transform(&df, None).unwrap();
        assert_eq!(out.column("a").unwrap().f64().unwrap().get(1), Some(0.0));
    }

    #[test]
    fn test_transform_before_fit() {
        let df = df! { "a" => [1.0f64] }.unwrap();
        let scaler = StandardScaler::new();
        assert!(matches!(
            scaler.transform(&df, None),
            Err(CensusError::NotFitted(_))
        ));
    }
}
