//! Conversions between polars frames and ndarray model inputs

use super::schema::TARGET_COLUMN;
use crate::error::{CensusError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;

/// Separate a labeled table into the feature block and the target series
pub fn split_features_target(df: &DataFrame) -> Result<(DataFrame, Series)> {
    let target = df
        .column(TARGET_COLUMN)
        .map_err(|_| CensusError::Schema(format!("missing target column '{}'", TARGET_COLUMN)))?
        .as_materialized_series()
        .clone();
    let features = df.drop(TARGET_COLUMN)?;
    Ok((features, target))
}

/// Dense row-major matrix of every column of `df`, cast to f64.
///
/// Null cells are rejected.
pub fn to_feature_matrix(df: &DataFrame) -> Result<Array2<f64>> {
    let (n_rows, n_cols) = df.shape();
    let mut matrix = Array2::<f64>::zeros((n_rows, n_cols));

    for (j, column) in df.get_columns().iter().enumerate() {
        let values = column_to_f64(column.as_materialized_series())?;
        matrix.column_mut(j).assign(&values);
    }
    Ok(matrix)
}

/// Binary target as f64 labels
pub fn target_vector(target: &Series) -> Result<Array1<f64>> {
    let values = column_to_f64(target)?;
    if values.iter().any(|&v| v != 0.0 && v != 1.0) {
        return Err(CensusError::Data(format!(
            "target '{}' must contain only 0 and 1",
            target.name()
        )));
    }
    Ok(values)
}

fn column_to_f64(series: &Series) -> Result<Array1<f64>> {
    let cast = series.cast(&DataType::Float64)?;
    let ca = cast.f64()?;
    ca.into_iter()
        .map(|v| {
            v.ok_or_else(|| CensusError::Data(format!("null value in column '{}'", series.name())))
        })
        .collect::<Result<Vec<f64>>>()
        .map(Array1::from)
}
