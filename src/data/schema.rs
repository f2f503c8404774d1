//! Fixed census schema

use crate::error::{CensusError, Result};
use polars::prelude::*;

/// Binary label column
pub const TARGET_COLUMN: &str = "target_class";

/// Sampling-weight identifier, dropped before encoding
pub const IDENTIFIER_COLUMN: &str = "fnlwgt";

/// The 13 input features, in raw-table order
pub const FEATURE_COLUMNS: [&str; 13] = [
    "age",
    "workclass",
    "education",
    "education-num",
    "marital-status",
    "occupation",
    "relationship",
    "race",
    "sex",
    "capital-gain",
    "capital-loss",
    "hours-per-week",
    "native-country",
];

/// Integer-typed inputs; every other feature is a string category
pub const NUMERIC_INPUTS: [&str; 5] = [
    "age",
    "education-num",
    "capital-gain",
    "capital-loss",
    "hours-per-week",
];

/// Columns of a raw ingested table
pub const RAW_COLUMNS: [&str; 15] = [
    "age",
    "workclass",
    "fnlwgt",
    "education",
    "education-num",
    "marital-status",
    "occupation",
    "relationship",
    "race",
    "sex",
    "capital-gain",
    "capital-loss",
    "hours-per-week",
    "native-country",
    "target_class",
];

/// Width of the encoded feature block
pub const TRANSFORMED_FEATURE_COUNT: usize = 16;

/// Semantic type of a raw feature column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Text,
}

/// Declared kind of a feature column, `None` for columns outside the schema
pub fn column_kind(name: &str) -> Option<ColumnKind> {
    if NUMERIC_INPUTS.contains(&name) {
        Some(ColumnKind::Integer)
    } else if FEATURE_COLUMNS.contains(&name) {
        Some(ColumnKind::Text)
    } else {
        None
    }
}

fn is_integer(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

fn is_numeric(dtype: &DataType) -> bool {
    is_integer(dtype) || matches!(dtype, DataType::Float32 | DataType::Float64)
}

/// Check a raw table: all 13 features with their declared kinds, plus the target.
///
/// Numeric inputs may be any numeric dtype (parquet round-trips can widen
/// them); text inputs must be strings. Nothing is coerced.
pub fn validate_raw_schema(df: &DataFrame) -> Result<()> {
    for name in FEATURE_COLUMNS {
        let column = df
            .column(name)
            .map_err(|_| CensusError::Schema(format!("missing feature column '{}'", name)))?;
        let dtype = column.dtype();
        let ok = match column_kind(name) {
            Some(ColumnKind::Integer) => is_numeric(dtype),
            Some(ColumnKind::Text) => matches!(dtype, DataType::String),
            None => true,
        };
        if !ok {
            return Err(CensusError::Schema(format!(
                "column '{}' has dtype {}, expected {:?}",
                name,
                dtype,
                column_kind(name)
            )));
        }
    }

    let target = df
        .column(TARGET_COLUMN)
        .map_err(|_| CensusError::Schema(format!("missing target column '{}'", TARGET_COLUMN)))?;
    if !(matches!(target.dtype(), DataType::String) || is_integer(target.dtype())) {
        return Err(CensusError::Schema(format!(
            "target column has dtype {}, expected string or integer",
            target.dtype()
        )));
    }
    Ok(())
}

/// Check an encoded table: 16 Float64 features followed by an integer target
pub fn validate_transformed_schema(df: &DataFrame) -> Result<()> {
    let expected = TRANSFORMED_FEATURE_COUNT + 1;
    if df.width() != expected {
        return Err(CensusError::Schema(format!(
            "expected {} columns, found {}",
            expected,
            df.width()
        )));
    }

    for column in df.get_columns() {
        if column.name().as_str() == TARGET_COLUMN {
            if !is_integer(column.dtype()) {
                return Err(CensusError::Schema(format!(
                    "target column has dtype {}, expected integer",
                    column.dtype()
                )));
            }
        } else if column.dtype() != &DataType::Float64 {
            return Err(CensusError::Schema(format!(
                "feature column '{}' has dtype {}, expected f64",
                column.name(),
                column.dtype()
            )));
        }
    }

    if df.column(TARGET_COLUMN).is_err() {
        return Err(CensusError::Schema(format!(
            "missing target column '{}'",
            TARGET_COLUMN
        )));
    }
    Ok(())
}
