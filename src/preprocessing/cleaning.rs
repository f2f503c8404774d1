//! Stateless cleaning transforms applied to raw census tables

use crate::data::{IDENTIFIER_COLUMN, TARGET_COLUMN};
use crate::error::{CensusError, Result};
use polars::prelude::*;

/// Missing-value marker used by the census extract
pub const SENTINEL: &str = "?";

/// Training-set modes substituted for the sentinel
pub const SENTINEL_FALLBACKS: [(&str, &str); 3] = [
    ("workclass", "Private"),
    ("occupation", "Prof-specialty"),
    ("native-country", "United-States"),
];

/// Label mapped to class 0; every other label maps to 1
pub const NEGATIVE_LABEL: &str = "<=50K";

/// Capital columns and the flag column/labels each is bucketized into
pub const CAPITAL_BUCKETS: [(&str, &str, &str, &str); 2] = [
    ("capital-gain", "capital-gain-trns", "cap_gain", "no_cap_gain"),
    ("capital-loss", "capital-loss-trns", "cap_loss", "no_cap_loss"),
];

/// Trim leading and trailing whitespace in every string column
pub fn strip_whitespace(mut df: DataFrame) -> Result<DataFrame> {
    let replacements: Vec<Series> = df
        .get_columns()
        .iter()
        .filter(|c| c.dtype() == &DataType::String)
        .map(|c| {
            let ca = c.str()?;
            let trimmed: StringChunked = ca.into_iter().map(|v| v.map(str::trim)).collect();
            Ok(trimmed.with_name(c.name().clone()).into_series())
        })
        .collect::<Result<Vec<_>>>()?;

    for series in replacements {
        df.with_column(series)?;
    }
    Ok(df)
}

/// Replace the `"?"` sentinel with the per-column fallback.
///
/// Columns that are absent are skipped.
pub fn impute_sentinel(mut df: DataFrame) -> Result<DataFrame> {
    for (name, fallback) in SENTINEL_FALLBACKS {
        let Ok(column) = df.column(name) else {
            tracing::debug!(column = name, "Sentinel imputation skipped, column absent");
            continue;
        };
        let ca = column
            .str()
            .map_err(|_| CensusError::encoding(name, "expected string values"))?;
        let imputed: StringChunked = ca
            .into_iter()
            .map(|v| v.map(|s| if s == SENTINEL { fallback } else { s }))
            .collect();
        let series = imputed.with_name(name.into()).into_series();
        df.with_column(series)?;
    }
    Ok(df)
}

/// Map the target labels to `Int64` 0/1.
///
/// String labels: `"<=50K"` becomes 0, anything else 1. An integer target that
/// already holds only 0 and 1 is passed through.
pub fn recode_target(mut df: DataFrame) -> Result<DataFrame> {
    let column = df
        .column(TARGET_COLUMN)
        .map_err(|_| CensusError::encoding(TARGET_COLUMN, "column is missing"))?;

    let recoded: Int64Chunked = match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| match v {
                Some(label) => Ok(Some(if label == NEGATIVE_LABEL { 0 } else { 1 })),
                None => Err(CensusError::encoding(TARGET_COLUMN, "null label")),
            })
            .collect::<Result<Int64Chunked>>()?,
        dtype if dtype.is_integer() => {
            let cast = column.as_materialized_series().cast(&DataType::Int64)?;
            let ca = cast.i64()?;
            if ca.into_iter().any(|v| !matches!(v, Some(0) | Some(1))) {
                return Err(CensusError::encoding(
                    TARGET_COLUMN,
                    "integer labels must be 0 or 1",
                ));
            }
            ca.clone()
        }
        dtype => {
            return Err(CensusError::encoding(
                TARGET_COLUMN,
                format!("unsupported label dtype {}", dtype),
            ))
        }
    };

    df.with_column(recoded.with_name(TARGET_COLUMN.into()).into_series())?;
    Ok(df)
}

/// Replace `capital-gain`/`capital-loss` with categorical flags
/// (`cap_gain` when the value is positive, else `no_cap_gain`; same for loss).
pub fn bucketize_capital(mut df: DataFrame) -> Result<DataFrame> {
    for (source, target, positive, zero) in CAPITAL_BUCKETS {
        let column = df
            .column(source)
            .map_err(|_| CensusError::encoding(source, "column is missing"))?;
        let values = column
            .as_materialized_series()
            .cast(&DataType::Float64)
            .map_err(|_| CensusError::encoding(source, "expected numeric values"))?;

        let flags: StringChunked = values
            .f64()?
            .into_iter()
            .map(|v| match v {
                Some(x) => Ok(Some(if x > 0.0 { positive } else { zero })),
                None => Err(CensusError::encoding(source, "null amount")),
            })
            .collect::<Result<StringChunked>>()?;

        df = df.drop(source)?;
        df.with_column(flags.with_name(target.into()).into_series())?;
    }
    Ok(df)
}

/// Remove the `fnlwgt` identifier if present
pub fn drop_identifier(df: DataFrame) -> Result<DataFrame> {
    if df.column(IDENTIFIER_COLUMN).is_ok() {
        Ok(df.drop(IDENTIFIER_COLUMN)?)
    } else {
        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_whitespace_text_only() {
        let df = df! {
            "sex" => [" Male", "Female  "],
            "age" => [25i64, 30],
        }
        .unwrap();

        let out = strip_whitespace(df).unwrap();
        let sex: Vec<&str> = out.column("sex").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(sex, vec!["Male", "Female"]);
        assert_eq!(out.column("age").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn test_impute_sentinel() {
        let df = df! {
            "workclass" => ["?", "State-gov"],
            "occupation" => ["Sales", "?"],
            "native-country" => ["?", "?"],
        }
        .unwrap();

        let out = impute_sentinel(df).unwrap();
        for (name, _) in SENTINEL_FALLBACKS {
            let ca = out.column(name).unwrap().str().unwrap().clone();
            assert!(ca.into_iter().all(|v| v != Some(SENTINEL)));
        }
        let wc = out.column("workclass").unwrap().str().unwrap().get(0);
        assert_eq!(wc, Some("Private"));
    }

    #[test]
    fn test_impute_sentinel_absent_column_is_noop() {
        let df = df! { "workclass" => ["?"] }.unwrap();
        let out = impute_sentinel(df).unwrap();
        assert_eq!(out.width(), 1);
    }

    #[test]
    fn test_recode_target() {
        let df = df! { "target_class" => ["<=50K", ">50K", "<=50K."] }.unwrap();
        let out = recode_target(df).unwrap();
        let target = out.column(TARGET_COLUMN).unwrap();
        assert_eq!(target.dtype(), &DataType::Int64);
        let values: Vec<i64> = target.i64().unwrap().into_no_null_iter().collect();
        assert_eq!(values, vec![0, 1, 1]);
    }

    #[test]
    fn test_recode_target_missing_column() {
        let df = df! { "age" => [1i64] }.unwrap();
        assert!(matches!(
            recode_target(df),
            Err(CensusError::Encoding { .. })
        ));
    }

    #[test]
    fn test_bucketize_capital() {
        let df = df! {
            "capital-gain" => [0i64, 2174],
            "capital-loss" => [5000i64, 0],
        }
        .unwrap();

        let out = bucketize_capital(df).unwrap();
        assert!(out.column("capital-gain").is_err());
        let gain: Vec<&str> = out
            .column("capital-gain-trns")
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        let loss: Vec<&str> = out
            .column("capital-loss-trns")
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(gain, vec!["no_cap_gain", "cap_gain"]);
        assert_eq!(loss, vec!["cap_loss", "no_cap_loss"]);
    }

    #[test]
    fn test_drop_identifier_optional() {
        let df = df! { "fnlwgt" => [1i64], "age" => [2i64] }.unwrap();
        let out = drop_identifier(df).unwrap();
        assert_eq!(out.width(), 1);
        let again = drop_identifier(out).unwrap();
        assert_eq!(again.width(), 1);
    }
}
