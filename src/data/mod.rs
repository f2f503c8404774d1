//! Census table schema, parquet I/O and frame helpers

mod frame;
mod io;
mod schema;

pub use frame::{split_features_target, target_vector, to_feature_matrix};
pub use io::{read_parquet, stage_parquet, write_parquet};
pub use schema::{
    column_kind, validate_raw_schema, validate_transformed_schema, ColumnKind, FEATURE_COLUMNS,
    IDENTIFIER_COLUMN, NUMERIC_INPUTS, RAW_COLUMNS, TARGET_COLUMN, TRANSFORMED_FEATURE_COUNT,
};
