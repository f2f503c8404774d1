//! Data preprocessing module
//!
//! Provides the census feature encoders:
//! - Cleaning transforms (whitespace, sentinel imputation, target recoding,
//!   capital bucketing)
//! - Standard scaling
//! - One-hot encoding
//! - Weight of Evidence encoding
//! - The column-group pipeline combining them

pub mod cleaning;
mod encoder;
mod pipeline;
mod scaler;
mod woe;

pub use cleaning::{
    bucketize_capital, drop_identifier, impute_sentinel, recode_target, strip_whitespace,
};
pub use encoder::OneHotEncoder;
pub use pipeline::{ColumnGroup, DataPreprocessor, GroupStep};
pub use scaler::StandardScaler;
pub use woe::{WoeEncoder, UNSEEN_WOE};

use crate::error::Result;
use polars::prelude::*;

/// Fit/transform capability shared by the stateful encoders.
///
/// `target` is only consulted by supervised encoders during `fit`.
pub trait FeatureTransform {
    fn fit(&mut self, features: &DataFrame, target: Option<&Series>) -> Result<&mut Self>;

    fn transform(&self, features: &DataFrame, target: Option<&Series>) -> Result<DataFrame>;

    fn is_fitted(&self) -> bool;

    fn fit_transform(&mut self, features: &DataFrame, target: Option<&Series>) -> Result<DataFrame> {
        self.fit(features, target)?;
        self.transform(features, target)
    }
}
