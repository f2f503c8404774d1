//! Column-group preprocessing pipeline

use super::{
    cleaning::bucketize_capital, encoder::OneHotEncoder, scaler::StandardScaler, woe::WoeEncoder,
    FeatureTransform,
};
use crate::artifacts::{load_object, save_object};
use crate::data::FEATURE_COLUMNS;
use crate::error::{CensusError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;

/// One step of a group's sub-pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GroupStep {
    Standardize(StandardScaler),
    /// Stateless capital-gain/loss flagging
    Bucketize,
    OneHot(OneHotEncoder),
    Woe(WoeEncoder),
}

impl GroupStep {
    fn fit(&mut self, features: &DataFrame, target: Option<&Series>) -> Result<()> {
        match self {
            GroupStep::Standardize(s) => s.fit(features, target).map(|_| ()),
            GroupStep::Bucketize => Ok(()),
            GroupStep::OneHot(e) => e.fit(features, target).map(|_| ()),
            GroupStep::Woe(e) => e.fit(features, target).map(|_| ()),
        }
    }

    fn transform(&self, features: &DataFrame, target: Option<&Series>) -> Result<DataFrame> {
        match self {
            GroupStep::Standardize(s) => s.transform(features, target),
            GroupStep::Bucketize => bucketize_capital(features.clone()),
            GroupStep::OneHot(e) => e.transform(features, target),
            GroupStep::Woe(e) => e.transform(features, target),
        }
    }

    fn is_fitted(&self) -> bool {
        match self {
            GroupStep::Standardize(s) => s.is_fitted(),
            GroupStep::Bucketize => true,
            GroupStep::OneHot(e) => e.is_fitted(),
            GroupStep::Woe(e) => e.is_fitted(),
        }
    }
}

/// A named, disjoint subset of input columns routed through its own steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnGroup {
    pub name: String,
    pub columns: Vec<String>,
    pub steps: Vec<GroupStep>,
}

impl ColumnGroup {
    pub fn new(name: impl Into<String>, columns: &[&str], steps: Vec<GroupStep>) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            steps,
        }
    }

    fn select(&self, features: &DataFrame) -> Result<DataFrame> {
        for column in &self.columns {
            if features.column(column).is_err() {
                return Err(CensusError::encoding(
                    column,
                    format!("column is missing from input to group '{}'", self.name),
                ));
            }
        }
        Ok(features.select(self.columns.iter().map(String::as_str))?)
    }

    /// Fit each step on the previous step's output; returns the fitted output
    fn fit_transform(&mut self, features: &DataFrame, target: Option<&Series>) -> Result<DataFrame> {
        let mut current = self.select(features)?;
        for step in &mut self.steps {
            step.fit(&current, target)?;
            current = step.transform(&current, None)?;
        }
        self.prefixed(current)
    }

    fn transform(&self, features: &DataFrame) -> Result<DataFrame> {
        let mut current = self.select(features)?;
        for step in &self.steps {
            current = step.transform(&current, None)?;
        }
        self.prefixed(current)
    }

    /// `<group>__<column>` naming, cast to f64
    fn prefixed(&self, mut df: DataFrame) -> Result<DataFrame> {
        let columns = df
            .get_columns()
            .iter()
            .map(|c| {
                let name = format!("{}__{}", self.name, c.name());
                let values = c.as_materialized_series().cast(&DataType::Float64)?;
                Ok(Column::from(values.with_name(name.into())))
            })
            .collect::<Result<Vec<_>>>()?;
        df = DataFrame::new(columns)?;
        Ok(df)
    }

    fn is_fitted(&self) -> bool {
        self.steps.iter().all(GroupStep::is_fitted)
    }
}

/// Composite transformer over the four census column groups.
///
/// Output column order is group order, each group's own order preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPreprocessor {
    groups: Vec<ColumnGroup>,
    feature_names: Vec<String>,
    is_fitted: bool,
    /// Seconds spent in the last fit
    fit_time: Option<f64>,
}

impl Default for DataPreprocessor {
    fn default() -> Self {
        Self::census()
    }
}

impl DataPreprocessor {
    /// Build from explicit groups, which must partition the 13 input columns
    pub fn new(groups: Vec<ColumnGroup>) -> Result<Self> {
        validate_partition(&groups)?;
        Ok(Self {
            groups,
            feature_names: Vec::new(),
            is_fitted: false,
            fit_time: None,
        })
    }

    /// The census layout: standardized numerics, one-hot sex, bucketized and
    /// one-hot capital flags, WOE-encoded nominals
    pub fn census() -> Self {
        let groups = vec![
            ColumnGroup::new(
                "num_pipeline",
                &["age", "education-num", "hours-per-week"],
                vec![GroupStep::Standardize(StandardScaler::new())],
            ),
            ColumnGroup::new(
                "ohe_sex_pipeline",
                &["sex"],
                vec![GroupStep::OneHot(
                    OneHotEncoder::new().with_categories("sex", &["Female", "Male"]),
                )],
            ),
            ColumnGroup::new(
                "ohe_cap_pipeline",
                &["capital-gain", "capital-loss"],
                vec![
                    GroupStep::Bucketize,
                    GroupStep::OneHot(
                        OneHotEncoder::new()
                            .with_categories("capital-gain-trns", &["cap_gain", "no_cap_gain"])
                            .with_categories("capital-loss-trns", &["cap_loss", "no_cap_loss"]),
                    ),
                ],
            ),
            ColumnGroup::new(
                "woe_pipeline",
                &[
                    "workclass",
                    "education",
                    "marital-status",
                    "occupation",
                    "relationship",
                    "race",
                    "native-country",
                ],
                vec![GroupStep::Woe(WoeEncoder::new())],
            ),
        ];

        Self {
            groups,
            feature_names: Vec::new(),
            is_fitted: false,
            fit_time: None,
        }
    }

    /// Fit every group on the training features and target, returning the
    /// encoded training block
    pub fn fit_transform(&mut self, features: &DataFrame, target: &Series) -> Result<DataFrame> {
        let start = Instant::now();

        let mut blocks = Vec::with_capacity(self.groups.len());
        for group in &mut self.groups {
            let block = group.fit_transform(features, Some(target))?;
            tracing::debug!(group = %group.name, width = block.width(), "Fitted column group");
            blocks.push(block);
        }
        let out = concat_blocks(blocks)?;

        self.feature_names = out
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        self.is_fitted = true;
        self.fit_time = Some(start.elapsed().as_secs_f64());

        tracing::info!(
            rows = out.height(),
            features = out.width(),
            "Preprocessor fitted"
        );
        Ok(out)
    }

    /// Apply the fitted groups
    pub fn transform(&self, features: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted() {
            return Err(CensusError::NotFitted("DataPreprocessor".to_string()));
        }
        let blocks = self
            .groups
            .iter()
            .map(|g| g.transform(features))
            .collect::<Result<Vec<_>>>()?;
        concat_blocks(blocks)
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted && self.groups.iter().all(ColumnGroup::is_fitted)
    }

    /// Encoded column names, available after fit
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn groups(&self) -> &[ColumnGroup] {
        &self.groups
    }

    pub fn fit_time(&self) -> Option<f64> {
        self.fit_time
    }

    /// Save the fitted preprocessor as a JSON artifact
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_object(path, self)
    }

    /// Load a preprocessor written by [`DataPreprocessor::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let preprocessor: Self = load_object(path)?;
        validate_partition(&preprocessor.groups)?;
        Ok(preprocessor)
    }
}

fn concat_blocks(blocks: Vec<DataFrame>) -> Result<DataFrame> {
    let columns: Vec<Column> = blocks
        .into_iter()
        .flat_map(|b| b.take_columns())
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Groups must cover the 13 input columns with no overlap and no omission
fn validate_partition(groups: &[ColumnGroup]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for group in groups {
        for column in &group.columns {
            if !FEATURE_COLUMNS.contains(&column.as_str()) {
                return Err(CensusError::Schema(format!(
                    "group '{}' references unknown column '{}'",
                    group.name, column
                )));
            }
            if !seen.insert(column.as_str()) {
                return Err(CensusError::Schema(format!(
                    "column '{}' is assigned to more than one group",
                    column
                )));
            }
        }
    }

    let missing: Vec<&str> = FEATURE_COLUMNS
        .iter()
        .copied()
        .filter(|c| !seen.contains(c))
        .collect();
    if !missing.is_empty() {
        return Err(CensusError::Schema(format!(
            "columns not assigned to any group: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TRANSFORMED_FEATURE_COUNT;

    fn features() -> DataFrame {
        df! {
            "age" => [39i64, 50, 38, 53],
            "workclass" => ["State-gov", "Self-emp-not-inc", "Private", "Private"],
            "education" => ["Bachelors", "Bachelors", "HS-grad", "11th"],
            "education-num" => [13i64, 13, 9, 7],
            "marital-status" => ["Never-married", "Married-civ-spouse", "Divorced", "Married-civ-spouse"],
            "occupation" => ["Adm-clerical", "Exec-managerial", "Handlers-cleaners", "Handlers-cleaners"],
            "relationship" => ["Not-in-family", "Husband", "Not-in-family", "Husband"],
            "race" => ["White", "White", "White", "Black"],
            "sex" => ["Male", "Male", "Female", "Male"],
            "capital-gain" => [2174i64, 0, 0, 0],
            "capital-loss" => [0i64, 0, 0, 1400],
            "hours-per-week" => [40i64, 13, 40, 40],
            "native-country" => ["United-States", "United-States", "United-States", "Cuba"],
        }
        .unwrap()
    }

    fn target() -> Series {
        Series::new("target_class".into(), [0i64, 1, 0, 1])
    }

    #[test]
    fn test_fit_transform_width_and_order() {
        let mut pre = DataPreprocessor::census();
        let out = pre.fit_transform(&features(), &target()).unwrap();

        assert_eq!(out.width(), TRANSFORMED_FEATURE_COUNT);
        assert_eq!(out.height(), 4);
        let names = pre.feature_names();
        assert_eq!(names[0], "num_pipeline__age");
        assert_eq!(names[3], "ohe_sex_pipeline__sex_Female");
        assert_eq!(names[5], "ohe_cap_pipeline__capital-gain-trns_cap_gain");
        assert_eq!(names[15], "woe_pipeline__native-country");
        assert!(out.get_columns().iter().all(|c| c.dtype() == &DataType::Float64));
    }

    #[test]
    fn test_transform_single_row() {
        let mut pre = DataPreprocessor::census();
        pre.fit_transform(&features(), &target()).unwrap();

        let row = features().slice(3, 1);
        let out = pre.transform(&row).unwrap();
        assert_eq!(out.shape(), (1, 16));
    }

    #[test]
    fn test_transform_before_fit() {
        let pre = DataPreprocessor::census();
        assert!(matches!(
            pre.transform(&features()),
            Err(CensusError::NotFitted(_))
        ));
    }

    #[test]
    fn test_overlapping_groups_rejected() {
        let mut groups = DataPreprocessor::census().groups().to_vec();
        groups[1].columns.push("age".to_string());
        assert!(matches!(
            DataPreprocessor::new(groups),
            Err(CensusError::Schema(_))
        ));
    }

    #[test]
    fn test_incomplete_groups_rejected() {
        let mut groups = DataPreprocessor::census().groups().to_vec();
        groups.pop();
        let err = DataPreprocessor::new(groups).unwrap_err();
        assert!(err.to_string().contains("workclass"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preprocessor.json");

        let mut pre = DataPreprocessor::census();
        let fitted = pre.fit_transform(&features(), &target()).unwrap();
        pre.save(&path).unwrap();

        let loaded = DataPreprocessor::load(&path).unwrap();
        let again = loaded.transform(&features()).unwrap();
        assert!(again.equals(&fitted));
    }
}
