//! Transformation orchestrator: raw train/test tables in, encoded tables out

use crate::artifacts::{commit_all, stage_object, StagedFile};
use crate::config::PathsConfig;
use crate::data::{
    read_parquet, split_features_target, stage_parquet, validate_raw_schema,
    validate_transformed_schema, TARGET_COLUMN,
};
use crate::error::{CensusError, Result, TransformStage};
use crate::preprocessing::{
    drop_identifier, impute_sentinel, recode_target, strip_whitespace, DataPreprocessor,
};
use polars::prelude::*;
use std::path::PathBuf;
use std::time::Instant;

/// Result of transforming a train/test pair
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub train: DataFrame,
    pub test: DataFrame,
    pub preprocessor: DataPreprocessor,
}

/// Paths written by [`DataTransformation::initiate`]
#[derive(Debug, Clone)]
pub struct TransformationArtifacts {
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub preprocessor_path: PathBuf,
}

/// Full cleaning sequence applied independently to each raw table:
/// identifier drop, whitespace strip, sentinel imputation, target recode
pub fn clean_table(df: DataFrame) -> Result<DataFrame> {
    let df = drop_identifier(df)
        .map_err(|e| CensusError::transformation(TransformStage::DropIdentifier, e))?;
    strip_whitespace(df)
        .and_then(impute_sentinel)
        .and_then(recode_target)
        .map_err(|e| CensusError::transformation(TransformStage::Clean, e))
}

/// Clean both tables, fit the preprocessor on train only, encode both sides
/// and reattach each side's target. Row order is preserved.
pub fn transform_tables(train: DataFrame, test: DataFrame) -> Result<TransformOutput> {
    let start = Instant::now();

    for table in [&train, &test] {
        validate_raw_schema(table).map_err(|e| CensusError::transformation(TransformStage::Load, e))?;
    }

    let train = clean_table(train)?;
    let test = clean_table(test)?;

    let (train_x, train_y) = split_features_target(&train)
        .map_err(|e| CensusError::transformation(TransformStage::Split, e))?;
    let (test_x, test_y) = split_features_target(&test)
        .map_err(|e| CensusError::transformation(TransformStage::Split, e))?;

    let mut preprocessor = DataPreprocessor::census();
    let train_features = preprocessor
        .fit_transform(&train_x, &train_y)
        .map_err(|e| CensusError::transformation(TransformStage::Fit, e))?;
    let test_features = preprocessor
        .transform(&test_x)
        .map_err(|e| CensusError::transformation(TransformStage::Transform, e))?;

    let train = reassemble(train_features, train_y)
        .map_err(|e| CensusError::transformation(TransformStage::Reassemble, e))?;
    let test = reassemble(test_features, test_y)
        .map_err(|e| CensusError::transformation(TransformStage::Reassemble, e))?;

    tracing::info!(
        train_rows = train.height(),
        test_rows = test.height(),
        width = train.width(),
        elapsed_secs = start.elapsed().as_secs_f64(),
        "Transformed train and test tables"
    );

    Ok(TransformOutput {
        train,
        test,
        preprocessor,
    })
}

fn reassemble(features: DataFrame, target: Series) -> Result<DataFrame> {
    let target = target.with_name(TARGET_COLUMN.into());
    let out = features.hstack(&[target.into_column()])?;
    validate_transformed_schema(&out)?;
    Ok(out)
}

/// Writes transformed tables to the feature store
pub struct FeatureStore {
    train_path: PathBuf,
    test_path: PathBuf,
}

impl FeatureStore {
    pub fn new(paths: &PathsConfig) -> Self {
        Self {
            train_path: paths.xform_train.clone(),
            test_path: paths.xform_test.clone(),
        }
    }

    /// Persist both tables; returns (train path, test path)
    pub fn create(&self, train: &mut DataFrame, test: &mut DataFrame) -> Result<(PathBuf, PathBuf)> {
        commit_all(self.stage(train, test)?)?;
        tracing::info!(
            train = %self.train_path.display(),
            test = %self.test_path.display(),
            "Feature store created"
        );
        Ok((self.train_path.clone(), self.test_path.clone()))
    }

    /// Write both tables to temp files without replacing the current ones
    pub fn stage(&self, train: &mut DataFrame, test: &mut DataFrame) -> Result<Vec<StagedFile>> {
        Ok(vec![
            stage_parquet(train, &self.train_path)?,
            stage_parquet(test, &self.test_path)?,
        ])
    }

    /// Read both transformed tables back
    pub fn load(&self) -> Result<(DataFrame, DataFrame)> {
        let train = read_parquet(&self.train_path)?;
        let test = read_parquet(&self.test_path)?;
        validate_transformed_schema(&train)?;
        validate_transformed_schema(&test)?;
        Ok((train, test))
    }
}

/// Reads raw tables, transforms them, persists the preprocessor and feature store
pub struct DataTransformation {
    paths: PathsConfig,
}

impl DataTransformation {
    pub fn new(paths: PathsConfig) -> Self {
        Self { paths }
    }

    /// Run the whole transformation from configured raw paths.
    ///
    /// Nothing is written unless every stage succeeds.
    pub fn initiate(&self) -> Result<TransformationArtifacts> {
        let train = read_parquet(&self.paths.train_data)
            .map_err(|e| CensusError::transformation(TransformStage::Load, e))?;
        let test = read_parquet(&self.paths.test_data)
            .map_err(|e| CensusError::transformation(TransformStage::Load, e))?;

        let TransformOutput {
            mut train,
            mut test,
            preprocessor,
        } = transform_tables(train, test)?;

        self.persist(&preprocessor, &mut train, &mut test)
            .map_err(|e| CensusError::transformation(TransformStage::Persist, e))?;
        tracing::info!(
            preprocessor = %self.paths.preprocessor.display(),
            train = %self.paths.xform_train.display(),
            test = %self.paths.xform_test.display(),
            "Preprocessor and feature store written"
        );

        Ok(TransformationArtifacts {
            train_path: self.paths.xform_train.clone(),
            test_path: self.paths.xform_test.clone(),
            preprocessor_path: self.paths.preprocessor.clone(),
        })
    }

    /// Stage the preprocessor and both tables, then move all three into place
    fn persist(
        &self,
        preprocessor: &DataPreprocessor,
        train: &mut DataFrame,
        test: &mut DataFrame,
    ) -> Result<()> {
        let mut staged = vec![stage_object(&self.paths.preprocessor, preprocessor)?];
        staged.extend(FeatureStore::new(&self.paths).stage(train, test)?);
        commit_all(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::write_parquet;

    fn raw(labels: [&str; 4]) -> DataFrame {
        df! {
            "age" => [39i64, 50, 38, 53],
            "workclass" => [" State-gov", " ?", " Private", " Private"],
            "fnlwgt" => [77516i64, 83311, 215646, 234721],
            "education" => [" Bachelors", " Bachelors", " HS-grad", " 11th"],
            "education-num" => [13i64, 13, 9, 7],
            "marital-status" => [" Never-married", " Married-civ-spouse", " Divorced", " Married-civ-spouse"],
            "occupation" => [" Adm-clerical", " Exec-managerial", " ?", " Handlers-cleaners"],
            "relationship" => [" Not-in-family", " Husband", " Not-in-family", " Husband"],
            "race" => [" White", " White", " White", " Black"],
            "sex" => [" Male", " Male", " Female", " Male"],
            "capital-gain" => [2174i64, 0, 0, 0],
            "capital-loss" => [0i64, 0, 0, 0],
            "hours-per-week" => [40i64, 13, 40, 40],
            "native-country" => [" United-States", " United-States", " ?", " Cuba"],
            "target_class" => labels,
        }
        .unwrap()
    }

    #[test]
    fn test_transform_tables_shapes() {
        let train = raw([" <=50K", " >50K", " <=50K", " >50K"]);
        let test = raw([" >50K", " <=50K", " <=50K", " <=50K"]);

        let out = transform_tables(train, test).unwrap();
        assert_eq!(out.train.shape(), (4, 17));
        assert_eq!(out.test.shape(), (4, 17));
        assert!(out.preprocessor.is_fitted());

        let target: Vec<i64> = out.test.column(TARGET_COLUMN).unwrap().i64().unwrap().into_no_null_iter().collect();
        assert_eq!(target, vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_failure_is_wrapped_with_stage() {
        let train = raw([" <=50K", " >50K", " <=50K", " >50K"]).drop("race").unwrap();
        let test = raw([" <=50K", " >50K", " <=50K", " >50K"]);

        match transform_tables(train, test) {
            Err(CensusError::Transformation { stage, .. }) => assert_eq!(stage, TransformStage::Load),
            other => panic!("expected transformation error, got {other:?}"),
        }
    }

    #[test]
    fn test_initiate_writes_nothing_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::rooted_at(dir.path());

        let transformation = DataTransformation::new(paths.clone());
        assert!(transformation.initiate().is_err());
        assert!(!paths.preprocessor.exists());
        assert!(!paths.xform_train.exists());
    }

    #[test]
    fn test_failed_persist_leaves_no_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::rooted_at(dir.path());
        write_parquet(&mut raw([" <=50K", " >50K", " <=50K", " >50K"]), &paths.train_data).unwrap();
        write_parquet(&mut raw([" >50K", " <=50K", " <=50K", " <=50K"]), &paths.test_data).unwrap();
        // the test table cannot replace a non-empty directory
        std::fs::create_dir_all(paths.xform_test.join("occupied")).unwrap();

        match DataTransformation::new(paths.clone()).initiate() {
            Err(CensusError::Transformation { stage, .. }) => assert_eq!(stage, TransformStage::Persist),
            other => panic!("expected persist failure, got {other:?}"),
        }
        assert!(!paths.preprocessor.exists());
        assert!(!paths.xform_train.exists());
        assert!(paths.xform_test.is_dir());

        let leftovers: Vec<_> = std::fs::read_dir(paths.xform_train.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n != "xform_test.parquet")
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
    }

    #[test]
    fn test_rerun_replaces_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::rooted_at(dir.path());
        write_parquet(&mut raw([" <=50K", " >50K", " <=50K", " >50K"]), &paths.train_data).unwrap();
        write_parquet(&mut raw([" >50K", " <=50K", " <=50K", " <=50K"]), &paths.test_data).unwrap();

        let transformation = DataTransformation::new(paths.clone());
        transformation.initiate().unwrap();
        transformation.initiate().unwrap();

        let (train, _) = FeatureStore::new(&paths).load().unwrap();
        assert_eq!(train.shape(), (4, 17));
        assert!(DataPreprocessor::load(&paths.preprocessor).unwrap().is_fitted());
    }

    #[test]
    fn test_initiate_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::rooted_at(dir.path());
        write_parquet(&mut raw([" <=50K", " >50K", " <=50K", " >50K"]), &paths.train_data).unwrap();
        write_parquet(&mut raw([" >50K", " <=50K", " <=50K", " <=50K"]), &paths.test_data).unwrap();

        let artifacts = DataTransformation::new(paths.clone()).initiate().unwrap();
        assert!(artifacts.preprocessor_path.exists());

        let (train, test) = FeatureStore::new(&paths).load().unwrap();
        assert_eq!(train.width(), 17);
        assert_eq!(test.height(), 4);
    }
}
