//! Prediction for individual census records

use crate::data::{to_feature_matrix, FEATURE_COLUMNS};
use crate::error::{CensusError, Result};
use crate::preprocessing::{drop_identifier, impute_sentinel, strip_whitespace, DataPreprocessor};
use crate::registry::{fetch_latest_params, ModelRegistry};
use crate::training::Booster;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// One person's attributes, named as in the census tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CensusRecord {
    pub age: i64,
    pub workclass: String,
    pub education: String,
    pub education_num: i64,
    pub marital_status: String,
    pub occupation: String,
    pub relationship: String,
    pub race: String,
    pub sex: String,
    pub capital_gain: i64,
    pub capital_loss: i64,
    pub hours_per_week: i64,
    pub native_country: String,
}

impl CensusRecord {
    /// One-row table with the 13 feature columns
    pub fn create_dataframe(&self) -> Result<DataFrame> {
        records_to_dataframe(std::slice::from_ref(self))
    }
}

/// Table of records in feature-column order
pub fn records_to_dataframe(records: &[CensusRecord]) -> Result<DataFrame> {
    let ints = |f: fn(&CensusRecord) -> i64| records.iter().map(f).collect::<Vec<i64>>();
    let strs = |f: fn(&CensusRecord) -> &String| {
        records.iter().map(|r| f(r).clone()).collect::<Vec<String>>()
    };

    let df = df! {
        "age" => ints(|r| r.age),
        "workclass" => strs(|r| &r.workclass),
        "education" => strs(|r| &r.education),
        "education-num" => ints(|r| r.education_num),
        "marital-status" => strs(|r| &r.marital_status),
        "occupation" => strs(|r| &r.occupation),
        "relationship" => strs(|r| &r.relationship),
        "race" => strs(|r| &r.race),
        "sex" => strs(|r| &r.sex),
        "capital-gain" => ints(|r| r.capital_gain),
        "capital-loss" => ints(|r| r.capital_loss),
        "hours-per-week" => ints(|r| r.hours_per_week),
        "native-country" => strs(|r| &r.native_country),
    }?;
    debug_assert_eq!(df.width(), FEATURE_COLUMNS.len());
    Ok(df)
}

/// Model output for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Probability of earning more than 50K
    pub probability: f64,
    pub label: i64,
}

impl Prediction {
    fn from_probability(probability: f64) -> Self {
        Self {
            probability,
            label: i64::from(probability >= 0.5),
        }
    }
}

/// Body returned to callers of the prediction service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionResponse {
    Success { prediction: Prediction },
    Failure { error: bool, message: String },
}

impl PredictionResponse {
    /// Wrap a prediction outcome; failures carry only the error message
    pub fn from_result(result: Result<Prediction>) -> Self {
        match result {
            Ok(prediction) => PredictionResponse::Success { prediction },
            Err(e) => {
                warn!(error = %e, "Prediction failed");
                PredictionResponse::Failure {
                    error: true,
                    message: e.to_string(),
                }
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PredictionResponse::Failure { .. })
    }
}

/// Fitted preprocessor plus trained model
pub struct Predictor {
    preprocessor: DataPreprocessor,
    model: Booster,
}

impl Predictor {
    pub fn new(preprocessor: DataPreprocessor, model: Booster) -> Result<Self> {
        if !preprocessor.is_fitted() {
            return Err(CensusError::NotFitted("DataPreprocessor".to_string()));
        }
        if preprocessor.feature_names().len() != model.n_features() {
            return Err(CensusError::Schema(format!(
                "preprocessor emits {} features but the model expects {}",
                preprocessor.feature_names().len(),
                model.n_features()
            )));
        }
        Ok(Self {
            preprocessor,
            model,
        })
    }

    /// Load the saved preprocessor and the model named by the latest run params
    pub fn from_artifacts(
        preprocessor_path: impl AsRef<Path>,
        registry: &dyn ModelRegistry,
        run_config_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let preprocessor = DataPreprocessor::load(preprocessor_path)?;
        let run_params = fetch_latest_params(run_config_dir)?;
        let model = registry.load(&run_params.model_uri)?;
        info!(uri = %run_params.model_uri, booster = model.booster_name(), "Predictor ready");
        Self::new(preprocessor, model)
    }

    pub fn model(&self) -> &Booster {
        &self.model
    }

    /// Clean, encode and score a table of raw feature columns
    pub fn predict_frame(&self, features: DataFrame) -> Result<Vec<Prediction>> {
        let features = drop_identifier(features)
            .and_then(strip_whitespace)
            .and_then(impute_sentinel)?;
        let encoded = self.preprocessor.transform(&features)?;
        let x = to_feature_matrix(&encoded)?;
        let proba = self.model.predict_proba(&x)?;
        Ok(proba.iter().map(|&p| Prediction::from_probability(p)).collect())
    }

    pub fn predict(&self, record: &CensusRecord) -> Result<Prediction> {
        self.predict_frame(record.create_dataframe()?)?
            .pop()
            .ok_or_else(|| CensusError::Data("no prediction produced".to_string()))
    }

    /// Predict and wrap the outcome in a response body
    pub fn respond(&self, record: &CensusRecord) -> PredictionResponse {
        PredictionResponse::from_result(self.predict(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CensusRecord {
        CensusRecord {
            age: 39,
            workclass: " ?".into(),
            education: "Bachelors".into(),
            education_num: 13,
            marital_status: "Never-married".into(),
            occupation: "Adm-clerical".into(),
            relationship: "Not-in-family".into(),
            race: "White".into(),
            sex: "Male".into(),
            capital_gain: 2174,
            capital_loss: 0,
            hours_per_week: 40,
            native_country: "United-States".into(),
        }
    }

    #[test]
    fn test_record_uses_dashed_names() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["education-num"], 13);
        assert_eq!(json["native-country"], "United-States");

        let df = record().create_dataframe().unwrap();
        assert_eq!(df.shape(), (1, 13));
        let names: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, FEATURE_COLUMNS.to_vec());
    }

    #[test]
    fn test_error_payload_shape() {
        let response =
            PredictionResponse::from_result(Err(CensusError::NotFitted("DataPreprocessor".into())));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], true);
        assert_eq!(json["message"], "DataPreprocessor is not fitted");
        assert!(response.is_error());
    }

    #[test]
    fn test_success_payload_shape() {
        let response = PredictionResponse::from_result(Ok(Prediction::from_probability(0.8)));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["prediction"]["label"], 1);
        assert_eq!(json["prediction"]["probability"], 0.8);
    }

    #[test]
    fn test_unfitted_preprocessor_rejected() {
        use crate::training::BoosterParams;
        use ndarray::{array, Array2};

        let x = Array2::zeros((2, 16));
        let y = array![0.0, 1.0];
        let model = Booster::train(&BoosterParams::default(), &x, &y, 1, 0).unwrap();
        assert!(matches!(
            Predictor::new(DataPreprocessor::census(), model),
            Err(CensusError::NotFitted(_))
        ));
    }
}
