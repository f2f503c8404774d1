//! Model trainer: feature store in, best booster out

use super::booster::Booster;
use super::metrics::{accuracy_score, roc_auc_score};
use super::search::ModelSearch;
use crate::config::{PathsConfig, SearchConfig};
use crate::data::{split_features_target, target_vector, to_feature_matrix};
use crate::error::Result;
use crate::optimizer::{ParameterValue, StopSignal, StudySummary};
use crate::transformation::FeatureStore;
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Result of [`ModelTrainer::initiate_model_training`]
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub best_model: Booster,
    pub best_params: BTreeMap<String, ParameterValue>,
    /// ROC-AUC of the best model on the held-out test table
    pub metric: f64,
    /// Where the model was written, when saving was requested
    pub model_path: Option<PathBuf>,
    pub summary: StudySummary,
}

/// Feature and target arrays for both sides of the feature store
pub struct Datasets {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
}

pub struct ModelTrainer {
    paths: PathsConfig,
    search: SearchConfig,
    stop: StopSignal,
}

impl ModelTrainer {
    pub fn new(paths: PathsConfig, search: SearchConfig) -> Self {
        Self {
            paths,
            search,
            stop: StopSignal::new(),
        }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Read the feature store and split each side into features and target
    pub fn create_feature_target_datasets(&self) -> Result<Datasets> {
        let (train, test) = FeatureStore::new(&self.paths).load()?;
        let (train_x, train_y) = split_features_target(&train)?;
        let (test_x, test_y) = split_features_target(&test)?;
        Ok(Datasets {
            x_train: to_feature_matrix(&train_x)?,
            x_test: to_feature_matrix(&test_x)?,
            y_train: target_vector(&train_y)?,
            y_test: target_vector(&test_y)?,
        })
    }

    /// Search for the best booster, score it on the test table and optionally
    /// save it to the configured model path
    pub fn initiate_model_training(&self, save_model: bool) -> Result<TrainingOutcome> {
        let start = Instant::now();
        let data = self.create_feature_target_datasets()?;

        let outcome = ModelSearch::new(self.search.clone())?
            .with_stop_signal(self.stop.clone())
            .run(&data.x_train, &data.y_train)?;

        let proba = outcome.best_model.predict_proba(&data.x_test)?;
        let metric = roc_auc_score(&data.y_test, &proba)?;
        info!(
            roc_auc = metric,
            accuracy = accuracy_score(&data.y_test, &proba, 0.5),
            cv_auc = outcome.best_value,
            booster = outcome.best_model.booster_name(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Best model evaluated on test table"
        );

        let model_path = if save_model {
            outcome.best_model.save(&self.paths.model)?;
            info!(path = %self.paths.model.display(), "Model saved");
            Some(self.paths.model.clone())
        } else {
            None
        };

        Ok(TrainingOutcome {
            best_model: outcome.best_model,
            best_params: outcome.best_params,
            metric,
            model_path,
            summary: outcome.summary,
        })
    }
}
