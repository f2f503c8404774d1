//! Experiment tracking and model registry
//!
//! [`ModelRegistry`] is the collaborator the training and prediction paths
//! talk to. [`LocalRegistry`] keeps everything under one directory:
//!
//! ```text
//! model_db/
//!   index.json                   registered model versions
//!   models/<name>/v<version>.bin bincode model payloads
//!   runs/<run_id>/run.json       params and metrics of each run
//! ```
//!
//! Models are addressed by URIs of the form `models:/<name>/<version>`.
//! Run parameters for the latest registered model are kept as dated JSON
//! documents (`run_params_YYYYMMDD.json`) so the prediction side can find it.

use crate::artifacts::{load_object, save_object, write_atomic};
use crate::error::{CensusError, Result};
use crate::optimizer::ParameterValue;
use crate::training::Booster;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const URI_SCHEME: &str = "models:/";
const INDEX_FILE: &str = "index.json";

/// Tracking and registry operations used by the pipeline
pub trait ModelRegistry {
    /// Open a new run and return its id
    fn start_run(&mut self, run_name: &str) -> Result<String>;

    fn log_params(&mut self, run_id: &str, params: &BTreeMap<String, ParameterValue>) -> Result<()>;

    fn log_metric(&mut self, run_id: &str, key: &str, value: f64) -> Result<()>;

    /// Store `model` as the next version of `name`
    fn register(&mut self, run_id: &str, name: &str, model: &Booster) -> Result<RegisteredModel>;

    /// Load the model a URI points at
    fn load(&self, uri: &str) -> Result<Booster>;
}

/// Handle returned by [`ModelRegistry::register`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredModel {
    pub uri: String,
    pub name: String,
    pub version: u32,
    pub run_id: String,
}

/// Parsed `models:/<name>/<version>` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelUri {
    pub name: String,
    /// `None` means the latest version
    pub version: Option<u32>,
}

impl ModelUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let bad = |reason: &str| CensusError::Registry(format!("invalid model uri '{}': {}", uri, reason));
        let rest = uri
            .strip_prefix(URI_SCHEME)
            .ok_or_else(|| bad("expected models:/<name>/<version>"))?;
        let (name, version) = rest
            .split_once('/')
            .ok_or_else(|| bad("missing version"))?;
        if name.is_empty() {
            return Err(bad("empty model name"));
        }
        let version = match version {
            "latest" => None,
            v => Some(v.parse::<u32>().map_err(|_| bad("version is not a number"))?),
        };
        Ok(Self {
            name: name.to_string(),
            version,
        })
    }

    pub fn format(name: &str, version: u32) -> String {
        format!("{}{}/{}", URI_SCHEME, name, version)
    }
}

/// Index entry for one registered version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub version: u32,
    pub run_id: String,
    /// Payload path relative to the registry root
    pub path: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryIndex {
    models: BTreeMap<String, Vec<ModelEntry>>,
}

/// Params and metrics recorded for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub run_name: String,
    pub started_at: DateTime<Utc>,
    pub params: BTreeMap<String, ParameterValue>,
    pub metrics: BTreeMap<String, f64>,
}

/// Filesystem-backed registry
pub struct LocalRegistry {
    root: PathBuf,
    index: RegistryIndex,
}

impl LocalRegistry {
    /// Create or open registry at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            CensusError::Registry(format!("cannot create registry at {}: {}", root.display(), e))
        })?;

        let index_path = root.join(INDEX_FILE);
        let index = if index_path.exists() {
            load_object(&index_path)?
        } else {
            RegistryIndex::default()
        };

        Ok(Self { root, index })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_path(&self, run_id: &str) -> PathBuf {
        self.root.join("runs").join(run_id).join("run.json")
    }

    pub fn run(&self, run_id: &str) -> Result<RunRecord> {
        let path = self.run_path(run_id);
        if !path.exists() {
            return Err(CensusError::Registry(format!("unknown run '{}'", run_id)));
        }
        load_object(path)
    }

    fn update_run<F: FnOnce(&mut RunRecord)>(&self, run_id: &str, update: F) -> Result<()> {
        let mut record = self.run(run_id)?;
        update(&mut record);
        save_object(self.run_path(run_id), &record)
    }

    /// Versions registered under `name`, oldest first
    pub fn versions(&self, name: &str) -> &[ModelEntry] {
        self.index.models.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn latest_version(&self, name: &str) -> Option<&ModelEntry> {
        self.versions(name).iter().max_by_key(|e| e.version)
    }

    pub fn list_models(&self) -> Vec<String> {
        self.index.models.keys().cloned().collect()
    }
}

impl ModelRegistry for LocalRegistry {
    fn start_run(&mut self, run_name: &str) -> Result<String> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let record = RunRecord {
            run_id: run_id.clone(),
            run_name: run_name.to_string(),
            started_at: Utc::now(),
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
        };
        save_object(self.run_path(&run_id), &record)?;
        info!(run_id = %run_id, run_name, "Run started");
        Ok(run_id)
    }

    fn log_params(&mut self, run_id: &str, params: &BTreeMap<String, ParameterValue>) -> Result<()> {
        self.update_run(run_id, |r| {
            r.params.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())))
        })
    }

    fn log_metric(&mut self, run_id: &str, key: &str, value: f64) -> Result<()> {
        self.update_run(run_id, |r| {
            r.metrics.insert(key.to_string(), value);
        })
    }

    fn register(&mut self, run_id: &str, name: &str, model: &Booster) -> Result<RegisteredModel> {
        if name.is_empty() || name.contains('/') {
            return Err(CensusError::Registry(format!("invalid model name '{}'", name)));
        }
        // Registering requires an existing run
        self.run(run_id)?;

        let version = self.latest_version(name).map_or(1, |e| e.version + 1);
        let relative = format!("models/{}/v{}.bin", name, version);
        let bytes = bincode::serialize(model)?;
        write_atomic(&self.root.join(&relative), |file| {
            let mut writer = BufWriter::new(file);
            writer.write_all(&bytes)?;
            writer.flush()?;
            Ok(())
        })?;

        // The in-memory index only changes once the new one is on disk
        let mut index = self.index.clone();
        index.models.entry(name.to_string()).or_default().push(ModelEntry {
            name: name.to_string(),
            version,
            run_id: run_id.to_string(),
            path: relative,
            registered_at: Utc::now(),
        });
        save_object(self.root.join(INDEX_FILE), &index)?;
        self.index = index;

        let uri = ModelUri::format(name, version);
        info!(uri = %uri, run_id, "Model registered");
        Ok(RegisteredModel {
            uri,
            name: name.to_string(),
            version,
            run_id: run_id.to_string(),
        })
    }

    fn load(&self, uri: &str) -> Result<Booster> {
        let parsed = ModelUri::parse(uri)?;
        let entry = match parsed.version {
            Some(v) => self.versions(&parsed.name).iter().find(|e| e.version == v),
            None => self.latest_version(&parsed.name),
        }
        .ok_or_else(|| CensusError::Registry(format!("no model registered at '{}'", uri)))?;

        let bytes = fs::read(self.root.join(&entry.path))?;
        let model = bincode::deserialize(&bytes)?;
        debug!(uri, path = %entry.path, "Model loaded");
        Ok(model)
    }
}

/// Pointer to the latest registered model, persisted for the prediction side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    pub model_uri: String,
    pub run_id: String,
    pub model_name: String,
    pub version: u32,
}

impl From<&RegisteredModel> for RunParams {
    fn from(m: &RegisteredModel) -> Self {
        Self {
            model_uri: m.uri.clone(),
            run_id: m.run_id.clone(),
            model_name: m.name.clone(),
            version: m.version,
        }
    }
}

const RUN_PARAMS_PREFIX: &str = "run_params_";
const RUN_PARAMS_DATE: &str = "%Y%m%d";

/// Write `run_params_<today>.json` into `dir`
pub fn save_run_params(dir: impl AsRef<Path>, params: &RunParams) -> Result<PathBuf> {
    save_run_params_on(dir, params, Local::now().date_naive())
}

/// Write the run-params document stamped with `date`
pub fn save_run_params_on(dir: impl AsRef<Path>, params: &RunParams, date: NaiveDate) -> Result<PathBuf> {
    let path = dir.as_ref().join(format!(
        "{}{}.json",
        RUN_PARAMS_PREFIX,
        date.format(RUN_PARAMS_DATE)
    ));
    save_object(&path, params)?;
    info!(path = %path.display(), uri = %params.model_uri, "Run params saved");
    Ok(path)
}

/// Path of the run-params document with the newest date stamp.
///
/// Files not named `run_params_YYYYMMDD.json` are ignored.
pub fn load_latest_run_params(dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| {
        CensusError::Registry(format!("cannot read run config dir {}: {}", dir.display(), e))
    })?;

    let mut latest: Option<(NaiveDate, PathBuf)> = None;
    for entry in entries {
        let path = entry?.path();
        let Some(date) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(RUN_PARAMS_PREFIX))
            .and_then(|n| n.strip_suffix(".json"))
            .and_then(|d| NaiveDate::parse_from_str(d, RUN_PARAMS_DATE).ok())
        else {
            debug!(path = %path.display(), "Skipping non run-params file");
            continue;
        };
        if latest.as_ref().map_or(true, |(d, _)| date > *d) {
            latest = Some((date, path));
        }
    }

    latest
        .map(|(_, path)| path)
        .ok_or_else(|| CensusError::Registry(format!("no run params found in {}", dir.display())))
}

/// Read the latest run-params document
pub fn fetch_latest_params(dir: impl AsRef<Path>) -> Result<RunParams> {
    load_object(load_latest_run_params(dir)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::BoosterParams;
    use ndarray::{array, Array2};

    fn model() -> Booster {
        let x = Array2::from_shape_vec((6, 1), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let params = BoosterParams::GbLinear(Default::default());
        Booster::train(&params, &x, &y, 3, 0).unwrap()
    }

    #[test]
    fn test_uri_parsing() {
        assert_eq!(
            ModelUri::parse("models:/training_model/3").unwrap(),
            ModelUri {
                name: "training_model".into(),
                version: Some(3)
            }
        );
        assert_eq!(ModelUri::parse("models:/m/latest").unwrap().version, None);
        assert!(ModelUri::parse("runs:/abc/model").is_err());
        assert!(ModelUri::parse("models:/m/x").is_err());
    }

    #[test]
    fn test_register_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = LocalRegistry::open(dir.path()).unwrap();
        let run_id = registry.start_run("training_pipeline").unwrap();
        let m = model();

        let first = registry.register(&run_id, "training_model", &m).unwrap();
        let second = registry.register(&run_id, "training_model", &m).unwrap();
        assert_eq!(first.uri, "models:/training_model/1");
        assert_eq!(second.version, 2);

        let x = array![[0.5], [4.5]];
        let loaded = registry.load(&second.uri).unwrap();
        assert_eq!(loaded.predict_proba(&x).unwrap(), m.predict_proba(&x).unwrap());

        // index survives reopening
        let reopened = LocalRegistry::open(dir.path()).unwrap();
        assert_eq!(reopened.latest_version("training_model").unwrap().version, 2);
        assert!(reopened.load("models:/training_model/latest").is_ok());
        assert!(reopened.load("models:/training_model/9").is_err());
    }

    #[test]
    fn test_failed_index_write_keeps_memory_in_sync() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = LocalRegistry::open(dir.path()).unwrap();
        let run_id = registry.start_run("training_pipeline").unwrap();

        // a directory where the index file belongs makes the rename fail
        let blocker = dir.path().join(INDEX_FILE);
        fs::create_dir_all(blocker.join("occupied")).unwrap();

        assert!(registry.register(&run_id, "training_model", &model()).is_err());
        assert!(registry.versions("training_model").is_empty());
        assert!(registry.load("models:/training_model/1").is_err());

        fs::remove_dir_all(&blocker).unwrap();
        let registered = registry.register(&run_id, "training_model", &model()).unwrap();
        assert_eq!(registered.version, 1);
    }

    #[test]
    fn test_run_logging() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = LocalRegistry::open(dir.path()).unwrap();
        let run_id = registry.start_run("run").unwrap();

        let mut params = BTreeMap::new();
        params.insert("booster".to_string(), ParameterValue::String("gbtree".into()));
        registry.log_params(&run_id, &params).unwrap();
        registry.log_metric(&run_id, "roc_auc_score", 0.91).unwrap();

        let record = registry.run(&run_id).unwrap();
        assert_eq!(record.params, params);
        assert_eq!(record.metrics["roc_auc_score"], 0.91);
        assert!(registry.log_metric("missing", "x", 1.0).is_err());
    }

    #[test]
    fn test_latest_run_params_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let params = |v: u32| RunParams {
            model_uri: ModelUri::format("training_model", v),
            run_id: format!("run{}", v),
            model_name: "training_model".into(),
            version: v,
        };
        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();

        save_run_params_on(dir.path(), &params(2), day(20)).unwrap();
        save_run_params_on(dir.path(), &params(1), day(5)).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let latest = load_latest_run_params(dir.path()).unwrap();
        assert!(latest.ends_with("run_params_20240320.json"));
        assert_eq!(fetch_latest_params(dir.path()).unwrap(), params(2));
    }

    #[test]
    fn test_no_run_params_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            fetch_latest_params(dir.path()),
            Err(CensusError::Registry(_))
        ));
    }
}
