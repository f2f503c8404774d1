//! Booster hyperparameters, one record per boosting family

use crate::error::{CensusError, Result};
use crate::optimizer::{ParameterValue, Trial};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Names accepted for the `booster` parameter
pub const BOOSTER_CHOICES: [&str; 3] = ["gbtree", "gblinear", "dart"];

/// Order in which tree nodes are expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowPolicy {
    /// Split the nodes closest to the root first
    Depthwise,
    /// Split the node with the highest loss change first
    Lossguide,
}

/// How dart picks the trees to drop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    Uniform,
    /// Drop probability proportional to tree weight
    Weighted,
}

/// How dart rescales dropped and new trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizeType {
    Tree,
    Forest,
}

/// Tree booster parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// L2 regularization on leaf weights
    pub lambda: f64,
    /// L1 regularization on leaf weights
    pub alpha: f64,
    pub max_depth: usize,
    pub eta: f64,
    /// Minimum loss reduction to make a split
    pub gamma: f64,
    pub grow_policy: GrowPolicy,
    pub min_child_weight: f64,
    /// Leaf budget for lossguide growth, 0 for no limit
    pub max_leaves: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            lambda: 1.0,
            alpha: 0.0,
            max_depth: 6,
            eta: 0.3,
            gamma: 0.0,
            grow_policy: GrowPolicy::Depthwise,
            min_child_weight: 1.0,
            max_leaves: 0,
        }
    }
}

/// Linear booster parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    pub lambda: f64,
    pub alpha: f64,
    pub eta: f64,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            lambda: 0.0,
            alpha: 0.0,
            eta: 0.5,
        }
    }
}

/// Dropout parameters layered on the tree booster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DartParams {
    pub sample_type: SampleType,
    pub normalize_type: NormalizeType,
    /// Fraction of trees dropped per round
    pub rate_drop: f64,
    /// Probability of skipping dropout for a round
    pub skip_drop: f64,
}

impl Default for DartParams {
    fn default() -> Self {
        Self {
            sample_type: SampleType::Uniform,
            normalize_type: NormalizeType::Tree,
            rate_drop: 0.0,
            skip_drop: 0.0,
        }
    }
}

/// Hyperparameters of one boosting family.
///
/// Serialized externally tagged so the record also travels through bincode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoosterParams {
    GbTree(TreeParams),
    GbLinear(LinearParams),
    Dart { tree: TreeParams, dart: DartParams },
}

impl Default for BoosterParams {
    fn default() -> Self {
        BoosterParams::GbTree(TreeParams::default())
    }
}

impl BoosterParams {
    /// Sample one configuration from the trial.
    ///
    /// Shared parameters come first, then the tree parameters for gbtree and
    /// dart, then the dropout parameters for dart.
    pub fn suggest<A>(trial: &mut Trial<'_, A>) -> Result<Self> {
        let booster = trial.suggest_categorical("booster", &BOOSTER_CHOICES)?;
        let lambda = trial.suggest_float("lambda", 1e-8, 1.0, true)?;
        let alpha = trial.suggest_float("alpha", 1e-8, 1.0, true)?;

        if booster == "gblinear" {
            return Ok(BoosterParams::GbLinear(LinearParams {
                lambda,
                alpha,
                ..LinearParams::default()
            }));
        }

        let tree = TreeParams {
            lambda,
            alpha,
            max_depth: trial.suggest_int("max_depth", 1, 10)? as usize,
            eta: trial.suggest_float("eta", 1e-2, 0.5, true)?,
            gamma: trial.suggest_float("gamma", 1e-8, 1.0, true)?,
            grow_policy: match trial
                .suggest_categorical("grow_policy", &["depthwise", "lossguide"])?
                .as_str()
            {
                "lossguide" => GrowPolicy::Lossguide,
                _ => GrowPolicy::Depthwise,
            },
            ..TreeParams::default()
        };

        if booster == "gbtree" {
            return Ok(BoosterParams::GbTree(tree));
        }

        let dart = DartParams {
            sample_type: match trial
                .suggest_categorical("sample_type", &["uniform", "weighted"])?
                .as_str()
            {
                "weighted" => SampleType::Weighted,
                _ => SampleType::Uniform,
            },
            normalize_type: match trial
                .suggest_categorical("normalize_type", &["tree", "forest"])?
                .as_str()
            {
                "forest" => NormalizeType::Forest,
                _ => NormalizeType::Tree,
            },
            rate_drop: trial.suggest_float("rate_drop", 1e-8, 1.0, true)?,
            skip_drop: trial.suggest_float("skip_drop", 1e-8, 1.0, true)?,
        };
        Ok(BoosterParams::Dart { tree, dart })
    }

    pub fn booster_name(&self) -> &'static str {
        match self {
            BoosterParams::GbTree(_) => "gbtree",
            BoosterParams::GbLinear(_) => "gblinear",
            BoosterParams::Dart { .. } => "dart",
        }
    }

    /// Flat name -> value mapping, keyed like the sampled parameters
    pub fn to_map(&self) -> BTreeMap<String, ParameterValue> {
        let mut map = BTreeMap::new();
        let mut put = |k: &str, v: ParameterValue| {
            map.insert(k.to_string(), v);
        };
        put("booster", ParameterValue::String(self.booster_name().to_string()));

        match self {
            BoosterParams::GbLinear(p) => {
                put("lambda", ParameterValue::Float(p.lambda));
                put("alpha", ParameterValue::Float(p.alpha));
            }
            BoosterParams::GbTree(t) | BoosterParams::Dart { tree: t, .. } => {
                put("lambda", ParameterValue::Float(t.lambda));
                put("alpha", ParameterValue::Float(t.alpha));
                put("max_depth", ParameterValue::Int(t.max_depth as i64));
                put("eta", ParameterValue::Float(t.eta));
                put("gamma", ParameterValue::Float(t.gamma));
                let policy = match t.grow_policy {
                    GrowPolicy::Depthwise => "depthwise",
                    GrowPolicy::Lossguide => "lossguide",
                };
                put("grow_policy", ParameterValue::String(policy.to_string()));
            }
        }

        if let BoosterParams::Dart { dart, .. } = self {
            let sample = match dart.sample_type {
                SampleType::Uniform => "uniform",
                SampleType::Weighted => "weighted",
            };
            let normalize = match dart.normalize_type {
                NormalizeType::Tree => "tree",
                NormalizeType::Forest => "forest",
            };
            put("sample_type", ParameterValue::String(sample.to_string()));
            put("normalize_type", ParameterValue::String(normalize.to_string()));
            put("rate_drop", ParameterValue::Float(dart.rate_drop));
            put("skip_drop", ParameterValue::Float(dart.skip_drop));
        }
        map
    }

    /// Rebuild a record from a flat mapping such as a study's best params
    pub fn from_map(map: &BTreeMap<String, ParameterValue>) -> Result<Self> {
        let get_str = |k: &str| -> Result<&str> {
            map.get(k)
                .and_then(|v| v.as_string())
                .ok_or_else(|| missing(k))
        };
        let get_f64 = |k: &str| -> Result<f64> {
            map.get(k).and_then(|v| v.as_float()).ok_or_else(|| missing(k))
        };

        let booster = get_str("booster")?;
        let lambda = get_f64("lambda")?;
        let alpha = get_f64("alpha")?;

        if booster == "gblinear" {
            return Ok(BoosterParams::GbLinear(LinearParams {
                lambda,
                alpha,
                ..LinearParams::default()
            }));
        }

        let max_depth = map
            .get("max_depth")
            .and_then(|v| v.as_int())
            .ok_or_else(|| missing("max_depth"))?;
        let tree = TreeParams {
            lambda,
            alpha,
            max_depth: max_depth.max(0) as usize,
            eta: get_f64("eta")?,
            gamma: get_f64("gamma")?,
            grow_policy: match get_str("grow_policy")? {
                "depthwise" => GrowPolicy::Depthwise,
                "lossguide" => GrowPolicy::Lossguide,
                other => return Err(unknown("grow_policy", other)),
            },
            ..TreeParams::default()
        };

        match booster {
            "gbtree" => Ok(BoosterParams::GbTree(tree)),
            "dart" => {
                let dart = DartParams {
                    sample_type: match get_str("sample_type")? {
                        "uniform" => SampleType::Uniform,
                        "weighted" => SampleType::Weighted,
                        other => return Err(unknown("sample_type", other)),
                    },
                    normalize_type: match get_str("normalize_type")? {
                        "tree" => NormalizeType::Tree,
                        "forest" => NormalizeType::Forest,
                        other => return Err(unknown("normalize_type", other)),
                    },
                    rate_drop: get_f64("rate_drop")?,
                    skip_drop: get_f64("skip_drop")?,
                };
                Ok(BoosterParams::Dart { tree, dart })
            }
            other => Err(unknown("booster", other)),
        }
    }

    /// Reject values the booster cannot train with
    pub fn validate(&self) -> Result<()> {
        let check = |name: &str, value: f64, ok: bool, reason: &str| -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(CensusError::InvalidParameter {
                    name: name.to_string(),
                    value: value.to_string(),
                    reason: reason.to_string(),
                })
            }
        };
        match self {
            BoosterParams::GbLinear(p) => {
                check("lambda", p.lambda, p.lambda >= 0.0, "must be non-negative")?;
                check("alpha", p.alpha, p.alpha >= 0.0, "must be non-negative")?;
                check("eta", p.eta, p.eta > 0.0, "must be positive")?;
            }
            BoosterParams::GbTree(t) | BoosterParams::Dart { tree: t, .. } => {
                check("lambda", t.lambda, t.lambda >= 0.0, "must be non-negative")?;
                check("alpha", t.alpha, t.alpha >= 0.0, "must be non-negative")?;
                check("eta", t.eta, t.eta > 0.0, "must be positive")?;
                check("gamma", t.gamma, t.gamma >= 0.0, "must be non-negative")?;
                check("max_depth", t.max_depth as f64, t.max_depth >= 1, "must be at least 1")?;
            }
        }
        if let BoosterParams::Dart { dart, .. } = self {
            check("rate_drop", dart.rate_drop, (0.0..=1.0).contains(&dart.rate_drop), "must lie in [0, 1]")?;
            check("skip_drop", dart.skip_drop, (0.0..=1.0).contains(&dart.skip_drop), "must lie in [0, 1]")?;
        }
        Ok(())
    }
}

fn missing(name: &str) -> CensusError {
    CensusError::InvalidParameter {
        name: name.to_string(),
        value: "<missing>".to_string(),
        reason: "required for this booster".to_string(),
    }
}

fn unknown(name: &str, value: &str) -> CensusError {
    CensusError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: "unknown choice".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::{NoPruner, OptimizeDirection, RandomSampler, Study};

    fn sample_many(n: usize) -> Vec<(BoosterParams, BTreeMap<String, ParameterValue>)> {
        let mut study: Study<BoosterParams> = Study::new(
            OptimizeDirection::Maximize,
            Box::new(RandomSampler::new(Some(42))),
            Box::new(NoPruner),
        );
        let mut out = Vec::new();
        study
            .optimize(n, |trial| {
                let params = BoosterParams::suggest(trial)?;
                out.push((params, trial.params().clone()));
                Ok(0.5)
            })
            .unwrap();
        out
    }

    #[test]
    fn test_suggest_respects_family() {
        for (params, sampled) in sample_many(40) {
            assert!(params.validate().is_ok());
            assert_eq!(sampled, params.to_map());
            match &params {
                BoosterParams::GbLinear(_) => {
                    assert_eq!(sampled.len(), 3);
                }
                BoosterParams::GbTree(t) => {
                    assert_eq!(sampled.len(), 7);
                    assert!((1..=10).contains(&t.max_depth));
                    assert!((1e-2..=0.5).contains(&t.eta));
                }
                BoosterParams::Dart { dart, .. } => {
                    assert_eq!(sampled.len(), 11);
                    assert!((1e-8..=1.0).contains(&dart.rate_drop));
                }
            }
        }
    }

    #[test]
    fn test_map_round_trip() {
        let params = BoosterParams::Dart {
            tree: TreeParams {
                max_depth: 4,
                grow_policy: GrowPolicy::Lossguide,
                ..TreeParams::default()
            },
            dart: DartParams {
                sample_type: SampleType::Weighted,
                normalize_type: NormalizeType::Forest,
                rate_drop: 0.1,
                skip_drop: 0.5,
            },
        };
        assert_eq!(BoosterParams::from_map(&params.to_map()).unwrap(), params);
    }

    #[test]
    fn test_tagged_json() {
        let json = serde_json::to_value(BoosterParams::GbLinear(LinearParams::default())).unwrap();
        assert_eq!(json["gblinear"]["eta"], 0.5);
    }

    #[test]
    fn test_unknown_booster_rejected() {
        let mut map = BoosterParams::default().to_map();
        map.insert("booster".into(), ParameterValue::String("gbforest".into()));
        assert!(BoosterParams::from_map(&map).is_err());
    }
}
