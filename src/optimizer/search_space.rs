//! Parameter distributions for define-by-run search

use crate::error::{CensusError, Result};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterType {
    /// Continuous float parameter
    Float {
        low: f64,
        high: f64,
        log_scale: bool,
    },
    /// Integer parameter (inclusive bounds)
    Int { low: i64, high: i64 },
    /// Categorical parameter
    Categorical { choices: Vec<String> },
}

impl ParameterType {
    /// Reject empty or inverted ranges and non-positive log bounds
    pub fn validate(&self, name: &str) -> Result<()> {
        let invalid = |value: String, reason: &str| CensusError::InvalidParameter {
            name: name.to_string(),
            value,
            reason: reason.to_string(),
        };
        match self {
            ParameterType::Float { low, high, log_scale } => {
                if !(low <= high) {
                    return Err(invalid(format!("[{}, {}]", low, high), "low must not exceed high"));
                }
                if *log_scale && *low <= 0.0 {
                    return Err(invalid(low.to_string(), "log-scale bounds must be positive"));
                }
            }
            ParameterType::Int { low, high } => {
                if low > high {
                    return Err(invalid(format!("[{}, {}]", low, high), "low must not exceed high"));
                }
            }
            ParameterType::Categorical { choices } => {
                if choices.is_empty() {
                    return Err(invalid("[]".to_string(), "at least one choice is required"));
                }
            }
        }
        Ok(())
    }
}

/// A single hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParameterType,
}

impl Parameter {
    /// Create a float parameter
    pub fn float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float {
                low,
                high,
                log_scale: false,
            },
        }
    }

    /// Create a log-scale float parameter
    pub fn log_float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float {
                low,
                high,
                log_scale: true,
            },
        }
    }

    /// Create an integer parameter
    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Int { low, high },
        }
    }

    /// Create a categorical parameter
    pub fn categorical(name: impl Into<String>, choices: &[&str]) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Categorical {
                choices: choices.iter().map(|c| c.to_string()).collect(),
            },
        }
    }

    /// Sample a random value
    pub fn sample(&self, rng: &mut impl Rng) -> ParameterValue {
        match &self.param_type {
            ParameterType::Float { low, high, log_scale } => {
                let val = if *log_scale {
                    let log_low = low.ln();
                    let log_high = high.ln();
                    (rng.gen::<f64>() * (log_high - log_low) + log_low).exp()
                } else {
                    rng.gen::<f64>() * (high - low) + low
                };
                ParameterValue::Float(val.clamp(*low, *high))
            }
            ParameterType::Int { low, high } => ParameterValue::Int(rng.gen_range(*low..=*high)),
            ParameterType::Categorical { choices } => {
                let idx = rng.gen_range(0..choices.len());
                ParameterValue::String(choices[idx].clone())
            }
        }
    }

    /// Position of a value in the sampler's working space: log for log-scale
    /// floats, the choice index for categoricals
    pub fn to_internal(&self, value: &ParameterValue) -> Option<f64> {
        match (&self.param_type, value) {
            (ParameterType::Float { log_scale, .. }, v) => {
                let x = v.as_float()?;
                Some(if *log_scale { x.ln() } else { x })
            }
            (ParameterType::Int { .. }, v) => v.as_int().map(|i| i as f64),
            (ParameterType::Categorical { choices }, ParameterValue::String(s)) => {
                choices.iter().position(|c| c == s).map(|i| i as f64)
            }
            _ => None,
        }
    }

    /// Inverse of [`Parameter::to_internal`], clamped to the bounds
    pub fn from_internal(&self, x: f64) -> ParameterValue {
        match &self.param_type {
            ParameterType::Float { low, high, log_scale } => {
                let v = if *log_scale { x.exp() } else { x };
                ParameterValue::Float(v.clamp(*low, *high))
            }
            ParameterType::Int { low, high } => {
                ParameterValue::Int((x.round() as i64).clamp(*low, *high))
            }
            ParameterType::Categorical { choices } => {
                let idx = (x.round().max(0.0) as usize).min(choices.len() - 1);
                ParameterValue::String(choices[idx].clone())
            }
        }
    }

    /// Bounds of the working space used by continuous samplers
    pub fn internal_bounds(&self) -> (f64, f64) {
        match &self.param_type {
            ParameterType::Float { low, high, log_scale } => {
                if *log_scale {
                    (low.ln(), high.ln())
                } else {
                    (*low, *high)
                }
            }
            ParameterType::Int { low, high } => (*low as f64 - 0.5, *high as f64 + 0.5),
            ParameterType::Categorical { choices } => (0.0, choices.len() as f64 - 1.0),
        }
    }
}

/// Sampled parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    String(String),
}

impl ParameterValue {
    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{:.6e}", v),
            ParameterValue::String(v) => f.write_str(v),
        }
    }
}
