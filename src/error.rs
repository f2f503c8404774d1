//! Error types for the census pipeline

use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, CensusError>;

/// Stage of the orchestrated clean + split + fit + transform sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformStage {
    Load,
    DropIdentifier,
    Clean,
    Split,
    Fit,
    Transform,
    Reassemble,
    Persist,
}

impl fmt::Display for TransformStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransformStage::Load => "load",
            TransformStage::DropIdentifier => "drop-identifier",
            TransformStage::Clean => "clean",
            TransformStage::Split => "split",
            TransformStage::Fit => "fit",
            TransformStage::Transform => "transform",
            TransformStage::Reassemble => "reassemble",
            TransformStage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// Main error type for the census pipeline
#[derive(Error, Debug)]
pub enum CensusError {
    #[error("Encoding error on column '{column}': {reason}")]
    Encoding { column: String, reason: String },

    #[error("{0} is not fitted")]
    NotFitted(String),

    #[error("Transformation failed at stage '{stage}' ({location}): {source}")]
    Transformation {
        stage: TransformStage,
        location: String,
        #[source]
        source: Box<CensusError>,
    },

    #[error("Search error: {0}")]
    Search(String),

    #[error("Trial pruned at step {step}")]
    TrialPruned { step: usize },

    #[error("Schema violation: {0}")]
    Schema(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Metric error: {0}")]
    Metric(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },
}

impl CensusError {
    /// Shorthand for an encoding failure on a column
    pub fn encoding(column: impl Into<String>, reason: impl Into<String>) -> Self {
        CensusError::Encoding {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a failure raised during the orchestrated transformation.
    ///
    /// The caller's file and line become the source-location tag.
    #[track_caller]
    pub fn transformation(stage: TransformStage, source: CensusError) -> Self {
        let caller = Location::caller();
        CensusError::Transformation {
            stage,
            location: format!("{}:{}", caller.file(), caller.line()),
            source: Box::new(source),
        }
    }

    /// True when the error signals a pruned trial rather than a failure
    pub fn is_pruned(&self) -> bool {
        matches!(self, CensusError::TrialPruned { .. })
    }
}

impl From<polars::error::PolarsError> for CensusError {
    fn from(err: polars::error::PolarsError) -> Self {
        CensusError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for CensusError {
    fn from(err: serde_json::Error) -> Self {
        CensusError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for CensusError {
    fn from(err: bincode::Error) -> Self {
        CensusError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for CensusError {
    fn from(err: ndarray::ShapeError) -> Self {
        CensusError::Data(format!("invalid shape: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = CensusError::encoding("workclass", "target missing during fit");
        assert_eq!(
            err.to_string(),
            "Encoding error on column 'workclass': target missing during fit"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CensusError = io_err.into();
        assert!(matches!(err, CensusError::Io(_)));
    }

    #[test]
    fn test_transformation_wraps_cause_with_location() {
        let err = CensusError::transformation(
            TransformStage::Fit,
            CensusError::NotFitted("WoeEncoder".to_string()),
        );

        match &err {
            CensusError::Transformation { stage, location, .. } => {
                assert_eq!(*stage, TransformStage::Fit);
                assert!(location.contains("error.rs"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }

        let source = err.source().expect("cause is preserved");
        assert_eq!(source.to_string(), "WoeEncoder is not fitted");
    }

    #[test]
    fn test_pruned_is_distinguishable() {
        assert!(CensusError::TrialPruned { step: 12 }.is_pruned());
        assert!(!CensusError::Search("boom".into()).is_pruned());
    }
}
