//! Error types for shiptraj-rs.
//!
//! Data integrity problems (missing values, short tracks) are not errors: the
//! [`TrajectoryFilter`](crate::trajectory::TrajectoryFilter) drops those records
//! and counts them. Everything in [`ShipTrajError`] aborts the run.
//!
//! # Example
//!
//! ```rust
//! use shiptraj_rs::{PipelineConfig, ShipTrajError};
//!
//! # fn main() {
//! match PipelineConfig::from_preset("unknown") {
//!     Ok(_) => println!("Loaded config"),
//!     Err(ShipTrajError::Config(msg)) => eprintln!("Configuration error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # }
//! ```

use thiserror::Error;

/// Result type alias for shiptraj-rs operations.
pub type Result<T> = std::result::Result<T, ShipTrajError>;

/// Errors that can occur in shiptraj-rs.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ShipTrajError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid configuration file.
    #[error("invalid config file: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Input data could not be read or is malformed.
    #[error("data error: {0}")]
    Data(String),

    /// Feature counts disagree between splits or between data and model.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch {
        /// Expected shape description.
        expected: String,
        /// Observed shape description.
        got: String,
    },

    /// A split produced no usable windows after filtering and windowing.
    #[error("insufficient data: split '{split}' yields zero windows")]
    EmptyDataset {
        /// Name of the offending split.
        split: String,
    },

    /// A training batch produced a non-finite loss.
    #[error("non-finite loss {loss} at epoch {epoch}, batch {batch}")]
    NumericInstability {
        /// One-based epoch number.
        epoch: usize,
        /// Zero-based batch index within the epoch.
        batch: usize,
        /// The offending loss value.
        loss: f64,
    },

    /// Checkpoint error.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// An aggregate was requested over zero evaluated windows.
    #[error("empty evaluation: {0}")]
    EmptyEvaluation(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Candle error.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// CSV writer error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Progress bar template error.
    #[error("template error: {0}")]
    Template(String),
}

impl ShipTrajError {
    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    /// Create a shape mismatch error.
    pub fn shape_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create an empty dataset error for `split`.
    pub fn empty_dataset(split: impl Into<String>) -> Self {
        Self::EmptyDataset {
            split: split.into(),
        }
    }

    /// Create a checkpoint error.
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }
}

impl From<indicatif::style::TemplateError> for ShipTrajError {
    fn from(err: indicatif::style::TemplateError) -> Self {
        ShipTrajError::Template(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_error_display() {
        let error = ShipTrajError::Config("epochs must be > 0".to_string());
        assert_eq!(error.to_string(), "configuration error: epochs must be > 0");
    }

    #[test]
    fn test_empty_dataset_names_split() {
        let error = ShipTrajError::empty_dataset("validation");
        assert_eq!(
            error.to_string(),
            "insufficient data: split 'validation' yields zero windows"
        );
    }

    #[test]
    fn test_shape_mismatch_display() {
        let error = ShipTrajError::shape_mismatch("2 features", "4 features");
        assert_eq!(
            error.to_string(),
            "shape mismatch: expected 2 features, got 4 features"
        );
    }

    #[test]
    fn test_numeric_instability_display() {
        let error = ShipTrajError::NumericInstability {
            epoch: 3,
            batch: 7,
            loss: f64::NAN,
        };
        let msg = error.to_string();
        assert!(msg.contains("epoch 3"));
        assert!(msg.contains("batch 7"));
        assert!(msg.contains("NaN"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "best_model.safetensors");
        let error: ShipTrajError = io_error.into();
        assert!(matches!(error, ShipTrajError::Io(_)));
        assert!(error.to_string().contains("best_model.safetensors"));
    }

    #[test]
    fn test_config_parse_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: yaml: :::").unwrap_err();
        let error: ShipTrajError = yaml_error.into();
        assert!(error.to_string().contains("invalid config file"));
    }

    #[test]
    fn test_candle_error_conversion() {
        use candle_core::{DType, Device, Tensor};

        let a = Tensor::zeros((2, 3), DType::F32, &Device::Cpu).unwrap();
        let b = Tensor::zeros((3, 4), DType::F32, &Device::Cpu).unwrap();
        let error: ShipTrajError = a.broadcast_add(&b).unwrap_err().into();
        assert!(error.to_string().contains("candle error"));
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let error: ShipTrajError = io::Error::new(io::ErrorKind::Other, "disk full").into();
        assert!(error.source().is_some());
    }
}
