//! Configuration parsing and validation.
//!
//! A [`PipelineConfig`] is loaded once (usually from YAML) and passed by
//! reference into every component; nothing reads ambient global state.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShipTrajError};
use crate::geo::CoordinateBounds;

/// Main configuration for a training + evaluation run.
///
/// # Example
///
/// ```rust
/// use shiptraj_rs::PipelineConfig;
///
/// # fn main() -> shiptraj_rs::Result<()> {
/// let mut config = PipelineConfig::from_preset("bilstm-baseline")?;
/// config.training.epochs = 10;
/// config.validate()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Input data configuration.
    pub data: DataConfig,

    /// Window geometry.
    #[serde(default)]
    pub window: WindowConfig,

    /// Model hyperparameters.
    #[serde(default)]
    pub model: ModelConfig,

    /// Training hyperparameters.
    #[serde(default)]
    pub training: TrainingConfig,

    /// Evaluation settings.
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Normalization bounds of the coordinate channels.
    #[serde(default)]
    pub bounds: CoordinateBounds,

    /// Compute device.
    #[serde(default)]
    pub device: DeviceSetting,

    /// Output directory for checkpoints and reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Random seed for batch shuffling.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_output_dir() -> String {
    "./outputs".into()
}

fn default_seed() -> u64 {
    42
}

/// Input data locations and loading options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Training trajectories (JSON array or JSON Lines).
    pub train_path: String,

    /// Validation trajectories, used for checkpoint selection.
    pub valid_path: String,

    /// Optional held-out test trajectories.
    #[serde(default)]
    pub test_path: Option<String>,

    /// Extra points a track needs beyond `input_len + horizon` to survive
    /// filtering.
    #[serde(default)]
    pub min_length_margin: usize,

    /// Batches prepared ahead by the background producer (0 = inline).
    #[serde(default = "default_prefetch")]
    pub prefetch_batches: usize,
}

fn default_prefetch() -> usize {
    4
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_path: "./data/train.json".into(),
            valid_path: "./data/valid.json".into(),
            test_path: None,
            min_length_margin: 0,
            prefetch_batches: default_prefetch(),
        }
    }
}

/// Sliding window geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Observed points per input window (`L_in`).
    #[serde(default = "default_input_len")]
    pub input_len: usize,

    /// Forecast points per window (`L_out`).
    #[serde(default = "default_horizon")]
    pub horizon: usize,

    /// Leading feature columns used (2 = latitude, longitude).
    #[serde(default = "default_features")]
    pub features: usize,
}

fn default_input_len() -> usize {
    18
}
fn default_horizon() -> usize {
    24
}
fn default_features() -> usize {
    2
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            input_len: default_input_len(),
            horizon: default_horizon(),
            features: default_features(),
        }
    }
}

/// Recurrent model hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Hidden width of each LSTM direction.
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
}

fn default_hidden_size() -> usize {
    64
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_size: default_hidden_size(),
        }
    }
}

/// Training hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Epoch budget.
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Windows per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Adam learning rate.
    #[serde(default = "default_lr")]
    pub learning_rate: f64,

    /// Adam beta1.
    #[serde(default = "default_beta1")]
    pub beta1: f64,

    /// Adam beta2.
    #[serde(default = "default_beta2")]
    pub beta2: f64,

    /// Adam epsilon.
    #[serde(default = "default_eps")]
    pub eps: f64,

    /// Decoupled weight decay (0.0 gives plain Adam).
    #[serde(default)]
    pub weight_decay: f64,

    /// Abort on a NaN/inf batch loss instead of averaging it in.
    #[serde(default = "default_true")]
    pub fail_on_non_finite_loss: bool,

    /// Stop early when validation loss plateaus.
    #[serde(default)]
    pub early_stopping: Option<EarlyStoppingConfig>,

    /// Draw progress bars for each epoch.
    #[serde(default = "default_true")]
    pub progress_bars: bool,
}

fn default_epochs() -> usize {
    100
}
fn default_batch_size() -> usize {
    32
}
fn default_lr() -> f64 {
    1e-3
}
fn default_beta1() -> f64 {
    0.9
}
fn default_beta2() -> f64 {
    0.999
}
fn default_eps() -> f64 {
    1e-8
}
fn default_true() -> bool {
    true
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_lr(),
            beta1: default_beta1(),
            beta2: default_beta2(),
            eps: default_eps(),
            weight_decay: 0.0,
            fail_on_non_finite_loss: true,
            early_stopping: None,
            progress_bars: true,
        }
    }
}

/// Plateau detection settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarlyStoppingConfig {
    /// Epochs without improvement before stopping.
    pub patience: usize,

    /// Minimum decrease that counts as improvement.
    #[serde(default)]
    pub min_delta: f64,
}

/// Which split the evaluator scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalSplit {
    /// The validation split used for checkpoint selection.
    #[default]
    Validation,
    /// The held-out test split (`data.test_path`).
    Test,
}

/// Evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Split to evaluate.
    #[serde(default)]
    pub split: EvalSplit,

    /// Windows per inference batch.
    #[serde(default = "default_eval_batch_size")]
    pub batch_size: usize,
}

fn default_eval_batch_size() -> usize {
    256
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            split: EvalSplit::Validation,
            batch_size: default_eval_batch_size(),
        }
    }
}

/// Compute device selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum DeviceSetting {
    /// Host CPU.
    #[default]
    Cpu,
    /// CUDA device; falls back to CPU when unavailable.
    Cuda {
        /// CUDA device ordinal.
        #[serde(default)]
        ordinal: usize,
    },
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create a configuration from a preset.
    ///
    /// Available presets:
    /// - `"bilstm-baseline"` - the 18 → 24 point BiLSTM baseline
    /// - `"smoke"` - a tiny model and two epochs, for pipeline checks
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "bilstm-baseline" => Ok(Self::bilstm_baseline_preset()),
            "smoke" => Ok(Self::smoke_preset()),
            _ => Err(ShipTrajError::Config(format!("Unknown preset: {preset}"))),
        }
    }

    /// The BiLSTM baseline: 64 hidden units, 100 epochs, batch 32, lr 1e-3.
    #[must_use]
    pub fn bilstm_baseline_preset() -> Self {
        Self {
            data: DataConfig::default(),
            window: WindowConfig::default(),
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
            evaluation: EvaluationConfig::default(),
            bounds: CoordinateBounds::default(),
            device: DeviceSetting::Cpu,
            output_dir: "./outputs/bilstm".into(),
            seed: 42,
        }
    }

    /// A tiny configuration that runs in seconds.
    #[must_use]
    pub fn smoke_preset() -> Self {
        Self {
            window: WindowConfig {
                input_len: 6,
                horizon: 4,
                features: 2,
            },
            model: ModelConfig { hidden_size: 8 },
            training: TrainingConfig {
                epochs: 2,
                batch_size: 8,
                progress_bars: false,
                ..Default::default()
            },
            output_dir: "./outputs/smoke".into(),
            ..Self::bilstm_baseline_preset()
        }
    }

    /// Minimum track length that survives filtering (exclusive).
    pub fn min_track_len(&self) -> usize {
        self.window.input_len + self.window.horizon + self.data.min_length_margin
    }

    /// Validate the configuration.
    ///
    /// ```rust
    /// use shiptraj_rs::PipelineConfig;
    ///
    /// let mut config = PipelineConfig::bilstm_baseline_preset();
    /// config.window.horizon = 0;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.data.train_path.is_empty() {
            return Err(ShipTrajError::Config("data.train_path is required".into()));
        }
        if self.data.valid_path.is_empty() {
            return Err(ShipTrajError::Config("data.valid_path is required".into()));
        }
        if self.window.input_len == 0 {
            return Err(ShipTrajError::Config("window.input_len must be > 0".into()));
        }
        if self.window.horizon == 0 {
            return Err(ShipTrajError::Config("window.horizon must be > 0".into()));
        }
        if self.window.features < 2 {
            return Err(ShipTrajError::Config(
                "window.features must include latitude and longitude (>= 2)".into(),
            ));
        }
        if self.model.hidden_size == 0 {
            return Err(ShipTrajError::Config("model.hidden_size must be > 0".into()));
        }
        if self.training.epochs == 0 {
            return Err(ShipTrajError::Config("training.epochs must be > 0".into()));
        }
        if self.training.batch_size == 0 {
            return Err(ShipTrajError::Config("training.batch_size must be > 0".into()));
        }
        if !(self.training.learning_rate > 0.0 && self.training.learning_rate.is_finite()) {
            return Err(ShipTrajError::Config(
                "training.learning_rate must be a positive number".into(),
            ));
        }
        if let Some(early) = &self.training.early_stopping {
            if early.patience == 0 {
                return Err(ShipTrajError::Config(
                    "training.early_stopping.patience must be > 0".into(),
                ));
            }
        }
        if self.evaluation.batch_size == 0 {
            return Err(ShipTrajError::Config("evaluation.batch_size must be > 0".into()));
        }
        if self.evaluation.split == EvalSplit::Test && self.data.test_path.is_none() {
            return Err(ShipTrajError::Config(
                "evaluation.split is 'test' but data.test_path is not set".into(),
            ));
        }
        self.bounds.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_baseline_matches_reference_hyperparameters() {
        let config = PipelineConfig::bilstm_baseline_preset();
        assert_eq!(config.window.input_len, 18);
        assert_eq!(config.window.horizon, 24);
        assert_eq!(config.window.features, 2);
        assert_eq!(config.model.hidden_size, 64);
        assert_eq!(config.training.epochs, 100);
        assert_eq!(config.training.batch_size, 32);
        assert_eq!(config.training.learning_rate, 1e-3);
        assert_eq!(config.training.weight_decay, 0.0);
        assert_eq!(config.min_track_len(), 42);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = PipelineConfig::bilstm_baseline_preset();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let restored: PipelineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(restored.window, config.window);
        assert_eq!(restored.bounds, config.bounds);
        assert_eq!(restored.device, config.device);
    }

    #[test]
    fn test_presets() {
        assert!(PipelineConfig::from_preset("bilstm-baseline").is_ok());
        assert!(PipelineConfig::from_preset("smoke").is_ok());
        assert!(PipelineConfig::from_preset("transformer").is_err());
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
data:
  train_path: train.json
  valid_path: valid.json
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.window, WindowConfig::default());
        assert_eq!(config.training.batch_size, 32);
        assert!(config.training.fail_on_non_finite_loss);
        assert!(config.training.early_stopping.is_none());
        assert_eq!(config.evaluation.split, EvalSplit::Validation);
        assert_eq!(config.device, DeviceSetting::Cpu);
        assert_eq!(config.seed, 42);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_device_setting_yaml() {
        let yaml = r#"
data:
  train_path: train.json
  valid_path: valid.json
device:
  kind: cuda
  ordinal: 1
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.device, DeviceSetting::Cuda { ordinal: 1 });
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "data:\n  train_path: a.json\n  valid_path: b.json\ntraining:\n  epochs: 7\n  early_stopping:\n    patience: 3"
        )
        .unwrap();
        file.flush().unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.training.epochs, 7);
        assert_eq!(
            config.training.early_stopping,
            Some(EarlyStoppingConfig {
                patience: 3,
                min_delta: 0.0
            })
        );
    }

    #[test]
    fn test_to_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let config = PipelineConfig::smoke_preset();
        config.to_file(&path).unwrap();

        let restored = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(restored.window, config.window);
        assert_eq!(restored.model, config.model);
        assert_eq!(restored.training.epochs, config.training.epochs);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let base = PipelineConfig::bilstm_baseline_preset();

        let mut config = base.clone();
        config.data.train_path = String::new();
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.window.features = 1;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.training.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.training.learning_rate = -1.0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.training.early_stopping = Some(EarlyStoppingConfig {
            patience: 0,
            min_delta: 0.0,
        });
        assert!(config.validate().is_err());

        let mut config = base;
        config.evaluation.split = EvalSplit::Test;
        assert!(config.validate().is_err());
        config.data.test_path = Some("test.json".into());
        assert!(config.validate().is_ok());
    }
}
