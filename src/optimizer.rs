//! Adam optimizer construction.

use candle_core::Tensor;
use candle_nn::{Optimizer, ParamsAdamW, VarMap};

use crate::config::TrainingConfig;
use crate::error::{Result, ShipTrajError};

/// Adam hyperparameters.
///
/// With `weight_decay == 0.0` AdamW reduces to plain Adam.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Beta1
    pub beta1: f64,
    /// Beta2
    pub beta2: f64,
    /// Decoupled weight decay
    pub weight_decay: f64,
    /// Epsilon for numerical stability
    pub eps: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            weight_decay: 0.0,
            eps: 1e-8,
        }
    }
}

impl From<&TrainingConfig> for OptimizerConfig {
    fn from(training: &TrainingConfig) -> Self {
        Self {
            learning_rate: training.learning_rate,
            beta1: training.beta1,
            beta2: training.beta2,
            weight_decay: training.weight_decay,
            eps: training.eps,
        }
    }
}

impl OptimizerConfig {
    /// Create an optimizer over every variable in `varmap`.
    ///
    /// # Errors
    ///
    /// Returns an error if the optimizer cannot be created.
    pub fn build(&self, varmap: &VarMap) -> Result<AdamOptimizer> {
        let params = ParamsAdamW {
            lr: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            eps: self.eps,
            weight_decay: self.weight_decay,
        };

        let inner = candle_nn::AdamW::new(varmap.all_vars(), params)
            .map_err(|e| ShipTrajError::Config(format!("failed to create Adam optimizer: {e}")))?;

        Ok(AdamOptimizer { inner })
    }
}

/// Adam optimizer bound to one model's parameters.
pub struct AdamOptimizer {
    inner: candle_nn::AdamW,
}

impl AdamOptimizer {
    /// Back-propagate `loss` and apply one update.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.inner.backward_step(loss)?;
        Ok(())
    }

    /// Current learning rate.
    pub fn learning_rate(&self) -> f64 {
        self.inner.learning_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::Init;

    #[test]
    fn test_from_training_config() {
        let training = TrainingConfig {
            learning_rate: 5e-4,
            weight_decay: 0.01,
            ..Default::default()
        };
        let config = OptimizerConfig::from(&training);
        assert_eq!(config.learning_rate, 5e-4);
        assert_eq!(config.weight_decay, 0.01);
        assert_eq!(config.beta2, 0.999);
    }

    #[test]
    fn test_default_is_plain_adam() {
        let config = OptimizerConfig::default();
        assert_eq!(config.learning_rate, 1e-3);
        assert_eq!(config.weight_decay, 0.0);
    }

    #[test]
    fn test_step_reduces_quadratic() -> Result<()> {
        let varmap = VarMap::new();
        let w = varmap.get((1,), "w", Init::Const(3.0), DType::F32, &Device::Cpu)?;
        let mut opt = OptimizerConfig {
            learning_rate: 0.1,
            ..Default::default()
        }
        .build(&varmap)?;
        assert_eq!(opt.learning_rate(), 0.1);

        let loss_of = |w: &Tensor| -> Result<f32> { Ok(w.sqr()?.sum_all()?.to_scalar::<f32>()?) };
        let before = loss_of(&w)?;
        for _ in 0..10 {
            let loss = w.sqr()?.sum_all()?;
            opt.backward_step(&loss)?;
        }
        let after = loss_of(&w)?;
        assert!(after < before, "{after} >= {before}");
        Ok(())
    }
}
