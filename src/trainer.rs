//! Epoch-wise training loop with best-checkpoint selection.
//!
//! Each epoch runs every training batch through one Adam step, then every
//! validation batch forward-only, then offers the parameters to
//! [`BestCheckpoint`]. Epoch losses are the mean of the batch losses.

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::batch::{Batch, BatchSource};
use crate::checkpoint::{BestCheckpoint, CheckpointMetadata};
use crate::config::TrainingConfig;
use crate::early_stopping::{EarlyStopping, StoppingDecision};
use crate::error::{Result, ShipTrajError};
use crate::model::TrajectoryModel;
use crate::observer::{FitInfo, TrainingObserver};
use crate::optimizer::{AdamOptimizer, OptimizerConfig};

/// Losses of one finished epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// One-based epoch number.
    pub epoch: usize,
    /// Mean training batch loss.
    pub train_loss: f64,
    /// Mean validation batch loss.
    pub val_loss: f64,
    /// Whether this epoch replaced the best checkpoint.
    pub improved: bool,
}

/// Result of [`Trainer::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingOutcome {
    /// Every completed epoch in order.
    pub history: Vec<EpochSummary>,
    /// Epoch of the stored checkpoint.
    pub best_epoch: Option<usize>,
    /// Validation loss of the stored checkpoint.
    pub best_val_loss: Option<f64>,
    /// True when early stopping ended the run before the epoch budget.
    pub stopped_early: bool,
}

/// MSE between the forecast for `batch` and its targets, as a scalar tensor.
pub fn batch_loss(model: &TrajectoryModel, batch: &Batch) -> Result<Tensor> {
    let forecast = model.forward(&batch.inputs)?;
    if forecast.dims() != batch.targets.dims() {
        return Err(ShipTrajError::shape_mismatch(
            format!("targets {:?}", forecast.dims()),
            format!("targets {:?}", batch.targets.dims()),
        ));
    }
    Ok(candle_nn::loss::mse(&forecast, &batch.targets)?)
}

/// One optimization step. Returns the batch loss.
///
/// A non-finite loss is returned without updating the parameters.
pub fn train_step(
    model: &TrajectoryModel,
    optimizer: &mut AdamOptimizer,
    batch: &Batch,
) -> Result<f64> {
    let loss = batch_loss(model, batch)?;
    let value = f64::from(loss.to_scalar::<f32>()?);
    if value.is_finite() {
        optimizer.backward_step(&loss)?;
    }
    Ok(value)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Owns the model and optimizer for the duration of a run.
pub struct Trainer {
    model: TrajectoryModel,
    optimizer: AdamOptimizer,
    config: TrainingConfig,
    checkpoint: BestCheckpoint,
    early_stopping: Option<EarlyStopping>,
    observers: Vec<Box<dyn TrainingObserver>>,
}

impl Trainer {
    /// Create a trainer; the optimizer covers every model parameter.
    pub fn new(
        model: TrajectoryModel,
        config: &TrainingConfig,
        checkpoint: BestCheckpoint,
    ) -> Result<Self> {
        let optimizer = OptimizerConfig::from(config).build(model.var_map())?;
        let early_stopping = config.early_stopping.as_ref().map(EarlyStopping::from_config);
        Ok(Self {
            model,
            optimizer,
            config: config.clone(),
            checkpoint,
            early_stopping,
            observers: Vec::new(),
        })
    }

    /// Attach an observer.
    #[must_use]
    pub fn with_observer(mut self, observer: impl TrainingObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// The model being trained.
    pub fn model(&self) -> &TrajectoryModel {
        &self.model
    }

    /// Give up the model.
    pub fn into_model(self) -> TrajectoryModel {
        self.model
    }

    /// The checkpoint store.
    pub fn checkpoint(&self) -> &BestCheckpoint {
        &self.checkpoint
    }

    fn check_geometry(&self, source: &BatchSource, split: &str) -> Result<()> {
        let window = self.model.window();
        let pooled = source.pool().windower();
        if (pooled.input_len(), pooled.horizon(), pooled.features())
            != (window.input_len, window.horizon, window.features)
        {
            return Err(ShipTrajError::shape_mismatch(
                format!("{split} windows shaped {window:?}"),
                format!("{pooled:?}"),
            ));
        }
        Ok(())
    }

    /// Run the full epoch budget (or until early stopping fires).
    ///
    /// The model holds the parameters of the last epoch afterwards; call
    /// [`restore_best`](Self::restore_best) to switch to the stored best.
    pub fn fit(&mut self, train: &mut BatchSource, valid: &mut BatchSource) -> Result<TrainingOutcome> {
        train.pool().ensure_compatible(valid.pool())?;
        self.check_geometry(train, "training")?;
        self.check_geometry(valid, "validation")?;

        let info = FitInfo {
            epochs: self.config.epochs,
            train_windows: train.pool().len(),
            val_windows: valid.pool().len(),
            train_batches: train.num_batches(),
            val_batches: valid.num_batches(),
            parameter_count: self.model.parameter_count(),
        };
        for observer in &mut self.observers {
            observer.on_fit_start(&info)?;
        }

        let mut history = Vec::with_capacity(self.config.epochs);
        let mut stopped_early = false;

        for epoch in 1..=self.config.epochs {
            let train_loss = self.train_epoch(epoch, train)?;
            let val_loss = self.validate_epoch(epoch, valid)?;
            let improved = self.checkpoint.offer(&self.model, epoch, train_loss, val_loss)?;

            let summary = EpochSummary {
                epoch,
                train_loss,
                val_loss,
                improved,
            };
            for observer in &mut self.observers {
                observer.on_epoch_end(&summary);
            }
            history.push(summary);

            if let Some(early) = &mut self.early_stopping {
                if early.check(val_loss, epoch) == StoppingDecision::Stop {
                    stopped_early = epoch < self.config.epochs;
                    break;
                }
            }
        }

        let outcome = TrainingOutcome {
            history,
            best_epoch: self.checkpoint.best().map(|m| m.epoch),
            best_val_loss: self.checkpoint.best_loss(),
            stopped_early,
        };
        for observer in &mut self.observers {
            observer.on_fit_end(&outcome);
        }
        Ok(outcome)
    }

    /// One pass over the training batches. Returns the mean batch loss.
    pub fn train_epoch(&mut self, epoch: usize, train: &mut BatchSource) -> Result<f64> {
        let mut losses = Vec::with_capacity(train.num_batches());
        for (index, batch) in train.epoch().enumerate() {
            let batch = batch?;
            let loss = train_step(&self.model, &mut self.optimizer, &batch)?;
            if !loss.is_finite() && self.config.fail_on_non_finite_loss {
                return Err(ShipTrajError::NumericInstability {
                    epoch,
                    batch: index,
                    loss,
                });
            }
            for observer in &mut self.observers {
                observer.on_train_batch(epoch, index, loss);
            }
            losses.push(loss);
        }
        Ok(mean(&losses))
    }

    /// One forward-only pass over the validation batches.
    pub fn validate_epoch(&mut self, epoch: usize, valid: &mut BatchSource) -> Result<f64> {
        let mut losses = Vec::with_capacity(valid.num_batches());
        for (index, batch) in valid.epoch().enumerate() {
            let batch = batch?;
            let loss = f64::from(batch_loss(&self.model, &batch)?.to_scalar::<f32>()?);
            for observer in &mut self.observers {
                observer.on_validation_batch(epoch, index, loss);
            }
            losses.push(loss);
        }
        Ok(mean(&losses))
    }

    /// Load the stored best parameters into the model.
    pub fn restore_best(&mut self) -> Result<CheckpointMetadata> {
        self.checkpoint.restore(&mut self.model)
    }
}
