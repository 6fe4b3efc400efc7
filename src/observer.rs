//! Training progress reporting.
//!
//! The trainer only computes losses; everything a person looks at while a run
//! is in flight (log lines, progress bars, the per-epoch summary) comes from
//! a [`TrainingObserver`].

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::error::Result;
use crate::trainer::{EpochSummary, TrainingOutcome};

/// Static facts about a run, passed to [`TrainingObserver::on_fit_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitInfo {
    /// Epoch budget.
    pub epochs: usize,
    /// Training windows.
    pub train_windows: usize,
    /// Validation windows.
    pub val_windows: usize,
    /// Training batches per epoch.
    pub train_batches: usize,
    /// Validation batches per epoch.
    pub val_batches: usize,
    /// Trainable scalars in the model.
    pub parameter_count: usize,
}

/// Hooks invoked by [`Trainer`](crate::trainer::Trainer) as a run advances.
///
/// Every hook has an empty default.
pub trait TrainingObserver {
    /// Before the first epoch.
    fn on_fit_start(&mut self, _info: &FitInfo) -> Result<()> {
        Ok(())
    }

    /// After each optimizer step. `epoch` is one-based, `batch` zero-based.
    fn on_train_batch(&mut self, _epoch: usize, _batch: usize, _loss: f64) {}

    /// After each validation batch.
    fn on_validation_batch(&mut self, _epoch: usize, _batch: usize, _loss: f64) {}

    /// After validation and the checkpoint decision.
    fn on_epoch_end(&mut self, _summary: &EpochSummary) {}

    /// After the last epoch.
    fn on_fit_end(&mut self, _outcome: &TrainingOutcome) {}
}

/// Writes lifecycle events through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl TrainingObserver for TracingObserver {
    fn on_fit_start(&mut self, info: &FitInfo) -> Result<()> {
        tracing::info!("Starting training");
        tracing::info!("  Epochs: {}", info.epochs);
        tracing::info!("  Parameters: {}", info.parameter_count);
        tracing::info!(
            "  Train: {} windows in {} batches",
            info.train_windows,
            info.train_batches
        );
        tracing::info!(
            "  Validation: {} windows in {} batches",
            info.val_windows,
            info.val_batches
        );
        Ok(())
    }

    fn on_train_batch(&mut self, epoch: usize, batch: usize, loss: f64) {
        tracing::debug!(epoch, batch, loss, "train step");
    }

    fn on_validation_batch(&mut self, epoch: usize, batch: usize, loss: f64) {
        tracing::debug!(epoch, batch, loss, "validation step");
    }

    fn on_epoch_end(&mut self, summary: &EpochSummary) {
        tracing::info!(
            "Epoch {}: training loss {:.6}, validation loss {:.6}{}",
            summary.epoch,
            summary.train_loss,
            summary.val_loss,
            if summary.improved { " (best)" } else { "" }
        );
    }

    fn on_fit_end(&mut self, outcome: &TrainingOutcome) {
        match outcome.best_epoch {
            Some(epoch) => tracing::info!(
                "Training complete after {} epochs; best validation loss {:.6} at epoch {}",
                outcome.history.len(),
                outcome.best_val_loss.unwrap_or(f64::NAN),
                epoch
            ),
            None => tracing::warn!(
                "Training complete after {} epochs without a finite validation loss",
                outcome.history.len()
            ),
        }
        if outcome.stopped_early {
            tracing::info!("Stopped early: validation loss plateaued");
        }
    }
}

/// One progress bar per phase and epoch, with the running mean loss.
pub struct ProgressObserver {
    multi: MultiProgress,
    style: Option<ProgressStyle>,
    train_batches: u64,
    val_batches: u64,
    bar: Option<ProgressBar>,
    running_sum: f64,
    running_count: usize,
}

impl ProgressObserver {
    /// Create an observer drawing to stderr.
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            style: None,
            train_batches: 0,
            val_batches: 0,
            bar: None,
            running_sum: 0.0,
            running_count: 0,
        }
    }

    fn advance(&mut self, len: u64, prefix: String, batch: usize, loss: f64) {
        if batch == 0 {
            if let Some(done) = self.bar.take() {
                done.finish();
            }
            let bar = self.multi.add(ProgressBar::new(len));
            if let Some(style) = &self.style {
                bar.set_style(style.clone());
            }
            bar.set_prefix(prefix);
            self.bar = Some(bar);
            self.running_sum = 0.0;
            self.running_count = 0;
        }

        self.running_sum += loss;
        self.running_count += 1;
        if let Some(bar) = &self.bar {
            bar.inc(1);
            bar.set_message(format!(
                "loss {:.6}",
                self.running_sum / self.running_count as f64
            ));
        }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingObserver for ProgressObserver {
    fn on_fit_start(&mut self, info: &FitInfo) -> Result<()> {
        let style = ProgressStyle::default_bar()
            .template("{prefix:>18} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>5}/{len:5} {msg}")?
            .progress_chars("#>-");
        self.style = Some(style);
        self.train_batches = info.train_batches as u64;
        self.val_batches = info.val_batches as u64;
        Ok(())
    }

    fn on_train_batch(&mut self, epoch: usize, batch: usize, loss: f64) {
        self.advance(self.train_batches, format!("epoch {epoch} train"), batch, loss);
    }

    fn on_validation_batch(&mut self, epoch: usize, batch: usize, loss: f64) {
        self.advance(self.val_batches, format!("epoch {epoch} valid"), batch, loss);
    }

    fn on_epoch_end(&mut self, summary: &EpochSummary) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
        let line = format!(
            "Epoch {}, Training Loss: {:.6}, Validation Loss: {:.6}",
            summary.epoch, summary.train_loss, summary.val_loss
        );
        if let Err(err) = self.multi.println(line) {
            tracing::debug!("progress output failed: {err}");
        }
    }

    fn on_fit_end(&mut self, _outcome: &TrainingOutcome) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
