//! Plateau detection on the validation loss.
//!
//! Only decides whether to keep training. Checkpoint selection stays with
//! [`BestCheckpoint`](crate::checkpoint::BestCheckpoint) and its strict
//! improvement rule, independent of `min_delta` here.
//!
//! # Example
//!
//! ```
//! use shiptraj_rs::early_stopping::{EarlyStopping, StoppingDecision};
//!
//! let mut early_stop = EarlyStopping::new(2, 0.0);
//! assert_eq!(early_stop.check(0.5, 1), StoppingDecision::NewBest);
//! assert!(matches!(early_stop.check(0.6, 2), StoppingDecision::NoImprovement { .. }));
//! assert_eq!(early_stop.check(0.7, 3), StoppingDecision::Stop);
//! ```

use crate::config::EarlyStoppingConfig;

/// Early stopping state tracker.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    /// Epochs with no improvement before stopping.
    patience: usize,
    /// Minimum decrease to qualify as improvement.
    min_delta: f64,
    best_value: f64,
    best_epoch: usize,
    counter: usize,
    stopped: bool,
}

/// Result of checking an epoch's validation loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoppingDecision {
    /// Loss improved by more than `min_delta`.
    NewBest,
    /// No improvement, but patience not exhausted.
    NoImprovement {
        /// Epochs without improvement.
        count: usize,
        /// Epochs remaining before stopping.
        remaining: usize,
    },
    /// Patience exhausted.
    Stop,
}

impl EarlyStopping {
    /// Create a tracker.
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            best_value: f64::INFINITY,
            best_epoch: 0,
            counter: 0,
            stopped: false,
        }
    }

    /// Create a tracker from the `training.early_stopping` section.
    pub fn from_config(config: &EarlyStoppingConfig) -> Self {
        Self::new(config.patience, config.min_delta)
    }

    /// Record the validation loss of `epoch`.
    pub fn check(&mut self, value: f64, epoch: usize) -> StoppingDecision {
        if self.stopped {
            return StoppingDecision::Stop;
        }

        // NaN compares false, so it never counts as improvement
        if self.best_value - value > self.min_delta {
            self.best_value = value;
            self.best_epoch = epoch;
            self.counter = 0;
            return StoppingDecision::NewBest;
        }

        self.counter += 1;
        if self.counter >= self.patience {
            self.stopped = true;
            StoppingDecision::Stop
        } else {
            StoppingDecision::NoImprovement {
                count: self.counter,
                remaining: self.patience - self.counter,
            }
        }
    }

    /// True once patience ran out.
    pub fn should_stop(&self) -> bool {
        self.stopped
    }

    /// Epoch of the best value seen.
    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    /// Best value seen.
    pub fn best_value(&self) -> f64 {
        self.best_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stops_after_patience() {
        let mut es = EarlyStopping::new(3, 0.0);
        assert_eq!(es.check(1.0, 1), StoppingDecision::NewBest);
        assert_eq!(
            es.check(1.0, 2),
            StoppingDecision::NoImprovement {
                count: 1,
                remaining: 2
            }
        );
        assert_eq!(
            es.check(1.1, 3),
            StoppingDecision::NoImprovement {
                count: 2,
                remaining: 1
            }
        );
        assert_eq!(es.check(1.2, 4), StoppingDecision::Stop);
        assert!(es.should_stop());
        assert_eq!(es.check(0.1, 5), StoppingDecision::Stop);
        assert_eq!(es.best_epoch(), 1);
    }

    #[test]
    fn test_improvement_resets_counter() {
        let mut es = EarlyStopping::new(2, 0.0);
        es.check(1.0, 1);
        es.check(1.5, 2);
        assert_eq!(es.check(0.9, 3), StoppingDecision::NewBest);
        assert!(matches!(es.check(0.95, 4), StoppingDecision::NoImprovement { count: 1, .. }));
        assert_eq!(es.best_value(), 0.9);
    }

    #[test]
    fn test_min_delta_threshold() {
        let mut es = EarlyStopping::new(5, 0.01);
        es.check(1.0, 1);
        assert!(matches!(es.check(0.995, 2), StoppingDecision::NoImprovement { .. }));
        assert_eq!(es.check(0.98, 3), StoppingDecision::NewBest);
    }

    #[test]
    fn test_nan_is_not_improvement() {
        let mut es = EarlyStopping::new(1, 0.0);
        es.check(1.0, 1);
        assert_eq!(es.check(f64::NAN, 2), StoppingDecision::Stop);
    }

    #[test]
    fn test_from_config() {
        let es = EarlyStopping::from_config(&EarlyStoppingConfig {
            patience: 4,
            min_delta: 0.5,
        });
        assert_eq!(es.patience, 4);
        assert_eq!(es.min_delta, 0.5);
    }
}
