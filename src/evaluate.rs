//! Forecast scoring.
//!
//! Every window contributes one row of great-circle distances (meters, one
//! per forecast point) measured between positions denormalized with the
//! configured [`CoordinateBounds`], plus two RMSE values: one over all of its
//! normalized target values, as the model sees them, and one over its
//! latitude/longitude in degrees.

use std::sync::Arc;

use candle_core::Device;
use serde::{Deserialize, Serialize};

use crate::batch::BatchSource;
use crate::error::{Result, ShipTrajError};
use crate::geo::{haversine_distance, CoordinateBounds};
use crate::model::Forecaster;
use crate::window::WindowPool;

/// Root mean squared error, population convention.
///
/// Returns NaN for empty input.
///
/// ```rust
/// use shiptraj_rs::evaluate::rmse;
///
/// assert_eq!(rmse(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
/// assert_eq!(rmse(&[0.0, 0.0], &[3.0, 4.0]), (12.5f64).sqrt());
/// ```
pub fn rmse(truth: &[f64], pred: &[f64]) -> f64 {
    debug_assert_eq!(truth.len(), pred.len());
    if truth.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = truth.iter().zip(pred).map(|(t, p)| (t - p).powi(2)).sum();
    (sum / truth.len() as f64).sqrt()
}

/// Scores of a single window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowScore {
    /// Great-circle error per forecast point, in meters.
    pub distances_m: Vec<f64>,
    /// RMSE over every normalized target value of the window.
    pub rmse: f64,
    /// RMSE over latitude/longitude, in degrees.
    pub rmse_deg: f64,
}

/// Per-window, per-point errors of one evaluation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMatrix {
    horizon: usize,
    distances_m: Vec<f64>,
    rmse: Vec<f64>,
    rmse_deg: Vec<f64>,
}

impl ErrorMatrix {
    /// Empty matrix for windows of `horizon` points.
    pub fn new(horizon: usize) -> Self {
        Self {
            horizon,
            distances_m: Vec::new(),
            rmse: Vec::new(),
            rmse_deg: Vec::new(),
        }
    }

    /// Append one window's scores.
    ///
    /// # Errors
    ///
    /// Returns [`ShipTrajError::ShapeMismatch`] if the score does not have
    /// one distance per forecast point.
    pub fn push(&mut self, score: &WindowScore) -> Result<()> {
        if score.distances_m.len() != self.horizon {
            return Err(ShipTrajError::shape_mismatch(
                format!("{} distances", self.horizon),
                format!("{} distances", score.distances_m.len()),
            ));
        }
        self.distances_m.extend_from_slice(&score.distances_m);
        self.rmse.push(score.rmse);
        self.rmse_deg.push(score.rmse_deg);
        Ok(())
    }

    /// Number of evaluated windows.
    pub fn len(&self) -> usize {
        self.rmse.len()
    }

    /// True when no window was evaluated.
    pub fn is_empty(&self) -> bool {
        self.rmse.is_empty()
    }

    /// Forecast points per window.
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Distances in meters of window `i`.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.distances_m[i * self.horizon..(i + 1) * self.horizon]
    }

    /// Per-window RMSE values in normalized units.
    pub fn rmse_values(&self) -> &[f64] {
        &self.rmse
    }

    /// Per-window latitude/longitude RMSE values in degrees.
    pub fn rmse_deg_values(&self) -> &[f64] {
        &self.rmse_deg
    }

    fn ensure_non_empty(&self, what: &str) -> Result<()> {
        if self.is_empty() {
            Err(ShipTrajError::EmptyEvaluation(format!(
                "{what} requested over zero windows"
            )))
        } else {
            Ok(())
        }
    }

    /// Mean of the per-window RMSE values, in normalized units.
    pub fn mean_rmse(&self) -> Result<f64> {
        self.ensure_non_empty("mean RMSE")?;
        Ok(self.rmse.iter().sum::<f64>() / self.len() as f64)
    }

    /// Mean of the per-window latitude/longitude RMSE values, in degrees.
    pub fn mean_rmse_deg(&self) -> Result<f64> {
        self.ensure_non_empty("mean RMSE")?;
        Ok(self.rmse_deg.iter().sum::<f64>() / self.len() as f64)
    }

    /// Mean great-circle error over every point of every window, in km.
    pub fn mean_distance_km(&self) -> Result<f64> {
        self.ensure_non_empty("mean distance")?;
        let total: f64 = self.distances_m.iter().sum();
        Ok(total / self.distances_m.len() as f64 / 1000.0)
    }

    /// Mean great-circle error at each forecast step, in km.
    ///
    /// Index 0 is the first forecast point.
    pub fn per_point_mean_km(&self) -> Result<Vec<f64>> {
        self.ensure_non_empty("per-point mean distance")?;
        let mut sums = vec![0.0; self.horizon];
        for row in self.distances_m.chunks_exact(self.horizon) {
            for (sum, d) in sums.iter_mut().zip(row) {
                *sum += d;
            }
        }
        let n = self.len() as f64;
        Ok(sums.into_iter().map(|s| s / n / 1000.0).collect())
    }

    /// Collect all aggregates.
    pub fn summary(&self) -> Result<EvaluationSummary> {
        Ok(EvaluationSummary {
            windows: self.len(),
            horizon: self.horizon,
            mean_rmse: self.mean_rmse()?,
            mean_rmse_deg: self.mean_rmse_deg()?,
            mean_distance_km: self.mean_distance_km()?,
            per_point_mean_km: self.per_point_mean_km()?,
        })
    }
}

/// Aggregate scores of one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    /// Evaluated windows.
    pub windows: usize,
    /// Forecast points per window.
    pub horizon: usize,
    /// Mean per-window RMSE over all normalized target values.
    pub mean_rmse: f64,
    /// Mean per-window RMSE of latitude/longitude, in degrees.
    pub mean_rmse_deg: f64,
    /// Mean great-circle error, in km.
    pub mean_distance_km: f64,
    /// Mean great-circle error per forecast point, in km.
    pub per_point_mean_km: Vec<f64>,
}

/// Runs a forecaster over a window pool and scores the result.
#[derive(Debug, Clone)]
pub struct Evaluator {
    bounds: CoordinateBounds,
    batch_size: usize,
}

impl Evaluator {
    /// Create an evaluator.
    pub fn new(bounds: CoordinateBounds, batch_size: usize) -> Self {
        Self {
            bounds,
            batch_size: batch_size.max(1),
        }
    }

    /// Score one window given normalized row-major `[horizon, features]`
    /// targets and forecasts.
    ///
    /// # Errors
    ///
    /// Returns [`ShipTrajError::ShapeMismatch`] if there are fewer than two
    /// channels, or the slices are empty, differ in length or do not hold
    /// whole points.
    pub fn score_window(&self, truth: &[f32], pred: &[f32], features: usize) -> Result<WindowScore> {
        if features < 2 {
            return Err(ShipTrajError::shape_mismatch(
                "latitude and longitude channels",
                format!("{features} channel(s)"),
            ));
        }
        if truth.is_empty() || truth.len() != pred.len() || truth.len() % features != 0 {
            return Err(ShipTrajError::shape_mismatch(
                format!("matching whole points of {features} channels"),
                format!("{} target and {} forecast values", truth.len(), pred.len()),
            ));
        }

        let points = truth.len() / features;
        let mut distances_m = Vec::with_capacity(points);
        let mut truth_deg = Vec::with_capacity(2 * points);
        let mut pred_deg = Vec::with_capacity(2 * points);

        for (t, p) in truth.chunks_exact(features).zip(pred.chunks_exact(features)) {
            let t = self.bounds.denormalize(f64::from(t[0]), f64::from(t[1]));
            let p = self.bounds.denormalize(f64::from(p[0]), f64::from(p[1]));
            distances_m.push(haversine_distance(t, p));
            truth_deg.extend([t.lat, t.lon]);
            pred_deg.extend([p.lat, p.lon]);
        }

        let truth_norm: Vec<f64> = truth.iter().copied().map(f64::from).collect();
        let pred_norm: Vec<f64> = pred.iter().copied().map(f64::from).collect();

        Ok(WindowScore {
            distances_m,
            rmse: rmse(&truth_norm, &pred_norm),
            rmse_deg: rmse(&truth_deg, &pred_deg),
        })
    }

    /// Forecast every window of `pool` in index order and score it.
    ///
    /// # Errors
    ///
    /// Returns [`ShipTrajError::ShapeMismatch`] if the forecaster's output
    /// does not match the pool's target shape.
    pub fn evaluate<F: Forecaster + ?Sized>(
        &self,
        forecaster: &F,
        pool: Arc<WindowPool>,
        device: &Device,
    ) -> Result<ErrorMatrix> {
        let windower = pool.windower();
        let features = windower.features();
        if forecaster.horizon() != windower.horizon() || forecaster.features() != features {
            return Err(ShipTrajError::shape_mismatch(
                format!("{} x {} forecast", windower.horizon(), features),
                format!("{} x {} forecast", forecaster.horizon(), forecaster.features()),
            ));
        }

        let mut matrix = ErrorMatrix::new(windower.horizon());
        let mut source = BatchSource::sequential(pool, self.batch_size, device.clone());
        for batch in source.epoch() {
            let batch = batch?;
            let forecast = forecaster.forecast(&batch.inputs)?;
            if forecast.dims() != batch.targets.dims() {
                return Err(ShipTrajError::shape_mismatch(
                    format!("forecast {:?}", batch.targets.dims()),
                    format!("forecast {:?}", forecast.dims()),
                ));
            }
            let truth = batch.targets.to_vec2::<f32>()?;
            let pred = forecast.to_vec2::<f32>()?;
            for (t, p) in truth.iter().zip(&pred) {
                matrix.push(&self.score_window(t, p, features)?)?;
            }
        }

        tracing::debug!("Evaluated {} windows", matrix.len());
        Ok(matrix)
    }
}
