//! Trajectory records, loading and integrity filtering.
//!
//! Input files hold one object per vessel track with a `traj` field: a 2-D
//! array whose rows are points and whose first two columns are normalized
//! latitude and longitude. Further columns (speed, course, ...) are kept but
//! ignored by the baseline windower. Missing values are written as `null` and
//! become NaN here, so the integrity check is a single predicate.
//!
//! Both a JSON array of records and JSON Lines (one record per line) are read.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShipTrajError};

/// One observed vessel track.
///
/// Points are stored row-major: point `i`, feature `j` lives at
/// `values[i * features + j]`.
///
/// # Example
///
/// ```rust
/// use shiptraj_rs::trajectory::TrajectoryRecord;
///
/// let record = TrajectoryRecord::from_points(None, &[[0.1, 0.2], [0.3, 0.4]]).unwrap();
/// assert_eq!(record.len(), 2);
/// assert_eq!(record.point(1), &[0.3, 0.4]);
/// assert!(record.is_complete());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryRecord {
    mmsi: Option<u64>,
    features: usize,
    values: Vec<f32>,
}

impl TrajectoryRecord {
    /// Create a record from a row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ShipTrajError::Data`] if `values` is not a whole number of
    /// points.
    pub fn new(mmsi: Option<u64>, features: usize, values: Vec<f32>) -> Result<Self> {
        if features == 0 && !values.is_empty() {
            return Err(ShipTrajError::data("trajectory points have zero features"));
        }
        if features > 0 && values.len() % features != 0 {
            return Err(ShipTrajError::data(format!(
                "trajectory buffer of {} values is not a multiple of {} features",
                values.len(),
                features
            )));
        }
        Ok(Self {
            mmsi,
            features,
            values,
        })
    }

    /// Create a record from fixed-width points.
    pub fn from_points<const F: usize>(mmsi: Option<u64>, points: &[[f32; F]]) -> Result<Self> {
        let values = points.iter().flat_map(|p| p.iter().copied()).collect();
        Self::new(mmsi, F, values)
    }

    /// Vessel identifier, when the source provides one.
    pub fn mmsi(&self) -> Option<u64> {
        self.mmsi
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        if self.features == 0 {
            0
        } else {
            self.values.len() / self.features
        }
    }

    /// True when the track has no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Features per point.
    pub fn features(&self) -> usize {
        self.features
    }

    /// Feature vector of point `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    pub fn point(&self, i: usize) -> &[f32] {
        &self.values[i * self.features..(i + 1) * self.features]
    }

    /// Iterate over points in time order.
    pub fn points(&self) -> impl Iterator<Item = &[f32]> {
        self.values.chunks_exact(self.features.max(1))
    }

    /// Row-major point buffer.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// True when no feature of any point is missing.
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(|v| !v.is_nan())
    }

    /// True when every feature is a finite number.
    ///
    /// Values too large for `f32` are read as infinity.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    mmsi: Option<u64>,
    traj: Vec<Vec<Option<f32>>>,
}

impl TryFrom<RawRecord> for TrajectoryRecord {
    type Error = ShipTrajError;

    fn try_from(raw: RawRecord) -> Result<Self> {
        let features = raw.traj.first().map_or(0, Vec::len);
        let mut values = Vec::with_capacity(raw.traj.len() * features);
        for (i, row) in raw.traj.iter().enumerate() {
            if row.len() != features {
                return Err(ShipTrajError::data(format!(
                    "ragged trajectory{}: point {} has {} features, expected {}",
                    raw.mmsi.map(|m| format!(" (mmsi {m})")).unwrap_or_default(),
                    i,
                    row.len(),
                    features
                )));
            }
            values.extend(row.iter().map(|v| v.unwrap_or(f32::NAN)));
        }
        TrajectoryRecord::new(raw.mmsi, features, values)
    }
}

/// Read a trajectory collection from a JSON array or JSON Lines file.
///
/// Files ending in `.jsonl` are read line by line; anything else is parsed as
/// a single JSON array.
///
/// # Errors
///
/// Returns [`ShipTrajError::Data`] if the file is missing or a record is
/// malformed.
pub fn load_trajectories(path: impl AsRef<Path>) -> Result<Vec<TrajectoryRecord>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ShipTrajError::data(format!(
            "trajectory file does not exist: {}",
            path.display()
        )));
    }

    let is_jsonl = path.extension().is_some_and(|e| e == "jsonl");
    let reader = BufReader::new(File::open(path)?);

    let raw: Vec<RawRecord> = if is_jsonl {
        let mut records = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                ShipTrajError::data(format!("{}:{}: {}", path.display(), line_no + 1, e))
            })?;
            records.push(record);
        }
        records
    } else {
        serde_json::from_reader(reader)
            .map_err(|e| ShipTrajError::data(format!("{}: {}", path.display(), e)))?
    };

    let records = raw
        .into_iter()
        .map(TrajectoryRecord::try_from)
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!("Read {} trajectories from {}", records.len(), path.display());
    Ok(records)
}

/// Counts of what [`TrajectoryFilter::apply`] kept and why it dropped the rest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterReport {
    /// Records that passed.
    pub kept: usize,
    /// Records dropped for NaN values.
    pub missing_values: usize,
    /// Records dropped for infinite values.
    #[serde(default)]
    pub non_finite: usize,
    /// Records dropped for being too short.
    pub too_short: usize,
    /// Records dropped for having fewer feature columns than required.
    pub too_few_features: usize,
}

impl FilterReport {
    /// Number of records dropped for any reason.
    pub fn dropped(&self) -> usize {
        self.missing_values + self.non_finite + self.too_short + self.too_few_features
    }
}

/// Drops tracks that contain missing values or are too short to window.
///
/// A track survives when every feature is finite (no NaN, no infinity), it
/// has at least `required_features` columns, and strictly more than
/// `min_len` points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrajectoryFilter {
    min_len: usize,
    required_features: usize,
}

impl TrajectoryFilter {
    /// Create a filter keeping tracks longer than `min_len` points.
    pub fn new(min_len: usize, required_features: usize) -> Self {
        Self {
            min_len,
            required_features,
        }
    }

    /// Exclusive length threshold.
    pub fn min_len(&self) -> usize {
        self.min_len
    }

    /// Check a single record.
    pub fn accepts(&self, record: &TrajectoryRecord) -> bool {
        self.rejection(record).is_none()
    }

    fn rejection(&self, record: &TrajectoryRecord) -> Option<Rejection> {
        if record.features() < self.required_features {
            Some(Rejection::TooFewFeatures)
        } else if !record.is_complete() {
            Some(Rejection::MissingValues)
        } else if !record.is_finite() {
            Some(Rejection::NonFinite)
        } else if record.len() <= self.min_len {
            Some(Rejection::TooShort)
        } else {
            None
        }
    }

    /// Return copies of the accepted records and a report of the rest.
    pub fn apply(&self, records: &[TrajectoryRecord]) -> (Vec<TrajectoryRecord>, FilterReport) {
        let mut report = FilterReport::default();
        let mut kept = Vec::with_capacity(records.len());

        for record in records {
            match self.rejection(record) {
                None => {
                    report.kept += 1;
                    kept.push(record.clone());
                }
                Some(Rejection::MissingValues) => report.missing_values += 1,
                Some(Rejection::NonFinite) => report.non_finite += 1,
                Some(Rejection::TooShort) => report.too_short += 1,
                Some(Rejection::TooFewFeatures) => report.too_few_features += 1,
            }
        }

        (kept, report)
    }
}

#[derive(Debug, Clone, Copy)]
enum Rejection {
    MissingValues,
    NonFinite,
    TooShort,
    TooFewFeatures,
}
