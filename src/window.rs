//! Sliding-window extraction of (input, target) pairs.
//!
//! A track of `n` points yields one window per start offset `i` with
//! `i + input_len + horizon <= n`: the input is points `[i, i + input_len)`
//! and the target is the `horizon` points that follow. Only the leading
//! `features` columns of each point are copied (latitude and longitude for
//! the baseline).

use serde::{Deserialize, Serialize};

use crate::config::WindowConfig;
use crate::error::{Result, ShipTrajError};
use crate::trajectory::TrajectoryRecord;

/// Window geometry.
///
/// # Example
///
/// ```rust
/// use shiptraj_rs::trajectory::TrajectoryRecord;
/// use shiptraj_rs::window::SequenceWindower;
///
/// let record = TrajectoryRecord::from_points(None, &[[0.5f32, 0.5]; 60]).unwrap();
/// let windower = SequenceWindower::new(18, 24, 2);
/// assert_eq!(windower.windows(&record).len(), 19);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceWindower {
    input_len: usize,
    horizon: usize,
    features: usize,
}

impl SequenceWindower {
    /// Create a windower.
    pub fn new(input_len: usize, horizon: usize, features: usize) -> Self {
        Self {
            input_len,
            horizon,
            features,
        }
    }

    /// Create a windower from the `window` config section.
    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(config.input_len, config.horizon, config.features)
    }

    /// Points per input sequence.
    pub fn input_len(&self) -> usize {
        self.input_len
    }

    /// Points per target sequence.
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Channels copied per point.
    pub fn features(&self) -> usize {
        self.features
    }

    /// Points spanned by one window.
    pub fn span(&self) -> usize {
        self.input_len + self.horizon
    }

    /// Number of windows a record yields.
    ///
    /// Zero when the record is shorter than [`span`](Self::span) or has fewer
    /// channels than the windower copies.
    pub fn window_count(&self, record: &TrajectoryRecord) -> usize {
        if record.features() < self.features {
            return 0;
        }
        (record.len() + 1).saturating_sub(self.span())
    }

    /// Lazily iterate over the windows of `record` in ascending start order.
    pub fn windows<'a>(&self, record: &'a TrajectoryRecord) -> Windows<'a> {
        Windows {
            windower: *self,
            record,
            next: 0,
            end: self.window_count(record),
        }
    }
}

/// One (input, target) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// Start offset within the source track.
    pub start: usize,
    /// Row-major `[input_len, features]`.
    pub input: Vec<f32>,
    /// Row-major `[horizon, features]`.
    pub target: Vec<f32>,
}

/// Iterator returned by [`SequenceWindower::windows`].
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    windower: SequenceWindower,
    record: &'a TrajectoryRecord,
    next: usize,
    end: usize,
}

impl Windows<'_> {
    fn copy_points(&self, from: usize, count: usize) -> Vec<f32> {
        let f = self.windower.features;
        let mut out = Vec::with_capacity(count * f);
        for i in from..from + count {
            out.extend_from_slice(&self.record.point(i)[..f]);
        }
        out
    }
}

impl Iterator for Windows<'_> {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.next >= self.end {
            return None;
        }
        let start = self.next;
        self.next += 1;

        let input_len = self.windower.input_len;
        Some(Window {
            start,
            input: self.copy_points(start, input_len),
            target: self.copy_points(start + input_len, self.windower.horizon),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows<'_> {}

/// Every window of one split, flattened into two contiguous buffers.
///
/// Windows keep no reference to the track they came from.
#[derive(Debug, Clone)]
pub struct WindowPool {
    windower: SequenceWindower,
    source_features: usize,
    inputs: Vec<f32>,
    targets: Vec<f32>,
    len: usize,
}

impl WindowPool {
    /// Window every record of a split.
    ///
    /// # Errors
    ///
    /// - [`ShipTrajError::ShapeMismatch`] if records disagree on their
    ///   feature count.
    /// - [`ShipTrajError::EmptyDataset`] if no record yields a window.
    pub fn from_records(
        records: &[TrajectoryRecord],
        windower: SequenceWindower,
        split: &str,
    ) -> Result<Self> {
        let source_features = records.first().map_or(0, TrajectoryRecord::features);
        if let Some(odd) = records.iter().find(|r| r.features() != source_features) {
            return Err(ShipTrajError::shape_mismatch(
                format!("{source_features} features in every '{split}' trajectory"),
                format!("{} features", odd.features()),
            ));
        }

        let total: usize = records.iter().map(|r| windower.window_count(r)).sum();
        if total == 0 {
            return Err(ShipTrajError::empty_dataset(split));
        }

        let f = windower.features;
        let mut inputs = Vec::with_capacity(total * windower.input_len * f);
        let mut targets = Vec::with_capacity(total * windower.horizon * f);
        for record in records {
            for window in windower.windows(record) {
                inputs.extend_from_slice(&window.input);
                targets.extend_from_slice(&window.target);
            }
        }

        tracing::debug!(
            "Split '{}': {} windows from {} trajectories",
            split,
            total,
            records.len()
        );

        Ok(Self {
            windower,
            source_features,
            inputs,
            targets,
            len: total,
        })
    }

    /// Number of windows.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the pool holds no windows.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Geometry the pool was built with.
    pub fn windower(&self) -> SequenceWindower {
        self.windower
    }

    /// Feature count of the source trajectories (before channel selection).
    pub fn source_features(&self) -> usize {
        self.source_features
    }

    /// Values per input window.
    pub fn input_stride(&self) -> usize {
        self.windower.input_len * self.windower.features
    }

    /// Values per target window.
    pub fn target_stride(&self) -> usize {
        self.windower.horizon * self.windower.features
    }

    /// Input of window `i`, row-major `[input_len, features]`.
    pub fn input(&self, i: usize) -> &[f32] {
        let s = self.input_stride();
        &self.inputs[i * s..(i + 1) * s]
    }

    /// Target of window `i`, row-major `[horizon, features]`.
    pub fn target(&self, i: usize) -> &[f32] {
        let s = self.target_stride();
        &self.targets[i * s..(i + 1) * s]
    }

    /// Concatenate inputs and targets of the given windows.
    pub fn gather(&self, indices: &[usize]) -> (Vec<f32>, Vec<f32>) {
        let mut inputs = Vec::with_capacity(indices.len() * self.input_stride());
        let mut targets = Vec::with_capacity(indices.len() * self.target_stride());
        for &i in indices {
            inputs.extend_from_slice(self.input(i));
            targets.extend_from_slice(self.target(i));
        }
        (inputs, targets)
    }

    /// Check that `other` can be scored by a model trained on `self`.
    ///
    /// # Errors
    ///
    /// Returns [`ShipTrajError::ShapeMismatch`] when the window geometry or
    /// the source feature counts differ.
    pub fn ensure_compatible(&self, other: &WindowPool) -> Result<()> {
        if self.windower != other.windower {
            return Err(ShipTrajError::shape_mismatch(
                format!("{:?}", self.windower),
                format!("{:?}", other.windower),
            ));
        }
        if self.source_features != other.source_features {
            return Err(ShipTrajError::shape_mismatch(
                format!("{} features per point", self.source_features),
                format!("{} features per point", other.source_features),
            ));
        }
        Ok(())
    }
}
