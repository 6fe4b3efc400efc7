//! Mini-batch assembly.
//!
//! A [`BatchSource`] owns a [`WindowPool`] and hands out one epoch of batches
//! at a time. The visiting order is fixed before the epoch starts (shuffled
//! for training, ascending for validation), so a background producer only
//! copies window data and never decides order.
//!
//! With `prefetch > 0` the copying runs on a producer thread that feeds a
//! bounded channel; host buffers become tensors on the consumer side.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{Result, ShipTrajError};
use crate::window::WindowPool;

/// Order in which an epoch visits the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOrder {
    /// Fresh permutation every epoch.
    Shuffled,
    /// Ascending window index every epoch.
    Sequential,
}

/// Window data of one batch, still on the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostBatch {
    /// Windows in the batch.
    pub size: usize,
    /// Row-major `[size, input_len, features]`.
    pub inputs: Vec<f32>,
    /// Row-major `[size, horizon * features]`.
    pub targets: Vec<f32>,
}

/// A batch ready for the model.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[batch, input_len, features]`
    pub inputs: Tensor,
    /// `[batch, horizon * features]`
    pub targets: Tensor,
}

impl Batch {
    /// Number of windows in the batch.
    pub fn len(&self) -> usize {
        self.inputs.dims().first().copied().unwrap_or(0)
    }

    /// True for a batch without windows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Move a host batch onto `device`.
pub fn collate(host: HostBatch, pool: &WindowPool, device: &Device) -> Result<Batch> {
    if host.size == 0 {
        return Err(ShipTrajError::data("cannot collate empty batch"));
    }
    let windower = pool.windower();
    let inputs = Tensor::from_vec(
        host.inputs,
        (host.size, windower.input_len(), windower.features()),
        device,
    )?;
    let targets = Tensor::from_vec(host.targets, (host.size, pool.target_stride()), device)?;
    Ok(Batch { inputs, targets })
}

/// Batches over one split.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use candle_core::Device;
/// use shiptraj_rs::batch::BatchSource;
/// use shiptraj_rs::trajectory::TrajectoryRecord;
/// use shiptraj_rs::window::{SequenceWindower, WindowPool};
///
/// # fn main() -> shiptraj_rs::Result<()> {
/// let record = TrajectoryRecord::from_points(None, &[[0.5f32, 0.5]; 60])?;
/// let pool = WindowPool::from_records(&[record], SequenceWindower::new(18, 24, 2), "validation")?;
/// let mut source = BatchSource::sequential(Arc::new(pool), 8, Device::Cpu);
/// let sizes: Vec<usize> = source
///     .epoch()
///     .map(|b| b.map(|b| b.len()))
///     .collect::<shiptraj_rs::Result<_>>()?;
/// assert_eq!(sizes, vec![8, 8, 3]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct BatchSource {
    pool: Arc<WindowPool>,
    batch_size: usize,
    order: BatchOrder,
    rng: StdRng,
    prefetch: usize,
    device: Device,
}

impl BatchSource {
    /// Training source: reshuffled every epoch from a seeded RNG.
    pub fn shuffled(pool: Arc<WindowPool>, batch_size: usize, seed: u64, device: Device) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            order: BatchOrder::Shuffled,
            rng: StdRng::seed_from_u64(seed),
            prefetch: 0,
            device,
        }
    }

    /// Validation/evaluation source: same order every epoch.
    pub fn sequential(pool: Arc<WindowPool>, batch_size: usize, device: Device) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            order: BatchOrder::Sequential,
            rng: StdRng::seed_from_u64(0),
            prefetch: 0,
            device,
        }
    }

    /// Prepare up to `batches` batches ahead on a producer thread (0 = inline).
    #[must_use]
    pub fn with_prefetch(mut self, batches: usize) -> Self {
        self.prefetch = batches;
        self
    }

    /// The underlying pool.
    pub fn pool(&self) -> &WindowPool {
        &self.pool
    }

    /// Visiting order.
    pub fn order(&self) -> BatchOrder {
        self.order
    }

    /// Batches per epoch (the last one may be short).
    pub fn num_batches(&self) -> usize {
        self.pool.len().div_ceil(self.batch_size)
    }

    /// Window indices of the next epoch, already grouped into batches.
    fn plan(&mut self) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.pool.len()).collect();
        if self.order == BatchOrder::Shuffled {
            indices.shuffle(&mut self.rng);
        }
        indices.chunks(self.batch_size).map(<[usize]>::to_vec).collect()
    }

    /// Start one pass over the pool.
    pub fn epoch(&mut self) -> EpochBatches {
        let plan = self.plan();
        let pool = Arc::clone(&self.pool);
        let device = self.device.clone();

        if self.prefetch == 0 {
            return EpochBatches {
                pool,
                device,
                feed: Feed::Inline {
                    plan: plan.into_iter(),
                },
            };
        }

        let (tx, rx) = mpsc::sync_channel(self.prefetch);
        let producer_pool = Arc::clone(&pool);
        let handle = thread::spawn(move || {
            for chunk in plan {
                let (inputs, targets) = producer_pool.gather(&chunk);
                let host = HostBatch {
                    size: chunk.len(),
                    inputs,
                    targets,
                };
                // consumer hung up
                if tx.send(host).is_err() {
                    break;
                }
            }
        });

        EpochBatches {
            pool,
            device,
            feed: Feed::Prefetched {
                rx: Some(rx),
                handle: Some(handle),
            },
        }
    }
}

#[derive(Debug)]
enum Feed {
    Inline {
        plan: std::vec::IntoIter<Vec<usize>>,
    },
    Prefetched {
        rx: Option<Receiver<HostBatch>>,
        handle: Option<JoinHandle<()>>,
    },
}

/// One epoch of batches, returned by [`BatchSource::epoch`].
#[derive(Debug)]
pub struct EpochBatches {
    pool: Arc<WindowPool>,
    device: Device,
    feed: Feed,
}

impl EpochBatches {
    fn next_host(&mut self) -> Option<HostBatch> {
        match &mut self.feed {
            Feed::Inline { plan } => plan.next().map(|chunk| {
                let (inputs, targets) = self.pool.gather(&chunk);
                HostBatch {
                    size: chunk.len(),
                    inputs,
                    targets,
                }
            }),
            Feed::Prefetched { rx, .. } => rx.as_ref().and_then(|rx| rx.recv().ok()),
        }
    }
}

impl Iterator for EpochBatches {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let host = self.next_host()?;
        Some(collate(host, &self.pool, &self.device))
    }
}

impl Drop for EpochBatches {
    fn drop(&mut self) {
        if let Feed::Prefetched { rx, handle } = &mut self.feed {
            // unblock a producer waiting on a full channel
            drop(rx.take());
            if let Some(handle) = handle.take() {
                if handle.join().is_err() {
                    tracing::warn!("Batch producer thread panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::TrajectoryRecord;
    use crate::window::SequenceWindower;

    /// Pool whose window `i` has input values all equal to `i`.
    fn indexed_pool(n: usize) -> Arc<WindowPool> {
        let windower = SequenceWindower::new(1, 1, 2);
        let points: Vec<[f32; 2]> = (0..=n).map(|i| [i as f32, i as f32]).collect();
        let record = TrajectoryRecord::from_points(None, &points).unwrap();
        Arc::new(WindowPool::from_records(&[record], windower, "test").unwrap())
    }

    fn first_values(batches: EpochBatches) -> Vec<f32> {
        batches
            .flat_map(|b| {
                let b = b.unwrap();
                b.inputs.flatten_all().unwrap().to_vec1::<f32>().unwrap()
            })
            .step_by(2)
            .collect()
    }

    #[test]
    fn test_sequential_order_is_fixed() {
        let mut source = BatchSource::sequential(indexed_pool(10), 4, Device::Cpu);
        assert_eq!(source.num_batches(), 3);

        let first = first_values(source.epoch());
        let second = first_values(source.epoch());
        assert_eq!(first, (0..10).map(|i| i as f32).collect::<Vec<_>>());
        assert_eq!(first, second);
    }

    #[test]
    fn test_last_batch_may_be_short() {
        let mut source = BatchSource::sequential(indexed_pool(10), 4, Device::Cpu);
        let sizes: Vec<usize> = source.epoch().map(|b| b.unwrap().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_shuffled_is_permutation_and_reshuffles() {
        let mut source = BatchSource::shuffled(indexed_pool(64), 8, 42, Device::Cpu);
        let first = first_values(source.epoch());
        let second = first_values(source.epoch());

        let mut sorted = first.clone();
        sorted.sort_by(f32::total_cmp);
        assert_eq!(sorted, (0..64).map(|i| i as f32).collect::<Vec<_>>());
        assert_ne!(first, second);
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let mut a = BatchSource::shuffled(indexed_pool(32), 4, 7, Device::Cpu);
        let mut b = BatchSource::shuffled(indexed_pool(32), 4, 7, Device::Cpu);
        assert_eq!(first_values(a.epoch()), first_values(b.epoch()));
    }

    #[test]
    fn test_prefetch_matches_inline() {
        let mut inline = BatchSource::shuffled(indexed_pool(50), 6, 3, Device::Cpu);
        let mut prefetched =
            BatchSource::shuffled(indexed_pool(50), 6, 3, Device::Cpu).with_prefetch(2);
        assert_eq!(first_values(inline.epoch()), first_values(prefetched.epoch()));
    }

    #[test]
    fn test_dropping_epoch_early_stops_producer() {
        let mut source = BatchSource::sequential(indexed_pool(100), 1, Device::Cpu).with_prefetch(1);
        let mut epoch = source.epoch();
        assert!(epoch.next().is_some());
        drop(epoch);
        assert_eq!(source.epoch().count(), 100);
    }

    #[test]
    fn test_batch_shapes() {
        let windower = SequenceWindower::new(3, 2, 2);
        let record = TrajectoryRecord::from_points(None, &[[0.1f32, 0.2]; 12]).unwrap();
        let pool = Arc::new(WindowPool::from_records(&[record], windower, "train").unwrap());
        let mut source = BatchSource::sequential(pool, 5, Device::Cpu);
        let batch = source.epoch().next().unwrap().unwrap();
        assert_eq!(batch.inputs.dims(), &[5, 3, 2]);
        assert_eq!(batch.targets.dims(), &[5, 4]);
    }
}
