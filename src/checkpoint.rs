//! Best-checkpoint persistence.
//!
//! Exactly one checkpoint lives in the output directory: a
//! `best_model-epochNNNN.safetensors` parameter file and `best_model.json`,
//! which names that file and records the epoch and losses it was selected
//! for. A save writes the new parameter file first and then atomically
//! replaces the metadata; only after that is the previous parameter file
//! removed. A crash at any point leaves a metadata file that names a
//! complete parameter file.

use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Result, ShipTrajError};
use crate::model::TrajectoryModel;

/// Metadata file name; the commit point of a checkpoint.
pub const METADATA_FILE: &str = "best_model.json";

const WEIGHTS_PREFIX: &str = "best_model-epoch";
const WEIGHTS_EXTENSION: &str = ".safetensors";

/// Parameter file name for the checkpoint of `epoch`.
///
/// ```rust
/// use shiptraj_rs::checkpoint::weights_file_name;
///
/// assert_eq!(weights_file_name(7), "best_model-epoch0007.safetensors");
/// ```
pub fn weights_file_name(epoch: usize) -> String {
    format!("{WEIGHTS_PREFIX}{epoch:04}{WEIGHTS_EXTENSION}")
}

fn is_weights_file(name: &str) -> bool {
    name.starts_with(WEIGHTS_PREFIX) && name.ends_with(WEIGHTS_EXTENSION)
}

/// What the stored checkpoint was selected for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// One-based epoch that produced the parameters.
    pub epoch: usize,
    /// Mean validation loss of that epoch.
    pub val_loss: f64,
    /// Mean training loss of that epoch.
    pub train_loss: f64,
    /// Scalar parameter count, for a cheap compatibility check.
    pub parameter_count: usize,
    /// Parameter file in the same directory.
    pub weights_file: String,
    /// When the checkpoint was written.
    pub saved_at: DateTime<Utc>,
}

/// Keeps the parameters of the epoch with the lowest validation loss.
#[derive(Debug)]
pub struct BestCheckpoint {
    dir: PathBuf,
    best: Option<CheckpointMetadata>,
}

impl BestCheckpoint {
    /// Track a new best checkpoint in `dir`, creating it if needed.
    ///
    /// Any checkpoint already on disk is ignored for selection and restore,
    /// and is replaced by the first save of this run.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, best: None })
    }

    /// Directory holding the checkpoint.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the parameter file saved by this run, if any.
    pub fn weights_path(&self) -> Option<PathBuf> {
        self.best.as_ref().map(|m| self.dir.join(&m.weights_file))
    }

    /// Path of the metadata file.
    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    /// Metadata of the checkpoint saved by this run, if any.
    pub fn best(&self) -> Option<&CheckpointMetadata> {
        self.best.as_ref()
    }

    /// Lowest validation loss saved so far.
    pub fn best_loss(&self) -> Option<f64> {
        self.best.as_ref().map(|m| m.val_loss)
    }

    /// True when `val_loss` is finite and strictly lower than the best so far.
    pub fn is_improvement(&self, val_loss: f64) -> bool {
        match self.best_loss() {
            _ if !val_loss.is_finite() => false,
            None => true,
            Some(best) => val_loss < best,
        }
    }

    /// Save `model` if `val_loss` strictly improves on the best so far.
    ///
    /// Returns `true` when a new checkpoint was written. Nothing touches the
    /// disk otherwise.
    pub fn offer(
        &mut self,
        model: &TrajectoryModel,
        epoch: usize,
        train_loss: f64,
        val_loss: f64,
    ) -> Result<bool> {
        if !self.is_improvement(val_loss) {
            return Ok(false);
        }

        let metadata = CheckpointMetadata {
            epoch,
            val_loss,
            train_loss,
            parameter_count: model.parameter_count(),
            weights_file: weights_file_name(epoch),
            saved_at: Utc::now(),
        };
        let weights_path = self.dir.join(&metadata.weights_file);

        let weights = NamedTempFile::new_in(&self.dir)?;
        model.save(weights.path())?;
        weights
            .persist(&weights_path)
            .map_err(|e| ShipTrajError::checkpoint(format!("failed to write weights: {e}")))?;

        let mut meta_file = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut meta_file, &metadata)?;
        meta_file.flush()?;
        meta_file
            .persist(self.metadata_path())
            .map_err(|e| ShipTrajError::checkpoint(format!("failed to replace metadata: {e}")))?;

        self.remove_stale_weights(&metadata.weights_file)?;

        tracing::info!(
            "Saved best checkpoint (epoch {}, val loss {:.6}) to {}",
            epoch,
            val_loss,
            weights_path.display()
        );
        self.best = Some(metadata);
        Ok(true)
    }

    fn remove_stale_weights(&self, keep: &str) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if is_weights_file(name) && name != keep {
                fs::remove_file(entry.path())?;
                tracing::debug!("Removed superseded checkpoint {}", name);
            }
        }
        Ok(())
    }

    /// Load the parameters saved by this run into `model`.
    ///
    /// # Errors
    ///
    /// Returns [`ShipTrajError::Checkpoint`] if no epoch of this run was
    /// saved, or if the checkpoint on disk is no longer the one this run
    /// wrote.
    pub fn restore(&self, model: &mut TrajectoryModel) -> Result<CheckpointMetadata> {
        let Some(best) = &self.best else {
            return Err(ShipTrajError::checkpoint(format!(
                "no checkpoint saved in this run (no finite validation loss) in {}",
                self.dir.display()
            )));
        };
        let on_disk = read_metadata(&self.dir)?;
        if on_disk.epoch != best.epoch || on_disk.weights_file != best.weights_file {
            return Err(ShipTrajError::checkpoint(format!(
                "checkpoint in {} is from epoch {}, this run saved epoch {}",
                self.dir.display(),
                on_disk.epoch,
                best.epoch
            )));
        }
        restore_from(&self.dir, model)
    }
}

/// Read the metadata of the checkpoint in `dir`.
pub fn read_metadata(dir: &Path) -> Result<CheckpointMetadata> {
    let path = dir.join(METADATA_FILE);
    let content = fs::read_to_string(&path).map_err(|e| {
        ShipTrajError::checkpoint(format!("no checkpoint metadata at {}: {e}", path.display()))
    })?;
    let metadata: CheckpointMetadata = serde_json::from_str(&content)?;
    if !is_weights_file(&metadata.weights_file)
        || Path::new(&metadata.weights_file).file_name() != Some(OsStr::new(&metadata.weights_file))
    {
        return Err(ShipTrajError::checkpoint(format!(
            "{} names an invalid weights file '{}'",
            path.display(),
            metadata.weights_file
        )));
    }
    Ok(metadata)
}

/// Load the checkpoint stored in `dir` into `model`.
///
/// # Errors
///
/// Fails if the metadata or the parameter file it names is missing, the
/// parameter count recorded in the metadata disagrees with `model`, or a
/// tensor does not fit.
pub fn restore_from(dir: &Path, model: &mut TrajectoryModel) -> Result<CheckpointMetadata> {
    let metadata = read_metadata(dir)?;
    if metadata.parameter_count != model.parameter_count() {
        return Err(ShipTrajError::checkpoint(format!(
            "checkpoint holds {} parameters, model has {}",
            metadata.parameter_count,
            model.parameter_count()
        )));
    }
    model.load_weights(&dir.join(&metadata.weights_file))?;
    tracing::info!(
        "Restored checkpoint from epoch {} (val loss {:.6})",
        metadata.epoch,
        metadata.val_loss
    );
    Ok(metadata)
}
