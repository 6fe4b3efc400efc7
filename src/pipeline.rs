//! End-to-end orchestration: load → filter → window → train → evaluate → report.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::batch::BatchSource;
use crate::checkpoint::{self, BestCheckpoint, CheckpointMetadata};
use crate::compute::ComputeContext;
use crate::config::{EvalSplit, PipelineConfig};
use crate::error::{Result, ShipTrajError};
use crate::evaluate::{EvaluationSummary, Evaluator};
use crate::model::TrajectoryModel;
use crate::observer::{ProgressObserver, TracingObserver};
use crate::report::{self, ReportPaths};
use crate::trainer::{Trainer, TrainingOutcome};
use crate::trajectory::{load_trajectories, FilterReport, TrajectoryFilter};
use crate::window::{SequenceWindower, WindowPool};

/// Name of the effective configuration saved next to the outputs.
pub const CONFIG_COPY_FILE: &str = "config.yaml";

/// Everything a full run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Training history and best epoch.
    pub training: TrainingOutcome,
    /// Checkpoint the evaluation used.
    pub checkpoint: CheckpointMetadata,
    /// Scores on the evaluation split.
    pub evaluation: EvaluationSummary,
    /// Report files written.
    pub reports: ReportPaths,
}

/// One split after filtering and windowing.
#[derive(Debug, Clone)]
pub struct PreparedSplit {
    /// Windows of the split.
    pub pool: Arc<WindowPool>,
    /// What the integrity filter dropped.
    pub filter: FilterReport,
}

/// Runs the pipeline described by a [`PipelineConfig`].
///
/// # Example
///
/// ```no_run
/// use shiptraj_rs::{Pipeline, PipelineConfig};
///
/// # fn main() -> shiptraj_rs::Result<()> {
/// let config = PipelineConfig::from_file("config.yaml")?;
/// let report = Pipeline::new(config)?.run()?;
/// println!("mean error {:.3} km", report.evaluation.mean_distance_km);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    ctx: ComputeContext,
}

impl Pipeline {
    /// Validate `config` and resolve its compute device.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let ctx = ComputeContext::from_setting(config.device);
        Self::with_context(config, ctx)
    }

    /// Validate `config` and use an explicit compute context.
    pub fn with_context(config: PipelineConfig, ctx: ComputeContext) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, ctx })
    }

    /// The configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Output directory for checkpoints and reports.
    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.output_dir)
    }

    fn windower(&self) -> SequenceWindower {
        SequenceWindower::from_config(&self.config.window)
    }

    /// Load, filter and window one split.
    pub fn prepare_split(&self, path: &str, split: &str) -> Result<PreparedSplit> {
        let records = load_trajectories(path)?;
        let filter = TrajectoryFilter::new(self.config.min_track_len(), self.config.window.features);
        let (kept, report) = filter.apply(&records);

        tracing::info!(
            "Split '{}': kept {} of {} trajectories from {}",
            split,
            report.kept,
            records.len(),
            path
        );
        if report.dropped() > 0 {
            tracing::warn!(
                "Split '{}': dropped {} with missing values, {} with infinite values, {} with <= {} points, {} with too few channels",
                split,
                report.missing_values,
                report.non_finite,
                report.too_short,
                filter.min_len(),
                report.too_few_features
            );
        }

        let pool = WindowPool::from_records(&kept, self.windower(), split)?;
        tracing::info!("Split '{}': {} windows", split, pool.len());
        Ok(PreparedSplit {
            pool: Arc::new(pool),
            filter: report,
        })
    }

    fn new_model(&self) -> Result<TrajectoryModel> {
        TrajectoryModel::new(self.config.window, self.config.model, self.ctx.device())
    }

    fn evaluation_pool(&self, valid: Option<&PreparedSplit>) -> Result<Arc<WindowPool>> {
        match (self.config.evaluation.split, valid) {
            (EvalSplit::Validation, Some(valid)) => Ok(Arc::clone(&valid.pool)),
            (EvalSplit::Validation, None) => {
                Ok(self.prepare_split(&self.config.data.valid_path, "validation")?.pool)
            }
            (EvalSplit::Test, _) => {
                let path = self.config.data.test_path.as_deref().ok_or_else(|| {
                    ShipTrajError::Config("evaluation.split is 'test' but data.test_path is not set".into())
                })?;
                Ok(self.prepare_split(path, "test")?.pool)
            }
        }
    }

    fn evaluate_and_report(
        &self,
        model: &TrajectoryModel,
        pool: Arc<WindowPool>,
    ) -> Result<(EvaluationSummary, ReportPaths)> {
        let evaluator = Evaluator::new(self.config.bounds, self.config.evaluation.batch_size);
        let matrix = evaluator.evaluate(model, pool, self.ctx.device())?;
        let summary = matrix.summary()?;
        tracing::info!(
            "Evaluation: mean RMSE {:.4} normalized / {:.4} deg, mean distance error {:.4} km over {} windows",
            summary.mean_rmse,
            summary.mean_rmse_deg,
            summary.mean_distance_km,
            summary.windows
        );
        let reports = report::write_reports(&self.output_dir(), &summary)?;
        Ok((summary, reports))
    }

    /// Train, restore the best checkpoint, evaluate and write reports.
    pub fn run(&self) -> Result<RunReport> {
        let out = self.output_dir();
        std::fs::create_dir_all(&out)?;
        self.config.to_file(out.join(CONFIG_COPY_FILE))?;

        let train = self.prepare_split(&self.config.data.train_path, "train")?;
        let valid = self.prepare_split(&self.config.data.valid_path, "validation")?;
        train.pool.ensure_compatible(&valid.pool)?;

        let training = &self.config.training;
        let prefetch = self.config.data.prefetch_batches;
        let mut train_batches = BatchSource::shuffled(
            Arc::clone(&train.pool),
            training.batch_size,
            self.config.seed,
            self.ctx.device().clone(),
        )
        .with_prefetch(prefetch);
        let mut valid_batches = BatchSource::sequential(
            Arc::clone(&valid.pool),
            training.batch_size,
            self.ctx.device().clone(),
        )
        .with_prefetch(prefetch);

        let mut trainer = Trainer::new(self.new_model()?, training, BestCheckpoint::new(&out)?)?
            .with_observer(TracingObserver);
        if training.progress_bars {
            trainer = trainer.with_observer(ProgressObserver::new());
        }

        let outcome = trainer.fit(&mut train_batches, &mut valid_batches)?;
        let checkpoint = trainer.restore_best()?;
        let model = trainer.into_model();

        let pool = self.evaluation_pool(Some(&valid))?;
        train.pool.ensure_compatible(&pool)?;
        let (evaluation, reports) = self.evaluate_and_report(&model, pool)?;

        Ok(RunReport {
            training: outcome,
            checkpoint,
            evaluation,
            reports,
        })
    }

    /// Evaluate an existing checkpoint without training.
    ///
    /// `checkpoint_dir` defaults to the output directory.
    pub fn evaluate_only(&self, checkpoint_dir: Option<&Path>) -> Result<(CheckpointMetadata, EvaluationSummary)> {
        let dir = checkpoint_dir.map_or_else(|| self.output_dir(), Path::to_path_buf);
        let mut model = self.new_model()?;
        let metadata = checkpoint::restore_from(&dir, &mut model)?;

        let pool = self.evaluation_pool(None)?;
        let (evaluation, _) = self.evaluate_and_report(&model, pool)?;
        Ok((metadata, evaluation))
    }
}
