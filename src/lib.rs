//! # shiptraj-rs
//!
//! Vessel trajectory forecasting from AIS tracks with a BiLSTM baseline.
//!
//! Given 18 observed positions of a ship, the model predicts the next 24 in
//! one shot. Forecasts are scored in physical coordinates: great-circle error
//! per forecast point and RMSE per window.
//!
//! ## Features
//!
//! - **YAML Configuration** - One file describes data, model, training and evaluation
//! - **Integrity Filtering** - Tracks with missing values or too few points are dropped and counted
//! - **Best Checkpoint** - Only the epoch with the lowest validation loss is kept, written atomically
//! - **Geodesic Evaluation** - Haversine error per horizon point, CSV/JSON reports
//!
//! ## Quick Start (CLI)
//!
//! ```bash
//! # Write a starting configuration
//! shiptraj init config.yaml --preset bilstm-baseline
//!
//! # Validate it
//! shiptraj validate config.yaml
//!
//! # Train, then evaluate the best checkpoint
//! shiptraj train config.yaml
//!
//! # Re-evaluate an existing checkpoint
//! shiptraj evaluate config.yaml --checkpoint ./outputs/bilstm
//! ```
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use shiptraj_rs::{Pipeline, PipelineConfig};
//!
//! # fn main() -> shiptraj_rs::Result<()> {
//! let mut config = PipelineConfig::from_preset("bilstm-baseline")?;
//! config.data.train_path = "data/train.jsonl".into();
//! config.data.valid_path = "data/valid.jsonl".into();
//!
//! let report = Pipeline::new(config)?.run()?;
//! for (i, km) in report.evaluation.per_point_mean_km.iter().enumerate() {
//!     println!("point {}: {:.3} km", i + 1, km);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Building Blocks
//!
//! ```rust
//! use shiptraj_rs::trajectory::{TrajectoryFilter, TrajectoryRecord};
//! use shiptraj_rs::window::SequenceWindower;
//!
//! # fn main() -> shiptraj_rs::Result<()> {
//! let track = TrajectoryRecord::from_points(Some(219_000_001), &[[0.5f32, 0.5]; 60])?;
//! let (kept, report) = TrajectoryFilter::new(42, 2).apply(&[track]);
//! assert_eq!(report.kept, 1);
//!
//! let windower = SequenceWindower::new(18, 24, 2);
//! assert_eq!(windower.windows(&kept[0]).len(), 19);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod batch;
pub mod checkpoint;
pub mod compute;
pub mod config;
pub mod early_stopping;
pub mod error;
pub mod evaluate;
pub mod geo;
pub mod model;
pub mod observer;
pub mod optimizer;
pub mod pipeline;
pub mod report;
pub mod trainer;
pub mod trajectory;
pub mod window;

pub use compute::ComputeContext;
pub use config::{PipelineConfig, TrainingConfig};
pub use error::{Result, ShipTrajError};
pub use evaluate::{ErrorMatrix, EvaluationSummary, Evaluator};
pub use model::{Forecaster, TrajectoryModel};
pub use pipeline::Pipeline;
pub use trainer::Trainer;
