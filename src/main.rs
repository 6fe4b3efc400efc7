//! CLI entry point for shiptraj-rs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shiptraj_rs::{Pipeline, PipelineConfig, Result};

#[derive(Parser)]
#[command(name = "shiptraj")]
#[command(about = "Ship trajectory forecasting with a BiLSTM baseline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        config: String,
    },
    /// Train, keep the best checkpoint, then evaluate it
    Train {
        /// Path to configuration file
        config: String,
    },
    /// Evaluate an existing checkpoint without training
    Evaluate {
        /// Path to configuration file
        config: String,
        /// Directory holding best_model.json (defaults to output_dir)
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },
    /// Generate a sample configuration file
    Init {
        /// Output path for config file
        #[arg(default_value = "config.yaml")]
        output: String,
        /// Preset (bilstm-baseline, smoke)
        #[arg(long, default_value = "bilstm-baseline")]
        preset: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => {
            tracing::info!("Validating configuration: {}", config);
            let config = PipelineConfig::from_file(&config)?;
            config.validate()?;
            println!("✓ Configuration is valid");
            println!(
                "  Window: {} observed -> {} forecast points",
                config.window.input_len, config.window.horizon
            );
            println!("  Train data: {}", config.data.train_path);
            println!("  Validation data: {}", config.data.valid_path);
        }
        Commands::Train { config } => {
            tracing::info!("Starting training with config: {}", config);
            let config = PipelineConfig::from_file(&config)?;
            let report = Pipeline::new(config)?.run()?;
            println!(
                "✓ Best checkpoint from epoch {} (validation loss {:.6})",
                report.checkpoint.epoch, report.checkpoint.val_loss
            );
            println!(
                "  Mean RMSE: {:.4} normalized ({:.4} degrees), mean distance error: {:.4} km",
                report.evaluation.mean_rmse,
                report.evaluation.mean_rmse_deg,
                report.evaluation.mean_distance_km
            );
            println!("  Reports: {}", report.reports.csv.display());
        }
        Commands::Evaluate { config, checkpoint } => {
            tracing::info!("Evaluating with config: {}", config);
            let config = PipelineConfig::from_file(&config)?;
            let (metadata, summary) = Pipeline::new(config)?.evaluate_only(checkpoint.as_deref())?;
            println!("✓ Evaluated checkpoint from epoch {}", metadata.epoch);
            println!(
                "  Mean RMSE: {:.4} normalized ({:.4} degrees), mean distance error: {:.4} km over {} windows",
                summary.mean_rmse,
                summary.mean_rmse_deg,
                summary.mean_distance_km,
                summary.windows
            );
        }
        Commands::Init { output, preset } => {
            tracing::info!("Generating config for preset: {}", preset);
            let config = PipelineConfig::from_preset(&preset)?;
            config.to_file(&output)?;
            println!("✓ Configuration written to: {output}");
        }
    }

    Ok(())
}
