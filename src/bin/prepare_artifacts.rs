//! Builds every artifact the recommender loads from a raw spot dataset.
//!
//! Steps
//! 1. Load and normalize the raw CSV
//! 2. Write the processed dataset
//! 3. Fit one label encoder per categorical column and write them
//! 4. Fit the random forest on a train/test split, log both scores
//! 5. Write the model and its feature importances

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tourist_spots::services::recommender::{prepare_artifacts, Dataset, ForestParams};

#[derive(Debug, Parser)]
#[command(about = "Normalize a spot dataset, fit its encoders and train the rating model")]
struct Args {
    /// Raw dataset CSV
    #[arg(long, default_value = "tourist_spots.csv")]
    input: PathBuf,

    /// Directory receiving the artifacts
    #[arg(long, env = "MODEL_DIR", default_value = "models")]
    output_dir: PathBuf,

    /// Trees in the forest
    #[arg(long, default_value_t = 100)]
    trees: usize,

    /// Maximum tree depth
    #[arg(long, default_value_t = 16)]
    max_depth: usize,

    /// Share of rows held out for the test score
    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    tracing::info!(input = %args.input.display(), "Loading and preprocessing data");
    let dataset = Dataset::load(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;

    let params = ForestParams {
        n_trees: args.trees,
        max_depth: args.max_depth,
        seed: args.seed,
        ..ForestParams::default()
    };

    let report = prepare_artifacts(&dataset, &args.output_dir, &params, args.test_fraction)
        .with_context(|| format!("Failed to prepare artifacts in {}", args.output_dir.display()))?;

    tracing::info!(
        spots = dataset.len(),
        trees = report.trees,
        train_rows = report.train_rows,
        test_rows = report.test_rows,
        output_dir = %args.output_dir.display(),
        "Model training completed successfully"
    );

    Ok(())
}
