/*
This program fits an estimator described by a JSON configuration to data files
written by generate_problem, and optionally stores the fitted model.
*/

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use sparselm_core::{
    datafile::DataMatrix,
    dataset::Dataset,
    error::Result,
    model::EstimatorConfig,
    storage::{LocalModelStore, ModelStore, StoredModel},
};
use tracing_subscriber::EnvFilter;

/// Program to fit a sparse linear model to stored data.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path of the design matrix file
    #[arg(short, long)]
    x: PathBuf,

    /// Path of the target vector file
    #[arg(short, long)]
    y: PathBuf,

    /// Path of the JSON estimator configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Directory of the model store; the fitted model is saved when given
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Identifier of the model in the store
    #[arg(long, default_value_t = ("model").to_string())]
    id: String,

    /// Write per-step solver timings to this CSV file
    #[arg(short, long)]
    timings: Option<PathBuf>,
}

fn load_dataset(x: &Path, y: &Path) -> Result<Dataset> {
    let x = DataMatrix::open(x)?;
    let y = DataMatrix::open(y)?;
    tracing::info!("Loaded {}x{} design ({} storage)", x.nrows(), x.ncols(), x.layout());
    Dataset::new(x.to_matrix()?, y.to_vector()?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let data = load_dataset(&args.x, &args.y)?;
    let mut model = EstimatorConfig::from_path(&args.config)?.into_regressor()?;

    let fit_start = Instant::now();
    model.fit(&data)?;
    tracing::info!("Fitted {} in {:?}", model.name(), fit_start.elapsed());

    let stored = StoredModel::from_regressor(model.as_ref())?;
    let fitted = &stored.fitted;
    tracing::info!(
        "n_iter={}, converged={}, objective={:.6e}, non-zero coefficients={}/{}",
        fitted.n_iter,
        fitted.converged,
        fitted.objective,
        fitted.n_nonzero(),
        fitted.coef.len()
    );
    tracing::info!("R2 on training data: {:.6}", model.score(&data)?);
    println!("intercept: {}", fitted.intercept);
    for (j, c) in fitted.coef.iter().enumerate().filter(|(_, c)| **c != 0.0) {
        println!("coef[{}]: {}", j, c);
    }

    fitted.timings.log_summary();
    if let Some(path) = &args.timings {
        fitted.timings.write_step_timings_to_csv(path)?;
        tracing::info!("Wrote timings to {}", path.display());
    }

    if let Some(root) = &args.store {
        let store = LocalModelStore::new(root, "");
        store.save(&args.id, &stored)?;
        tracing::info!("Saved model to {}", store.file_path(&args.id).display());
    }
    Ok(())
}
