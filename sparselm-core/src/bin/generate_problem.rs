/*
This program generates a sparse regression problem and stores the data in the local filesystem.
*/

extern crate nalgebra as na;

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use sparselm_core::{
    datafile::{Layout, write_matrix, write_vector},
    error::Result,
    synthetic::{GroupRegressionOptions, make_group_regression, make_sparse_regression},
};
use tracing_subscriber::EnvFilter;

/// Program to generate a design matrix X and targets y for a sparse regression problem.
///
/// Writes `<prefix>-x.bin` and `<prefix>-y.bin` to the output directory, and
/// `<prefix>-groups.json` with the group label of every feature when `--n-groups` is given.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The number of rows in X
    #[arg(short, long)]
    m: usize,

    /// The number of columns in X; ignored for grouped problems
    #[arg(short, long, default_value_t = 100)]
    n: usize,

    /// The number of non-zero coefficients; for grouped problems, the number of informative groups
    #[arg(short, long)]
    k: usize,

    /// Generate a grouped problem with this many groups
    #[arg(long)]
    n_groups: Option<usize>,

    /// Number of features per group for grouped problems
    #[arg(long, default_value_t = 5)]
    per_group: usize,

    /// Standard deviation of the noise added to y
    #[arg(long, default_value_t = 0.03162)]
    noise: f64,

    /// Seed of the random generator
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// The number of threads to use for parallelization
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// The prefix for the output files
    #[arg(short, long, default_value_t = ("sparse-regression").to_string())]
    prefix: String,

    /// Output directory
    #[arg(short, long, default_value = "data")]
    output: PathBuf,
}

fn generate(args: &Args) -> Result<(na::DMatrix<f64>, na::DVector<f64>, Option<Vec<i64>>)> {
    match args.n_groups {
        Some(n_groups) => {
            let problem = make_group_regression(&GroupRegressionOptions {
                n_samples: args.m,
                n_groups,
                n_features_per_group: args.per_group,
                n_informative_groups: args.k,
                noise: args.noise,
                random_state: Some(args.seed),
                ..Default::default()
            })?;
            Ok((problem.x, problem.y, Some(problem.groups)))
        }
        None => {
            let problem = make_sparse_regression(args.m, args.n, args.k, args.noise, args.seed)?;
            Ok((problem.x, problem.y, None))
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let data_gen_start_time = Instant::now();

    #[cfg(feature = "rayon")]
    let (x, y, groups) = {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build()
            .map_err(|e| {
                sparselm_core::error::SparseLmError::InvalidParameter(format!("Failed to create thread pool: {}", e))
            })?;
        pool.install(|| generate(&args))?
    };
    #[cfg(not(feature = "rayon"))]
    let (x, y, groups) = {
        if args.threads > 1 {
            tracing::warn!("built without the rayon feature, ignoring --threads {}", args.threads);
        }
        generate(&args)?
    };
    tracing::info!(
        "Generated {}x{} problem in {:?}",
        x.nrows(),
        x.ncols(),
        data_gen_start_time.elapsed()
    );

    // Largest useful Lasso penalty for the centered problem, ||X^T (y - mean(y))||_inf / m
    let y_centered = y.add_scalar(-y.mean());
    let alpha_max = (x.transpose() * &y_centered).amax() / x.nrows() as f64;
    tracing::info!("alpha_max: {}", alpha_max);

    std::fs::create_dir_all(&args.output)?;
    let write_start = Instant::now();
    write_matrix(&x, args.output.join(format!("{}-x.bin", args.prefix)), Layout::Rows)?;
    write_vector(&y, args.output.join(format!("{}-y.bin", args.prefix)))?;
    if let Some(groups) = groups {
        let path = args.output.join(format!("{}-groups.json", args.prefix));
        std::fs::write(&path, serde_json::to_string(&groups)?)?;
    }
    tracing::info!("Wrote data files in {:?}", write_start.elapsed());
    tracing::info!("Data generation complete in {:?}", data_gen_start_time.elapsed());
    Ok(())
}
