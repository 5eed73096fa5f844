//! Synthetic regression problems with known sparse coefficients.

extern crate nalgebra as na;

use rand::prelude::*;
use rand_distr::{Normal, StandardNormal};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SparseLmError};

fn check_noise(noise: f64) -> Result<()> {
    if noise >= 0.0 && noise.is_finite() {
        Ok(())
    } else {
        Err(SparseLmError::InvalidParameter(format!(
            "noise must be finite and non-negative, got {}",
            noise
        )))
    }
}

/// Shape and sparsity of a grouped regression problem.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupRegressionOptions {
    pub n_samples: usize,
    pub n_groups: usize,
    pub n_features_per_group: usize,
    /// The first `n_informative_groups` groups carry non-zero coefficients
    pub n_informative_groups: usize,
    /// Fraction of the features of an informative group that are informative
    pub frac_informative_in_group: f64,
    pub bias: f64,
    /// Standard deviation of the Gaussian noise added to the targets
    pub noise: f64,
    /// Shuffle samples and features
    pub shuffle: bool,
    pub random_state: Option<u64>,
}

impl Default for GroupRegressionOptions {
    fn default() -> Self {
        GroupRegressionOptions {
            n_samples: 100,
            n_groups: 20,
            n_features_per_group: 5,
            n_informative_groups: 5,
            frac_informative_in_group: 1.0,
            bias: 0.0,
            noise: 0.0,
            shuffle: true,
            random_state: None,
        }
    }
}

/// A generated problem together with its ground truth.
#[derive(Clone, Debug)]
pub struct GroupRegression {
    pub x: na::DMatrix<f64>,
    pub y: na::DVector<f64>,
    /// Group label of every feature
    pub groups: Vec<i64>,
    pub coef: na::DVector<f64>,
}

/// Generates `y = X b + bias + noise * e` with standard-normal features
/// arranged in groups and a group-sparse `b`.
///
/// # Example
///
/// ```rust
/// # use sparselm_core::synthetic::{GroupRegressionOptions, make_group_regression};
///
/// let problem = make_group_regression(&GroupRegressionOptions {
///     n_samples: 20,
///     n_groups: 4,
///     n_features_per_group: 3,
///     n_informative_groups: 2,
///     random_state: Some(0),
///     ..Default::default()
/// })
/// .unwrap();
/// assert_eq!(problem.x.shape(), (20, 12));
/// assert_eq!(problem.coef.iter().filter(|c| **c != 0.0).count(), 6);
/// ```
pub fn make_group_regression(options: &GroupRegressionOptions) -> Result<GroupRegression> {
    if options.n_samples == 0 || options.n_groups == 0 || options.n_features_per_group == 0 {
        return Err(SparseLmError::InvalidParameter(
            "n_samples, n_groups and n_features_per_group must be positive".to_string(),
        ));
    }
    if options.n_informative_groups > options.n_groups {
        return Err(SparseLmError::InvalidParameter(format!(
            "n_informative_groups ({}) exceeds n_groups ({})",
            options.n_informative_groups, options.n_groups
        )));
    }
    if !(0.0..=1.0).contains(&options.frac_informative_in_group) {
        return Err(SparseLmError::InvalidParameter(format!(
            "frac_informative_in_group must be in [0, 1], got {}",
            options.frac_informative_in_group
        )));
    }
    check_noise(options.noise)?;
    let noise_dist = Normal::new(0.0, options.noise)
        .map_err(|e| SparseLmError::InvalidParameter(format!("invalid noise level: {}", e)))?;

    let mut rng = SmallRng::seed_from_u64(options.random_state.unwrap_or_else(rand::random));
    let m = options.n_samples;
    let per_group = options.n_features_per_group;
    let n = options.n_groups * per_group;

    let mut x = na::DMatrix::<f64>::from_fn(m, n, |_, _| rng.sample(StandardNormal));
    let mut groups: Vec<i64> = (0..n).map(|j| (j / per_group) as i64).collect();

    let n_informative = (options.frac_informative_in_group * per_group as f64).round() as usize;
    let mut coef = na::DVector::<f64>::zeros(n);
    for g in 0..options.n_informative_groups {
        for k in 0..n_informative {
            coef[g * per_group + k] = rng.random_range(0.0..100.0);
        }
    }

    let noise = na::DVector::<f64>::from_fn(m, |_, _| rng.sample(noise_dist));
    let mut y = (&x * &coef).add_scalar(options.bias) + noise;

    if options.shuffle {
        let mut rows: Vec<usize> = (0..m).collect();
        rows.shuffle(&mut rng);
        x = x.select_rows(&rows);
        y = y.select_rows(&rows);

        let mut cols: Vec<usize> = (0..n).collect();
        cols.shuffle(&mut rng);
        x = x.select_columns(&cols);
        coef = coef.select_rows(&cols);
        groups = cols.iter().map(|&j| groups[j]).collect();
    }

    tracing::debug!(
        "generated grouped regression: {}x{}, {} informative coefficients",
        m,
        n,
        coef.iter().filter(|c| **c != 0.0).count()
    );
    Ok(GroupRegression { x, y, groups, coef })
}

/// A generated sparse problem with its ground truth.
#[derive(Clone, Debug)]
pub struct SparseRegression {
    pub x: na::DMatrix<f64>,
    pub y: na::DVector<f64>,
    pub coef: na::DVector<f64>,
}

fn unit_norm_column(m: usize, seed: u64) -> Vec<f64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut values: Vec<f64> = (0..m).map(|_| rng.sample(StandardNormal)).collect();
    let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|v| *v /= norm);
    }
    values
}

/// Generates an `m x n` design with unit-norm Gaussian columns, a `k`-sparse
/// standard-normal truth and Gaussian noise of standard deviation `noise_std`.
///
/// Column `j` is drawn from its own generator seeded with `seed + j + 1` (wrapping), so the
/// design does not depend on how columns are scheduled across threads.
pub fn make_sparse_regression(m: usize, n: usize, k: usize, noise_std: f64, seed: u64) -> Result<SparseRegression> {
    if k > n {
        return Err(SparseLmError::InvalidParameter(format!(
            "cannot draw {} non-zero coefficients out of {}",
            k, n
        )));
    }
    check_noise(noise_std)?;
    let noise_dist = Normal::new(0.0, noise_std)
        .map_err(|e| SparseLmError::InvalidParameter(format!("invalid noise level: {}", e)))?;

    #[cfg(feature = "rayon")]
    let columns: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|j| unit_norm_column(m, seed.wrapping_add(j as u64 + 1)))
        .collect();
    #[cfg(not(feature = "rayon"))]
    let columns: Vec<Vec<f64>> = (0..n).map(|j| unit_norm_column(m, seed.wrapping_add(j as u64 + 1))).collect();

    let mut x = na::DMatrix::<f64>::zeros(m, n);
    for (j, column) in columns.into_iter().enumerate() {
        x.column_mut(j).copy_from_slice(&column);
    }

    let mut rng = SmallRng::seed_from_u64(seed);
    let mut coef = na::DVector::<f64>::zeros(n);
    for idx in rand::seq::index::sample(&mut rng, n, k).into_iter() {
        coef[idx] = rng.sample(StandardNormal);
    }
    let noise = na::DVector::<f64>::from_fn(m, |_, _| rng.sample(noise_dist));
    let y = &x * &coef + noise;

    Ok(SparseRegression { x, y, coef })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn options() -> GroupRegressionOptions {
        GroupRegressionOptions {
            n_samples: 30,
            n_groups: 6,
            n_features_per_group: 4,
            n_informative_groups: 2,
            frac_informative_in_group: 0.5,
            bias: 3.0,
            random_state: Some(11),
            ..Default::default()
        }
    }

    #[test]
    fn informative_coefficients_sit_in_informative_groups() {
        let problem = make_group_regression(&options()).unwrap();
        assert_eq!(problem.x.shape(), (30, 24));
        assert_eq!(problem.coef.iter().filter(|c| **c != 0.0).count(), 4);

        let mut informative_groups: Vec<i64> = problem
            .coef
            .iter()
            .zip(&problem.groups)
            .filter(|(c, _)| **c != 0.0)
            .map(|(_, g)| *g)
            .collect();
        informative_groups.sort_unstable();
        informative_groups.dedup();
        assert_eq!(informative_groups, vec![0, 1]);
        assert!(problem.coef.iter().all(|c| (0.0..100.0).contains(c)));
    }

    #[test]
    fn noiseless_targets_are_exact() {
        let problem = make_group_regression(&options()).unwrap();
        let expected = (&problem.x * &problem.coef).add_scalar(3.0);
        assert_relative_eq!(problem.y, expected, epsilon = 1e-9);
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let a = make_group_regression(&options()).unwrap();
        let b = make_group_regression(&options()).unwrap();
        assert_eq!(a.x, b.x);
        assert_eq!(a.groups, b.groups);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let mut bad = options();
        bad.n_informative_groups = 7;
        assert!(make_group_regression(&bad).is_err());
        let mut bad = options();
        bad.frac_informative_in_group = 1.5;
        assert!(make_group_regression(&bad).is_err());
        let mut bad = options();
        bad.noise = -1.0;
        assert!(make_group_regression(&bad).is_err());
    }

    #[test]
    fn sparse_problem_has_unit_columns() {
        let problem = make_sparse_regression(50, 20, 3, 0.01, 42).unwrap();
        for j in 0..20 {
            assert_relative_eq!(problem.x.column(j).norm(), 1.0, epsilon = 1e-12);
        }
        assert_eq!(problem.coef.iter().filter(|c| **c != 0.0).count(), 3);
        assert!(make_sparse_regression(5, 2, 3, 0.0, 0).is_err());
        assert!(make_sparse_regression(50, 20, 3, -0.5, 42).is_err());
        assert!(make_sparse_regression(50, 20, 3, f64::NAN, 42).is_err());
    }

    #[test]
    fn largest_seed_is_accepted() {
        let problem = make_sparse_regression(5, 3, 1, 0.0, u64::MAX).unwrap();
        assert_eq!(problem.x.shape(), (5, 3));

        let mut opts = options();
        opts.random_state = Some(u64::MAX);
        let a = make_group_regression(&opts).unwrap();
        let b = make_group_regression(&opts).unwrap();
        assert_eq!(a.x, b.x);
    }
}
