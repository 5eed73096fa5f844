extern crate nalgebra as na;

#[cfg(feature = "linfa")]
use std::time::Instant;

#[cfg(feature = "linfa")]
use linfa::prelude::*;
#[cfg(feature = "linfa")]
use linfa_elasticnet::ElasticNet;
#[cfg(any(feature = "accelerate", feature = "openblas", feature = "netlib"))]
use nalgebra_lapack::Cholesky;
#[cfg(feature = "linfa")]
use ndarray::{Array, Array1};

use crate::error::{Result, SparseLmError};

/// Efficiently computes the inverse of (A^T A + ρI), the system matrix of the ADMM x-update.
///
/// Two strategies are used depending on the shape of `a`:
///
/// 1. Sherman-Morrison-Woodbury for "fat" matrices (m < n/2), which only inverts an m×m system
/// 2. Cholesky decomposition of A^T A + ρI otherwise
///    - Uses LAPACK's Cholesky when any LAPACK backend feature is enabled
///      (accelerate, openblas, or netlib)
///    - Falls back to nalgebra's built-in Cholesky when no LAPACK backend is available
///
/// # Arguments
///
/// * `a` - The design matrix (m × n)
/// * `rho` - The augmented Lagrangian penalty parameter, must be positive
///
/// # Errors
///
/// Returns [`SparseLmError::Singular`] if the factorization fails, which can only happen
/// for a non-positive or non-finite `rho`.
///
/// # Example
///
/// ```rust
/// # use nalgebra as na;
/// # use sparselm_core::utils::admm_inverse;
///
/// let a = na::DMatrix::<f64>::identity(4, 3);
/// let inverse = admm_inverse(&a, 1.0).unwrap();
/// assert!((inverse[(0, 0)] - 0.5).abs() < 1e-12);
/// ```
pub fn admm_inverse(a: &na::DMatrix<f64>, rho: f64) -> Result<na::DMatrix<f64>> {
    if !(rho > 0.0 && rho.is_finite()) {
        return Err(SparseLmError::InvalidParameter(format!(
            "rho must be positive and finite, got {}",
            rho
        )));
    }
    let m = a.nrows();
    let n = a.ncols();

    let eye_n = na::DMatrix::<f64>::identity(n, n);

    if m < n / 2 {
        let rho_inv = 1.0 / rho;
        let eye_m = na::DMatrix::<f64>::identity(m, m);

        // I + A*A^T/rho
        let i_aat = a * a.transpose() * rho_inv + &eye_m;
        let i_aat_inv = i_aat
            .cholesky()
            .ok_or_else(|| SparseLmError::Singular("I + AA^T/rho is not positive definite".to_string()))?
            .inverse();

        // (A^TA + rho*I)^-1 = rho^-1*I - rho^-2*A^T*(I+AA^T/rho)^-1*A
        Ok(eye_n * rho_inv - (a.transpose() * i_aat_inv * a) * (rho_inv * rho_inv))
    } else {
        let ata = a.transpose() * a + eye_n * rho;

        #[cfg(any(feature = "accelerate", feature = "openblas", feature = "netlib"))]
        {
            let l = Cholesky::new(ata)
                .ok_or_else(|| SparseLmError::Singular("A^TA + rho*I is not positive definite".to_string()))?;
            l.inverse()
                .ok_or_else(|| SparseLmError::Singular("LAPACK inverse failed".to_string()))
        }

        #[cfg(not(any(feature = "accelerate", feature = "openblas", feature = "netlib")))]
        {
            let l = ata
                .cholesky()
                .ok_or_else(|| SparseLmError::Singular("A^TA + rho*I is not positive definite".to_string()))?;
            Ok(l.inverse())
        }
    }
}

/// Solves the ridge system (A^T A + λI) x = A^T y.
///
/// With `lambda == 0` this falls back to a minimum-norm least squares solution through the SVD,
/// so rank-deficient designs are handled.
pub fn ridge_solve(a: &na::DMatrix<f64>, y: &na::DVector<f64>, lambda: f64) -> Result<na::DVector<f64>> {
    if a.ncols() == 0 {
        return Ok(na::DVector::zeros(0));
    }
    if lambda > 0.0 {
        let n = a.ncols();
        let system = a.transpose() * a + na::DMatrix::<f64>::identity(n, n) * lambda;
        let chol = system
            .cholesky()
            .ok_or_else(|| SparseLmError::Singular("ridge system is not positive definite".to_string()))?;
        Ok(chol.solve(&(a.transpose() * y)))
    } else {
        least_squares(a, y)
    }
}

/// Minimum-norm least squares solution of A x ≈ y through the SVD.
pub fn least_squares(a: &na::DMatrix<f64>, y: &na::DVector<f64>) -> Result<na::DVector<f64>> {
    if a.ncols() == 0 {
        return Ok(na::DVector::zeros(0));
    }
    let svd = a.clone().svd(true, true);
    let max_sv = svd.singular_values.max();
    let eps = f64::EPSILON * (a.nrows().max(a.ncols()) as f64) * max_sv;
    svd.solve(y, eps)
        .map_err(|e| SparseLmError::Singular(e.to_string()))
}

/// Coefficient of determination R², optionally sample weighted.
///
/// A constant target gives 1.0 for an exact fit and 0.0 otherwise.
pub fn r2_score(
    y_true: &na::DVector<f64>,
    y_pred: &na::DVector<f64>,
    sample_weight: Option<&na::DVector<f64>>,
) -> Result<f64> {
    if y_true.len() != y_pred.len() {
        return Err(SparseLmError::DimensionMismatch(y_true.len(), 1, y_pred.len(), 1));
    }
    let weights = sample_weight
        .cloned()
        .unwrap_or_else(|| na::DVector::from_element(y_true.len(), 1.0));
    let total = weights.sum();
    let mean = y_true.dot(&weights) / total;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for i in 0..y_true.len() {
        ss_res += weights[i] * (y_true[i] - y_pred[i]).powi(2);
        ss_tot += weights[i] * (y_true[i] - mean).powi(2);
    }

    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// Computes the optimal Lasso objective value using the linfa library.
///
/// This is a reference value for validating the native solver, not meant for production use.
/// The objective matches the one minimized by [`crate::model::Lasso`]:
/// p* = 1/(2m) * ||Ax* - b||² + α||x*||₁
///
/// # Example
///
/// ```rust,no_run
/// # use nalgebra as na;
/// # use sparselm_core::utils::find_p_star_linfa;
///
/// let a = na::DMatrix::<f64>::new_random(100, 50);
/// let b = na::DVector::<f64>::new_random(100);
/// let p_star = find_p_star_linfa(&a, &b, 0.1).unwrap();
/// ```
#[cfg(feature = "linfa")]
pub fn find_p_star_linfa(a: &na::DMatrix<f64>, b: &na::DVector<f64>, alpha: f64) -> Result<f64> {
    let start_time = Instant::now();
    let m = a.nrows();
    let n = a.ncols();

    let a_ndarray = Array::from_shape_fn((m, n), |(i, j)| a[(i, j)]);
    let b_ndarray = Array1::from_vec(b.as_slice().to_vec());

    let dataset = Dataset::new(a_ndarray.clone(), b_ndarray.clone());

    let model = ElasticNet::lasso()
        .penalty(alpha)
        .with_intercept(false)
        .fit(&dataset)
        .map_err(|e| SparseLmError::Singular(format!("linfa failed to fit: {}", e)))?;

    let x_star = model.hyperplane().to_owned();

    let ax_b = a_ndarray.dot(&x_star) - b_ndarray;
    let sq_norm = ax_b.mapv(|x| x.powi(2)).sum();
    let x_l1 = x_star.mapv(|x| x.abs()).sum();

    tracing::debug!("linfa reference fit finished in {:?}", start_time.elapsed());

    Ok(0.5 * sq_norm / m as f64 + alpha * x_l1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn design() -> na::DMatrix<f64> {
        na::DMatrix::from_row_slice(
            6,
            3,
            &[
                1.0, 0.5, -0.2, //
                0.3, 1.2, 0.1, //
                -0.7, 0.4, 0.9, //
                0.2, -1.1, 0.5, //
                1.5, 0.3, -0.4, //
                -0.6, 0.8, 1.3,
            ],
        )
    }

    #[test]
    fn inverse_matches_direct_inverse_for_tall_design() {
        let a = design();
        let rho = 0.7;
        let expected = (a.transpose() * &a + na::DMatrix::identity(3, 3) * rho)
            .try_inverse()
            .unwrap();
        let inverse = admm_inverse(&a, rho).unwrap();
        assert_relative_eq!(inverse, expected, epsilon = 1e-10);
    }

    #[test]
    fn woodbury_branch_matches_direct_inverse_for_fat_design() {
        let a = design().transpose().insert_columns(3, 4, 0.25);
        assert!(a.nrows() < a.ncols() / 2);
        let rho = 2.0;
        let n = a.ncols();
        let expected = (a.transpose() * &a + na::DMatrix::identity(n, n) * rho)
            .try_inverse()
            .unwrap();
        let inverse = admm_inverse(&a, rho).unwrap();
        assert_relative_eq!(inverse, expected, epsilon = 1e-10);
    }

    #[test]
    fn inverse_rejects_non_positive_rho() {
        assert!(admm_inverse(&design(), 0.0).is_err());
        assert!(admm_inverse(&design(), f64::NAN).is_err());
    }

    #[test]
    fn least_squares_recovers_exact_solution() {
        let a = design();
        let truth = na::DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let y = &a * &truth;
        let solution = least_squares(&a, &y).unwrap();
        assert_relative_eq!(solution, truth, epsilon = 1e-10);
    }

    #[test]
    fn ridge_shrinks_towards_zero() {
        let a = design();
        let y = &a * na::DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let ols = ridge_solve(&a, &y, 0.0).unwrap();
        let ridge = ridge_solve(&a, &y, 10.0).unwrap();
        assert!(ridge.norm() < ols.norm());
    }

    #[test]
    fn r2_of_perfect_prediction_is_one() {
        let y = na::DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert_relative_eq!(r2_score(&y, &y, None).unwrap(), 1.0);
        let mean = na::DVector::from_element(3, 2.0);
        assert_relative_eq!(r2_score(&y, &mean, None).unwrap(), 0.0);
    }

    #[test]
    fn r2_of_constant_target() {
        let y = na::DVector::from_element(3, 4.0);
        assert_eq!(r2_score(&y, &y, None).unwrap(), 1.0);
        let off = na::DVector::from_element(3, 5.0);
        assert_eq!(r2_score(&y, &off, None).unwrap(), 0.0);
    }
}
