extern crate nalgebra as na;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, SparseLmError},
    penalty::Penalty,
    timing::{TimingTracker, time_fn},
    utils::admm_inverse,
};

/// Residual ratio that triggers a change of rho.
const RHO_BALANCE_MU: f64 = 10.0;
/// Factor by which rho is scaled when rebalancing.
const RHO_BALANCE_TAU: f64 = 2.0;

/// Configuration settings for ADMM execution.
///
/// # Example
///
/// ```rust
/// # use sparselm_core::problem::AdmmSettings;
///
/// let settings = AdmmSettings {
///     max_iter: 500,
///     ..AdmmSettings::default()
/// };
/// assert_eq!(settings.rho, 1.0);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmmSettings {
    /// Initial augmented Lagrangian penalty parameter
    pub rho: f64,
    /// Maximum number of iterations before termination
    pub max_iter: usize,
    /// Absolute tolerance on the primal and dual residuals
    pub eps_abs: f64,
    /// Relative tolerance on the primal and dual residuals
    pub eps_rel: f64,
    /// Over-relaxation parameter in (0, 2)
    pub relaxation: f64,
    /// Rebalance rho when the residuals drift apart
    pub adaptive_rho: bool,
}

impl Default for AdmmSettings {
    fn default() -> Self {
        AdmmSettings {
            rho: 1.0,
            max_iter: 10_000,
            eps_abs: 1e-9,
            eps_rel: 1e-7,
            relaxation: 1.0,
            adaptive_rho: true,
        }
    }
}

impl AdmmSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.rho > 0.0 && self.rho.is_finite()) {
            return Err(SparseLmError::InvalidParameter(format!("rho must be positive, got {}", self.rho)));
        }
        if self.max_iter == 0 {
            return Err(SparseLmError::InvalidParameter("max_iter must be at least 1".to_string()));
        }
        if !(self.eps_abs >= 0.0 && self.eps_rel >= 0.0) {
            return Err(SparseLmError::InvalidParameter("tolerances must be non-negative".to_string()));
        }
        if !(self.relaxation > 0.0 && self.relaxation < 2.0) {
            return Err(SparseLmError::InvalidParameter(format!(
                "relaxation must lie in (0, 2), got {}",
                self.relaxation
            )));
        }
        Ok(())
    }
}

/// Trait defining the interface of an ADMM problem.
///
/// Each method corresponds to a phase of the ADMM iteration:
/// 1. `precompute` - Perform any necessary one-time computations
/// 2. `update_x` - Update the primal variable x
/// 3. `update_z` - Update the auxiliary variable z
/// 4. `update_y` - Update the dual variable y
/// 5. `update_residuals` - Compute primal and dual residuals
/// 6. `check_stopping_criteria` - Check if the algorithm should terminate
pub trait ADMMProblem {
    /// Performs one-time precomputation before the ADMM iterations begin,
    /// such as matrix factorizations.
    fn precompute(&mut self) -> Result<()>;

    /// Minimizes the augmented Lagrangian with respect to x.
    fn update_x(&mut self) -> Result<()>;

    /// Minimizes the augmented Lagrangian with respect to z, usually a proximal step.
    fn update_z(&mut self) -> Result<()>;

    /// Dual ascent step on the (scaled) multipliers.
    fn update_y(&mut self) -> Result<()>;

    /// Computes the primal and dual residuals for convergence checking.
    fn update_residuals(&mut self) -> Result<()>;

    /// Returns `Ok(true)` once the problem has converged.
    fn check_stopping_criteria(&mut self) -> Result<bool>;
}

/// Outcome of an [`ADMMSolver::solve`] call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveStatus {
    pub n_iter: usize,
    pub converged: bool,
}

/// ADMM solver that orchestrates the iterative optimization process.
///
/// The `ADMMSolver` drives any [`ADMMProblem`] through its steps and records
/// the time spent in each of them.
///
/// # Example
///
/// ```rust
/// # use nalgebra as na;
/// # use sparselm_core::penalty::WeightedL1;
/// # use sparselm_core::problem::{ADMMSolver, AdmmSettings, PenalizedLeastSquares};
///
/// let a = na::DMatrix::<f64>::identity(3, 3);
/// let y = na::DVector::from_vec(vec![3.0, -0.5, 1.0]);
/// let penalty = WeightedL1::new(1.0, 3);
/// let problem = PenalizedLeastSquares::new(&a, &y, &penalty, 1.0, AdmmSettings::default());
/// let mut solver = ADMMSolver::new(problem, 1000);
/// let status = solver.solve().unwrap();
/// assert!(status.converged);
/// ```
pub struct ADMMSolver<P>
where
    P: ADMMProblem,
{
    /// The problem instance implementing the ADMM algorithm steps
    problem: P,
    /// Maximum number of iterations before termination
    max_iter: usize,
    /// Tracks timing information for performance analysis
    timing_tracker: TimingTracker,
}

impl<P> ADMMSolver<P>
where
    P: ADMMProblem,
{
    pub fn new(problem: P, max_iter: usize) -> Self {
        ADMMSolver {
            problem,
            max_iter,
            timing_tracker: TimingTracker::new(),
        }
    }

    /// Solves the ADMM problem by iterating until convergence or max iterations.
    ///
    /// Hitting the iteration limit is not an error; the returned status reports
    /// `converged = false` instead.
    pub fn solve(&mut self) -> Result<SolveStatus> {
        let problem = &mut self.problem;
        time_fn(&mut self.timing_tracker, "precompute", || problem.precompute())?;

        let mut i = 0;
        loop {
            self.timing_tracker.start_iteration();
            i += 1;

            let problem = &mut self.problem;
            time_fn(&mut self.timing_tracker, "update_x", || problem.update_x())?;
            time_fn(&mut self.timing_tracker, "update_z", || problem.update_z())?;
            time_fn(&mut self.timing_tracker, "update_y", || problem.update_y())?;
            time_fn(&mut self.timing_tracker, "update_residuals", || {
                problem.update_residuals()
            })?;

            let should_stop = time_fn(&mut self.timing_tracker, "check_stopping_criteria", || {
                problem.check_stopping_criteria()
            })?;
            if should_stop {
                tracing::debug!("ADMM converged after {} iterations", i);
                return Ok(SolveStatus {
                    n_iter: i,
                    converged: true,
                });
            }
            if i == self.max_iter {
                tracing::warn!(
                    "ADMM did not converge within {} iterations; returning the last iterate",
                    self.max_iter
                );
                return Ok(SolveStatus {
                    n_iter: i,
                    converged: false,
                });
            }
        }
    }

    pub fn problem(&self) -> &P {
        &self.problem
    }

    pub fn timing_tracker(&self) -> &TimingTracker {
        &self.timing_tracker
    }

    pub fn into_parts(self) -> (P, TimingTracker) {
        (self.problem, self.timing_tracker)
    }
}

/// `min_x 1/2 ||A x - y||² + scale * g(z)  s.t.  x = z`, in scaled form.
///
/// With `scale` set to the number of samples this is the estimators' objective
/// `1/(2n) ||A b - y||² + g(b)` multiplied by `n`.
pub struct PenalizedLeastSquares<'a, G: Penalty + ?Sized> {
    a: &'a na::DMatrix<f64>,
    y: &'a na::DVector<f64>,
    penalty: &'a G,
    scale: f64,
    settings: AdmmSettings,
    rho: f64,
    factor: na::DMatrix<f64>,
    aty: na::DVector<f64>,
    x: na::DVector<f64>,
    x_hat: na::DVector<f64>,
    z: na::DVector<f64>,
    z_prev: na::DVector<f64>,
    u: na::DVector<f64>,
    primal_residual: f64,
    dual_residual: f64,
}

impl<'a, G: Penalty + ?Sized> PenalizedLeastSquares<'a, G> {
    pub fn new(
        a: &'a na::DMatrix<f64>,
        y: &'a na::DVector<f64>,
        penalty: &'a G,
        scale: f64,
        settings: AdmmSettings,
    ) -> Self {
        let p = a.ncols();
        PenalizedLeastSquares {
            a,
            y,
            penalty,
            scale,
            rho: settings.rho,
            settings,
            factor: na::DMatrix::zeros(0, 0),
            aty: na::DVector::zeros(p),
            x: na::DVector::zeros(p),
            x_hat: na::DVector::zeros(p),
            z: na::DVector::zeros(p),
            z_prev: na::DVector::zeros(p),
            u: na::DVector::zeros(p),
            primal_residual: f64::INFINITY,
            dual_residual: f64::INFINITY,
        }
    }

    /// Starts the iterations from `coef` instead of zero.
    pub fn with_warm_start(mut self, coef: &na::DVector<f64>) -> Self {
        if coef.len() == self.x.len() {
            self.x = coef.clone();
            self.z = coef.clone();
        }
        self
    }

    /// The sparse iterate; exact zeros come from the proximal step.
    pub fn solution(&self) -> &na::DVector<f64> {
        &self.z
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn residuals(&self) -> (f64, f64) {
        (self.primal_residual, self.dual_residual)
    }

    /// Objective value `1/2 ||A z - y||² + scale * g(z)` at the current iterate.
    pub fn objective(&self) -> f64 {
        0.5 * (self.a * &self.z - self.y).norm_squared() + self.scale * self.penalty.value(&self.z)
    }

    fn rebalance_rho(&mut self) -> Result<()> {
        let new_rho = if self.primal_residual > RHO_BALANCE_MU * self.dual_residual {
            self.rho * RHO_BALANCE_TAU
        } else if self.dual_residual > RHO_BALANCE_MU * self.primal_residual {
            self.rho / RHO_BALANCE_TAU
        } else {
            return Ok(());
        };
        // scaled duals follow y / rho
        self.u *= self.rho / new_rho;
        self.rho = new_rho;
        self.factor = admm_inverse(self.a, self.rho)?;
        tracing::trace!("rho rebalanced to {}", self.rho);
        Ok(())
    }
}

impl<G: Penalty + ?Sized> ADMMProblem for PenalizedLeastSquares<'_, G> {
    fn precompute(&mut self) -> Result<()> {
        if self.a.nrows() != self.y.len() {
            return Err(SparseLmError::DimensionMismatch(
                self.a.nrows(),
                self.a.ncols(),
                self.y.len(),
                1,
            ));
        }
        self.factor = admm_inverse(self.a, self.rho)?;
        self.aty = self.a.transpose() * self.y;
        Ok(())
    }

    fn update_x(&mut self) -> Result<()> {
        let rhs = &self.aty + (&self.z - &self.u) * self.rho;
        self.x = &self.factor * rhs;
        let alpha = self.settings.relaxation;
        self.x_hat = &self.x * alpha + &self.z * (1.0 - alpha);
        Ok(())
    }

    fn update_z(&mut self) -> Result<()> {
        std::mem::swap(&mut self.z_prev, &mut self.z);
        self.z = self.penalty.prox(&(&self.x_hat + &self.u), self.scale / self.rho);
        Ok(())
    }

    fn update_y(&mut self) -> Result<()> {
        self.u += &self.x_hat - &self.z;
        Ok(())
    }

    fn update_residuals(&mut self) -> Result<()> {
        self.primal_residual = (&self.x - &self.z).norm();
        self.dual_residual = self.rho * (&self.z - &self.z_prev).norm();
        Ok(())
    }

    fn check_stopping_criteria(&mut self) -> Result<bool> {
        if !(self.primal_residual.is_finite() && self.dual_residual.is_finite()) {
            return Err(SparseLmError::Singular("ADMM iterates diverged".to_string()));
        }
        let sqrt_p = (self.x.len() as f64).sqrt();
        let eps_pri = sqrt_p * self.settings.eps_abs
            + self.settings.eps_rel * self.x.norm().max(self.z.norm());
        let eps_dual = sqrt_p * self.settings.eps_abs + self.settings.eps_rel * self.rho * self.u.norm();

        if self.primal_residual <= eps_pri && self.dual_residual <= eps_dual {
            return Ok(true);
        }
        if self.settings.adaptive_rho {
            self.rebalance_rho()?;
        }
        Ok(false)
    }
}

/// Result of [`solve_penalized`].
#[derive(Clone, Debug)]
pub struct AdmmOutput {
    pub coef: na::DVector<f64>,
    /// `1/(2n) ||A b - y||² + g(b)`
    pub objective: f64,
    pub status: SolveStatus,
    pub timings: TimingTracker,
}

/// Minimizes `1/(2n) ||A b - y||² + g(b)` with `n = a.nrows()`.
///
/// # Arguments
///
/// * `a` - The (preprocessed) design matrix
/// * `y` - The (preprocessed) target vector
/// * `penalty` - The regularizer
/// * `settings` - Solver settings
/// * `warm_start` - Optional starting coefficients
pub fn solve_penalized<G: Penalty + ?Sized>(
    a: &na::DMatrix<f64>,
    y: &na::DVector<f64>,
    penalty: &G,
    settings: &AdmmSettings,
    warm_start: Option<&na::DVector<f64>>,
) -> Result<AdmmOutput> {
    settings.validate()?;
    let n = a.nrows().max(1) as f64;

    if a.ncols() == 0 {
        return Ok(AdmmOutput {
            coef: na::DVector::zeros(0),
            objective: 0.5 * y.norm_squared() / n,
            status: SolveStatus {
                n_iter: 0,
                converged: true,
            },
            timings: TimingTracker::new(),
        });
    }

    let mut problem = PenalizedLeastSquares::new(a, y, penalty, n, settings.clone());
    if let Some(coef) = warm_start {
        problem = problem.with_warm_start(coef);
    }
    let mut solver = ADMMSolver::new(problem, settings.max_iter);
    let status = solver.solve()?;
    let (problem, timings) = solver.into_parts();
    tracing::debug!(
        "penalized least squares solved: n_iter={}, converged={}, rho={}",
        status.n_iter,
        status.converged,
        problem.rho()
    );

    Ok(AdmmOutput {
        coef: problem.solution().clone(),
        objective: problem.objective() / n,
        status,
        timings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::soft_threshold_scalar;
    use crate::penalty::{GroupIndex, GroupL2, NoPenalty, WeightedL1};
    use approx::assert_relative_eq;

    /// Orthogonal design with A^T A = n I, where the Lasso has a closed form.
    fn orthogonal_design(n: usize) -> na::DMatrix<f64> {
        let half = n / 2;
        na::DMatrix::from_fn(n, 2, |i, j| match j {
            0 => 1.0,
            _ => {
                if i < half {
                    1.0
                } else {
                    -1.0
                }
            }
        })
    }

    #[test]
    fn lasso_on_orthogonal_design_matches_soft_threshold() {
        let a = orthogonal_design(8);
        let y = na::DVector::from_fn(8, |i, _| if i < 4 { 3.0 } else { 1.0 });
        let alpha = 0.4;

        let penalty = WeightedL1::new(alpha, 2);
        let out = solve_penalized(&a, &y, &penalty, &AdmmSettings::default(), None).unwrap();

        // b_j = S(a_j^T y / n, alpha) since a_j^T a_j / n = 1
        let n = 8.0;
        let expected0 = soft_threshold_scalar(a.column(0).dot(&y) / n, alpha);
        let expected1 = soft_threshold_scalar(a.column(1).dot(&y) / n, alpha);
        assert!(out.status.converged);
        assert_relative_eq!(out.coef[0], expected0, epsilon = 1e-6);
        assert_relative_eq!(out.coef[1], expected1, epsilon = 1e-6);
    }

    #[test]
    fn large_alpha_gives_all_zero_solution() {
        let a = orthogonal_design(6);
        let y = na::DVector::from_element(6, 1.0);
        let penalty = WeightedL1::new(100.0, 2);
        let out = solve_penalized(&a, &y, &penalty, &AdmmSettings::default(), None).unwrap();
        assert_eq!(out.coef.iter().filter(|v| **v != 0.0).count(), 0);
    }

    #[test]
    fn unpenalized_problem_matches_least_squares() {
        let a = na::DMatrix::from_row_slice(5, 2, &[1.0, 0.2, 0.4, 1.0, -0.3, 0.8, 1.1, -0.5, 0.7, 0.7]);
        let y = na::DVector::from_vec(vec![1.0, 2.0, 0.5, -0.3, 1.4]);
        let out = solve_penalized(&a, &y, &NoPenalty, &AdmmSettings::default(), None).unwrap();
        let expected = crate::utils::least_squares(&a, &y).unwrap();
        assert_relative_eq!(out.coef, expected, epsilon = 1e-6);
    }

    #[test]
    fn group_penalty_zeroes_entire_group() {
        let a = na::DMatrix::<f64>::identity(4, 4) * 2.0;
        let y = na::DVector::from_vec(vec![0.1, -0.1, 4.0, 3.0]);
        let groups = GroupIndex::from_labels(&[0, 0, 1, 1]);
        let penalty = GroupL2 {
            alpha: 0.3,
            weights: groups.default_weights(),
            groups,
        };
        let out = solve_penalized(&a, &y, &penalty, &AdmmSettings::default(), None).unwrap();
        assert_eq!(out.coef[0], 0.0);
        assert_eq!(out.coef[1], 0.0);
        assert!(out.coef[2] > 0.0 && out.coef[3] > 0.0);
    }

    #[test]
    fn iteration_limit_is_reported_not_raised() {
        let a = orthogonal_design(8);
        let y = na::DVector::from_element(8, 2.0);
        let settings = AdmmSettings {
            max_iter: 1,
            adaptive_rho: false,
            ..AdmmSettings::default()
        };
        let penalty = WeightedL1::new(0.1, 2);
        let out = solve_penalized(&a, &y, &penalty, &settings, None).unwrap();
        assert_eq!(out.status.n_iter, 1);
        assert!(!out.status.converged);
    }

    #[test]
    fn solver_records_step_timings() {
        let a = orthogonal_design(4);
        let y = na::DVector::from_element(4, 1.0);
        let penalty = WeightedL1::new(0.1, 2);
        let out = solve_penalized(&a, &y, &penalty, &AdmmSettings::default(), None).unwrap();
        let stats = out.timings.get_step_statistics();
        assert_eq!(stats["precompute"].2, 1);
        assert_eq!(stats["update_x"].2, out.status.n_iter);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let a = orthogonal_design(4);
        let y = na::DVector::from_element(4, 1.0);
        let settings = AdmmSettings {
            relaxation: 2.5,
            ..AdmmSettings::default()
        };
        assert!(solve_penalized(&a, &y, &NoPenalty, &settings, None).is_err());
    }
}
