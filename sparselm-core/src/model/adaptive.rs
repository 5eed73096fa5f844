//! Adaptive (iteratively reweighted) versions of the convex estimators.
//!
//! An adaptive estimator fits its base estimator once with unit weights, then
//! refits with penalty weights derived from the previous coefficients, which
//! reduces the shrinkage bias of large coefficients.

extern crate nalgebra as na;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::{
    FittedModel, ParamValue, Regressor, Solution, check_non_negative, fit_linear, log_fit,
};
use super::{GroupLasso, Lasso, OverlapGroupLasso, RidgedGroupLasso, SparseGroupLasso};
use crate::{
    dataset::{Dataset, Design},
    error::{Result, SparseLmError},
    timing::TimingTracker,
};

/// Rule turning a coefficient magnitude into a penalty weight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightUpdate {
    /// `1 / (|b| + eps)`
    #[default]
    Inverse,
    /// `1 / sqrt(|b| + eps)`
    InverseSqrt,
}

impl WeightUpdate {
    pub fn apply(self, magnitude: f64, eps: f64) -> f64 {
        match self {
            WeightUpdate::Inverse => 1.0 / (magnitude + eps),
            WeightUpdate::InverseSqrt => 1.0 / (magnitude + eps).sqrt(),
        }
    }

    /// Accepts the configuration names, or the codes 0 and 1.
    fn parse(value: &ParamValue) -> Result<Self> {
        match value {
            ParamValue::Int(0) => Ok(WeightUpdate::Inverse),
            ParamValue::Int(1) => Ok(WeightUpdate::InverseSqrt),
            ParamValue::Str(name) if name == "inverse" => Ok(WeightUpdate::Inverse),
            ParamValue::Str(name) if name == "inverse_sqrt" => Ok(WeightUpdate::InverseSqrt),
            other => Err(SparseLmError::InvalidParameter(format!(
                "update must be inverse or inverse_sqrt, got {}",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WeightUpdate::Inverse => "inverse",
            WeightUpdate::InverseSqrt => "inverse_sqrt",
        }
    }
}

/// Penalty weight multipliers; `None` means unit weights.
#[derive(Clone, Debug, Default)]
pub struct Multipliers {
    /// One multiplier per penalized coefficient
    pub l1: Option<na::DVector<f64>>,
    /// One multiplier per group
    pub group: Option<Vec<f64>>,
}

/// A solve together with the coefficients the penalty acts on.
///
/// For most estimators `penalized` equals the solution coefficients; for the
/// overlapping group lasso it holds the latent coefficients, and for the
/// standardized group lasso the orthonormalized ones.
#[derive(Clone, Debug)]
pub struct Reweighted {
    pub solution: Solution,
    pub penalized: na::DVector<f64>,
}

/// Estimators whose penalty weights can be updated between refits.
pub trait Reweightable: Regressor + Clone + Default {
    /// Name of the adaptive counterpart.
    const ADAPTIVE_NAME: &'static str;

    /// Solves on a preprocessed design with the given weight multipliers.
    fn solve_reweighted(
        &self,
        design: &Design,
        multipliers: &Multipliers,
        warm_start: Option<&na::DVector<f64>>,
    ) -> Result<Reweighted>;

    /// Multipliers for the next refit, given the penalized coefficients of the last one.
    fn next_multipliers(&self, penalized: &na::DVector<f64>, eps: f64, update: WeightUpdate) -> Multipliers;
}

/// Single fit of a reweightable estimator with unit weights.
pub(crate) fn fit_unweighted<B: Reweightable>(base: &B, data: &Dataset, fit_intercept: bool) -> Result<FittedModel> {
    fit_linear(data, fit_intercept, |design| {
        Ok(base.solve_reweighted(design, &Multipliers::default(), None)?.solution)
    })
}

/// Iteratively reweighted wrapper around a base estimator.
///
/// # Example
///
/// ```rust
/// # use sparselm_core::model::{AdaptiveLasso, Lasso, Regressor};
///
/// let mut model = AdaptiveLasso::new(Lasso::new(0.1));
/// model.set_param("max_iter", 5usize.into()).unwrap();
/// assert_eq!(model.name(), "adaptive_lasso");
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, bound = "B: Serialize + DeserializeOwned + Reweightable")]
pub struct Adaptive<B: Reweightable> {
    #[serde(flatten)]
    pub base: B,
    /// Maximum number of reweighted refits after the initial fit
    pub max_iter: usize,
    /// Offset keeping weights finite for zero coefficients
    pub eps: f64,
    /// Stop once the coefficients move less than this (Euclidean norm)
    pub tol: f64,
    pub update: WeightUpdate,
    #[serde(skip)]
    fitted: Option<FittedModel>,
}

impl<B: Reweightable> Default for Adaptive<B> {
    fn default() -> Self {
        Adaptive {
            base: B::default(),
            max_iter: 3,
            eps: 1e-6,
            tol: 1e-10,
            update: WeightUpdate::default(),
            fitted: None,
        }
    }
}

impl<B: Reweightable> Adaptive<B> {
    pub fn new(base: B) -> Self {
        Adaptive {
            base,
            ..Self::default()
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_update(mut self, update: WeightUpdate) -> Self {
        self.update = update;
        self
    }

    fn solve(&self, design: &Design) -> Result<Solution> {
        check_non_negative("tol", self.tol)?;
        if !(self.eps > 0.0 && self.eps.is_finite()) {
            return Err(SparseLmError::InvalidParameter(format!("eps must be positive, got {}", self.eps)));
        }

        let mut timings = TimingTracker::new();
        let mut current = self.base.solve_reweighted(design, &Multipliers::default(), None)?;
        timings.merge(&current.solution.timings);
        let mut n_iter = current.solution.n_iter;
        let mut converged = current.solution.converged;

        for refit in 0..self.max_iter {
            let multipliers = self.base.next_multipliers(&current.penalized, self.eps, self.update);
            let next = self
                .base
                .solve_reweighted(design, &multipliers, Some(&current.penalized))?;
            timings.merge(&next.solution.timings);
            n_iter += next.solution.n_iter;
            converged = next.solution.converged;

            let change = (&next.solution.coef - &current.solution.coef).norm();
            current = next;
            tracing::debug!("{} refit {}: coefficient change {:.3e}", B::ADAPTIVE_NAME, refit + 1, change);
            if change < self.tol {
                break;
            }
        }

        Ok(Solution {
            coef: current.solution.coef,
            objective: current.solution.objective,
            n_iter,
            converged,
            timings,
        })
    }
}

impl<B: Reweightable + 'static> Regressor for Adaptive<B> {
    fn name(&self) -> &'static str {
        B::ADAPTIVE_NAME
    }

    fn fit(&mut self, data: &Dataset) -> Result<()> {
        let fitted = fit_linear(data, self.base.fit_intercept(), |design| self.solve(design))?;
        log_fit(self.name(), &fitted);
        self.fitted = Some(fitted);
        Ok(())
    }

    fn fitted(&self) -> Option<&FittedModel> {
        self.fitted.as_ref()
    }

    fn fit_intercept(&self) -> bool {
        self.base.fit_intercept()
    }

    fn set_fit_intercept(&mut self, fit_intercept: bool) {
        self.base.set_fit_intercept(fit_intercept);
    }

    fn get_params(&self) -> BTreeMap<String, ParamValue> {
        let mut params = self.base.get_params();
        params.insert("max_iter".to_string(), self.max_iter.into());
        params.insert("eps".to_string(), self.eps.into());
        params.insert("tol".to_string(), self.tol.into());
        params.insert("update".to_string(), self.update.as_str().into());
        params
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match name {
            "max_iter" => self.max_iter = value.as_usize(name)?,
            "eps" => {
                let eps = value.as_f64(name)?;
                if !(eps > 0.0 && eps.is_finite()) {
                    return Err(SparseLmError::InvalidParameter(format!("eps must be positive, got {}", eps)));
                }
                self.eps = eps;
            }
            "tol" => {
                let tol = value.as_f64(name)?;
                check_non_negative(name, tol)?;
                self.tol = tol;
            }
            "update" => self.update = WeightUpdate::parse(&value)?,
            _ => self.base.set_param(name, value)?,
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}

pub type AdaptiveLasso = Adaptive<Lasso>;
pub type AdaptiveGroupLasso = Adaptive<GroupLasso>;
pub type AdaptiveOverlapGroupLasso = Adaptive<OverlapGroupLasso>;
pub type AdaptiveSparseGroupLasso = Adaptive<SparseGroupLasso>;
pub type AdaptiveRidgedGroupLasso = Adaptive<RidgedGroupLasso>;
