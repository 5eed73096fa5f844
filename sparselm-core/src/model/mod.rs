//! Regression estimators and the `fit` / `predict` contract they share.
//!
//! Every estimator implements [`Regressor`]. Hyperparameters are plain public
//! fields with builder helpers, and are also reachable by name through
//! [`Regressor::get_params`] / [`Regressor::set_param`] so that model selection
//! and composite estimators can tune them generically.

extern crate nalgebra as na;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    dataset::{Dataset, Design},
    error::{Result, SparseLmError},
    problem::AdmmOutput,
    timing::TimingTracker,
    utils::r2_score,
};

pub mod adaptive;
pub mod config;
pub mod group;
pub mod lasso;
pub mod ols;
pub mod overlap;
pub mod stepwise;
pub mod subset;

pub use adaptive::{
    Adaptive, AdaptiveGroupLasso, AdaptiveLasso, AdaptiveOverlapGroupLasso, AdaptiveRidgedGroupLasso,
    AdaptiveSparseGroupLasso, WeightUpdate,
};
pub use config::{EstimatorConfig, StepConfig};
pub use group::{GroupLasso, RidgedGroupLasso, SparseGroupLasso};
pub use lasso::Lasso;
pub use ols::OrdinaryLeastSquares;
pub use overlap::OverlapGroupLasso;
pub use stepwise::StepwiseEstimator;
pub use subset::{BestSubsetSelection, L1L0, L2L0, RidgedBestSubsetSelection, SupportOptions};

/// A named hyperparameter value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Floats(Vec<f64>),
    Ints(Vec<i64>),
    IntLists(Vec<Vec<i64>>),
    /// Named option
    Str(String),
    /// Explicitly unset optional parameter
    None,
}

impl ParamValue {
    pub fn as_f64(&self, name: &str) -> Result<f64> {
        match self {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            other => Err(wrong_kind(name, "a number", other)),
        }
    }

    pub fn as_usize(&self, name: &str) -> Result<usize> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Ok(*v as usize),
            ParamValue::Float(v) if *v >= 0.0 && v.fract() == 0.0 => Ok(*v as usize),
            other => Err(wrong_kind(name, "a non-negative integer", other)),
        }
    }

    pub fn as_bool(&self, name: &str) -> Result<bool> {
        match self {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(wrong_kind(name, "a boolean", other)),
        }
    }

    pub fn as_f64s(&self, name: &str) -> Result<Option<Vec<f64>>> {
        match self {
            ParamValue::Floats(v) => Ok(Some(v.clone())),
            ParamValue::Float(v) => Ok(Some(vec![*v])),
            ParamValue::None => Ok(None),
            other => Err(wrong_kind(name, "a list of numbers", other)),
        }
    }

    pub fn as_i64s(&self, name: &str) -> Result<Option<Vec<i64>>> {
        match self {
            ParamValue::Ints(v) => Ok(Some(v.clone())),
            ParamValue::None => Ok(None),
            other => Err(wrong_kind(name, "a list of integers", other)),
        }
    }

    pub fn as_int_lists(&self, name: &str) -> Result<Option<Vec<Vec<i64>>>> {
        match self {
            ParamValue::IntLists(v) => Ok(Some(v.clone())),
            ParamValue::None => Ok(None),
            other => Err(wrong_kind(name, "a list of integer lists", other)),
        }
    }

    /// Numeric value used to order candidates, if the value is a scalar number.
    pub fn sort_key(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

fn wrong_kind(name: &str, expected: &str, got: &ParamValue) -> SparseLmError {
    SparseLmError::InvalidParameter(format!("{} must be {}, got {}", name, expected, got))
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Floats(v) => write!(f, "{:?}", v),
            ParamValue::Ints(v) => write!(f, "{:?}", v),
            ParamValue::IntLists(v) => write!(f, "{:?}", v),
            ParamValue::Str(v) => write!(f, "{}", v),
            ParamValue::None => write!(f, "None"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(v: Vec<f64>) -> Self {
        ParamValue::Floats(v)
    }
}

impl From<Vec<i64>> for ParamValue {
    fn from(v: Vec<i64>) -> Self {
        ParamValue::Ints(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::None)
    }
}

/// Coefficients and solver diagnostics of a fitted estimator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FittedModel {
    pub coef: na::DVector<f64>,
    pub intercept: f64,
    /// Objective value on the preprocessed data
    pub objective: f64,
    pub n_iter: usize,
    pub converged: bool,
    #[serde(skip)]
    pub timings: TimingTracker,
}

impl FittedModel {
    pub fn predict(&self, x: &na::DMatrix<f64>) -> Result<na::DVector<f64>> {
        if x.ncols() != self.coef.len() {
            return Err(SparseLmError::DimensionMismatch(x.nrows(), x.ncols(), self.coef.len(), 1));
        }
        Ok((x * &self.coef).add_scalar(self.intercept))
    }

    /// Number of non-zero coefficients.
    pub fn n_nonzero(&self) -> usize {
        self.coef.iter().filter(|c| **c != 0.0).count()
    }
}

/// Solver output on a [`Design`], before the intercept is recovered.
#[derive(Clone, Debug)]
pub struct Solution {
    pub coef: na::DVector<f64>,
    pub objective: f64,
    pub n_iter: usize,
    pub converged: bool,
    pub timings: TimingTracker,
}

impl From<AdmmOutput> for Solution {
    fn from(out: AdmmOutput) -> Self {
        Solution {
            coef: out.coef,
            objective: out.objective,
            n_iter: out.status.n_iter,
            converged: out.status.converged,
            timings: out.timings,
        }
    }
}

/// The estimator contract: hyperparameters in, fitted coefficients out.
pub trait Regressor: fmt::Debug + Send + Sync {
    /// Estimator name, as used in configuration files.
    fn name(&self) -> &'static str;

    /// Fits the estimator, replacing any previous fit.
    fn fit(&mut self, data: &Dataset) -> Result<()>;

    fn fitted(&self) -> Option<&FittedModel>;

    fn fit_intercept(&self) -> bool;

    fn set_fit_intercept(&mut self, fit_intercept: bool);

    /// Current hyperparameters by name.
    fn get_params(&self) -> BTreeMap<String, ParamValue>;

    /// Sets one hyperparameter by name.
    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()>;

    fn clone_box(&self) -> Box<dyn Regressor>;

    /// Whether this estimator is built out of other estimators.
    fn is_composite(&self) -> bool {
        false
    }

    fn set_params(&mut self, params: &BTreeMap<String, ParamValue>) -> Result<()> {
        for (name, value) in params {
            self.set_param(name, value.clone())?;
        }
        Ok(())
    }

    fn coef(&self) -> Option<&na::DVector<f64>> {
        self.fitted().map(|f| &f.coef)
    }

    fn intercept(&self) -> Option<f64> {
        self.fitted().map(|f| f.intercept)
    }

    fn predict(&self, x: &na::DMatrix<f64>) -> Result<na::DVector<f64>> {
        self.fitted()
            .ok_or_else(|| SparseLmError::NotFitted(self.name().to_string()))?
            .predict(x)
    }

    /// Coefficient of determination of the predictions on `data`.
    fn score(&self, data: &Dataset) -> Result<f64> {
        let prediction = self.predict(data.x())?;
        r2_score(data.y(), &prediction, data.sample_weight())
    }
}

impl Clone for Box<dyn Regressor> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Centers and weights `data`, solves, and recovers the intercept.
pub(crate) fn fit_linear<F>(data: &Dataset, fit_intercept: bool, solve: F) -> Result<FittedModel>
where
    F: FnOnce(&Design) -> Result<Solution>,
{
    let design = Design::from_dataset(data, fit_intercept);
    let solution = solve(&design)?;
    let intercept = if fit_intercept {
        design.intercept(&solution.coef)
    } else {
        0.0
    };
    Ok(FittedModel {
        coef: solution.coef,
        intercept,
        objective: solution.objective,
        n_iter: solution.n_iter,
        converged: solution.converged,
        timings: solution.timings,
    })
}

pub(crate) fn log_fit(name: &str, fitted: &FittedModel) {
    tracing::info!(
        "{} fitted: nonzero={}/{}, objective={:.6e}, n_iter={}, converged={}",
        name,
        fitted.n_nonzero(),
        fitted.coef.len(),
        fitted.objective,
        fitted.n_iter,
        fitted.converged
    );
}

pub(crate) fn check_non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SparseLmError::InvalidParameter(format!(
            "{} must be finite and non-negative, got {}",
            name, value
        )))
    }
}

pub(crate) fn unknown(name: &str, estimator: &str) -> SparseLmError {
    SparseLmError::UnknownParameter(name.to_string(), estimator.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_values_coerce_where_sensible() {
        assert_eq!(ParamValue::Int(3).as_f64("alpha").unwrap(), 3.0);
        assert_eq!(ParamValue::Float(4.0).as_usize("k").unwrap(), 4);
        assert!(ParamValue::Float(4.5).as_usize("k").is_err());
        assert!(ParamValue::Int(-1).as_usize("k").is_err());
        assert!(ParamValue::Bool(true).as_f64("alpha").is_err());
        assert_eq!(ParamValue::None.as_f64s("w").unwrap(), None);
        assert_eq!(ParamValue::from(Some(2.0)), ParamValue::Float(2.0));
        assert_eq!(ParamValue::from(None::<f64>), ParamValue::None);
        let named = ParamValue::from("inverse_sqrt");
        assert_eq!(named.to_string(), "inverse_sqrt");
        assert!(named.as_f64("update").is_err());
        assert_eq!(named.sort_key(), None);
    }

    #[test]
    fn fitted_model_predicts_affine_map() {
        let fitted = FittedModel {
            coef: na::DVector::from_vec(vec![2.0, -1.0]),
            intercept: 0.5,
            objective: 0.0,
            n_iter: 0,
            converged: true,
            timings: TimingTracker::new(),
        };
        let x = na::DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 2.0]);
        assert_eq!(fitted.predict(&x).unwrap().as_slice(), &[1.5, -1.5]);
        assert!(fitted.predict(&na::DMatrix::zeros(2, 3)).is_err());
        assert_eq!(fitted.n_nonzero(), 2);
    }
}
