extern crate nalgebra as na;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::adaptive::{Multipliers, Reweightable, Reweighted, WeightUpdate, fit_unweighted};
use super::{FittedModel, ParamValue, Regressor, check_non_negative, log_fit, unknown};
use crate::{
    dataset::{Dataset, Design},
    error::Result,
    penalty::WeightedL1,
    problem::{AdmmSettings, solve_penalized},
};

/// L1-regularized least squares.
///
/// Minimizes `1/(2n) ||X b - y||² + alpha ||b||_1`.
///
/// # Example
///
/// ```rust
/// # use nalgebra as na;
/// # use sparselm_core::dataset::Dataset;
/// # use sparselm_core::model::{Lasso, Regressor};
///
/// let x = na::DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 0.0]);
/// let y = na::DVector::from_vec(vec![2.0, 0.1, 2.1, 4.0]);
/// let mut lasso = Lasso::new(0.05);
/// lasso.fit(&Dataset::new(x, y).unwrap()).unwrap();
/// assert!(lasso.coef().unwrap()[0] > 1.0);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Lasso {
    pub alpha: f64,
    pub fit_intercept: bool,
    pub solver: AdmmSettings,
    #[serde(skip)]
    fitted: Option<FittedModel>,
}

impl Default for Lasso {
    fn default() -> Self {
        Lasso {
            alpha: 1.0,
            fit_intercept: true,
            solver: AdmmSettings::default(),
            fitted: None,
        }
    }
}

impl Lasso {
    pub fn new(alpha: f64) -> Self {
        Lasso {
            alpha,
            ..Self::default()
        }
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    pub fn with_solver(mut self, solver: AdmmSettings) -> Self {
        self.solver = solver;
        self
    }
}

impl Reweightable for Lasso {
    const ADAPTIVE_NAME: &'static str = "adaptive_lasso";

    fn solve_reweighted(
        &self,
        design: &Design,
        multipliers: &Multipliers,
        warm_start: Option<&na::DVector<f64>>,
    ) -> Result<Reweighted> {
        check_non_negative("alpha", self.alpha)?;
        let mut penalty = WeightedL1::new(self.alpha, design.a.ncols());
        if let Some(weights) = &multipliers.l1 {
            penalty.weights = weights.clone();
        }
        let out = solve_penalized(&design.a, &design.y, &penalty, &self.solver, warm_start)?;
        Ok(Reweighted {
            penalized: out.coef.clone(),
            solution: out.into(),
        })
    }

    fn next_multipliers(&self, penalized: &na::DVector<f64>, eps: f64, update: WeightUpdate) -> Multipliers {
        Multipliers {
            l1: Some(penalized.map(|b| update.apply(b.abs(), eps))),
            group: None,
        }
    }
}

impl Regressor for Lasso {
    fn name(&self) -> &'static str {
        "lasso"
    }

    fn fit(&mut self, data: &Dataset) -> Result<()> {
        let fitted = fit_unweighted(self, data, self.fit_intercept)?;
        log_fit(self.name(), &fitted);
        self.fitted = Some(fitted);
        Ok(())
    }

    fn fitted(&self) -> Option<&FittedModel> {
        self.fitted.as_ref()
    }

    fn fit_intercept(&self) -> bool {
        self.fit_intercept
    }

    fn set_fit_intercept(&mut self, fit_intercept: bool) {
        self.fit_intercept = fit_intercept;
    }

    fn get_params(&self) -> BTreeMap<String, ParamValue> {
        BTreeMap::from([
            ("alpha".to_string(), self.alpha.into()),
            ("fit_intercept".to_string(), self.fit_intercept.into()),
        ])
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match name {
            "alpha" => {
                let alpha = value.as_f64(name)?;
                check_non_negative(name, alpha)?;
                self.alpha = alpha;
            }
            "fit_intercept" => self.fit_intercept = value.as_bool(name)?,
            _ => return Err(unknown(name, self.name())),
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}
