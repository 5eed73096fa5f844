extern crate nalgebra as na;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{FittedModel, ParamValue, Regressor, Solution, fit_linear, log_fit, unknown};
use crate::{dataset::Dataset, error::Result, timing::TimingTracker, utils::least_squares};

/// Unpenalized least squares, solved directly through the SVD.
///
/// Rank-deficient designs yield the minimum-norm solution.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OrdinaryLeastSquares {
    pub fit_intercept: bool,
    #[serde(skip)]
    fitted: Option<FittedModel>,
}

impl Default for OrdinaryLeastSquares {
    fn default() -> Self {
        OrdinaryLeastSquares {
            fit_intercept: true,
            fitted: None,
        }
    }
}

impl OrdinaryLeastSquares {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }
}

impl Regressor for OrdinaryLeastSquares {
    fn name(&self) -> &'static str {
        "ordinary_least_squares"
    }

    fn fit(&mut self, data: &Dataset) -> Result<()> {
        let fitted = fit_linear(data, self.fit_intercept, |design| {
            let coef = least_squares(&design.a, &design.y)?;
            let n = design.a.nrows() as f64;
            let objective = 0.5 * (&design.a * &coef - &design.y).norm_squared() / n;
            Ok(Solution {
                coef,
                objective,
                n_iter: 1,
                converged: true,
                timings: TimingTracker::new(),
            })
        })?;
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
        BTreeMap::from([("fit_intercept".to_string(), self.fit_intercept.into())])
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match name {
            "fit_intercept" => self.fit_intercept = value.as_bool(name)?,
            _ => return Err(unknown(name, self.name())),
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn recovers_linear_relationship_with_intercept() {
        let x = na::DMatrix::from_row_slice(5, 2, &[0.0, 1.0, 1.0, 0.0, 2.0, 1.0, 3.0, 5.0, 4.0, 2.0]);
        let coef = na::DVector::from_vec(vec![1.5, -2.0]);
        let y = (&x * &coef).add_scalar(3.0);
        let data = Dataset::new(x, y).unwrap();

        let mut model = OrdinaryLeastSquares::new();
        model.fit(&data).unwrap();
        assert_relative_eq!(model.coef().unwrap(), &coef, epsilon = 1e-10);
        assert_relative_eq!(model.intercept().unwrap(), 3.0, epsilon = 1e-10);
        assert_relative_eq!(model.score(&data).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn predict_before_fit_fails() {
        let model = OrdinaryLeastSquares::new();
        assert!(matches!(
            model.predict(&na::DMatrix::zeros(1, 1)),
            Err(crate::error::SparseLmError::NotFitted(_))
        ));
    }

    #[test]
    fn params_round_trip_by_name() {
        let mut model = OrdinaryLeastSquares::new();
        model.set_param("fit_intercept", false.into()).unwrap();
        assert_eq!(model.get_params()["fit_intercept"], ParamValue::Bool(false));
        assert!(model.set_param("alpha", 1.0.into()).is_err());
    }
}
