extern crate nalgebra as na;

use std::collections::{BTreeMap, HashSet};

use super::{FittedModel, ParamValue, Regressor};
use crate::{
    dataset::Dataset,
    error::{Result, SparseLmError},
    timing::TimingTracker,
};

/// Separator between a step name and a parameter name.
const STEP_SEPARATOR: &str = "__";

/// Composite estimator fitting disjoint blocks of features one after another.
///
/// Step `i` fits the features in `scopes[i]` to the residual left by the
/// previous steps. Only the first step may fit an intercept. Parameters of the
/// steps are reachable as `"<step>__<param>"`.
///
/// Group labels or hierarchies of a step refer to the features of its own
/// scope, numbered from zero.
///
/// # Example
///
/// ```rust
/// # use sparselm_core::model::{Lasso, OrdinaryLeastSquares, Regressor, StepwiseEstimator};
///
/// let stepwise = StepwiseEstimator::new(
///     vec![
///         ("ols".to_string(), Box::new(OrdinaryLeastSquares::new()) as Box<dyn Regressor>),
///         ("lasso".to_string(), Box::new(Lasso::new(0.1))),
///     ],
///     vec![vec![0, 1], vec![2, 3, 4]],
/// )
/// .unwrap();
/// assert!(stepwise.get_params().contains_key("lasso__alpha"));
/// ```
#[derive(Clone, Debug)]
pub struct StepwiseEstimator {
    steps: Vec<(String, Box<dyn Regressor>)>,
    scopes: Vec<Vec<usize>>,
    n_features: usize,
    fitted: Option<FittedModel>,
}

impl StepwiseEstimator {
    pub fn new(mut steps: Vec<(String, Box<dyn Regressor>)>, scopes: Vec<Vec<usize>>) -> Result<Self> {
        if steps.is_empty() {
            return Err(SparseLmError::InvalidComposition("at least one step is required".to_string()));
        }
        if steps.len() != scopes.len() {
            return Err(SparseLmError::InvalidComposition(format!(
                "{} steps but {} scopes, each step needs exactly one scope",
                steps.len(),
                scopes.len()
            )));
        }

        let mut all: Vec<usize> = scopes.iter().flatten().copied().collect();
        all.sort_unstable();
        let contiguous = all.iter().enumerate().all(|(i, &j)| i == j);
        if !contiguous || scopes.iter().any(|s| s.is_empty()) {
            return Err(SparseLmError::InvalidComposition(format!(
                "scopes {:?} must not overlap, must not be empty and must cover 0..k",
                scopes
            )));
        }

        let mut names = HashSet::new();
        for (name, step) in &steps {
            if step.is_composite() {
                return Err(SparseLmError::InvalidComposition(format!(
                    "step {} is itself a composite estimator",
                    name
                )));
            }
            if name.is_empty() || name.contains(STEP_SEPARATOR) {
                return Err(SparseLmError::InvalidComposition(format!(
                    "invalid step name {:?}",
                    name
                )));
            }
            if !names.insert(name.clone()) {
                return Err(SparseLmError::InvalidComposition(format!("duplicate step name {}", name)));
            }
        }

        for (_, step) in steps.iter_mut().skip(1) {
            step.set_fit_intercept(false);
        }

        Ok(StepwiseEstimator {
            steps,
            n_features: all.len(),
            scopes,
            fitted: None,
        })
    }

    pub fn steps(&self) -> &[(String, Box<dyn Regressor>)] {
        &self.steps
    }

    pub fn scopes(&self) -> &[Vec<usize>] {
        &self.scopes
    }

    fn step_index(&self, step: &str) -> Option<usize> {
        self.steps.iter().position(|(name, _)| name == step)
    }
}

impl Regressor for StepwiseEstimator {
    fn name(&self) -> &'static str {
        "stepwise"
    }

    fn fit(&mut self, data: &Dataset) -> Result<()> {
        if data.n_features() != self.n_features {
            return Err(SparseLmError::InvalidParameter(format!(
                "scopes cover {} features but the data has {}",
                self.n_features,
                data.n_features()
            )));
        }

        let mut residual = data.y().clone();
        let mut coef = na::DVector::zeros(self.n_features);
        let mut timings = TimingTracker::new();
        let mut n_iter = 0;
        let mut converged = true;

        for ((name, step), scope) in self.steps.iter_mut().zip(&self.scopes) {
            let block = data.select_features(scope)?.with_targets(residual.clone())?;
            step.fit(&block)?;
            let fitted = step
                .fitted()
                .ok_or_else(|| SparseLmError::NotFitted(name.clone()))?;
            for (k, &j) in scope.iter().enumerate() {
                coef[j] = fitted.coef[k];
            }
            residual -= fitted.predict(block.x())?;
            timings.merge(&fitted.timings);
            n_iter += fitted.n_iter;
            converged &= fitted.converged;
            tracing::debug!("step {} fitted on {} features", name, scope.len());
        }

        let intercept = match self.steps.first() {
            Some((_, first)) if first.fit_intercept() => first.intercept().unwrap_or(0.0),
            _ => 0.0,
        };
        let weighted_sq: f64 = match data.sample_weight() {
            Some(w) => residual.iter().zip(w.iter()).map(|(r, w)| w * r * r).sum(),
            None => residual.norm_squared(),
        };
        let fitted = FittedModel {
            coef,
            intercept,
            objective: 0.5 * weighted_sq / data.n_samples() as f64,
            n_iter,
            converged,
            timings,
        };
        super::log_fit(self.name(), &fitted);
        self.fitted = Some(fitted);
        Ok(())
    }

    fn fitted(&self) -> Option<&FittedModel> {
        self.fitted.as_ref()
    }

    fn fit_intercept(&self) -> bool {
        self.steps.first().is_some_and(|(_, s)| s.fit_intercept())
    }

    fn set_fit_intercept(&mut self, fit_intercept: bool) {
        if let Some((_, first)) = self.steps.first_mut() {
            first.set_fit_intercept(fit_intercept);
        }
    }

    fn get_params(&self) -> BTreeMap<String, ParamValue> {
        let mut params = BTreeMap::new();
        for (name, step) in &self.steps {
            for (param, value) in step.get_params() {
                params.insert(format!("{}{}{}", name, STEP_SEPARATOR, param), value);
            }
        }
        params
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        let Some((step, param)) = name.split_once(STEP_SEPARATOR) else {
            return Err(super::unknown(name, self.name()));
        };
        let index = self
            .step_index(step)
            .ok_or_else(|| super::unknown(name, self.name()))?;
        let estimator = &mut self.steps[index].1;
        estimator.set_param(param, value)?;
        if index > 0 {
            estimator.set_fit_intercept(false);
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }

    fn is_composite(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Lasso, OrdinaryLeastSquares};
    use approx::assert_relative_eq;

    fn step(name: &str, estimator: impl Regressor + 'static) -> (String, Box<dyn Regressor>) {
        (name.to_string(), Box::new(estimator))
    }

    fn two_step() -> StepwiseEstimator {
        StepwiseEstimator::new(
            vec![step("ols", OrdinaryLeastSquares::new()), step("lasso", Lasso::new(0.01))],
            vec![vec![0, 1], vec![2, 3]],
        )
        .unwrap()
    }

    fn data() -> Dataset {
        let x = na::DMatrix::from_fn(20, 4, |i, j| ((i * (j + 2)) % 7) as f64 + 0.1 * j as f64);
        let coef = na::DVector::from_vec(vec![1.0, -2.0, 0.0, 0.0]);
        let y = (&x * coef).add_scalar(4.0);
        Dataset::new(x, y).unwrap()
    }

    #[test]
    fn scopes_are_validated() {
        let steps = || vec![step("a", OrdinaryLeastSquares::new()), step("b", OrdinaryLeastSquares::new())];
        assert!(StepwiseEstimator::new(steps(), vec![vec![0, 1]]).is_err());
        assert!(StepwiseEstimator::new(steps(), vec![vec![0, 1], vec![1, 2]]).is_err());
        assert!(StepwiseEstimator::new(steps(), vec![vec![0], vec![2]]).is_err());
        assert!(StepwiseEstimator::new(steps(), vec![vec![2], vec![0, 1]]).is_ok());
    }

    #[test]
    fn nested_composites_are_rejected() {
        let inner = two_step();
        let result = StepwiseEstimator::new(
            vec![step("inner", inner), step("ols", OrdinaryLeastSquares::new())],
            vec![vec![0, 1, 2, 3], vec![4]],
        );
        assert!(matches!(result, Err(SparseLmError::InvalidComposition(_))));
    }

    #[test]
    fn only_the_first_step_fits_an_intercept() {
        let mut stepwise = two_step();
        assert!(stepwise.steps()[0].1.fit_intercept());
        assert!(!stepwise.steps()[1].1.fit_intercept());
        stepwise.set_param("lasso__fit_intercept", true.into()).unwrap();
        assert!(!stepwise.steps()[1].1.fit_intercept());
    }

    #[test]
    fn later_steps_fit_the_residual() {
        let data = data();
        let mut stepwise = two_step();
        stepwise.fit(&data).unwrap();

        let coef = stepwise.coef().unwrap();
        assert_relative_eq!(coef[0], 1.0, epsilon = 1e-8);
        assert_relative_eq!(coef[1], -2.0, epsilon = 1e-8);
        // the first block explains everything, so the residual is zero
        assert_eq!(coef[2], 0.0);
        assert_eq!(coef[3], 0.0);
        assert_relative_eq!(stepwise.intercept().unwrap(), 4.0, epsilon = 1e-8);
        assert_relative_eq!(stepwise.score(&data).unwrap(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn feature_count_must_match_scopes() {
        let data = data().select_features(&[0, 1, 2]).unwrap();
        assert!(two_step().fit(&data).is_err());
    }

    #[test]
    fn parameters_are_routed_by_step_name() {
        let mut stepwise = two_step();
        stepwise.set_param("lasso__alpha", 0.5.into()).unwrap();
        assert_eq!(stepwise.get_params()["lasso__alpha"], ParamValue::Float(0.5));
        assert!(stepwise.get_params().contains_key("ols__fit_intercept"));
        assert!(matches!(
            stepwise.set_param("ridge__alpha", 0.5.into()),
            Err(SparseLmError::UnknownParameter(_, _))
        ));
        assert!(stepwise.set_param("alpha", 0.5.into()).is_err());
    }
}
