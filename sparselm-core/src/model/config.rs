//! JSON configuration of estimators.
//!
//! ```json
//! { "model": "stepwise", "steps": [
//!     { "name": "ols", "scope": [0, 1], "estimator": { "model": "ordinary_least_squares" } },
//!     { "name": "lasso", "scope": [2, 3], "estimator": { "model": "lasso", "alpha": 0.1 } }
//! ] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{
    AdaptiveGroupLasso, AdaptiveLasso, AdaptiveOverlapGroupLasso, AdaptiveRidgedGroupLasso, AdaptiveSparseGroupLasso,
    BestSubsetSelection, GroupLasso, L1L0, L2L0, Lasso, OrdinaryLeastSquares, OverlapGroupLasso, Regressor,
    RidgedBestSubsetSelection, RidgedGroupLasso, SparseGroupLasso, StepwiseEstimator,
};
use crate::error::Result;

/// An estimator and its hyperparameters, tagged by the estimator name.
///
/// Omitted fields take the estimator defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum EstimatorConfig {
    OrdinaryLeastSquares(OrdinaryLeastSquares),
    Lasso(Lasso),
    GroupLasso(GroupLasso),
    OverlapGroupLasso(OverlapGroupLasso),
    SparseGroupLasso(SparseGroupLasso),
    RidgedGroupLasso(RidgedGroupLasso),
    AdaptiveLasso(AdaptiveLasso),
    AdaptiveGroupLasso(AdaptiveGroupLasso),
    AdaptiveOverlapGroupLasso(AdaptiveOverlapGroupLasso),
    AdaptiveSparseGroupLasso(AdaptiveSparseGroupLasso),
    AdaptiveRidgedGroupLasso(AdaptiveRidgedGroupLasso),
    BestSubsetSelection(BestSubsetSelection),
    RidgedBestSubsetSelection(RidgedBestSubsetSelection),
    #[serde(rename = "l1l0")]
    L1L0(L1L0),
    #[serde(rename = "l2l0")]
    L2L0(L2L0),
    Stepwise { steps: Vec<StepConfig> },
}

/// One step of a stepwise configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,
    /// Feature indices fitted by this step
    pub scope: Vec<usize>,
    pub estimator: EstimatorConfig,
}

impl EstimatorConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Builds the configured estimator, validating stepwise compositions.
    pub fn into_regressor(self) -> Result<Box<dyn Regressor>> {
        Ok(match self {
            EstimatorConfig::OrdinaryLeastSquares(e) => Box::new(e),
            EstimatorConfig::Lasso(e) => Box::new(e),
            EstimatorConfig::GroupLasso(e) => Box::new(e),
            EstimatorConfig::OverlapGroupLasso(e) => Box::new(e),
            EstimatorConfig::SparseGroupLasso(e) => Box::new(e),
            EstimatorConfig::RidgedGroupLasso(e) => Box::new(e),
            EstimatorConfig::AdaptiveLasso(e) => Box::new(e),
            EstimatorConfig::AdaptiveGroupLasso(e) => Box::new(e),
            EstimatorConfig::AdaptiveOverlapGroupLasso(e) => Box::new(e),
            EstimatorConfig::AdaptiveSparseGroupLasso(e) => Box::new(e),
            EstimatorConfig::AdaptiveRidgedGroupLasso(e) => Box::new(e),
            EstimatorConfig::BestSubsetSelection(e) => Box::new(e),
            EstimatorConfig::RidgedBestSubsetSelection(e) => Box::new(e),
            EstimatorConfig::L1L0(e) => Box::new(e),
            EstimatorConfig::L2L0(e) => Box::new(e),
            EstimatorConfig::Stepwise { steps } => {
                let mut built = Vec::with_capacity(steps.len());
                let mut scopes = Vec::with_capacity(steps.len());
                for step in steps {
                    built.push((step.name, step.estimator.into_regressor()?));
                    scopes.push(step.scope);
                }
                Box::new(StepwiseEstimator::new(built, scopes)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SparseLmError;
    use crate::model::ParamValue;

    #[test]
    fn omitted_fields_take_defaults() {
        let config = EstimatorConfig::from_json(r#"{ "model": "lasso", "alpha": 0.25 }"#).unwrap();
        let model = config.into_regressor().unwrap();
        assert_eq!(model.name(), "lasso");
        assert_eq!(model.get_params()["alpha"], ParamValue::Float(0.25));
        assert!(model.fit_intercept());
    }

    #[test]
    fn solver_settings_are_nested() {
        let json = r#"{ "model": "group_lasso", "groups": [0, 0, 1], "solver": { "rho": 2.0 } }"#;
        let EstimatorConfig::GroupLasso(model) = EstimatorConfig::from_json(json).unwrap() else {
            panic!("expected a group lasso");
        };
        assert_eq!(model.solver.rho, 2.0);
        assert_eq!(model.solver.max_iter, 10000);
        assert_eq!(model.groups, Some(vec![0, 0, 1]));
    }

    #[test]
    fn adaptive_fields_sit_next_to_base_fields() {
        let json = r#"{ "model": "adaptive_lasso", "alpha": 0.1, "max_iter": 5, "update": "inverse_sqrt" }"#;
        let model = EstimatorConfig::from_json(json).unwrap().into_regressor().unwrap();
        let params = model.get_params();
        assert_eq!(model.name(), "adaptive_lasso");
        assert_eq!(params["alpha"], ParamValue::Float(0.1));
        assert_eq!(params["max_iter"], ParamValue::Int(5));
        assert_eq!(params["update"], ParamValue::Str("inverse_sqrt".to_string()));
    }

    #[test]
    fn l0_estimators_use_compact_names() {
        let model = EstimatorConfig::from_json(r#"{ "model": "l1l0", "alpha": 0.5, "max_candidates": 64 }"#)
            .unwrap()
            .into_regressor()
            .unwrap();
        assert_eq!(model.name(), "l1l0");
        assert_eq!(model.get_params()["max_candidates"], ParamValue::Int(64));
    }

    #[test]
    fn stepwise_configs_build_composites() {
        let json = r#"{ "model": "stepwise", "steps": [
            { "name": "ols", "scope": [0, 1], "estimator": { "model": "ordinary_least_squares" } },
            { "name": "lasso", "scope": [2], "estimator": { "model": "lasso", "alpha": 0.1 } }
        ] }"#;
        let model = EstimatorConfig::from_json(json).unwrap().into_regressor().unwrap();
        assert!(model.is_composite());
        assert_eq!(model.get_params()["lasso__fit_intercept"], ParamValue::Bool(false));
    }

    #[test]
    fn nested_stepwise_configs_are_rejected() {
        let json = r#"{ "model": "stepwise", "steps": [
            { "name": "inner", "scope": [0], "estimator": { "model": "stepwise", "steps": [
                { "name": "ols", "scope": [0], "estimator": { "model": "ordinary_least_squares" } }
            ] } }
        ] }"#;
        let result = EstimatorConfig::from_json(json).unwrap().into_regressor();
        assert!(matches!(result, Err(SparseLmError::InvalidComposition(_))));
    }

    #[test]
    fn unknown_models_fail_to_parse() {
        assert!(matches!(
            EstimatorConfig::from_json(r#"{ "model": "ridge" }"#),
            Err(SparseLmError::Json(_))
        ));
    }
}
