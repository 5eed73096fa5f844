//! Group-structured convex estimators: group lasso, sparse group lasso and
//! ridged group lasso.
//!
//! Groups are given as one integer label per feature; `None` puts every
//! feature in its own group. Group weights are indexed by the sorted distinct
//! labels and default to the square root of each group's size.

extern crate nalgebra as na;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::adaptive::{Multipliers, Reweightable, Reweighted, WeightUpdate, fit_unweighted};
use super::{FittedModel, ParamValue, Regressor, Solution, check_non_negative, log_fit, unknown};
use crate::{
    dataset::{Dataset, Design},
    error::{Result, SparseLmError},
    penalty::{GroupIndex, GroupL2, RidgedGroup, SparseGroup},
    problem::{AdmmSettings, solve_penalized},
};

/// Group index for `n_features` coefficients, validating the label count.
pub(crate) fn resolve_groups(labels: Option<&[i64]>, n_features: usize) -> Result<GroupIndex> {
    match labels {
        Some(labels) if labels.len() != n_features => Err(SparseLmError::InvalidParameter(format!(
            "groups has {} labels but the data has {} features",
            labels.len(),
            n_features
        ))),
        Some(labels) => Ok(GroupIndex::from_labels(labels)),
        None => Ok(GroupIndex::singletons(n_features)),
    }
}

fn index_for(labels: Option<&[i64]>, n_features: usize) -> GroupIndex {
    match labels {
        Some(labels) if labels.len() == n_features => GroupIndex::from_labels(labels),
        _ => GroupIndex::singletons(n_features),
    }
}

fn apply_multipliers(mut weights: Vec<f64>, multipliers: Option<&Vec<f64>>) -> Vec<f64> {
    if let Some(m) = multipliers {
        for (w, m) in weights.iter_mut().zip(m) {
            *w *= m;
        }
    }
    weights
}

fn group_multipliers(groups: &GroupIndex, penalized: &na::DVector<f64>, eps: f64, update: WeightUpdate) -> Vec<f64> {
    groups
        .norms(penalized)
        .into_iter()
        .map(|norm| update.apply(norm, eps))
        .collect()
}

/// Each group's columns replaced by an orthonormal basis, with the triangular
/// factors needed to map coefficients back.
struct Orthonormalized {
    a: na::DMatrix<f64>,
    factors: Vec<na::DMatrix<f64>>,
}

impl Orthonormalized {
    fn new(a: &na::DMatrix<f64>, groups: &GroupIndex) -> Result<Self> {
        let mut basis = a.clone();
        let mut factors = Vec::with_capacity(groups.n_groups());
        for (g, members) in groups.iter().enumerate() {
            if members.len() > a.nrows() {
                return Err(SparseLmError::Singular(format!(
                    "group {} has {} features but only {} samples",
                    g,
                    members.len(),
                    a.nrows()
                )));
            }
            let qr = a.select_columns(members).qr();
            let r = qr.r();
            let scale = r.diagonal().iter().fold(0.0f64, |acc, d| acc.max(d.abs()));
            if r.diagonal().iter().any(|d| d.abs() <= 1e-10 * scale.max(1.0)) {
                return Err(SparseLmError::Singular(format!(
                    "group {} is rank deficient and cannot be standardized",
                    g
                )));
            }
            let q = qr.q();
            for (k, &j) in members.iter().enumerate() {
                basis.set_column(j, &q.column(k));
            }
            factors.push(r);
        }
        Ok(Orthonormalized { a: basis, factors })
    }

    fn map_back(&self, coef: &na::DVector<f64>, groups: &GroupIndex) -> Result<na::DVector<f64>> {
        let mut out = coef.clone();
        for (members, r) in groups.iter().zip(&self.factors) {
            let c = coef.select_rows(members);
            let b = r
                .solve_upper_triangular(&c)
                .ok_or_else(|| SparseLmError::Singular("group factor is singular".to_string()))?;
            for (k, &j) in members.iter().enumerate() {
                out[j] = b[k];
            }
        }
        Ok(out)
    }
}

/// Group lasso: `1/(2n) ||X b - y||² + alpha sum_g w_g ||b_g||_2`.
///
/// With `standardize` the penalty acts on `||X_g b_g||_2` instead, which makes
/// the selection invariant to linear reparametrizations within a group.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupLasso {
    pub groups: Option<Vec<i64>>,
    pub alpha: f64,
    pub group_weights: Option<Vec<f64>>,
    pub standardize: bool,
    pub fit_intercept: bool,
    pub solver: AdmmSettings,
    #[serde(skip)]
    fitted: Option<FittedModel>,
}

impl Default for GroupLasso {
    fn default() -> Self {
        GroupLasso {
            groups: None,
            alpha: 1.0,
            group_weights: None,
            standardize: false,
            fit_intercept: true,
            solver: AdmmSettings::default(),
            fitted: None,
        }
    }
}

impl GroupLasso {
    pub fn new(groups: Vec<i64>, alpha: f64) -> Self {
        GroupLasso {
            groups: Some(groups),
            alpha,
            ..Self::default()
        }
    }

    pub fn with_group_weights(mut self, weights: Vec<f64>) -> Self {
        self.group_weights = Some(weights);
        self
    }

    pub fn with_standardize(mut self, standardize: bool) -> Self {
        self.standardize = standardize;
        self
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

impl Reweightable for GroupLasso {
    const ADAPTIVE_NAME: &'static str = "adaptive_group_lasso";

    fn solve_reweighted(
        &self,
        design: &Design,
        multipliers: &Multipliers,
        warm_start: Option<&na::DVector<f64>>,
    ) -> Result<Reweighted> {
        check_non_negative("alpha", self.alpha)?;
        let groups = resolve_groups(self.groups.as_deref(), design.a.ncols())?;
        let weights = groups.resolve_weights(self.group_weights.as_deref())?;
        let penalty = GroupL2 {
            alpha: self.alpha,
            weights: apply_multipliers(weights, multipliers.group.as_ref()),
            groups,
        };

        if !self.standardize {
            let out = solve_penalized(&design.a, &design.y, &penalty, &self.solver, warm_start)?;
            return Ok(Reweighted {
                penalized: out.coef.clone(),
                solution: out.into(),
            });
        }

        let basis = Orthonormalized::new(&design.a, &penalty.groups)?;
        let out = solve_penalized(&basis.a, &design.y, &penalty, &self.solver, warm_start)?;
        let penalized = out.coef.clone();
        let mut solution: Solution = out.into();
        solution.coef = basis.map_back(&penalized, &penalty.groups)?;
        Ok(Reweighted { penalized, solution })
    }

    fn next_multipliers(&self, penalized: &na::DVector<f64>, eps: f64, update: WeightUpdate) -> Multipliers {
        let groups = index_for(self.groups.as_deref(), penalized.len());
        Multipliers {
            l1: None,
            group: Some(group_multipliers(&groups, penalized, eps, update)),
        }
    }
}

impl Regressor for GroupLasso {
    fn name(&self) -> &'static str {
        "group_lasso"
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
            ("groups".to_string(), self.groups.clone().into()),
            ("group_weights".to_string(), self.group_weights.clone().into()),
            ("standardize".to_string(), self.standardize.into()),
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
            "groups" => self.groups = value.as_i64s(name)?,
            "group_weights" => self.group_weights = value.as_f64s(name)?,
            "standardize" => self.standardize = value.as_bool(name)?,
            "fit_intercept" => self.fit_intercept = value.as_bool(name)?,
            _ => return Err(unknown(name, self.name())),
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}

/// Sparse group lasso, mixing an L1 term with the group term.
///
/// Minimizes `1/(2n) ||X b - y||² + alpha (l1_ratio ||b||_1 + (1 - l1_ratio) sum_g w_g ||b_g||_2)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SparseGroupLasso {
    pub groups: Option<Vec<i64>>,
    pub alpha: f64,
    pub l1_ratio: f64,
    pub group_weights: Option<Vec<f64>>,
    pub fit_intercept: bool,
    pub solver: AdmmSettings,
    #[serde(skip)]
    fitted: Option<FittedModel>,
}

impl Default for SparseGroupLasso {
    fn default() -> Self {
        SparseGroupLasso {
            groups: None,
            alpha: 1.0,
            l1_ratio: 0.5,
            group_weights: None,
            fit_intercept: true,
            solver: AdmmSettings::default(),
            fitted: None,
        }
    }
}

impl SparseGroupLasso {
    pub fn new(groups: Vec<i64>, alpha: f64, l1_ratio: f64) -> Self {
        SparseGroupLasso {
            groups: Some(groups),
            alpha,
            l1_ratio,
            ..Self::default()
        }
    }

    pub fn with_group_weights(mut self, weights: Vec<f64>) -> Self {
        self.group_weights = Some(weights);
        self
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

fn check_ratio(l1_ratio: f64) -> Result<()> {
    if (0.0..=1.0).contains(&l1_ratio) {
        Ok(())
    } else {
        Err(SparseLmError::InvalidParameter(format!(
            "l1_ratio must be in [0, 1], got {}",
            l1_ratio
        )))
    }
}

impl Reweightable for SparseGroupLasso {
    const ADAPTIVE_NAME: &'static str = "adaptive_sparse_group_lasso";

    fn solve_reweighted(
        &self,
        design: &Design,
        multipliers: &Multipliers,
        warm_start: Option<&na::DVector<f64>>,
    ) -> Result<Reweighted> {
        check_non_negative("alpha", self.alpha)?;
        check_ratio(self.l1_ratio)?;
        let p = design.a.ncols();
        let groups = resolve_groups(self.groups.as_deref(), p)?;
        let weights = groups.resolve_weights(self.group_weights.as_deref())?;
        let penalty = SparseGroup {
            alpha: self.alpha,
            l1_ratio: self.l1_ratio,
            l1_weights: multipliers
                .l1
                .clone()
                .unwrap_or_else(|| na::DVector::from_element(p, 1.0)),
            group_weights: apply_multipliers(weights, multipliers.group.as_ref()),
            groups,
        };
        let out = solve_penalized(&design.a, &design.y, &penalty, &self.solver, warm_start)?;
        Ok(Reweighted {
            penalized: out.coef.clone(),
            solution: out.into(),
        })
    }

    fn next_multipliers(&self, penalized: &na::DVector<f64>, eps: f64, update: WeightUpdate) -> Multipliers {
        let groups = index_for(self.groups.as_deref(), penalized.len());
        Multipliers {
            l1: Some(penalized.map(|b| update.apply(b.abs(), eps))),
            group: Some(group_multipliers(&groups, penalized, eps, update)),
        }
    }
}

impl Regressor for SparseGroupLasso {
    fn name(&self) -> &'static str {
        "sparse_group_lasso"
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
            ("l1_ratio".to_string(), self.l1_ratio.into()),
            ("groups".to_string(), self.groups.clone().into()),
            ("group_weights".to_string(), self.group_weights.clone().into()),
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
            "l1_ratio" => {
                let ratio = value.as_f64(name)?;
                check_ratio(ratio)?;
                self.l1_ratio = ratio;
            }
            "groups" => self.groups = value.as_i64s(name)?,
            "group_weights" => self.group_weights = value.as_f64s(name)?,
            "fit_intercept" => self.fit_intercept = value.as_bool(name)?,
            _ => return Err(unknown(name, self.name())),
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}

/// Group lasso with an additional per-group ridge term.
///
/// Minimizes `1/(2n) ||X b - y||² + alpha sum_g w_g ||b_g||_2 + sum_g delta_g ||b_g||_2²`.
/// `delta` holds either one value shared by all groups or one value per group.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgedGroupLasso {
    pub groups: Option<Vec<i64>>,
    pub alpha: f64,
    pub delta: Vec<f64>,
    pub group_weights: Option<Vec<f64>>,
    pub fit_intercept: bool,
    pub solver: AdmmSettings,
    #[serde(skip)]
    fitted: Option<FittedModel>,
}

impl Default for RidgedGroupLasso {
    fn default() -> Self {
        RidgedGroupLasso {
            groups: None,
            alpha: 1.0,
            delta: vec![1.0],
            group_weights: None,
            fit_intercept: true,
            solver: AdmmSettings::default(),
            fitted: None,
        }
    }
}

impl RidgedGroupLasso {
    pub fn new(groups: Vec<i64>, alpha: f64, delta: Vec<f64>) -> Self {
        RidgedGroupLasso {
            groups: Some(groups),
            alpha,
            delta,
            ..Self::default()
        }
    }

    pub fn with_group_weights(mut self, weights: Vec<f64>) -> Self {
        self.group_weights = Some(weights);
        self
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    pub fn with_solver(mut self, solver: AdmmSettings) -> Self {
        self.solver = solver;
        self
    }

    fn resolve_delta(&self, n_groups: usize) -> Result<Vec<f64>> {
        for d in &self.delta {
            check_non_negative("delta", *d)?;
        }
        match self.delta.len() {
            1 => Ok(vec![self.delta[0]; n_groups]),
            len if len == n_groups => Ok(self.delta.clone()),
            len => Err(SparseLmError::InvalidParameter(format!(
                "delta must have 1 or {} values, got {}",
                n_groups, len
            ))),
        }
    }
}

impl Reweightable for RidgedGroupLasso {
    const ADAPTIVE_NAME: &'static str = "adaptive_ridged_group_lasso";

    fn solve_reweighted(
        &self,
        design: &Design,
        multipliers: &Multipliers,
        warm_start: Option<&na::DVector<f64>>,
    ) -> Result<Reweighted> {
        check_non_negative("alpha", self.alpha)?;
        let groups = resolve_groups(self.groups.as_deref(), design.a.ncols())?;
        let weights = groups.resolve_weights(self.group_weights.as_deref())?;
        let penalty = RidgedGroup {
            alpha: self.alpha,
            weights: apply_multipliers(weights, multipliers.group.as_ref()),
            delta: self.resolve_delta(groups.n_groups())?,
            groups,
        };
        let out = solve_penalized(&design.a, &design.y, &penalty, &self.solver, warm_start)?;
        Ok(Reweighted {
            penalized: out.coef.clone(),
            solution: out.into(),
        })
    }

    fn next_multipliers(&self, penalized: &na::DVector<f64>, eps: f64, update: WeightUpdate) -> Multipliers {
        let groups = index_for(self.groups.as_deref(), penalized.len());
        Multipliers {
            l1: None,
            group: Some(group_multipliers(&groups, penalized, eps, update)),
        }
    }
}

impl Regressor for RidgedGroupLasso {
    fn name(&self) -> &'static str {
        "ridged_group_lasso"
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
            ("delta".to_string(), self.delta.clone().into()),
            ("groups".to_string(), self.groups.clone().into()),
            ("group_weights".to_string(), self.group_weights.clone().into()),
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
            "delta" => {
                let delta = value
                    .as_f64s(name)?
                    .ok_or_else(|| SparseLmError::InvalidParameter("delta cannot be unset".to_string()))?;
                for d in &delta {
                    check_non_negative(name, *d)?;
                }
                self.delta = delta;
            }
            "groups" => self.groups = value.as_i64s(name)?,
            "group_weights" => self.group_weights = value.as_f64s(name)?,
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
    use crate::model::{AdaptiveGroupLasso, AdaptiveRidgedGroupLasso, AdaptiveSparseGroupLasso, Lasso};
    use crate::utils::ridge_solve;
    use approx::assert_relative_eq;

    /// Centered, mutually orthogonal columns with x_j^T x_j = n.
    fn orthogonal_data() -> Dataset {
        let x = na::DMatrix::from_row_slice(
            4,
            3,
            &[
                1.0, 1.0, 1.0, //
                1.0, -1.0, -1.0, //
                -1.0, 1.0, -1.0, //
                -1.0, -1.0, 1.0,
            ],
        );
        let y = na::DVector::from_vec(vec![5.0, 2.0, -1.0, -2.0]);
        Dataset::new(x, y).unwrap()
    }

    fn grouped_data() -> Dataset {
        let n = 30;
        let x = na::DMatrix::from_fn(n, 4, |i, j| {
            let t = (i + 1) as f64;
            ((j + 1) as f64 * 0.7 * t).sin() + 0.1 * (j as f64) * (0.3 * t).cos()
        });
        let y = x.column(0) * 2.0 - x.column(1) * 1.5;
        Dataset::new(x, y).unwrap()
    }

    #[test]
    fn matches_block_soft_threshold_on_orthogonal_design() {
        let data = orthogonal_data();
        let alpha = 0.5;
        let mut model = GroupLasso::new(vec![0, 0, 1], alpha);
        model.fit(&data).unwrap();

        let n = data.n_samples() as f64;
        let y_centered = data.y().add_scalar(-data.y().mean());
        let v = data.x().transpose() * y_centered / n;
        let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
        let shrink = (1.0 - alpha * 2f64.sqrt() / norm).max(0.0);
        let coef = model.coef().unwrap();
        assert_relative_eq!(coef[0], v[0] * shrink, epsilon = 1e-6);
        assert_relative_eq!(coef[1], v[1] * shrink, epsilon = 1e-6);
        assert_relative_eq!(coef[2], (1.0 - alpha / v[2].abs()).max(0.0) * v[2], epsilon = 1e-6);
    }

    #[test]
    fn uninformative_group_is_zeroed_as_a_block() {
        let data = grouped_data();
        let mut model = GroupLasso::new(vec![0, 0, 1, 1], 0.2);
        model.fit(&data).unwrap();
        let coef = model.coef().unwrap();
        assert!(coef[0] != 0.0 && coef[1] != 0.0);
        assert_eq!(coef[2], 0.0);
        assert_eq!(coef[3], 0.0);
    }

    #[test]
    fn singleton_groups_reduce_to_lasso() {
        let data = grouped_data();
        let mut group = GroupLasso::default();
        group.alpha = 0.1;
        group.fit(&data).unwrap();
        let mut lasso = Lasso::new(0.1);
        lasso.fit(&data).unwrap();
        assert_relative_eq!(group.coef().unwrap(), lasso.coef().unwrap(), epsilon = 1e-6);
    }

    #[test]
    fn standardized_penalty_scales_with_group_design() {
        // X_g^T X_g = n I, so ||X_g b_g|| = sqrt(n) ||b_g||
        let data = orthogonal_data();
        let mut standardized = GroupLasso::new(vec![0, 0, 1], 0.3).with_standardize(true);
        standardized.fit(&data).unwrap();
        let mut plain = GroupLasso::new(vec![0, 0, 1], 0.6);
        plain.fit(&data).unwrap();
        assert_relative_eq!(standardized.coef().unwrap(), plain.coef().unwrap(), epsilon = 1e-6);
    }

    #[test]
    fn rank_deficient_group_cannot_be_standardized() {
        let mut x = grouped_data().x().clone();
        let first = x.column(0).clone_owned();
        x.set_column(1, &(first * 2.0));
        let data = Dataset::new(x, grouped_data().y().clone()).unwrap();
        let mut model = GroupLasso::new(vec![0, 0, 1, 1], 0.1).with_standardize(true);
        assert!(matches!(model.fit(&data), Err(SparseLmError::Singular(_))));
    }

    #[test]
    fn group_label_count_must_match_features() {
        let mut model = GroupLasso::new(vec![0, 1], 0.1);
        assert!(model.fit(&grouped_data()).is_err());
    }

    #[test]
    fn sparse_group_interpolates_between_lasso_and_group_lasso() {
        let data = grouped_data();
        let labels = vec![0, 0, 1, 1];

        let mut pure_l1 = SparseGroupLasso::new(labels.clone(), 0.1, 1.0);
        pure_l1.fit(&data).unwrap();
        let mut lasso = Lasso::new(0.1);
        lasso.fit(&data).unwrap();
        assert_relative_eq!(pure_l1.coef().unwrap(), lasso.coef().unwrap(), epsilon = 1e-6);

        let mut pure_group = SparseGroupLasso::new(labels.clone(), 0.1, 0.0);
        pure_group.fit(&data).unwrap();
        let mut group = GroupLasso::new(labels, 0.1);
        group.fit(&data).unwrap();
        assert_relative_eq!(pure_group.coef().unwrap(), group.coef().unwrap(), epsilon = 1e-6);

        assert!(SparseGroupLasso::default().set_param("l1_ratio", 1.5.into()).is_err());
    }

    #[test]
    fn ridged_group_without_group_term_is_ridge() {
        let data = grouped_data();
        let delta = 0.25;
        let mut model = RidgedGroupLasso::new(vec![0, 0, 0, 0], 0.0, vec![delta]).with_fit_intercept(false);
        model.fit(&data).unwrap();
        let n = data.n_samples() as f64;
        let expected = ridge_solve(data.x(), data.y(), 2.0 * n * delta).unwrap();
        assert_relative_eq!(model.coef().unwrap(), &expected, epsilon = 1e-6);
    }

    #[test]
    fn ridged_group_delta_is_broadcast_or_per_group() {
        let data = grouped_data();
        let mut zero_delta = RidgedGroupLasso::new(vec![0, 0, 1, 1], 0.05, vec![0.0, 0.0]);
        zero_delta.fit(&data).unwrap();
        let mut group = GroupLasso::new(vec![0, 0, 1, 1], 0.05);
        group.fit(&data).unwrap();
        assert_relative_eq!(zero_delta.coef().unwrap(), group.coef().unwrap(), epsilon = 1e-6);

        let mut bad = RidgedGroupLasso::new(vec![0, 0, 1, 1], 0.05, vec![0.1, 0.2, 0.3]);
        assert!(bad.fit(&data).is_err());
    }

    #[test]
    fn adaptive_group_lasso_shrinks_less() {
        let data = grouped_data();
        let labels = vec![0, 0, 1, 1];
        let mut plain = GroupLasso::new(labels.clone(), 0.2);
        plain.fit(&data).unwrap();
        let mut adaptive = AdaptiveGroupLasso::new(GroupLasso::new(labels, 0.2));
        adaptive.fit(&data).unwrap();

        let plain_err = (plain.coef().unwrap()[0] - 2.0).abs();
        let adaptive_err = (adaptive.coef().unwrap()[0] - 2.0).abs();
        assert!(adaptive_err < plain_err);
        assert_eq!(adaptive.coef().unwrap()[2], 0.0);
    }

    #[test]
    fn sparse_group_reweights_both_penalty_terms() {
        let model = SparseGroupLasso::new(vec![0, 0, 1], 0.1, 0.5);
        let penalized = na::DVector::from_vec(vec![3.0, 4.0, 0.0]);
        let m = model.next_multipliers(&penalized, 1.0, WeightUpdate::Inverse);
        assert_relative_eq!(m.l1.unwrap(), na::DVector::from_vec(vec![0.25, 0.2, 1.0]));
        assert_eq!(m.group.unwrap(), vec![1.0 / 6.0, 1.0]);

        let ridged = RidgedGroupLasso::new(vec![0, 0, 1], 0.1, vec![0.1]);
        let m = ridged.next_multipliers(&penalized, 1.0, WeightUpdate::InverseSqrt);
        assert!(m.l1.is_none());
        assert_relative_eq!(m.group.unwrap()[0], 1.0 / 6.0f64.sqrt());
    }

    #[test]
    fn adaptive_sparse_group_lasso_shrinks_less() {
        let data = grouped_data();
        let labels = vec![0, 0, 1, 1];
        let mut plain = SparseGroupLasso::new(labels.clone(), 0.2, 0.5);
        plain.fit(&data).unwrap();

        let mut unrefit =
            AdaptiveSparseGroupLasso::new(SparseGroupLasso::new(labels.clone(), 0.2, 0.5)).with_max_iter(0);
        unrefit.fit(&data).unwrap();
        assert_eq!(unrefit.coef(), plain.coef());

        let mut adaptive = AdaptiveSparseGroupLasso::new(SparseGroupLasso::new(labels, 0.2, 0.5));
        adaptive.fit(&data).unwrap();
        assert_eq!(adaptive.name(), "adaptive_sparse_group_lasso");
        assert!((adaptive.coef().unwrap()[0] - 2.0).abs() < (plain.coef().unwrap()[0] - 2.0).abs());
        assert_eq!(adaptive.get_params()["l1_ratio"], ParamValue::Float(0.5));
    }

    #[test]
    fn adaptive_ridged_group_lasso_shrinks_less() {
        let data = grouped_data();
        let labels = vec![0, 0, 1, 1];
        let mut plain = RidgedGroupLasso::new(labels.clone(), 0.2, vec![0.01]);
        plain.fit(&data).unwrap();

        let base = RidgedGroupLasso::new(labels, 0.2, vec![0.01]);
        let mut unrefit = AdaptiveRidgedGroupLasso::new(base.clone()).with_max_iter(0);
        unrefit.fit(&data).unwrap();
        assert_eq!(unrefit.coef(), plain.coef());

        let mut adaptive = AdaptiveRidgedGroupLasso::new(base);
        adaptive.fit(&data).unwrap();
        assert_eq!(adaptive.name(), "adaptive_ridged_group_lasso");
        assert!((adaptive.coef().unwrap()[0] - 2.0).abs() < (plain.coef().unwrap()[0] - 2.0).abs());
    }
}
