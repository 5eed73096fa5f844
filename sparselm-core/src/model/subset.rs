//! Best subset selection and L0-penalized estimators.
//!
//! The support is searched exhaustively: every admissible candidate support
//! is fitted with a small convex subproblem restricted to its columns, and the
//! candidate with the lowest objective wins. Ties go to the smaller support,
//! then to the candidate enumerated first. Candidates are enumerated by
//! increasing size and lexicographically within a size.
//!
//! Selection units are single features, or whole groups when group labels are
//! given. A hierarchy lists, for every unit, the units it depends on; a
//! support is admissible only if it contains the dependencies of all its units.

extern crate nalgebra as na;

use std::collections::BTreeMap;
use std::time::Instant;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{FittedModel, ParamValue, Regressor, Solution, check_non_negative, fit_linear, log_fit, unknown};
use crate::{
    dataset::{Dataset, Design},
    error::{Result, SparseLmError},
    penalty::{GroupIndex, WeightedL1},
    problem::{AdmmSettings, solve_penalized},
    timing::TimingTracker,
    utils::{least_squares, ridge_solve},
};

pub const DEFAULT_MAX_CANDIDATES: u64 = 1 << 20;

/// Options shared by every support-search estimator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportOptions {
    /// One group label per feature; groups are selected as a whole
    pub groups: Option<Vec<i64>>,
    /// `hierarchy[i]` lists the units unit `i` depends on
    pub hierarchy: Option<Vec<Vec<usize>>>,
    /// Refuse to search more candidate supports than this
    pub max_candidates: u64,
}

impl Default for SupportOptions {
    fn default() -> Self {
        SupportOptions {
            groups: None,
            hierarchy: None,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }
}

impl SupportOptions {
    fn insert_params(&self, params: &mut BTreeMap<String, ParamValue>) {
        params.insert("groups".to_string(), self.groups.clone().into());
        params.insert(
            "hierarchy".to_string(),
            self.hierarchy.as_ref().map_or(ParamValue::None, |h| {
                ParamValue::IntLists(
                    h.iter()
                        .map(|deps| deps.iter().map(|&d| d as i64).collect())
                        .collect(),
                )
            }),
        );
        let max_candidates = i64::try_from(self.max_candidates).unwrap_or(i64::MAX);
        params.insert("max_candidates".to_string(), ParamValue::Int(max_candidates));
    }

    /// Handles the shared parameters; `Ok(false)` means the name is not one of them.
    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<bool> {
        match name {
            "groups" => self.groups = value.as_i64s(name)?,
            "hierarchy" => {
                self.hierarchy = match value.as_int_lists(name)? {
                    None => None,
                    Some(lists) => Some(
                        lists
                            .into_iter()
                            .map(|deps| {
                                deps.into_iter()
                                    .map(|d| {
                                        usize::try_from(d).map_err(|_| {
                                            SparseLmError::InvalidParameter(format!(
                                                "hierarchy entries must be non-negative, got {}",
                                                d
                                            ))
                                        })
                                    })
                                    .collect::<Result<Vec<_>>>()
                            })
                            .collect::<Result<Vec<_>>>()?,
                    ),
                }
            }
            "max_candidates" => self.max_candidates = value.as_usize(name)? as u64,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// Which supports a search may consider.
#[derive(Clone, Copy, Debug)]
enum Cardinality {
    AtMost(usize),
    Any,
}

/// Selection units of a search and the hierarchy between them.
struct SearchSpace {
    units: Vec<Vec<usize>>,
    hierarchy: Vec<Vec<usize>>,
}

impl SearchSpace {
    fn new(options: &SupportOptions, n_features: usize) -> Result<Self> {
        let groups = match &options.groups {
            Some(labels) if labels.len() != n_features => {
                return Err(SparseLmError::InvalidParameter(format!(
                    "groups has {} labels but the data has {} features",
                    labels.len(),
                    n_features
                )));
            }
            Some(labels) => GroupIndex::from_labels(labels),
            None => GroupIndex::singletons(n_features),
        };
        let units: Vec<Vec<usize>> = groups.iter().map(|m| m.to_vec()).collect();

        let hierarchy = match &options.hierarchy {
            None => vec![Vec::new(); units.len()],
            Some(h) if h.len() != units.len() => {
                return Err(SparseLmError::InvalidParameter(format!(
                    "hierarchy has {} entries but there are {} selection units",
                    h.len(),
                    units.len()
                )));
            }
            Some(h) => {
                if let Some(&bad) = h.iter().flatten().find(|&&d| d >= units.len()) {
                    return Err(SparseLmError::InvalidParameter(format!(
                        "hierarchy refers to unit {} but there are only {}",
                        bad,
                        units.len()
                    )));
                }
                h.clone()
            }
        };
        Ok(SearchSpace { units, hierarchy })
    }

    /// Number of supports the cardinality allows, before the hierarchy filter.
    fn count(&self, cardinality: Cardinality) -> u128 {
        let n = self.units.len();
        match cardinality {
            Cardinality::Any => {
                if n >= 128 {
                    u128::MAX
                } else {
                    1u128 << n
                }
            }
            Cardinality::AtMost(k) => (0..=k.min(n))
                .map(|s| binomial(n, s))
                .fold(0u128, |acc, c| acc.saturating_add(c)),
        }
    }

    fn admissible(&self, support: &[usize]) -> bool {
        support
            .iter()
            .all(|&u| self.hierarchy[u].iter().all(|dep| support.contains(dep)))
    }

    fn candidates(&self, cardinality: Cardinality) -> Vec<Vec<usize>> {
        let n = self.units.len();
        let max_size = match cardinality {
            Cardinality::Any => n,
            Cardinality::AtMost(k) => k.min(n),
        };
        let mut out = Vec::new();
        for size in 0..=max_size {
            for_each_combination(n, size, |support| {
                if self.admissible(support) {
                    out.push(support.to_vec());
                }
            });
        }
        out
    }

    fn features(&self, support: &[usize]) -> Vec<usize> {
        let mut features: Vec<usize> = support.iter().flat_map(|&u| self.units[u].iter().copied()).collect();
        features.sort_unstable();
        features
    }
}

fn binomial(n: usize, k: usize) -> u128 {
    let mut c: u128 = 1;
    for i in 0..k {
        c = match c.checked_mul((n - i) as u128) {
            Some(v) => v / (i as u128 + 1),
            None => return u128::MAX,
        };
    }
    c
}

/// Calls `f` with every `k`-subset of `0..n` in lexicographic order.
fn for_each_combination<F: FnMut(&[usize])>(n: usize, k: usize, mut f: F) {
    if k > n {
        return;
    }
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        f(&idx);
        let Some(i) = (0..k).rev().find(|&i| idx[i] != i + n - k) else {
            return;
        };
        idx[i] += 1;
        for j in i + 1..k {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

/// Result of the convex subproblem on one support.
struct SubsetFit {
    coef: na::DVector<f64>,
    /// Smooth loss plus continuous penalty, without the L0 term
    objective: f64,
    converged: bool,
}

/// Exhaustive search over supports. `l0` is charged per active unit.
fn search<F>(
    design: &Design,
    options: &SupportOptions,
    cardinality: Cardinality,
    l0: f64,
    solve: F,
) -> Result<Solution>
where
    F: Fn(&na::DMatrix<f64>, &na::DVector<f64>) -> Result<SubsetFit> + Sync,
{
    let p = design.a.ncols();
    let space = SearchSpace::new(options, p)?;
    let total = space.count(cardinality);
    if total > options.max_candidates as u128 {
        return Err(SparseLmError::SearchTooLarge {
            candidates: total,
            limit: options.max_candidates as u128,
        });
    }

    let start = Instant::now();
    let candidates = space.candidates(cardinality);
    tracing::info!(
        "searching {} admissible supports over {} units",
        candidates.len(),
        space.units.len()
    );

    let evaluate = |support: &Vec<usize>| -> Result<SubsetFit> {
        let features = space.features(support);
        solve(&design.a.select_columns(&features), &design.y)
    };
    #[cfg(feature = "rayon")]
    let fits: Vec<Result<SubsetFit>> = candidates.par_iter().map(evaluate).collect();
    #[cfg(not(feature = "rayon"))]
    let fits: Vec<Result<SubsetFit>> = candidates.iter().map(evaluate).collect();

    let mut best: Option<(usize, f64, SubsetFit)> = None;
    let mut converged = true;
    for (index, fit) in fits.into_iter().enumerate() {
        let fit = fit?;
        converged &= fit.converged;
        let objective = fit.objective + l0 * candidates[index].len() as f64;
        let better = match &best {
            None => true,
            // candidates are ordered by size, so keeping the incumbent on near-ties prefers
            // the smaller support
            Some((_, incumbent, _)) => objective < incumbent - 1e-12 * incumbent.abs().max(1.0),
        };
        if better {
            best = Some((index, objective, fit));
        }
    }
    let (index, objective, fit) =
        best.ok_or_else(|| SparseLmError::InvalidParameter("no admissible support".to_string()))?;

    let features = space.features(&candidates[index]);
    let mut coef = na::DVector::zeros(p);
    for (k, &j) in features.iter().enumerate() {
        coef[j] = fit.coef[k];
    }
    tracing::debug!("best support {:?} (features {:?}), objective {:.6e}", candidates[index], features, objective);

    let mut timings = TimingTracker::new();
    timings.record_step("support_search", start.elapsed());
    Ok(Solution {
        coef,
        objective,
        n_iter: candidates.len(),
        converged,
        timings,
    })
}

fn squared_loss(a: &na::DMatrix<f64>, y: &na::DVector<f64>, coef: &na::DVector<f64>) -> f64 {
    let n = a.nrows().max(1) as f64;
    0.5 * (a * coef - y).norm_squared() / n
}

/// Least squares (optionally ridged with `eta ||b||²`) on one support.
fn ridge_fit(a: &na::DMatrix<f64>, y: &na::DVector<f64>, eta: f64) -> Result<SubsetFit> {
    let n = a.nrows() as f64;
    let coef = if eta > 0.0 {
        ridge_solve(a, y, 2.0 * n * eta)?
    } else {
        least_squares(a, y)?
    };
    let objective = squared_loss(a, y, &coef) + eta * coef.norm_squared();
    Ok(SubsetFit {
        coef,
        objective,
        converged: true,
    })
}

fn check_eta(eta: f64) -> Result<()> {
    check_non_negative("eta", eta)
}

/// Best subset selection: least squares subject to `||b||_0 <= sparse_bound`.
///
/// With groups, the bound counts selected groups.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BestSubsetSelection {
    pub sparse_bound: usize,
    #[serde(flatten)]
    pub support: SupportOptions,
    pub fit_intercept: bool,
    #[serde(skip)]
    fitted: Option<FittedModel>,
}

impl Default for BestSubsetSelection {
    fn default() -> Self {
        BestSubsetSelection {
            sparse_bound: 1,
            support: SupportOptions::default(),
            fit_intercept: true,
            fitted: None,
        }
    }
}

impl BestSubsetSelection {
    pub fn new(sparse_bound: usize) -> Self {
        BestSubsetSelection {
            sparse_bound,
            ..Self::default()
        }
    }

    pub fn with_groups(mut self, groups: Vec<i64>) -> Self {
        self.support.groups = Some(groups);
        self
    }

    pub fn with_hierarchy(mut self, hierarchy: Vec<Vec<usize>>) -> Self {
        self.support.hierarchy = Some(hierarchy);
        self
    }

    pub fn with_max_candidates(mut self, max_candidates: u64) -> Self {
        self.support.max_candidates = max_candidates;
        self
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }
}

impl Regressor for BestSubsetSelection {
    fn name(&self) -> &'static str {
        "best_subset_selection"
    }

    fn fit(&mut self, data: &Dataset) -> Result<()> {
        let fitted = fit_linear(data, self.fit_intercept, |design| {
            search(design, &self.support, Cardinality::AtMost(self.sparse_bound), 0.0, |a, y| {
                ridge_fit(a, y, 0.0)
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
        let mut params = BTreeMap::from([
            ("sparse_bound".to_string(), self.sparse_bound.into()),
            ("fit_intercept".to_string(), self.fit_intercept.into()),
        ]);
        self.support.insert_params(&mut params);
        params
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match name {
            "sparse_bound" => self.sparse_bound = value.as_usize(name)?,
            "fit_intercept" => self.fit_intercept = value.as_bool(name)?,
            _ => {
                if !self.support.set_param(name, &value)? {
                    return Err(unknown(name, self.name()));
                }
            }
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}

/// Best subset selection with a ridge term `eta ||b||²`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgedBestSubsetSelection {
    pub sparse_bound: usize,
    pub eta: f64,
    #[serde(flatten)]
    pub support: SupportOptions,
    pub fit_intercept: bool,
    #[serde(skip)]
    fitted: Option<FittedModel>,
}

impl Default for RidgedBestSubsetSelection {
    fn default() -> Self {
        RidgedBestSubsetSelection {
            sparse_bound: 1,
            eta: 1.0,
            support: SupportOptions::default(),
            fit_intercept: true,
            fitted: None,
        }
    }
}

impl RidgedBestSubsetSelection {
    pub fn new(sparse_bound: usize, eta: f64) -> Self {
        RidgedBestSubsetSelection {
            sparse_bound,
            eta,
            ..Self::default()
        }
    }

    pub fn with_groups(mut self, groups: Vec<i64>) -> Self {
        self.support.groups = Some(groups);
        self
    }

    pub fn with_hierarchy(mut self, hierarchy: Vec<Vec<usize>>) -> Self {
        self.support.hierarchy = Some(hierarchy);
        self
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }
}

impl Regressor for RidgedBestSubsetSelection {
    fn name(&self) -> &'static str {
        "ridged_best_subset_selection"
    }

    fn fit(&mut self, data: &Dataset) -> Result<()> {
        check_eta(self.eta)?;
        let fitted = fit_linear(data, self.fit_intercept, |design| {
            search(design, &self.support, Cardinality::AtMost(self.sparse_bound), 0.0, |a, y| {
                ridge_fit(a, y, self.eta)
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
        let mut params = BTreeMap::from([
            ("sparse_bound".to_string(), self.sparse_bound.into()),
            ("eta".to_string(), self.eta.into()),
            ("fit_intercept".to_string(), self.fit_intercept.into()),
        ]);
        self.support.insert_params(&mut params);
        params
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match name {
            "sparse_bound" => self.sparse_bound = value.as_usize(name)?,
            "eta" => {
                let eta = value.as_f64(name)?;
                check_eta(eta)?;
                self.eta = eta;
            }
            "fit_intercept" => self.fit_intercept = value.as_bool(name)?,
            _ => {
                if !self.support.set_param(name, &value)? {
                    return Err(unknown(name, self.name()));
                }
            }
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}

/// L0 plus L1 penalized least squares: `alpha ||b||_0 + eta ||b||_1`.
///
/// The per-support Lasso subproblems are solved with ADMM.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct L1L0 {
    pub alpha: f64,
    pub eta: f64,
    #[serde(flatten)]
    pub support: SupportOptions,
    pub fit_intercept: bool,
    pub solver: AdmmSettings,
    #[serde(skip)]
    fitted: Option<FittedModel>,
}

impl Default for L1L0 {
    fn default() -> Self {
        L1L0 {
            alpha: 1.0,
            eta: 1.0,
            support: SupportOptions::default(),
            fit_intercept: true,
            solver: AdmmSettings::default(),
            fitted: None,
        }
    }
}

impl L1L0 {
    pub fn new(alpha: f64, eta: f64) -> Self {
        L1L0 {
            alpha,
            eta,
            ..Self::default()
        }
    }

    pub fn with_groups(mut self, groups: Vec<i64>) -> Self {
        self.support.groups = Some(groups);
        self
    }

    pub fn with_hierarchy(mut self, hierarchy: Vec<Vec<usize>>) -> Self {
        self.support.hierarchy = Some(hierarchy);
        self
    }

    pub fn with_max_candidates(mut self, max_candidates: u64) -> Self {
        self.support.max_candidates = max_candidates;
        self
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }
}

impl Regressor for L1L0 {
    fn name(&self) -> &'static str {
        "l1l0"
    }

    fn fit(&mut self, data: &Dataset) -> Result<()> {
        check_non_negative("alpha", self.alpha)?;
        check_eta(self.eta)?;
        let fitted = fit_linear(data, self.fit_intercept, |design| {
            search(design, &self.support, Cardinality::Any, self.alpha, |a, y| {
                if self.eta == 0.0 {
                    return ridge_fit(a, y, 0.0);
                }
                let penalty = WeightedL1::new(self.eta, a.ncols());
                let out = solve_penalized(a, y, &penalty, &self.solver, None)?;
                Ok(SubsetFit {
                    coef: out.coef,
                    objective: out.objective,
                    converged: out.status.converged,
                })
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
        let mut params = BTreeMap::from([
            ("alpha".to_string(), self.alpha.into()),
            ("eta".to_string(), self.eta.into()),
            ("fit_intercept".to_string(), self.fit_intercept.into()),
        ]);
        self.support.insert_params(&mut params);
        params
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match name {
            "alpha" => {
                let alpha = value.as_f64(name)?;
                check_non_negative(name, alpha)?;
                self.alpha = alpha;
            }
            "eta" => {
                let eta = value.as_f64(name)?;
                check_eta(eta)?;
                self.eta = eta;
            }
            "fit_intercept" => self.fit_intercept = value.as_bool(name)?,
            _ => {
                if !self.support.set_param(name, &value)? {
                    return Err(unknown(name, self.name()));
                }
            }
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}

/// L0 plus ridge penalized least squares: `alpha ||b||_0 + eta ||b||_2²`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct L2L0 {
    pub alpha: f64,
    pub eta: f64,
    #[serde(flatten)]
    pub support: SupportOptions,
    pub fit_intercept: bool,
    #[serde(skip)]
    fitted: Option<FittedModel>,
}

impl Default for L2L0 {
    fn default() -> Self {
        L2L0 {
            alpha: 1.0,
            eta: 1.0,
            support: SupportOptions::default(),
            fit_intercept: true,
            fitted: None,
        }
    }
}

impl L2L0 {
    pub fn new(alpha: f64, eta: f64) -> Self {
        L2L0 {
            alpha,
            eta,
            ..Self::default()
        }
    }

    pub fn with_groups(mut self, groups: Vec<i64>) -> Self {
        self.support.groups = Some(groups);
        self
    }

    pub fn with_hierarchy(mut self, hierarchy: Vec<Vec<usize>>) -> Self {
        self.support.hierarchy = Some(hierarchy);
        self
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }
}

impl Regressor for L2L0 {
    fn name(&self) -> &'static str {
        "l2l0"
    }

    fn fit(&mut self, data: &Dataset) -> Result<()> {
        check_non_negative("alpha", self.alpha)?;
        check_eta(self.eta)?;
        let fitted = fit_linear(data, self.fit_intercept, |design| {
            search(design, &self.support, Cardinality::Any, self.alpha, |a, y| {
                ridge_fit(a, y, self.eta)
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
        let mut params = BTreeMap::from([
            ("alpha".to_string(), self.alpha.into()),
            ("eta".to_string(), self.eta.into()),
            ("fit_intercept".to_string(), self.fit_intercept.into()),
        ]);
        self.support.insert_params(&mut params);
        params
    }

    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        match name {
            "alpha" => {
                let alpha = value.as_f64(name)?;
                check_non_negative(name, alpha)?;
                self.alpha = alpha;
            }
            "eta" => {
                let eta = value.as_f64(name)?;
                check_eta(eta)?;
                self.eta = eta;
            }
            "fit_intercept" => self.fit_intercept = value.as_bool(name)?,
            _ => {
                if !self.support.set_param(name, &value)? {
                    return Err(unknown(name, self.name()));
                }
            }
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Regressor> {
        Box::new(self.clone())
    }
}
