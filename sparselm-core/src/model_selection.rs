//! Cross-validated hyperparameter selection.
//!
//! [`GridSearchCV`] scores every combination of a parameter grid,
//! [`LineSearchCV`] tunes one parameter at a time holding the others at their
//! current best. Both split data with [`KFold`] and rank candidates by a
//! [`Scoring`] where higher is better.

extern crate nalgebra as na;

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::seq::SliceRandom;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    dataset::Dataset,
    error::{Result, SparseLmError},
    model::{ParamValue, Regressor},
    utils::r2_score,
};

/// K-fold splitter. The first `n % n_splits` folds get one extra sample.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub random_state: Option<u64>,
}

impl Default for KFold {
    fn default() -> Self {
        KFold {
            n_splits: 5,
            shuffle: false,
            random_state: None,
        }
    }
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        KFold {
            n_splits,
            ..Self::default()
        }
    }

    /// Shuffles samples before splitting, seeded when `random_state` is given.
    pub fn with_shuffle(mut self, random_state: Option<u64>) -> Self {
        self.shuffle = true;
        self.random_state = random_state;
        self
    }

    /// `(train, test)` sample indices for every fold.
    pub fn split(&self, n_samples: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
        if self.n_splits < 2 {
            return Err(SparseLmError::InvalidParameter(format!(
                "n_splits must be at least 2, got {}",
                self.n_splits
            )));
        }
        if self.n_splits > n_samples {
            return Err(SparseLmError::InvalidParameter(format!(
                "cannot split {} samples into {} folds",
                n_samples, self.n_splits
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            let seed = self.random_state.unwrap_or_else(rand::random);
            let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
            indices.shuffle(&mut rng);
        }

        let base_fold_size = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for i in 0..self.n_splits {
            let fold_size = if i < remainder {
                base_fold_size + 1
            } else {
                base_fold_size
            };
            let test = indices[start..start + fold_size].to_vec();
            let train = indices[..start]
                .iter()
                .chain(&indices[start + fold_size..])
                .copied()
                .collect();
            folds.push((train, test));
            start += fold_size;
        }
        Ok(folds)
    }
}

/// Validation score; higher is better.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    #[default]
    NegRootMeanSquaredError,
    NegMeanSquaredError,
    NegMeanAbsoluteError,
    R2,
}

impl Scoring {
    pub fn score(self, estimator: &dyn Regressor, data: &Dataset) -> Result<f64> {
        let prediction = estimator.predict(data.x())?;
        if self == Scoring::R2 {
            return r2_score(data.y(), &prediction, data.sample_weight());
        }

        let errors = data.y() - &prediction;
        let mean = |values: na::DVector<f64>| match data.sample_weight() {
            Some(w) => values.dot(w) / w.sum(),
            None => values.mean(),
        };
        Ok(match self {
            Scoring::NegMeanAbsoluteError => -mean(errors.abs()),
            Scoring::NegMeanSquaredError => -mean(errors.component_mul(&errors)),
            _ => -mean(errors.component_mul(&errors)).sqrt(),
        })
    }
}

/// Rule picking the winning candidate from the cross-validation scores.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Highest mean score
    #[default]
    MaxScore,
    /// Among candidates within one standard deviation of the best mean, the
    /// one with the largest value of the leading parameter
    OneStdScore,
}

/// Parameter names with the values to try, in search order.
pub type ParamGrid = Vec<(String, Vec<ParamValue>)>;

/// Cross-validation scores of one parameter combination.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CandidateResult {
    pub params: BTreeMap<String, ParamValue>,
    pub mean_score: f64,
    pub std_score: f64,
    pub split_scores: Vec<f64>,
}

/// Every evaluated candidate and the index of the selected one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CvResults {
    pub candidates: Vec<CandidateResult>,
    pub best_index: usize,
}

impl CvResults {
    pub fn best(&self) -> &CandidateResult {
        &self.candidates[self.best_index]
    }

    pub fn best_params(&self) -> &BTreeMap<String, ParamValue> {
        &self.best().params
    }

    pub fn best_score(&self) -> f64 {
        self.best().mean_score
    }
}

fn validate_grid(estimator: &dyn Regressor, grid: &ParamGrid) -> Result<()> {
    if grid.is_empty() {
        return Err(SparseLmError::InvalidParameter("parameter grid is empty".to_string()));
    }
    let known = estimator.get_params();
    for (name, values) in grid {
        if !known.contains_key(name) {
            return Err(SparseLmError::UnknownParameter(name.clone(), estimator.name().to_string()));
        }
        if values.is_empty() {
            return Err(SparseLmError::InvalidParameter(format!("no values given for {}", name)));
        }
    }
    Ok(())
}

/// Cross-validates one parameter combination.
fn evaluate(
    estimator: &dyn Regressor,
    params: BTreeMap<String, ParamValue>,
    data: &Dataset,
    folds: &[(Vec<usize>, Vec<usize>)],
    scoring: Scoring,
) -> Result<CandidateResult> {
    let mut model = estimator.clone_box();
    model.set_params(&params)?;
    let mut split_scores = Vec::with_capacity(folds.len());
    for (train, test) in folds {
        model.fit(&data.select_samples(train)?)?;
        split_scores.push(scoring.score(model.as_ref(), &data.select_samples(test)?)?);
    }
    let n = split_scores.len() as f64;
    let mean_score = split_scores.iter().sum::<f64>() / n;
    let std_score = (split_scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n).sqrt();
    Ok(CandidateResult {
        params,
        mean_score,
        std_score,
        split_scores,
    })
}

fn evaluate_all(
    estimator: &dyn Regressor,
    combinations: Vec<BTreeMap<String, ParamValue>>,
    data: &Dataset,
    folds: &[(Vec<usize>, Vec<usize>)],
    scoring: Scoring,
) -> Result<Vec<CandidateResult>> {
    #[cfg(feature = "rayon")]
    let results = combinations
        .into_par_iter()
        .map(|params| evaluate(estimator, params, data, folds, scoring))
        .collect();
    #[cfg(not(feature = "rayon"))]
    let results = combinations
        .into_iter()
        .map(|params| evaluate(estimator, params, data, folds, scoring))
        .collect();
    results
}

/// Index of the winning candidate. `leading` names the parameter that orders
/// candidates for [`SelectionMethod::OneStdScore`].
pub fn select_candidate(candidates: &[CandidateResult], method: SelectionMethod, leading: &str) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, c) in candidates.iter().enumerate() {
        if best.is_none_or(|b| c.mean_score > candidates[b].mean_score) {
            best = Some(i);
        }
    }
    let best = best?;
    if method == SelectionMethod::MaxScore {
        return Some(best);
    }

    let threshold = candidates[best].mean_score - candidates[best].std_score;
    let key = |c: &CandidateResult| c.params.get(leading).and_then(ParamValue::sort_key);
    let Some(mut chosen_key) = key(&candidates[best]) else {
        return Some(best);
    };
    let mut chosen = best;
    for (i, c) in candidates.iter().enumerate() {
        if c.mean_score < threshold {
            continue;
        }
        if let Some(k) = key(c) {
            if k > chosen_key || (k == chosen_key && i < chosen) {
                chosen = i;
                chosen_key = k;
            }
        }
    }
    Some(chosen)
}

fn refit_best(
    estimator: &dyn Regressor,
    params: &BTreeMap<String, ParamValue>,
    data: &Dataset,
) -> Result<Box<dyn Regressor>> {
    let mut best = estimator.clone_box();
    best.set_params(params)?;
    best.fit(data)?;
    Ok(best)
}

/// Exhaustive search over the Cartesian product of a parameter grid.
///
/// # Example
///
/// ```rust
/// # use sparselm_core::model::{Lasso, ParamValue};
/// # use sparselm_core::model_selection::{GridSearchCV, SelectionMethod};
///
/// let grid = vec![("alpha".to_string(), vec![ParamValue::Float(0.1), ParamValue::Float(1.0)])];
/// let search = GridSearchCV::new(Box::new(Lasso::default()), grid)
///     .unwrap()
///     .with_selection(SelectionMethod::OneStdScore);
/// assert!(search.results().is_none());
/// ```
#[derive(Debug)]
pub struct GridSearchCV {
    estimator: Box<dyn Regressor>,
    param_grid: ParamGrid,
    pub cv: KFold,
    pub scoring: Scoring,
    pub opt_selection_method: SelectionMethod,
    pub refit: bool,
    results: Option<CvResults>,
    best_estimator: Option<Box<dyn Regressor>>,
}

impl GridSearchCV {
    pub fn new(estimator: Box<dyn Regressor>, param_grid: ParamGrid) -> Result<Self> {
        validate_grid(estimator.as_ref(), &param_grid)?;
        Ok(GridSearchCV {
            estimator,
            param_grid,
            cv: KFold::default(),
            scoring: Scoring::default(),
            opt_selection_method: SelectionMethod::default(),
            refit: true,
            results: None,
            best_estimator: None,
        })
    }

    pub fn with_cv(mut self, cv: KFold) -> Self {
        self.cv = cv;
        self
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_selection(mut self, method: SelectionMethod) -> Self {
        self.opt_selection_method = method;
        self
    }

    pub fn with_refit(mut self, refit: bool) -> Self {
        self.refit = refit;
        self
    }

    /// Every combination of the grid, the first parameter varying slowest.
    pub fn combinations(&self) -> Vec<BTreeMap<String, ParamValue>> {
        let mut combinations = vec![BTreeMap::new()];
        for (name, values) in &self.param_grid {
            let mut next = Vec::with_capacity(combinations.len() * values.len());
            for partial in &combinations {
                for value in values {
                    let mut params = partial.clone();
                    params.insert(name.clone(), value.clone());
                    next.push(params);
                }
            }
            combinations = next;
        }
        combinations
    }

    pub fn fit(&mut self, data: &Dataset) -> Result<()> {
        let folds = self.cv.split(data.n_samples())?;
        let combinations = self.combinations();
        tracing::info!(
            "grid search over {} candidates with {} folds",
            combinations.len(),
            folds.len()
        );
        let candidates = evaluate_all(self.estimator.as_ref(), combinations, data, &folds, self.scoring)?;
        let leading = self.param_grid.first().map_or("", |(name, _)| name.as_str());
        let best_index = select_candidate(&candidates, self.opt_selection_method, leading)
            .ok_or_else(|| SparseLmError::InvalidParameter("no candidates were evaluated".to_string()))?;
        let results = CvResults { candidates, best_index };
        tracing::info!(
            "best parameters {:?} with score {:.6e}",
            results.best_params(),
            results.best_score()
        );

        self.best_estimator = if self.refit {
            Some(refit_best(self.estimator.as_ref(), results.best_params(), data)?)
        } else {
            None
        };
        self.results = Some(results);
        Ok(())
    }

    pub fn results(&self) -> Option<&CvResults> {
        self.results.as_ref()
    }

    /// The best estimator refit on the full data, if `refit` was set.
    pub fn best_estimator(&self) -> Option<&dyn Regressor> {
        self.best_estimator.as_deref()
    }

    pub fn predict(&self, x: &na::DMatrix<f64>) -> Result<na::DVector<f64>> {
        self.best_estimator
            .as_ref()
            .ok_or_else(|| SparseLmError::NotFitted("grid_search_cv".to_string()))?
            .predict(x)
    }
}

/// Coordinate-wise search: parameters are tuned one at a time in grid order.
///
/// Starting from the first value of every parameter, step `s` varies parameter
/// `s % n_params` over its values while the others stay at their current best.
#[derive(Debug)]
pub struct LineSearchCV {
    estimator: Box<dyn Regressor>,
    param_grid: ParamGrid,
    pub cv: KFold,
    pub scoring: Scoring,
    pub opt_selection_method: SelectionMethod,
    /// Number of line searches; defaults to the number of parameters
    pub n_iter: Option<usize>,
    pub refit: bool,
    results: Option<CvResults>,
    best_estimator: Option<Box<dyn Regressor>>,
}

impl LineSearchCV {
    pub fn new(estimator: Box<dyn Regressor>, param_grid: ParamGrid) -> Result<Self> {
        validate_grid(estimator.as_ref(), &param_grid)?;
        Ok(LineSearchCV {
            estimator,
            param_grid,
            cv: KFold::default(),
            scoring: Scoring::default(),
            opt_selection_method: SelectionMethod::default(),
            n_iter: None,
            refit: true,
            results: None,
            best_estimator: None,
        })
    }

    pub fn with_cv(mut self, cv: KFold) -> Self {
        self.cv = cv;
        self
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_selection(mut self, method: SelectionMethod) -> Self {
        self.opt_selection_method = method;
        self
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = Some(n_iter);
        self
    }

    pub fn with_refit(mut self, refit: bool) -> Self {
        self.refit = refit;
        self
    }

    pub fn fit(&mut self, data: &Dataset) -> Result<()> {
        let folds = self.cv.split(data.n_samples())?;
        let n_iter = self.n_iter.unwrap_or(self.param_grid.len());
        let mut current: BTreeMap<String, ParamValue> = self
            .param_grid
            .iter()
            .map(|(name, values)| (name.clone(), values[0].clone()))
            .collect();

        let mut history = Vec::new();
        let mut best_index = 0;
        for step in 0..n_iter {
            let (name, values) = &self.param_grid[step % self.param_grid.len()];
            let line: Vec<BTreeMap<String, ParamValue>> = values
                .iter()
                .map(|value| {
                    let mut params = current.clone();
                    params.insert(name.clone(), value.clone());
                    params
                })
                .collect();
            let candidates = evaluate_all(self.estimator.as_ref(), line, data, &folds, self.scoring)?;
            let chosen = select_candidate(&candidates, self.opt_selection_method, name)
                .ok_or_else(|| SparseLmError::InvalidParameter(format!("no values given for {}", name)))?;
            current = candidates[chosen].params.clone();
            tracing::info!(
                "line search step {}: {} = {} (score {:.6e})",
                step + 1,
                name,
                current[name],
                candidates[chosen].mean_score
            );
            best_index = history.len() + chosen;
            history.extend(candidates);
        }

        if history.is_empty() {
            return Err(SparseLmError::InvalidParameter("n_iter must be at least 1".to_string()));
        }
        let results = CvResults {
            candidates: history,
            best_index,
        };
        self.best_estimator = if self.refit {
            Some(refit_best(self.estimator.as_ref(), results.best_params(), data)?)
        } else {
            None
        };
        self.results = Some(results);
        Ok(())
    }

    pub fn results(&self) -> Option<&CvResults> {
        self.results.as_ref()
    }

    pub fn best_estimator(&self) -> Option<&dyn Regressor> {
        self.best_estimator.as_deref()
    }

    pub fn predict(&self, x: &na::DMatrix<f64>) -> Result<na::DVector<f64>> {
        self.best_estimator
            .as_ref()
            .ok_or_else(|| SparseLmError::NotFitted("line_search_cv".to_string()))?
            .predict(x)
    }
}
