extern crate nalgebra as na;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::adaptive::{Multipliers, Reweightable, Reweighted, WeightUpdate, fit_unweighted};
use super::{FittedModel, ParamValue, Regressor, Solution, check_non_negative, log_fit, unknown};
use crate::{
    dataset::{Dataset, Design},
    error::{Result, SparseLmError},
    penalty::{GroupIndex, GroupL2},
    problem::{AdmmSettings, solve_penalized},
};

/// Duplicated design with one latent column per (group, feature) pair.
struct LatentExpansion {
    /// Feature behind each latent coefficient
    features: Vec<usize>,
    groups: GroupIndex,
}

impl LatentExpansion {
    fn new(group_list: Option<&[Vec<i64>]>, n_features: usize) -> Result<Self> {
        let Some(group_list) = group_list else {
            return Ok(LatentExpansion {
                features: (0..n_features).collect(),
                groups: GroupIndex::singletons(n_features),
            });
        };
        if group_list.len() != n_features {
            return Err(SparseLmError::InvalidParameter(format!(
                "group_list has {} entries but the data has {} features",
                group_list.len(),
                n_features
            )));
        }

        let mut labels: Vec<i64> = group_list.iter().flatten().copied().collect();
        labels.sort_unstable();
        labels.dedup();

        let mut features = Vec::new();
        let mut members = Vec::with_capacity(labels.len());
        for label in &labels {
            let mut group = Vec::new();
            for (i, feature_groups) in group_list.iter().enumerate() {
                if feature_groups.contains(label) {
                    group.push(features.len());
                    features.push(i);
                }
            }
            members.push(group);
        }
        let n_latent = features.len();
        Ok(LatentExpansion {
            features,
            groups: GroupIndex::from_members(members, n_latent)?,
        })
    }

    fn expand(&self, a: &na::DMatrix<f64>) -> na::DMatrix<f64> {
        a.select_columns(&self.features)
    }

    /// Sums the latent coefficients of each feature; uncovered features stay at zero.
    fn collapse(&self, latent: &na::DVector<f64>, n_features: usize) -> na::DVector<f64> {
        let mut coef = na::DVector::zeros(n_features);
        for (k, &i) in self.features.iter().enumerate() {
            coef[i] += latent[k];
        }
        coef
    }
}

/// Latent-variable group lasso for overlapping groups.
///
/// `group_list[i]` lists the groups feature `i` belongs to. Each feature is
/// split into one latent copy per group, the group lasso penalty acts on the
/// disjoint latent groups, and a coefficient is the sum of its latents. The
/// selected support is therefore a union of groups. Features in no group get
/// a zero coefficient.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlapGroupLasso {
    pub group_list: Option<Vec<Vec<i64>>>,
    pub alpha: f64,
    pub group_weights: Option<Vec<f64>>,
    pub fit_intercept: bool,
    pub solver: AdmmSettings,
    #[serde(skip)]
    fitted: Option<FittedModel>,
}

impl Default for OverlapGroupLasso {
    fn default() -> Self {
        OverlapGroupLasso {
            group_list: None,
            alpha: 1.0,
            group_weights: None,
            fit_intercept: true,
            solver: AdmmSettings::default(),
            fitted: None,
        }
    }
}

impl OverlapGroupLasso {
    pub fn new(group_list: Vec<Vec<i64>>, alpha: f64) -> Self {
        OverlapGroupLasso {
            group_list: Some(group_list),
            alpha,
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
}

impl Reweightable for OverlapGroupLasso {
    const ADAPTIVE_NAME: &'static str = "adaptive_overlap_group_lasso";

    fn solve_reweighted(
        &self,
        design: &Design,
        multipliers: &Multipliers,
        warm_start: Option<&na::DVector<f64>>,
    ) -> Result<Reweighted> {
        check_non_negative("alpha", self.alpha)?;
        let p = design.a.ncols();
        let expansion = LatentExpansion::new(self.group_list.as_deref(), p)?;
        let mut weights = expansion.groups.resolve_weights(self.group_weights.as_deref())?;
        if let Some(m) = &multipliers.group {
            for (w, m) in weights.iter_mut().zip(m) {
                *w *= m;
            }
        }
        let penalty = GroupL2 {
            alpha: self.alpha,
            groups: expansion.groups.clone(),
            weights,
        };
        let latent_design = expansion.expand(&design.a);
        tracing::debug!("overlap group lasso: {} features expanded to {} latents", p, latent_design.ncols());

        let out = solve_penalized(&latent_design, &design.y, &penalty, &self.solver, warm_start)?;
        let penalized = out.coef.clone();
        let mut solution: Solution = out.into();
        solution.coef = expansion.collapse(&penalized, p);
        Ok(Reweighted { penalized, solution })
    }

    fn next_multipliers(&self, penalized: &na::DVector<f64>, eps: f64, update: WeightUpdate) -> Multipliers {
        let n_features = self.group_list.as_ref().map_or(penalized.len(), |g| g.len());
        let group = LatentExpansion::new(self.group_list.as_deref(), n_features)
            .map(|e| {
                e.groups
                    .norms(penalized)
                    .into_iter()
                    .map(|norm| update.apply(norm, eps))
                    .collect()
            })
            .ok();
        Multipliers { l1: None, group }
    }
}

impl Regressor for OverlapGroupLasso {
    fn name(&self) -> &'static str {
        "overlap_group_lasso"
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
            (
                "group_list".to_string(),
                self.group_list.clone().map_or(ParamValue::None, ParamValue::IntLists),
            ),
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
            "group_list" => self.group_list = value.as_int_lists(name)?,
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
