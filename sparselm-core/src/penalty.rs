//! Regularization terms handled by the ADMM z-update.
//!
//! Each penalty knows its value and its proximal operator
//! `prox_{t g}(v) = argmin_z t * g(z) + 1/2 ||z - v||²`.

extern crate nalgebra as na;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SparseLmError};
use crate::ops::{group_norm, group_soft_threshold, scale_group, soft_threshold};

/// Partition (or partial cover) of coefficient indices into groups.
///
/// Groups built from labels are ordered by the sorted distinct label values, which is also the
/// order in which per-group weights are given.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupIndex {
    members: Vec<Vec<usize>>,
    n_features: usize,
}

impl GroupIndex {
    /// Builds groups from one label per feature.
    pub fn from_labels(labels: &[i64]) -> Self {
        let mut distinct: Vec<i64> = labels.to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        let mut members = vec![Vec::new(); distinct.len()];
        for (i, label) in labels.iter().enumerate() {
            // labels come from `distinct`, the search cannot miss
            if let Ok(g) = distinct.binary_search(label) {
                members[g].push(i);
            }
        }
        GroupIndex {
            members,
            n_features: labels.len(),
        }
    }

    /// Builds groups from explicit member lists. Members must be in range, non-empty and disjoint.
    pub fn from_members(members: Vec<Vec<usize>>, n_features: usize) -> Result<Self> {
        let mut seen = vec![false; n_features];
        for group in &members {
            if group.is_empty() {
                return Err(SparseLmError::InvalidParameter("groups must not be empty".to_string()));
            }
            for &i in group {
                if i >= n_features {
                    return Err(SparseLmError::InvalidParameter(format!(
                        "group member {} out of range for {} features",
                        i, n_features
                    )));
                }
                if seen[i] {
                    return Err(SparseLmError::InvalidParameter(format!(
                        "feature {} belongs to more than one group",
                        i
                    )));
                }
                seen[i] = true;
            }
        }
        Ok(GroupIndex { members, n_features })
    }

    /// One singleton group per feature.
    pub fn singletons(n_features: usize) -> Self {
        GroupIndex {
            members: (0..n_features).map(|i| vec![i]).collect(),
            n_features,
        }
    }

    pub fn n_groups(&self) -> usize {
        self.members.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn members(&self, group: usize) -> &[usize] {
        &self.members[group]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.members.iter().map(|m| m.as_slice())
    }

    /// Default group weights, sqrt of each group's size.
    pub fn default_weights(&self) -> Vec<f64> {
        self.members.iter().map(|m| (m.len() as f64).sqrt()).collect()
    }

    /// Resolves user-supplied weights, falling back to [`GroupIndex::default_weights`].
    pub fn resolve_weights(&self, weights: Option<&[f64]>) -> Result<Vec<f64>> {
        match weights {
            None => Ok(self.default_weights()),
            Some(w) if w.len() != self.n_groups() => Err(SparseLmError::InvalidParameter(format!(
                "expected {} group weights, got {}",
                self.n_groups(),
                w.len()
            ))),
            Some(w) if w.iter().any(|v| !(v.is_finite() && *v >= 0.0)) => Err(
                SparseLmError::InvalidParameter("group weights must be finite and non-negative".to_string()),
            ),
            Some(w) => Ok(w.to_vec()),
        }
    }

    /// Euclidean norm of every group of `coef`.
    pub fn norms(&self, coef: &na::DVector<f64>) -> Vec<f64> {
        self.members.iter().map(|m| group_norm(coef, m)).collect()
    }
}

/// A convex regularizer usable in the ADMM z-update.
pub trait Penalty: Send + Sync {
    /// Value of the penalty at `coef`.
    fn value(&self, coef: &na::DVector<f64>) -> f64;

    /// Proximal operator of `t * g` evaluated at `v`.
    fn prox(&self, v: &na::DVector<f64>, t: f64) -> na::DVector<f64>;
}

/// The zero penalty; its prox is the identity.
#[derive(Clone, Debug, Default)]
pub struct NoPenalty;

impl Penalty for NoPenalty {
    fn value(&self, _coef: &na::DVector<f64>) -> f64 {
        0.0
    }

    fn prox(&self, v: &na::DVector<f64>, _t: f64) -> na::DVector<f64> {
        v.clone()
    }
}

/// `alpha * sum_i w_i |b_i|`
#[derive(Clone, Debug)]
pub struct WeightedL1 {
    pub alpha: f64,
    pub weights: na::DVector<f64>,
}

impl WeightedL1 {
    pub fn new(alpha: f64, n_features: usize) -> Self {
        WeightedL1 {
            alpha,
            weights: na::DVector::from_element(n_features, 1.0),
        }
    }
}

impl Penalty for WeightedL1 {
    fn value(&self, coef: &na::DVector<f64>) -> f64 {
        self.alpha * coef.iter().zip(self.weights.iter()).map(|(b, w)| w * b.abs()).sum::<f64>()
    }

    fn prox(&self, v: &na::DVector<f64>, t: f64) -> na::DVector<f64> {
        let mut z = v.clone();
        soft_threshold(&mut z, &(&self.weights * (t * self.alpha)));
        z
    }
}

/// `alpha * sum_g w_g ||b_g||_2`
#[derive(Clone, Debug)]
pub struct GroupL2 {
    pub alpha: f64,
    pub groups: GroupIndex,
    pub weights: Vec<f64>,
}

impl Penalty for GroupL2 {
    fn value(&self, coef: &na::DVector<f64>) -> f64 {
        self.alpha
            * self
                .groups
                .norms(coef)
                .iter()
                .zip(&self.weights)
                .map(|(n, w)| n * w)
                .sum::<f64>()
    }

    fn prox(&self, v: &na::DVector<f64>, t: f64) -> na::DVector<f64> {
        let mut z = v.clone();
        for (members, w) in self.groups.iter().zip(&self.weights) {
            group_soft_threshold(&mut z, members, t * self.alpha * w);
        }
        z
    }
}

/// `alpha * (l1_ratio * sum_i v_i |b_i| + (1 - l1_ratio) * sum_g w_g ||b_g||_2)`
#[derive(Clone, Debug)]
pub struct SparseGroup {
    pub alpha: f64,
    pub l1_ratio: f64,
    pub l1_weights: na::DVector<f64>,
    pub groups: GroupIndex,
    pub group_weights: Vec<f64>,
}

impl Penalty for SparseGroup {
    fn value(&self, coef: &na::DVector<f64>) -> f64 {
        let l1 = coef
            .iter()
            .zip(self.l1_weights.iter())
            .map(|(b, w)| w * b.abs())
            .sum::<f64>();
        let group = self
            .groups
            .norms(coef)
            .iter()
            .zip(&self.group_weights)
            .map(|(n, w)| n * w)
            .sum::<f64>();
        self.alpha * (self.l1_ratio * l1 + (1.0 - self.l1_ratio) * group)
    }

    fn prox(&self, v: &na::DVector<f64>, t: f64) -> na::DVector<f64> {
        // The singletons are nested in the groups, so the prox composes.
        let mut z = v.clone();
        soft_threshold(&mut z, &(&self.l1_weights * (t * self.alpha * self.l1_ratio)));
        for (members, w) in self.groups.iter().zip(&self.group_weights) {
            group_soft_threshold(&mut z, members, t * self.alpha * (1.0 - self.l1_ratio) * w);
        }
        z
    }
}

/// `alpha * sum_g w_g ||b_g||_2 + sum_g delta_g ||b_g||_2²`
#[derive(Clone, Debug)]
pub struct RidgedGroup {
    pub alpha: f64,
    pub groups: GroupIndex,
    pub weights: Vec<f64>,
    pub delta: Vec<f64>,
}

impl Penalty for RidgedGroup {
    fn value(&self, coef: &na::DVector<f64>) -> f64 {
        self.groups
            .norms(coef)
            .iter()
            .zip(self.weights.iter().zip(&self.delta))
            .map(|(n, (w, d))| self.alpha * w * n + d * n * n)
            .sum()
    }

    fn prox(&self, v: &na::DVector<f64>, t: f64) -> na::DVector<f64> {
        let mut z = v.clone();
        for ((members, w), d) in self.groups.iter().zip(&self.weights).zip(&self.delta) {
            group_soft_threshold(&mut z, members, t * self.alpha * w);
            scale_group(&mut z, members, 1.0 / (1.0 + 2.0 * t * d));
        }
        z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Brute-force check of the prox optimality by perturbing the candidate.
    fn is_prox_minimizer<P: Penalty>(p: &P, v: &na::DVector<f64>, t: f64) -> bool {
        let z = p.prox(v, t);
        let objective = |x: &na::DVector<f64>| t * p.value(x) + 0.5 * (x - v).norm_squared();
        let best = objective(&z);
        for i in 0..z.len() {
            for step in [1e-3, -1e-3] {
                let mut probe = z.clone();
                probe[i] += step;
                if objective(&probe) < best - 1e-12 {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn labels_are_grouped_in_sorted_order() {
        let groups = GroupIndex::from_labels(&[5, 2, 5, 2, 9]);
        assert_eq!(groups.n_groups(), 3);
        assert_eq!(groups.members(0), &[1, 3]);
        assert_eq!(groups.members(1), &[0, 2]);
        assert_eq!(groups.members(2), &[4]);
        assert_relative_eq!(groups.default_weights()[0], 2f64.sqrt());
    }

    #[test]
    fn member_lists_must_be_disjoint_and_in_range() {
        assert!(GroupIndex::from_members(vec![vec![0, 1], vec![1]], 3).is_err());
        assert!(GroupIndex::from_members(vec![vec![0, 3]], 3).is_err());
        assert!(GroupIndex::from_members(vec![vec![]], 3).is_err());
        assert!(GroupIndex::from_members(vec![vec![0], vec![2]], 3).is_ok());
    }

    #[test]
    fn weights_must_match_group_count() {
        let groups = GroupIndex::from_labels(&[0, 0, 1]);
        assert!(groups.resolve_weights(Some(&[1.0])).is_err());
        assert!(groups.resolve_weights(Some(&[1.0, -1.0])).is_err());
        assert_eq!(groups.resolve_weights(Some(&[1.0, 3.0])).unwrap(), vec![1.0, 3.0]);
    }

    #[test]
    fn proximal_operators_minimize_their_objective() {
        let v = na::DVector::from_vec(vec![1.3, -0.4, 2.2, 0.05, -1.7]);
        let groups = GroupIndex::from_labels(&[0, 0, 1, 1, 2]);

        let l1 = WeightedL1::new(0.5, 5);
        assert!(is_prox_minimizer(&l1, &v, 0.8));

        let group = GroupL2 {
            alpha: 0.6,
            weights: groups.default_weights(),
            groups: groups.clone(),
        };
        assert!(is_prox_minimizer(&group, &v, 1.1));

        let sparse = SparseGroup {
            alpha: 0.7,
            l1_ratio: 0.4,
            l1_weights: na::DVector::from_element(5, 1.0),
            group_weights: groups.default_weights(),
            groups: groups.clone(),
        };
        assert!(is_prox_minimizer(&sparse, &v, 0.9));

        let ridged = RidgedGroup {
            alpha: 0.3,
            weights: groups.default_weights(),
            delta: vec![0.5, 1.0, 0.0],
            groups,
        };
        assert!(is_prox_minimizer(&ridged, &v, 1.3));
    }

    #[test]
    fn group_prox_zeroes_weak_groups() {
        let groups = GroupIndex::from_labels(&[0, 0, 1, 1]);
        let penalty = GroupL2 {
            alpha: 1.0,
            weights: vec![1.0, 1.0],
            groups,
        };
        let v = na::DVector::from_vec(vec![0.1, 0.1, 3.0, 4.0]);
        let z = penalty.prox(&v, 1.0);
        assert_eq!(z[0], 0.0);
        assert_eq!(z[1], 0.0);
        assert_relative_eq!(z[2], 2.4);
        assert_relative_eq!(z[3], 3.2);
    }
}
