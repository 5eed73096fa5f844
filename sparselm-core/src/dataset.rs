//! Training data and the centering/weighting applied before solving.

extern crate nalgebra as na;

use crate::error::{Result, SparseLmError};

/// A feature matrix, a target vector and optional per-sample weights.
///
/// # Example
///
/// ```rust
/// # use nalgebra as na;
/// # use sparselm_core::dataset::Dataset;
///
/// let x = na::DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
/// let y = na::DVector::from_vec(vec![1.0, 2.0, 3.0]);
/// let data = Dataset::new(x, y).unwrap();
/// assert_eq!(data.n_features(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct Dataset {
    x: na::DMatrix<f64>,
    y: na::DVector<f64>,
    sample_weight: Option<na::DVector<f64>>,
}

impl Dataset {
    pub fn new(x: na::DMatrix<f64>, y: na::DVector<f64>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(SparseLmError::DimensionMismatch(x.nrows(), x.ncols(), y.len(), 1));
        }
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(SparseLmError::InvalidData(format!(
                "dataset needs at least one sample and one feature, got {}x{}",
                x.nrows(),
                x.ncols()
            )));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(SparseLmError::InvalidData("features and targets must be finite".to_string()));
        }
        Ok(Dataset {
            x,
            y,
            sample_weight: None,
        })
    }

    pub fn with_sample_weight(mut self, weights: na::DVector<f64>) -> Result<Self> {
        if weights.len() != self.n_samples() {
            return Err(SparseLmError::DimensionMismatch(self.n_samples(), 1, weights.len(), 1));
        }
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(SparseLmError::InvalidData("sample weights must be finite and non-negative".to_string()));
        }
        if weights.iter().all(|w| *w == 0.0) {
            return Err(SparseLmError::InvalidData("sample weights must not all be zero".to_string()));
        }
        self.sample_weight = Some(weights);
        Ok(self)
    }

    pub fn x(&self) -> &na::DMatrix<f64> {
        &self.x
    }

    pub fn y(&self) -> &na::DVector<f64> {
        &self.y
    }

    pub fn sample_weight(&self) -> Option<&na::DVector<f64>> {
        self.sample_weight.as_ref()
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Same samples and weights restricted to the given feature columns.
    pub fn select_features(&self, indices: &[usize]) -> Result<Dataset> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_features()) {
            return Err(SparseLmError::InvalidParameter(format!(
                "feature index {} out of range for {} features",
                bad,
                self.n_features()
            )));
        }
        Ok(Dataset {
            x: self.x.select_columns(indices),
            y: self.y.clone(),
            sample_weight: self.sample_weight.clone(),
        })
    }

    /// The given rows, with their weights.
    pub fn select_samples(&self, indices: &[usize]) -> Result<Dataset> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_samples()) {
            return Err(SparseLmError::InvalidParameter(format!(
                "sample index {} out of range for {} samples",
                bad,
                self.n_samples()
            )));
        }
        let data = Dataset::new(self.x.select_rows(indices), self.y.select_rows(indices))?;
        match &self.sample_weight {
            Some(w) => data.with_sample_weight(w.select_rows(indices)),
            None => Ok(data),
        }
    }

    /// Same features and weights with a different target.
    pub fn with_targets(&self, y: na::DVector<f64>) -> Result<Dataset> {
        if y.len() != self.n_samples() {
            return Err(SparseLmError::DimensionMismatch(self.n_samples(), 1, y.len(), 1));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(SparseLmError::InvalidData("targets must be finite".to_string()));
        }
        Ok(Dataset {
            x: self.x.clone(),
            y,
            sample_weight: self.sample_weight.clone(),
        })
    }
}

/// Centered and weight-scaled data handed to the solvers.
///
/// Solving `1/(2n) ||a b - y||² + g(b)` on this design is equivalent to the
/// weighted, intercept-aware problem on the raw data.
#[derive(Clone, Debug)]
pub struct Design {
    pub a: na::DMatrix<f64>,
    pub y: na::DVector<f64>,
    pub x_offset: na::DVector<f64>,
    pub y_offset: f64,
}

impl Design {
    pub fn from_dataset(data: &Dataset, fit_intercept: bool) -> Design {
        let n = data.n_samples();
        let p = data.n_features();
        let weights = data
            .sample_weight()
            .cloned()
            .unwrap_or_else(|| na::DVector::from_element(n, 1.0));

        let (x_offset, y_offset) = if fit_intercept {
            let total = weights.sum();
            let x_offset = data.x().transpose() * &weights / total;
            let y_offset = data.y().dot(&weights) / total;
            (x_offset, y_offset)
        } else {
            (na::DVector::zeros(p), 0.0)
        };

        let mut a = data.x().clone();
        let mut y = data.y().clone();
        for i in 0..n {
            let scale = weights[i].sqrt();
            for j in 0..p {
                a[(i, j)] = (a[(i, j)] - x_offset[j]) * scale;
            }
            y[i] = (y[i] - y_offset) * scale;
        }

        Design {
            a,
            y,
            x_offset,
            y_offset,
        }
    }

    /// Intercept that goes with `coef` on the raw data.
    pub fn intercept(&self, coef: &na::DVector<f64>) -> f64 {
        self.y_offset - self.x_offset.dot(coef)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn data() -> Dataset {
        let x = na::DMatrix::from_row_slice(4, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let y = na::DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        Dataset::new(x, y).unwrap()
    }

    #[test]
    fn construction_validates_shapes_and_values() {
        let x = na::DMatrix::<f64>::zeros(3, 2);
        assert!(Dataset::new(x.clone(), na::DVector::zeros(2)).is_err());
        assert!(Dataset::new(na::DMatrix::zeros(0, 2), na::DVector::zeros(0)).is_err());
        let mut bad = x.clone();
        bad[(0, 0)] = f64::NAN;
        assert!(Dataset::new(bad, na::DVector::zeros(3)).is_err());
        assert!(Dataset::new(x, na::DVector::zeros(3)).is_ok());
    }

    #[test]
    fn sample_weights_are_validated() {
        assert!(data().with_sample_weight(na::DVector::from_element(3, 1.0)).is_err());
        assert!(data().with_sample_weight(na::DVector::from_element(4, 0.0)).is_err());
        assert!(data()
            .with_sample_weight(na::DVector::from_vec(vec![1.0, -1.0, 1.0, 1.0]))
            .is_err());
        assert!(data().with_sample_weight(na::DVector::from_element(4, 2.0)).is_ok());
    }

    #[test]
    fn selection_keeps_weights_aligned() {
        let weighted = data()
            .with_sample_weight(na::DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        let rows = weighted.select_samples(&[3, 1]).unwrap();
        assert_eq!(rows.y().as_slice(), &[4.0, 2.0]);
        assert_eq!(rows.sample_weight().unwrap().as_slice(), &[4.0, 2.0]);

        let cols = weighted.select_features(&[1]).unwrap();
        assert_eq!(cols.x().column(0).iter().copied().collect::<Vec<_>>(), vec![2.0, 4.0, 6.0, 8.0]);
        assert!(weighted.select_features(&[2]).is_err());
    }

    #[test]
    fn centering_uses_weighted_means() {
        let weighted = data()
            .with_sample_weight(na::DVector::from_vec(vec![1.0, 0.0, 0.0, 1.0]))
            .unwrap();
        let design = Design::from_dataset(&weighted, true);
        assert_relative_eq!(design.x_offset[0], 4.0);
        assert_relative_eq!(design.x_offset[1], 5.0);
        assert_relative_eq!(design.y_offset, 2.5);
        // zero-weight rows vanish
        assert_eq!(design.a.row(1).iter().filter(|v| **v != 0.0).count(), 0);
    }

    #[test]
    fn no_intercept_leaves_data_uncentered() {
        let design = Design::from_dataset(&data(), false);
        assert_eq!(design.a, *data().x());
        assert_eq!(design.y_offset, 0.0);
        let coef = na::DVector::from_vec(vec![1.0, 1.0]);
        assert_eq!(design.intercept(&coef), 0.0);
    }
}
