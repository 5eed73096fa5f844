/// Proximal operators and small vector kernels used by the solvers.
extern crate nalgebra as na;

/// Soft thresholding for L1 regularization.
/// Computes sign(x) * max(|x| - threshold, 0)
#[inline]
pub fn soft_threshold_scalar(x: f64, threshold: f64) -> f64 {
    let sign = if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    };
    sign * (x.abs() - threshold).max(0.0)
}

/// Elementwise soft thresholding with a per-coordinate threshold, in place.
pub fn soft_threshold(x: &mut na::DVector<f64>, thresholds: &na::DVector<f64>) {
    for (v, t) in x.iter_mut().zip(thresholds.iter()) {
        *v = soft_threshold_scalar(*v, *t);
    }
}

/// Block soft thresholding of the coordinates listed in `members`, in place.
/// Computes max(1 - threshold / ||x_g||, 0) * x_g
pub fn group_soft_threshold(x: &mut na::DVector<f64>, members: &[usize], threshold: f64) {
    let norm = members.iter().map(|&i| x[i] * x[i]).sum::<f64>().sqrt();
    let factor = if norm > threshold && norm > 0.0 {
        1.0 - threshold / norm
    } else {
        0.0
    };
    for &i in members {
        x[i] *= factor;
    }
}

/// Scales the coordinates listed in `members` by a given factor, in place.
pub fn scale_group(x: &mut na::DVector<f64>, members: &[usize], factor: f64) {
    for &i in members {
        x[i] *= factor;
    }
}

/// Euclidean norm of the coordinates listed in `members`.
pub fn group_norm(x: &na::DVector<f64>, members: &[usize]) -> f64 {
    members.iter().map(|&i| x[i] * x[i]).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn soft_threshold_shrinks_and_zeroes() {
        assert_eq!(soft_threshold_scalar(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold_scalar(-3.0, 1.0), -2.0);
        assert_eq!(soft_threshold_scalar(0.5, 1.0), 0.0);
        assert_eq!(soft_threshold_scalar(-1.0, 1.0), 0.0);
    }

    #[test]
    fn vector_soft_threshold_uses_per_coordinate_thresholds() {
        let mut x = na::DVector::from_vec(vec![2.0, -2.0, 2.0]);
        let t = na::DVector::from_vec(vec![0.5, 1.0, 3.0]);
        soft_threshold(&mut x, &t);
        assert_eq!(x.as_slice(), &[1.5, -1.0, 0.0]);
    }

    #[test]
    fn group_soft_threshold_scales_whole_block() {
        let mut x = na::DVector::from_vec(vec![3.0, 4.0, 10.0]);
        group_soft_threshold(&mut x, &[0, 1], 2.5);
        assert_relative_eq!(x[0], 1.5);
        assert_relative_eq!(x[1], 2.0);
        assert_eq!(x[2], 10.0);

        let mut y = na::DVector::from_vec(vec![0.3, 0.4]);
        group_soft_threshold(&mut y, &[0, 1], 1.0);
        assert_eq!(y.as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn group_norm_only_reads_members() {
        let x = na::DVector::from_vec(vec![3.0, 100.0, 4.0]);
        assert_relative_eq!(group_norm(&x, &[0, 2]), 5.0);
    }
}
