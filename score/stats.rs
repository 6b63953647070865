//! Summary statistics shared by the scoring transforms.
//!
//! Everything here walks its inputs in index order with plain loops, so results do
//! not depend on memory layout: a column view of a matrix and an owned copy of the
//! same values produce bit-identical outputs.

use ndarray::ArrayView1;

/// Running first and second moments computed in a single pass (Welford).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub count: usize,
    pub mean: f64,
    m2: f64,
}

impl Moments {
    pub fn from_view(values: ArrayView1<f64>) -> Self {
        let mut count = 0usize;
        let mut mean = 0.0;
        let mut m2 = 0.0;
        for &value in values.iter() {
            count += 1;
            let delta = value - mean;
            mean += delta / count as f64;
            m2 += delta * (value - mean);
        }
        Self { count, mean, m2 }
    }

    /// Population variance (divides by `n`). Zero for fewer than two values.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / self.count as f64).max(0.0)
        }
    }

    /// Sample variance (divides by `n - 1`). Zero for fewer than two values.
    pub fn sample_variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).max(0.0)
        }
    }

    pub fn std(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn sample_std(&self) -> f64 {
        self.sample_variance().sqrt()
    }
}

/// `sum((x - x_mean) * (y - y_mean))`, walking both views in index order.
pub fn centered_dot(x: ArrayView1<f64>, x_mean: f64, y: ArrayView1<f64>, y_mean: f64) -> f64 {
    x.iter()
        .zip(y.iter())
        .map(|(&a, &b)| (a - x_mean) * (b - y_mean))
        .sum()
}

/// Pearson correlation of two equal-length views.
///
/// Returns `None` when either side has no spread or the result is not finite; callers
/// decide what sentinel that maps to. A finite result is clamped into `[-1, 1]` to absorb
/// rounding just outside the interval.
pub fn pearson(x: ArrayView1<f64>, y: ArrayView1<f64>) -> Option<f64> {
    debug_assert_eq!(x.len(), y.len());
    if x.len() < 2 {
        return None;
    }

    let x_mean = Moments::from_view(x).mean;
    let y_mean = Moments::from_view(y).mean;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (&a, &b) in x.iter().zip(y.iter()) {
        let dx = a - x_mean;
        let dy = b - y_mean;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if !(sxx > 0.0) || !(syy > 0.0) {
        return None;
    }

    // sqrt each side separately so the product cannot overflow for large magnitudes.
    let denom = sxx.sqrt() * syy.sqrt();
    let r = sxy / denom;
    if r.is_finite() {
        Some(r.clamp(-1.0, 1.0))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn moments_match_two_pass_formulas() {
        let values = array![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let moments = Moments::from_view(values.view());
        assert_eq!(moments.count, 8);
        assert_abs_diff_eq!(moments.mean, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(moments.std(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(moments.sample_variance(), 32.0 / 7.0, epsilon = 1e-12);
    }

    #[test]
    fn moments_of_tiny_inputs_have_no_spread() {
        let empty: [f64; 0] = [];
        let moments = Moments::from_view(ArrayView1::from(&empty));
        assert_eq!(moments.count, 0);
        assert_eq!(moments.variance(), 0.0);

        let single = array![3.5];
        let moments = Moments::from_view(single.view());
        assert_eq!(moments.mean, 3.5);
        assert_eq!(moments.sample_std(), 0.0);
    }

    #[test]
    fn pearson_detects_perfect_and_inverse_relationships() {
        let x = array![1.0, 2.0, 3.0, 4.0];
        let y = array![10.0, 20.0, 30.0, 40.0];
        let z = array![4.0, 3.0, 2.0, 1.0];
        assert_abs_diff_eq!(pearson(x.view(), y.view()).unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pearson(x.view(), z.view()).unwrap(), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn pearson_rejects_constant_inputs() {
        let x = array![1.0, 2.0, 3.0];
        let flat = array![5.0, 5.0, 5.0];
        assert!(pearson(x.view(), flat.view()).is_none());
        assert!(pearson(flat.view(), x.view()).is_none());
    }

    #[test]
    fn pearson_survives_extreme_magnitudes() {
        let x = array![1e150, -1e150, 3e150, 2e150];
        let y = array![1.0, -1.0, 3.0, 2.0];
        let r = pearson(x.view(), y.view()).unwrap();
        assert_abs_diff_eq!(r, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn centered_dot_is_zero_against_a_constant() {
        let x = array![1.0, 5.0, -2.0];
        let c = array![7.0, 7.0, 7.0];
        assert_eq!(centered_dot(x.view(), 0.0, c.view(), 7.0), 0.0);
    }
}
