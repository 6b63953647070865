use crate::types::RankMethod;
use ndarray::{Array1, ArrayView1};
use std::cmp::Ordering;

/// Ranks `values` with the tie-kept (ordinal) scheme.
///
/// `ranks[i]` is the 1-based position of `values[i]` in ascending order. Equal values
/// receive distinct ranks in order of first appearance, so the output is always a
/// permutation of `1..=n` stored as `f64`.
pub fn rank(values: ArrayView1<f64>) -> Array1<f64> {
    rank_with(values, RankMethod::Ordinal)
}

/// Ranks `values` using the requested tie-handling `method`.
pub fn rank_with(values: ArrayView1<f64>, method: RankMethod) -> Array1<f64> {
    let n = values.len();
    let order = internal::stable_order(values);
    let mut ranks = Array1::zeros(n);

    match method {
        RankMethod::Ordinal => {
            for (position, &index) in order.iter().enumerate() {
                ranks[index] = (position + 1) as f64;
            }
        }
        RankMethod::Average => {
            let mut start = 0;
            while start < n {
                let mut end = start + 1;
                while end < n
                    && internal::compare(values[order[start]], values[order[end]])
                        == Ordering::Equal
                {
                    end += 1;
                }
                // Positions start..end hold ranks start+1..=end; their mean is (start + end + 1) / 2.
                let shared = (start + end + 1) as f64 / 2.0;
                for &index in &order[start..end] {
                    ranks[index] = shared;
                }
                start = end;
            }
        }
    }

    ranks
}

mod internal {
    use super::*;

    /// Total order on `f64` that treats `-0.0` and `0.0` as equal.
    #[inline]
    pub(super) fn compare(a: f64, b: f64) -> Ordering {
        normalize(a).total_cmp(&normalize(b))
    }

    #[inline]
    fn normalize(value: f64) -> f64 {
        if value == 0.0 { 0.0 } else { value }
    }

    /// Indices of `values` in ascending order. `sort_by` is stable, so equal values keep
    /// their original relative order.
    pub(super) fn stable_order(values: ArrayView1<f64>) -> Vec<usize> {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| compare(values[a], values[b]));
        order
    }
}
