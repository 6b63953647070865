//! Feature neutralization and exposure diagnostics.
//!
//! Neutralization regresses predictions on the feature matrix (with an intercept, via
//! column centering) and subtracts a proportion of the fitted values. The least-squares
//! solve goes through an SVD so collinear or constant feature columns are handled by
//! the minimum-norm solution instead of failing.

use crate::stats::{Moments, pearson};
use crate::types::ScoreError;
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::LeastSquaresSvd;

/// Subtracts `proportion` of the feature-explained component from `predictions`.
///
/// `proportion = 1.0` yields the full regression residual (re-offset by the prediction
/// mean); `0.0` returns the predictions untouched. With zero feature columns the
/// predictions are returned exactly as given.
pub fn neutralize(
    predictions: ArrayView1<f64>,
    features: ArrayView2<f64>,
    proportion: f64,
) -> Result<Array1<f64>, ScoreError> {
    if !(0.0..=1.0).contains(&proportion) {
        return Err(ScoreError::InvalidProportion(proportion));
    }
    ScoreError::check_len("neutralize features", predictions.len(), features.nrows())?;

    let n = predictions.len();
    if features.ncols() == 0 || n <= 1 || proportion == 0.0 {
        return Ok(predictions.to_owned());
    }

    let design = internal::centered_columns(features);
    let prediction_mean = Moments::from_view(predictions).mean;
    let target = predictions.mapv(|p| p - prediction_mean);

    let fit = design.least_squares(&target)?;
    if (fit.rank as usize) < design.ncols() {
        log::debug!(
            "neutralize: feature matrix is rank deficient ({} of {} columns); using minimum-norm fit",
            fit.rank,
            design.ncols()
        );
    }

    let fitted = design.dot(&fit.solution);
    let mut neutral = predictions.to_owned();
    neutral.scaled_add(-proportion, &fitted);
    Ok(neutral)
}

/// Pearson correlation of `predictions` with each feature column.
///
/// Columns with no spread report an exposure of `0.0`.
pub fn feature_exposures(
    predictions: ArrayView1<f64>,
    features: ArrayView2<f64>,
) -> Result<Array1<f64>, ScoreError> {
    ScoreError::check_len("feature exposure", predictions.len(), features.nrows())?;

    let exposures: Vec<f64> = features
        .axis_iter(Axis(1))
        .into_par_iter()
        .map(|column| pearson(predictions, column).unwrap_or(0.0))
        .collect();
    Ok(Array1::from_vec(exposures))
}

/// Largest absolute feature exposure, `0.0` when there are no features.
pub fn max_feature_exposure(
    predictions: ArrayView1<f64>,
    features: ArrayView2<f64>,
) -> Result<f64, ScoreError> {
    let exposures = feature_exposures(predictions, features)?;
    Ok(exposures.iter().fold(0.0_f64, |acc, &e| acc.max(e.abs())))
}

mod internal {
    use super::*;

    /// Copies `features` into a new matrix with every column shifted to mean zero.
    pub(super) fn centered_columns(features: ArrayView2<f64>) -> Array2<f64> {
        let mut design = features.to_owned();
        for mut column in design.axis_iter_mut(Axis(1)) {
            let mean = Moments::from_view(column.view()).mean;
            column.mapv_inplace(|v| v - mean);
        }
        design
    }
}
