//! # True Contribution (TC)
//!
//! TC measures how much of the realized returns a model explains beyond what the
//! meta-model already captures:
//!
//! ```text
//! p      = gaussianize(rank(predictions))
//! r_perp = orthogonalize(returns, meta_model)
//! tc     = pearson(p, r_perp)
//! ```
//!
//! Degenerate inputs resolve to exactly `0.0` rather than NaN: fewer than two rows, a
//! residual with no spread (returns constant or fully explained by the meta-model), or a
//! correlation that is not finite. Length mismatches are errors and are reported before
//! any arithmetic happens.
//!
//! The target side (`r_perp`) only depends on the meta-model and returns, so batch
//! scoring prepares it once and scores every model column against the same prepared
//! target. Single-model scoring takes the identical path, which is what makes batch
//! results bit-for-bit equal to per-column calls.

use crate::gaussian::{GaussianizeOptions, gaussianize_with};
use crate::neutralize::neutralize;
use crate::orthogonal::orthogonalize;
use crate::stats::{Moments, pearson};
use crate::types::{MetaModelBasis, ScoreError, ScoringOptions};
use ndarray::parallel::prelude::*;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

/// A residual whose standard deviation is at or below this fraction of the returns'
/// own standard deviation is treated as having no spread. Returns fully explained by the
/// meta-model leave a residual made purely of rounding error, which sits many orders of
/// magnitude below this. A common offset in the returns does not move the threshold.
const DEGENERATE_RESIDUAL_REL_STD: f64 = 1e-12;

/// TC of a single prediction vector with the canonical pipeline.
pub fn calculate_tc(
    predictions: ArrayView1<f64>,
    meta_model: ArrayView1<f64>,
    returns: ArrayView1<f64>,
) -> Result<f64, ScoreError> {
    TcScorer::default().score(predictions, meta_model, returns)
}

/// TC of every column of an `n_samples x n_models` prediction matrix.
pub fn calculate_tc_batch(
    predictions: ArrayView2<f64>,
    meta_model: ArrayView1<f64>,
    returns: ArrayView1<f64>,
) -> Result<Array1<f64>, ScoreError> {
    TcScorer::default().score_batch(predictions, meta_model, returns)
}

/// TC after fully neutralizing `predictions` against the columns of `features`.
pub fn calculate_feature_neutralized_tc(
    predictions: ArrayView1<f64>,
    meta_model: ArrayView1<f64>,
    returns: ArrayView1<f64>,
    features: ArrayView2<f64>,
) -> Result<f64, ScoreError> {
    TcScorer::default().score_neutralized(predictions, meta_model, returns, features)
}

/// The orthogonalized returns every model column is correlated against.
#[derive(Debug, Clone)]
pub struct PreparedTarget {
    residual: Array1<f64>,
    degenerate: bool,
}

impl PreparedTarget {
    pub fn len(&self) -> usize {
        self.residual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residual.is_empty()
    }

    /// True when every score against this target is the `0.0` sentinel.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    pub fn residual(&self) -> ArrayView1<'_, f64> {
        self.residual.view()
    }
}

/// TC scorer carrying the pipeline options. `TcScorer::default()` is the canonical TC.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcScorer {
    options: ScoringOptions,
}

impl TcScorer {
    pub fn new(options: ScoringOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ScoringOptions {
        &self.options
    }

    fn gaussianize_options(&self) -> GaussianizeOptions {
        GaussianizeOptions {
            rank_method: self.options.rank_method,
            quantile_method: self.options.quantile_method,
            percentile_clip: self.options.percentile_clip,
        }
    }

    /// Rank-gauss transform of a prediction vector under this scorer's options.
    pub fn transform_predictions(&self, predictions: ArrayView1<f64>) -> Array1<f64> {
        gaussianize_with(predictions, &self.gaussianize_options())
    }

    /// Validates lengths and orthogonalizes `returns` against the meta-model.
    pub fn prepare_target(
        &self,
        meta_model: ArrayView1<f64>,
        returns: ArrayView1<f64>,
    ) -> Result<PreparedTarget, ScoreError> {
        ScoreError::check_len("meta_model", returns.len(), meta_model.len())?;
        let n = returns.len();
        if n <= 1 {
            log::debug!("TC target has {n} rows; every score will be 0.0");
            return Ok(PreparedTarget {
                residual: returns.to_owned(),
                degenerate: true,
            });
        }

        let residual = match self.options.meta_model_basis {
            MetaModelBasis::Raw => orthogonalize(returns, meta_model)?,
            MetaModelBasis::Gaussianized => {
                let basis = self.transform_predictions(meta_model);
                orthogonalize(returns, basis.view())?
            }
        };

        let spread = Moments::from_view(residual.view()).std();
        let returns_spread = Moments::from_view(returns).std();
        let degenerate = !spread.is_finite()
            || spread == 0.0
            || returns_spread == 0.0
            || spread <= DEGENERATE_RESIDUAL_REL_STD * returns_spread;
        if degenerate {
            log::debug!(
                "TC target residual has no spread (std {spread:e}, returns std {returns_spread:e}); every score will be 0.0"
            );
        }
        Ok(PreparedTarget {
            residual,
            degenerate,
        })
    }

    /// TC of one prediction vector against a prepared target.
    pub fn score_prepared(
        &self,
        predictions: ArrayView1<f64>,
        target: &PreparedTarget,
    ) -> Result<f64, ScoreError> {
        ScoreError::check_len("predictions", target.len(), predictions.len())?;
        if target.degenerate {
            return Ok(0.0);
        }
        let gauss = self.transform_predictions(predictions);
        match pearson(gauss.view(), target.residual.view()) {
            Some(tc) => Ok(tc),
            None => {
                log::debug!("TC correlation is undefined for these predictions; reporting 0.0");
                Ok(0.0)
            }
        }
    }

    /// TC of a single prediction vector.
    pub fn score(
        &self,
        predictions: ArrayView1<f64>,
        meta_model: ArrayView1<f64>,
        returns: ArrayView1<f64>,
    ) -> Result<f64, ScoreError> {
        ScoreError::check_len("predictions", returns.len(), predictions.len())?;
        let target = self.prepare_target(meta_model, returns)?;
        self.score_prepared(predictions, &target)
    }

    /// TC of each column of `predictions`, in column order.
    ///
    /// Columns are independent; at `parallel_threshold` columns or more they are scored on
    /// the rayon pool.
    pub fn score_batch(
        &self,
        predictions: ArrayView2<f64>,
        meta_model: ArrayView1<f64>,
        returns: ArrayView1<f64>,
    ) -> Result<Array1<f64>, ScoreError> {
        ScoreError::check_len("prediction matrix rows", returns.len(), predictions.nrows())?;
        let target = self.prepare_target(meta_model, returns)?;
        self.score_batch_prepared(predictions, &target)
    }

    /// Batch TC against an already prepared target.
    pub fn score_batch_prepared(
        &self,
        predictions: ArrayView2<f64>,
        target: &PreparedTarget,
    ) -> Result<Array1<f64>, ScoreError> {
        ScoreError::check_len("prediction matrix rows", target.len(), predictions.nrows())?;
        let n_models = predictions.ncols();
        log::trace!(
            "scoring {n_models} model columns over {} rows",
            predictions.nrows()
        );

        let scores: Vec<f64> = if n_models >= self.options.parallel_threshold.max(1) {
            predictions
                .axis_iter(Axis(1))
                .into_par_iter()
                .map(|column| self.score_prepared(column, target))
                .collect::<Result<_, _>>()?
        } else {
            predictions
                .axis_iter(Axis(1))
                .map(|column| self.score_prepared(column, target))
                .collect::<Result<_, _>>()?
        };
        Ok(Array1::from_vec(scores))
    }

    /// TC after neutralizing `predictions` against `features` by the configured proportion.
    pub fn score_neutralized(
        &self,
        predictions: ArrayView1<f64>,
        meta_model: ArrayView1<f64>,
        returns: ArrayView1<f64>,
        features: ArrayView2<f64>,
    ) -> Result<f64, ScoreError> {
        ScoreError::check_len("predictions", returns.len(), predictions.len())?;
        ScoreError::check_len("meta_model", returns.len(), meta_model.len())?;
        ScoreError::check_len("feature matrix rows", returns.len(), features.nrows())?;

        let neutral = neutralize(
            predictions,
            features,
            self.options.neutralization_proportion,
        )?;
        self.score(neutral.view(), meta_model, returns)
    }

    /// Neutralized TC of every column of `predictions`, sharing one prepared target.
    ///
    /// Uses the rayon pool under the same `parallel_threshold` rule as [`Self::score_batch`].
    pub fn score_batch_neutralized(
        &self,
        predictions: ArrayView2<f64>,
        meta_model: ArrayView1<f64>,
        returns: ArrayView1<f64>,
        features: ArrayView2<f64>,
    ) -> Result<Array1<f64>, ScoreError> {
        ScoreError::check_len("prediction matrix rows", returns.len(), predictions.nrows())?;
        ScoreError::check_len("feature matrix rows", returns.len(), features.nrows())?;
        let target = self.prepare_target(meta_model, returns)?;
        let proportion = self.options.neutralization_proportion;
        let score_column = |column: ArrayView1<f64>| -> Result<f64, ScoreError> {
            let neutral = neutralize(column, features, proportion)?;
            self.score_prepared(neutral.view(), &target)
        };

        let scores: Vec<f64> = if predictions.ncols() >= self.options.parallel_threshold.max(1) {
            predictions
                .axis_iter(Axis(1))
                .into_par_iter()
                .map(score_column)
                .collect::<Result<_, _>>()?
        } else {
            predictions
                .axis_iter(Axis(1))
                .map(score_column)
                .collect::<Result<_, _>>()?
        };
        Ok(Array1::from_vec(scores))
    }
}
