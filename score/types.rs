// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The error type for every fallible scoring operation.
///
/// Degenerate inputs (too few rows, zero variance) are not errors: they resolve to
/// a `0.0` score. Only caller bugs and linear-algebra failures surface here.
#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("Length mismatch in {context}: expected {expected} rows but found {found}.")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Neutralization proportion must lie in [0, 1], but was {0}.")]
    InvalidProportion(f64),

    #[error("Least-squares solve failed during feature neutralization: {0}")]
    LinalgError(#[from] ndarray_linalg::error::LinalgError),
}

impl ScoreError {
    /// Returns `Ok(())` when `found == expected`, otherwise a `LengthMismatch` tagged with `context`.
    pub(crate) fn check_len(
        context: &'static str,
        expected: usize,
        found: usize,
    ) -> Result<(), ScoreError> {
        if expected == found {
            Ok(())
        } else {
            Err(ScoreError::LengthMismatch {
                context,
                expected,
                found,
            })
        }
    }
}

/// How equal values are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RankMethod {
    /// Every element gets a distinct integer rank; ties go to the earlier index first.
    #[default]
    Ordinal,
    /// Tied elements share the mean of the ranks they occupy.
    Average,
}

/// Which inverse standard-normal CDF backs the gaussianizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuantileMethod {
    /// `statrs` normal distribution quantile.
    #[default]
    Library,
    /// Acklam's rational approximation (relative error below 1.15e-9).
    Acklam,
}

/// What the returns vector is orthogonalized against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MetaModelBasis {
    /// The meta-model exactly as supplied.
    Raw,
    /// The meta-model after the same rank-gauss transform applied to predictions, so a
    /// prediction vector equal to the meta-model has nothing left to correlate with.
    #[default]
    Gaussianized,
}

impl fmt::Display for RankMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordinal => f.write_str("ordinal"),
            Self::Average => f.write_str("average"),
        }
    }
}

impl fmt::Display for QuantileMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Library => f.write_str("library"),
            Self::Acklam => f.write_str("acklam"),
        }
    }
}

impl fmt::Display for MetaModelBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => f.write_str("raw"),
            Self::Gaussianized => f.write_str("gaussianized"),
        }
    }
}

/// Tunable knobs for the scoring pipeline. The defaults reproduce the canonical TC exactly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringOptions {
    pub rank_method: RankMethod,
    pub quantile_method: QuantileMethod,
    pub meta_model_basis: MetaModelBasis,
    /// Percentiles are clipped to `[clip, 1 - clip]` before the quantile function.
    pub percentile_clip: f64,
    /// Fraction of the feature-explained component removed by neutralization.
    pub neutralization_proportion: f64,
    /// Batch scoring switches to the rayon pool at this many model columns.
    pub parallel_threshold: usize,
}

pub const DEFAULT_PERCENTILE_CLIP: f64 = 1e-6;

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            rank_method: RankMethod::Ordinal,
            quantile_method: QuantileMethod::Library,
            meta_model_basis: MetaModelBasis::Gaussianized,
            percentile_clip: DEFAULT_PERCENTILE_CLIP,
            neutralization_proportion: 1.0,
            parallel_threshold: 8,
        }
    }
}
