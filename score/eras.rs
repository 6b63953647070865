//! Per-era scoring.
//!
//! Tournament rows are grouped into eras (one era per target date). TC is only
//! meaningful cross-sectionally, so each era is scored on its own rows and the
//! per-era series is summarized the way tournament leaderboards report it.

use crate::contribution::TcScorer;
use crate::stats::Moments;
use crate::types::ScoreError;
use ahash::AHashMap;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Row indices grouped by era label, in order of first appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EraGroups {
    labels: Vec<String>,
    rows: Vec<Vec<usize>>,
}

impl EraGroups {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.rows.iter().map(Vec::as_slice))
    }
}

/// Groups row indices by era label, preserving first-appearance order of eras and
/// original row order within each era.
pub fn group_by_era<S: AsRef<str>>(eras: &[S]) -> EraGroups {
    let mut positions: AHashMap<&str, usize> = AHashMap::new();
    let mut labels = Vec::new();
    let mut rows: Vec<Vec<usize>> = Vec::new();

    for (row, era) in eras.iter().enumerate() {
        let era = era.as_ref();
        let slot = *positions.entry(era).or_insert_with(|| {
            labels.push(era.to_string());
            rows.push(Vec::new());
            labels.len() - 1
        });
        rows[slot].push(row);
    }

    EraGroups { labels, rows }
}

/// Receives a notification each time an era finishes scoring. Called from worker threads.
pub trait EraProgressObserver: Sync {
    fn on_era_scored(&self, era: &str, rows: usize) {
        let _ = (era, rows);
    }
}

#[derive(Default)]
pub struct NoopEraProgress;

impl EraProgressObserver for NoopEraProgress {}

/// TC of every model column within one era.
#[derive(Debug, Clone, PartialEq)]
pub struct EraScore {
    pub era: String,
    pub rows: usize,
    pub scores: Array1<f64>,
}

/// Scores each era independently. Eras run in parallel on the rayon pool; results come
/// back in era order.
///
/// When `features` is given each era's predictions are neutralized against that era's
/// feature rows before scoring.
pub fn tc_by_era(
    scorer: &TcScorer,
    predictions: ArrayView2<f64>,
    meta_model: ArrayView1<f64>,
    returns: ArrayView1<f64>,
    features: Option<ArrayView2<f64>>,
    eras: &EraGroups,
    progress: &dyn EraProgressObserver,
) -> Result<Vec<EraScore>, ScoreError> {
    let n = returns.len();
    ScoreError::check_len("prediction matrix rows", n, predictions.nrows())?;
    ScoreError::check_len("meta_model", n, meta_model.len())?;
    ScoreError::check_len("era labels", n, eras.total_rows())?;
    if let Some(features) = features {
        ScoreError::check_len("feature matrix rows", n, features.nrows())?;
    }

    let work: Vec<(&str, &[usize])> = eras.iter().collect();
    work.into_par_iter()
        .map(|(era, rows)| -> Result<EraScore, ScoreError> {
            let era_predictions = predictions.select(Axis(0), rows);
            let era_meta = meta_model.select(Axis(0), rows);
            let era_returns = returns.select(Axis(0), rows);
            let scores = match features {
                Some(features) => {
                    let era_features = features.select(Axis(0), rows);
                    scorer.score_batch_neutralized(
                        era_predictions.view(),
                        era_meta.view(),
                        era_returns.view(),
                        era_features.view(),
                    )?
                }
                None => scorer.score_batch(
                    era_predictions.view(),
                    era_meta.view(),
                    era_returns.view(),
                )?,
            };
            progress.on_era_scored(era, rows.len());
            Ok(EraScore {
                era: era.to_string(),
                rows: rows.len(),
                scores,
            })
        })
        .collect()
}

/// Summary of a per-era score series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub eras: usize,
    pub mean: f64,
    /// Sample standard deviation across eras.
    pub std: f64,
    /// `mean / std`, or `0.0` when the series has no spread.
    pub sharpe: f64,
    /// Largest peak-to-trough fall of the cumulative score, as a non-negative number.
    pub max_drawdown: f64,
    /// Fraction of eras with a strictly positive score.
    pub hit_rate: f64,
}

/// Summarizes a series of per-era scores.
pub fn summarize(scores: ArrayView1<f64>) -> ScoreSummary {
    let eras = scores.len();
    if eras == 0 {
        return ScoreSummary {
            eras,
            mean: 0.0,
            std: 0.0,
            sharpe: 0.0,
            max_drawdown: 0.0,
            hit_rate: 0.0,
        };
    }

    let moments = Moments::from_view(scores);
    let std = moments.sample_std();
    let sharpe = if std > 0.0 { moments.mean / std } else { 0.0 };

    let mut cumulative = 0.0;
    let mut peak = 0.0_f64;
    let mut max_drawdown = 0.0_f64;
    for &score in scores.iter() {
        cumulative += score;
        peak = peak.max(cumulative);
        max_drawdown = max_drawdown.max(peak - cumulative);
    }

    let hits = scores.iter().filter(|&&s| s > 0.0).count();

    ScoreSummary {
        eras,
        mean: moments.mean,
        std,
        sharpe,
        max_drawdown,
        hit_rate: hits as f64 / eras as f64,
    }
}

/// Per-model summaries from per-era scores. Entry `j` summarizes model column `j`.
pub fn summarize_models(era_scores: &[EraScore], n_models: usize) -> Vec<ScoreSummary> {
    (0..n_models)
        .map(|model| {
            let series: Array1<f64> = era_scores.iter().map(|era| era.scores[model]).collect();
            summarize(series.view())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contribution::calculate_tc;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn groups_preserve_first_appearance_order() {
        let eras = ["era2", "era1", "era2", "era3", "era1"];
        let groups = group_by_era(&eras);
        let collected: Vec<(&str, &[usize])> = groups.iter().collect();
        assert_eq!(
            collected,
            vec![
                ("era2", &[0usize, 2][..]),
                ("era1", &[1, 4][..]),
                ("era3", &[3][..]),
            ]
        );
        assert_eq!(groups.len(), 3);
        assert_eq!(groups.total_rows(), 5);
    }

    #[derive(Default)]
    struct CountingProgress {
        eras: AtomicUsize,
        rows: AtomicUsize,
    }

    impl EraProgressObserver for CountingProgress {
        fn on_era_scored(&self, era: &str, rows: usize) {
            assert!(!era.is_empty());
            self.eras.fetch_add(1, Ordering::Relaxed);
            self.rows.fetch_add(rows, Ordering::Relaxed);
        }
    }

    #[test]
    fn each_era_matches_standalone_scoring() {
        let eras = vec!["a", "b", "a", "b", "a", "b", "a", "b"];
        let predictions = array![
            [0.1, 0.9],
            [0.5, 0.2],
            [0.4, 0.3],
            [0.2, 0.8],
            [0.9, 0.6],
            [0.7, 0.1],
            [0.3, 0.4],
            [0.6, 0.7]
        ];
        let meta = array![0.2, 0.1, 0.5, 0.4, 0.7, 0.8, 0.3, 0.6];
        let returns = array![0.0, 0.3, 0.2, -0.1, 0.9, 0.4, -0.3, 0.5];
        let groups = group_by_era(&eras);
        let progress = CountingProgress::default();
        let scores = tc_by_era(
            &TcScorer::default(),
            predictions.view(),
            meta.view(),
            returns.view(),
            None,
            &groups,
            &progress,
        )
        .unwrap();

        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].era, "a");
        assert_eq!(scores[1].era, "b");
        assert_eq!(progress.eras.load(Ordering::Relaxed), 2);
        assert_eq!(progress.rows.load(Ordering::Relaxed), 8);

        for (era_score, (_, rows)) in scores.iter().zip(groups.iter()) {
            for model in 0..2 {
                let column = predictions.column(model).select(Axis(0), rows);
                let expected = calculate_tc(
                    column.view(),
                    meta.select(Axis(0), rows).view(),
                    returns.select(Axis(0), rows).view(),
                )
                .unwrap();
                assert_eq!(era_score.scores[model].to_bits(), expected.to_bits());
            }
        }
    }

    #[test]
    fn era_labels_must_cover_every_row() {
        let groups = group_by_era(&["a", "a"]);
        let predictions = Array2::<f64>::zeros((3, 1));
        let vector = array![1.0, 2.0, 3.0];
        let result = tc_by_era(
            &TcScorer::default(),
            predictions.view(),
            vector.view(),
            vector.view(),
            None,
            &groups,
            &NoopEraProgress,
        );
        assert!(matches!(result, Err(ScoreError::LengthMismatch { .. })));
    }

    #[test]
    fn summary_statistics() {
        let scores = array![0.02, -0.01, 0.03, -0.04, 0.01];
        let summary = summarize(scores.view());
        assert_eq!(summary.eras, 5);
        assert_abs_diff_eq!(summary.mean, 0.002, epsilon = 1e-12);
        let expected_std = (scores.mapv(|s| (s - 0.002_f64).powi(2)).sum() / 4.0).sqrt();
        assert_abs_diff_eq!(summary.std, expected_std, epsilon = 1e-12);
        assert_abs_diff_eq!(summary.sharpe, 0.002 / expected_std, epsilon = 1e-9);
        // Cumulative: 0.02, 0.01, 0.04, 0.00, 0.01. Peak 0.04, trough 0.00.
        assert_abs_diff_eq!(summary.max_drawdown, 0.04, epsilon = 1e-12);
        assert_abs_diff_eq!(summary.hit_rate, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn summary_of_flat_or_empty_series() {
        let empty = Array1::<f64>::zeros(0);
        assert_eq!(summarize(empty.view()).eras, 0);
        let flat = array![0.01, 0.01, 0.01];
        let summary = summarize(flat.view());
        assert_eq!(summary.sharpe, 0.0);
        assert_eq!(summary.max_drawdown, 0.0);
        assert_eq!(summary.hit_rate, 1.0);
    }

    #[test]
    fn model_summaries_follow_columns() {
        let era_scores = vec![
            EraScore {
                era: "1".into(),
                rows: 3,
                scores: array![0.1, -0.2],
            },
            EraScore {
                era: "2".into(),
                rows: 3,
                scores: array![0.3, -0.4],
            },
        ];
        let summaries = summarize_models(&era_scores, 2);
        assert_abs_diff_eq!(summaries[0].mean, 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(summaries[1].mean, -0.3, epsilon = 1e-12);
        assert_eq!(summaries[1].hit_rate, 0.0);
    }
}
