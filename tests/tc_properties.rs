use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal, Normal, StudentT};

use numerai_tc::contribution::{
    TcScorer, calculate_feature_neutralized_tc, calculate_tc, calculate_tc_batch,
};
use numerai_tc::gaussian::{gaussianize, inverse_normal_cdf};
use numerai_tc::orthogonal::orthogonalize;
use numerai_tc::rank::rank;
use numerai_tc::stats::pearson;
use numerai_tc::types::{MetaModelBasis, QuantileMethod, ScoreError, ScoringOptions};

fn normal_vector(rng: &mut StdRng, n: usize) -> Array1<f64> {
    let normal = Normal::new(0.0, 1.0).unwrap();
    Array1::from_shape_fn(n, |_| normal.sample(rng))
}

#[test]
fn quantile_is_monotone_over_decile_midpoints() {
    let percentiles: Vec<f64> = (0..10).map(|i| 0.05 + 0.1 * i as f64).collect();
    for method in [QuantileMethod::Library, QuantileMethod::Acklam] {
        let quantiles: Vec<f64> = percentiles
            .iter()
            .map(|&p| inverse_normal_cdf(p, method))
            .collect();
        for pair in quantiles.windows(2) {
            assert!(pair[0] < pair[1], "{method} quantile is not increasing: {quantiles:?}");
        }
        assert_abs_diff_eq!(quantiles[4], -quantiles[5], epsilon = 1e-9);
    }
}

#[test]
fn gaussianized_ranks_preserve_order() {
    let x = Array1::from_shape_fn(10, |i| (i + 1) as f64);
    let gauss = gaussianize(rank(x.view()).view());
    let corr = pearson(x.view(), gauss.view()).unwrap();
    assert!(corr > 0.99, "corr = {corr}");
}

#[test]
fn orthogonalized_vector_has_no_component_along_reference() {
    let mut rng = StdRng::seed_from_u64(500);
    let x = normal_vector(&mut rng, 500);
    let reference = normal_vector(&mut rng, 500);
    let residual = orthogonalize(x.view(), reference.view()).unwrap();
    let reference_mean = reference.mean().unwrap();
    let centered = reference.mapv(|r| r - reference_mean);
    assert!(residual.dot(&centered).abs() < 1e-8);
}

#[test]
fn constant_returns_score_zero() {
    let mut rng = StdRng::seed_from_u64(7);
    let predictions = normal_vector(&mut rng, 100);
    let meta = normal_vector(&mut rng, 100);
    let returns = Array1::from_elem(100, 0.013);
    assert_eq!(
        calculate_tc(predictions.view(), meta.view(), returns.view()).unwrap(),
        0.0
    );
}

#[test]
fn copying_the_meta_model_earns_no_contribution() {
    let mut rng = StdRng::seed_from_u64(11);
    let meta = normal_vector(&mut rng, 250);
    let returns = normal_vector(&mut rng, 250);

    let tc = calculate_tc(meta.view(), meta.view(), returns.view()).unwrap();
    assert!(tc.abs() < 1e-8, "tc = {tc}");

    let skewed = meta.mapv(|m| (1.5 * m).exp());
    let tc = calculate_tc(skewed.view(), skewed.view(), returns.view()).unwrap();
    assert!(tc.abs() < 1e-8, "tc = {tc}");

    // Against the raw meta-model the identity only holds once it is already rank-gaussianized.
    let raw = TcScorer::new(ScoringOptions {
        meta_model_basis: MetaModelBasis::Raw,
        ..ScoringOptions::default()
    });
    let published = gaussianize(meta.view());
    let tc = raw
        .score(published.view(), published.view(), returns.view())
        .unwrap();
    assert!(tc.abs() < 1e-8, "tc = {tc}");
}

#[test]
fn single_and_empty_inputs_score_zero() {
    let one = Array1::from_vec(vec![1.0]);
    assert_eq!(calculate_tc(one.view(), one.view(), one.view()).unwrap(), 0.0);
    let empty = Array1::<f64>::zeros(0);
    assert_eq!(
        calculate_tc(empty.view(), empty.view(), empty.view()).unwrap(),
        0.0
    );
}

#[test]
fn mismatched_lengths_are_rejected() {
    let predictions = Array1::from_vec(vec![1.0, 2.0]);
    let meta = Array1::from_vec(vec![1.0]);
    let returns = Array1::from_vec(vec![1.0, 2.0]);
    let result = calculate_tc(predictions.view(), meta.view(), returns.view());
    assert!(matches!(result, Err(ScoreError::LengthMismatch { .. })));
}

#[test]
fn batch_agrees_with_single_model_scoring() {
    let mut rng = StdRng::seed_from_u64(300);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let predictions = Array2::from_shape_fn((300, 5), |_| normal.sample(&mut rng));
    let meta = normal_vector(&mut rng, 300);
    let returns = normal_vector(&mut rng, 300);

    let batch = calculate_tc_batch(predictions.view(), meta.view(), returns.view()).unwrap();
    assert_eq!(batch.len(), 5);
    for (j, column) in predictions.axis_iter(Axis(1)).enumerate() {
        let single = calculate_tc(column, meta.view(), returns.view()).unwrap();
        assert_abs_diff_eq!(batch[j], single, epsilon = 1e-12);
    }
}

#[test]
fn neutralizing_against_no_features_changes_nothing() {
    let mut rng = StdRng::seed_from_u64(21);
    let predictions = normal_vector(&mut rng, 120);
    let meta = normal_vector(&mut rng, 120);
    let returns = normal_vector(&mut rng, 120);
    let features = Array2::<f64>::zeros((120, 0));

    let plain = calculate_tc(predictions.view(), meta.view(), returns.view()).unwrap();
    let neutral = calculate_feature_neutralized_tc(
        predictions.view(),
        meta.view(),
        returns.view(),
        features.view(),
    )
    .unwrap();
    assert_abs_diff_eq!(plain, neutral, epsilon = 1e-12);
}

#[test]
fn neutralizing_against_features_stays_bounded() {
    let mut rng = StdRng::seed_from_u64(22);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let features = Array2::from_shape_fn((200, 6), |_| normal.sample(&mut rng));
    let signal = features.column(0).to_owned();
    let predictions = &signal + &normal_vector(&mut rng, 200).mapv(|v| 0.1 * v);
    let meta = normal_vector(&mut rng, 200);
    let returns = normal_vector(&mut rng, 200);

    let tc = calculate_feature_neutralized_tc(
        predictions.view(),
        meta.view(),
        returns.view(),
        features.view(),
    )
    .unwrap();
    assert!(tc.is_finite() && (-1.0..=1.0).contains(&tc), "tc = {tc}");
}

#[test]
fn random_scenarios_always_yield_bounded_scores() {
    let mut rng = StdRng::seed_from_u64(1000);
    let normal = Normal::<f64>::new(0.0, 1.0).unwrap();
    let heavy = StudentT::new(2.5).unwrap();
    let skewed = LogNormal::new(0.0, 1.5).unwrap();
    // Noise weights down to zero leave returns (almost) inside the span of meta and predictions.
    let noise_weights = [1.0, 0.1, 1e-6, 1e-12, 0.0];

    for scenario in 0..1000 {
        let n = rng.gen_range(2..80);
        let kind = scenario % 4;
        let mut draw = || -> Array1<f64> {
            Array1::from_shape_fn(n, |_| match kind {
                0 => normal.sample(&mut rng),
                1 => heavy.sample(&mut rng),
                2 => skewed.sample(&mut rng),
                // Coarse grid, so ties are common.
                _ => (normal.sample(&mut rng) * 2.0).round(),
            })
        };
        let latent = draw();
        let own = draw();
        let noise = draw();

        // Predictions range from independent of the meta-model to an exact copy of it.
        let overlap = (scenario / 4 % 5) as f64 / 4.0;
        let meta = latent.clone();
        let predictions = &latent * overlap + &own * (1.0 - overlap);

        let w_meta = rng.gen_range(-2.0_f64..2.0);
        let w_pred = rng.gen_range(-2.0_f64..2.0);
        let w_noise = noise_weights[scenario / 20 % noise_weights.len()];
        let returns = &meta * w_meta + &predictions * w_pred + &noise * w_noise;

        let tc = calculate_tc(predictions.view(), meta.view(), returns.view()).unwrap();
        assert!(
            tc.is_finite() && (-1.0..=1.0).contains(&tc),
            "scenario {scenario} (n = {n}, overlap {overlap}, noise {w_noise}) produced tc = {tc}"
        );
    }
}

#[test]
fn scaling_every_input_leaves_tc_unchanged() {
    let mut rng = StdRng::seed_from_u64(1234);
    let predictions = normal_vector(&mut rng, 200);
    let meta = normal_vector(&mut rng, 200);
    let returns = normal_vector(&mut rng, 200);
    let reference = calculate_tc(predictions.view(), meta.view(), returns.view()).unwrap();
    assert!(reference != 0.0);

    for scale in [1e-10, 1.0, 1e10] {
        let tc = calculate_tc(
            predictions.mapv(|v| v * scale).view(),
            meta.mapv(|v| v * scale).view(),
            returns.mapv(|v| v * scale).view(),
        )
        .unwrap();
        assert_abs_diff_eq!(tc, reference, epsilon = 1e-9);
    }
}

#[test]
fn end_to_end_example_is_bounded_and_deterministic() {
    let predictions = Array1::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    let returns = predictions.clone();
    let meta = Array1::from_vec(vec![0.5, 1.5, 2.5, 3.5, 4.5]);

    let first = calculate_tc(predictions.view(), meta.view(), returns.view()).unwrap();
    assert!(first.is_finite());
    assert!((-1.0..=1.0).contains(&first));
    for _ in 0..25 {
        let again = calculate_tc(predictions.view(), meta.view(), returns.view()).unwrap();
        assert_eq!(first.to_bits(), again.to_bits());
    }
}
