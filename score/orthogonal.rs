use crate::stats::{Moments, centered_dot};
use crate::types::ScoreError;
use ndarray::{Array1, ArrayView1, Zip};

/// Removes the component of `x` explained linearly by `reference`.
///
/// Both vectors are centered, then `x_c - beta * ref_c` is returned with
/// `beta = <x_c, ref_c> / <ref_c, ref_c>`. The result is orthogonal to the centered
/// reference up to rounding.
///
/// When there is nothing to project out (`n <= 1`, or a reference with zero spread) `x`
/// is returned unchanged, uncentered.
pub fn orthogonalize(
    x: ArrayView1<f64>,
    reference: ArrayView1<f64>,
) -> Result<Array1<f64>, ScoreError> {
    ScoreError::check_len("orthogonalize reference", x.len(), reference.len())?;

    let n = x.len();
    if n <= 1 {
        return Ok(x.to_owned());
    }

    let x_mean = Moments::from_view(x).mean;
    let ref_mean = Moments::from_view(reference).mean;

    let ref_norm_sq = centered_dot(reference, ref_mean, reference, ref_mean);
    if ref_norm_sq == 0.0 || !ref_norm_sq.is_finite() {
        log::debug!("orthogonalize: reference has no spread (norm^2 = {ref_norm_sq:e}); nothing to project out");
        return Ok(x.to_owned());
    }

    let beta = centered_dot(x, x_mean, reference, ref_mean) / ref_norm_sq;

    let mut residual = Array1::zeros(n);
    Zip::from(&mut residual)
        .and(x)
        .and(reference)
        .for_each(|out, &xi, &ri| *out = (xi - x_mean) - beta * (ri - ref_mean));
    Ok(residual)
}
