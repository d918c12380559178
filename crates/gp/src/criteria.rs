//! Acquisition quantities computed from GP predictive moments, for maximization problems.
//!
//! With `d = mu - f` and `z = d / s`, the probability of improvement over `f` is `Φ(z)`
//! and the expected improvement is `d.Φ(z) + s.φ(z)`. Both vanish when the variance is zero
//! and the mean does not exceed `f`.
use crate::utils::{norm_cdf, norm_pdf};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2, Zip};

/// Probability of improvement over `f` at one point
pub fn probability_of_improvement<F: Float>(f: F, mu: F, s2: F) -> F {
    let d = mu - f;
    if s2 <= F::zero() {
        if d > F::zero() {
            F::one()
        } else {
            F::zero()
        }
    } else {
        norm_cdf(d / s2.sqrt())
    }
}

/// Expected improvement over `f` at one point
pub fn expected_improvement<F: Float>(f: F, mu: F, s2: F) -> F {
    let d = mu - f;
    if s2 <= F::zero() {
        d.max(F::zero())
    } else {
        let s = s2.sqrt();
        let z = d / s;
        (d * norm_cdf(z) + s * norm_pdf(z)).max(F::zero())
    }
}

/// Improvement over `f` at each point given predictive means and variances
pub(crate) fn improvement<F: Float>(
    f: F,
    mu: &ArrayBase<impl Data<Elem = F>, Ix1>,
    s2: &ArrayBase<impl Data<Elem = F>, Ix1>,
    pi: bool,
) -> Array1<F> {
    Zip::from(mu).and(s2).map_collect(|&mu, &s2| {
        if pi {
            probability_of_improvement(f, mu, s2)
        } else {
            expected_improvement(f, mu, s2)
        }
    })
}

/// Improvement over `f` and its gradient with respect to the inputs, given predictive
/// moments and their gradients (q, d)
pub(crate) fn improvement_gradients<F: Float>(
    f: F,
    mu: &ArrayBase<impl Data<Elem = F>, Ix1>,
    s2: &ArrayBase<impl Data<Elem = F>, Ix1>,
    dmu: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ds2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    pi: bool,
) -> (Array1<F>, Array2<F>) {
    let value = improvement(f, mu, s2, pi);
    let mut grad = Array2::zeros(dmu.dim());
    Zip::from(grad.rows_mut())
        .and(mu)
        .and(s2)
        .and(dmu.rows())
        .and(ds2.rows())
        .for_each(|mut grad, &mu, &s2, dmu, ds2| {
            let d = mu - f;
            if s2 <= F::zero() {
                if !pi && d > F::zero() {
                    grad.assign(&dmu);
                }
                return;
            }
            let s = s2.sqrt();
            let z = d / s;
            // ds = ds2 / 2s
            let ds = ds2.mapv(|v| v / (s + s));
            if pi {
                // dz = (dmu - z.ds) / s
                let factor = norm_pdf(z) / s;
                Zip::from(&mut grad)
                    .and(&dmu)
                    .and(&ds)
                    .for_each(|g, &dm, &ds| *g = factor * (dm - z * ds));
            } else {
                let (cdf, pdf) = (norm_cdf(z), norm_pdf(z));
                Zip::from(&mut grad)
                    .and(&dmu)
                    .and(&ds)
                    .for_each(|g, &dm, &ds| *g = cdf * dm + pdf * ds);
            }
        });
    (value, grad)
}
