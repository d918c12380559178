use libm::erfc;
use linfa::Float;
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

const SQRT_2PI: f64 = 2.5066282746310007;

/// Cumulative distribution function of Standard Normal at x
pub fn norm_cdf<F: Float>(x: F) -> F {
    F::cast(0.5 * erfc(-into_f64(x) / std::f64::consts::SQRT_2))
}

/// Probability density function of Standard Normal at x
pub fn norm_pdf<F: Float>(x: F) -> F {
    (F::cast(-0.5) * x * x).exp() / F::cast(SQRT_2PI)
}

#[inline(always)]
pub(crate) fn into_f64<F: Float>(v: F) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}

/// Random generator seeded with `seed` or from entropy
pub fn make_rng(seed: Option<u64>) -> Xoshiro256Plus {
    match seed {
        Some(seed) => Xoshiro256Plus::seed_from_u64(seed),
        None => Xoshiro256Plus::from_entropy(),
    }
}
