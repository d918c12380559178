//! Slice sampling of GP hyperparameters.
//!
//! Univariate slice sampling with stepping out and shrinkage (Neal, 2003) applied to each
//! coordinate in turn. Sampling happens in the free space where positive hyperparameters are
//! log-transformed, the target density including the Jacobian of that transform.
use crate::errors::{McmcError, Result};
use log::{info, warn};
use ndarray::{Array1, ArrayView1};
use ndarray_rand::rand::Rng;
use reggie_gp::hyperparameters::{from_free, to_free, Domain};
use reggie_gp::kernels::Kernel;
use reggie_gp::means::MeanFunction;
use reggie_gp::{GaussianProcess, GpError};
use std::time::Instant;

/// Max number of shrinking steps before the current value is kept
const SLICE_MAX_SHRINK: usize = 100;

/// Log density of the free hyperparameters `u` of `model`
fn log_density<K: Kernel<f64>, M: MeanFunction<f64>>(
    model: &GaussianProcess<f64, K, M>,
    domains: &[Domain],
    u: &ArrayView1<f64>,
) -> Result<f64> {
    let p = from_free(domains, u);
    let jacobian: f64 = domains
        .iter()
        .zip(u.iter())
        .filter(|(d, _)| **d == Domain::Positive)
        .map(|(_, u)| u)
        .sum();
    match model.log_posterior_at(&p.view()) {
        Ok(lp) if lp.is_nan() => Ok(f64::NEG_INFINITY),
        Ok(lp) => Ok(lp + jacobian),
        Err(GpError::NumericalError(msg)) => {
            warn!("Slice sampler proposal rejected: {msg}");
            Ok(f64::NEG_INFINITY)
        }
        Err(GpError::LinalgError(err)) => {
            warn!("Slice sampler proposal rejected: {err}");
            Ok(f64::NEG_INFINITY)
        }
        Err(err) => Err(err.into()),
    }
}

/// Draw `n` models from the posterior over hyperparameters of `model`, each sample being
/// one sweep over all coordinates started from the previous one.
///
/// `width` is the initial slice width and `max_steps` the max number of stepping-out steps
/// per coordinate, both in the free space.
pub fn slice_sample<K, M, R>(
    model: &GaussianProcess<f64, K, M>,
    n: usize,
    width: f64,
    max_steps: usize,
    rng: &mut R,
) -> Result<Vec<GaussianProcess<f64, K, M>>>
where
    K: Kernel<f64>,
    M: MeanFunction<f64>,
    R: Rng,
{
    let now = Instant::now();
    let domains = model.domains();
    let mut u = to_free(&domains, &model.hyperparameters().view());
    let mut logp = log_density(model, &domains, &u.view())?;
    if !logp.is_finite() {
        return Err(McmcError::InvalidValueError(format!(
            "Sampling started from hyperparameters of null density: {}",
            model
        )));
    }

    let mut samples = Vec::with_capacity(n);
    for _ in 0..n {
        for i in 0..u.len() {
            (u, logp) = slice_step(model, &domains, u, logp, i, width, max_steps, rng)?;
        }
        let mut sample = model.clone();
        sample.set_hyperparameters(&from_free(&domains, &u.view()).view())?;
        samples.push(sample);
    }
    info!(
        "Slice sampling of {} models over {} hyperparameters in {:?}",
        n,
        u.len(),
        now.elapsed()
    );
    Ok(samples)
}

#[allow(clippy::too_many_arguments)]
fn slice_step<K, M, R>(
    model: &GaussianProcess<f64, K, M>,
    domains: &[Domain],
    u: Array1<f64>,
    logp: f64,
    i: usize,
    width: f64,
    max_steps: usize,
    rng: &mut R,
) -> Result<(Array1<f64>, f64)>
where
    K: Kernel<f64>,
    M: MeanFunction<f64>,
    R: Rng,
{
    let x0 = u[i];
    let mut ui = u.clone();
    let mut logp_at = |v: f64| -> Result<f64> {
        ui[i] = v;
        log_density(model, domains, &ui.view())
    };

    // slice level, log(y) with y ~ U(0, p(u))
    let level = logp + rng.gen::<f64>().ln();

    // stepping out
    let mut lo = x0 - width * rng.gen::<f64>();
    let mut hi = lo + width;
    let mut j = (max_steps as f64 * rng.gen::<f64>()).floor() as usize;
    let mut k = max_steps.saturating_sub(1).saturating_sub(j);
    while j > 0 && logp_at(lo)? > level {
        lo -= width;
        j -= 1;
    }
    while k > 0 && logp_at(hi)? > level {
        hi += width;
        k -= 1;
    }

    // shrinkage
    for _ in 0..SLICE_MAX_SHRINK {
        let x1 = lo + (hi - lo) * rng.gen::<f64>();
        let logp1 = logp_at(x1)?;
        if logp1 > level {
            let mut u = u;
            u[i] = x1;
            return Ok((u, logp1));
        }
        if x1 < x0 {
            lo = x1;
        } else {
            hi = x1;
        }
    }
    warn!("Slice sampler shrinkage did not converge on coordinate {i}, value kept");
    Ok((u, logp))
}
