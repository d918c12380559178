use super::Posterior;
use crate::errors::{GpError, Result};
use crate::kernels::Kernel;
use crate::linalg::{add_diagonal, cholesky, solve_triangular, solve_triangular_vec};
use crate::means::MeanFunction;
use linfa::Float;
use log::debug;
use ndarray::{Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use std::time::Instant;

/// Jitter added to the inducing Gram matrix, relative to the noise variance
pub const FITC_JITTER_RATIO: f64 = 1e-6;

/// Sparse inference with the fully independent training conditional (FITC) approximation.
///
/// With `Kuu + jitter = L.Lᵀ`, `V = L⁻¹.Kuf` and the diagonal correction
/// `λ = diag(Kff) - diag(Vᵀ.V) + sn2`, the statistics are `L`, the correction factor
/// `C = chol(I + W.Wᵀ)` where `W = V.λ^-1/2`, and `a = C⁻ᵀ.C⁻¹.W.(r.λ^-1/2)`.
/// Updating costs O(n.m²) and predicting O(m²) per point.
#[derive(Clone, Debug, PartialEq)]
pub struct FitcInference<F: Float> {
    inducings: Array2<F>,
    posterior: Option<Posterior<F>>,
}

impl<F: Float> FitcInference<F> {
    /// FITC strategy over the given inducing points (m, d)
    pub fn new(inducings: Array2<F>) -> Self {
        FitcInference {
            inducings,
            posterior: None,
        }
    }

    /// Inducing points
    pub fn inducings(&self) -> &Array2<F> {
        &self.inducings
    }

    /// Posterior statistics, `None` until data is observed
    pub fn posterior(&self) -> Option<&Posterior<F>> {
        self.posterior.as_ref()
    }

    pub(crate) fn init(&mut self) {
        self.posterior = None;
    }

    pub(crate) fn update<K: Kernel<F>, M: MeanFunction<F>>(
        &mut self,
        kernel: &K,
        mean: &M,
        sn2: F,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()> {
        if x.nrows() == 0 {
            self.init();
            return Ok(());
        }
        if x.ncols() != self.inducings.ncols() {
            return Err(GpError::InvalidValueError(format!(
                "Inducing points of dimension {} while inputs are of dimension {}",
                self.inducings.ncols(),
                x.ncols()
            )));
        }
        let now = Instant::now();
        let u = &self.inducings;
        let n = F::cast(x.nrows());
        let half = F::cast(0.5);

        let kuu = add_diagonal(kernel.kernel(u, u), sn2 * F::cast(FITC_JITTER_RATIO));
        let luu = cholesky(&kuu)?;
        let v = solve_triangular(&luu, &kernel.kernel(u, x), false)?;

        // diagonal FITC correction, Qff never exceeds Kff
        let lambda = (kernel.dkernel(x) - v.mapv(|v| v * v).sum_axis(Axis(0)))
            .mapv(|d| d.max(F::zero()) + sn2);
        let lambda_sqrt = lambda.mapv(|v| v.sqrt());
        let w = v / &lambda_sqrt;
        let rt = (y.to_owned() - mean.value(x)) / &lambda_sqrt;

        let c = cholesky(&add_diagonal(w.dot(&w.t()), F::one()))?;
        let beta = solve_triangular_vec(&c, &w.dot(&rt), false)?;
        let a = solve_triangular_vec(&c, &beta, true)?;

        let loglike = -half * (rt.dot(&rt) - beta.dot(&beta))
            - c.diag().mapv(|v| v.ln()).sum()
            - half * lambda.mapv(|v| v.ln()).sum()
            - half * n * F::cast(2. * std::f64::consts::PI).ln();
        debug!(
            "FITC inference update ({} points, {} inducings) in {:?}",
            x.nrows(),
            u.nrows(),
            now.elapsed()
        );
        self.posterior = Some(Posterior::new(luu, a, Some(c), loglike));
        Ok(())
    }
}
