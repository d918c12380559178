//! Inference strategies computing the posterior sufficient statistics of a GP.
//!
//! Every strategy maintains a lower Cholesky factor `L` over its projection target
//! (the training inputs for [`ExactInference`], the inducing points for [`FitcInference`])
//! and a solve vector `a` such that the posterior mean at `X*` reads `m(X*) + Vᵀ.a` with
//! `V = L⁻¹.k(target, X*)`. Sparse strategies also carry a correction factor `C` whose
//! projection `C⁻¹.V` adds back the uncertainty dropped by the low-rank approximation.
mod exact;
mod fitc;

pub use exact::*;
pub use fitc::*;

use crate::errors::Result;
use crate::kernels::Kernel;
use crate::means::MeanFunction;
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Data, Ix1, Ix2};
use std::fmt;

/// Posterior sufficient statistics shared by all inference strategies
#[derive(Clone, Debug, PartialEq)]
pub struct Posterior<F: Float> {
    l: Array2<F>,
    a: Array1<F>,
    c: Option<Array2<F>>,
    loglike: F,
}

impl<F: Float> Posterior<F> {
    pub(crate) fn new(l: Array2<F>, a: Array1<F>, c: Option<Array2<F>>, loglike: F) -> Self {
        Posterior { l, a, c, loglike }
    }

    /// Lower Cholesky factor over the projection target
    pub fn l(&self) -> &Array2<F> {
        &self.l
    }

    /// Solve vector
    pub fn a(&self) -> &Array1<F> {
        &self.a
    }

    /// Correction factor of sparse strategies
    pub fn c(&self) -> Option<&Array2<F>> {
        self.c.as_ref()
    }

    /// Log marginal likelihood of the observations
    pub fn loglike(&self) -> F {
        self.loglike
    }
}

/// Log density of a Gaussian written with its Cholesky factor `L` and `a = L⁻¹.r`
pub(crate) fn gaussian_loglike<F: Float>(l: &Array2<F>, a: &Array1<F>) -> F {
    let n = F::cast(a.len());
    let half = F::cast(0.5);
    -half * a.dot(a)
        - half * n * F::cast(2. * std::f64::consts::PI).ln()
        - l.diag().mapv(|v| v.ln()).sum()
}

/// The closed set of inference strategies a [`GaussianProcess`](crate::GaussianProcess) can use
#[derive(Clone, Debug, PartialEq)]
pub enum Inference<F: Float> {
    /// Exact inference over all observations
    Exact(ExactInference<F>),
    /// Sparse inference with the fully independent training conditional approximation
    Fitc(FitcInference<F>),
}

impl<F: Float> Default for Inference<F> {
    fn default() -> Self {
        Inference::exact()
    }
}

impl<F: Float> fmt::Display for Inference<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Inference::Exact(_) => write!(f, "Exact"),
            Inference::Fitc(fitc) => write!(f, "Fitc(m={})", fitc.inducings().nrows()),
        }
    }
}

impl<F: Float> Inference<F> {
    /// Exact strategy without data
    pub fn exact() -> Self {
        Inference::Exact(ExactInference::default())
    }

    /// FITC strategy with the given inducing points (m, d) and without data
    pub fn fitc(inducings: Array2<F>) -> Self {
        Inference::Fitc(FitcInference::new(inducings))
    }

    /// Strategy of the same kind, with the same inducing points if any, without data
    pub fn fresh(&self) -> Self {
        match self {
            Inference::Exact(_) => Inference::exact(),
            Inference::Fitc(fitc) => Inference::fitc(fitc.inducings().clone()),
        }
    }

    /// Reset to the empty-data state
    pub fn init(&mut self) {
        match self {
            Inference::Exact(exact) => exact.init(),
            Inference::Fitc(fitc) => fitc.init(),
        }
    }

    /// Recompute the factorization from scratch over all observations
    pub fn update<K: Kernel<F>, M: MeanFunction<F>>(
        &mut self,
        kernel: &K,
        mean: &M,
        sn2: F,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()> {
        match self {
            Inference::Exact(exact) => exact.update(kernel, mean, sn2, x, y),
            Inference::Fitc(fitc) => fitc.update(kernel, mean, sn2, x, y),
        }
    }

    /// Update the factorization after appending observations beyond the first `n_old` ones,
    /// hyperparameters being unchanged. Strategies without a cheaper path refactor from scratch.
    pub fn update_incremental<K: Kernel<F>, M: MeanFunction<F>>(
        &mut self,
        kernel: &K,
        mean: &M,
        sn2: F,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        n_old: usize,
    ) -> Result<()> {
        match self {
            Inference::Exact(exact) => exact.update_incremental(kernel, mean, sn2, x, y, n_old),
            Inference::Fitc(fitc) => fitc.update(kernel, mean, sn2, x, y),
        }
    }

    /// Inputs feeding the posterior projection: training inputs `x` or inducing points
    pub fn target<'a>(&'a self, x: ArrayView2<'a, F>) -> ArrayView2<'a, F> {
        match self {
            Inference::Exact(_) => x,
            Inference::Fitc(fitc) => fitc.inducings().view(),
        }
    }

    /// Posterior statistics, `None` until data is observed
    pub fn posterior(&self) -> Option<&Posterior<F>> {
        match self {
            Inference::Exact(exact) => exact.posterior(),
            Inference::Fitc(fitc) => fitc.posterior(),
        }
    }

    /// Inducing points of sparse strategies
    pub fn inducings(&self) -> Option<&Array2<F>> {
        match self {
            Inference::Exact(_) => None,
            Inference::Fitc(fitc) => Some(fitc.inducings()),
        }
    }

    /// Analytic gradient of the log likelihood, in `[sn2, kernel..., mean...]` order,
    /// `None` when the strategy has no closed form or no data was observed.
    pub fn loglike_gradient<K: Kernel<F>, M: MeanFunction<F>>(
        &self,
        kernel: &K,
        mean: &M,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Option<Array1<F>>> {
        match self {
            Inference::Exact(exact) => exact.loglike_gradient(kernel, mean, x),
            Inference::Fitc(_) => Ok(None),
        }
    }
}
