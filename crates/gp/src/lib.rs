//! This library implements [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process) regression
//! with incremental conditioning on observations.
//!
//! A [GaussianProcess] is parameterized by [GpParams]: a kernel (see [kernels]), a prior mean
//! function (see [means]) and a [Gaussian](likelihood::Gaussian) observation noise.
//! Its posterior is maintained by an [Inference] strategy as a Cholesky factor `L` and a solve
//! vector `a = L⁻¹.(y - m(X))`:
//! * [Inference::Exact] factors the full `n x n` Gram matrix and extends the factorization
//!   by blocks when observations are appended (O(n².k) for k new points instead of O(n³)),
//! * [Inference::Fitc] is a sparse approximation over `m` fixed inducing points
//!   (fully independent training conditional) reducing update cost to O(n.m²)
//!   and prediction cost to O(m²) per point.
//!
//! Both strategies feed the same prediction code: predictive means, variances or joint
//! covariance, their derivatives with respect to inputs, joint posterior samples, and
//! acquisition quantities for Bayesian optimization (probability and expected improvement,
//! predictive entropy). Hyperparameters are exposed as a flat registry
//! `[sn2, kernel..., mean...]` with domains and priors, and can be fitted by maximizing the
//! log marginal likelihood (plus log prior) with [GaussianProcess::optimize].
//!
//! # Example
//!
//! ```no_run
//! use reggie_gp::{BasicGp, Inference};
//! use linfa::prelude::*;
//! use ndarray::{array, Array1, Axis};
//!
//! let xt = array![[0.], [1.], [2.], [3.], [4.]];
//! let yt = xt.column(0).mapv(f64::sin);
//!
//! let mut gp = BasicGp::params(1e-2, 1., 1., 0.)
//!     .check()?
//!     .fit(&Dataset::new(xt, yt))?;
//! gp.optimize()?;
//!
//! let u = Array1::linspace(0., 4., 3).insert_axis(Axis(1));
//! gp.switch_inference(Inference::fitc(u))?;
//! let (mu, s2) = gp.predict(&array![[0.5], [2.5]])?;
//! # Ok::<(), reggie_gp::GpError>(())
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
pub mod criteria;
mod errors;
pub mod fourier;
pub mod hyperparameters;
pub mod inference;
pub mod kernels;
pub mod likelihood;
pub mod linalg;
pub mod means;

mod parameters;
mod utils;

mod optimization;

pub use algorithm::*;
pub use errors::*;
pub use inference::Inference;
pub use parameters::*;
pub use utils::{make_rng, norm_cdf, norm_pdf};
