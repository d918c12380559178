//! Ensembles of [Gaussian Processes](reggie_gp::GaussianProcess) over posterior samples of
//! their hyperparameters.
//!
//! Hyperparameters are sampled with a univariate slice sampler ([sampler::slice_sample])
//! from their posterior given the observations, that is the log marginal likelihood plus
//! the log priors registered in the model parameters. An [Mcmc] ensemble holds one model per
//! sample and integrates predictions over them:
//! * predictive moments are matched with the law of total variance,
//! * acquisition quantities (tail probability, improvement, entropy) are averaged,
//! * sampling delegates to one member drawn uniformly.
//!
//! # Example
//!
//! ```no_run
//! use reggie_gp::{hyperparameters::Prior, BasicGp};
//! use reggie_mcmc::{Mcmc, McmcParams};
//! use linfa::prelude::*;
//! use ndarray::array;
//!
//! let xt = array![[0.], [1.], [2.], [3.]];
//! let yt = array![0., 0.8, 0.9, 0.1];
//! let gp = BasicGp::params(1e-2, 1., 1., 0.)
//!     .prior("ell", Prior::Uniform { lo: 0.1, hi: 5. })
//!     .check()?
//!     .fit(&Dataset::new(xt, yt))?;
//!
//! let mut mcmc = Mcmc::new(&gp, McmcParams::new().n_samples(20).seed(Some(42)).check()?)?;
//! mcmc.add_data(&array![[4.]], &array![-0.7])?;
//! let (mu, s2) = mcmc.predict(&array![[1.5], [3.5]])?;
//! # Ok::<(), reggie_mcmc::McmcError>(())
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
mod errors;
mod parameters;
pub mod sampler;

pub use algorithm::*;
pub use errors::*;
pub use parameters::*;
