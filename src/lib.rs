//! Gaussian Process regression with incremental, sparse and MCMC inference.
//!
//! This crate gathers:
//! * [gp]: Gaussian Process models conditioned incrementally on observations with exact or
//!   sparse (FITC) inference, their predictions, samples, acquisition quantities and
//!   hyperparameter optimization,
//! * [mcmc]: ensembles of Gaussian Processes over slice samples of their hyperparameters.
//!
//! # Example
//!
//! ```no_run
//! use reggie::gp::{hyperparameters::Prior, BasicGp};
//! use reggie::mcmc::{Mcmc, McmcParams};
//! use linfa::prelude::*;
//! use ndarray::array;
//!
//! let xt = array![[0.], [1.], [2.], [3.]];
//! let yt = array![0., 0.8, 0.9, 0.1];
//!
//! let mut gp = BasicGp::params(1e-2, 1., 1., 0.)
//!     .prior("ell", Prior::Uniform { lo: 0.1, hi: 5. })
//!     .check()?
//!     .fit(&Dataset::new(xt, yt))?;
//! gp.optimize()?;
//! let ei = gp.get_improvement(&array![[1.5], [2.5]], 0., false)?;
//!
//! let mcmc = Mcmc::new(&gp, McmcParams::new().n_samples(10).check()?)?;
//! let ei = mcmc.get_improvement(&array![[1.5], [2.5]], 0., false)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
pub use reggie_gp as gp;
pub use reggie_mcmc as mcmc;
