use reggie_gp::GpError;
use thiserror::Error;

/// A result type for MCMC ensembles
pub type Result<T> = std::result::Result<T, McmcError>;

/// An error when using [`Mcmc`](crate::Mcmc) or the slice sampler
#[derive(Error, Debug)]
pub enum McmcError {
    /// When error due to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
    /// When a member model fails
    #[error(transparent)]
    GpError(#[from] GpError),
}
