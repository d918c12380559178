use thiserror::Error;

/// A result type for GP regression algorithm
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when using [`GaussianProcess`](crate::GaussianProcess) or one of its inference strategies
#[derive(Error, Debug)]
pub enum GpError {
    /// When a Gram matrix is not positive-definite after regularization
    #[error("Numerical error: {0}")]
    NumericalError(String),
    /// When error due to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
    /// When an operation requires observations
    #[error("Empty data error: {0}")]
    EmptyDataError(String),
    /// When hyperparameter optimization fails
    #[error("Optimization error: {0}")]
    OptimizationError(String),
    #[error(transparent)]
    /// When linear algebra computation fails
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
}
