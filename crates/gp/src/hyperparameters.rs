//! Flat hyperparameter registry.
//!
//! Kernels, means and the likelihood expose their scalars through [`Parameterized`], each one
//! with a [`Domain`]. Optimization and MCMC sampling work in a free (unconstrained) space where
//! positive values are handled through their logarithm.
use crate::errors::{GpError, Result};
use linfa::Float;
use ndarray::{Array1, ArrayView1, Zip};

/// Valid domain of a scalar hyperparameter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    /// Any finite value
    Real,
    /// Strictly positive finite value
    Positive,
}

impl Domain {
    /// Whether `v` belongs to the domain
    pub fn contains<F: Float>(&self, v: F) -> bool {
        match self {
            Domain::Real => v.is_finite(),
            Domain::Positive => v.is_finite() && v > F::zero(),
        }
    }

    /// Map a value of the domain to the free space
    pub fn to_free<F: Float>(&self, v: F) -> F {
        match self {
            Domain::Real => v,
            Domain::Positive => v.ln(),
        }
    }

    /// Map a free value back to the domain
    pub fn from_free<F: Float>(&self, u: F) -> F {
        match self {
            Domain::Real => u,
            Domain::Positive => u.exp(),
        }
    }
}

/// A component owning named scalar hyperparameters
pub trait Parameterized<F: Float> {
    /// Current values as a flat vector
    fn params(&self) -> Array1<F>;

    /// Set values from a flat vector ordered as [Parameterized::params].
    /// Values are expected to lie in their [Parameterized::domains].
    fn set_params(&mut self, params: &ArrayView1<F>);

    /// Domain of each scalar
    fn domains(&self) -> Vec<Domain>;

    /// Name of each scalar, a vector parameter `ell` yields `ell[0]`, `ell[1]`, ...
    fn param_names(&self) -> Vec<String>;

    /// Number of scalar hyperparameters
    fn nparams(&self) -> usize {
        self.domains().len()
    }
}

/// Names of a vector hyperparameter `name` of size `n`, the bare name when `n == 1`
pub(crate) fn vector_names(name: &str, n: usize) -> Vec<String> {
    if n == 1 {
        vec![name.to_string()]
    } else {
        (0..n).map(|i| format!("{name}[{i}]")).collect()
    }
}

/// Map `params` to the free space
pub fn to_free<F: Float>(domains: &[Domain], params: &ArrayView1<F>) -> Array1<F> {
    let mut free = params.to_owned();
    Zip::from(&mut free)
        .and(domains)
        .for_each(|v, d| *v = d.to_free(*v));
    free
}

/// Map `free` values back to their domains
pub fn from_free<F: Float>(domains: &[Domain], free: &ArrayView1<F>) -> Array1<F> {
    let mut params = free.to_owned();
    Zip::from(&mut params)
        .and(domains)
        .for_each(|v, d| *v = d.from_free(*v));
    params
}

/// Check that every value lies in its domain
pub(crate) fn check_domains<F: Float>(
    names: &[String],
    domains: &[Domain],
    params: &ArrayView1<F>,
) -> Result<()> {
    if domains.len() != params.len() {
        return Err(GpError::InvalidValueError(format!(
            "Expected {} hyperparameters, got {}",
            domains.len(),
            params.len()
        )));
    }
    for ((name, domain), v) in names.iter().zip(domains).zip(params) {
        if !domain.contains(*v) {
            return Err(GpError::InvalidValueError(format!(
                "Hyperparameter {name} = {v} outside of {domain:?} domain"
            )));
        }
    }
    Ok(())
}

/// Prior distribution over a scalar hyperparameter
#[derive(Clone, Debug, PartialEq)]
pub enum Prior<F: Float> {
    /// Uniform on `[lo, hi]`
    Uniform {
        /// Lower bound
        lo: F,
        /// Upper bound
        hi: F,
    },
    /// Gaussian with mean `mu` and variance `s2`
    Normal {
        /// Mean
        mu: F,
        /// Variance
        s2: F,
    },
    /// Log-normal, `ln(v)` is Gaussian with mean `mu` and variance `s2`
    LogNormal {
        /// Mean of the logarithm
        mu: F,
        /// Variance of the logarithm
        s2: F,
    },
}

impl<F: Float> Prior<F> {
    /// Log density at `v`, `-inf` outside of the support
    pub fn logpdf(&self, v: F) -> F {
        let half = F::cast(0.5);
        let two_pi = F::cast(2. * std::f64::consts::PI);
        match *self {
            Prior::Uniform { lo, hi } => {
                if v >= lo && v <= hi {
                    -(hi - lo).ln()
                } else {
                    F::neg_infinity()
                }
            }
            Prior::Normal { mu, s2 } => -half * (two_pi * s2).ln() - (v - mu).powi(2) / (s2 + s2),
            Prior::LogNormal { mu, s2 } => {
                if v > F::zero() {
                    let lv = v.ln();
                    -lv - half * (two_pi * s2).ln() - (lv - mu).powi(2) / (s2 + s2)
                } else {
                    F::neg_infinity()
                }
            }
        }
    }

    /// Same prior over another float type
    pub fn cast<G: Float>(&self) -> Prior<G> {
        match *self {
            Prior::Uniform { lo, hi } => Prior::Uniform {
                lo: G::cast(lo),
                hi: G::cast(hi),
            },
            Prior::Normal { mu, s2 } => Prior::Normal {
                mu: G::cast(mu),
                s2: G::cast(s2),
            },
            Prior::LogNormal { mu, s2 } => Prior::LogNormal {
                mu: G::cast(mu),
                s2: G::cast(s2),
            },
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        match *self {
            Prior::Uniform { lo, hi } if !(lo < hi) => Err(GpError::InvalidValueError(format!(
                "Uniform prior with empty support [{lo}, {hi}]"
            ))),
            Prior::Normal { s2, .. } | Prior::LogNormal { s2, .. } if !(s2 > F::zero()) => Err(
                GpError::InvalidValueError(format!("Prior variance should be positive, got {s2}")),
            ),
            _ => Ok(()),
        }
    }
}

/// Whether the prior registered under `name` applies to the scalar `param_name`
pub(crate) fn prior_applies(name: &str, param_name: &str) -> bool {
    param_name == name
        || param_name
            .strip_prefix(name)
            .map_or(false, |rest| rest.starts_with('['))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_free_space() {
        let domains = [Domain::Positive, Domain::Real, Domain::Positive];
        let params = array![0.5, -2., 10.];
        let free = to_free(&domains, &params.view());
        assert_abs_diff_eq!(free, array![0.5f64.ln(), -2., 10f64.ln()], epsilon = 1e-12);
        assert_abs_diff_eq!(from_free(&domains, &free.view()), params, epsilon = 1e-12);
    }

    #[test]
    fn test_check_domains() {
        let names = vector_names("ell", 2);
        assert_eq!(names, vec!["ell[0]".to_string(), "ell[1]".to_string()]);
        let domains = [Domain::Positive, Domain::Positive];
        assert!(check_domains(&names, &domains, &array![1., 2.].view()).is_ok());
        assert!(check_domains(&names, &domains, &array![1., 0.].view()).is_err());
        assert!(check_domains(&names, &domains, &array![1.].view()).is_err());
        assert!(check_domains(&names, &domains, &array![f64::NAN, 1.].view()).is_err());
    }

    #[test]
    fn test_priors() {
        let uniform = Prior::Uniform { lo: 0., hi: 4. };
        assert_abs_diff_eq!(uniform.logpdf(1.), -(4f64.ln()));
        assert_eq!(uniform.logpdf(5.), f64::NEG_INFINITY);

        let normal = Prior::Normal { mu: 1., s2: 1. };
        let expected = -0.5 * (2. * std::f64::consts::PI).ln();
        assert_abs_diff_eq!(normal.logpdf(1.), expected, epsilon = 1e-12);
        assert_abs_diff_eq!(normal.logpdf(2.), expected - 0.5, epsilon = 1e-12);

        let lognormal = Prior::LogNormal { mu: 0., s2: 1. };
        assert_abs_diff_eq!(lognormal.logpdf(1.), expected, epsilon = 1e-12);
        assert_eq!(lognormal.logpdf(-1.), f64::NEG_INFINITY);

        assert!(Prior::Uniform { lo: 1., hi: 1. }.check().is_err());
        assert!(Prior::Normal { mu: 0., s2: -1. }.check().is_err());
        assert!(lognormal.check().is_ok());
    }

    #[test]
    fn test_prior_applies() {
        assert!(prior_applies("ell", "ell"));
        assert!(prior_applies("ell", "ell[2]"));
        assert!(!prior_applies("ell", "ellipse"));
        assert!(!prior_applies("rho", "ell"));
    }
}
