use crate::errors::{McmcError, Result};
use linfa::ParamGuard;

/// Default number of member models
pub const MCMC_N_SAMPLES: usize = 100;
/// Default number of discarded burn-in sweeps
pub const MCMC_BURN: usize = 100;
/// Default growth factor of the observation set triggering a new burn-in
pub const MCMC_REBURN_FACTOR: f64 = 2.;

/// A set of validated MCMC ensemble parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct McmcValidParams {
    /// Number of member models
    pub(crate) n_samples: usize,
    /// Number of burn-in sweeps discarded before sampling
    pub(crate) burn: usize,
    /// Burn again when the number of observations exceeds `reburn_factor` times
    /// its value at the last burn-in
    pub(crate) reburn_factor: f64,
    /// Initial slice width in the free hyperparameter space
    pub(crate) width: f64,
    /// Max number of stepping-out steps per coordinate
    pub(crate) max_steps: usize,
    /// Seed of the sampler
    pub(crate) seed: Option<u64>,
}

impl Default for McmcValidParams {
    fn default() -> McmcValidParams {
        McmcValidParams {
            n_samples: MCMC_N_SAMPLES,
            burn: MCMC_BURN,
            reburn_factor: MCMC_REBURN_FACTOR,
            width: 1.,
            max_steps: 10,
            seed: None,
        }
    }
}

impl McmcValidParams {
    /// Get the number of member models
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Get the number of burn-in sweeps
    pub fn burn(&self) -> usize {
        self.burn
    }

    /// Get the re-burn growth factor
    pub fn reburn_factor(&self) -> f64 {
        self.reburn_factor
    }

    /// Get the initial slice width
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Get the max number of stepping-out steps
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Get the seed
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

/// The set of parameters that can be specified for the construction of
/// an [MCMC ensemble](crate::Mcmc).
#[derive(Clone, Debug, Default)]
pub struct McmcParams(McmcValidParams);

impl McmcParams {
    /// Default parameters
    pub fn new() -> McmcParams {
        Self::default()
    }

    /// Set the number of member models
    pub fn n_samples(mut self, n_samples: usize) -> Self {
        self.0.n_samples = n_samples;
        self
    }

    /// Set the number of burn-in sweeps
    pub fn burn(mut self, burn: usize) -> Self {
        self.0.burn = burn;
        self
    }

    /// Set the re-burn growth factor: adding observations triggers a new burn-in
    /// once their number exceeds `reburn_factor` times the number at the last burn-in.
    /// The larger, the cheaper the updates, at the price of staler samples.
    pub fn reburn_factor(mut self, reburn_factor: f64) -> Self {
        self.0.reburn_factor = reburn_factor;
        self
    }

    /// Set the initial slice width in the free hyperparameter space
    pub fn width(mut self, width: f64) -> Self {
        self.0.width = width;
        self
    }

    /// Set the max number of stepping-out steps per coordinate
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.0.max_steps = max_steps;
        self
    }

    /// Set the seed of the sampler
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.0.seed = seed;
        self
    }
}

impl From<McmcValidParams> for McmcParams {
    fn from(valid: McmcValidParams) -> Self {
        McmcParams(valid)
    }
}

impl ParamGuard for McmcParams {
    type Checked = McmcValidParams;
    type Error = McmcError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let params = &self.0;
        if params.n_samples == 0 {
            return Err(McmcError::InvalidValueError(
                "Number of samples should be positive".to_string(),
            ));
        }
        if !(params.reburn_factor >= 1. && params.reburn_factor.is_finite()) {
            return Err(McmcError::InvalidValueError(format!(
                "Re-burn factor should be finite and greater than 1, got {}",
                params.reburn_factor
            )));
        }
        if !(params.width > 0. && params.width.is_finite()) {
            return Err(McmcError::InvalidValueError(format!(
                "Slice width should be finite and positive, got {}",
                params.width
            )));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = McmcParams::new().check().unwrap();
        assert_eq!(params.n_samples(), 100);
        assert_eq!(params.burn(), 100);
        assert_eq!(params.reburn_factor(), 2.);
        assert_eq!(params.seed(), None);
    }

    #[test]
    fn test_invalid_params() {
        assert!(McmcParams::new().n_samples(0).check().is_err());
        assert!(McmcParams::new().reburn_factor(0.5).check().is_err());
        assert!(McmcParams::new().reburn_factor(f64::NAN).check().is_err());
        assert!(McmcParams::new().width(0.).check().is_err());
        assert!(McmcParams::new().burn(0).reburn_factor(1.).check().is_ok());
    }
}
