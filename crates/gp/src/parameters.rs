use crate::errors::{GpError, Result};
use crate::hyperparameters::{check_domains, prior_applies, Domain, Parameterized, Prior};
use crate::inference::Inference;
use crate::kernels::{Kernel, SquaredExponential};
use crate::likelihood::Gaussian;
use crate::means::{ConstantMean, MeanFunction};
use crate::{GP_COBYLA_MAX_EVAL, GP_COBYLA_MIN_EVAL, GP_OPTIM_N_START, GP_SAMPLE_JITTER};
use linfa::{Float, ParamGuard};
use ndarray::{concatenate, s, Array1, ArrayView1, Axis};

/// Default noise variance
pub const GP_DEFAULT_NOISE: f64 = 1e-2;

/// A set of validated GP parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct GpValidParams<F: Float, K: Kernel<F>, M: MeanFunction<F>> {
    /// Observation model holding the noise variance
    pub(crate) likelihood: Gaussian<F>,
    /// Covariance function of the GP prior
    pub(crate) kernel: K,
    /// Mean function of the GP prior
    pub(crate) mean: M,
    /// Inference strategy used when the model is created
    pub(crate) inference: Inference<F>,
    /// Priors over hyperparameters given by name
    pub(crate) priors: Vec<(String, Prior<F>)>,
    /// Jitter added to the joint posterior covariance when sampling
    pub(crate) jitter: F,
    /// Number of additional random starts of hyperparameter optimization
    pub(crate) n_start: usize,
    /// Max number of internal likelihood evaluation during optimization
    pub(crate) max_eval: usize,
    /// Seed of the random starts of hyperparameter optimization
    pub(crate) seed: Option<u64>,
}

impl<F: Float, K: Kernel<F> + Default, M: MeanFunction<F> + Default> Default
    for GpValidParams<F, K, M>
{
    fn default() -> GpValidParams<F, K, M> {
        GpValidParams::new(K::default(), M::default())
    }
}

impl<F: Float, K: Kernel<F>, M: MeanFunction<F>> GpValidParams<F, K, M> {
    fn new(kernel: K, mean: M) -> Self {
        GpValidParams {
            likelihood: Gaussian::new(F::cast(GP_DEFAULT_NOISE)),
            kernel,
            mean,
            inference: Inference::exact(),
            priors: vec![],
            jitter: F::cast(GP_SAMPLE_JITTER),
            n_start: GP_OPTIM_N_START,
            max_eval: GP_COBYLA_MAX_EVAL,
            seed: None,
        }
    }

    /// Get the observation model
    pub fn likelihood(&self) -> &Gaussian<F> {
        &self.likelihood
    }

    /// Get covariance function
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Get mean function
    pub fn mean(&self) -> &M {
        &self.mean
    }

    /// Get the initial inference strategy
    pub fn inference(&self) -> &Inference<F> {
        &self.inference
    }

    /// Get hyperparameter priors
    pub fn priors(&self) -> &[(String, Prior<F>)] {
        &self.priors
    }

    /// Get sampling jitter
    pub fn jitter(&self) -> F {
        self.jitter
    }

    /// Get the number of additional optimization starts
    pub fn n_start(&self) -> usize {
        self.n_start
    }

    /// Get the max number of internal likelihood evaluations during one optimization
    pub fn max_eval(&self) -> usize {
        self.max_eval
    }

    /// Get the seed of the optimization starts
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Flat hyperparameters `[sn2, kernel..., mean...]`
    pub(crate) fn hyperparameters(&self) -> Array1<F> {
        concatenate(
            Axis(0),
            &[
                self.likelihood.params().view(),
                self.kernel.params().view(),
                self.mean.params().view(),
            ],
        )
        .unwrap_or_else(|_| Array1::zeros(0))
    }

    /// Set flat hyperparameters, values are expected in their domains
    pub(crate) fn set_hyperparameters(&mut self, params: &ArrayView1<F>) {
        let nk = self.kernel.nparams();
        self.likelihood.set_params(&params.slice(s![..1]));
        self.kernel.set_params(&params.slice(s![1..1 + nk]));
        self.mean.set_params(&params.slice(s![1 + nk..]));
    }

    pub(crate) fn domains(&self) -> Vec<Domain> {
        let mut domains = self.likelihood.domains();
        domains.extend(self.kernel.domains());
        domains.extend(self.mean.domains());
        domains
    }

    pub(crate) fn param_names(&self) -> Vec<String> {
        let mut names = self.likelihood.param_names();
        names.extend(self.kernel.param_names());
        names.extend(self.mean.param_names());
        names
    }

    /// Sum of the log priors at `params`
    pub(crate) fn log_prior_at(&self, params: &ArrayView1<F>) -> F {
        let names = self.param_names();
        self.priors.iter().fold(F::zero(), |acc, (name, prior)| {
            names
                .iter()
                .zip(params)
                .filter(|(pname, _)| prior_applies(name, pname))
                .fold(acc, |acc, (_, &v)| acc + prior.logpdf(v))
        })
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [GP algorithm](struct.GaussianProcess.html).
pub struct GpParams<F: Float, K: Kernel<F>, M: MeanFunction<F>>(GpValidParams<F, K, M>);

impl<F: Float, K: Kernel<F>, M: MeanFunction<F>> GpParams<F, K, M> {
    /// A constructor for GP parameters given covariance and mean functions
    pub fn new(kernel: K, mean: M) -> GpParams<F, K, M> {
        Self(GpValidParams::new(kernel, mean))
    }

    /// A constructor for GP parameters from validated parameters
    pub fn new_from_valid(params: &GpValidParams<F, K, M>) -> Self {
        Self(params.clone())
    }

    /// Set the observation noise variance.
    pub fn noise_variance(mut self, sn2: F) -> Self {
        self.0.likelihood = Gaussian::new(sn2);
        self
    }

    /// Set covariance function.
    pub fn kernel(mut self, kernel: K) -> Self {
        self.0.kernel = kernel;
        self
    }

    /// Set mean function.
    pub fn mean(mut self, mean: M) -> Self {
        self.0.mean = mean;
        self
    }

    /// Set inference strategy.
    pub fn inference(mut self, inference: Inference<F>) -> Self {
        self.0.inference = inference;
        self
    }

    /// Add a prior over the hyperparameter `name`.
    ///
    /// A vector hyperparameter name such as `ell` applies the prior to each component.
    pub fn prior(mut self, name: &str, prior: Prior<F>) -> Self {
        self.0.priors.push((name.to_string(), prior));
        self
    }

    /// Set jitter added to the joint posterior covariance before sampling.
    pub fn jitter(mut self, jitter: F) -> Self {
        self.0.jitter = jitter;
        self
    }

    /// Set the number of additional random starts of hyperparameter optimization
    pub fn n_start(mut self, n_start: usize) -> Self {
        self.0.n_start = n_start;
        self
    }

    /// Set the max number of internal likelihood evaluations during one optimization
    /// Given max_eval has to be greater than [crate::GP_COBYLA_MIN_EVAL] otherwise
    /// max_eval is set to [crate::GP_COBYLA_MIN_EVAL].
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.max_eval = GP_COBYLA_MIN_EVAL.max(max_eval);
        self
    }

    /// Set the seed of the random optimization starts
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.0.seed = seed;
        self
    }
}

impl<F: Float, K: Kernel<F>, M: MeanFunction<F>> From<GpValidParams<F, K, M>> for GpParams<F, K, M> {
    fn from(valid: GpValidParams<F, K, M>) -> Self {
        GpParams(valid)
    }
}

impl<F: Float, K: Kernel<F>, M: MeanFunction<F>> ParamGuard for GpParams<F, K, M> {
    type Checked = GpValidParams<F, K, M>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let params = &self.0;
        let names = params.param_names();
        let values = params.hyperparameters();
        check_domains(&names, &params.domains(), &values.view())?;

        if let (Some(dk), Some(dm)) = (params.kernel.input_dim(), params.mean.input_dim()) {
            if dk != dm {
                return Err(GpError::InvalidValueError(format!(
                    "Kernel of input dimension {dk} while mean function of input dimension {dm}"
                )));
            }
        }
        if let Some(u) = params.inference.inducings() {
            if u.nrows() == 0 {
                return Err(GpError::InvalidValueError(
                    "Sparse inference requires at least one inducing point".to_string(),
                ));
            }
            let dim = params.kernel.input_dim().or(params.mean.input_dim());
            if dim.map_or(false, |d| d != u.ncols()) {
                return Err(GpError::InvalidValueError(format!(
                    "Inducing points of dimension {} do not match parameters dimension {:?}",
                    u.ncols(),
                    dim
                )));
            }
        }

        for (name, prior) in params.priors.iter() {
            prior.check()?;
            let mut found = false;
            for (pname, &v) in names.iter().zip(values.iter()) {
                if prior_applies(name, pname) {
                    found = true;
                    if !prior.logpdf(v).is_finite() {
                        return Err(GpError::InvalidValueError(format!(
                            "Hyperparameter {pname} = {v} outside of its prior {prior:?}"
                        )));
                    }
                }
            }
            if !found {
                return Err(GpError::InvalidValueError(format!(
                    "Prior given for unknown hyperparameter {name}, expected one of {names:?}"
                )));
            }
        }

        if !(params.jitter >= F::zero() && params.jitter.is_finite()) {
            return Err(GpError::InvalidValueError(format!(
                "Jitter should be finite and positive or null, got {}",
                params.jitter
            )));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

/// Parameters of a GP with squared exponential kernel and constant mean,
/// hyperparameters being named `sn2`, `rho`, `ell` and `mean`.
pub type BasicGp<F> = GpParams<F, SquaredExponential<F>, ConstantMean<F>>;

impl<F: Float> BasicGp<F> {
    /// Noise variance `sn2`, signal variance `rho`, isotropic lengthscale `ell`
    /// and constant `mean`.
    pub fn params(sn2: F, rho: F, ell: F, mean: F) -> Self {
        GpParams::new(SquaredExponential::new(rho, ell), ConstantMean::new(mean))
            .noise_variance(sn2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::Matern32;
    use crate::means::LinearMean;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    #[test]
    fn test_basic_gp_params() {
        let params = BasicGp::params(0.1, 1.0, 0.1, 0.5).check().unwrap();
        assert_eq!(params.param_names(), vec!["sn2", "rho", "ell", "mean"]);
        assert_abs_diff_eq!(params.hyperparameters(), array![0.1, 1.0, 0.1, 0.5]);
        assert_eq!(
            params.domains(),
            vec![
                Domain::Positive,
                Domain::Positive,
                Domain::Positive,
                Domain::Real
            ]
        );
    }

    #[test]
    fn test_invalid_params() {
        assert!(BasicGp::params(0., 1., 1., 0.).check().is_err());
        assert!(BasicGp::params(0.1, -1., 1., 0.).check().is_err());
        assert!(BasicGp::params(0.1, 1., f64::NAN, 0.).check().is_err());
        assert!(BasicGp::params(0.1, 1., 1., 0.).jitter(-1.).check().is_err());
        assert!(GpParams::new(
            Matern32::ard(1., array![1., 1.]),
            LinearMean::new(0., array![1.])
        )
        .check()
        .is_err());
        assert!(BasicGp::params(0.1, 1., 1., 0.)
            .inference(Inference::fitc(Array2::zeros((0, 1))))
            .check()
            .is_err());
    }

    #[test]
    fn test_priors() {
        let params = BasicGp::params(0.1, 1., 1., 0.)
            .prior("ell", Prior::Uniform { lo: 0.5, hi: 2. })
            .prior("mean", Prior::Normal { mu: 0., s2: 1. });
        assert!(params.check_ref().is_ok());
        let valid = params.check().unwrap();
        let expected = -(1.5f64).ln() - 0.5 * (2. * std::f64::consts::PI).ln();
        assert_abs_diff_eq!(
            valid.log_prior_at(&valid.hyperparameters().view()),
            expected,
            epsilon = 1e-12
        );

        assert!(BasicGp::params(0.1, 1., 1., 0.)
            .prior("ell", Prior::Uniform { lo: 2., hi: 3. })
            .check()
            .is_err());
        assert!(BasicGp::params(0.1, 1., 1., 0.)
            .prior("theta", Prior::Normal { mu: 0., s2: 1. })
            .check()
            .is_err());
    }

    #[test]
    fn test_set_hyperparameters() {
        let mut params = GpParams::new(
            Matern32::ard(1., array![1., 1.]),
            LinearMean::new(0., array![1., 2.]),
        )
        .check()
        .unwrap();
        assert_eq!(params.param_names().len(), 7);
        params.set_hyperparameters(&array![0.2, 2., 0.5, 0.6, 1., 3., 4.].view());
        assert_abs_diff_eq!(params.likelihood().sn2(), 0.2);
        assert_abs_diff_eq!(params.kernel().ell().to_owned(), array![0.5, 0.6]);
        assert_abs_diff_eq!(params.mean().weights().to_owned(), array![3., 4.]);
    }
}
