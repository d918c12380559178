use crate::criteria::{improvement, improvement_gradients};
use crate::errors::{GpError, Result};
use crate::fourier::FourierSample;
use crate::hyperparameters::{check_domains, from_free, prior_applies, to_free, Domain, Prior};
use crate::inference::Inference;
use crate::kernels::Kernel;
use crate::likelihood::Gaussian;
use crate::linalg::{add_diagonal, cholesky, solve_triangular};
use crate::means::MeanFunction;
use crate::optimization::{free_bounds, optimize_params, prepare_multistart, CobylaParams};
use crate::parameters::{GpParams, GpValidParams};
use crate::utils::{into_f64, make_rng};

use finitediff::FiniteDiff;
use linfa::prelude::{DatasetBase, Fit, Float};
use ndarray::{concatenate, Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1, Ix2, Zip};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use ndarray_stats::QuantileExt;

use log::{debug, info};
use rayon::prelude::*;
use std::fmt;
use std::time::Instant;

/// Default number of additional random starts for hyperparameters optimization
pub const GP_OPTIM_N_START: usize = 0;
/// Minimum of function evaluations for COBYLA optimizer
pub const GP_COBYLA_MIN_EVAL: usize = 25;
/// Maximum of function evaluations for COBYLA optimizer
pub const GP_COBYLA_MAX_EVAL: usize = 200;
/// Default jitter added to the joint posterior covariance before sampling
pub const GP_SAMPLE_JITTER: f64 = 1e-8;

/// Predictive (co)variance at query points
#[derive(Clone, Debug, PartialEq)]
pub enum Covariance<F: Float> {
    /// Per-point variances (q)
    Marginal(Array1<F>),
    /// Full covariance matrix (q, q)
    Joint(Array2<F>),
}

impl<F: Float> Covariance<F> {
    /// Per-point variances
    pub fn into_variances(self) -> Array1<F> {
        match self {
            Covariance::Marginal(s2) => s2,
            Covariance::Joint(sigma) => sigma.diag().to_owned(),
        }
    }

    /// Covariance matrix, diagonal in the marginal case
    pub fn into_matrix(self) -> Array2<F> {
        match self {
            Covariance::Marginal(s2) => Array2::from_diag(&s2),
            Covariance::Joint(sigma) => sigma,
        }
    }
}

/// Derivatives of the predictive moments with respect to the query coordinates
#[derive(Clone, Debug, PartialEq)]
pub struct MomentGradients<F: Float> {
    /// Mean derivatives (q, d)
    pub dmu: Array2<F>,
    /// Variance derivatives (q, d)
    pub ds2: Array2<F>,
}

/// Predictive moments of the latent function at query points
#[derive(Clone, Debug, PartialEq)]
pub struct Moments<F: Float> {
    /// Predictive means (q)
    pub mu: Array1<F>,
    /// Predictive variances or covariance
    pub cov: Covariance<F>,
    /// Gradients, when requested
    pub grad: Option<MomentGradients<F>>,
}

/// Gaussian Process regression model.
///
/// The model owns its observation set and one [Inference] strategy holding the
/// factorized posterior statistics. Observations are appended with [GaussianProcess::add_data],
/// the factorization being extended incrementally whenever the strategy allows it.
///
/// The prior is given by a kernel `K` and a mean function `M`, observations are corrupted
/// by a [Gaussian] noise of variance `sn2`. The flat hyperparameter vector of the model is
/// `[sn2, kernel params..., mean params...]`.
///
/// # Example
///
/// ```no_run
/// use reggie_gp::{BasicGp, GaussianProcess};
/// use linfa::prelude::*;
/// use ndarray::array;
///
/// let xt = array![[0.], [1.], [2.]];
/// let yt = array![0.1, 0.9, 2.1];
///
/// let mut gp = GaussianProcess::new(BasicGp::params(0.1, 1., 1., 0.).check()?);
/// gp.add_data(&xt, &yt)?;
/// let (mu, s2) = gp.predict(&array![[0.5], [1.5]])?;
/// # Ok::<(), reggie_gp::GpError>(())
/// ```
#[derive(Clone, Debug)]
pub struct GaussianProcess<F: Float, K: Kernel<F>, M: MeanFunction<F>> {
    /// Current hyperparameters and settings
    params: GpValidParams<F, K, M>,
    /// Active inference strategy
    inference: Inference<F>,
    /// Observations (x, y)
    training_data: Option<(Array2<F>, Array1<F>)>,
    /// Incumbent: max posterior mean over observed inputs
    fmax: Option<F>,
}

impl<F: Float, K: Kernel<F>, M: MeanFunction<F>> fmt::Display for GaussianProcess<F, K, M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GP(kernel={}, mean={}, sn2={}, inference={})",
            self.params.kernel,
            self.params.mean,
            self.params.likelihood.sn2(),
            self.inference
        )
    }
}

impl<F: Float, K: Kernel<F>, M: MeanFunction<F>> GaussianProcess<F, K, M> {
    /// Gp parameters constructor
    pub fn params(kernel: K, mean: M) -> GpParams<F, K, M> {
        GpParams::new(kernel, mean)
    }

    /// Model without observations
    pub fn new(params: GpValidParams<F, K, M>) -> Self {
        let inference = params.inference.fresh();
        GaussianProcess {
            params,
            inference,
            training_data: None,
            fmax: None,
        }
    }

    /// Covariance function
    pub fn kernel(&self) -> &K {
        &self.params.kernel
    }

    /// Mean function
    pub fn mean(&self) -> &M {
        &self.params.mean
    }

    /// Observation model
    pub fn likelihood(&self) -> &Gaussian<F> {
        &self.params.likelihood
    }

    /// Active inference strategy
    pub fn inference(&self) -> &Inference<F> {
        &self.inference
    }

    /// Observations (x, y) if any
    pub fn training_data(&self) -> Option<(&Array2<F>, &Array1<F>)> {
        self.training_data.as_ref().map(|(x, y)| (x, y))
    }

    /// Number of observations
    pub fn ndata(&self) -> usize {
        self.training_data.as_ref().map_or(0, |(x, _)| x.nrows())
    }

    /// Incumbent: max posterior mean over observed inputs, `None` without data
    pub fn fmax(&self) -> Option<F> {
        self.fmax
    }

    /// Input dimension known from data, inducing points or parameters
    pub fn input_dim(&self) -> Option<usize> {
        self.training_data
            .as_ref()
            .map(|(x, _)| x.ncols())
            .or_else(|| self.inference.inducings().map(|u| u.ncols()))
            .or_else(|| self.params.kernel.input_dim())
            .or_else(|| self.params.mean.input_dim())
    }

    fn check_inputs(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<()> {
        match self.input_dim() {
            Some(d) if d != x.ncols() => Err(GpError::InvalidValueError(format!(
                "Inputs of dimension {} while model is of dimension {}",
                x.ncols(),
                d
            ))),
            _ => Ok(()),
        }
    }

    /// Append observations and update the posterior.
    ///
    /// The factorization is extended in place when the strategy supports it, otherwise it is
    /// recomputed over all observations. The model is left unchanged on error.
    pub fn add_data(
        &mut self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(GpError::InvalidValueError(format!(
                "Got {} inputs but {} outputs",
                x.nrows(),
                y.len()
            )));
        }
        self.check_inputs(x)?;
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(GpError::InvalidValueError(
                "Observations should be finite".to_string(),
            ));
        }
        if x.nrows() == 0 {
            return Ok(());
        }

        let (xall, yall, n_old) = match &self.training_data {
            Some((xt, yt)) => (
                concatenate(Axis(0), &[xt.view(), x.view()])
                    .map_err(|e| GpError::InvalidValueError(e.to_string()))?,
                concatenate(Axis(0), &[yt.view(), y.view()])
                    .map_err(|e| GpError::InvalidValueError(e.to_string()))?,
                xt.nrows(),
            ),
            None => (x.to_owned(), y.to_owned(), 0),
        };
        let mut inference = self.inference.clone();
        inference.update_incremental(
            &self.params.kernel,
            &self.params.mean,
            self.params.likelihood.sn2(),
            &xall,
            &yall,
            n_old,
        )?;
        self.inference = inference;
        self.training_data = Some((xall, yall));
        self.update_fmax()
    }

    fn update_fmax(&mut self) -> Result<()> {
        let fmax = match &self.training_data {
            Some((x, _)) => self.predict(x)?.0.max().ok().copied(),
            None => None,
        };
        self.fmax = fmax;
        Ok(())
    }

    /// Predictive moments of the latent function at `x` (q, d).
    ///
    /// `joint` selects the full covariance rather than per-point variances,
    /// `grad` adds derivatives with respect to the query coordinates.
    /// Both together is rejected.
    pub fn posterior(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        joint: bool,
        grad: bool,
    ) -> Result<Moments<F>> {
        if joint && grad {
            return Err(GpError::InvalidValueError(
                "Gradients are not available together with joint covariance".to_string(),
            ));
        }
        self.check_inputs(x)?;
        let kernel = &self.params.kernel;
        let mut mu = self.params.mean.value(x);

        // projection through L of k(target, x), and through C when the strategy has one
        let projection = match (self.inference.posterior(), &self.training_data) {
            (Some(post), Some((xt, _))) => {
                let target = self.inference.target(xt.view());
                let v = solve_triangular(post.l(), &kernel.kernel(&target, x), false)?;
                let vc = post
                    .c()
                    .map(|c| solve_triangular(c, &v, false))
                    .transpose()?;
                mu = mu + v.t().dot(post.a());
                Some((post, target, v, vc))
            }
            _ => None,
        };

        let cov = if joint {
            let mut sigma = kernel.kernel(x, x);
            if let Some((_, _, v, vc)) = &projection {
                sigma = sigma - v.t().dot(v);
                if let Some(vc) = vc {
                    sigma = sigma + vc.t().dot(vc);
                }
            }
            Covariance::Joint(sigma)
        } else {
            let mut s2 = kernel.dkernel(x);
            if let Some((_, _, v, vc)) = &projection {
                s2 = s2 - v.mapv(|v| v * v).sum_axis(Axis(0));
                if let Some(vc) = vc {
                    s2 = s2 + vc.mapv(|v| v * v).sum_axis(Axis(0));
                }
            }
            Covariance::Marginal(s2)
        };

        let mut grad = if grad {
            let two = F::cast(2.);
            let mut dmu = self.params.mean.gradx(x);
            // stationary kernels: the prior variance does not depend on x
            let mut ds2 = Array2::zeros(x.dim());
            if let Some((post, target, v, vc)) = &projection {
                let dk = kernel.gradx(x, target);
                for j in 0..x.ncols() {
                    let dv = solve_triangular(post.l(), &dk.index_axis(Axis(2), j).t(), false)?;
                    let mut dmu_j = dmu.column_mut(j);
                    dmu_j += &dv.t().dot(post.a());
                    let mut ds2_j = (&dv * v).sum_axis(Axis(0)).mapv(|v| -two * v);
                    if let (Some(c), Some(vc)) = (post.c(), vc) {
                        let dvc = solve_triangular(c, &dv, false)?;
                        ds2_j = ds2_j + (&dvc * vc).sum_axis(Axis(0)).mapv(|v| two * v);
                    }
                    ds2.column_mut(j).assign(&ds2_j);
                }
            }
            Some(MomentGradients { dmu, ds2 })
        } else {
            None
        };

        let cov = match cov {
            Covariance::Marginal(mut s2) => {
                clamp_variances(&mut s2, grad.as_mut().map(|g| &mut g.ds2));
                Covariance::Marginal(s2)
            }
            joint => joint,
        };
        Ok(Moments { mu, cov, grad })
    }

    /// Predictive means and variances at `x`
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<(Array1<F>, Array1<F>)> {
        let moments = self.posterior(x, false, false)?;
        Ok((moments.mu, moments.cov.into_variances()))
    }

    /// Predictive means, variances and their derivatives (q, d) at `x`
    pub fn predict_gradients(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array1<F>, Array2<F>, Array2<F>)> {
        let Moments { mu, cov, grad } = self.posterior(x, false, true)?;
        let MomentGradients { dmu, ds2 } = grad.ok_or_else(|| {
            GpError::InvalidValueError("Moment gradients were not computed".to_string())
        })?;
        Ok((mu, cov.into_variances(), dmu, ds2))
    }

    /// Predictive means and joint covariance (q, q) at `x`
    pub fn predict_joint(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array2<F>)> {
        let moments = self.posterior(x, true, false)?;
        Ok((moments.mu, moments.cov.into_matrix()))
    }

    /// Log marginal likelihood of the observations, 0 without data
    pub fn get_loglike(&self) -> F {
        self.inference
            .posterior()
            .map_or(F::zero(), |post| post.loglike())
    }

    /// Log marginal likelihood and its gradient with respect to the hyperparameters.
    ///
    /// Strategies without a closed form gradient are differentiated numerically.
    pub fn get_loglike_gradient(&self) -> Result<(F, Array1<F>)> {
        let (post, x) = match (self.inference.posterior(), &self.training_data) {
            (Some(post), Some((x, _))) => (post, x),
            _ => return Ok((F::zero(), Array1::zeros(self.nparams()))),
        };
        let grad = match self
            .inference
            .loglike_gradient(&self.params.kernel, &self.params.mean, x)?
        {
            Some(grad) => grad,
            None => {
                // differentiate in free space so that steps never leave the domains
                let domains = self.domains();
                let p0 = self.hyperparameters().mapv(into_f64);
                let u0 = to_free(&domains, &p0.view()).to_vec();
                let f = |u: &Vec<f64>| -> f64 {
                    let p = from_free(&domains, &ArrayView1::from(u)).mapv(F::cast);
                    self.loglike_at(&p.view()).map_or(f64::NAN, into_f64)
                };
                // chain rule: dL/dp = dL/du / p where u = ln(p)
                Array1::from_iter(
                    u0.central_diff(&f)
                        .into_iter()
                        .zip(domains.iter().zip(p0.iter()))
                        .map(|(du, (domain, &p))| match domain {
                            Domain::Positive => F::cast(du / p),
                            Domain::Real => F::cast(du),
                        }),
                )
            }
        };
        Ok((post.loglike(), grad))
    }

    /// Draw `size` joint samples at `x`, shape (size, q).
    ///
    /// Latent function values when `latent` is true, noisy observations otherwise.
    pub fn sample<R: Rng>(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        size: usize,
        latent: bool,
        rng: &mut R,
    ) -> Result<Array2<F>> {
        let (mu, sigma) = self.predict_joint(x)?;
        let l = cholesky(&add_diagonal(sigma, self.params.jitter))?;
        let z = Array2::<f64>::random_using((size, x.nrows()), StandardNormal, rng);
        let f = z.mapv(F::cast).dot(&l.t()) + &mu;
        if latent {
            Ok(f)
        } else {
            Ok(self.params.likelihood.sample(&f, rng))
        }
    }

    /// Probability that the latent function exceeds `f` at `x`
    pub fn get_tail(&self, f: F, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.improvement_over(f, x, true)
    }

    /// [GaussianProcess::get_tail] and its derivatives (q, d)
    pub fn get_tail_gradients(
        &self,
        f: F,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array2<F>)> {
        self.improvement_over_gradients(f, x, true)
    }

    fn incumbent(&self, xi: F) -> Result<F> {
        self.fmax.map(|fmax| fmax + xi).ok_or_else(|| {
            GpError::EmptyDataError("Improvement requires at least one observation".to_string())
        })
    }

    /// Expected improvement (or probability of improvement when `pi`) over `fmax + xi`
    pub fn get_improvement(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        xi: F,
        pi: bool,
    ) -> Result<Array1<F>> {
        self.improvement_over(self.incumbent(xi)?, x, pi)
    }

    /// [GaussianProcess::get_improvement] and its derivatives (q, d)
    pub fn get_improvement_gradients(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        xi: F,
        pi: bool,
    ) -> Result<(Array1<F>, Array2<F>)> {
        self.improvement_over_gradients(self.incumbent(xi)?, x, pi)
    }

    /// Expected improvement (or probability of improvement when `pi`) over the baseline `f`
    pub fn improvement_over(
        &self,
        f: F,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        pi: bool,
    ) -> Result<Array1<F>> {
        let (mu, s2) = self.predict(x)?;
        Ok(improvement(f, &mu, &s2, pi))
    }

    /// [GaussianProcess::improvement_over] and its derivatives (q, d)
    pub fn improvement_over_gradients(
        &self,
        f: F,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        pi: bool,
    ) -> Result<(Array1<F>, Array2<F>)> {
        let (mu, s2, dmu, ds2) = self.predict_gradients(x)?;
        Ok(improvement_gradients(f, &mu, &s2, &dmu, &ds2, pi))
    }

    /// Differential entropy of the noisy predictive distribution at `x`
    pub fn get_entropy(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let (_, s2) = self.predict(x)?;
        Ok(self.entropy(&s2))
    }

    /// [GaussianProcess::get_entropy] and its derivatives (q, d)
    pub fn get_entropy_gradients(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array2<F>)> {
        let (_, s2, _, ds2) = self.predict_gradients(x)?;
        let sn2 = self.params.likelihood.sn2();
        let half = F::cast(0.5);
        let mut grad = ds2;
        for (mut row, &s2) in grad.rows_mut().into_iter().zip(s2.iter()) {
            row.mapv_inplace(|v| half * v / (s2 + sn2));
        }
        Ok((self.entropy(&s2), grad))
    }

    fn entropy(&self, s2: &Array1<F>) -> Array1<F> {
        let sn2 = self.params.likelihood.sn2();
        let c = F::cast(2. * std::f64::consts::PI * std::f64::consts::E);
        s2.mapv(|s2| F::cast(0.5) * (c * (s2 + sn2)).ln())
    }

    /// Approximate posterior function draw using `n` random Fourier features
    pub fn sample_f<R: Rng>(&self, n: usize, rng: &mut R) -> Result<FourierSample<F, M>> {
        let dim = self.input_dim().ok_or_else(|| {
            GpError::EmptyDataError(
                "Input dimension unknown: no observation and isotropic parameters".to_string(),
            )
        })?;
        FourierSample::new(
            &self.params.kernel,
            &self.params.mean,
            self.params.likelihood.sn2(),
            self.training_data.as_ref().map(|(x, y)| (x, y)),
            n,
            dim,
            rng,
        )
    }

    /// Replace the inference strategy, the new one being factored over all observations
    pub fn switch_inference(&mut self, inference: Inference<F>) -> Result<()> {
        if let Some(u) = inference.inducings() {
            if u.nrows() == 0 {
                return Err(GpError::InvalidValueError(
                    "Sparse inference requires at least one inducing point".to_string(),
                ));
            }
            if let Some(d) = self.input_dim() {
                if d != u.ncols() {
                    return Err(GpError::InvalidValueError(format!(
                        "Inducing points of dimension {} while model is of dimension {}",
                        u.ncols(),
                        d
                    )));
                }
            }
        }
        let inference = self.refit(&self.params, &inference)?;
        debug!("Switch inference from {} to {}", self.inference, inference);
        self.params.inference = inference.fresh();
        self.inference = inference;
        self.update_fmax()
    }

    fn refit(
        &self,
        params: &GpValidParams<F, K, M>,
        inference: &Inference<F>,
    ) -> Result<Inference<F>> {
        let mut inference = inference.fresh();
        if let Some((x, y)) = &self.training_data {
            inference.update(
                &params.kernel,
                &params.mean,
                params.likelihood.sn2(),
                x,
                y,
            )?;
        }
        Ok(inference)
    }

    /// Flat hyperparameters `[sn2, kernel..., mean...]`
    pub fn hyperparameters(&self) -> Array1<F> {
        self.params.hyperparameters()
    }

    /// Set flat hyperparameters and refactor the posterior.
    /// The model is left unchanged on error.
    pub fn set_hyperparameters(&mut self, p: &ArrayView1<F>) -> Result<()> {
        check_domains(&self.param_names(), &self.domains(), p)?;
        let mut params = self.params.clone();
        params.set_hyperparameters(p);
        self.inference = self.refit(&params, &self.inference)?;
        self.params = params;
        self.update_fmax()
    }

    /// Domain of each hyperparameter
    pub fn domains(&self) -> Vec<Domain> {
        self.params.domains()
    }

    /// Name of each hyperparameter
    pub fn param_names(&self) -> Vec<String> {
        self.params.param_names()
    }

    /// Number of hyperparameters
    pub fn nparams(&self) -> usize {
        self.domains().len()
    }

    /// Log prior density of the current hyperparameters
    pub fn log_prior(&self) -> F {
        self.params.log_prior_at(&self.hyperparameters().view())
    }

    /// Log marginal likelihood with hyperparameters `p`, the model being unchanged
    pub fn loglike_at(&self, p: &ArrayView1<F>) -> Result<F> {
        check_domains(&self.param_names(), &self.domains(), p)?;
        let mut params = self.params.clone();
        params.set_hyperparameters(p);
        let inference = self.refit(&params, &self.inference)?;
        Ok(inference
            .posterior()
            .map_or(F::zero(), |post| post.loglike()))
    }

    /// Unnormalized log posterior of hyperparameters `p`: log likelihood + log prior,
    /// `-inf` outside domains or prior supports
    pub fn log_posterior_at(&self, p: &ArrayView1<F>) -> Result<F> {
        if p.len() != self.nparams() {
            return Err(GpError::InvalidValueError(format!(
                "Expected {} hyperparameters, got {}",
                self.nparams(),
                p.len()
            )));
        }
        if p
            .iter()
            .zip(self.domains())
            .any(|(&v, domain)| !domain.contains(v))
        {
            return Ok(F::neg_infinity());
        }
        let lp = self.params.log_prior_at(p);
        if !lp.is_finite() {
            return Ok(F::neg_infinity());
        }
        Ok(lp + self.loglike_at(p)?)
    }

    /// Maximize the log posterior of hyperparameters with COBYLA from the current values
    /// plus `n_start` random starts, then refactor the posterior.
    pub fn optimize(&mut self) -> Result<()> {
        if self.ndata() == 0 {
            return Err(GpError::EmptyDataError(
                "Hyperparameter optimization requires observations".to_string(),
            ));
        }
        let domains = self.domains();
        let names = self.param_names();
        let priors: Vec<Option<Prior<f64>>> = names
            .iter()
            .map(|pname| {
                self.params
                    .priors
                    .iter()
                    .find(|(name, _)| prior_applies(name, pname))
                    .map(|(_, prior)| prior.cast())
            })
            .collect();
        let free0 = to_free(&domains, &self.hyperparameters().mapv(into_f64).view());
        let bounds = free_bounds(&free0, &domains, &priors);
        let mut rng = make_rng(self.params.seed);
        let starts = prepare_multistart(self.params.n_start, &free0, &bounds, &mut rng);
        debug!("Optimize with multistart {starts:?} and bounds {bounds:?}");

        let objfn = |u: &[f64], _params: &mut ()| -> f64 {
            let p = from_free(&domains, &ArrayView1::from(u)).mapv(F::cast);
            match self.log_posterior_at(&p.view()) {
                Ok(lp) if lp.is_finite() => -into_f64(lp),
                _ => f64::INFINITY,
            }
        };

        let now = Instant::now();
        let (fmin, free_opt) = (0..starts.nrows())
            .into_par_iter()
            .map(|i| {
                optimize_params(
                    objfn,
                    &starts.row(i).to_owned(),
                    &bounds,
                    CobylaParams {
                        maxeval: (10 * starts.ncols())
                            .clamp(GP_COBYLA_MIN_EVAL, self.params.max_eval),
                        ..CobylaParams::default()
                    },
                )
            })
            .reduce(
                || (f64::INFINITY, free0.clone()),
                |a, b| if b.0 < a.0 { b } else { a },
            );
        if !fmin.is_finite() {
            return Err(GpError::OptimizationError(format!(
                "No finite log posterior found from {} starts",
                starts.nrows()
            )));
        }
        let p = from_free(&domains, &free_opt.view()).mapv(F::cast);
        self.set_hyperparameters(&p.view())?;
        info!(
            "Hyperparameters optimized in {:?}: {} (log posterior = {})",
            now.elapsed(),
            self,
            -fmin
        );
        Ok(())
    }
}

impl<F, K, M, D> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for GpValidParams<F, K, M>
where
    F: Float,
    K: Kernel<F>,
    M: MeanFunction<F>,
    D: Data<Elem = F>,
{
    type Object = GaussianProcess<F, K, M>;

    /// Condition a GP with the current hyperparameters on the dataset
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let mut gp = GaussianProcess::new(self.clone());
        gp.add_data(dataset.records(), dataset.targets())?;
        Ok(gp)
    }
}

/// Clamp round-off negative variances at zero, derivatives of clamped entries being zeroed
fn clamp_variances<F: Float>(s2: &mut Array1<F>, ds2: Option<&mut Array2<F>>) {
    match ds2 {
        Some(ds2) => Zip::from(s2)
            .and(ds2.rows_mut())
            .for_each(|s2, mut ds2| {
                if *s2 <= F::zero() {
                    *s2 = F::zero();
                    ds2.fill(F::zero());
                }
            }),
        None => s2.mapv_inplace(|v| v.max(F::zero())),
    }
}
