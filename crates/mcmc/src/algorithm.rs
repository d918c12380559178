use crate::errors::{McmcError, Result};
use crate::parameters::{McmcParams, McmcValidParams};
use crate::sampler::slice_sample;

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix1, Ix2, Zip};
use ndarray_rand::rand::Rng;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use reggie_gp::fourier::FourierSample;
use reggie_gp::kernels::Kernel;
use reggie_gp::means::MeanFunction;
use reggie_gp::{make_rng, GaussianProcess, GpError};
use std::fmt;
use std::time::Instant;

type Gp<K, M> = GaussianProcess<f64, K, M>;

/// Ensemble of Gaussian Processes whose hyperparameters are samples of their posterior
/// distribution given the observations.
///
/// Members are drawn by slice sampling from a template model. Predictions are moment matched
/// over the members, acquisition quantities are averaged and sampling delegates to a member
/// chosen at random.
///
/// Adding observations conditions the last member on them and resamples all members from it.
/// Burn-in is run again only when the number of observations exceeds `reburn_factor` times
/// its value at the last burn-in.
#[derive(Clone, Debug)]
pub struct Mcmc<K: Kernel<f64>, M: MeanFunction<f64>> {
    params: McmcValidParams,
    models: Vec<Gp<K, M>>,
    /// Number of observations when the last burn-in was run
    ndata_at_burn: usize,
    /// Incumbent: max ensemble mean over observed inputs
    fmax: Option<f64>,
    rng: Xoshiro256Plus,
}

impl<K: Kernel<f64>, M: MeanFunction<f64>> fmt::Display for Mcmc<K, M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "MCMC(n={}, burn={}, ndata={})",
            self.models.len(),
            self.params.burn(),
            self.ndata()
        )
    }
}

impl<K: Kernel<f64>, M: MeanFunction<f64>> Mcmc<K, M> {
    /// Ensemble parameters constructor
    pub fn params() -> McmcParams {
        McmcParams::new()
    }

    /// Burn-in from `model` then draw the members of the ensemble.
    ///
    /// The template hyperparameters must have a finite posterior density.
    pub fn new(model: &Gp<K, M>, params: McmcValidParams) -> Result<Self> {
        let mut rng = make_rng(params.seed());
        let ndata_at_burn = model.ndata();
        let start = burn_in(model, &params, &mut rng)?;
        let models = slice_sample(
            &start,
            params.n_samples(),
            params.width(),
            params.max_steps(),
            &mut rng,
        )?;
        let mut mcmc = Mcmc {
            params,
            models,
            ndata_at_burn,
            fmax: None,
            rng,
        };
        mcmc.update_fmax()?;
        Ok(mcmc)
    }

    /// Member models
    pub fn models(&self) -> &[Gp<K, M>] {
        &self.models
    }

    /// Ensemble parameters
    pub fn mcmc_params(&self) -> &McmcValidParams {
        &self.params
    }

    /// Number of observations
    pub fn ndata(&self) -> usize {
        self.models.last().map_or(0, |gp| gp.ndata())
    }

    /// Number of observations at the last burn-in
    pub fn ndata_at_burn(&self) -> usize {
        self.ndata_at_burn
    }

    /// Incumbent: max ensemble mean over observed inputs, `None` without data
    pub fn fmax(&self) -> Option<f64> {
        self.fmax
    }

    fn last(&self) -> Result<&Gp<K, M>> {
        self.models
            .last()
            .ok_or_else(|| McmcError::InvalidValueError("Empty ensemble".to_string()))
    }

    /// Append observations and resample the ensemble.
    /// The ensemble is left unchanged on error.
    pub fn add_data(
        &mut self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        y: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<()> {
        let now = Instant::now();
        let mut model = self.last()?.clone();
        model.add_data(x, y)?;

        let mut rng = self.rng.clone();
        let reburn = model.ndata() as f64 > self.params.reburn_factor() * self.ndata_at_burn as f64;
        let (start, ndata_at_burn) = if reburn {
            debug!(
                "Burn-in again with {} observations (last at {})",
                model.ndata(),
                self.ndata_at_burn
            );
            (burn_in(&model, &self.params, &mut rng)?, model.ndata())
        } else {
            (model, self.ndata_at_burn)
        };
        let models = slice_sample(
            &start,
            self.params.n_samples(),
            self.params.width(),
            self.params.max_steps(),
            &mut rng,
        )?;

        let previous = std::mem::replace(&mut self.models, models);
        if let Err(err) = self.update_fmax() {
            self.models = previous;
            return Err(err);
        }
        self.ndata_at_burn = ndata_at_burn;
        self.rng = rng;
        info!(
            "MCMC ensemble updated to {} observations in {:?}",
            self.ndata(),
            now.elapsed()
        );
        Ok(())
    }

    fn update_fmax(&mut self) -> Result<()> {
        let x = self.last()?.training_data().map(|(x, _)| x.clone());
        self.fmax = match x {
            Some(x) if x.nrows() > 0 => {
                let (mu, _) = self.predict(&x)?;
                Some(mu.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v)))
            }
            _ => None,
        };
        Ok(())
    }

    /// Apply `f` to each member in parallel
    fn fan_out<T, G>(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>, f: G) -> Result<Vec<T>>
    where
        T: Send,
        G: Fn(&Gp<K, M>, &ArrayView2<f64>) -> reggie_gp::Result<T> + Sync,
    {
        let x = x.view();
        let results: std::result::Result<Vec<T>, GpError> =
            self.models.par_iter().map(|gp| f(gp, &x)).collect();
        Ok(results?)
    }

    /// Ensemble predictive means and variances at `x` (q, d):
    /// mean of means, and mean of variances plus variance of means
    pub fn predict(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        let moments = self.fan_out(x, |gp, x| gp.predict(x))?;
        let n = moments.len() as f64;
        let mut mu = Array1::<f64>::zeros(x.nrows());
        for (m, _) in moments.iter() {
            mu += m;
        }
        mu /= n;
        let mut s2 = Array1::<f64>::zeros(x.nrows());
        for (m, v) in moments.iter() {
            Zip::from(&mut s2)
                .and(m)
                .and(v)
                .and(&mu)
                .for_each(|s2, &m, &v, &mu| *s2 += v + (m - mu) * (m - mu));
        }
        s2 /= n;
        Ok((mu, s2))
    }

    /// Ensemble predictive means, variances and their derivatives (q, d) at `x`
    #[allow(clippy::type_complexity)]
    pub fn predict_gradients(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array1<f64>, Array1<f64>, Array2<f64>, Array2<f64>)> {
        let moments = self.fan_out(x, |gp, x| gp.predict_gradients(x))?;
        let n = moments.len() as f64;
        let (q, d) = x.dim();
        let mut mu = Array1::<f64>::zeros(q);
        let mut dmu = Array2::<f64>::zeros((q, d));
        for (m, _, dm, _) in moments.iter() {
            mu += m;
            dmu += dm;
        }
        mu /= n;
        dmu /= n;

        let mut s2 = Array1::<f64>::zeros(q);
        let mut ds2 = Array2::<f64>::zeros((q, d));
        for (m, v, dm, dv) in moments.iter() {
            let dev = m - &mu;
            s2 += &(v + &dev.mapv(|e| e * e));
            // d(m - mu)² = 2 (m - mu)(dm - dmu)
            let cross = (dm - &dmu) * &dev.insert_axis(Axis(1)).mapv(|e| 2. * e);
            ds2 += &(dv + &cross);
        }
        s2 /= n;
        ds2 /= n;
        Ok((mu, s2, dmu, ds2))
    }

    /// Mean log marginal likelihood of the members
    pub fn get_loglike(&self) -> f64 {
        let n = self.models.len().max(1) as f64;
        self.models.iter().map(|gp| gp.get_loglike()).sum::<f64>() / n
    }

    /// Mean over members of the probability that the latent function exceeds `f` at `x`
    pub fn get_tail(&self, f: f64, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        let values = self.fan_out(x, |gp, x| gp.get_tail(f, x))?;
        Ok(average(values, x.nrows()))
    }

    /// [Mcmc::get_tail] and its derivatives (q, d)
    pub fn get_tail_gradients(
        &self,
        f: f64,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array1<f64>, Array2<f64>)> {
        let values = self.fan_out(x, |gp, x| gp.get_tail_gradients(f, x))?;
        Ok(average_pairs(values, x.dim()))
    }

    fn incumbent(&self, xi: f64) -> Result<f64> {
        self.fmax.map(|fmax| fmax + xi).ok_or_else(|| {
            GpError::EmptyDataError("Improvement requires at least one observation".to_string())
                .into()
        })
    }

    /// Mean over members of the expected improvement (or probability of improvement
    /// when `pi`) over the ensemble incumbent plus `xi`
    pub fn get_improvement(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        xi: f64,
        pi: bool,
    ) -> Result<Array1<f64>> {
        let f = self.incumbent(xi)?;
        let values = self.fan_out(x, |gp, x| gp.improvement_over(f, x, pi))?;
        Ok(average(values, x.nrows()))
    }

    /// [Mcmc::get_improvement] and its derivatives (q, d)
    pub fn get_improvement_gradients(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        xi: f64,
        pi: bool,
    ) -> Result<(Array1<f64>, Array2<f64>)> {
        let f = self.incumbent(xi)?;
        let values = self.fan_out(x, |gp, x| gp.improvement_over_gradients(f, x, pi))?;
        Ok(average_pairs(values, x.dim()))
    }

    /// Mean over members of the predictive entropy at `x`
    pub fn get_entropy(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        let values = self.fan_out(x, |gp, x| gp.get_entropy(x))?;
        Ok(average(values, x.nrows()))
    }

    /// [Mcmc::get_entropy] and its derivatives (q, d)
    pub fn get_entropy_gradients(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<(Array1<f64>, Array2<f64>)> {
        let values = self.fan_out(x, |gp, x| gp.get_entropy_gradients(x))?;
        Ok(average_pairs(values, x.dim()))
    }

    /// Joint posterior samples (size, q) at `x` from one member chosen uniformly at random
    pub fn sample<R: Rng>(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        size: usize,
        latent: bool,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        let gp = self.pick(rng)?;
        Ok(gp.sample(x, size, latent, rng)?)
    }

    /// Approximate posterior function sample drawn from one member chosen uniformly at random
    pub fn sample_f<R: Rng>(&self, n: usize, rng: &mut R) -> Result<FourierSample<f64, M>> {
        let gp = self.pick(rng)?;
        Ok(gp.sample_f(n, rng)?)
    }

    fn pick<R: Rng>(&self, rng: &mut R) -> Result<&Gp<K, M>> {
        if self.models.is_empty() {
            return Err(McmcError::InvalidValueError("Empty ensemble".to_string()));
        }
        Ok(&self.models[rng.gen_range(0..self.models.len())])
    }
}

/// Last state of `burn` discarded sweeps started from `model`
fn burn_in<K: Kernel<f64>, M: MeanFunction<f64>>(
    model: &Gp<K, M>,
    params: &McmcValidParams,
    rng: &mut Xoshiro256Plus,
) -> Result<Gp<K, M>> {
    if params.burn() == 0 {
        return Ok(model.clone());
    }
    let mut burned = slice_sample(
        model,
        params.burn(),
        params.width(),
        params.max_steps(),
        rng,
    )?;
    burned
        .pop()
        .ok_or_else(|| McmcError::InvalidValueError("Burn-in produced no sample".to_string()))
}

fn average(values: Vec<Array1<f64>>, q: usize) -> Array1<f64> {
    let n = values.len().max(1) as f64;
    values
        .iter()
        .fold(Array1::<f64>::zeros(q), |acc, v| acc + v)
        / n
}

fn average_pairs(values: Vec<(Array1<f64>, Array2<f64>)>, dim: (usize, usize)) -> (Array1<f64>, Array2<f64>) {
    let n = values.len().max(1) as f64;
    let (v, g) = values.iter().fold(
        (Array1::<f64>::zeros(dim.0), Array2::<f64>::zeros(dim)),
        |(acc_v, acc_g), (v, g)| (acc_v + v, acc_g + g),
    );
    (v / n, g / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use linfa::prelude::{Dataset, Fit, ParamGuard};
    use ndarray::{array, s};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use reggie_gp::hyperparameters::Prior;
    use reggie_gp::kernels::SquaredExponential;
    use reggie_gp::means::ConstantMean;
    use reggie_gp::BasicGp;

    type Ensemble = Mcmc<SquaredExponential<f64>, ConstantMean<f64>>;

    fn observations(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let x = Array2::random_using((n, 1), Uniform::new(0., 5.), &mut rng);
        let y = x.column(0).mapv(|v: f64| v.sin() + 0.1 * v);
        (x, y)
    }

    fn template(n: usize) -> Gp<SquaredExponential<f64>, ConstantMean<f64>> {
        let (x, y) = observations(n, 42);
        BasicGp::params(0.05, 1., 1., 0.)
            .prior("sn2", Prior::Uniform { lo: 1e-3, hi: 1. })
            .prior("ell", Prior::Uniform { lo: 0.2, hi: 3. })
            .prior("mean", Prior::Normal { mu: 0., s2: 1. })
            .check()
            .unwrap()
            .fit(&Dataset::new(x, y))
            .unwrap()
    }

    fn ensemble(n: usize) -> Ensemble {
        let params = Ensemble::params()
            .n_samples(6)
            .burn(5)
            .seed(Some(7))
            .check()
            .unwrap();
        Mcmc::new(&template(n), params).unwrap()
    }

    fn query_points() -> Array2<f64> {
        array![[0.3], [1.7], [2.9], [4.4]]
    }

    #[test]
    fn test_mcmc_new() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mcmc = ensemble(8);
        assert_eq!(mcmc.models().len(), 6);
        assert_eq!(mcmc.ndata(), 8);
        assert_eq!(mcmc.ndata_at_burn(), 8);
        assert!(mcmc.fmax().is_some());
        for gp in mcmc.models() {
            assert_eq!(gp.ndata(), 8);
            assert!(gp.log_prior().is_finite());
        }
        assert_eq!(format!("{mcmc}"), "MCMC(n=6, burn=5, ndata=8)");
    }

    #[test]
    fn test_mcmc_predict_total_variance() {
        let mcmc = ensemble(8);
        let x = query_points();
        let (mu, s2) = mcmc.predict(&x).unwrap();

        let preds: Vec<_> = mcmc.models().iter().map(|gp| gp.predict(&x).unwrap()).collect();
        let n = preds.len() as f64;
        let expected_mu = preds.iter().fold(Array1::<f64>::zeros(4), |acc, (m, _)| acc + m) / n;
        let expected_s2 = preds.iter().fold(Array1::<f64>::zeros(4), |acc, (m, v)| {
            acc + v + (m - &expected_mu).mapv(|e| e * e)
        }) / n;
        assert_abs_diff_eq!(mu, expected_mu, epsilon = 1e-12);
        assert_abs_diff_eq!(s2, expected_s2, epsilon = 1e-12);
        // mixture variance is at least the mean member variance
        let mean_var = preds.iter().fold(Array1::<f64>::zeros(4), |acc, (_, v)| acc + v) / n;
        assert!(Zip::from(&s2).and(&mean_var).all(|&a, &b| a >= b - 1e-12));
    }

    #[test]
    fn test_mcmc_predict_gradients() {
        let mcmc = ensemble(8);
        let x = query_points();
        let (mu, s2, dmu, ds2) = mcmc.predict_gradients(&x).unwrap();
        let (mu_ref, s2_ref) = mcmc.predict(&x).unwrap();
        assert_abs_diff_eq!(mu, mu_ref, epsilon = 1e-10);
        assert_abs_diff_eq!(s2, s2_ref, epsilon = 1e-10);

        let h = 1e-5;
        let (mu_p, s2_p) = mcmc.predict(&x.mapv(|v| v + h)).unwrap();
        let (mu_m, s2_m) = mcmc.predict(&x.mapv(|v| v - h)).unwrap();
        let fd_mu = (mu_p - mu_m) / (2. * h);
        let fd_s2 = (s2_p - s2_m) / (2. * h);
        assert_abs_diff_eq!(dmu.column(0).to_owned(), fd_mu, epsilon = 1e-5);
        assert_abs_diff_eq!(ds2.column(0).to_owned(), fd_s2, epsilon = 1e-5);
    }

    #[test]
    fn test_mcmc_add_data_reburn() {
        let mut mcmc = ensemble(8);
        let (x, y) = observations(20, 3);

        // 8 + 4 = 12 <= 2 * 8: no burn-in
        mcmc.add_data(&x.slice(s![..4, ..]), &y.slice(s![..4])).unwrap();
        assert_eq!(mcmc.ndata(), 12);
        assert_eq!(mcmc.ndata_at_burn(), 8);
        assert!(mcmc.models().iter().all(|gp| gp.ndata() == 12));

        // 12 + 8 = 20 > 2 * 8: burn-in again
        mcmc.add_data(&x.slice(s![4..12, ..]), &y.slice(s![4..12])).unwrap();
        assert_eq!(mcmc.ndata(), 20);
        assert_eq!(mcmc.ndata_at_burn(), 20);
        assert_eq!(mcmc.models().len(), 6);
    }

    #[test]
    fn test_mcmc_add_data_invalid() {
        let mut mcmc = ensemble(8);
        let before: Vec<_> = mcmc.models().iter().map(|gp| gp.hyperparameters()).collect();
        assert!(mcmc.add_data(&array![[1.], [2.]], &array![1.]).is_err());
        assert!(mcmc.add_data(&array![[1., 2.]], &array![1.]).is_err());
        assert_eq!(mcmc.ndata(), 8);
        let after: Vec<_> = mcmc.models().iter().map(|gp| gp.hyperparameters()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_mcmc_averages() {
        let mcmc = ensemble(8);
        let x = query_points();
        let n = mcmc.models().len() as f64;

        let tail = mcmc.get_tail(0.5, &x).unwrap();
        let expected = mcmc
            .models()
            .iter()
            .fold(Array1::<f64>::zeros(4), |acc, gp| acc + gp.get_tail(0.5, &x).unwrap())
            / n;
        assert_abs_diff_eq!(tail, expected, epsilon = 1e-12);

        let fmax = mcmc.fmax().unwrap();
        let ei = mcmc.get_improvement(&x, 0.01, false).unwrap();
        let expected = mcmc.models().iter().fold(Array1::<f64>::zeros(4), |acc, gp| {
            acc + gp.improvement_over(fmax + 0.01, &x, false).unwrap()
        }) / n;
        assert_abs_diff_eq!(ei, expected, epsilon = 1e-12);
        assert!(ei.iter().all(|&v| v >= 0.));

        let entropy = mcmc.get_entropy(&x).unwrap();
        let expected = mcmc
            .models()
            .iter()
            .fold(Array1::<f64>::zeros(4), |acc, gp| acc + gp.get_entropy(&x).unwrap())
            / n;
        assert_abs_diff_eq!(entropy, expected, epsilon = 1e-12);

        let loglike = mcmc.models().iter().map(|gp| gp.get_loglike()).sum::<f64>() / n;
        assert_abs_diff_eq!(mcmc.get_loglike(), loglike, epsilon = 1e-12);
    }

    #[test]
    fn test_mcmc_improvement_gradients() {
        let mcmc = ensemble(8);
        let x = query_points();
        let (ei, dei) = mcmc.get_improvement_gradients(&x, 0., false).unwrap();
        assert_abs_diff_eq!(ei, mcmc.get_improvement(&x, 0., false).unwrap(), epsilon = 1e-12);

        let h = 1e-5;
        let ei_p = mcmc.get_improvement(&x.mapv(|v| v + h), 0., false).unwrap();
        let ei_m = mcmc.get_improvement(&x.mapv(|v| v - h), 0., false).unwrap();
        assert_abs_diff_eq!(dei.column(0).to_owned(), (ei_p - ei_m) / (2. * h), epsilon = 1e-5);

        let (_, dtail) = mcmc.get_tail_gradients(0.5, &x).unwrap();
        assert_eq!(dtail.dim(), (4, 1));
        let (_, dh) = mcmc.get_entropy_gradients(&x).unwrap();
        assert_eq!(dh.dim(), (4, 1));
    }

    #[test]
    fn test_mcmc_sample() {
        let mcmc = ensemble(8);
        let x = query_points();
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let samples = mcmc.sample(&x, 50, true, &mut rng).unwrap();
        assert_eq!(samples.dim(), (50, 4));
        assert!(samples.iter().all(|v| v.is_finite()));

        let f = mcmc.sample_f(100, &mut rng).unwrap();
        let values = f.get(&x).unwrap();
        assert_eq!(values.len(), 4);
        assert!(values.iter().all(|v| v.is_finite()));
    }
}
