//! Approximate function draws from a GP posterior using random Fourier features.
//!
//! A stationary kernel is approximated by `k(x, x') ≈ φ(x).φ(x')ᵀ` with
//! `φ(x) = sqrt(2.rho/n).cos(W.x + b)`, frequencies `W` drawn from the spectral density and
//! phases `b` uniform in `[0, 2π]`. The GP becomes a Bayesian linear model `f(x) = m(x) + φ(x).θ`
//! and a posterior draw of `θ` yields a whole function which can be evaluated anywhere.
use crate::errors::{GpError, Result};
use crate::kernels::Kernel;
use crate::linalg::{add_diagonal, cholesky, solve_triangular_vec};
use crate::means::MeanFunction;
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::{StandardNormal, Uniform};
use ndarray_rand::RandomExt;

/// A function sampled from the GP posterior
#[derive(Clone, Debug)]
pub struct FourierSample<F: Float, M: MeanFunction<F>> {
    w: Array2<F>,
    b: Array1<F>,
    theta: Array1<F>,
    scale: F,
    mean: M,
}

impl<F: Float, M: MeanFunction<F>> FourierSample<F, M> {
    /// Draw `n` features for inputs of dimension `dim` and weights conditioned on `data` if any
    pub(crate) fn new<K: Kernel<F>, R: Rng>(
        kernel: &K,
        mean: &M,
        sn2: F,
        data: Option<(&Array2<F>, &Array1<F>)>,
        n: usize,
        dim: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let w = kernel.sample_spectrum(n, dim, rng);
        let b = Array1::random_using(n, Uniform::new(0., 2. * std::f64::consts::PI), rng)
            .mapv(|v| F::cast(v));
        let z = Array1::<f64>::random_using(n, StandardNormal, rng).mapv(|v| F::cast(v));
        let mut sample = FourierSample {
            w,
            b,
            theta: z,
            scale: (F::cast(2.) * kernel.variance() / F::cast(n)).sqrt(),
            mean: mean.clone(),
        };
        if let Some((x, y)) = data {
            // θ | y ~ N(A⁻¹.Φᵀ.r, sn2.A⁻¹) with A = ΦᵀΦ + sn2.I
            let phi = sample.features(x);
            let r = y - &mean.value(x);
            let l = cholesky(&add_diagonal(phi.t().dot(&phi), sn2))?;
            let m = solve_triangular_vec(
                &l,
                &solve_triangular_vec(&l, &phi.t().dot(&r), false)?,
                true,
            )?;
            let noise = solve_triangular_vec(&l, &sample.theta, true)?;
            sample.theta = m + noise * sn2.sqrt();
        }
        Ok(sample)
    }

    fn phases(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        x.dot(&self.w.t()) + &self.b
    }

    fn features(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        self.phases(x).mapv(|v| self.scale * v.cos())
    }

    /// Number of random features
    pub fn n_features(&self) -> usize {
        self.b.len()
    }

    /// Input dimension of the sampled function
    pub fn input_dim(&self) -> usize {
        self.w.ncols()
    }

    fn check_inputs(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<()> {
        if x.ncols() != self.input_dim() {
            return Err(GpError::InvalidValueError(format!(
                "Inputs of dimension {} while sampled function is of dimension {}",
                x.ncols(),
                self.input_dim()
            )));
        }
        Ok(())
    }

    /// Function values at each row of `x`
    pub fn get(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.check_inputs(x)?;
        Ok(self.mean.value(x) + self.features(x).dot(&self.theta))
    }

    /// Function gradients at each row of `x`, shape (n, d)
    pub fn get_gradients(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        self.check_inputs(x)?;
        let dphi = self.phases(x).mapv(|v| -self.scale * v.sin()) * &self.theta;
        Ok(self.mean.gradx(x) + dphi.dot(&self.w))
    }
}
