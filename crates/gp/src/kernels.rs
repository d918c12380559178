//! A module for stationary covariance functions used as GP prior.
//!
//! The following kernels are implemented, each one with a variance `rho` and
//! isotropic or ARD lengthscales `ell`:
//! * squared exponential,
//! * matern 3/2,
//! * matern 5/2.
//!
//! With `r = ||(x - x') / ell||` the covariance reads `k(x, x') = rho * g(r)`.

use crate::hyperparameters::{vector_names, Domain, Parameterized};
use linfa::Float;
use ndarray::{s, Array1, Array2, Array3, ArrayBase, ArrayView1, Axis, Data, Ix2, Zip};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use std::fmt;
use std::marker::PhantomData;

/// A trait for using a covariance function in GP regression
pub trait Kernel<F: Float>:
    Parameterized<F> + Clone + fmt::Debug + fmt::Display + Send + Sync
{
    /// Covariance matrix `k(x1, x2)` of shape (n1, n2)
    fn kernel(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F>;

    /// Prior variance `k(x, x)` at each row of `x`
    fn dkernel(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F>;

    /// Derivatives of `k(x, x)` with respect to each hyperparameter, in [Parameterized::params] order
    fn grad(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<Array2<F>>;

    /// Derivatives of `k(x1, x2)` with respect to the coordinates of `x1`, shape (n1, n2, d).
    /// The prior variance of a stationary kernel does not depend on `x`.
    fn gradx(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array3<F>;

    /// Draw `n` frequencies of dimension `dim` from the normalized spectral density, shape (n, dim)
    fn sample_spectrum<R: Rng>(&self, n: usize, dim: usize, rng: &mut R) -> Array2<F>;

    /// Signal variance, `k(x, x)` for any `x`
    fn variance(&self) -> F;

    /// Input dimension fixed by the kernel parameters (ARD lengthscales), `None` when isotropic
    fn input_dim(&self) -> Option<usize>;
}

/// Radial profile `g(r)` of a stationary kernel
pub trait Profile: Clone + Copy + Default + fmt::Debug + PartialEq + Send + Sync {
    /// Kernel name
    const NAME: &'static str;
    /// Matern smoothness, `None` for the squared exponential
    const NU: Option<f64>;

    /// Returns `g(r)` and `g'(r) / r`
    fn eval<F: Float>(r: F) -> (F, F);
}

/// Squared exponential profile `exp(-r²/2)`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SquaredExponentialProfile;

impl Profile for SquaredExponentialProfile {
    const NAME: &'static str = "SquaredExponential";
    const NU: Option<f64> = None;

    fn eval<F: Float>(r: F) -> (F, F) {
        let g = (F::cast(-0.5) * r * r).exp();
        (g, -g)
    }
}

/// Matern 3/2 profile `(1 + √3r).exp(-√3r)`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Matern32Profile;

impl Profile for Matern32Profile {
    const NAME: &'static str = "Matern32";
    const NU: Option<f64> = Some(1.5);

    fn eval<F: Float>(r: F) -> (F, F) {
        let s = F::cast(3.).sqrt() * r;
        let e = (-s).exp();
        ((F::one() + s) * e, F::cast(-3.) * e)
    }
}

/// Matern 5/2 profile `(1 + √5r + 5r²/3).exp(-√5r)`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Matern52Profile;

impl Profile for Matern52Profile {
    const NAME: &'static str = "Matern52";
    const NU: Option<f64> = Some(2.5);

    fn eval<F: Float>(r: F) -> (F, F) {
        let s = F::cast(5.).sqrt() * r;
        let e = (-s).exp();
        (
            (F::one() + s + s * s / F::cast(3.)) * e,
            F::cast(-5. / 3.) * (F::one() + s) * e,
        )
    }
}

/// Stationary kernel `rho * g(||(x - x') / ell||)`
#[derive(Clone, Debug, PartialEq)]
pub struct Stationary<F: Float, P: Profile> {
    rho: F,
    ell: Array1<F>,
    profile: PhantomData<P>,
}

/// Squared exponential kernel
pub type SquaredExponential<F> = Stationary<F, SquaredExponentialProfile>;
/// Matern 3/2 kernel
pub type Matern32<F> = Stationary<F, Matern32Profile>;
/// Matern 5/2 kernel
pub type Matern52<F> = Stationary<F, Matern52Profile>;

impl<F: Float, P: Profile> Default for Stationary<F, P> {
    fn default() -> Self {
        Self::new(F::one(), F::one())
    }
}

impl<F: Float, P: Profile> Stationary<F, P> {
    /// Isotropic kernel with variance `rho` and lengthscale `ell`
    pub fn new(rho: F, ell: F) -> Self {
        Self::ard(rho, Array1::from_elem(1, ell))
    }

    /// Kernel with variance `rho` and one lengthscale per input dimension
    pub fn ard(rho: F, ell: Array1<F>) -> Self {
        Stationary {
            rho,
            ell,
            profile: PhantomData,
        }
    }

    /// Signal variance
    pub fn rho(&self) -> F {
        self.rho
    }

    /// Lengthscales
    pub fn ell(&self) -> &Array1<F> {
        &self.ell
    }

    fn ell_full(&self, dim: usize) -> Array1<F> {
        if self.ell.len() == 1 {
            Array1::from_elem(dim, self.ell[0])
        } else {
            self.ell.to_owned()
        }
    }

    /// Scaled differences `(x1_i - x2_j) / ell` of shape (n1, n2, d)
    fn scaled_differences(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array3<F> {
        let ell = self.ell_full(x1.ncols());
        let x1s = x1.to_owned() / &ell;
        let x2s = x2.to_owned() / &ell;
        let mut u = Array3::zeros((x1.nrows(), x2.nrows(), x1.ncols()));
        Zip::from(u.axis_iter_mut(Axis(0)))
            .and(x1s.rows())
            .par_for_each(|mut ui, a| {
                Zip::from(ui.rows_mut())
                    .and(x2s.rows())
                    .for_each(|mut uij, b| uij.assign(&(&a - &b)));
            });
        u
    }
}

fn norms<F: Float>(u: &Array3<F>) -> Array2<F> {
    u.map_axis(Axis(2), |v| v.dot(&v).sqrt())
}

impl<F: Float, P: Profile> fmt::Display for Stationary<F, P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(rho={}, ell={})", P::NAME, self.rho, self.ell)
    }
}

impl<F: Float, P: Profile> Parameterized<F> for Stationary<F, P> {
    fn params(&self) -> Array1<F> {
        let mut params = Array1::zeros(1 + self.ell.len());
        params[0] = self.rho;
        params.slice_mut(s![1..]).assign(&self.ell);
        params
    }

    fn set_params(&mut self, params: &ArrayView1<F>) {
        self.rho = params[0];
        self.ell.assign(&params.slice(s![1..]));
    }

    fn domains(&self) -> Vec<Domain> {
        vec![Domain::Positive; 1 + self.ell.len()]
    }

    fn param_names(&self) -> Vec<String> {
        let mut names = vec!["rho".to_string()];
        names.extend(vector_names("ell", self.ell.len()));
        names
    }
}

impl<F: Float, P: Profile> Kernel<F> for Stationary<F, P> {
    fn kernel(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array2<F> {
        let r = norms(&self.scaled_differences(x1, x2));
        r.mapv(|r| self.rho * P::eval(r).0)
    }

    fn dkernel(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        Array1::from_elem(x.nrows(), self.rho)
    }

    fn grad(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<Array2<F>> {
        let u = self.scaled_differences(x, x);
        let r = norms(&u);
        let mut grads = vec![r.mapv(|r| P::eval(r).0)];
        if self.ell.len() == 1 {
            let ell = self.ell[0];
            grads.push(r.mapv(|r| -self.rho * P::eval(r).1 * r * r / ell));
        } else {
            for (k, &ell) in self.ell.iter().enumerate() {
                grads.push(
                    Zip::from(&r)
                        .and(u.index_axis(Axis(2), k))
                        .map_collect(|&r, &u| -self.rho * P::eval(r).1 * u * u / ell),
                );
            }
        }
        grads
    }

    fn gradx(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Array3<F> {
        let ell = self.ell_full(x1.ncols());
        let mut dk = self.scaled_differences(x1, x2);
        let r = norms(&dk);
        Zip::from(dk.lanes_mut(Axis(2)))
            .and(&r)
            .for_each(|mut lane, &r| {
                let h = P::eval(r).1;
                Zip::from(&mut lane)
                    .and(&ell)
                    .for_each(|v, &l| *v = self.rho * h * *v / l);
            });
        dk
    }

    fn sample_spectrum<R: Rng>(&self, n: usize, dim: usize, rng: &mut R) -> Array2<F> {
        let mut w: Array2<f64> = Array2::random_using((n, dim), StandardNormal, rng);
        if let Some(nu) = P::NU {
            // Student-t with 2nu degrees of freedom: z / sqrt(chi2(2nu) / 2nu)
            let dof = (2. * nu) as usize;
            for mut row in w.rows_mut() {
                let chi2: f64 = (0..dof)
                    .map(|_| {
                        let e: f64 = rng.sample(StandardNormal);
                        e * e
                    })
                    .sum();
                let scale = (chi2 / (2. * nu)).sqrt();
                row.mapv_inplace(|v| v / scale);
            }
        }
        w.mapv(|v| F::cast(v)) / &self.ell_full(dim)
    }

    fn variance(&self) -> F {
        self.rho
    }

    fn input_dim(&self) -> Option<usize> {
        if self.ell.len() > 1 {
            Some(self.ell.len())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand::SeedableRng;
    use paste::paste;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn test_squared_exponential() {
        let kernel = SquaredExponential::new(2., 0.5);
        let x1 = array![[0., 0.], [1., 0.]];
        let x2 = array![[0., 1.]];
        let k = kernel.kernel(&x1, &x2);
        assert_abs_diff_eq!(k[[0, 0]], 2. * (-2.0f64).exp(), epsilon = 1e-12);
        assert_abs_diff_eq!(k[[1, 0]], 2. * (-4.0f64).exp(), epsilon = 1e-12);
        assert_eq!(kernel.param_names(), vec!["rho", "ell"]);
        assert_eq!(kernel.input_dim(), None);
    }

    #[test]
    fn test_matern_profiles() {
        let r = 0.7f64;
        let (g, _) = Matern32Profile::eval(r);
        let s = 3f64.sqrt() * r;
        assert_abs_diff_eq!(g, (1. + s) * (-s).exp(), epsilon = 1e-12);
        let (g, _) = Matern52Profile::eval(r);
        let s = 5f64.sqrt() * r;
        assert_abs_diff_eq!(g, (1. + s + s * s / 3.) * (-s).exp(), epsilon = 1e-12);
        // all profiles are normalized
        assert_abs_diff_eq!(SquaredExponentialProfile::eval(0f64).0, 1.);
        assert_abs_diff_eq!(Matern32Profile::eval(0f64).0, 1.);
        assert_abs_diff_eq!(Matern52Profile::eval(0f64).0, 1.);
    }

    #[test]
    fn test_params_roundtrip() {
        let mut kernel = Matern52::ard(1., array![1., 2., 3.]);
        assert_eq!(kernel.nparams(), 4);
        assert_eq!(kernel.param_names()[3], "ell[2]");
        kernel.set_params(&array![0.5, 0.1, 0.2, 0.3].view());
        assert_abs_diff_eq!(kernel.params(), array![0.5, 0.1, 0.2, 0.3]);
        assert_eq!(kernel.input_dim(), Some(3));
        assert!(format!("{kernel}").starts_with("Matern52(rho=0.5, ell="));
    }

    macro_rules! test_kernel {
        ($kernel:ident) => {
            paste! {
                #[test]
                fn [<test_ $kernel:snake _symmetry>]() {
                    let kernel = $kernel::<f64>::ard(1.3, array![0.8, 1.7]);
                    let x = array![[0.1, 0.2], [0.5, -0.3], [1.2, 0.9], [-0.4, 0.4]];
                    let k = kernel.kernel(&x, &x);
                    assert_abs_diff_eq!(k, k.t(), epsilon = 1e-12);
                    assert_abs_diff_eq!(k.diag(), kernel.dkernel(&x), epsilon = 1e-12);
                }

                #[test]
                fn [<test_ $kernel:snake _grad>]() {
                    let x = array![[0.1, 0.2], [0.5, -0.3], [1.2, 0.9]];
                    for kernel in [$kernel::<f64>::new(1.3, 0.7), $kernel::<f64>::ard(1.3, array![0.8, 1.7])] {
                        let grads = kernel.grad(&x);
                        assert_eq!(grads.len(), kernel.nparams());
                        let p0 = kernel.params();
                        let e = 1e-6;
                        for (i, grad) in grads.iter().enumerate() {
                            let mut kp = kernel.clone();
                            let mut p = p0.clone();
                            p[i] += e;
                            kp.set_params(&p.view());
                            let mut km = kernel.clone();
                            let mut p = p0.clone();
                            p[i] -= e;
                            km.set_params(&p.view());
                            let fd = (kp.kernel(&x, &x) - km.kernel(&x, &x)) / (2. * e);
                            assert_abs_diff_eq!(*grad, fd, epsilon = 1e-6);
                        }
                    }
                }

                #[test]
                fn [<test_ $kernel:snake _gradx>]() {
                    let kernel = $kernel::<f64>::ard(1.3, array![0.8, 1.7]);
                    let x1 = array![[0.1, 0.2], [0.5, -0.3]];
                    let x2 = array![[1.2, 0.9], [-0.4, 0.4], [0.3, 0.1]];
                    let dk = kernel.gradx(&x1, &x2);
                    assert_eq!(dk.dim(), (2, 3, 2));
                    let e = 1e-6;
                    for k in 0..2 {
                        let mut xp = x1.clone();
                        xp.column_mut(k).mapv_inplace(|v| v + e);
                        let mut xm = x1.clone();
                        xm.column_mut(k).mapv_inplace(|v| v - e);
                        let fd = (kernel.kernel(&xp, &x2) - kernel.kernel(&xm, &x2)) / (2. * e);
                        assert_abs_diff_eq!(dk.index_axis(Axis(2), k), fd, epsilon = 1e-6);
                    }
                }

                #[test]
                fn [<test_ $kernel:snake _spectrum>]() {
                    let kernel = $kernel::<f64>::ard(1., array![0.8, 1.7]);
                    let mut rng = Xoshiro256Plus::seed_from_u64(42);
                    let w = kernel.sample_spectrum(20000, 2, &mut rng);
                    let x = array![[0.3, -0.5]];
                    let origin = array![[0., 0.]];
                    let expected = kernel.kernel(&x, &origin)[[0, 0]];
                    let estimate = w.dot(&x.row(0)).mapv(f64::cos).mean().unwrap();
                    assert_abs_diff_eq!(estimate, expected, epsilon = 3e-2);
                }
            }
        };
    }

    test_kernel!(SquaredExponential);
    test_kernel!(Matern32);
    test_kernel!(Matern52);
}
