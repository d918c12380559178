//! Observation model of the GP.
use crate::hyperparameters::{Domain, Parameterized};
use linfa::Float;
use ndarray::{Array, Array1, ArrayBase, ArrayView1, Data, Dimension};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use std::fmt;

/// Gaussian noise model `y = f + e` with `e ~ N(0, sn2)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gaussian<F: Float> {
    sn2: F,
}

impl<F: Float> Gaussian<F> {
    /// Gaussian noise of variance `sn2`
    pub fn new(sn2: F) -> Self {
        Gaussian { sn2 }
    }

    /// Noise variance
    pub fn sn2(&self) -> F {
        self.sn2
    }

    /// Draw noisy observations given latent function values `f`
    pub fn sample<D: Dimension, R: Rng>(
        &self,
        f: &ArrayBase<impl Data<Elem = F>, D>,
        rng: &mut R,
    ) -> Array<F, D> {
        let sn = self.sn2.sqrt();
        let e: Array<f64, D> = Array::random_using(f.raw_dim(), StandardNormal, rng);
        e.mapv(|v| F::cast(v) * sn) + f
    }
}

impl<F: Float> fmt::Display for Gaussian<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Gaussian(sn2={})", self.sn2)
    }
}

impl<F: Float> Parameterized<F> for Gaussian<F> {
    fn params(&self) -> Array1<F> {
        Array1::from_elem(1, self.sn2)
    }

    fn set_params(&mut self, params: &ArrayView1<F>) {
        self.sn2 = params[0];
    }

    fn domains(&self) -> Vec<Domain> {
        vec![Domain::Positive]
    }

    fn param_names(&self) -> Vec<String> {
        vec!["sn2".to_string()]
    }
}
