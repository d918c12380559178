//! A module for prior mean functions of the GP model.
//!
//! The following mean functions are implemented:
//! * constant,
//! * linear.

use crate::hyperparameters::{vector_names, Domain, Parameterized};
use linfa::Float;
use ndarray::{s, Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix2};
use std::fmt;

/// A trait for using a prior mean function in GP regression
pub trait MeanFunction<F: Float>:
    Parameterized<F> + Clone + fmt::Debug + fmt::Display + Send + Sync
{
    /// Mean value at each row of `x`
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F>;

    /// Derivatives of the mean values with respect to each hyperparameter
    fn grad(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<Array1<F>>;

    /// Derivatives of the mean values with respect to the input coordinates, shape (n, d)
    fn gradx(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F>;

    /// Input dimension fixed by the parameters, `None` when any dimension fits
    fn input_dim(&self) -> Option<usize> {
        None
    }
}

/// Constant mean `m(x) = mean`
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ConstantMean<F: Float> {
    mean: F,
}

impl<F: Float> ConstantMean<F> {
    /// Constant mean of given value
    pub fn new(mean: F) -> Self {
        ConstantMean { mean }
    }

    /// Mean value
    pub fn mean(&self) -> F {
        self.mean
    }
}

impl<F: Float> fmt::Display for ConstantMean<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Constant(mean={})", self.mean)
    }
}

impl<F: Float> Parameterized<F> for ConstantMean<F> {
    fn params(&self) -> Array1<F> {
        Array1::from_elem(1, self.mean)
    }

    fn set_params(&mut self, params: &ArrayView1<F>) {
        self.mean = params[0];
    }

    fn domains(&self) -> Vec<Domain> {
        vec![Domain::Real]
    }

    fn param_names(&self) -> Vec<String> {
        vec!["mean".to_string()]
    }
}

impl<F: Float> MeanFunction<F> for ConstantMean<F> {
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        Array1::from_elem(x.nrows(), self.mean)
    }

    fn grad(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<Array1<F>> {
        vec![Array1::ones(x.nrows())]
    }

    fn gradx(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        Array2::zeros(x.dim())
    }
}

/// Linear mean `m(x) = bias + x.weights`
#[derive(Clone, Debug, PartialEq)]
pub struct LinearMean<F: Float> {
    bias: F,
    weights: Array1<F>,
}

impl<F: Float> LinearMean<F> {
    /// Linear mean with given bias and one weight per input dimension
    pub fn new(bias: F, weights: Array1<F>) -> Self {
        LinearMean { bias, weights }
    }

    /// Bias
    pub fn bias(&self) -> F {
        self.bias
    }

    /// Weights
    pub fn weights(&self) -> &Array1<F> {
        &self.weights
    }
}

impl<F: Float> fmt::Display for LinearMean<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Linear(bias={}, weights={})", self.bias, self.weights)
    }
}

impl<F: Float> Parameterized<F> for LinearMean<F> {
    fn params(&self) -> Array1<F> {
        let mut params = Array1::zeros(1 + self.weights.len());
        params[0] = self.bias;
        params.slice_mut(s![1..]).assign(&self.weights);
        params
    }

    fn set_params(&mut self, params: &ArrayView1<F>) {
        self.bias = params[0];
        self.weights.assign(&params.slice(s![1..]));
    }

    fn domains(&self) -> Vec<Domain> {
        vec![Domain::Real; 1 + self.weights.len()]
    }

    fn param_names(&self) -> Vec<String> {
        let mut names = vec!["bias".to_string()];
        names.extend(vector_names("weights", self.weights.len()));
        names
    }
}

impl<F: Float> MeanFunction<F> for LinearMean<F> {
    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        x.dot(&self.weights) + self.bias
    }

    fn grad(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Vec<Array1<F>> {
        let mut grads = vec![Array1::ones(x.nrows())];
        grads.extend(x.axis_iter(Axis(1)).map(|col| col.to_owned()));
        grads
    }

    fn gradx(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        self.weights
            .broadcast(x.dim())
            .map_or_else(|| Array2::zeros(x.dim()), |w| w.to_owned())
    }

    fn input_dim(&self) -> Option<usize> {
        Some(self.weights.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_constant_mean() {
        let mean = ConstantMean::new(1.5);
        let x = array![[0., 1.], [2., 3.], [4., 5.]];
        assert_abs_diff_eq!(mean.value(&x), array![1.5, 1.5, 1.5]);
        assert_abs_diff_eq!(mean.grad(&x)[0], array![1., 1., 1.]);
        assert_abs_diff_eq!(mean.gradx(&x), Array2::zeros((3, 2)));
        assert_eq!(mean.param_names(), vec!["mean"]);
    }

    #[test]
    fn test_linear_mean() {
        let mut mean = LinearMean::new(1., array![2., -1.]);
        let x = array![[0., 1.], [2., 3.]];
        assert_abs_diff_eq!(mean.value(&x), array![0., 2.]);
        assert_abs_diff_eq!(mean.gradx(&x), array![[2., -1.], [2., -1.]]);

        let grads = mean.grad(&x);
        assert_eq!(grads.len(), mean.nparams());
        assert_abs_diff_eq!(grads[2], array![1., 3.]);

        mean.set_params(&array![0., 1., 1.].view());
        assert_abs_diff_eq!(mean.value(&x), array![1., 5.]);
        assert_eq!(mean.param_names(), vec!["bias", "weights[0]", "weights[1]"]);
        assert_eq!(mean.input_dim(), Some(2));
    }
}
