use super::{gaussian_loglike, Posterior};
use crate::errors::Result;
use crate::kernels::Kernel;
use crate::linalg::{
    add_diagonal, cholesky, cholesky_inverse, cholesky_update, solve_triangular_vec,
};
use crate::means::MeanFunction;
use linfa::Float;
use log::debug;
use ndarray::{s, Array1, ArrayBase, Axis, Data, Ix1, Ix2};
use std::time::Instant;

/// Exact GP inference: `L` factors `k(X, X) + sn2.I` over all `n` observations.
#[derive(Clone, Debug, PartialEq)]
pub struct ExactInference<F: Float> {
    posterior: Option<Posterior<F>>,
}

impl<F: Float> Default for ExactInference<F> {
    fn default() -> Self {
        ExactInference { posterior: None }
    }
}

impl<F: Float> ExactInference<F> {
    /// Posterior statistics, `None` until data is observed
    pub fn posterior(&self) -> Option<&Posterior<F>> {
        self.posterior.as_ref()
    }

    pub(crate) fn init(&mut self) {
        self.posterior = None;
    }

    pub(crate) fn update<K: Kernel<F>, M: MeanFunction<F>>(
        &mut self,
        kernel: &K,
        mean: &M,
        sn2: F,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()> {
        if x.nrows() == 0 {
            self.init();
            return Ok(());
        }
        let now = Instant::now();
        let k = add_diagonal(kernel.kernel(x, x), sn2);
        let r = y.to_owned() - mean.value(x);
        let l = cholesky(&k)?;
        let a = solve_triangular_vec(&l, &r, false)?;
        let loglike = gaussian_loglike(&l, &a);
        debug!(
            "Exact inference update ({} points) in {:?}",
            x.nrows(),
            now.elapsed()
        );
        self.posterior = Some(Posterior::new(l, a, None, loglike));
        Ok(())
    }

    pub(crate) fn update_incremental<K: Kernel<F>, M: MeanFunction<F>>(
        &mut self,
        kernel: &K,
        mean: &M,
        sn2: F,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        n_old: usize,
    ) -> Result<()> {
        let post = match &self.posterior {
            Some(post) if post.l().nrows() == n_old && n_old > 0 => post,
            _ => return self.update(kernel, mean, sn2, x, y),
        };
        let now = Instant::now();
        let x_old = x.slice(s![..n_old, ..]);
        let x_new = x.slice(s![n_old.., ..]);
        let b = kernel.kernel(&x_old, &x_new);
        let c = add_diagonal(kernel.kernel(&x_new, &x_new), sn2);
        let r = y.slice(s![n_old..]).to_owned() - mean.value(&x_new);
        let (l, a) = cholesky_update(post.l(), &b, &c, post.a(), &r)?;
        let loglike = gaussian_loglike(&l, &a);
        debug!(
            "Exact inference incremental update ({} + {} points) in {:?}",
            n_old,
            x_new.nrows(),
            now.elapsed()
        );
        self.posterior = Some(Posterior::new(l, a, None, loglike));
        Ok(())
    }

    /// Gradient through `Q = L⁻ᵀL⁻¹ - α.αᵀ` with `α = L⁻ᵀ.a`:
    /// `-tr(Q)/2` for the noise, `-sum(Q∘dK)/2` per kernel parameter, `dmᵀ.α` per mean parameter.
    pub(crate) fn loglike_gradient<K: Kernel<F>, M: MeanFunction<F>>(
        &self,
        kernel: &K,
        mean: &M,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Option<Array1<F>>> {
        let post = match &self.posterior {
            Some(post) => post,
            None => return Ok(None),
        };
        let half = F::cast(0.5);
        let alpha = solve_triangular_vec(post.l(), post.a(), true)?;
        let outer = alpha
            .view()
            .insert_axis(Axis(1))
            .dot(&alpha.view().insert_axis(Axis(0)));
        let q = cholesky_inverse(post.l())? - outer;

        let mut grad = vec![-half * q.diag().sum()];
        grad.extend(
            kernel
                .grad(x)
                .iter()
                .map(|dk| -half * (&q * dk).sum()),
        );
        grad.extend(mean.grad(x).iter().map(|dm| dm.dot(&alpha)));
        Ok(Some(Array1::from_vec(grad)))
    }
}
