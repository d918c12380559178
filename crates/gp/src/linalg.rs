//! Dense factorization helpers shared by the inference strategies.
//!
//! Factors are always lower triangular: [`cholesky`] returns `L` such that `L.Lᵀ = M`.
//! Triangular systems are solved by substitution, factors are never inverted explicitly
//! except in [`cholesky_inverse`] which is only needed for likelihood gradients.
use crate::errors::{GpError, Result};
use linfa::Float;
use linfa_linalg::{cholesky::*, triangular::*, LinalgError};
use ndarray::{s, Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, Zip};

/// Cholesky decomposition of a symmetric positive-definite matrix.
///
/// Fails with [`GpError::NumericalError`] when `m` is not positive-definite,
/// adding jitter beforehand with [`add_diagonal`] is left to the caller.
pub fn cholesky<F: Float>(m: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
    let n = m.nrows();
    if n != m.ncols() {
        return Err(GpError::InvalidValueError(format!(
            "Cholesky decomposition of a non square ({}, {}) matrix",
            n,
            m.ncols()
        )));
    }
    if n == 0 {
        return Ok(Array2::zeros((0, 0)));
    }
    let mut l = m.cholesky().map_err(|err| match err {
        LinalgError::NotPositiveDefinite => {
            GpError::NumericalError(format!("matrix ({n}, {n}) is not positive definite"))
        }
        err => GpError::LinalgError(err),
    })?;
    if l.iter().any(|v| !v.is_finite()) {
        return Err(GpError::NumericalError(format!(
            "non finite values in Cholesky factor of ({n}, {n}) matrix"
        )));
    }
    for i in 0..n {
        l.slice_mut(s![i, i + 1..]).fill(F::zero());
    }
    Ok(l)
}

/// Solve `L.X = B` (or `Lᵀ.X = B` when `transpose` is true) where `l` is lower triangular.
pub fn solve_triangular<F: Float>(
    l: &ArrayBase<impl Data<Elem = F>, Ix2>,
    b: &ArrayBase<impl Data<Elem = F>, Ix2>,
    transpose: bool,
) -> Result<Array2<F>> {
    if b.ncols() == 0 || l.nrows() == 0 {
        return Ok(Array2::zeros((l.ncols(), b.ncols())));
    }
    let x = if transpose {
        l.t().solve_triangular(b, UPLO::Upper)?
    } else {
        l.solve_triangular(b, UPLO::Lower)?
    };
    Ok(x)
}

/// Vector version of [`solve_triangular`].
pub fn solve_triangular_vec<F: Float>(
    l: &ArrayBase<impl Data<Elem = F>, Ix2>,
    b: &ArrayBase<impl Data<Elem = F>, Ix1>,
    transpose: bool,
) -> Result<Array1<F>> {
    let b = b.view().insert_axis(Axis(1));
    Ok(solve_triangular(l, &b, transpose)?.remove_axis(Axis(1)))
}

/// Add the scalar `v` to the diagonal of `m`.
pub fn add_diagonal<F: Float>(mut m: Array2<F>, v: F) -> Array2<F> {
    m.diag_mut().mapv_inplace(|d| d + v);
    m
}

/// Add the vector `v` element-wise to the diagonal of `m`.
pub fn add_diagonal_vec<F: Float>(
    mut m: Array2<F>,
    v: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Array2<F> {
    Zip::from(m.diag_mut()).and(v).for_each(|d, &v| *d += v);
    m
}

/// Block update of a Cholesky factorization.
///
/// Given `l` the factor of `K` (n, n), the cross block `b` (n, k), the new diagonal block
/// `c` (k, k) and the solve vector `a = L⁻¹.r`, returns the factor of `[[K, B], [Bᵀ, C]]`
/// together with the solve vector extended with the new residuals `r` (k).
/// Costs O(n².k) instead of refactoring the whole matrix.
pub fn cholesky_update<F: Float>(
    l: &ArrayBase<impl Data<Elem = F>, Ix2>,
    b: &ArrayBase<impl Data<Elem = F>, Ix2>,
    c: &ArrayBase<impl Data<Elem = F>, Ix2>,
    a: &ArrayBase<impl Data<Elem = F>, Ix1>,
    r: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<(Array2<F>, Array1<F>)> {
    let n = l.nrows();
    let k = c.nrows();
    if b.dim() != (n, k) || c.ncols() != k || a.len() != n || r.len() != k {
        return Err(GpError::InvalidValueError(format!(
            "Cholesky update with inconsistent blocks: L {:?}, B {:?}, C {:?}, a {}, r {}",
            l.dim(),
            b.dim(),
            c.dim(),
            a.len(),
            r.len()
        )));
    }

    // L21ᵀ = L⁻¹.B and L22 = chol(C - L21.L21ᵀ)
    let l21t = solve_triangular(l, b, false)?;
    let schur = c.to_owned() - l21t.t().dot(&l21t);
    let l22 = cholesky(&schur)?;
    let a2 = solve_triangular_vec(&l22, &(r.to_owned() - l21t.t().dot(a)), false)?;

    let mut lnew = Array2::zeros((n + k, n + k));
    lnew.slice_mut(s![..n, ..n]).assign(l);
    lnew.slice_mut(s![n.., ..n]).assign(&l21t.t());
    lnew.slice_mut(s![n.., n..]).assign(&l22);
    let mut anew = Array1::zeros(n + k);
    anew.slice_mut(s![..n]).assign(a);
    anew.slice_mut(s![n..]).assign(&a2);
    Ok((lnew, anew))
}

/// Inverse of `L.Lᵀ` given its Cholesky factor `l`.
pub fn cholesky_inverse<F: Float>(l: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
    let linv = solve_triangular(l, &Array2::eye(l.nrows()), false)?;
    solve_triangular(l, &linv, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;

    fn spd_matrix(n: usize, seed: u64) -> Array2<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let a = Array2::random_using((n, n), Uniform::new(-1., 1.), &mut rng);
        add_diagonal(a.dot(&a.t()), 0.5)
    }

    #[test]
    fn test_cholesky() {
        let m = spd_matrix(5, 42);
        let l = cholesky(&m).unwrap();
        assert_abs_diff_eq!(l.dot(&l.t()), m, epsilon = 1e-10);
        for i in 0..5 {
            for j in i + 1..5 {
                assert_eq!(l[[i, j]], 0.);
            }
        }
    }

    #[test]
    fn test_cholesky_not_positive_definite() {
        let m = array![[1., 2.], [2., 1.]];
        match cholesky(&m) {
            Err(GpError::NumericalError(_)) => (),
            res => panic!("expected numerical error, got {res:?}"),
        }
    }

    #[test]
    fn test_solve_triangular() {
        let m = spd_matrix(4, 1);
        let l = cholesky(&m).unwrap();
        let b = array![[1., 0.], [2., 1.], [-1., 3.], [0.5, 0.]];

        let x = solve_triangular(&l, &b, false).unwrap();
        assert_abs_diff_eq!(l.dot(&x), b, epsilon = 1e-10);
        let x = solve_triangular(&l, &b, true).unwrap();
        assert_abs_diff_eq!(l.t().dot(&x), b, epsilon = 1e-10);

        let v = solve_triangular_vec(&l, &b.column(1), true).unwrap();
        assert_abs_diff_eq!(l.t().dot(&v), b.column(1), epsilon = 1e-10);
    }

    #[test]
    fn test_add_diagonal() {
        let m = add_diagonal(Array2::<f64>::zeros((3, 3)), 2.);
        assert_abs_diff_eq!(m, Array2::eye(3) * 2.);
        let m = add_diagonal_vec(m, &array![1., 2., 3.]);
        assert_abs_diff_eq!(m.diag(), array![3., 4., 5.]);
        assert_eq!(m[[0, 1]], 0.);
    }

    #[test]
    fn test_cholesky_update_by_block() {
        let m = spd_matrix(7, 3);
        let r = array![0.3, -1., 2., 0.1, 0.7, -0.4, 1.5];
        let l = cholesky(&m).unwrap();
        let a = solve_triangular_vec(&l, &r, false).unwrap();

        let n = 4;
        let l0 = cholesky(&m.slice(s![..n, ..n])).unwrap();
        let a0 = solve_triangular_vec(&l0, &r.slice(s![..n]), false).unwrap();
        let (l1, a1) = cholesky_update(
            &l0,
            &m.slice(s![..n, n..]),
            &m.slice(s![n.., n..]),
            &a0,
            &r.slice(s![n..]),
        )
        .unwrap();
        assert_abs_diff_eq!(l1, l, epsilon = 1e-10);
        assert_abs_diff_eq!(a1, a, epsilon = 1e-10);
    }

    #[test]
    fn test_cholesky_update_by_row() {
        let m = spd_matrix(6, 7);
        let r = Array1::linspace(-1., 1., 6);
        let l = cholesky(&m).unwrap();
        let a = solve_triangular_vec(&l, &r, false).unwrap();

        let mut li = Array2::zeros((0, 0));
        let mut ai = Array1::zeros(0);
        for i in 0..6 {
            let (l1, a1) = cholesky_update(
                &li,
                &m.slice(s![..i, i..i + 1]),
                &m.slice(s![i..i + 1, i..i + 1]),
                &ai,
                &r.slice(s![i..i + 1]),
            )
            .unwrap();
            li = l1;
            ai = a1;
        }
        assert_abs_diff_eq!(li, l, epsilon = 1e-10);
        assert_abs_diff_eq!(ai, a, epsilon = 1e-10);
    }

    #[test]
    fn test_cholesky_update_inconsistent() {
        let l = Array2::<f64>::eye(2);
        let res = cholesky_update(
            &l,
            &Array2::zeros((3, 1)),
            &Array2::eye(1),
            &Array1::zeros(2),
            &Array1::zeros(1),
        );
        assert!(matches!(res, Err(GpError::InvalidValueError(_))));
    }

    #[test]
    fn test_cholesky_inverse() {
        let m = spd_matrix(5, 11);
        let l = cholesky(&m).unwrap();
        let inv = cholesky_inverse(&l).unwrap();
        assert_abs_diff_eq!(inv.dot(&m), Array2::eye(5), epsilon = 1e-8);
    }
}
