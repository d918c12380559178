use crate::hyperparameters::{Domain, Prior};
use ndarray::{arr1, s, Array1, Array2, Zip};
use ndarray_rand::rand::seq::SliceRandom;
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

/// Half width of the free space search interval around the initial hyperparameters
/// when no uniform prior bounds them
pub(crate) const GP_OPTIM_FREE_RANGE: f64 = 10.;

pub(crate) struct CobylaParams {
    pub rhobeg: f64,
    pub ftol_rel: f64,
    pub maxeval: usize,
}

impl Default for CobylaParams {
    fn default() -> Self {
        CobylaParams {
            rhobeg: 0.5,
            ftol_rel: 1e-4,
            maxeval: 200,
        }
    }
}

/// Free space bounds of each hyperparameter: the image of its uniform prior support if any,
/// otherwise an interval of half width [GP_OPTIM_FREE_RANGE] around its initial free value.
pub(crate) fn free_bounds(
    free0: &Array1<f64>,
    domains: &[Domain],
    priors: &[Option<Prior<f64>>],
) -> Vec<(f64, f64)> {
    Zip::from(free0)
        .and(domains)
        .and(priors)
        .map_collect(|&u0, domain, prior| {
            let default = (u0 - GP_OPTIM_FREE_RANGE, u0 + GP_OPTIM_FREE_RANGE);
            match prior {
                Some(Prior::Uniform { lo, hi }) => {
                    let (lo, hi) = (domain.to_free(*lo), domain.to_free(*hi));
                    (
                        if lo.is_finite() { lo } else { default.0 },
                        if hi.is_finite() { hi } else { default.1 },
                    )
                }
                _ => default,
            }
        })
        .to_vec()
}

/// Multistart: given start point + `n_start` points of a latin hypercube within bounds
pub(crate) fn prepare_multistart<R: Rng>(
    n_start: usize,
    free0: &Array1<f64>,
    bounds: &[(f64, f64)],
    rng: &mut R,
) -> Array2<f64> {
    let mut starts = Array2::zeros((n_start + 1, free0.len()));
    starts.row_mut(0).assign(free0);
    if n_start > 0 {
        let unit = classic_lhs(n_start, free0.len(), rng);
        Zip::from(starts.slice_mut(s![1.., ..]).columns_mut())
            .and(unit.columns())
            .and(bounds)
            .for_each(|mut col, unit, (lo, hi)| {
                col.assign(&unit.mapv(|v| lo + v * (hi - lo)));
            });
    }
    starts
}

/// Latin hypercube of `ns` points in `[0, 1]^nx`: one point per stratum in each dimension
fn classic_lhs<R: Rng>(ns: usize, nx: usize, rng: &mut R) -> Array2<f64> {
    let cut = Array1::linspace(0., 1., ns + 1);
    let a = cut.slice(s![..ns]).to_owned();
    let c = &cut.slice(s![1..]) - &a;
    let rnd = Array2::random_using((ns, nx), Uniform::new(0., 1.), rng);
    let mut lhs = Array2::zeros((ns, nx));
    for (mut col, rnd) in lhs.columns_mut().into_iter().zip(rnd.columns()) {
        let mut points = (&rnd * &c + &a).to_vec();
        points.shuffle(rng);
        col.assign(&Array1::from_vec(points));
    }
    lhs
}

/// Minimize `objfn` given an initial guess and bounds with cobyla
pub(crate) fn optimize_params<ObjF>(
    objfn: ObjF,
    param0: &Array1<f64>,
    bounds: &[(f64, f64)],
    cobyla: CobylaParams,
) -> (f64, Array1<f64>)
where
    ObjF: Fn(&[f64], &mut ()) -> f64,
{
    use cobyla::{minimize, Func, StopTols};

    let cons: Vec<&dyn Func<()>> = vec![];
    let param0 = param0.to_vec();

    match minimize(
        |x, u| objfn(x, u),
        &param0,
        bounds,
        &cons,
        (),
        cobyla.maxeval,
        cobyla::RhoBeg::All(cobyla.rhobeg),
        Some(StopTols {
            ftol_rel: cobyla.ftol_rel,
            ..StopTols::default()
        }),
    ) {
        Ok((_, x_opt, fval)) => {
            let params_opt = arr1(&x_opt);
            let fval = if f64::is_nan(fval) {
                f64::INFINITY
            } else {
                fval
            };
            (fval, params_opt)
        }
        Err((status, x_opt, _)) => {
            log::warn!("ERROR Cobyla optimizer in GP status={status:?}");
            (f64::INFINITY, arr1(&x_opt))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn test_free_bounds() {
        let free0 = array![0., 1.];
        let bounds = free_bounds(
            &free0,
            &[Domain::Positive, Domain::Real],
            &[Some(Prior::Uniform { lo: 1., hi: 10. }), None],
        );
        assert_abs_diff_eq!(bounds[0].0, 0.);
        assert_abs_diff_eq!(bounds[0].1, 10f64.ln());
        assert_abs_diff_eq!(bounds[1].0, 1. - GP_OPTIM_FREE_RANGE);
        assert_abs_diff_eq!(bounds[1].1, 1. + GP_OPTIM_FREE_RANGE);
    }

    #[test]
    fn test_prepare_multistart() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let free0 = array![0.5, -1.];
        let bounds = [(0., 1.), (-3., 3.)];
        let starts = prepare_multistart(10, &free0, &bounds, &mut rng);
        assert_eq!(starts.dim(), (11, 2));
        assert_abs_diff_eq!(starts.row(0), free0);
        for row in starts.rows() {
            assert!((0. ..=1.).contains(&row[0]));
            assert!((-3. ..=3.).contains(&row[1]));
        }
    }

    #[test]
    fn test_multistart_strata() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let bounds = [(0., 5.), (-2., 2.), (10., 20.)];
        let starts = prepare_multistart(5, &array![1., 0., 15.], &bounds, &mut rng);
        for (col, (lo, hi)) in starts.slice(s![1.., ..]).columns().into_iter().zip(bounds) {
            let mut strata: Vec<usize> = col
                .iter()
                .map(|v| ((v - lo) / (hi - lo) * 5.).floor() as usize)
                .collect();
            strata.sort_unstable();
            assert_eq!(strata, vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_optimize_params() {
        let objfn = |x: &[f64], _: &mut ()| (x[0] - 1.).powi(2) + (x[1] + 0.5).powi(2);
        let (fmin, xmin) = optimize_params(
            objfn,
            &array![0., 0.],
            &[(-2., 2.), (-2., 2.)],
            CobylaParams::default(),
        );
        assert_abs_diff_eq!(fmin, 0., epsilon = 1e-4);
        assert_abs_diff_eq!(xmin, array![1., -0.5], epsilon = 1e-2);
    }
}
