use criterion::{criterion_group, criterion_main, Criterion};
use linfa::prelude::{Dataset, Fit, ParamGuard};
use ndarray::{s, Array1, Array2, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;
use reggie_gp::{BasicGp, GaussianProcess, Inference};

fn griewank(x: &Array2<f64>) -> Array1<f64> {
    let dim = x.ncols();
    let d = Array1::linspace(1., dim as f64, dim).mapv(|v| v.sqrt());
    x.map_axis(Axis(1), |x| {
        x.mapv(|v| v * v).sum() / 4000. - (&x / &d).mapv(|v| v.cos()).fold(1., |acc, x| acc * x)
            + 1.0
    })
}

fn criterion_gp(c: &mut Criterion) {
    let _ = env_logger::try_init();
    let dims = [2, 5];
    let nts = [200, 400];

    let mut group = c.benchmark_group("gp");
    group.sample_size(20);
    for (&dim, &nt) in dims.iter().zip(nts.iter()) {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let xt = Array2::random_using((nt, dim), Uniform::new(-10., 10.), &mut rng);
        let yt = griewank(&xt);
        let u = Array2::random_using((nt / 10, dim), Uniform::new(-10., 10.), &mut rng);
        let params = BasicGp::params(1e-2, 1., 3., 0.).check().unwrap();
        let nold = nt - 10;

        group.bench_function(format!("exact update {dim}D {nt}"), |b| {
            b.iter(|| std::hint::black_box(params.fit(&Dataset::new(xt.clone(), yt.clone()))))
        });

        let mut gp = GaussianProcess::new(params.clone());
        gp.add_data(&xt.slice(s![..nold, ..]), &yt.slice(s![..nold]))
            .unwrap();
        group.bench_function(format!("exact incremental update {dim}D {nt}"), |b| {
            b.iter(|| {
                let mut gp = gp.clone();
                std::hint::black_box(
                    gp.add_data(&xt.slice(s![nold.., ..]), &yt.slice(s![nold..])),
                )
            })
        });

        let fitc = BasicGp::new_from_valid(&params)
            .inference(Inference::fitc(u.clone()))
            .check()
            .unwrap();
        group.bench_function(format!("fitc update {dim}D {nt} m={}", u.nrows()), |b| {
            b.iter(|| std::hint::black_box(fitc.fit(&Dataset::new(xt.clone(), yt.clone()))))
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_gp);
criterion_main!(benches);
