use linfa::prelude::*;
use ndarray::{concatenate, Array, Array1, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::{StandardNormal, Uniform};
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;
use reggie_gp::{BasicGp, Inference};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // noisy observations of x.sin(x) on [0, 10]
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let xt = Array::random_using((500, 1), Uniform::new(0., 10.), &mut rng);
    let noise = Array1::<f64>::random_using(500, StandardNormal, &mut rng) * 0.3;
    let yt = xt.column(0).mapv(|x: f64| x * x.sin()) + noise;

    // create the GP and optimize the model
    let mut gp = BasicGp::params(0.1, 1.0, 0.1, 0.0)
        .n_start(4)
        .seed(Some(42))
        .check()?
        .fit(&Dataset::new(xt, yt))?;
    gp.optimize()?;
    println!("Exact model: {gp}, log likelihood = {}", gp.get_loglike());

    // switch to a sparse model with inducing points on a grid and optimize again
    let u = Array1::linspace(0., 10., 100).insert_axis(Axis(1));
    gp.switch_inference(Inference::fitc(u))?;
    gp.optimize()?;
    println!("Sparse model: {gp}, log likelihood = {}", gp.get_loglike());

    // get the posterior moments
    let x = Array1::linspace(0., 10., 21).insert_axis(Axis(1));
    let (mu, s2) = gp.predict(&x)?;
    println!("Posterior (x, mu(x), 2.sigma(x))");
    println!(
        "{}",
        concatenate![
            Axis(1),
            x,
            mu.insert_axis(Axis(1)),
            s2.mapv(|v| 2. * v.sqrt()).insert_axis(Axis(1))
        ]
    );
    Ok(())
}
