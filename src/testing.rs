//! Shared fixtures for the unit tests

use crate::error::Result;
use crate::objective::Evaluation;
use crate::param::{flatten_values, unflatten, Param};
use ndarray::prelude::*;
use ndarray_rand::rand_distr::{Normal, Uniform};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub const A: f64 = 2.;
pub const B: f64 = -1.;
pub const C: f64 = 5.;

/// Rows of `(y, x)` with `x ~ U(-3, 3)` and `y = 2x^2 - x + 5 + N(0, 0.1^2)`.
pub fn make_quadratic(seed: u64) -> Array2<f64> {
    let n = 1000;
    let mut rng = StdRng::seed_from_u64(seed);
    let x = Array1::random_using(n, Uniform::new(-3., 3.), &mut rng);
    let noise = Array1::random_using(n, Normal::new(0., 0.1).unwrap(), &mut rng);
    let y = x.mapv(|x| A * x * x + B * x + C) + noise;
    Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { y[i] } else { x[i] })
}

/// Mean squared error of `a x^2 + b x + c`, for `w` holding `(a, b, c)` in
/// traversal order. The gradient is always returned flat.
pub fn qobj(w: &Param<f64>, data: &Array2<f64>, grad: bool) -> Result<Evaluation<f64>> {
    let w = flatten_values(w);
    let (a, b, c) = (w[0], w[1], w[2]);
    let y = data.column(0);
    let x = data.column(1);
    let n = data.nrows() as f64;

    let u = &y - &x.mapv(|x| a * x * x + b * x + c);
    let f = u.dot(&u) / n;
    if !grad {
        return Ok(Evaluation::value(f));
    }
    let x2 = x.mapv(|x| x * x);
    let df = array![x2.dot(&u), x.dot(&u), u.sum()] * (-2. / n);
    Ok(Evaluation::with_grad(f, df))
}

/// [`qobj`] with the gradient shaped like `w`.
pub fn qobj_struc(w: &Param<f64>, data: &Array2<f64>, grad: bool) -> Result<Evaluation<f64>> {
    let evaluation = qobj(w, data, grad)?;
    let grad = match evaluation.grad {
        Some(g) => Some(unflatten(flatten_values(&g).view(), &w.shape())?),
        None => None,
    };
    Ok(Evaluation {
        value: evaluation.value,
        grad,
    })
}

/// `[(a, b), c]`
pub fn structured(a: f64, b: f64, c: f64) -> Param<f64> {
    Param::seq(vec![Param::vector(array![a, b]), Param::scalar(c)])
}
