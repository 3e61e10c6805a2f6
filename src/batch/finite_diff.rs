use crate::error::Result;
use ndarray::prelude::*;
use ndarray::NdFloat;

/// Central-difference gradient of `func` at `x`, where `f0 = func(x)`.
///
/// The probe of element `i` spans $`x_i \pm h_i`$ with
/// $`h_i = \mathrm{step} \cdot \max(1, |x_i|)`$, cut back to the box so the
/// objective is never evaluated outside it. Next to a bound this falls back
/// to a one-sided difference reusing `f0`.
pub(crate) fn gradient<S: NdFloat>(
    func: &mut dyn FnMut(ArrayView1<S>) -> Result<S>,
    x: ArrayView1<S>,
    f0: S,
    step: S,
    bounds: Option<(&Array1<S>, &Array1<S>)>,
) -> Result<Array1<S>> {
    let n = x.len();
    let mut probe = x.to_owned();
    let mut grad = Array1::zeros(n);
    for i in 0..n {
        let xi = x[i];
        let h = step * xi.abs().max(S::one());
        let (lo, hi) = bounds.map_or((S::neg_infinity(), S::infinity()), |(l, u)| (l[i], u[i]));
        let a = (xi - h).max(lo);
        let b = (xi + h).min(hi);
        if !(b > a) {
            // degenerate box
            continue;
        }

        let mut at = |p: S| -> Result<S> {
            if p == xi {
                return Ok(f0);
            }
            probe[i] = p;
            let f = func(probe.view());
            probe[i] = xi;
            f
        };
        let fa = at(a)?;
        let fb = at(b)?;
        grad[i] = (fb - fa) / (b - a);
    }
    Ok(grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn central_difference_of_cubic() {
        let mut calls = 0;
        let mut func = |x: ArrayView1<f64>| -> Result<f64> {
            calls += 1;
            Ok(x[0].powi(3) + 2. * x[0] * x[1])
        };
        let x = array![1.5, -2.];
        let f0 = func(x.view()).unwrap();
        let g = gradient(&mut func, x.view(), f0, 1e-5, None).unwrap();
        assert_abs_diff_eq!(g, array![3. * 1.5 * 1.5 - 4., 3.], epsilon = 1e-6);
        assert_eq!(calls, 1 + 4);
    }

    #[test]
    fn one_sided_at_bounds() {
        let mut func = |x: ArrayView1<f64>| -> Result<f64> {
            assert!(x[0] >= 0. && x[0] <= 1., "probe left the box");
            Ok(x[0] * x[0])
        };
        let lower = array![0.];
        let upper = array![1.];
        for &x0 in &[0., 1.] {
            let x = array![x0];
            let g = gradient(&mut func, x.view(), x0 * x0, 1e-6, Some((&lower, &upper))).unwrap();
            assert_abs_diff_eq!(g[0], 2. * x0, epsilon = 1e-5);
        }
    }
}
