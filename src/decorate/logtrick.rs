use super::{Transform, Wrapping};
use crate::bound::{expand_domains, Domain, Positive};
use crate::error::{Error, Result};
use crate::param::{flatten_values, unflatten, Param};
use ndarray::prelude::*;
use ndarray::NdFloat;

/// Optimizes `Positive` parameters in log-space.
///
/// For every element whose domain is [`Positive`] the wrapped minimizer sees
/// $`y = \log x`$ and the objective is evaluated at $`x = e^y`$, with the
/// gradient corrected by the chain rule
/// ```math
/// \frac{\partial f}{\partial y} = \frac{\partial f}{\partial x} \, x .
/// ```
/// A `Positive` domain is replaced by an unbounded one of the same shape;
/// plain bounds are passed through for the wrapped minimizer to enforce.
/// The structure of the parameters is left as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTrick;

/// Which flat elements live in log-space.
#[derive(Debug, Clone)]
pub struct LogMask(Vec<bool>);

impl LogMask {
    fn apply<S: NdFloat>(&self, w: &Param<S>, f: impl Fn(S) -> S) -> Result<Param<S>> {
        let mut flat = flatten_values(w);
        self.check(flat.len())?;
        for (v, &m) in flat.iter_mut().zip(&self.0) {
            if m {
                *v = f(*v);
            }
        }
        unflatten(flat.view(), &w.shape())
    }

    fn check(&self, n: usize) -> Result<()> {
        if n == self.0.len() {
            Ok(())
        } else {
            Err(Error::shape_mismatch(
                format!("{} elements", self.0.len()),
                format!("{} elements", n),
            ))
        }
    }
}

impl<S: NdFloat> Transform<S> for LogTrick {
    type State = LogMask;

    fn wrap_initial_value(
        &self,
        w0: &Param<S>,
        bounds: Option<&[Domain<S>]>,
    ) -> Result<Wrapping<S, LogMask>> {
        let domains = match bounds {
            Some(domains) => domains,
            None => {
                return Ok(Wrapping {
                    w0: w0.clone(),
                    bounds: None,
                    state: LogMask(vec![false; w0.size()]),
                })
            }
        };
        let mask = LogMask(
            expand_domains(domains, &w0.shape())?
                .iter()
                .map(Domain::is_positive)
                .collect(),
        );

        let flat = flatten_values(w0);
        for (index, (&x, &m)) in flat.iter().zip(&mask.0).enumerate() {
            if m && !(x > S::zero() && x.is_finite()) {
                return Err(Error::InfeasibleStart {
                    index,
                    value: x.to_f64().unwrap_or(std::f64::NAN),
                });
            }
        }
        log::debug!(
            "logtrick: {} of {} elements in log-space",
            mask.0.iter().filter(|&&m| m).count(),
            mask.0.len()
        );

        let w0 = mask.apply(w0, Positive::forward)?;
        let bounds = domains
            .iter()
            .map(|d| if d.is_positive() { d.unbounded_like() } else { d.clone() })
            .collect();
        Ok(Wrapping {
            w0,
            bounds: Some(bounds),
            state: mask,
        })
    }

    fn to_outer(&self, w: &Param<S>, mask: &LogMask) -> Result<Param<S>> {
        mask.apply(w, Positive::inverse)
    }

    fn pull_gradient(
        &self,
        w: &Param<S>,
        outer: &Param<S>,
        grad: Param<S>,
        mask: &LogMask,
    ) -> Result<Param<S>> {
        let shape = w.shape();
        if grad.shape() != shape {
            return Err(Error::shape_mismatch(
                format!("gradient of shape {}", shape),
                format!("gradient of shape {}", grad.shape()),
            ));
        }
        let x = flatten_values(outer);
        let g = flatten_values(&grad);
        mask.check(g.len())?;
        let corrected: Array1<S> = g
            .iter()
            .zip(x.iter())
            .zip(&mask.0)
            .map(|((&dfdx, &xi), &m)| if m { Positive::grad(dfdx, xi) } else { dfdx })
            .collect();
        unflatten(corrected.view(), &shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bound::Bound;
    use crate::objective::{Evaluation, Objective};
    use approx::assert_abs_diff_eq;

    #[test]
    fn logs_positive_elements_only() {
        let w0 = Param::vector(array![2., -3., 0.5]);
        let bounds: Vec<Domain<f64>> = vec![
            Positive::new().into(),
            Bound::new(-5., 5.).into(),
            Positive::new().into(),
        ];
        let wrapping = LogTrick.wrap_initial_value(&w0, Some(&bounds)).unwrap();
        let inner = wrapping.w0.as_vector().unwrap().to_owned();
        assert_abs_diff_eq!(inner, array![2f64.ln(), -3., 0.5f64.ln()], epsilon = 1e-15);

        let inner_bounds = wrapping.bounds.unwrap();
        assert!(inner_bounds.iter().all(|d| !d.is_positive()));
        assert!(inner_bounds[0].lower().is_infinite());
        assert_eq!(inner_bounds[1], bounds[1]);

        let back = LogTrick.to_outer(&wrapping.w0, &wrapping.state).unwrap();
        assert_abs_diff_eq!(
            back.as_vector().unwrap().to_owned(),
            array![2., -3., 0.5],
            epsilon = 1e-14
        );
    }

    #[test]
    fn chain_rule_correction() {
        let bounds: Vec<Domain<f64>> = vec![Positive::new().into(), Bound::default().into()];
        let wrapping = LogTrick
            .wrap_initial_value(&Param::vector(array![1., 1.]), Some(&bounds))
            .unwrap();
        // f(x) = (x0 - 3)^2 + (x1 - 3)^2
        let objective = |w: &Param<f64>, _data: &Array2<f64>, _grad: bool| -> Result<Evaluation<f64>> {
            let x = w.as_vector().unwrap();
            let value = (x[0] - 3.).powi(2) + (x[1] - 3.).powi(2);
            Ok(Evaluation::with_grad(value, x.mapv(|v| 2. * (v - 3.))))
        };
        let trick = LogTrick;
        let mut wrapped = trick.wrap_objective(objective, &wrapping.state);
        let y = Param::vector(array![2f64.ln(), 2.]);
        let ev = wrapped.evaluate(&y, &Array2::zeros((1, 1)), true).unwrap();
        assert_abs_diff_eq!(ev.value, 2.);
        // df/dy0 = 2 (x0 - 3) x0 with x0 = 2
        assert_abs_diff_eq!(
            ev.grad.unwrap().as_vector().unwrap().to_owned(),
            array![-4., -2.],
            epsilon = 1e-12
        );
    }

    #[test]
    fn identity_without_positive_domains() {
        let w0 = Param::seq(vec![Param::scalar(-1.), Param::vector(array![0., 2.])]);
        let wrapping = LogTrick.wrap_initial_value(&w0, None).unwrap();
        assert_eq!(wrapping.w0, w0);
        assert!(wrapping.bounds.is_none());
        assert_eq!(LogTrick.to_outer(&w0, &wrapping.state).unwrap(), w0);
    }

    #[test]
    fn infeasible_start() {
        let w0 = Param::seq(vec![Param::scalar(1.), Param::vector(array![0.5, 0.])]);
        let bounds: Vec<Domain<f64>> = vec![Bound::default().into(), Positive::new().with_shape(&[2]).into()];
        match LogTrick.wrap_initial_value(&w0, Some(&bounds)) {
            Err(Error::InfeasibleStart { index, value }) => {
                assert_eq!(index, 2);
                assert_eq!(value, 0.);
            }
            Err(e) => panic!("expected an infeasible start, got {}", e),
            Ok(_) => panic!("expected an infeasible start"),
        }
    }
}
