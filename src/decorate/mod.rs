//! Decorated Minimizers
//!
//! A decorator wraps a [`Minimizer`] so that the objective can be written
//! against the caller's natural parameters, while the wrapped minimizer
//! works on its own representation. Each decorator is a [`Transform`]:
//!
//! 1. `wrap_initial_value` maps the start point and bounds inward,
//! 2. `wrap_objective` adapts the objective, mapping points outward and
//!    gradients inward on every evaluation,
//! 3. `unwrap_result` maps the solution back outward.
//!
//! Decorators stack in any order; flattening and the element-wise log
//! transform commute, so
//! ```text
//! sgd.logtrick().structured()  ==  sgd.structured().logtrick()
//! ```
//! up to floating-point round-off.

mod logtrick;
pub use logtrick::*;
mod structured;
pub use structured::*;

use crate::batch::{BatchMinimizer, Method};
use crate::bound::Domain;
use crate::error::Result;
use crate::minimizer::Minimizer;
use crate::objective::{Evaluation, Objective};
use crate::param::Param;
use crate::result::OptimizeResult;
use ndarray::prelude::*;
use ndarray::NdFloat;

/// What a transform hands to the minimizer it wraps.
#[derive(Debug, Clone)]
pub struct Wrapping<S, T> {
    pub w0: Param<S>,
    pub bounds: Option<Vec<Domain<S>>>,
    /// Everything needed to map between the two representations during one run.
    pub state: T,
}

/// A reparameterization between the caller's parameters (outer) and those
/// seen by a wrapped minimizer (inner).
pub trait Transform<S: NdFloat> {
    type State;

    /// Inner start point and bounds for a run starting from `w0`.
    fn wrap_initial_value(
        &self,
        w0: &Param<S>,
        bounds: Option<&[Domain<S>]>,
    ) -> Result<Wrapping<S, Self::State>>;

    /// Outer point of the inner point `w`.
    fn to_outer(&self, w: &Param<S>, state: &Self::State) -> Result<Param<S>>;

    /// Gradient with respect to the inner point `w`, given the gradient
    /// `grad` taken at its outer point `outer`.
    fn pull_gradient(
        &self,
        w: &Param<S>,
        outer: &Param<S>,
        grad: Param<S>,
        state: &Self::State,
    ) -> Result<Param<S>>;

    /// The objective as seen by the wrapped minimizer.
    fn wrap_objective<'s, O>(
        &'s self,
        objective: O,
        state: &'s Self::State,
    ) -> Wrapped<'s, Self, Self::State, O>
    where
        Self: Sized,
        O: Objective<S>,
    {
        Wrapped {
            transform: self,
            state,
            objective,
        }
    }

    /// Rewrites only the solution; diagnostics pass through untouched.
    fn unwrap_result(
        &self,
        mut result: OptimizeResult<S>,
        state: &Self::State,
    ) -> Result<OptimizeResult<S>> {
        result.x = self.to_outer(&result.x, state)?;
        Ok(result)
    }
}

/// An objective evaluated through a [`Transform`] with run state `St`.
pub struct Wrapped<'s, T, St, O> {
    transform: &'s T,
    state: &'s St,
    objective: O,
}

impl<'s, S, T, St, O> Objective<S> for Wrapped<'s, T, St, O>
where
    S: NdFloat,
    T: Transform<S, State = St>,
    O: Objective<S>,
{
    fn evaluate(&mut self, w: &Param<S>, data: &Array2<S>, grad: bool) -> Result<Evaluation<S>> {
        let outer = self.transform.to_outer(w, self.state)?;
        let evaluation = self.objective.evaluate(&outer, data, grad)?;
        let grad = match evaluation.grad {
            Some(g) => Some(self.transform.pull_gradient(w, &outer, g, self.state)?),
            None => None,
        };
        Ok(Evaluation {
            value: evaluation.value,
            grad,
        })
    }
}

/// A minimizer run through a [`Transform`].
#[derive(Debug, Clone)]
pub struct Decorated<T, M> {
    pub transform: T,
    pub inner: M,
}

impl<T, M> Decorated<T, M> {
    pub fn new(transform: T, inner: M) -> Self {
        Decorated { transform, inner }
    }
}

impl<S, T, M> Minimizer<S> for Decorated<T, M>
where
    S: NdFloat,
    T: Transform<S>,
    M: Minimizer<S>,
{
    fn minimize<O: Objective<S>>(
        &mut self,
        objective: O,
        w0: &Param<S>,
        data: &Array2<S>,
        bounds: Option<&[Domain<S>]>,
    ) -> Result<OptimizeResult<S>> {
        let wrapping = self.transform.wrap_initial_value(w0, bounds)?;
        let objective = self.transform.wrap_objective(objective, &wrapping.state);
        let result =
            self.inner
                .minimize(objective, &wrapping.w0, data, wrapping.bounds.as_deref())?;
        self.transform.unwrap_result(result, &wrapping.state)
    }
}

/// Builder-style decoration of any [`Minimizer`].
///
/// ```ignore
/// let mut minimizer = Sgd::new(config).logtrick().structured();
/// let result = minimizer.minimize(objective, &w0, &data, Some(&bounds))?;
/// ```
pub trait Decorate<S: NdFloat>: Minimizer<S> + Sized {
    /// See [`Structured`].
    fn structured(self) -> Decorated<Structured, Self> {
        Decorated::new(Structured, self)
    }

    /// See [`LogTrick`].
    fn logtrick(self) -> Decorated<LogTrick, Self> {
        Decorated::new(LogTrick, self)
    }
}

impl<S: NdFloat, M: Minimizer<S>> Decorate<S> for M {}

/// Wrap `inner` so it takes structured parameters, see [`Structured`].
pub fn structured_minimizer<S: NdFloat, M: Minimizer<S>>(inner: M) -> Decorated<Structured, M> {
    Decorated::new(Structured, inner)
}

/// Wrap `inner` so `Positive` parameters are optimized in log-space, see [`LogTrick`].
pub fn logtrick_minimizer<S: NdFloat, M: Minimizer<S>>(inner: M) -> Decorated<LogTrick, M> {
    Decorated::new(LogTrick, inner)
}

pub use self::logtrick_minimizer as logtrick_sgd;
pub use self::structured_minimizer as structured_sgd;

/// [`batch::minimize`](../batch/fn.minimize.html) on structured and
/// positive parameters.
///
/// Flattens `w0` when it is not already a flat vector, and optimizes in
/// log-space when any of `bounds` is `Positive`. Plain bounds are enforced
/// by the batch method itself.
pub fn decorated_minimize<S, O>(
    objective: O,
    w0: &Param<S>,
    data: &Array2<S>,
    jac: bool,
    bounds: Option<&[Domain<S>]>,
    method: Option<Method>,
) -> Result<OptimizeResult<S>>
where
    S: NdFloat,
    O: Objective<S>,
{
    let mut batch = BatchMinimizer::new(jac);
    batch.method = method;
    let structured = w0.as_vector().is_none();
    let positive = bounds.map_or(false, |b| b.iter().any(Domain::is_positive));
    log::debug!(
        "decorated minimize: structured {}, log-space {}",
        structured,
        positive
    );
    match (structured, positive) {
        (false, false) => batch.minimize(objective, w0, data, bounds),
        (true, false) => batch.structured().minimize(objective, w0, data, bounds),
        (false, true) => batch.logtrick().minimize(objective, w0, data, bounds),
        (true, true) => batch
            .logtrick()
            .structured()
            .minimize(objective, w0, data, bounds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::minimize;
    use crate::bound::{Bound, Positive};
    use crate::error::Error;
    use crate::param::flatten_values;
    use crate::stochastic::{Sgd, SgdConfig};
    use crate::testing::{make_quadratic, qobj, qobj_struc, structured, A, B, C};
    use approx::assert_abs_diff_eq;

    fn config() -> SgdConfig<f64> {
        SgdConfig::default()
            .rate(0.95)
            .eta(1e-7)
            .passes(1000)
            .seed(7)
    }

    fn shifted_square(w: &Param<f64>, _data: &Array2<f64>, grad: bool) -> Result<Evaluation<f64>> {
        let x = flatten_values(w)[0];
        let value = (x - 3.).powi(2);
        if !grad {
            return Ok(Evaluation::value(value));
        }
        let g = 2. * (x - 3.);
        Ok(Evaluation::with_grad(value, w.map(|_| g)))
    }

    /// [`qobj`] over `[(a, c), b]`.
    fn reordered(w: &Param<f64>, data: &Array2<f64>, grad: bool) -> Result<Evaluation<f64>> {
        let v = flatten_values(w);
        let evaluation = qobj(&Param::vector(array![v[0], v[2], v[1]]), data, grad)?;
        let grad = evaluation.grad.map(|g| {
            let g = flatten_values(&g);
            Param::seq(vec![Param::vector(array![g[0], g[2]]), Param::scalar(g[1])])
        });
        Ok(Evaluation {
            value: evaluation.value,
            grad,
        })
    }

    #[test]
    fn structured_matches_flat() {
        let data = make_quadratic(11);
        let flat = Sgd::new(config())
            .minimize(qobj, &Param::vector(array![1., 1., 1.]), &data, None)
            .unwrap();
        let struc = structured_sgd(Sgd::new(config()))
            .minimize(qobj_struc, &structured(1., 1., 1.), &data, None)
            .unwrap();

        assert_eq!(struc.x.shape(), structured(0., 0., 0.).shape());
        let x = flatten_values(&struc.x);
        assert_abs_diff_eq!(x, flatten_values(&flat.x), epsilon = 1e-10);
        assert_abs_diff_eq!(x, array![A, B, C], epsilon = 1e-1);
        assert_eq!(struc.nit, flat.nit);
        assert_eq!(struc.norms, flat.norms);
    }

    #[test]
    fn logtrick_scalar_matches_box() {
        let data: Array2<f64> = Array2::zeros((1, 1));
        let positive: Vec<Domain<f64>> = vec![Positive::new().into()];
        let boxed: Vec<Domain<f64>> = vec![Bound::new(0., std::f64::INFINITY).into()];
        for &x0 in &[0.5, 2., 10.] {
            let w0 = Param::vector(array![x0]);
            let config = SgdConfig::default()
                .rate(0.95)
                .eta(1e-6)
                .passes(2000)
                .batchsize(1)
                .seed(3);
            let res = logtrick_sgd(Sgd::new(config))
                .minimize(shifted_square, &w0, &data, Some(&positive))
                .unwrap();
            let reference = minimize(shifted_square, &w0, &data, true, Some(&boxed), None).unwrap();

            let x = flatten_values(&res.x)[0];
            assert!(res.success, "from {}: {}", x0, res.message());
            assert_abs_diff_eq!(x, 3., epsilon = 1e-1);
            assert_abs_diff_eq!(x, flatten_values(&reference.x)[0], epsilon = 1e-1);
        }
    }

    #[test]
    fn logtrick_scalar_parameter() {
        let data: Array2<f64> = Array2::zeros((1, 1));
        let positive: Vec<Domain<f64>> = vec![Positive::new().into()];
        let w0 = Param::scalar(2.);
        let config = SgdConfig::default()
            .rate(0.95)
            .eta(1e-6)
            .passes(2000)
            .batchsize(1)
            .seed(3);
        let res = logtrick_sgd(Sgd::new(config))
            .minimize(shifted_square, &w0, &data, Some(&positive))
            .unwrap();
        assert!(res.success, "{}", res.message());
        assert_abs_diff_eq!(res.x.as_scalar().unwrap(), 3., epsilon = 1e-1);

        let res = logtrick_minimizer(BatchMinimizer::new(true))
            .minimize(shifted_square, &w0, &data, Some(&positive))
            .unwrap();
        assert!(res.success, "{}", res.message());
        assert_abs_diff_eq!(res.x.as_scalar().unwrap(), 3., epsilon = 1e-4);
    }

    #[test]
    fn decorator_order_invariance() {
        let data = make_quadratic(12);
        let w0 = structured(1., 1., 1.);
        let bounds: Vec<Domain<f64>> = vec![Bound::default().into(), Positive::new().into()];
        let a = Sgd::new(config())
            .logtrick()
            .structured()
            .minimize(qobj_struc, &w0, &data, Some(&bounds))
            .unwrap();
        let b = Sgd::new(config())
            .structured()
            .logtrick()
            .minimize(qobj_struc, &w0, &data, Some(&bounds))
            .unwrap();

        assert_eq!(a.x.shape(), w0.shape());
        assert_eq!(b.x.shape(), w0.shape());
        let x = flatten_values(&a.x);
        assert_abs_diff_eq!(x, flatten_values(&b.x), epsilon = 1e-10);
        assert_abs_diff_eq!(x, array![A, B, C], epsilon = 1e-1);
    }

    #[test]
    fn decorated_minimize_infers_transforms() {
        let data = make_quadratic(13);
        let w0 = Param::seq(vec![Param::vector(array![1., 1.]), Param::scalar(0.)]);
        let bounds: Vec<Domain<f64>> = vec![
            Positive::new().with_shape(&[2]).into(),
            Bound::new(-2., 0.).into(),
        ];

        let res = decorated_minimize(reordered, &w0, &data, true, Some(&bounds), None).unwrap();
        assert!(res.success, "{}", res.message());
        let blocks = res.x.blocks().unwrap();
        assert_abs_diff_eq!(
            blocks[0].as_vector().unwrap().to_owned(),
            array![A, C],
            epsilon = 2e-2
        );
        assert_abs_diff_eq!(blocks[1].as_scalar().unwrap(), B, epsilon = 2e-2);

        let res = decorated_minimize(reordered, &w0, &data, false, Some(&bounds), None).unwrap();
        let x = flatten_values(&res.x);
        assert_abs_diff_eq!(x, array![A, C, B], epsilon = 5e-2);

        // nothing to decorate
        let v0 = Param::vector(array![1., 1., 1.]);
        let plain = minimize(qobj, &v0, &data, true, None, None).unwrap();
        let same = decorated_minimize(qobj, &v0, &data, true, None, None).unwrap();
        assert_eq!(same.x, plain.x);
        assert_eq!(same.nfev, plain.nfev);
    }

    #[test]
    fn decorated_minimize_checks_shapes() {
        let data = make_quadratic(14);
        let w0 = Param::seq(vec![Param::vector(array![1., 1.]), Param::scalar(0.)]);
        let bounds: Vec<Domain<f64>> = vec![
            Positive::new().with_shape(&[3]).into(),
            Bound::new(-2., 0.).into(),
        ];
        match decorated_minimize(reordered, &w0, &data, true, Some(&bounds), None) {
            Err(Error::Dimension { .. }) => {}
            other => panic!("expected a dimension error, got {:?}", other),
        }

        // flat gradient for structured parameters
        match structured_minimizer(BatchMinimizer::new(true)).minimize(
            qobj,
            &structured(1., 1., 1.),
            &data,
            None,
        ) {
            Err(Error::ShapeMismatch { .. }) => {}
            other => panic!("expected a shape mismatch, got {:?}", other),
        }

        let bounds: Vec<Domain<f64>> = vec![Positive::new().into(), Bound::default().into()];
        match Sgd::new(config()).structured().logtrick().minimize(
            qobj_struc,
            &structured(-1., 1., 1.),
            &data,
            Some(&bounds),
        ) {
            Err(Error::InfeasibleStart { index, value }) => {
                assert_eq!(index, 0);
                assert_eq!(value, -1.);
            }
            other => panic!("expected an infeasible start, got {:?}", other),
        }
    }
}
