//! Full-Batch Local Minimization
//!
//! Adapts full-batch local optimizers to the [`Objective`] interface: every
//! evaluation sees all of `data`. Gradient problems go to a projected
//! limited-memory BFGS ([`lbfgsb`]); derivative-free problems go to a
//! [`DerivativeFree`] backend, [`NelderMead`] unless another one is injected.

mod finite_diff;
mod lbfgsb;
pub use lbfgsb::*;

use crate::bound::Domain;
use crate::direct::{nelder_mead, DerivativeFree, NelderMead, NelderMeadConfig};
use crate::error::Result;
use crate::minimizer::{flat_gradient, flat_limits, flat_start, Minimizer};
use crate::objective::Objective;
use crate::param::{unflatten, Param};
use crate::result::OptimizeResult;
use ndarray::prelude::*;
use ndarray::NdFloat;

/// Local optimization method of the batch adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Projected L-BFGS, with finite differences when the objective has no gradient.
    LBfgsB,
    /// The built-in Nelder–Mead simplex method.
    NelderMead,
}

/// Batch adapter as a [`Minimizer`].
///
/// With no explicit `method`, picks [`Method::LBfgsB`] when `jac` is set and
/// the derivative-free backend otherwise.
pub struct BatchMinimizer<'a, S> {
    /// Whether the objective returns gradients.
    pub jac: bool,
    pub method: Option<Method>,
    pub lbfgsb: LbfgsbConfig<S>,
    pub nelder_mead: NelderMeadConfig<S>,
    backend: Option<Box<dyn DerivativeFree<S> + 'a>>,
}

impl<'a, S: NdFloat> BatchMinimizer<'a, S> {
    pub fn new(jac: bool) -> Self {
        BatchMinimizer {
            jac,
            method: None,
            lbfgsb: LbfgsbConfig::default(),
            nelder_mead: NelderMeadConfig::default(),
            backend: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn lbfgsb(mut self, config: LbfgsbConfig<S>) -> Self {
        self.lbfgsb = config;
        self
    }

    pub fn nelder_mead(mut self, config: NelderMeadConfig<S>) -> Self {
        self.nelder_mead = config;
        self
    }

    /// Replace the default derivative-free method.
    ///
    /// Used whenever no `method` is set and `jac` is false.
    pub fn with_backend(mut self, backend: impl DerivativeFree<S> + 'a) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }
}

impl<'a, S: NdFloat> Minimizer<S> for BatchMinimizer<'a, S> {
    fn minimize<O: Objective<S>>(
        &mut self,
        mut objective: O,
        w0: &Param<S>,
        data: &Array2<S>,
        bounds: Option<&[Domain<S>]>,
    ) -> Result<OptimizeResult<S>> {
        let x0 = flat_start(w0)?;
        let shape = w0.shape();
        let n = x0.len();
        let limits = flat_limits(bounds, n)?;
        let limits = limits.as_ref().map(|(lower, upper)| (lower, upper));
        let method = self.method.unwrap_or(if self.jac {
            Method::LBfgsB
        } else {
            Method::NelderMead
        });
        log::debug!("batch minimize: {:?} over {} parameters", method, n);

        let mut nfev = 0;
        let mut result = match method {
            Method::LBfgsB => {
                let jac = self.jac;
                let fd_step = self.lbfgsb.fd_step;
                let mut fg = |x: ArrayView1<S>| -> Result<(S, Array1<S>)> {
                    if jac {
                        nfev += 1;
                        let evaluation = objective.evaluate(&unflatten(x, &shape)?, data, true)?;
                        return flat_gradient(evaluation, &shape);
                    }
                    let mut func = |x: ArrayView1<S>| -> Result<S> {
                        nfev += 1;
                        Ok(objective.evaluate(&unflatten(x, &shape)?, data, false)?.value)
                    };
                    let f0 = func(x)?;
                    let grad = finite_diff::gradient(&mut func, x, f0, fd_step, limits)?;
                    Ok((f0, grad))
                };
                lbfgsb(&mut fg, x0.view(), limits, &self.lbfgsb)?
            }
            Method::NelderMead => {
                let mut func = |x: ArrayView1<S>| -> Result<S> {
                    nfev += 1;
                    Ok(objective.evaluate(&unflatten(x, &shape)?, data, false)?.value)
                };
                match (self.method, self.backend.as_mut()) {
                    (None, Some(backend)) => backend.minimize(&mut func, x0.view(), limits)?,
                    _ => nelder_mead(&mut func, x0.view(), limits, &self.nelder_mead)?,
                }
            }
        };
        result.x = unflatten(flat_start(&result.x)?.view(), &shape)?;
        result.nfev = nfev;
        Ok(result)
    }
}

impl<S: NdFloat> Default for BatchMinimizer<'_, S> {
    fn default() -> Self {
        BatchMinimizer::new(true)
    }
}

/// Minimize over the whole of `data` in one call.
///
/// Dispatches to a gradient method when `jac` is true and to a
/// derivative-free method otherwise, unless `method` says which to use.
/// `bounds` take the same [`Domain`] descriptors as the other optimizers,
/// used as box constraints. Errors raised by the objective or the
/// underlying method are returned unchanged.
pub fn minimize<S, O>(
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
    let mut minimizer = BatchMinimizer::new(jac);
    minimizer.method = method;
    minimizer.minimize(objective, w0, data, bounds)
}
