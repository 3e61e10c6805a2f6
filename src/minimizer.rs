//! The Call Signature Shared by Base and Decorated Optimizers

use crate::bound::{box_limits, expand_domains, Domain};
use crate::error::{Error, Result};
use crate::objective::{Evaluation, Objective};
use crate::param::{Param, Shape};
use crate::result::OptimizeResult;
use ndarray::prelude::*;
use ndarray::NdFloat;

/// Anything that can minimize an [`Objective`] from a starting point.
///
/// Base optimizers require `w0` to be a flat vector, or a single scalar, and
/// `bounds` to line up with its elements; decorators accept richer parameters and translate them
/// before delegating to the optimizer they wrap.
pub trait Minimizer<S: NdFloat> {
    fn minimize<O: Objective<S>>(
        &mut self,
        objective: O,
        w0: &Param<S>,
        data: &Array2<S>,
        bounds: Option<&[Domain<S>]>,
    ) -> Result<OptimizeResult<S>>;
}

/// The flat vector a base optimizer starts from.
///
/// A scalar or a 0-d array is a vector of length one; base optimizers hand
/// points back to the objective in the layout of `w0`.
pub(crate) fn flat_start<S: NdFloat>(w0: &Param<S>) -> Result<Array1<S>> {
    leaf_values(w0).ok_or_else(|| Error::NotFlat { found: w0.kind() })
}

fn leaf_values<S: NdFloat>(w: &Param<S>) -> Option<Array1<S>> {
    match w {
        Param::Scalar(s) => Some(array![*s]),
        Param::Array(a) if a.ndim() <= 1 => Some(a.iter().cloned().collect()),
        _ => None,
    }
}

/// Per-element box limits of `bounds` over a vector of length `n`.
pub(crate) fn flat_limits<S: NdFloat>(
    bounds: Option<&[Domain<S>]>,
    n: usize,
) -> Result<Option<(Array1<S>, Array1<S>)>> {
    match bounds {
        Some(domains) => {
            let expanded = expand_domains(domains, &Shape::Array(vec![n]))?;
            Ok(Some(box_limits(&expanded)))
        }
        None => Ok(None),
    }
}

/// Project `x` onto the box in place.
pub(crate) fn clip<S: NdFloat>(x: &mut Array1<S>, lower: &Array1<S>, upper: &Array1<S>) {
    x.zip_mut_with(lower, |xi, &l| *xi = xi.max(l));
    x.zip_mut_with(upper, |xi, &u| *xi = xi.min(u));
}

/// Value and flat gradient of an evaluation at a point of shape `shape`.
pub(crate) fn flat_gradient<S: NdFloat>(
    evaluation: Evaluation<S>,
    shape: &Shape,
) -> Result<(S, Array1<S>)> {
    let grad = evaluation.grad.ok_or(Error::MissingGradient)?;
    match leaf_values(&grad) {
        Some(g) if grad.shape() == *shape => Ok((evaluation.value, g)),
        _ => Err(Error::shape_mismatch(
            format!("gradient of shape {}", shape),
            format!("gradient of shape {}", grad.shape()),
        )),
    }
}

pub(crate) fn norm<S: NdFloat>(v: &Array1<S>) -> S {
    v.dot(v).sqrt()
}

pub(crate) fn divergence<S: NdFloat>(iteration: usize, what: &'static str, value: S) -> Error {
    Error::Divergence {
        iteration,
        what,
        value: value.to_f64().unwrap_or(std::f64::NAN),
    }
}
