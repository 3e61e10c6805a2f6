//! Objective Functions
//!
//! An objective maps parameters and a block of data (one sample per row)
//! to a scalar loss, and to its gradient when asked for one. The gradient
//! has exactly the structure of the parameters it was taken at.

use crate::error::Result;
use crate::param::Param;
use ndarray::prelude::*;

/// Value of an objective, with its gradient if one was requested.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation<S> {
    pub value: S,
    pub grad: Option<Param<S>>,
}

impl<S> Evaluation<S> {
    pub fn value(value: S) -> Self {
        Evaluation { value, grad: None }
    }

    pub fn with_grad(value: S, grad: impl Into<Param<S>>) -> Self {
        Evaluation {
            value,
            grad: Some(grad.into()),
        }
    }
}

/// Trait for optimization objectives.
///
/// `evaluate(w, data, grad)` returns $`f(w; \mathrm{data})`$, plus
/// $`\nabla_w f`$ when `grad` is true. Implemented for every closure
/// `FnMut(&Param<S>, &Array2<S>, bool) -> Result<Evaluation<S>>`.
pub trait Objective<S> {
    fn evaluate(&mut self, w: &Param<S>, data: &Array2<S>, grad: bool) -> Result<Evaluation<S>>;
}

impl<S, F> Objective<S> for F
where
    F: FnMut(&Param<S>, &Array2<S>, bool) -> Result<Evaluation<S>>,
{
    fn evaluate(&mut self, w: &Param<S>, data: &Array2<S>, grad: bool) -> Result<Evaluation<S>> {
        self(w, data, grad)
    }
}
