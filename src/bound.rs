//! Feasible Domains of Parameter Blocks
//!
//! Each top-level block of a parameter carries one [`Domain`]:
//! - a [`Bound`], a box $`[l, u]`$ enforced natively by bounded optimizers, or
//! - [`Positive`], the open half-line $`(0, \infty)`$, which the log-trick
//!   decorator removes by optimizing $`y = \log x`$ instead of $`x`$.
//!
//! Descriptors are shape-agnostic until they meet their block: a shape
//! mismatch is only reported by [`expand_domains`], never at construction.

use crate::error::{Error, Result};
use crate::param::Shape;
use ndarray::prelude::*;
use ndarray::NdFloat;

/// Box constraint $`l \leq x \leq u`$, either limit may be infinite.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound<S> {
    pub lower: S,
    pub upper: S,
    pub shape: Option<Vec<usize>>,
}

impl<S: NdFloat> Bound<S> {
    pub fn new(lower: S, upper: S) -> Self {
        Bound {
            lower,
            upper,
            shape: None,
        }
    }

    /// $`(-\infty, \infty)`$
    pub fn unbounded() -> Self {
        Bound::new(S::neg_infinity(), S::infinity())
    }

    #[must_use]
    pub fn with_shape(mut self, shape: &[usize]) -> Self {
        self.shape = Some(shape.to_vec());
        self
    }

    #[inline]
    pub fn clip(&self, x: S) -> S {
        x.max(self.lower).min(self.upper)
    }
}

impl<S: NdFloat> Default for Bound<S> {
    fn default() -> Self {
        Bound::unbounded()
    }
}

/// Strictly positive domain, optimized in log space.
///
/// ```math
/// y = \log x, \qquad x = e^y, \qquad
/// \frac{\partial f}{\partial y} = \frac{\partial f}{\partial x} \, x
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Positive {
    pub shape: Option<Vec<usize>>,
}

impl Positive {
    pub fn new() -> Self {
        Positive { shape: None }
    }

    #[must_use]
    pub fn with_shape(mut self, shape: &[usize]) -> Self {
        self.shape = Some(shape.to_vec());
        self
    }

    /// $`x \mapsto \log x`$
    #[inline]
    pub fn forward<S: NdFloat>(x: S) -> S {
        x.ln()
    }

    /// $`y \mapsto e^y`$
    #[inline]
    pub fn inverse<S: NdFloat>(y: S) -> S {
        y.exp()
    }

    /// Chain rule taking $`\partial f / \partial x`$ at `x` to $`\partial f / \partial y`$.
    #[inline]
    pub fn grad<S: NdFloat>(dfdx: S, x: S) -> S {
        dfdx * x
    }
}

/// The domain of one parameter block.
#[derive(Debug, Clone, PartialEq)]
pub enum Domain<S> {
    Bound(Bound<S>),
    Positive(Positive),
}

impl<S: NdFloat> Domain<S> {
    pub fn lower(&self) -> S {
        match self {
            Domain::Bound(b) => b.lower,
            Domain::Positive(_) => S::zero(),
        }
    }

    pub fn upper(&self) -> S {
        match self {
            Domain::Bound(b) => b.upper,
            Domain::Positive(_) => S::infinity(),
        }
    }

    pub fn shape(&self) -> Option<&[usize]> {
        match self {
            Domain::Bound(b) => b.shape.as_deref(),
            Domain::Positive(p) => p.shape.as_deref(),
        }
    }

    pub fn is_positive(&self) -> bool {
        match self {
            Domain::Positive(_) => true,
            Domain::Bound(_) => false,
        }
    }

    /// Unbounded domain with the same declared shape.
    pub(crate) fn unbounded_like(&self) -> Domain<S> {
        Domain::Bound(Bound {
            shape: self.shape().map(<[usize]>::to_vec),
            ..Bound::unbounded()
        })
    }

    /// The same domain restricted to a single element.
    fn element(&self) -> Domain<S> {
        match self {
            Domain::Bound(b) => Domain::Bound(Bound::new(b.lower, b.upper)),
            Domain::Positive(_) => Domain::Positive(Positive::new()),
        }
    }

    fn check(&self, block: &Shape) -> Result<()> {
        let declared = match self.shape() {
            Some(declared) => declared,
            None => return Ok(()),
        };
        match block.dims() {
            Some(dims) if dims == declared => Ok(()),
            _ => Err(Error::dimension(
                format!("block of shape {}", Shape::Array(declared.to_vec())),
                format!("block of shape {}", block),
            )),
        }
    }
}

impl<S> From<Bound<S>> for Domain<S> {
    fn from(b: Bound<S>) -> Self {
        Domain::Bound(b)
    }
}

impl<S> From<Positive> for Domain<S> {
    fn from(p: Positive) -> Self {
        Domain::Positive(p)
    }
}

/// Resolve block domains against a parameter shape, one domain per flat element.
///
/// Accepted alignments, tried in order:
/// - a sequence with one domain per top-level block,
/// - a vector or scalar with one scalar domain per element,
/// - a single array block with one domain covering it.
///
/// Anything else, including a declared shape that differs from its
/// block, fails with [`Error::Dimension`].
pub fn expand_domains<S: NdFloat>(domains: &[Domain<S>], shape: &Shape) -> Result<Vec<Domain<S>>> {
    let mut expanded = Vec::with_capacity(shape.size());
    match shape {
        Shape::Seq(children) if children.len() == domains.len() => {
            for (domain, child) in domains.iter().zip(children) {
                domain.check(child)?;
                expanded.extend(std::iter::repeat(domain.element()).take(child.size()));
            }
        }
        Shape::Seq(children) => {
            return Err(Error::dimension(
                format!("{} domains, one per block", children.len()),
                format!("{} domains", domains.len()),
            ));
        }
        _ if domains.len() == shape.size() && domains.len() != 1 => {
            for domain in domains {
                domain.check(&Shape::Scalar)?;
                expanded.push(domain.element());
            }
        }
        _ if domains.len() == 1 => {
            let domain = &domains[0];
            if domain.shape().map_or(false, |s| s.is_empty()) && shape.size() == 1 {
                // a scalar domain also fits a one-element vector
                expanded.push(domain.element());
            } else {
                domain.check(shape)?;
                expanded.extend(std::iter::repeat(domain.element()).take(shape.size()));
            }
        }
        _ => {
            return Err(Error::dimension(
                format!("{} domains for a block of shape {}", shape.size(), shape),
                format!("{} domains", domains.len()),
            ));
        }
    }
    Ok(expanded)
}

/// Element-wise lower and upper limits of expanded domains.
pub fn box_limits<S: NdFloat>(domains: &[Domain<S>]) -> (Array1<S>, Array1<S>) {
    let lower = domains.iter().map(Domain::lower).collect();
    let upper = domains.iter().map(Domain::upper).collect();
    (lower, upper)
}
