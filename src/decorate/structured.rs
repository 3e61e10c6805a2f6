use super::{Transform, Wrapping};
use crate::bound::{expand_domains, Domain};
use crate::error::{Error, Result};
use crate::param::{flatten, flatten_values, unflatten, Param, Shape};
use ndarray::NdFloat;

/// Flattens structured parameters for the minimizer it wraps.
///
/// The wrapped minimizer sees one flat vector in traversal order, with
/// bounds expanded to one domain per element. The objective keeps seeing
/// the caller's structure, and must return gradients of that same
/// structure.
#[derive(Debug, Clone, Copy, Default)]
pub struct Structured;

impl<S: NdFloat> Transform<S> for Structured {
    /// Shape of the caller's parameters.
    type State = Shape;

    fn wrap_initial_value(
        &self,
        w0: &Param<S>,
        bounds: Option<&[Domain<S>]>,
    ) -> Result<Wrapping<S, Shape>> {
        let (flat, shape) = flatten(w0);
        let bounds = match bounds {
            Some(domains) => Some(expand_domains(domains, &shape)?),
            None => None,
        };
        log::debug!("structured: {} flattened to {} elements", shape, flat.len());
        Ok(Wrapping {
            w0: Param::vector(flat),
            bounds,
            state: shape,
        })
    }

    fn to_outer(&self, w: &Param<S>, shape: &Shape) -> Result<Param<S>> {
        unflatten(flatten_values(w).view(), shape)
    }

    fn pull_gradient(
        &self,
        _w: &Param<S>,
        _outer: &Param<S>,
        grad: Param<S>,
        shape: &Shape,
    ) -> Result<Param<S>> {
        let found = grad.shape();
        if found != *shape {
            return Err(Error::shape_mismatch(
                format!("gradient of shape {}", shape),
                format!("gradient of shape {}", found),
            ));
        }
        Ok(Param::vector(flatten_values(&grad)))
    }
}
