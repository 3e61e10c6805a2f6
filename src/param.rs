//! Structured Parameters and their Flat Representation
//!
//! A parameter is a tree of numeric blocks: scalars, arrays of any
//! dimension, and ordered sequences of those. Base optimizers only ever
//! see a single flat vector, so every structure can be
//! [flattened](fn.flatten.html) into one `Array1` in traversal order and
//! [unflattened](fn.unflatten.html) back from it using the recorded [`Shape`].
//!
//! The two are exact inverses:
//! ```math
//! \mathrm{unflatten}(\mathrm{flatten}(s)) = s, \qquad
//! \mathrm{flatten}(\mathrm{unflatten}(v, \sigma)) = v
//! ```

use std::fmt;

use crate::error::{Error, Result};
use ndarray::prelude::*;
use ndarray::IxDyn;

/// A (possibly nested) parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Param<S> {
    Scalar(S),
    Array(ArrayD<S>),
    Seq(Vec<Param<S>>),
}

/// Shape metadata recorded by [`flatten`], enough to rebuild the structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Scalar,
    Array(Vec<usize>),
    Seq(Vec<Shape>),
}

impl Shape {
    /// Total number of elements
    pub fn size(&self) -> usize {
        match self {
            Shape::Scalar => 1,
            Shape::Array(dims) => dims.iter().product(),
            Shape::Seq(children) => children.iter().map(Shape::size).sum(),
        }
    }

    /// Array dimensions of a leaf block, `[]` for a scalar, `None` for a sequence.
    pub fn dims(&self) -> Option<&[usize]> {
        match self {
            Shape::Scalar => Some(&[]),
            Shape::Array(dims) => Some(dims),
            Shape::Seq(_) => None,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => write!(f, "()"),
            Shape::Array(dims) => {
                let dims: Vec<String> = dims.iter().map(usize::to_string).collect();
                if dims.len() == 1 {
                    write!(f, "({},)", dims[0])
                } else {
                    write!(f, "({})", dims.join(", "))
                }
            }
            Shape::Seq(children) => {
                let children: Vec<String> = children.iter().map(Shape::to_string).collect();
                write!(f, "[{}]", children.join(", "))
            }
        }
    }
}

impl<S: Clone> Param<S> {
    pub fn scalar(value: S) -> Self {
        Param::Scalar(value)
    }

    /// A flat 1-D vector, the representation base optimizers work on.
    pub fn vector(values: Array1<S>) -> Self {
        Param::Array(values.into_dyn())
    }

    pub fn seq(blocks: Vec<Param<S>>) -> Self {
        Param::Seq(blocks)
    }

    pub fn shape(&self) -> Shape {
        match self {
            Param::Scalar(_) => Shape::Scalar,
            Param::Array(a) => Shape::Array(a.shape().to_vec()),
            Param::Seq(blocks) => Shape::Seq(blocks.iter().map(Param::shape).collect()),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Param::Scalar(_) => 1,
            Param::Array(a) => a.len(),
            Param::Seq(blocks) => blocks.iter().map(Param::size).sum(),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Param::Scalar(_) => "scalar",
            Param::Array(a) if a.ndim() == 1 => "vector",
            Param::Array(_) => "multi-dimensional array",
            Param::Seq(_) => "sequence",
        }
    }

    pub fn as_scalar(&self) -> Option<S> {
        match self {
            Param::Scalar(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayD<S>> {
        match self {
            Param::Array(a) => Some(a),
            _ => None,
        }
    }

    /// View of a 1-D array block.
    pub fn as_vector(&self) -> Option<ArrayView1<'_, S>> {
        self.as_array()
            .and_then(|a| a.view().into_dimensionality::<Ix1>().ok())
    }

    pub fn blocks(&self) -> Option<&[Param<S>]> {
        match self {
            Param::Seq(blocks) => Some(blocks),
            _ => None,
        }
    }

    /// Element-wise map preserving the structure.
    pub fn map(&self, f: impl Fn(S) -> S + Copy) -> Param<S> {
        match self {
            Param::Scalar(s) => Param::Scalar(f(s.clone())),
            Param::Array(a) => Param::Array(a.mapv(f)),
            Param::Seq(blocks) => Param::Seq(blocks.iter().map(|b| b.map(f)).collect()),
        }
    }

    fn collect_into(&self, out: &mut Vec<S>) {
        match self {
            Param::Scalar(s) => out.push(s.clone()),
            Param::Array(a) => out.extend(a.iter().cloned()),
            Param::Seq(blocks) => {
                for b in blocks {
                    b.collect_into(out);
                }
            }
        }
    }
}

impl<S> From<Array1<S>> for Param<S> {
    fn from(values: Array1<S>) -> Self {
        Param::Array(values.into_dyn())
    }
}

impl<S> From<ArrayD<S>> for Param<S> {
    fn from(values: ArrayD<S>) -> Self {
        Param::Array(values)
    }
}

impl<S> From<Vec<Param<S>>> for Param<S> {
    fn from(blocks: Vec<Param<S>>) -> Self {
        Param::Seq(blocks)
    }
}

/// Flatten a structure into one vector, returning the shapes needed by [`unflatten`].
pub fn flatten<S: Clone>(param: &Param<S>) -> (Array1<S>, Shape) {
    (flatten_values(param), param.shape())
}

/// Flatten a structure into one vector, discarding its shape.
pub fn flatten_values<S: Clone>(param: &Param<S>) -> Array1<S> {
    let mut values = Vec::with_capacity(param.size());
    param.collect_into(&mut values);
    Array1::from(values)
}

/// Rebuild a structure from a flat vector and the shapes recorded by [`flatten`].
///
/// Fails with [`Error::ShapeMismatch`] unless `flat` holds exactly
/// `shape.size()` elements; nothing is ever truncated or padded.
pub fn unflatten<S: Clone>(flat: ArrayView1<'_, S>, shape: &Shape) -> Result<Param<S>> {
    if flat.len() != shape.size() {
        return Err(Error::shape_mismatch(
            format!("{} elements for {}", shape.size(), shape),
            format!("{} elements", flat.len()),
        ));
    }
    rebuild(&flat.to_vec(), shape)
}

fn rebuild<S: Clone>(values: &[S], shape: &Shape) -> Result<Param<S>> {
    match shape {
        Shape::Scalar => Ok(Param::Scalar(values[0].clone())),
        Shape::Array(dims) => ArrayD::from_shape_vec(IxDyn(dims), values.to_vec())
            .map(Param::Array)
            .map_err(|e| Error::shape_mismatch(shape, e)),
        Shape::Seq(children) => {
            let mut offset = 0;
            let mut blocks = Vec::with_capacity(children.len());
            for child in children {
                let n = child.size();
                blocks.push(rebuild(&values[offset..offset + n], child)?);
                offset += n;
            }
            Ok(Param::Seq(blocks))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> Param<f64> {
        Param::seq(vec![
            Param::vector(array![1., 2.]),
            Param::scalar(3.),
            Param::Array(array![[4., 5., 6.], [7., 8., 9.]].into_dyn()),
            Param::seq(vec![Param::scalar(10.), Param::vector(array![11.])]),
        ])
    }

    #[test]
    fn flatten_traversal_order() {
        let (flat, shape) = flatten(&nested());
        assert_eq!(flat, Array1::range(1., 12., 1.));
        assert_eq!(shape.size(), 11);
        assert_eq!(
            shape.to_string(),
            "[(2,), (), (2, 3), [(), (1,)]]".to_string()
        );
    }

    #[test]
    fn unflatten_round_trip() {
        let s = nested();
        let (flat, shape) = flatten(&s);
        assert_eq!(unflatten(flat.view(), &shape).unwrap(), s);

        let v = array![0.5, -1.5, 2.5, 3.5, 4.5, 5.5, 6.5, 7.5, 8.5, 9.5, 10.5];
        let rebuilt = unflatten(v.view(), &shape).unwrap();
        assert_eq!(flatten_values(&rebuilt), v);
        assert_eq!(rebuilt.shape(), shape);
    }

    #[test]
    fn round_trip_single_blocks() {
        for s in vec![
            Param::scalar(-2.0f32),
            Param::vector(array![1.0f32, 2., 3.]),
            Param::Array(Array::zeros((2, 2, 3)).into_dyn()),
            Param::seq(vec![]),
        ] {
            let (flat, shape) = flatten(&s);
            assert_eq!(unflatten(flat.view(), &shape).unwrap(), s);
        }
    }

    #[test]
    fn unflatten_rejects_wrong_length() {
        let (_, shape) = flatten(&nested());
        let short = Array1::<f64>::zeros(10);
        match unflatten(short.view(), &shape) {
            Err(Error::ShapeMismatch { .. }) => (),
            other => panic!("expected a shape mismatch, got {:?}", other),
        }
        let long = Array1::<f64>::zeros(12);
        assert!(unflatten(long.view(), &shape).is_err());
    }

    #[test]
    fn accessors() {
        let s = nested();
        let blocks = s.blocks().unwrap();
        assert_eq!(blocks[0].as_vector().unwrap(), array![1., 2.]);
        assert_eq!(blocks[1].as_scalar(), Some(3.));
        assert!(blocks[2].as_vector().is_none());
        assert_eq!(s.map(|x| 2. * x).size(), 11);
        assert_eq!(blocks[2].kind(), "multi-dimensional array");
    }
}
