//! Errors surfaced by the optimizers and their transforms

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A flat vector does not hold as many elements as its recorded shapes,
    /// or a returned gradient does not have the structure of its parameters.
    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },

    /// A bound descriptor does not line up with its parameter block.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    Dimension { expected: String, found: String },

    /// The objective produced a non-finite value or gradient.
    #[error("divergence at iteration {iteration}: {what} is {value}")]
    Divergence {
        iteration: usize,
        what: &'static str,
        value: f64,
    },

    /// A log-transformed element started outside the positive domain.
    #[error("element {index} must be strictly positive for the log transform, found {value}")]
    InfeasibleStart { index: usize, value: f64 },

    /// A gradient method was handed an objective that returned no gradient.
    #[error("the objective returned no gradient but the method requires one")]
    MissingGradient,

    /// A base optimizer only works on a flat 1-D vector.
    #[error("base optimizers take a flat vector, found a {found} parameter")]
    NotFlat { found: &'static str },

    #[error("invalid value for `{name}`: {reason}")]
    InvalidConfig { name: &'static str, reason: &'static str },

    /// Error raised inside a pluggable derivative-free backend.
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub(crate) fn shape_mismatch(expected: impl ToString, found: impl ToString) -> Self {
        Error::ShapeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub(crate) fn dimension(expected: impl ToString, found: impl ToString) -> Self {
        Error::Dimension {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}
