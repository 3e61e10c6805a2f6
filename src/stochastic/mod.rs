//! Mini-batch Stochastic Gradient Methods
//!
//! For objectives that are averages over a data set with one sample per row,
//! ```math
//! f(w) = \frac{1}{N} \sum_{n=1}^N f_n(w),
//! ```
//! each update only evaluates the gradient on a small batch of rows. A full
//! sweep over the rows is a _pass_ (or epoch); convergence is judged once per
//! pass on the mean batch gradient.
//!
//! The step size follows a configurable [`Schedule`]; batches are drawn by a
//! private random generator seeded per call, never by global state.

mod schedule;
pub use schedule::*;
mod sgd;
pub use sgd::*;

use ndarray::ArrayView;

/// Do nothing function for optional user callback (returns false)
#[allow(clippy::needless_pass_by_value)]
pub fn nop<T, D>(_x: ArrayView<T, D>, _itr: usize) -> bool {
    false
}
