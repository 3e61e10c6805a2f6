//! The `ndarray-structopt` crate minimizes objectives over structured and
//! constrained parameters of `ndarray`s.
//!
//! Objectives are written against the caller's natural parameters, a
//! [`Param`] tree of scalars, arrays and nested sequences of those, with
//! per-block [`Domain`]s. The base optimizers only ever see one flat
//! vector:
//! - mini-batch stochastic gradient descent ([`stochastic::sgd`]),
//! - full-batch projected L-BFGS-B or Nelder–Mead ([`batch::minimize`]),
//!
//! and the [`decorate`] module composes the flattening and log-space
//! transforms around them:
//! ```ignore
//! let mut minimizer = Sgd::new(SgdConfig::default().seed(7)).logtrick().structured();
//! let result = minimizer.minimize(objective, &w0, &data, Some(&bounds))?;
//! ```
//!
//! Data is an `Array2` with one sample per row, so that SGD can draw
//! batches of rows. Progress is reported through the `log` facade.
//!
//! This crate is in the early development stage and is actively changing.

#![cfg_attr(all(rustc_nightly, test), feature(test))]
#[cfg(all(rustc_nightly, test))]
extern crate test;

pub mod batch;
pub mod bound;
pub mod decorate;
pub mod direct;
pub mod error;
pub mod minimizer;
pub mod objective;
pub mod param;
pub mod result;
pub mod stochastic;

#[cfg(test)]
mod testing;

pub use batch::{minimize, BatchMinimizer, LbfgsbConfig, Method};
pub use bound::{Bound, Domain, Positive};
pub use decorate::{
    decorated_minimize, logtrick_minimizer, logtrick_sgd, structured_minimizer, structured_sgd,
    Decorate, Decorated, LogTrick, Structured, Transform,
};
pub use direct::{DerivativeFree, NelderMead, NelderMeadConfig};
pub use error::{Error, Result};
pub use minimizer::Minimizer;
pub use objective::{Evaluation, Objective};
pub use param::{flatten, unflatten, Param, Shape};
pub use result::{OptimizeResult, Termination};
pub use stochastic::{sgd, BatchOrder, Schedule, Sgd, SgdConfig};
