use std::fmt;

use crate::param::Param;

/// Why an optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Gradient norm fell below tolerance.
    GradientNorm,
    /// Relative change in objective value fell below tolerance.
    FunctionChange,
    /// Simplex collapsed below the point and value tolerances.
    SimplexSize,
    /// Ran through every pass over the data.
    MaxPasses,
    /// Reached the maximum number of iterations.
    MaxIterations,
    /// Wall-time budget spent, checked at epoch boundaries.
    WallTime,
    /// The user callback asked to stop.
    Callback,
    /// Line search could not find a sufficient decrease.
    LineSearchFailed,
}

impl Termination {
    /// Whether the stopping criterion signals convergence.
    pub fn converged(self) -> bool {
        match self {
            Termination::GradientNorm | Termination::FunctionChange | Termination::SimplexSize => {
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::GradientNorm => write!(f, "gradient norm below tolerance"),
            Termination::FunctionChange => write!(f, "function change below tolerance"),
            Termination::SimplexSize => write!(f, "simplex size below tolerance"),
            Termination::MaxPasses => write!(f, "maximum passes over the data reached"),
            Termination::MaxIterations => write!(f, "maximum iterations reached"),
            Termination::WallTime => write!(f, "wall-time budget exhausted"),
            Termination::Callback => write!(f, "stopped by callback"),
            Termination::LineSearchFailed => write!(f, "line search failed"),
        }
    }
}

/// Result of an optimization run.
///
/// Built once by a base optimizer; decorators only ever rewrite `x`.
#[derive(Debug, Clone)]
pub struct OptimizeResult<S> {
    /// Solution, in the caller's representation.
    pub x: Param<S>,
    /// Objective value at the solution (mean over the last epoch for SGD).
    pub fun: S,
    pub success: bool,
    pub termination: Termination,
    /// Outer iterations, or passes over the data for SGD.
    pub nit: usize,
    /// Objective evaluations.
    pub nfev: usize,
    /// Gradient norm per iteration or epoch.
    pub norms: Vec<S>,
    /// Objective value per epoch, recorded by SGD when `eval_obj` is set.
    pub objs: Vec<S>,
}

impl<S> OptimizeResult<S> {
    pub fn message(&self) -> String {
        self.termination.to_string()
    }
}
