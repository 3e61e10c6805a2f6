use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::minimizer::{clip, divergence, norm};
use crate::param::Param;
use crate::result::{OptimizeResult, Termination};
use ndarray::prelude::*;
use ndarray::NdFloat;

/// Parameters of the backtracking Armijo line search.
#[derive(Debug, Clone)]
pub struct ArmijoParams<S> {
    /// Sufficient decrease parameter (default: 1e-4).
    pub c: S,
    /// Backtracking factor (default: 0.5).
    pub rho: S,
    /// Initial step size (default: 1.0).
    pub alpha_init: S,
    /// Minimum step size before declaring failure (default: 1e-16).
    pub alpha_min: S,
}

impl<S: NdFloat> Default for ArmijoParams<S> {
    fn default() -> Self {
        ArmijoParams {
            c: S::from(1e-4).unwrap(),
            rho: S::from(0.5).unwrap(),
            alpha_init: S::one(),
            alpha_min: S::from(1e-16).unwrap(),
        }
    }
}

/// Hyper-parameters of [`lbfgsb`].
#[derive(Debug, Clone)]
pub struct LbfgsbConfig<S> {
    /// Number of correction pairs remembered (default: 10).
    pub memory: usize,
    /// Maximum number of iterations (default: 15000).
    pub maxiter: usize,
    /// Stop when the largest projected gradient component is below this (default: 1e-5).
    pub gtol: S,
    /// Stop when the relative decrease of the objective is below this (default: 2.2e-9).
    pub ftol: S,
    pub line_search: ArmijoParams<S>,
    /// Relative step of the finite-difference gradient (default: cube root of machine epsilon).
    pub fd_step: S,
}

impl<S: NdFloat> Default for LbfgsbConfig<S> {
    fn default() -> Self {
        LbfgsbConfig {
            memory: 10,
            maxiter: 15000,
            gtol: S::from(1e-5).unwrap(),
            ftol: S::from(2.2e-9).unwrap(),
            line_search: ArmijoParams::default(),
            fd_step: S::epsilon().cbrt(),
        }
    }
}

impl<S: NdFloat> LbfgsbConfig<S> {
    pub fn memory(mut self, memory: usize) -> Self {
        self.memory = memory;
        self
    }

    pub fn maxiter(mut self, maxiter: usize) -> Self {
        self.maxiter = maxiter;
        self
    }

    pub fn gtol(mut self, gtol: S) -> Self {
        self.gtol = gtol;
        self
    }

    pub fn ftol(mut self, ftol: S) -> Self {
        self.ftol = ftol;
        self
    }

    pub fn fd_step(mut self, fd_step: S) -> Self {
        self.fd_step = fd_step;
        self
    }

    fn validate(&self) -> Result<()> {
        let ls = &self.line_search;
        if !(ls.rho > S::zero() && ls.rho < S::one()) {
            return Err(Error::InvalidConfig {
                name: "line_search.rho",
                reason: "must lie in (0, 1)",
            });
        }
        if !(ls.c > S::zero() && ls.c < S::one()) {
            return Err(Error::InvalidConfig {
                name: "line_search.c",
                reason: "must lie in (0, 1)",
            });
        }
        if !(self.fd_step > S::zero()) {
            return Err(Error::InvalidConfig {
                name: "fd_step",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

/// Projected limited-memory BFGS for box constraints
///
/// Minimizes a smooth function on the box $`l \le x \le u`$ with the
/// limited-memory BFGS update [\[N80\]](#references) restricted to the
/// variables that are not held at a bound, and an Armijo backtracking
/// search along the projected path.
///
/// Algorithm
/// ---------
/// ```math
/// \begin{aligned}
/// \tilde{g}_k &= P_{\mathcal{F}_k}(\nabla f(x_k)) \\
/// d_k &= -P_{\mathcal{F}_k}(H_k \tilde{g}_k) \\
/// x_{k+1} &= \Pi_{[l,u]}(x_k + \alpha_k d_k), \quad
/// f(x_{k+1}) \le f(x_k) + c \, \nabla f(x_k)^T (x_{k+1} - x_k) \\
/// s_k &= x_{k+1} - x_k, \quad y_k = \nabla f(x_{k+1}) - \nabla f(x_k)
/// \end{aligned}
/// ```
/// where $`\mathcal{F}_k`$ excludes the variables sitting at a bound with
/// the gradient pushing outwards, and $`H_k`$ is applied by the two-loop
/// recursion over the last `memory` pairs $`(s, y)`$ with $`s^Ty > 0`$.
///
/// Parameters
/// ----------
/// - __fg:__     function returning the value and gradient at a point
/// - __x0:__     initial guess, clipped onto the box
/// - __bounds:__ optional element-wise lower and upper limits
/// - __config:__ hyper-parameters, see [`LbfgsbConfig`]
///
/// References
/// ----------
/// \[N80\]: [ Nocedal, J,
///      "Updating Quasi-Newton Matrices With Limited Storage",
///         Mathematics of Computation, Vol 35, #151, July 1980, 773-782 ](https://courses.engr.illinois.edu/ece544na/fa2014/nocedal80.pdf)
pub fn lbfgsb<S: NdFloat>(
    fg: &mut dyn FnMut(ArrayView1<S>) -> Result<(S, Array1<S>)>,
    x0: ArrayView1<S>,
    bounds: Option<(&Array1<S>, &Array1<S>)>,
    config: &LbfgsbConfig<S>,
) -> Result<OptimizeResult<S>> {
    config.validate()?;
    let n = x0.len();
    let (lower, upper) = match bounds {
        Some((lower, upper)) => (lower.clone(), upper.clone()),
        None => (
            Array1::from_elem(n, S::neg_infinity()),
            Array1::from_elem(n, S::infinity()),
        ),
    };
    let ls = &config.line_search;

    let mut x = x0.to_owned();
    clip(&mut x, &lower, &upper);
    let (mut f, mut g) = fg(x.view())?;
    let mut nfev = 1;
    if !f.is_finite() {
        return Err(divergence(0, "objective value", f));
    }
    if let Some(gi) = g.iter().find(|gi| !gi.is_finite()) {
        return Err(divergence(0, "gradient", *gi));
    }

    let mut memory: VecDeque<(S, Array1<S>, Array1<S>)> = VecDeque::with_capacity(config.memory);
    let mut norms = Vec::new();
    let mut nit = 0;

    let termination = loop {
        let active = active_set(&x, &g, &lower, &upper);
        let pg = Array1::from_shape_fn(n, |i| if active[i] { S::zero() } else { g[i] });
        let pg_max = pg.fold(S::zero(), |m, v| m.max(v.abs()));
        norms.push(pg_max);
        if pg_max <= config.gtol {
            break Termination::GradientNorm;
        }
        if nit >= config.maxiter {
            break Termination::MaxIterations;
        }
        nit += 1;

        let mut dir = two_loop(&pg, &memory);
        for (d, &held) in dir.iter_mut().zip(active.iter()) {
            if held {
                *d = S::zero();
            }
        }
        if !(dir.dot(&pg) < S::zero()) {
            // curvature pairs gave an uphill direction
            memory.clear();
            dir = pg.mapv(|v| -v);
        }
        let mut alpha = if memory.is_empty() {
            ls.alpha_init.min(S::one() / norm(&pg))
        } else {
            ls.alpha_init
        };

        // Backtrack along the projected path
        let step = loop {
            if alpha < ls.alpha_min {
                break None;
            }
            let mut x_new = &x + &(&dir * alpha);
            clip(&mut x_new, &lower, &upper);
            let (f_new, g_new) = fg(x_new.view())?;
            nfev += 1;
            let decrease = g.dot(&(&x_new - &x)).min(S::zero());
            if f_new.is_finite()
                && g_new.iter().all(|gi| gi.is_finite())
                && f_new <= f + ls.c * decrease
            {
                break Some((x_new, f_new, g_new));
            }
            alpha = alpha * ls.rho;
        };
        let (x_new, f_new, g_new) = match step {
            Some(step) => step,
            None => break Termination::LineSearchFailed,
        };
        if x_new == x {
            // the whole step was clipped away
            if memory.is_empty() {
                break Termination::LineSearchFailed;
            }
            memory.clear();
            continue;
        }

        let s = &x_new - &x;
        let y = &g_new - &g;
        let sy = s.dot(&y);
        if sy > S::epsilon() * y.dot(&y) {
            if memory.len() >= config.memory {
                // forget
                memory.pop_front();
            }
            if config.memory > 0 {
                memory.push_back((S::one() / sy, s, y));
            }
        }

        let f_old = f;
        x = x_new;
        f = f_new;
        g = g_new;
        log::debug!(
            "l-bfgs-b iteration {}: objective {:e}, step {:e}",
            nit,
            f,
            alpha
        );

        let scale = f_old.abs().max(f.abs()).max(S::one());
        if f_old - f <= config.ftol * scale {
            break Termination::FunctionChange;
        }
    };

    let success = termination.converged();
    if success {
        log::info!("l-bfgs-b converged after {} iterations: {}", nit, termination);
    } else {
        log::warn!("l-bfgs-b stopped after {} iterations: {}", nit, termination);
    }
    Ok(OptimizeResult {
        x: Param::vector(x),
        fun: f,
        success,
        termination,
        nit,
        nfev,
        norms,
        objs: Vec::new(),
    })
}

/// Variables held at a bound by a gradient pointing out of the box.
fn active_set<S: NdFloat>(
    x: &Array1<S>,
    g: &Array1<S>,
    lower: &Array1<S>,
    upper: &Array1<S>,
) -> Vec<bool> {
    (0..x.len())
        .map(|i| (x[i] <= lower[i] && g[i] > S::zero()) || (x[i] >= upper[i] && g[i] < S::zero()))
        .collect()
}

/// Two-loop recursion, $`-H_k g`$.
fn two_loop<S: NdFloat>(grad: &Array1<S>, memory: &VecDeque<(S, Array1<S>, Array1<S>)>) -> Array1<S> {
    let mut dir = grad.mapv(|v| -v);
    let mut alphas = Vec::with_capacity(memory.len());
    for (rho, s, y) in memory.iter().rev() {
        let alpha = s.dot(&dir) * (*rho);
        dir.scaled_add(-alpha, y);
        alphas.push(alpha);
    }
    if let Some((rho, _, y)) = memory.back() {
        let gamma = S::one() / (*rho * y.dot(y));
        dir *= gamma;
    }
    for (alpha, (rho, s, y)) in alphas.iter().rev().zip(memory.iter()) {
        let beta = y.dot(&dir) * (*rho);
        dir.scaled_add(*alpha - beta, s);
    }
    dir
}
