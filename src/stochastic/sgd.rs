use std::time::{Duration, Instant};

use super::schedule::{batches, BatchOrder, Schedule, Stepper};
use super::nop;
use crate::bound::Domain;
use crate::error::{Error, Result};
use crate::minimizer::{clip, divergence, flat_gradient, flat_limits, flat_start, norm, Minimizer};
use crate::objective::Objective;
use crate::param::{unflatten, Param};
use crate::result::{OptimizeResult, Termination};
use ndarray::prelude::*;
use ndarray::NdFloat;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Hyper-parameters of [`sgd`].
#[derive(Debug, Clone)]
pub struct SgdConfig<S> {
    /// Base step size, or the ADADELTA decay $`\rho \in (0, 1)`$ (default: 0.9).
    pub rate: S,
    /// Step size floor, or the ADADELTA $`\epsilon`$ (default: 1e-5).
    pub eta: S,
    /// Maximum number of passes over the data (default: 10).
    pub passes: usize,
    /// Rows per batch, capped at the number of rows (default: 100).
    pub batchsize: usize,
    /// Stop once the mean gradient norm of a pass falls below this (default: 1e-3).
    pub gtol: S,
    /// Record the mean objective value of every pass (default: false).
    pub eval_obj: bool,
    pub schedule: Schedule<S>,
    pub order: BatchOrder,
    /// Seed of the batch generator, `None` to seed from entropy.
    pub seed: Option<u64>,
    /// Advisory budget, checked between passes.
    pub walltime: Option<Duration>,
}

impl<S: NdFloat> Default for SgdConfig<S> {
    fn default() -> Self {
        SgdConfig {
            rate: S::from(0.9).unwrap(),
            eta: S::from(1e-5).unwrap(),
            passes: 10,
            batchsize: 100,
            gtol: S::from(1e-3).unwrap(),
            eval_obj: false,
            schedule: Schedule::Adadelta,
            order: BatchOrder::Shuffled,
            seed: None,
            walltime: None,
        }
    }
}

impl<S: NdFloat> SgdConfig<S> {
    pub fn rate(mut self, rate: S) -> Self {
        self.rate = rate;
        self
    }

    pub fn eta(mut self, eta: S) -> Self {
        self.eta = eta;
        self
    }

    pub fn passes(mut self, passes: usize) -> Self {
        self.passes = passes;
        self
    }

    pub fn batchsize(mut self, batchsize: usize) -> Self {
        self.batchsize = batchsize;
        self
    }

    pub fn gtol(mut self, gtol: S) -> Self {
        self.gtol = gtol;
        self
    }

    pub fn eval_obj(mut self, eval_obj: bool) -> Self {
        self.eval_obj = eval_obj;
        self
    }

    pub fn schedule(mut self, schedule: Schedule<S>) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn order(mut self, order: BatchOrder) -> Self {
        self.order = order;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn walltime(mut self, walltime: Duration) -> Self {
        self.walltime = Some(walltime);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.batchsize == 0 {
            return Err(Error::InvalidConfig {
                name: "batchsize",
                reason: "must be at least one row",
            });
        }
        if !(self.rate > S::zero()) {
            return Err(Error::InvalidConfig {
                name: "rate",
                reason: "must be positive",
            });
        }
        if self.schedule == Schedule::Adadelta && !(self.rate < S::one()) {
            return Err(Error::InvalidConfig {
                name: "rate",
                reason: "the ADADELTA decay must lie in (0, 1)",
            });
        }
        if let Schedule::Geometric { decay } = self.schedule {
            if !(decay > S::zero() && decay <= S::one()) {
                return Err(Error::InvalidConfig {
                    name: "schedule.decay",
                    reason: "must lie in (0, 1] so the step never grows",
                });
            }
        }
        if !(self.eta >= S::zero()) {
            return Err(Error::InvalidConfig {
                name: "eta",
                reason: "must be non-negative",
            });
        }
        Ok(())
    }
}

/// Mini-batch Stochastic Gradient Descent
///
/// Minimizes an objective averaged over the rows of `data`, evaluating it
/// on one batch of rows per update.
///
/// Algorithm
/// ---------
/// For each pass, partition the rows into batches $`B_1, \dots, B_K`$ and for each batch
/// ```math
/// \begin{aligned}
/// g_t &= \nabla_w f(w_t; B_k) \\
/// w_{t+1} &= \Pi_{[l, u]}\left( w_t + \Delta w_t(g_t) \right)
/// \end{aligned}
/// ```
/// where $`\Delta w_t`$ follows the configured [`Schedule`] and $`\Pi`$
/// clips onto the box given by `bounds` (identity when there are none).
/// Gradient components pushing against an active bound are zeroed first.
///
/// Parameters
/// ----------
/// - __objective:__ objective returning value and gradient on a batch of rows
/// - __w0:__        initial guess, a flat vector
/// - __data:__      samples, one per row
/// - __bounds:__    optional box constraints, one per element or one for all
/// - __config:__    hyper-parameters, see [`SgdConfig`]
///
/// Stops when the norm of the mean batch gradient of a pass drops below
/// `gtol`, after `passes` passes, or once `walltime` has elapsed. A non-finite
/// value or gradient fails with [`Error::Divergence`].
pub fn sgd<S, O>(
    objective: O,
    w0: &Param<S>,
    data: &Array2<S>,
    bounds: Option<&[Domain<S>]>,
    config: &SgdConfig<S>,
) -> Result<OptimizeResult<S>>
where
    S: NdFloat,
    O: Objective<S>,
{
    run(objective, w0, data, bounds, config, &mut nop::<S, Ix1>)
}

/// [`sgd`] as a [`Minimizer`], with an optional per-pass callback.
pub struct Sgd<'a, S> {
    pub config: SgdConfig<S>,
    callback: Option<Box<dyn FnMut(ArrayView1<S>, usize) -> bool + 'a>>,
}

impl<'a, S: NdFloat> Sgd<'a, S> {
    pub fn new(config: SgdConfig<S>) -> Self {
        Sgd {
            config,
            callback: None,
        }
    }

    /// User-defined function evaluated with two arguments (x, pass).
    /// It is evaluated at (x0, 0) and then after each pass.
    /// If it returns true, the optimizer terminates early.
    pub fn callback(mut self, callback: impl FnMut(ArrayView1<S>, usize) -> bool + 'a) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }
}

impl<'a, S: NdFloat> Minimizer<S> for Sgd<'a, S> {
    fn minimize<O: Objective<S>>(
        &mut self,
        objective: O,
        w0: &Param<S>,
        data: &Array2<S>,
        bounds: Option<&[Domain<S>]>,
    ) -> Result<OptimizeResult<S>> {
        match self.callback.as_mut() {
            Some(callback) => run(objective, w0, data, bounds, &self.config, &mut **callback),
            None => run(objective, w0, data, bounds, &self.config, &mut nop::<S, Ix1>),
        }
    }
}

fn run<S, O, C>(
    mut objective: O,
    w0: &Param<S>,
    data: &Array2<S>,
    bounds: Option<&[Domain<S>]>,
    config: &SgdConfig<S>,
    callback: &mut C,
) -> Result<OptimizeResult<S>>
where
    S: NdFloat,
    O: Objective<S>,
    C: FnMut(ArrayView1<S>, usize) -> bool + ?Sized,
{
    config.validate()?;
    let nrows = data.nrows();
    if nrows == 0 {
        return Err(Error::InvalidConfig {
            name: "data",
            reason: "needs at least one row",
        });
    }
    let batchsize = config.batchsize.min(nrows);

    let mut x = flat_start(w0)?;
    let shape = w0.shape();
    let n = x.len();
    let limits = flat_limits(bounds, n)?;
    if let Some((lower, upper)) = &limits {
        clip(&mut x, lower, upper);
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut stepper = Stepper::new(&config.schedule, n);
    let start = Instant::now();

    let mut fun = S::infinity();
    let mut norms = Vec::new();
    let mut objs = Vec::new();
    let mut nfev = 0;
    let mut nit = 0;
    let mut t = 0;
    let mut termination = Termination::MaxPasses;

    if callback(x.view(), 0) {
        termination = Termination::Callback;
    }
    while termination == Termination::MaxPasses && nit < config.passes {
        nit += 1;
        let mut grad_sum = Array1::<S>::zeros(n);
        let mut obj_sum = S::zero();
        let mut nbatches = 0;

        for rows in batches(nrows, batchsize, config.order, &mut rng) {
            let batch = data.select(Axis(0), &rows);
            let evaluation = objective.evaluate(&unflatten(x.view(), &shape)?, &batch, true)?;
            nfev += 1;
            let (value, mut grad) = flat_gradient(evaluation, &shape)?;
            if !value.is_finite() {
                return Err(divergence(t, "objective value", value));
            }
            if let Some(g) = grad.iter().find(|g| !g.is_finite()) {
                return Err(divergence(t, "gradient", *g));
            }

            if let Some((lower, upper)) = &limits {
                truncate_at_bounds(&mut grad, &x, lower, upper);
            }
            x += &stepper.step(&grad, config.rate, config.eta, t);
            t += 1;
            if let Some((lower, upper)) = &limits {
                clip(&mut x, lower, upper);
            }
            if let Some(xi) = x.iter().find(|xi| !xi.is_finite()) {
                return Err(divergence(t, "parameter", *xi));
            }

            grad_sum += &grad;
            obj_sum = obj_sum + value;
            nbatches += 1;
        }

        let count = S::from(nbatches).unwrap();
        let gnorm = norm(&(grad_sum / count));
        fun = obj_sum / count;
        norms.push(gnorm);
        if config.eval_obj {
            objs.push(fun);
        }
        log::debug!("sgd pass {}: objective {:e}, gradient norm {:e}", nit, fun, gnorm);

        if gnorm < config.gtol {
            termination = Termination::GradientNorm;
        } else if callback(x.view(), nit) {
            termination = Termination::Callback;
        } else if config.walltime.map_or(false, |w| start.elapsed() >= w) {
            termination = Termination::WallTime;
        }
    }

    let success = termination.converged();
    if success {
        log::info!("sgd converged after {} passes: {}", nit, termination);
    } else {
        log::warn!("sgd stopped after {} passes without converging: {}", nit, termination);
    }
    Ok(OptimizeResult {
        x: unflatten(x.view(), &shape)?,
        fun,
        success,
        termination,
        nit,
        nfev,
        norms,
        objs,
    })
}

/// Zero gradient components that would push `x` further past an active bound.
fn truncate_at_bounds<S: NdFloat>(
    grad: &mut Array1<S>,
    x: &Array1<S>,
    lower: &Array1<S>,
    upper: &Array1<S>,
) {
    for i in 0..grad.len() {
        if x[i] <= lower[i] {
            grad[i] = grad[i].min(S::zero());
        }
        if x[i] >= upper[i] {
            grad[i] = grad[i].max(S::zero());
        }
    }
}


#[cfg(all(rustc_nightly, test))]
mod benches {
    use super::*;
    use crate::testing::{make_quadratic, qobj};
    use test::Bencher;

    #[bench]
    fn sgd_quadratic_ten_passes(bench: &mut Bencher) {
        let data = make_quadratic(0);
        let w0 = Param::vector(array![0., 0., 0.]);
        let config = SgdConfig::default().passes(10).seed(0);
        bench.iter(|| sgd(qobj, &w0, &data, None, &config));
    }
}
