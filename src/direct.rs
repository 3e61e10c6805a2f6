//! Minimization via Direct Function Comparison, i.e. derivativeless
//!
//! The batch adapter hands derivative-free problems to a [`DerivativeFree`]
//! backend. [`NelderMead`] is always available; other backends (for example
//! bindings to an external library) plug in through the same trait.

use std::cmp::Ordering;

use crate::error::Result;
use crate::minimizer::clip;
use crate::param::Param;
use crate::result::{OptimizeResult, Termination};
use ndarray::prelude::*;
use ndarray::NdFloat; // includes LinalgScalar and ScalarOperand

/// A local optimizer that only compares function values.
///
/// `bounds` are element-wise lower and upper limits; a backend that cannot
/// honor them should return an error rather than ignore them. Errors raised
/// by `func` must be passed through unchanged.
pub trait DerivativeFree<S: NdFloat> {
    fn minimize(
        &mut self,
        func: &mut dyn FnMut(ArrayView1<S>) -> Result<S>,
        x0: ArrayView1<S>,
        bounds: Option<(&Array1<S>, &Array1<S>)>,
    ) -> Result<OptimizeResult<S>>;
}

/// Stopping criteria of [`nelder_mead`].
#[derive(Debug, Clone)]
pub struct NelderMeadConfig<S> {
    /// Maximum number of iterations, `None` for 200 per dimension.
    pub maxiter: Option<usize>,
    /// Largest distance between the best vertex and any other (default: 1e-8).
    pub xatol: S,
    /// Largest difference between the best value and any other (default: 1e-10).
    pub fatol: S,
}

impl<S: NdFloat> Default for NelderMeadConfig<S> {
    fn default() -> Self {
        NelderMeadConfig {
            maxiter: None,
            xatol: S::from(1e-8).unwrap(),
            fatol: S::from(1e-10).unwrap(),
        }
    }
}

/// The built-in [`DerivativeFree`] backend.
#[derive(Debug, Clone)]
pub struct NelderMead<S> {
    pub config: NelderMeadConfig<S>,
}

impl<S: NdFloat> Default for NelderMead<S> {
    fn default() -> Self {
        NelderMead::new(NelderMeadConfig::default())
    }
}

impl<S: NdFloat> NelderMead<S> {
    pub fn new(config: NelderMeadConfig<S>) -> Self {
        NelderMead { config }
    }
}

impl<S: NdFloat> DerivativeFree<S> for NelderMead<S> {
    fn minimize(
        &mut self,
        func: &mut dyn FnMut(ArrayView1<S>) -> Result<S>,
        x0: ArrayView1<S>,
        bounds: Option<(&Array1<S>, &Array1<S>)>,
    ) -> Result<OptimizeResult<S>> {
        nelder_mead(func, x0, bounds, &self.config)
    }
}

/// The Nelder–Mead method
///
/// Also known as the downhill simplex method, amoeba method, or polytope method.
/// This well-known method requires no gradients, but will generally be slower
/// than those methods that do. Note also, that while this method has seen
/// much emprical success in applications, there is not much theory
/// desribing when and if this method will converge to a minima. See
/// [Wikipedia](https://en.wikipedia.org/wiki/Nelder%E2%80%93Mead_method)
/// for more info.
///
/// With `bounds`, every trial point is clipped onto the box before it is
/// evaluated. Non-finite values rank as $`+\infty`$.
pub fn nelder_mead<S>(
    func: &mut dyn FnMut(ArrayView1<S>) -> Result<S>,
    x0: ArrayView1<S>,
    bounds: Option<(&Array1<S>, &Array1<S>)>,
    config: &NelderMeadConfig<S>,
) -> Result<OptimizeResult<S>>
where
    S: NdFloat,
{
    let n = x0.len();
    let maxiter = config.maxiter.unwrap_or(200 * n.max(1));

    let rho = S::one();
    let chi = S::from(2.).unwrap();
    let psi = S::from(0.5).unwrap();
    let sigma = S::from(0.5).unwrap();
    let gamma = rho * chi;
    let beta = psi * rho;

    let nonzero_delta = S::from(0.05).unwrap();
    let zero_delta = S::from(0.00025).unwrap();

    let project = |p: &mut Array1<S>| {
        if let Some((lower, upper)) = bounds {
            clip(p, lower, upper);
        }
    };
    let mut nfev = 0;
    let mut eval = |p: ArrayView1<S>| -> Result<S> {
        nfev += 1;
        let f = func(p)?;
        Ok(if f.is_nan() { S::infinity() } else { f })
    };

    // Initialize the simplex
    let mut start = x0.to_owned();
    project(&mut start);
    let mut simplex = start.broadcast((n + 1, n)).unwrap().to_owned();
    for k in 0..n {
        let delta = if start[k] != S::zero() {
            nonzero_delta * start[k]
        } else {
            zero_delta
        };
        let mut vertex = simplex.row(k + 1).to_owned();
        vertex[k] = start[k] + delta;
        project(&mut vertex);
        if vertex[k] == start[k] {
            // pinned at an upper limit, step inwards instead
            vertex[k] = start[k] - delta;
            project(&mut vertex);
        }
        simplex.row_mut(k + 1).assign(&vertex);
    }

    // Initialize inital function values and sort indices
    // the idea here is that we don't want to sort the simplex
    // because it could be large, just sort the indexes and use them
    let mut fvals = Vec::with_capacity(n + 1);
    for vertex in simplex.outer_iter() {
        fvals.push(eval(vertex)?);
    }
    let rank = |fvals: &[S], indices: &mut Vec<usize>| {
        indices.sort_unstable_by(|&x, &y| {
            fvals[x].partial_cmp(&fvals[y]).unwrap_or(Ordering::Equal)
        });
    };
    let mut ranked_indices: Vec<usize> = (0..=n).collect(); // len n+1
    rank(&fvals, &mut ranked_indices);
    let mut high_index = ranked_indices[n];
    let mut low_index = ranked_indices[0];

    let mut termination = Termination::MaxIterations;
    let mut nit = 0;
    // Run iterations of Nelder-Mead
    while nit < maxiter {
        if simplex_collapsed(&simplex, &fvals, low_index, config) {
            termination = Termination::SimplexSize;
            break;
        }
        nit += 1;

        // Compute the lower simplex centroid (aka average) p_bar
        let p_bar = ranked_indices[..n]
            .iter()
            .fold(Array1::<S>::zeros((n,)), |acc, &ii| acc + simplex.row(ii))
            / S::from(n).unwrap();

        // Compute reflected point
        let mut p_reflect = &p_bar * (S::one() + rho) - &simplex.row(high_index) * rho;
        project(&mut p_reflect);
        let f_reflect = eval(p_reflect.view())?;

        if f_reflect < fvals[low_index] {
            // Was the refection amazing?
            // Perform Simplex expansion
            let mut p_expand = &p_bar * (S::one() + gamma) - &simplex.row(high_index) * gamma;
            project(&mut p_expand);
            let f_expand = eval(p_expand.view())?;

            if f_expand < f_reflect {
                // Expansion Success, replace f_high
                simplex.row_mut(high_index).assign(&p_expand);
                fvals[high_index] = f_expand;
            } else {
                // Expansion Failed, use reflection
                simplex.row_mut(high_index).assign(&p_reflect);
                fvals[high_index] = f_reflect;
            }
        } else {
            // Ok, reflection wasn't "amazing", but is it atleast better?
            let next_high_index = ranked_indices[n - 1];
            if f_reflect < fvals[next_high_index] {
                // Ehh, Good enough
                simplex.row_mut(high_index).assign(&p_reflect);
                fvals[high_index] = f_reflect;
            } else {
                // Shoot!
                let mut do_shrink = false;
                if f_reflect < fvals[high_index] {
                    // could be worse
                    // Perform contraction
                    let mut p_contract =
                        &p_bar * (S::one() + beta) - &simplex.row(high_index) * beta;
                    project(&mut p_contract);
                    let f_contract = eval(p_contract.view())?;

                    if f_contract <= f_reflect {
                        // Contraction Success
                        simplex.row_mut(high_index).assign(&p_contract);
                        fvals[high_index] = f_contract;
                    } else {
                        do_shrink = true;
                    }
                } else {
                    // well that reflection was the worst
                    // Perform inside contraction
                    let mut p_contract = &p_bar * (S::one() - psi) + &simplex.row(high_index) * psi;
                    project(&mut p_contract);
                    let f_contract = eval(p_contract.view())?;

                    if f_contract < fvals[high_index] {
                        // Inside Contraction Success
                        simplex.row_mut(high_index).assign(&p_contract);
                        fvals[high_index] = f_contract;
                    } else {
                        do_shrink = true;
                    }
                };

                if do_shrink {
                    // Contraction failed
                    // on the bright-side, all our points are already amazing
                    // do shrink on all but the best one
                    for &ii in ranked_indices[1..].iter() {
                        let new_p = &(&simplex.row(ii) - &simplex.row(low_index)) * sigma
                            + &simplex.row(low_index);
                        simplex.row_mut(ii).assign(&new_p);
                        fvals[ii] = eval(simplex.row(ii))?;
                    }
                }
            }
        }

        // update rank of indices
        rank(&fvals, &mut ranked_indices);
        high_index = ranked_indices[n];
        low_index = ranked_indices[0];

        debug_assert!(!(fvals[low_index] > fvals[high_index]));
    }

    let x = simplex.row(low_index).to_owned();
    let fun = fvals[low_index];
    log::debug!("nelder-mead: {} after {} iterations, f = {:e}", termination, nit, fun);
    Ok(OptimizeResult {
        x: Param::vector(x),
        fun,
        success: termination.converged(),
        termination,
        nit,
        nfev,
        norms: Vec::new(),
        objs: Vec::new(),
    })
}

fn simplex_collapsed<S: NdFloat>(
    simplex: &Array2<S>,
    fvals: &[S],
    low_index: usize,
    config: &NelderMeadConfig<S>,
) -> bool {
    let best = simplex.row(low_index);
    let xspread = simplex.outer_iter().fold(S::zero(), |acc, vertex| {
        vertex
            .iter()
            .zip(best.iter())
            .fold(acc, |acc, (&v, &b)| acc.max((v - b).abs()))
    });
    let fspread = fvals
        .iter()
        .map(|&f| (f - fvals[low_index]).abs())
        .fold(S::zero(), S::max);
    xspread <= config.xatol && fspread <= config.fatol
}
