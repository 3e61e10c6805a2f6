use std::convert::TryFrom;

use ndarray::prelude::*;
use ndarray::NdFloat;
use rand::seq::SliceRandom;
use rand::Rng;

/// Step size rule for stochastic gradient descent
#[derive(Debug, Clone, PartialEq)]
pub enum Schedule<S> {
    /// ADADELTA per-coordinate steps [\[Z12\]](#references), with `rate` the
    /// decay $`\rho`$ of the running averages and `eta` the floor $`\epsilon`$
    /// that keeps the step from collapsing to zero.
    ///
    /// ```math
    /// \begin{aligned}
    /// E[g^2]_t &= \rho E[g^2]_{t-1} + (1 - \rho) g_t^2 \\
    /// \Delta w_t &= - \frac{\sqrt{E[\Delta w^2]_{t-1} + \epsilon}}{\sqrt{E[g^2]_t + \epsilon}} g_t \\
    /// E[\Delta w^2]_t &= \rho E[\Delta w^2]_{t-1} + (1 - \rho) \Delta w_t^2
    /// \end{aligned}
    /// ```
    ///
    /// References
    /// ----------
    /// \[Z12\]: [ Zeiler, M. D., "ADADELTA: An Adaptive Learning Rate Method",
    ///            arxiv 1212.5701, (2012) ](https://arxiv.org/abs/1212.5701)
    Adadelta,

    /// Plain gradient steps with a geometrically decaying rate floored at `eta`,
    /// ```math
    /// \Delta w_t = - \max(\mathrm{rate} \cdot \mathrm{decay}^t, \eta) \, g_t
    /// ```
    /// where `decay` must lie in $`(0, 1]`$.
    Geometric { decay: S },
}

impl<S> Default for Schedule<S> {
    fn default() -> Self {
        Schedule::Adadelta
    }
}

/// Order in which rows are grouped into batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOrder {
    /// Reshuffled every pass, sampled without replacement.
    Shuffled,
    /// Contiguous rows in data order.
    Sequential,
}

impl Default for BatchOrder {
    fn default() -> Self {
        BatchOrder::Shuffled
    }
}

/// Row indices of each batch in one pass; the last batch may be short.
pub(crate) fn batches<R: Rng>(
    nrows: usize,
    batchsize: usize,
    order: BatchOrder,
    rng: &mut R,
) -> Vec<Vec<usize>> {
    let mut rows: Vec<usize> = (0..nrows).collect();
    if order == BatchOrder::Shuffled {
        rows.shuffle(rng);
    }
    rows.chunks(batchsize).map(<[usize]>::to_vec).collect()
}

/// Running state of a [`Schedule`] over one optimization call.
pub(crate) enum Stepper<S> {
    Adadelta { gms: Array1<S>, xms: Array1<S> },
    Geometric { decay: S },
}

impl<S: NdFloat> Stepper<S> {
    pub(crate) fn new(schedule: &Schedule<S>, dim: usize) -> Self {
        match schedule {
            Schedule::Adadelta => Stepper::Adadelta {
                gms: Array1::zeros(dim),
                xms: Array1::zeros(dim),
            },
            Schedule::Geometric { decay } => Stepper::Geometric { decay: *decay },
        }
    }

    /// The update $`\Delta w_t`$ for gradient `grad` at update count `t`.
    pub(crate) fn step(&mut self, grad: &Array1<S>, rate: S, eta: S, t: usize) -> Array1<S> {
        match self {
            Stepper::Adadelta { gms, xms } => {
                let keep = S::one() - rate;
                gms.zip_mut_with(grad, |m, &g| *m = rate * *m + keep * g * g);
                let dx = (xms.mapv(|x| (x + eta).sqrt()) / gms.mapv(|m| (m + eta).sqrt()) * grad)
                    .mapv_into(|d| -d);
                xms.zip_mut_with(&dx, |m, &d| *m = rate * *m + keep * d * d);
                dx
            }
            Stepper::Geometric { decay } => {
                let exponent = i32::try_from(t).unwrap_or(i32::MAX);
                let step = (rate * decay.powi(exponent)).max(eta);
                grad * (-step)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn batches_cover_rows_once() {
        let mut rng = StdRng::seed_from_u64(3);
        let b = batches(10, 4, BatchOrder::Shuffled, &mut rng);
        assert_eq!(b.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 4, 2]);
        let mut all: Vec<usize> = b.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());

        let b = batches(5, 2, BatchOrder::Sequential, &mut rng);
        assert_eq!(b, vec![vec![0, 1], vec![2, 3], vec![4]]);
    }

    #[test]
    fn batches_reproducible_from_seed() {
        let a = batches(50, 7, BatchOrder::Shuffled, &mut StdRng::seed_from_u64(11));
        let b = batches(50, 7, BatchOrder::Shuffled, &mut StdRng::seed_from_u64(11));
        assert_eq!(a, b);
    }

    #[test]
    fn geometric_rate_floor() {
        let mut stepper = Stepper::new(&Schedule::Geometric { decay: 0.5 }, 1);
        let g = array![1.0];
        assert_abs_diff_eq!(stepper.step(&g, 0.8, 0.1, 0), array![-0.8]);
        assert_abs_diff_eq!(stepper.step(&g, 0.8, 0.1, 1), array![-0.4]);
        assert_abs_diff_eq!(stepper.step(&g, 0.8, 0.1, 5), array![-0.1]);
        assert_abs_diff_eq!(stepper.step(&g, 0.8, 0.1, 1_000_000), array![-0.1]);
    }

    #[test]
    fn adadelta_first_step() {
        let mut stepper = Stepper::new(&Schedule::Adadelta, 2);
        let g = array![2.0, -0.5];
        let dx = stepper.step(&g, 0.9, 1e-6, 0);
        // E[g^2] = 0.1 g^2 and E[dw^2] = 0
        let expect = g.mapv(|gi: f64| -(1e-6f64).sqrt() / (0.1 * gi * gi + 1e-6).sqrt() * gi);
        assert_abs_diff_eq!(dx, expect, epsilon = 1e-12);
        assert!(dx[0] < 0. && dx[1] > 0.);
    }
}
