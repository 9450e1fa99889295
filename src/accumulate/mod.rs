//! Curvature matrix and gradient vector accumulation.
//!
//! An [`Accumulator`] folds a model's `(value, gradient)` samples into
//!
//! - `alpha`, the symmetric `n × n` curvature matrix (row-major),
//! - `beta`, the length-`n` gradient vector,
//! - the objective score,
//!
//! where `n` is the number of active parameters. Only the lower triangle is
//! written while folding; [`Accumulator::finalize_matrix`] mirrors it.
//!
//! For `n` in `4..=7` (a single peak with 4 to 7 free parameters, by far
//! the common case) the factory picks a fixed-width kernel whose loops the
//! compiler unrolls. The result is the same to the last bit as the generic
//! kernel since both perform the same operations in the same order.

mod unrolled;


use crate::model::Model;
use crate::objective::{Objective, SampleData};

/// Which information matrix [`Accumulator::accumulate_information`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Information {
    /// Observed information, `Σ g·(x/f²)·gᵀ`.
    #[default]
    Observed,
    /// Expected Fisher information, `Σ g·gᵀ / f`.
    Expected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    Generic,
    Fixed4,
    Fixed5,
    Fixed6,
    Fixed7,
}

impl Kernel {
    fn for_size(n: usize) -> Self {
        match n {
            4 => Kernel::Fixed4,
            5 => Kernel::Fixed5,
            6 => Kernel::Fixed6,
            7 => Kernel::Fixed7,
            _ => Kernel::Generic,
        }
    }
}

/// Reusable curvature/gradient buffers for one fit.
#[derive(Debug, Clone)]
pub struct Accumulator {
    n: usize,
    kernel: Kernel,
    alpha: Vec<f64>,
    beta: Vec<f64>,
    score: f64,
}

impl Accumulator {
    /// Accumulator for `n` active parameters.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            kernel: Kernel::for_size(n),
            alpha: vec![0.0; n * n],
            beta: vec![0.0; n],
            score: 0.0,
        }
    }

    /// Force the generic kernel regardless of size.
    #[cfg(test)]
    fn generic(n: usize) -> Self {
        Self {
            kernel: Kernel::Generic,
            ..Self::new(n)
        }
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// True if a size-specialised kernel is in use.
    pub fn is_specialised(&self) -> bool {
        self.kernel != Kernel::Generic
    }

    /// Zero all buffers.
    pub fn reset(&mut self) {
        self.alpha.fill(0.0);
        self.beta.fill(0.0);
        self.score = 0.0;
    }

    /// Curvature matrix, row-major.
    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    pub fn beta(&self) -> &[f64] {
        &self.beta
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    /// True if every entry of `alpha` and `beta` is finite.
    pub fn is_finite(&self) -> bool {
        self.alpha.iter().chain(&self.beta).all(|v| v.is_finite())
    }

    /// Copy the lower triangle of `alpha` into the upper triangle.
    pub fn finalize_matrix(&mut self) {
        let n = self.n;
        for i in 0..n {
            for j in (i + 1)..n {
                self.alpha[i * n + j] = self.alpha[j * n + i];
            }
        }
    }

    #[inline]
    fn add_weighted_outer(&mut self, g: &[f64], w: f64) {
        match self.kernel {
            Kernel::Fixed4 => unrolled::add_weighted_outer::<4>(&mut self.alpha, g, w),
            Kernel::Fixed5 => unrolled::add_weighted_outer::<5>(&mut self.alpha, g, w),
            Kernel::Fixed6 => unrolled::add_weighted_outer::<6>(&mut self.alpha, g, w),
            Kernel::Fixed7 => unrolled::add_weighted_outer::<7>(&mut self.alpha, g, w),
            Kernel::Generic => {
                let n = self.n;
                for i in 0..n {
                    let wi = w * g[i];
                    for j in 0..=i {
                        self.alpha[i * n + j] += wi * g[j];
                    }
                }
            }
        }
    }

    #[inline]
    fn add_scaled(&mut self, g: &[f64], s: f64) {
        match self.kernel {
            Kernel::Fixed4 => unrolled::add_scaled::<4>(&mut self.beta, g, s),
            Kernel::Fixed5 => unrolled::add_scaled::<5>(&mut self.beta, g, s),
            Kernel::Fixed6 => unrolled::add_scaled::<6>(&mut self.beta, g, s),
            Kernel::Fixed7 => unrolled::add_scaled::<7>(&mut self.beta, g, s),
            Kernel::Generic => {
                for (b, gi) in self.beta.iter_mut().zip(g) {
                    *b += s * gi;
                }
            }
        }
    }

    /// Add one least-squares sample with residual `r = x − f`.
    #[inline]
    pub fn add_least_squares(&mut self, g: &[f64], r: f64) {
        self.add_weighted_outer(g, 1.0);
        self.add_scaled(g, r);
        self.score += r * r;
    }

    /// Add one Poisson likelihood sample with prediction `f > 0` and
    /// observation `x ≥ 0`. The score is not touched.
    #[inline]
    pub fn add_likelihood(&mut self, g: &[f64], f: f64, x: f64) {
        if x == 0.0 {
            self.add_scaled(g, -1.0);
        } else {
            let ratio = x / f;
            self.add_scaled(g, ratio - 1.0);
            self.add_weighted_outer(g, ratio / f);
        }
    }

    /// Evaluate an initialised model against `data` and return the score.
    ///
    /// Under maximum likelihood a non-positive prediction stops the fold and
    /// returns `+∞`; `alpha` and `beta` are then incomplete and must not be
    /// used.
    pub fn accumulate<M: Model>(
        &mut self,
        model: &M,
        objective: &Objective,
        data: &SampleData,
    ) -> f64 {
        debug_assert_eq!(model.gradient_count(), self.n);
        debug_assert_eq!(model.size(), data.len());
        self.reset();
        let mut samples = model.samples1();
        match objective {
            Objective::LeastSquares => {
                // Equal variance on both sides cancels in the residual.
                let mut i = 0;
                while let Some((f, g)) = samples.next_sample() {
                    let r = data.values()[i] - f;
                    self.add_least_squares(g, r);
                    i += 1;
                }
            }
            Objective::MaximumLikelihood(likelihood) => {
                let mut i = 0;
                while let Some((f, g)) = samples.next_sample() {
                    let f = f + data.variance(i);
                    let x = data.observed(i);
                    let s = likelihood.sample_score(f, x);
                    if s == f64::INFINITY {
                        self.score = f64::INFINITY;
                        return self.score;
                    }
                    self.add_likelihood(g, f, x);
                    self.score += s;
                    i += 1;
                }
            }
        }
        self.finalize_matrix();
        self.score
    }

    /// Build the un-damped Poisson information matrix of an initialised
    /// model. Returns `false` if some prediction is not positive.
    pub fn accumulate_information<M: Model>(
        &mut self,
        model: &M,
        data: &SampleData,
        information: Information,
    ) -> bool {
        debug_assert_eq!(model.gradient_count(), self.n);
        self.reset();
        let mut samples = model.samples1();
        let mut i = 0;
        while let Some((f, g)) = samples.next_sample() {
            let f = f + data.variance(i);
            if !(f > 0.0) {
                return false;
            }
            let w = match information {
                Information::Observed => data.observed(i) / (f * f),
                Information::Expected => 1.0 / f,
            };
            self.add_weighted_outer(g, w);
            i += 1;
        }
        self.finalize_matrix();
        true
    }
}
