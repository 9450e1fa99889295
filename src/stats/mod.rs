//! Distributions used to grade a converged fit.
//!
//! The Poisson log-likelihood ratio of a fit against the saturated model is
//! asymptotically chi-squared distributed; [`ChiSquared::sf`] turns it into
//! a goodness-of-fit probability.
//!
//! ```
//! use spotfit::stats::{ChiSquared, ContinuousDistribution};
//!
//! let chi2 = ChiSquared::new(3.0_f64).unwrap();
//! assert_eq!(chi2.dof(), 3.0);
//! assert!((chi2.cdf(2.0) + chi2.sf(2.0) - 1.0).abs() < 1e-14);
//! ```

mod chi_squared;

#[cfg(test)]
mod tests;

pub use chi_squared::ChiSquared;

/// Errors from distribution construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    /// A parameter is out of its valid range.
    #[error("distribution parameter out of valid range")]
    InvalidParameter,
}

/// Tail probabilities of a continuous distribution.
pub trait ContinuousDistribution<T> {
    /// Cumulative distribution function P(X ≤ x).
    fn cdf(&self, x: T) -> T;
    /// Survival function P(X > x), computed without cancellation in the tail.
    fn sf(&self, x: T) -> T;
}
