use num_traits::Float;

use super::{ContinuousDistribution, StatsError};
use crate::special::incomplete_gamma;

/// Chi-squared distribution with k degrees of freedom.
///
/// Special case of Gamma(k/2, 1/2).
#[derive(Debug, Clone, Copy)]
pub struct ChiSquared<T> {
    k: T,
}

impl<T: Float> ChiSquared<T> {
    /// Create a chi-squared distribution with `k` degrees of freedom. Requires `k > 0`.
    pub fn new(k: T) -> Result<Self, StatsError> {
        if !(k > T::zero()) || k.is_infinite() {
            return Err(StatsError::InvalidParameter);
        }
        Ok(Self { k })
    }

    /// Degrees of freedom.
    pub fn dof(&self) -> T {
        self.k
    }
}

impl<T: Float> ContinuousDistribution<T> for ChiSquared<T> {
    fn cdf(&self, x: T) -> T {
        if x <= T::zero() {
            return T::zero();
        }
        let two = T::one() + T::one();
        incomplete_gamma(self.k / two, x / two)
            .map(|g| g.p)
            .unwrap_or_else(|_| T::nan())
    }

    fn sf(&self, x: T) -> T {
        if x <= T::zero() {
            return T::one();
        }
        let two = T::one() + T::one();
        incomplete_gamma(self.k / two, x / two)
            .map(|g| g.q)
            .unwrap_or_else(|_| T::nan())
    }
}
