//! Special functions needed for goodness-of-fit statistics.
//!
//! Generic over [`num_traits::Float`] (f32/f64) and allocation free.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`lgamma`] | Log-gamma ln Γ(x) |
//! | [`gamma_inc`] | Regularized lower incomplete gamma P(a,x) |
//! | [`gamma_inc_upper`] | Regularized upper incomplete gamma Q(a,x) = 1−P(a,x) |
//! | [`incomplete_gamma`] | Both halves at once |
//!
//! ```
//! use spotfit::special::{lgamma, gamma_inc_upper};
//!
//! // ln Γ(1) = 0
//! assert!(lgamma(1.0_f64).abs() < 1e-14);
//!
//! // Q(1, x) = e^{−x}
//! assert!((gamma_inc_upper(1.0_f64, 2.0).unwrap() - (-2.0_f64).exp()).abs() < 1e-14);
//! ```

use num_traits::Float;

mod gamma_fn;
mod incgamma;


pub use gamma_fn::lgamma;
pub use incgamma::{gamma_inc, gamma_inc_upper, incomplete_gamma, IncompleteGamma};

/// Errors from special function evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SpecialError {
    /// Series or continued fraction did not converge within the iteration limit.
    #[error("series/continued fraction did not converge")]
    ConvergenceFailure,
    /// Input outside the function's domain (e.g. a ≤ 0 or x < 0 for incomplete gamma).
    #[error("input outside function domain")]
    DomainError,
}

// Lanczos approximation constants (g = 7, n = 9).
// Coefficients from Paul Godfrey / Boost / CPython.

pub(crate) const LANCZOS_G: f64 = 7.0;

pub(crate) const LANCZOS_COEFFS: [f64; 9] = [
    0.99999999999980993,
    676.5203681218851,
    -1259.1392167224028,
    771.32342877765313,
    -176.61502916214059,
    12.507343278686905,
    -0.13857109526572012,
    9.9843695780195716e-6,
    1.5056327351493116e-7,
];

/// Converts an `f64` constant into `T`; every constant used here is
/// representable in both f32 and f64.
#[inline]
pub(crate) fn cst<T: Float>(v: f64) -> T {
    T::from(v).unwrap_or_else(T::nan)
}

/// Evaluate the Lanczos series Ag(z) = c0 + c1/(z+1) + c2/(z+2) + ...
#[inline]
pub(crate) fn lanczos_sum<T: Float>(z: T) -> T {
    LANCZOS_COEFFS[1..]
        .iter()
        .enumerate()
        .fold(cst(LANCZOS_COEFFS[0]), |sum, (i, &c)| {
            sum + cst::<T>(c) / (z + cst((i + 1) as f64))
        })
}
