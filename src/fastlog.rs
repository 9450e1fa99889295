//! Table-driven natural logarithm.
//!
//! The Poisson likelihood score takes one logarithm per pixel per
//! evaluation. [`FastLog`] trades accuracy for speed by looking up the
//! logarithm of the leading mantissa bits in a precomputed table. The table
//! is immutable after construction, so one instance is built up front and
//! shared (typically behind an `Arc`) by every fit that wants it; nothing is
//! cached globally.
//!
//! ```
//! use spotfit::fastlog::FastLog;
//!
//! let log = FastLog::new(13);
//! assert!((log.ln(10.0) - 10.0_f64.ln()).abs() <= log.max_error());
//! ```

use core::f64::consts::LN_2;

const MANTISSA_BITS: u32 = 52;
const EXPONENT_MASK: u64 = 0x7ff;
const EXPONENT_BIAS: i64 = 1023;

/// Largest supported table precision (8 MiB table).
pub const MAX_BITS: u32 = 20;

/// Default table precision.
pub const DEFAULT_BITS: u32 = 13;

/// Natural logarithm from a table of `2^bits` mantissa entries.
#[derive(Debug, Clone)]
pub struct FastLog {
    bits: u32,
    table: Vec<f64>,
}

impl FastLog {
    /// Build a table using the top `bits` mantissa bits, clamped to `1..=MAX_BITS`.
    pub fn new(bits: u32) -> Self {
        let bits = bits.clamp(1, MAX_BITS);
        let size = 1usize << bits;
        // Each entry is ln of the bin midpoint, halving the worst-case error.
        let table = (0..size)
            .map(|i| (1.0 + (i as f64 + 0.5) / size as f64).ln())
            .collect();
        Self { bits, table }
    }

    /// Number of mantissa bits resolved by the table.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Worst-case absolute error of [`FastLog::ln`] for normal positive input.
    pub fn max_error(&self) -> f64 {
        (0.5f64).powi(self.bits as i32 + 1)
    }

    /// Approximate `x.ln()`.
    ///
    /// Zero, negative, subnormal and non-finite arguments fall through to
    /// the exact `f64::ln`, so special values behave identically.
    #[inline]
    pub fn ln(&self, x: f64) -> f64 {
        let raw = x.to_bits();
        let exponent = ((raw >> MANTISSA_BITS) & EXPONENT_MASK) as i64;
        if x <= 0.0 || exponent == 0 || exponent == EXPONENT_MASK as i64 {
            return x.ln();
        }
        let mantissa = raw & ((1u64 << MANTISSA_BITS) - 1);
        let index = (mantissa >> (MANTISSA_BITS - self.bits)) as usize;
        (exponent - EXPONENT_BIAS) as f64 * LN_2 + self.table[index]
    }
}

impl Default for FastLog {
    fn default() -> Self {
        Self::new(DEFAULT_BITS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_within_bound() {
        for bits in [4, 8, 13] {
            let log = FastLog::new(bits);
            let mut x = 1e-6;
            while x < 1e7 {
                let err = (log.ln(x) - x.ln()).abs();
                assert!(err <= log.max_error() * 1.000001, "bits {bits}, x {x}: err {err}");
                x *= 1.37;
            }
        }
    }

    #[test]
    fn powers_of_two_close_to_exact() {
        let log = FastLog::new(10);
        for k in -20..20 {
            let x = 2f64.powi(k);
            assert!((log.ln(x) - x.ln()).abs() <= log.max_error());
        }
    }

    #[test]
    fn special_values_pass_through() {
        let log = FastLog::default();
        assert_eq!(log.ln(0.0), f64::NEG_INFINITY);
        assert!(log.ln(-1.0).is_nan());
        assert!(log.ln(f64::NAN).is_nan());
        assert_eq!(log.ln(f64::INFINITY), f64::INFINITY);
        assert_eq!(log.ln(f64::MIN_POSITIVE / 4.0), (f64::MIN_POSITIVE / 4.0).ln());
    }

    #[test]
    fn bits_are_clamped() {
        assert_eq!(FastLog::new(0).bits(), 1);
        assert_eq!(FastLog::new(64).bits(), MAX_BITS);
    }
}
