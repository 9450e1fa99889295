//! Noise models scored by the fitter.
//!
//! | Objective | Per-sample score | Curvature weight |
//! |---|---|---|
//! | [`Objective::LeastSquares`] | `(x − f)²` | `1` |
//! | [`Objective::MaximumLikelihood`] | `f − x − x·ln(f/x)` | `x / f²` |
//!
//! Both scores are minimised. The likelihood score is half the Poisson
//! log-likelihood ratio against the saturated model, so `2·score` is
//! chi-squared distributed with `n − k` degrees of freedom at the optimum.

use std::sync::Arc;

use crate::fastlog::FastLog;
use crate::fit::FitError;

/// Observed intensities in row-major order, with optional per-pixel
/// variance (camera read noise).
///
/// The variance is added to both the observed and the predicted value of a
/// pixel before any objective sees them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SampleData {
    values: Vec<f64>,
    variances: Option<Vec<f64>>,
}

impl SampleData {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            variances: None,
        }
    }

    /// Data with one variance per pixel.
    pub fn with_variances(values: Vec<f64>, variances: Vec<f64>) -> Result<Self, FitError> {
        if variances.len() != values.len() {
            return Err(FitError::LengthMismatch {
                what: "variances",
                expected: values.len(),
                actual: variances.len(),
            });
        }
        if let Some(index) = variances.iter().position(|v| !(*v >= 0.0 && v.is_finite())) {
            return Err(FitError::InvalidVariance {
                index,
                value: variances[index],
            });
        }
        Ok(Self {
            values,
            variances: Some(variances),
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw observed values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn variances(&self) -> Option<&[f64]> {
        self.variances.as_deref()
    }

    /// Variance of pixel `i` (zero when none was supplied).
    #[inline]
    pub fn variance(&self, i: usize) -> f64 {
        self.variances.as_ref().map_or(0.0, |v| v[i])
    }

    /// Observed value of pixel `i` including its variance.
    #[inline]
    pub fn observed(&self, i: usize) -> f64 {
        self.values[i] + self.variance(i)
    }
}

impl From<Vec<f64>> for SampleData {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

/// Logarithm used by the likelihood score.
#[derive(Debug, Clone, Default)]
pub enum LogMethod {
    #[default]
    Exact,
    /// Shared lookup table.
    Table(Arc<FastLog>),
}

/// Poisson maximum-likelihood scoring.
#[derive(Debug, Clone, Default)]
pub struct Likelihood {
    log: LogMethod,
}

impl Likelihood {
    /// Likelihood with the exact logarithm.
    pub fn new() -> Self {
        Self::default()
    }

    /// Likelihood scoring with a shared [`FastLog`] table.
    pub fn with_fast_log(table: Arc<FastLog>) -> Self {
        Self {
            log: LogMethod::Table(table),
        }
    }

    pub fn log_method(&self) -> &LogMethod {
        &self.log
    }

    #[inline]
    fn ln(&self, x: f64) -> f64 {
        match &self.log {
            LogMethod::Exact => x.ln(),
            LogMethod::Table(table) => table.ln(x),
        }
    }

    /// Score of one sample: `f − x − x·ln(f/x)`, or `f` when `x = 0`.
    ///
    /// A non-positive prediction has no likelihood and scores `+∞`; a NaN
    /// prediction scores NaN.
    #[inline]
    pub fn sample_score(&self, predicted: f64, observed: f64) -> f64 {
        if predicted.is_nan() {
            return f64::NAN;
        }
        if predicted <= 0.0 {
            return f64::INFINITY;
        }
        if observed == 0.0 {
            predicted
        } else {
            predicted - observed - observed * self.ln(predicted / observed)
        }
    }
}

/// How residuals are scored.
#[derive(Debug, Clone, Default)]
pub enum Objective {
    /// Gaussian noise: sum of squared residuals.
    #[default]
    LeastSquares,
    /// Poisson noise: likelihood ratio against the saturated model.
    MaximumLikelihood(Likelihood),
}

impl Objective {
    /// Maximum likelihood with the exact logarithm.
    pub fn maximum_likelihood() -> Self {
        Objective::MaximumLikelihood(Likelihood::new())
    }

    pub fn is_likelihood(&self) -> bool {
        matches!(self, Objective::MaximumLikelihood(_))
    }

    /// Reject data the objective cannot score.
    pub fn validate(&self, data: &SampleData) -> Result<(), FitError> {
        for i in 0..data.len() {
            let x = data.observed(i);
            if !x.is_finite() {
                return Err(FitError::NonFiniteObservation { index: i });
            }
            if self.is_likelihood() && x < 0.0 {
                return Err(FitError::NegativeObservation { index: i, value: x });
            }
        }
        Ok(())
    }

    /// Score contribution of one sample (both values already include any
    /// pixel variance).
    #[inline]
    pub fn sample_score(&self, predicted: f64, observed: f64) -> f64 {
        match self {
            Objective::LeastSquares => {
                let r = observed - predicted;
                r * r
            }
            Objective::MaximumLikelihood(l) => l.sample_score(predicted, observed),
        }
    }

    /// Total score of `predicted` against `data`.
    pub fn score(&self, predicted: impl IntoIterator<Item = f64>, data: &SampleData) -> f64 {
        predicted
            .into_iter()
            .enumerate()
            .map(|(i, f)| self.sample_score(f + data.variance(i), data.observed(i)))
            .sum()
    }

    /// Log-likelihood ratio for a final score; `None` for least squares.
    pub fn log_likelihood_ratio(&self, score: f64) -> Option<f64> {
        self.is_likelihood().then_some(2.0 * score)
    }
}
