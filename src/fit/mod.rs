//! Fitting a model to one window of pixel data.
//!
//! [`fit`] validates its inputs, runs the damped Gauss-Newton
//! [`StepSolver`](lvm::StepSolver) and, on success, estimates parameter
//! precision with [`PrecisionEstimator`](precision::PrecisionEstimator).
//!
//! | Stage | Type | Failure mode |
//! |---|---|---|
//! | configuration | [`FitError`] | returned as `Err` before any evaluation |
//! | iteration | [`FitStatus`] | `Failed(reason)` / `MaxIterationsReached` in the result |
//! | precision | [`Precision`] | `Unavailable`, logged at warn |
//!
//! ```
//! use spotfit::fit::{fit, FitSettings, SampleData};
//! use spotfit::model::{param, GaussianModel, GaussianShape, Model};
//! use spotfit::objective::Objective;
//!
//! let mut model = GaussianModel::new(GaussianShape::Circular, 9, 9, 1).unwrap();
//! let mut truth = vec![0.0; param::count(1)];
//! truth[param::BACKGROUND] = 5.0;
//! truth[param::SIGNAL] = 800.0;
//! truth[param::X_POSITION] = 4.3;
//! truth[param::Y_POSITION] = 4.6;
//! truth[param::X_WIDTH] = 1.3;
//! model.initialise(&truth);
//! let data = SampleData::new(model.values().collect());
//!
//! let mut guess = truth.clone();
//! guess[param::X_POSITION] = 4.0;
//! guess[param::SIGNAL] = 600.0;
//! let result = fit(
//!     &mut model,
//!     &Objective::maximum_likelihood(),
//!     &guess,
//!     &data,
//!     None,
//!     None,
//!     &FitSettings::default(),
//! )
//! .unwrap();
//! assert!(result.status.is_converged());
//! assert!((result.parameters[param::X_POSITION] - 4.3).abs() < 1e-4);
//! ```

mod batch;
pub mod lvm;
pub mod precision;


pub use batch::{fit_batch, FitJob};
pub use lvm::{Solution, StepSolver};
pub use precision::{Precision, PrecisionEstimator, PrecisionSettings};

pub use crate::objective::SampleData;

use crate::bounds::{Clamp, ParameterBounds};
use crate::convergence::{ConvergenceChecker, ToleranceSettings};
use crate::model::{Model, ModelError};
use crate::objective::Objective;
use crate::stats::{ChiSquared, ContinuousDistribution};

/// Configuration errors, raised before a fit starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("no convergence criterion is enabled")]
    NoConvergenceCriterion,
    #[error("{what}: expected length {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("lower bound {lower} exceeds upper bound {upper} at parameter {index}")]
    InvalidBounds { index: usize, lower: f64, upper: f64 },
    #[error("clamp limit {value} at parameter {index} must be positive")]
    InvalidClamp { index: usize, value: f64 },
    #[error("observation {value} at pixel {index} is negative; the likelihood is undefined")]
    NegativeObservation { index: usize, value: f64 },
    #[error("observation at pixel {index} is not finite")]
    NonFiniteObservation { index: usize },
    #[error("variance {value} at pixel {index} must be finite and non-negative")]
    InvalidVariance { index: usize, value: f64 },
    #[error("initial parameter {index} is not finite")]
    NonFiniteParameter { index: usize },
    #[error("invalid damping settings: {0}")]
    InvalidDamping(&'static str),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Why a fit stopped without converging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FailureReason {
    /// The damped system stayed singular after every retry.
    SingularMatrix,
    /// A candidate produced non-finite gradients or curvature.
    InvalidGradients,
    /// Too many consecutive rejected steps.
    NoImprovement,
    /// The initial parameters do not have a finite score.
    InvalidStart,
}

/// Terminal state of a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FitStatus {
    Converged,
    MaxIterationsReached,
    Failed(FailureReason),
}

impl FitStatus {
    pub fn is_converged(self) -> bool {
        self == FitStatus::Converged
    }

    pub fn is_failed(self) -> bool {
        matches!(self, FitStatus::Failed(_))
    }
}

/// Levenberg-Marquardt damping schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DampingSettings {
    /// Starting λ.
    pub initial_lambda: f64,
    /// λ multiplier after a rejected step or singular solve (> 1).
    pub lambda_increase: f64,
    /// λ multiplier after an accepted step (in `(0, 1)`).
    pub lambda_decrease: f64,
    /// Solves retried with a larger λ before giving up.
    pub max_singular_retries: usize,
    /// Consecutive rejected candidates tolerated.
    pub max_rejections: usize,
}

impl Default for DampingSettings {
    fn default() -> Self {
        Self {
            initial_lambda: 0.01,
            lambda_increase: 10.0,
            lambda_decrease: 0.1,
            max_singular_retries: 10,
            max_rejections: 10,
        }
    }
}

impl DampingSettings {
    pub fn validate(&self) -> Result<(), FitError> {
        if !(self.initial_lambda > 0.0 && self.initial_lambda.is_finite()) {
            return Err(FitError::InvalidDamping("initial lambda must be positive"));
        }
        if !(self.lambda_increase > 1.0 && self.lambda_increase.is_finite()) {
            return Err(FitError::InvalidDamping("lambda increase must exceed 1"));
        }
        if !(self.lambda_decrease > 0.0 && self.lambda_decrease < 1.0) {
            return Err(FitError::InvalidDamping("lambda decrease must lie in (0, 1)"));
        }
        Ok(())
    }
}

/// Everything that configures a fit apart from its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FitSettings {
    pub tolerance: ToleranceSettings,
    pub damping: DampingSettings,
    pub precision: PrecisionSettings,
}

/// Outcome of [`fit`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FitResult {
    pub status: FitStatus,
    /// Final parameters (the last accepted point).
    pub parameters: Vec<f64>,
    /// Accepted iterations.
    pub iterations: usize,
    /// Score evaluations, including rejected candidates.
    pub evaluations: usize,
    pub score: f64,
    /// `2·score` under maximum likelihood.
    pub log_likelihood_ratio: Option<f64>,
    /// Chi-squared survival probability of the log-likelihood ratio.
    pub goodness_of_fit: Option<f64>,
    pub precision: Precision,
}

/// Fit `model` to `data` starting from `initial`.
///
/// `initial` is a full parameter vector (see [`crate::model::param`]); it is
/// clipped into `bounds` before the first evaluation. Slots the model does
/// not optimise are returned unchanged. On return the model is initialised
/// with the final parameters.
pub fn fit<M: Model>(
    model: &mut M,
    objective: &Objective,
    initial: &[f64],
    data: &SampleData,
    bounds: Option<&ParameterBounds>,
    clamp: Option<Clamp>,
    settings: &FitSettings,
) -> Result<FitResult, FitError> {
    let layout = model.layout().clone();
    let n = layout.parameter_count();
    if initial.len() != n {
        return Err(FitError::LengthMismatch {
            what: "initial parameters",
            expected: n,
            actual: initial.len(),
        });
    }
    if data.len() != model.size() {
        return Err(FitError::LengthMismatch {
            what: "sample data",
            expected: model.size(),
            actual: data.len(),
        });
    }
    if let Some(index) = initial.iter().position(|v| !v.is_finite()) {
        return Err(FitError::NonFiniteParameter { index });
    }
    let unbounded = ParameterBounds::unbounded();
    let bounds = bounds.unwrap_or(&unbounded);
    bounds.check_len(n)?;
    if let Some(c) = &clamp {
        if c.len() != n {
            return Err(FitError::LengthMismatch {
                what: "clamp limits",
                expected: n,
                actual: c.len(),
            });
        }
    }
    settings.damping.validate()?;
    objective.validate(data)?;
    let checker = ConvergenceChecker::new(settings.tolerance, &layout)?;

    let mut solver = StepSolver::new(&layout, settings.damping);
    let solution = solver.solve(model, objective, data, bounds, clamp, &checker, initial);
    model.initialise(&solution.parameters);

    let log_likelihood_ratio = match solution.status {
        FitStatus::Failed(_) => None,
        _ => objective.log_likelihood_ratio(solution.score),
    };
    let goodness_of_fit = log_likelihood_ratio.and_then(|llr| {
        let dof = data.len().checked_sub(layout.active_count()).filter(|&d| d > 0)?;
        ChiSquared::new(dof as f64).ok().map(|chi| chi.sf(llr))
    });

    let precision = if settings.precision.compute && !solution.status.is_failed() {
        PrecisionEstimator::new(&layout, settings.precision).estimate(model, data)
    } else {
        Precision::Unavailable
    };

    Ok(FitResult {
        status: solution.status,
        parameters: solution.parameters,
        iterations: solution.iterations,
        evaluations: solution.evaluations,
        score: solution.score,
        log_likelihood_ratio,
        goodness_of_fit,
        precision,
    })
}
