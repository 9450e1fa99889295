//! # spotfit
//!
//! Sub-pixel fitting of point-spread-function (PSF) models to small windows
//! of pixel intensities. A damped Gauss-Newton (Levenberg-Marquardt) solver
//! recovers background, signal, position and shape of one or more emitters
//! under Gaussian (least-squares) or Poisson (maximum-likelihood) noise, and
//! reports Cramér-Rao lower bounds on the fitted parameters.
//!
//! ## Quick start
//!
//! ```
//! use spotfit::{fit, FitSettings, GaussianModel, GaussianShape, Model, Objective, SampleData};
//! use spotfit::model::param;
//!
//! let mut model = GaussianModel::new(GaussianShape::Circular, 7, 7, 1).unwrap();
//! let mut truth = vec![0.0; param::count(1)];
//! truth[param::BACKGROUND] = 10.0;
//! truth[param::SIGNAL] = 1000.0;
//! truth[param::X_POSITION] = 3.5;
//! truth[param::Y_POSITION] = 3.5;
//! truth[param::X_WIDTH] = 1.2;
//! model.initialise(&truth);
//! let data = SampleData::new(model.values().collect());
//!
//! let mut guess = truth.clone();
//! guess[param::X_POSITION] += 0.4;
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
//! let sd = result.precision.standard_deviations().unwrap();
//! assert!(sd[param::X_POSITION] < 0.1);
//! ```
//!
//! ## Modules
//!
//! | Module | Contents |
//! |---|---|
//! | [`model`] | [`Model`] trait, Gaussian family and cubic-spline PSFs, parameter layout |
//! | [`objective`] | least-squares and Poisson likelihood scoring, [`SampleData`] |
//! | [`accumulate`] | curvature matrix / gradient accumulation with size-specialised kernels |
//! | [`bounds`] | box constraints and adaptive step clamping |
//! | [`convergence`] | tolerance checks and iteration cap |
//! | [`fit`] | [`fit()`], the LM step solver, CRLB precision, batches |
//! | [`linalg`] | Cholesky / LU solves and inverses of small symmetric systems |
//! | [`special`] | log-gamma, regularised incomplete gamma |
//! | [`stats`] | chi-squared distribution for goodness of fit |
//! | [`fastlog`] | table-driven logarithm for the likelihood score |
//!
//! ## Cargo features
//!
//! | Feature | Default | Description |
//! |---|---|---|
//! | `parallel` | no | [`fit::fit_batch`] runs jobs on the rayon pool |
//! | `serde` | no | `Serialize`/`Deserialize` for settings and results |
//! | `all` | no | every feature |
//!
//! ## Logging
//!
//! Diagnostics go through the [`log`] facade: `trace` for every iteration,
//! `debug` when a fit terminates and `warn` when precision cannot be
//! estimated. No logger is installed by the library.

pub mod accumulate;
pub mod bounds;
pub mod convergence;
pub mod fastlog;
pub mod fit;
pub mod linalg;
pub mod model;
pub mod objective;
pub mod special;
pub mod stats;

pub use bounds::{Clamp, ClampSettings, ParameterBounds};
pub use convergence::{ConvergenceChecker, ToleranceSettings};
pub use fastlog::FastLog;
pub use fit::{
    fit, DampingSettings, FailureReason, FitError, FitResult, FitSettings, FitStatus, Precision,
    PrecisionSettings,
};
pub use model::{
    Capabilities, GaussianModel, GaussianShape, Model, ModelError, ParameterLayout, SplineData,
    SplineModel,
};
pub use objective::{Likelihood, Objective, SampleData};
