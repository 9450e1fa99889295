//! Cramér-Rao lower bounds from the Poisson information matrix.
//!
//! At the final parameters the un-damped information matrix `I` is built
//! over the active parameters and inverted; `diag(I⁻¹)` bounds the variance
//! of any unbiased estimator. Two forms of `I` are available:
//!
//! | [`Information`] | Matrix | Needs data |
//! |---|---|---|
//! | `Observed` | `Σ g·(x/f²)·gᵀ` | yes |
//! | `Expected` | `Σ g·gᵀ / f` | variances only |
//!
//! The result is scaled by `noise_factor`, e.g. 2 for the excess noise of an
//! EM-CCD camera.

use log::warn;

use crate::accumulate::{Accumulator, Information};
use crate::linalg::SymmetricSolver;
use crate::model::{Model, ParameterLayout};
use crate::objective::SampleData;

/// Precision estimation options.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrecisionSettings {
    /// Estimate precision after a successful fit.
    pub compute: bool,
    pub information: Information,
    /// Multiplier applied to every variance.
    pub noise_factor: f64,
}

impl Default for PrecisionSettings {
    fn default() -> Self {
        Self {
            compute: true,
            information: Information::Observed,
            noise_factor: 1.0,
        }
    }
}

/// Parameter variances of a fit.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Precision {
    /// One variance per parameter slot; slots that were not fitted hold 0.
    Available { variances: Vec<f64> },
    #[default]
    Unavailable,
}

impl Precision {
    pub fn variances(&self) -> Option<&[f64]> {
        match self {
            Precision::Available { variances } => Some(variances),
            Precision::Unavailable => None,
        }
    }

    /// Square roots of the variances.
    pub fn standard_deviations(&self) -> Option<Vec<f64>> {
        self.variances()
            .map(|v| v.iter().map(|x| x.sqrt()).collect())
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Precision::Available { .. })
    }
}

/// Reusable CRLB estimator for one model layout.
#[derive(Debug, Clone)]
pub struct PrecisionEstimator {
    settings: PrecisionSettings,
    parameter_count: usize,
    gradient_indices: Vec<usize>,
    information: Accumulator,
    solver: SymmetricSolver<f64>,
    inverse: Vec<f64>,
}

impl PrecisionEstimator {
    pub fn new(layout: &ParameterLayout, settings: PrecisionSettings) -> Self {
        let k = layout.active_count();
        Self {
            settings,
            parameter_count: layout.parameter_count(),
            gradient_indices: layout.gradient_indices().to_vec(),
            information: Accumulator::new(k),
            solver: SymmetricSolver::new(k),
            inverse: vec![0.0; k * k],
        }
    }

    /// Variances at the parameters `model` was last initialised with.
    pub fn estimate<M: Model>(&mut self, model: &M, data: &SampleData) -> Precision {
        if !self
            .information
            .accumulate_information(model, data, self.settings.information)
        {
            warn!("precision unavailable: model predicts a non-positive value");
            return Precision::Unavailable;
        }
        if let Err(e) = self.solver.invert(self.information.alpha(), &mut self.inverse) {
            warn!("precision unavailable: information matrix inversion failed ({e})");
            return Precision::Unavailable;
        }

        let k = self.gradient_indices.len();
        let mut variances = vec![0.0; self.parameter_count];
        for (j, &slot) in self.gradient_indices.iter().enumerate() {
            let v = self.inverse[j * k + j];
            if !(v > 0.0 && v.is_finite()) {
                warn!("precision unavailable: variance {v} for parameter {slot}");
                return Precision::Unavailable;
            }
            variances[slot] = v * self.settings.noise_factor;
        }
        Precision::Available { variances }
    }
}
