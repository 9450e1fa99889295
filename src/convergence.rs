//! Stop decisions for iterative fits.
//!
//! Two values `p` (previous) and `c` (current) agree when
//!
//! - `|p − c| ≤ max(|p|, |c|) · relative`, or
//! - `|p − c| ≤ absolute`,
//!
//! each rule applying only when its tolerance is positive. Angles are
//! compared by their smallest rotational difference modulo π against
//! `(π/2) · relative` or `absolute`, so a peak orientation that wraps
//! around is not mistaken for a large move.
//!
//! Every enabled check (score, parameter sequence) must agree for the fit to
//! be converged. The iteration cap is checked after the tolerances.

use core::f64::consts::{FRAC_PI_2, PI};

use crate::fit::FitError;
use crate::model::{ParameterKind, ParameterLayout};

/// Convergence configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ToleranceSettings {
    /// Relative tolerance; `≤ 0` disables the relative rule.
    pub relative: f64,
    /// Absolute tolerance; `≤ 0` disables the absolute rule.
    pub absolute: f64,
    /// Compare consecutive scores.
    pub check_score: bool,
    /// Compare consecutive parameter vectors.
    pub check_sequence: bool,
    /// Iteration cap; `0` means no cap.
    pub max_iterations: usize,
    /// Report reaching the cap as convergence rather than a separate status.
    pub converge_at_max_iterations: bool,
}

impl Default for ToleranceSettings {
    fn default() -> Self {
        Self {
            relative: 1e-6,
            absolute: 1e-10,
            check_score: true,
            check_sequence: true,
            max_iterations: 50,
            converge_at_max_iterations: false,
        }
    }
}

impl ToleranceSettings {
    fn has_tolerance(&self) -> bool {
        self.relative > 0.0 || self.absolute > 0.0
    }
}

/// Outcome of one convergence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Converged,
    MaxIterations,
}

/// Convergence test over a model's active parameters.
#[derive(Debug, Clone)]
pub struct ConvergenceChecker {
    settings: ToleranceSettings,
    /// `(slot, is_angle)` for each active parameter.
    active: Vec<(usize, bool)>,
}

impl ConvergenceChecker {
    /// Fails with [`FitError::NoConvergenceCriterion`] when neither a
    /// tolerance check nor an iteration cap is enabled.
    pub fn new(settings: ToleranceSettings, layout: &ParameterLayout) -> Result<Self, FitError> {
        let tolerance = settings.has_tolerance() && (settings.check_score || settings.check_sequence);
        if !tolerance && settings.max_iterations == 0 {
            return Err(FitError::NoConvergenceCriterion);
        }
        let active = layout
            .gradient_indices()
            .iter()
            .map(|&i| (i, ParameterKind::of_index(i) == ParameterKind::Angle))
            .collect();
        Ok(Self { settings, active })
    }

    pub fn settings(&self) -> &ToleranceSettings {
        &self.settings
    }

    /// Scalar agreement.
    pub fn values_agree(&self, p: f64, c: f64) -> bool {
        let d = (p - c).abs();
        let s = &self.settings;
        (s.relative > 0.0 && d <= p.abs().max(c.abs()) * s.relative)
            || (s.absolute > 0.0 && d <= s.absolute)
    }

    /// Agreement of two angles modulo π.
    pub fn angles_agree(&self, p: f64, c: f64) -> bool {
        let d = (p - c).rem_euclid(PI);
        let d = d.min(PI - d);
        let s = &self.settings;
        (s.relative > 0.0 && d <= FRAC_PI_2 * s.relative) || (s.absolute > 0.0 && d <= s.absolute)
    }

    /// Agreement of every active component of two full parameter vectors.
    pub fn parameters_agree(&self, previous: &[f64], current: &[f64]) -> bool {
        self.active.iter().all(|&(i, angle)| {
            if angle {
                self.angles_agree(previous[i], current[i])
            } else {
                self.values_agree(previous[i], current[i])
            }
        })
    }

    /// Tolerance test alone, ignoring the iteration cap.
    pub fn converged(
        &self,
        previous_score: f64,
        previous: &[f64],
        score: f64,
        current: &[f64],
    ) -> bool {
        let s = &self.settings;
        if !s.has_tolerance() || !(s.check_score || s.check_sequence) {
            return false;
        }
        (!s.check_score || self.values_agree(previous_score, score))
            && (!s.check_sequence || self.parameters_agree(previous, current))
    }

    /// Full decision after `iteration` completed iterations.
    pub fn check(
        &self,
        iteration: usize,
        previous_score: f64,
        previous: &[f64],
        score: f64,
        current: &[f64],
    ) -> Decision {
        if self.converged(previous_score, previous, score, current) {
            Decision::Converged
        } else if self.max_iterations_reached(iteration) {
            Decision::MaxIterations
        } else {
            Decision::Continue
        }
    }

    pub fn max_iterations_reached(&self, iteration: usize) -> bool {
        self.settings.max_iterations > 0 && iteration >= self.settings.max_iterations
    }
}
