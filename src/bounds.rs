//! Keeping iterates admissible.
//!
//! A proposed step goes through two stages before it is evaluated:
//!
//! 1. [`Clamp`] shrinks each component smoothly, `s / (1 + |s|/c)`, so that
//!    no parameter moves by more than its limit `c` in one iteration. With
//!    dynamic clamping the limit halves whenever an accepted step reverses
//!    the direction of the previous accepted step for that parameter.
//! 2. [`ParameterBounds`] clips `current + step` to `[lower, upper]`.
//!
//! All vectors here are full parameter vectors (see
//! [`crate::model::param`]); slots the model does not optimise receive a
//! zero step and are never moved.

use core::f64::consts::PI;

use crate::fit::FitError;
use crate::model::{ParameterKind, ParameterLayout};

/// Optional per-parameter box constraints.
///
/// Non-finite entries leave that side unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParameterBounds {
    lower: Option<Vec<f64>>,
    upper: Option<Vec<f64>>,
}

impl ParameterBounds {
    pub fn new(lower: Option<Vec<f64>>, upper: Option<Vec<f64>>) -> Result<Self, FitError> {
        if let (Some(l), Some(u)) = (&lower, &upper) {
            if l.len() != u.len() {
                return Err(FitError::LengthMismatch {
                    what: "upper bounds",
                    expected: l.len(),
                    actual: u.len(),
                });
            }
            for (index, (&lo, &hi)) in l.iter().zip(u).enumerate() {
                if lo.is_finite() && hi.is_finite() && lo > hi {
                    return Err(FitError::InvalidBounds {
                        index,
                        lower: lo,
                        upper: hi,
                    });
                }
            }
        }
        Ok(Self { lower, upper })
    }

    /// No constraints at all.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn lower(&self) -> Option<&[f64]> {
        self.lower.as_deref()
    }

    pub fn upper(&self) -> Option<&[f64]> {
        self.upper.as_deref()
    }

    /// Check the bounds cover a parameter vector of length `n`.
    pub fn check_len(&self, n: usize) -> Result<(), FitError> {
        for (what, side) in [("lower bounds", &self.lower), ("upper bounds", &self.upper)] {
            if let Some(v) = side {
                if v.len() != n {
                    return Err(FitError::LengthMismatch {
                        what,
                        expected: n,
                        actual: v.len(),
                    });
                }
            }
        }
        Ok(())
    }

    #[inline]
    fn clip(&self, i: usize, v: f64) -> f64 {
        let mut v = v;
        if let Some(lo) = self.lower.as_ref().map(|l| l[i]) {
            if lo.is_finite() && v < lo {
                v = lo;
            }
        }
        if let Some(hi) = self.upper.as_ref().map(|u| u[i]) {
            if hi.is_finite() && v > hi {
                v = hi;
            }
        }
        v
    }

    /// `out = clip(current + step, lower, upper)`.
    pub fn apply_bounds(&self, current: &[f64], step: &[f64], out: &mut [f64]) {
        debug_assert_eq!(current.len(), step.len());
        debug_assert_eq!(current.len(), out.len());
        for (i, o) in out.iter_mut().enumerate() {
            *o = self.clip(i, current[i] + step[i]);
        }
    }

    /// Clip a parameter vector into the bounds in place.
    pub fn clip_in_place(&self, a: &mut [f64]) {
        for i in 0..a.len() {
            a[i] = self.clip(i, a[i]);
        }
    }

    /// True if every component lies within its bounds.
    pub fn contains(&self, a: &[f64]) -> bool {
        (0..a.len()).all(|i| self.clip(i, a[i]) == a[i])
    }
}

/// Default per-kind step limits used to build a [`Clamp`].
///
/// A non-positive or non-finite limit disables clamping for that kind.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClampSettings {
    pub background: f64,
    pub signal: f64,
    /// X and Y, in pixels.
    pub position: f64,
    pub angle: f64,
    /// Both widths, in pixels.
    pub width: f64,
    pub z: f64,
    /// Halve a limit whenever its parameter oscillates.
    pub dynamic: bool,
}

impl Default for ClampSettings {
    fn default() -> Self {
        Self {
            background: 100.0,
            signal: 1000.0,
            position: 1.0,
            angle: PI / 4.0,
            width: 3.0,
            z: 1.0,
            dynamic: true,
        }
    }
}

impl ClampSettings {
    pub fn limit_for(&self, kind: ParameterKind) -> f64 {
        match kind {
            ParameterKind::Background => self.background,
            ParameterKind::Signal => self.signal,
            ParameterKind::XPosition | ParameterKind::YPosition => self.position,
            ParameterKind::Angle => self.angle,
            ParameterKind::XWidth | ParameterKind::YWidth => self.width,
            ParameterKind::ZPosition => self.z,
        }
    }

    /// Per-fit clamp for a model's full parameter vector.
    pub fn clamp_for(&self, layout: &ParameterLayout) -> Clamp {
        let limits = (0..layout.parameter_count())
            .map(|i| sanitise(self.limit_for(ParameterKind::of_index(i))))
            .collect();
        Clamp {
            limits,
            dynamic: self.dynamic,
            previous: vec![0.0; layout.parameter_count()],
        }
    }
}

fn sanitise(limit: f64) -> f64 {
    if limit > 0.0 && limit.is_finite() {
        limit
    } else {
        f64::INFINITY
    }
}

/// Adaptive per-parameter step limiter. Owned by one fit.
#[derive(Debug, Clone, PartialEq)]
pub struct Clamp {
    limits: Vec<f64>,
    dynamic: bool,
    previous: Vec<f64>,
}

impl Clamp {
    /// Clamp with explicit limits, one per parameter slot.
    ///
    /// An infinite limit leaves that slot unclamped; zero, negative or NaN
    /// limits are rejected.
    pub fn new(limits: Vec<f64>, dynamic: bool) -> Result<Self, FitError> {
        if let Some(index) = limits.iter().position(|c| !(*c > 0.0)) {
            return Err(FitError::InvalidClamp {
                index,
                value: limits[index],
            });
        }
        let previous = vec![0.0; limits.len()];
        Ok(Self {
            limits,
            dynamic,
            previous,
        })
    }

    pub fn limits(&self) -> &[f64] {
        &self.limits
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    /// Limit a step in place: `s / (1 + |s| / c)`.
    pub fn clamp_step(&self, step: &mut [f64]) {
        debug_assert_eq!(step.len(), self.limits.len());
        for (s, &c) in step.iter_mut().zip(&self.limits) {
            if c.is_finite() {
                *s /= 1.0 + s.abs() / c;
            }
        }
    }

    /// Record an accepted step; with dynamic clamping a sign reversal
    /// against the previous accepted step halves that limit.
    pub fn step_accepted(&mut self, step: &[f64]) {
        for ((prev, c), &s) in self.previous.iter_mut().zip(&mut self.limits).zip(step) {
            if self.dynamic && c.is_finite() && *prev * s < 0.0 {
                *c *= 0.5;
            }
            if s != 0.0 {
                *prev = s;
            }
        }
    }
}
