//! Parametric PSF models evaluated over a fixed pixel window.
//!
//! A model owns its window geometry and its [`ParameterLayout`], the record
//! of which parameter slots it optimises. The parameter vector itself is
//! always laid out the same way (see [`param`]): background first, then one
//! block of [`param::PARAMETERS_PER_PEAK`] slots per peak. Slots a model does
//! not evaluate are carried along untouched.
//!
//! Evaluation is split in two phases:
//!
//! 1. [`Model::initialise`] caches everything that depends only on the
//!    parameters (quadratic-form coefficients, trigonometric terms, spline
//!    axis weights).
//! 2. Per-sample calls ([`Model::value_at`], [`Model::value_and_gradient1_at`],
//!    [`Model::value_and_gradient2_at`]) are cheap and index the window in
//!    row-major order (`index = y · width + x`).
//!
//! [`Model::samples1`] wraps phase 2 in a restartable cursor so that the
//! accumulators can fold over `(value, gradient)` pairs without callbacks.
//!
//! # Variants
//!
//! | Model | Capabilities | Active per peak |
//! |---|---|---|
//! | [`GaussianModel`] fixed width | `POSITION` | signal, x, y |
//! | [`GaussianModel`] circular | `+ WIDTH_X` | signal, x, y, s |
//! | [`GaussianModel`] free circular | `+ WIDTH_X + WIDTH_Y` | signal, x, y, sx, sy |
//! | [`GaussianModel`] elliptical | `+ ANGLE + WIDTH_X + WIDTH_Y` | signal, x, y, θ, sx, sy |
//! | [`SplineModel`] | `POSITION + DEPTH` | signal, x, y, z |
//!
//! Background and signal are active unless removed from the capabilities.

mod gaussian;
mod spline;

#[cfg(test)]
mod tests;

pub use gaussian::{GaussianModel, GaussianShape};
pub use spline::{SplineData, SplineModel};

use core::ops::{BitOr, BitOrAssign};

/// Parameter vector layout.
///
/// Indices are given for the first peak; peak `p` adds
/// `p * PARAMETERS_PER_PEAK` to every index except [`BACKGROUND`].
pub mod param {
    /// Constant background shared by all peaks.
    pub const BACKGROUND: usize = 0;
    /// Integrated signal of the first peak.
    pub const SIGNAL: usize = 1;
    /// X centre of the first peak, in pixels.
    pub const X_POSITION: usize = 2;
    /// Y centre of the first peak, in pixels.
    pub const Y_POSITION: usize = 3;
    /// Rotation of the first peak's major axis, in radians.
    pub const ANGLE: usize = 4;
    /// X standard deviation (or the shared width for circular shapes).
    pub const X_WIDTH: usize = 5;
    /// Y standard deviation.
    pub const Y_WIDTH: usize = 6;
    /// Axial position.
    pub const Z_POSITION: usize = 7;
    /// Slots per peak.
    pub const PARAMETERS_PER_PEAK: usize = 7;

    /// Length of a parameter vector for `peaks` peaks.
    pub const fn count(peaks: usize) -> usize {
        1 + peaks * PARAMETERS_PER_PEAK
    }

    /// Index of `first_peak_index` shifted to `peak`.
    pub const fn index(peak: usize, first_peak_index: usize) -> usize {
        if first_peak_index == BACKGROUND {
            BACKGROUND
        } else {
            first_peak_index + peak * PARAMETERS_PER_PEAK
        }
    }
}

/// What a parameter slot means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParameterKind {
    Background,
    Signal,
    XPosition,
    YPosition,
    Angle,
    XWidth,
    YWidth,
    ZPosition,
}

impl ParameterKind {
    /// Kind of the slot at `index` in a parameter vector.
    pub fn of_index(index: usize) -> Self {
        if index == param::BACKGROUND {
            return Self::Background;
        }
        match (index - 1) % param::PARAMETERS_PER_PEAK {
            0 => Self::Signal,
            1 => Self::XPosition,
            2 => Self::YPosition,
            3 => Self::Angle,
            4 => Self::XWidth,
            5 => Self::YWidth,
            _ => Self::ZPosition,
        }
    }
}

/// Bitmask of the parameter kinds a model evaluates gradients for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Capabilities(u8);

impl Capabilities {
    pub const BACKGROUND: Self = Self(1);
    pub const SIGNAL: Self = Self(1 << 1);
    pub const ANGLE: Self = Self(1 << 2);
    pub const POSITION: Self = Self(1 << 3);
    pub const WIDTH_X: Self = Self(1 << 4);
    pub const WIDTH_Y: Self = Self(1 << 5);
    pub const DEPTH: Self = Self(1 << 6);

    /// No capabilities.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two masks.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// `self` with the flags of `other` cleared.
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn evaluates_background(self) -> bool {
        self.contains(Self::BACKGROUND)
    }

    pub const fn evaluates_signal(self) -> bool {
        self.contains(Self::SIGNAL)
    }

    pub const fn evaluates_angle(self) -> bool {
        self.contains(Self::ANGLE)
    }

    pub const fn evaluates_position(self) -> bool {
        self.contains(Self::POSITION)
    }

    pub const fn evaluates_width_x(self) -> bool {
        self.contains(Self::WIDTH_X)
    }

    pub const fn evaluates_width_y(self) -> bool {
        self.contains(Self::WIDTH_Y)
    }

    pub const fn evaluates_depth(self) -> bool {
        self.contains(Self::DEPTH)
    }

    /// Whether a slot of the given kind is optimised.
    pub const fn evaluates(self, kind: ParameterKind) -> bool {
        match kind {
            ParameterKind::Background => self.evaluates_background(),
            ParameterKind::Signal => self.evaluates_signal(),
            ParameterKind::XPosition | ParameterKind::YPosition => self.evaluates_position(),
            ParameterKind::Angle => self.evaluates_angle(),
            ParameterKind::XWidth => self.evaluates_width_x(),
            ParameterKind::YWidth => self.evaluates_width_y(),
            ParameterKind::ZPosition => self.evaluates_depth(),
        }
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

/// Which slots of the parameter vector a model optimises.
///
/// Computed once when a model is built; gradients written by the model are
/// ordered exactly like [`ParameterLayout::gradient_indices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterLayout {
    capabilities: Capabilities,
    peaks: usize,
    gradient_indices: Vec<usize>,
}

impl ParameterLayout {
    pub fn new(capabilities: Capabilities, peaks: usize) -> Self {
        let gradient_indices = (0..param::count(peaks))
            .filter(|&i| capabilities.evaluates(ParameterKind::of_index(i)))
            .collect();
        Self {
            capabilities,
            peaks,
            gradient_indices,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn peaks(&self) -> usize {
        self.peaks
    }

    /// Full parameter vector length.
    pub fn parameter_count(&self) -> usize {
        param::count(self.peaks)
    }

    /// Active slots in ascending order.
    pub fn gradient_indices(&self) -> &[usize] {
        &self.gradient_indices
    }

    /// Number of active slots.
    pub fn active_count(&self) -> usize {
        self.gradient_indices.len()
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.gradient_indices.binary_search(&index).is_ok()
    }

    /// Kind of each active slot, in gradient order.
    pub fn active_kinds(&self) -> impl Iterator<Item = ParameterKind> + '_ {
        self.gradient_indices.iter().map(|&i| ParameterKind::of_index(i))
    }
}

/// Errors raised while building a model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("window must be at least 1x1, got {width}x{height}")]
    EmptyWindow { width: usize, height: usize },
    #[error("a model needs at least one peak")]
    NoPeaks,
    #[error("capability combination not supported: {0}")]
    UnsupportedCapabilities(&'static str),
    #[error("model has no active parameters")]
    NothingToFit,
    #[error("invalid spline data: {0}")]
    InvalidSpline(String),
}

/// A parametric function over a fixed window with analytic derivatives.
pub trait Model {
    /// Active-parameter layout, fixed at construction.
    fn layout(&self) -> &ParameterLayout;

    /// Number of samples (pixels) in the window.
    fn size(&self) -> usize;

    /// Cache per-peak constants for the parameter vector `params`.
    ///
    /// Must be called before any per-sample evaluation and again whenever the
    /// parameters change. `params.len()` must equal
    /// `layout().parameter_count()`.
    fn initialise(&mut self, params: &[f64]);

    /// Function value at sample `i`.
    fn value_at(&self, i: usize) -> f64;

    /// Function value at sample `i`; first derivatives with respect to the
    /// active parameters are written to `d1` in gradient order.
    fn value_and_gradient1_at(&self, i: usize, d1: &mut [f64]) -> f64;

    /// As [`Model::value_and_gradient1_at`], additionally writing the
    /// diagonal second derivatives to `d2`.
    fn value_and_gradient2_at(&self, i: usize, d1: &mut [f64], d2: &mut [f64]) -> f64;

    /// Number of active parameters.
    fn gradient_count(&self) -> usize {
        self.layout().active_count()
    }

    /// Iterate function values in row-major order.
    fn values(&self) -> Values<'_, Self>
    where
        Self: Sized,
    {
        Values { model: self, next: 0 }
    }

    /// Cursor over `(value, first derivatives)` in row-major order.
    fn samples1(&self) -> Gradient1Samples<'_, Self>
    where
        Self: Sized,
    {
        Gradient1Samples::new(self)
    }

    /// Cursor over `(value, first derivatives, second derivatives)`.
    fn samples2(&self) -> Gradient2Samples<'_, Self>
    where
        Self: Sized,
    {
        Gradient2Samples::new(self)
    }
}

/// Function values of an initialised model.
#[derive(Debug)]
pub struct Values<'a, M> {
    model: &'a M,
    next: usize,
}

impl<M: Model> Iterator for Values<'_, M> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.next >= self.model.size() {
            return None;
        }
        let v = self.model.value_at(self.next);
        self.next += 1;
        Some(v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.model.size().saturating_sub(self.next);
        (n, Some(n))
    }
}

impl<M: Model> ExactSizeIterator for Values<'_, M> {}

/// Restartable cursor yielding `(value, gradient)` for every sample.
///
/// The gradient slice borrows the cursor's own buffer, so each pair must be
/// consumed before the next call to [`Gradient1Samples::next_sample`].
#[derive(Debug)]
pub struct Gradient1Samples<'a, M> {
    model: &'a M,
    next: usize,
    d1: Vec<f64>,
}

impl<'a, M: Model> Gradient1Samples<'a, M> {
    fn new(model: &'a M) -> Self {
        Self {
            model,
            next: 0,
            d1: vec![0.0; model.gradient_count()],
        }
    }

    /// Linear index of the sample the next call will produce.
    pub fn position(&self) -> usize {
        self.next
    }

    /// Evaluate the next sample.
    #[inline]
    pub fn next_sample(&mut self) -> Option<(f64, &[f64])> {
        if self.next >= self.model.size() {
            return None;
        }
        let v = self.model.value_and_gradient1_at(self.next, &mut self.d1);
        self.next += 1;
        Some((v, &self.d1))
    }

    /// Rewind to the first sample.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// Restartable cursor yielding `(value, d1, d2)` for every sample.
#[derive(Debug)]
pub struct Gradient2Samples<'a, M> {
    model: &'a M,
    next: usize,
    d1: Vec<f64>,
    d2: Vec<f64>,
}

impl<'a, M: Model> Gradient2Samples<'a, M> {
    fn new(model: &'a M) -> Self {
        let n = model.gradient_count();
        Self {
            model,
            next: 0,
            d1: vec![0.0; n],
            d2: vec![0.0; n],
        }
    }

    #[inline]
    pub fn next_sample(&mut self) -> Option<(f64, &[f64], &[f64])> {
        if self.next >= self.model.size() {
            return None;
        }
        let v = self
            .model
            .value_and_gradient2_at(self.next, &mut self.d1, &mut self.d2);
        self.next += 1;
        Some((v, &self.d1, &self.d2))
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// Pixel centre of sample `i` in a window `width` pixels wide.
#[inline]
pub(crate) fn pixel_centre(i: usize, width: usize) -> (f64, f64) {
    ((i % width) as f64 + 0.5, (i / width) as f64 + 0.5)
}
