//! Gaussian PSF family: one model type covering fixed-width, circular,
//! free-circular and elliptical peaks.

use core::f64::consts::PI;

use super::param::{ANGLE, BACKGROUND, SIGNAL, X_POSITION, X_WIDTH, Y_POSITION, Y_WIDTH};
use super::{param, pixel_centre, Capabilities, Model, ModelError, ParameterLayout};

/// Peak shape of a [`GaussianModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GaussianShape {
    /// Circular with the width held at the `X_WIDTH` slot value.
    FixedWidth,
    /// Circular with one free width (stored in `X_WIDTH`).
    Circular,
    /// Independent x and y widths, axis aligned.
    FreeCircular,
    /// Independent widths and a free rotation angle.
    Elliptical,
}

impl GaussianShape {
    /// Default capabilities: background, signal, position plus the shape's widths/angle.
    pub const fn capabilities(self) -> Capabilities {
        let base = Capabilities::BACKGROUND
            .union(Capabilities::SIGNAL)
            .union(Capabilities::POSITION);
        match self {
            GaussianShape::FixedWidth => base,
            GaussianShape::Circular => base.union(Capabilities::WIDTH_X),
            GaussianShape::FreeCircular => base
                .union(Capabilities::WIDTH_X)
                .union(Capabilities::WIDTH_Y),
            GaussianShape::Elliptical => base
                .union(Capabilities::WIDTH_X)
                .union(Capabilities::WIDTH_Y)
                .union(Capabilities::ANGLE),
        }
    }

    fn from_capabilities(caps: Capabilities) -> Result<Self, ModelError> {
        if caps.evaluates_depth() {
            return Err(ModelError::UnsupportedCapabilities(
                "Gaussian models have no depth parameter",
            ));
        }
        match (
            caps.evaluates_angle(),
            caps.evaluates_width_x(),
            caps.evaluates_width_y(),
        ) {
            (true, true, true) => Ok(GaussianShape::Elliptical),
            (true, _, _) => Err(ModelError::UnsupportedCapabilities(
                "a free angle needs both widths free",
            )),
            (false, true, true) => Ok(GaussianShape::FreeCircular),
            (false, true, false) => Ok(GaussianShape::Circular),
            (false, false, true) => Err(ModelError::UnsupportedCapabilities(
                "a free y width needs a free x width",
            )),
            (false, false, false) => Ok(GaussianShape::FixedWidth),
        }
    }
}

/// Quadratic form `a·dx² + 2b·dx·dy + c·dy²`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Quadratic {
    a: f64,
    b: f64,
    c: f64,
}

impl Quadratic {
    #[inline]
    fn eval(&self, dx: f64, dy: f64) -> f64 {
        self.a * dx * dx + 2.0 * self.b * dx * dy + self.c * dy * dy
    }

    fn add(self, other: Self) -> Self {
        Self {
            a: self.a + other.a,
            b: self.b + other.b,
            c: self.c + other.c,
        }
    }
}

/// First and second derivatives of `ln(amplitude)` and of the quadratic
/// form with respect to one shape parameter (angle or a width).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ShapeTerm {
    ln_amp1: f64,
    ln_amp2: f64,
    q1: Quadratic,
    q2: Quadratic,
}

impl ShapeTerm {
    /// Sum of two terms; the derivative along a direction that moves both
    /// widths together (no cross terms exist between sx and sy).
    fn add(self, other: Self) -> Self {
        Self {
            ln_amp1: self.ln_amp1 + other.ln_amp1,
            ln_amp2: self.ln_amp2 + other.ln_amp2,
            q1: self.q1.add(other.q1),
            q2: self.q2.add(other.q2),
        }
    }

    /// `(∂ ln f, ∂² f / f)` at offset `(dx, dy)`.
    #[inline]
    fn derivatives(&self, dx: f64, dy: f64) -> (f64, f64) {
        let g = self.ln_amp1 - self.q1.eval(dx, dy);
        (g, g * g + self.ln_amp2 - self.q2.eval(dx, dy))
    }
}

/// Quadratic form of a rotated Gaussian and its analytic derivatives with
/// respect to angle, x width and y width.
fn rotated_form(theta: f64, sx: f64, sy: f64) -> (Quadratic, ShapeTerm, ShapeTerm, ShapeTerm) {
    let (sin, cos) = theta.sin_cos();
    let (sin_2t, cos_2t) = (2.0 * theta).sin_cos();
    let (cos2, sin2) = (cos * cos, sin * sin);
    let (isx2, isy2) = (1.0 / (sx * sx), 1.0 / (sy * sy));
    let diff = isy2 - isx2;

    let form = Quadratic {
        a: 0.5 * (cos2 * isx2 + sin2 * isy2),
        b: 0.25 * sin_2t * diff,
        c: 0.5 * (sin2 * isx2 + cos2 * isy2),
    };

    let angle = ShapeTerm {
        ln_amp1: 0.0,
        ln_amp2: 0.0,
        q1: Quadratic {
            a: 0.5 * sin_2t * diff,
            b: 0.5 * cos_2t * diff,
            c: -0.5 * sin_2t * diff,
        },
        q2: Quadratic {
            a: cos_2t * diff,
            b: -sin_2t * diff,
            c: -cos_2t * diff,
        },
    };

    let isx3 = isx2 / sx;
    let isx4 = isx2 * isx2;
    let width_x = ShapeTerm {
        ln_amp1: -1.0 / sx,
        ln_amp2: isx2,
        q1: Quadratic {
            a: -cos2 * isx3,
            b: 0.5 * sin_2t * isx3,
            c: -sin2 * isx3,
        },
        q2: Quadratic {
            a: 3.0 * cos2 * isx4,
            b: -1.5 * sin_2t * isx4,
            c: 3.0 * sin2 * isx4,
        },
    };

    let isy3 = isy2 / sy;
    let isy4 = isy2 * isy2;
    let width_y = ShapeTerm {
        ln_amp1: -1.0 / sy,
        ln_amp2: isy2,
        q1: Quadratic {
            a: -sin2 * isy3,
            b: -0.5 * sin_2t * isy3,
            c: -cos2 * isy3,
        },
        q2: Quadratic {
            a: 3.0 * sin2 * isy4,
            b: 1.5 * sin_2t * isy4,
            c: 3.0 * cos2 * isy4,
        },
    };

    (form, angle, width_x, width_y)
}

/// Everything a peak needs per sample, cached by `initialise`.
#[derive(Debug, Clone, Copy, Default)]
struct PeakTerms {
    signal: f64,
    x0: f64,
    y0: f64,
    /// `1 / (2π·|sx·sy|)`; the peak depends on the widths only through
    /// their magnitudes.
    norm: f64,
    form: Quadratic,
    angle: ShapeTerm,
    width_x: ShapeTerm,
    width_y: ShapeTerm,
}

impl PeakTerms {
    fn new(shape: GaussianShape, params: &[f64], peak: usize) -> Self {
        let at = |first| params[param::index(peak, first)];
        let sx = at(X_WIDTH);
        let (theta, sy) = match shape {
            GaussianShape::FixedWidth | GaussianShape::Circular => (0.0, sx),
            GaussianShape::FreeCircular => (0.0, at(Y_WIDTH)),
            GaussianShape::Elliptical => (at(ANGLE), at(Y_WIDTH)),
        };
        let (form, angle, mut width_x, width_y) = rotated_form(theta, sx, sy);
        if shape == GaussianShape::Circular {
            width_x = width_x.add(width_y);
        }
        Self {
            signal: at(SIGNAL),
            x0: at(X_POSITION),
            y0: at(Y_POSITION),
            norm: 1.0 / (2.0 * PI * (sx * sy).abs()),
            form,
            angle,
            width_x,
            width_y,
        }
    }
}

/// Sum of 2D Gaussian peaks on a constant background.
///
/// ```
/// use spotfit::model::{param, GaussianModel, GaussianShape, Model};
///
/// let mut model = GaussianModel::new(GaussianShape::Circular, 7, 7, 1).unwrap();
/// let mut a = vec![0.0; param::count(1)];
/// a[param::BACKGROUND] = 5.0;
/// a[param::SIGNAL] = 500.0;
/// a[param::X_POSITION] = 3.5;
/// a[param::Y_POSITION] = 3.5;
/// a[param::X_WIDTH] = 1.0;
/// model.initialise(&a);
///
/// // Brightest pixel is the central one (index 3·7 + 3).
/// let peak = model.value_at(24);
/// assert!(model.values().all(|v| v <= peak));
/// ```
#[derive(Debug, Clone)]
pub struct GaussianModel {
    shape: GaussianShape,
    width: usize,
    height: usize,
    layout: ParameterLayout,
    background: f64,
    peaks: Vec<PeakTerms>,
}

impl GaussianModel {
    /// Model with the default capabilities of `shape`.
    pub fn new(
        shape: GaussianShape,
        width: usize,
        height: usize,
        peaks: usize,
    ) -> Result<Self, ModelError> {
        Self::with_capabilities(shape.capabilities(), width, height, peaks)
    }

    /// Model whose shape is implied by `capabilities`.
    ///
    /// Dropping `BACKGROUND` or `SIGNAL` keeps those slots fixed at the
    /// values passed to `initialise`.
    pub fn with_capabilities(
        capabilities: Capabilities,
        width: usize,
        height: usize,
        peaks: usize,
    ) -> Result<Self, ModelError> {
        if width == 0 || height == 0 {
            return Err(ModelError::EmptyWindow { width, height });
        }
        if peaks == 0 {
            return Err(ModelError::NoPeaks);
        }
        let shape = GaussianShape::from_capabilities(capabilities)?;
        let layout = ParameterLayout::new(capabilities, peaks);
        if layout.active_count() == 0 {
            return Err(ModelError::NothingToFit);
        }
        Ok(Self {
            shape,
            width,
            height,
            layout,
            background: 0.0,
            peaks: vec![PeakTerms::default(); peaks],
        })
    }

    pub fn shape(&self) -> GaussianShape {
        self.shape
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Shared body of the gradient evaluations; `SECOND` selects whether
    /// `d2` is written.
    #[inline]
    fn evaluate<const SECOND: bool>(&self, i: usize, d1: &mut [f64], d2: &mut [f64]) -> f64 {
        let caps = self.layout.capabilities();
        let (x, y) = pixel_centre(i, self.width);
        let mut value = self.background;
        let mut k = 0;

        let mut put = |k: &mut usize, g: f64, h: f64| {
            d1[*k] = g;
            if SECOND {
                d2[*k] = h;
            }
            *k += 1;
        };

        if caps.evaluates_background() {
            put(&mut k, 1.0, 0.0);
        }

        for peak in &self.peaks {
            let dx = x - peak.x0;
            let dy = y - peak.y0;
            let form = &peak.form;
            let u = peak.norm * (-form.eval(dx, dy)).exp();
            let f = peak.signal * u;
            value += f;

            if caps.evaluates_signal() {
                put(&mut k, u, 0.0);
            }
            if caps.evaluates_position() {
                let gx = 2.0 * (form.a * dx + form.b * dy);
                let gy = 2.0 * (form.b * dx + form.c * dy);
                put(&mut k, f * gx, f * (gx * gx - 2.0 * form.a));
                put(&mut k, f * gy, f * (gy * gy - 2.0 * form.c));
            }
            if caps.evaluates_angle() {
                let (g, h) = peak.angle.derivatives(dx, dy);
                put(&mut k, f * g, f * h);
            }
            if caps.evaluates_width_x() {
                let (g, h) = peak.width_x.derivatives(dx, dy);
                put(&mut k, f * g, f * h);
            }
            if caps.evaluates_width_y() {
                let (g, h) = peak.width_y.derivatives(dx, dy);
                put(&mut k, f * g, f * h);
            }
        }

        value
    }
}

impl Model for GaussianModel {
    fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    fn size(&self) -> usize {
        self.width * self.height
    }

    fn initialise(&mut self, params: &[f64]) {
        debug_assert_eq!(params.len(), self.layout.parameter_count());
        self.background = params[BACKGROUND];
        let shape = self.shape;
        for (p, peak) in self.peaks.iter_mut().enumerate() {
            *peak = PeakTerms::new(shape, params, p);
        }
    }

    #[inline]
    fn value_at(&self, i: usize) -> f64 {
        let (x, y) = pixel_centre(i, self.width);
        self.peaks.iter().fold(self.background, |v, peak| {
            let dx = x - peak.x0;
            let dy = y - peak.y0;
            v + peak.signal * peak.norm * (-peak.form.eval(dx, dy)).exp()
        })
    }

    #[inline]
    fn value_and_gradient1_at(&self, i: usize, d1: &mut [f64]) -> f64 {
        self.evaluate::<false>(i, d1, &mut [])
    }

    #[inline]
    fn value_and_gradient2_at(&self, i: usize, d1: &mut [f64], d2: &mut [f64]) -> f64 {
        self.evaluate::<true>(i, d1, d2)
    }
}
