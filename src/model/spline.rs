//! Cubic-spline interpolated 3D PSF.

use std::sync::Arc;

use super::param::{BACKGROUND, SIGNAL, X_POSITION, Y_POSITION, Z_POSITION};
use super::{param, Capabilities, Model, ModelError, ParameterLayout};

/// A PSF sampled on a regular 3D grid.
///
/// Grid values are the fraction of an emitter's signal collected by a pixel
/// whose centre sits at that grid node. `scale` is the number of grid nodes
/// per pixel in x and y; `z_scale` the number of nodes per unit of the z
/// parameter. The emitter sits at `centre` (in grid coordinates) when its
/// offset and z are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct SplineData {
    nx: usize,
    ny: usize,
    nz: usize,
    values: Vec<f64>,
    scale: f64,
    z_scale: f64,
    centre: [f64; 3],
}

impl SplineData {
    /// `values` are ordered x fastest, then y, then z.
    pub fn new(
        nx: usize,
        ny: usize,
        nz: usize,
        values: Vec<f64>,
        scale: f64,
        z_scale: f64,
    ) -> Result<Self, ModelError> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(ModelError::InvalidSpline(format!(
                "grid must be non-empty, got {nx}x{ny}x{nz}"
            )));
        }
        if values.len() != nx * ny * nz {
            return Err(ModelError::InvalidSpline(format!(
                "expected {} values, got {}",
                nx * ny * nz,
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::InvalidSpline("values must be finite".into()));
        }
        if !(scale > 0.0 && scale.is_finite()) || !(z_scale > 0.0 && z_scale.is_finite()) {
            return Err(ModelError::InvalidSpline(format!(
                "scales must be positive, got {scale} and {z_scale}"
            )));
        }
        let centre = [
            (nx - 1) as f64 / 2.0,
            (ny - 1) as f64 / 2.0,
            (nz - 1) as f64 / 2.0,
        ];
        Ok(Self {
            nx,
            ny,
            nz,
            values,
            scale,
            z_scale,
            centre,
        })
    }

    /// Sample `psf(dx, dy, z)` on a grid centred on the origin, where `dx`,
    /// `dy` are pixel offsets and `z` is in parameter units.
    pub fn from_fn(
        nx: usize,
        ny: usize,
        nz: usize,
        scale: f64,
        z_scale: f64,
        psf: impl Fn(f64, f64, f64) -> f64,
    ) -> Result<Self, ModelError> {
        let (cx, cy, cz) = (
            (nx.max(1) - 1) as f64 / 2.0,
            (ny.max(1) - 1) as f64 / 2.0,
            (nz.max(1) - 1) as f64 / 2.0,
        );
        let mut values = Vec::with_capacity(nx * ny * nz);
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    values.push(psf(
                        (i as f64 - cx) / scale,
                        (j as f64 - cy) / scale,
                        (k as f64 - cz) / z_scale,
                    ));
                }
            }
        }
        Self::new(nx, ny, nz, values, scale, z_scale)
    }

    /// Move the emitter origin to grid coordinates `(cx, cy, cz)`.
    pub fn with_centre(mut self, cx: f64, cy: f64, cz: f64) -> Self {
        self.centre = [cx, cy, cz];
        self
    }

    pub fn dimensions(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn z_scale(&self) -> f64 {
        self.z_scale
    }

    pub fn centre(&self) -> [f64; 3] {
        self.centre
    }

    /// Grid node value; zero outside the grid.
    #[inline]
    fn node(&self, i: isize, j: isize, k: isize) -> f64 {
        if i < 0 || j < 0 || k < 0 {
            return 0.0;
        }
        let (i, j, k) = (i as usize, j as usize, k as usize);
        if i >= self.nx || j >= self.ny || k >= self.nz {
            return 0.0;
        }
        self.values[(k * self.ny + j) * self.nx + i]
    }
}

/// Catmull-Rom weights (and derivatives) of the four nodes around a grid
/// coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct AxisWeights {
    start: isize,
    w: [f64; 4],
    d1: [f64; 4],
    d2: [f64; 4],
}

impl AxisWeights {
    /// Weights at grid coordinate `g` on an axis of `n` nodes.
    ///
    /// Coordinates are first limited to `[-3, n + 2]`; every stencil node
    /// beyond that range reads as zero either way.
    fn at(g: f64, n: usize) -> Self {
        let g = g.clamp(-3.0, n as f64 + 2.0);
        let floor = g.floor();
        let t = g - floor;
        let t2 = t * t;
        let t3 = t2 * t;
        Self {
            start: floor as isize - 1,
            w: [
                0.5 * (-t3 + 2.0 * t2 - t),
                0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
                0.5 * (-3.0 * t3 + 4.0 * t2 + t),
                0.5 * (t3 - t2),
            ],
            d1: [
                0.5 * (-3.0 * t2 + 4.0 * t - 1.0),
                0.5 * (9.0 * t2 - 10.0 * t),
                0.5 * (-9.0 * t2 + 8.0 * t + 1.0),
                0.5 * (3.0 * t2 - 2.0 * t),
            ],
            d2: [
                -3.0 * t + 2.0,
                9.0 * t - 5.0,
                -9.0 * t + 4.0,
                3.0 * t - 1.0,
            ],
        }
    }
}

/// Interpolated PSF value and its derivatives with respect to the grid
/// coordinates.
#[derive(Debug, Clone, Copy, Default)]
struct Interpolant {
    value: f64,
    gx: f64,
    gy: f64,
    gz: f64,
    gxx: f64,
    gyy: f64,
    gzz: f64,
}

/// Sum of spline PSF peaks on a constant background.
///
/// The grid is shared read-only between models through an `Arc`, so
/// building one model per concurrent fit is cheap.
#[derive(Debug, Clone)]
pub struct SplineModel {
    data: Arc<SplineData>,
    width: usize,
    height: usize,
    layout: ParameterLayout,
    background: f64,
    signals: Vec<f64>,
    z_weights: Vec<AxisWeights>,
    /// `peaks × width`, one entry per window column.
    columns: Vec<AxisWeights>,
    /// `peaks × height`, one entry per window row.
    rows: Vec<AxisWeights>,
}

impl SplineModel {
    /// Default capabilities: background, signal, x/y position and z.
    pub const CAPABILITIES: Capabilities = Capabilities::BACKGROUND
        .union(Capabilities::SIGNAL)
        .union(Capabilities::POSITION)
        .union(Capabilities::DEPTH);

    pub fn new(
        data: Arc<SplineData>,
        width: usize,
        height: usize,
        peaks: usize,
    ) -> Result<Self, ModelError> {
        Self::with_capabilities(data, Self::CAPABILITIES, width, height, peaks)
    }

    /// Model with a subset of [`SplineModel::CAPABILITIES`], e.g. without
    /// `DEPTH` for a fit at fixed focus.
    pub fn with_capabilities(
        data: Arc<SplineData>,
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
        if !Self::CAPABILITIES.contains(capabilities) {
            return Err(ModelError::UnsupportedCapabilities(
                "spline models have no angle or width parameters",
            ));
        }
        let layout = ParameterLayout::new(capabilities, peaks);
        if layout.active_count() == 0 {
            return Err(ModelError::NothingToFit);
        }
        Ok(Self {
            data,
            width,
            height,
            layout,
            background: 0.0,
            signals: vec![0.0; peaks],
            z_weights: vec![AxisWeights::default(); peaks],
            columns: vec![AxisWeights::default(); peaks * width],
            rows: vec![AxisWeights::default(); peaks * height],
        })
    }

    pub fn data(&self) -> &Arc<SplineData> {
        &self.data
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn interpolate(&self, peak: usize, ix: usize, iy: usize) -> Interpolant {
        let cx = &self.columns[peak * self.width + ix];
        let ry = &self.rows[peak * self.height + iy];
        let z = &self.z_weights[peak];
        let mut out = Interpolant::default();

        for c in 0..4 {
            let k = z.start + c as isize;
            let (mut p0, mut px, mut py, mut pxx, mut pyy) = (0.0, 0.0, 0.0, 0.0, 0.0);
            for b in 0..4 {
                let j = ry.start + b as isize;
                let (mut r0, mut r1, mut r2) = (0.0, 0.0, 0.0);
                for a in 0..4 {
                    let v = self.data.node(cx.start + a as isize, j, k);
                    r0 += cx.w[a] * v;
                    r1 += cx.d1[a] * v;
                    r2 += cx.d2[a] * v;
                }
                p0 += ry.w[b] * r0;
                px += ry.w[b] * r1;
                py += ry.d1[b] * r0;
                pxx += ry.w[b] * r2;
                pyy += ry.d2[b] * r0;
            }
            out.value += z.w[c] * p0;
            out.gx += z.w[c] * px;
            out.gy += z.w[c] * py;
            out.gz += z.d1[c] * p0;
            out.gxx += z.w[c] * pxx;
            out.gyy += z.w[c] * pyy;
            out.gzz += z.d2[c] * p0;
        }
        out
    }

    #[inline]
    fn evaluate<const SECOND: bool>(&self, i: usize, d1: &mut [f64], d2: &mut [f64]) -> f64 {
        let caps = self.layout.capabilities();
        let (ix, iy) = (i % self.width, i / self.width);
        // d(grid)/d(x0) = -scale, d(grid)/d(z0) = +z_scale
        let s = self.data.scale;
        let zs = self.data.z_scale;
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
        for (p, &signal) in self.signals.iter().enumerate() {
            let psf = self.interpolate(p, ix, iy);
            value += signal * psf.value;
            if caps.evaluates_signal() {
                put(&mut k, psf.value, 0.0);
            }
            if caps.evaluates_position() {
                put(&mut k, -signal * s * psf.gx, signal * s * s * psf.gxx);
                put(&mut k, -signal * s * psf.gy, signal * s * s * psf.gyy);
            }
            if caps.evaluates_depth() {
                put(&mut k, signal * zs * psf.gz, signal * zs * zs * psf.gzz);
            }
        }
        value
    }
}

impl Model for SplineModel {
    fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    fn size(&self) -> usize {
        self.width * self.height
    }

    fn initialise(&mut self, params: &[f64]) {
        debug_assert_eq!(params.len(), self.layout.parameter_count());
        self.background = params[BACKGROUND];
        let [cx, cy, cz] = self.data.centre;
        let s = self.data.scale;
        let zs = self.data.z_scale;
        let (nx, ny, nz) = self.data.dimensions();

        for p in 0..self.signals.len() {
            let at = |first| params[param::index(p, first)];
            self.signals[p] = at(SIGNAL);
            self.z_weights[p] = AxisWeights::at(cz + at(Z_POSITION) * zs, nz);

            let x0 = at(X_POSITION);
            let cols = &mut self.columns[p * self.width..(p + 1) * self.width];
            for (ix, w) in cols.iter_mut().enumerate() {
                *w = AxisWeights::at(cx + (ix as f64 + 0.5 - x0) * s, nx);
            }

            let y0 = at(Y_POSITION);
            let rows = &mut self.rows[p * self.height..(p + 1) * self.height];
            for (iy, w) in rows.iter_mut().enumerate() {
                *w = AxisWeights::at(cy + (iy as f64 + 0.5 - y0) * s, ny);
            }
        }
    }

    #[inline]
    fn value_at(&self, i: usize) -> f64 {
        let (ix, iy) = (i % self.width, i / self.width);
        self.signals
            .iter()
            .enumerate()
            .fold(self.background, |v, (p, &signal)| {
                v + signal * self.interpolate(p, ix, iy).value
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
