//! Fixed-width kernels for small parameter counts.
//!
//! With `N` known at compile time the loops below unroll completely and
//! the slice bounds checks hoist out of the sample loop.

/// Lower triangle of `alpha += w·g·gᵀ` for an `N × N` row-major matrix.
#[inline(always)]
pub(super) fn add_weighted_outer<const N: usize>(alpha: &mut [f64], g: &[f64], w: f64) {
    let alpha = &mut alpha[..N * N];
    let g = &g[..N];
    for i in 0..N {
        let wi = w * g[i];
        for j in 0..=i {
            alpha[i * N + j] += wi * g[j];
        }
    }
}

/// `beta += s·g`.
#[inline(always)]
pub(super) fn add_scaled<const N: usize>(beta: &mut [f64], g: &[f64], s: f64) {
    let beta = &mut beta[..N];
    let g = &g[..N];
    for i in 0..N {
        beta[i] += s * g[i];
    }
}
