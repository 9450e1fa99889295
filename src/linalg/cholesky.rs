use num_traits::Float;

use crate::linalg::LinalgError;

/// Cholesky decomposition in place: A = L * L^T.
///
/// `a` is a row-major `n × n` symmetric matrix. On return the lower triangle
/// (including the diagonal) holds L; the strict upper triangle is left
/// unchanged.
///
/// A pivot that is not positive, or that collapses below machine precision
/// relative to the original diagonal entry, is reported as
/// [`LinalgError::NotPositiveDefinite`].
#[inline]
pub fn cholesky_in_place<T: Float>(a: &mut [T], n: usize) -> Result<(), LinalgError> {
    assert_eq!(a.len(), n * n, "Cholesky decomposition requires a square matrix");

    for j in 0..n {
        let row_j = j * n;
        let original = a[row_j + j].abs();
        let mut diag = a[row_j + j];
        for k in 0..j {
            diag = diag - a[row_j + k] * a[row_j + k];
        }
        // Negated comparison so NaN is rejected too.
        if !(diag > T::epsilon() * original) {
            return Err(LinalgError::NotPositiveDefinite);
        }
        let ljj = diag.sqrt();
        a[row_j + j] = ljj;

        for i in (j + 1)..n {
            let row_i = i * n;
            let mut sum = a[row_i + j];
            for k in 0..j {
                sum = sum - a[row_i + k] * a[row_j + k];
            }
            a[row_i + j] = sum / ljj;
        }
    }

    Ok(())
}

/// Solve L*x = b by forward substitution, where L is the lower triangle of `l`.
#[inline]
pub fn forward_substitute<T: Float>(l: &[T], n: usize, b: &[T], x: &mut [T]) {
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum = sum - l[i * n + j] * x[j];
        }
        x[i] = sum / l[i * n + i];
    }
}

/// Solve L^T * x = b by back substitution, where L is the lower triangle of `l`.
#[inline]
pub fn back_substitute_lt<T: Float>(l: &[T], n: usize, b: &[T], x: &mut [T]) {
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum = sum - l[j * n + i] * x[j];
        }
        x[i] = sum / l[i * n + i];
    }
}
