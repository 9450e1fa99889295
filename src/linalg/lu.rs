use num_traits::Float;

use crate::linalg::LinalgError;

/// Row-pivoted LU factorisation of a row-major `n × n` matrix, in place.
///
/// `U` ends up on and above the diagonal, the unit-diagonal `L` below it,
/// and `perm[i]` names the original row now at position `i`. The returned
/// flag is the parity of the permutation (`true` for even).
///
/// Used when the damped curvature matrix is not positive definite.
pub fn lu_in_place<T: Float>(
    a: &mut [T],
    n: usize,
    perm: &mut [usize],
) -> Result<bool, LinalgError> {
    assert_eq!(a.len(), n * n, "LU decomposition requires a square matrix");
    assert_eq!(n, perm.len(), "permutation slice length must match matrix size");

    for (i, p) in perm.iter_mut().enumerate() {
        *p = i;
    }

    // Pivot threshold is relative to the largest entry.
    let scale = a.iter().fold(T::zero(), |m, v| m.max(v.abs()));
    if scale == T::zero() {
        return Err(LinalgError::Singular);
    }
    let threshold = scale * T::epsilon();

    let mut even = true;

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = a[col * n + col].abs();
        for row in (col + 1)..n {
            let val = a[row * n + col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if !(max_val > threshold) {
            return Err(LinalgError::Singular);
        }

        if max_row != col {
            perm.swap(col, max_row);
            for j in 0..n {
                a.swap(col * n + j, max_row * n + j);
            }
            even = !even;
        }

        let inv_pivot = T::one() / a[col * n + col];
        for row in (col + 1)..n {
            let factor = a[row * n + col] * inv_pivot;
            a[row * n + col] = factor;
            for j in (col + 1)..n {
                a[row * n + j] = a[row * n + j] - factor * a[col * n + j];
            }
        }
    }

    Ok(even)
}

/// Solve `A·x = b` with the output of [`lu_in_place`].
pub fn lu_solve<T: Float>(lu: &[T], n: usize, perm: &[usize], b: &[T], x: &mut [T]) {
    // L·y = P·b
    for i in 0..n {
        let mut sum = b[perm[i]];
        for j in 0..i {
            sum = sum - lu[i * n + j] * x[j];
        }
        x[i] = sum;
    }

    // U·x = y
    for i in (0..n).rev() {
        let mut sum = x[i];
        for j in (i + 1)..n {
            sum = sum - lu[i * n + j] * x[j];
        }
        x[i] = sum / lu[i * n + i];
    }
}
