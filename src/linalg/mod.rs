//! Dense linear algebra for the small symmetric systems met while fitting.
//!
//! Matrices are row-major `n × n` slices sized at run time (the number of
//! active fit parameters). Symmetric positive-definite systems are solved with
//! Cholesky; when that fails the same system is retried with LU partial
//! pivoting before being reported singular.
//!
//! All scratch storage lives in a [`SymmetricSolver`], so repeated solves of
//! the same size never allocate.
//!
//! ```
//! use spotfit::linalg::SymmetricSolver;
//!
//! let a = [4.0_f64, 2.0, 2.0, 3.0];
//! let b = [8.0, 7.0];
//! let mut x = [0.0; 2];
//! let mut solver = SymmetricSolver::new(2);
//! solver.solve(&a, &b, &mut x).unwrap();
//! assert!((4.0 * x[0] + 2.0 * x[1] - 8.0).abs() < 1e-12);
//! ```

pub(crate) mod cholesky;
pub(crate) mod lu;


pub use cholesky::{back_substitute_lt, cholesky_in_place, forward_substitute};
pub use lu::{lu_in_place, lu_solve};

use num_traits::Float;

/// Errors from linear algebra operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LinalgError {
    /// Matrix is singular or nearly singular.
    #[error("matrix is singular")]
    Singular,
    /// Matrix is not positive definite (required for Cholesky).
    #[error("matrix is not positive definite")]
    NotPositiveDefinite,
    /// Matrix or right-hand side holds NaN or infinity.
    #[error("matrix contains non-finite values")]
    NotFinite,
}

/// Which factorisation produced the last successful solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Factorisation {
    Cholesky,
    Lu,
}

/// Reusable solver for `n × n` symmetric systems.
#[derive(Debug, Clone)]
pub struct SymmetricSolver<T> {
    n: usize,
    factor: Vec<T>,
    perm: Vec<usize>,
    y: Vec<T>,
}

impl<T: Float> SymmetricSolver<T> {
    /// Create a solver for systems of dimension `n`.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            factor: vec![T::zero(); n * n],
            perm: vec![0; n],
            y: vec![T::zero(); n],
        }
    }

    /// System dimension.
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Factorise `a` into the internal buffer, Cholesky first then LU.
    fn factorise(&mut self, a: &[T]) -> Result<Factorisation, LinalgError> {
        assert_eq!(a.len(), self.n * self.n, "matrix must be n × n");
        if a.iter().any(|v| !v.is_finite()) {
            return Err(LinalgError::NotFinite);
        }

        self.factor.copy_from_slice(a);
        if cholesky_in_place(&mut self.factor, self.n).is_ok() {
            return Ok(Factorisation::Cholesky);
        }

        self.factor.copy_from_slice(a);
        lu_in_place(&mut self.factor, self.n, &mut self.perm)?;
        Ok(Factorisation::Lu)
    }

    fn back_solve(&mut self, kind: Factorisation, b: &[T], x: &mut [T]) {
        let n = self.n;
        match kind {
            Factorisation::Cholesky => {
                forward_substitute(&self.factor, n, b, &mut self.y);
                back_substitute_lt(&self.factor, n, &self.y, x);
            }
            Factorisation::Lu => lu_solve(&self.factor, n, &self.perm, b, x),
        }
    }

    /// Solve `A x = b`.
    ///
    /// Returns [`LinalgError::Singular`] when neither factorisation succeeds
    /// or the solution is not finite.
    pub fn solve(&mut self, a: &[T], b: &[T], x: &mut [T]) -> Result<Factorisation, LinalgError> {
        assert_eq!(b.len(), self.n, "right-hand side length must match matrix size");
        assert_eq!(x.len(), self.n, "solution length must match matrix size");
        let kind = self.factorise(a)?;
        self.back_solve(kind, b, x);
        if x.iter().any(|v| !v.is_finite()) {
            return Err(LinalgError::Singular);
        }
        Ok(kind)
    }

    /// Invert `a` into `inv` (row-major).
    pub fn invert(&mut self, a: &[T], inv: &mut [T]) -> Result<Factorisation, LinalgError> {
        let n = self.n;
        assert_eq!(inv.len(), n * n, "inverse must be n × n");
        let kind = self.factorise(a)?;

        let mut e = vec![T::zero(); n];
        let mut col = vec![T::zero(); n];
        for j in 0..n {
            e.fill(T::zero());
            e[j] = T::one();
            self.back_solve(kind, &e, &mut col);
            for i in 0..n {
                inv[i * n + j] = col[i];
            }
        }

        if inv.iter().any(|v| !v.is_finite()) {
            return Err(LinalgError::Singular);
        }
        Ok(kind)
    }
}
