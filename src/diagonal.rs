//! A structurally diagonal matrix, used for the observation-confidence
//! matrix `Wi`. `Wi` is conceptually sparse and off-diagonal mutation is
//! forbidden; here that invariant is structural rather than a comment,
//! since this type exposes no way to set an off-diagonal entry.

use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone)]
pub struct DiagonalMatrix {
    diag: DVector<f64>,
}

impl DiagonalMatrix {
    pub fn from_diag(diag: DVector<f64>) -> Self {
        DiagonalMatrix { diag }
    }

    pub fn identity(n: usize) -> Self {
        DiagonalMatrix {
            diag: DVector::from_element(n, 1.0),
        }
    }

    pub fn len(&self) -> usize {
        self.diag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diag.len() == 0
    }

    pub fn diag(&self) -> &DVector<f64> {
        &self.diag
    }

    /// `self * rhs`, scaling each row `i` of `rhs` by `diag[i]`.
    pub fn mul_mat(&self, rhs: &DMatrix<f64>) -> DMatrix<f64> {
        debug_assert_eq!(self.len(), rhs.nrows());
        DMatrix::from_fn(rhs.nrows(), rhs.ncols(), |r, c| self.diag[r] * rhs[(r, c)])
    }

    /// `self * rhs`, scaling each entry of the vector `rhs` by `diag[i]`.
    pub fn mul_vec(&self, rhs: &DVector<f64>) -> DVector<f64> {
        debug_assert_eq!(self.len(), rhs.len());
        DVector::from_fn(rhs.len(), |r, _| self.diag[r] * rhs[r])
    }
}
