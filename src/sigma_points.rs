//! Deterministic sigma-point generation.
//!
//! Each distribution is a fixed, weight-uniform set of displacement columns
//! in the reduced parameter space, with no randomness and no dependence on
//! the current filter state.

use nalgebra as na;
use na::DMatrix;

use crate::error::{Result, RoukfError};

/// The four deterministic sigma-point families this filter supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigmaDistribution {
    /// Nσ = p + 1, recursively constructed, columns sum to zero.
    Simplex = 0,
    /// Nσ = 2p, antisymmetric pairs `±√p·eᵢ`.
    Canonic = 1,
    /// Nσ = 2p + 1, canonic pairs plus a zero centroid column.
    Star = 2,
    /// Nσ = p + 2, simplex plus a zero centroid, uniformly rescaled.
    SimplexStar = 3,
}

impl SigmaDistribution {
    /// Number of sigma columns this distribution produces for `p` parameters.
    pub fn n_sigma(self, p: usize) -> usize {
        match self {
            SigmaDistribution::Simplex => p + 1,
            SigmaDistribution::Canonic => 2 * p,
            SigmaDistribution::Star => 2 * p + 1,
            SigmaDistribution::SimplexStar => p + 2,
        }
    }
}

/// Generates the `p × Nσ` matrix of sigma-point columns for `distribution`.
pub fn generate(p: usize, distribution: SigmaDistribution) -> Result<DMatrix<f64>> {
    if p == 0 {
        return Err(RoukfError::DimensionMismatch {
            context: "sigma_points::generate",
            expected: 1,
            got: 0,
        });
    }
    Ok(match distribution {
        SigmaDistribution::Canonic => canonic(p),
        SigmaDistribution::Simplex => simplex(p),
        SigmaDistribution::Star => star(p),
        SigmaDistribution::SimplexStar => simplex_star(p),
    })
}

fn canonic(p: usize) -> DMatrix<f64> {
    scaled_canonic(p, (p as f64).sqrt())
}

fn star(p: usize) -> DMatrix<f64> {
    let n_sigma = 2 * p + 1;
    let scale = ((2.0 * p as f64 + 1.0) / 2.0).sqrt();
    let mut sigma = DMatrix::zeros(p, n_sigma);
    fill_canonic_pairs(&mut sigma, p, scale);
    // column 2p (the last one) stays zero: the centroid.
    sigma
}

/// Shared construction for CANONIC: the first `p` columns are `scale·eᵢ`, the
/// next `p` columns mirror them negated in reverse order.
fn scaled_canonic(p: usize, scale: f64) -> DMatrix<f64> {
    let mut sigma = DMatrix::zeros(p, 2 * p);
    fill_canonic_pairs(&mut sigma, p, scale);
    sigma
}

fn fill_canonic_pairs(sigma: &mut DMatrix<f64>, p: usize, scale: f64) {
    for i in 0..p {
        sigma[(i, i)] = scale;
    }
    for k in 0..p {
        // column p+k mirrors column (p-1-k), negated.
        let src = p - 1 - k;
        let dst = p + k;
        for row in 0..p {
            sigma[(row, dst)] = -sigma[(row, src)];
        }
    }
}

/// Recursive simplex construction: `n_points` rows producing `n_points + 1`
/// columns.
fn simplex_recursive(n_points: usize, weight: f64) -> DMatrix<f64> {
    let curr_weight = 1.0 / ((n_points * (n_points + 1)) as f64 * weight).sqrt();
    if n_points == 1 {
        return DMatrix::from_row_slice(1, 2, &[-curr_weight, curr_weight]);
    }
    let sub = simplex_recursive(n_points - 1, weight);
    let mut sigma = DMatrix::zeros(n_points, n_points + 1);
    sigma
        .view_mut((0, 0), (n_points - 1, n_points))
        .copy_from(&sub);
    for col in 0..n_points {
        sigma[(n_points - 1, col)] = -curr_weight;
    }
    sigma[(n_points - 1, n_points)] = n_points as f64 * curr_weight;
    sigma
}

fn simplex(p: usize) -> DMatrix<f64> {
    simplex_recursive(p, 1.0 / (p as f64 + 1.0))
}

fn simplex_star(p: usize) -> DMatrix<f64> {
    let mut sigma = DMatrix::zeros(p, p + 2);
    let base = simplex_recursive(p, 1.0 / (p as f64 + 1.0));
    sigma.view_mut((0, 0), (p, p + 1)).copy_from(&base);
    sigma * ((p as f64 + 2.0) / (p as f64 + 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn canonic_shape_and_columns() {
        let sigma = generate(3, SigmaDistribution::Canonic).unwrap();
        assert_eq!(sigma.shape(), (3, 6));
        let scale = 3f64.sqrt();
        for i in 0..3 {
            assert_relative_eq!(sigma[(i, i)], scale);
            for row in 0..3 {
                if row != i {
                    assert_relative_eq!(sigma[(row, i)], 0.0);
                }
            }
        }
        for k in 0..3 {
            let src = sigma.column(2 - k);
            let dst = sigma.column(3 + k);
            assert_relative_eq!(dst, -src);
        }
    }

    #[test]
    fn simplex_columns_sum_to_zero() {
        let sigma = generate(3, SigmaDistribution::Simplex).unwrap();
        assert_eq!(sigma.shape(), (3, 4));
        for col in sigma.column_iter() {
            assert_relative_eq!(col.sum(), 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn simplex_outer_product_is_scalar_multiple_of_identity() {
        let sigma = generate(3, SigmaDistribution::Simplex).unwrap();
        let outer = &sigma * sigma.transpose();
        let scalar = outer[(0, 0)];
        for i in 0..3 {
            for j in 0..3 {
                if i == j {
                    assert_relative_eq!(outer[(i, j)], scalar, epsilon = 1e-9);
                } else {
                    assert_relative_eq!(outer[(i, j)], 0.0, epsilon = 1e-9);
                }
            }
        }
    }

    #[test]
    fn star_has_zero_centroid_column() {
        let sigma = generate(3, SigmaDistribution::Star).unwrap();
        assert_eq!(sigma.shape(), (3, 7));
        for row in 0..3 {
            assert_relative_eq!(sigma[(row, 6)], 0.0);
        }
    }

    #[test]
    fn simplex_star_centroid_column_stays_zero() {
        // The centroid column is zero both before and after the
        // (p+2)/(p+1) rescale, since 0 * c == 0.
        let sigma = generate(3, SigmaDistribution::SimplexStar).unwrap();
        assert_eq!(sigma.shape(), (3, 5));
        for row in 0..3 {
            assert_relative_eq!(sigma[(row, 4)], 0.0);
        }
    }

    #[test]
    fn n_sigma_matches_generated_shape() {
        for p in 1..6 {
            for dist in [
                SigmaDistribution::Simplex,
                SigmaDistribution::Canonic,
                SigmaDistribution::Star,
                SigmaDistribution::SimplexStar,
            ] {
                let sigma = generate(p, dist).unwrap();
                assert_eq!(sigma.ncols(), dist.n_sigma(p));
                assert_eq!(sigma.nrows(), p);
            }
        }
    }

    #[test]
    fn zero_parameters_is_rejected() {
        assert!(generate(0, SigmaDistribution::Canonic).is_err());
    }
}
