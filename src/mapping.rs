//! Bijective mappings between problem-space (constrained, physical) and
//! filter-space (unconstrained) parameters.
//!
//! A tagged sum is used instead of a trait-object chain: there are only
//! three elementary shapes and they never grow a fourth at runtime.

use crate::error::{Result, RoukfError};

/// One elementary, parameter-wise bijection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementaryMapping {
    /// `map(x) = x`, `unmap(x) = x`.
    Identity,
    /// `map(x) = ln(x)`, `unmap(x) = exp(x)`. Keeps problem-space values positive.
    Exponential,
    /// `map(x) = -ln((max-min)/(x-min) - 1)`, ranged to `(min, max)`.
    Sigmoid { min: f64, max: f64 },
}

impl ElementaryMapping {
    fn map_one(self, x: f64) -> Result<f64> {
        match self {
            ElementaryMapping::Identity => Ok(x),
            ElementaryMapping::Exponential => {
                if x <= 0.0 {
                    return Err(RoukfError::MapperDomain(format!(
                        "exponential mapping requires a positive problem-space value, got {x}"
                    )));
                }
                Ok(x.ln())
            }
            ElementaryMapping::Sigmoid { min, max } => {
                if !(x > min && x < max) {
                    return Err(RoukfError::MapperDomain(format!(
                        "sigmoid mapping requires {min} < x < {max}, got {x}"
                    )));
                }
                Ok(-((max - min) / (x - min) - 1.0).ln())
            }
        }
    }

    fn unmap_one(self, x: f64) -> Result<f64> {
        match self {
            ElementaryMapping::Identity => Ok(x),
            ElementaryMapping::Exponential => Ok(x.exp()),
            ElementaryMapping::Sigmoid { min, max } => Ok(min + (max - min) / (1.0 + (-x).exp())),
        }
    }
}

/// A composite mapping: a sequence of `(count, mapping)` blocks partitioning
/// the parameter vector contiguously. The default mapping for `n` parameters
/// is a single `Identity` block of size `n`.
#[derive(Debug, Clone)]
pub struct ParameterMapping {
    blocks: Vec<(usize, ElementaryMapping)>,
    len: usize,
}

impl ParameterMapping {
    /// The default mapper: `Identity` over all `n` parameters.
    pub fn identity(n: usize) -> Self {
        ParameterMapping {
            blocks: vec![(n, ElementaryMapping::Identity)],
            len: n,
        }
    }

    /// Builds a composite mapping from `(count, mapping)` blocks. The counts
    /// must sum to `expected_len`.
    pub fn new(blocks: Vec<(usize, ElementaryMapping)>, expected_len: usize) -> Result<Self> {
        let len: usize = blocks.iter().map(|(n, _)| *n).sum();
        if len != expected_len {
            return Err(RoukfError::DimensionMismatch {
                context: "ParameterMapping::new (block counts)",
                expected: expected_len,
                got: len,
            });
        }
        Ok(ParameterMapping { blocks, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maps a problem-space vector into filter space.
    pub fn map(&self, problem: &[f64]) -> Result<Vec<f64>> {
        self.apply(problem, ElementaryMapping::map_one)
    }

    /// Maps a filter-space vector back into problem space.
    pub fn unmap(&self, filter: &[f64]) -> Result<Vec<f64>> {
        self.apply(filter, ElementaryMapping::unmap_one)
    }

    fn apply(&self, input: &[f64], f: impl Fn(ElementaryMapping, f64) -> Result<f64>) -> Result<Vec<f64>> {
        if input.len() != self.len {
            return Err(RoukfError::DimensionMismatch {
                context: "ParameterMapping::apply",
                expected: self.len,
                got: input.len(),
            });
        }
        let mut out = Vec::with_capacity(self.len);
        let mut offset = 0;
        for (count, mapping) in &self.blocks {
            for &x in &input[offset..offset + count] {
                out.push(f(*mapping, x)?);
            }
            offset += count;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn identity_round_trips() {
        let m = ParameterMapping::identity(3);
        let x = vec![1.0, -2.0, 3.5];
        assert_relative_eq!(m.map(&x).unwrap().as_slice(), x.as_slice());
        assert_relative_eq!(m.unmap(&x).unwrap().as_slice(), x.as_slice());
    }

    #[test]
    fn exponential_inverse() {
        let m = ParameterMapping::new(vec![(1, ElementaryMapping::Exponential)], 1).unwrap();
        assert_relative_eq!(m.map(&[1.0]).unwrap()[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(m.unmap(&[0.0]).unwrap()[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn sigmoid_inverse() {
        let m = ParameterMapping::new(
            vec![(1, ElementaryMapping::Sigmoid { min: 0.0, max: 10.0 })],
            1,
        )
        .unwrap();
        assert_relative_eq!(m.map(&[5.0]).unwrap()[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(m.unmap(&[0.0]).unwrap()[0], 5.0, epsilon = 1e-12);
    }

    #[test]
    fn composite_round_trip_matches_per_block_round_trips() {
        let m = ParameterMapping::new(
            vec![
                (1, ElementaryMapping::Identity),
                (1, ElementaryMapping::Exponential),
                (1, ElementaryMapping::Sigmoid { min: -1.0, max: 1.0 }),
            ],
            3,
        )
        .unwrap();
        let problem = vec![2.0, 3.0, 0.25];
        let filter = m.map(&problem).unwrap();
        let back = m.unmap(&filter).unwrap();
        assert_relative_eq!(back.as_slice(), problem.as_slice(), epsilon = 1e-9);
    }

    #[test]
    fn block_counts_must_sum_to_expected_len() {
        let err = ParameterMapping::new(vec![(1, ElementaryMapping::Identity)], 2);
        assert!(err.is_err());
    }

    #[test]
    fn exponential_map_rejects_non_positive_input() {
        let m = ParameterMapping::new(vec![(1, ElementaryMapping::Exponential)], 1).unwrap();
        assert!(m.map(&[0.0]).is_err());
        assert!(m.map(&[-1.0]).is_err());
    }

    #[test]
    fn sigmoid_map_rejects_out_of_range_input() {
        let m = ParameterMapping::new(
            vec![(1, ElementaryMapping::Sigmoid { min: 0.0, max: 10.0 })],
            1,
        )
        .unwrap();
        assert!(m.map(&[-1.0]).is_err());
        assert!(m.map(&[10.0]).is_err());
    }
}
