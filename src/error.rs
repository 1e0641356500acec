use thiserror::Error;

/// Crate-wide error type returned from every fallible public entry point.
#[derive(Debug, Error)]
pub enum RoukfError {
    /// A buffer or partition length did not match the filter's fixed dimensions.
    #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    /// `U` (or, transiently, `U^-1`) is no longer symmetric positive definite.
    #[error("covariance factor U is not positive definite, Cholesky factorization failed")]
    NotPositiveDefinite,

    /// A parameter mapping was evaluated outside its domain.
    #[error("parameter mapping domain violation: {0}")]
    MapperDomain(String),

    /// The user-supplied forward operator reported failure for one sigma column.
    #[error("forward operator failed for sigma column {sigma_index}")]
    OperatorFailure { sigma_index: usize },

    /// A configuration file was missing a required field or held a malformed value.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = core::result::Result<T, RoukfError>;
