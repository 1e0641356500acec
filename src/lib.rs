//! Reduced-order unscented Kalman filter (ROUKF) for joint state-parameter
//! estimation.
//!
//! Characteristics:
//! - Uses the [nalgebra](https://nalgebra.org) crate for math.
//! - Four deterministic [sigma-point distributions](sigma_points::SigmaDistribution)
//!   (`SIMPLEX`, `CANONIC`, `STAR`, `SIMPLEX_STAR`) with no randomness.
//! - A composable [`ParameterMapping`](mapping::ParameterMapping) for
//!   constrained (positive, ranged) parameters, kept orthogonal to both
//!   filter variants below.
//! - Two filter variants sharing one [`FilterOps`](filter::FilterOps) trait:
//!   [`RoukfFilter`](filter::RoukfFilter) (joint state + parameter) and
//!   [`StaticRoukfFilter`](filter::StaticRoukfFilter) (parameter-only).
//! - An optional, feature-gated parallel step over a pluggable
//!   [`CollectiveComm`](parallel::CollectiveComm), with a thread-based
//!   in-process implementation shipped by default and a real MPI backend
//!   behind `--features mpi-comm`.
//! - A typed TOML [`config`] loader for constructing a ready-to-run filter.
//!
//! Throughout the library, `p` denotes the number of parameters, `n` the
//! number of states, `m` the number of observations, and `q` the number of
//! sigma points (determined by `p` and the chosen distribution).

#![allow(non_snake_case)]

pub mod config;
pub mod convergence;
pub mod diagonal;
pub mod error;
pub mod filter;
pub mod mapping;
pub mod operators;
pub mod parallel;
pub mod sigma_points;

pub use config::FilterFileConfig;
pub use error::{Result, RoukfError};
pub use filter::{FilterOps, RoukfFilter, StaticRoukfFilter};
pub use mapping::{ElementaryMapping, ParameterMapping};
pub use operators::{
    ForwardOperator, ObservationOperator, OperatorStatus, RawForwardFn, RawForwardOperator,
    RawObservationFn, RawObservationOperator,
};
pub use parallel::{CollectiveComm, InProcessComm};
pub use sigma_points::SigmaDistribution;
