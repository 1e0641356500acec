//! The trait shared by the joint (state + parameter) and static
//! (parameter-only) filter variants: one abstraction over both rather than
//! a single type with an "if has state" flag.

use crate::error::Result;
use crate::mapping::ParameterMapping;
use crate::operators::{ForwardOperator, ObservationOperator};
use crate::parallel::CollectiveComm;
use crate::sigma_points::SigmaDistribution;

pub trait FilterOps {
    fn n_observations(&self) -> usize;
    fn n_states(&self) -> usize;
    fn n_parameters(&self) -> usize;

    /// Reinitializes the filter in place to a fresh state with new
    /// dimensions and uncertainties, as if newly constructed. `n_states` is
    /// ignored by filter variants that carry no state vector.
    #[allow(clippy::too_many_arguments)]
    fn reset(
        &mut self,
        n_observations: usize,
        n_states: usize,
        n_parameters: usize,
        observation_uncertainty: &[f64],
        parameter_uncertainty: &[f64],
        sigma_distribution: SigmaDistribution,
        mapper: Option<ParameterMapping>,
    ) -> Result<()>;

    fn parameters(&self) -> Result<Vec<f64>>;
    fn set_parameters(&mut self, problem: &[f64]) -> Result<()>;
    fn parameters_std(&self) -> Vec<f64>;

    fn error(&self) -> &nalgebra::DVector<f64>;
    fn obs_error(&self, index: usize) -> Result<f64>;

    fn tolerance(&self) -> f64;
    fn set_tolerance(&mut self, tolerance: f64);
    fn max_iterations(&self) -> f64;
    fn set_max_iterations(&mut self, max_iterations: f64);
    fn has_converged(&self, relative: bool) -> bool;

    fn execute_step(
        &mut self,
        zhat: &[f64],
        a: &mut dyn ForwardOperator,
        h: &mut dyn ObservationOperator,
    ) -> Result<f64>;

    fn execute_step_parallel(
        &mut self,
        zhat: &[f64],
        a: &mut dyn ForwardOperator,
        h: &mut dyn ObservationOperator,
        sigma_index: usize,
        world: &dyn CollectiveComm,
        masters: Option<&dyn CollectiveComm>,
    ) -> Result<f64>;

    fn describe(&self) -> String;
}
