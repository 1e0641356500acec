//! The full joint state-parameter filter, `RoukfFilter`.
//!
//! Samples state and parameter displacements through the same set of sigma
//! columns, propagates both through the caller's operators, and folds the
//! result back through a shared reduced covariance factor update, with a
//! composable [`ParameterMapping`] and a pluggable [`CollectiveComm`] for the
//! parallel step.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, RoukfError};
use crate::filter::base::{FactorUpdateInput, FilterBase};
use crate::filter::ops::FilterOps;
use crate::mapping::ParameterMapping;
use crate::operators::{ForwardOperator, ObservationOperator, OperatorStatus};
use crate::parallel::CollectiveComm;
use crate::sigma_points::SigmaDistribution;

#[derive(Debug, Clone)]
pub struct RoukfFilter {
    base: FilterBase,
    n_states: usize,
    x: DVector<f64>,
    l_x: DMatrix<f64>,
}

impl RoukfFilter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        n_observations: usize,
        n_states: usize,
        n_parameters: usize,
        observation_uncertainty: &[f64],
        parameter_uncertainty: &[f64],
        sigma_distribution: SigmaDistribution,
        mapper: Option<ParameterMapping>,
    ) -> Result<Self> {
        let mapper = mapper.unwrap_or_else(|| ParameterMapping::identity(n_parameters));
        let base = FilterBase::new(
            n_observations,
            n_parameters,
            observation_uncertainty,
            parameter_uncertainty,
            sigma_distribution,
            mapper,
        )?;
        Ok(RoukfFilter {
            n_states,
            x: DVector::zeros(n_states),
            l_x: DMatrix::zeros(n_states, n_parameters),
            base,
        })
    }

    pub fn state(&self) -> &DVector<f64> {
        &self.x
    }

    pub fn set_state(&mut self, x: &[f64]) -> Result<()> {
        if x.len() != self.n_states {
            return Err(RoukfError::DimensionMismatch {
                context: "RoukfFilter::set_state",
                expected: self.n_states,
                got: x.len(),
            });
        }
        self.x = DVector::from_row_slice(x);
        Ok(())
    }

    /// Swaps in a new parameter mapping, preserving the problem-space
    /// parameter value across the swap (unmap with the old mapper, map with
    /// the new one).
    pub fn replace_mapper(&mut self, new_mapper: ParameterMapping) -> Result<()> {
        let problem = self.base.mapper.unmap(self.base.theta.as_slice())?;
        let filter_space = new_mapper.map(&problem)?;
        self.base.theta = DVector::from_vec(filter_space);
        self.base.mapper = new_mapper;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn reset(
        &mut self,
        n_observations: usize,
        n_states: usize,
        n_parameters: usize,
        observation_uncertainty: &[f64],
        parameter_uncertainty: &[f64],
        sigma_distribution: SigmaDistribution,
        mapper: Option<ParameterMapping>,
    ) -> Result<()> {
        *self = RoukfFilter::new(
            n_observations,
            n_states,
            n_parameters,
            observation_uncertainty,
            parameter_uncertainty,
            sigma_distribution,
            mapper,
        )?;
        Ok(())
    }

    /// Steps 2-3 of the assimilation step for a single sigma column: sample
    /// the displacement, propagate through `A`, re-map, observe through `H`.
    fn propagate_column(
        &self,
        sigma_index: usize,
        ct: &DMatrix<f64>,
        a: &mut dyn ForwardOperator,
        h: &mut dyn ObservationOperator,
    ) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>)> {
        let disp = ct * self.base.sigma.column(sigma_index);
        let x_i = &self.x + &self.l_x * &disp;
        let theta_filter_i = &self.base.theta + &self.base.l_theta * &disp;
        let theta_problem_i = self.base.mapper.unmap(theta_filter_i.as_slice())?;

        let mut x_buf: Vec<f64> = x_i.iter().copied().collect();
        let mut theta_buf = theta_problem_i;

        let status = a.forward(&mut x_buf, &mut theta_buf);
        if status == OperatorStatus::Failure {
            return Err(RoukfError::OperatorFailure { sigma_index });
        }

        let theta_i_filter = self.base.mapper.map(&theta_buf)?;
        let mut z_buf = vec![0.0; self.base.n_observations()];
        h.observe(&x_buf, &mut z_buf);

        Ok((x_buf, theta_i_filter, z_buf))
    }

    /// Steps 4-8, shared between the serial and parallel paths once Xk/Θk/Zk
    /// are assembled.
    fn finish_step(
        &mut self,
        zhat: &[f64],
        xk: DMatrix<f64>,
        thetak: DMatrix<f64>,
        zk: DMatrix<f64>,
    ) -> Result<f64> {
        let q = xk.ncols() as f64;
        let x_bar = DVector::from_fn(self.n_states, |r, _| xk.row(r).sum() / q);
        self.l_x = &xk * &self.base.d_sigma;

        let out = self.base.factor_update(FactorUpdateInput {
            thetak,
            zk,
            zhat: DVector::from_row_slice(zhat),
        });
        self.base.l_theta = out.l_theta;
        self.base.u = out.u;

        let u_inv = self
            .base
            .u
            .clone()
            .try_inverse()
            .ok_or(RoukfError::NotPositiveDefinite)?;
        let wi_e = self.base.wi.mul_vec(&out.error);
        let hl_t_wi_e = out.hl.transpose() * &wi_e;
        let shared_gain_term = &u_inv * &hl_t_wi_e;

        self.base.theta = &out.theta_bar + &self.base.l_theta * &shared_gain_term;
        self.x = &x_bar + &self.l_x * &shared_gain_term;

        self.base.error = out.error;
        self.base.convergence.record_error(self.base.error.norm());
        Ok(self.base.convergence.curr_error())
    }
}

impl FilterOps for RoukfFilter {
    fn n_observations(&self) -> usize {
        self.base.n_observations()
    }

    fn n_states(&self) -> usize {
        self.n_states
    }

    fn n_parameters(&self) -> usize {
        self.base.n_parameters()
    }

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
    ) -> Result<()> {
        RoukfFilter::reset(
            self,
            n_observations,
            n_states,
            n_parameters,
            observation_uncertainty,
            parameter_uncertainty,
            sigma_distribution,
            mapper,
        )
    }

    fn parameters(&self) -> Result<Vec<f64>> {
        self.base.parameters()
    }

    fn set_parameters(&mut self, problem: &[f64]) -> Result<()> {
        self.base.set_parameters(problem)
    }

    fn parameters_std(&self) -> Vec<f64> {
        self.base.parameters_std()
    }

    fn error(&self) -> &DVector<f64> {
        self.base.error()
    }

    fn obs_error(&self, index: usize) -> Result<f64> {
        self.base.obs_error(index)
    }

    fn tolerance(&self) -> f64 {
        self.base.tolerance()
    }

    fn set_tolerance(&mut self, tolerance: f64) {
        self.base.set_tolerance(tolerance)
    }

    fn max_iterations(&self) -> f64 {
        self.base.max_iterations()
    }

    fn set_max_iterations(&mut self, max_iterations: f64) {
        self.base.set_max_iterations(max_iterations)
    }

    fn has_converged(&self, relative: bool) -> bool {
        self.base.has_converged(relative)
    }

    fn execute_step(
        &mut self,
        zhat: &[f64],
        a: &mut dyn ForwardOperator,
        h: &mut dyn ObservationOperator,
    ) -> Result<f64> {
        if zhat.len() != self.base.n_observations() {
            return Err(RoukfError::DimensionMismatch {
                context: "RoukfFilter::execute_step (zhat)",
                expected: self.base.n_observations(),
                got: zhat.len(),
            });
        }
        let ct = self.base.cholesky_ct()?;
        let q = self.base.n_sigma();

        let mut xk = DMatrix::zeros(self.n_states, q);
        let mut thetak = DMatrix::zeros(self.base.n_parameters(), q);
        let mut zk = DMatrix::zeros(self.base.n_observations(), q);

        for i in 0..q {
            let (x_i, theta_i, z_i) = self.propagate_column(i, &ct, a, h)?;
            xk.set_column(i, &DVector::from_vec(x_i));
            thetak.set_column(i, &DVector::from_vec(theta_i));
            zk.set_column(i, &DVector::from_vec(z_i));
        }

        self.finish_step(zhat, xk, thetak, zk)
    }

    fn execute_step_parallel(
        &mut self,
        zhat: &[f64],
        a: &mut dyn ForwardOperator,
        h: &mut dyn ObservationOperator,
        sigma_index: usize,
        world: &dyn CollectiveComm,
        masters: Option<&dyn CollectiveComm>,
    ) -> Result<f64> {
        if zhat.len() != self.base.n_observations() {
            return Err(RoukfError::DimensionMismatch {
                context: "RoukfFilter::execute_step_parallel (zhat)",
                expected: self.base.n_observations(),
                got: zhat.len(),
            });
        }
        let q = self.base.n_sigma();
        if sigma_index >= q {
            return Err(RoukfError::DimensionMismatch {
                context: "RoukfFilter::execute_step_parallel (sigma_index)",
                expected: q,
                got: sigma_index + 1,
            });
        }

        let ct = self.base.cholesky_ct()?;
        let propagated = self.propagate_column(sigma_index, &ct, a, h);

        if let Some(failed_index) = crate::parallel::exchange_failure(
            propagated.as_ref().err().map(|_| sigma_index),
            world,
            masters,
            q,
        )? {
            return match propagated {
                Err(e) => Err(e),
                Ok(_) => Err(RoukfError::OperatorFailure {
                    sigma_index: failed_index,
                }),
            };
        }
        let (x_i, theta_i, z_i) = propagated.expect("checked above: no rank failed");

        let n = self.n_states;
        let p = self.base.n_parameters();
        let m = self.base.n_observations();

        let mut xk_flat = vec![0.0; n * q];
        let mut thetak_flat = vec![0.0; p * q];
        let mut zk_flat = vec![0.0; m * q];

        if let Some(masters_comm) = masters {
            if let Some(flat) = masters_comm.gather(&x_i, 0)? {
                xk_flat = flat;
            }
            if let Some(flat) = masters_comm.gather(&theta_i, 0)? {
                thetak_flat = flat;
            }
            if let Some(flat) = masters_comm.gather(&z_i, 0)? {
                zk_flat = flat;
            }
        }

        world.broadcast(&mut xk_flat, 0)?;
        world.broadcast(&mut thetak_flat, 0)?;
        world.broadcast(&mut zk_flat, 0)?;

        let xk = DMatrix::from_column_slice(n, q, &xk_flat);
        let thetak = DMatrix::from_column_slice(p, q, &thetak_flat);
        let zk = DMatrix::from_column_slice(m, q, &zk_flat);

        self.finish_step(zhat, xk, thetak, zk)
    }

    fn describe(&self) -> String {
        format!("X:\n{}\n{}", self.x, self.base.describe())
    }
}
