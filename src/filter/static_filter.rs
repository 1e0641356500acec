//! The parameter-only filter, `StaticRoukfFilter`.
//!
//! Identical to the joint filter except there is no state vector and no
//! `LX` factor — every sigma column only carries a parameter displacement
//! through `A` and `H`.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, RoukfError};
use crate::filter::base::{FactorUpdateInput, FilterBase};
use crate::filter::ops::FilterOps;
use crate::mapping::ParameterMapping;
use crate::operators::{ForwardOperator, ObservationOperator, OperatorStatus};
use crate::parallel::CollectiveComm;
use crate::sigma_points::SigmaDistribution;

#[derive(Debug, Clone)]
pub struct StaticRoukfFilter {
    base: FilterBase,
}

impl StaticRoukfFilter {
    pub fn new(
        n_observations: usize,
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
        Ok(StaticRoukfFilter { base })
    }

    pub fn replace_mapper(&mut self, new_mapper: ParameterMapping) -> Result<()> {
        let problem = self.base.mapper.unmap(self.base.theta.as_slice())?;
        let filter_space = new_mapper.map(&problem)?;
        self.base.theta = DVector::from_vec(filter_space);
        self.base.mapper = new_mapper;
        Ok(())
    }

    /// `n_states` is accepted for interface parity with the joint filter and
    /// otherwise unused: the static variant carries no state vector.
    pub fn reset(
        &mut self,
        n_observations: usize,
        _n_states: usize,
        n_parameters: usize,
        observation_uncertainty: &[f64],
        parameter_uncertainty: &[f64],
        sigma_distribution: SigmaDistribution,
        mapper: Option<ParameterMapping>,
    ) -> Result<()> {
        *self = StaticRoukfFilter::new(
            n_observations,
            n_parameters,
            observation_uncertainty,
            parameter_uncertainty,
            sigma_distribution,
            mapper,
        )?;
        Ok(())
    }

    /// Steps 2-3 for a single sigma column, without any state term.
    fn propagate_column(
        &self,
        sigma_index: usize,
        ct: &DMatrix<f64>,
        a: &mut dyn ForwardOperator,
        h: &mut dyn ObservationOperator,
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        let disp = ct * self.base.sigma.column(sigma_index);
        let theta_filter_i = &self.base.theta + &self.base.l_theta * &disp;
        let mut theta_buf = self.base.mapper.unmap(theta_filter_i.as_slice())?;

        let mut empty_state: [f64; 0] = [];
        let status = a.forward(&mut empty_state, &mut theta_buf);
        if status == OperatorStatus::Failure {
            return Err(RoukfError::OperatorFailure { sigma_index });
        }

        let theta_i_filter = self.base.mapper.map(&theta_buf)?;
        let mut z_buf = vec![0.0; self.base.n_observations()];
        h.observe(&empty_state, &mut z_buf);

        Ok((theta_i_filter, z_buf))
    }

    fn finish_step(
        &mut self,
        zhat: &[f64],
        thetak: DMatrix<f64>,
        zk: DMatrix<f64>,
    ) -> Result<f64> {
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
        let gain_term = &u_inv * &hl_t_wi_e;

        self.base.theta = &out.theta_bar + &self.base.l_theta * &gain_term;
        self.base.error = out.error;
        self.base.convergence.record_error(self.base.error.norm());
        Ok(self.base.convergence.curr_error())
    }
}

impl FilterOps for StaticRoukfFilter {
    fn n_observations(&self) -> usize {
        self.base.n_observations()
    }

    fn n_states(&self) -> usize {
        0
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
        StaticRoukfFilter::reset(
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
                context: "StaticRoukfFilter::execute_step (zhat)",
                expected: self.base.n_observations(),
                got: zhat.len(),
            });
        }
        let ct = self.base.cholesky_ct()?;
        let q = self.base.n_sigma();

        let mut thetak = DMatrix::zeros(self.base.n_parameters(), q);
        let mut zk = DMatrix::zeros(self.base.n_observations(), q);

        for i in 0..q {
            let (theta_i, z_i) = self.propagate_column(i, &ct, a, h)?;
            thetak.set_column(i, &DVector::from_vec(theta_i));
            zk.set_column(i, &DVector::from_vec(z_i));
        }

        self.finish_step(zhat, thetak, zk)
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
                context: "StaticRoukfFilter::execute_step_parallel (zhat)",
                expected: self.base.n_observations(),
                got: zhat.len(),
            });
        }
        let q = self.base.n_sigma();
        if sigma_index >= q {
            return Err(RoukfError::DimensionMismatch {
                context: "StaticRoukfFilter::execute_step_parallel (sigma_index)",
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
        let (theta_i, z_i) = propagated.expect("checked above: no rank failed");

        let p = self.base.n_parameters();
        let m = self.base.n_observations();

        let mut thetak_flat = vec![0.0; p * q];
        let mut zk_flat = vec![0.0; m * q];

        if let Some(masters_comm) = masters {
            if let Some(flat) = masters_comm.gather(&theta_i, 0)? {
                thetak_flat = flat;
            }
            if let Some(flat) = masters_comm.gather(&z_i, 0)? {
                zk_flat = flat;
            }
        }

        world.broadcast(&mut thetak_flat, 0)?;
        world.broadcast(&mut zk_flat, 0)?;

        let thetak = DMatrix::from_column_slice(p, q, &thetak_flat);
        let zk = DMatrix::from_column_slice(m, q, &zk_flat);

        self.finish_step(zhat, thetak, zk)
    }

    fn describe(&self) -> String {
        self.base.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// A static regression: H(θ) = θ0 + θ1·t observed at fixed t, no state.
    /// `H` has no direct access to θ, so `A` stashes each sigma column's θ
    /// into a shared cell for `H` to read back — the same relay a caller
    /// linking against a foreign `A`/`H` pair would need.
    #[test]
    fn static_parameter_identification() {
        let mut filter = StaticRoukfFilter::new(
            1,
            2,
            &[1.0],
            &[10.0, 10.0],
            SigmaDistribution::Canonic,
            None,
        )
        .unwrap();

        let true_intercept = 2.0;
        let true_slope = 0.5;

        let last_theta = std::cell::RefCell::new(vec![0.0; 2]);
        let mut forward = |_state: &mut [f64], params: &mut [f64]| {
            *last_theta.borrow_mut() = params.to_vec();
            OperatorStatus::Success
        };

        for t in 0..200 {
            let t = t as f64;
            let zhat = true_intercept + true_slope * t;
            let mut observe = |_state: &[f64], obs: &mut [f64]| {
                let theta = last_theta.borrow();
                obs[0] = theta[0] + theta[1] * t;
            };
            filter
                .execute_step(&[zhat], &mut forward, &mut observe)
                .unwrap();
        }

        let estimate = filter.parameters().unwrap();
        assert_relative_eq!(estimate[0], true_intercept, epsilon = 1e-2);
        assert_relative_eq!(estimate[1], true_slope, epsilon = 1e-2);
    }

    #[test]
    fn reset_reinitializes_parameters_and_dimensions() {
        let mut filter = StaticRoukfFilter::new(
            1,
            2,
            &[1.0],
            &[10.0, 10.0],
            SigmaDistribution::Canonic,
            None,
        )
        .unwrap();
        filter.set_parameters(&[5.0, 6.0]).unwrap();

        filter
            .reset(2, 0, 3, &[1.0, 1.0], &[1.0, 1.0, 1.0], SigmaDistribution::Star, None)
            .unwrap();

        assert_eq!(filter.n_observations(), 2);
        assert_eq!(filter.n_parameters(), 3);
        assert_eq!(filter.parameters().unwrap(), vec![0.0, 0.0, 0.0]);
    }

    /// One rank's forward operator fails; every rank must still return an
    /// error rather than hang waiting on the failing rank's never-made
    /// gather/broadcast calls.
    #[test]
    fn parallel_step_aborts_on_every_rank_when_one_operator_fails() {
        use crate::parallel::InProcessComm;
        use std::thread;

        let make_filter = || {
            StaticRoukfFilter::new(1, 2, &[1.0], &[10.0, 10.0], SigmaDistribution::Canonic, None)
                .unwrap()
        };

        let q = make_filter().base.n_sigma();
        let world_comms = InProcessComm::cluster(q);
        let master_comms = InProcessComm::cluster(q);
        let failing_rank = q - 1;

        let filters: Vec<_> = (0..q).map(|_| make_filter()).collect();
        let results: Vec<Result<f64>> = thread::scope(|scope| {
            filters
                .into_iter()
                .zip(world_comms)
                .zip(master_comms)
                .enumerate()
                .map(|(i, ((mut f, world), master))| {
                    scope.spawn(move || {
                        let mut forward = |_state: &mut [f64], _params: &mut [f64]| {
                            if i == failing_rank {
                                OperatorStatus::Failure
                            } else {
                                OperatorStatus::Success
                            }
                        };
                        let mut observe = |_state: &[f64], obs: &mut [f64]| obs[0] = 0.0;
                        f.execute_step_parallel(
                            &[1.0],
                            &mut forward,
                            &mut observe,
                            i,
                            &world,
                            Some(&master),
                        )
                    })
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });

        for result in &results {
            match result {
                Err(RoukfError::OperatorFailure { sigma_index }) => {
                    assert_eq!(*sigma_index, failing_rank)
                }
                other => panic!("expected OperatorFailure, got {other:?}"),
            }
        }
    }
}
