//! Fields and behaviour shared by the joint and the static filter variants.
//!
//! Everything that doesn't touch the state vector `X` lives here, so
//! `RoukfFilter` and `StaticRoukfFilter` both embed one `FilterBase` instead
//! of duplicating it.

use nalgebra::{DMatrix, DVector};

use crate::convergence::ConvergenceTracker;
use crate::diagonal::DiagonalMatrix;
use crate::error::{Result, RoukfError};
use crate::mapping::ParameterMapping;
use crate::sigma_points::{self, SigmaDistribution};

#[derive(Debug, Clone)]
pub struct FilterBase {
    pub(crate) n_observations: usize,
    pub(crate) n_parameters: usize,

    pub(crate) theta: DVector<f64>,
    pub(crate) u: DMatrix<f64>,
    pub(crate) l_theta: DMatrix<f64>,
    pub(crate) wi: DiagonalMatrix,

    pub(crate) sigma: DMatrix<f64>,
    pub(crate) d_sigma: DMatrix<f64>,
    pub(crate) pa: DMatrix<f64>,

    pub(crate) mapper: ParameterMapping,
    pub(crate) error: DVector<f64>,
    pub(crate) convergence: ConvergenceTracker,
}

impl FilterBase {
    pub fn new(
        n_observations: usize,
        n_parameters: usize,
        observation_uncertainty: &[f64],
        parameter_uncertainty: &[f64],
        sigma_distribution: SigmaDistribution,
        mapper: ParameterMapping,
    ) -> Result<Self> {
        if observation_uncertainty.len() != n_observations {
            return Err(RoukfError::DimensionMismatch {
                context: "FilterBase::new (observation_uncertainty)",
                expected: n_observations,
                got: observation_uncertainty.len(),
            });
        }
        if parameter_uncertainty.len() != n_parameters {
            return Err(RoukfError::DimensionMismatch {
                context: "FilterBase::new (parameter_uncertainty)",
                expected: n_parameters,
                got: parameter_uncertainty.len(),
            });
        }
        if mapper.len() != n_parameters {
            return Err(RoukfError::DimensionMismatch {
                context: "FilterBase::new (mapper)",
                expected: n_parameters,
                got: mapper.len(),
            });
        }

        let theta = DVector::zeros(n_parameters);
        let l_theta = DMatrix::identity(n_parameters, n_parameters);

        let u_diag = DVector::from_iterator(
            n_parameters,
            parameter_uncertainty.iter().map(|v| 1.0 / v),
        );
        let u = DMatrix::from_diagonal(&u_diag);

        let wi_diag = DVector::from_iterator(
            n_observations,
            observation_uncertainty.iter().map(|v| 1.0 / v),
        );
        let wi = DiagonalMatrix::from_diag(wi_diag);

        let sigma = sigma_points::generate(n_parameters, sigma_distribution)?;
        let n_sigma = sigma.ncols();
        let alpha = 1.0 / n_sigma as f64;
        let d_sigma = sigma.transpose() * alpha;
        let pa = &sigma * &d_sigma;

        Ok(FilterBase {
            n_observations,
            n_parameters,
            theta,
            u,
            l_theta,
            wi,
            sigma,
            d_sigma,
            pa,
            mapper,
            error: DVector::zeros(n_observations),
            convergence: ConvergenceTracker::default(),
        })
    }

    pub fn n_observations(&self) -> usize {
        self.n_observations
    }

    pub fn n_parameters(&self) -> usize {
        self.n_parameters
    }

    pub fn n_sigma(&self) -> usize {
        self.sigma.ncols()
    }

    pub fn parameters(&self) -> Result<Vec<f64>> {
        self.mapper.unmap(self.theta.as_slice())
    }

    pub fn set_parameters(&mut self, problem: &[f64]) -> Result<()> {
        let filter_space = self.mapper.map(problem)?;
        self.theta = DVector::from_vec(filter_space);
        Ok(())
    }

    pub fn parameters_std(&self) -> Vec<f64> {
        self.u.diagonal().iter().map(|u_ii| (1.0 / u_ii).sqrt()).collect()
    }

    pub fn error(&self) -> &DVector<f64> {
        &self.error
    }

    pub fn obs_error(&self, index: usize) -> Result<f64> {
        self.error.get(index).copied().ok_or(RoukfError::DimensionMismatch {
            context: "FilterBase::obs_error",
            expected: self.n_observations,
            got: index + 1,
        })
    }

    pub fn tolerance(&self) -> f64 {
        self.convergence.tolerance()
    }

    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.convergence.set_tolerance(tolerance);
    }

    pub fn max_iterations(&self) -> f64 {
        self.convergence.max_iterations()
    }

    pub fn set_max_iterations(&mut self, max_iterations: f64) {
        self.convergence.set_max_iterations(max_iterations);
    }

    pub fn has_converged(&self, relative: bool) -> bool {
        self.convergence.has_converged(relative)
    }

    /// `U^-1 = C^T C`, with `C` upper triangular, returning `C^T` (lower
    /// triangular) — which is exactly the factor the sampling step needs.
    pub(crate) fn cholesky_ct(&self) -> Result<DMatrix<f64>> {
        let u_inv = self.u.clone().try_inverse().ok_or_else(|| {
            log::error!("U is singular, cannot form U^-1");
            RoukfError::NotPositiveDefinite
        })?;
        let chol = nalgebra::linalg::Cholesky::new(u_inv).ok_or_else(|| {
            log::error!("U^-1 is not positive definite, Cholesky factorization failed");
            RoukfError::NotPositiveDefinite
        })?;
        Ok(chol.l())
    }

    pub fn describe(&self) -> String {
        format!(
            "Theta:\n{}\nU:\n{}\nLTheta:\n{}\nsigma:\n{}\nDsigma:\n{}\nPa:\n{}\nerror:\n{}",
            self.theta, self.u, self.l_theta, self.sigma, self.d_sigma, self.pa, self.error
        )
    }
}

/// Shared factor-update math (steps 4-8 of the assimilation step), consumed
/// identically by the serial and parallel paths so they're structurally
/// guaranteed to agree on identical inputs.
pub(crate) struct FactorUpdateInput {
    pub thetak: DMatrix<f64>,
    pub zk: DMatrix<f64>,
    pub zhat: DVector<f64>,
}

pub(crate) struct FactorUpdateOutput {
    pub theta_bar: DVector<f64>,
    pub l_theta: DMatrix<f64>,
    pub hl: DMatrix<f64>,
    pub u: DMatrix<f64>,
    pub error: DVector<f64>,
}

impl FilterBase {
    pub(crate) fn factor_update(&self, input: FactorUpdateInput) -> FactorUpdateOutput {
        let q = input.thetak.ncols() as f64;
        let theta_bar = DVector::from_fn(input.thetak.nrows(), |r, _| {
            input.thetak.row(r).sum() / q
        });
        let z_bar = DVector::from_fn(input.zk.nrows(), |r, _| input.zk.row(r).sum() / q);
        let error = &input.zhat - &z_bar;

        let l_theta = &input.thetak * &self.d_sigma;
        let hl = &input.zk * &self.d_sigma;
        let u = &self.pa + hl.transpose() * self.wi.mul_mat(&hl);

        log::trace!("residual e = {error}");
        log::trace!("updated U =\n{u}");

        FactorUpdateOutput {
            theta_bar,
            l_theta,
            hl,
            u,
            error,
        }
    }
}
