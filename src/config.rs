//! A typed TOML configuration loader.
//!
//! A thin adapter with no linear algebra of its own: it parses a file and
//! dispatches to the filter constructors and `ParameterMapping` builder.

use serde::Deserialize;

use crate::error::{Result, RoukfError};
use crate::filter::{FilterOps, RoukfFilter, StaticRoukfFilter};
use crate::mapping::{ElementaryMapping, ParameterMapping};
use crate::sigma_points::SigmaDistribution;

fn default_convergence_tol() -> f64 {
    1e-5
}

fn default_max_iterations() -> f64 {
    1000.0
}

#[derive(Debug, Deserialize)]
struct MapperBlockSpec {
    #[serde(rename = "type")]
    kind: u8,
    num_param: usize,
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct FilterFileConfig {
    filter_type: u8,
    states: usize,
    parameters: usize,
    observations: usize,
    initial_guess: Vec<f64>,
    parameter_uncertainty: Vec<f64>,
    observations_uncertainty: Vec<f64>,
    #[serde(default)]
    parameter_mapping: Vec<MapperBlockSpec>,
    sigma_distribution: u8,
    #[serde(default = "default_convergence_tol")]
    convergence_tol: f64,
    #[serde(default = "default_max_iterations")]
    max_iterations: f64,
}

impl FilterFileConfig {
    /// Parses a TOML document. Missing required fields surface as
    /// `Error::Config`; missing optional fields (`parameter_mapping`,
    /// `convergence_tol`, `max_iterations`) fall back to their documented
    /// defaults, logged at `warn!`.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: FilterFileConfig =
            toml::from_str(contents).map_err(|e| RoukfError::Config(e.to_string()))?;

        if !contents.contains("parameter_mapping") {
            log::warn!("parameter_mapping not set, defaulting to identity over all parameters");
        }
        if !contents.contains("convergence_tol") {
            log::warn!(
                "convergence_tol not set, defaulting to {}",
                default_convergence_tol()
            );
        }
        if !contents.contains("max_iterations") {
            log::warn!(
                "max_iterations not set, defaulting to {}",
                default_max_iterations()
            );
        }

        Ok(config)
    }

    fn sigma_distribution(&self) -> Result<SigmaDistribution> {
        match self.sigma_distribution {
            0 => Ok(SigmaDistribution::Simplex),
            1 => Ok(SigmaDistribution::Canonic),
            2 => Ok(SigmaDistribution::Star),
            3 => Ok(SigmaDistribution::SimplexStar),
            other => Err(RoukfError::Config(format!(
                "unknown sigma_distribution code {other}"
            ))),
        }
    }

    fn mapper(&self) -> Result<ParameterMapping> {
        if self.parameter_mapping.is_empty() {
            return Ok(ParameterMapping::identity(self.parameters));
        }
        let mut blocks = Vec::with_capacity(self.parameter_mapping.len());
        for block in &self.parameter_mapping {
            let elementary = match block.kind {
                0 => ElementaryMapping::Identity,
                1 => ElementaryMapping::Exponential,
                2 => {
                    let min = block.min.ok_or_else(|| {
                        RoukfError::Config("sigmoid mapping block missing `min`".to_string())
                    })?;
                    let max = block.max.ok_or_else(|| {
                        RoukfError::Config("sigmoid mapping block missing `max`".to_string())
                    })?;
                    ElementaryMapping::Sigmoid { min, max }
                }
                other => {
                    return Err(RoukfError::Config(format!(
                        "unknown parameter_mapping type code {other}"
                    )))
                }
            };
            blocks.push((block.num_param, elementary));
        }
        ParameterMapping::new(blocks, self.parameters)
    }

    /// Builds the filter described by this configuration and seeds its
    /// initial problem-space parameter guess, boxed behind `FilterOps` since
    /// the concrete type depends on `filter_type`.
    pub fn build(&self) -> Result<Box<dyn FilterOps>> {
        if self.initial_guess.len() != self.parameters {
            return Err(RoukfError::DimensionMismatch {
                context: "FilterFileConfig::build (initial_guess)",
                expected: self.parameters,
                got: self.initial_guess.len(),
            });
        }
        let mapper = self.mapper()?;
        let sigma_distribution = self.sigma_distribution()?;

        let mut filter: Box<dyn FilterOps> = match self.filter_type {
            0 => Box::new(RoukfFilter::new(
                self.observations,
                self.states,
                self.parameters,
                &self.observations_uncertainty,
                &self.parameter_uncertainty,
                sigma_distribution,
                Some(mapper),
            )?),
            1 => Box::new(StaticRoukfFilter::new(
                self.observations,
                self.parameters,
                &self.observations_uncertainty,
                &self.parameter_uncertainty,
                sigma_distribution,
                Some(mapper),
            )?),
            other => {
                return Err(RoukfError::Config(format!(
                    "unknown filter_type code {other}, expected 0 (joint) or 1 (static)"
                )))
            }
        };
        filter.set_tolerance(self.convergence_tol);
        filter.set_max_iterations(self.max_iterations);
        filter.set_parameters(&self.initial_guess)?;
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOINT_TOML: &str = r#"
        filter_type = 0
        states = 1
        parameters = 1
        observations = 1
        initial_guess = [0.0]
        parameter_uncertainty = [10.0]
        observations_uncertainty = [1.0]
        sigma_distribution = 1
    "#;

    #[test]
    fn builds_a_joint_filter_from_minimal_toml() {
        let config = FilterFileConfig::from_toml_str(JOINT_TOML).unwrap();
        let filter = config.build().unwrap();
        assert_eq!(filter.n_states(), 1);
        assert_eq!(filter.n_parameters(), 1);
        assert_eq!(filter.tolerance(), default_convergence_tol());
    }

    #[test]
    fn builds_a_static_filter_with_explicit_mapping() {
        let toml = r#"
            filter_type = 1
            states = 0
            parameters = 2
            observations = 1
            initial_guess = [1.0, 2.0]
            parameter_uncertainty = [10.0, 10.0]
            observations_uncertainty = [1.0]
            sigma_distribution = 1
            convergence_tol = 1e-6
            max_iterations = 50

            [[parameter_mapping]]
            type = 0
            num_param = 1

            [[parameter_mapping]]
            type = 1
            num_param = 1
        "#;
        let config = FilterFileConfig::from_toml_str(toml).unwrap();
        let filter = config.build().unwrap();
        assert_eq!(filter.n_states(), 0);
        assert_eq!(filter.max_iterations(), 50.0);
        assert_eq!(filter.parameters().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn missing_required_field_is_a_config_error() {
        let toml = r#"
            filter_type = 0
            states = 1
            parameters = 1
            observations = 1
            initial_guess = [0.0]
            sigma_distribution = 1
        "#;
        assert!(FilterFileConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn unknown_sigma_distribution_code_is_a_config_error() {
        let toml = r#"
            filter_type = 0
            states = 1
            parameters = 1
            observations = 1
            initial_guess = [0.0]
            parameter_uncertainty = [10.0]
            observations_uncertainty = [1.0]
            sigma_distribution = 9
        "#;
        let config = FilterFileConfig::from_toml_str(toml).unwrap();
        assert!(config.build().is_err());
    }
}
