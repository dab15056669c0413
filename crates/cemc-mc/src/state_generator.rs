//! State generation for multi-condition run series.

use serde::{Deserialize, Serialize};

use cemc_core::{CemcError, ErrorInfo, ValueMap};
use cemc_lattice::Mat3;

use crate::run_manager::RunData;
use crate::state::State;

/// Where a run's initial configuration comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ConfigSource {
    /// Every site takes occupant index zero.
    Default,
    /// An explicit occupation vector.
    Occupation {
        /// The occupation vector.
        occupation: Vec<u8>,
    },
}

impl Default for ConfigSource {
    fn default() -> Self {
        ConfigSource::Default
    }
}

/// Incremental generator parameters: a base condition set stepped by a
/// fixed increment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalGeneratorParams {
    /// Supercell transformation matrix for every state in the series.
    pub transformation_matrix: Mat3,
    /// Initial configuration source for the first (or every) run.
    #[serde(default)]
    pub initial_configuration: ConfigSource,
    /// Conditions of the first run.
    pub base_conditions: ValueMap,
    /// Per-run condition increment.
    #[serde(default)]
    pub increment: ValueMap,
    /// Number of runs in the series.
    pub n_states: usize,
    /// Reuse the previous run's final configuration as the next initial
    /// configuration (path-following).
    #[serde(default = "default_dependent_runs")]
    pub dependent_runs: bool,
}

fn default_dependent_runs() -> bool {
    true
}

/// A closed union of the supported state generation methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum StateGeneratorParams {
    /// Incremental condition path.
    Incremental(IncrementalGeneratorParams),
}

impl StateGeneratorParams {
    /// Validates the generator parameters.
    pub fn validate(&self) -> Result<(), CemcError> {
        match self {
            StateGeneratorParams::Incremental(params) => {
                if params.n_states == 0 {
                    return Err(CemcError::Config(
                        ErrorInfo::new("empty-series", "n_states must be at least one")
                            .with_context("path", "state_generation/n_states"),
                    ));
                }
                if !params.base_conditions.is_finite() || !params.increment.is_finite() {
                    return Err(CemcError::Config(
                        ErrorInfo::new("non-finite-conditions", "conditions must be finite")
                            .with_context("path", "state_generation"),
                    ));
                }
                Ok(())
            }
        }
    }

    /// The supercell transformation matrix used by the series.
    pub fn transformation_matrix(&self) -> &Mat3 {
        match self {
            StateGeneratorParams::Incremental(params) => &params.transformation_matrix,
        }
    }

    /// True when the series has produced every state.
    pub fn is_complete(&self, completed_runs: &[RunData]) -> bool {
        match self {
            StateGeneratorParams::Incremental(params) => completed_runs.len() >= params.n_states,
        }
    }

    /// Produces the next initial state.
    ///
    /// `n_sites` is the supercell site count, used to materialize default
    /// configurations.
    pub fn next_state(
        &self,
        completed_runs: &[RunData],
        n_sites: usize,
    ) -> Result<State, CemcError> {
        match self {
            StateGeneratorParams::Incremental(params) => {
                let k = completed_runs.len() as u64;
                let conditions =
                    ValueMap::incremented(&params.base_conditions, &params.increment, k)?;
                let occupation = if params.dependent_runs {
                    match completed_runs.last() {
                        Some(last)
                            if last.final_state.transformation_matrix
                                == params.transformation_matrix =>
                        {
                            last.final_state.occupation.clone()
                        }
                        _ => initial_occupation(&params.initial_configuration, n_sites),
                    }
                } else {
                    initial_occupation(&params.initial_configuration, n_sites)
                };
                Ok(State {
                    transformation_matrix: params.transformation_matrix,
                    occupation,
                    conditions,
                })
            }
        }
    }
}

fn initial_occupation(source: &ConfigSource, n_sites: usize) -> Vec<u8> {
    match source {
        ConfigSource::Default => vec![0; n_sites],
        ConfigSource::Occupation { occupation } => occupation.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> IncrementalGeneratorParams {
        let mut base = ValueMap::new();
        base.scalar_values.insert("temperature".into(), 200.0);
        let mut increment = ValueMap::new();
        increment.scalar_values.insert("temperature".into(), 200.0);
        IncrementalGeneratorParams {
            transformation_matrix: [[2, 0, 0], [0, 2, 0], [0, 0, 2]],
            initial_configuration: ConfigSource::Default,
            base_conditions: base,
            increment,
            n_states: 3,
            dependent_runs: true,
        }
    }

    #[test]
    fn conditions_step_with_run_index() {
        let generator = StateGeneratorParams::Incremental(params());
        let state = generator.next_state(&[], 8).unwrap();
        assert_eq!(state.conditions.scalar_values["temperature"], 200.0);
        assert_eq!(state.occupation, vec![0; 8]);

        let run = RunData {
            run_index: 0,
            conditions: state.conditions.clone(),
            initial_state: None,
            final_state: State {
                transformation_matrix: [[2, 0, 0], [0, 2, 0], [0, 0, 2]],
                occupation: vec![1; 8],
                conditions: state.conditions.clone(),
            },
            counters: Default::default(),
            failed: false,
        };
        let next = generator.next_state(&[run], 8).unwrap();
        assert_eq!(next.conditions.scalar_values["temperature"], 400.0);
        // path-following reuses the previous final configuration
        assert_eq!(next.occupation, vec![1; 8]);
    }
}
