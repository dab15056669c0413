//! Run-parameters document.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use cemc_core::{io_error, CemcError, ErrorInfo};

use crate::run_manager::RunManagerParams;
use crate::sampling::SamplingFixtureParams;
use crate::state_generator::StateGeneratorParams;

/// Calculator-specific options.
///
/// Atom tracking is implied by the calculator: the kinetic calculator
/// always tracks occupant identities, the Metropolis calculators never do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationOptions {
    /// Master RNG seed; run `k` of a series uses substream `k`.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    0x0CE0_5EED_0CE0_5EED
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            seed: default_seed(),
        }
    }
}

/// On-disk form of the run-parameters document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    /// Calculator-specific options.
    #[serde(default)]
    pub calculation_options: CalculationOptions,
    /// State generation method and parameters.
    pub state_generation: StateGeneratorParams,
    /// One or more sampling fixtures.
    pub sampling_fixtures: Vec<SamplingFixtureParams>,
    /// Run manager parameters.
    #[serde(default)]
    pub run_manager: RunManagerParams,
}

impl RunParams {
    /// Validates the document.
    pub fn validate(&self) -> Result<(), CemcError> {
        self.state_generation.validate()?;
        if self.sampling_fixtures.is_empty() {
            return Err(CemcError::Config(
                ErrorInfo::new("no-fixtures", "at least one sampling fixture is required")
                    .with_context("path", "sampling_fixtures"),
            ));
        }
        let mut labels = BTreeSet::new();
        for (i, fixture) in self.sampling_fixtures.iter().enumerate() {
            let path = format!("sampling_fixtures/{i}");
            fixture.sampling_params.schedule.validate(&path)?;
            if !labels.insert(fixture.label.clone()) {
                return Err(CemcError::Config(
                    ErrorInfo::new("duplicate-label", "fixture labels must be unique")
                        .with_context("path", path)
                        .with_context("label", fixture.label.clone()),
                ));
            }
            let cutoff = &fixture.completion_check_params.cutoff;
            if cutoff.max_count.is_none()
                && cutoff.max_time.is_none()
                && fixture.completion_check_params.convergence.is_empty()
            {
                return Err(CemcError::Config(
                    ErrorInfo::new(
                        "no-stopping-criterion",
                        "fixture needs max_count, max_time or a convergence target",
                    )
                    .with_context("path", path.clone())
                    .with_context("label", fixture.label.clone()),
                ));
            }
            for requested in &fixture.completion_check_params.convergence {
                if requested.abs_precision.is_none() && requested.rel_precision.is_none() {
                    return Err(CemcError::Config(
                        ErrorInfo::new(
                            "no-precision-target",
                            "convergence entries need abs_precision or rel_precision",
                        )
                        .with_context("path", path)
                        .with_context("quantity", requested.quantity.clone()),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Parses and validates a JSON run-parameters document.
    pub fn from_json(json: &str) -> Result<Self, CemcError> {
        let params: RunParams = serde_json::from_str(json).map_err(|err| {
            CemcError::Config(
                ErrorInfo::new("run-params-parse", err.to_string())
                    .with_hint("see the run parameters schema"),
            )
        })?;
        params.validate()?;
        Ok(params)
    }

    /// Loads a run-parameters document from disk.
    pub fn load(path: &Path) -> Result<Self, CemcError> {
        let json = std::fs::read_to_string(path)
            .map_err(|err| io_error("run-params-read", err, path.display()))?;
        Self::from_json(&json)
    }
}
