//! The canonical Monte Carlo calculator.

use std::sync::Arc;

use cemc_core::{CemcError, ErrorInfo, RngHandle};
use cemc_system::{SupercellSystem, System};

use crate::analysis::standard_analysis_functions;
use crate::enforce::enforce_composition;
use crate::metropolis::occupation_metropolis;
use crate::occ_location::{
    make_canonical_swaps, make_grand_canonical_swaps, propose_canonical_event, OccLocation,
};
use crate::potential::{CanonicalPotential, Potential};
use crate::run_manager::{RunCounters, RunManager};
use crate::sampling_functions::standard_sampling_functions;
use crate::series;
use crate::state::{Conditions, State};
use crate::state_generator::StateGeneratorParams;

/// Canonical ensemble calculator: fixed composition, swap proposals,
/// Metropolis acceptance against the formation-energy expansion.
pub struct Canonical {
    /// Shared system data.
    pub system: Arc<System>,
}

impl Canonical {
    /// Requires the system to carry a `formation_energy` expansion.
    pub fn new(system: Arc<System>) -> Result<Self, CemcError> {
        if !system.has_clex("formation_energy") {
            return Err(CemcError::Consistency(
                ErrorInfo::new("unknown-expansion", "canonical calculator needs formation_energy")
                    .with_context("kind", "clex")
                    .with_context("key", "formation_energy"),
            ));
        }
        Ok(Self { system })
    }

    /// Performs a single run at the state's conditions, evolving the
    /// state in place.
    ///
    /// Required conditions: `temperature` and `mol_composition` (possibly
    /// via `param_composition`). The initial occupation is first walked to
    /// the requested composition.
    pub fn run(
        &self,
        state: &mut State,
        run_manager: &mut RunManager,
        rng: &mut RngHandle,
    ) -> Result<RunCounters, CemcError> {
        let conditions =
            Conditions::from_value_map(&state.conditions, &self.system.composition_converter)?;
        let target_mol = conditions.mol_composition.clone().ok_or_else(|| {
            CemcError::Consistency(
                ErrorInfo::new("missing-condition", "canonical run needs mol_composition")
                    .with_context("key", "mol_composition"),
            )
        })?;

        let supercell = SupercellSystem::new(&self.system, state.transformation_matrix)?;
        state.validate_shape(&supercell.convert)?;

        let mut occ_location = OccLocation::new(supercell.convert.clone(), false);
        occ_location.initialize(&state.occupation)?;
        let grand_canonical_swaps = make_grand_canonical_swaps(occ_location.candidate_list());
        enforce_composition(
            &mut state.occupation,
            &target_mol,
            &self.system.composition_calculator,
            &mut occ_location,
            &grand_canonical_swaps,
            rng,
        )?;
        let canonical_swaps = make_canonical_swaps(occ_location.candidate_list());

        let potential: Arc<dyn Potential> = Arc::new(CanonicalPotential::new(&supercell)?);
        let functions =
            standard_sampling_functions(&self.system, &supercell, potential.clone())?;
        let analysis_functions = standard_analysis_functions(
            self.system.components(),
            &self.system.composition_converter.axis_names(),
        );

        run_manager.begin_run(state, functions, analysis_functions)?;
        let counters = occupation_metropolis(
            state,
            &mut occ_location,
            potential.as_ref(),
            conditions.beta,
            &canonical_swaps,
            propose_canonical_event,
            rng,
            run_manager,
        )?;
        run_manager.finish_run(state, counters)?;
        Ok(counters)
    }

    /// Performs a series of runs driven by `generator`, with restart.
    pub fn run_series(
        &self,
        generator: &StateGeneratorParams,
        run_manager: &mut RunManager,
        master_seed: u64,
    ) -> Result<(), CemcError> {
        let n_sites = series::n_sites(&self.system, generator);
        series::run_series(generator, run_manager, master_seed, n_sites, |state, rm, rng| {
            self.run(state, rm, rng)
        })
    }
}
