//! The kinetic Monte Carlo calculator.

use std::sync::Arc;

use cemc_core::{CemcError, ErrorInfo, RngHandle};
use cemc_system::{SupercellSystem, System};

use crate::analysis::standard_analysis_functions;
use crate::enforce::enforce_composition;
use crate::kmc::{kinetic_monte_carlo, CompleteEventList, KmcOptions};
use crate::occ_location::{make_grand_canonical_swaps, OccLocation};
use crate::potential::{CanonicalPotential, Potential};
use crate::run_manager::{RunCounters, RunManager};
use crate::sampling_functions::{add_kinetic_sampling_functions, standard_sampling_functions};
use crate::series;
use crate::state::{Conditions, State};
use crate::state_generator::StateGeneratorParams;

/// Kinetic Monte Carlo calculator: rejection-free event selection with
/// time-weighted propagation and atom tracking.
pub struct Kinetic {
    /// Shared system data.
    pub system: Arc<System>,
    /// Kernel options.
    pub options: KmcOptions,
}

impl Kinetic {
    /// Requires the system to carry a `formation_energy` expansion and at
    /// least one event type.
    pub fn new(system: Arc<System>) -> Result<Self, CemcError> {
        if !system.has_clex("formation_energy") {
            return Err(CemcError::Consistency(
                ErrorInfo::new("unknown-expansion", "kinetic calculator needs formation_energy")
                    .with_context("kind", "clex")
                    .with_context("key", "formation_energy"),
            ));
        }
        if system.event_type_data().is_empty() {
            return Err(CemcError::Consistency(ErrorInfo::new(
                "no-event-types",
                "kinetic calculator needs at least one event type",
            )));
        }
        Ok(Self {
            system,
            options: KmcOptions::default(),
        })
    }

    /// Performs a single run at the state's conditions, evolving the
    /// state in place.
    ///
    /// Required conditions: `temperature`. When `mol_composition` is also
    /// given, the initial occupation is walked to it first.
    pub fn run(
        &self,
        state: &mut State,
        run_manager: &mut RunManager,
        rng: &mut RngHandle,
    ) -> Result<RunCounters, CemcError> {
        let conditions =
            Conditions::from_value_map(&state.conditions, &self.system.composition_converter)?;
        let supercell = SupercellSystem::new(&self.system, state.transformation_matrix)?;
        state.validate_shape(&supercell.convert)?;

        let mut occ_location = OccLocation::new(supercell.convert.clone(), true);
        occ_location.initialize(&state.occupation)?;
        if let Some(target_mol) = &conditions.mol_composition {
            let grand_canonical_swaps = make_grand_canonical_swaps(occ_location.candidate_list());
            enforce_composition(
                &mut state.occupation,
                target_mol,
                &self.system.composition_calculator,
                &mut occ_location,
                &grand_canonical_swaps,
                rng,
            )?;
            // enforcement changes species without trajectories, so atom
            // identities restart from the enforced configuration
            occ_location.initialize(&state.occupation)?;
        }

        let mut event_list = CompleteEventList::new(&self.system, &supercell)?;

        let potential: Arc<dyn Potential> = Arc::new(CanonicalPotential::new(&supercell)?);
        let mut functions =
            standard_sampling_functions(&self.system, &supercell, potential.clone())?;
        add_kinetic_sampling_functions(&mut functions, &self.system)?;
        let analysis_functions = standard_analysis_functions(
            self.system.components(),
            &self.system.composition_converter.axis_names(),
        );

        run_manager.begin_run(state, functions, analysis_functions)?;
        let counters = kinetic_monte_carlo(
            state,
            &mut occ_location,
            &mut event_list,
            conditions.beta,
            &self.options,
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
