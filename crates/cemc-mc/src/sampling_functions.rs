//! Standard sampling function tables.
//!
//! Each calculator builds its table once per run; fixtures reference the
//! functions by quantity name. All functions are pure functions of the
//! sample context.

use std::sync::Arc;

use cemc_core::{CemcError, ErrorInfo};
use cemc_system::{SupercellSystem, System};

use crate::potential::Potential;
use crate::sampling::{SampleContext, SamplingFunctionMap, StateSamplingFunction};

fn insert(map: &mut SamplingFunctionMap, function: StateSamplingFunction) {
    map.insert(function.name.clone(), function);
}

/// Builds the sampling functions shared by every calculator:
/// `temperature`, `mol_composition`, `param_composition`,
/// `formation_energy` and `potential_energy` (both per unit cell).
pub fn standard_sampling_functions(
    system: &System,
    supercell: &SupercellSystem,
    potential: Arc<dyn Potential>,
) -> Result<SamplingFunctionMap, CemcError> {
    let mut map = SamplingFunctionMap::new();
    let volume = supercell.convert.volume() as f64;

    insert(
        &mut map,
        StateSamplingFunction {
            name: "temperature".to_string(),
            description: "Temperature (K)".to_string(),
            component_names: vec!["0".to_string()],
            function: Box::new(|ctx: &SampleContext<'_>| {
                Ok(vec![ctx.state.conditions.require_scalar("temperature")?])
            }),
        },
    );

    let convert = supercell.convert.clone();
    let calculator = system.composition_calculator.clone();
    insert(
        &mut map,
        StateSamplingFunction {
            name: "mol_composition".to_string(),
            description: "Species per unit cell".to_string(),
            component_names: system.components().to_vec(),
            function: Box::new(move |ctx: &SampleContext<'_>| {
                Ok(calculator.mean_num_each_component(&ctx.state.occupation, &convert))
            }),
        },
    );

    let convert = supercell.convert.clone();
    let calculator = system.composition_calculator.clone();
    let converter = system.composition_converter.clone();
    insert(
        &mut map,
        StateSamplingFunction {
            name: "param_composition".to_string(),
            description: "Parametric composition".to_string(),
            component_names: system.composition_converter.axis_names(),
            function: Box::new(move |ctx: &SampleContext<'_>| {
                let mol = calculator.mean_num_each_component(&ctx.state.occupation, &convert);
                Ok(converter.param_from_mol(&mol))
            }),
        },
    );

    let formation_energy_clex = supercell.clex("formation_energy")?.clone();
    insert(
        &mut map,
        StateSamplingFunction {
            name: "formation_energy".to_string(),
            description: "Formation energy per unit cell (eV)".to_string(),
            component_names: vec!["0".to_string()],
            function: Box::new(move |ctx: &SampleContext<'_>| {
                Ok(vec![
                    formation_energy_clex.extensive_value(&ctx.state.occupation) / volume,
                ])
            }),
        },
    );

    insert(
        &mut map,
        StateSamplingFunction {
            name: "potential_energy".to_string(),
            description: "Potential energy per unit cell (eV)".to_string(),
            component_names: vec!["0".to_string()],
            function: Box::new(move |ctx: &SampleContext<'_>| {
                Ok(vec![potential.extensive_value(&ctx.state.occupation) / volume])
            }),
        },
    );

    Ok(map)
}

/// Adds the kinetic-only quantities: `simulated_time` and
/// `mean_squared_displacement` (per species, Cartesian, squared length
/// units of the prim lattice).
pub fn add_kinetic_sampling_functions(
    map: &mut SamplingFunctionMap,
    system: &System,
) -> Result<(), CemcError> {
    insert(
        map,
        StateSamplingFunction {
            name: "simulated_time".to_string(),
            description: "Simulated time (s)".to_string(),
            component_names: vec!["0".to_string()],
            function: Box::new(|ctx: &SampleContext<'_>| {
                ctx.clock.time.map(|time| vec![time]).ok_or_else(|| {
                    CemcError::Consistency(ErrorInfo::new(
                        "no-simulated-time",
                        "simulated_time requires a kinetic kernel",
                    ))
                })
            }),
        },
    );

    let lattice = system.prim.lattice;
    let components = system.components().to_vec();
    let n_components = components.len();
    insert(
        map,
        StateSamplingFunction {
            name: "mean_squared_displacement".to_string(),
            description: "Mean squared displacement per species (len^2)".to_string(),
            component_names: components,
            function: Box::new(move |ctx: &SampleContext<'_>| {
                let occ_location = ctx.occ_location.ok_or_else(|| {
                    CemcError::Consistency(ErrorInfo::new(
                        "no-occupant-tracker",
                        "mean_squared_displacement requires the occupant tracker",
                    ))
                })?;
                if !occ_location.tracks_atoms() {
                    return Err(CemcError::Consistency(ErrorInfo::new(
                        "no-atom-tracking",
                        "mean_squared_displacement requires atom tracking",
                    )));
                }
                let mut sums = vec![0.0; n_components];
                let mut counts = vec![0usize; n_components];
                for (species, frac) in occ_location.atom_displacements() {
                    let mut squared = 0.0;
                    for j in 0..3 {
                        let cart: f64 = (0..3).map(|i| frac[i] * lattice[i][j]).sum();
                        squared += cart * cart;
                    }
                    sums[species] += squared;
                    counts[species] += 1;
                }
                Ok(sums
                    .iter()
                    .zip(&counts)
                    .map(|(&sum, &count)| if count == 0 { 0.0 } else { sum / count as f64 })
                    .collect())
            }),
        },
    );
    Ok(())
}
