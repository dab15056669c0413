//! Composition enforcement.
//!
//! Before a canonical or kinetic run, the initial occupation is walked to
//! the requested `mol_composition` through single-site (grand-canonical)
//! changes, ending within half an atom of the target on every species.

use cemc_core::{CemcError, ErrorInfo, RngHandle};
use cemc_lattice::CompositionCalculator;

use crate::occ_location::{OccEvent, OccLocation, OccSwap};

/// Mutates `occupation` until its composition is as close as possible to
/// `target_mol` (species per unit cell).
///
/// Each step applies the single-site change that moves one atom from the
/// most over-represented species to an under-represented one, at a random
/// eligible site. The walk strictly reduces the squared composition error,
/// so it terminates.
pub fn enforce_composition(
    occupation: &mut [u8],
    target_mol: &[f64],
    calculator: &CompositionCalculator,
    occ_location: &mut OccLocation,
    grand_canonical_swaps: &[OccSwap],
    rng: &mut RngHandle,
) -> Result<(), CemcError> {
    let convert = occ_location.convert().clone();
    let volume = convert.volume() as f64;
    if target_mol.len() != calculator.num_each_component(occupation, &convert).len() {
        return Err(CemcError::Consistency(
            ErrorInfo::new("composition-shape", "target composition has wrong length")
                .with_context("found", target_mol.len().to_string()),
        ));
    }

    loop {
        let counts = calculator.num_each_component(occupation, &convert);
        let diff: Vec<f64> = counts
            .iter()
            .zip(target_mol)
            .map(|(&count, target)| count as f64 - target * volume)
            .collect();

        // best available over -> under exchange
        let candidates = occ_location.candidate_list().candidates().to_vec();
        let mut best: Option<(usize, f64)> = None;
        for (swap_index, swap) in grand_canonical_swaps.iter().enumerate() {
            let from = candidates[swap.candidate_a].species;
            let to = candidates[swap.candidate_b].species;
            if diff[from] <= 0.5 || diff[to] >= -0.5 {
                continue;
            }
            if occ_location.cand_size(swap.candidate_a) == 0 {
                continue;
            }
            let gain = diff[from] - diff[to];
            if best.map_or(true, |(_, best_gain)| gain > best_gain) {
                best = Some((swap_index, gain));
            }
        }
        let Some((swap_index, _)) = best else {
            return Ok(());
        };

        let swap = grand_canonical_swaps[swap_index];
        let site = occ_location.choose_site(swap.candidate_a, rng);
        let to_species = candidates[swap.candidate_b].species;
        let new_occ = convert
            .occ_index(convert.l_to_sublattice(site), to_species)
            .ok_or_else(|| {
                CemcError::Consistency(
                    ErrorInfo::new("unknown-candidate", "species not allowed on site")
                        .with_context("site", site.to_string()),
                )
            })?;
        let event = OccEvent {
            linear_site_index: vec![site],
            new_occ: vec![new_occ],
            atom_traj: Vec::new(),
        };
        occ_location.apply(&event, occupation)?;
    }
}
