//! Thermodynamic potentials evaluated against the current occupation.
//!
//! All variants share the `{extensive_value, occ_delta_extensive_value}`
//! contract; construction fails when the system lacks a required expansion
//! or the state lacks required conditions, and evaluation never fails once
//! constructed. The KMC event-rate calculator lives with the event list in
//! the `kmc` module.

use cemc_clex::ClusterExpansion;
use cemc_core::{CemcError, ErrorInfo};
use cemc_lattice::{CompositionCalculator, CompositionConverter, Conversions};
use cemc_system::SupercellSystem;

use crate::state::Conditions;

/// Common evaluation surface of canonical and semi-grand potentials.
pub trait Potential {
    /// Extensive potential value of the occupation.
    fn extensive_value(&self, occupation: &[u8]) -> f64;

    /// Change in extensive value after writing `new_occ[i]` at `sites[i]`,
    /// without mutating the occupation.
    fn occ_delta_extensive_value(&self, occupation: &[u8], sites: &[usize], new_occ: &[u8])
        -> f64;
}

/// Canonical potential: the formation-energy expansion directly.
pub struct CanonicalPotential {
    formation_energy_clex: ClusterExpansion,
}

impl CanonicalPotential {
    /// Requires the `formation_energy` cluster expansion.
    pub fn new(supercell: &SupercellSystem) -> Result<Self, CemcError> {
        Ok(Self {
            formation_energy_clex: supercell.clex("formation_energy")?.clone(),
        })
    }
}

impl Potential for CanonicalPotential {
    fn extensive_value(&self, occupation: &[u8]) -> f64 {
        self.formation_energy_clex.extensive_value(occupation)
    }

    fn occ_delta_extensive_value(
        &self,
        occupation: &[u8],
        sites: &[usize],
        new_occ: &[u8],
    ) -> f64 {
        self.formation_energy_clex
            .occ_delta_value(occupation, sites, new_occ)
    }
}

/// Semi-grand canonical potential: `E_form - V * mu . x(occupation)`.
///
/// The delta form uses the precomputed exchange-potential table, so the
/// per-site cost is one table lookup plus the expansion delta.
pub struct SemiGrandPotential {
    formation_energy_clex: ClusterExpansion,
    convert: Conversions,
    composition_calculator: CompositionCalculator,
    composition_converter: CompositionConverter,
    param_chem_pot: Vec<f64>,
    exchange_chem_pot: Vec<Vec<f64>>,
    volume: f64,
}

impl SemiGrandPotential {
    /// Requires the `formation_energy` expansion and `param_chem_pot`
    /// conditions.
    pub fn new(
        supercell: &SupercellSystem,
        system: &cemc_system::System,
        conditions: &Conditions,
    ) -> Result<Self, CemcError> {
        let formation_energy_clex = supercell.clex("formation_energy")?.clone();
        let param_chem_pot = conditions.param_chem_pot.clone().ok_or_else(|| {
            CemcError::Consistency(
                ErrorInfo::new("missing-condition", "semi-grand potential needs param_chem_pot")
                    .with_context("key", "param_chem_pot"),
            )
        })?;
        let exchange_chem_pot = conditions.exchange_chem_pot.clone().ok_or_else(|| {
            CemcError::Consistency(ErrorInfo::new(
                "missing-condition",
                "exchange potential table was not derived",
            ))
        })?;
        Ok(Self {
            formation_energy_clex,
            convert: supercell.convert.clone(),
            composition_calculator: system.composition_calculator.clone(),
            composition_converter: system.composition_converter.clone(),
            param_chem_pot,
            exchange_chem_pot,
            volume: supercell.convert.volume() as f64,
        })
    }
}

impl Potential for SemiGrandPotential {
    fn extensive_value(&self, occupation: &[u8]) -> f64 {
        let mol = self
            .composition_calculator
            .mean_num_each_component(occupation, &self.convert);
        let param = self.composition_converter.param_from_mol(&mol);
        let formation_energy = self.formation_energy_clex.extensive_value(occupation);
        let mu_dot_x: f64 = self
            .param_chem_pot
            .iter()
            .zip(&param)
            .map(|(mu, x)| mu * x)
            .sum();
        formation_energy - self.volume * mu_dot_x
    }

    fn occ_delta_extensive_value(
        &self,
        occupation: &[u8],
        sites: &[usize],
        new_occ: &[u8],
    ) -> f64 {
        let mut delta = self
            .formation_energy_clex
            .occ_delta_value(occupation, sites, new_occ);
        for (&l, &new) in sites.iter().zip(new_occ) {
            let sublattice = self.convert.l_to_sublattice(l);
            let curr_species = self.convert.species_index(sublattice, occupation[l]);
            let new_species = self.convert.species_index(sublattice, new);
            delta -= self.exchange_chem_pot[new_species][curr_species];
        }
        delta
    }
}
