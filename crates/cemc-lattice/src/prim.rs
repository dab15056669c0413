//! The primitive crystal description consumed by every calculator.

use serde::{Deserialize, Serialize};

use cemc_core::{CemcError, ErrorInfo};

/// One basis site of the prim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasisSite {
    /// Fractional coordinate within the unit cell.
    pub coordinate: [f64; 3],
    /// Names of the discrete occupants allowed on this site, in order.
    ///
    /// The occupation vector stores indices into this list.
    pub occupants: Vec<String>,
    /// Asymmetric unit this site belongs to.
    ///
    /// Symmetry analysis is performed upstream; the engine only requires
    /// that sites sharing an asymmetric unit carry identical occupant
    /// lists, so occupant indices are interchangeable within a unit.
    pub asymmetric_unit: usize,
}

/// The primitive (asymmetric) unit of the crystal structure.
///
/// Immutable after load and shared by every state of a run series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prim {
    /// Row-vector lattice matrix in Angstrom.
    pub lattice: [[f64; 3]; 3],
    /// Ordered basis sites.
    pub basis: Vec<BasisSite>,
}

impl Prim {
    /// Number of basis sites (sublattices).
    pub fn n_sublattices(&self) -> usize {
        self.basis.len()
    }

    /// Number of asymmetric units.
    pub fn n_asymmetric_units(&self) -> usize {
        self.basis
            .iter()
            .map(|site| site.asymmetric_unit + 1)
            .max()
            .unwrap_or(0)
    }

    /// Checks the structural invariants required by the engine.
    pub fn validate(&self) -> Result<(), CemcError> {
        if self.basis.is_empty() {
            return Err(CemcError::Config(ErrorInfo::new(
                "empty-basis",
                "prim must contain at least one basis site",
            )));
        }
        for (b, site) in self.basis.iter().enumerate() {
            if site.occupants.is_empty() {
                return Err(CemcError::Config(
                    ErrorInfo::new("empty-occupant-list", "basis site allows no occupants")
                        .with_context("sublattice", b.to_string()),
                ));
            }
        }
        let n_asym = self.n_asymmetric_units();
        let mut unit_occupants: Vec<Option<&Vec<String>>> = vec![None; n_asym];
        for (b, site) in self.basis.iter().enumerate() {
            match unit_occupants[site.asymmetric_unit] {
                None => unit_occupants[site.asymmetric_unit] = Some(&site.occupants),
                Some(expected) if expected != &site.occupants => {
                    return Err(CemcError::Config(
                        ErrorInfo::new(
                            "asymmetric-unit-mismatch",
                            "sites in one asymmetric unit must allow the same occupants",
                        )
                        .with_context("sublattice", b.to_string())
                        .with_context("asymmetric_unit", site.asymmetric_unit.to_string()),
                    ));
                }
                Some(_) => {}
            }
        }
        if unit_occupants.iter().any(Option::is_none) {
            return Err(CemcError::Config(ErrorInfo::new(
                "asymmetric-unit-gap",
                "asymmetric unit indices must be contiguous from zero",
            )));
        }
        Ok(())
    }
}
