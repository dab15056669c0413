//! KMC event definitions.
//!
//! A prim event describes one symmetry-equivalence class of hops: an
//! ordered list of prim sites, before/after occupation on those sites and
//! per-atom trajectories. Prim events are instantiated per unit cell of a
//! supercell to form the complete event list.

use serde::{Deserialize, Serialize};

use cemc_core::{CemcError, ErrorInfo};
use cemc_lattice::{Prim, UnitCell};

/// One site of a prim event, in prim coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimEventSite {
    /// Sublattice of the site.
    pub sublattice: usize,
    /// Unit cell offset from the event's home cell.
    pub offset: UnitCell,
}

/// Motion of one atom within an event: indices into the event's site list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomTrajectory {
    /// Site the atom leaves.
    pub from: usize,
    /// Site the atom arrives at.
    pub to: usize,
}

/// One orientation (equivalent instance) of an event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimEvent {
    /// Orientation index within the event type, matching the local basis
    /// set's equivalent index.
    pub equivalent_index: usize,
    /// Sites touched by the event.
    pub sites: Vec<PrimEventSite>,
    /// Occupant indices required before the event may fire.
    pub occ_init: Vec<u8>,
    /// Occupant indices after the event fires.
    pub occ_final: Vec<u8>,
    /// Per-atom trajectories.
    pub trajectories: Vec<AtomTrajectory>,
}

impl PrimEvent {
    /// Unit cell translation of trajectory `t`.
    pub fn trajectory_translation(&self, t: usize) -> UnitCell {
        let traj = &self.trajectories[t];
        let from = self.sites[traj.from].offset;
        let to = self.sites[traj.to].offset;
        [to[0] - from[0], to[1] - from[1], to[2] - from[2]]
    }

    /// Checks shapes and index ranges against the prim.
    pub fn validate(&self, prim: &Prim, path: &str) -> Result<(), CemcError> {
        let config = |code: &str, message: &str| {
            CemcError::Config(ErrorInfo::new(code, message).with_context("path", path))
        };
        if self.sites.is_empty() {
            return Err(config("empty-event", "event touches no sites"));
        }
        if self.occ_init.len() != self.sites.len() || self.occ_final.len() != self.sites.len() {
            return Err(config(
                "event-shape",
                "occ_init and occ_final must match the event site count",
            ));
        }
        for (i, site) in self.sites.iter().enumerate() {
            let Some(basis_site) = prim.basis.get(site.sublattice) else {
                return Err(config("event-sublattice", "event site sublattice out of range"));
            };
            let n_occ = basis_site.occupants.len() as u8;
            if self.occ_init[i] >= n_occ || self.occ_final[i] >= n_occ {
                return Err(config(
                    "event-occupant",
                    "event occupant index exceeds the site's allowed occupants",
                ));
            }
        }
        let mut from_seen = vec![false; self.sites.len()];
        let mut to_seen = vec![false; self.sites.len()];
        for traj in &self.trajectories {
            if traj.from >= self.sites.len() || traj.to >= self.sites.len() {
                return Err(config("trajectory-range", "trajectory site index out of range"));
            }
            if std::mem::replace(&mut from_seen[traj.from], true)
                || std::mem::replace(&mut to_seen[traj.to], true)
            {
                return Err(config(
                    "trajectory-collision",
                    "trajectories must leave and enter each site at most once",
                ));
            }
            if self.occ_final[traj.to] != self.occ_init[traj.from] {
                return Err(config(
                    "trajectory-occupant",
                    "trajectory must carry the departing occupant to its destination",
                ));
            }
        }
        if !self.trajectories.is_empty()
            && (from_seen.iter().any(|&seen| !seen) || to_seen.iter().any(|&seen| !seen))
        {
            return Err(config(
                "trajectory-coverage",
                "trajectories must permute the occupants of every event site",
            ));
        }
        Ok(())
    }
}

/// Named KMC event type: equivalent orientations sharing an attempt
/// frequency and a KRA local cluster expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTypeData {
    /// Attempt frequency prefactor (1/s).
    pub freq: f64,
    /// Name of the local cluster expansion providing the KRA barrier.
    pub kra_clex: String,
    /// Equivalent orientations of the event.
    pub events: Vec<PrimEvent>,
}
