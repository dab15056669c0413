//! Prim and supercell neighbor lists.
//!
//! A basis set is compiled against a fixed-order window of neighboring
//! sites per unit cell. The prim neighbor list fixes that canonical order;
//! the supercell neighbor list expands it to linear site indices for every
//! unit cell of one supercell.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use cemc_core::{CemcError, ErrorInfo};

use crate::supercell::{Conversions, UnitCell};

/// One entry of the prim neighbor window: a site at `offset` unit cells
/// from the home cell, on `sublattice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NeighborEntry {
    /// Unit cell offset from the home cell.
    pub offset: UnitCell,
    /// Sublattice of the neighboring site.
    pub sublattice: usize,
}

/// Canonical per-unit-cell neighbor window.
///
/// The window order is part of the basis-set contract: evaluators are built
/// against positions in this list and the supercell expansion must preserve
/// it. Entries are sorted by distance (squared offset norm), then offset,
/// then sublattice, and the window always contains the home-cell site of
/// every sublattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimNeighborList {
    entries: Vec<NeighborEntry>,
    /// Window position of the home-cell site, per sublattice.
    home_position: Vec<usize>,
}

impl PrimNeighborList {
    /// Builds the canonical window covering `required` entries plus the
    /// home-cell site of each of `n_sublattices` sublattices.
    pub fn build(
        n_sublattices: usize,
        required: impl IntoIterator<Item = NeighborEntry>,
    ) -> Self {
        let mut set: BTreeSet<(i64, UnitCell, usize)> = BTreeSet::new();
        let key = |entry: &NeighborEntry| {
            let [i, j, k] = entry.offset;
            (i * i + j * j + k * k, entry.offset, entry.sublattice)
        };
        for b in 0..n_sublattices {
            set.insert(key(&NeighborEntry {
                offset: [0, 0, 0],
                sublattice: b,
            }));
        }
        for entry in required {
            set.insert(key(&entry));
        }
        let entries: Vec<NeighborEntry> = set
            .into_iter()
            .map(|(_, offset, sublattice)| NeighborEntry { offset, sublattice })
            .collect();
        let mut home_position = vec![usize::MAX; n_sublattices];
        for (pos, entry) in entries.iter().enumerate() {
            if entry.offset == [0, 0, 0] {
                home_position[entry.sublattice] = pos;
            }
        }
        Self {
            entries,
            home_position,
        }
    }

    /// Window entries in canonical order.
    pub fn entries(&self) -> &[NeighborEntry] {
        &self.entries
    }

    /// Window size `M`.
    pub fn window_size(&self) -> usize {
        self.entries.len()
    }

    /// Window position of `entry`, if present.
    pub fn position(&self, entry: &NeighborEntry) -> Option<usize> {
        self.entries.iter().position(|e| e == entry)
    }

    /// Window position of the home-cell site of `sublattice`.
    pub fn home_position(&self, sublattice: usize) -> usize {
        self.home_position[sublattice]
    }
}

/// Supercell expansion of a [`PrimNeighborList`].
///
/// For each unit cell `u`, `sites(u)` lists the linear site indices of the
/// window entries in canonical order.
#[derive(Debug, Clone)]
pub struct SuperNeighborList {
    window_size: usize,
    volume: usize,
    /// `volume * window_size` site indices, row per unit cell.
    sites: Vec<usize>,
    /// Window position of a site within its own home-cell window, per
    /// sublattice.
    home_position: Vec<usize>,
}

impl SuperNeighborList {
    /// Expands `prim_list` over the supercell described by `convert`.
    pub fn new(prim_list: &PrimNeighborList, convert: &Conversions) -> Result<Self, CemcError> {
        for entry in prim_list.entries() {
            if entry.sublattice >= convert.n_sublattices() {
                return Err(CemcError::Consistency(
                    ErrorInfo::new(
                        "neighborhood-out-of-range",
                        "neighbor list references a sublattice outside the prim",
                    )
                    .with_context("sublattice", entry.sublattice.to_string()),
                ));
            }
        }
        let volume = convert.volume();
        let window_size = prim_list.window_size();
        let mut sites = Vec::with_capacity(volume * window_size);
        for u in 0..volume {
            let origin = convert.unitcell(u);
            for entry in prim_list.entries() {
                let cell = [
                    origin[0] + entry.offset[0],
                    origin[1] + entry.offset[1],
                    origin[2] + entry.offset[2],
                ];
                sites.push(convert.bijk_to_l(entry.sublattice, &cell));
            }
        }
        let home_position = (0..convert.n_sublattices())
            .map(|b| prim_list.home_position(b))
            .collect();
        Ok(Self {
            window_size,
            volume,
            sites,
            home_position,
        })
    }

    /// Window size `M`.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of unit cells covered by this list.
    pub fn volume(&self) -> usize {
        self.volume
    }

    /// Neighbor window of unit cell `u`, in canonical order.
    pub fn sites(&self, unitcell_index: usize) -> &[usize] {
        let start = unitcell_index * self.window_size;
        &self.sites[start..start + self.window_size]
    }

    /// Position of site `l` within the window of its home unit cell.
    pub fn neighbor_index(&self, l: usize) -> usize {
        self.home_position[l / self.volume]
    }

    /// Home unit cell of site `l`.
    pub fn home_unitcell(&self, l: usize) -> usize {
        l % self.volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prim::{BasisSite, Prim};

    fn simple_prim() -> Prim {
        Prim {
            lattice: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            basis: vec![BasisSite {
                coordinate: [0.0, 0.0, 0.0],
                occupants: vec!["A".into(), "B".into()],
                asymmetric_unit: 0,
            }],
        }
    }

    #[test]
    fn window_contains_home_cell_first() {
        let list = PrimNeighborList::build(
            1,
            vec![NeighborEntry {
                offset: [1, 0, 0],
                sublattice: 0,
            }],
        );
        assert_eq!(list.home_position(0), 0);
        assert_eq!(list.window_size(), 2);
    }

    #[test]
    fn supercell_windows_are_consistent() {
        let prim = simple_prim();
        let convert =
            Conversions::new(&prim, &["A".into(), "B".into()], [[2, 0, 0], [0, 2, 0], [0, 0, 2]])
                .unwrap();
        let list = PrimNeighborList::build(
            1,
            vec![
                NeighborEntry {
                    offset: [1, 0, 0],
                    sublattice: 0,
                },
                NeighborEntry {
                    offset: [-1, 0, 0],
                    sublattice: 0,
                },
            ],
        );
        let supercell = SuperNeighborList::new(&list, &convert).unwrap();
        for u in 0..convert.volume() {
            let window = supercell.sites(u);
            assert_eq!(window.len(), list.window_size());
            // home-cell entry resolves to a site of unit cell u
            let home = window[list.home_position(0)];
            assert_eq!(convert.l_to_unitcell_index(home), u);
            assert_eq!(supercell.neighbor_index(home), list.home_position(0));
        }
    }
}
