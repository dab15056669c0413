//! Basis-function evaluators ("clexulators").
//!
//! The engine treats a compiled basis set as an opaque callable over a
//! neighbor-site window. [`OrbitClexulator`] is the data-driven
//! implementation used here: it is constructed from cluster orbit input
//! (site offsets, sublattices and site-function indices) resolved once
//! against the canonical prim neighbor list.

use serde::{Deserialize, Serialize};

use cemc_core::{CemcError, ErrorInfo};
use cemc_lattice::{NeighborEntry, PrimNeighborList, UnitCell};

use crate::view::OccView;

/// Opaque basis-function evaluator over a neighbor window.
///
/// Window slices are the canonical-order site lists produced by a
/// `SuperNeighborList` built from the same prim neighbor list the
/// evaluator was constructed against.
pub trait Clexulator: Send + Sync {
    /// Number of basis functions `K`.
    fn n_functions(&self) -> usize;

    /// Required window size `M`.
    fn window_size(&self) -> usize;

    /// Accumulates the per-unit-cell correlation contribution into `out`
    /// (length `K`), each cluster instance counted once at its home cell.
    fn corr_contribution(&self, out: &mut [f64], window: &[usize], occ: &OccView<'_>);

    /// Accumulates point correlations into `out` (length `K`): the sum of
    /// every basis-function instance containing the site at window
    /// position `neighbor_index` of `window`.
    fn point_corr(
        &self,
        out: &mut [f64],
        neighbor_index: usize,
        window: &[usize],
        occ: &OccView<'_>,
    );
}

/// Site basis functions for one sublattice: `values[f][occ]` is function
/// `f` evaluated at occupant index `occ`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteBasis {
    /// Function-by-occupant value table.
    pub values: Vec<Vec<f64>>,
}

impl SiteBasis {
    /// Occupation-indicator basis for `n_occupants` occupants.
    pub fn indicator(n_occupants: usize) -> Self {
        let values = (0..n_occupants)
            .map(|f| {
                (0..n_occupants)
                    .map(|s| if f == s { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect();
        Self { values }
    }

    #[inline]
    pub(crate) fn eval(&self, function: usize, occ: u8) -> f64 {
        self.values[function][occ as usize]
    }
}

/// One site of a cluster prototype, in prim coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtoClusterSite {
    /// Unit cell offset from the cluster's home cell.
    pub offset: UnitCell,
    /// Sublattice of the site.
    pub sublattice: usize,
    /// Site-function index applied at the site.
    pub site_function: usize,
}

/// A cluster orbit: the symmetry-equivalent cluster instances associated
/// with one home unit cell, each a product of site functions.
///
/// Orbit enumeration is performed upstream; the engine consumes the
/// per-unit-cell instance list directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtoOrbit {
    /// Cluster instances, each an ordered list of sites.
    pub clusters: Vec<Vec<ProtoClusterSite>>,
}

impl ProtoOrbit {
    /// Orbit containing the empty cluster (constant function).
    pub fn constant() -> Self {
        Self {
            clusters: vec![Vec::new()],
        }
    }
}

/// One site of a resolved cluster stencil.
#[derive(Debug, Clone, Copy)]
struct StencilSite {
    window_position: usize,
    sublattice: usize,
    site_function: usize,
}

/// A resolved cluster instance contributing to basis function `function`.
#[derive(Debug, Clone)]
struct Stencil {
    function: usize,
    sites: Vec<StencilSite>,
}

/// Data-driven clexulator built from cluster orbits.
#[derive(Debug)]
pub struct OrbitClexulator {
    n_functions: usize,
    window_size: usize,
    site_basis: Vec<SiteBasis>,
    /// Per-unit-cell contribution stencils (one entry per instance).
    cell_stencils: Vec<Stencil>,
    /// Point stencils grouped by window position of the center site.
    point_stencils: Vec<Vec<Stencil>>,
}

impl OrbitClexulator {
    /// Resolves `orbits` against `neighbor_list`.
    ///
    /// Fails with a `Consistency` error when a cluster site falls outside
    /// the neighbor window or references an unknown site function.
    pub fn new(
        neighbor_list: &PrimNeighborList,
        site_basis: Vec<SiteBasis>,
        orbits: &[ProtoOrbit],
    ) -> Result<Self, CemcError> {
        let window_size = neighbor_list.window_size();
        let resolve = |site: &ProtoClusterSite, orbit: usize| -> Result<StencilSite, CemcError> {
            let entry = NeighborEntry {
                offset: site.offset,
                sublattice: site.sublattice,
            };
            let window_position = neighbor_list.position(&entry).ok_or_else(|| {
                CemcError::Consistency(
                    ErrorInfo::new(
                        "neighborhood-out-of-range",
                        "cluster site outside the basis-set neighbor window",
                    )
                    .with_context("orbit", orbit.to_string())
                    .with_context(
                        "offset",
                        format!("{},{},{}", site.offset[0], site.offset[1], site.offset[2]),
                    )
                    .with_context("sublattice", site.sublattice.to_string()),
                )
            })?;
            if site.sublattice >= site_basis.len()
                || site.site_function >= site_basis[site.sublattice].values.len()
            {
                return Err(CemcError::Consistency(
                    ErrorInfo::new("unknown-site-function", "site function index out of range")
                        .with_context("orbit", orbit.to_string())
                        .with_context("site_function", site.site_function.to_string()),
                ));
            }
            Ok(StencilSite {
                window_position,
                sublattice: site.sublattice,
                site_function: site.site_function,
            })
        };

        let mut cell_stencils = Vec::new();
        let mut point_stencils = vec![Vec::new(); window_size];
        for (j, orbit) in orbits.iter().enumerate() {
            for cluster in &orbit.clusters {
                let sites: Vec<StencilSite> = cluster
                    .iter()
                    .map(|site| resolve(site, j))
                    .collect::<Result<_, _>>()?;
                cell_stencils.push(Stencil { function: j, sites });

                // Point stencils: translate the instance so each of its
                // sites in turn sits in the home cell.
                for center in cluster {
                    let translated: Vec<ProtoClusterSite> = cluster
                        .iter()
                        .map(|site| ProtoClusterSite {
                            offset: [
                                site.offset[0] - center.offset[0],
                                site.offset[1] - center.offset[1],
                                site.offset[2] - center.offset[2],
                            ],
                            sublattice: site.sublattice,
                            site_function: site.site_function,
                        })
                        .collect();
                    let sites: Vec<StencilSite> = translated
                        .iter()
                        .map(|site| resolve(site, j))
                        .collect::<Result<_, _>>()?;
                    let center_position = neighbor_list.home_position(center.sublattice);
                    point_stencils[center_position].push(Stencil { function: j, sites });
                }
            }
        }

        Ok(Self {
            n_functions: orbits.len(),
            window_size,
            site_basis,
            cell_stencils,
            point_stencils,
        })
    }

    #[inline]
    fn product(&self, stencil: &Stencil, window: &[usize], occ: &OccView<'_>) -> f64 {
        let mut product = 1.0;
        for site in &stencil.sites {
            let l = window[site.window_position];
            product *= self.site_basis[site.sublattice].eval(site.site_function, occ.get(l));
        }
        product
    }
}

impl Clexulator for OrbitClexulator {
    fn n_functions(&self) -> usize {
        self.n_functions
    }

    fn window_size(&self) -> usize {
        self.window_size
    }

    fn corr_contribution(&self, out: &mut [f64], window: &[usize], occ: &OccView<'_>) {
        for stencil in &self.cell_stencils {
            out[stencil.function] += self.product(stencil, window, occ);
        }
    }

    fn point_corr(
        &self,
        out: &mut [f64],
        neighbor_index: usize,
        window: &[usize],
        occ: &OccView<'_>,
    ) {
        for stencil in &self.point_stencils[neighbor_index] {
            out[stencil.function] += self.product(stencil, window, occ);
        }
    }
}

/// Collects the neighbor entries required by `orbits`, including every
/// point-stencil translation, for building the prim neighbor list.
pub fn required_neighborhood(orbits: &[ProtoOrbit]) -> Vec<NeighborEntry> {
    let mut entries = Vec::new();
    for orbit in orbits {
        for cluster in &orbit.clusters {
            for center in cluster {
                for site in cluster {
                    entries.push(NeighborEntry {
                        offset: [
                            site.offset[0] - center.offset[0],
                            site.offset[1] - center.offset[1],
                            site.offset[2] - center.offset[2],
                        ],
                        sublattice: site.sublattice,
                    });
                }
            }
            for site in cluster {
                entries.push(NeighborEntry {
                    offset: site.offset,
                    sublattice: site.sublattice,
                });
            }
        }
    }
    entries
}
