//! Local cluster expansions.
//!
//! A local basis set is attached to a KMC event type: for each symmetry
//! orientation (equivalent index) it carries cluster functions centered on
//! the event's home unit cell, used to evaluate the kinetically resolved
//! activation energy of one event instance.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use cemc_core::{CemcError, ErrorInfo};
use cemc_lattice::{NeighborEntry, PrimNeighborList, SuperNeighborList};

use crate::basis::{ProtoClusterSite, SiteBasis};
use crate::expansion::SparseCoefficients;
use crate::view::OccView;

/// Local cluster orbits for one equivalent orientation of an event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalProtoOrbit {
    /// Cluster instances, each a product of site functions, with offsets
    /// relative to the event's home unit cell.
    pub clusters: Vec<Vec<ProtoClusterSite>>,
}

#[derive(Debug, Clone)]
struct LocalStencilSite {
    window_position: usize,
    sublattice: usize,
    site_function: usize,
}

#[derive(Debug, Clone)]
struct LocalStencil {
    function: usize,
    sites: Vec<LocalStencilSite>,
}

/// Resolved local basis functions for one equivalent orientation.
#[derive(Debug)]
pub struct LocalOrbitEvaluator {
    n_functions: usize,
    stencils: Vec<LocalStencil>,
    dependencies: Vec<NeighborEntry>,
}

impl LocalOrbitEvaluator {
    /// Resolves `orbits` against the (shared) prim neighbor list.
    pub fn new(
        neighbor_list: &PrimNeighborList,
        site_basis: &[SiteBasis],
        orbits: &[LocalProtoOrbit],
    ) -> Result<Self, CemcError> {
        let mut stencils = Vec::new();
        let mut dependencies = Vec::new();
        for (j, orbit) in orbits.iter().enumerate() {
            for cluster in &orbit.clusters {
                let mut sites = Vec::with_capacity(cluster.len());
                for site in cluster {
                    let entry = NeighborEntry {
                        offset: site.offset,
                        sublattice: site.sublattice,
                    };
                    let window_position = neighbor_list.position(&entry).ok_or_else(|| {
                        CemcError::Consistency(
                            ErrorInfo::new(
                                "neighborhood-out-of-range",
                                "local cluster site outside the neighbor window",
                            )
                            .with_context("orbit", j.to_string()),
                        )
                    })?;
                    if site.sublattice >= site_basis.len()
                        || site.site_function >= site_basis[site.sublattice].values.len()
                    {
                        return Err(CemcError::Consistency(
                            ErrorInfo::new(
                                "unknown-site-function",
                                "site function index out of range",
                            )
                            .with_context("orbit", j.to_string()),
                        ));
                    }
                    dependencies.push(entry);
                    sites.push(LocalStencilSite {
                        window_position,
                        sublattice: site.sublattice,
                        site_function: site.site_function,
                    });
                }
                stencils.push(LocalStencil { function: j, sites });
            }
        }
        dependencies.sort();
        dependencies.dedup();
        Ok(Self {
            n_functions: orbits.len(),
            stencils,
            dependencies,
        })
    }

    /// Number of local basis functions.
    pub fn n_functions(&self) -> usize {
        self.n_functions
    }

    /// Sites this evaluator reads, relative to the event's home unit cell.
    pub fn dependencies(&self) -> &[NeighborEntry] {
        &self.dependencies
    }
}

/// A local cluster expansion bound to one supercell.
#[derive(Clone)]
pub struct LocalClusterExpansion {
    evaluators: Arc<Vec<LocalOrbitEvaluator>>,
    site_basis: Arc<Vec<SiteBasis>>,
    neighbor_list: Arc<SuperNeighborList>,
    coefficients: SparseCoefficients,
}

impl LocalClusterExpansion {
    /// Binds per-equivalent evaluators and coefficients to one supercell.
    pub fn new(
        evaluators: Arc<Vec<LocalOrbitEvaluator>>,
        site_basis: Arc<Vec<SiteBasis>>,
        neighbor_list: Arc<SuperNeighborList>,
        coefficients: SparseCoefficients,
    ) -> Result<Self, CemcError> {
        for evaluator in evaluators.iter() {
            if let Some(max) = coefficients.max_index() {
                if max >= evaluator.n_functions() {
                    return Err(CemcError::Consistency(
                        ErrorInfo::new(
                            "coefficient-index",
                            "coefficient references unknown local basis function",
                        )
                        .with_context("index", max.to_string()),
                    ));
                }
            }
        }
        Ok(Self {
            evaluators,
            site_basis,
            neighbor_list,
            coefficients,
        })
    }

    /// Number of equivalent orientations.
    pub fn n_equivalents(&self) -> usize {
        self.evaluators.len()
    }

    /// Site dependencies of orientation `equivalent_index`, relative to the
    /// event's home unit cell.
    pub fn dependencies(&self, equivalent_index: usize) -> &[NeighborEntry] {
        self.evaluators[equivalent_index].dependencies()
    }

    /// Local expansion value for orientation `equivalent_index` of an event
    /// instance in unit cell `unitcell_index`.
    pub fn value(&self, equivalent_index: usize, unitcell_index: usize, occ: &OccView<'_>) -> f64 {
        let evaluator = &self.evaluators[equivalent_index];
        let window = self.neighbor_list.sites(unitcell_index);
        let mut total = 0.0;
        let mut corr = vec![0.0; evaluator.n_functions];
        for stencil in &evaluator.stencils {
            let mut product = 1.0;
            for site in &stencil.sites {
                let l = window[site.window_position];
                product *= self.site_basis[site.sublattice].eval(site.site_function, occ.get(l));
            }
            corr[stencil.function] += product;
        }
        total += self.coefficients.dot(&corr);
        total
    }
}
