#![deny(missing_docs)]
#![doc = "System document for the CEMC engine: prim, composition axes, basis sets, cluster expansions and KMC event definitions."]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use cemc_clex::{
    required_neighborhood, ClusterExpansion, Clexulator, LocalClusterExpansion,
    LocalOrbitEvaluator, LocalProtoOrbit, MultiClusterExpansion, OrbitClexulator, ProtoOrbit,
    SiteBasis, SparseCoefficients,
};
use cemc_core::{io_error, CemcError, ErrorInfo};
use cemc_lattice::{
    CompositionAxes, CompositionCalculator, CompositionConverter, Conversions, Mat3, NeighborEntry,
    Prim, PrimNeighborList, SuperNeighborList,
};

pub mod events;

pub use events::{AtomTrajectory, EventTypeData, PrimEvent, PrimEventSite};

/// Named basis set input: per-sublattice site functions plus cluster
/// orbits. When `site_basis` is omitted the occupation-indicator basis is
/// used for every sublattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasisSetDocument {
    /// Site basis functions per sublattice.
    #[serde(default)]
    pub site_basis: Option<Vec<SiteBasis>>,
    /// Cluster orbits defining the basis functions.
    pub orbits: Vec<ProtoOrbit>,
}

/// Named local basis set input, one orbit list per equivalent orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalBasisSetDocument {
    /// Site basis functions per sublattice.
    #[serde(default)]
    pub site_basis: Option<Vec<SiteBasis>>,
    /// Local orbits for each equivalent orientation.
    pub equivalents: Vec<Vec<LocalProtoOrbit>>,
}

/// A named cluster expansion: basis set plus coefficient vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClexData {
    /// Referenced basis set name.
    pub basis_set: String,
    /// Expansion coefficients.
    pub coefficients: SparseCoefficients,
}

/// A named multi-expansion: basis set plus several coefficient vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiClexData {
    /// Referenced basis set name.
    pub basis_set: String,
    /// One coefficient vector per expansion value.
    pub coefficients: Vec<SparseCoefficients>,
}

/// A named local cluster expansion: local basis set plus coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalClexData {
    /// Referenced local basis set name.
    pub local_basis_set: String,
    /// Expansion coefficients.
    pub coefficients: SparseCoefficients,
}

/// On-disk form of the system document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemDocument {
    /// The primitive crystal.
    pub prim: Prim,
    /// Composition axes.
    pub composition_axes: CompositionAxes,
    /// Named basis sets.
    #[serde(default)]
    pub basis_sets: BTreeMap<String, BasisSetDocument>,
    /// Named cluster expansions.
    #[serde(default)]
    pub clex: BTreeMap<String, ClexData>,
    /// Named multi-expansions.
    #[serde(default)]
    pub multiclex: BTreeMap<String, MultiClexData>,
    /// Named local basis sets.
    #[serde(default)]
    pub local_basis_sets: BTreeMap<String, LocalBasisSetDocument>,
    /// Named local cluster expansions.
    #[serde(default)]
    pub local_clex: BTreeMap<String, LocalClexData>,
    /// Named KMC event types.
    #[serde(default)]
    pub events: BTreeMap<String, EventTypeData>,
}

struct LocalBasisSet {
    evaluators: Arc<Vec<LocalOrbitEvaluator>>,
    site_basis: Arc<Vec<SiteBasis>>,
}

/// Fully validated system data, shared read-only by every run.
///
/// All basis sets resolve against one canonical prim neighbor list so a
/// single supercell window serves every evaluator.
pub struct System {
    /// The primitive crystal.
    pub prim: Arc<Prim>,
    /// Composition axes converter.
    pub composition_converter: CompositionConverter,
    /// Species counting helper.
    pub composition_calculator: CompositionCalculator,
    prim_neighbor_list: Arc<PrimNeighborList>,
    basis_sets: BTreeMap<String, Arc<dyn Clexulator>>,
    local_basis_sets: BTreeMap<String, LocalBasisSet>,
    clex_data: BTreeMap<String, ClexData>,
    multiclex_data: BTreeMap<String, MultiClexData>,
    local_clex_data: BTreeMap<String, LocalClexData>,
    event_type_data: BTreeMap<String, EventTypeData>,
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("prim", &self.prim)
            .field("composition_converter", &self.composition_converter)
            .field("composition_calculator", &self.composition_calculator)
            .field("prim_neighbor_list", &self.prim_neighbor_list)
            .field("basis_sets", &self.basis_sets.keys().collect::<Vec<_>>())
            .field("clex_data", &self.clex_data)
            .field("multiclex_data", &self.multiclex_data)
            .field("local_clex_data", &self.local_clex_data)
            .field("event_type_data", &self.event_type_data)
            .finish()
    }
}

fn unknown_name(kind: &str, key: &str, path: &str) -> CemcError {
    CemcError::Consistency(
        ErrorInfo::new("unknown-expansion", "reference to an unknown name")
            .with_context("kind", kind)
            .with_context("key", key)
            .with_context("path", path),
    )
}

fn default_site_basis(prim: &Prim) -> Vec<SiteBasis> {
    prim.basis
        .iter()
        .map(|site| SiteBasis::indicator(site.occupants.len()))
        .collect()
}

impl System {
    /// Validates and assembles a parsed system document.
    pub fn from_document(doc: SystemDocument) -> Result<Self, CemcError> {
        doc.prim.validate()?;
        let composition_converter = CompositionConverter::from_axes(&doc.composition_axes)?;
        for (b, site) in doc.prim.basis.iter().enumerate() {
            for occupant in &site.occupants {
                if !doc.composition_axes.components.contains(occupant) {
                    return Err(CemcError::Config(
                        ErrorInfo::new("unknown-component", "occupant not in composition axes")
                            .with_context("occupant", occupant.clone())
                            .with_context("sublattice", b.to_string()),
                    ));
                }
            }
        }

        // One canonical window shared by every basis set.
        let mut required: Vec<NeighborEntry> = Vec::new();
        for basis_set in doc.basis_sets.values() {
            required.extend(required_neighborhood(&basis_set.orbits));
        }
        for local in doc.local_basis_sets.values() {
            for orbits in &local.equivalents {
                for orbit in orbits {
                    for cluster in &orbit.clusters {
                        for site in cluster {
                            required.push(NeighborEntry {
                                offset: site.offset,
                                sublattice: site.sublattice,
                            });
                        }
                    }
                }
            }
        }
        let prim_neighbor_list = Arc::new(PrimNeighborList::build(
            doc.prim.n_sublattices(),
            required,
        ));

        let mut basis_sets: BTreeMap<String, Arc<dyn Clexulator>> = BTreeMap::new();
        for (name, basis_set) in &doc.basis_sets {
            let site_basis = basis_set
                .site_basis
                .clone()
                .unwrap_or_else(|| default_site_basis(&doc.prim));
            let clexulator =
                OrbitClexulator::new(&prim_neighbor_list, site_basis, &basis_set.orbits)?;
            basis_sets.insert(name.clone(), Arc::new(clexulator));
        }

        let mut local_basis_sets = BTreeMap::new();
        for (name, local) in &doc.local_basis_sets {
            let site_basis = Arc::new(
                local
                    .site_basis
                    .clone()
                    .unwrap_or_else(|| default_site_basis(&doc.prim)),
            );
            let mut evaluators = Vec::with_capacity(local.equivalents.len());
            for orbits in &local.equivalents {
                evaluators.push(LocalOrbitEvaluator::new(
                    &prim_neighbor_list,
                    &site_basis,
                    orbits,
                )?);
            }
            local_basis_sets.insert(
                name.clone(),
                LocalBasisSet {
                    evaluators: Arc::new(evaluators),
                    site_basis,
                },
            );
        }

        for (name, data) in &doc.clex {
            if !basis_sets.contains_key(&data.basis_set) {
                return Err(unknown_name("basis_set", &data.basis_set, &format!("clex/{name}")));
            }
        }
        for (name, data) in &doc.multiclex {
            if !basis_sets.contains_key(&data.basis_set) {
                return Err(unknown_name(
                    "basis_set",
                    &data.basis_set,
                    &format!("multiclex/{name}"),
                ));
            }
        }
        for (name, data) in &doc.local_clex {
            if !local_basis_sets.contains_key(&data.local_basis_set) {
                return Err(unknown_name(
                    "local_basis_set",
                    &data.local_basis_set,
                    &format!("local_clex/{name}"),
                ));
            }
        }
        for (name, event_type) in &doc.events {
            let path = format!("events/{name}");
            let Some(local_clex) = doc.local_clex.get(&event_type.kra_clex) else {
                return Err(unknown_name("kra_clex", &event_type.kra_clex, &path));
            };
            let n_equivalents = local_basis_sets[&local_clex.local_basis_set].evaluators.len();
            if event_type.freq <= 0.0 || !event_type.freq.is_finite() {
                return Err(CemcError::Config(
                    ErrorInfo::new("event-freq", "attempt frequency must be positive and finite")
                        .with_context("path", path.clone()),
                ));
            }
            if event_type.events.is_empty() {
                return Err(CemcError::Config(
                    ErrorInfo::new("empty-event-type", "event type defines no events")
                        .with_context("path", path.clone()),
                ));
            }
            for (i, event) in event_type.events.iter().enumerate() {
                event.validate(&doc.prim, &format!("{path}/events/{i}"))?;
                if event.equivalent_index >= n_equivalents {
                    return Err(CemcError::Config(
                        ErrorInfo::new(
                            "equivalent-index",
                            "event orientation exceeds local basis set equivalents",
                        )
                        .with_context("path", format!("{path}/events/{i}"))
                        .with_context("equivalent_index", event.equivalent_index.to_string())
                        .with_context("n_equivalents", n_equivalents.to_string()),
                    ));
                }
            }
        }

        let n_components = doc.composition_axes.components.len();
        Ok(Self {
            prim: Arc::new(doc.prim),
            composition_converter,
            composition_calculator: CompositionCalculator::new(n_components),
            prim_neighbor_list,
            basis_sets,
            local_basis_sets,
            clex_data: doc.clex,
            multiclex_data: doc.multiclex,
            local_clex_data: doc.local_clex,
            event_type_data: doc.events,
        })
    }

    /// Parses and validates a JSON system document.
    pub fn from_json(json: &str) -> Result<Self, CemcError> {
        let doc: SystemDocument = serde_json::from_str(json).map_err(|err| {
            CemcError::Config(
                ErrorInfo::new("system-parse", err.to_string())
                    .with_hint("see the system document schema"),
            )
        })?;
        Self::from_document(doc)
    }

    /// Loads a system document from disk.
    pub fn load(path: &Path) -> Result<Self, CemcError> {
        let json = std::fs::read_to_string(path)
            .map_err(|err| io_error("system-read", err, path.display()))?;
        Self::from_json(&json)
    }

    /// The canonical prim neighbor list shared by every basis set.
    pub fn prim_neighbor_list(&self) -> &Arc<PrimNeighborList> {
        &self.prim_neighbor_list
    }

    /// Component names, fixing the `mol_composition` ordering.
    pub fn components(&self) -> &[String] {
        self.composition_converter.components()
    }

    /// True if a cluster expansion with this name exists.
    pub fn has_clex(&self, key: &str) -> bool {
        self.clex_data.contains_key(key)
    }

    /// Named KMC event types.
    pub fn event_type_data(&self) -> &BTreeMap<String, EventTypeData> {
        &self.event_type_data
    }
}

/// Per-supercell expansions and index conversions, owned by one run.
pub struct SupercellSystem {
    /// Site index conversions for this supercell.
    pub convert: Conversions,
    /// Expanded neighbor list for this supercell.
    pub neighbor_list: Arc<SuperNeighborList>,
    clex: BTreeMap<String, ClusterExpansion>,
    multiclex: BTreeMap<String, MultiClusterExpansion>,
    local_clex: BTreeMap<String, LocalClusterExpansion>,
}

impl SupercellSystem {
    /// Builds supercell-specific data for `transformation_matrix`.
    pub fn new(system: &System, transformation_matrix: Mat3) -> Result<Self, CemcError> {
        let convert = Conversions::new(&system.prim, system.components(), transformation_matrix)?;
        let neighbor_list = Arc::new(SuperNeighborList::new(
            &system.prim_neighbor_list,
            &convert,
        )?);

        let mut clex = BTreeMap::new();
        for (name, data) in &system.clex_data {
            let clexulator = system.basis_sets[&data.basis_set].clone();
            clex.insert(
                name.clone(),
                ClusterExpansion::new(clexulator, neighbor_list.clone(), data.coefficients.clone())?,
            );
        }
        let mut multiclex = BTreeMap::new();
        for (name, data) in &system.multiclex_data {
            let clexulator = system.basis_sets[&data.basis_set].clone();
            multiclex.insert(
                name.clone(),
                MultiClusterExpansion::new(
                    clexulator,
                    neighbor_list.clone(),
                    data.coefficients.clone(),
                )?,
            );
        }
        let mut local_clex = BTreeMap::new();
        for (name, data) in &system.local_clex_data {
            let local = &system.local_basis_sets[&data.local_basis_set];
            local_clex.insert(
                name.clone(),
                LocalClusterExpansion::new(
                    local.evaluators.clone(),
                    local.site_basis.clone(),
                    neighbor_list.clone(),
                    data.coefficients.clone(),
                )?,
            );
        }
        Ok(Self {
            convert,
            neighbor_list,
            clex,
            multiclex,
            local_clex,
        })
    }

    /// Named cluster expansion bound to this supercell.
    pub fn clex(&self, key: &str) -> Result<&ClusterExpansion, CemcError> {
        self.clex
            .get(key)
            .ok_or_else(|| unknown_name("clex", key, "clex"))
    }

    /// Named multi-expansion bound to this supercell.
    pub fn multiclex(&self, key: &str) -> Result<&MultiClusterExpansion, CemcError> {
        self.multiclex
            .get(key)
            .ok_or_else(|| unknown_name("multiclex", key, "multiclex"))
    }

    /// Named local cluster expansion bound to this supercell.
    pub fn local_clex(&self, key: &str) -> Result<&LocalClusterExpansion, CemcError> {
        self.local_clex
            .get(key)
            .ok_or_else(|| unknown_name("local_clex", key, "local_clex"))
    }
}
