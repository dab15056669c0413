//! Occupant tracking and event proposal.
//!
//! [`OccLocation`] maintains, for every `(asymmetric unit, species)`
//! candidate, the list of sites currently occupied by that species, so a
//! uniform random site of a given species is O(1). It also applies
//! [`OccEvent`]s to the occupation and, when atom tracking is enabled,
//! maintains stable atom identities and accumulated displacements for
//! mean-squared-displacement sampling.

use serde::{Deserialize, Serialize};

use cemc_core::{CemcError, ErrorInfo, RngHandle};
use cemc_lattice::Conversions;

/// A `(asymmetric unit, species)` pair usable in swap enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OccCandidate {
    /// Asymmetric unit index.
    pub asym: usize,
    /// Component (species) index.
    pub species: usize,
}

/// The candidate table for one supercell.
#[derive(Debug, Clone)]
pub struct OccCandidateList {
    candidates: Vec<OccCandidate>,
}

impl OccCandidateList {
    /// Enumerates every allowed `(asymmetric unit, species)` pair.
    pub fn new(convert: &Conversions) -> Self {
        let mut candidates = Vec::new();
        for asym in 0..convert.n_asymmetric_units() {
            // representative sublattice shares the occupant list
            let sublattice = (0..convert.n_sublattices())
                .find(|&b| convert.sublattice_to_asym(b) == asym)
                .expect("asymmetric units are contiguous");
            for occ in 0..convert.asym_n_occupants(asym) {
                candidates.push(OccCandidate {
                    asym,
                    species: convert.species_index(sublattice, occ as u8),
                });
            }
        }
        candidates.sort();
        candidates.dedup();
        Self { candidates }
    }

    /// All candidates in canonical order.
    pub fn candidates(&self) -> &[OccCandidate] {
        &self.candidates
    }

    /// Index of `(asym, species)` within the candidate table.
    pub fn index(&self, asym: usize, species: usize) -> Option<usize> {
        self.candidates
            .binary_search(&OccCandidate { asym, species })
            .ok()
    }
}

/// An allowed exchange between two candidates of one asymmetric unit.
///
/// For canonical swaps the pair is unordered (two species exchange sites);
/// for grand-canonical swaps it is ordered `from -> to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccSwap {
    /// First candidate index.
    pub candidate_a: usize,
    /// Second candidate index.
    pub candidate_b: usize,
}

/// Enumerates canonical swaps: unordered pairs of distinct species on a
/// common asymmetric unit.
pub fn make_canonical_swaps(candidate_list: &OccCandidateList) -> Vec<OccSwap> {
    let candidates = candidate_list.candidates();
    let mut swaps = Vec::new();
    for (i, a) in candidates.iter().enumerate() {
        for (j, b) in candidates.iter().enumerate().skip(i + 1) {
            if a.asym == b.asym && a.species != b.species {
                swaps.push(OccSwap {
                    candidate_a: i,
                    candidate_b: j,
                });
            }
        }
    }
    swaps
}

/// Enumerates grand-canonical swaps: ordered pairs of distinct species on
/// a common asymmetric unit.
pub fn make_grand_canonical_swaps(candidate_list: &OccCandidateList) -> Vec<OccSwap> {
    let candidates = candidate_list.candidates();
    let mut swaps = Vec::new();
    for (i, a) in candidates.iter().enumerate() {
        for (j, b) in candidates.iter().enumerate() {
            if i != j && a.asym == b.asym && a.species != b.species {
                swaps.push(OccSwap {
                    candidate_a: i,
                    candidate_b: j,
                });
            }
        }
    }
    swaps
}

/// Motion of one tracked occupant within an event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OccAtomTraj {
    /// Site the occupant leaves.
    pub from_l: usize,
    /// Site the occupant arrives at.
    pub to_l: usize,
    /// True (unwrapped) fractional displacement of the hop.
    pub displacement: [f64; 3],
}

/// A concrete occupation change at specific sites.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OccEvent {
    /// Sites being transformed.
    pub linear_site_index: Vec<usize>,
    /// New occupant index per site, parallel to `linear_site_index`.
    pub new_occ: Vec<u8>,
    /// Occupant trajectories; empty unless atom tracking is in use.
    pub atom_traj: Vec<OccAtomTraj>,
}

/// One tracked occupant.
#[derive(Debug, Clone)]
struct Atom {
    species: usize,
    /// Accumulated fractional displacement since initialization.
    displacement: [f64; 3],
}

/// Indexed occupant tracker.
///
/// Invariants maintained across `apply`:
/// - every site appears in exactly one candidate list;
/// - the candidate lists reproduce the occupation vector;
/// - atom bookkeeping never loses or duplicates an identity.
pub struct OccLocation {
    convert: Conversions,
    candidate_list: OccCandidateList,
    /// Site indices per candidate.
    loc: Vec<Vec<usize>>,
    /// Position of each site within its current candidate list.
    site_position: Vec<usize>,
    /// Current candidate index of each site.
    site_candidate: Vec<usize>,
    /// Number of sites with more than one allowed occupant.
    mol_size: usize,
    track_atoms: bool,
    /// Tracked occupants; ids are assigned monotonically in site order at
    /// initialization and never reused.
    atoms: Vec<Atom>,
    /// Occupant id at each site.
    l_to_atom: Vec<Option<usize>>,
}

impl OccLocation {
    /// Creates an empty tracker; call [`OccLocation::initialize`] before use.
    pub fn new(convert: Conversions, track_atoms: bool) -> Self {
        let candidate_list = OccCandidateList::new(&convert);
        let n_candidates = candidate_list.candidates().len();
        Self {
            convert,
            candidate_list,
            loc: vec![Vec::new(); n_candidates],
            site_position: Vec::new(),
            site_candidate: Vec::new(),
            mol_size: 0,
            track_atoms,
            atoms: Vec::new(),
            l_to_atom: Vec::new(),
        }
    }

    /// Rebuilds every list from the occupation vector.
    pub fn initialize(&mut self, occupation: &[u8]) -> Result<(), CemcError> {
        if occupation.len() != self.convert.n_sites() {
            return Err(CemcError::Consistency(
                ErrorInfo::new("occupation-length", "occupation length does not match supercell")
                    .with_context("expected", self.convert.n_sites().to_string())
                    .with_context("found", occupation.len().to_string()),
            ));
        }
        for list in &mut self.loc {
            list.clear();
        }
        self.site_position = vec![0; occupation.len()];
        self.site_candidate = vec![0; occupation.len()];
        self.mol_size = 0;
        self.atoms.clear();
        self.l_to_atom = vec![None; occupation.len()];

        for (l, &occ) in occupation.iter().enumerate() {
            let sublattice = self.convert.l_to_sublattice(l);
            let asym = self.convert.l_to_asym(l);
            let species = self.convert.species_index(sublattice, occ);
            let candidate = self.candidate_list.index(asym, species).ok_or_else(|| {
                CemcError::Consistency(
                    ErrorInfo::new("unknown-candidate", "site occupant not in candidate table")
                        .with_context("site", l.to_string()),
                )
            })?;
            self.site_position[l] = self.loc[candidate].len();
            self.site_candidate[l] = candidate;
            self.loc[candidate].push(l);
            if self.convert.asym_n_occupants(asym) > 1 {
                self.mol_size += 1;
            }
            if self.track_atoms {
                self.l_to_atom[l] = Some(self.atoms.len());
                self.atoms.push(Atom {
                    species,
                    displacement: [0.0; 3],
                });
            }
        }
        Ok(())
    }

    /// The candidate table.
    pub fn candidate_list(&self) -> &OccCandidateList {
        &self.candidate_list
    }

    /// Site index conversions this tracker was built with.
    pub fn convert(&self) -> &Conversions {
        &self.convert
    }

    /// Number of sites occupied by candidate `candidate_index`.
    pub fn cand_size(&self, candidate_index: usize) -> usize {
        self.loc[candidate_index].len()
    }

    /// Number of mutable-site occupants (sites allowing more than one
    /// occupant); one pass is this many steps.
    pub fn mol_size(&self) -> usize {
        self.mol_size
    }

    /// Uniform random site of candidate `candidate_index`.
    pub fn choose_site(&self, candidate_index: usize, rng: &mut RngHandle) -> usize {
        let list = &self.loc[candidate_index];
        list[rng.uniform_index(list.len())]
    }

    /// Sites currently occupied by candidate `candidate_index`.
    pub fn sites(&self, candidate_index: usize) -> &[usize] {
        &self.loc[candidate_index]
    }

    /// True if atom tracking is enabled.
    pub fn tracks_atoms(&self) -> bool {
        self.track_atoms
    }

    /// Accumulated fractional displacement of each tracked occupant.
    pub fn atom_displacements(&self) -> impl Iterator<Item = (usize, &[f64; 3])> + '_ {
        self.atoms
            .iter()
            .map(|atom| (atom.species, &atom.displacement))
    }

    /// Applies `event`: mutates the occupation vector and moves the
    /// affected sites between candidate lists.
    pub fn apply(&mut self, event: &OccEvent, occupation: &mut [u8]) -> Result<(), CemcError> {
        // Move tracked occupants first; two-phase so cyclic trajectories
        // neither lose nor duplicate an identity.
        if self.track_atoms && !event.atom_traj.is_empty() {
            let mut moves = Vec::with_capacity(event.atom_traj.len());
            for traj in &event.atom_traj {
                let atom = self.l_to_atom[traj.from_l].ok_or_else(|| {
                    CemcError::Consistency(
                        ErrorInfo::new("missing-atom", "event trajectory leaves an empty site")
                            .with_context("site", traj.from_l.to_string()),
                    )
                })?;
                moves.push((atom, traj.to_l, traj.displacement));
            }
            for traj in &event.atom_traj {
                self.l_to_atom[traj.from_l] = None;
            }
            for (atom, to_l, displacement) in moves {
                if self.l_to_atom[to_l].is_some() {
                    return Err(CemcError::Consistency(
                        ErrorInfo::new("atom-collision", "event trajectories collide on a site")
                            .with_context("site", to_l.to_string()),
                    ));
                }
                self.l_to_atom[to_l] = Some(atom);
                for (total, delta) in self.atoms[atom].displacement.iter_mut().zip(&displacement)
                {
                    *total += delta;
                }
            }
        }

        for (&l, &new) in event.linear_site_index.iter().zip(&event.new_occ) {
            let old = std::mem::replace(&mut occupation[l], new);
            if old == new {
                continue;
            }
            let sublattice = self.convert.l_to_sublattice(l);
            let asym = self.convert.l_to_asym(l);
            let new_species = self.convert.species_index(sublattice, new);
            let cand_from = self.site_candidate[l];
            let cand_to = self.candidate_list.index(asym, new_species).ok_or_else(|| {
                CemcError::Consistency(
                    ErrorInfo::new("unknown-candidate", "event writes a disallowed occupant")
                        .with_context("site", l.to_string()),
                )
            })?;

            // O(1) removal: swap the site to the back of its list.
            let position = self.site_position[l];
            let list = &mut self.loc[cand_from];
            list.swap_remove(position);
            if position < list.len() {
                let moved = list[position];
                self.site_position[moved] = position;
            }

            self.site_position[l] = self.loc[cand_to].len();
            self.site_candidate[l] = cand_to;
            self.loc[cand_to].push(l);
        }
        Ok(())
    }
}

/// Proposes a canonical swap event.
///
/// The swap is drawn with probability proportional to `n_a * n_b` and one
/// site is drawn uniformly from each species list, so every (site, site)
/// pair of every swap is equally likely.
pub fn propose_canonical_event(
    occ_location: &OccLocation,
    swaps: &[OccSwap],
    rng: &mut RngHandle,
) -> Result<OccEvent, CemcError> {
    let weights: Vec<f64> = swaps
        .iter()
        .map(|swap| {
            occ_location.cand_size(swap.candidate_a) as f64
                * occ_location.cand_size(swap.candidate_b) as f64
        })
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(CemcError::Consistency(ErrorInfo::new(
            "no-allowed-swaps",
            "no canonical swap has sites available",
        )));
    }
    let mut draw = rng.uniform_f64() * total;
    let mut chosen = swaps.len() - 1;
    for (i, weight) in weights.iter().enumerate() {
        if draw < *weight {
            chosen = i;
            break;
        }
        draw -= weight;
    }
    let swap = swaps[chosen];
    let site_a = occ_location.choose_site(swap.candidate_a, rng);
    let site_b = occ_location.choose_site(swap.candidate_b, rng);
    let candidates = occ_location.candidate_list().candidates();
    let species_a = candidates[swap.candidate_a].species;
    let species_b = candidates[swap.candidate_b].species;
    let convert = occ_location.convert();
    let occ_for = |l: usize, species: usize| {
        convert
            .occ_index(convert.l_to_sublattice(l), species)
            .ok_or_else(|| {
                CemcError::Consistency(
                    ErrorInfo::new("unknown-candidate", "species not allowed on swap site")
                        .with_context("site", l.to_string()),
                )
            })
    };
    Ok(OccEvent {
        linear_site_index: vec![site_a, site_b],
        new_occ: vec![occ_for(site_a, species_b)?, occ_for(site_b, species_a)?],
        atom_traj: Vec::new(),
    })
}

/// Proposes a grand-canonical event: a uniform (site, new occupant) pair.
pub fn propose_grand_canonical_event(
    occ_location: &OccLocation,
    swaps: &[OccSwap],
    rng: &mut RngHandle,
) -> Result<OccEvent, CemcError> {
    let weights: Vec<f64> = swaps
        .iter()
        .map(|swap| occ_location.cand_size(swap.candidate_a) as f64)
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(CemcError::Consistency(ErrorInfo::new(
            "no-allowed-swaps",
            "no grand-canonical swap has sites available",
        )));
    }
    let mut draw = rng.uniform_f64() * total;
    let mut chosen = swaps.len() - 1;
    for (i, weight) in weights.iter().enumerate() {
        if draw < *weight {
            chosen = i;
            break;
        }
        draw -= weight;
    }
    let swap = swaps[chosen];
    let site = occ_location.choose_site(swap.candidate_a, rng);
    let candidates = occ_location.candidate_list().candidates();
    let to_species = candidates[swap.candidate_b].species;
    let convert = occ_location.convert();
    let new_occ = convert
        .occ_index(convert.l_to_sublattice(site), to_species)
        .ok_or_else(|| {
            CemcError::Consistency(
                ErrorInfo::new("unknown-candidate", "species not allowed on site")
                    .with_context("site", site.to_string()),
            )
        })?;
    Ok(OccEvent {
        linear_site_index: vec![site],
        new_occ: vec![new_occ],
        atom_traj: Vec::new(),
    })
}
