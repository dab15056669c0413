//! Supercell index conversions.
//!
//! Maps `(sublattice, unit cell)` to linear site indices and back. Unit
//! cells are enumerated lexicographically in the Smith-normal-form basis of
//! the transformation matrix, so two identical supercells always index sites
//! identically and serialized configurations are portable.

use serde::{Deserialize, Serialize};

use cemc_core::{CemcError, ErrorInfo};

use crate::prim::Prim;

/// 3x3 integer matrix, row major.
pub type Mat3 = [[i64; 3]; 3];

/// Integer unit cell coordinates in the prim lattice basis.
pub type UnitCell = [i64; 3];

const IDENTITY: Mat3 = [[1, 0, 0], [0, 1, 0], [0, 0, 1]];

/// Determinant of a 3x3 integer matrix.
pub fn det(m: &Mat3) -> i64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn mat_vec(m: &Mat3, v: &UnitCell) -> UnitCell {
    let mut out = [0i64; 3];
    for (i, entry) in out.iter_mut().enumerate() {
        *entry = (0..3).map(|k| m[i][k] * v[k]).sum();
    }
    out
}

/// Inverse of a unimodular matrix via the adjugate.
fn unimodular_inverse(m: &Mat3) -> Mat3 {
    let d = det(m);
    debug_assert!(d == 1 || d == -1);
    let cof = |r0: usize, r1: usize, c0: usize, c1: usize| -> i64 {
        m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0]
    };
    let adj = [
        [cof(1, 2, 1, 2), -cof(0, 2, 1, 2), cof(0, 1, 1, 2)],
        [-cof(1, 2, 0, 2), cof(0, 2, 0, 2), -cof(0, 1, 0, 2)],
        [cof(1, 2, 0, 1), -cof(0, 2, 0, 1), cof(0, 1, 0, 1)],
    ];
    let mut out = [[0i64; 3]; 3];
    for (row, adj_row) in out.iter_mut().zip(adj.iter()) {
        for (entry, &a) in row.iter_mut().zip(adj_row.iter()) {
            *entry = a * d;
        }
    }
    out
}

/// Smith normal form of an integer matrix.
///
/// Returns `(u, s, v)` with `u * m * v == s`, `u` and `v` unimodular and
/// `s` diagonal with positive entries satisfying `s00 | s11 | s22`.
pub fn smith_normal_form(m: &Mat3) -> (Mat3, Mat3, Mat3) {
    let mut s = *m;
    let mut u = IDENTITY;
    let mut v = IDENTITY;

    for k in 0..3 {
        'reduce: loop {
            // Move the smallest-magnitude nonzero entry of the trailing
            // block to the pivot position.
            let mut pivot: Option<(usize, usize)> = None;
            for i in k..3 {
                for j in k..3 {
                    if s[i][j] != 0
                        && pivot.map_or(true, |(pi, pj)| s[i][j].abs() < s[pi][pj].abs())
                    {
                        pivot = Some((i, j));
                    }
                }
            }
            let Some((pi, pj)) = pivot else { break };
            if pi != k {
                s.swap(pi, k);
                u.swap(pi, k);
            }
            if pj != k {
                for row in s.iter_mut() {
                    row.swap(pj, k);
                }
                for row in v.iter_mut() {
                    row.swap(pj, k);
                }
            }

            // Clear the pivot column, then the pivot row.
            for i in k + 1..3 {
                if s[i][k] != 0 {
                    let q = s[i][k] / s[k][k];
                    for j in 0..3 {
                        s[i][j] -= q * s[k][j];
                        u[i][j] -= q * u[k][j];
                    }
                    continue 'reduce;
                }
            }
            for j in k + 1..3 {
                if s[k][j] != 0 {
                    let q = s[k][j] / s[k][k];
                    for row in s.iter_mut() {
                        row[j] -= q * row[k];
                    }
                    for row in v.iter_mut() {
                        row[j] -= q * row[k];
                    }
                    continue 'reduce;
                }
            }

            // Pivot row and column are clear; enforce divisibility of the
            // trailing block before moving on.
            for i in k + 1..3 {
                for j in k + 1..3 {
                    if s[i][j] % s[k][k] != 0 {
                        for c in 0..3 {
                            s[k][c] += s[i][c];
                            u[k][c] += u[i][c];
                        }
                        continue 'reduce;
                    }
                }
            }
            break;
        }
    }

    for k in 0..3 {
        if s[k][k] < 0 {
            for c in 0..3 {
                s[k][c] = -s[k][c];
                u[k][c] = -u[k][c];
            }
        }
    }
    (u, s, v)
}

/// Supercell site index conversions and species index tables.
///
/// Owned by exactly one run; read-only once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversions {
    transformation_matrix: Mat3,
    volume: usize,
    n_sublattices: usize,
    snf_diag: [i64; 3],
    snf_u: Mat3,
    snf_u_inv: Mat3,
    /// Asymmetric unit per sublattice.
    sublattice_to_asym: Vec<usize>,
    /// Component (species) index for each `(sublattice, occupant index)`.
    occ_to_species: Vec<Vec<usize>>,
    /// Occupant index for each `(sublattice, species index)`, if allowed.
    species_to_occ: Vec<Vec<Option<usize>>>,
    /// Occupant-list size per asymmetric unit.
    asym_n_occupants: Vec<usize>,
}

impl Conversions {
    /// Builds conversions for the given prim, component ordering and
    /// supercell transformation matrix.
    pub fn new(
        prim: &Prim,
        components: &[String],
        transformation_matrix: Mat3,
    ) -> Result<Self, CemcError> {
        let determinant = det(&transformation_matrix);
        if determinant == 0 {
            return Err(CemcError::Consistency(ErrorInfo::new(
                "singular-supercell",
                "supercell transformation matrix is singular",
            )));
        }
        let volume = determinant.unsigned_abs() as usize;
        let (u, s, _v) = smith_normal_form(&transformation_matrix);
        let snf_diag = [s[0][0], s[1][1], s[2][2]];
        let snf_u_inv = unimodular_inverse(&u);

        let mut occ_to_species = Vec::with_capacity(prim.n_sublattices());
        let mut species_to_occ = Vec::with_capacity(prim.n_sublattices());
        for (b, site) in prim.basis.iter().enumerate() {
            let mut forward = Vec::with_capacity(site.occupants.len());
            let mut reverse = vec![None; components.len()];
            for (occ, name) in site.occupants.iter().enumerate() {
                let species = components.iter().position(|c| c == name).ok_or_else(|| {
                    CemcError::Consistency(
                        ErrorInfo::new("unknown-component", "occupant not in component list")
                            .with_context("occupant", name.clone())
                            .with_context("sublattice", b.to_string()),
                    )
                })?;
                forward.push(species);
                reverse[species] = Some(occ);
            }
            occ_to_species.push(forward);
            species_to_occ.push(reverse);
        }

        let sublattice_to_asym: Vec<usize> =
            prim.basis.iter().map(|site| site.asymmetric_unit).collect();
        let mut asym_n_occupants = vec![0usize; prim.n_asymmetric_units()];
        for (b, site) in prim.basis.iter().enumerate() {
            asym_n_occupants[sublattice_to_asym[b]] = site.occupants.len();
        }

        Ok(Self {
            transformation_matrix,
            volume,
            n_sublattices: prim.n_sublattices(),
            snf_diag,
            snf_u: u,
            snf_u_inv,
            sublattice_to_asym,
            occ_to_species,
            species_to_occ,
            asym_n_occupants,
        })
    }

    /// The supercell transformation matrix.
    pub fn transformation_matrix(&self) -> &Mat3 {
        &self.transformation_matrix
    }

    /// Number of prim unit cells in the supercell.
    pub fn volume(&self) -> usize {
        self.volume
    }

    /// Number of sublattices.
    pub fn n_sublattices(&self) -> usize {
        self.n_sublattices
    }

    /// Total number of sites, `n_sublattices * volume`.
    pub fn n_sites(&self) -> usize {
        self.n_sublattices * self.volume
    }

    /// Linear unit cell index for integer unit cell coordinates.
    pub fn unitcell_index(&self, unitcell: &UnitCell) -> usize {
        let x = mat_vec(&self.snf_u, unitcell);
        let d = &self.snf_diag;
        let r0 = x[0].rem_euclid(d[0]);
        let r1 = x[1].rem_euclid(d[1]);
        let r2 = x[2].rem_euclid(d[2]);
        ((r0 * d[1] + r1) * d[2] + r2) as usize
    }

    /// Representative unit cell coordinates for a linear unit cell index.
    pub fn unitcell(&self, unitcell_index: usize) -> UnitCell {
        let d = &self.snf_diag;
        let idx = unitcell_index as i64;
        let r2 = idx % d[2];
        let r1 = (idx / d[2]) % d[1];
        let r0 = idx / (d[1] * d[2]);
        mat_vec(&self.snf_u_inv, &[r0, r1, r2])
    }

    /// Linear site index for `(sublattice, unit cell)`.
    pub fn bijk_to_l(&self, sublattice: usize, unitcell: &UnitCell) -> usize {
        sublattice * self.volume + self.unitcell_index(unitcell)
    }

    /// Sublattice of a linear site index.
    pub fn l_to_sublattice(&self, l: usize) -> usize {
        l / self.volume
    }

    /// Linear unit cell index of a linear site index.
    pub fn l_to_unitcell_index(&self, l: usize) -> usize {
        l % self.volume
    }

    /// Representative `(sublattice, unit cell)` of a linear site index.
    pub fn l_to_bijk(&self, l: usize) -> (usize, UnitCell) {
        (self.l_to_sublattice(l), self.unitcell(self.l_to_unitcell_index(l)))
    }

    /// Asymmetric unit of a linear site index.
    pub fn l_to_asym(&self, l: usize) -> usize {
        self.sublattice_to_asym[self.l_to_sublattice(l)]
    }

    /// Asymmetric unit of a sublattice.
    pub fn sublattice_to_asym(&self, sublattice: usize) -> usize {
        self.sublattice_to_asym[sublattice]
    }

    /// Number of asymmetric units.
    pub fn n_asymmetric_units(&self) -> usize {
        self.asym_n_occupants.len()
    }

    /// Occupant-list size for an asymmetric unit.
    pub fn asym_n_occupants(&self, asym: usize) -> usize {
        self.asym_n_occupants[asym]
    }

    /// Component (species) index of occupant `occ` on `sublattice`.
    pub fn species_index(&self, sublattice: usize, occ: u8) -> usize {
        self.occ_to_species[sublattice][occ as usize]
    }

    /// Occupant index of component `species` on `sublattice`, if allowed.
    pub fn occ_index(&self, sublattice: usize, species: usize) -> Option<u8> {
        self.species_to_occ[sublattice][species].map(|occ| occ as u8)
    }

    /// Translates a site by a unit cell offset, wrapping periodically.
    pub fn add_unitcell(&self, l: usize, delta: &UnitCell) -> usize {
        let (b, mut ijk) = self.l_to_bijk(l);
        for (coord, d) in ijk.iter_mut().zip(delta) {
            *coord += d;
        }
        self.bijk_to_l(b, &ijk)
    }
}
