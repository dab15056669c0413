use std::sync::Arc;

use proptest::prelude::*;

use cemc_clex::{
    required_neighborhood, ClusterExpansion, MultiClusterExpansion, OrbitClexulator,
    ProtoClusterSite, ProtoOrbit, SiteBasis, SparseCoefficients,
};
use cemc_lattice::prim::{BasisSite, Prim};
use cemc_lattice::supercell::Conversions;
use cemc_lattice::{PrimNeighborList, SuperNeighborList};

fn cubic_binary_prim() -> Prim {
    Prim {
        lattice: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        basis: vec![BasisSite {
            coordinate: [0.0, 0.0, 0.0],
            occupants: vec!["A".into(), "B".into()],
            asymmetric_unit: 0,
        }],
    }
}

/// Spin site basis (+1 for A, -1 for B), point orbit plus the three
/// nearest-neighbor pair orbits of the simple cubic lattice.
fn spin_orbits() -> (Vec<SiteBasis>, Vec<ProtoOrbit>) {
    let site_basis = vec![SiteBasis {
        values: vec![vec![1.0, -1.0]],
    }];
    let site = |offset: [i64; 3]| ProtoClusterSite {
        offset,
        sublattice: 0,
        site_function: 0,
    };
    let pair = |offset: [i64; 3]| vec![site([0, 0, 0]), site(offset)];
    let orbits = vec![
        ProtoOrbit::constant(),
        ProtoOrbit {
            clusters: vec![vec![site([0, 0, 0])]],
        },
        ProtoOrbit {
            clusters: vec![pair([1, 0, 0]), pair([0, 1, 0]), pair([0, 0, 1])],
        },
    ];
    (site_basis, orbits)
}

fn build_expansion(coeffs: &[f64]) -> (ClusterExpansion, usize) {
    let prim = cubic_binary_prim();
    let components = vec!["A".to_string(), "B".to_string()];
    let convert =
        Conversions::new(&prim, &components, [[3, 0, 0], [0, 3, 0], [0, 0, 3]]).unwrap();
    let (site_basis, orbits) = spin_orbits();
    let prim_list = PrimNeighborList::build(1, required_neighborhood(&orbits));
    let clexulator = OrbitClexulator::new(&prim_list, site_basis, &orbits).unwrap();
    let super_list = Arc::new(SuperNeighborList::new(&prim_list, &convert).unwrap());
    let n_sites = convert.n_sites();
    let expansion = ClusterExpansion::new(
        Arc::new(clexulator),
        super_list,
        SparseCoefficients::from_dense(coeffs),
    )
    .unwrap();
    (expansion, n_sites)
}

#[test]
fn extensive_value_of_uniform_states() {
    // all-A: each cell contributes 1 (constant) + 1 (point) + 3 (pairs)
    let (expansion, n_sites) = build_expansion(&[0.5, 0.25, -0.125]);
    let all_a = vec![0u8; n_sites];
    let per_cell = 0.5 + 0.25 - 0.125 * 3.0;
    let expected = per_cell * n_sites as f64;
    assert!((expansion.extensive_value(&all_a) - expected).abs() < 1e-12);

    // all-B flips the point term, pair products stay +1
    let all_b = vec![1u8; n_sites];
    let per_cell = 0.5 - 0.25 - 0.125 * 3.0;
    let expected = per_cell * n_sites as f64;
    assert!((expansion.extensive_value(&all_b) - expected).abs() < 1e-12);
}

#[test]
fn multi_expansion_matches_individual_expansions() {
    let prim = cubic_binary_prim();
    let components = vec!["A".to_string(), "B".to_string()];
    let convert =
        Conversions::new(&prim, &components, [[3, 0, 0], [0, 3, 0], [0, 0, 3]]).unwrap();
    let (site_basis, orbits) = spin_orbits();
    let prim_list = PrimNeighborList::build(1, required_neighborhood(&orbits));
    let clexulator = Arc::new(OrbitClexulator::new(&prim_list, site_basis, &orbits).unwrap());
    let super_list = Arc::new(SuperNeighborList::new(&prim_list, &convert).unwrap());

    let coeff_sets = [vec![0.0, 0.2, 0.0], vec![0.1, 0.0, -0.03]];
    let multi = MultiClusterExpansion::new(
        clexulator.clone(),
        super_list.clone(),
        coeff_sets
            .iter()
            .map(|dense| SparseCoefficients::from_dense(dense))
            .collect(),
    )
    .unwrap();
    assert_eq!(multi.n_expansions(), 2);

    let occupation: Vec<u8> = (0..convert.n_sites()).map(|l| (l % 2) as u8).collect();
    let values = multi.extensive_values(&occupation);
    let deltas = multi.occ_delta_values(&occupation, &[4, 13], &[1, 0]);
    for (i, dense) in coeff_sets.iter().enumerate() {
        let single = ClusterExpansion::new(
            clexulator.clone(),
            super_list.clone(),
            SparseCoefficients::from_dense(dense),
        )
        .unwrap();
        assert!((values[i] - single.extensive_value(&occupation)).abs() < 1e-12);
        let single_delta = single.occ_delta_value(&occupation, &[4, 13], &[1, 0]);
        assert!((deltas[i] - single_delta).abs() < 1e-12);
    }
}

#[test]
fn empty_change_has_zero_delta() {
    let (expansion, n_sites) = build_expansion(&[0.0, 0.1, -0.01]);
    let occupation = vec![0u8; n_sites];
    assert_eq!(expansion.occ_delta_value(&occupation, &[], &[]), 0.0);
}

proptest! {
    // occ_delta_value must equal the difference of extensive values for
    // any starting occupation and any set of site changes.
    #[test]
    fn delta_matches_total_difference(
        occ_bits in proptest::collection::vec(0u8..2, 27),
        changes in proptest::collection::vec((0usize..27, 0u8..2), 1..5),
        j in -0.05f64..0.05,
        h in -0.05f64..0.05,
    ) {
        let (expansion, n_sites) = build_expansion(&[0.0, h, j]);
        prop_assert_eq!(n_sites, 27);
        let occupation = occ_bits;

        // dedup changed sites, keeping the last write
        let mut sites = Vec::new();
        let mut new_occ = Vec::new();
        for (l, occ) in changes {
            if let Some(pos) = sites.iter().position(|&s| s == l) {
                new_occ[pos] = occ;
            } else {
                sites.push(l);
                new_occ.push(occ);
            }
        }

        let delta = expansion.occ_delta_value(&occupation, &sites, &new_occ);

        let before = expansion.extensive_value(&occupation);
        let mut mutated = occupation.clone();
        for (&l, &occ) in sites.iter().zip(&new_occ) {
            mutated[l] = occ;
        }
        let after = expansion.extensive_value(&mutated);

        let scale = before.abs().max(after.abs()).max(1.0);
        prop_assert!(
            (after - before - delta).abs() <= 10.0 * f64::EPSILON * scale,
            "delta {} vs total difference {}",
            delta,
            after - before
        );
    }
}
