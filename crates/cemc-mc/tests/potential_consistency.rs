use std::sync::Arc;

use proptest::prelude::*;

use cemc_core::ValueMap;
use cemc_mc::potential::{Potential, SemiGrandPotential};
use cemc_mc::Conditions;
use cemc_system::{SupercellSystem, System};

fn ternary_system() -> Arc<System> {
    let json = serde_json::json!({
        "prim": {
            "lattice": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            "basis": [
                {"coordinate": [0.0, 0.0, 0.0], "occupants": ["A", "B", "Va"], "asymmetric_unit": 0}
            ]
        },
        "composition_axes": {
            "components": ["A", "B", "Va"],
            "origin": [1.0, 0.0, 0.0],
            "end_members": [[0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
        },
        "basis_sets": {
            "default": {
                "site_basis": [{"values": [[1.0, -1.0, 0.0], [0.0, 0.0, 1.0]]}],
                "orbits": [
                    {"clusters": [[{"offset": [0, 0, 0], "sublattice": 0, "site_function": 0}]]},
                    {"clusters": [
                        [{"offset": [0, 0, 0], "sublattice": 0, "site_function": 1},
                         {"offset": [1, 0, 0], "sublattice": 0, "site_function": 1}]
                    ]}
                ]
            }
        },
        "clex": {
            "formation_energy": {
                "basis_set": "default",
                "coefficients": {"index": [0, 1], "value": [0.02, 0.05]}
            }
        }
    })
    .to_string();
    Arc::new(System::from_json(&json).unwrap())
}

proptest! {
    // The semi-grand delta (CE delta plus exchange-potential lookups)
    // must equal the difference of extensive potential values.
    #[test]
    fn semi_grand_delta_matches_extensive_difference(
        occ_values in proptest::collection::vec(0u8..3, 27),
        changes in proptest::collection::vec((0usize..27, 0u8..3), 1..4),
        mu_a in -0.5f64..0.5,
        mu_b in -0.5f64..0.5,
    ) {
        let system = ternary_system();
        let supercell =
            SupercellSystem::new(&system, [[3, 0, 0], [0, 3, 0], [0, 0, 3]]).unwrap();

        let mut conditions_map = ValueMap::new();
        conditions_map.scalar_values.insert("temperature".into(), 600.0);
        conditions_map
            .vector_values
            .insert("param_chem_pot".into(), vec![mu_a, mu_b]);
        let conditions =
            Conditions::from_value_map(&conditions_map, &system.composition_converter).unwrap();
        let potential = SemiGrandPotential::new(&supercell, &system, &conditions).unwrap();

        let occupation = occ_values;
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

        let delta = potential.occ_delta_extensive_value(&occupation, &sites, &new_occ);

        let before = potential.extensive_value(&occupation);
        let mut mutated = occupation.clone();
        for (&l, &occ) in sites.iter().zip(&new_occ) {
            mutated[l] = occ;
        }
        let after = potential.extensive_value(&mutated);

        let scale = before.abs().max(after.abs()).max(1.0);
        prop_assert!(
            (after - before - delta).abs() <= 1e-10 * scale,
            "delta {} vs extensive difference {}",
            delta,
            after - before
        );
    }
}
