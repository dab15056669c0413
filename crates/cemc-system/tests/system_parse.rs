use cemc_system::{System, SupercellSystem};

fn binary_system_json() -> String {
    serde_json::json!({
        "prim": {
            "lattice": [[0.0, 2.0, 2.0], [2.0, 0.0, 2.0], [2.0, 2.0, 0.0]],
            "basis": [
                {
                    "coordinate": [0.0, 0.0, 0.0],
                    "occupants": ["A", "B"],
                    "asymmetric_unit": 0
                }
            ]
        },
        "composition_axes": {
            "components": ["A", "B"],
            "origin": [1.0, 0.0],
            "end_members": [[0.0, 1.0]]
        },
        "basis_sets": {
            "default": {
                "site_basis": [{"values": [[1.0, -1.0]]}],
                "orbits": [
                    {"clusters": [[]]},
                    {"clusters": [[{"offset": [0, 0, 0], "sublattice": 0, "site_function": 0}]]},
                    {"clusters": [
                        [{"offset": [0, 0, 0], "sublattice": 0, "site_function": 0},
                         {"offset": [1, 0, 0], "sublattice": 0, "site_function": 0}]
                    ]}
                ]
            }
        },
        "clex": {
            "formation_energy": {
                "basis_set": "default",
                "coefficients": {"index": [2], "value": [-0.01]}
            }
        }
    })
    .to_string()
}

#[test]
fn parses_and_builds_supercell_data() {
    let system = System::from_json(&binary_system_json()).unwrap();
    assert_eq!(system.components(), ["A".to_string(), "B".to_string()]);
    assert!(system.has_clex("formation_energy"));

    let supercell =
        SupercellSystem::new(&system, [[3, 0, 0], [0, 3, 0], [0, 0, 3]]).unwrap();
    let clex = supercell.clex("formation_energy").unwrap();
    let n_sites = supercell.convert.n_sites();
    // all-A: every pair product is +1, one pair per cell
    let energy = clex.extensive_value(&vec![0u8; n_sites]);
    assert!((energy - (-0.01) * n_sites as f64).abs() < 1e-12);
}

#[test]
fn unknown_expansion_name_is_reported() {
    let system = System::from_json(&binary_system_json()).unwrap();
    let supercell = SupercellSystem::new(&system, [[2, 0, 0], [0, 2, 0], [0, 0, 2]]).unwrap();
    let err = supercell.clex("kra_barrier").unwrap_err();
    assert_eq!(err.info().code, "unknown-expansion");
}

#[test]
fn dangling_basis_set_reference_fails_load() {
    let json = binary_system_json().replace("\"basis_set\":\"default\"", "\"basis_set\":\"other\"");
    let err = System::from_json(&json).unwrap_err();
    assert_eq!(err.info().code, "unknown-expansion");
}
