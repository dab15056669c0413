use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use cemc_core::RngHandle;
use cemc_mc::metropolis::occupation_metropolis;
use cemc_mc::occ_location::{make_canonical_swaps, propose_canonical_event, OccLocation};
use cemc_mc::potential::{CanonicalPotential, Potential};
use cemc_mc::sampling_functions::standard_sampling_functions;
use cemc_mc::{
    CompletionCheckParams, CutoffParams, RunManager, RunManagerParams, SampleMode,
    SampleSchedule, SamplingFixtureParams, SamplingParams, State,
};
use cemc_system::{SupercellSystem, System};

fn pair_ce_system() -> Arc<System> {
    let pair = |offset: [i64; 3]| {
        serde_json::json!([
            {"offset": [0, 0, 0], "sublattice": 0, "site_function": 0},
            {"offset": offset, "sublattice": 0, "site_function": 0}
        ])
    };
    let json = serde_json::json!({
        "prim": {
            "lattice": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            "basis": [
                {"coordinate": [0.0, 0.0, 0.0], "occupants": ["A", "B"], "asymmetric_unit": 0}
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
                "orbits": [{
                    "clusters": [pair([1, 0, 0]), pair([0, 1, 0]), pair([0, 0, 1])]
                }]
            }
        },
        "clex": {
            "formation_energy": {
                "basis_set": "default",
                "coefficients": {"index": [0], "value": [-0.01]}
            }
        }
    })
    .to_string();
    Arc::new(System::from_json(&json).unwrap())
}

fn bench_metropolis_passes(c: &mut Criterion) {
    let system = pair_ce_system();
    let supercell = SupercellSystem::new(&system, [[6, 0, 0], [0, 6, 0], [0, 0, 6]]).unwrap();
    let n_sites = supercell.convert.n_sites();

    let mut state = State {
        transformation_matrix: [[6, 0, 0], [0, 6, 0], [0, 0, 6]],
        occupation: (0..n_sites).map(|l| (l % 2) as u8).collect(),
        conditions: Default::default(),
    };
    state
        .conditions
        .scalar_values
        .insert("temperature".to_string(), 800.0);

    let potential: Arc<dyn Potential> = Arc::new(CanonicalPotential::new(&supercell).unwrap());
    let beta = 1.0 / (cemc_core::KB * 800.0);

    c.bench_function("metropolis_10_passes", |b| {
        b.iter(|| {
            let mut bench_state = state.clone();
            let mut occ_location = OccLocation::new(supercell.convert.clone(), false);
            occ_location.initialize(&bench_state.occupation).unwrap();
            let swaps = make_canonical_swaps(occ_location.candidate_list());
            let functions =
                standard_sampling_functions(&system, &supercell, potential.clone()).unwrap();
            let mut run_manager = RunManager::new(
                RunManagerParams::default(),
                vec![SamplingFixtureParams {
                    label: "bench".to_string(),
                    sampling_params: SamplingParams {
                        mode: SampleMode::ByPass,
                        schedule: SampleSchedule::Linear {
                            begin: 1.0,
                            period: 1.0,
                        },
                        quantities: vec!["potential_energy".to_string()],
                        save_observations: false,
                        save_trajectory: false,
                    },
                    completion_check_params: CompletionCheckParams {
                        cutoff: CutoffParams {
                            max_count: Some(10.0),
                            ..Default::default()
                        },
                        convergence: Vec::new(),
                        check_period: 10,
                    },
                    results_dir: None,
                }],
            );
            run_manager
                .begin_run(&bench_state, functions, Default::default())
                .unwrap();
            let mut rng = RngHandle::from_seed(42);
            occupation_metropolis(
                &mut bench_state,
                &mut occ_location,
                potential.as_ref(),
                beta,
                &swaps,
                propose_canonical_event,
                &mut rng,
                &mut run_manager,
            )
            .unwrap();
        })
    });
}

criterion_group!(benches, bench_metropolis_passes);
criterion_main!(benches);
