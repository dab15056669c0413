use std::sync::Arc;

use cemc_core::{RngHandle, ValueMap, KB};
use cemc_mc::analysis::standard_analysis_functions;
use cemc_mc::kmc::{kinetic_monte_carlo, CompleteEventList, KmcOptions};
use cemc_mc::potential::{CanonicalPotential, Potential};
use cemc_mc::sampling_functions::{
    add_kinetic_sampling_functions, standard_sampling_functions,
};
use cemc_mc::{
    CompletionCheckParams, CutoffParams, OccLocation, RunManager, RunManagerParams, SampleMode,
    SampleSchedule, SamplingFixtureParams, SamplingParams, State,
};
use cemc_system::{SupercellSystem, System};

const FREQ: f64 = 1e13;
const BARRIER: f64 = 0.2;
const TEMPERATURE: f64 = 800.0;

/// Binary (A, Va) simple cubic crystal with six vacancy-hop events and a
/// constant KRA barrier.
fn vacancy_hop_system() -> Arc<System> {
    let directions = [
        [1, 0, 0],
        [-1, 0, 0],
        [0, 1, 0],
        [0, -1, 0],
        [0, 0, 1],
        [0, 0, -1],
    ];
    let events: Vec<serde_json::Value> = directions
        .iter()
        .map(|d| {
            serde_json::json!({
                "equivalent_index": 0,
                "sites": [
                    {"sublattice": 0, "offset": [0, 0, 0]},
                    {"sublattice": 0, "offset": d}
                ],
                "occ_init": [0, 1],
                "occ_final": [1, 0],
                "trajectories": [
                    {"from": 0, "to": 1},
                    {"from": 1, "to": 0}
                ]
            })
        })
        .collect();
    let json = serde_json::json!({
        "prim": {
            "lattice": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            "basis": [
                {"coordinate": [0.0, 0.0, 0.0], "occupants": ["A", "Va"], "asymmetric_unit": 0}
            ]
        },
        "composition_axes": {
            "components": ["A", "Va"],
            "origin": [1.0, 0.0],
            "end_members": [[0.0, 1.0]]
        },
        "basis_sets": {
            "default": {
                "orbits": [{"clusters": [[]]}]
            }
        },
        "clex": {
            "formation_energy": {
                "basis_set": "default",
                "coefficients": {"index": [], "value": []}
            }
        },
        "local_basis_sets": {
            "hop_local": {
                "equivalents": [[{"clusters": [[]]}]]
            }
        },
        "local_clex": {
            "hop_kra": {
                "local_basis_set": "hop_local",
                "coefficients": {"index": [0], "value": [BARRIER]}
            }
        },
        "events": {
            "vacancy_hop": {
                "freq": FREQ,
                "kra_clex": "hop_kra",
                "events": events
            }
        }
    })
    .to_string();
    Arc::new(System::from_json(&json).unwrap())
}

fn msd_fixture(max_steps: f64) -> SamplingFixtureParams {
    SamplingFixtureParams {
        label: "kinetics".to_string(),
        sampling_params: SamplingParams {
            mode: SampleMode::ByStep,
            schedule: SampleSchedule::Linear {
                begin: 0.0,
                period: 100.0,
            },
            quantities: vec![
                "mean_squared_displacement".to_string(),
                "simulated_time".to_string(),
            ],
            save_observations: false,
            save_trajectory: false,
        },
        completion_check_params: CompletionCheckParams {
            cutoff: CutoffParams {
                max_count: Some(max_steps),
                ..Default::default()
            },
            convergence: Vec::new(),
            check_period: 50,
        },
        results_dir: None,
    }
}

#[test]
fn dwell_time_matches_inverse_total_rate() {
    let n_events = 20_000u64;
    let system = vacancy_hop_system();
    let supercell = SupercellSystem::new(&system, [[3, 0, 0], [0, 3, 0], [0, 0, 3]]).unwrap();
    let n_sites = supercell.convert.n_sites();

    let mut occupation = vec![0u8; n_sites];
    occupation[0] = 1;
    let mut state = State {
        transformation_matrix: [[3, 0, 0], [0, 3, 0], [0, 0, 3]],
        occupation: occupation.clone(),
        conditions: ValueMap::new(),
    };
    state
        .conditions
        .scalar_values
        .insert("temperature".to_string(), TEMPERATURE);

    let beta = 1.0 / (KB * TEMPERATURE);
    let mut occ_location = OccLocation::new(supercell.convert.clone(), true);
    occ_location.initialize(&state.occupation).unwrap();
    let mut event_list = CompleteEventList::new(&system, &supercell).unwrap();
    assert_eq!(event_list.n_slots(), 27 * 6);

    let potential: Arc<dyn Potential> = Arc::new(CanonicalPotential::new(&supercell).unwrap());
    let mut functions =
        standard_sampling_functions(&system, &supercell, potential.clone()).unwrap();
    add_kinetic_sampling_functions(&mut functions, &system).unwrap();

    let mut run_manager = RunManager::new(
        RunManagerParams::default(),
        vec![msd_fixture(n_events as f64)],
    );
    run_manager
        .begin_run(
            &state,
            functions,
            standard_analysis_functions(system.components(), &["a".to_string()]),
        )
        .unwrap();

    let mut rng = RngHandle::from_seed(31_415);
    let counters = kinetic_monte_carlo(
        &mut state,
        &mut occ_location,
        &mut event_list,
        beta,
        &KmcOptions::default(),
        &mut rng,
        &mut run_manager,
    )
    .unwrap();

    assert_eq!(counters.n_steps, n_events);

    // one vacancy with six equal-rate hops at every instant
    let rate = FREQ * (-beta * BARRIER).exp();
    let total_rate = 6.0 * rate;
    assert!((event_list.total_rate() - total_rate).abs() < 1e-6 * total_rate);

    // E[dt] = 1/R; the mean of n exponentials has sd (1/R)/sqrt(n)
    let mean_dt = counters.simulated_time.unwrap() / n_events as f64;
    let expected = 1.0 / total_rate;
    let three_sigma = 3.0 * expected / (n_events as f64).sqrt();
    assert!(
        (mean_dt - expected).abs() < three_sigma,
        "mean dwell {mean_dt} vs 1/R {expected}"
    );

    // the vacancy performed an unbiased walk of n_events unit hops
    let trace = run_manager.fixtures()[0]
        .sampler()
        .trace("mean_squared_displacement")
        .unwrap();
    let va_msd = trace.observations.last().unwrap()[1];
    assert!(
        va_msd > 300.0,
        "vacancy MSD should grow with event count, got {va_msd}"
    );

    // incremental rates must agree with a from-scratch evaluation
    let mut fresh = CompleteEventList::new(&system, &supercell).unwrap();
    fresh.initialize_rates(&state.occupation, beta).unwrap();
    assert!(
        (fresh.total_rate() - event_list.total_rate()).abs() <= 1e-10 * fresh.total_rate()
    );

    // occupation still holds exactly one vacancy
    let n_va = state.occupation.iter().filter(|&&occ| occ == 1).count();
    assert_eq!(n_va, 1);
}
