use std::sync::Arc;

use cemc_core::{RngHandle, KB};
use cemc_mc::{
    Canonical, CompletionCheckParams, CutoffParams, RunManager, RunManagerParams, SampleMode,
    SampleSchedule, SamplingFixtureParams, SamplingParams, State,
};
use cemc_system::System;

/// Two sites per unit cell, one holding a field term: the smallest system
/// with a nontrivial canonical stationary distribution.
fn two_site_system(field: f64) -> Arc<System> {
    let json = serde_json::json!({
        "prim": {
            "lattice": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            "basis": [
                {"coordinate": [0.0, 0.0, 0.0], "occupants": ["A", "B"], "asymmetric_unit": 0},
                {"coordinate": [0.5, 0.5, 0.5], "occupants": ["A", "B"], "asymmetric_unit": 0}
            ]
        },
        "composition_axes": {
            "components": ["A", "B"],
            "origin": [2.0, 0.0],
            "end_members": [[0.0, 2.0]]
        },
        "basis_sets": {
            "default": {
                "site_basis": [{"values": [[1.0, -1.0]]}, {"values": [[1.0, -1.0]]}],
                "orbits": [
                    {"clusters": [[{"offset": [0, 0, 0], "sublattice": 0, "site_function": 0}]]}
                ]
            }
        },
        "clex": {
            "formation_energy": {
                "basis_set": "default",
                "coefficients": {"index": [0], "value": [field]}
            }
        }
    })
    .to_string();
    Arc::new(System::from_json(&json).unwrap())
}

fn fixture(max_steps: f64) -> SamplingFixtureParams {
    SamplingFixtureParams {
        label: "balance".to_string(),
        sampling_params: SamplingParams {
            mode: SampleMode::ByStep,
            schedule: SampleSchedule::Linear {
                begin: 0.0,
                period: 1.0,
            },
            quantities: vec!["formation_energy".to_string()],
            save_observations: false,
            save_trajectory: false,
        },
        completion_check_params: CompletionCheckParams {
            cutoff: CutoffParams {
                max_count: Some(max_steps),
                ..Default::default()
            },
            convergence: Vec::new(),
            check_period: 1000,
        },
        results_dir: None,
    }
}

#[test]
fn stationary_distribution_is_boltzmann() {
    let field = 0.1;
    let temperature = 1000.0;
    let system = two_site_system(field);
    let calculator = Canonical::new(system).unwrap();

    let mut state = State {
        transformation_matrix: [[1, 0, 0], [0, 1, 0], [0, 0, 1]],
        occupation: vec![0, 1],
        conditions: Default::default(),
    };
    state
        .conditions
        .scalar_values
        .insert("temperature".to_string(), temperature);
    state
        .conditions
        .vector_values
        .insert("mol_composition".to_string(), vec![1.0, 1.0]);

    let mut run_manager = RunManager::new(RunManagerParams::default(), vec![fixture(200_000.0)]);
    let mut rng = RngHandle::from_seed(20_240_601);
    calculator.run(&mut state, &mut run_manager, &mut rng).unwrap();

    // the two configurations have energies +field and -field; per unit
    // cell <E> = -field * tanh(beta * field)
    let beta = 1.0 / (KB * temperature);
    let analytic = -field * (beta * field).tanh();

    let trace = run_manager.fixtures()[0]
        .sampler()
        .trace("formation_energy")
        .unwrap();
    let column = trace.component_column(0);
    let mean = column.iter().sum::<f64>() / column.len() as f64;
    assert!(
        (mean - analytic).abs() < 0.01,
        "sampled <E> = {mean}, Boltzmann expects {analytic}"
    );
}
