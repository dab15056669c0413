use std::path::Path;
use std::sync::Arc;

use cemc_core::ValueMap;
use cemc_mc::{
    Canonical, CompletionCheckParams, ConfigSource, CutoffParams, IncrementalGeneratorParams,
    RunManager, RunManagerParams, SampleMode, SampleSchedule, SamplingFixtureParams,
    SamplingParams, StateGeneratorParams,
};
use cemc_system::System;

/// Binary FCC with one nearest-neighbor pair interaction.
fn pair_ce_system() -> Arc<System> {
    let pair = |offset: [i64; 3]| {
        serde_json::json!([
            {"offset": [0, 0, 0], "sublattice": 0, "site_function": 0},
            {"offset": offset, "sublattice": 0, "site_function": 0}
        ])
    };
    let json = serde_json::json!({
        "prim": {
            "lattice": [[0.0, 2.0, 2.0], [2.0, 0.0, 2.0], [2.0, 2.0, 0.0]],
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
                    "clusters": [
                        pair([1, 0, 0]), pair([0, 1, 0]), pair([0, 0, 1]),
                        pair([1, -1, 0]), pair([0, 1, -1]), pair([-1, 0, 1])
                    ]
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

fn generator(n_states: usize) -> StateGeneratorParams {
    let mut base_conditions = ValueMap::new();
    base_conditions
        .scalar_values
        .insert("temperature".to_string(), 400.0);
    base_conditions
        .vector_values
        .insert("mol_composition".to_string(), vec![0.5, 0.5]);
    let mut increment = ValueMap::new();
    increment
        .scalar_values
        .insert("temperature".to_string(), 200.0);
    StateGeneratorParams::Incremental(IncrementalGeneratorParams {
        transformation_matrix: [[3, 0, 0], [0, 3, 0], [0, 0, 3]],
        initial_configuration: ConfigSource::Default,
        base_conditions,
        increment,
        n_states,
        dependent_runs: true,
    })
}

fn run_manager(out: &Path) -> RunManager {
    let fixture = SamplingFixtureParams {
        label: "sweep".to_string(),
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
                max_count: Some(50.0),
                ..Default::default()
            },
            convergence: Vec::new(),
            check_period: 10,
        },
        results_dir: None,
    };
    RunManager::new(
        RunManagerParams {
            output_dir: Some(out.to_path_buf()),
            ..Default::default()
        },
        vec![fixture],
    )
}

#[test]
fn restarted_series_reproduces_uninterrupted_results() {
    let seed = 123_456;
    let system = pair_ce_system();
    let calculator = Canonical::new(system).unwrap();

    // uninterrupted 5-condition series
    let full_dir = tempfile::tempdir().unwrap();
    let mut full = run_manager(full_dir.path());
    calculator
        .run_series(&generator(5), &mut full, seed)
        .unwrap();
    assert_eq!(full.completed_runs.len(), 5);

    // interrupted: same directory first sees only 3 conditions...
    let restart_dir = tempfile::tempdir().unwrap();
    let mut first = run_manager(restart_dir.path());
    calculator
        .run_series(&generator(3), &mut first, seed)
        .unwrap();
    assert_eq!(first.completed_runs.len(), 3);

    // ...then a new manager resumes the full series from disk
    let mut resumed = run_manager(restart_dir.path());
    calculator
        .run_series(&generator(5), &mut resumed, seed)
        .unwrap();
    assert_eq!(resumed.completed_runs.len(), 5);

    // only conditions 4 and 5 executed after restart, and every final
    // state matches the uninterrupted series exactly
    for (full_run, resumed_run) in full.completed_runs.iter().zip(&resumed.completed_runs) {
        assert_eq!(full_run.conditions, resumed_run.conditions);
        assert_eq!(
            full_run.final_state.occupation,
            resumed_run.final_state.occupation
        );
    }
}
