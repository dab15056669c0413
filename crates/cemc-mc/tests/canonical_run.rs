use std::sync::Arc;

use cemc_core::ValueMap;
use cemc_mc::{
    Canonical, CompletionCheckParams, ConfigSource, CutoffParams, IncrementalGeneratorParams,
    RunManager, RunManagerParams, SampleMode, SampleSchedule, SamplingFixtureParams,
    SamplingParams, StateGeneratorParams,
};
use cemc_system::System;

/// Binary FCC prim with a constant (all-zero) cluster expansion.
fn constant_ce_system() -> Arc<System> {
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
                "orbits": [{"clusters": [[]]}]
            }
        },
        "clex": {
            "formation_energy": {
                "basis_set": "default",
                "coefficients": {"index": [], "value": []}
            }
        }
    })
    .to_string();
    Arc::new(System::from_json(&json).unwrap())
}

fn fixture_params(results_dir: &std::path::Path, max_passes: f64) -> SamplingFixtureParams {
    SamplingFixtureParams {
        label: "thermo".to_string(),
        sampling_params: SamplingParams {
            mode: SampleMode::ByPass,
            schedule: SampleSchedule::Linear {
                begin: 1.0,
                period: 1.0,
            },
            quantities: vec![
                "potential_energy".to_string(),
                "mol_composition".to_string(),
                "param_composition".to_string(),
            ],
            save_observations: false,
            save_trajectory: false,
        },
        completion_check_params: CompletionCheckParams {
            cutoff: CutoffParams {
                max_count: Some(max_passes),
                ..Default::default()
            },
            convergence: Vec::new(),
            check_period: 100,
        },
        results_dir: Some(results_dir.to_path_buf()),
    }
}

#[test]
fn constant_ce_accepts_everything() {
    let out = tempfile::tempdir().unwrap();
    let system = constant_ce_system();
    let calculator = Canonical::new(system).unwrap();

    let mut base_conditions = ValueMap::new();
    base_conditions
        .scalar_values
        .insert("temperature".to_string(), 1000.0);
    base_conditions
        .vector_values
        .insert("mol_composition".to_string(), vec![0.5, 0.5]);

    let generator = StateGeneratorParams::Incremental(IncrementalGeneratorParams {
        transformation_matrix: [[2, 0, 0], [0, 2, 0], [0, 0, 2]],
        initial_configuration: ConfigSource::Default,
        base_conditions,
        increment: ValueMap::new(),
        n_states: 1,
        dependent_runs: false,
    });

    let mut run_manager = RunManager::new(
        RunManagerParams {
            output_dir: Some(out.path().join("out")),
            ..Default::default()
        },
        vec![fixture_params(&out.path().join("results"), 500.0)],
    );
    calculator
        .run_series(&generator, &mut run_manager, 7)
        .unwrap();

    assert_eq!(run_manager.completed_runs.len(), 1);
    let run = &run_manager.completed_runs[0];

    // every proposal is downhill-or-flat, so everything is accepted
    assert_eq!(run.counters.n_reject, 0);
    assert!(run.counters.n_accept >= 500 * 8);

    // composition was enforced to 50/50 and canonical swaps preserve it
    let n_a = run
        .final_state
        .occupation
        .iter()
        .filter(|&&occ| occ == 0)
        .count();
    assert_eq!(n_a, 4);

    let summary_path = out
        .path()
        .join("results")
        .join("thermo")
        .join("run.0")
        .join("summary.json");
    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(summary_path).unwrap()).unwrap();

    let mean_e = summary["quantities"]["potential_energy"]["mean"][0]
        .as_f64()
        .unwrap();
    assert_eq!(mean_e, 0.0);

    let heat_capacity = summary["analysis"]["heat_capacity"]["values"][0]
        .as_f64()
        .unwrap();
    assert_eq!(heat_capacity, 0.0);

    let mean_comp = summary["quantities"]["mol_composition"]["mean"][0]
        .as_f64()
        .unwrap();
    assert!((mean_comp - 0.5).abs() < 1e-12);
}

#[test]
fn cancellation_ends_the_series_without_error() {
    use std::sync::atomic::AtomicBool;

    let out = tempfile::tempdir().unwrap();
    let system = constant_ce_system();
    let calculator = Canonical::new(system).unwrap();

    let mut base_conditions = ValueMap::new();
    base_conditions
        .scalar_values
        .insert("temperature".to_string(), 1000.0);
    base_conditions
        .vector_values
        .insert("mol_composition".to_string(), vec![0.5, 0.5]);
    let generator = StateGeneratorParams::Incremental(IncrementalGeneratorParams {
        transformation_matrix: [[2, 0, 0], [0, 2, 0], [0, 0, 2]],
        initial_configuration: ConfigSource::Default,
        base_conditions,
        increment: ValueMap::new(),
        n_states: 2,
        dependent_runs: false,
    });

    let mut run_manager = RunManager::new(
        RunManagerParams::default(),
        vec![fixture_params(out.path(), 100.0)],
    );
    let flag = Arc::new(AtomicBool::new(true));
    run_manager.set_cancel_flag(flag);

    // observed at the first sample boundary; the sweep treats it as a
    // normal stop, not a failure
    calculator
        .run_series(&generator, &mut run_manager, 7)
        .unwrap();
    assert!(run_manager.completed_runs.is_empty());
}

#[test]
fn missing_mol_composition_aborts_the_run() {
    let out = tempfile::tempdir().unwrap();
    let system = constant_ce_system();
    let calculator = Canonical::new(system).unwrap();

    let mut base_conditions = ValueMap::new();
    base_conditions
        .scalar_values
        .insert("temperature".to_string(), 1000.0);

    let generator = StateGeneratorParams::Incremental(IncrementalGeneratorParams {
        transformation_matrix: [[2, 0, 0], [0, 2, 0], [0, 0, 2]],
        initial_configuration: ConfigSource::Default,
        base_conditions,
        increment: ValueMap::new(),
        n_states: 1,
        dependent_runs: false,
    });
    let mut run_manager = RunManager::new(
        RunManagerParams::default(),
        vec![fixture_params(out.path(), 10.0)],
    );
    let err = calculator
        .run_series(&generator, &mut run_manager, 7)
        .unwrap_err();
    assert_eq!(err.info().code, "missing-condition");
}
