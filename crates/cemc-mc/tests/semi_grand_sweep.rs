use std::sync::Arc;

use cemc_core::ValueMap;
use cemc_mc::{
    CompletionCheckParams, ConfigSource, CutoffParams, IncrementalGeneratorParams, RunManager,
    RunManagerParams, SampleMode, SampleSchedule, SamplingFixtureParams, SamplingParams,
    SemiGrandCanonical, StateGeneratorParams,
};
use cemc_system::System;

/// Ternary (A, B, Va) on a simple cubic lattice with a constant CE, so
/// site occupancies respond to the chemical potential alone.
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

#[test]
fn param_composition_increases_with_chemical_potential() {
    let out = tempfile::tempdir().unwrap();
    let system = ternary_system();
    let calculator = SemiGrandCanonical::new(system).unwrap();

    let mut base_conditions = ValueMap::new();
    base_conditions
        .scalar_values
        .insert("temperature".to_string(), 600.0);
    base_conditions
        .vector_values
        .insert("param_chem_pot".to_string(), vec![-0.2, 0.0]);
    let mut increment = ValueMap::new();
    increment
        .vector_values
        .insert("param_chem_pot".to_string(), vec![0.1, 0.0]);

    let n_states = 5;
    let generator = StateGeneratorParams::Incremental(IncrementalGeneratorParams {
        transformation_matrix: [[3, 0, 0], [0, 3, 0], [0, 0, 3]],
        initial_configuration: ConfigSource::Default,
        base_conditions,
        increment,
        n_states,
        dependent_runs: true,
    });

    let results_dir = out.path().join("results");
    let fixture = SamplingFixtureParams {
        label: "sweep".to_string(),
        sampling_params: SamplingParams {
            mode: SampleMode::ByPass,
            schedule: SampleSchedule::Linear {
                begin: 1.0,
                period: 1.0,
            },
            quantities: vec![
                "param_composition".to_string(),
                "potential_energy".to_string(),
            ],
            save_observations: false,
            save_trajectory: false,
        },
        completion_check_params: CompletionCheckParams {
            cutoff: CutoffParams {
                max_count: Some(400.0),
                ..Default::default()
            },
            convergence: Vec::new(),
            check_period: 50,
        },
        results_dir: Some(results_dir.clone()),
    };

    let mut run_manager = RunManager::new(
        RunManagerParams {
            output_dir: Some(out.path().join("out")),
            ..Default::default()
        },
        vec![fixture],
    );
    calculator
        .run_series(&generator, &mut run_manager, 99)
        .unwrap();
    assert_eq!(run_manager.completed_runs.len(), n_states);

    let mut means = Vec::new();
    let mut suscs = Vec::new();
    for run in 0..n_states {
        let summary_path = results_dir
            .join("sweep")
            .join(format!("run.{run}"))
            .join("summary.json");
        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(summary_path).unwrap()).unwrap();
        means.push(
            summary["quantities"]["param_composition"]["mean"][0]
                .as_f64()
                .unwrap(),
        );
        suscs.push(
            summary["analysis"]["param_susc"]["values"][0]
                .as_f64()
                .unwrap(),
        );
    }

    for pair in means.windows(2) {
        assert!(
            pair[1] > pair[0],
            "<param_composition[a]> must increase with param_chem_pot[a]: {means:?}"
        );
    }
    for (run, susc) in suscs.iter().enumerate() {
        assert!(*susc > 0.0, "param_susc must be positive, run {run}: {susc}");
    }
}
