//! Run management: sampling fixtures, completion, results persistence and
//! restart metadata.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use cemc_core::{io_error, CemcError, ErrorInfo, LogSink, NullSink, ValueMap};

use crate::analysis::{AnalysisFunctionMap, RunResults};
use crate::completion::estimate_statistics;
use crate::sampling::{
    SampleContext, SamplingFixture, SamplingFixtureParams, SamplingFunctionMap,
};
use crate::state::State;

/// Run manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManagerParams {
    /// Stop when any fixture is complete (true) or only when all are
    /// (false).
    #[serde(default = "default_global_cutoff")]
    pub global_cutoff: bool,
    /// Keep each run's initial state with the restart metadata.
    #[serde(default)]
    pub save_all_initial_states: bool,
    /// In a sweep, record a failed run and continue with the next
    /// condition instead of aborting the series.
    #[serde(default)]
    pub continue_on_error: bool,
    /// Directory for restart metadata (`completed_runs.json`) and status.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Minimum seconds between `status.json` updates.
    #[serde(default = "default_status_period")]
    pub status_period_s: f64,
}

fn default_global_cutoff() -> bool {
    true
}

fn default_status_period() -> f64 {
    600.0
}

impl Default for RunManagerParams {
    fn default() -> Self {
        Self {
            global_cutoff: default_global_cutoff(),
            save_all_initial_states: false,
            continue_on_error: false,
            output_dir: None,
            status_period_s: default_status_period(),
        }
    }
}

/// Progress counters a kernel reports to the run manager.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunCounters {
    /// Steps taken (proposals or fired events).
    pub n_steps: u64,
    /// Accepted proposals (equals `n_steps` for rejection-free KMC).
    pub n_accept: u64,
    /// Rejected proposals.
    pub n_reject: u64,
    /// Simulated time, for kernels that propagate one.
    pub simulated_time: Option<f64>,
}

/// Record of one completed run, persisted for restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunData {
    /// Zero-based run index within the series.
    pub run_index: usize,
    /// Conditions the run was performed at.
    pub conditions: ValueMap,
    /// Initial state, kept when `save_all_initial_states` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<State>,
    /// Final state, used for configuration path-following.
    pub final_state: State,
    /// Final counters.
    pub counters: RunCounters,
    /// True when the run aborted and was recorded by a sweep running with
    /// `continue_on_error`.
    #[serde(default)]
    pub failed: bool,
}

#[derive(Serialize)]
struct QuantitySummary {
    component_names: Vec<String>,
    mean: Vec<f64>,
    calculated_precision: Vec<f64>,
    effective_sample_size: Vec<f64>,
}

#[derive(Serialize)]
struct AnalysisSummary {
    description: String,
    component_names: Vec<String>,
    values: Vec<f64>,
}

/// Drives one or more sampling fixtures through a run and a series.
pub struct RunManager {
    params: RunManagerParams,
    fixtures: Vec<SamplingFixture>,
    /// Completed runs, oldest first; populated by
    /// [`RunManager::read_completed_runs`] on restart.
    pub completed_runs: Vec<RunData>,
    functions: SamplingFunctionMap,
    analysis_functions: AnalysisFunctionMap,
    initial_state: Option<State>,
    cancel_flag: Option<Arc<AtomicBool>>,
    last_status_write: Option<Instant>,
    log: Box<dyn LogSink>,
}

impl RunManager {
    /// Creates a run manager owning one fixture per parameter set.
    pub fn new(params: RunManagerParams, fixture_params: Vec<SamplingFixtureParams>) -> Self {
        let fixtures = fixture_params.into_iter().map(SamplingFixture::new).collect();
        Self {
            params,
            fixtures,
            completed_runs: Vec::new(),
            functions: SamplingFunctionMap::new(),
            analysis_functions: AnalysisFunctionMap::new(),
            initial_state: None,
            cancel_flag: None,
            last_status_write: None,
            log: Box::new(NullSink),
        }
    }

    /// Installs a logging sink; the default discards everything.
    pub fn set_log(&mut self, log: Box<dyn LogSink>) {
        self.log = log;
    }

    /// The installed logging sink.
    pub fn log(&self) -> &dyn LogSink {
        self.log.as_ref()
    }

    /// Run manager parameters.
    pub fn params(&self) -> &RunManagerParams {
        &self.params
    }

    /// The fixtures, in registration order.
    pub fn fixtures(&self) -> &[SamplingFixture] {
        &self.fixtures
    }

    /// Installs a cooperative cancellation flag, observed at sample
    /// boundaries.
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel_flag = Some(flag);
    }

    /// Index of the run currently being (or about to be) performed.
    pub fn run_index(&self) -> usize {
        self.completed_runs.len()
    }

    /// Reads restart metadata from the output directory, returning the
    /// number of previously completed runs.
    pub fn read_completed_runs(&mut self) -> Result<usize, CemcError> {
        let Some(dir) = &self.params.output_dir else {
            return Ok(0);
        };
        let path = dir.join("completed_runs.json");
        if !path.exists() {
            return Ok(0);
        }
        let json = std::fs::read_to_string(&path)
            .map_err(|err| io_error("completed-runs-read", err, path.display()))?;
        self.completed_runs = serde_json::from_str(&json).map_err(|err| {
            CemcError::Io(
                ErrorInfo::new("completed-runs-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Ok(self.completed_runs.len())
    }

    /// Begins a run: installs the calculator's function tables and resets
    /// every fixture.
    pub fn begin_run(
        &mut self,
        initial_state: &State,
        functions: SamplingFunctionMap,
        analysis_functions: AnalysisFunctionMap,
    ) -> Result<(), CemcError> {
        self.functions = functions;
        self.analysis_functions = analysis_functions;
        self.initial_state = Some(initial_state.clone());
        for fixture in &mut self.fixtures {
            fixture.reset(&self.functions)?;
        }
        self.last_status_write = None;
        Ok(())
    }

    /// Advances every fixture (samples due observations, re-checks
    /// completion) and returns true when the run should stop.
    ///
    /// This is the sample boundary: cancellation is observed here and
    /// status output is flushed here.
    pub fn update(&mut self, ctx: &SampleContext<'_>) -> Result<bool, CemcError> {
        if let Some(flag) = &self.cancel_flag {
            if flag.load(Ordering::Relaxed) {
                return Err(CemcError::Cancelled(ErrorInfo::new(
                    "cancelled",
                    "cancellation requested",
                )));
            }
        }
        let mut n_complete = 0;
        for fixture in &mut self.fixtures {
            if fixture.advance(ctx, &self.functions)? {
                n_complete += 1;
            }
        }
        self.write_status_if_due(ctx)?;
        Ok(if self.params.global_cutoff {
            n_complete > 0
        } else {
            n_complete == self.fixtures.len()
        })
    }

    /// Finishes a run: writes per-fixture results, records restart
    /// metadata and appends to `completed_runs`.
    pub fn finish_run(
        &mut self,
        final_state: &State,
        counters: RunCounters,
    ) -> Result<(), CemcError> {
        let run_index = self.completed_runs.len();
        let initial_state = self.initial_state.take().ok_or_else(|| {
            CemcError::Consistency(ErrorInfo::new(
                "run-not-started",
                "finish_run called before begin_run",
            ))
        })?;
        for fixture in &self.fixtures {
            let Some(results_dir) = &fixture.params().results_dir else {
                continue;
            };
            let run_dir = results_dir
                .join(&fixture.params().label)
                .join(format!("run.{run_index}"));
            write_fixture_results(
                &run_dir,
                fixture,
                &initial_state,
                counters,
                run_index,
                &self.analysis_functions,
            )?;
        }

        self.completed_runs.push(RunData {
            run_index,
            conditions: initial_state.conditions.clone(),
            initial_state: self.params.save_all_initial_states.then_some(initial_state),
            final_state: final_state.clone(),
            counters,
            failed: false,
        });
        self.write_completed_runs()?;
        Ok(())
    }

    /// Records a failed run so a sweep with `continue_on_error` can move
    /// on; partial results up to the failure point are kept on disk.
    pub fn record_failure(&mut self, error: &CemcError, state: &State) {
        let run_index = self.completed_runs.len();
        if let Some(initial_state) = self.initial_state.take() {
            for fixture in &self.fixtures {
                let Some(results_dir) = &fixture.params().results_dir else {
                    continue;
                };
                let run_dir = results_dir
                    .join(&fixture.params().label)
                    .join(format!("run.{run_index}"));
                let _ = write_fixture_results(
                    &run_dir,
                    fixture,
                    &initial_state,
                    RunCounters::default(),
                    run_index,
                    &self.analysis_functions,
                );
            }
        }
        if let Some(dir) = &self.params.output_dir {
            let path = dir.join(format!("run.{run_index}.error.json"));
            if std::fs::create_dir_all(dir).is_ok() {
                if let Ok(json) = serde_json::to_string_pretty(error) {
                    let _ = std::fs::write(path, json);
                }
            }
        }
        self.completed_runs.push(RunData {
            run_index,
            conditions: state.conditions.clone(),
            initial_state: None,
            final_state: state.clone(),
            counters: RunCounters::default(),
            failed: true,
        });
        let _ = self.write_completed_runs();
    }

    fn write_completed_runs(&self) -> Result<(), CemcError> {
        let Some(dir) = &self.params.output_dir else {
            return Ok(());
        };
        std::fs::create_dir_all(dir).map_err(|err| io_error("output-mkdir", err, dir.display()))?;
        let path = dir.join("completed_runs.json");
        let json = serde_json::to_string_pretty(&self.completed_runs).map_err(|err| {
            CemcError::Io(ErrorInfo::new("completed-runs-serialize", err.to_string()))
        })?;
        std::fs::write(&path, json)
            .map_err(|err| io_error("completed-runs-write", err, path.display()))?;
        Ok(())
    }

    fn write_status_if_due(&mut self, ctx: &SampleContext<'_>) -> Result<(), CemcError> {
        let Some(dir) = &self.params.output_dir else {
            return Ok(());
        };
        let due = self
            .last_status_write
            .map_or(true, |last| last.elapsed().as_secs_f64() >= self.params.status_period_s);
        if !due {
            return Ok(());
        }
        self.last_status_write = Some(Instant::now());

        let fixtures: Vec<serde_json::Value> = self
            .fixtures
            .iter()
            .map(|fixture| {
                serde_json::json!({
                    "label": fixture.params().label,
                    "n_samples": fixture.sampler().n_samples(),
                    "count": ctx.clock.counter(fixture.params().sampling_params.mode),
                    "complete": fixture.completion().complete,
                })
            })
            .collect();
        let status = serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "run_index": self.completed_runs.len(),
            "step": ctx.clock.step,
            "simulated_time": ctx.clock.time,
            "fixtures": fixtures,
        });
        std::fs::create_dir_all(dir).map_err(|err| io_error("output-mkdir", err, dir.display()))?;
        let path = dir.join("status.json");
        std::fs::write(&path, serde_json::to_string_pretty(&status).unwrap_or_default())
            .map_err(|err| io_error("status-write", err, path.display()))?;
        Ok(())
    }
}

fn write_fixture_results(
    run_dir: &Path,
    fixture: &SamplingFixture,
    initial_state: &State,
    counters: RunCounters,
    run_index: usize,
    analysis_functions: &AnalysisFunctionMap,
) -> Result<(), CemcError> {
    std::fs::create_dir_all(run_dir)
        .map_err(|err| io_error("results-mkdir", err, run_dir.display()))?;
    let sampler = fixture.sampler();

    let mut quantities = BTreeMap::new();
    for (name, trace) in sampler.traces() {
        let n_components = trace.component_names.len();
        let mut mean = Vec::with_capacity(n_components);
        let mut precision = Vec::with_capacity(n_components);
        let mut ess = Vec::with_capacity(n_components);
        for component in 0..n_components {
            let stats = estimate_statistics(&trace.component_column(component));
            mean.push(stats.mean);
            precision.push(stats.calculated_precision);
            ess.push(stats.effective_sample_size);
        }
        quantities.insert(
            name.clone(),
            QuantitySummary {
                component_names: trace.component_names.clone(),
                mean,
                calculated_precision: precision,
                effective_sample_size: ess,
            },
        );
    }

    let results = RunResults {
        initial_state,
        sampler,
    };
    let mut analysis = BTreeMap::new();
    for function in analysis_functions.values() {
        // analyses whose inputs this fixture did not sample are skipped
        let values = match (function.function)(&results) {
            Ok(values) => values,
            Err(err) if err.info().code == "analysis-requires" => continue,
            Err(err) => return Err(err),
        };
        analysis.insert(
            function.name.clone(),
            AnalysisSummary {
                description: function.description.clone(),
                component_names: function.component_names.clone(),
                values,
            },
        );
    }

    let summary = serde_json::json!({
        "run_index": run_index,
        "conditions": initial_state.conditions,
        "counters": counters,
        "n_samples": sampler.n_samples(),
        "completion": fixture.completion(),
        "quantities": quantities,
        "analysis": analysis,
    });
    let path = run_dir.join("summary.json");
    std::fs::write(
        &path,
        serde_json::to_string_pretty(&summary)
            .map_err(|err| CemcError::Io(ErrorInfo::new("summary-serialize", err.to_string())))?,
    )
    .map_err(|err| io_error("summary-write", err, path.display()))?;

    if fixture.params().sampling_params.save_observations {
        let trace_path = run_dir.join("trace.json");
        let traces: BTreeMap<&String, &crate::sampling::QuantityTrace> =
            sampler.traces().collect();
        let payload = serde_json::json!({
            "sample_count": sampler.sample_count,
            "sample_time": sampler.sample_time,
            "sample_weight": sampler.sample_weight,
            "observations": traces,
        });
        std::fs::write(
            &trace_path,
            serde_json::to_string(&payload)
                .map_err(|err| CemcError::Io(ErrorInfo::new("trace-serialize", err.to_string())))?,
        )
        .map_err(|err| io_error("trace-write", err, trace_path.display()))?;
    }

    if fixture.params().sampling_params.save_trajectory {
        let trajectory_path = run_dir.join("trajectory.json");
        let payload = serde_json::json!({
            "sample_time": sampler.sample_time,
            "occupation": sampler.trajectory,
        });
        std::fs::write(
            &trajectory_path,
            serde_json::to_string(&payload).map_err(|err| {
                CemcError::Io(ErrorInfo::new("trajectory-serialize", err.to_string()))
            })?,
        )
        .map_err(|err| io_error("trajectory-write", err, trajectory_path.display()))?;
    }
    Ok(())
}
