//! Sampling fixtures: what to sample, when, and where observations go.

use std::collections::BTreeMap;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use cemc_core::{CemcError, ErrorInfo};

use crate::completion::{check_completion, CompletionCheckParams, CompletionCheckResult};
use crate::occ_location::OccLocation;
use crate::state::State;

/// Counter a fixture schedules samples against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMode {
    /// Schedule in passes (`mol_size` steps each).
    ByPass,
    /// Schedule in steps.
    ByStep,
    /// Schedule in simulated time (KMC only).
    ByTime,
}

/// When samples are due, in units of the fixture's [`SampleMode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SampleSchedule {
    /// Sample `n` is due at `begin + n * period`.
    Linear {
        /// First sample position.
        #[serde(default)]
        begin: f64,
        /// Spacing between samples.
        period: f64,
    },
    /// Sample `n` is due at `begin + base^n`.
    Log {
        /// Offset added to every sample position.
        #[serde(default)]
        begin: f64,
        /// Logarithmic base.
        base: f64,
    },
    /// Explicit sample positions, strictly increasing.
    Custom {
        /// The sample positions.
        values: Vec<f64>,
    },
}

impl SampleSchedule {
    /// Position of sample `n`, or `None` when the schedule is exhausted.
    pub fn position(&self, n: usize) -> Option<f64> {
        match self {
            SampleSchedule::Linear { begin, period } => Some(begin + n as f64 * period),
            SampleSchedule::Log { begin, base } => Some(begin + base.powi(n as i32)),
            SampleSchedule::Custom { values } => values.get(n).copied(),
        }
    }

    /// Validates the schedule parameters.
    pub fn validate(&self, path: &str) -> Result<(), CemcError> {
        let bad = |message: &str| {
            CemcError::Config(ErrorInfo::new("sample-schedule", message).with_context("path", path))
        };
        match self {
            SampleSchedule::Linear { period, .. } if *period <= 0.0 => {
                Err(bad("sample period must be positive"))
            }
            SampleSchedule::Log { base, .. } if *base <= 1.0 => {
                Err(bad("log base must exceed one"))
            }
            SampleSchedule::Custom { values }
                if values.windows(2).any(|pair| pair[1] <= pair[0]) =>
            {
                Err(bad("custom sample positions must increase strictly"))
            }
            _ => Ok(()),
        }
    }
}

/// What one fixture samples and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Counter the schedule applies to.
    pub mode: SampleMode,
    /// Sample schedule.
    pub schedule: SampleSchedule,
    /// Names of the sampling functions to evaluate.
    pub quantities: Vec<String>,
    /// Persist the full observation traces with the results.
    #[serde(default)]
    pub save_observations: bool,
    /// Persist occupation snapshots with each sample.
    #[serde(default)]
    pub save_trajectory: bool,
}

/// Kernel progress counters visible to fixtures.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleClock {
    /// Completed steps.
    pub step: u64,
    /// Completed passes (fractional).
    pub pass: f64,
    /// Simulated time, when the kernel propagates one.
    pub time: Option<f64>,
}

impl SampleClock {
    /// The counter value for `mode`.
    pub fn counter(&self, mode: SampleMode) -> f64 {
        match mode {
            SampleMode::ByPass => self.pass,
            SampleMode::ByStep => self.step as f64,
            SampleMode::ByTime => self.time.unwrap_or(0.0),
        }
    }
}

/// Data sampling functions read.
pub struct SampleContext<'a> {
    /// The evolving state.
    pub state: &'a State,
    /// Occupant tracker, for displacement-based quantities.
    pub occ_location: Option<&'a OccLocation>,
    /// Progress counters.
    pub clock: SampleClock,
}

/// A named, pure function of the current state returning a fixed-shape
/// real vector.
pub struct StateSamplingFunction {
    /// Quantity name.
    pub name: String,
    /// One-line description for result summaries.
    pub description: String,
    /// Component names, fixing the vector shape.
    pub component_names: Vec<String>,
    /// The function itself.
    pub function: Box<dyn Fn(&SampleContext<'_>) -> Result<Vec<f64>, CemcError>>,
}

/// Name-keyed sampling function table, built once per calculator run.
pub type SamplingFunctionMap = BTreeMap<String, StateSamplingFunction>;

/// Observations of one quantity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuantityTrace {
    /// Component names.
    pub component_names: Vec<String>,
    /// One row per sample.
    pub observations: Vec<Vec<f64>>,
}

impl QuantityTrace {
    /// Column of component `component_index` across all samples.
    pub fn component_column(&self, component_index: usize) -> Vec<f64> {
        self.observations
            .iter()
            .map(|row| row[component_index])
            .collect()
    }
}

/// Append-only columnar observation store.
#[derive(Debug, Default)]
pub struct Sampler {
    quantities: IndexMap<String, QuantityTrace>,
    /// Schedule counter value at each sample.
    pub sample_count: Vec<f64>,
    /// Simulated time at each sample (0 outside KMC).
    pub sample_time: Vec<f64>,
    /// Sample weights (uniform unless a kernel reweights).
    pub sample_weight: Vec<f64>,
    /// Occupation snapshots, kept only when requested.
    pub trajectory: Vec<Vec<u8>>,
}

impl Sampler {
    /// Creates a store for the given quantities, in registration order.
    pub fn new<'a>(
        functions: impl IntoIterator<Item = &'a StateSamplingFunction>,
    ) -> Self {
        let mut quantities = IndexMap::new();
        for function in functions {
            quantities.insert(
                function.name.clone(),
                QuantityTrace {
                    component_names: function.component_names.clone(),
                    observations: Vec::new(),
                },
            );
        }
        Self {
            quantities,
            ..Self::default()
        }
    }

    /// Number of samples taken.
    pub fn n_samples(&self) -> usize {
        self.sample_count.len()
    }

    /// Observations of `quantity`, if sampled.
    pub fn trace(&self, quantity: &str) -> Option<&QuantityTrace> {
        self.quantities.get(quantity)
    }

    /// All traces in registration order.
    pub fn traces(&self) -> impl Iterator<Item = (&String, &QuantityTrace)> {
        self.quantities.iter()
    }
}

/// Parameters of one sampling fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingFixtureParams {
    /// Fixture label; also the results subdirectory name.
    pub label: String,
    /// Sampling configuration.
    pub sampling_params: SamplingParams,
    /// Completion check configuration.
    pub completion_check_params: CompletionCheckParams,
    /// Results destination; nothing is written when absent.
    #[serde(default)]
    pub results_dir: Option<PathBuf>,
}

/// A sampling fixture: scheduled sampling plus completion checking.
pub struct SamplingFixture {
    params: SamplingFixtureParams,
    sampler: Sampler,
    samples_at_last_check: usize,
    last_result: CompletionCheckResult,
}

impl SamplingFixture {
    /// Creates an idle fixture.
    pub fn new(params: SamplingFixtureParams) -> Self {
        Self {
            params,
            sampler: Sampler::default(),
            samples_at_last_check: 0,
            last_result: CompletionCheckResult::default(),
        }
    }

    /// Fixture parameters.
    pub fn params(&self) -> &SamplingFixtureParams {
        &self.params
    }

    /// The observation store.
    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    /// Latest completion-check result.
    pub fn completion(&self) -> &CompletionCheckResult {
        &self.last_result
    }

    /// Resets for a new run, validating quantities against `functions`.
    pub fn reset(&mut self, functions: &SamplingFunctionMap) -> Result<(), CemcError> {
        for quantity in &self.params.sampling_params.quantities {
            if !functions.contains_key(quantity) {
                return Err(CemcError::Consistency(
                    ErrorInfo::new("unknown-quantity", "no sampling function with this name")
                        .with_context("quantity", quantity.clone())
                        .with_context("fixture", self.params.label.clone()),
                ));
            }
        }
        self.sampler = Sampler::new(
            self.params
                .sampling_params
                .quantities
                .iter()
                .map(|name| &functions[name]),
        );
        self.samples_at_last_check = 0;
        self.last_result = CompletionCheckResult::default();
        Ok(())
    }

    /// Takes every due sample and re-checks completion at the configured
    /// cadence. Returns true when the fixture considers the run complete.
    pub fn advance(
        &mut self,
        ctx: &SampleContext<'_>,
        functions: &SamplingFunctionMap,
    ) -> Result<bool, CemcError> {
        let counter = ctx.clock.counter(self.params.sampling_params.mode);
        while let Some(position) = self
            .params
            .sampling_params
            .schedule
            .position(self.sampler.n_samples())
        {
            if counter < position {
                break;
            }
            self.take_sample(ctx, functions)?;
        }

        let check_period = self.params.completion_check_params.check_period.max(1) as usize;
        if self.sampler.n_samples() >= self.samples_at_last_check + check_period
            || self.hard_cap_reached(ctx)
        {
            self.samples_at_last_check = self.sampler.n_samples();
            self.last_result = check_completion(
                &self.sampler,
                &ctx.clock,
                self.params.sampling_params.mode,
                &self.params.completion_check_params,
            );
        }
        Ok(self.last_result.complete)
    }

    fn hard_cap_reached(&self, ctx: &SampleContext<'_>) -> bool {
        let cutoff = &self.params.completion_check_params.cutoff;
        let counter = ctx.clock.counter(self.params.sampling_params.mode);
        cutoff.max_count.is_some_and(|max| counter >= max)
            || ctx
                .clock
                .time
                .zip(cutoff.max_time)
                .is_some_and(|(time, max)| time >= max)
    }

    fn take_sample(
        &mut self,
        ctx: &SampleContext<'_>,
        functions: &SamplingFunctionMap,
    ) -> Result<(), CemcError> {
        for quantity in &self.params.sampling_params.quantities {
            let function = &functions[quantity];
            let values = (function.function)(ctx)?;
            if values.iter().any(|v| !v.is_finite()) {
                return Err(CemcError::Numeric(
                    ErrorInfo::new("nan-sample", "sampling function produced a non-finite value")
                        .with_context("quantity", quantity.clone()),
                ));
            }
            if let Some(trace) = self.sampler.quantities.get_mut(quantity) {
                trace.observations.push(values);
            }
        }
        self.sampler
            .sample_count
            .push(ctx.clock.counter(self.params.sampling_params.mode));
        self.sampler.sample_time.push(ctx.clock.time.unwrap_or(0.0));
        self.sampler.sample_weight.push(1.0);
        if self.params.sampling_params.save_trajectory {
            self.sampler.trajectory.push(ctx.state.occupation.clone());
        }
        Ok(())
    }
}
