#![deny(missing_docs)]
#![doc = "Monte Carlo kernels, occupant tracking, sampling and run management for the CEMC engine."]

/// Results analysis functions (heat capacity, susceptibilities).
pub mod analysis;
/// The canonical calculator.
pub mod canonical;
/// Convergence estimation and completion checks.
pub mod completion;
/// Run-parameters document.
pub mod config;
/// Composition enforcement walks.
pub mod enforce;
/// Rejection-free KMC event list and kernel.
pub mod kmc;
/// The kinetic calculator.
pub mod kinetic;
/// Occupation Metropolis kernel.
pub mod metropolis;
/// Occupant tracking and event proposal.
pub mod occ_location;
/// Canonical and semi-grand potentials.
pub mod potential;
/// Cumulative-rate tree.
pub mod rate_tree;
/// Run management and results persistence.
pub mod run_manager;
/// Sampling fixtures and observation stores.
pub mod sampling;
/// Standard sampling function tables.
pub mod sampling_functions;
/// The semi-grand canonical calculator.
pub mod semi_grand;
/// The run-series loop.
pub mod series;
/// State, conditions and conditions helpers.
pub mod state;
/// State generation for run series.
pub mod state_generator;

pub use canonical::Canonical;
pub use completion::{CompletionCheckParams, CompletionCheckResult, CutoffParams};
pub use config::{CalculationOptions, RunParams};
pub use kinetic::Kinetic;
pub use kmc::{CompleteEventList, KmcOptions};
pub use occ_location::{OccCandidate, OccEvent, OccLocation, OccSwap};
pub use potential::{CanonicalPotential, Potential, SemiGrandPotential};
pub use rate_tree::CumulativeRateTree;
pub use run_manager::{RunCounters, RunData, RunManager, RunManagerParams};
pub use sampling::{
    SampleMode, SampleSchedule, Sampler, SamplingFixture, SamplingFixtureParams, SamplingParams,
};
pub use semi_grand::SemiGrandCanonical;
pub use state::{make_conditions, make_conditions_increment, Conditions, State};
pub use state_generator::{ConfigSource, IncrementalGeneratorParams, StateGeneratorParams};
