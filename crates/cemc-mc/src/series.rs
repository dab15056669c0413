//! The run-series loop shared by every calculator.

use cemc_core::{run_seed, CemcError, RngHandle};
use cemc_lattice::det;
use cemc_system::System;

use crate::run_manager::{RunCounters, RunManager};
use crate::state::State;
use crate::state_generator::StateGeneratorParams;

/// Site count of the supercell a generator produces states in.
pub fn n_sites(system: &System, generator: &StateGeneratorParams) -> usize {
    let volume = det(generator.transformation_matrix()).unsigned_abs() as usize;
    system.prim.n_sublattices() * volume
}

/// Performs a series of runs, one per generated state.
///
/// Previously completed runs are read from the output directory first, so
/// an interrupted series resumes at the next condition. Each run draws
/// from its own seed substream, making restarted and uninterrupted series
/// bit-identical. A cancelled run ends the series without error; other
/// failures either abort the series or, with `continue_on_error`, are
/// recorded and skipped.
pub fn run_series<F>(
    generator: &StateGeneratorParams,
    run_manager: &mut RunManager,
    master_seed: u64,
    n_sites: usize,
    mut run_one: F,
) -> Result<(), CemcError>
where
    F: FnMut(&mut State, &mut RunManager, &mut RngHandle) -> Result<RunCounters, CemcError>,
{
    generator.validate()?;
    let n_found = run_manager.read_completed_runs()?;
    run_manager
        .log()
        .info(&format!("Found {n_found} completed runs"));
    while !generator.is_complete(&run_manager.completed_runs) {
        let run_index = run_manager.run_index();
        let mut state = generator.next_state(&run_manager.completed_runs, n_sites)?;
        let mut rng = RngHandle::from_seed(run_seed(master_seed, run_index as u64));
        run_manager
            .log()
            .info(&format!("Performing run {}...", run_index + 1));
        match run_one(&mut state, run_manager, &mut rng) {
            Ok(_) => {
                run_manager
                    .log()
                    .info(&format!("Run {} done", run_index + 1));
            }
            Err(err) if err.is_cancelled() => {
                run_manager.log().info("Series cancelled");
                return Ok(());
            }
            Err(err) => {
                run_manager.record_failure(&err, &state);
                if !run_manager.params().continue_on_error {
                    return Err(err);
                }
                run_manager
                    .log()
                    .warn(&format!("Run {} failed: {err}", run_index + 1));
            }
        }
    }
    run_manager.log().info("Series complete");
    Ok(())
}
