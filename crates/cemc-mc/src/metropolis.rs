//! Occupation Metropolis kernel.

use cemc_core::{CemcError, ErrorInfo, RngHandle};

use crate::occ_location::{OccEvent, OccLocation, OccSwap};
use crate::potential::Potential;
use crate::run_manager::{RunCounters, RunManager};
use crate::sampling::{SampleClock, SampleContext};
use crate::state::State;

/// Runs occupation Metropolis until the run manager signals completion.
///
/// One step is one proposal; one pass is `mol_size` steps. The acceptance
/// rule is Metropolis: accept when the potential change is non-positive,
/// otherwise with probability `exp(-beta * delta)`; both the RNG draw and
/// the exponential are skipped for downhill moves. Proposals are drawn in
/// a fixed order from the single `rng` stream, so the seed reproduces the
/// run.
#[allow(clippy::too_many_arguments)]
pub fn occupation_metropolis<P, F>(
    state: &mut State,
    occ_location: &mut OccLocation,
    potential: &P,
    beta: f64,
    swaps: &[OccSwap],
    propose: F,
    rng: &mut RngHandle,
    run_manager: &mut RunManager,
) -> Result<RunCounters, CemcError>
where
    P: Potential + ?Sized,
    F: Fn(&OccLocation, &[OccSwap], &mut RngHandle) -> Result<OccEvent, CemcError>,
{
    let mol_size = occ_location.mol_size().max(1) as f64;
    let mut counters = RunCounters::default();
    loop {
        let clock = SampleClock {
            step: counters.n_steps,
            pass: counters.n_steps as f64 / mol_size,
            time: None,
        };
        let complete = {
            let ctx = SampleContext {
                state,
                occ_location: Some(occ_location),
                clock,
            };
            run_manager.update(&ctx)?
        };
        if complete {
            break;
        }

        let event = propose(occ_location, swaps, rng)?;
        let delta = potential.occ_delta_extensive_value(
            &state.occupation,
            &event.linear_site_index,
            &event.new_occ,
        );
        if !delta.is_finite() {
            return Err(CemcError::Numeric(
                ErrorInfo::new("non-finite-energy", "potential delta is not finite")
                    .with_context("step", counters.n_steps.to_string()),
            ));
        }
        let accept = delta <= 0.0 || rng.uniform_f64() < (-beta * delta).exp();
        if accept {
            occ_location.apply(&event, &mut state.occupation)?;
            counters.n_accept += 1;
        } else {
            counters.n_reject += 1;
        }
        counters.n_steps += 1;
    }
    Ok(counters)
}
