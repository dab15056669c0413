//! Rejection-free (n-fold way) kinetic Monte Carlo.
//!
//! The complete event list instantiates every prim event in every unit
//! cell of the supercell. Each slot caches its current rate in a
//! cumulative-rate tree; after an event fires, only the slots whose
//! dependency sites changed are re-evaluated.

use cemc_clex::{LocalClusterExpansion, OccView};
use cemc_core::{CemcError, ErrorInfo, RngHandle};
use cemc_lattice::Conversions;
use cemc_system::{PrimEvent, SupercellSystem, System};

use crate::occ_location::{OccAtomTraj, OccEvent, OccLocation};
use crate::rate_tree::CumulativeRateTree;
use crate::run_manager::{RunCounters, RunManager};
use crate::sampling::{SampleClock, SampleContext};
use crate::state::State;

/// One prim event flattened out of the system's event-type table.
struct PrimEventRecord {
    event_type: String,
    event: PrimEvent,
    freq: f64,
    kra_clex: LocalClusterExpansion,
}

/// The complete per-supercell event list with cached rates.
pub struct CompleteEventList {
    records: Vec<PrimEventRecord>,
    volume: usize,
    /// Concrete events per slot; site indices are supercell-fixed, so
    /// each slot is built once.
    events: Vec<OccEvent>,
    /// Leaf rates live in the tree; `tree.rate(slot)` reads them back.
    tree: CumulativeRateTree,
    /// Slots whose rate depends on each site.
    site_to_slots: Vec<Vec<u32>>,
}

impl CompleteEventList {
    /// Instantiates every prim event of every event type in every unit
    /// cell of the supercell.
    pub fn new(system: &System, supercell: &SupercellSystem) -> Result<Self, CemcError> {
        let convert = &supercell.convert;
        let volume = convert.volume();

        let mut records = Vec::new();
        for (name, event_type) in system.event_type_data() {
            let kra_clex = supercell.local_clex(&event_type.kra_clex)?.clone();
            for event in &event_type.events {
                if event.equivalent_index >= kra_clex.n_equivalents() {
                    return Err(CemcError::Consistency(
                        ErrorInfo::new(
                            "equivalent-index",
                            "event orientation exceeds local basis set equivalents",
                        )
                        .with_context("event_type", name.clone()),
                    ));
                }
                records.push(PrimEventRecord {
                    event_type: name.clone(),
                    event: event.clone(),
                    freq: event_type.freq,
                    kra_clex: kra_clex.clone(),
                });
            }
        }

        let n_slots = records.len() * volume;
        let mut events = Vec::with_capacity(n_slots);
        let mut site_to_slots = vec![Vec::new(); convert.n_sites()];
        let coordinates: Vec<[f64; 3]> =
            system.prim.basis.iter().map(|site| site.coordinate).collect();

        for (p, record) in records.iter().enumerate() {
            for u in 0..volume {
                let slot = (p * volume + u) as u32;
                let origin = convert.unitcell(u);
                let event = instantiate(&record.event, &origin, convert, &coordinates);

                let mut sites = event.linear_site_index.clone();
                sites.sort_unstable();
                sites.dedup();
                if sites.len() != event.linear_site_index.len() {
                    return Err(CemcError::Consistency(
                        ErrorInfo::new(
                            "supercell-too-small",
                            "event folds onto itself in this supercell",
                        )
                        .with_context("event_type", record.event_type.clone())
                        .with_context("unitcell", u.to_string()),
                    ));
                }

                for &l in &event.linear_site_index {
                    site_to_slots[l].push(slot);
                }
                for dep in record.kra_clex.dependencies(record.event.equivalent_index) {
                    let cell = [
                        origin[0] + dep.offset[0],
                        origin[1] + dep.offset[1],
                        origin[2] + dep.offset[2],
                    ];
                    let l = convert.bijk_to_l(dep.sublattice, &cell);
                    site_to_slots[l].push(slot);
                }
                events.push(event);
            }
        }
        for slots in &mut site_to_slots {
            slots.sort_unstable();
            slots.dedup();
        }

        Ok(Self {
            records,
            volume,
            events,
            tree: CumulativeRateTree::new(n_slots),
            site_to_slots,
        })
    }

    /// Number of event slots.
    pub fn n_slots(&self) -> usize {
        self.events.len()
    }

    /// Sum of every slot rate.
    pub fn total_rate(&self) -> f64 {
        self.tree.total_rate()
    }

    /// The concrete event of `slot`.
    pub fn event(&self, slot: usize) -> &OccEvent {
        &self.events[slot]
    }

    /// Event-type name of `slot`.
    pub fn event_type(&self, slot: usize) -> &str {
        &self.records[slot / self.volume].event_type
    }

    /// Selects the slot containing cumulative rate `u`.
    pub fn select(&self, u: f64) -> usize {
        self.tree.select(u)
    }

    fn compute_rate(&self, slot: usize, occupation: &[u8], beta: f64) -> Result<f64, CemcError> {
        let record = &self.records[slot / self.volume];
        let unitcell = slot % self.volume;
        let event = &self.events[slot];
        let allowed = event
            .linear_site_index
            .iter()
            .zip(&record.event.occ_init)
            .all(|(&l, &occ)| occupation[l] == occ);
        if !allowed {
            return Ok(0.0);
        }
        let occ = OccView::new(occupation);
        let kra = record
            .kra_clex
            .value(record.event.equivalent_index, unitcell, &occ);
        let rate = record.freq * (-beta * kra).exp();
        if !rate.is_finite() || rate < 0.0 {
            return Err(CemcError::Numeric(
                ErrorInfo::new("negative-rate", "event rate is negative or non-finite")
                    .with_context("event_type", record.event_type.clone())
                    .with_context("rate", rate.to_string()),
            ));
        }
        Ok(rate)
    }

    /// Evaluates every slot rate from scratch and rebuilds the tree.
    pub fn initialize_rates(&mut self, occupation: &[u8], beta: f64) -> Result<(), CemcError> {
        for slot in 0..self.n_slots() {
            let rate = self.compute_rate(slot, occupation, beta)?;
            self.tree.update(slot, rate);
        }
        Ok(())
    }

    /// Re-evaluates every slot incident to a site written by `fired` and
    /// updates the tree. Returns the number of slots re-evaluated.
    pub fn update_impacted(
        &mut self,
        fired: &OccEvent,
        occupation: &[u8],
        beta: f64,
    ) -> Result<usize, CemcError> {
        let mut impacted: Vec<u32> = fired
            .linear_site_index
            .iter()
            .flat_map(|&l| self.site_to_slots[l].iter().copied())
            .collect();
        impacted.sort_unstable();
        impacted.dedup();
        for &slot in &impacted {
            let slot = slot as usize;
            let rate = self.compute_rate(slot, occupation, beta)?;
            self.tree.update(slot, rate);
        }
        Ok(impacted.len())
    }

    /// Exact resum of the tree from the cached slot rates, correcting
    /// incremental floating-point drift.
    pub fn resum(&mut self) {
        self.tree.resum();
    }
}

/// Builds the concrete event for one unit cell of a supercell.
fn instantiate(
    prim_event: &PrimEvent,
    origin: &[i64; 3],
    convert: &Conversions,
    coordinates: &[[f64; 3]],
) -> OccEvent {
    let linear_site_index: Vec<usize> = prim_event
        .sites
        .iter()
        .map(|site| {
            let cell = [
                origin[0] + site.offset[0],
                origin[1] + site.offset[1],
                origin[2] + site.offset[2],
            ];
            convert.bijk_to_l(site.sublattice, &cell)
        })
        .collect();
    let atom_traj = prim_event
        .trajectories
        .iter()
        .enumerate()
        .map(|(t, traj)| {
            let from_site = &prim_event.sites[traj.from];
            let to_site = &prim_event.sites[traj.to];
            let cell_delta = prim_event.trajectory_translation(t);
            let from_coord = coordinates[from_site.sublattice];
            let to_coord = coordinates[to_site.sublattice];
            OccAtomTraj {
                from_l: linear_site_index[traj.from],
                to_l: linear_site_index[traj.to],
                displacement: [
                    cell_delta[0] as f64 + to_coord[0] - from_coord[0],
                    cell_delta[1] as f64 + to_coord[1] - from_coord[1],
                    cell_delta[2] as f64 + to_coord[2] - from_coord[2],
                ],
            }
        })
        .collect();
    OccEvent {
        linear_site_index,
        new_occ: prim_event.occ_final.clone(),
        atom_traj,
    }
}

/// Kinetic kernel options.
#[derive(Debug, Clone, Copy)]
pub struct KmcOptions {
    /// Exact tree resum happens every `resum_interval * n_slots` events.
    pub resum_interval: u64,
}

impl Default for KmcOptions {
    fn default() -> Self {
        Self { resum_interval: 1 }
    }
}

/// Runs rejection-free KMC until the run manager signals completion.
///
/// Each iteration selects one event with probability proportional to its
/// rate, advances simulated time by `-ln(xi) / R`, applies the event and
/// re-evaluates the impacted slots.
pub fn kinetic_monte_carlo(
    state: &mut State,
    occ_location: &mut OccLocation,
    event_list: &mut CompleteEventList,
    beta: f64,
    options: &KmcOptions,
    rng: &mut RngHandle,
    run_manager: &mut RunManager,
) -> Result<RunCounters, CemcError> {
    event_list.initialize_rates(&state.occupation, beta)?;
    let mol_size = occ_location.mol_size().max(1) as f64;
    let resum_every = options.resum_interval.max(1) * event_list.n_slots().max(1) as u64;

    let mut counters = RunCounters::default();
    let mut simulated_time = 0.0;
    loop {
        counters.simulated_time = Some(simulated_time);
        let clock = SampleClock {
            step: counters.n_steps,
            pass: counters.n_steps as f64 / mol_size,
            time: Some(simulated_time),
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

        let total = event_list.total_rate();
        if !total.is_finite() {
            return Err(CemcError::Numeric(
                ErrorInfo::new("non-finite-rate", "total event rate is not finite")
                    .with_context("total_rate", total.to_string()),
            ));
        }
        if total <= 0.0 {
            return Err(CemcError::Consistency(ErrorInfo::new(
                "no-allowed-events",
                "every event rate is zero; the configuration is frozen",
            )));
        }

        let slot = event_list.select(rng.uniform_f64() * total);
        let xi = loop {
            let draw = rng.uniform_f64();
            if draw > 0.0 {
                break draw;
            }
        };
        simulated_time += -xi.ln() / total;

        let event = event_list.event(slot).clone();
        occ_location.apply(&event, &mut state.occupation)?;
        event_list.update_impacted(&event, &state.occupation, beta)?;

        counters.n_steps += 1;
        counters.n_accept += 1;
        if counters.n_steps % resum_every == 0 {
            event_list.resum();
        }
    }
    counters.simulated_time = Some(simulated_time);
    Ok(counters)
}
