use anyhow::Result;
use germline_common::{GonadSnapshot, SimClock, SimParams, SimulationConfig, TrackingRow};
use log::{debug, info, trace};
use rand::prelude::*;

use crate::annotations::CellData;
use crate::boundary::TubeBoundary;
use crate::checkpoint::{CellCheckpoint, SimulationCheckpoint};
use crate::killers::{FertilisationKiller, OocyteAttritionKiller};
use crate::leader::{LeaderCellMover, LeaderCheckpoint};
use crate::path::PathTracker;
use crate::population::Population;
use crate::recorders::{tracking_rows, GonadArmRecorder};
use crate::statechart::{mean_durations, ChartCellCycle, ChartContext};

/// Drives one gonad arm: the leader, the tube around its path, and the germ cells inside.
pub struct GermlineSimulation {
    config: SimulationConfig,
    params: SimParams,
    population: Population,
    leader: LeaderCellMover,
    boundary: TubeBoundary,
    fertilisation: FertilisationKiller,
    attrition: OocyteAttritionKiller,
    gonad_recorder: GonadArmRecorder,
    /// Shared RNG for phase durations, division directions and attrition draws.
    rng: StdRng,
    clock: SimClock,
    recorded_snapshots: Vec<GonadSnapshot>,
    tracking: Vec<TrackingRow>,
}

impl GermlineSimulation {
    /// Creates a simulation with the leader at the end of a straight initial path
    /// and the germ cells queued behind it.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let params = config.get_sim_params();
        let mut rng = StdRng::seed_from_u64(config.initial_conditions.random_seed);

        let (population, leader_init) = place_initial_cells(&config, &params, &mut rng)?;
        let leader = LeaderCellMover::new(leader_init, &params)?;
        let boundary = TubeBoundary::new(&population, params.tube_initial_radius, &params)?;

        let mut sim = Self::assemble(config, params, population, leader, boundary, rng, 0);
        sim.boundary.apply(&mut sim.population, sim.leader.path());
        sim.population.track_volumes();
        info!(
            "Placed {} cells along a {}-point initial path.",
            sim.population.len(),
            sim.leader.path().len()
        );
        Ok(sim)
    }

    /// Rehydrates a run saved with [`GermlineSimulation::checkpoint`].
    pub fn from_checkpoint(config: SimulationConfig, checkpoint: SimulationCheckpoint) -> Result<Self> {
        config.validate()?;
        let params = config.get_sim_params();
        let steps = checkpoint.steps_elapsed;
        let rng = StdRng::seed_from_u64(config.initial_conditions.random_seed.wrapping_add(steps as u64));

        let leader = LeaderCellMover::new(checkpoint.leader, &params)?;
        let cells = checkpoint
            .cells
            .into_iter()
            .map(CellCheckpoint::restore)
            .collect::<Result<Vec<_>, _>>()?;
        let population = Population::from_cells(cells, checkpoint.next_cell_id);
        let boundary = TubeBoundary::new(&population, checkpoint.tube_radius, &params)?;

        info!("Resumed from checkpoint at step {} with {} cells.", steps, population.len());
        Ok(Self::assemble(config, params, population, leader, boundary, rng, steps))
    }

    fn assemble(
        config: SimulationConfig,
        params: SimParams,
        population: Population,
        leader: LeaderCellMover,
        boundary: TubeBoundary,
        rng: StdRng,
        steps_elapsed: u32,
    ) -> Self {
        Self {
            fertilisation: FertilisationKiller::new(&params),
            attrition: OocyteAttritionKiller::new(&params),
            gonad_recorder: GonadArmRecorder::new(),
            clock: SimClock::new(steps_elapsed, params.dt),
            config,
            params,
            population,
            leader,
            boundary,
            rng,
            recorded_snapshots: Vec::new(),
            tracking: Vec::new(),
        }
    }

    /// Advances the simulation by one timestep (`dt`).
    pub fn step(&mut self) -> Result<()> {
        let clock = self.clock;

        // --- 1. Leader migration and path update ---
        let outcome = self.leader.step_population(&mut self.population, &clock, &self.params)?;
        trace!("Leader at {:?} (speed {:.2}).", outcome.position, outcome.speed);

        // --- 2. Tube growth, confinement and volumes (complete for all cells before any chart runs) ---
        self.boundary.grow(&clock, &self.params);
        self.boundary.apply(&mut self.population, self.leader.path());
        self.population.track_volumes();

        // --- 3. Chart updates and divisions ---
        let ready = self.population.update_cycles(&clock, &self.params, &mut self.rng)?;
        for parent_idx in &ready {
            self.population.divide(*parent_idx, self.params.division_separation, &mut self.rng);
        }
        if !ready.is_empty() {
            debug!("{} divisions at t={:.2} h.", ready.len(), clock.time());
        }

        // --- 4. Killers ---
        let mut deaths = 0;
        if self.fertilisation.check_and_label(&mut self.population, &clock).is_some() {
            deaths += 2;
        }
        deaths += self.attrition.check_and_label(&mut self.population, &clock, &mut self.rng);
        self.gonad_recorder.note_deaths(deaths);

        // --- 5. Remove cells whose apoptosis has finished ---
        let removed = self.population.remove_dead(clock.time(), self.params.apoptosis_duration);
        if removed > 0 {
            debug!("Removed {} dead cells.", removed);
        }

        self.clock = clock.advanced();
        Ok(())
    }

    /// Samples gonad metrics (and tracked positions, if enabled) at the current time.
    pub fn record_snapshot(&mut self) -> Result<()> {
        let time = self.clock.time();
        debug!("Recording snapshot at {:.2} h...", time);

        let include_positions = self.config.output.save_positions_in_snapshot;
        let snapshot = self.gonad_recorder.sample(&self.population, time, &self.params, include_positions);
        self.recorded_snapshots.push(snapshot);

        if self.config.output.track_cells {
            let rows = tracking_rows(&self.population, time, self.config.output.tracking_id_interval);
            self.tracking.extend(rows);
        }
        Ok(())
    }

    pub fn checkpoint(&self) -> SimulationCheckpoint {
        SimulationCheckpoint {
            steps_elapsed: self.clock.steps_elapsed,
            leader: self.leader.checkpoint(),
            tube_radius: self.boundary.radius(),
            next_cell_id: self.population.next_id(),
            cells: self.population.cells().iter().map(CellCheckpoint::capture).collect(),
        }
    }

    pub fn get_recorded_snapshots(&self) -> &Vec<GonadSnapshot> {
        &self.recorded_snapshots
    }

    pub fn get_tracking_rows(&self) -> &[TrackingRow] {
        &self.tracking
    }

    pub fn current_cell_count(&self) -> usize {
        self.population.len()
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn leader(&self) -> &LeaderCellMover {
        &self.leader
    }

    pub fn boundary(&self) -> &TubeBoundary {
        &self.boundary
    }

    pub fn clock(&self) -> SimClock {
        self.clock
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}

/// Lays the initial straight path along the ventral side and places the
/// leader at its end with the germ cells behind it.
fn place_initial_cells(
    config: &SimulationConfig,
    params: &SimParams,
    rng: &mut StdRng,
) -> Result<(Population, LeaderCheckpoint)> {
    let init = &config.initial_conditions;
    let path = PathTracker::straight(-params.body_radius, init.initial_path_length_um, params.path_spacing);
    let Some(tip) = path.last_point() else {
        anyhow::bail!(
            "initial_conditions.initial_path_length_um ({}) leaves the initial path empty.",
            init.initial_path_length_um
        );
    };

    let clock = SimClock::new(0, params.dt);
    let mut population = Population::node_based();
    let means = mean_durations(clock.time(), params);

    for i in 0..=init.num_cells_initial {
        let is_leader = i == 0;
        let position = tip.offset_z(-(i as f64) * init.initial_cell_spacing_um);
        let mut data = CellData::for_germ_cell(params.initial_cell_radius, params.tube_initial_radius, is_leader);
        let mut ctx = ChartContext { data: &mut data, params, clock, rng: &mut *rng };
        let mut cycle = ChartCellCycle::new(&mut ctx)?;
        if !is_leader && !init.synchronised_cells {
            let starting_age = ctx.rng.random::<f64>() * means.total();
            cycle.initialise(starting_age, &mut ctx)?;
        }
        population.add_cell(position, data, cycle);
    }

    let leader_init = LeaderCheckpoint {
        turn_gene: false,
        halt_gene: false,
        time_since_last_stretch: 0.0,
        path_points: path.points().to_vec(),
        path_types: path.segment_codes(),
        position: tip,
        point_spacing: params.path_spacing,
    };
    Ok((population, leader_init))
}
