//! The per-cell germline chart: six orthogonal regions driven by one
//! update trigger per simulation step, eight under the spatial-threshold
//! fate model.
//!
//! The trigger fans out to the regions in [`UPDATE_ORDER`]; charts without
//! effector regions skip those two entries. Regions read
//! their peers as plain fields, so a region sees the peers earlier in the
//! order as already updated this step and the later ones as they were at the
//! end of the previous step. The order runs against the signalling cascade
//! (GLP1 → LAG1 → GLD1/GLD2 → cell cycle), so each level of the cascade
//! reacts to its upstream regulator one step late.

use germline_common::{FateModel, SimClock, SimParams};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::durations::{mean_durations, noisy_duration};
use super::regions::{
    ActiveStates, CyclePhase, Effector, Fate, Gld1, Gld2, Glp1, LeafState, Lag1, Region, StateBits,
};
use crate::annotations::{keys, phase_codes, CellData};
use crate::error::GermlineError;

/// Fixed fan-out order of the per-step update.
pub const UPDATE_ORDER: [Region; 8] = [
    Region::CellCycle,
    Region::Differentiation,
    Region::OocyteEffector,
    Region::SpermEffector,
    Region::Gld2,
    Region::Gld1,
    Region::Lag1,
    Region::Glp1,
];

/// Sperm-precursor divisions performed by a terminal sperm cell.
const SPERMATOCYTE_DIVISIONS: u32 = 2;

/// Chart-level variables shared by the regions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChartVariables {
    pub time_in_phase: f64,
    /// Duration sampled on entry to the current cell-cycle phase.
    pub phase_duration: f64,
    pub spermatocyte_divisions: u32,
    pub sperm_development_delay: f64,
    /// Fate read from the effectors on entry to late meiosis.
    pub commitment: Commitment,
    /// Mean G1 and S lengths sampled on entry to meiosis.
    pub meiotic_g1: f64,
    pub meiotic_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Commitment {
    #[default]
    Undecided,
    Sperm,
    Oocyte,
}

/// What a chart update asks of its owning cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChartEvents {
    pub division_requested: bool,
}

/// Everything a leaf reaction may read or write besides the chart itself.
pub struct ChartContext<'a> {
    pub data: &'a mut CellData,
    pub params: &'a SimParams,
    pub clock: SimClock,
    pub rng: &'a mut StdRng,
}

impl ChartContext<'_> {
    fn time(&self) -> f64 {
        self.clock.time()
    }

    fn dt(&self) -> f64 {
        self.clock.dt
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GermlineChart {
    pub states: ActiveStates,
    pub vars: ChartVariables,
}

impl GermlineChart {
    /// Default leaves and zeroed variables, no entry actions run.
    pub fn fresh() -> Self {
        GermlineChart { states: ActiveStates::default(), vars: ChartVariables::default() }
    }

    /// A fresh chart for the configured fate model with the default
    /// cell-cycle leaf entered.
    pub fn initiate(ctx: &mut ChartContext) -> Result<Self, GermlineError> {
        let mut chart = GermlineChart {
            states: ActiveStates::initial(ctx.params.fate_model),
            vars: ChartVariables::default(),
        };
        chart.enter_cycle(CyclePhase::MitosisG1, ctx)?;
        Ok(chart)
    }

    /// Restores a chart from its persisted bitset and variables.
    pub fn from_parts(bits: StateBits, vars: ChartVariables) -> Result<Self, GermlineError> {
        Ok(GermlineChart { states: ActiveStates::decode(bits)?, vars })
    }

    /// Copies active leaves and variables into `fresh`.
    pub fn copy_into(&self, fresh: &mut GermlineChart) {
        fresh.states = self.states;
        fresh.vars = self.vars.clone();
    }

    pub fn encode(&self) -> StateBits {
        self.states.encode()
    }

    pub fn is_active(&self, leaf: LeafState) -> bool {
        self.states.is_active(leaf)
    }

    /// Forced transition into `leaf`, running its entry action.
    pub fn go_to(&mut self, leaf: LeafState, ctx: &mut ChartContext) -> Result<(), GermlineError> {
        match leaf {
            LeafState::Cycle(phase) => self.enter_cycle(phase, ctx),
            LeafState::Fate(fate) => {
                self.enter_fate(fate, ctx);
                Ok(())
            }
            other => {
                self.states.set(other);
                Ok(())
            }
        }
    }

    /// The once-per-step trigger.
    pub fn update(&mut self, ctx: &mut ChartContext) -> Result<ChartEvents, GermlineError> {
        let mut events = ChartEvents::default();
        for region in UPDATE_ORDER {
            match region {
                Region::CellCycle => self.react_cycle(ctx, &mut events)?,
                Region::Differentiation => self.react_fate(ctx, &mut events),
                Region::OocyteEffector => self.react_oocyte_effector(ctx),
                Region::SpermEffector => self.react_sperm_effector(ctx),
                Region::Gld2 => self.react_gld2(),
                Region::Gld1 => self.react_gld1(),
                Region::Lag1 => self.react_lag1(ctx),
                Region::Glp1 => self.react_glp1(ctx),
            }
        }
        Ok(events)
    }

    // --- Entry actions ---

    fn enter_cycle(&mut self, phase: CyclePhase, ctx: &mut ChartContext) -> Result<(), GermlineError> {
        self.states.cycle = phase;
        self.vars.time_in_phase = 0.0;
        let means = mean_durations(ctx.time(), ctx.params);
        let cv = ctx.params.phase_stochasticity;

        let (duration, code, dna) = match phase {
            CyclePhase::MitosisG1 => (noisy_duration(means.g1, cv, ctx.rng)?, phase_codes::G1, 1.0),
            CyclePhase::MitosisS => (means.s, phase_codes::S, 1.0),
            CyclePhase::MitosisG2 => (noisy_duration(means.g2, cv, ctx.rng)?, phase_codes::G2, 2.0),
            CyclePhase::MitosisM => (means.m, phase_codes::M, 2.0),
            CyclePhase::ExitedG1 => (means.g1, phase_codes::G1, 1.0),
            CyclePhase::MeioticS => (means.s, phase_codes::MEIOTIC_S, 1.0),
            CyclePhase::Meiosis if is_spatial(ctx) => {
                self.vars.meiotic_g1 = means.g1;
                self.vars.meiotic_s = means.s;
                (0.0, phase_codes::G1, 1.0)
            }
            CyclePhase::Meiosis => (0.0, phase_codes::MEIOSIS, 2.0),
        };
        self.vars.phase_duration = duration;
        ctx.data.set(keys::CELL_CYCLE_PHASE, code);
        ctx.data.set(keys::DNA_CONTENT, dna);

        let inhibitable = match phase {
            CyclePhase::MitosisG1 => ctx.params.contact_inhibition_g1,
            CyclePhase::MitosisG2 => ctx.params.contact_inhibition_g2,
            _ => false,
        };
        if inhibitable && ctx.time() > ctx.params.contact_inhibition_after {
            ctx.data.set(keys::ARRESTED_FOR, 0.0);
        }
        Ok(())
    }

    fn enter_fate(&mut self, fate: Fate, ctx: &mut ChartContext) {
        self.states.fate = fate;
        match fate {
            Fate::Precursor => {}
            Fate::SpermFated => {
                ctx.data.set_flag(keys::SPERM_FATED, true);
                self.vars.sperm_development_delay = 0.0;
            }
            Fate::OocyteFated => ctx.data.set_flag(keys::OOCYTE_FATED, true),
            Fate::Sperm => ctx.data.set_flag(keys::DIFFERENTIATION_SPERM, true),
            Fate::Oocyte => ctx.data.set_flag(keys::DIFFERENTIATION_OOCYTE, true),
            Fate::EarlyMeiosis => {}
            Fate::LateMeiosis => {
                ctx.data.set(keys::CELL_CYCLE_PHASE, phase_codes::MEIOSIS);
                self.vars.sperm_development_delay = 0.0;
                self.vars.commitment = Commitment::Undecided;
                if let Some(effectors) = self.states.effectors {
                    if effectors.sperm == Effector::Active {
                        self.vars.commitment = Commitment::Sperm;
                        ctx.data.set_flag(keys::SPERM_FATED, true);
                    } else if effectors.oocyte == Effector::Active {
                        self.vars.commitment = Commitment::Oocyte;
                        ctx.data.set_flag(keys::OOCYTE_FATED, true);
                    }
                }
            }
        }
        if fate.is_terminal() && is_spatial(ctx) {
            ctx.data.set(keys::CELL_CYCLE_PHASE, phase_codes::MEIOSIS);
        }
    }

    // --- Cell-cycle region ---

    fn react_cycle(&mut self, ctx: &mut ChartContext, events: &mut ChartEvents) -> Result<(), GermlineError> {
        let dt = ctx.dt();
        let duration = self.vars.phase_duration;
        match self.states.cycle {
            CyclePhase::MitosisG1 => {
                self.advance_unless_arrested(ctx.params.contact_inhibition_g1, ctx);
                let meiotic_entry = self.states.gld2 == Gld2::Active || self.states.gld1 == Gld1::Active;
                if self.vars.time_in_phase >= duration {
                    self.enter_cycle(CyclePhase::MitosisS, ctx)?;
                } else if ctx.time() > ctx.params.proliferation_exit_after && meiotic_entry {
                    let exit = if is_spatial(ctx) { CyclePhase::Meiosis } else { CyclePhase::ExitedG1 };
                    self.enter_cycle(exit, ctx)?;
                }
            }
            CyclePhase::MitosisS => {
                ctx.data.set(keys::DNA_CONTENT, 1.0 + ramp(self.vars.time_in_phase, duration));
                self.vars.time_in_phase += dt;
                if self.vars.time_in_phase >= duration {
                    self.enter_cycle(CyclePhase::MitosisG2, ctx)?;
                }
            }
            CyclePhase::MitosisG2 => {
                self.advance_unless_arrested(ctx.params.contact_inhibition_g2, ctx);
                if self.vars.time_in_phase >= duration {
                    if !ctx.data.is_leader() {
                        events.division_requested = true;
                    }
                    self.enter_cycle(CyclePhase::MitosisM, ctx)?;
                }
            }
            CyclePhase::MitosisM => {
                self.vars.time_in_phase += dt;
                ctx.data.set(keys::DNA_CONTENT, 2.0 - ramp(self.vars.time_in_phase, duration));
                if self.vars.time_in_phase >= duration {
                    self.enter_cycle(CyclePhase::MitosisG1, ctx)?;
                }
            }
            CyclePhase::ExitedG1 => {
                self.vars.time_in_phase += dt;
                if self.vars.time_in_phase > duration {
                    self.enter_cycle(CyclePhase::MeioticS, ctx)?;
                }
            }
            CyclePhase::MeioticS => {
                self.vars.time_in_phase += dt;
                ctx.data.set(keys::DNA_CONTENT, 1.0 + ramp(self.vars.time_in_phase, duration));
                if self.vars.time_in_phase > duration {
                    self.enter_cycle(CyclePhase::Meiosis, ctx)?;
                }
            }
            CyclePhase::Meiosis if is_spatial(ctx) => {
                self.vars.time_in_phase += dt;
                if self.states.fate == Fate::EarlyMeiosis {
                    self.track_meiotic_progress(ctx);
                }
            }
            CyclePhase::Meiosis => {
                if !self.states.fate.is_terminal() {
                    grow_meiotic(ctx);
                }
            }
        }
        Ok(())
    }

    /// Reports the G1, meiotic S and prophase stretches of early meiosis
    /// through the phase and DNA annotations.
    fn track_meiotic_progress(&self, ctx: &mut ChartContext) {
        let elapsed = self.vars.time_in_phase;
        let (g1, s) = (self.vars.meiotic_g1, self.vars.meiotic_s);
        if elapsed < g1 {
            ctx.data.set(keys::CELL_CYCLE_PHASE, phase_codes::G1);
            ctx.data.set(keys::DNA_CONTENT, 1.0);
        } else if elapsed > g1 && elapsed < g1 + s {
            ctx.data.set(keys::CELL_CYCLE_PHASE, phase_codes::MEIOTIC_S);
            ctx.data.set(keys::DNA_CONTENT, 1.0 + ramp(elapsed - g1, s));
        } else if elapsed > g1 + s {
            ctx.data.set(keys::CELL_CYCLE_PHASE, phase_codes::MEIOSIS);
            ctx.data.set(keys::DNA_CONTENT, 2.0);
        }
    }

    /// Advances the phase timer unless contact inhibition holds the cell this step.
    fn advance_unless_arrested(&mut self, enabled: bool, ctx: &mut ChartContext) {
        if enabled && is_compressed(ctx) {
            ctx.data.add(keys::ARRESTED_FOR, ctx.dt());
        } else {
            self.vars.time_in_phase += ctx.dt();
        }
    }

    // --- Differentiation region ---

    fn react_fate(&mut self, ctx: &mut ChartContext, events: &mut ChartEvents) {
        let dt = ctx.dt();
        match self.states.fate {
            Fate::Precursor => {
                let in_meiosis = self.states.cycle == CyclePhase::Meiosis;
                let decide = match ctx.params.fate_model {
                    FateModel::Coupled => in_meiosis,
                    FateModel::Uncoupled => {
                        ctx.time() > ctx.params.proliferation_exit_after
                            && ctx.data.distance_from_leader() > ctx.params.uncoupled_fate_distance
                    }
                    FateModel::SpatialThreshold => false,
                };
                if in_meiosis && is_spatial(ctx) {
                    self.enter_fate(Fate::EarlyMeiosis, ctx);
                } else if decide {
                    let fate = if ctx.time() < ctx.params.commitment_time {
                        Fate::SpermFated
                    } else {
                        Fate::OocyteFated
                    };
                    self.enter_fate(fate, ctx);
                }
            }
            Fate::SpermFated => {
                self.vars.sperm_development_delay += dt;
                if self.vars.sperm_development_delay > ctx.params.sperm_maturation_delay {
                    self.enter_fate(Fate::Sperm, ctx);
                }
            }
            Fate::OocyteFated => {
                if ctx.data.distance_from_leader() > ctx.params.oocyte_growth_min_distance {
                    let limit = ctx.data.value(keys::MAX_RADIUS) - ctx.params.radius_margin;
                    grow_radius(ctx.data, ctx.params.oocyte_growth_rate * dt, limit);
                }
                if ctx.data.radius() > ctx.params.oocyte_commit_radius {
                    self.enter_fate(Fate::Oocyte, ctx);
                }
            }
            Fate::Sperm => {
                if self.vars.spermatocyte_divisions < SPERMATOCYTE_DIVISIONS {
                    let radius = ctx.data.radius() / ctx.params.sperm_division_ratio;
                    ctx.data.set(keys::RADIUS, radius);
                    self.vars.spermatocyte_divisions += 1;
                    events.division_requested = true;
                }
            }
            Fate::EarlyMeiosis => {
                if ctx.data.value(keys::CELL_CYCLE_PHASE) == phase_codes::MEIOSIS {
                    self.enter_fate(Fate::LateMeiosis, ctx);
                }
            }
            Fate::LateMeiosis => {
                self.vars.sperm_development_delay += dt;
                grow_meiotic(ctx);
                let distance = ctx.data.distance_from_leader();
                let commitment = self.vars.commitment;
                match commitment {
                    Commitment::Sperm if self.vars.sperm_development_delay > ctx.params.sperm_maturation_delay => {
                        self.enter_fate(Fate::Sperm, ctx)
                    }
                    Commitment::Oocyte if distance > ctx.params.oocyte_growth_min_distance => {
                        self.enter_fate(Fate::Oocyte, ctx)
                    }
                    _ => {}
                }
            }
            Fate::Oocyte => {
                if is_spatial(ctx) && ctx.data.distance_from_leader() > ctx.params.oocyte_growth_min_distance {
                    let limit = ctx.data.value(keys::MAX_RADIUS) - ctx.params.radius_margin;
                    grow_radius(ctx.data, ctx.params.oocyte_growth_rate * dt, limit);
                }
            }
        }
    }

    // --- Effector regions ---

    fn react_oocyte_effector(&mut self, ctx: &ChartContext) {
        let time = ctx.time();
        let commitment = ctx.params.commitment_time;
        if let Some(effectors) = self.states.effectors.as_mut() {
            effectors.oocyte = match effectors.oocyte {
                Effector::Inactive if time > commitment => Effector::Active,
                Effector::Active if time < commitment => Effector::Inactive,
                current => current,
            };
        }
    }

    fn react_sperm_effector(&mut self, ctx: &ChartContext) {
        let time = ctx.time();
        let commitment = ctx.params.commitment_time;
        if let Some(effectors) = self.states.effectors.as_mut() {
            effectors.sperm = match effectors.sperm {
                Effector::Inactive if time < commitment => Effector::Active,
                Effector::Active if time > commitment => Effector::Inactive,
                current => current,
            };
        }
    }

    // --- Signalling regions ---

    fn react_gld2(&mut self) {
        self.states.gld2 = match (self.states.gld2, self.states.lag1) {
            (Gld2::Inactive, Lag1::Inactive) => Gld2::Active,
            (Gld2::Active, Lag1::Active) => Gld2::Inactive,
            (current, _) => current,
        };
    }

    fn react_gld1(&mut self) {
        self.states.gld1 = match (self.states.gld1, self.states.lag1) {
            (Gld1::Inactive, Lag1::Inactive) => Gld1::Active,
            (Gld1::Active, Lag1::Active) => Gld1::Inactive,
            (current, _) => current,
        };
    }

    fn react_lag1(&mut self, ctx: &ChartContext) {
        let signalling = if is_spatial(ctx) { Glp1::Active } else { Glp1::Bound };
        self.states.lag1 = if self.states.glp1 == signalling { Lag1::Active } else { Lag1::Inactive };
    }

    /// Under the spatial-threshold model a bound receptor passes through
    /// `Inactive` before it signals.
    fn react_glp1(&mut self, ctx: &ChartContext) {
        let distance = ctx.data.distance_from_leader();
        let beyond_zone = distance > ctx.params.proliferative_zone_length;
        self.states.glp1 = match self.states.glp1 {
            Glp1::Unbound if distance < ctx.params.ligand_binding_range => Glp1::Bound,
            Glp1::Bound if is_spatial(ctx) => Glp1::Inactive,
            Glp1::Bound if beyond_zone => Glp1::Absent,
            Glp1::Inactive => Glp1::Active,
            Glp1::Active if beyond_zone => Glp1::Absent,
            current => current,
        };
    }
}

/// Fraction of a phase elapsed, 0 for zero-length phases.
fn ramp(time_in_phase: f64, duration: f64) -> f64 {
    if duration > 0.0 {
        (time_in_phase / duration).min(1.0)
    } else {
        0.0
    }
}

fn is_spatial(ctx: &ChartContext) -> bool {
    ctx.params.fate_model == FateModel::SpatialThreshold
}

/// Meiotic growth, capped by the tube and the meiotic radius ceiling.
fn grow_meiotic(ctx: &mut ChartContext) {
    let limit = (ctx.data.value(keys::MAX_RADIUS) - ctx.params.radius_margin).min(ctx.params.max_meiotic_radius);
    let increment = ctx.params.meiotic_growth_rate * ctx.dt();
    grow_radius(ctx.data, increment, limit);
}

fn grow_radius(data: &mut CellData, increment: f64, limit: f64) {
    let radius = data.radius();
    if radius < limit {
        data.set(keys::RADIUS, (radius + increment).min(limit));
    }
}

/// Compressed volume below the configured fraction of the free volume.
fn is_compressed(ctx: &ChartContext) -> bool {
    let threshold = ctx.params.compression_threshold;
    if ctx.time() <= ctx.params.contact_inhibition_after || threshold >= 1.0 {
        return false;
    }
    let radius = ctx.data.radius();
    let free_volume = 4.0 / 3.0 * PI * radius.powi(3);
    let volume = ctx.data.get(keys::VOLUME).unwrap_or(free_volume);
    volume < threshold * free_volume
}
