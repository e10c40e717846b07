use log::trace;
use serde::{Deserialize, Serialize};

use super::chart::{ChartContext, ChartVariables, GermlineChart};
use super::durations::mean_durations;
use super::regions::{CyclePhase, LeafState, StateBits};
use crate::error::GermlineError;

/// Cell-cycle model backed by a germline chart. A division request latches
/// until the owning population performs the division; the chart is frozen
/// while latched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartCellCycle {
    chart: GermlineChart,
    ready_to_divide: bool,
}

impl ChartCellCycle {
    pub fn new(ctx: &mut ChartContext) -> Result<Self, GermlineError> {
        Ok(ChartCellCycle { chart: GermlineChart::initiate(ctx)?, ready_to_divide: false })
    }

    pub fn from_parts(bits: StateBits, vars: ChartVariables, ready_to_divide: bool) -> Result<Self, GermlineError> {
        Ok(ChartCellCycle { chart: GermlineChart::from_parts(bits, vars)?, ready_to_divide })
    }

    /// Places the cell `starting_age` hours into its mitotic cycle so a
    /// freshly seeded population does not divide in lockstep.
    pub fn initialise(&mut self, starting_age: f64, ctx: &mut ChartContext) -> Result<(), GermlineError> {
        let means = mean_durations(ctx.clock.time(), ctx.params);
        let total = means.total();
        let mut age = if total > 0.0 { starting_age.rem_euclid(total) } else { 0.0 };

        let mut phase = CyclePhase::MitosisG1;
        for (candidate, length) in [
            (CyclePhase::MitosisG1, means.g1),
            (CyclePhase::MitosisS, means.s),
            (CyclePhase::MitosisG2, means.g2),
            (CyclePhase::MitosisM, means.m),
        ] {
            phase = candidate;
            if age < length {
                break;
            }
            age -= length;
        }
        self.chart.go_to(LeafState::Cycle(phase), ctx)?;
        self.chart.vars.time_in_phase = age;
        trace!("Initialised chart in {:?} with {:.3} h elapsed.", phase, age);
        Ok(())
    }

    /// Runs the chart for this step unless a division is already pending.
    pub fn ready_to_divide(&mut self, ctx: &mut ChartContext) -> Result<bool, GermlineError> {
        if !self.ready_to_divide {
            let events = self.chart.update(ctx)?;
            self.ready_to_divide = events.division_requested;
        }
        Ok(self.ready_to_divide)
    }

    pub fn is_ready_to_divide(&self) -> bool {
        self.ready_to_divide
    }

    pub fn reset_for_division(&mut self) {
        self.ready_to_divide = false;
    }

    /// The cycle model for a newborn daughter: a fresh chart receiving a copy of this one.
    pub fn create_daughter(&self) -> Self {
        let mut fresh = GermlineChart::fresh();
        self.chart.copy_into(&mut fresh);
        ChartCellCycle { chart: fresh, ready_to_divide: false }
    }

    pub fn chart(&self) -> &GermlineChart {
        &self.chart
    }

    pub fn chart_mut(&mut self) -> &mut GermlineChart {
        &mut self.chart
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{keys, CellData};
    use crate::statechart::regions::{Fate, Gld1, Gld2, Glp1, Lag1};
    use germline_common::{SimClock, SimParams, SimulationConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup() -> (CellData, SimParams, StdRng) {
        let mut params = SimulationConfig::default().get_sim_params();
        params.phase_stochasticity = 0.0;
        params.dt = 0.1;
        (CellData::for_germ_cell(2.5, 6.0, false), params, StdRng::seed_from_u64(5))
    }

    #[test]
    fn starting_age_selects_phase_and_offset() {
        let (mut data, params, mut rng) = setup();
        let mut ctx = ChartContext { data: &mut data, params: &params, clock: SimClock::new(0, 0.1), rng: &mut rng };
        let mut cycle = ChartCellCycle::new(&mut ctx).unwrap();
        // Larval defaults: G1 2, S 5, G2 2, M 0.5.
        cycle.initialise(3.0, &mut ctx).unwrap();
        assert_eq!(cycle.chart().states.cycle, CyclePhase::MitosisS);
        assert!((cycle.chart().vars.time_in_phase - 1.0).abs() < 1e-12);

        cycle.initialise(9.5 + 8.0, &mut ctx).unwrap();
        assert_eq!(cycle.chart().states.cycle, CyclePhase::MitosisG2);
        assert!((cycle.chart().vars.time_in_phase - 1.0).abs() < 1e-12);
    }

    #[test]
    fn latched_division_freezes_the_chart() {
        let (mut data, params, mut rng) = setup();
        data.set(keys::DISTANCE_FROM_LEADER, 5.0);
        let mut ctx = ChartContext { data: &mut data, params: &params, clock: SimClock::new(1, 0.1), rng: &mut rng };
        let mut cycle = ChartCellCycle::new(&mut ctx).unwrap();
        {
            let chart = cycle.chart_mut();
            chart.states.glp1 = Glp1::Bound;
            chart.states.lag1 = Lag1::Active;
            chart.states.gld1 = Gld1::Inactive;
            chart.states.gld2 = Gld2::Inactive;
        }
        cycle.chart_mut().go_to(LeafState::Cycle(CyclePhase::MitosisG2), &mut ctx).unwrap();
        cycle.chart_mut().vars.time_in_phase = 10.0;

        assert!(cycle.ready_to_divide(&mut ctx).unwrap());
        let frozen = cycle.chart().clone();
        assert!(cycle.ready_to_divide(&mut ctx).unwrap());
        assert_eq!(cycle.chart(), &frozen);

        let daughter = cycle.create_daughter();
        cycle.reset_for_division();
        assert!(!cycle.is_ready_to_divide());
        assert!(!daughter.is_ready_to_divide());
        assert_eq!(daughter.chart(), cycle.chart());
        assert_eq!(daughter.chart().states.fate, Fate::Precursor);
    }

    #[test]
    fn persisted_parts_restore_the_cycle() {
        let (mut data, params, mut rng) = setup();
        let mut ctx = ChartContext { data: &mut data, params: &params, clock: SimClock::new(0, 0.1), rng: &mut rng };
        let mut cycle = ChartCellCycle::new(&mut ctx).unwrap();
        cycle.initialise(7.25, &mut ctx).unwrap();
        let restored = ChartCellCycle::from_parts(
            cycle.chart().encode(),
            cycle.chart().vars.clone(),
            cycle.is_ready_to_divide(),
        )
        .unwrap();
        assert_eq!(restored, cycle);
    }
}
