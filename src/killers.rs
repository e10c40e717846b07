use germline_common::{SimClock, SimParams};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::Rng;

use crate::annotations::keys;
use crate::population::{Cell, Population};

/// Pairs one mature oocyte with one sperm in the spermatheca each step.
#[derive(Debug, Clone)]
pub struct FertilisationKiller {
    spermatheca_length: f64,
    active_after: f64,
    min_oocyte_radius: f64,
}

impl FertilisationKiller {
    pub fn new(params: &SimParams) -> Self {
        FertilisationKiller {
            spermatheca_length: params.spermatheca_length,
            active_after: params.fertilisation_after,
            min_oocyte_radius: params.min_fertilisable_radius,
        }
    }

    fn in_spermatheca(&self, cell: &Cell, gonad_length: f64) -> bool {
        gonad_length - cell.data.distance_from_leader() <= self.spermatheca_length
    }

    fn is_fertilisable_oocyte(&self, cell: &Cell, gonad_length: f64) -> bool {
        cell.data.flag(keys::DIFFERENTIATION_OOCYTE)
            && !cell.is_dying()
            && self.in_spermatheca(cell, gonad_length)
            && cell.data.radius() > self.min_oocyte_radius
    }

    fn is_fertilising_sperm(&self, cell: &Cell, gonad_length: f64) -> bool {
        cell.data.flag(keys::DIFFERENTIATION_SPERM) && !cell.is_dying() && self.in_spermatheca(cell, gonad_length)
    }

    /// Marks the first eligible oocyte and the first eligible sperm for
    /// apoptosis. Returns their ids `(oocyte, sperm)` if a pair was found.
    pub fn check_and_label(&self, population: &mut Population, clock: &SimClock) -> Option<(u64, u64)> {
        let time = clock.time();
        if time <= self.active_after {
            return None;
        }
        let gonad_length = population.max_distance_from_leader();

        let cells = population.cells();
        let oocyte = cells.iter().position(|c| self.is_fertilisable_oocyte(c, gonad_length))?;
        let sperm = cells.iter().position(|c| self.is_fertilising_sperm(c, gonad_length))?;

        let cells = population.cells_mut();
        cells[oocyte].start_apoptosis(time);
        cells[sperm].start_apoptosis(time);
        let pair = (cells[oocyte].id, cells[sperm].id);
        info!("Fertilisation at t={:.2} h: oocyte {} with sperm {}.", time, pair.0, pair.1);
        Some(pair)
    }
}

/// Random apoptosis of oocyte-fated cells still in the distal arm.
#[derive(Debug, Clone)]
pub struct OocyteAttritionKiller {
    hourly_probability: f64,
    zone: f64,
    active_after: Option<f64>,
}

impl OocyteAttritionKiller {
    pub fn new(params: &SimParams) -> Self {
        OocyteAttritionKiller {
            hourly_probability: params.hourly_death_probability,
            zone: params.attrition_zone,
            active_after: params.attrition_after,
        }
    }

    /// Probability that an eligible cell dies during a step of length `dt`.
    pub fn step_probability(&self, dt: f64) -> f64 {
        1.0 - (1.0 - self.hourly_probability).powf(dt)
    }

    /// Draws once per eligible cell; returns how many cells were marked.
    pub fn check_and_label(&self, population: &mut Population, clock: &SimClock, rng: &mut StdRng) -> usize {
        let time = clock.time();
        if self.active_after.is_some_and(|after| time <= after) {
            return 0;
        }
        let probability = self.step_probability(clock.dt);
        let mut marked = 0;
        for cell in population.cells_mut() {
            if cell.is_dying()
                || !cell.data.flag(keys::OOCYTE_FATED)
                || cell.data.distance_from_leader() >= self.zone
            {
                continue;
            }
            if rng.random::<f64>() < probability {
                cell.start_apoptosis(time);
                debug!("Oocyte-fated cell {} entered apoptosis.", cell.id);
                marked += 1;
            }
        }
        marked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::CellData;
    use crate::statechart::{ChartCellCycle, ChartContext};
    use germline_common::{SimulationConfig, Vec3};
    use rand::SeedableRng;

    fn params() -> SimParams {
        SimulationConfig::default().get_sim_params()
    }

    fn add(population: &mut Population, params: &SimParams, distance: f64, radius: f64, flags: &[&str]) -> u64 {
        let mut rng = StdRng::seed_from_u64(0);
        let mut data = CellData::for_germ_cell(radius, radius, false);
        let mut ctx = ChartContext { data: &mut data, params, clock: SimClock::new(0, params.dt), rng: &mut rng };
        let cycle = ChartCellCycle::new(&mut ctx).unwrap();
        data.set(keys::DISTANCE_FROM_LEADER, distance);
        for flag in flags {
            data.set_flag(flag, true);
        }
        population.add_cell(Vec3::zero(), data, cycle)
    }

    fn adult_clock(params: &SimParams) -> SimClock {
        SimClock::new(((params.fertilisation_after + 1.0) / params.dt) as u32, params.dt)
    }

    #[test]
    fn fertilisation_marks_exactly_one_pair_per_step() {
        let params = params();
        let mut population = Population::node_based();
        add(&mut population, &params, 400.0, 2.5, &[]);
        let big = params.min_fertilisable_radius + 1.0;
        let first_oocyte = add(&mut population, &params, 395.0, big, &[keys::DIFFERENTIATION_OOCYTE]);
        add(&mut population, &params, 392.0, big, &[keys::DIFFERENTIATION_OOCYTE]);
        let first_sperm = add(&mut population, &params, 398.0, 1.0, &[keys::DIFFERENTIATION_SPERM]);
        add(&mut population, &params, 399.0, 1.0, &[keys::DIFFERENTIATION_SPERM]);

        let killer = FertilisationKiller::new(&params);
        let clock = adult_clock(&params);
        assert_eq!(killer.check_and_label(&mut population, &clock), Some((first_oocyte, first_sperm)));
        let dying = population.cells().iter().filter(|c| c.is_dying()).count();
        assert_eq!(dying, 2);

        let second = killer.check_and_label(&mut population, &clock.advanced());
        assert!(matches!(second, Some((o, s)) if o != first_oocyte && s != first_sperm));
        assert_eq!(population.cells().iter().filter(|c| c.is_dying()).count(), 4);
        assert_eq!(killer.check_and_label(&mut population, &clock), None);
    }

    #[test]
    fn fertilisation_waits_for_adulthood_and_the_spermatheca() {
        let params = params();
        let mut population = Population::node_based();
        let big = params.min_fertilisable_radius + 1.0;
        add(&mut population, &params, 400.0, 2.5, &[]);
        add(&mut population, &params, 400.0 - params.spermatheca_length - 1.0, big, &[keys::DIFFERENTIATION_OOCYTE]);
        add(&mut population, &params, 399.0, 1.0, &[keys::DIFFERENTIATION_SPERM]);
        let killer = FertilisationKiller::new(&params);
        assert_eq!(killer.check_and_label(&mut population, &adult_clock(&params)), None);

        let oocyte = add(&mut population, &params, 399.0, big, &[keys::DIFFERENTIATION_OOCYTE]);
        assert_eq!(killer.check_and_label(&mut population, &SimClock::new(0, params.dt)), None);
        let pair = killer.check_and_label(&mut population, &adult_clock(&params));
        assert_eq!(pair.map(|(o, _)| o), Some(oocyte));
    }

    #[test]
    fn small_oocytes_are_not_fertilised() {
        let params = params();
        let mut population = Population::node_based();
        add(&mut population, &params, 100.0, params.min_fertilisable_radius, &[keys::DIFFERENTIATION_OOCYTE]);
        add(&mut population, &params, 100.0, 1.0, &[keys::DIFFERENTIATION_SPERM]);
        let killer = FertilisationKiller::new(&params);
        assert_eq!(killer.check_and_label(&mut population, &adult_clock(&params)), None);
    }

    #[test]
    fn attrition_with_zero_hazard_never_kills() {
        let mut params = params();
        params.hourly_death_probability = 0.0;
        let mut population = Population::node_based();
        for _ in 0..50 {
            add(&mut population, &params, 10.0, 2.5, &[keys::OOCYTE_FATED]);
        }
        let killer = OocyteAttritionKiller::new(&params);
        let mut rng = StdRng::seed_from_u64(1);
        let mut clock = SimClock::new(0, params.dt);
        for _ in 0..100 {
            assert_eq!(killer.check_and_label(&mut population, &clock, &mut rng), 0);
            clock = clock.advanced();
        }
    }

    #[test]
    fn attrition_with_certain_hazard_kills_every_eligible_cell() {
        let mut params = params();
        params.hourly_death_probability = 1.0;
        params.attrition_after = None;
        let mut population = Population::node_based();
        for _ in 0..10 {
            add(&mut population, &params, 10.0, 2.5, &[keys::OOCYTE_FATED]);
        }
        add(&mut population, &params, params.attrition_zone, 2.5, &[keys::OOCYTE_FATED]);
        add(&mut population, &params, 10.0, 2.5, &[keys::SPERM_FATED]);
        let killer = OocyteAttritionKiller::new(&params);
        assert_eq!(killer.step_probability(params.dt), 1.0);
        let mut rng = StdRng::seed_from_u64(2);
        let clock = SimClock::new(1, params.dt);
        assert_eq!(killer.check_and_label(&mut population, &clock, &mut rng), 10);
        assert!(population.cells().iter().take(10).all(|c| c.data.flag(keys::APOPTOSIS)));
        assert!(!population.cells()[10].is_dying());
        assert!(!population.cells()[11].is_dying());
        assert_eq!(killer.check_and_label(&mut population, &clock, &mut rng), 0);
    }

    #[test]
    fn attrition_still_reaches_committed_oocytes() {
        let mut params = params();
        params.hourly_death_probability = 1.0;
        params.attrition_after = None;
        let mut population = Population::node_based();
        let committed = add(&mut population, &params, 10.0, 2.5, &[keys::OOCYTE_FATED, keys::DIFFERENTIATION_OOCYTE]);
        let killer = OocyteAttritionKiller::new(&params);
        let mut rng = StdRng::seed_from_u64(4);
        assert_eq!(killer.check_and_label(&mut population, &SimClock::new(1, params.dt), &mut rng), 1);
        assert!(population.cell(committed).is_some_and(|c| c.is_dying()));
    }

    #[test]
    fn attrition_gate_holds_until_adulthood() {
        let mut params = params();
        params.hourly_death_probability = 1.0;
        params.attrition_after = Some(17.0);
        let mut population = Population::node_based();
        add(&mut population, &params, 10.0, 2.5, &[keys::OOCYTE_FATED]);
        let killer = OocyteAttritionKiller::new(&params);
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(killer.check_and_label(&mut population, &SimClock::new(1, 1.0), &mut rng), 0);
        assert_eq!(killer.check_and_label(&mut population, &SimClock::new(18, 1.0), &mut rng), 1);
    }

    #[test]
    fn step_probability_compounds_to_hourly_rate() {
        let mut params = params();
        params.hourly_death_probability = 0.05;
        let killer = OocyteAttritionKiller::new(&params);
        let per_step = killer.step_probability(0.01);
        let survive_hour = (1.0 - per_step).powi(100);
        assert!((1.0 - survive_hour - 0.05).abs() < 1e-9);
    }
}
