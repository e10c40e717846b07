use serde::{Deserialize, Serialize};

use crate::config::{FateModel, PhaseDurations};

/// Simulation parameters derived from the configuration, consulted by every
/// component during a step. All lengths are in microns, all times in hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Time
    pub dt: f64,
    pub end_time: f64,
    /// Worm age (hours post hatching) at simulated time zero.
    pub worm_age_offset: f64,

    // Path & leader cell
    pub path_spacing: f64,
    pub body_radius: f64,
    pub stretch_rate: f64,
    pub leader_speeds: [f64; 4],
    /// Upper edges of the first three speed windows; the fourth is open-ended.
    pub speed_window_ends: [f64; 3],
    pub turn_gene_age: f64,
    pub halt_gene_age: f64,
    pub push_proximity: f64,
    pub halting_enabled: bool,
    pub stretch_window_start: f64,
    pub stretch_window_end: f64,
    pub spacing_overshoot_tolerance: f64,
    pub turn_completion_band: f64,

    // Tube
    pub tube_initial_radius: f64,
    pub tube_growth_rates: [f64; 3],
    /// Window edges `[e0, e1, e2, e3]`: rate `i` applies on `(e_i, e_{i+1}]`.
    pub tube_growth_window_edges: [f64; 4],
    pub max_movement_per_step: f64,

    // Cell cycle
    pub larval_durations: PhaseDurations,
    pub adult_durations: PhaseDurations,
    /// Simulated time at which the larval-to-adult ramp starts.
    pub adult_transition_start: f64,
    pub adult_transition_span: f64,
    pub phase_stochasticity: f64,
    pub contact_inhibition_g1: bool,
    pub contact_inhibition_g2: bool,
    pub contact_inhibition_after: f64,
    pub compression_threshold: f64,
    pub proliferation_exit_after: f64,

    // Fate
    pub fate_model: FateModel,
    pub ligand_binding_range: f64,
    pub proliferative_zone_length: f64,
    pub commitment_time: f64,
    pub sperm_maturation_delay: f64,
    pub meiotic_growth_rate: f64,
    pub oocyte_growth_rate: f64,
    pub max_meiotic_radius: f64,
    pub oocyte_growth_min_distance: f64,
    pub oocyte_commit_radius: f64,
    pub sperm_division_ratio: f64,
    pub uncoupled_fate_distance: f64,
    pub radius_margin: f64,

    // Removal
    pub hourly_death_probability: f64,
    pub attrition_zone: f64,
    pub attrition_after: Option<f64>,
    pub spermatheca_length: f64,
    pub fertilisation_after: f64,
    pub min_fertilisable_radius: f64,
    pub apoptosis_duration: f64,

    // Population
    pub initial_cell_radius: f64,
    pub division_separation: f64,
}

impl SimParams {
    /// Total step count needed to reach `end_time`.
    pub fn total_steps(&self) -> u32 {
        if self.dt > 0.0 {
            (self.end_time / self.dt).round() as u32
        } else {
            0
        }
    }
}

/// The simulation clock as seen by components during one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimClock {
    pub steps_elapsed: u32,
    pub dt: f64,
}

impl SimClock {
    pub fn new(steps_elapsed: u32, dt: f64) -> Self {
        SimClock { steps_elapsed, dt }
    }

    /// Simulated time in hours.
    pub fn time(&self) -> f64 {
        self.steps_elapsed as f64 * self.dt
    }

    /// The clock one step later.
    pub fn advanced(&self) -> Self {
        SimClock { steps_elapsed: self.steps_elapsed + 1, dt: self.dt }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_time_tracks_steps() {
        let clock = SimClock::new(0, 0.25);
        assert_eq!(clock.time(), 0.0);
        let later = clock.advanced().advanced();
        assert_eq!(later.steps_elapsed, 2);
        assert_eq!(later.time(), 0.5);
    }
}
