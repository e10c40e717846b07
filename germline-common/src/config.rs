use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::SimParams;
use std::path::Path;

// Configuration for timing. All times in hours of simulated development.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub timesteps_per_hour: f64,
    pub end_time_hours: f64,
    pub record_interval_hours: f64,
    /// Worm age (hours post hatching) at simulated time zero.
    #[serde(default = "default_worm_age_offset")]
    pub worm_age_offset_hours: f64,
}

// Initial conditions for the simulation, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InitialConditions {
    pub num_cells_initial: u32,
    pub cell_radius_um: f64,
    #[serde(default = "default_initial_cell_spacing")]
    pub initial_cell_spacing_um: f64,
    #[serde(default = "default_initial_path_length")]
    pub initial_path_length_um: f64,
    pub random_seed: u64,
    /// Start every germ cell at the beginning of G1 instead of a random cycle age.
    #[serde(default)]
    pub synchronised_cells: bool,
    #[serde(default = "default_division_separation")]
    pub division_separation_um: f64,
}

// Leader cell (distal tip cell) migration parameters
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LeaderConfig {
    pub body_radius_um: f64,
    pub stretch_rate_um_per_hr: f64,
    /// Migration speed in each of the four developmental windows.
    pub speeds_um_per_hr: [f64; 4],
    #[serde(default = "default_speed_window_ends")]
    pub speed_window_ends: [f64; 3],
    /// Worm age at which the turn gene switches on.
    pub turn_gene_age: f64,
    /// Worm age at which the halt gene switches on.
    pub halt_gene_age: f64,
    #[serde(default = "default_push_proximity")]
    pub push_proximity_um: f64,
    #[serde(default = "default_true")]
    pub halting_enabled: bool,
    #[serde(default = "default_stretch_window")]
    pub stretch_window: [f64; 2],
    #[serde(default = "default_path_spacing")]
    pub path_spacing_um: f64,
}

// Gonad tube geometry
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TubeConfig {
    pub initial_radius_um: f64,
    pub growth_rates_um_per_hr: [f64; 3],
    #[serde(default = "default_growth_window_edges")]
    pub growth_window_edges: [f64; 4],
    /// Largest displacement a cell is expected to make in one step.
    #[serde(default = "default_max_movement")]
    pub max_movement_per_step_um: f64,
}

/// Mean durations (hours) of the four mitotic cell-cycle phases.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct PhaseDurations {
    pub g1: f64,
    pub s: f64,
    pub g2: f64,
    pub m: f64,
}

impl PhaseDurations {
    pub fn total(&self) -> f64 {
        self.g1 + self.s + self.g2 + self.m
    }

    pub fn scaled(&self, factor: f64) -> Self {
        PhaseDurations {
            g1: self.g1 * factor,
            s: self.s * factor,
            g2: self.g2 * factor,
            m: self.m * factor,
        }
    }

    /// Linear interpolation towards `other`, `fraction` in `[0, 1]`.
    pub fn lerp(&self, other: &PhaseDurations, fraction: f64) -> Self {
        let f = fraction.clamp(0.0, 1.0);
        PhaseDurations {
            g1: self.g1 + (other.g1 - self.g1) * f,
            s: self.s + (other.s - self.s) * f,
            g2: self.g2 + (other.g2 - self.g2) * f,
            m: self.m + (other.m - self.m) * f,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CellCycleConfig {
    #[serde(default = "default_one")]
    pub larval_scale: f64,
    #[serde(default = "default_one")]
    pub adult_scale: f64,
    pub larval: PhaseDurations,
    pub adult: PhaseDurations,
    /// Worm age at which the larval-to-adult duration ramp begins.
    pub adult_transition_age: f64,
    #[serde(default = "default_transition_span")]
    pub adult_transition_span_hours: f64,
    #[serde(default = "default_stochasticity")]
    pub phase_stochasticity: f64,
    #[serde(default)]
    pub contact_inhibition_g1: bool,
    #[serde(default = "default_true")]
    pub contact_inhibition_g2: bool,
    #[serde(default = "default_adult_time")]
    pub contact_inhibition_after: f64,
    pub compression_threshold: f64,
    #[serde(default = "default_one")]
    pub proliferation_exit_after: f64,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FateModel {
    /// Sperm/oocyte decision taken when a cell reaches meiosis.
    Coupled,
    /// Decision taken by position alone, independent of cycle state.
    Uncoupled,
    /// Delayed GLP-1 activation and sperm/oocyte effector regions read in
    /// late meiosis.
    SpatialThreshold,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FateConfig {
    #[serde(default = "default_fate_model")]
    pub model: FateModel,
    #[serde(default = "default_ligand_range")]
    pub ligand_binding_range_um: f64,
    pub proliferative_zone_length_um: f64,
    pub commitment_time: f64,
    pub sperm_maturation_delay_hours: f64,
    pub meiotic_growth_rate_um_per_hr: f64,
    pub oocyte_growth_rate_um_per_hr: f64,
    pub max_meiotic_radius_um: f64,
    #[serde(default = "default_oocyte_growth_distance")]
    pub oocyte_growth_min_distance_um: f64,
    #[serde(default = "default_oocyte_commit_radius")]
    pub oocyte_commit_radius_um: f64,
    #[serde(default = "default_sperm_division_ratio")]
    pub sperm_division_ratio: f64,
    #[serde(default = "default_uncoupled_fate_distance")]
    pub uncoupled_fate_distance_um: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RemovalConfig {
    /// Hourly death probability of oocyte-fated cells outside the attrition zone.
    pub death_rate_per_hr: f64,
    #[serde(default = "default_attrition_zone")]
    pub attrition_zone_um: f64,
    /// When set, attrition only runs after this simulated time.
    #[serde(default)]
    pub attrition_after: Option<f64>,
    #[serde(default = "default_spermatheca_length")]
    pub spermatheca_length_um: f64,
    #[serde(default = "default_adult_time")]
    pub fertilisation_after: f64,
    #[serde(default = "default_min_fertilisable_radius")]
    pub min_fertilisable_radius_um: f64,
    #[serde(default = "default_apoptosis_duration")]
    pub apoptosis_duration_hours: f64,
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    pub save_stats: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
    #[serde(default = "default_true")]
    pub save_gonad_data: bool,
    #[serde(default)]
    pub track_cells: bool,
    #[serde(default = "default_tracking_id_interval")]
    pub tracking_id_interval: u64,
    #[serde(default)]
    pub save_checkpoint: bool,
    /// Include every cell position in each recorded snapshot (can be very large).
    #[serde(default)]
    pub save_positions_in_snapshot: bool,
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub timing: TimingConfig,
    pub initial_conditions: InitialConditions,
    pub leader: LeaderConfig,
    pub tube: TubeConfig,
    pub cell_cycle: CellCycleConfig,
    pub fate: FateConfig,
    pub removal: RemovalConfig,
    pub output: OutputConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            timing: TimingConfig {
                timesteps_per_hour: 100.0,
                end_time_hours: 25.0,
                record_interval_hours: 0.5,
                worm_age_offset_hours: default_worm_age_offset(),
            },
            initial_conditions: InitialConditions {
                num_cells_initial: 16,
                cell_radius_um: 2.5,
                initial_cell_spacing_um: default_initial_cell_spacing(),
                initial_path_length_um: default_initial_path_length(),
                random_seed: 42,
                synchronised_cells: false,
                division_separation_um: default_division_separation(),
            },
            leader: LeaderConfig {
                body_radius_um: 12.5,
                stretch_rate_um_per_hr: 5.0,
                speeds_um_per_hr: [5.0, 10.0, 10.0, 5.0],
                speed_window_ends: default_speed_window_ends(),
                turn_gene_age: 27.0,
                halt_gene_age: 35.0,
                push_proximity_um: default_push_proximity(),
                halting_enabled: true,
                stretch_window: default_stretch_window(),
                path_spacing_um: default_path_spacing(),
            },
            tube: TubeConfig {
                initial_radius_um: 6.0,
                growth_rates_um_per_hr: [0.2, 0.5, 1.0],
                growth_window_edges: default_growth_window_edges(),
                max_movement_per_step_um: default_max_movement(),
            },
            cell_cycle: CellCycleConfig {
                larval_scale: 1.0,
                adult_scale: 1.0,
                larval: PhaseDurations { g1: 2.0, s: 5.0, g2: 2.0, m: 0.5 },
                adult: PhaseDurations { g1: 2.0, s: 5.0, g2: 8.0, m: 0.5 },
                adult_transition_age: 35.0,
                adult_transition_span_hours: default_transition_span(),
                phase_stochasticity: default_stochasticity(),
                contact_inhibition_g1: false,
                contact_inhibition_g2: true,
                contact_inhibition_after: default_adult_time(),
                compression_threshold: 0.8,
                proliferation_exit_after: 1.0,
            },
            fate: FateConfig {
                model: FateModel::Coupled,
                ligand_binding_range_um: default_ligand_range(),
                proliferative_zone_length_um: 60.0,
                commitment_time: 17.0,
                sperm_maturation_delay_hours: 2.0,
                meiotic_growth_rate_um_per_hr: 0.2,
                oocyte_growth_rate_um_per_hr: 1.0,
                max_meiotic_radius_um: 3.5,
                oocyte_growth_min_distance_um: default_oocyte_growth_distance(),
                oocyte_commit_radius_um: default_oocyte_commit_radius(),
                sperm_division_ratio: default_sperm_division_ratio(),
                uncoupled_fate_distance_um: default_uncoupled_fate_distance(),
            },
            removal: RemovalConfig {
                death_rate_per_hr: 0.05,
                attrition_zone_um: default_attrition_zone(),
                attrition_after: None,
                spermatheca_length_um: default_spermatheca_length(),
                fertilisation_after: default_adult_time(),
                min_fertilisable_radius_um: default_min_fertilisable_radius(),
                apoptosis_duration_hours: default_apoptosis_duration(),
            },
            output: OutputConfig {
                base_filename: "germline".to_string(),
                save_stats: true,
                format: Some("json".to_string()),
                save_gonad_data: true,
                track_cells: false,
                tracking_id_interval: default_tracking_id_interval(),
                save_checkpoint: false,
                save_positions_in_snapshot: false,
            },
        }
    }
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config: SimulationConfig = toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML from '{}': {}", path_ref.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects parameter combinations the simulation cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.timing.timesteps_per_hour <= 0.0 {
            anyhow::bail!("timing.timesteps_per_hour must be positive.");
        }
        if self.timing.end_time_hours <= 0.0 {
            anyhow::bail!("timing.end_time_hours must be positive.");
        }
        if self.initial_conditions.num_cells_initial == 0 {
            anyhow::bail!("initial_conditions.num_cells_initial must be greater than 0.");
        }
        if self.initial_conditions.cell_radius_um <= 0.0 {
            anyhow::bail!("initial_conditions.cell_radius_um must be positive.");
        }
        if self.leader.body_radius_um <= 0.0 {
            anyhow::bail!("leader.body_radius_um must be positive.");
        }
        if self.leader.path_spacing_um <= 0.0 {
            anyhow::bail!("leader.path_spacing_um must be positive.");
        }
        if self.leader.stretch_rate_um_per_hr <= 0.0 {
            anyhow::bail!("leader.stretch_rate_um_per_hr must be positive.");
        }
        if self.leader.speeds_um_per_hr.iter().any(|s| *s < 0.0) {
            anyhow::bail!("leader.speeds_um_per_hr must not be negative.");
        }
        if !is_ascending(&self.leader.speed_window_ends) {
            anyhow::bail!("leader.speed_window_ends must be ascending.");
        }
        if self.leader.stretch_window[0] > self.leader.stretch_window[1] {
            anyhow::bail!("leader.stretch_window must be [start, end] with start <= end.");
        }
        if self.tube.initial_radius_um <= self.initial_conditions.cell_radius_um {
            anyhow::bail!("tube.initial_radius_um must exceed initial_conditions.cell_radius_um.");
        }
        if self.tube.growth_rates_um_per_hr.iter().any(|r| *r < 0.0) {
            anyhow::bail!("tube.growth_rates_um_per_hr must not be negative; the tube never shrinks.");
        }
        if !is_ascending(&self.tube.growth_window_edges) {
            anyhow::bail!("tube.growth_window_edges must be ascending.");
        }
        for (name, durations) in [("larval", &self.cell_cycle.larval), ("adult", &self.cell_cycle.adult)] {
            if [durations.g1, durations.s, durations.g2, durations.m].iter().any(|d| *d < 0.0) {
                anyhow::bail!("cell_cycle.{} phase durations must not be negative.", name);
            }
        }
        if self.cell_cycle.phase_stochasticity < 0.0 {
            anyhow::bail!("cell_cycle.phase_stochasticity must not be negative.");
        }
        if !(0.0..=1.0).contains(&self.removal.death_rate_per_hr) {
            anyhow::bail!("removal.death_rate_per_hr must lie in [0, 1].");
        }
        if self.fate.sperm_division_ratio <= 0.0 {
            anyhow::bail!("fate.sperm_division_ratio must be positive.");
        }
        if self.output.tracking_id_interval == 0 {
            anyhow::bail!("output.tracking_id_interval must be greater than 0.");
        }
        Ok(())
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        let dt = 1.0 / self.timing.timesteps_per_hour;
        let age_offset = self.timing.worm_age_offset_hours;

        SimParams {
            // Time
            dt,
            end_time: self.timing.end_time_hours,
            worm_age_offset: age_offset,
            // Path & leader cell
            path_spacing: self.leader.path_spacing_um,
            body_radius: self.leader.body_radius_um,
            stretch_rate: self.leader.stretch_rate_um_per_hr,
            leader_speeds: self.leader.speeds_um_per_hr,
            speed_window_ends: self.leader.speed_window_ends,
            turn_gene_age: self.leader.turn_gene_age,
            halt_gene_age: self.leader.halt_gene_age,
            push_proximity: self.leader.push_proximity_um,
            halting_enabled: self.leader.halting_enabled,
            stretch_window_start: self.leader.stretch_window[0],
            stretch_window_end: self.leader.stretch_window[1],
            spacing_overshoot_tolerance: 0.05,
            turn_completion_band: 0.1,
            // Tube
            tube_initial_radius: self.tube.initial_radius_um,
            tube_growth_rates: self.tube.growth_rates_um_per_hr,
            tube_growth_window_edges: self.tube.growth_window_edges,
            max_movement_per_step: self.tube.max_movement_per_step_um,
            // Cell cycle
            larval_durations: self.cell_cycle.larval.scaled(self.cell_cycle.larval_scale),
            adult_durations: self.cell_cycle.adult.scaled(self.cell_cycle.adult_scale),
            adult_transition_start: self.cell_cycle.adult_transition_age - age_offset,
            adult_transition_span: self.cell_cycle.adult_transition_span_hours,
            phase_stochasticity: self.cell_cycle.phase_stochasticity,
            contact_inhibition_g1: self.cell_cycle.contact_inhibition_g1,
            contact_inhibition_g2: self.cell_cycle.contact_inhibition_g2,
            contact_inhibition_after: self.cell_cycle.contact_inhibition_after,
            compression_threshold: self.cell_cycle.compression_threshold,
            proliferation_exit_after: self.cell_cycle.proliferation_exit_after,
            // Fate
            fate_model: self.fate.model,
            ligand_binding_range: self.fate.ligand_binding_range_um,
            proliferative_zone_length: self.fate.proliferative_zone_length_um,
            commitment_time: self.fate.commitment_time,
            sperm_maturation_delay: self.fate.sperm_maturation_delay_hours,
            meiotic_growth_rate: self.fate.meiotic_growth_rate_um_per_hr,
            oocyte_growth_rate: self.fate.oocyte_growth_rate_um_per_hr,
            max_meiotic_radius: self.fate.max_meiotic_radius_um,
            oocyte_growth_min_distance: self.fate.oocyte_growth_min_distance_um,
            oocyte_commit_radius: self.fate.oocyte_commit_radius_um,
            sperm_division_ratio: self.fate.sperm_division_ratio,
            uncoupled_fate_distance: self.fate.uncoupled_fate_distance_um,
            radius_margin: 0.05,
            // Removal
            hourly_death_probability: self.removal.death_rate_per_hr,
            attrition_zone: self.removal.attrition_zone_um,
            attrition_after: self.removal.attrition_after,
            spermatheca_length: self.removal.spermatheca_length_um,
            fertilisation_after: self.removal.fertilisation_after,
            min_fertilisable_radius: self.removal.min_fertilisable_radius_um,
            apoptosis_duration: self.removal.apoptosis_duration_hours,
            // Population
            initial_cell_radius: self.initial_conditions.cell_radius_um,
            division_separation: self.initial_conditions.division_separation_um,
        }
    }
}

fn is_ascending(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

fn default_worm_age_offset() -> f64 {
    18.5
}

fn default_initial_cell_spacing() -> f64 {
    1.8
}

fn default_initial_path_length() -> f64 {
    32.0
}

fn default_division_separation() -> f64 {
    0.3
}

fn default_speed_window_ends() -> [f64; 3] {
    [3.5, 7.5, 12.5]
}

fn default_push_proximity() -> f64 {
    5.0
}

fn default_stretch_window() -> [f64; 2] {
    [12.5, 17.0]
}

fn default_path_spacing() -> f64 {
    2.0
}

fn default_growth_window_edges() -> [f64; 4] {
    [3.5, 7.5, 12.5, 17.0]
}

fn default_max_movement() -> f64 {
    2.5
}

fn default_transition_span() -> f64 {
    4.5
}

fn default_stochasticity() -> f64 {
    0.1
}

// Onset of adulthood in simulated hours.
fn default_adult_time() -> f64 {
    17.0
}

fn default_fate_model() -> FateModel {
    FateModel::Coupled
}

fn default_ligand_range() -> f64 {
    35.0
}

fn default_oocyte_growth_distance() -> f64 {
    250.0
}

fn default_oocyte_commit_radius() -> f64 {
    10.0
}

fn default_sperm_division_ratio() -> f64 {
    1.26
}

fn default_uncoupled_fate_distance() -> f64 {
    200.0
}

fn default_attrition_zone() -> f64 {
    250.0
}

fn default_spermatheca_length() -> f64 {
    20.0
}

fn default_min_fertilisable_radius() -> f64 {
    11.0
}

fn default_apoptosis_duration() -> f64 {
    0.25
}

fn default_tracking_id_interval() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_TOML: &str = r#"
[timing]
timesteps_per_hour = 10.0
end_time_hours = 2.0
record_interval_hours = 0.5

[initial_conditions]
num_cells_initial = 4
cell_radius_um = 2.5
random_seed = 7

[leader]
body_radius_um = 10.0
stretch_rate_um_per_hr = 5.0
speeds_um_per_hr = [1.0, 2.0, 3.0, 4.0]
turn_gene_age = 27.0
halt_gene_age = 35.0

[tube]
initial_radius_um = 6.0
growth_rates_um_per_hr = [0.1, 0.2, 0.3]

[cell_cycle]
larval = { g1 = 2.0, s = 5.0, g2 = 2.0, m = 0.5 }
adult = { g1 = 2.0, s = 5.0, g2 = 8.0, m = 0.5 }
adult_transition_age = 35.0
compression_threshold = 0.8

[fate]
model = "uncoupled"
proliferative_zone_length_um = 60.0
commitment_time = 17.0
sperm_maturation_delay_hours = 2.0
meiotic_growth_rate_um_per_hr = 0.2
oocyte_growth_rate_um_per_hr = 1.0
max_meiotic_radius_um = 3.5

[removal]
death_rate_per_hr = 0.05

[output]
base_filename = "test_run"
save_stats = false
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_file_fills_in_defaults() {
        let file = write_config(MINIMAL_TOML);
        let config = SimulationConfig::load(file.path()).unwrap();
        assert_eq!(config.fate.model, FateModel::Uncoupled);
        assert_eq!(config.leader.path_spacing_um, 2.0);
        assert_eq!(config.leader.speed_window_ends, [3.5, 7.5, 12.5]);
        assert!(config.leader.halting_enabled);
        assert_eq!(config.timing.worm_age_offset_hours, 18.5);

        let params = config.get_sim_params();
        assert!((params.dt - 0.1).abs() < 1e-12);
        assert_eq!(params.total_steps(), 20);
        assert!((params.adult_transition_start - 16.5).abs() < 1e-12);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = SimulationConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }

    #[test]
    fn spatial_threshold_model_parses_in_snake_case() {
        let file = write_config(&MINIMAL_TOML.replace("\"uncoupled\"", "\"spatial_threshold\""));
        let config = SimulationConfig::load(file.path()).unwrap();
        assert_eq!(config.fate.model, FateModel::SpatialThreshold);
        assert_eq!(config.get_sim_params().fate_model, FateModel::SpatialThreshold);
    }

    #[test]
    fn unknown_fate_model_is_rejected() {
        let file = write_config(&MINIMAL_TOML.replace("\"uncoupled\"", "\"hermaphrodite\""));
        assert!(SimulationConfig::load(file.path()).is_err());
    }

    #[test]
    fn shrinking_tube_is_rejected() {
        let mut config = SimulationConfig::default();
        config.tube.growth_rates_um_per_hr[1] = -0.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("growth_rates"));
    }

    #[test]
    fn default_config_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn scale_factors_apply_to_durations() {
        let mut config = SimulationConfig::default();
        config.cell_cycle.larval_scale = 2.0;
        let params = config.get_sim_params();
        assert_eq!(params.larval_durations.s, 10.0);
        assert_eq!(params.adult_durations.s, 5.0);
    }
}
