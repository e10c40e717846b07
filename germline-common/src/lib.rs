pub mod config;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    CellCycleConfig, FateConfig, FateModel, InitialConditions, LeaderConfig, OutputConfig,
    PhaseDurations, RemovalConfig, SimulationConfig, TimingConfig, TubeConfig,
};
pub use sim_params::{SimClock, SimParams};
pub use snapshot::{GonadSnapshot, TrackingRow};
pub use vecmath::Vec3;
