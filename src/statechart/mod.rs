//! Per-cell hierarchical state machine for germline cell-cycle and fate.

pub mod cell_cycle;
pub mod chart;
pub mod durations;
pub mod regions;

pub use cell_cycle::ChartCellCycle;
pub use chart::{ChartContext, ChartEvents, ChartVariables, Commitment, GermlineChart, UPDATE_ORDER};
pub use durations::mean_durations;
pub use regions::{
    ActiveStates, CyclePhase, Effector, Effectors, Fate, Gld1, Gld2, Glp1, Lag1, LeafState, Region, StateBits,
};
