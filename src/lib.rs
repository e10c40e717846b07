//! Germline growth plugins: a migrating leader cell that lays down a path, a
//! tube boundary that confines germ cells around it, a per-cell statechart for
//! cycle and fate, and the killers and recorders that run alongside them.

pub mod annotations;
pub mod boundary;
pub mod checkpoint;
pub mod error;
pub mod killers;
pub mod leader;
pub mod path;
pub mod population;
pub mod recorders;
pub mod simulation;
pub mod statechart;

pub use error::GermlineError;
pub use simulation::GermlineSimulation;
