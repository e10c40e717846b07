use thiserror::Error;

/// Failures raised by the germline components. Configuration problems are
/// fatal at construction; everything else is an invariant violation.
#[derive(Debug, Error)]
pub enum GermlineError {
    #[error("A node-based cell population must be used with the tube boundary")]
    UnsupportedPopulation,

    #[error("The tube boundary is not defined for one-dimensional populations")]
    OneDimensional,

    #[error("Stretch insertion could not locate the {0} boundary of the turn in a path of {1} points")]
    TurnBoundaryNotFound(&'static str, usize),

    #[error("Path has {points} points but {types} segment types")]
    PathLengthMismatch { points: usize, types: usize },

    #[error("Unknown path segment code {0}")]
    UnknownSegmentCode(i32),

    #[error("Invalid chart state encoding {bits:#x}: region {region} has {active} active leaves")]
    InvalidStateEncoding { bits: u32, region: &'static str, active: u32 },

    #[error("Invalid phase duration distribution: {0}")]
    InvalidDistribution(String),
}
