use germline_common::{PhaseDurations, SimParams};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::error::GermlineError;

/// Mean phase durations at simulated `time`: larval values, a linear ramp
/// across the adult transition, then adult values.
pub fn mean_durations(time: f64, params: &SimParams) -> PhaseDurations {
    let start = params.adult_transition_start;
    let span = params.adult_transition_span;
    if time <= start {
        params.larval_durations
    } else if span <= 0.0 || time >= start + span {
        params.adult_durations
    } else {
        params.larval_durations.lerp(&params.adult_durations, (time - start) / span)
    }
}

/// Normal deviate around `mean` with coefficient of variation `cv`, floored at zero.
pub fn noisy_duration(mean: f64, cv: f64, rng: &mut StdRng) -> Result<f64, GermlineError> {
    let sd = (mean * cv).abs();
    if sd == 0.0 {
        return Ok(mean.max(0.0));
    }
    let normal = Normal::new(mean, sd).map_err(|e| GermlineError::InvalidDistribution(e.to_string()))?;
    Ok(normal.sample(rng).max(0.0))
}
