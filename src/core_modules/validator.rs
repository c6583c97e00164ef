// THEORY:
// The `ConsistencyValidator` is a debug-only cross-check. It samples freshly
// reconstructed cycles and confirms that each sampled fact can be traced back
// to exactly one raw observation:
// - a cycle's start must be a `cycle_second` marker;
// - a color change inside a cycle must be a color report at that second with
//   that value.
// It never changes cycles. Sampling is random, so a seed can be supplied to
// make a diagnostic run repeatable.

use crate::core_modules::cycle::Cycle;
use crate::core_modules::observation::observation::Observation;
use crate::error::{CycleError, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

pub const DEFAULT_SAMPLES: usize = 50;

pub struct ConsistencyValidator {
    samples: usize,
    rng: StdRng,
}

impl ConsistencyValidator {
    pub fn new(samples: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { samples, rng }
    }

    /// Checks `cycles` against the observations they were built from.
    pub fn validate(
        &mut self,
        cycles: &[Cycle],
        colors: &[Observation],
        cycle_seconds: &[Observation],
    ) -> Result<()> {
        if cycles.is_empty() {
            return Ok(());
        }

        for cycle in cycles {
            cycle.check_span()?;
        }

        for _ in 0..self.samples {
            let Some(cycle) = cycles.choose(&mut self.rng) else {
                break;
            };

            let markers = cycle_seconds
                .iter()
                .filter(|o| o.timestamp == cycle.start)
                .count();
            if markers != 1 {
                return Err(CycleError::ValidationFailed(format!(
                    "cycle starting at {} matches {} cycle_second observations",
                    cycle.start, markers
                )));
            }

            let changes = cycle.state_changes();
            let Some(&(timestamp, value)) = changes.choose(&mut self.rng) else {
                continue;
            };
            let reports = colors
                .iter()
                .filter(|o| o.timestamp == timestamp && o.value == value)
                .count();
            if reports != 1 {
                return Err(CycleError::ValidationFailed(format!(
                    "change to {} at {} matches {} color observations",
                    value, timestamp, reports
                )));
            }
        }
        Ok(())
    }
}

impl Default for ConsistencyValidator {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLES, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::reconstructor::CycleReconstructor;

    fn streams() -> (Vec<Observation>, Vec<Observation>) {
        let colors = [(0, 1), (8, 4), (10, 3), (22, 2), (25, 1), (38, 4), (40, 3), (52, 2), (55, 1)]
            .iter()
            .map(|&(t, v)| Observation::new(t, v))
            .collect();
        let markers = [0, 30, 60].iter().map(|&t| Observation::new(t, 0)).collect();
        (colors, markers)
    }

    #[test]
    fn reconstructed_cycles_pass() {
        let (colors, markers) = streams();
        let outcome = CycleReconstructor::new().reconstruct(&colors, &markers).unwrap();
        let mut validator = ConsistencyValidator::new(DEFAULT_SAMPLES, Some(7));
        assert!(validator.validate(&outcome.cycles, &colors, &markers).is_ok());
    }

    #[test]
    fn cycle_without_marker_fails() {
        let (colors, markers) = streams();
        let stray = vec![Cycle::from_results(5, vec![1, 1, 3])];
        let mut validator = ConsistencyValidator::new(5, Some(1));
        assert!(matches!(
            validator.validate(&stray, &colors, &markers),
            Err(CycleError::ValidationFailed(_))
        ));
    }

    #[test]
    fn change_without_report_fails() {
        let (colors, markers) = streams();
        // Starts on a marker, but switches to green at second 3, which nobody reported.
        let invented = vec![Cycle::from_results(30, vec![1, 1, 1, 3, 3])];
        let mut validator = ConsistencyValidator::new(5, Some(3));
        assert!(validator.validate(&invented, &colors, &markers).is_err());
    }

    #[test]
    fn span_mismatch_fails_before_sampling() {
        let mut broken = Cycle::open(0, 30);
        broken.extend_with(1, 3);
        let (colors, markers) = streams();
        let mut validator = ConsistencyValidator::new(0, Some(0));
        assert!(matches!(
            validator.validate(&[broken], &colors, &markers),
            Err(CycleError::LengthMismatch { .. })
        ));
    }
}
