// THEORY:
// The `CycleReconstructor` is the heart of the engine. It turns two sparse,
// independent observation streams into a dense list of per-second cycles.
//
// Key architectural principles:
// 1.  **Markers Are Authoritative**: Cycle boundaries come only from consecutive
//     pairs of `cycle_second` markers. The controller reports them reliably, so
//     a pair `(cs[i], cs[i + 1])` is exactly one cycle.
// 2.  **Colors Are Held**: Color observations are change events. Between two
//     reports the last color is simply still showing, so it is repeated.
// 3.  **No Fabrication**: A cycle is only opened when the color at its first
//     second is known. A boundary pair that elapses without a known color is
//     counted as skipped instead of guessed.
// 4.  **Single Pass**: A ticker walks forward in time once. Inside a cycle it
//     jumps straight to the next event (color change or cycle end), which is
//     equivalent to appending one second at a time.
//
// Every step runs in a fixed order: boundary, color, start, fill.

use crate::core_modules::cycle::Cycle;
use crate::core_modules::observation::observation::Observation;
use crate::error::Result;
use tracing::trace;

/// The outcome of reconstructing one entity-cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconstruction {
    /// Sealed cycles in time order.
    pub cycles: Vec<Cycle>,
    /// Boundary pairs that elapsed without a known color.
    pub skipped: u32,
    /// The color stream was absent.
    pub color_missing: bool,
    /// The `cycle_second` stream was absent.
    pub cycle_second_missing: bool,
}

impl Reconstruction {
    fn missing(color_missing: bool, cycle_second_missing: bool) -> Self {
        Self {
            color_missing,
            cycle_second_missing,
            ..Self::default()
        }
    }
}

/// Cursor over the color stream.
struct ColorCursor<'a> {
    observations: &'a [Observation],
    index: usize,
}

impl<'a> ColorCursor<'a> {
    fn new(observations: &'a [Observation]) -> Self {
        Self { observations, index: 0 }
    }

    fn current(&self) -> Observation {
        self.observations[self.index]
    }

    fn upcoming(&self) -> Option<i32> {
        self.observations.get(self.index + 1).map(|o| o.timestamp)
    }

    /// Moves to the latest observation at or before `ticker`.
    fn catch_up(&mut self, ticker: i64) {
        while let Some(next) = self.upcoming() {
            if ticker < i64::from(next) {
                break;
            }
            self.index += 1;
        }
    }
}

/// Stateless engine that rebuilds cycles for one entity-cell.
#[derive(Debug, Clone, Default)]
pub struct CycleReconstructor;

impl CycleReconstructor {
    pub fn new() -> Self {
        Self
    }

    /// Reconstructs cycles from time-sorted observation streams.
    ///
    /// Both slices must already be sorted by timestamp (the buffer's
    /// `sort` does this). An absent stream is reported through the missing
    /// flags, not as an error.
    pub fn reconstruct(
        &self,
        colors: &[Observation],
        cycle_seconds: &[Observation],
    ) -> Result<Reconstruction> {
        if colors.is_empty() || cycle_seconds.is_empty() {
            return Ok(Reconstruction::missing(
                colors.is_empty(),
                cycle_seconds.is_empty(),
            ));
        }

        let mut outcome = Reconstruction::default();
        if cycle_seconds.len() < 2 {
            // A single marker cannot close a cycle.
            return Ok(outcome);
        }

        let mut cursor = ColorCursor::new(colors);
        let last_marker = i64::from(cycle_seconds[cycle_seconds.len() - 1].timestamp);
        let mut ticker = i64::from(colors[0].timestamp.min(cycle_seconds[0].timestamp));

        let mut pair = 0;
        let mut start = i64::from(cycle_seconds[0].timestamp);
        let mut end = i64::from(cycle_seconds[1].timestamp);
        let mut current: Option<Cycle> = None;

        while ticker <= last_marker {
            // --- 1. Boundary ---
            if ticker >= end {
                match current.take() {
                    Some(cycle) if !cycle.is_empty() => outcome.cycles.push(cycle),
                    // A pair with two identical markers spans no time at all.
                    _ => outcome.skipped += 1,
                }
                pair += 1;
                if pair + 1 >= cycle_seconds.len() {
                    break;
                }
                start = i64::from(cycle_seconds[pair].timestamp);
                end = i64::from(cycle_seconds[pair + 1].timestamp);
            }

            // --- 2. Color ---
            cursor.catch_up(ticker);

            // --- 3. Start ---
            if current.is_none()
                && ticker == start
                && i64::from(cursor.current().timestamp) <= start
            {
                current = Some(Cycle::open(start as i32, end as i32));
            }

            // --- 4. Fill ---
            match current.as_mut() {
                Some(cycle) => {
                    let until_change = cursor
                        .upcoming()
                        .map_or(i64::MAX, |next| i64::from(next) - ticker);
                    let until_end = end - ticker;
                    // Zero only for a pair with two identical markers; the
                    // boundary step closes it on the next pass.
                    let step = until_change.min(until_end).max(0);
                    cycle.extend_with(cursor.current().value, step as usize);
                    ticker += step;
                }
                None => ticker += 1,
            }
        }

        for cycle in &outcome.cycles {
            cycle.check_span()?;
        }

        trace!(
            cycles = outcome.cycles.len(),
            skipped = outcome.skipped,
            "reconstructed cell"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i32 = 1_697_752_800;

    fn obs(points: &[(i32, u8)]) -> Vec<Observation> {
        points
            .iter()
            .map(|&(offset, value)| Observation::new(T0 + offset, value))
            .collect()
    }

    fn markers(offsets: &[i32]) -> Vec<Observation> {
        offsets.iter().map(|&o| Observation::new(T0 + o, 0)).collect()
    }

    fn reference_colors() -> Vec<Observation> {
        obs(&[
            (0, 2),
            (10, 3),
            (20, 4),
            (35, 5),
            (42, 6),
            (50, 1),
            (55, 3),
            (60, 4),
            (70, 0),
            (80, 1),
        ])
    }

    #[test]
    fn three_pairs_yield_three_cycles() {
        let colors = reference_colors();
        let outcome = CycleReconstructor::new()
            .reconstruct(&colors, &markers(&[0, 30, 60, 90]))
            .unwrap();

        assert_eq!(outcome.cycles.len(), 3);
        assert_eq!(outcome.skipped, 0);
        assert!(!outcome.color_missing);
        assert!(!outcome.cycle_second_missing);

        let starts: Vec<i32> = outcome.cycles.iter().map(|c| c.start - T0).collect();
        assert_eq!(starts, vec![0, 30, 60]);

        let first = &outcome.cycles[0].results;
        assert!(first[..10].iter().all(|&c| c == 2));
        assert!(first[10..20].iter().all(|&c| c == 3));
        assert!(first[20..30].iter().all(|&c| c == 4));

        let second = &outcome.cycles[1].results;
        assert!(second[..5].iter().all(|&c| c == 4));
        assert!(second[5..12].iter().all(|&c| c == 5));
        assert!(second[12..20].iter().all(|&c| c == 6));
        assert!(second[20..25].iter().all(|&c| c == 1));
        assert!(second[25..30].iter().all(|&c| c == 3));

        let third = &outcome.cycles[2].results;
        assert!(third[..10].iter().all(|&c| c == 4));
        assert!(third[10..20].iter().all(|&c| c == 0));
        assert!(third[20..30].iter().all(|&c| c == 1));
    }

    #[test]
    fn late_colors_skip_leading_pairs() {
        let colors = obs(&[(60, 1), (70, 3), (85, 1)]);
        let outcome = CycleReconstructor::new()
            .reconstruct(&colors, &markers(&[0, 30, 60, 90]))
            .unwrap();

        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.cycles.len(), 1);
        assert_eq!(outcome.cycles[0].start, T0 + 60);
    }

    #[test]
    fn color_after_cycle_start_does_not_open_cycle() {
        // The first color arrives one second into the first pair.
        let colors = obs(&[(1, 1), (40, 3)]);
        let outcome = CycleReconstructor::new()
            .reconstruct(&colors, &markers(&[0, 30, 60]))
            .unwrap();

        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.cycles.len(), 1);
        let results = &outcome.cycles[0].results;
        assert_eq!(results.len(), 30);
        assert!(results[..10].iter().all(|&c| c == 1));
        assert!(results[10..].iter().all(|&c| c == 3));
    }

    #[test]
    fn colors_before_first_marker_are_held() {
        let colors = obs(&[(-20, 3), (5, 1)]);
        let outcome = CycleReconstructor::new()
            .reconstruct(&colors, &markers(&[0, 10]))
            .unwrap();

        assert_eq!(outcome.cycles.len(), 1);
        assert_eq!(outcome.cycles[0].results, vec![3, 3, 3, 3, 3, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn missing_streams_set_flags() {
        let colors = reference_colors();
        let reconstructor = CycleReconstructor::new();

        let outcome = reconstructor.reconstruct(&colors, &[]).unwrap();
        assert!(outcome.cycle_second_missing);
        assert!(!outcome.color_missing);
        assert!(outcome.cycles.is_empty());

        let outcome = reconstructor.reconstruct(&[], &[]).unwrap();
        assert!(outcome.cycle_second_missing && outcome.color_missing);
    }

    #[test]
    fn single_marker_yields_nothing() {
        let outcome = CycleReconstructor::new()
            .reconstruct(&reference_colors(), &markers(&[0]))
            .unwrap();
        assert!(outcome.cycles.is_empty());
        assert_eq!(outcome.skipped, 0);
    }

    #[test]
    fn duplicate_markers_never_produce_empty_cycles() {
        let colors = obs(&[(0, 1), (12, 3)]);
        let outcome = CycleReconstructor::new()
            .reconstruct(&colors, &markers(&[0, 20, 20, 40]))
            .unwrap();

        assert!(outcome.cycles.iter().all(|c| !c.is_empty()));
        assert_eq!(outcome.cycles.len(), 2);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn duplicate_color_timestamps_use_the_last_report() {
        let colors = obs(&[(0, 1), (5, 2), (5, 3), (5, 4)]);
        let outcome = CycleReconstructor::new()
            .reconstruct(&colors, &markers(&[0, 10]))
            .unwrap();

        assert_eq!(outcome.cycles[0].results, vec![1, 1, 1, 1, 1, 4, 4, 4, 4, 4]);
    }

    #[test]
    fn counts_never_exceed_available_pairs() {
        let colors = obs(&[(3, 1), (47, 3), (95, 1), (140, 3)]);
        let marker_offsets = [0, 30, 60, 90, 120, 150];
        let outcome = CycleReconstructor::new()
            .reconstruct(&colors, &markers(&marker_offsets))
            .unwrap();

        let pairs = marker_offsets.len() as u32 - 1;
        assert!(outcome.skipped + outcome.cycles.len() as u32 <= pairs);
        for cycle in &outcome.cycles {
            assert_eq!(cycle.len() as i64, cycle.span());
        }
    }

    #[test]
    fn reconstruction_is_deterministic() {
        let colors = reference_colors();
        let marks = markers(&[0, 30, 60, 90]);
        let reconstructor = CycleReconstructor::new();
        let first = reconstructor.reconstruct(&colors, &marks).unwrap();
        let second = reconstructor.reconstruct(&colors, &marks).unwrap();
        assert_eq!(first, second);
    }
}
