// THEORY:
// A `Cycle` is one reconstructed signal period: a half-open time span
// `[start, end)` plus the color shown during every second of it. It is the
// unit that flows from the reconstructor through the cleanser into the
// metrics engine.
//
// The invariant `results.len() == end - start` holds for every cycle that
// leaves the reconstructor. The helpers below work on plain color slices so
// that they apply equally to one cycle and to the concatenated results of a
// run of contiguous cycles.

use crate::core_modules::signal_color::signal_color::{Color, is_green};
use crate::error::{CycleError, Result};
use serde::Serialize;

/// One reconstructed signal cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cycle {
    /// First second of the cycle (unix seconds, inclusive).
    pub start: i32,
    /// First second after the cycle (unix seconds, exclusive).
    pub end: i32,
    /// One color per second.
    pub results: Vec<Color>,
}

impl Cycle {
    /// Opens an empty cycle for the boundary pair `[start, end)`.
    pub fn open(start: i32, end: i32) -> Self {
        let capacity = usize::try_from(end.saturating_sub(start)).unwrap_or(0);
        Self {
            start,
            end,
            results: Vec::with_capacity(capacity),
        }
    }

    /// Builds a cycle from known results, ending where the results end.
    pub fn from_results(start: i32, results: Vec<Color>) -> Self {
        let end = start + results.len() as i32;
        Self { start, end, results }
    }

    /// Appends `color` for `seconds` consecutive seconds.
    pub fn extend_with(&mut self, color: Color, seconds: usize) {
        self.results.resize(self.results.len() + seconds, color);
    }

    pub fn span(&self) -> i64 {
        i64::from(self.end) - i64::from(self.start)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Whether `next` starts exactly where this cycle ends.
    pub fn is_contiguous_with(&self, next: &Cycle) -> bool {
        self.end == next.start
    }

    /// Checks the length invariant.
    pub fn check_span(&self) -> Result<()> {
        if self.span() != self.results.len() as i64 {
            return Err(CycleError::LengthMismatch {
                start: self.start,
                end: self.end,
                len: self.results.len(),
            });
        }
        Ok(())
    }

    /// Seconds spent green.
    pub fn green_length(&self) -> usize {
        self.results.iter().filter(|&&c| is_green(c)).count()
    }

    pub fn green_indices(&self) -> Vec<usize> {
        green_indices(&self.results)
    }

    /// Timestamps at which the color changes, paired with the new color.
    pub fn state_changes(&self) -> Vec<(i32, Color)> {
        self.results
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[0] != w[1])
            .map(|(i, w)| (self.start + i as i32 + 1, w[1]))
            .collect()
    }
}

/// Offsets marking the start and the end of every green phase. A phase ends
/// at its last green second, or at the final index when the slice ends green.
pub fn green_indices(results: &[Color]) -> Vec<usize> {
    let mut indices = Vec::new();
    let mut previous: Option<Color> = None;
    for (idx, &color) in results.iter().enumerate() {
        let was_green = previous.is_some_and(is_green);
        if is_green(color) && !was_green {
            indices.push(idx);
        } else if was_green && !is_green(color) {
            indices.push(idx - 1);
        }
        if idx == results.len() - 1 && is_green(color) {
            indices.push(idx);
        }
        previous = Some(color);
    }
    indices
}

/// Number of transitions into green.
pub fn green_phase_starts(results: &[Color]) -> usize {
    let mut previous: Option<Color> = None;
    let mut count = 0;
    for &color in results {
        if is_green(color) && !previous.is_some_and(is_green) {
            count += 1;
        }
        previous = Some(color);
    }
    count
}

/// Distance from the last second of one green phase to the first second of
/// the next one, for every consecutive pair of green phases.
pub fn gaps_between_green_phases(results: &[Color]) -> Vec<i64> {
    let mut last_green_end: Option<usize> = None;
    let mut gaps = Vec::new();
    let mut previous: Option<Color> = None;
    for (idx, &color) in results.iter().enumerate() {
        let was_green = previous.is_some_and(is_green);
        if was_green && !is_green(color) {
            last_green_end = Some(idx - 1);
        } else if !was_green && is_green(color) {
            if let Some(end) = last_green_end.take() {
                gaps.push((idx - end) as i64);
            }
        }
        previous = Some(color);
    }
    gaps
}

/// Lengths of every green phase that is closed by a non-green second.
pub fn continuous_green_lengths(results: &[Color]) -> Vec<usize> {
    let mut lengths = Vec::new();
    let mut current = 0;
    for &color in results {
        if is_green(color) {
            current += 1;
        } else if current > 0 {
            lengths.push(current);
            current = 0;
        }
    }
    lengths
}
