// THEORY:
// The `MetricsEngine` condenses the cleaned cycles of one hour-of-week slot
// into a handful of numbers that describe how regular the signal is.
//
// Key architectural principles:
// 1.  **Four Occurrences, One Slot**: A slot is the same hour on the last four
//     occurrences of a weekday. Their cycles are pooled, but only cycles that
//     touch each other inside the same occurrence are ever compared.
// 2.  **Runs**: A run is a maximal sequence of contiguous cycles inside one
//     cell. Pairwise metrics look at neighbours within a run; phase metrics
//     look at a run's concatenated seconds so that a green phase straddling
//     a cycle boundary is seen as one phase.
// 3.  **Sentinels, Not Errors**: An empty slot is normal. Every metric has a
//     documented sentinel for "no input".
//
// The metrics:
// - phase-wise distance: seconds in which two neighbouring cycles disagree
// - green length: green seconds per cycle
// - shift fuzziness: how many distinct gaps separate green phases, relative
//   to how many gaps were seen (0 = perfectly regular, 1 = every gap unique)
// - relative green distance: disagreement limited to green seconds,
//   normalized by green length
// - green reliability: per second-offset, how close the chance of green is
//   to a coin flip

use crate::core_modules::cycle::{
    Cycle, continuous_green_lengths, gaps_between_green_phases, green_phase_starts,
};
use crate::core_modules::signal_color::signal_color::{Color, is_green};
use crate::core_modules::utils::stats::median_or;
use crate::error::{CycleError, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// Sentinel for metrics that have no input.
pub const NO_VALUE: f64 = -1.0;
/// Sentinel for the reliability-family metrics that have no input.
pub const NO_RELIABILITY: f64 = -999_999.0;
/// Sentinel for an undefined green phase count.
pub const NO_COUNT: i64 = -1;

/// The metric vector of one entity for one hour-of-week slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsCell {
    pub median_phase_distance: f64,
    pub median_green_length: f64,
    pub median_continuous_green_length: f64,
    pub shift_fuzziness: f64,
    pub median_green_reliability: f64,
    pub median_relative_green_distance: f64,
    pub green_phase_count: i64,
    pub unique_colors: BTreeSet<Color>,
    /// Retained cycles that fed this slot.
    pub cycle_count: usize,
    /// Gaps found between cycles of the same cell.
    pub gap_count: usize,
}

impl Default for MetricsCell {
    fn default() -> Self {
        Self {
            median_phase_distance: NO_VALUE,
            median_green_length: NO_VALUE,
            median_continuous_green_length: NO_VALUE,
            shift_fuzziness: NO_VALUE,
            median_green_reliability: NO_RELIABILITY,
            median_relative_green_distance: NO_RELIABILITY,
            green_phase_count: NO_COUNT,
            unique_colors: BTreeSet::new(),
            cycle_count: 0,
            gap_count: 0,
        }
    }
}

/// Splits one cell's cycles into runs of contiguous cycles.
pub fn runs(cell: &[Cycle]) -> impl Iterator<Item = &[Cycle]> {
    cell.chunk_by(|a, b| a.is_contiguous_with(b))
}

/// Seconds in which `a` and `b` disagree, counting every second where only
/// one of them still runs.
pub fn phase_wise_distance(a: &Cycle, b: &Cycle) -> usize {
    let length = a.len().max(b.len());
    (0..length)
        .filter(|&i| a.results.get(i) != b.results.get(i))
        .count()
}

/// Phase-wise distance restricted to seconds where either cycle is green,
/// divided by the longer green length. `None` when neither cycle has green.
pub fn relative_green_distance(a: &Cycle, b: &Cycle) -> Option<f64> {
    let green = a.green_length().max(b.green_length());
    if green == 0 {
        return None;
    }
    let length = a.len().max(b.len());
    let mismatches = (0..length)
        .filter(|&i| {
            let left = a.results.get(i).copied();
            let right = b.results.get(i).copied();
            let either_green = left.is_some_and(is_green) || right.is_some_and(is_green);
            either_green && left != right
        })
        .count();
    Some(mismatches as f64 / green as f64)
}

/// For every second-offset, the share of cycles long enough to have that
/// offset that show green there.
pub fn green_probabilities<'a>(cycles: impl IntoIterator<Item = &'a Cycle>) -> Vec<f64> {
    let mut green = Vec::<usize>::new();
    let mut seen = Vec::<usize>::new();
    for cycle in cycles {
        if cycle.len() > seen.len() {
            seen.resize(cycle.len(), 0);
            green.resize(cycle.len(), 0);
        }
        for (i, &color) in cycle.results.iter().enumerate() {
            seen[i] += 1;
            green[i] += usize::from(is_green(color));
        }
    }
    green
        .iter()
        .zip(&seen)
        .map(|(&g, &n)| g as f64 / n as f64)
        .collect()
}

/// `min(p, 1 - p)` per offset: 0 for a second that is always or never green,
/// 0.5 for a coin flip.
pub fn green_reliability(probabilities: &[f64]) -> Vec<f64> {
    probabilities.iter().map(|&p| p.min(1.0 - p)).collect()
}

/// Computes the metric vector of one slot.
#[derive(Debug, Clone, Default)]
pub struct MetricsEngine;

impl MetricsEngine {
    pub fn new() -> Self {
        Self
    }

    /// Summarizes the stored cells of one slot.
    pub fn compute(&self, cells: &[Vec<Cycle>]) -> Result<MetricsCell> {
        let mut metrics = MetricsCell::default();

        let mut distances = Vec::new();
        let mut relative_distances = Vec::new();
        let mut green_lengths = Vec::new();
        let mut continuous_lengths = Vec::new();
        let mut distinct_gaps = HashSet::new();
        let mut total_gaps = 0usize;
        let mut phase_count: Option<i64> = None;

        for cell in cells {
            let cell_runs: Vec<&[Cycle]> = runs(cell).collect();
            metrics.gap_count += cell_runs.len().saturating_sub(1);

            for run in cell_runs {
                let mut concatenated: Vec<Color> = Vec::new();
                for cycle in run {
                    metrics.unique_colors.extend(cycle.results.iter().copied());
                    concatenated.extend_from_slice(&cycle.results);
                    green_lengths.push(cycle.green_length() as f64);
                }
                metrics.cycle_count += run.len();

                for pair in run.windows(2) {
                    distances.push(phase_wise_distance(&pair[0], &pair[1]) as f64);
                    if let Some(relative) = relative_green_distance(&pair[0], &pair[1]) {
                        relative_distances.push(relative);
                    }
                }

                let gaps = gaps_between_green_phases(&concatenated);
                let phases = green_phase_starts(&concatenated);
                if !gaps.is_empty() && phases != gaps.len() + 1 {
                    return Err(CycleError::GreenPhaseMismatch {
                        phases,
                        durations: gaps.len(),
                    });
                }
                total_gaps += gaps.len();
                distinct_gaps.extend(gaps);
                *phase_count.get_or_insert(0) += phases as i64;

                continuous_lengths.extend(
                    continuous_green_lengths(&concatenated)
                        .into_iter()
                        .map(|l| l as f64),
                );
            }
        }

        metrics.median_phase_distance = median_or(&distances, NO_VALUE);
        metrics.median_green_length = median_or(&green_lengths, NO_VALUE);
        metrics.median_continuous_green_length = median_or(&continuous_lengths, NO_VALUE);
        metrics.median_relative_green_distance = median_or(&relative_distances, NO_RELIABILITY);
        metrics.green_phase_count = phase_count.unwrap_or(NO_COUNT);
        if total_gaps > 0 {
            metrics.shift_fuzziness = distinct_gaps.len() as f64 / total_gaps as f64;
        }

        let reliability = green_reliability(&green_probabilities(cells.iter().flatten()));
        metrics.median_green_reliability = median_or(&reliability, NO_RELIABILITY);

        Ok(metrics)
    }
}
