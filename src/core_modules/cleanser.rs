// THEORY:
// The `CycleCleanser` is the quality gate between reconstruction and metrics.
// A reconstructed cycle can be wrong for reasons the reconstructor cannot see:
// a lost color report stretches one color over seconds where another was
// shown, a lost marker merges two cycles into one.
//
// Three independent checks look for the fingerprints of such losses:
// 1.  **Length**: a cycle far longer or shorter than the batch median
//     (more than 1.5x or less than 0.5x) is an outlier.
// 2.  **Transition**: a color sequence no signal head can produce
//     (red -> amber, for example) means a report went missing in between.
// 3.  **Duration**: amber and red-amber have hard upper bounds. A longer run
//     means the report that ended it was lost.
//
// A cycle may trip several checks; each reason is tallied on its own.

use crate::core_modules::cycle::Cycle;
use crate::core_modules::signal_color::signal_color::TransitionRules;
use crate::core_modules::utils::stats::median;
use serde::Serialize;

const MAX_LENGTH_FACTOR: f64 = 1.5;
const MIN_LENGTH_FACTOR: f64 = 0.5;

/// Which checks a single cycle failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleFlags {
    pub wrong_length: bool,
    pub invalid_transition: bool,
    pub missing_observation: bool,
}

impl CycleFlags {
    pub fn is_flagged(&self) -> bool {
        self.wrong_length || self.invalid_transition || self.missing_observation
    }
}

/// Tallies produced by one or more cleansing passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanseReport {
    /// Cycles that entered the cleanser.
    pub total_cycles: u32,
    /// Cycles dropped from the retained set.
    pub removed_cycles: u32,
    pub wrong_length: u32,
    pub invalid_transition: u32,
    pub missing_observation: u32,
}

impl CleanseReport {
    fn tally(&mut self, flags: CycleFlags) {
        self.wrong_length += u32::from(flags.wrong_length);
        self.invalid_transition += u32::from(flags.invalid_transition);
        self.missing_observation += u32::from(flags.missing_observation);
    }

    pub fn absorb(&mut self, other: &CleanseReport) {
        self.total_cycles += other.total_cycles;
        self.removed_cycles += other.removed_cycles;
        self.wrong_length += other.wrong_length;
        self.invalid_transition += other.invalid_transition;
        self.missing_observation += other.missing_observation;
    }
}

/// Statistical and rule-based filter over one cell's cycles.
#[derive(Debug, Clone)]
pub struct CycleCleanser {
    rules: TransitionRules,
    /// Keep flagged cycles while still tallying why they were flagged.
    retain_flagged: bool,
}

impl CycleCleanser {
    pub fn new(rules: TransitionRules, retain_flagged: bool) -> Self {
        Self { rules, retain_flagged }
    }

    /// Filters `cycles`, returning the retained ones and the tallies.
    pub fn cleanse(&self, cycles: Vec<Cycle>) -> (Vec<Cycle>, CleanseReport) {
        let mut report = CleanseReport::default();
        if cycles.is_empty() {
            return (cycles, report);
        }

        let lengths: Vec<f64> = cycles.iter().map(|c| c.len() as f64).collect();
        // Not empty, checked above.
        let median_length = median(&lengths).unwrap_or_default();

        report.total_cycles = cycles.len() as u32;
        let mut retained = Vec::with_capacity(cycles.len());
        for cycle in cycles {
            let flags = self.inspect(&cycle, median_length);
            report.tally(flags);
            if flags.is_flagged() && !self.retain_flagged {
                report.removed_cycles += 1;
            } else {
                retained.push(cycle);
            }
        }
        (retained, report)
    }

    /// Runs all three checks on one cycle.
    pub fn inspect(&self, cycle: &Cycle, median_length: f64) -> CycleFlags {
        CycleFlags {
            wrong_length: Self::has_wrong_length(cycle, median_length),
            invalid_transition: self.has_invalid_transition(cycle),
            missing_observation: self.has_overlong_run(cycle),
        }
    }

    fn has_wrong_length(cycle: &Cycle, median_length: f64) -> bool {
        let len = cycle.len() as f64;
        len > median_length * MAX_LENGTH_FACTOR || len < median_length * MIN_LENGTH_FACTOR
    }

    fn has_invalid_transition(&self, cycle: &Cycle) -> bool {
        cycle
            .results
            .windows(2)
            .any(|pair| self.rules.is_forbidden(pair[0], pair[1]))
    }

    fn has_overlong_run(&self, cycle: &Cycle) -> bool {
        cycle.results.chunk_by(|a, b| a == b).any(|run| {
            self.rules
                .max_run(run[0])
                .is_some_and(|max| run.len() > max)
        })
    }
}

impl Default for CycleCleanser {
    fn default() -> Self {
        Self::new(TransitionRules::standard(), false)
    }
}
