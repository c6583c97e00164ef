// THEORY:
// The `pipeline` module is the per-entity API of the engine. An
// `EntityAnalyzer` owns everything one signal head needs while a batch runs:
// the observation buffer of the current cell, the cleaned cycles of the four
// cells of the current slot, the accumulated quality counters and the 7 x 24
// grid of metric cells.
//
// The contract is three calls, always in this order:
// 1.  `add_observation` for every row of a cell,
// 2.  `calc_cycles(cell)` once the cell is complete (reconstruct, optionally
//     validate, cleanse, store, clear the buffer),
// 3.  `calculate_metrics(day, hour)` once all four cells of a slot are stored.
//
// There is no global registry: one analyzer per entity, owned by whoever
// drives it. A failure inside one cell is returned to the caller, who decides
// whether to skip the entity-cell and move on.

use crate::core_modules::cell_enumerator::{CELLS_PER_SLOT, DAYS_PER_WEEK, HOURS_PER_DAY};
use crate::core_modules::cleanser::{CleanseReport, CycleCleanser};
use crate::core_modules::cycle::Cycle;
use crate::core_modules::metrics::{MetricsCell, MetricsEngine};
use crate::core_modules::observation::observation::{
    ColorHead, MAX_OBSERVATION_VALUE, Observation, ObservationBuffer, SignalKind,
};
use crate::core_modules::reconstructor::{CycleReconstructor, Reconstruction};
use crate::core_modules::signal_color::signal_color::TransitionRules;
use crate::core_modules::validator::{ConsistencyValidator, DEFAULT_SAMPLES};
use crate::error::{CycleError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for an analysis run, allowing for tunable behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Which color stream feeds reconstruction. Rows of the other color
    /// stream are ignored.
    pub signal: ColorHead,
    /// Run the consistency validator on every reconstructed cell.
    pub validation: bool,
    /// Samples drawn per cell by the validator.
    pub validation_samples: usize,
    /// Seed for the validator; random when absent.
    pub validation_seed: Option<u64>,
    /// Keep flagged cycles (still tallying why they were flagged).
    pub retain_flagged: bool,
    /// Worker tasks for the parallel pipeline. 0 picks the number of CPUs.
    pub workers: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            signal: ColorHead::Primary,
            validation: false,
            validation_samples: DEFAULT_SAMPLES,
            validation_seed: None,
            retain_flagged: false,
            workers: 0,
        }
    }
}

/// Quality counters accumulated over every cell an entity went through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconstructionCounters {
    /// Cells in which the color stream was absent.
    pub color_missing_cells: u32,
    /// Cells in which the `cycle_second` stream was absent.
    pub cycle_second_missing_cells: u32,
    /// Boundary pairs that elapsed without a known color.
    pub skipped_cycles: u32,
    #[serde(flatten)]
    pub cleanse: CleanseReport,
    /// Gaps between consecutive cycles of the same cell.
    pub gaps_between_cycles: u32,
    /// Entity-cells dropped because of a broken invariant.
    pub faulted_cells: u32,
}

impl ReconstructionCounters {
    pub fn absorb(&mut self, other: &ReconstructionCounters) {
        self.color_missing_cells += other.color_missing_cells;
        self.cycle_second_missing_cells += other.cycle_second_missing_cells;
        self.skipped_cycles += other.skipped_cycles;
        self.cleanse.absorb(&other.cleanse);
        self.gaps_between_cycles += other.gaps_between_cycles;
        self.faulted_cells += other.faulted_cells;
    }
}

/// What happened to one cell in `calc_cycles`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellOutcome {
    pub reconstructed: usize,
    pub retained: usize,
    pub skipped: u32,
    pub color_missing: bool,
    pub cycle_second_missing: bool,
    pub cleanse: CleanseReport,
}

/// 7 x 24 metric cells, indexed by weekday (0 = Sunday) then hour.
pub type MetricsGrid = [[MetricsCell; HOURS_PER_DAY]; DAYS_PER_WEEK];

fn empty_grid() -> Box<MetricsGrid> {
    Box::new(std::array::from_fn(|_| std::array::from_fn(|_| MetricsCell::default())))
}

/// The serializable result of analyzing one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityReport {
    pub name: String,
    pub counters: ReconstructionCounters,
    pub metrics: Box<MetricsGrid>,
}

impl EntityReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counters: ReconstructionCounters::default(),
            metrics: empty_grid(),
        }
    }

    pub fn metrics_at(&self, day: usize, hour: usize) -> Option<&MetricsCell> {
        self.metrics.get(day)?.get(hour)
    }

    /// Folds a partial report that covered only `day` into this one: counters
    /// add up, the weekday row is taken over as a whole.
    pub fn merge_day(&mut self, other: EntityReport, day: usize) {
        self.counters.absorb(&other.counters);
        if day < DAYS_PER_WEEK {
            let EntityReport { mut metrics, .. } = other;
            std::mem::swap(&mut self.metrics[day], &mut metrics[day]);
        }
    }
}

/// Per-entity state object driving reconstruction, cleansing and metrics.
pub struct EntityAnalyzer {
    name: String,
    config: AnalysisConfig,
    buffer: ObservationBuffer,
    cells: [Vec<Cycle>; CELLS_PER_SLOT],
    reconstructor: CycleReconstructor,
    cleanser: CycleCleanser,
    validator: Option<ConsistencyValidator>,
    metrics_engine: MetricsEngine,
    report: EntityReport,
}

impl EntityAnalyzer {
    pub fn new(name: impl Into<String>, config: AnalysisConfig) -> Self {
        let name = name.into();
        let validator = config
            .validation
            .then(|| ConsistencyValidator::new(config.validation_samples, config.validation_seed));
        Self {
            report: EntityReport::new(name.clone()),
            name,
            cleanser: CycleCleanser::new(TransitionRules::standard(), config.retain_flagged),
            validator,
            config,
            buffer: ObservationBuffer::new(),
            cells: Default::default(),
            reconstructor: CycleReconstructor::new(),
            metrics_engine: MetricsEngine::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Buffers one observation for the current cell. Color rows of the head
    /// that is not being analyzed are dropped.
    pub fn add_observation(&mut self, kind: SignalKind, timestamp: i32, value: i16) -> Result<()> {
        let value = u8::try_from(value)
            .ok()
            .filter(|&v| i16::from(v) <= MAX_OBSERVATION_VALUE)
            .ok_or(CycleError::ValueOutOfRange { kind, timestamp, value })?;

        if kind.is_color() && kind != self.config.signal.kind() {
            return Ok(());
        }
        self.buffer.push(kind, Observation::new(timestamp, value));
        Ok(())
    }

    /// Turns the buffered observations into the cleaned cycles of `cell_idx`.
    /// The buffer is cleared whatever the outcome.
    pub fn calc_cycles(&mut self, cell_idx: usize) -> Result<CellOutcome> {
        if cell_idx >= CELLS_PER_SLOT {
            self.buffer.clear();
            return Err(CycleError::CellIndexOutOfRange(cell_idx));
        }

        self.buffer.sort();
        let result = self.rebuild_cell();
        self.buffer.clear();

        match result {
            Ok((cycles, outcome)) => {
                debug!(
                    entity = %self.name,
                    cell = cell_idx,
                    reconstructed = outcome.reconstructed,
                    retained = outcome.retained,
                    skipped = outcome.skipped,
                    "calculated cycles"
                );
                self.cells[cell_idx] = cycles;
                Ok(outcome)
            }
            Err(err) => {
                self.cells[cell_idx].clear();
                self.report.counters.faulted_cells += 1;
                Err(err)
            }
        }
    }

    fn rebuild_cell(&mut self) -> Result<(Vec<Cycle>, CellOutcome)> {
        let Reconstruction {
            cycles,
            skipped,
            color_missing,
            cycle_second_missing,
        } = self
            .reconstructor
            .reconstruct(self.buffer.colors(), self.buffer.cycle_seconds())?;

        if let Some(validator) = self.validator.as_mut() {
            validator.validate(&cycles, self.buffer.colors(), self.buffer.cycle_seconds())?;
        }

        let reconstructed = cycles.len();
        let (retained, cleanse) = self.cleanser.cleanse(cycles);

        let counters = &mut self.report.counters;
        counters.skipped_cycles += skipped;
        counters.color_missing_cells += u32::from(color_missing);
        counters.cycle_second_missing_cells += u32::from(cycle_second_missing);
        counters.cleanse.absorb(&cleanse);

        let outcome = CellOutcome {
            reconstructed,
            retained: retained.len(),
            skipped,
            color_missing,
            cycle_second_missing,
            cleanse,
        };
        Ok((retained, outcome))
    }

    /// Cycles currently stored for `cell_idx`.
    pub fn cell_cycles(&self, cell_idx: usize) -> &[Cycle] {
        self.cells.get(cell_idx).map(Vec::as_slice).unwrap_or_default()
    }

    /// Computes the metric cell for `(day, hour)` over the stored cells and
    /// clears them.
    pub fn calculate_metrics(&mut self, day: usize, hour: usize) -> Result<&MetricsCell> {
        if day >= DAYS_PER_WEEK || hour >= HOURS_PER_DAY {
            return Err(CycleError::SlotOutOfRange { day, hour });
        }

        let result = self.metrics_engine.compute(&self.cells);
        self.cells.iter_mut().for_each(Vec::clear);

        match result {
            Ok(cell) => {
                self.report.counters.gaps_between_cycles += cell.gap_count as u32;
                self.report.metrics[day][hour] = cell;
                Ok(&self.report.metrics[day][hour])
            }
            Err(err) => {
                self.report.counters.faulted_cells += 1;
                Err(err)
            }
        }
    }

    pub fn counters(&self) -> &ReconstructionCounters {
        &self.report.counters
    }

    pub fn report(&self) -> &EntityReport {
        &self.report
    }

    pub fn into_report(self) -> EntityReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::metrics::NO_VALUE;

    const T0: i32 = 1_697_752_800;

    fn feed_cell(analyzer: &mut EntityAnalyzer, base: i32, cycles: usize) {
        // A 30 s cycle: 10 s red, 2 s red-amber, 14 s green, 4 s amber.
        for c in 0..=cycles as i32 {
            let start = base + c * 30;
            analyzer.add_observation(SignalKind::CycleSecond, start, 0).unwrap();
            if c < cycles as i32 {
                for (offset, color) in [(0, 1), (10, 4), (12, 3), (26, 2)] {
                    analyzer
                        .add_observation(SignalKind::PrimarySignal, start + offset, color)
                        .unwrap();
                }
            }
        }
    }

    #[test]
    fn new_analyzer_starts_empty() {
        let analyzer = EntityAnalyzer::new("K1", AnalysisConfig::default());
        assert_eq!(analyzer.name(), "K1");
        assert_eq!(*analyzer.counters(), ReconstructionCounters::default());
        assert_eq!(analyzer.report().metrics_at(0, 0), Some(&MetricsCell::default()));
    }

    #[test]
    fn rejects_oversized_values() {
        let mut analyzer = EntityAnalyzer::new("K1", AnalysisConfig::default());
        assert!(matches!(
            analyzer.add_observation(SignalKind::PrimarySignal, T0, 128),
            Err(CycleError::ValueOutOfRange { value: 128, .. })
        ));
        assert!(analyzer.add_observation(SignalKind::PrimarySignal, T0, -1).is_err());
        assert!(analyzer.add_observation(SignalKind::PrimarySignal, T0, 127).is_ok());
    }

    #[test]
    fn full_slot_produces_metrics() {
        let mut analyzer = EntityAnalyzer::new("K1", AnalysisConfig::default());
        for cell in 0..CELLS_PER_SLOT {
            feed_cell(&mut analyzer, T0 + cell as i32 * 7 * 86_400, 5);
            let outcome = analyzer.calc_cycles(cell).unwrap();
            assert_eq!(outcome.reconstructed, 5);
            assert_eq!(outcome.retained, 5);
        }

        let metrics = analyzer.calculate_metrics(5, 0).unwrap().clone();
        assert_eq!(metrics.cycle_count, 20);
        assert_eq!(metrics.median_green_length, 14.0);
        assert_eq!(metrics.median_phase_distance, 0.0);
        assert_eq!(metrics.shift_fuzziness, 1.0 / 16.0);
        assert_eq!(metrics.green_phase_count, 20);
        assert_eq!(metrics.median_green_reliability, 0.0);

        // Stored cycles are consumed by the metrics call.
        assert!(analyzer.cell_cycles(0).is_empty());
        assert_eq!(analyzer.counters().cleanse.total_cycles, 20);
    }

    #[test]
    fn missing_streams_are_counted_not_failed() {
        let mut analyzer = EntityAnalyzer::new("K1", AnalysisConfig::default());
        analyzer.add_observation(SignalKind::CycleSecond, T0, 0).unwrap();
        let outcome = analyzer.calc_cycles(0).unwrap();
        assert!(outcome.color_missing);
        assert!(!outcome.cycle_second_missing);

        analyzer.calc_cycles(1).unwrap();
        assert_eq!(analyzer.counters().color_missing_cells, 2);
        assert_eq!(analyzer.counters().cycle_second_missing_cells, 1);

        let metrics = analyzer.calculate_metrics(0, 0).unwrap();
        assert_eq!(metrics.median_phase_distance, NO_VALUE);
    }

    #[test]
    fn other_head_is_ignored() {
        let config = AnalysisConfig {
            signal: ColorHead::Secondary,
            ..AnalysisConfig::default()
        };
        let mut analyzer = EntityAnalyzer::new("K1", config);
        feed_cell(&mut analyzer, T0, 3);
        let outcome = analyzer.calc_cycles(0).unwrap();
        assert!(outcome.color_missing);
    }

    #[test]
    fn validation_accepts_reconstructed_cycles() {
        let config = AnalysisConfig {
            validation: true,
            validation_seed: Some(11),
            ..AnalysisConfig::default()
        };
        let mut analyzer = EntityAnalyzer::new("K1", config);
        feed_cell(&mut analyzer, T0, 4);
        assert_eq!(analyzer.calc_cycles(0).unwrap().retained, 4);
    }

    #[test]
    fn out_of_range_indices_are_errors() {
        let mut analyzer = EntityAnalyzer::new("K1", AnalysisConfig::default());
        assert_eq!(analyzer.calc_cycles(4), Err(CycleError::CellIndexOutOfRange(4)));
        assert!(matches!(
            analyzer.calculate_metrics(7, 0),
            Err(CycleError::SlotOutOfRange { day: 7, hour: 0 })
        ));
    }

    #[test]
    fn merge_day_adds_counters_and_takes_one_row() {
        let mut merged = EntityReport::new("K1");
        let mut partial = EntityReport::new("K1");
        partial.counters.skipped_cycles = 3;
        partial.metrics[2][5].median_green_length = 12.0;
        partial.metrics[3][5].median_green_length = 99.0;

        merged.merge_day(partial, 2);
        assert_eq!(merged.counters.skipped_cycles, 3);
        assert_eq!(merged.metrics[2][5].median_green_length, 12.0);
        assert_eq!(merged.metrics[3][5].median_green_length, NO_VALUE);
    }
}
