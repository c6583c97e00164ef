// THEORY:
// Every failure the engine can report is a typed value. Missing data is not a
// failure: an absent observation stream is reported through flags and counters.
// What lands here are caller mistakes (out-of-range indices, oversized values)
// and broken invariants inside a single entity-cell. The batch driver isolates
// the latter to the offending entity instead of aborting the whole run.

use crate::core_modules::observation::observation::SignalKind;

/// Common result type for the cycle engine.
pub type Result<T> = std::result::Result<T, CycleError>;

/// Errors raised while reconstructing, validating or summarizing cycles.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CycleError {
    #[error("observation value {value} for {kind} at {timestamp} exceeds 127")]
    ValueOutOfRange {
        kind: SignalKind,
        timestamp: i32,
        value: i16,
    },

    #[error("cell index {0} is out of range (expected 0..4)")]
    CellIndexOutOfRange(usize),

    #[error("slot day {day} / hour {hour} is out of range (expected 0..7 / 0..24)")]
    SlotOutOfRange { day: usize, hour: usize },

    /// A reconstructed cycle whose result count disagrees with its time span.
    #[error("cycle [{start}, {end}) holds {len} results")]
    LengthMismatch { start: i32, end: i32, len: usize },

    /// Green phase starts and green-to-green gaps disagree within one run.
    #[error("run holds {phases} green phases but {durations} gaps between them")]
    GreenPhaseMismatch { phases: usize, durations: usize },

    /// The debug-only consistency validator found a cycle that is not backed
    /// by the raw observations it was built from.
    #[error("consistency check failed: {0}")]
    ValidationFailed(String),
}

/// Errors raised by an observation source collaborator.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read observations: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed observation row on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while enumerating hour-of-week windows.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CellError {
    #[error("weekday {0} is out of range (expected 0 = Sunday ..= 6 = Saturday)")]
    InvalidWeekday(usize),

    #[error("local midnight of {0} does not exist in the configured time zone")]
    NonexistentMidnight(chrono::NaiveDate),
}

/// Errors raised by the parallel batch driver.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("worker pool unavailable: {0}")]
    WorkerPool(&'static str),

    #[error("worker task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}
