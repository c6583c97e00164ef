// THEORY:
// This file is the main entry point for the `cycle_lens` library crate. It
// defines the public API exposed to the runner binary and to any other
// consumer.
//
// The high-level interface is the per-entity `EntityAnalyzer` (with its
// `AnalysisConfig` and `EntityReport`) and, on top of it, the
// `ParallelPipeline` that runs a whole week of hour-of-week slots. The
// algorithms themselves live in `core_modules`: reconstruction, cleansing,
// metrics, validation, window enumeration and the observation source seam.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use error::{CellError, CycleError, PipelineError, Result, SourceError};
pub use parallel_pipeline::{BatchReport, ParallelPipeline};
pub use pipeline::{AnalysisConfig, EntityAnalyzer, EntityReport};
