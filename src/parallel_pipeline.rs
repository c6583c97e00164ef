// THEORY:
// The parallel pipeline runs a whole week of analysis. The week is split into
// its seven weekday partitions; every partition touches its own hour-of-week
// slots only, so partitions never share state while they run.
//
// Key architectural principles:
// 1.  **Dispatcher + Workers**: Tasks go into one unbounded channel. A single
//     dispatcher hands them round-robin to a fixed set of workers, and each
//     task carries a oneshot sender for its result.
// 2.  **Owned State Per Partition**: A worker builds fresh `EntityAnalyzer`s
//     for every partition it runs. Nothing is locked, nothing is shared.
// 3.  **Blocking Work Off The Reactor**: Reconstruction and metrics are CPU
//     bound, so a partition body runs on `spawn_blocking`.
// 4.  **Join, Then Merge**: Only after every partition has reported are the
//     per-entity outputs folded together: counters add up, each weekday row
//     of metric cells comes from the partition that owns it.
//
// A broken invariant inside one entity-cell is logged and counted, and the
// run carries on. A failing source aborts the run.

use crate::core_modules::cell_enumerator::{DAYS_PER_WEEK, DayCells, WeekCells};
use crate::core_modules::coverage::{CoverageTally, InputCoverage};
use crate::core_modules::source::ObservationSource;
use crate::error::{PipelineError, SourceError};
use crate::pipeline::{AnalysisConfig, EntityAnalyzer, EntityReport, ReconstructionCounters};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Upper bound on workers: there are only seven partitions to hand out.
const MAX_WORKERS: usize = DAYS_PER_WEEK;

/// Resolves the configured worker count. 0 picks the number of CPUs.
pub fn worker_count(config: &AnalysisConfig) -> usize {
    let requested = match config.workers {
        0 => num_cpus::get(),
        n => n,
    };
    requested.clamp(1, MAX_WORKERS)
}

/// The per-entity reports and input coverage of one weekday partition.
#[derive(Debug)]
pub struct DayOutput {
    pub day: usize,
    pub reports: Vec<EntityReport>,
    pub coverage: CoverageTally,
}

pub struct DayTask {
    pub day: usize,
    pub cells: DayCells,
    pub result_sender: oneshot::Sender<Result<DayOutput, PipelineError>>,
}

/// The merged result of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Counters summed over every entity.
    pub totals: ReconstructionCounters,
    /// Raw rows seen over every window, before any analysis.
    pub coverage: InputCoverage,
    /// One report per entity, ordered by name.
    pub entities: Vec<EntityReport>,
}

impl BatchReport {
    pub fn entity(&self, name: &str) -> Option<&EntityReport> {
        self.entities.iter().find(|report| report.name == name)
    }
}

/// Analyzes one weekday partition: every hour, every cell, every entity.
///
/// Entities are taken from the source up front so that silent entities still
/// get a report, and added on the fly when a row names an unknown one.
pub fn process_day(
    config: &AnalysisConfig,
    source: &dyn ObservationSource,
    day: usize,
    cells: &DayCells,
) -> Result<DayOutput, SourceError> {
    let mut analyzers: BTreeMap<String, EntityAnalyzer> = source
        .entities()
        .into_iter()
        .map(|name| (name.clone(), EntityAnalyzer::new(name, config.clone())))
        .collect();
    let mut coverage = CoverageTally::new();

    for (hour, windows) in cells.iter().enumerate() {
        for (cell_idx, window) in windows.iter().enumerate() {
            // --- 1. Route rows to their entity ---
            for row in source.fetch(*window)? {
                coverage.record(&row.entity, row.kind);
                let analyzer = analyzers
                    .entry(row.entity.clone())
                    .or_insert_with(|| EntityAnalyzer::new(row.entity.clone(), config.clone()));
                if let Err(err) = analyzer.add_observation(row.kind, row.phenomenon_time, row.result)
                {
                    warn!(entity = %row.entity, %err, "dropping observation");
                }
            }

            // --- 2. Rebuild the cell for every entity ---
            for (name, analyzer) in analyzers.iter_mut() {
                if let Err(err) = analyzer.calc_cycles(cell_idx) {
                    warn!(entity = %name, day, hour, cell = cell_idx, %err, "skipping entity-cell");
                }
            }
        }

        // --- 3. Summarize the slot ---
        for (name, analyzer) in analyzers.iter_mut() {
            if let Err(err) = analyzer.calculate_metrics(day, hour).map(|_| ()) {
                warn!(entity = %name, day, hour, %err, "skipping slot metrics");
            }
        }
        debug!(day, hour, "slot done");
    }

    info!(day, entities = analyzers.len(), "weekday partition done");
    Ok(DayOutput {
        day,
        reports: analyzers.into_values().map(EntityAnalyzer::into_report).collect(),
        coverage,
    })
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<DayTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(config: AnalysisConfig, source: Arc<dyn ObservationSource>) -> Self {
        let size = worker_count(&config);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<DayTask>();
        let mut workers = Vec::with_capacity(size);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..size)
            .map(|_| mpsc::unbounded_channel::<DayTask>())
            .unzip();

        // Dispatcher
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % size;
            }
        });

        for (worker_id, mut worker_receiver) in worker_receivers.into_iter().enumerate() {
            let worker_config = config.clone();
            let worker_source = Arc::clone(&source);

            let worker = tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let DayTask {
                        day,
                        cells,
                        result_sender,
                    } = task;
                    debug!(worker = worker_id, day, "picked up weekday partition");

                    let config = worker_config.clone();
                    let source = Arc::clone(&worker_source);
                    let output = tokio::task::spawn_blocking(move || {
                        process_day(&config, source.as_ref(), day, &cells)
                    })
                    .await
                    .map_err(PipelineError::from)
                    .and_then(|output| output.map_err(PipelineError::from));

                    let _ = result_sender.send(output);
                }
            });

            workers.push(worker);
        }

        Self {
            task_sender,
            workers,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub async fn process_day(&self, day: usize, cells: DayCells) -> Result<DayOutput, PipelineError> {
        let (result_sender, result_receiver) = oneshot::channel();

        let task = DayTask {
            day,
            cells,
            result_sender,
        };

        self.task_sender
            .send(task)
            .map_err(|_| PipelineError::WorkerPool("failed to send task to worker pool"))?;

        result_receiver
            .await
            .map_err(|_| PipelineError::WorkerPool("failed to receive result from worker"))?
    }

    /// Closes the task channel and waits for every worker to drain.
    pub async fn shutdown(self) {
        let WorkerPool {
            task_sender,
            workers,
        } = self;
        drop(task_sender);
        for worker in workers {
            let _ = worker.await;
        }
    }
}

pub struct ParallelPipeline {
    worker_pool: WorkerPool,
}

impl ParallelPipeline {
    pub fn new(config: AnalysisConfig, source: Arc<dyn ObservationSource>) -> Self {
        Self {
            worker_pool: WorkerPool::new(config, source),
        }
    }

    pub fn workers(&self) -> usize {
        self.worker_pool.size()
    }

    /// Runs all seven weekday partitions and merges their reports.
    pub async fn run(&self, week: &WeekCells) -> Result<BatchReport, PipelineError> {
        info!(workers = self.workers(), "starting weekly analysis");

        let partitions = week
            .iter()
            .enumerate()
            .map(|(day, cells)| self.worker_pool.process_day(day, *cells));
        let outputs = join_all(partitions).await;

        let mut merged: BTreeMap<String, EntityReport> = BTreeMap::new();
        let mut coverage = CoverageTally::new();
        for output in outputs {
            let DayOutput {
                day,
                reports,
                coverage: day_coverage,
            } = output?;
            coverage.absorb(day_coverage);
            for report in reports {
                merged
                    .entry(report.name.clone())
                    .or_insert_with(|| EntityReport::new(report.name.clone()))
                    .merge_day(report, day);
            }
        }

        let mut totals = ReconstructionCounters::default();
        for report in merged.values() {
            totals.absorb(&report.counters);
        }
        info!(
            entities = merged.len(),
            cycles = totals.cleanse.total_cycles,
            faulted = totals.faulted_cells,
            "weekly analysis done"
        );

        Ok(BatchReport {
            totals,
            coverage: coverage.summary(),
            entities: merged.into_values().collect(),
        })
    }

    pub async fn shutdown(self) {
        self.worker_pool.shutdown().await;
    }
}
