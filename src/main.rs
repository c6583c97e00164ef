// Batch runner: loads observations, analyzes a week of hour-of-week slots and
// writes the merged report as JSON.

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::{Parser, ValueEnum};
use cycle_lens::core_modules::cell_enumerator::CellEnumerator;
use cycle_lens::core_modules::observation::observation::ColorHead;
use cycle_lens::core_modules::source::{InMemorySource, ObservationSource};
use cycle_lens::{AnalysisConfig, ParallelPipeline};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Head {
    Primary,
    Secondary,
}

impl From<Head> for ColorHead {
    fn from(head: Head) -> Self {
        match head {
            Head::Primary => ColorHead::Primary,
            Head::Secondary => ColorHead::Secondary,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "cycle_lens", version, about = "Traffic-signal cycle reconstruction and hour-of-week metrics")]
struct Args {
    /// Observation rows, one JSON object per line.
    #[arg(long)]
    observations: PathBuf,

    /// Last day of the analysis window (YYYY-MM-DD).
    #[arg(long)]
    end_date: NaiveDate,

    /// IANA time zone that defines local midnight.
    #[arg(long, default_value = "Europe/Berlin")]
    timezone: String,

    /// JSON file with an `AnalysisConfig`; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Which signal head to analyze.
    #[arg(long, value_enum)]
    signal: Option<Head>,

    /// Cross-check reconstructed cycles against the raw observations.
    #[arg(long)]
    validate: bool,

    /// Keep flagged cycles instead of dropping them.
    #[arg(long)]
    retain_flagged: bool,

    #[arg(long)]
    workers: Option<usize>,

    /// Where to write the report. Defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open config {}", path.display()))?;
            serde_json::from_reader(file)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => AnalysisConfig::default(),
    };

    if let Some(head) = args.signal {
        config.signal = head.into();
    }
    config.validation |= args.validate;
    config.retain_flagged |= args.retain_flagged;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let timezone: Tz = args
        .timezone
        .parse()
        .map_err(|err| anyhow!("unknown time zone {}: {}", args.timezone, err))?;

    let source = InMemorySource::from_path(&args.observations)
        .with_context(|| format!("failed to load {}", args.observations.display()))?;
    info!(
        rows = source.len(),
        entities = source.entities().len(),
        "loaded observations"
    );

    let week = CellEnumerator::new(args.end_date, timezone)
        .week()
        .context("failed to enumerate hour-of-week cells")?;

    let pipeline = ParallelPipeline::new(config, Arc::new(source));
    let report = pipeline.run(&week).await.context("analysis failed")?;
    pipeline.shutdown().await;

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    };
    let mut writer = BufWriter::new(writer);
    serde_json::to_writer_pretty(&mut writer, &report).context("failed to write report")?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
