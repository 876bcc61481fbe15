use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use trainboard::watch::LogWatcher;
use trainboard::{BoardConfig, TimelineHandler};

#[derive(Parser, Debug)]
#[command(name = "trainboard", version, about = "Classify a training log into plottable series")]
struct Args {
    /// Training log: a JSON array with one object per report
    log: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep running and reload the log whenever it changes
    #[arg(short, long)]
    watch: bool,

    /// Seconds between summaries while watching
    #[arg(long, default_value_t = 10)]
    interval_secs: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => BoardConfig::from_path(path)
            .with_context(|| format!("read config {}", path.display()))?,
        None => BoardConfig::default(),
    };
    let handler = Arc::new(TimelineHandler::with_config(config));
    let mut out = io::BufWriter::new(io::stdout());

    if !args.watch {
        handler
            .load(&args.log)
            .with_context(|| format!("load {}", args.log.display()))?;
        write_summary(&handler, &mut out)?;
        out.flush()?;
        return Ok(());
    }

    let debounce = handler.config().debounce();
    let watcher = LogWatcher::spawn(&args.log, Arc::clone(&handler), debounce)
        .with_context(|| format!("watch {}", args.log.display()))?;
    info!("watching {}", watcher.path().display());
    loop {
        write_summary(&handler, &mut out)?;
        out.flush()?;
        std::thread::sleep(Duration::from_secs(args.interval_secs));
    }
}

fn write_summary(handler: &TimelineHandler, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "session={}", handler.session_id()?)?;
    for id in handler.event_series_ids()? {
        let Some(snapshot) = handler.event_snapshot(&id)? else {
            continue;
        };
        let last = snapshot
            .values
            .last()
            .map_or_else(|| "-".to_string(), |v| v.to_string());
        writeln!(
            out,
            "event name={} samples={} last={} state={}",
            id,
            snapshot.values.len(),
            last,
            snapshot.state_hash
        )?;
    }
    for id in handler.tensor_series_ids()? {
        let Some(snapshot) = handler.tensor_snapshot(&id)? else {
            continue;
        };
        let samples = snapshot.percentiles.first().map_or(0, |t| t.data.len());
        writeln!(
            out,
            "tensor name={} samples={} traces={} state={}",
            id,
            samples,
            snapshot.percentiles.len(),
            snapshot.state_hash
        )?;
    }
    Ok(())
}
