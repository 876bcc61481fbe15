//! Replays a finished training log into a file, one report at a time, the way
//! a running training process would. Useful for trying the watcher by hand.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use log::info;

use trainboard::loader::read_records;
use trainboard::RawRecord;

#[derive(Parser, Debug)]
#[command(name = "simulate-reporter", version, about = "Replay a training log report by report")]
struct Args {
    /// Complete training log to replay
    infile: PathBuf,

    /// File rewritten with a growing prefix of the log
    outfile: PathBuf,

    /// Seconds to wait before each report
    #[arg(short = 't', long, default_value_t = 10.0)]
    time_interval: f64,

    /// Only log warnings
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    ensure!(
        args.time_interval.is_finite() && args.time_interval >= 0.0,
        "time interval must be a non-negative number of seconds"
    );

    info!("loading input file {} ...", args.infile.display());
    let records = read_records(&args.infile)
        .with_context(|| format!("read {}", args.infile.display()))?;
    let n = records.len();
    info!("loading input file {} done. {} records found.", args.infile.display(), n);

    let interval = Duration::from_secs_f64(args.time_interval);
    for i in 0..n {
        info!("sleeping for {:.1} sec [{}/{}] ...", args.time_interval, i + 1, n);
        std::thread::sleep(interval);
        write_prefix(&args.outfile, &records[..=i])
            .with_context(|| format!("write {}", args.outfile.display()))?;
        info!("dumped {}/{} records to {}", i + 1, n, args.outfile.display());
    }
    Ok(())
}

/// Write through a sibling temp file so readers never see a partial log.
fn write_prefix(path: &Path, records: &[RawRecord]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut writer = BufWriter::new(File::create(&tmp)?);
    serde_json::to_writer(&mut writer, records)?;
    writer.flush()?;
    drop(writer);
    std::fs::rename(&tmp, path)?;
    Ok(())
}
