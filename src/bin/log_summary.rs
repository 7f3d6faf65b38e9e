//! log_summary - summarize an onroadd session log
//!
//! Reads a `detections_<unix-seconds>.jsonl` file (or the newest one in a log
//! directory) and prints duration, average rate, the busiest frame, total detections
//! and per-category totals.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use onroad_pipeline::sink::read_records;
use onroad_pipeline::LogSummary;

#[derive(Parser, Debug)]
#[command(name = "log_summary", about = "Summarize an onroadd detection session log")]
struct Args {
    /// Session log file. Defaults to the newest log in --dir.
    log: Option<PathBuf>,

    /// Directory searched when no log file is given.
    #[arg(long, default_value = "data_logs", value_name = "DIR")]
    dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let path = match args.log {
        Some(path) => path,
        None => newest_session_log(&args.dir)?,
    };

    let records = read_records(&path)?;
    if records.is_empty() {
        return Err(anyhow!("{} contains no records", path.display()));
    }
    println!("log_summary: {}", path.display());
    print!("{}", LogSummary::from_records(&records));
    Ok(())
}

fn newest_session_log(dir: &Path) -> Result<PathBuf> {
    let mut logs = Vec::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read log directory {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let is_session_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("detections_") && name.ends_with(".jsonl"));
        if is_session_log {
            logs.push(path);
        }
    }
    // detections_<unix-seconds>[_<n>]: lexical order is chronological.
    logs.into_iter()
        .max()
        .ok_or_else(|| anyhow!("no detections_*.jsonl logs in {}", dir.display()))
}
