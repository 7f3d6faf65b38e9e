//! onroadd - on-road vehicle counting daemon
//!
//! This daemon:
//! 1. Acquires frames from the configured source (synthetic or still-file capture)
//! 2. Runs the configured detector on every N-th frame
//! 3. Renders every result, refreshes the status panel every M results
//! 4. Appends every result to the session log
//! 5. Stops on Ctrl-C, after `--max-results` results or after `--duration-secs`

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use onroad_pipeline::{
    CancelToken, DetectorRegistry, OutputPlacement, Pipeline, PipelineConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (TOML, or JSON with a .json extension).
    #[arg(long, env = "ONROAD_CONFIG")]
    config: Option<PathBuf>,
    /// Run all stages round-robin on a single thread.
    #[arg(long)]
    simple: bool,
    /// Stop after this many results have been consumed.
    #[arg(long)]
    max_results: Option<u64>,
    /// Stop after this many seconds.
    #[arg(long)]
    duration_secs: Option<u64>,
    /// Print the available detector backends and exit.
    #[arg(long)]
    list_detectors: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let registry = DetectorRegistry::default();
    if args.list_detectors {
        for name in registry.list() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut config = PipelineConfig::load_from(args.config.as_deref())?;
    if args.max_results.is_some() {
        config.max_results = args.max_results;
    }
    let mut settings = config.pipeline_settings();
    if args.simple {
        settings.queue_capacity = 1;
    }
    log::info!(
        "onroadd {} starting: source {}, detector {}",
        env!("CARGO_PKG_VERSION"),
        config.source.url,
        config.detector.backend
    );

    let parts = config.build_parts(&registry)?;
    let mut pipeline = Pipeline::new(settings, parts)?;

    let cancel = pipeline.cancel_token();
    let ctrlc_cancel = cancel.clone();
    ctrlc::set_handler(move || {
        if ctrlc_cancel.cancel() {
            log::info!("shutdown signal received");
        }
    })
    .expect("error setting Ctrl-C handler");

    if let Some(secs) = args.duration_secs {
        spawn_timer(cancel.clone(), Duration::from_secs(secs));
    }

    let report = if args.simple {
        pipeline.run_sequential()?
    } else {
        pipeline.start(OutputPlacement::Inline)?;
        log::info!("onroadd running. press Ctrl-C to stop");
        pipeline.run_output()?;
        pipeline.shutdown()
    };

    for stage in &report.abandoned {
        log::warn!("{} stage was still running at exit", stage);
    }
    log::info!("final: {}", report.stats);
    Ok(())
}

fn spawn_timer(cancel: CancelToken, duration: Duration) {
    let deadline = Instant::now() + duration;
    std::thread::spawn(move || {
        while !cancel.is_cancelled() {
            if Instant::now() >= deadline {
                if cancel.cancel() {
                    log::info!("run duration of {:?} elapsed", duration);
                }
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    });
}
