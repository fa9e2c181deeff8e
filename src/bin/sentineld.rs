//! sentineld - motion sentinel daemon
//!
//! This daemon:
//! 1. Loads configuration (file named by SENTINEL_CONFIG, env, flags)
//! 2. Loads Telegram credentials, prompting once on first run
//! 3. Opens the camera and takes a seed frame
//! 4. Compares every frame with the previous one and alerts on motion
//! 5. Releases the camera on Ctrl-C / SIGTERM; a second signal, or a read that
//!    outlasts the grace period, exits at once

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use motion_sentinel::{
    AlertDispatcher, CameraSource, CredentialStore, Sentinel, SentinelConfig, ShutdownSignal,
    TelegramNotifier, DEFAULT_SHUTDOWN_GRACE,
};

/// 128 + SIGINT.
const FORCED_EXIT_CODE: i32 = 130;

#[derive(Parser, Debug)]
#[command(author, version, about = "Watch a camera and send a Telegram alert on motion")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// Frame source: /dev/videoN, a device index, http(s)://snapshot-url or stub://name.
    #[arg(long)]
    source: Option<String>,

    /// Credentials file (created interactively when missing).
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Changed-pixel count that must be exceeded to alert.
    #[arg(long)]
    threshold_px: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = SentinelConfig::load_from(args.config.as_deref())?;
    if let Some(source) = args.source {
        config.source = source;
    }
    if let Some(path) = args.credentials {
        config.credentials_path = path;
    }
    if let Some(threshold) = args.threshold_px {
        config.detection.motion_threshold_px = threshold;
    }
    config.validate()?;

    let credentials = CredentialStore::new(&config.credentials_path).load()?;
    let notifier = TelegramNotifier::new(&config.alert.api_base, config.alert.timeout)?;

    let shutdown = ShutdownSignal::new(DEFAULT_SHUTDOWN_GRACE, || {
        std::process::exit(FORCED_EXIT_CODE);
    });
    let handler = shutdown.clone();
    ctrlc::set_handler(move || handler.trigger())?;

    let source = CameraSource::open(&config.source)?;
    let mut sentinel = Sentinel::arm(
        source,
        config.sentinel_settings()?,
        AlertDispatcher::new(notifier),
        credentials,
    )?;

    println!("Motion sentinel armed. Waiting for motion … (Ctrl+C to exit)");

    sentinel.run(shutdown.stop_flag());
    let stats = sentinel.shutdown();
    shutdown.finish();
    log::info!(
        "sentinel stopped: cycles={} skipped={} alerts={} failed_dispatches={}",
        stats.cycles,
        stats.skipped,
        stats.alerts,
        stats.failed_dispatches
    );
    Ok(())
}
