//! Example Reader
//!
//! Attaches to the demo channel and decodes the telemetry record
//! periodically until Ctrl+C, then removes its handle.

#[path = "telemetry.rs"]
mod telemetry;

use clap::Parser;
use semshm::{Channel, ChannelConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telemetry::Telemetry;

#[derive(Parser)]
#[command(name = "reader", about = "Read telemetry records from a shared memory channel")]
struct Args {
    /// Channel key
    #[arg(short, long, default_value_t = telemetry::KEY)]
    key: i32,

    /// Milliseconds between reads
    #[arg(short, long, default_value_t = 500)]
    period_ms: u64,

    /// Wait for the guard instead of skipping when it is busy
    #[arg(short, long)]
    blocking: bool,
}

fn main() {
    telemetry::init_tracing();
    let args = Args::parse();

    let config = ChannelConfig {
        read_blocking: args.blocking,
        ..ChannelConfig::default()
    };
    let channel = match Channel::open_with(args.key, telemetry::CAPACITY, config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open channel");
            std::process::exit(1);
        }
    };
    tracing::info!(key = args.key, creator = channel.is_creator(), "Channel open");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .ok();

    while running.load(Ordering::SeqCst) {
        match channel.read_record::<Telemetry>() {
            Ok(Some(record)) => {
                // Reads keep the guard by default
                channel.release();
                tracing::info!(
                    tag = %record.tag_str(),
                    data1 = record.data1,
                    data2 = record.data2,
                    data3 = record.data3,
                    "Read record"
                );
            }
            Ok(None) => tracing::debug!("Channel busy, skipping"),
            Err(e) => tracing::warn!(error = %e, "Read failed"),
        }
        std::thread::sleep(Duration::from_millis(args.period_ms));
    }

    match channel.remove() {
        Ok(teardown) => tracing::info!(?teardown, "Channel removed"),
        Err(e) => tracing::warn!(error = %e, "Channel teardown failed"),
    }
}
