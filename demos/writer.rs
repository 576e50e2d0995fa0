//! Example Writer
//!
//! Opens the demo channel and publishes a telemetry record periodically
//! until Ctrl+C, then removes its handle.

#[path = "telemetry.rs"]
mod telemetry;

use clap::Parser;
use semshm::Channel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telemetry::Telemetry;

#[derive(Parser)]
#[command(name = "writer", about = "Publish telemetry records to a shared memory channel")]
struct Args {
    /// Channel key
    #[arg(short, long, default_value_t = telemetry::KEY)]
    key: i32,

    /// Milliseconds between writes
    #[arg(short, long, default_value_t = 1000)]
    period_ms: u64,

    /// Stop after this many writes (0 = run until Ctrl+C)
    #[arg(short, long, default_value_t = 0)]
    count: u64,
}

fn main() {
    telemetry::init_tracing();
    let args = Args::parse();

    let channel = match Channel::open(args.key, telemetry::CAPACITY) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open channel");
            eprintln!("Use ipcs/ipcrm to clear stale segments, or reboot.");
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

    let mut sent = 0u64;
    let mut record = Telemetry::new(12, -2353, 3456);
    while running.load(Ordering::SeqCst) && (args.count == 0 || sent < args.count) {
        match channel.write_record(&record) {
            Ok(outcome) if outcome.is_done() => {
                sent += 1;
                tracing::info!(
                    tag = %record.tag_str(),
                    data1 = record.data1,
                    data2 = record.data2,
                    data3 = record.data3,
                    "Wrote record"
                );
            }
            Ok(_) => tracing::debug!("Channel busy, skipping"),
            Err(e) => tracing::warn!(error = %e, "Write failed"),
        }
        record.data1 = record.data1.wrapping_add(1);
        std::thread::sleep(Duration::from_millis(args.period_ms));
    }

    match channel.remove() {
        Ok(teardown) => tracing::info!(sent, ?teardown, "Channel removed"),
        Err(e) => tracing::warn!(error = %e, "Channel teardown failed"),
    }
}
