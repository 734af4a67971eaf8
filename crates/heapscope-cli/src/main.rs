//! CLI for heapscope: watch an embedded heap breathe over a serial link.

mod commands;
mod tui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "heapscope")]
#[command(about = "heapscope — live heap telemetry from an embedded allocator")]
#[command(version = heapscope_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Live dashboard: heap usage, internal and external fragmentation.
    /// Keys: q quit, n new session, +/- render interval, w scrolling window.
    Monitor {
        /// Device node, FIFO or capture file to read; "-" for stdin.
        /// Line speed is set outside heapscope (e.g. `stty -F /dev/ttyACM0 115200`).
        transport: String,

        /// Heap size configured on the device, in bytes
        #[arg(long, default_value_t = heapscope_core::DEFAULT_TOTAL_HEAP_BYTES)]
        total_heap: u64,

        /// Render/aggregation interval in milliseconds
        #[arg(long, default_value_t = 10)]
        interval_ms: u64,

        /// Device scheduler tick rate in Hz (used for the uptime readout)
        #[arg(long, default_value_t = heapscope_core::DEFAULT_TICK_RATE_HZ)]
        tick_rate: u32,

        /// What to do when the device's cumulative counters go backwards
        #[arg(long, default_value = "new-session", value_parser = ["new-session", "continue"])]
        on_reset: String,

        /// Points kept on screen when the scrolling window is on (0 = whole session)
        #[arg(long, default_value_t = 0)]
        window: usize,

        /// Write log output to this file (logs are discarded otherwise)
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Ingest a capture or device headlessly and print a session summary.
    /// Runs until end of stream or Ctrl+C.
    Stats {
        /// Device node, FIFO or capture file to read; "-" for stdin.
        transport: String,

        /// Heap size configured on the device, in bytes
        #[arg(long, default_value_t = heapscope_core::DEFAULT_TOTAL_HEAP_BYTES)]
        total_heap: u64,

        /// Aggregation interval in milliseconds
        #[arg(long, default_value_t = 10)]
        interval_ms: u64,

        /// What to do when the device's cumulative counters go backwards
        #[arg(long, default_value = "new-session", value_parser = ["new-session", "continue"])]
        on_reset: String,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Monitor {
            transport,
            total_heap,
            interval_ms,
            tick_rate,
            on_reset,
            window,
            log_file,
        } => {
            commands::init_logging(log_file.as_deref(), true);
            commands::monitor::run(
                &transport,
                total_heap,
                interval_ms,
                tick_rate,
                &on_reset,
                window,
            )
        }
        Commands::Stats {
            transport,
            total_heap,
            interval_ms,
            on_reset,
            json,
        } => {
            commands::init_logging(None, false);
            commands::stats::run(&transport, total_heap, interval_ms, &on_reset, json)
        }
    }
}
