//! CLI for kunetik — host the simulated sensor in-process and poll it.

mod commands;

use clap::{Parser, Subcommand};
use kunetik_core::Unit;

#[derive(Parser)]
#[command(name = "kunetik")]
#[command(about = "kunetik — a single-consumer temperature/humidity sensor you can poll")]
#[command(version = kunetik_core::VERSION)]
struct Cli {
    /// Seed for the simulated sensor (default: OS entropy)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Log at debug level (otherwise RUST_LOG, default warn)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture and read samples
    Read {
        /// Unit to switch to before reading: celsius|c|0, fahrenheit|f|1
        #[arg(long, value_parser = commands::parse_unit)]
        unit: Option<Unit>,

        /// Fail instead of blocking when no sample is ready
        #[arg(long)]
        nonblock: bool,

        /// Do not trigger a capture; the read waits (or fails with --nonblock)
        #[arg(long, conflicts_with = "capture_delay_ms")]
        no_capture: bool,

        /// Trigger the capture from a background thread after this many
        /// milliseconds while the read blocks
        #[arg(long)]
        capture_delay_ms: Option<u64>,

        /// Number of samples to read
        #[arg(long, default_value = "1")]
        count: usize,

        /// Print samples as JSON
        #[arg(long)]
        json: bool,
    },

    /// Poll the sensor and render temperature and humidity until Ctrl+C
    Monitor {
        /// Unit to display: celsius|c|0, fahrenheit|f|1
        #[arg(long, value_parser = commands::parse_unit)]
        unit: Option<Unit>,

        /// Refresh rate in seconds
        #[arg(long, default_value = "1.0")]
        refresh: f64,

        /// Stop after this many samples (0 = until Ctrl+C)
        #[arg(long, default_value = "0")]
        count: usize,
    },

    /// Show or change the measurement unit and its range
    Unit {
        /// New unit: celsius|c|0, fahrenheit|f|1
        #[arg(value_parser = commands::parse_unit)]
        unit: Option<Unit>,
    },

    /// Show device registration, control opcodes and sample layout
    Info {
        /// Print device health as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    commands::init_logging(cli.verbose);

    match cli.command {
        Commands::Read {
            unit,
            nonblock,
            no_capture,
            capture_delay_ms,
            count,
            json,
        } => commands::read::run(commands::read::ReadCommandConfig {
            seed: cli.seed,
            unit,
            nonblock,
            capture: !no_capture,
            capture_delay_ms,
            count,
            json,
        }),
        Commands::Monitor {
            unit,
            refresh,
            count,
        } => commands::monitor::run(cli.seed, unit, refresh, count),
        Commands::Unit { unit } => commands::unit::run(cli.seed, unit),
        Commands::Info { json } => commands::info::run(cli.seed, json),
    }
}
