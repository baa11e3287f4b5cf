//! roster-ingest CLI.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ri_config::ConfigOverrides;
use ri_core::exit_codes::ExitCode;
use ri_core::fixture::{write_fixture, FixtureSpec};
use ri_core::memory::CountingAlloc;
use ri_core::report;

#[global_allocator]
static ALLOC: CountingAlloc = CountingAlloc;

#[derive(Parser)]
#[command(
    name = "roster-ingest",
    version,
    about = "Stream employee CSV files into a relational store under bounded memory"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a CSV file into the store
    Ingest {
        /// Input CSV file
        input: PathBuf,

        /// SQLite database path
        #[arg(long, default_value = "employees.db")]
        db: PathBuf,

        /// Batch capacity B
        #[arg(long)]
        batch_size: Option<usize>,

        /// Memory-pressure threshold in MB
        #[arg(long)]
        max_memory_mb: Option<f64>,

        /// Memory sampling interval in milliseconds
        #[arg(long)]
        monitor_interval_ms: Option<u64>,

        /// Skip the memory monitor entirely
        #[arg(long)]
        no_memory_monitor: bool,

        /// Pass invalid records through to the writer instead of dropping
        /// them before batching
        #[arg(long)]
        keep_invalid: bool,
    },

    /// Generate a deterministic test fixture CSV
    Generate {
        /// Output CSV file
        output: PathBuf,

        /// Number of data rows
        #[arg(long, default_value_t = 1000)]
        rows: usize,

        /// Fraction of rows made invalid (deterministic stride)
        #[arg(long, default_value_t = 0.1)]
        invalid_rate: f64,

        /// Trailing rows that duplicate the first email
        #[arg(long, default_value_t = 0)]
        duplicates: usize,

        /// RNG seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Ingest {
            input,
            db,
            batch_size,
            max_memory_mb,
            monitor_interval_ms,
            no_memory_monitor,
            keep_invalid,
        } => {
            let overrides = ConfigOverrides {
                batch_size,
                max_memory_mb,
                monitor_interval_ms,
                disable_memory_monitor: no_memory_monitor.then_some(true),
                filter_invalid: keep_invalid.then_some(false),
            };
            match ri_config::resolve_env(&overrides) {
                Ok(cfg) => {
                    let outcome = ri_core::run(&cfg, &input, &db);
                    print!("{}", report::render(&outcome.summary, outcome.error.as_ref()));
                    match outcome.error {
                        None => ExitCode::Clean,
                        Some(e) => ExitCode::for_error(&e),
                    }
                }
                Err(e) => {
                    eprintln!("{e}");
                    ExitCode::for_error(&e)
                }
            }
        }
        Command::Generate {
            output,
            rows,
            invalid_rate,
            duplicates,
            seed,
        } => {
            let spec = FixtureSpec {
                rows,
                invalid_rate,
                duplicates,
                seed,
            };
            match write_fixture(&output, &spec) {
                Ok(stats) => {
                    println!(
                        "Wrote {} rows ({} invalid, {} duplicate emails) to {}",
                        stats.rows,
                        stats.invalid,
                        stats.duplicates,
                        output.display()
                    );
                    ExitCode::Clean
                }
                Err(e) => {
                    eprintln!("{e}");
                    ExitCode::for_error(&e)
                }
            }
        }
    };
    process::exit(code.as_i32());
}
