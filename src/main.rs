//! linepoll - print lines from devices, pipes and sysfs values as they change
//!
//! Usage:
//!     linepoll [[--default] [--debounce MS] [--unique] [--duplicate]
//!               [--delimiters DELIMS] [+FORMAT] FILE] ...
//!
//! Options apply to every FILE that follows them. FORMAT takes `%l` (line),
//! `%p` (path) and `%t` (read time, microseconds since the epoch).

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};
use tracing::{error, Level};

use linepoll::{parse_sources, stdout_file, Scheduler, SourceSpec};

/// Wait for changes on character devices, named pipes and
/// /sys/class/gpio/gpioN/value style files, and print their lines.
#[derive(Debug, Parser)]
#[command(name = "linepoll", version, about, long_about = None)]
struct Cli {
    /// Log more to stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Files to poll, each preceded by the options that apply to it:
    /// --default, --debounce MS, --unique, --duplicate, --delimiters DELIMS, +FORMAT
    #[arg(
        value_name = "[OPTIONS] FILE",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    sources: Vec<String>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(specs: Vec<SourceSpec>) -> Result<()> {
    let stdout = stdout_file().context("stdout")?;
    let mut scheduler = Scheduler::new(stdout);

    for spec in specs {
        scheduler.add_source(spec)?;
    }

    match scheduler.run().await? {}
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let specs = match parse_sources(&cli.sources) {
        Ok(specs) => specs,
        Err(e) => Cli::command().error(ErrorKind::ValueValidation, e).exit(),
    };

    match run(specs).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
