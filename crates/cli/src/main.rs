//! MOESI coherency test CLI.
//!
//! This binary drives one test directory through its lifecycle. It performs:
//! 1. **Generate:** Random memory plus a synthesized MOESI-valid cache state, written as the
//!    images the external simulation preloads.
//! 2. **Check:** Reloads those images, waits for the simulation to finish, then replays its
//!    diff logs and checks every time window.
//! 3. **Run:** Generate, then check when the configuration asks for it.
//!
//! Exit status is 0 when every checkpoint is clean, 1 when a violation was recorded and 2 on
//! fatal errors. Log verbosity follows `RUST_LOG` (default `info`).

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use moesi_core::{CoherencyTest, Config, RunReport, SimulationReady};

#[derive(Parser, Debug)]
#[command(
    name = "moesi",
    author,
    version,
    about = "MOESI cache coherency test harness",
    long_about = "Generate a consistent initial cache state for an external multi-master simulation, \
                  then replay its diff logs and check MOESI invariants at every timestamp.\n\n\
                  Examples:\n  moesi generate -c coherency.json\n  moesi check -c coherency.json --yes\n  \
                  moesi run -c coherency.json"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ConfigArg {
    /// JSON configuration file.
    #[arg(short, long)]
    config: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write random memory and a synthesized cache state to the target directory.
    Generate {
        #[command(flatten)]
        config: ConfigArg,
    },

    /// Replay the simulation's diff logs over the saved state and check coherency.
    Check {
        #[command(flatten)]
        config: ConfigArg,

        /// Do not wait for confirmation that the simulation has finished.
        #[arg(short, long)]
        yes: bool,
    },

    /// Generate, then check when the configuration enables checking.
    Run {
        #[command(flatten)]
        config: ConfigArg,

        /// Do not wait for confirmation that the simulation has finished.
        #[arg(short, long)]
        yes: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Generate { config } => cmd_generate(&config.config).map(|_| None),
        Commands::Check { config, yes } => cmd_check(&config.config, yes).map(Some),
        Commands::Run { config, yes } => cmd_run(&config.config, yes),
    };

    match outcome {
        Ok(Some(report)) if !report.passed() => ExitCode::from(1),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal");
            ExitCode::from(2)
        }
    }
}

/// Builds a session, checks its generated state and writes it out.
fn cmd_generate(path: &Path) -> moesi_core::Result<CoherencyTest> {
    let mut test = CoherencyTest::new(Config::from_file(path)?)?;
    let prepared = test.prepare()?;
    println!(
        "Generated {} lines ({} attempts skipped) in {}; initial check: {} violation(s)",
        prepared.seeded.planted,
        prepared.seeded.skipped,
        test.paths().root().display(),
        prepared.initial.violations.len()
    );
    Ok(test)
}

/// Reloads the saved state and checks the simulation's logs against it.
fn cmd_check(path: &Path, yes: bool) -> moesi_core::Result<RunReport> {
    let mut test = CoherencyTest::new(Config::from_file(path)?)?;
    test.load_state()?;
    verify(&mut test, yes)
}

fn cmd_run(path: &Path, yes: bool) -> moesi_core::Result<Option<RunReport>> {
    let mut test = cmd_generate(path)?;
    if !test.config().check {
        info!("checking disabled; run `moesi check` once the simulation has finished");
        return Ok(None);
    }
    verify(&mut test, yes).map(Some)
}

fn verify(test: &mut CoherencyTest, yes: bool) -> moesi_core::Result<RunReport> {
    let ready = if yes { SimulationReady::confirm() } else { wait_for_simulation(test)? };
    let report = test.reconstruct(ready)?;
    print_summary(&report);
    Ok(report)
}

/// Blocks until the operator confirms the simulation has written its logs.
fn wait_for_simulation(test: &CoherencyTest) -> moesi_core::Result<SimulationReady> {
    print!(
        "Run the simulation on {} and press Enter when it has finished... ",
        test.paths().root().display()
    );
    let mut stdout = io::stdout();
    stdout
        .flush()
        .map_err(|e| moesi_core::Error::io("<stdout>", e))?;
    let mut line = String::new();
    let _ = io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| moesi_core::Error::io("<stdin>", e))?;
    Ok(SimulationReady::confirm())
}

fn print_summary(report: &RunReport) {
    println!();
    println!("==========================================================");
    println!("COHERENCY CHECK");
    println!("==========================================================");
    println!("checkpoints        {}", report.checkpoints.len());
    println!(
        "lines skipped      {}",
        report
            .checkpoints
            .iter()
            .map(|cp| cp.report.skipped.len())
            .sum::<usize>()
    );
    println!(
        "diffs rejected     {}",
        report.checkpoints.iter().map(|cp| cp.rejected).sum::<usize>()
    );
    println!("violations         {}", report.violation_count());
    for (time, violation) in report.violations() {
        println!("  @{time:<10} {violation}");
    }
    println!(
        "result             {}",
        if report.passed() { "PASS" } else { "FAIL" }
    );
}
