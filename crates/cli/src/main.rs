//! Saturn-class dual-SH2 emulator CLI.
//!
//! This binary is a thin front over the core crate: it parses flags into a
//! `RunConfig`, installs console logging, and runs the driver. Without
//! `--bios` the built-in deterministic dual-CPU demo runs and prints its
//! trace.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use saturnemu_core::config::defaults;
use saturnemu_core::{Emulator, RunConfig};

#[derive(Parser, Debug)]
#[command(
    name = "saturnemu",
    version,
    about = "Deterministic dual-SH2 bus-arbitration core",
    long_about = "Run a BIOS image on the dual-SH2 core, or the built-in deterministic \
                  dual-CPU demo when no BIOS is given.\n\nExamples:\n  \
                  saturnemu --dual-demo\n  \
                  saturnemu --bios bios.bin --headless --trace trace.jsonl --max-steps 5000"
)]
struct Cli {
    /// BIOS image loaded at physical address zero.
    #[arg(long)]
    bios: Option<PathBuf>,

    /// Write the run's trace to this path as JSON lines.
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Skip the presentation hook.
    #[arg(long)]
    headless: bool,

    /// Retired-instruction budget across both CPUs.
    #[arg(long, default_value_t = defaults::MAX_STEPS)]
    max_steps: u64,

    /// Run the built-in demo even when a BIOS image is given.
    #[arg(long)]
    dual_demo: bool,

    /// Stop the run loop after the first fault record.
    #[arg(long)]
    halt_on_fault: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RunConfig {
        headless: cli.headless,
        dual_demo: cli.dual_demo || cli.bios.is_none(),
        bios_path: cli.bios,
        trace_path: cli.trace,
        max_steps: cli.max_steps,
        halt_on_fault: cli.halt_on_fault,
    };

    let mut emulator = Emulator::new();
    match emulator.run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Fatal: {err}");
            ExitCode::FAILURE
        }
    }
}
