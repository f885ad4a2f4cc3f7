//! Offline trace-replay comparator.
//!
//! Reads a per-access JSONL trace, replays the arbiter on the recorded
//! inputs with the Saturn timing preset, and reports agreement, known
//! wait-model gaps, and mismatches. The recorded ticks are never retimed.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use saturnemu_core::replay::{ReplayReport, replay_trace};

#[derive(Parser, Debug)]
#[command(
    name = "trace-replay",
    version,
    about = "Comparative arbiter replay over a recorded per-access trace",
    long_about = "Comparative replay only: keeps the recorded ticks and classifies each \
                  record as agreement, known_ymir_wait_model_gap, or mismatch."
)]
struct Cli {
    /// Input per-access JSONL trace.
    input: PathBuf,

    /// Write per-record annotated JSONL here.
    #[arg(long)]
    annotated_output: Option<PathBuf>,

    /// Write the aggregate summary JSON here.
    #[arg(long)]
    summary_output: Option<PathBuf>,

    /// How many largest-delta records to include in the summary.
    #[arg(long, default_value_t = 20)]
    top: usize,
}

fn write_summary(report: &ReplayReport, top: usize) -> String {
    let mut root = serde_json::Map::new();
    if let Ok(serde_json::Value::Object(summary)) = serde_json::to_value(&report.summary) {
        root.extend(summary);
    }
    let top_deltas: Vec<serde_json::Value> = report
        .top_deltas(top)
        .iter()
        .enumerate()
        .map(|(i, r)| {
            serde_json::json!({
                "rank": i + 1,
                "seq": r.seq,
                "master": r.master,
                "addr": r.addr,
                "size": r.size,
                "delta_wait": r.delta_wait,
                "delta_total": r.delta_total,
                "classification": r.classification,
                "region": r.region,
            })
        })
        .collect();
    root.insert("top_deltas".into(), serde_json::Value::Array(top_deltas));
    serde_json::to_string_pretty(&serde_json::Value::Object(root)).unwrap_or_default()
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let input = match fs::read_to_string(&cli.input) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("Failed to read input trace {}: {err}", cli.input.display());
            return ExitCode::FAILURE;
        }
    };

    let report = replay_trace(&input);

    if let Some(path) = &cli.annotated_output {
        if let Err(err) = fs::write(path, report.annotated_jsonl()) {
            eprintln!("Failed to write annotated output {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    }
    if let Some(path) = &cli.summary_output {
        if let Err(err) = fs::write(path, write_summary(&report, cli.top)) {
            eprintln!("Failed to write summary output {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    }

    let s = &report.summary;
    println!(
        "replayed {} records: {} agreement, {} known-gap, {} mismatch ({} malformed skipped)",
        s.records_processed,
        s.agreement_count,
        s.known_gap_count,
        s.mismatch_count,
        s.malformed_lines_skipped
    );
    ExitCode::SUCCESS
}
