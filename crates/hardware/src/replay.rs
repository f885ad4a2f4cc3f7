//! Offline trace replay.
//!
//! Consumes per-access JSONL records captured from a reference run and
//! re-runs the arbiter with the Saturn timing preset on the same inputs,
//! comparing the waits and totals the arbiter would produce against what the
//! recording observed. The recorded ticks are never mutated; each record is
//! classified as agreement, a known wait-model gap, or a mismatch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bus::arbiter::BusArbiter;
use crate::bus::op::{BusKind, BusMaster, BusOp};
use crate::bus::timing::{AccessTiming, SaturnTiming, region_name};
use crate::config::ArbiterConfig;
use crate::dev::DeviceHub;
use crate::mem::CommittedMemory;
use crate::trace::TraceLog;

/// One recorded access, as parsed from the input JSONL.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessRecord {
    /// Recording-order sequence number.
    pub seq: u64,
    /// Master name: `MSH2`, `SSH2`, or `DMA`.
    pub master: String,
    /// Tick of the first grant attempt.
    pub tick_first_attempt: u64,
    /// Tick at which the access completed.
    pub tick_complete: u64,
    /// Address, hex text with or without a `0x` prefix.
    pub addr: String,
    /// Access size in bytes.
    pub size: u8,
    /// `R` or `W`.
    pub rw: String,
    /// Recorded access kind tag (carried through unchanged).
    pub kind: String,
    /// Service cycles the recording charged.
    pub service_cycles: u32,
    /// Retries the recording observed.
    pub retries: u32,
}

impl AccessRecord {
    fn parse_addr(&self) -> Option<u32> {
        let text = self.addr.trim_start_matches("0x").trim_start_matches("0X");
        u32::from_str_radix(text, 16).ok()
    }

    fn parse_master(&self) -> Option<BusMaster> {
        match self.master.as_str() {
            "MSH2" => Some(BusMaster::CpuA),
            "SSH2" => Some(BusMaster::CpuB),
            "DMA" => Some(BusMaster::Dma),
            _ => None,
        }
    }
}

/// Classification of one replayed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Arbiter and recording agree on wait and total.
    Agreement,
    /// Known gap: the reference skips the wait check on byte accesses.
    KnownYmirWaitModelGap,
    /// Unexplained timing difference.
    Mismatch,
}

impl Classification {
    /// Stable tag used in outputs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Agreement => "agreement",
            Self::KnownYmirWaitModelGap => "known_ymir_wait_model_gap",
            Self::Mismatch => "mismatch",
        }
    }
}

/// One record's replay outcome, serialisable as an annotated JSONL line.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayResult {
    /// Recorded sequence number.
    pub seq: u64,
    /// Recorded master name.
    pub master: String,
    /// Recorded first-attempt tick (never mutated).
    pub tick_first_attempt: u64,
    /// Recorded completion tick (never mutated).
    pub tick_complete: u64,
    /// Recorded address text.
    pub addr: String,
    /// Access size in bytes.
    pub size: u8,
    /// `R` or `W`.
    pub rw: String,
    /// Recorded access kind tag.
    pub kind: String,
    /// Service cycles the recording charged.
    pub service_cycles: u32,
    /// Retries the recording observed.
    pub retries: u32,
    /// Effective wait derived from the recording.
    pub ymir_effective_wait: u32,
    /// Effective total derived from the recording.
    pub ymir_effective_total: u32,
    /// How the effective wait was derived.
    pub ymir_wait_metric_kind: &'static str,
    /// Wait the replayed arbiter reports.
    pub arbiter_wait: u32,
    /// Service cycles the replayed arbiter charges.
    pub arbiter_service_cycles: u32,
    /// `arbiter_wait + arbiter_service_cycles`.
    pub arbiter_total: u32,
    /// `arbiter_wait - ymir_effective_wait`.
    pub delta_wait: i64,
    /// `arbiter_total - ymir_effective_total`.
    pub delta_total: i64,
    /// Classification tag.
    pub classification: &'static str,
    /// Reason tag for known gaps, empty otherwise.
    pub known_gap_reason: &'static str,
    /// Timed region containing the address.
    pub region: &'static str,
}

/// Aggregate replay statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplaySummary {
    /// Records replayed.
    pub records_processed: usize,
    /// Lines that failed to parse and were skipped.
    pub malformed_lines_skipped: usize,
    /// Duplicate sequence numbers observed in input order.
    pub duplicate_seq_count: usize,
    /// Sequence numbers that went backwards in input order.
    pub non_monotonic_seq_count: usize,
    /// Records classified as agreement.
    pub agreement_count: usize,
    /// Records classified as mismatch.
    pub mismatch_count: usize,
    /// Records classified as a known gap.
    pub known_gap_count: usize,
    /// Known-gap records that were byte accesses.
    pub known_gap_byte_access_count: usize,
    /// `region | classification` histogram.
    pub delta_histogram: BTreeMap<String, usize>,
}

/// Full replay output.
#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    /// Per-record outcomes, in replay order.
    pub results: Vec<ReplayResult>,
    /// Aggregate statistics.
    pub summary: ReplaySummary,
}

impl ReplayReport {
    /// Returns the `n` records with the largest absolute total delta.
    pub fn top_deltas(&self, n: usize) -> Vec<&ReplayResult> {
        let mut sorted: Vec<&ReplayResult> = self.results.iter().collect();
        sorted.sort_by_key(|r| std::cmp::Reverse(r.delta_total.unsigned_abs()));
        sorted.truncate(n);
        sorted
    }

    /// Serialises the results as annotated JSONL.
    pub fn annotated_jsonl(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            if let Ok(line) = serde_json::to_string(result) {
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }
}

/// Replays a per-access JSONL trace against the Saturn-preset arbiter.
///
/// Records are stable-sorted by `(tick_complete, seq)` before replay.
/// Malformed lines are skipped and counted; duplicate and non-monotonic
/// sequence numbers are counted as seen in input order.
pub fn replay_trace(input: &str) -> ReplayReport {
    let mut report = ReplayReport::default();
    let mut records = Vec::new();
    let mut seen_seq = std::collections::BTreeSet::new();
    let mut previous_seq: Option<u64> = None;

    for (line_number, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<AccessRecord>(line) else {
            report.summary.malformed_lines_skipped += 1;
            tracing::warn!(line = line_number + 1, "malformed replay line skipped");
            continue;
        };
        if record.parse_addr().is_none() || record.parse_master().is_none() {
            report.summary.malformed_lines_skipped += 1;
            tracing::warn!(line = line_number + 1, "unparseable addr or master, line skipped");
            continue;
        }
        if !seen_seq.insert(record.seq) {
            report.summary.duplicate_seq_count += 1;
            tracing::warn!(seq = record.seq, "duplicate sequence number");
        }
        if previous_seq.is_some_and(|prev| record.seq <= prev) {
            report.summary.non_monotonic_seq_count += 1;
            tracing::warn!(seq = record.seq, "non-monotonic sequence number");
        }
        previous_seq = Some(record.seq);
        records.push(record);
    }

    records.sort_by_key(|r| (r.tick_complete, r.seq));

    // Side effects of the replayed commits land in throwaway state; only
    // the arbiter's timing bookkeeping matters here.
    let mut arbiter = BusArbiter::new(
        CommittedMemory::with_size(4096),
        DeviceHub::new(),
        Box::new(SaturnTiming),
        ArbiterConfig::default(),
    );
    let mut scratch_trace = TraceLog::new();

    for record in records {
        let (Some(addr), Some(master)) = (record.parse_addr(), record.parse_master()) else {
            continue;
        };
        let is_write = record.rw == "W";
        let kind = if is_write { BusKind::Write } else { BusKind::Read };
        let op = BusOp::new(
            master,
            record.tick_first_attempt,
            record.seq,
            kind,
            addr,
            record.size,
            0,
        );

        let wait = arbiter.query_wait(&op);
        let _ = arbiter.commit_grant(&op, record.tick_first_attempt, false, &mut scratch_trace);

        let has_exact_ticks = record.tick_complete >= record.tick_first_attempt;
        let (ymir_effective_wait, ymir_effective_total, ymir_wait_metric_kind) = if has_exact_ticks
        {
            let total = (record.tick_complete - record.tick_first_attempt) as u32;
            let wait_part = total.saturating_sub(record.service_cycles);
            (wait_part, total, "exact_tick_elapsed")
        } else {
            let wait_part = record.retries * record.service_cycles;
            (wait_part, wait_part + record.service_cycles, "proxy_retries_x_service")
        };

        let arbiter_wait = wait.wait_cycles;
        let arbiter_service_cycles =
            SaturnTiming.access_cycles(addr, is_write, record.size).max(1);
        let arbiter_total = arbiter_wait + arbiter_service_cycles;
        let delta_wait = i64::from(arbiter_wait) - i64::from(ymir_effective_wait);
        let delta_total = i64::from(arbiter_total) - i64::from(ymir_effective_total);

        let known_byte_gap = record.size == 1 && record.retries == 0 && delta_wait > 0;
        let classification = if known_byte_gap {
            Classification::KnownYmirWaitModelGap
        } else if delta_total == 0 && delta_wait == 0 {
            Classification::Agreement
        } else {
            Classification::Mismatch
        };
        match classification {
            Classification::Agreement => report.summary.agreement_count += 1,
            Classification::Mismatch => report.summary.mismatch_count += 1,
            Classification::KnownYmirWaitModelGap => {
                report.summary.known_gap_count += 1;
                report.summary.known_gap_byte_access_count += 1;
            }
        }

        let region = region_name(addr);
        *report
            .summary
            .delta_histogram
            .entry(format!("{region} | {}", classification.name()))
            .or_insert(0) += 1;

        report.results.push(ReplayResult {
            seq: record.seq,
            master: record.master,
            tick_first_attempt: record.tick_first_attempt,
            tick_complete: record.tick_complete,
            addr: record.addr,
            size: record.size,
            rw: record.rw,
            kind: record.kind,
            service_cycles: record.service_cycles,
            retries: record.retries,
            ymir_effective_wait,
            ymir_effective_total,
            ymir_wait_metric_kind,
            arbiter_wait,
            arbiter_service_cycles,
            arbiter_total,
            delta_wait,
            delta_total,
            classification: classification.name(),
            known_gap_reason: if known_byte_gap { "byte_access_wait_check_gap" } else { "" },
            region,
        });
    }

    report.summary.records_processed = report.results.len();
    report
}
