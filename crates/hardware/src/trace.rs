//! Deterministic trace log.
//!
//! The trace is the core's observable output: an append-only list of tagged
//! lines, each a literal tag (`COMMIT`, `STATE`, `FAULT`) followed by one
//! JSON object. Records serialize with declared field order and no
//! whitespace, so identical runs yield byte-identical trace text. Numeric
//! fields (addresses included) are emitted as decimal.
//!
//! Fault records double as the recoverable-error channel: the core never
//! aborts mid-commit, and a `halt_on_fault` latch lets the driver stop the
//! run loop after the first fault.

use std::io::{self, Write};

use serde::Serialize;

use crate::bus::op::BusOp;
use crate::common::Tick;

/// One committed bus grant, as recorded by the arbiter.
#[derive(Debug, Clone)]
pub struct CommitEvent {
    /// Tick at which the grant began occupying the bus.
    pub t_start: Tick,
    /// Tick at which the bus became free again.
    pub t_end: Tick,
    /// The committed request.
    pub op: BusOp,
    /// `t_end - op.req_time`.
    pub stall: Tick,
    /// Value read (zero for writes and barriers).
    pub value: u32,
    /// Whether the access was satisfied without occupying the bus.
    pub cache_hit: bool,
}

/// Architectural CPU snapshot appended at each retirement.
#[derive(Debug, Clone, Serialize)]
pub struct CpuSnapshot {
    /// CPU-local tick after the retirement.
    pub t: Tick,
    /// CPU id.
    pub cpu: i32,
    /// Program counter after the retirement.
    pub pc: u32,
    /// Status register.
    pub sr: u32,
    /// General registers R0..R15.
    pub r: [u32; 16],
}

/// A recoverable fault, recorded in-band.
#[derive(Debug, Clone, Serialize)]
pub struct FaultEvent {
    /// CPU-local tick of the fault.
    pub t: Tick,
    /// CPU id.
    pub cpu: i32,
    /// Program counter at the fault.
    pub pc: u32,
    /// Fault-specific detail word (opcode, vector, address).
    pub detail: u32,
    /// Stable reason tag, e.g. `ILLEGAL_OP`.
    pub reason: &'static str,
}

#[derive(Serialize)]
struct CommitRecord<'a> {
    t_start: Tick,
    t_end: Tick,
    stall: Tick,
    cpu: i32,
    kind: &'a str,
    phys: u32,
    size: u8,
    val: u32,
    src: &'a str,
    cache_hit: bool,
}

/// Append-only trace of COMMIT/STATE/FAULT records.
#[derive(Debug, Clone, Default)]
pub struct TraceLog {
    halt_on_fault: bool,
    should_halt: bool,
    lines: Vec<String>,
}

impl TraceLog {
    /// Creates an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms or disarms the halt-on-fault latch.
    pub fn set_halt_on_fault(&mut self, enabled: bool) {
        self.halt_on_fault = enabled;
    }

    /// Returns whether the latch is armed.
    pub fn halt_on_fault(&self) -> bool {
        self.halt_on_fault
    }

    /// Returns whether a fault has tripped the armed latch.
    pub fn should_halt(&self) -> bool {
        self.should_halt
    }

    /// Appends a COMMIT record.
    pub fn add_commit(&mut self, event: &CommitEvent) {
        let record = CommitRecord {
            t_start: event.t_start,
            t_end: event.t_end,
            stall: event.stall,
            cpu: event.op.master.trace_id(),
            kind: event.op.kind.name(),
            phys: event.op.phys,
            size: event.op.size,
            val: event.value,
            src: event.op.source_name(),
            cache_hit: event.cache_hit,
        };
        self.push_record("COMMIT", &record);
    }

    /// Appends a STATE record.
    pub fn add_state(&mut self, snapshot: &CpuSnapshot) {
        self.push_record("STATE", snapshot);
    }

    /// Appends a FAULT record, tripping the latch when armed.
    pub fn add_fault(&mut self, fault: &FaultEvent) {
        tracing::debug!(cpu = fault.cpu, pc = fault.pc, reason = fault.reason, "fault");
        if self.halt_on_fault {
            self.should_halt = true;
        }
        self.push_record("FAULT", fault);
    }

    /// Number of records appended so far.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns true if no record has been appended.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the trace as newline-terminated JSON-lines text.
    pub fn to_jsonl(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Writes the trace to `out` in insertion order, newline-terminated.
    pub fn write_jsonl(&self, out: &mut dyn Write) -> io::Result<()> {
        for line in &self.lines {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    fn push_record(&mut self, tag: &str, record: &impl Serialize) {
        // Serializing these flat records cannot fail; a failure would only
        // drop the line, never poison the log.
        if let Ok(json) = serde_json::to_string(record) {
            self.lines.push(format!("{tag} {json}"));
        }
    }
}
