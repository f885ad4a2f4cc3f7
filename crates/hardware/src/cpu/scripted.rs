//! Scripted bus master.
//!
//! A deterministic driver that replays a fixed list of typed operations,
//! using the same store-buffer and tiny-cache local view as the real core:
//! a read is satisfied from the store buffer, then the cache, and only then
//! becomes a bus request; a write enters the store buffer, writes through to
//! a hit cache line, and always goes to the bus. `Compute` advances local
//! time without touching the bus; `Barrier` is a pure synchroniser.

use crate::bus::op::{BusKind, BusMaster, BusOp, BusResponse};
use crate::common::{Tick, is_mmio, is_uncached_alias, to_phys};
use crate::config::defaults;
use crate::mem::{StoreBuffer, StoreEntry, TinyCache};

/// Kind of one script entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOpKind {
    /// Read `size` bytes at `vaddr`.
    Read,
    /// Write `value` (`size` bytes) at `vaddr`.
    Write,
    /// Advance local time by `cycles` without bus traffic.
    Compute,
    /// Emit a barrier bus request.
    Barrier,
}

/// One scripted operation.
#[derive(Debug, Clone, Copy)]
pub struct ScriptOp {
    /// Operation kind.
    pub kind: ScriptOpKind,
    /// Virtual address for reads and writes.
    pub vaddr: u32,
    /// Access size in bytes.
    pub size: u8,
    /// Value for writes.
    pub value: u32,
    /// Local-time cost for `Compute` entries.
    pub cycles: u32,
}

impl ScriptOp {
    /// A read of `size` bytes at `vaddr`.
    pub fn read(vaddr: u32, size: u8) -> Self {
        Self { kind: ScriptOpKind::Read, vaddr, size, value: 0, cycles: 0 }
    }

    /// A write of `value` (`size` bytes) at `vaddr`.
    pub fn write(vaddr: u32, size: u8, value: u32) -> Self {
        Self { kind: ScriptOpKind::Write, vaddr, size, value, cycles: 0 }
    }

    /// A local computation of `cycles` ticks.
    pub fn compute(cycles: u32) -> Self {
        Self { kind: ScriptOpKind::Compute, vaddr: 0, size: 0, value: 0, cycles }
    }

    /// A bus barrier.
    pub fn barrier() -> Self {
        Self { kind: ScriptOpKind::Barrier, vaddr: 0, size: 0, value: 0, cycles: 0 }
    }
}

/// A produced bus request together with its originating script index.
#[derive(Debug, Clone, Copy)]
pub struct PendingBusOp {
    /// The bus request.
    pub op: BusOp,
    /// Index of the script entry that produced it.
    pub script_index: usize,
}

/// Scripted CPU replaying a fixed operation list.
#[derive(Debug, Clone)]
pub struct ScriptedCpu {
    master: BusMaster,
    script: Vec<ScriptOp>,
    pc: usize,
    sequence: u64,
    local_time: Tick,
    store_buffer: StoreBuffer,
    cache: TinyCache,
    last_read: Option<u32>,
}

impl ScriptedCpu {
    /// Creates a scripted CPU for slot `cpu_index` with the default cache
    /// geometry.
    pub fn new(cpu_index: usize, script: Vec<ScriptOp>) -> Self {
        Self::with_cache(cpu_index, script, defaults::ICACHE_LINE, defaults::ICACHE_LINES)
    }

    /// Creates a scripted CPU with explicit cache geometry.
    pub fn with_cache(
        cpu_index: usize,
        script: Vec<ScriptOp>,
        cache_line_size: usize,
        cache_lines: usize,
    ) -> Self {
        Self {
            master: BusMaster::from_cpu_index(cpu_index),
            script,
            pc: 0,
            sequence: 0,
            local_time: 0,
            store_buffer: StoreBuffer::new(),
            cache: TinyCache::new(cache_line_size, cache_lines),
            last_read: None,
        }
    }

    /// Returns whether the script has run to completion.
    pub fn done(&self) -> bool {
        self.pc >= self.script.len()
    }

    /// Local tick counter.
    pub fn local_time(&self) -> Tick {
        self.local_time
    }

    /// Value observed by the most recent read, however it was satisfied.
    pub fn last_read(&self) -> Option<u32> {
        self.last_read
    }

    /// Advances through the script until a bus request is needed.
    ///
    /// Locally satisfiable entries (computes, forwarded or cached reads)
    /// retire without bus traffic. Returns `None` once the script is done.
    pub fn produce(&mut self) -> Option<PendingBusOp> {
        while !self.done() {
            let ins = self.script[self.pc];
            match ins.kind {
                ScriptOpKind::Compute => {
                    self.local_time += Tick::from(ins.cycles);
                    self.pc += 1;
                }
                ScriptOpKind::Barrier => {
                    let op = BusOp::new(
                        self.master,
                        self.local_time,
                        self.next_sequence(),
                        BusKind::Barrier,
                        0,
                        0,
                        0,
                    );
                    let script_index = self.pc;
                    self.pc += 1;
                    return Some(PendingBusOp { op, script_index });
                }
                ScriptOpKind::Write => {
                    let phys = to_phys(ins.vaddr);
                    let uncached = is_uncached_alias(ins.vaddr) || is_mmio(phys);
                    self.store_buffer.push(StoreEntry {
                        phys,
                        size: ins.size,
                        value: ins.value,
                    });
                    if !uncached {
                        self.cache.write(phys, ins.size, ins.value);
                    }
                    let kind = if is_mmio(phys) { BusKind::MmioWrite } else { BusKind::Write };
                    let op = BusOp::new(
                        self.master,
                        self.local_time,
                        self.next_sequence(),
                        kind,
                        phys,
                        ins.size,
                        ins.value,
                    );
                    let script_index = self.pc;
                    self.pc += 1;
                    return Some(PendingBusOp { op, script_index });
                }
                ScriptOpKind::Read => {
                    let phys = to_phys(ins.vaddr);
                    let uncached = is_uncached_alias(ins.vaddr) || is_mmio(phys);
                    if !uncached {
                        if let Some(forwarded) = self.store_buffer.forward(phys, ins.size) {
                            self.last_read = Some(forwarded);
                            self.pc += 1;
                            continue;
                        }
                        if let Some(cached) = self.cache.read(phys, ins.size) {
                            self.last_read = Some(cached);
                            self.pc += 1;
                            continue;
                        }
                    }
                    let kind = if is_mmio(phys) { BusKind::MmioRead } else { BusKind::Read };
                    let mut op = BusOp::new(
                        self.master,
                        self.local_time,
                        self.next_sequence(),
                        kind,
                        phys,
                        ins.size,
                        0,
                    );
                    if !uncached {
                        op = op.with_line_fill(self.cache.line_size());
                    }
                    let script_index = self.pc;
                    self.pc += 1;
                    return Some(PendingBusOp { op, script_index });
                }
            }
        }
        None
    }

    /// Applies the arbiter's response for the entry at `script_index`.
    pub fn apply_response(&mut self, script_index: usize, response: &BusResponse) {
        self.local_time = response.finish;
        let ins = self.script[script_index];
        if ins.kind != ScriptOpKind::Read {
            return;
        }
        self.last_read = Some(response.value);
        let phys = to_phys(ins.vaddr);
        if is_uncached_alias(ins.vaddr) || is_mmio(phys) {
            return;
        }
        if response.line_data.is_empty() {
            // No line came back: synthesise one so repeat reads hit locally.
            let line_len = self.cache.line_size();
            let line_base = phys / line_len as u32;
            let zeroes = vec![0; line_len];
            self.cache.fill_line(line_base, &zeroes);
            self.cache.write(phys, ins.size, response.value);
        } else {
            self.cache.fill_line(response.line_base, &response.line_data);
        }
    }

    fn next_sequence(&mut self) -> u64 {
        let seq = self.sequence;
        self.sequence += 1;
        seq
    }
}
