//! Bus arbiter: grants one request at a time over the shared bus.
//!
//! The arbiter owns the committed side of the machine (memory and the device
//! hub) and is the only component allowed to mutate it. It provides:
//! 1. **Wait query:** Non-mutating busy check against `bus_free_tick`.
//! 2. **Winner pick:** Deterministic pairwise reduction over a same-tick batch.
//! 3. **Grant commit:** Latency + contention accounting, side effects, COMMIT trace.
//! 4. **Batch commit:** Deferred scheduler that orders a pending set under a
//!    progress horizon and detects same-start equal-priority ties.
//!
//! Determinism contract: with identical inputs, every method produces
//! identical results; `query_wait` results are independent of the order in
//! which other contenders are queried.

use crate::common::{Tick, is_mmio};
use crate::config::ArbiterConfig;
use crate::dev::DeviceHub;
use crate::mem::CommittedMemory;
use crate::trace::{CommitEvent, TraceLog};

use super::op::{BusKind, BusMaster, BusOp, BusResponse, CommitResult};
use super::timing::{AccessTiming, SaturnTiming};

/// Outcome of a non-mutating wait query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitResult {
    /// Whether the bus is busy past the request's tick.
    pub should_wait: bool,
    /// Minimum stall in ticks before the request may begin; zero when free.
    pub wait_cycles: u32,
}

/// Arbiter for the single shared bus.
///
/// Owns committed memory and the device hub; CPUs interact with both only
/// through granted bus requests.
pub struct BusArbiter {
    memory: CommittedMemory,
    devices: DeviceHub,
    timing: Box<dyn AccessTiming>,
    config: ArbiterConfig,
    bus_free_tick: Tick,
    last_granted_addr: Option<u32>,
    last_granted_cpu: Option<BusMaster>,
    progress_up_to: [Tick; 2],
}

impl std::fmt::Debug for BusArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusArbiter")
            .field("bus_free_tick", &self.bus_free_tick)
            .field("last_granted_addr", &self.last_granted_addr)
            .field("last_granted_cpu", &self.last_granted_cpu)
            .finish_non_exhaustive()
    }
}

impl BusArbiter {
    /// Creates an arbiter over `memory` and `devices` with a custom timing model.
    pub fn new(
        memory: CommittedMemory,
        devices: DeviceHub,
        timing: Box<dyn AccessTiming>,
        config: ArbiterConfig,
    ) -> Self {
        Self {
            memory,
            devices,
            timing,
            config,
            bus_free_tick: 0,
            last_granted_addr: None,
            last_granted_cpu: None,
            progress_up_to: [Tick::MAX; 2],
        }
    }

    /// Creates an arbiter with the Saturn region-timing preset.
    pub fn with_saturn_timing(memory: CommittedMemory, devices: DeviceHub) -> Self {
        Self::new(memory, devices, Box::new(SaturnTiming), ArbiterConfig::default())
    }

    /// Smallest tick at which the bus is next available.
    pub fn bus_free_tick(&self) -> Tick {
        self.bus_free_tick
    }

    /// Committed memory, read-only.
    pub fn memory(&self) -> &CommittedMemory {
        &self.memory
    }

    /// Committed memory, for image loading before a run.
    pub fn memory_mut(&mut self) -> &mut CommittedMemory {
        &mut self.memory
    }

    /// Device hub, read-only (write log inspection).
    pub fn devices(&self) -> &DeviceHub {
        &self.devices
    }

    fn priority(master: BusMaster) -> u8 {
        match master {
            BusMaster::Dma => 2,
            BusMaster::CpuA | BusMaster::CpuB => 1,
        }
    }

    /// The CPU favoured in the next CPU-vs-CPU equal-priority tie.
    ///
    /// Flips away from the last tied winner; defaults to CPU-A.
    fn preferred_cpu(&self) -> BusMaster {
        match self.last_granted_cpu {
            Some(BusMaster::CpuA) => BusMaster::CpuB,
            _ => BusMaster::CpuA,
        }
    }

    fn service_cycles(&self, op: &BusOp) -> u32 {
        if op.kind == BusKind::Barrier {
            return self.config.barrier_cycles;
        }
        self.timing
            .access_cycles(op.phys, op.kind.is_write(), op.size)
            .max(1)
    }

    fn contention_extra(&self, op: &BusOp, had_tie: bool) -> u32 {
        let mut extra = 0;
        if op.kind != BusKind::Barrier && self.last_granted_addr == Some(op.phys) {
            extra += self.config.same_address_contention;
        }
        if had_tie {
            extra += self.config.tie_turnaround;
        }
        extra
    }

    /// Non-mutating wait query against the current `bus_free_tick`.
    ///
    /// The result depends only on the request's tick and arbiter state, never
    /// on prior `query_wait` calls.
    pub fn query_wait(&self, op: &BusOp) -> WaitResult {
        if op.req_time >= self.bus_free_tick {
            return WaitResult { should_wait: false, wait_cycles: 0 };
        }
        let delta = self.bus_free_tick - op.req_time;
        WaitResult {
            should_wait: true,
            wait_cycles: u32::try_from(delta).unwrap_or(u32::MAX),
        }
    }

    /// Picks the winner of a same-tick batch; `None` for an empty batch.
    ///
    /// Pairwise reduction from index 0; a candidate displaces the current
    /// holder on: higher priority; CPU-vs-CPU preferred-cpu fairness; smaller
    /// master number; then per-master ordering by address, write-before-read,
    /// and smaller size.
    pub fn pick_winner(&self, batch: &[BusOp]) -> Option<usize> {
        if batch.is_empty() {
            return None;
        }

        let mut best = 0;
        for (i, cand) in batch.iter().enumerate().skip(1) {
            let cur = &batch[best];

            let cprio = Self::priority(cand.master);
            let bprio = Self::priority(cur.master);
            if cprio > bprio {
                best = i;
                continue;
            }
            if cprio < bprio {
                continue;
            }

            if cand.master.is_cpu() && cur.master.is_cpu() && cand.master != cur.master {
                if cand.master == self.preferred_cpu() {
                    best = i;
                }
                continue;
            }

            if cand.master != cur.master {
                if cand.master < cur.master {
                    best = i;
                }
                continue;
            }

            if cand.phys < cur.phys {
                best = i;
                continue;
            }
            if cand.phys > cur.phys {
                continue;
            }

            if cand.kind.is_write() != cur.kind.is_write() && cand.kind.is_write() {
                best = i;
                continue;
            }

            if cand.size < cur.size {
                best = i;
            }
        }
        Some(best)
    }

    /// Commits a single grant and returns its response.
    ///
    /// The grant starts at `max(tick_start, bus_free_tick)` and occupies the
    /// bus for its service cycles plus contention surcharges. Side effects
    /// (memory, device hub, line read-out) happen here, and one COMMIT record
    /// is appended. Barriers touch nothing and leave the address history
    /// intact.
    pub fn commit_grant(
        &mut self,
        op: &BusOp,
        tick_start: Tick,
        had_tie: bool,
        trace: &mut TraceLog,
    ) -> BusResponse {
        let start = tick_start.max(self.bus_free_tick);
        let duration =
            Tick::from(self.service_cycles(op)) + Tick::from(self.contention_extra(op, had_tie));
        let finish = start + duration;
        let stall = finish - op.req_time;

        let mut value = 0;
        let mut line_base = 0;
        let mut line_data = Vec::new();

        match op.kind {
            BusKind::Barrier => {
                // Synchronisation point: no memory or MMIO side effects.
            }
            BusKind::Write | BusKind::MmioWrite => {
                if op.kind == BusKind::MmioWrite || is_mmio(op.phys) {
                    self.devices
                        .write(finish, op.master.trace_id(), op.phys, op.size, op.data);
                } else {
                    self.memory.write(op.phys, op.size, op.data);
                }
            }
            BusKind::IFetch | BusKind::Read | BusKind::MmioRead => {
                if op.kind == BusKind::MmioRead || is_mmio(op.phys) {
                    value = self.devices.read(finish, op.master.trace_id(), op.phys, op.size);
                } else {
                    value = self.memory.read(op.phys, op.size);
                    if op.fill_cache_line && op.cache_line_size > 0 {
                        let line_size = u32::from(op.cache_line_size);
                        line_base = op.phys / line_size;
                        line_data = self
                            .memory
                            .read_block(line_base * line_size, line_size as usize);
                    }
                }
            }
        }

        if op.kind != BusKind::Barrier {
            self.last_granted_addr = Some(op.phys);
        }
        if had_tie && op.master.is_cpu() {
            self.last_granted_cpu = Some(op.master);
        }

        self.bus_free_tick = finish;
        tracing::trace!(
            master = ?op.master,
            kind = op.kind.name(),
            phys = format_args!("{:#010x}", op.phys),
            start,
            finish,
            had_tie,
            "bus grant"
        );
        trace.add_commit(&CommitEvent {
            t_start: start,
            t_end: finish,
            op: *op,
            stall,
            value,
            cache_hit: false,
        });
        BusResponse { value, stall, start, finish, line_base, line_data }
    }

    /// Commits a single request at its own issue tick, without tie surcharge.
    pub fn commit(&mut self, op: &BusOp, trace: &mut TraceLog) -> BusResponse {
        self.commit_grant(op, op.req_time, false, trace)
    }

    /// Publishes how far a CPU has executed, raising the commit horizon.
    pub fn update_progress(&mut self, cpu_index: usize, executed_up_to: Tick) {
        if cpu_index >= self.progress_up_to.len() {
            return;
        }
        let slot = &mut self.progress_up_to[cpu_index];
        if *slot == Tick::MAX || executed_up_to > *slot {
            *slot = executed_up_to;
        }
    }

    fn has_safe_horizon(&self) -> bool {
        self.progress_up_to.iter().any(|&t| t != Tick::MAX)
    }

    fn commit_horizon(&self) -> Tick {
        self.progress_up_to[0].min(self.progress_up_to[1])
    }

    fn pick_next(&self, pending: &[(usize, BusOp)], committable: &[usize]) -> usize {
        let mut best = committable[0];
        let mut best_start = pending[best].1.req_time.max(self.bus_free_tick);

        for &idx in committable {
            let cand = &pending[idx].1;
            let cur = &pending[best].1;
            let start = cand.req_time.max(self.bus_free_tick);

            if start < best_start {
                best = idx;
                best_start = start;
                continue;
            }
            if start > best_start {
                continue;
            }

            let cprio = Self::priority(cand.master);
            let bprio = Self::priority(cur.master);
            if cprio > bprio {
                best = idx;
                continue;
            }
            if cprio < bprio {
                continue;
            }

            if cand.master.is_cpu() && cur.master.is_cpu() && cand.master != cur.master {
                if cand.master == self.preferred_cpu() {
                    best = idx;
                }
                continue;
            }

            if cand.master != cur.master {
                if cand.master < cur.master {
                    best = idx;
                }
                continue;
            }
            if cand.sequence < cur.sequence {
                best = idx;
            }
        }

        best
    }

    /// Commits a batch of requests in deterministic order.
    ///
    /// Repeatedly selects the committable request with the earliest effective
    /// start (priority, CPU fairness, master number, then sequence breaking
    /// ties), detects same-start equal-priority ties for the turnaround
    /// surcharge, and commits it. Requests at or past the published progress
    /// horizon stay pending. Results are returned in commit order.
    pub fn commit_batch(&mut self, ops: &[BusOp], trace: &mut TraceLog) -> Vec<CommitResult> {
        let mut pending: Vec<(usize, BusOp)> =
            ops.iter().copied().enumerate().collect();
        let mut committed = Vec::with_capacity(ops.len());

        while !pending.is_empty() {
            let horizon = self.commit_horizon();
            let committable: Vec<usize> = (0..pending.len())
                .filter(|&i| !self.has_safe_horizon() || pending[i].1.req_time < horizon)
                .collect();
            if committable.is_empty() {
                break;
            }

            let next_idx = self.pick_next(&pending, &committable);
            let chosen = pending[next_idx].1;
            let next_start = chosen.req_time.max(self.bus_free_tick);

            let had_tie = committable.iter().any(|&i| {
                if i == next_idx {
                    return false;
                }
                let cand = &pending[i].1;
                cand.req_time.max(self.bus_free_tick) == next_start
                    && Self::priority(cand.master) == Self::priority(chosen.master)
            });

            let (input_index, op) = pending.remove(next_idx);
            let response = self.commit_grant(&op, op.req_time, had_tie, trace);
            committed.push(CommitResult { input_index, op, response });
        }

        committed
    }
}
