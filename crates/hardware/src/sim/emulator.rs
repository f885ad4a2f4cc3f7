//! Emulator driver.
//!
//! The driver owns the parts side by side — arbiter (which owns memory and
//! the device hub), the two CPUs, and the trace — and runs the batch loop:
//! ask each CPU for up to one bus request, hand the batch to the arbiter,
//! route the responses back, repeat until a stop condition.
//!
//! Scripted scenarios exist in sequential and parallel flavours. The
//! parallel flavour runs the two produce steps on scoped threads and then
//! enters arbitration in the fixed `[cpu0, cpu1]` batch order, so both
//! flavours emit byte-identical traces.

use std::fs::File;
use std::thread;

use crate::bus::arbiter::BusArbiter;
use crate::bus::op::{BusMaster, BusOp};
use crate::config::{RunConfig, defaults};
use crate::cpu::core::Sh2Core;
use crate::cpu::scripted::{PendingBusOp, ScriptOp, ScriptedCpu};
use crate::dev::DeviceHub;
use crate::mem::CommittedMemory;
use crate::trace::TraceLog;

use super::SimError;
use super::loader;
use super::present;

const DEMO_FRAME_WIDTH: usize = 320;
const DEMO_FRAME_HEIGHT: usize = 240;
const RESET_PC: u32 = 0x0000_0000;
const RESET_SP: u32 = 0x0001_FFF0;

/// Top-level emulator driver.
#[derive(Debug, Default)]
pub struct Emulator;

impl Emulator {
    /// Creates a driver.
    pub fn new() -> Self {
        Self
    }

    /// Runs per the config; the CLI maps errors to a non-zero exit.
    ///
    /// Without a BIOS image (or with `dual_demo` forced) the built-in
    /// deterministic demo runs and its trace goes to stdout. With one, the
    /// two SH-2 cores boot from physical address zero for up to `max_steps`
    /// retired instructions.
    pub fn run(&mut self, config: &RunConfig) -> Result<(), SimError> {
        if config.dual_demo || config.bios_path.is_none() {
            tracing::info!("running deterministic dual-CPU demo");
            let demo_trace = self.run_dual_demo_trace();
            print!("{demo_trace}");
            if let Some(path) = &config.trace_path {
                std::fs::write(path, &demo_trace).map_err(|source| SimError::TraceWrite {
                    path: path.clone(),
                    source,
                })?;
            }
            return Ok(());
        }

        let mut memory = CommittedMemory::new();
        if let Some(path) = &config.bios_path {
            let bios = loader::read_binary_file(path)?;
            memory.load_image(0, &bios);
            tracing::info!(bytes = bios.len(), "loaded BIOS image");
        }

        let mut trace = TraceLog::new();
        trace.set_halt_on_fault(config.halt_on_fault);
        let arbiter = run_cpu_pair(memory, config.max_steps, &mut trace);

        let framebuffer = present::fold_device_writes(
            arbiter.devices().writes(),
            DEMO_FRAME_WIDTH,
            DEMO_FRAME_HEIGHT,
        );
        present::present_framebuffer_if_available(
            DEMO_FRAME_WIDTH,
            DEMO_FRAME_HEIGHT,
            &framebuffer,
            config.headless,
        );

        if let Some(path) = &config.trace_path {
            let mut file = File::create(path).map_err(|source| SimError::TraceWrite {
                path: path.clone(),
                source,
            })?;
            trace.write_jsonl(&mut file).map_err(|source| SimError::TraceWrite {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Trace of the built-in dual-CPU demo, sequential produce.
    pub fn run_dual_demo_trace(&self) -> String {
        run_script_pair_trace(dual_demo_scripts(), false)
    }

    /// Trace of the built-in dual-CPU demo, parallel produce.
    pub fn run_dual_demo_trace_parallel(&self) -> String {
        run_script_pair_trace(dual_demo_scripts(), true)
    }

    /// Trace of the shared-line contention stress scenario, sequential.
    pub fn run_contention_stress_trace(&self) -> String {
        run_script_pair_trace(contention_stress_scripts(), false)
    }

    /// Trace of the shared-line contention stress scenario, parallel.
    pub fn run_contention_stress_trace_parallel(&self) -> String {
        run_script_pair_trace(contention_stress_scripts(), true)
    }

    /// Trace of a BIOS bring-up run over an in-memory image.
    pub fn run_bios_trace(&self, bios_image: &[u8], max_steps: u64) -> String {
        let mut memory = CommittedMemory::new();
        memory.load_image(0, bios_image);
        let mut trace = TraceLog::new();
        let _ = run_cpu_pair(memory, max_steps, &mut trace);
        trace.to_jsonl()
    }
}

fn dual_demo_scripts() -> (Vec<ScriptOp>, Vec<ScriptOp>) {
    let cpu0 = vec![
        ScriptOp::write(0x0000_1000, 4, 0xDEAD_BEEF),
        ScriptOp::compute(3),
        ScriptOp::write(0x2000_1000, 4, 0xC0FF_EE11),
        ScriptOp::write(0x05F0_0020, 4, 0x1234),
    ];
    let cpu1 = vec![
        ScriptOp::read(0x0000_1000, 4),
        ScriptOp::compute(2),
        ScriptOp::read(0x2000_1000, 4),
        ScriptOp::read(0x05F0_0010, 4),
    ];
    (cpu0, cpu1)
}

fn contention_stress_scripts() -> (Vec<ScriptOp>, Vec<ScriptOp>) {
    let cpu0 = vec![
        ScriptOp::write(0x0000_4000, 4, 0x1111_1111),
        ScriptOp::write(0x0000_4000, 4, 0x2222_2222),
        ScriptOp::barrier(),
        ScriptOp::write(0x05C0_0100, 4, 0x0000_00AA),
        ScriptOp::read(0x2000_4000, 4),
    ];
    let cpu1 = vec![
        ScriptOp::write(0x0000_4000, 4, 0x3333_3333),
        ScriptOp::compute(1),
        ScriptOp::read(0x0000_4000, 4),
        ScriptOp::write(0x05C0_0104, 4, 0x0000_00BB),
        ScriptOp::read(0x2000_4000, 4),
    ];
    (cpu0, cpu1)
}

fn run_script_pair_trace(scripts: (Vec<ScriptOp>, Vec<ScriptOp>), parallel: bool) -> String {
    let mut trace = TraceLog::new();
    let mut arbiter = BusArbiter::with_saturn_timing(CommittedMemory::new(), DeviceHub::new());
    let mut cpu0 = ScriptedCpu::new(0, scripts.0);
    let mut cpu1 = ScriptedCpu::new(1, scripts.1);
    run_scripted_pair(&mut cpu0, &mut cpu1, &mut arbiter, &mut trace, parallel);
    trace.to_jsonl()
}

/// Runs two scripted CPUs to completion against one arbiter.
///
/// With `parallel`, the produce steps run on scoped threads; the commit step
/// is always the serialisation point and consumes the batch in `[cpu0,
/// cpu1]` order, which keeps the trace identical to the sequential path.
pub fn run_scripted_pair(
    cpu0: &mut ScriptedCpu,
    cpu1: &mut ScriptedCpu,
    arbiter: &mut BusArbiter,
    trace: &mut TraceLog,
    parallel: bool,
) {
    while !(cpu0.done() && cpu1.done()) {
        let (p0, p1) = if parallel {
            thread::scope(|scope| {
                let h0 = scope.spawn(|| cpu0.produce());
                let h1 = scope.spawn(|| cpu1.produce());
                (h0.join().unwrap_or(None), h1.join().unwrap_or(None))
            })
        } else {
            (cpu0.produce(), cpu1.produce())
        };
        if p0.is_none() && p1.is_none() {
            break;
        }

        let mut pending: Vec<(usize, PendingBusOp)> = Vec::with_capacity(2);
        if let Some(p) = p0 {
            pending.push((0, p));
        }
        if let Some(p) = p1 {
            pending.push((1, p));
        }
        let ops: Vec<BusOp> = pending.iter().map(|(_, p)| p.op).collect();

        let committed = arbiter.commit_batch(&ops, trace);
        for result in &committed {
            let (cpu_index, produced) = &pending[result.input_index];
            if *cpu_index == 0 {
                cpu0.apply_response(produced.script_index, &result.response);
            } else {
                cpu1.apply_response(produced.script_index, &result.response);
            }
        }
    }
}

/// Runs the two SH-2 cores over `memory` until the step budget, idleness, or
/// a halting fault stops the loop. Returns the arbiter for post-run
/// inspection of memory and the device write log.
pub fn run_cpu_pair(memory: CommittedMemory, max_steps: u64, trace: &mut TraceLog) -> BusArbiter {
    let mut arbiter = BusArbiter::with_saturn_timing(memory, DeviceHub::new());
    let mut master = Sh2Core::new(0);
    let mut slave = Sh2Core::new(1);
    master.reset(RESET_PC, RESET_SP);
    slave.reset(RESET_PC, RESET_SP);

    let mut seq = 0u64;
    while master.executed_instructions() + slave.executed_instructions() < max_steps {
        let p0 = master.produce_until_bus(seq, trace, defaults::RUNAHEAD_BUDGET);
        seq += 1;
        let p1 = slave.produce_until_bus(seq, trace, defaults::RUNAHEAD_BUDGET);
        seq += 1;

        let mut ops = Vec::with_capacity(2);
        if let Some(op) = p0.op {
            ops.push(op);
        }
        if let Some(op) = p1.op {
            ops.push(op);
        }

        if ops.is_empty() {
            if p0.executed == 0 && p1.executed == 0 {
                break;
            }
            if trace.should_halt() {
                break;
            }
            continue;
        }

        let committed = arbiter.commit_batch(&ops, trace);
        for result in &committed {
            match result.op.master {
                BusMaster::CpuA => master.apply_ifetch_and_step(&result.response, trace),
                BusMaster::CpuB => slave.apply_ifetch_and_step(&result.response, trace),
                BusMaster::Dma => {}
            }
        }
        if trace.should_halt() {
            break;
        }
    }
    arbiter
}
