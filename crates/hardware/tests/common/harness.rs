//! Fixtures: arbiter construction, scripted pairs, SH-2 program runs.

use saturnemu_core::bus::BusArbiter;
use saturnemu_core::config::ArbiterConfig;
use saturnemu_core::cpu::{ScriptedCpu, Sh2Core};
use saturnemu_core::dev::DeviceHub;
use saturnemu_core::mem::CommittedMemory;
use saturnemu_core::sim::emulator::run_scripted_pair;
use saturnemu_core::trace::TraceLog;

/// Deterministic size-keyed timing used by the arbiter property tests.
pub fn fixed_cycles(_addr: u32, _is_write: bool, size: u8) -> u32 {
    3 + u32::from(size)
}

/// Arbiter over fresh memory/devices with the fixed size-keyed timing.
pub fn arbiter_with_fixed_timing() -> BusArbiter {
    BusArbiter::new(
        CommittedMemory::new(),
        DeviceHub::new(),
        Box::new(fixed_cycles),
        ArbiterConfig::default(),
    )
}

/// Arbiter over fresh memory/devices with the Saturn timing preset.
pub fn arbiter_with_saturn_timing() -> BusArbiter {
    BusArbiter::with_saturn_timing(CommittedMemory::new(), DeviceHub::new())
}

/// Runs two scripted CPUs to completion, sequential produce.
pub fn run_pair(
    cpu0: &mut ScriptedCpu,
    cpu1: &mut ScriptedCpu,
    arbiter: &mut BusArbiter,
    trace: &mut TraceLog,
) {
    run_scripted_pair(cpu0, cpu1, arbiter, trace, false);
}

/// Loads 16-bit instructions at address 0 and runs one core until at least
/// `min_retired` instructions retired. Returns the core, the arbiter, and
/// the trace for inspection.
pub fn run_program(
    program: &[u16],
    min_retired: u64,
    runahead_budget: u32,
) -> (Sh2Core, BusArbiter, TraceLog) {
    let mut memory = CommittedMemory::new();
    for (i, instr) in program.iter().enumerate() {
        memory.write((i * 2) as u32, 2, u32::from(*instr));
    }
    run_core_over(memory, min_retired, runahead_budget)
}

/// Runs one core over prepared memory until at least `min_retired`
/// instructions retired.
pub fn run_core_over(
    memory: CommittedMemory,
    min_retired: u64,
    runahead_budget: u32,
) -> (Sh2Core, BusArbiter, TraceLog) {
    let mut arbiter = BusArbiter::with_saturn_timing(memory, DeviceHub::new());
    let mut trace = TraceLog::new();
    let mut core = Sh2Core::new(0);
    core.reset(0, 0x0001_FFF0);

    let mut seq = 0u64;
    while core.executed_instructions() < min_retired {
        let produced = core.produce_until_bus(seq, &mut trace, runahead_budget);
        seq += 1;
        match produced.op {
            Some(op) => {
                let response = arbiter.commit(&op, &mut trace);
                core.apply_ifetch_and_step(&response, &mut trace);
            }
            None => {
                if produced.executed == 0 {
                    break;
                }
            }
        }
    }
    (core, arbiter, trace)
}
