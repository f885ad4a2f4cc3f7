//! SH-2 core scenarios: run-ahead, data ops, branches, exceptions, RMW.

use pretty_assertions::assert_eq;

use saturnemu_core::bus::BusArbiter;
use saturnemu_core::bus::op::BusResponse;
use saturnemu_core::cpu::Sh2Core;
use saturnemu_core::dev::DeviceHub;
use saturnemu_core::mem::CommittedMemory;
use saturnemu_core::trace::TraceLog;

use crate::common::harness::{run_core_over, run_program};

fn memory_with_program(program: &[u16]) -> CommittedMemory {
    let mut memory = CommittedMemory::new();
    for (i, instr) in program.iter().enumerate() {
        memory.write((i * 2) as u32, 2, u32::from(*instr));
    }
    memory
}

/// Single-step driver giving tests full control over retirement counts.
fn step_until(core: &mut Sh2Core, arbiter: &mut BusArbiter, trace: &mut TraceLog, retired: u64) {
    let mut seq = 0u64;
    let mut guard = 0u32;
    while core.executed_instructions() < retired {
        core.step(arbiter, trace, seq);
        seq += 1;
        guard += 1;
        assert!(guard < 10_000, "run did not converge");
    }
}

#[test]
fn one_line_fill_enables_cache_runahead() {
    let mut memory = CommittedMemory::new();
    for addr in (0..16u32).step_by(2) {
        memory.write(addr, 2, 0x0009);
    }
    let mut arbiter = BusArbiter::with_saturn_timing(memory, DeviceHub::new());
    let mut trace = TraceLog::new();
    let mut core = Sh2Core::new(0);
    core.reset(0, 0x0001_FFF0);

    let first = core.produce_until_bus(0, &mut trace, 16);
    let op = first.op.expect("first fetch misses the cache");
    let response = arbiter.commit(&op, &mut trace);
    core.apply_ifetch_and_step(&response, &mut trace);

    let second = core.produce_until_bus(1, &mut trace, 6);
    assert!(second.op.is_none(), "in-line ifetches must hit the cache");
    assert!(second.executed > 0);
}

#[test]
fn runahead_budget_bounds_local_retirement() {
    let mut memory = CommittedMemory::new();
    for addr in (0..16u32).step_by(2) {
        memory.write(addr, 2, 0x0009);
    }
    let mut arbiter = BusArbiter::with_saturn_timing(memory, DeviceHub::new());
    let mut trace = TraceLog::new();
    let mut core = Sh2Core::new(0);
    core.reset(0, 0x0001_FFF0);

    let first = core.produce_until_bus(0, &mut trace, 1);
    let op = first.op.expect("first ifetch misses");
    let response = arbiter.commit(&op, &mut trace);
    core.apply_ifetch_and_step(&response, &mut trace);

    let before = core.executed_instructions();
    let second = core.produce_until_bus(1, &mut trace, 3);
    assert!(second.op.is_none());
    assert!(core.executed_instructions() - before <= 3);
}

#[test]
fn long_store_then_load_round_trips() {
    // mov #0x10,r1 ; mov #5,r2 ; mov.l r2,@r1 ; mov.l @r1,r3 ; nop
    let program = [0xE110, 0xE205, 0x2122, 0x6312, 0x0009];
    let (core, arbiter, _trace) = run_program(&program, 5, 8);

    assert_eq!(core.reg(3), 5);
    assert_eq!(arbiter.memory().read(0x10, 4), 5);
}

#[test]
fn byte_word_predec_and_postinc_forms() {
    // mov #0x24,r1 ; mov #0x7f,r2 ; mov.b r2,@r1 ; mov.b @r1,r3
    // mov #0x28,r4 ; mov #0x34,r5 ; mov #0x11,r6
    // mov.b r6,@-r5 ; mov.b @r5+,r7
    // mov #0x12,r8 ; mov.w r8,@r4 ; mov.w @r4,r9 ; nop
    let program = [
        0xE124, 0xE27F, 0x2120, 0x6310, 0xE428, 0xE534, 0xE611, 0x2564, 0x6754, 0xE812,
        0x2481, 0x6941, 0x0009,
    ];
    let (core, arbiter, _trace) = run_program(&program, 13, 8);

    assert_eq!(core.reg(3) & 0xFF, 0x7F);
    assert_eq!(core.reg(7) & 0xFF, 0x11);
    assert_eq!(core.reg(5), 0x34);
    assert_eq!(core.reg(9) & 0xFFFF, 0x12);
    assert_eq!(arbiter.memory().read(0x24, 1), 0x7F);
    assert_eq!(arbiter.memory().read(0x28, 2), 0x12);
}

#[test]
fn delay_slot_executes_before_the_jump() {
    // bra +8 ; mov #1,r1 (slot) ; (skipped) ; (skipped)
    // target: mov #2,r2 ; nop
    let program = [0xA002, 0xE101, 0xE1FF, 0xE1FE, 0xE202, 0x0009];
    let (core, _arbiter, _trace) = run_program(&program, 4, 8);

    assert_eq!(core.reg(1), 1);
    assert_eq!(core.reg(2), 2);
}

#[test]
fn first_branch_wins_inside_a_delay_slot() {
    // bra +8 ; bra +0x22 (decoded in the slot, must be ignored)
    // target: mov #7,r2 ; nop
    let program = [0xA002, 0xA010, 0xE1FF, 0xE1FE, 0xE207, 0x0009];
    let (core, _arbiter, _trace) = run_program(&program, 4, 8);

    assert_eq!(core.reg(2), 7);
    assert_eq!(core.reg(1), 0, "instructions after the ignored target ran");
}

#[test]
fn illegal_opcode_faults_and_advances() {
    let program = [0xFFFF, 0xE105, 0x0009];
    let (core, _arbiter, trace) = run_program(&program, 3, 8);

    assert_eq!(core.reg(1), 5);
    let text = trace.to_jsonl();
    assert!(text.contains("\"reason\":\"ILLEGAL_OP\""));
    assert!(text.contains("\"detail\":65535"));
}

#[test]
fn synthetic_rte_without_context_faults_and_advances() {
    let program = [0x002B, 0xE103, 0x0009];
    let (core, _arbiter, trace) = run_program(&program, 3, 8);

    assert_eq!(core.reg(1), 3);
    assert!(trace.to_jsonl().contains("SYNTHETIC_RTE_WITHOUT_CONTEXT"));
}

#[test]
fn trapa_vectors_and_rte_returns() {
    // 0x00: trapa #1 ; 0x02: nop (return point)
    // vector 1 at 0x04 -> handler 0x20
    // 0x20: rte ; 0x22: nop (delay slot)
    let mut memory = CommittedMemory::new();
    memory.write(0x00, 2, 0xC301);
    memory.write(0x02, 2, 0x0009);
    memory.write(0x04, 4, 0x0000_0020);
    memory.write(0x20, 2, 0x002B);
    memory.write(0x22, 2, 0x0009);

    let mut arbiter = BusArbiter::with_saturn_timing(memory, DeviceHub::new());
    let mut trace = TraceLog::new();
    let mut core = Sh2Core::new(0);
    core.reset(0, 0x0001_FFF0);

    // trapa + 3 trap trips + rte + 2 pop trips + delay-slot nop = 8.
    step_until(&mut core, &mut arbiter, &mut trace, 8);

    assert_eq!(core.pc(), 2, "rte must return past the trapa");
    assert_eq!(core.reg(15), 0x0001_FFF0, "stack must balance");
    assert_eq!(core.sr(), 0xF0, "sr restored from the stack");
    let text = trace.to_jsonl();
    assert!(text.contains("EXCEPTION_RETURN"));
}

#[test]
fn requested_exception_vectors_through_vbr() {
    // Vector 2 at 0x08 -> handler 0x40; handler is a nop.
    let mut memory = CommittedMemory::new();
    memory.write(0x00, 2, 0x0009);
    memory.write(0x08, 4, 0x0000_0040);
    memory.write(0x40, 2, 0x0009);

    let mut arbiter = BusArbiter::with_saturn_timing(memory, DeviceHub::new());
    let mut trace = TraceLog::new();
    let mut core = Sh2Core::new(0);
    core.reset(0, 0x0001_FFF0);
    core.request_exception_vector(2);

    // Exception entry resolves in exactly three bus round-trips.
    step_until(&mut core, &mut arbiter, &mut trace, 3);

    assert_eq!(core.pc(), 0x40);
    assert_eq!(core.reg(15), 0x0001_FFF0 - 8, "sr and pc were pushed");
    assert!(trace.to_jsonl().contains("EXCEPTION_ENTRY"));
}

#[test]
fn gbr_byte_rmw_reads_modifies_writes() {
    // mov #0x40,r1 ; ldc r1,gbr ; mov #0,r0 ; and.b #0xf0,@(r0,gbr) ; nop
    let program = [0xE140, 0x411E, 0xE000, 0xCCF0, 0x0009];
    let mut memory = memory_with_program(&program);
    memory.write(0x40, 1, 0xFF);

    let (core, arbiter, _trace) = run_core_over(memory, 6, 8);

    assert_eq!(arbiter.memory().read(0x40, 1), 0xF0);
    assert_eq!(core.gbr(), 0x40);
}

#[test]
fn uncached_pc_forces_bus_ifetches() {
    let mut memory = CommittedMemory::new();
    memory.write(0x100, 2, 0x0009);

    let mut arbiter = BusArbiter::with_saturn_timing(memory, DeviceHub::new());
    let mut trace = TraceLog::new();
    let mut core = Sh2Core::new(0);
    // Reset into the uncached mirror of address 0x100.
    core.reset(0x2000_0100, 0x0001_FFF0);

    let produced = core.produce_until_bus(0, &mut trace, 16);
    let op = produced.op.expect("uncached ifetch must use the bus");
    assert!(!op.fill_cache_line, "uncached ifetches never fill lines");
    let response = arbiter.commit(&op, &mut trace);
    core.apply_ifetch_and_step(&response, &mut trace);
    assert_eq!(core.executed_instructions(), 1);

    // The next fetch goes to the bus again: nothing was cached.
    let next = core.produce_until_bus(1, &mut trace, 16);
    assert!(next.op.is_some());
}

#[test]
fn mismatched_line_fill_faults_but_still_executes() {
    let mut core = Sh2Core::new(0);
    core.reset(0, 0x0001_FFF0);
    let mut trace = TraceLog::new();

    // A response claiming the wrong line base: the fill is skipped, the
    // fault recorded, and the carried instruction still retires.
    let response = BusResponse {
        value: 0x0009,
        stall: 2,
        start: 0,
        finish: 2,
        line_base: 99,
        line_data: vec![0; 16],
    };
    core.apply_ifetch_and_step(&response, &mut trace);

    assert!(trace.to_jsonl().contains("\"reason\":\"CACHE_FILL_MISMATCH\""));
    assert_eq!(core.executed_instructions(), 1);
    assert_eq!(core.pc(), 2);
}

#[test]
fn mul_and_sts_move_through_mac_registers() {
    // mov #6,r1 ; mov #7,r2 ; mul.l r1,r2 ; sts macl,r3 ; nop
    let program = [0xE106, 0xE207, 0x0127, 0x031A, 0x0009];
    let (core, _arbiter, _trace) = run_program(&program, 5, 8);

    assert_eq!(core.macl(), 42);
    assert_eq!(core.reg(3), 42);
}

#[test]
fn conditional_branches_follow_the_t_flag() {
    // mov #3,r1 ; mov #3,r2 ; cmp/eq r1,r2 ; bt over ; mov #9,r3 (skipped)
    // over: mov #4,r4 ; nop
    let program = [0xE103, 0xE203, 0x3120, 0x8900, 0xE309, 0xE404, 0x0009];
    let (core, _arbiter, _trace) = run_program(&program, 5, 8);

    assert_eq!(core.reg(3), 0, "bt must skip the fall-through move");
    assert_eq!(core.reg(4), 4);
}
