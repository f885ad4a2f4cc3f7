//! Configuration for the emulator core.
//!
//! This module defines the configuration structures used to parameterize a
//! run. It provides:
//! 1. **Defaults:** Baseline hardware constants (memory size, cache geometry, arbiter surcharges).
//! 2. **Arbiter config:** Contention and turnaround surcharges applied on top of base latency.
//! 3. **Run config:** Driver-facing parameters (BIOS image, trace path, step budget).
//!
//! The driver is parameterised with a `RunConfig` value; command-line parsing
//! lives in the CLI crate.

use std::path::PathBuf;

use serde::Deserialize;

/// Default configuration constants for the core.
pub mod defaults {
    /// Committed memory size in bytes (32 MiB).
    ///
    /// Physical addresses wrap modulo this size.
    pub const MEMORY_SIZE: usize = 32 * 1024 * 1024;

    /// Instruction-cache line size in bytes.
    pub const ICACHE_LINE: usize = 16;

    /// Instruction-cache line count (direct-mapped).
    pub const ICACHE_LINES: usize = 64;

    /// Store-buffer depth; the oldest entry is dropped on overflow.
    pub const STORE_BUFFER_DEPTH: usize = 8;

    /// Surcharge in cycles when a grant targets the last granted address.
    pub const SAME_ADDRESS_CONTENTION: u32 = 2;

    /// Surcharge in cycles when a grant won a same-tick equal-priority tie.
    pub const TIE_TURNAROUND: u32 = 1;

    /// Base cost of a barrier grant.
    ///
    /// Barriers are pure synchronisers and sit outside the `max(1, cycles)`
    /// clamp applied to real accesses.
    pub const BARRIER_CYCLES: u32 = 0;

    /// Fallback read latency for addresses outside every timed region.
    pub const UNMAPPED_READ_CYCLES: u32 = 4;

    /// Fallback write latency for addresses outside every timed region.
    pub const UNMAPPED_WRITE_CYCLES: u32 = 2;

    /// Cached-ifetch run-ahead budget per `produce_until_bus` call.
    pub const RUNAHEAD_BUDGET: u32 = 16;

    /// Default driver step budget (total retired instructions, both CPUs).
    pub const MAX_STEPS: u64 = 20_000;
}

/// Arbiter surcharges applied on top of the timing model's base latency.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Extra cycles when the granted address equals the last granted one.
    pub same_address_contention: u32,
    /// Extra cycles when the grant won a same-tick equal-priority tie.
    pub tie_turnaround: u32,
    /// Base cost of a barrier grant (not clamped to a minimum of 1).
    pub barrier_cycles: u32,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            same_address_contention: defaults::SAME_ADDRESS_CONTENTION,
            tie_turnaround: defaults::TIE_TURNAROUND,
            barrier_cycles: defaults::BARRIER_CYCLES,
        }
    }
}

/// Driver-facing run parameters.
///
/// An absent `bios_path` selects the built-in deterministic dual-CPU demo.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Skip the presentation hook entirely.
    pub headless: bool,
    /// BIOS image to load at physical address zero.
    pub bios_path: Option<PathBuf>,
    /// Where to write the trace as JSON lines; `None` discards it.
    pub trace_path: Option<PathBuf>,
    /// Total retired-instruction budget across both CPUs.
    pub max_steps: u64,
    /// Force the built-in demo even when a BIOS image is given.
    pub dual_demo: bool,
    /// Stop the run loop after the first fault record.
    pub halt_on_fault: bool,
}

impl RunConfig {
    /// Creates a config with default step budget and demo mode enabled.
    pub fn new() -> Self {
        Self {
            max_steps: defaults::MAX_STEPS,
            dual_demo: true,
            ..Self::default()
        }
    }
}
