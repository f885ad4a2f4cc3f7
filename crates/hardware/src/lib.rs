//! Deterministic dual-SH2 bus-arbitration and execution core.
//!
//! This crate implements the shared-bus core of a Saturn-class (twin SH-2 +
//! DMA) system emulator with the following:
//! 1. **Address space:** Virtual-to-physical folding, uncached alias, MMIO windows.
//! 2. **Memory:** Committed memory, a direct-mapped cache with line fills, and
//!    a store buffer with store-to-load forwarding.
//! 3. **Devices:** A word-addressed MMIO register file with lane merging and an
//!    issue-ordered write log.
//! 4. **Bus:** A deterministic arbiter — priority and fairness rules, per-grant
//!    latency with contention surcharges, and a deferred batch scheduler.
//! 5. **CPUs:** An in-order SH-2 subset core with run-ahead ifetch, multi-phase
//!    pending memory operations and delay-slot branches, plus a scripted CPU.
//! 6. **Determinism envelope:** A byte-exact trace log and an offline replay
//!    comparator; repeated runs on identical inputs yield identical traces.

/// Bus request/response types, timing models, and the arbiter.
pub mod bus;
/// Common types: address-space helpers and the tick type.
pub mod common;
/// Run and arbiter configuration.
pub mod config;
/// CPU models: the SH-2 core and the scripted test driver.
pub mod cpu;
/// MMIO device models.
pub mod dev;
/// Memory subsystem: committed memory, tiny cache, store buffer.
pub mod mem;
/// Offline trace replay comparator.
pub mod replay;
/// Simulation driver: run loop, loader, presentation boundary.
pub mod sim;
/// Deterministic trace log.
pub mod trace;

/// Bus arbiter; owns committed memory and the device hub.
pub use crate::bus::BusArbiter;
/// Run parameters; construct with `RunConfig::new()` or from the CLI.
pub use crate::config::RunConfig;
/// In-order SH-2 core.
pub use crate::cpu::Sh2Core;
/// Emulator driver; owns the run loop.
pub use crate::sim::Emulator;
/// Fatal error type surfaced to the driver.
pub use crate::sim::SimError;
/// Deterministic trace log.
pub use crate::trace::TraceLog;
