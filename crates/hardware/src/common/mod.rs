//! Common types shared across the core.
//!
//! This module provides the fundamental building blocks used by every other
//! component:
//! 1. **Address space:** Virtual-to-physical mapping, uncached alias test, MMIO region test.
//! 2. **Time:** The `Tick` type used by the arbiter, the CPUs, and the trace log.

/// Address-space mapping helpers and region tests.
pub mod addr;

pub use addr::{is_mmio, is_uncached_alias, to_phys};

/// Monotonic simulation time in bus cycles.
///
/// Each bus master carries its own local tick counter; the arbiter merges
/// them into a single timeline through `bus_free_tick`.
pub type Tick = u64;
