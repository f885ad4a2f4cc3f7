//! Device hub: the minimal MMIO register model behind the bus.
//!
//! Registers are a `word address -> u32` map, where the word address is the
//! physical address with the low two bits cleared. Sub-word accesses select
//! a byte or half-word lane inside the register:
//! 1. **Reads** return the stored register shifted and masked to the lane.
//! 2. **Writes** merge the lane into the stored register.
//!
//! Two registers carry behaviour beyond plain storage: the display-status
//! word reads as ready and ignores writes, and the SCU interrupt mask
//! persists only its low 16 bits. Every write is appended to an
//! issue-ordered log regardless of its register.

use std::collections::BTreeMap;

use crate::common::Tick;

/// Display-status register; reads as 1, writes are ignored.
pub const DISPLAY_STATUS_ADDR: u32 = 0x05F0_0010;

/// SCU interrupt mask register; only the low 16 bits are writable.
pub const SCU_INTERRUPT_MASK_ADDR: u32 = 0x05FE_00A0;

const SCU_INTERRUPT_MASK_WRITABLE: u32 = 0x0000_FFFF;

fn lane_shift(addr: u32, size: u8) -> u32 {
    match size {
        1 => (addr & 0x3) * 8,
        2 => (addr & 0x2) * 8,
        _ => 0,
    }
}

fn size_mask(size: u8) -> u32 {
    match size {
        1 => 0xFF,
        2 => 0xFFFF,
        _ => 0xFFFF_FFFF,
    }
}

/// One committed MMIO write, in commit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioWrite {
    /// Bus tick at which the write completed.
    pub t: Tick,
    /// Committing master's CPU id (-1 for DMA).
    pub cpu: i32,
    /// Full physical address as issued (lane bits included).
    pub addr: u32,
    /// Value as issued, before lane shifting.
    pub value: u32,
}

/// Word-addressed MMIO register file.
#[derive(Debug, Clone, Default)]
pub struct DeviceHub {
    regs: BTreeMap<u32, u32>,
    writes: Vec<MmioWrite>,
}

impl DeviceHub {
    /// Creates an empty hub; unwritten registers read as zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `size` bytes from the lane at `addr`.
    pub fn read(&self, _t: Tick, _cpu: i32, addr: u32, size: u8) -> u32 {
        let word_addr = addr & !0x3;

        let value = if word_addr == DISPLAY_STATUS_ADDR {
            // Deterministic display-ready status bit.
            1
        } else if word_addr == SCU_INTERRUPT_MASK_ADDR {
            self.regs.get(&word_addr).copied().unwrap_or(0) & SCU_INTERRUPT_MASK_WRITABLE
        } else {
            self.regs.get(&word_addr).copied().unwrap_or(0)
        };

        (value >> lane_shift(addr, size)) & size_mask(size)
    }

    /// Writes `size` bytes to the lane at `addr`, logging the write first.
    pub fn write(&mut self, t: Tick, cpu: i32, addr: u32, size: u8, value: u32) {
        self.writes.push(MmioWrite { t, cpu, addr, value });
        tracing::debug!(t, cpu, addr = format_args!("{addr:#010x}"), value, "mmio write");

        let word_addr = addr & !0x3;
        if word_addr == DISPLAY_STATUS_ADDR {
            return;
        }

        let shift = lane_shift(addr, size);
        let write_mask = size_mask(size) << shift;
        let old = self.regs.get(&word_addr).copied().unwrap_or(0);
        let merged = (old & !write_mask) | ((value << shift) & write_mask);
        if word_addr == SCU_INTERRUPT_MASK_ADDR {
            self.regs.insert(word_addr, merged & SCU_INTERRUPT_MASK_WRITABLE);
        } else {
            self.regs.insert(word_addr, merged);
        }
    }

    /// Returns the commit-ordered write log.
    pub fn writes(&self) -> &[MmioWrite] {
        &self.writes
    }
}
