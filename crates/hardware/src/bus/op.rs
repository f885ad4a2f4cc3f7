//! Bus request and response types.

use crate::common::Tick;

/// Identity of a bus master, in numeric tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BusMaster {
    /// Master SH-2 (cpu 0).
    CpuA = 0,
    /// Slave SH-2 (cpu 1).
    CpuB = 1,
    /// Auxiliary DMA master.
    Dma = 2,
}

impl BusMaster {
    /// Returns true for the two SH-2 masters.
    pub fn is_cpu(self) -> bool {
        matches!(self, Self::CpuA | Self::CpuB)
    }

    /// Returns the CPU slot index for SH-2 masters.
    pub fn cpu_index(self) -> Option<usize> {
        match self {
            Self::CpuA => Some(0),
            Self::CpuB => Some(1),
            Self::Dma => None,
        }
    }

    /// Returns the master for a CPU slot index.
    pub fn from_cpu_index(index: usize) -> Self {
        if index == 0 { Self::CpuA } else { Self::CpuB }
    }

    /// CPU id as it appears in trace records (-1 for DMA).
    pub fn trace_id(self) -> i32 {
        match self {
            Self::CpuA => 0,
            Self::CpuB => 1,
            Self::Dma => -1,
        }
    }
}

/// What a bus request does once granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    /// Instruction fetch (a read on the bus).
    IFetch,
    /// Data read from committed memory.
    Read,
    /// Data write to committed memory.
    Write,
    /// Read routed to the device hub.
    MmioRead,
    /// Write routed to the device hub.
    MmioWrite,
    /// Pure synchroniser: no side effects, no address history update.
    Barrier,
}

impl BusKind {
    /// Trace name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::IFetch => "IFETCH",
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::MmioRead => "MMIO_READ",
            Self::MmioWrite => "MMIO_WRITE",
            Self::Barrier => "BARRIER",
        }
    }

    /// Returns whether a grant of this kind stores to memory or a device.
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write | Self::MmioWrite)
    }
}

/// A single bus request, produced by one master and consumed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusOp {
    /// Requesting master.
    pub master: BusMaster,
    /// Master-local tick at which the request was issued.
    pub req_time: Tick,
    /// Monotonic issue sequence number (final tie-break).
    pub sequence: u64,
    /// Access kind.
    pub kind: BusKind,
    /// Physical address.
    pub phys: u32,
    /// Access size in bytes (1, 2, or 4).
    pub size: u8,
    /// Value for writes; ignored for reads.
    pub data: u32,
    /// Request a full cache line alongside a memory read.
    pub fill_cache_line: bool,
    /// Line size for the fill, in bytes.
    pub cache_line_size: u8,
}

impl BusOp {
    /// Creates a request without a line fill.
    pub fn new(
        master: BusMaster,
        req_time: Tick,
        sequence: u64,
        kind: BusKind,
        phys: u32,
        size: u8,
        data: u32,
    ) -> Self {
        Self {
            master,
            req_time,
            sequence,
            kind,
            phys,
            size,
            data,
            fill_cache_line: false,
            cache_line_size: 0,
        }
    }

    /// Marks the request as wanting a full line of `line_size` bytes.
    pub fn with_line_fill(mut self, line_size: usize) -> Self {
        self.fill_cache_line = true;
        self.cache_line_size = line_size as u8;
        self
    }

    /// Trace source tag: `DMA` for DMA owners, else the kind name.
    pub fn source_name(&self) -> &'static str {
        if self.master == BusMaster::Dma {
            "DMA"
        } else {
            self.kind.name()
        }
    }
}

/// The arbiter's answer to a granted request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusResponse {
    /// Value read; zero for writes and barriers.
    pub value: u32,
    /// `finish - req_time`: how long the master was held up in total.
    pub stall: Tick,
    /// Tick at which the grant began occupying the bus.
    pub start: Tick,
    /// Tick at which the bus became free again.
    pub finish: Tick,
    /// For line-filling reads, the filled line's base (`phys / line_size`).
    pub line_base: u32,
    /// For line-filling reads, the full line bytes; empty otherwise.
    pub line_data: Vec<u8>,
}

/// One committed request from a batch, in commit order.
#[derive(Debug, Clone)]
pub struct CommitResult {
    /// Index of the request in the submitted batch.
    pub input_index: usize,
    /// The committed request.
    pub op: BusOp,
    /// The response produced by the commit.
    pub response: BusResponse,
}
