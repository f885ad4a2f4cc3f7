//! Simulation driver: the emulator run loop, binary loading, presentation.

/// Emulator driver: scripted demos, BIOS bring-up, the batch run loop.
pub mod emulator;
/// Binary image loading.
pub mod loader;
/// Presentation boundary (framebuffer fold, headless-aware hook).
pub mod present;

pub use emulator::Emulator;

use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions that propagate out of the core.
///
/// Everything recoverable stays in-band as FAULT trace records; these are
/// the environment failures the driver reports and exits on.
#[derive(Debug, Error)]
pub enum SimError {
    /// The BIOS image could not be read.
    #[error("failed to read BIOS image {path}: {source}")]
    BiosRead {
        /// Path that failed to open or read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The trace file could not be written.
    #[error("failed to write trace to {path}: {source}")]
    TraceWrite {
        /// Path that failed to open or write.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
