//! Presentation boundary.
//!
//! The core's only visual output is a deterministic fold of the device write
//! log into a small framebuffer. Actual windowing lives outside the core; in
//! a headless build the hook is a logged no-op either way.

use crate::dev::MmioWrite;

/// Background colour of the folded framebuffer (ARGB).
const BACKDROP: u32 = 0xFF10_1020;

/// Colour marking a device write (ARGB).
const WRITE_MARK: u32 = 0xFF00_FF00;

/// Folds the device write log into a `width * height` framebuffer.
///
/// Each write deterministically lights one pixel keyed by its address and
/// commit tick, so identical runs render identically.
pub fn fold_device_writes(writes: &[MmioWrite], width: usize, height: usize) -> Vec<u32> {
    let mut framebuffer = vec![BACKDROP; width * height];
    for w in writes {
        let pos = ((w.addr ^ (w.t as u32)) as usize) % framebuffer.len();
        framebuffer[pos] = WRITE_MARK;
    }
    framebuffer
}

/// Presents a framebuffer when a windowing backend is available.
///
/// This build carries no backend; the hook logs and returns.
pub fn present_framebuffer_if_available(
    width: usize,
    height: usize,
    framebuffer: &[u32],
    headless: bool,
) {
    if headless {
        tracing::debug!("headless run, presentation skipped");
        return;
    }
    tracing::info!(
        width,
        height,
        lit = framebuffer.iter().filter(|&&p| p == WRITE_MARK).count(),
        "no windowing backend linked, presentation skipped"
    );
}
