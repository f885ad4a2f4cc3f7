//! Binary image loading.

use std::fs;
use std::path::Path;

use super::SimError;

/// Reads a raw binary image from disk.
pub fn read_binary_file(path: &Path) -> Result<Vec<u8>, SimError> {
    fs::read(path).map_err(|source| SimError::BiosRead {
        path: path.to_path_buf(),
        source,
    })
}
