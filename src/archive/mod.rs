//! Reading of the nested period → day → hour archives.

pub mod count;
pub mod frames;
pub mod naming;
pub mod raster;

#[cfg(test)]
pub mod fixture;

use std::io::Read;

pub use count::count_frames;
pub use frames::{DayBatch, FrameSource};
pub use raster::{BoundingBox, Raster};

/// Only regular files are frames (or day sub-archives); the counter and the
/// source must agree on this.
fn is_payload<R: Read>(entry: &tar::Entry<'_, R>) -> bool {
    entry.header().entry_type().is_file()
}
