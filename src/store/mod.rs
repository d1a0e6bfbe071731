//! The time-indexed Zarr store holding the collected frames.
//!
//! ```text
//! <name>.zarr/
//! ├── zarr.json        group, `bounding_box` attribute
//! ├── time/            i64 minutes since 1970-01-01 00:00:00
//! ├── y/, x/           index coordinates
//! ├── rain/            i32 (time, y, x), gzip, fill value -1
//! └── frames.parquet   provenance of every time index
//! ```

pub mod catalog;
pub mod reader;
pub mod writer;

use std::path::{Path, PathBuf};

use zarrs::array_subset::ArraySubset;

pub use catalog::FrameCatalog;
pub use reader::StoreReader;
pub use writer::{StoreLayout, StoreWriter};

use crate::error::{Error, Result};

/// Marks `rain` cells that were never written or had no data.
pub const FILL_VALUE: i32 = -1;

/// Marks `time` cells that were never written.
pub const TIME_FILL_VALUE: i64 = i64::MIN;

pub const RAIN_UNITS: &str = "mm/h";

const TIME_PATH: &str = "/time";
const Y_PATH: &str = "/y";
const X_PATH: &str = "/x";
const RAIN_PATH: &str = "/rain";
const BOUNDING_BOX_ATTR: &str = "bounding_box";

// A year of hourly frames per chunk of the time coordinate.
const TIME_COORD_CHUNK: u64 = 8784;

/// Chunk shape of the `rain` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkShape {
    pub time: u64,
    pub y: u64,
    pub x: u64,
}

impl Default for ChunkShape {
    fn default() -> Self {
        ChunkShape {
            time: 24,
            y: 300,
            x: 300,
        }
    }
}

impl ChunkShape {
    /// Clamps the spatial chunk edges to the array and keeps every edge non-zero.
    fn fit(self, ny: u64, nx: u64) -> Vec<u64> {
        vec![
            self.time.max(1),
            self.y.min(ny).max(1),
            self.x.min(nx).max(1),
        ]
    }
}

/// Directory a store is assembled in before it is published at `target`.
pub fn staging_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn subset(start: Vec<u64>, shape: Vec<u64>) -> Result<ArraySubset> {
    ArraySubset::new_with_start_shape(start, shape).map_err(Error::store)
}

// -- Tests -------------------------------------------------------------------
