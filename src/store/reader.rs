//! Read access to a published store.

use std::{
    fmt, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::NaiveDateTime;
use zarrs::{array::Array, group::Group};
use zarrs_filesystem::FilesystemStore;

use super::{
    catalog::CATALOG_FILE, subset, BOUNDING_BOX_ATTR, RAIN_PATH, TIME_FILL_VALUE, TIME_PATH,
};
use crate::{
    archive::{naming, BoundingBox},
    error::{Error, Result},
};

pub struct StoreReader {
    path: PathBuf,
    time: Array<FilesystemStore>,
    rain: Array<FilesystemStore>,
    bounds: Option<BoundingBox>,
}

/// Shape and coverage of a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSummary {
    pub frames: u64,
    pub ny: u64,
    pub nx: u64,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
    pub unwritten: u64,
    pub bounds: Option<BoundingBox>,
}

impl StoreReader {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(Error::io(
                path,
                io::Error::new(io::ErrorKind::NotFound, "no such store"),
            ));
        }

        let store = Arc::new(FilesystemStore::new(path).map_err(Error::store)?);
        let group = Group::open(store.clone(), "/").map_err(Error::store)?;
        let bounds = group
            .attributes()
            .get(BOUNDING_BOX_ATTR)
            .and_then(|v| v.as_array())
            .map(|values| values.iter().filter_map(|v| v.as_f64()).collect::<Vec<_>>())
            .and_then(|values| BoundingBox::from_slice(&values));

        let time = Array::open(store.clone(), TIME_PATH).map_err(Error::store)?;
        let rain = Array::open(store, RAIN_PATH).map_err(Error::store)?;
        if rain.shape().len() != 3 || rain.shape()[0] != time.shape()[0] {
            return Err(Error::Store(format!(
                "`{}` has inconsistent time dimensions",
                path.display()
            )));
        }

        Ok(StoreReader {
            path: path.to_path_buf(),
            time,
            rain,
            bounds,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> u64 {
        self.time.shape()[0]
    }

    /// `(y, x)` extent of every frame.
    pub fn spatial_shape(&self) -> (u64, u64) {
        let shape = self.rain.shape();
        (shape[1], shape[2])
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.path.join(CATALOG_FILE)
    }

    pub fn read_times(&self, start: u64, end: u64) -> Result<Vec<i64>> {
        self.time
            .retrieve_array_subset_elements::<i64>(&subset(vec![start], vec![end - start])?)
            .map_err(Error::store)
    }

    /// Frames `[start, end)` stacked along the time axis.
    pub fn read_rain(&self, start: u64, end: u64) -> Result<Vec<i32>> {
        let (ny, nx) = self.spatial_shape();
        self.rain
            .retrieve_array_subset_elements::<i32>(&subset(
                vec![start, 0, 0],
                vec![end - start, ny, nx],
            )?)
            .map_err(Error::store)
    }

    pub fn summary(&self) -> Result<StoreSummary> {
        let (ny, nx) = self.spatial_shape();
        let times = self.read_times(0, self.frames())?;
        let written: Vec<i64> = times
            .iter()
            .copied()
            .filter(|t| *t != TIME_FILL_VALUE)
            .collect();

        Ok(StoreSummary {
            frames: self.frames(),
            ny,
            nx,
            first: written.first().copied().and_then(naming::from_minutes),
            last: written.last().copied().and_then(naming::from_minutes),
            unwritten: (times.len() - written.len()) as u64,
            bounds: self.bounds,
        })
    }
}

impl fmt::Display for StoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "frames:    {}", self.frames)?;
        writeln!(f, "grid:      {} x {}", self.ny, self.nx)?;
        match (self.first, self.last) {
            (Some(first), Some(last)) => writeln!(f, "covers:    {first} .. {last}")?,
            _ => writeln!(f, "covers:    -")?,
        }
        if let Some(bounds) = self.bounds {
            writeln!(f, "bounds:    {bounds}")?;
        }
        write!(f, "unwritten: {}", self.unwritten)
    }
}

// -- Tests -------------------------------------------------------------------
