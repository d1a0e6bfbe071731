//! Single-writer, append-at-offset access to a new store.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_json::{json, Map, Value};
use tracing::{debug, info};
use zarrs::{
    array::{
        codec::{bytes_to_bytes::gzip::GzipCodec, BytesToBytesCodecTraits},
        Array, ArrayBuilder, ChunkGrid, DataType, FillValue,
    },
    group::GroupBuilder,
};
use zarrs_filesystem::FilesystemStore;

use super::{
    catalog::{FrameCatalog, CATALOG_FILE},
    staging_path, subset, ChunkShape, BOUNDING_BOX_ATTR, FILL_VALUE, RAIN_PATH, RAIN_UNITS,
    TIME_COORD_CHUNK, TIME_FILL_VALUE, TIME_PATH, X_PATH, Y_PATH,
};
use crate::{
    archive::{naming::TIME_UNITS, BoundingBox},
    error::{Error, Result},
};

const GZIP_LEVEL: u32 = 5;

/// Fixed dimensions of a store, known before the first frame is written.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    pub frames: u64,
    pub ny: u64,
    pub nx: u64,
    pub chunks: ChunkShape,
    pub bounds: Option<BoundingBox>,
}

/// Owns a store under construction.
///
/// Frames are appended with [`StoreWriter::write`], each call starting where
/// the previous one ended. The store is assembled next to its target and only
/// moved there by [`StoreWriter::finish`] once every frame was written.
pub struct StoreWriter {
    target: PathBuf,
    staging: PathBuf,
    time: Array<FilesystemStore>,
    rain: Array<FilesystemStore>,
    frames: u64,
    ny: u64,
    nx: u64,
    cursor: u64,
}

impl StoreWriter {
    pub fn create(target: &Path, layout: &StoreLayout) -> Result<Self> {
        let staging = staging_path(target);
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| Error::io(&staging, e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| Error::io(&staging, e))?;

        let store = Arc::new(FilesystemStore::new(&staging).map_err(Error::store)?);

        let mut attrs = Map::new();
        attrs.insert(
            "title".to_string(),
            json!("RADOLAN RW hourly precipitation"),
        );
        if let Some(bounds) = layout.bounds {
            attrs.insert(BOUNDING_BOX_ATTR.to_string(), json!(bounds.to_vec()));
        }
        let group = GroupBuilder::new()
            .attributes(attrs)
            .build(store.clone(), "/")
            .map_err(Error::store)?;
        group.store_metadata().map_err(Error::store)?;

        let mut time_attrs = Map::new();
        time_attrs.insert("units".to_string(), json!(TIME_UNITS));
        time_attrs.insert("calendar".to_string(), json!("standard"));
        let time = coordinate(
            &store,
            TIME_PATH,
            layout.frames,
            TIME_COORD_CHUNK,
            TIME_FILL_VALUE,
            time_attrs,
        )?;

        for (path, len) in [(Y_PATH, layout.ny), (X_PATH, layout.nx)] {
            let index = coordinate(&store, path, len, len, -1, Map::new())?;
            let values: Vec<i64> = (0..len as i64).collect();
            index
                .store_array_subset_elements::<i64>(&subset(vec![0], vec![len])?, &values)
                .map_err(Error::store)?;
        }

        let mut rain_attrs = Map::new();
        rain_attrs.insert("units".to_string(), json!(RAIN_UNITS));
        rain_attrs.insert("_FillValue".to_string(), json!(FILL_VALUE));
        let chunk_grid: ChunkGrid = layout
            .chunks
            .fit(layout.ny, layout.nx)
            .try_into()
            .map_err(|e| Error::Store(format!("{:?}", e)))?;
        let codec: Arc<dyn BytesToBytesCodecTraits> =
            Arc::new(GzipCodec::new(GZIP_LEVEL).map_err(Error::store)?);
        let rain = ArrayBuilder::new(
            vec![layout.frames, layout.ny, layout.nx],
            DataType::Int32,
            chunk_grid,
            FillValue::from(FILL_VALUE),
        )
        .bytes_to_bytes_codecs(vec![codec])
        .dimension_names(["time", "y", "x"].into())
        .attributes(rain_attrs)
        .build(store.clone(), RAIN_PATH)
        .map_err(Error::store)?;
        rain.store_metadata().map_err(Error::store)?;

        info!(
            store = %target.display(),
            frames = layout.frames,
            ny = layout.ny,
            nx = layout.nx,
            "Created store"
        );

        Ok(StoreWriter {
            target: target.to_path_buf(),
            staging,
            time,
            rain,
            frames: layout.frames,
            ny: layout.ny,
            nx: layout.nx,
            cursor: 0,
        })
    }

    /// Offset the next write has to start at.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Writes `times` and `data` to the time range `[start, end)`.
    ///
    /// `data` holds `end - start` rasters of the store's `(y, x)` shape. The
    /// range must start at [`StoreWriter::cursor`] and stay within the store.
    pub fn write(&mut self, times: &[i64], data: &[i32], start: u64, end: u64) -> Result<()> {
        self.check_write(times.len(), data.len(), start, end)?;
        if start == end {
            return Ok(());
        }

        let n = end - start;
        self.time
            .store_array_subset_elements::<i64>(&subset(vec![start], vec![n])?, times)
            .map_err(Error::store)?;
        self.rain
            .store_array_subset_elements::<i32>(
                &subset(vec![start, 0, 0], vec![n, self.ny, self.nx])?,
                data,
            )
            .map_err(Error::store)?;
        self.cursor = end;

        debug!(start, end, "Wrote frames");

        Ok(())
    }

    fn check_write(&self, times: usize, cells: usize, start: u64, end: u64) -> Result<()> {
        let violation = |reason: String| Error::OffsetViolation { start, end, reason };

        if start != self.cursor {
            return Err(violation(format!(
                "writes must continue at offset {}",
                self.cursor
            )));
        }
        if end < start {
            return Err(violation("range ends before it starts".to_string()));
        }
        if end > self.frames {
            return Err(violation(format!("store holds {} frames", self.frames)));
        }
        let n = end - start;
        if times as u64 != n {
            return Err(violation(format!("{times} time values for {n} frames")));
        }
        if cells as u64 != n * self.ny * self.nx {
            return Err(violation(format!(
                "{cells} cells for {n} frames of {}x{}",
                self.ny, self.nx
            )));
        }

        Ok(())
    }

    /// Stores the provenance of the written frames alongside the arrays.
    pub fn attach_catalog(&self, catalog: &FrameCatalog) -> Result<()> {
        catalog.save(&self.staging.join(CATALOG_FILE))
    }

    /// Publishes the store at its target path, replacing a previous one.
    pub fn finish(self) -> Result<PathBuf> {
        if self.cursor != self.frames {
            return Err(Error::Incomplete {
                path: self.target,
                frames: self.frames,
                written: self.cursor,
            });
        }

        let StoreWriter {
            target, staging, ..
        } = self;
        if target.exists() {
            fs::remove_dir_all(&target).map_err(|e| Error::io(&target, e))?;
        }
        fs::rename(&staging, &target).map_err(|e| Error::io(&staging, e))?;

        info!(store = %target.display(), "Published store");

        Ok(target)
    }
}

fn coordinate(
    store: &Arc<FilesystemStore>,
    path: &str,
    len: u64,
    chunk: u64,
    fill: i64,
    attrs: Map<String, Value>,
) -> Result<Array<FilesystemStore>> {
    let chunk_grid: ChunkGrid = vec![chunk.min(len).max(1)]
        .try_into()
        .map_err(|e| Error::Store(format!("{:?}", e)))?;
    let dimension = path.trim_start_matches('/');

    let array = ArrayBuilder::new(vec![len], DataType::Int64, chunk_grid, FillValue::from(fill))
        .dimension_names([dimension].into())
        .attributes(attrs)
        .build(store.clone(), path)
        .map_err(Error::store)?;
    array.store_metadata().map_err(Error::store)?;

    Ok(array)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;
    use crate::store::StoreReader;

    fn layout(frames: u64) -> StoreLayout {
        StoreLayout {
            frames,
            ny: 2,
            nx: 3,
            chunks: ChunkShape {
                time: 2,
                y: 2,
                x: 2,
            },
            bounds: Some(BoundingBox {
                left: 0.0,
                bottom: 0.0,
                right: 3.0,
                top: 2.0,
            }),
        }
    }

    fn frames(values: &[i32]) -> Vec<i32> {
        values.iter().flat_map(|v| vec![*v; 6]).collect()
    }

    #[test]
    fn should_append_at_consecutive_offsets() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("2006.zarr");

        let mut writer = StoreWriter::create(&target, &layout(3)).unwrap();
        writer.write(&[10, 20], &frames(&[1, 2]), 0, 2).unwrap();
        writer.write(&[30], &frames(&[3]), 2, 3).unwrap();
        let published = writer.finish().unwrap();

        assert_eq!(published, target);
        assert!(!staging_path(&target).exists());

        let reader = StoreReader::open(&target).unwrap();
        assert_eq!(reader.frames(), 3);
        assert_eq!(reader.spatial_shape(), (2, 3));
        assert_eq!(reader.read_times(0, 3).unwrap(), vec![10, 20, 30]);
        assert_eq!(reader.read_rain(1, 3).unwrap(), frames(&[2, 3]));
        assert_eq!(reader.bounds().unwrap().right, 3.0);
    }

    #[test]
    fn should_reject_gap_and_overlap() {
        let dir = TempDir::new().unwrap();
        let mut writer = StoreWriter::create(&dir.path().join("s.zarr"), &layout(4)).unwrap();
        writer.write(&[10], &frames(&[1]), 0, 1).unwrap();

        let gap = writer.write(&[30], &frames(&[3]), 2, 3).unwrap_err();
        assert!(matches!(gap, Error::OffsetViolation { start: 2, .. }));

        let overlap = writer.write(&[10], &frames(&[1]), 0, 1).unwrap_err();
        assert!(matches!(overlap, Error::OffsetViolation { start: 0, .. }));

        assert_eq!(writer.cursor(), 1);
    }

    #[test]
    fn should_reject_out_of_range_and_mismatched_lengths() {
        let dir = TempDir::new().unwrap();
        let mut writer = StoreWriter::create(&dir.path().join("s.zarr"), &layout(1)).unwrap();

        assert!(writer.write(&[1, 2], &frames(&[1, 2]), 0, 2).is_err());
        assert!(writer.write(&[1, 2], &frames(&[1]), 0, 1).is_err());
        assert!(writer.write(&[1], &[1, 2, 3], 0, 1).is_err());
        assert_eq!(writer.cursor(), 0);
    }

    #[test]
    fn should_not_publish_incomplete_store() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("s.zarr");
        let mut writer = StoreWriter::create(&target, &layout(2)).unwrap();
        writer.write(&[10], &frames(&[1]), 0, 1).unwrap();

        let err = writer.finish().unwrap_err();

        assert!(matches!(
            err,
            Error::Incomplete {
                frames: 2,
                written: 1,
                ..
            }
        ));
        assert!(!target.exists());
        assert!(staging_path(&target).exists());
    }

    #[test]
    fn should_replace_previous_store() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("s.zarr");

        let mut writer = StoreWriter::create(&target, &layout(1)).unwrap();
        writer.write(&[10], &frames(&[1]), 0, 1).unwrap();
        writer.finish().unwrap();

        let mut writer = StoreWriter::create(&target, &layout(2)).unwrap();
        writer.write(&[20, 30], &frames(&[2, 3]), 0, 2).unwrap();
        writer.finish().unwrap();

        let reader = StoreReader::open(&target).unwrap();
        assert_eq!(reader.read_times(0, 2).unwrap(), vec![20, 30]);
    }
}
