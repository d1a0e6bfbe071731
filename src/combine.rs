//! Concatenates period stores along the time axis.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::{
    archive::BoundingBox,
    cli::create_progress_bar,
    error::{Error, Result},
    store::{ChunkShape, FrameCatalog, StoreLayout, StoreReader, StoreWriter},
};

/// Frames copied per read/write round trip.
pub const DEFAULT_CHUNK_FRAMES: u64 = 100;

#[derive(Debug, Clone)]
pub struct CombineSummary {
    pub store: PathBuf,
    pub inputs: usize,
    pub frames: u64,
}

/// Builds `target` from `inputs` in the given order.
///
/// All inputs must share the `(y, x)` shape and, where recorded, the
/// bounding box; this is checked before anything is written.
pub fn combine(
    inputs: &[PathBuf],
    target: &Path,
    chunk_frames: u64,
    chunks: ChunkShape,
) -> Result<CombineSummary> {
    if inputs.is_empty() {
        return Err(Error::NoInputs);
    }

    let readers = inputs
        .iter()
        .map(|input| StoreReader::open(input))
        .collect::<Result<Vec<_>>>()?;
    let (ny, nx, bounds) = check_compatible(&readers)?;
    warn_unless_ascending(&readers)?;

    let frames = readers.iter().map(StoreReader::frames).sum();
    let catalog = merged_catalog(&readers)?;

    let mut writer = StoreWriter::create(
        target,
        &StoreLayout {
            frames,
            ny,
            nx,
            chunks,
            bounds,
        },
    )?;
    let progress = create_progress_bar(frames, "Combining stores".to_string());

    for reader in &readers {
        info!(store = %reader.path().display(), frames = reader.frames(), "Copying store");
        for (start, end) in sub_chunks(reader.frames(), chunk_frames) {
            let times = reader.read_times(start, end)?;
            let data = reader.read_rain(start, end)?;
            let offset = writer.cursor();
            writer.write(&times, &data, offset, offset + (end - start))?;
            progress.inc(end - start);
        }
    }

    if let Some(catalog) = catalog {
        writer.attach_catalog(&catalog)?;
    }
    let store = writer.finish()?;
    progress.finish_with_message("Combined stores");

    info!(store = %store.display(), inputs = inputs.len(), frames, "Combined stores");

    Ok(CombineSummary {
        store,
        inputs: inputs.len(),
        frames,
    })
}

fn check_compatible(readers: &[StoreReader]) -> Result<(u64, u64, Option<BoundingBox>)> {
    let expected = readers[0].spatial_shape();
    let mut bounds: Option<BoundingBox> = None;

    for reader in readers {
        if reader.spatial_shape() != expected {
            return Err(Error::DimensionMismatch {
                store: reader.path().to_path_buf(),
                expected,
                found: reader.spatial_shape(),
            });
        }

        match (bounds, reader.bounds()) {
            (Some(expected), Some(found)) if expected != found => {
                return Err(Error::StoreBoundsMismatch {
                    store: reader.path().to_path_buf(),
                    expected,
                    found,
                })
            }
            (None, found) => bounds = found,
            _ => {}
        }
    }

    Ok((expected.0, expected.1, bounds))
}

// Out of order inputs are allowed, the caller's order wins.
fn warn_unless_ascending(readers: &[StoreReader]) -> Result<()> {
    let mut previous: Option<(i64, &Path)> = None;

    for reader in readers.iter().filter(|r| r.frames() > 0) {
        let first = reader.read_times(0, 1)?[0];
        if let Some((last, store)) = previous.filter(|(last, _)| first <= *last) {
            warn!(
                store = %reader.path().display(),
                previous = %store.display(),
                first,
                last,
                "Store does not start after the previous one"
            );
        }
        let last = reader.read_times(reader.frames() - 1, reader.frames())?[0];
        previous = Some((last, reader.path()));
    }

    Ok(())
}

// Only carried over when every input has one, otherwise indices would not line up.
fn merged_catalog(readers: &[StoreReader]) -> Result<Option<FrameCatalog>> {
    if !readers.iter().all(|r| r.catalog_path().is_file()) {
        return Ok(None);
    }

    let mut merged = FrameCatalog::default();
    for reader in readers {
        merged.extend(FrameCatalog::load(&reader.catalog_path())?);
    }
    Ok(Some(merged))
}

/// Whether `target` already holds exactly the frames of `inputs`.
///
/// A missing or unreadable target is not current.
pub fn is_current(inputs: &[PathBuf], target: &Path) -> Result<bool> {
    if !target.exists() {
        return Ok(false);
    }
    let combined = match StoreReader::open(target) {
        Ok(reader) => reader,
        Err(error) => {
            warn!(store = %target.display(), %error, "Combined store unreadable");
            return Ok(false);
        }
    };

    let mut frames = 0;
    for input in inputs {
        frames += StoreReader::open(input)?.frames();
    }
    Ok(combined.frames() == frames)
}

/// Splits `[0, frames)` into consecutive ranges of at most `size` frames.
pub fn sub_chunks(frames: u64, size: u64) -> Vec<(u64, u64)> {
    let size = size.max(1);
    (0..frames)
        .step_by(size as usize)
        .map(|start| (start, (start + size).min(frames)))
        .collect()
}

// -- Tests -------------------------------------------------------------------
