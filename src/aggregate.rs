//! Builds the store of one period from its downloaded archives.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::{
    archive::{count_frames, BoundingBox, DayBatch, FrameSource},
    cli::{create_progress_bar, create_spinner},
    error::{Error, Result},
    period::Period,
    store::{ChunkShape, FrameCatalog, StoreLayout, StoreWriter},
};

#[derive(Debug, Clone)]
pub struct CollectSummary {
    pub period: String,
    pub store: PathBuf,
    pub frames: u64,
    pub bounds: Option<BoundingBox>,
}

/// Counts the frames of `period`, then streams them into a store at `target`.
pub async fn collect(period: &Period, target: &Path, chunks: ChunkShape) -> Result<CollectSummary> {
    if period.archives.is_empty() {
        return Err(Error::EmptyPeriod(period.id.clone()));
    }

    let spinner = create_spinner(format!("Counting frames of {}", period.id));
    let expected = count_frames(&period.archives).await?;
    spinner.finish_with_message(format!("{} frames in {}", expected, period.id));
    if expected == 0 {
        return Err(Error::EmptyPeriod(period.id.clone()));
    }
    info!(
        period = %period.id,
        archives = period.archives.len(),
        frames = expected,
        "Counted frames"
    );

    let period = period.clone();
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || write_period(&period, expected, &target, chunks)).await?
}

/// Writes the `expected` frames of `period` one day batch at a time.
///
/// The store is only published when exactly `expected` frames were read.
pub fn write_period(
    period: &Period,
    expected: u64,
    target: &Path,
    chunks: ChunkShape,
) -> Result<CollectSummary> {
    let mismatch = |written| Error::FrameCountMismatch {
        period: period.id.clone(),
        expected,
        written,
    };

    let mut source = FrameSource::new(period.archives.clone());
    let first = first_batch(&mut source)?.ok_or_else(|| mismatch(0))?;
    let (ny, nx) = first.shape().ok_or_else(|| mismatch(0))?;
    let bounds = source.grid().bounds();

    let mut writer = StoreWriter::create(
        target,
        &StoreLayout {
            frames: expected,
            ny,
            nx,
            chunks,
            bounds,
        },
    )?;
    let mut catalog = FrameCatalog::default();
    let progress = create_progress_bar(expected, format!("Collecting {}", period.id));

    for batch in std::iter::once(Ok(first)).chain(source) {
        let batch = batch?;
        let start = writer.cursor();
        let end = start + batch.len() as u64;
        if end > expected {
            return Err(mismatch(end));
        }

        writer.write(&batch.time_values(), &batch.data(), start, end)?;
        catalog.push_batch(&batch);
        progress.inc(batch.len() as u64);
    }

    if writer.cursor() != expected {
        return Err(mismatch(writer.cursor()));
    }
    writer.attach_catalog(&catalog)?;
    let store = writer.finish()?;
    progress.finish_with_message(format!("Collected {}", period.id));

    info!(period = %period.id, store = %store.display(), frames = expected, "Collected period");

    Ok(CollectSummary {
        period: period.id.clone(),
        store,
        frames: expected,
        bounds,
    })
}

// Day archives without members carry no shape; skip to the first real one.
fn first_batch(source: &mut FrameSource) -> Result<Option<DayBatch>> {
    for batch in source {
        let batch = batch?;
        if !batch.is_empty() {
            return Ok(Some(batch));
        }
    }
    Ok(None)
}

// -- Tests -------------------------------------------------------------------
