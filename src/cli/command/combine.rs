use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::{
    combine::{self, CombineSummary},
    config::Config,
};

/// Concatenates the stores of `periods`, in the given order, into the
/// combined store.
pub async fn combine(config: &Config, periods: &[String]) -> Result<CombineSummary> {
    let inputs: Vec<PathBuf> = periods.iter().map(|p| config.store_path(p)).collect();
    let target = config.combined_path();
    let chunk_frames = config.chunk_frames;
    let chunks = config.chunks;

    let summary = tokio::task::spawn_blocking(move || {
        combine::combine(&inputs, &target, chunk_frames, chunks)
    })
    .await?
    .context("Combining period stores")?;

    Ok(summary)
}
