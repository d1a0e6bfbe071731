use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::{
    combine::is_current,
    config::Config,
    download::{DownloadOptions, ExistingFiles},
};

use super::{collect, combine, download};

/// Runs every stage for `periods`. Period stores that already exist are kept,
/// the combined store is rebuilt unless it holds exactly their frames.
pub async fn run(config: &Config, periods: &[String]) -> Result<String> {
    let options = DownloadOptions {
        consumers: config.consumers,
        existing: ExistingFiles::Skip,
    };
    let report = download(config, periods, options).await?;
    if !report.is_complete() {
        bail!("Not all archives could be downloaded, nothing was collected\n{report}");
    }
    info!("{report}");

    let mut collected = 0;
    for period in periods {
        if config.store_path(period).exists() {
            info!(period = %period, "Store exists, skipping");
            continue;
        }
        let summary = collect(config, period).await?;
        info!(period = %period, frames = summary.frames, "Period collected");
        collected += 1;
    }

    let combined = config.combined_path();
    let inputs: Vec<PathBuf> = periods.iter().map(|p| config.store_path(p)).collect();
    let current = is_current(&inputs, &combined)
        .with_context(|| format!("Checking {}", combined.display()))?;
    if collected == 0 && current {
        return Ok(format!(
            "Nothing to do, `{}` is up to date",
            combined.display()
        ));
    }

    let summary = combine(config, periods).await?;
    Ok(format!(
        "Combined store saved to `{}` ({} frames from {} periods)",
        summary.store.display(),
        summary.frames,
        summary.inputs
    ))
}
