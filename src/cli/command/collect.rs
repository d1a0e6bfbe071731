use anyhow::{Context, Result};

use crate::{
    aggregate::{self, CollectSummary},
    config::Config,
    period::Period,
};

/// Builds `<stores>/<period>.zarr` from the downloaded archives of `period`.
pub async fn collect(config: &Config, period: &str) -> Result<CollectSummary> {
    let raw_dir = config.raw_dir(period);
    let period = Period::discover(period, &raw_dir)?;

    std::fs::create_dir_all(config.stores_dir())
        .with_context(|| format!("Creating {}", config.stores_dir().display()))?;

    let summary = aggregate::collect(&period, &config.store_path(&period.id), config.chunks)
        .await
        .with_context(|| format!("Collecting period {} from {}", period.id, raw_dir.display()))?;

    Ok(summary)
}
