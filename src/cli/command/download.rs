use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::warn;

use crate::{
    config::Config,
    download::{download_periods, DownloadOptions, DownloadReport, HttpRemote},
};

/// Downloads `periods` into the raw archive directory.
///
/// Ctrl-C stops the workers from taking new archives; transfers already
/// running are finished first.
pub async fn download(
    config: &Config,
    periods: &[String],
    options: DownloadOptions,
) -> Result<DownloadReport> {
    let (stop, shutdown) = watch::channel(false);
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing running downloads");
            stop.send_replace(true);
        }
    });

    let remote = Arc::new(HttpRemote::new(config.connect_timeout)?);
    let report = download_periods(
        remote,
        &config.base_url,
        periods,
        &config.raw_root(),
        options,
        shutdown,
    )
    .await
    .with_context(|| format!("Downloading from {}", config.base_url));
    signal.abort();

    report
}
