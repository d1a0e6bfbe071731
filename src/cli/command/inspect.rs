use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::{
    config::Config,
    store::{FrameCatalog, StoreReader},
};

/// Describes a store given either by path or by period name.
pub fn inspect(config: &Config, store: &str) -> Result<String> {
    let path = resolve(config, store);
    let reader =
        StoreReader::open(&path).with_context(|| format!("Opening {}", path.display()))?;
    let summary = reader.summary()?;

    let mut report = format!("{}\n{summary}", path.display());
    if reader.catalog_path().is_file() {
        let catalog = FrameCatalog::load(&reader.catalog_path())?;
        if catalog.is_empty() {
            report.push_str("\ncatalogue: empty");
        }
        if let (Some(first), Some(last)) = (catalog.records().first(), catalog.records().last()) {
            report.push_str(&format!("\ncatalogue: {} frames", catalog.len()));
            report.push_str(&format!("\n  from {} / {}", first.archive, first.hour));
            report.push_str(&format!("\n  to   {} / {}", last.archive, last.hour));
        }
    }

    Ok(report)
}

fn resolve(config: &Config, store: &str) -> PathBuf {
    let path = PathBuf::from(store);
    if path.exists() {
        return path;
    }
    match store {
        "combined" => config.combined_path(),
        period => config.store_path(period),
    }
}
