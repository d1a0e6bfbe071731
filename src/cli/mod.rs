//! Command line interface.

pub mod command;

use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Result};
use clap::{command, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    combine::DEFAULT_CHUNK_FRAMES,
    config::{default_data_dir, Config},
    download::{directory_url, DEFAULT_BASE_URL, DEFAULT_CONSUMERS},
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Downloads RADOLAN hourly precipitation archives and aggregates them into
/// time-indexed stores
pub struct Cli {
    /// Root of the raw archives and built stores [default: ~/radolan]
    #[arg(long, global = true, env = "BASE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Index the period directories are listed under
    #[arg(long, global = true, env = "RADOLAN_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Seconds to wait for a connection to the archive server
    #[arg(long, global = true, default_value_t = 30)]
    pub connect_timeout: u64,

    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download the archives of the given periods, e.g. `2006` or `2005..2018`
    Download {
        #[arg(required = true)]
        periods: Vec<String>,
        /// Number of concurrent downloads
        #[arg(long, default_value_t = DEFAULT_CONSUMERS)]
        consumers: usize,
        /// Download archives again even if they are present
        #[arg(long)]
        overwrite: bool,
    },
    /// Build the store of one downloaded period
    Collect { period: String },
    /// Concatenate period stores into the combined store
    Combine {
        #[arg(required = true)]
        periods: Vec<String>,
        /// Frames copied at a time
        #[arg(long, default_value_t = DEFAULT_CHUNK_FRAMES)]
        chunk_frames: u64,
    },
    /// Download, collect and combine, skipping stores that already exist
    Run {
        #[arg(required = true)]
        periods: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_CONSUMERS)]
        consumers: usize,
    },
    /// Summarise a store, given by path or period
    Inspect { store: String },
}

impl Cli {
    pub fn config(&self) -> Result<Config> {
        let data_dir = self.data_dir.clone().unwrap_or_else(default_data_dir);
        let mut config = Config::new(data_dir, directory_url(&self.base_url)?);
        config.connect_timeout = Duration::from_secs(self.connect_timeout);

        Ok(config)
    }
}

/// Expands inclusive year ranges such as `2005..2018`; other values pass
/// through unchanged.
pub fn expand_periods(periods: &[String]) -> Result<Vec<String>> {
    let mut expanded = Vec::new();

    for period in periods {
        let Some((start, end)) = period.split_once("..") else {
            expanded.push(period.clone());
            continue;
        };

        let start: u32 = start
            .parse()
            .map_err(|_| anyhow!("Invalid period range `{period}`"))?;
        let end: u32 = end
            .trim_start_matches('=')
            .parse()
            .map_err(|_| anyhow!("Invalid period range `{period}`"))?;
        if start > end {
            return Err(anyhow!("Period range `{period}` is empty"));
        }
        expanded.extend((start..=end).map(|year| year.to_string()));
    }

    Ok(expanded)
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    ProgressBar::new(size).with_message(message).with_style(
        ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    )
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn should_expand_inclusive_ranges() {
        let periods = expand_periods(&args(&["2005..2007", "recent", "2010..=2010"])).unwrap();
        assert_eq!(periods, args(&["2005", "2006", "2007", "recent", "2010"]));
    }

    #[test]
    fn should_reject_malformed_ranges() {
        assert!(expand_periods(&args(&["2007..2005"])).is_err());
        assert!(expand_periods(&args(&["2005..later"])).is_err());
    }

    #[test]
    fn should_parse_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "radolan",
            "download",
            "2006",
            "--consumers",
            "4",
            "--data-dir",
            "/tmp/radolan",
            "--base-url",
            "https://example.org/asc",
        ])
        .unwrap();

        let config = cli.config().unwrap();
        assert_eq!(config.raw_dir("2006"), PathBuf::from("/tmp/radolan/raw/2006"));
        assert_eq!(config.base_url.as_str(), "https://example.org/asc/");
        assert!(matches!(
            cli.command,
            Commands::Download {
                consumers: 4,
                overwrite: false,
                ..
            }
        ));
    }
}
