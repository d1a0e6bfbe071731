mod aggregate;
mod archive;
mod cli;
mod combine;
mod config;
mod download;
mod error;
mod period;
mod store;

use anyhow::{bail, Result};
use clap::Parser;
use cli::{command, expand_periods, Cli, Commands};
use download::{DownloadOptions, ExistingFiles};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match execute(&cli).await {
        Ok(message) => println!("{message}"),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn execute(cli: &Cli) -> Result<String> {
    let mut config = cli.config()?;

    match &cli.command {
        Commands::Download {
            periods,
            consumers,
            overwrite,
        } => {
            let options = DownloadOptions {
                consumers: *consumers,
                existing: if *overwrite {
                    ExistingFiles::Overwrite
                } else {
                    ExistingFiles::Skip
                },
            };
            let report = command::download(&config, &expand_periods(periods)?, options).await?;
            if !report.is_complete() {
                bail!("{report}");
            }
            Ok(format!(
                "{report}\nArchives saved to `{}`",
                config.raw_root().display()
            ))
        }
        Commands::Collect { period } => {
            let summary = command::collect(&config, period).await?;
            let bounds = summary
                .bounds
                .map(|b| format!(", bounds {b}"))
                .unwrap_or_default();
            Ok(format!(
                "Store of {} saved to `{}` ({} frames{bounds})",
                summary.period,
                summary.store.display(),
                summary.frames
            ))
        }
        Commands::Combine {
            periods,
            chunk_frames,
        } => {
            config.chunk_frames = *chunk_frames;
            let summary = command::combine(&config, &expand_periods(periods)?).await?;
            Ok(format!(
                "Combined store saved to `{}` ({} frames from {} stores)",
                summary.store.display(),
                summary.frames,
                summary.inputs
            ))
        }
        Commands::Run { periods, consumers } => {
            config.consumers = *consumers;
            command::run(&config, &expand_periods(periods)?).await
        }
        Commands::Inspect { store } => command::inspect(&config, store),
    }
}
