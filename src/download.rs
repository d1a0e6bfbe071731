//! Discovers the period archives on the remote index and downloads them with
//! a pool of concurrent workers.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
    time::Duration,
};

use async_trait::async_trait;
use futures::{future::join_all, StreamExt};
use indicatif::ProgressBar;
use regex::Regex;
use reqwest::{Client, Url};
use tokio::{
    fs,
    io::AsyncWriteExt,
    sync::{mpsc, watch, Mutex},
};
use tracing::{debug, info, warn};

use crate::{
    cli::create_progress_bar,
    error::{Error, Result},
};

pub const DEFAULT_BASE_URL: &str =
    "https://opendata.dwd.de/climate_environment/CDC/grids_germany/hourly/radolan/historical/asc/";

pub const DEFAULT_CONSUMERS: usize = 20;

/// What to do with archives that are already complete on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExistingFiles {
    #[default]
    Skip,
    Overwrite,
}

#[derive(Debug, Clone, Copy)]
pub struct DownloadOptions {
    pub consumers: usize,
    pub existing: ExistingFiles,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        DownloadOptions {
            consumers: DEFAULT_CONSUMERS,
            existing: ExistingFiles::default(),
        }
    }
}

/// One file to fetch.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: Url,
    pub destination: PathBuf,
}

#[derive(Debug)]
pub struct DownloadFailure {
    /// The archive or listing URL, or the worker for a worker that died.
    pub url: String,
    /// `None` when the period listing itself could not be fetched.
    pub destination: Option<PathBuf>,
    pub error: Error,
}

/// Outcome of a download run, available once every worker has drained.
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub discovered: u64,
    pub downloaded: u64,
    pub skipped: u64,
    pub abandoned: u64,
    pub failures: Vec<DownloadFailure>,
}

impl DownloadReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.abandoned == 0
    }
}

impl fmt::Display for DownloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} archives listed: {} downloaded, {} already present, {} abandoned, {} failed",
            self.discovered,
            self.downloaded,
            self.skipped,
            self.abandoned,
            self.failures.len()
        )?;
        for failure in &self.failures {
            match (&failure.destination, &failure.error) {
                (Some(destination), _) => write!(
                    f,
                    "\n  missing `{}` ({}): {}",
                    destination.display(),
                    failure.url,
                    failure.error
                )?,
                (None, Error::Join(_)) => write!(f, "\n  {}: {}", failure.url, failure.error)?,
                (None, _) => write!(f, "\n  no listing for {}: {}", failure.url, failure.error)?,
            }
        }
        Ok(())
    }
}

/// Transport for listings and payloads.
#[async_trait]
pub trait Remote: Send + Sync {
    /// The listing document of a period directory.
    async fn listing(&self, url: &Url) -> Result<String>;

    /// Streams `url` into `destination`, returning the number of bytes written.
    async fn fetch(&self, url: &Url, destination: &Path) -> Result<u64>;
}

pub struct HttpRemote {
    client: Client,
}

impl HttpRemote {
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(Error::Client)?;

        Ok(HttpRemote { client })
    }
}

#[async_trait]
impl Remote for HttpRemote {
    async fn listing(&self, url: &Url) -> Result<String> {
        let http_err = |source| Error::Http {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url.clone()).send().await.map_err(http_err)?;
        if !response.status().is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(http_err)
    }

    async fn fetch(&self, url: &Url, destination: &Path) -> Result<u64> {
        let http_err = |source| Error::Http {
            url: url.to_string(),
            source,
        };
        let io_err = |e| Error::io(destination, e);

        let response = self.client.get(url.clone()).send().await.map_err(http_err)?;
        if !response.status().is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let expected = response.content_length();
        let mut file = fs::File::create(destination).await.map_err(io_err)?;
        let mut received = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(http_err)?;
            file.write_all(&chunk).await.map_err(io_err)?;
            received += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;

        match expected {
            Some(expected) if expected != received => Err(Error::Truncated {
                url: url.to_string(),
                expected,
                received,
            }),
            _ => Ok(received),
        }
    }
}

/// Archive names linked from a listing document, in document order and
/// without repeats.
pub fn extract_filenames(listing: &str) -> Vec<String> {
    static LINK: OnceLock<Regex> = OnceLock::new();
    let link =
        LINK.get_or_init(|| Regex::new(r#">([^<>"]+\.tar)<"#).expect("valid archive link pattern"));

    let mut names: Vec<String> = Vec::new();
    for capture in link.captures_iter(listing) {
        let name = capture[1].trim().to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Makes sure relative joins land below `base` rather than next to it.
pub fn directory_url(base: &str) -> Result<Url> {
    let mut base = base.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base).map_err(|_| Error::Url(base))
}

/// Downloads every archive listed for `periods` into `destination/<period>/`.
///
/// Listings are fetched one period after the other and each archive is
/// queued as soon as it is found, so transfers overlap with the discovery of
/// later periods. Once `shutdown` turns true no new transfer is started and
/// whatever is still queued is reported as abandoned.
pub async fn download_periods<R>(
    remote: Arc<R>,
    base: &Url,
    periods: &[String],
    destination: &Path,
    options: DownloadOptions,
    shutdown: watch::Receiver<bool>,
) -> Result<DownloadReport>
where
    R: Remote + 'static,
{
    let consumers = options.consumers.max(1);
    let (sender, receiver) = mpsc::channel::<DownloadTask>(2 * consumers);
    let queue = Arc::new(Mutex::new(receiver));
    let progress = create_progress_bar(0, "Downloading archives".to_string());

    let workers: Vec<_> = (0..consumers)
        .map(|id| {
            tokio::spawn(worker(
                id,
                remote.clone(),
                queue.clone(),
                options.existing,
                shutdown.clone(),
                progress.clone(),
            ))
        })
        .collect();
    drop(queue);

    let mut report = DownloadReport::default();
    let mut producer_shutdown = shutdown;

    'periods: for period in periods {
        if *producer_shutdown.borrow() {
            break;
        }

        let listing_url = match base.join(&format!("{period}/")) {
            Ok(url) => url,
            Err(_) => {
                let url = format!("{base}{period}/");
                warn!(url = %url, "Invalid period URL");
                report.failures.push(DownloadFailure {
                    url: url.clone(),
                    destination: None,
                    error: Error::Url(url),
                });
                continue;
            }
        };
        let listing = match remote.listing(&listing_url).await {
            Ok(listing) => listing,
            Err(error) => {
                warn!(url = %listing_url, %error, "Listing failed");
                report.failures.push(DownloadFailure {
                    url: listing_url.to_string(),
                    destination: None,
                    error,
                });
                continue;
            }
        };

        let names = extract_filenames(&listing);
        info!(period = %period, archives = names.len(), "Listed period");

        for name in names {
            let target = destination.join(period).join(&name);
            let url = match listing_url.join(&name) {
                Ok(url) => url,
                Err(_) => {
                    let url = format!("{listing_url}{name}");
                    warn!(url = %url, "Invalid archive URL");
                    report.failures.push(DownloadFailure {
                        url: url.clone(),
                        destination: Some(target),
                        error: Error::Url(url),
                    });
                    continue;
                }
            };
            let task = DownloadTask {
                url,
                destination: target,
            };

            let sent = tokio::select! {
                biased;
                _ = shutdown_requested(&mut producer_shutdown) => false,
                sent = sender.send(task) => sent.is_ok(),
            };
            if !sent {
                break 'periods;
            }
            report.discovered += 1;
            progress.inc_length(1);
        }
    }
    drop(sender);

    // Tasks taken by a worker that died are counted as abandoned.
    let mut processed = 0;
    for (id, result) in join_all(workers).await.into_iter().enumerate() {
        let worker = match result {
            Ok(worker) => worker,
            Err(error) => {
                warn!(worker = id, %error, "Worker died");
                report.failures.push(DownloadFailure {
                    url: format!("worker {id}"),
                    destination: None,
                    error: Error::Join(error),
                });
                continue;
            }
        };
        processed += worker.downloaded + worker.skipped + worker.failures.len() as u64;
        report.downloaded += worker.downloaded;
        report.skipped += worker.skipped;
        report.failures.extend(worker.failures);
    }
    report.abandoned = report.discovered.saturating_sub(processed);

    progress.finish_with_message("Downloads finished");
    info!(
        downloaded = report.downloaded,
        skipped = report.skipped,
        abandoned = report.abandoned,
        failed = report.failures.len(),
        "Download run complete"
    );

    Ok(report)
}

#[derive(Debug, Default)]
struct WorkerReport {
    downloaded: u64,
    skipped: u64,
    failures: Vec<DownloadFailure>,
}

async fn worker<R: Remote>(
    id: usize,
    remote: Arc<R>,
    queue: Arc<Mutex<mpsc::Receiver<DownloadTask>>>,
    existing: ExistingFiles,
    mut shutdown: watch::Receiver<bool>,
    progress: ProgressBar,
) -> WorkerReport {
    let mut report = WorkerReport::default();

    loop {
        let task = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => None,
            task = async { queue.lock().await.recv().await } => task,
        };
        let Some(task) = task else {
            break;
        };

        if existing == ExistingFiles::Skip && task.destination.is_file() {
            debug!(worker = id, file = %task.destination.display(), "Already present");
            report.skipped += 1;
        } else {
            match transfer(remote.as_ref(), &task).await {
                Ok(bytes) => {
                    debug!(worker = id, url = %task.url, bytes, "Downloaded");
                    report.downloaded += 1;
                }
                Err(error) => {
                    warn!(worker = id, url = %task.url, %error, "Download failed");
                    report.failures.push(DownloadFailure {
                        url: task.url.to_string(),
                        destination: Some(task.destination),
                        error,
                    });
                }
            }
        }
        progress.inc(1);
    }

    debug!(worker = id, "Worker stopped");
    report
}

/// Fetches into `<destination>.partial` and renames once the body is complete.
async fn transfer<R: Remote + ?Sized>(remote: &R, task: &DownloadTask) -> Result<u64> {
    if let Some(parent) = task.destination.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(parent, e))?;
    }

    let mut partial = task.destination.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let bytes = remote.fetch(&task.url, &partial).await?;
    fs::rename(&partial, &task.destination)
        .await
        .map_err(|e| Error::io(&partial, e))?;

    Ok(bytes)
}

/// Resolves once shutdown was requested; never resolves if the signal is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let requested = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}

// -- Tests -------------------------------------------------------------------
