//! Counts the frames of a period ahead of time, without decoding rasters.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;
use futures::future::join_all;
use tar::Archive;
use tracing::debug;

use super::is_payload;
use crate::error::{Error, Result};

/// Total number of hourly frames in `archives`.
///
/// Every archive is counted on its own blocking task with its own file
/// handle; the partial counts are summed.
pub async fn count_frames(archives: &[PathBuf]) -> Result<u64> {
    let tasks: Vec<_> = archives
        .iter()
        .map(|archive| {
            let archive = archive.clone();
            tokio::task::spawn_blocking(move || count_archive_frames(&archive))
        })
        .collect();

    let mut total = 0;
    for result in join_all(tasks).await {
        total += result??;
    }

    Ok(total)
}

/// Number of hourly frames in one period archive.
pub fn count_archive_frames(path: &Path) -> Result<u64> {
    let io_err = |e| Error::io(path, e);

    let file = File::open(path).map_err(io_err)?;
    let mut archive = Archive::new(file);
    let mut frames = 0;

    for day in archive.entries().map_err(io_err)? {
        let day = day.map_err(io_err)?;
        if !is_payload(&day) {
            continue;
        }

        let mut day_archive = Archive::new(GzDecoder::new(day));
        for member in day_archive.entries().map_err(io_err)? {
            if is_payload(&member.map_err(io_err)?) {
                frames += 1;
            }
        }
    }

    debug!(archive = %path.display(), frames, "Counted frames");

    Ok(frames)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;
    use crate::archive::fixture::{write_month, DayFixture};

    #[tokio::test]
    async fn should_count_frames_across_archives() {
        let dir = TempDir::new().unwrap();
        let january = write_month(
            dir.path(),
            "200601",
            &[
                DayFixture::hourly("20060101", &["0050", "0150", "0250"]),
                DayFixture::hourly("20060102", &["0050"]),
            ],
        );
        let february = write_month(
            dir.path(),
            "200602",
            &[DayFixture::hourly("20060201", &["0050", "0150"])],
        );

        assert_eq!(count_archive_frames(&january).unwrap(), 4);
        assert_eq!(count_frames(&[january, february]).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn should_count_nothing_for_no_archives() {
        assert_eq!(count_frames(&[]).await.unwrap(), 0);
    }

    #[test]
    fn should_fail_on_missing_archive() {
        let err = count_archive_frames(Path::new("/does/not/exist.tar")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
