//! Error type shared by the acquisition and aggregation stages.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::archive::BoundingBox;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("i/o error on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("request to `{url}` failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cannot build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("`{url}` answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("incomplete transfer of `{url}`: expected {expected} bytes, received {received}")]
    Truncated {
        url: String,
        expected: u64,
        received: u64,
    },

    #[error("invalid url `{0}`")]
    Url(String),

    #[error("`{name}` does not follow the archive naming convention")]
    MalformedName { name: String },

    #[error("cannot decode raster `{member}`: {reason}")]
    Raster { member: String, reason: String },

    #[error(
        "non matching bounding boxes in `{}` ({day} / {hour}): expected {expected}, found {found}",
        archive.display()
    )]
    BoundingBoxMismatch {
        archive: PathBuf,
        day: String,
        hour: String,
        expected: BoundingBox,
        found: BoundingBox,
    },

    #[error(
        "non matching raster shape in `{}` ({day} / {hour}): expected {expected:?}, found {found:?}",
        archive.display()
    )]
    ShapeMismatch {
        archive: PathBuf,
        day: String,
        hour: String,
        expected: (u64, u64),
        found: (u64, u64),
    },

    #[error("frame `{hour}` in `{}` is not after the previous frame at {previous}", archive.display())]
    OutOfOrder {
        archive: PathBuf,
        hour: String,
        previous: String,
    },

    #[error("period `{0}` has no frames to collect")]
    EmptyPeriod(String),

    #[error("period `{period}` yielded {written} frames but {expected} were counted")]
    FrameCountMismatch {
        period: String,
        expected: u64,
        written: u64,
    },

    #[error("no stores to combine")]
    NoInputs,

    #[error(
        "store `{}` has spatial dimensions {found:?}, expected {expected:?}",
        store.display()
    )]
    DimensionMismatch {
        store: PathBuf,
        expected: (u64, u64),
        found: (u64, u64),
    },

    #[error("store `{}` covers {found}, expected {expected}", store.display())]
    StoreBoundsMismatch {
        store: PathBuf,
        expected: BoundingBox,
        found: BoundingBox,
    },

    #[error("write [{start}, {end}) rejected: {reason}")]
    OffsetViolation { start: u64, end: u64, reason: String },

    #[error("store `{}` is incomplete: {written} of {frames} frames written", path.display())]
    Incomplete {
        path: PathBuf,
        frames: u64,
        written: u64,
    },

    #[error("store error: {0}")]
    Store(String),

    #[error("frame catalogue error: {0}")]
    Catalog(String),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn store(e: impl std::fmt::Display) -> Self {
        Self::Store(e.to_string())
    }

    pub fn raster(member: &str, reason: impl Into<String>) -> Self {
        Self::Raster {
            member: member.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<arrow::error::ArrowError> for Error {
    fn from(e: arrow::error::ArrowError) -> Self {
        Self::Catalog(e.to_string())
    }
}

impl From<parquet::errors::ParquetError> for Error {
    fn from(e: parquet::errors::ParquetError) -> Self {
        Self::Catalog(e.to_string())
    }
}
