//! Locations and tuning knobs shared by every stage.

use std::{path::PathBuf, time::Duration};

use reqwest::Url;

use crate::{combine::DEFAULT_CHUNK_FRAMES, download::DEFAULT_CONSUMERS, store::ChunkShape};

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub base_url: Url,
    pub consumers: usize,
    pub connect_timeout: Duration,
    pub chunks: ChunkShape,
    pub chunk_frames: u64,
}

impl Config {
    pub fn new(data_dir: PathBuf, base_url: Url) -> Self {
        Config {
            data_dir,
            base_url,
            consumers: DEFAULT_CONSUMERS,
            connect_timeout: Duration::from_secs(30),
            chunks: ChunkShape::default(),
            chunk_frames: DEFAULT_CHUNK_FRAMES,
        }
    }

    /// Downloads land in `<raw>/<period>/`.
    pub fn raw_root(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn raw_dir(&self, period: &str) -> PathBuf {
        self.raw_root().join(period)
    }

    pub fn stores_dir(&self) -> PathBuf {
        self.data_dir.join("stores")
    }

    pub fn store_path(&self, period: &str) -> PathBuf {
        self.stores_dir().join(format!("{period}.zarr"))
    }

    pub fn combined_path(&self) -> PathBuf {
        self.stores_dir().join("combined.zarr")
    }
}

/// `~/radolan`, or `./radolan` when there is no home directory.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join("radolan")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_lay_out_data_directory() {
        let config = Config::new(
            PathBuf::from("/data"),
            Url::parse("https://example.org/asc/").unwrap(),
        );

        assert_eq!(config.raw_dir("2006"), PathBuf::from("/data/raw/2006"));
        assert_eq!(
            config.store_path("2006"),
            PathBuf::from("/data/stores/2006.zarr")
        );
        assert_eq!(
            config.combined_path(),
            PathBuf::from("/data/stores/combined.zarr")
        );
    }
}
