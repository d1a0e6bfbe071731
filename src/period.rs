//! Locates the downloaded archives of one period.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    archive::naming,
    error::{Error, Result},
};

/// A period identifier (typically a year) with its archives in month order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub id: String,
    pub archives: Vec<PathBuf>,
}

impl Period {
    /// Collects every `*.tar` below `dir`, ignoring compressed day archives
    /// and unfinished downloads.
    pub fn discover(id: &str, dir: &Path) -> Result<Self> {
        let mut archives = Vec::new();
        if dir.is_dir() {
            walk(dir, &mut archives)?;
        }
        archives.sort_by(|a, b| {
            let month = |p: &PathBuf| naming::archive_month(&p.to_string_lossy());
            month(a).cmp(&month(b)).then_with(|| a.cmp(b))
        });

        debug!(period = id, archives = archives.len(), "Discovered archives");

        Ok(Period {
            id: id.to_string(),
            archives,
        })
    }
}

fn walk(dir: &Path, archives: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if path.is_dir() {
            walk(&path, archives)?;
        } else if path.extension().is_some_and(|ext| ext == "tar") {
            archives.push(path);
        }
    }
    Ok(())
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn should_discover_archives_in_month_order() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        for name in ["RW-200612.tar", "RW-200601.tar.partial", "readme.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::write(nested.join("RW-200602.tar"), b"").unwrap();
        fs::write(nested.join("RW-20060201.tar.gz"), b"").unwrap();

        let period = Period::discover("2006", dir.path()).unwrap();

        let names: Vec<String> = period
            .archives
            .iter()
            .map(|p| naming::file_name(&p.to_string_lossy()).to_string())
            .collect();
        assert_eq!(names, vec!["RW-200602.tar", "RW-200612.tar"]);
    }

    #[test]
    fn should_find_nothing_in_missing_directory() {
        let dir = TempDir::new().unwrap();
        let period = Period::discover("2006", &dir.path().join("2006")).unwrap();
        assert!(period.archives.is_empty());
    }
}
