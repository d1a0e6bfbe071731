//! Streams the frames of one period in chronological order.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use chrono::{NaiveDate, NaiveDateTime};
use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info};

use super::{is_payload, naming, BoundingBox, Raster};
use crate::error::{Error, Result};

/// All frames of one day sub-archive, sorted by timestamp.
#[derive(Debug)]
pub struct DayBatch {
    pub archive: PathBuf,
    pub day: String,
    pub hours: Vec<String>,
    pub times: Vec<NaiveDateTime>,
    pub rasters: Vec<Raster>,
}

impl DayBatch {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn shape(&self) -> Option<(u64, u64)> {
        self.rasters.first().map(Raster::shape)
    }

    pub fn time_values(&self) -> Vec<i64> {
        self.times.iter().copied().map(naming::to_minutes).collect()
    }

    /// Rasters stacked along the time axis.
    pub fn data(&self) -> Vec<i32> {
        let cells = self.rasters.iter().map(|r| r.values.len()).sum();
        let mut data = Vec::with_capacity(cells);
        for raster in &self.rasters {
            data.extend_from_slice(&raster.values);
        }
        data
    }
}

/// The spatial reference every frame of a run must share, plus the last
/// timestamp seen.
#[derive(Debug, Default, Clone)]
pub struct GridReference {
    bounds: Option<BoundingBox>,
    shape: Option<(u64, u64)>,
    last: Option<NaiveDateTime>,
}

impl GridReference {
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    /// Records one frame; the first frame fixes the reference.
    pub fn observe(
        &mut self,
        archive: &Path,
        day: &str,
        hour: &str,
        time: NaiveDateTime,
        raster: &Raster,
    ) -> Result<()> {
        match self.bounds {
            Some(expected) if expected != raster.bounds => {
                return Err(Error::BoundingBoxMismatch {
                    archive: archive.to_path_buf(),
                    day: day.to_string(),
                    hour: hour.to_string(),
                    expected,
                    found: raster.bounds,
                })
            }
            _ => self.bounds = Some(raster.bounds),
        }

        match self.shape {
            Some(expected) if expected != raster.shape() => {
                return Err(Error::ShapeMismatch {
                    archive: archive.to_path_buf(),
                    day: day.to_string(),
                    hour: hour.to_string(),
                    expected,
                    found: raster.shape(),
                })
            }
            _ => self.shape = Some(raster.shape()),
        }

        if let Some(previous) = self.last.filter(|previous| time <= *previous) {
            return Err(Error::OutOfOrder {
                archive: archive.to_path_buf(),
                hour: hour.to_string(),
                previous: previous.to_string(),
            });
        }
        self.last = Some(time);

        Ok(())
    }
}

#[derive(Debug)]
struct DayEntry {
    name: String,
    date: NaiveDate,
    offset: u64,
    size: u64,
}

struct OpenArchive {
    path: PathBuf,
    file: File,
    days: std::vec::IntoIter<DayEntry>,
}

impl OpenArchive {
    /// Indexes the day sub-archives by seeking over their headers and sorts
    /// them by the day in their names.
    fn open(path: PathBuf) -> Result<Self> {
        let io_err = |e| Error::io(&path, e);

        let file = File::open(&path).map_err(io_err)?;
        let mut archive = Archive::new(file);
        let mut days = Vec::new();

        for entry in archive.entries_with_seek().map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if !is_payload(&entry) {
                continue;
            }
            let name = entry.path().map_err(io_err)?.to_string_lossy().to_string();
            days.push(DayEntry {
                date: naming::day_of(&name)?,
                name,
                offset: entry.raw_file_position(),
                size: entry.size(),
            });
        }
        days.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.name.cmp(&b.name)));

        info!(archive = %path.display(), days = days.len(), "Opened archive");

        Ok(OpenArchive {
            file: archive.into_inner(),
            path,
            days: days.into_iter(),
        })
    }

    fn read_day(&mut self, day: DayEntry, grid: &mut GridReference) -> Result<DayBatch> {
        let path = &self.path;
        let io_err = |e| Error::io(path, e);

        self.file
            .seek(SeekFrom::Start(day.offset))
            .map_err(io_err)?;
        let compressed = (&mut self.file).take(day.size);
        let mut day_archive = Archive::new(GzDecoder::new(compressed));

        let mut members = Vec::new();
        for entry in day_archive.entries().map_err(io_err)? {
            let mut entry = entry.map_err(io_err)?;
            if !is_payload(&entry) {
                continue;
            }
            let name = entry.path().map_err(io_err)?.to_string_lossy().to_string();
            let time = naming::timestamp_of(&name)?;
            let mut text = String::new();
            entry.read_to_string(&mut text).map_err(io_err)?;
            members.push((time, name, text));
        }
        members.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut batch = DayBatch {
            archive: self.path.clone(),
            day: day.name,
            hours: Vec::with_capacity(members.len()),
            times: Vec::with_capacity(members.len()),
            rasters: Vec::with_capacity(members.len()),
        };
        for (time, name, text) in members {
            debug!(%time, "Collecting frame");
            let raster = Raster::parse(&name, &text)?;
            grid.observe(&batch.archive, &batch.day, &name, time, &raster)?;
            batch.hours.push(name);
            batch.times.push(time);
            batch.rasters.push(raster);
        }

        Ok(batch)
    }
}

/// Lazy iterator over the day batches of a period.
///
/// Archives are visited in the given order, days and hours in the order of
/// the timestamps parsed from their names. The first error ends the
/// iteration.
pub struct FrameSource {
    archives: std::vec::IntoIter<PathBuf>,
    current: Option<OpenArchive>,
    grid: GridReference,
    done: bool,
}

impl FrameSource {
    pub fn new(archives: Vec<PathBuf>) -> Self {
        FrameSource {
            archives: archives.into_iter(),
            current: None,
            grid: GridReference::default(),
            done: false,
        }
    }

    pub fn grid(&self) -> &GridReference {
        &self.grid
    }

    fn advance(&mut self) -> Option<Result<DayBatch>> {
        loop {
            if let Some(archive) = self.current.as_mut() {
                if let Some(day) = archive.days.next() {
                    return Some(archive.read_day(day, &mut self.grid));
                }
                self.current = None;
            }

            let path = self.archives.next()?;
            match OpenArchive::open(path) {
                Ok(archive) => self.current = Some(archive),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl Iterator for FrameSource {
    type Item = Result<DayBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.advance();
        if !matches!(next, Some(Ok(_))) {
            self.done = true;
        }
        next
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;
    use crate::archive::{
        count::count_archive_frames,
        fixture::{ascii_grid, write_month, DayFixture},
    };

    #[test]
    fn should_yield_days_and_hours_in_timestamp_order() {
        let dir = TempDir::new().unwrap();
        let archive = write_month(
            dir.path(),
            "200601",
            &[
                DayFixture::hourly("20060102", &["0150", "0050"]),
                DayFixture::hourly("20060101", &["2350", "0050", "1250"]),
            ],
        );

        let batches: Vec<DayBatch> = FrameSource::new(vec![archive])
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].day, "RW-20060101.tar.gz");
        assert_eq!(
            batches[0].hours,
            vec![
                "RW_20060101-0050.asc",
                "RW_20060101-1250.asc",
                "RW_20060101-2350.asc"
            ]
        );
        assert_eq!(batches[1].hours[0], "RW_20060102-0050.asc");

        let times: Vec<i64> = batches.iter().flat_map(|b| b.time_values()).collect();
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn should_yield_as_many_frames_as_counted() {
        let dir = TempDir::new().unwrap();
        let archives = vec![
            write_month(
                dir.path(),
                "200601",
                &[
                    DayFixture::hourly("20060101", &["0050", "0150"]),
                    DayFixture::hourly("20060131", &["2350"]),
                ],
            ),
            write_month(
                dir.path(),
                "200602",
                &[DayFixture::hourly("20060201", &["0050", "0150", "0250"])],
            ),
        ];

        let counted: u64 = archives
            .iter()
            .map(|a| count_archive_frames(a).unwrap())
            .sum();
        let streamed: usize = FrameSource::new(archives)
            .map(|b| b.unwrap().len())
            .sum();

        assert_eq!(counted, 6);
        assert_eq!(streamed as u64, counted);
    }

    #[test]
    fn should_stack_rasters_of_a_day() {
        let dir = TempDir::new().unwrap();
        let archive = write_month(
            dir.path(),
            "200601",
            &[DayFixture::hourly("20060101", &["0050", "0150"])],
        );

        let batch = FrameSource::new(vec![archive]).next().unwrap().unwrap();

        assert_eq!(batch.shape(), Some((2, 3)));
        assert_eq!(batch.data().len(), 2 * 2 * 3);
        assert_eq!(
            batch.time_values(),
            vec![
                naming::to_minutes(batch.times[0]),
                naming::to_minutes(batch.times[1])
            ]
        );
    }

    #[test]
    fn should_fail_on_second_bounding_box() {
        let dir = TempDir::new().unwrap();
        let shifted = ascii_grid(2, 3, 100.0, 7);
        let archive = write_month(
            dir.path(),
            "200601",
            &[
                DayFixture::hourly("20060101", &["0050"]),
                DayFixture::new("20060102", vec![("0050", shifted)]),
            ],
        );

        let mut source = FrameSource::new(vec![archive]);

        assert!(source.next().unwrap().is_ok());
        let err = source.next().unwrap().unwrap_err();
        match err {
            Error::BoundingBoxMismatch { day, hour, .. } => {
                assert_eq!(day, "RW-20060102.tar.gz");
                assert_eq!(hour, "RW_20060102-0050.asc");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(source.next().is_none());
    }

    #[test]
    fn should_fail_on_second_raster_shape() {
        let dir = TempDir::new().unwrap();
        // Both grids cover 6 x 4 map units, at different resolutions.
        let coarse = ascii_grid(2, 3, 0.0, 0).replace("cellsize 1", "cellsize 2");
        let fine = ascii_grid(4, 6, 0.0, 0);
        let archive = write_month(
            dir.path(),
            "200601",
            &[
                DayFixture::new("20060101", vec![("0050", coarse)]),
                DayFixture::new("20060102", vec![("0050", fine)]),
            ],
        );

        let mut source = FrameSource::new(vec![archive]);

        assert!(source.next().unwrap().is_ok());
        let err = source.next().unwrap().unwrap_err();
        match err {
            Error::ShapeMismatch {
                day,
                hour,
                expected,
                found,
                ..
            } => {
                assert_eq!(day, "RW-20060102.tar.gz");
                assert_eq!(hour, "RW_20060102-0050.asc");
                assert_eq!(expected, (2, 3));
                assert_eq!(found, (4, 6));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(source.next().is_none());
    }

    #[test]
    fn should_fail_on_overlapping_archives() {
        let dir = TempDir::new().unwrap();
        let first = write_month(
            dir.path(),
            "200601",
            &[DayFixture::hourly("20060101", &["0050"])],
        );
        let copy = dir.path().join("copy");
        std::fs::create_dir_all(&copy).unwrap();
        let second = copy.join("RW-200601.tar");
        std::fs::copy(&first, &second).unwrap();

        let result: Result<Vec<DayBatch>> = FrameSource::new(vec![first, second]).collect();

        assert!(matches!(result, Err(Error::OutOfOrder { .. })));
    }

    #[test]
    fn should_fail_on_foreign_member() {
        let dir = TempDir::new().unwrap();
        let archive = write_month(
            dir.path(),
            "200601",
            &[DayFixture::new(
                "20060101",
                vec![("notes", ascii_grid(2, 3, 0.0, 1))],
            )],
        );

        let result: Result<Vec<DayBatch>> = FrameSource::new(vec![archive]).collect();

        assert!(matches!(result, Err(Error::MalformedName { .. })));
    }
}
