//! Builders for small nested RW archives used by the tests.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use flate2::{write::GzEncoder, Compression};
use tar::{Builder, Header};

pub struct DayFixture {
    day: String,
    hours: Vec<(String, String)>,
}

impl DayFixture {
    /// A day whose rasters all share the default grid.
    pub fn hourly(day: &str, hours: &[&str]) -> Self {
        let hours = hours
            .iter()
            .enumerate()
            .map(|(i, hour)| (hour.to_string(), ascii_grid(2, 3, 0.0, i as i32)))
            .collect();

        DayFixture {
            day: day.to_string(),
            hours,
        }
    }

    pub fn new(day: &str, hours: Vec<(&str, String)>) -> Self {
        DayFixture {
            day: day.to_string(),
            hours: hours
                .into_iter()
                .map(|(hour, grid)| (hour.to_string(), grid))
                .collect(),
        }
    }
}

/// An ESRI ASCII grid with cell values `seed, seed + 1, ...`.
pub fn ascii_grid(nrows: usize, ncols: usize, xllcorner: f64, seed: i32) -> String {
    let mut text = format!(
        "ncols {ncols}\nnrows {nrows}\nxllcorner {xllcorner}\nyllcorner -4658.5\ncellsize 1\nNODATA_value -1\n"
    );
    for row in 0..nrows {
        let cells: Vec<String> = (0..ncols)
            .map(|col| (seed + (row * ncols + col) as i32).to_string())
            .collect();
        text.push_str(&cells.join(" "));
        text.push('\n');
    }
    text
}

/// Writes `RW-<month>.tar` into `dir`, one gzip'ed day archive per fixture.
pub fn write_month(dir: &Path, month: &str, days: &[DayFixture]) -> PathBuf {
    let path = dir.join(format!("RW-{month}.tar"));
    let mut outer = Builder::new(File::create(&path).unwrap());

    for day in days {
        let mut inner = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (hour, grid) in &day.hours {
            let name = format!("RW_{}-{}.asc", day.day, hour);
            append(&mut inner, &name, grid.as_bytes());
        }
        let compressed = inner.into_inner().unwrap().finish().unwrap();
        append(&mut outer, &format!("RW-{}.tar.gz", day.day), &compressed);
    }

    outer.finish().unwrap();
    path
}

fn append<W: std::io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    builder.append_data(&mut header, name, data).unwrap();
}
