//! Decoding of the hourly ESRI ASCII grids.

use std::fmt;

use crate::{
    error::{Error, Result},
    store::FILL_VALUE,
};

/// Spatial extent of a raster in its native projected coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl BoundingBox {
    pub fn to_vec(self) -> Vec<f64> {
        vec![self.left, self.bottom, self.right, self.top]
    }

    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [left, bottom, right, top] => Some(BoundingBox {
                left: *left,
                bottom: *bottom,
                right: *right,
                top: *top,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.left, self.bottom, self.right, self.top
        )
    }
}

/// One decoded grid, row-major with the northernmost row first.
#[derive(Debug, Clone)]
pub struct Raster {
    pub nrows: u64,
    pub ncols: u64,
    pub bounds: BoundingBox,
    pub values: Vec<i32>,
}

#[derive(Debug, Default)]
struct Header {
    ncols: Option<u64>,
    nrows: Option<u64>,
    x: Option<(f64, bool)>,
    y: Option<(f64, bool)>,
    cellsize: Option<f64>,
    nodata: Option<i32>,
}

impl Raster {
    pub fn shape(&self) -> (u64, u64) {
        (self.nrows, self.ncols)
    }

    /// Parses an ESRI ASCII grid. Cells equal to `NODATA_value` are stored as
    /// [`FILL_VALUE`].
    pub fn parse(member: &str, text: &str) -> Result<Self> {
        let mut header = Header::default();
        let mut lines = text.lines().peekable();

        while let Some(&line) = lines.peek() {
            let mut parts = line.split_whitespace();
            let Some(key) = parts.next() else {
                lines.next();
                continue;
            };
            if key.parse::<f64>().is_ok() {
                break;
            }
            let value = parts
                .next()
                .ok_or_else(|| Error::raster(member, format!("header `{key}` has no value")))?;
            header.set(member, key, value)?;
            lines.next();
        }

        let ncols = header.ncols.ok_or_else(|| Error::raster(member, "missing ncols"))?;
        let nrows = header.nrows.ok_or_else(|| Error::raster(member, "missing nrows"))?;
        let cellsize = header
            .cellsize
            .ok_or_else(|| Error::raster(member, "missing cellsize"))?;
        let (x, x_center) = header
            .x
            .ok_or_else(|| Error::raster(member, "missing xllcorner"))?;
        let (y, y_center) = header
            .y
            .ok_or_else(|| Error::raster(member, "missing yllcorner"))?;

        let left = if x_center { x - cellsize / 2.0 } else { x };
        let bottom = if y_center { y - cellsize / 2.0 } else { y };
        let bounds = BoundingBox {
            left,
            bottom,
            right: left + ncols as f64 * cellsize,
            top: bottom + nrows as f64 * cellsize,
        };

        let expected = nrows
            .checked_mul(ncols)
            .and_then(|cells| usize::try_from(cells).ok())
            .ok_or_else(|| {
                Error::raster(member, format!("grid of {nrows}x{ncols} cells is too large"))
            })?;
        let mut values = Vec::new();
        for line in lines {
            for token in line.split_whitespace() {
                let value = parse_cell(token)
                    .ok_or_else(|| Error::raster(member, format!("invalid cell `{token}`")))?;
                values.push(match header.nodata {
                    Some(nodata) if value == nodata => FILL_VALUE,
                    _ => value,
                });
            }
        }

        if values.len() != expected {
            return Err(Error::raster(
                member,
                format!("expected {expected} cells, found {}", values.len()),
            ));
        }

        Ok(Raster {
            nrows,
            ncols,
            bounds,
            values,
        })
    }
}

impl Header {
    fn set(&mut self, member: &str, key: &str, value: &str) -> Result<()> {
        let number = || {
            value
                .parse::<f64>()
                .map_err(|_| Error::raster(member, format!("header `{key}` is not a number")))
        };

        let dimension = || match value.parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(Error::raster(
                member,
                format!("header `{key}` is not a positive integer"),
            )),
        };

        match key.to_ascii_lowercase().as_str() {
            "ncols" => self.ncols = Some(dimension()?),
            "nrows" => self.nrows = Some(dimension()?),
            "xllcorner" => self.x = Some((number()?, false)),
            "xllcenter" => self.x = Some((number()?, true)),
            "yllcorner" => self.y = Some((number()?, false)),
            "yllcenter" => self.y = Some((number()?, true)),
            "cellsize" => self.cellsize = Some(number()?),
            "nodata_value" => self.nodata = parse_cell(value),
            _ => return Err(Error::raster(member, format!("unknown header `{key}`"))),
        }

        Ok(())
    }
}

// Integral cells may be written with a trailing `.0`.
fn parse_cell(token: &str) -> Option<i32> {
    token.parse::<i32>().ok().or_else(|| {
        token
            .parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0 && v.abs() <= i32::MAX as f64)
            .map(|v| v as i32)
    })
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const GRID: &str = "ncols 3
nrows 2
xllcorner -523.5
yllcorner -4658.5
cellsize 1
NODATA_value -1
0 5 -1
12 -1 3
";

    #[test]
    fn should_parse_grid() {
        let raster = Raster::parse("RW_20060101-0050.asc", GRID).unwrap();

        assert_eq!(raster.shape(), (2, 3));
        assert_eq!(raster.values, vec![0, 5, FILL_VALUE, 12, FILL_VALUE, 3]);
        assert_eq!(
            raster.bounds,
            BoundingBox {
                left: -523.5,
                bottom: -4658.5,
                right: -520.5,
                top: -4656.5,
            }
        );
    }

    #[test]
    fn should_shift_center_registered_grid() {
        let grid = GRID
            .replace("xllcorner -523.5", "xllcenter -523.0")
            .replace("yllcorner -4658.5", "YLLCENTER -4658.0");
        let raster = Raster::parse("member", &grid).unwrap();

        assert_eq!(raster.bounds.left, -523.5);
        assert_eq!(raster.bounds.bottom, -4658.5);
    }

    #[test]
    fn should_reject_short_grid() {
        let grid = GRID.replace("12 -1 3\n", "");
        let err = Raster::parse("member", &grid).unwrap_err();

        assert!(err.to_string().contains("expected 6 cells, found 3"));
    }

    #[test]
    fn should_reject_invalid_cell() {
        let grid = GRID.replace("12", "x");
        assert!(matches!(
            Raster::parse("member", &grid),
            Err(Error::Raster { .. })
        ));
    }

    #[test]
    fn should_reject_oversized_grid() {
        let grid = GRID
            .replace("ncols 3", "ncols 4294967296")
            .replace("nrows 2", "nrows 4294967296");
        let err = Raster::parse("RW_20060101-0050.asc", &grid).unwrap_err();

        assert!(matches!(err, Error::Raster { ref member, .. } if member == "RW_20060101-0050.asc"));
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn should_reject_non_integral_dimensions() {
        for ncols in ["ncols -3", "ncols 2.7", "ncols 0"] {
            let grid = GRID.replace("ncols 3", ncols);
            let err = Raster::parse("member", &grid).unwrap_err();
            assert!(err.to_string().contains("not a positive integer"), "{ncols}");
        }
    }

    #[test]
    fn should_reject_large_grid_without_cells() {
        let grid = GRID
            .replace("ncols 3", "ncols 1000000")
            .replace("nrows 2", "nrows 1000000");
        let err = Raster::parse("member", &grid).unwrap_err();

        assert!(err.to_string().contains("expected 1000000000000 cells, found 6"));
    }

    #[test]
    fn should_format_bounding_box() {
        let bounds = BoundingBox::from_slice(&[1.0, 2.0, 3.5, 4.0]).unwrap();
        assert_eq!(bounds.to_string(), "[1, 2, 3.5, 4]");
        assert!(BoundingBox::from_slice(&[1.0]).is_none());
    }
}
