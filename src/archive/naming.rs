//! File name conventions of the RADOLAN RW archives.
//!
//! ```text
//! RW-200601.tar                 period (month) archive
//! └── RW-20060101.tar.gz        day sub-archive
//!     └── RW_20060101-0050.asc  hourly raster
//! ```

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};

pub const PREFIX: &str = "RW";

/// CF-style unit of the `time` coordinate.
pub const TIME_UNITS: &str = "minutes since 1970-01-01 00:00:00";

/// Strips any directory components an archive member may carry.
pub fn file_name(member: &str) -> &str {
    member.rsplit('/').next().unwrap_or(member)
}

/// First day of the month encoded in a period archive name, e.g. `RW-200601.tar`.
pub fn archive_month(name: &str) -> Option<NaiveDate> {
    let stem = file_name(name).strip_suffix(".tar")?;
    NaiveDate::parse_from_str(&format!("{stem}01"), &format!("{PREFIX}-%Y%m%d")).ok()
}

/// Day encoded in a day sub-archive name, e.g. `RW-20060101.tar.gz`.
pub fn day_of(name: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(file_name(name), &format!("{PREFIX}-%Y%m%d.tar.gz")).map_err(|_| {
        Error::MalformedName {
            name: name.to_string(),
        }
    })
}

/// Timestamp encoded in an hourly raster name, e.g. `RW_20060101-0050.asc`.
pub fn timestamp_of(name: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(file_name(name), &format!("{PREFIX}_%Y%m%d-%H%M.asc")).map_err(
        |_| Error::MalformedName {
            name: name.to_string(),
        },
    )
}

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Encodes a timestamp as whole minutes since the epoch of [`TIME_UNITS`].
pub fn to_minutes(time: NaiveDateTime) -> i64 {
    (time - epoch()).num_minutes()
}

pub fn from_minutes(minutes: i64) -> Option<NaiveDateTime> {
    epoch().checked_add_signed(chrono::Duration::try_minutes(minutes)?)
}

// -- Tests -------------------------------------------------------------------
