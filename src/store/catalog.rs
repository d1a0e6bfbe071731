//! Save and load the frame catalogue, a parquet table recording which
//! archive member every time index of a store was read from.

use std::{fs::File, path::Path, sync::Arc};

use arrow::{
    array::{ArrayRef, AsArray, Int64Builder, StringBuilder, UInt64Builder},
    datatypes::{DataType, Field, Int64Type, Schema},
    record_batch::RecordBatch,
};
use chrono::NaiveDateTime;
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::Compression,
    file::properties::WriterProperties,
};

use crate::{
    archive::{naming, DayBatch},
    error::{Error, Result},
};

pub const CATALOG_FILE: &str = "frames.parquet";

const CHUNK_SIZE: usize = 100000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub time: NaiveDateTime,
    pub archive: String,
    pub day: String,
    pub hour: String,
}

/// Frame provenance in time index order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameCatalog {
    records: Vec<FrameRecord>,
}

impl FrameCatalog {
    pub fn push_batch(&mut self, batch: &DayBatch) {
        let archive = batch
            .archive
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        for (time, hour) in batch.times.iter().zip(&batch.hours) {
            self.push(FrameRecord {
                time: *time,
                archive: archive.clone(),
                day: batch.day.clone(),
                hour: hour.clone(),
            });
        }
    }

    pub fn push(&mut self, record: FrameRecord) {
        self.records.push(record);
    }

    /// Appends `other`, whose records continue the time index of `self`.
    pub fn extend(&mut self, other: FrameCatalog) {
        self.records.extend(other.records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let schema = schema();
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .set_dictionary_enabled(true)
            .build();
        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

        for (n, chunk) in self.records.chunks(CHUNK_SIZE).enumerate() {
            let offset = (n * CHUNK_SIZE) as u64;
            let mut index = UInt64Builder::with_capacity(chunk.len());
            let mut time = Int64Builder::with_capacity(chunk.len());
            let mut timestamp = StringBuilder::with_capacity(chunk.len(), chunk.len() * 19);
            let mut archive = StringBuilder::with_capacity(chunk.len(), chunk.len() * 13);
            let mut day = StringBuilder::with_capacity(chunk.len(), chunk.len() * 18);
            let mut hour = StringBuilder::with_capacity(chunk.len(), chunk.len() * 21);

            for (i, record) in chunk.iter().enumerate() {
                index.append_value(offset + i as u64);
                time.append_value(naming::to_minutes(record.time));
                timestamp.append_value(record.time.format("%Y-%m-%d %H:%M:%S").to_string());
                archive.append_value(&record.archive);
                day.append_value(&record.day);
                hour.append_value(&record.hour);
            }

            let columns: Vec<ArrayRef> = vec![
                Arc::new(index.finish()),
                Arc::new(time.finish()),
                Arc::new(timestamp.finish()),
                Arc::new(archive.finish()),
                Arc::new(day.finish()),
                Arc::new(hour.finish()),
            ];
            writer.write(&RecordBatch::try_new(schema.clone(), columns)?)?;
        }

        writer.close()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut records = Vec::new();
        for batch in reader {
            let batch = batch?;
            let time = batch.column(1).as_primitive::<Int64Type>();
            let archive = batch.column(3).as_string::<i32>();
            let day = batch.column(4).as_string::<i32>();
            let hour = batch.column(5).as_string::<i32>();

            for row in 0..batch.num_rows() {
                let minutes = time.value(row);
                let time = naming::from_minutes(minutes).ok_or_else(|| {
                    Error::Catalog(format!("time value {minutes} is out of range"))
                })?;
                records.push(FrameRecord {
                    time,
                    archive: archive.value(row).to_string(),
                    day: day.value(row).to_string(),
                    hour: hour.value(row).to_string(),
                });
            }
        }

        Ok(FrameCatalog { records })
    }
}

fn schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("index", DataType::UInt64, false),
        Field::new("time", DataType::Int64, false),
        Field::new("timestamp", DataType::Utf8, false),
        Field::new("archive", DataType::Utf8, false),
        Field::new("day_member", DataType::Utf8, false),
        Field::new("hour_member", DataType::Utf8, false),
    ]))
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use arrow::array::{Array, UInt64Array};
    use tempfile::TempDir;

    use super::*;
    use crate::archive::{
        fixture::{write_month, DayFixture},
        FrameSource,
    };

    #[test]
    fn should_record_every_frame_of_a_batch() {
        let dir = TempDir::new().unwrap();
        let archive = write_month(
            dir.path(),
            "200601",
            &[DayFixture::hourly("20060101", &["0050", "0150"])],
        );
        let batch = FrameSource::new(vec![archive]).next().unwrap().unwrap();

        let mut catalog = FrameCatalog::default();
        catalog.push_batch(&batch);

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.records()[0].archive, "RW-200601.tar");
        assert_eq!(catalog.records()[1].day, "RW-20060101.tar.gz");
        assert_eq!(catalog.records()[1].hour, "RW_20060101-0150.asc");
    }

    #[test]
    fn should_save_and_load() {
        let dir = TempDir::new().unwrap();
        let archive = write_month(
            dir.path(),
            "200601",
            &[
                DayFixture::hourly("20060101", &["0050", "0150"]),
                DayFixture::hourly("20060102", &["0050"]),
            ],
        );
        let mut catalog = FrameCatalog::default();
        for batch in FrameSource::new(vec![archive]) {
            catalog.push_batch(&batch.unwrap());
        }
        let path = dir.path().join(CATALOG_FILE);

        catalog.save(&path).unwrap();
        let loaded = FrameCatalog::load(&path).unwrap();

        assert_eq!(loaded, catalog);

        let file = File::open(&path).unwrap();
        let batch = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        let index = batch
            .column(0)
            .as_any()
            .downcast_ref::<UInt64Array>()
            .unwrap();
        assert_eq!(index.values().to_vec(), vec![0, 1, 2]);
    }
}
