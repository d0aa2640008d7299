//! Arrow IPC output sink.
//!
//! One Arrow IPC file per `(instrument, as_of)`, laid out as
//! `root/instrument=X/date=YYYY-MM-DD/hour=HH/<as_of_millis>.arrow`. Each file
//! holds a single row; every configured window is its own nullable
//! `sma_<w>` column, so an undefined SMA is a null, never a zero.
//!
//! Files are written next to their final path and renamed into place, so a
//! reader sees either the previous record or the new one.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{ArrayRef, Decimal128Array, RecordBatch, StringArray, TimestampMillisecondArray};
use arrow_ipc::reader::FileReader;
use arrow_ipc::writer::FileWriter;
use arrow_schema::{ArrowError, DataType, Field, Schema, TimeUnit};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::application::ports::{OutputSinkPort, PartitionGranularity, SinkError};
use crate::domain::aggregation::AggregateRecord;
use crate::domain::shared::InstrumentId;

const DECIMAL_PRECISION: u8 = 38;
const DECIMAL_SCALE: i8 = 10;

impl From<ArrowError> for SinkError {
    fn from(err: ArrowError) -> Self {
        match err {
            ArrowError::IoError(message, _) => Self::Unavailable { message },
            other => Self::Encode {
                message: other.to_string(),
            },
        }
    }
}

/// Filesystem sink writing Arrow IPC files.
#[derive(Debug, Clone)]
pub struct ArrowIpcSink {
    root: PathBuf,
    granularity: PartitionGranularity,
}

impl ArrowIpcSink {
    /// Create a sink rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, granularity: PartitionGranularity) -> Self {
        Self {
            root: root.into(),
            granularity,
        }
    }

    /// Directory holding one partition.
    #[must_use]
    pub fn partition_dir(&self, instrument_id: &InstrumentId, date: NaiveDate, hour: u32) -> PathBuf {
        let mut dir = self
            .root
            .join(format!("instrument={}", instrument_id.as_str()))
            .join(format!("date={}", date.format("%Y-%m-%d")));
        if self.granularity == PartitionGranularity::Hour {
            dir = dir.join(format!("hour={hour:02}"));
        }
        dir
    }

    /// Final path of a record's file.
    #[must_use]
    pub fn record_path(&self, record: &AggregateRecord) -> PathBuf {
        self.partition_dir(&record.instrument_id, record.as_of.date(), record.as_of.hour())
            .join(format!("{}.arrow", record.as_of.unix_millis()))
    }

    /// Read every batch of one file.
    pub fn read_file(path: &Path) -> Result<Vec<RecordBatch>, SinkError> {
        let reader = FileReader::try_new(File::open(path)?, None)?;
        reader
            .collect::<Result<Vec<_>, _>>()
            .map_err(SinkError::from)
    }
}

/// Arrow schema for a record with the given windows.
#[must_use]
pub fn record_schema(windows: &[usize]) -> Schema {
    let price = DataType::Decimal128(DECIMAL_PRECISION, DECIMAL_SCALE);
    let mut fields = vec![
        Field::new("instrument_id", DataType::Utf8, false),
        Field::new(
            "as_of",
            DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
            false,
        ),
        Field::new("bid_price", price.clone(), false),
        Field::new("ask_price", price.clone(), false),
        Field::new("field", DataType::Utf8, false),
    ];
    fields.extend(
        windows
            .iter()
            .map(|w| Field::new(format!("sma_{w}"), price.clone(), true)),
    );
    Schema::new(fields)
}

fn to_decimal128(value: Decimal) -> Result<i128, SinkError> {
    let rounded = value.round_dp(DECIMAL_SCALE as u32);
    let shift = DECIMAL_SCALE as u32 - rounded.scale();
    rounded
        .mantissa()
        .checked_mul(10i128.pow(shift))
        .ok_or_else(|| SinkError::Encode {
            message: format!("{value} does not fit Decimal128({DECIMAL_PRECISION}, {DECIMAL_SCALE})"),
        })
}

fn decimal_column(values: Vec<Option<i128>>) -> Result<ArrayRef, SinkError> {
    let array = Decimal128Array::from(values)
        .with_precision_and_scale(DECIMAL_PRECISION, DECIMAL_SCALE)?;
    Ok(Arc::new(array))
}

/// Encode one record as a single-row batch.
pub fn record_batch(record: &AggregateRecord) -> Result<RecordBatch, SinkError> {
    let windows: Vec<usize> = record.sma.keys().copied().collect();
    let schema = Arc::new(record_schema(&windows));

    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(vec![record.instrument_id.as_str()])),
        Arc::new(
            TimestampMillisecondArray::from(vec![record.as_of.unix_millis()]).with_timezone("UTC"),
        ),
        decimal_column(vec![Some(to_decimal128(record.bid_price)?)])?,
        decimal_column(vec![Some(to_decimal128(record.ask_price)?)])?,
        Arc::new(StringArray::from(vec![record.field.as_str()])),
    ];
    for value in record.sma.values() {
        let cell = value.value().map(to_decimal128).transpose()?;
        columns.push(decimal_column(vec![cell])?);
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}

fn write_atomically(dir: &Path, final_path: &Path, batch: &RecordBatch) -> Result<(), SinkError> {
    fs::create_dir_all(dir)?;
    let tmp_path = final_path.with_extension(format!("arrow.{:016x}.tmp", rand::random::<u64>()));

    let written = (|| -> Result<(), SinkError> {
        let file = File::create(&tmp_path)?;
        let mut writer = FileWriter::try_new(file, &batch.schema())?;
        writer.write(batch)?;
        writer.finish()?;
        Ok(())
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    fs::rename(&tmp_path, final_path)?;
    Ok(())
}

#[async_trait]
impl OutputSinkPort for ArrowIpcSink {
    async fn write_partition(
        &self,
        instrument_id: &InstrumentId,
        date: NaiveDate,
        hour: u32,
        record: &AggregateRecord,
    ) -> Result<(), SinkError> {
        let batch = record_batch(record)?;
        let dir = self.partition_dir(instrument_id, date, hour);
        let final_path = dir.join(format!("{}.arrow", record.as_of.unix_millis()));

        let path = final_path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&dir, &path, &batch))
            .await
            .map_err(|e| SinkError::Unavailable {
                message: format!("write task failed: {e}"),
            })??;

        tracing::debug!(
            instrument = %instrument_id,
            path = %final_path.display(),
            "Wrote aggregate record"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregation::SmaValue;
    use crate::domain::quote::PriceField;
    use crate::domain::shared::Timestamp;
    use arrow_array::Array;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn record(as_of: &str) -> AggregateRecord {
        let mut sma = BTreeMap::new();
        sma.insert(10, SmaValue::Defined(dec!(23)));
        sma.insert(30, SmaValue::Undefined);
        AggregateRecord {
            instrument_id: InstrumentId::new("BTCUSD"),
            as_of: Timestamp::parse(as_of).unwrap(),
            bid_price: dec!(32.125),
            ask_price: dec!(33),
            field: PriceField::Bid,
            sma,
        }
    }

    async fn write(sink: &ArrowIpcSink, record: &AggregateRecord) {
        sink.write_partition(
            &record.instrument_id,
            record.as_of.date(),
            record.as_of.hour(),
            record,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn writes_hour_partition_layout() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ArrowIpcSink::new(dir.path(), PartitionGranularity::Hour);
        let record = record("2024-05-01T13:00:00Z");
        write(&sink, &record).await;

        let expected = dir
            .path()
            .join("instrument=BTCUSD/date=2024-05-01/hour=13")
            .join(format!("{}.arrow", record.as_of.unix_millis()));
        assert_eq!(sink.record_path(&record), expected);
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn day_granularity_omits_hour() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ArrowIpcSink::new(dir.path(), PartitionGranularity::Day);
        let record = record("2024-05-01T13:00:00Z");
        write(&sink, &record).await;

        assert!(dir.path().join("instrument=BTCUSD/date=2024-05-01").is_dir());
        assert!(!dir.path().join("instrument=BTCUSD/date=2024-05-01/hour=13").exists());
    }

    #[tokio::test]
    async fn round_trips_values_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ArrowIpcSink::new(dir.path(), PartitionGranularity::Hour);
        let record = record("2024-05-01T13:00:00Z");
        write(&sink, &record).await;

        let batches = ArrowIpcSink::read_file(&sink.record_path(&record)).unwrap();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 1);

        let bid = batch
            .column_by_name("bid_price")
            .unwrap()
            .as_any()
            .downcast_ref::<Decimal128Array>()
            .unwrap();
        assert_eq!(bid.value(0), 321_250_000_000);

        let sma10 = batch
            .column_by_name("sma_10")
            .unwrap()
            .as_any()
            .downcast_ref::<Decimal128Array>()
            .unwrap();
        assert_eq!(Decimal::from_i128_with_scale(sma10.value(0), 10), dec!(23));

        let sma30 = batch.column_by_name("sma_30").unwrap();
        assert!(sma30.is_null(0));
    }

    #[tokio::test]
    async fn rewrite_replaces_record() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ArrowIpcSink::new(dir.path(), PartitionGranularity::Hour);
        let mut record = record("2024-05-01T13:00:00Z");
        write(&sink, &record).await;
        record.bid_price = dec!(40);
        write(&sink, &record).await;

        let partition = sink.partition_dir(&record.instrument_id, record.as_of.date(), 13);
        let files: Vec<_> = fs::read_dir(&partition).unwrap().collect();
        assert_eq!(files.len(), 1);

        let batches = ArrowIpcSink::read_file(&sink.record_path(&record)).unwrap();
        let bid = batches[0]
            .column_by_name("bid_price")
            .unwrap()
            .as_any()
            .downcast_ref::<Decimal128Array>()
            .unwrap();
        assert_eq!(Decimal::from_i128_with_scale(bid.value(0), 10), dec!(40));
    }

    #[test]
    fn schema_has_one_column_per_window() {
        let schema = record_schema(&[10, 30, 60]);
        assert_eq!(schema.fields().len(), 8);
        assert!(schema.field_with_name("sma_60").unwrap().is_nullable());
        assert!(!schema.field_with_name("bid_price").unwrap().is_nullable());
    }

    #[test]
    fn oversized_value_is_encode_error() {
        let err = to_decimal128(Decimal::MAX).unwrap_err();
        assert!(matches!(err, SinkError::Encode { .. }));
    }
}
