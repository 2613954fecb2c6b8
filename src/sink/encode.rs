//! Arrow encoding and decoding for canonical records.
//!
//! Records travel through the sink paired with their write-time stamp in
//! epoch microseconds; merge keeps the original stamp for untouched rows.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int32Array, RecordBatch, StringArray,
    TimestampMicrosecondArray, TimestampSecondArray,
};
use arrow::error::ArrowError;

use crate::record::CanonicalRecord;
use crate::schema::canonical_schema;

/// A canonical record plus its `processing_time_utc` stamp.
pub type StampedRecord = (CanonicalRecord, i64);

/// Encode stamped records into a single record batch in the canonical
/// column order.
pub fn records_to_batch(rows: &[StampedRecord]) -> Result<RecordBatch, ArrowError> {
    let schema = canonical_schema();

    let ids: StringArray = rows
        .iter()
        .map(|(r, _)| Some(r.earthquake_id.as_str()))
        .collect();
    let magnitudes = Float64Array::from(rows.iter().map(|(r, _)| r.magnitude).collect::<Vec<_>>());
    let places: StringArray = rows.iter().map(|(r, _)| r.place.as_deref()).collect();
    let timestamps =
        TimestampSecondArray::from(rows.iter().map(|(r, _)| r.timestamp_utc).collect::<Vec<_>>())
            .with_timezone("UTC");
    let tz_offsets = Int32Array::from(
        rows.iter()
            .map(|(r, _)| r.timezone_offset_minutes)
            .collect::<Vec<_>>(),
    );
    let urls: StringArray = rows.iter().map(|(r, _)| r.details_url.as_deref()).collect();
    let statuses: StringArray = rows.iter().map(|(r, _)| r.status.as_deref()).collect();
    let tsunami =
        BooleanArray::from(rows.iter().map(|(r, _)| r.tsunami_alert).collect::<Vec<_>>());
    let significance =
        Int32Array::from(rows.iter().map(|(r, _)| r.significance).collect::<Vec<_>>());
    let networks: StringArray = rows.iter().map(|(r, _)| r.network_id.as_deref()).collect();
    let codes: StringArray = rows.iter().map(|(r, _)| r.event_code.as_deref()).collect();
    let mag_types: StringArray = rows
        .iter()
        .map(|(r, _)| r.magnitude_type.as_deref())
        .collect();
    let event_types: StringArray = rows.iter().map(|(r, _)| r.event_type.as_deref()).collect();
    let longitudes = Float64Array::from(rows.iter().map(|(r, _)| r.longitude).collect::<Vec<_>>());
    let latitudes = Float64Array::from(rows.iter().map(|(r, _)| r.latitude).collect::<Vec<_>>());
    let depths = Float64Array::from(rows.iter().map(|(r, _)| r.depth_km).collect::<Vec<_>>());
    let processed = TimestampMicrosecondArray::from(
        rows.iter().map(|(_, stamp)| *stamp).collect::<Vec<_>>(),
    )
    .with_timezone("UTC");

    let columns: Vec<ArrayRef> = vec![
        Arc::new(ids),
        Arc::new(magnitudes),
        Arc::new(places),
        Arc::new(timestamps),
        Arc::new(tz_offsets),
        Arc::new(urls),
        Arc::new(statuses),
        Arc::new(tsunami),
        Arc::new(significance),
        Arc::new(networks),
        Arc::new(codes),
        Arc::new(mag_types),
        Arc::new(event_types),
        Arc::new(longitudes),
        Arc::new(latitudes),
        Arc::new(depths),
        Arc::new(processed),
    ];

    RecordBatch::try_new(schema, columns)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, index: usize) -> Result<&'a T, ArrowError> {
    batch
        .column(index)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| {
            ArrowError::SchemaError(format!(
                "column {index} has unexpected type {}",
                batch.column(index).data_type()
            ))
        })
}

fn opt_str(array: &StringArray, row: usize) -> Option<String> {
    array.is_valid(row).then(|| array.value(row).to_string())
}

fn opt_f64(array: &Float64Array, row: usize) -> Option<f64> {
    array.is_valid(row).then(|| array.value(row))
}

fn opt_i32(array: &Int32Array, row: usize) -> Option<i32> {
    array.is_valid(row).then(|| array.value(row))
}

/// Decode a record batch back into stamped records.
pub fn batch_to_records(batch: &RecordBatch) -> Result<Vec<StampedRecord>, ArrowError> {
    let ids: &StringArray = column(batch, 0)?;
    let magnitudes: &Float64Array = column(batch, 1)?;
    let places: &StringArray = column(batch, 2)?;
    let timestamps: &TimestampSecondArray = column(batch, 3)?;
    let tz_offsets: &Int32Array = column(batch, 4)?;
    let urls: &StringArray = column(batch, 5)?;
    let statuses: &StringArray = column(batch, 6)?;
    let tsunami: &BooleanArray = column(batch, 7)?;
    let significance: &Int32Array = column(batch, 8)?;
    let networks: &StringArray = column(batch, 9)?;
    let codes: &StringArray = column(batch, 10)?;
    let mag_types: &StringArray = column(batch, 11)?;
    let event_types: &StringArray = column(batch, 12)?;
    let longitudes: &Float64Array = column(batch, 13)?;
    let latitudes: &Float64Array = column(batch, 14)?;
    let depths: &Float64Array = column(batch, 15)?;
    let processed: &TimestampMicrosecondArray = column(batch, 16)?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let record = CanonicalRecord {
            earthquake_id: ids.value(i).to_string(),
            magnitude: opt_f64(magnitudes, i),
            place: opt_str(places, i),
            timestamp_utc: timestamps.is_valid(i).then(|| timestamps.value(i)),
            timezone_offset_minutes: opt_i32(tz_offsets, i),
            details_url: opt_str(urls, i),
            status: opt_str(statuses, i),
            tsunami_alert: tsunami.is_valid(i).then(|| tsunami.value(i)),
            significance: opt_i32(significance, i),
            network_id: opt_str(networks, i),
            event_code: opt_str(codes, i),
            magnitude_type: opt_str(mag_types, i),
            event_type: opt_str(event_types, i),
            longitude: opt_f64(longitudes, i),
            latitude: opt_f64(latitudes, i),
            depth_km: opt_f64(depths, i),
        };
        rows.push((record, processed.value(i)));
    }

    Ok(rows)
}
